use rust_decimal::Decimal;
use signal_trader_core::config::TradingConfig;
use signal_trader_core::error::TradingError;
use signal_trader_core::events::Bar;
use signal_trader_core::traits::ExchangeClient;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Runs one exchange call under `timeout`, folding failures into `TransientIo`.
pub(crate) async fn call_exchange<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, TradingError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TradingError::transient(operation, format!("{e:#}"))),
        Err(_) => Err(TradingError::transient(
            operation,
            format!("timed out after {}s", timeout.as_secs()),
        )),
    }
}

/// Market data for one tick.
#[derive(Debug, Default)]
pub struct MarketSnapshot {
    /// Window for the configured symbol, oldest first. Empty when trading is
    /// disabled or the window could not be fetched.
    pub bars: Vec<Bar>,
    /// Latest close for the configured symbol and every symbol with an open
    /// position that could be priced.
    pub latest_prices: HashMap<String, Decimal>,
    /// Fetches that failed, in the order they were attempted.
    pub failures: Vec<TradingError>,
}

pub struct MarketDataFeed {
    exchange: Arc<dyn ExchangeClient>,
}

impl MarketDataFeed {
    #[must_use]
    pub fn new(exchange: Arc<dyn ExchangeClient>) -> Self {
        Self { exchange }
    }

    /// Fetches the bar window (when `include_window`) and a latest price for each
    /// of `open_symbols`.
    ///
    /// Every fetch is independent: a window that cannot be served leaves `bars`
    /// empty, but open positions are still priced. Failures (errors, timeouts,
    /// empty responses) are collected as `TransientIo` in `failures`.
    pub async fn refresh(
        &self,
        config: &TradingConfig,
        open_symbols: &[String],
        include_window: bool,
    ) -> MarketSnapshot {
        let timeout = config.exchange_timeout();
        let mut snapshot = MarketSnapshot::default();

        if include_window {
            match self
                .fetch_window(&config.symbol, &config.timeframe, config.bar_limit, timeout)
                .await
            {
                Ok(bars) => {
                    if let Some(last) = bars.last() {
                        snapshot.latest_prices.insert(config.symbol.clone(), last.close);
                    }
                    snapshot.bars = bars;
                }
                Err(e) => {
                    tracing::warn!("No bar window for {} {}: {}", config.symbol, config.timeframe, e);
                    snapshot.failures.push(e);
                }
            }
        }

        for symbol in open_symbols {
            if snapshot.latest_prices.contains_key(symbol) {
                continue;
            }
            match self.fetch_window(symbol, &config.timeframe, 1, timeout).await {
                Ok(window) => {
                    if let Some(last) = window.last() {
                        snapshot.latest_prices.insert(symbol.clone(), last.close);
                    }
                }
                Err(e) => {
                    tracing::warn!("No price for open position on {}: {}", symbol, e);
                    snapshot.failures.push(e);
                }
            }
        }

        snapshot
    }

    async fn fetch_window(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<Bar>, TradingError> {
        let mut bars = call_exchange(
            "fetch_ohlcv",
            timeout,
            self.exchange.fetch_ohlcv(symbol, timeframe, limit),
        )
        .await?;

        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }

        if bars.is_empty() {
            return Err(TradingError::transient(
                "fetch_ohlcv",
                format!("no bars returned for {symbol} {timeframe}"),
            ));
        }
        Ok(bars)
    }
}
