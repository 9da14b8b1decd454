use crate::interval::bybit_code;
use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use signal_trader_core::events::Bar;
use signal_trader_core::interval::Interval;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const BYBIT_API: &str = "https://api.bybit.com";

/// Bybit caps a kline request at 1000 rows.
pub const MAX_KLINES_PER_REQUEST: usize = 1000;

const DEFAULT_RATE_LIMIT_PER_SECOND: u32 = 10;

/// Unauthenticated client for Bybit's public v5 market endpoints.
#[derive(Clone)]
pub struct BybitClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KlineResponse {
    ret_code: i64,
    ret_msg: String,
    result: Option<KlineResult>,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

impl BybitClient {
    /// Creates a client against `base_url` with a per-request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(DEFAULT_RATE_LIMIT_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Fetches the most recent `limit` linear-perpetual klines, oldest first.
    ///
    /// # Errors
    /// Returns error on unknown timeframe, transport failure, or a non-zero `retCode`.
    pub async fn fetch_klines(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        let interval = Interval::from_str(timeframe)?;
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);

        self.rate_limiter.until_ready().await;

        let url = format!("{}/v5/market/kline", self.base_url);
        let bybit_symbol = normalize_symbol(symbol);
        let limit = limit.to_string();
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("category", "linear"),
                ("symbol", bybit_symbol.as_str()),
                ("interval", bybit_code(interval)),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to Bybit API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Bybit API error ({}): {}", status, error_text));
        }

        let body: KlineResponse = response
            .json()
            .await
            .context("Failed to parse Bybit API response")?;

        parse_klines(body, symbol)
    }
}

/// `BTC/USDT` and `BTC/USDT:USDT` become `BTCUSDT`.
fn normalize_symbol(symbol: &str) -> String {
    let base = symbol.split(':').next().unwrap_or(symbol);
    base.replace('/', "").to_uppercase()
}

fn parse_klines(body: KlineResponse, symbol: &str) -> Result<Vec<Bar>> {
    if body.ret_code != 0 {
        return Err(anyhow!("Bybit API error {}: {}", body.ret_code, body.ret_msg));
    }

    let rows = body.result.map(|r| r.list).unwrap_or_default();
    let mut bars: Vec<Bar> = rows
        .iter()
        .filter_map(|row| parse_kline(row, symbol))
        .collect();

    // Bybit lists newest first
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// `[startTime, open, high, low, close, volume, turnover]`, all strings.
fn parse_kline(row: &[String], symbol: &str) -> Option<Bar> {
    if row.len() < 6 {
        return None;
    }

    let start_ms = row[0].parse::<i64>().ok()?;
    let timestamp = Utc.timestamp_millis_opt(start_ms).single()?;

    Some(Bar {
        symbol: symbol.to_string(),
        open: Decimal::from_str(&row[1]).ok()?,
        high: Decimal::from_str(&row[2]).ok()?,
        low: Decimal::from_str(&row[3]).ok()?,
        close: Decimal::from_str(&row[4]).ok()?,
        volume: Decimal::from_str(&row[5]).ok()?,
        timestamp,
    })
}
