use crate::client::BybitClient;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use signal_trader_core::events::{
    Bar, BrokerPosition, FillEvent, OrderDirection, OrderEvent, OrderType, Side,
};
use signal_trader_core::traits::ExchangeClient;
use std::collections::HashMap;

/// Paper trading exchange: live public market data, simulated fills.
///
/// Orders never leave the process. Market orders fill at the order's reference
/// price (or the last close seen for the symbol) adjusted by slippage; limit
/// orders fill at their limit price. Commission is charged on notional.
pub struct PaperExchange {
    market: BybitClient,
    commission_rate: Decimal,
    slippage_bps: Decimal,
    account: Mutex<PaperAccount>,
}

#[derive(Debug)]
struct PaperAccount {
    balance: Decimal,
    positions: HashMap<(String, Side), BrokerPosition>,
    last_prices: HashMap<String, Decimal>,
}

impl PaperExchange {
    /// # Arguments
    ///
    /// * `market` - Source of klines
    /// * `starting_balance` - Simulated wallet balance in quote currency
    /// * `commission_rate` - Commission as a fraction of notional (0.00055 = Bybit taker)
    /// * `slippage_bps` - Adverse slippage on market orders, in basis points
    #[must_use]
    pub fn new(
        market: BybitClient,
        starting_balance: Decimal,
        commission_rate: Decimal,
        slippage_bps: Decimal,
    ) -> Self {
        Self {
            market,
            commission_rate,
            slippage_bps,
            account: Mutex::new(PaperAccount {
                balance: starting_balance,
                positions: HashMap::new(),
                last_prices: HashMap::new(),
            }),
        }
    }

    fn apply_slippage(&self, price: Decimal, direction: OrderDirection) -> Decimal {
        let slippage = price * self.slippage_bps / Decimal::from(10000);
        match direction {
            OrderDirection::Buy => price + slippage,
            OrderDirection::Sell => price - slippage,
        }
    }

    fn fill(&self, order: OrderEvent) -> Result<FillEvent> {
        if order.quantity <= Decimal::ZERO {
            return Err(anyhow!("Order quantity must be positive, got {}", order.quantity));
        }

        let mut account = self.account.lock();

        let reference = order
            .price
            .or_else(|| account.last_prices.get(&order.symbol).copied())
            .ok_or_else(|| anyhow!("No reference price for {}", order.symbol))?;

        let fill_price = match order.order_type {
            OrderType::Market => self.apply_slippage(reference, order.direction),
            OrderType::Limit => reference,
        };
        let commission = fill_price * order.quantity * self.commission_rate;

        let realized = if order.reduce_only {
            account.reduce(&order, fill_price)?
        } else {
            account.increase(&order, fill_price);
            Decimal::ZERO
        };
        account.balance += realized - commission;

        let fill = FillEvent {
            order_id: uuid::Uuid::new_v4().to_string(),
            symbol: order.symbol,
            direction: order.direction,
            quantity: order.quantity,
            price: fill_price,
            commission,
            timestamp: order.timestamp,
        };

        tracing::info!(
            symbol = %fill.symbol,
            direction = %fill.direction,
            quantity = %fill.quantity,
            price = %fill.price,
            commission = %fill.commission,
            reduce_only = order.reduce_only,
            "Paper fill"
        );

        Ok(fill)
    }
}

impl PaperAccount {
    fn increase(&mut self, order: &OrderEvent, price: Decimal) {
        let side = match order.direction {
            OrderDirection::Buy => Side::Long,
            OrderDirection::Sell => Side::Short,
        };
        let position = self
            .positions
            .entry((order.symbol.clone(), side))
            .or_insert_with(|| BrokerPosition {
                symbol: order.symbol.clone(),
                side,
                size: Decimal::ZERO,
                entry_price: price,
            });

        let new_size = position.size + order.quantity;
        position.entry_price =
            (position.entry_price * position.size + price * order.quantity) / new_size;
        position.size = new_size;
    }

    /// Returns the P&L realized by the reduction.
    fn reduce(&mut self, order: &OrderEvent, price: Decimal) -> Result<Decimal> {
        let side = match order.direction {
            OrderDirection::Sell => Side::Long,
            OrderDirection::Buy => Side::Short,
        };
        let key = (order.symbol.clone(), side);
        let position = self
            .positions
            .get_mut(&key)
            .ok_or_else(|| anyhow!("Reduce-only order for {} {} but no position", order.symbol, side))?;

        if order.quantity > position.size {
            return Err(anyhow!(
                "Reduce-only order of {} exceeds {} {} position of {}",
                order.quantity,
                order.symbol,
                side,
                position.size
            ));
        }

        let realized = match side {
            Side::Long => (price - position.entry_price) * order.quantity,
            Side::Short => (position.entry_price - price) * order.quantity,
        };
        position.size -= order.quantity;
        if position.size.is_zero() {
            self.positions.remove(&key);
        }
        Ok(realized)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        let bars = self.market.fetch_klines(symbol, timeframe, limit).await?;
        if let Some(last) = bars.last() {
            self.account
                .lock()
                .last_prices
                .insert(symbol.to_string(), last.close);
        }
        Ok(bars)
    }

    async fn fetch_balance(&self) -> Result<Decimal> {
        Ok(self.account.lock().balance)
    }

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>> {
        let account = self.account.lock();
        let mut positions: Vec<BrokerPosition> = account.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.side.cmp(&b.side)));
        Ok(positions)
    }

    async fn place_order(&self, order: OrderEvent) -> Result<FillEvent> {
        // Zero API calls: fills are simulated locally
        self.fill(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BYBIT_API;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn exchange(commission_rate: Decimal, slippage_bps: Decimal) -> PaperExchange {
        let market = BybitClient::new(BYBIT_API, Duration::from_secs(10)).unwrap();
        PaperExchange::new(market, dec!(100000), commission_rate, slippage_bps)
    }

    fn order(direction: OrderDirection, quantity: Decimal, price: Decimal, reduce_only: bool) -> OrderEvent {
        OrderEvent {
            symbol: "BTCUSDT".to_string(),
            order_type: OrderType::Market,
            direction,
            quantity,
            price: Some(price),
            reduce_only,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_buy_fills_above_reference() {
        let exchange = exchange(dec!(0.001), dec!(5));
        let fill = exchange
            .place_order(order(OrderDirection::Buy, dec!(1), dec!(50000), false))
            .await
            .unwrap();

        assert_eq!(fill.quantity, dec!(1));
        assert_eq!(fill.price, dec!(50025));
        assert!(!fill.order_id.is_empty());
    }

    #[tokio::test]
    async fn test_sell_fills_below_reference() {
        let exchange = exchange(dec!(0.001), dec!(5));
        let fill = exchange
            .place_order(order(OrderDirection::Sell, dec!(10), dec!(3000), false))
            .await
            .unwrap();
        assert!(fill.price < dec!(3000));
    }

    #[tokio::test]
    async fn test_round_trip_updates_balance_and_positions() {
        let exchange = exchange(dec!(0.001), Decimal::ZERO);

        let entry = exchange
            .place_order(order(OrderDirection::Buy, dec!(1), dec!(50000), false))
            .await
            .unwrap();
        assert_eq!(entry.commission, dec!(50));

        let positions = exchange.fetch_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, Side::Long);
        assert_eq!(positions[0].size, dec!(1));

        let exit = exchange
            .place_order(order(OrderDirection::Sell, dec!(1), dec!(51000), true))
            .await
            .unwrap();
        assert_eq!(exit.commission, dec!(51));

        assert!(exchange.fetch_positions().await.unwrap().is_empty());
        // +1000 profit, -101 commission
        assert_eq!(exchange.fetch_balance().await.unwrap(), dec!(100899));
    }

    #[tokio::test]
    async fn test_reduce_only_without_position_fails() {
        let exchange = exchange(dec!(0.001), Decimal::ZERO);
        let result = exchange
            .place_order(order(OrderDirection::Buy, dec!(1), dec!(50000), true))
            .await;
        assert!(result.is_err());
        assert_eq!(exchange.fetch_balance().await.unwrap(), dec!(100000));
    }

    #[tokio::test]
    async fn test_market_order_needs_a_price() {
        let exchange = exchange(dec!(0.001), Decimal::ZERO);
        let mut order = order(OrderDirection::Buy, dec!(1), dec!(50000), false);
        order.price = None;
        let err = exchange.place_order(order).await.unwrap_err();
        assert!(err.to_string().contains("No reference price"));
    }

    #[tokio::test]
    async fn test_hedged_sides_are_tracked_separately() {
        let exchange = exchange(Decimal::ZERO, Decimal::ZERO);
        exchange
            .place_order(order(OrderDirection::Buy, dec!(1), dec!(50000), false))
            .await
            .unwrap();
        exchange
            .place_order(order(OrderDirection::Sell, dec!(2), dec!(50000), false))
            .await
            .unwrap();

        let positions = exchange.fetch_positions().await.unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].side, Side::Long);
        assert_eq!(positions[1].side, Side::Short);
        assert_eq!(positions[1].size, dec!(2));
    }
}
