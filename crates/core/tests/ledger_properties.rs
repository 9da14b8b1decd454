//! Property tests for ledger and risk arithmetic.
//!
//! 1. Sizing: a stop-loss fill loses `risk_per_trade` of equity (within rounding)
//! 2. Capacity: no sequence of opens and closes exceeds the concurrency cap
//! 3. Drawdown: the peak only rises, and the latch never clears by itself

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_trader_core::{
    bracket_prices, calculate_position_size, CloseReason, DrawdownTracker, KillSwitch,
    OpenRequest, PositionLedger, Side,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = Decimal> {
    (1_000u64..10_000_000u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn arb_symbol() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("BTCUSDT".to_string()),
        Just("ETHUSDT".to_string()),
        Just("SOLUSDT".to_string()),
        Just("XRPUSDT".to_string()),
    ]
}

#[derive(Debug, Clone)]
enum Action {
    Open(String, Side, Decimal),
    CloseOldest(Decimal),
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (arb_symbol(), arb_side(), arb_price()).prop_map(|(s, d, p)| Action::Open(s, d, p)),
        1 => arb_price().prop_map(Action::CloseOldest),
    ]
}

// ── 1. Sizing ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn stop_loss_fill_loses_risk_fraction(
        equity in (1_000u64..10_000_000u64).prop_map(Decimal::from),
        risk_bps in 1u32..=500u32,
        entry in arb_price(),
        side in arb_side(),
    ) {
        let risk = Decimal::new(i64::from(risk_bps), 4);
        let (stop, _) = bracket_prices(side, entry, dec!(0.02), dec!(0.04));
        let size = calculate_position_size(equity, risk, entry, stop).unwrap();

        let loss = size * (entry - stop).abs();
        let expected = equity * risk;
        // Rounding to 8 dp moves the loss by at most half a unit per coin of distance
        let tolerance = (entry - stop).abs() * dec!(0.000000005) + dec!(0.00000001);
        prop_assert!((loss - expected).abs() <= tolerance,
            "loss {} expected {} tolerance {}", loss, expected, tolerance);
    }
}

// ── 2. Capacity ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn active_positions_never_exceed_cap(
        max in 1usize..6,
        actions in prop::collection::vec(arb_action(), 1..60),
    ) {
        let mut ledger = PositionLedger::new(dec!(100000));

        for action in actions {
            match action {
                Action::Open(symbol, side, price) => {
                    let (stop_loss, take_profit) = bracket_prices(side, price, dec!(0.02), dec!(0.04));
                    let request = OpenRequest {
                        symbol,
                        side,
                        size: dec!(0.1),
                        entry_price: price,
                        stop_loss,
                        take_profit,
                        commission: Decimal::ZERO,
                        opened_at: Utc::now(),
                    };
                    let _ = ledger.open(request, max);
                }
                Action::CloseOldest(price) => {
                    let oldest = ledger.active_positions().next().map(|p| p.id);
                    if let Some(id) = oldest {
                        ledger.close(id, price, Decimal::ZERO, CloseReason::Signal, Utc::now()).unwrap();
                    }
                }
            }

            prop_assert!(ledger.active_count() <= max);

            // (symbol, side) stays unique among active positions
            let mut keys: Vec<_> = ledger.active_positions().map(|p| (p.symbol.clone(), p.side)).collect();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), total);
        }
    }

    #[test]
    fn closing_twice_realizes_once(entry in arb_price(), exit in arb_price(), side in arb_side()) {
        let mut ledger = PositionLedger::new(dec!(100000));
        let (stop_loss, take_profit) = bracket_prices(side, entry, dec!(0.02), dec!(0.04));
        let position = ledger.open(OpenRequest {
            symbol: "BTCUSDT".to_string(),
            side,
            size: dec!(1),
            entry_price: entry,
            stop_loss,
            take_profit,
            commission: Decimal::ZERO,
            opened_at: Utc::now(),
        }, 5).unwrap();

        let first = ledger.close(position.id, exit, Decimal::ZERO, CloseReason::Signal, Utc::now()).unwrap();
        let second = ledger.close(position.id, entry, Decimal::ZERO, CloseReason::StopLoss, Utc::now()).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(ledger.realized_pnl(), first);
        prop_assert_eq!(ledger.account_state().equity, dec!(100000) + first);
    }
}

// ── 3. Drawdown ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn peak_is_monotone_and_latch_sticks(
        equities in prop::collection::vec((50_000u64..150_000u64).prop_map(Decimal::from), 1..40),
    ) {
        let switch = KillSwitch::new();
        let mut tracker = DrawdownTracker::new(dec!(100000));
        let mut previous_peak = tracker.peak();
        let mut tripped_before = false;

        for equity in equities {
            let (drawdown, _) = tracker.check(equity, dec!(0.20), &switch);
            prop_assert!(tracker.peak() >= previous_peak);
            prop_assert!(drawdown >= Decimal::ZERO);
            if drawdown >= dec!(0.20) {
                prop_assert!(switch.is_active());
            }
            if tripped_before {
                prop_assert!(switch.is_active());
            }
            tripped_before = switch.is_active();
            previous_peak = tracker.peak();
        }
    }
}
