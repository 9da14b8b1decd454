//! Global drawdown kill switch.
//!
//! [`KillSwitch`] is a one-way latch shared by cloning; [`DrawdownTracker`] keeps
//! the equity high-water mark that decides when to pull it.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide latch. Once tripped it stays tripped until an explicit [`reset`].
///
/// [`reset`]: KillSwitch::reset
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    tripped: Arc<AtomicBool>,
}

impl KillSwitch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Sets the latch. Returns `true` only for the call that actually tripped it.
    pub fn trip(&self) -> bool {
        !self.tripped.swap(true, Ordering::SeqCst)
    }

    /// Operator action. Never called by the engine on its own.
    pub fn reset(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }
}

/// Equity high-water mark.
#[derive(Debug, Clone)]
pub struct DrawdownTracker {
    peak: Decimal,
}

impl DrawdownTracker {
    #[must_use]
    pub const fn new(starting_equity: Decimal) -> Self {
        Self {
            peak: starting_equity,
        }
    }

    #[must_use]
    pub const fn peak(&self) -> Decimal {
        self.peak
    }

    /// Raises the peak if `equity` is a new high and returns the current drawdown.
    pub fn observe(&mut self, equity: Decimal) -> Decimal {
        if equity > self.peak {
            self.peak = equity;
        }
        self.drawdown(equity)
    }

    /// `(peak - equity) / peak`, zero while at or above the peak.
    #[must_use]
    pub fn drawdown(&self, equity: Decimal) -> Decimal {
        if self.peak <= Decimal::ZERO || equity >= self.peak {
            return Decimal::ZERO;
        }
        (self.peak - equity) / self.peak
    }

    /// Moves the peak to `equity`. Used after an operator resets the kill switch.
    pub fn rebase(&mut self, equity: Decimal) {
        self.peak = equity;
    }

    /// Observes `equity` and trips `kill_switch` if drawdown reached `limit`.
    ///
    /// Returns the drawdown and whether this call tripped the switch.
    pub fn check(&mut self, equity: Decimal, limit: Decimal, kill_switch: &KillSwitch) -> (Decimal, bool) {
        let drawdown = self.observe(equity);
        if drawdown >= limit && kill_switch.trip() {
            tracing::error!(
                equity = %equity,
                peak = %self.peak,
                drawdown = %drawdown,
                limit = %limit,
                "Global drawdown limit breached, kill switch activated"
            );
            return (drawdown, true);
        }
        (drawdown, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trip_reports_first_call_only() {
        let switch = KillSwitch::new();
        let shared = switch.clone();
        assert!(!switch.is_active());
        assert!(shared.trip());
        assert!(!switch.trip());
        assert!(switch.is_active());

        switch.reset();
        assert!(!shared.is_active());
    }

    #[test]
    fn peak_never_decreases() {
        let mut tracker = DrawdownTracker::new(dec!(100000));
        tracker.observe(dec!(110000));
        tracker.observe(dec!(90000));
        assert_eq!(tracker.peak(), dec!(110000));
    }

    #[test]
    fn small_losses_do_not_trip() {
        let switch = KillSwitch::new();
        let mut tracker = DrawdownTracker::new(dec!(100000));

        let mut equity = dec!(100000);
        for _ in 0..3 {
            equity -= equity * dec!(0.01);
            let (_, tripped) = tracker.check(equity, dec!(0.20), &switch);
            assert!(!tripped);
        }

        assert!(tracker.drawdown(equity) < dec!(0.03));
        assert!(!switch.is_active());
    }

    #[test]
    fn breach_trips_once() {
        let switch = KillSwitch::new();
        let mut tracker = DrawdownTracker::new(dec!(100000));

        let (drawdown, tripped) = tracker.check(dec!(79000), dec!(0.20), &switch);
        assert_eq!(drawdown, dec!(0.21));
        assert!(tripped);
        assert!(switch.is_active());

        // Still breached, but already latched
        let (_, tripped) = tracker.check(dec!(78000), dec!(0.20), &switch);
        assert!(!tripped);
        assert!(switch.is_active());
    }

    #[test]
    fn recovery_does_not_reset() {
        let switch = KillSwitch::new();
        let mut tracker = DrawdownTracker::new(dec!(100000));
        tracker.check(dec!(75000), dec!(0.20), &switch);
        tracker.check(dec!(100000), dec!(0.20), &switch);
        assert!(switch.is_active());
    }

    #[test]
    fn rebase_after_reset() {
        let switch = KillSwitch::new();
        let mut tracker = DrawdownTracker::new(dec!(100000));
        tracker.check(dec!(79000), dec!(0.20), &switch);

        switch.reset();
        tracker.rebase(dec!(79000));
        let (drawdown, tripped) = tracker.check(dec!(79000), dec!(0.20), &switch);
        assert_eq!(drawdown, Decimal::ZERO);
        assert!(!tripped);
    }
}
