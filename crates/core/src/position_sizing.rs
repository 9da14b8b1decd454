use crate::events::Side;
use anyhow::Result;
use rust_decimal::Decimal;

/// Decimal places kept on order quantities (standard for crypto).
pub const QUANTITY_DP: u32 = 8;

/// Calculate position size so that a stop-loss fill loses exactly
/// `risk_per_trade` of current equity.
///
/// # Arguments
/// * `account_equity` - Current account equity in quote currency
/// * `risk_per_trade` - Fraction of equity to lose at the stop (0.0-1.0]
/// * `entry_price` - Expected entry price
/// * `stop_loss_price` - Stop-loss price
///
/// # Returns
/// Base-asset quantity, rounded to [`QUANTITY_DP`] places
///
/// # Errors
/// Returns error if prices are not positive or the stop distance is zero
pub fn calculate_position_size(
    account_equity: Decimal,
    risk_per_trade: Decimal,
    entry_price: Decimal,
    stop_loss_price: Decimal,
) -> Result<Decimal> {
    if entry_price <= Decimal::ZERO || stop_loss_price <= Decimal::ZERO {
        anyhow::bail!("Entry and stop-loss prices must be positive");
    }

    let stop_distance = (entry_price - stop_loss_price).abs();
    if stop_distance == Decimal::ZERO {
        anyhow::bail!("Stop-loss distance is zero");
    }

    // Amount lost if the stop fills
    let risk_amount = account_equity * risk_per_trade;
    let quantity = risk_amount / stop_distance;

    Ok(round_quantity(quantity))
}

/// Stop-loss and take-profit prices for a fresh entry.
///
/// LONG stops sit below entry and target above it; SHORT is the mirror image.
#[must_use]
pub fn bracket_prices(
    side: Side,
    entry_price: Decimal,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
) -> (Decimal, Decimal) {
    match side {
        Side::Long => (
            entry_price * (Decimal::ONE - stop_loss_pct),
            entry_price * (Decimal::ONE + take_profit_pct),
        ),
        Side::Short => (
            entry_price * (Decimal::ONE + stop_loss_pct),
            entry_price * (Decimal::ONE - take_profit_pct),
        ),
    }
}

#[must_use]
pub fn round_quantity(quantity: Decimal) -> Decimal {
    quantity.round_dp(QUANTITY_DP)
}
