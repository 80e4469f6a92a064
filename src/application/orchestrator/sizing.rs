//! The Orchestrator's sizing rule (spec §4.3):
//! `qty_i = floor(min(|w_i| * capital, max_notional_per_symbol) / p_i)`,
//! with each non-positive outcome classified into the skip reason the run
//! record reports rather than silently dropped. Grounded on
//! `application::optimization::position_sizer`'s capital-allocation shape,
//! rebuilt around one signal at a time since the Orchestrator sizes and
//! submits sequentially per spec §4.3.

use crate::domain::order::OrderSide;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ZeroWeight,
    MissingPrice,
    Quarantined,
    ZeroQty,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::ZeroWeight => "zero_weight",
            SkipReason::MissingPrice => "missing_price",
            SkipReason::Quarantined => "quarantined",
            SkipReason::ZeroQty => "zero_qty",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sized {
    pub qty: i64,
    pub side: OrderSide,
    pub price: Decimal,
}

/// Sizes a single signal's target weight into an order quantity. `capital`
/// is the strategy's allocated notional; `max_notional_per_symbol` bounds
/// any single symbol's slice of it regardless of how concentrated the
/// weight vector is.
pub fn size_signal(
    target_weight: f64,
    capital: Decimal,
    max_notional_per_symbol: Decimal,
    price: Option<Decimal>,
    quarantined: bool,
) -> Result<Sized, SkipReason> {
    if quarantined {
        return Err(SkipReason::Quarantined);
    }
    if target_weight == 0.0 {
        return Err(SkipReason::ZeroWeight);
    }
    let Some(price) = price.filter(|p| *p > Decimal::ZERO) else {
        return Err(SkipReason::MissingPrice);
    };

    let weight_decimal = Decimal::from_f64_retain(target_weight.abs()).unwrap_or(Decimal::ZERO);
    let notional = (weight_decimal * capital).min(max_notional_per_symbol);
    let qty = (notional / price).trunc().to_string().parse::<i64>().unwrap_or(0);

    if qty <= 0 {
        return Err(SkipReason::ZeroQty);
    }

    let side = if target_weight > 0.0 { OrderSide::Buy } else { OrderSide::Sell };
    Ok(Sized { qty, side, price })
}
