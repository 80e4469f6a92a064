//! Pre-trade gate checks (spec §4.2 steps 4-6): request validation,
//! reduce-only enforcement, position limits, and fat-finger bands.
//! Grounded on `domain::risk::filters::validator_trait`'s
//! `RiskValidator`/`ValidationResult` shape, flattened here to plain
//! functions returning `AppError` since each check is a single ordered
//! step in one pipeline rather than a pluggable validator registry.

use crate::domain::errors::AppError;
use crate::domain::order::{OrderRequest, OrderSide, OrderType};
use rust_decimal::Decimal;

/// Request-shape validation (spec §8 boundary behaviors): `qty == 0` and a
/// missing `limit_price` on a limit order are both validation errors, not
/// risk violations — they're rejected before any gate or reservation runs.
pub fn validate_request(request: &OrderRequest) -> Result<(), AppError> {
    if request.qty <= 0 {
        return Err(AppError::Validation("qty must be positive".into()));
    }
    if request.order_type == OrderType::Limit && request.limit_price.is_none() {
        return Err(AppError::Validation(
            "limit_price is required when order_type=limit".into(),
        ));
    }
    if request.symbol.trim().is_empty() {
        return Err(AppError::Validation("symbol must not be empty".into()));
    }
    Ok(())
}

/// Position limit check (spec §4.2 step 5): rejects if the symbol's signed
/// position plus this order's signed reservation delta would exceed the
/// symbol's absolute position limit.
pub fn position_limit_check(
    current_position: i64,
    reserved_after: i64,
    limit: i64,
) -> Result<(), AppError> {
    let projected = current_position + reserved_after;
    if projected.abs() > limit {
        return Err(AppError::risk_violation(
            "position_limit",
            format!("projected position {projected} exceeds limit {limit}"),
        ));
    }
    Ok(())
}

/// Reduce-only enforcement for the `reduce_only` reconciliation gate state
/// (spec §4.2 step 4): the order must strictly shrink the symbol's absolute
/// position.
pub fn reduce_only_check(current_position: i64, side: OrderSide, qty: i64) -> Result<(), AppError> {
    let signed = match side {
        OrderSide::Buy => qty,
        OrderSide::Sell => -qty,
    };
    let projected = current_position + signed;
    if projected.abs() >= current_position.abs() {
        return Err(AppError::risk_violation(
            "reduce_only",
            "reconciliation gate is reduce-only; order does not strictly reduce the position",
        ));
    }
    Ok(())
}

/// Fat-finger notional/quantity bands (spec §4.2 step 6): warns past
/// `warn_notional`, rejects past `reject_notional` or `reject_qty`. `price`
/// is the order's limit price if present, else a market mark; `None` skips
/// the notional bands (qty band still applies) rather than blocking a
/// market order the gateway has no mark for.
pub fn fat_finger_check(
    qty: i64,
    price: Option<Decimal>,
    warn_notional: Decimal,
    reject_notional: Decimal,
    reject_qty: i64,
) -> Result<bool, AppError> {
    if qty.abs() > reject_qty {
        return Err(AppError::risk_violation(
            "fat_finger_qty",
            format!("qty {qty} exceeds reject threshold {reject_qty}"),
        ));
    }

    let Some(price) = price else {
        return Ok(false);
    };
    let notional = price * Decimal::from(qty.abs());
    if notional > reject_notional {
        return Err(AppError::risk_violation(
            "fat_finger_notional",
            format!("notional {notional} exceeds reject threshold {reject_notional}"),
        ));
    }
    Ok(notional > warn_notional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderType;
    use rust_decimal_macros::dec;

    fn request(qty: i64, order_type: OrderType, limit_price: Option<Decimal>) -> OrderRequest {
        OrderRequest {
            symbol: "AAPL".into(),
            side: OrderSide::Buy,
            qty,
            order_type,
            limit_price,
            time_in_force: None,
            strategy_id: None,
        }
    }

    #[test]
    fn zero_qty_is_a_validation_error() {
        let err = validate_request(&request(0, OrderType::Market, None)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn limit_order_without_limit_price_is_a_validation_error() {
        let err = validate_request(&request(10, OrderType::Limit, None)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn market_order_without_limit_price_is_valid() {
        assert!(validate_request(&request(10, OrderType::Market, None)).is_ok());
    }

    #[test]
    fn position_limit_rejects_when_projection_exceeds_limit() {
        assert!(position_limit_check(9_000, 500, 10_000).is_ok());
        let err = position_limit_check(9_900, 500, 10_000).unwrap_err();
        assert!(matches!(err, AppError::RiskViolation { .. }));
    }

    #[test]
    fn reduce_only_rejects_orders_that_grow_the_position() {
        assert!(reduce_only_check(1000, OrderSide::Sell, 200).is_ok());
        let err = reduce_only_check(1000, OrderSide::Buy, 200).unwrap_err();
        assert!(matches!(err, AppError::RiskViolation { .. }));
    }

    #[test]
    fn reduce_only_allows_fully_closing_the_position() {
        assert!(reduce_only_check(200, OrderSide::Sell, 200).is_ok());
    }

    #[test]
    fn fat_finger_rejects_past_qty_threshold() {
        let err = fat_finger_check(60_000, None, dec!(25000), dec!(100000), 50_000).unwrap_err();
        assert!(matches!(err, AppError::RiskViolation { .. }));
    }

    #[test]
    fn fat_finger_rejects_past_notional_threshold() {
        let err = fat_finger_check(1000, Some(dec!(200)), dec!(25000), dec!(100000), 50_000).unwrap_err();
        assert!(matches!(err, AppError::RiskViolation { .. }));
    }

    #[test]
    fn fat_finger_warns_without_rejecting_in_the_warn_band() {
        let warned = fat_finger_check(200, Some(dec!(150)), dec!(25000), dec!(100000), 50_000).unwrap();
        assert!(warned);
    }

    #[test]
    fn fat_finger_clears_below_warn_band() {
        let warned = fat_finger_check(10, Some(dec!(150)), dec!(25000), dec!(100000), 50_000).unwrap();
        assert!(!warned);
    }
}
