//! Deterministic order identity.
//!
//! `client_order_id = truncate(hash(symbol | side | qty | limit_price |
//! strategy_id | trade_date))` (spec §4.2). Reuses the teacher's
//! `hmac`/`sha2` pairing from `infrastructure::binance::execution`'s
//! request-signing helper, keyed here on a fixed domain separator instead of
//! a broker secret — the point isn't authentication, it's a stable digest
//! of the request tuple.

use chrono::NaiveDate;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const DOMAIN_SEPARATOR: &[u8] = b"tradectl.client_order_id.v1";
const DIGEST_PREFIX_LEN: usize = 20;

pub fn compute(
    symbol: &str,
    side: &str,
    qty: i64,
    limit_price: Option<Decimal>,
    strategy_id: Option<&str>,
    trade_date: NaiveDate,
) -> String {
    let canonical = format!(
        "{}|{}|{}|{}|{}|{}",
        symbol,
        side,
        qty,
        limit_price.map(|p| p.to_string()).unwrap_or_default(),
        strategy_id.unwrap_or(""),
        trade_date,
    );

    let mut mac =
        HmacSha256::new_from_slice(DOMAIN_SEPARATOR).expect("HMAC accepts a key of any size");
    mac.update(canonical.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    digest[..DIGEST_PREFIX_LEN].to_string()
}

/// Child order id for a TWAP slice: `parent_id + slice_index`, zero-padded
/// to three digits so slices sort lexicographically.
pub fn slice_id(parent_id: &str, slice_index: u32) -> String {
    format!("{parent_id}-{slice_index:03}")
}

/// Checks whether `id` has the shape `compute()`/`slice_id()` produce: a
/// `DIGEST_PREFIX_LEN`-char lowercase hex digest, optionally followed by a
/// `-NNN` TWAP slice suffix. Reconciliation can't recompute the HMAC itself
/// (the broker doesn't echo back `strategy_id`/`trade_date`), so this is the
/// scheme check spec §4.5 step 4 uses to tell a self-submitted order that
/// simply fell out of the ledger from a truly foreign one.
pub fn matches_deterministic_scheme(id: &str) -> bool {
    let digest = match id.split_once('-') {
        Some((prefix, suffix)) => {
            if suffix.len() != 3 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                return false;
            }
            prefix
        }
        None => id,
    };
    digest.len() == DIGEST_PREFIX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}
