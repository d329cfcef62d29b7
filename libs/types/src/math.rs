//! Fixed-point price/amount/fee arithmetic
//!
//! All price-scaled operations use a single constant `PRICE_CONSTANT`:
//! a price is the number of price-asset units per amount-asset unit,
//! scaled by 10^8. Intermediate products are computed in `u128` and the
//! result is checked back into `u64`; every operation rounds the same way
//! on every node, so no floating point appears anywhere in this module.

/// Price scale: 10^8 price units per amount unit.
pub const PRICE_CONSTANT: u64 = 100_000_000;

/// Upper bound on order amounts (exclusive).
pub const MAX_AMOUNT: u64 = 1_000_000_000_000_000_000;

const P: u128 = PRICE_CONSTANT as u128;

fn div_ceil(a: u128, b: u128) -> u128 {
    (a + b - 1) / b
}

/// Price-asset quantity settled by `amount` at `price`, rounded down.
///
/// `floor(amount · price / PRICE_CONSTANT)`. Returns `None` if the result
/// does not fit a `u64`.
pub fn amount_of_price_asset(amount: u64, price: u64) -> Option<u64> {
    let product = amount as u128 * price as u128;
    u64::try_from(product / P).ok()
}

/// Smallest amount-asset quantity that settles at least one price-asset
/// unit at `price`: `ceil(PRICE_CONSTANT / price)`.
pub fn min_amount_of_amount_asset(price: u64) -> Option<u64> {
    if price == 0 {
        return None;
    }
    // ceil(P / price) <= P, always fits u64
    Some(div_ceil(P, price as u128) as u64)
}

/// Round `amount` up to the next value that settles an integer
/// price-asset quantity at `price`.
///
/// `ceil(floor(amount · price / PRICE_CONSTANT) · PRICE_CONSTANT / price)`.
/// Residual dust below this value can never settle and must not rest on
/// the book.
pub fn corrected_amount(amount: u64, price: u64) -> Option<u64> {
    if price == 0 {
        return None;
    }
    let settled = amount as u128 * price as u128 / P;
    let corrected = div_ceil(settled * P, price as u128);
    u64::try_from(corrected).ok()
}

/// Prorate `total_fee` for a partial execution of `partial_amount` out of
/// `total_amount`, truncating toward zero.
///
/// Truncation (never round-half-up) keeps the proration identical on
/// every node.
pub fn partial_fee(total_fee: u64, total_amount: u64, partial_amount: u64) -> Option<u64> {
    if total_amount == 0 {
        return None;
    }
    let scaled = total_fee as u128 * partial_amount as u128;
    u64::try_from(scaled / total_amount as u128).ok()
}
