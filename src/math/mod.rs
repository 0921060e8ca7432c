//! Scaled-integer arithmetic primitives.
//!
//! Everything the engine computes flows through `mul_div`: reward shares,
//! accumulator deltas, pending entitlements, fee cuts. The intermediate
//! product is carried at full 256-bit width so `a * b / denom` is exact
//! whenever the final quotient fits in u128; division truncates toward
//! zero, which keeps every entitlement at or below its continuous-time
//! value (rounding residue stays in the pool, it is never paid out twice).

/// Scale factor for the cumulative reward-per-share accumulator.
///
/// A pool's accumulator holds `reward * PRECISION / total_staked` sums;
/// a position's pending reward is `staked * acc / PRECISION`. With 10^12
/// here and 10^18-decimal amounts, intermediates stay far below the
/// 256-bit multiply width for any realistic magnitude.
pub const PRECISION: u128 = 1_000_000_000_000;

/// Fixed-point arithmetic errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    /// The true quotient does not fit in 128 bits
    #[error("arithmetic overflow")]
    Overflow,
    /// Zero denominator
    #[error("division by zero")]
    DivisionByZero,
}

/// Compute `a * b / denom` with a 256-bit intermediate product.
///
/// Truncates toward zero. Exact for every input whose true quotient fits
/// in u128.
///
/// # Errors
/// Returns [`MathError::Overflow`] if the quotient exceeds `u128::MAX`,
/// [`MathError::DivisionByZero`] if `denom == 0`.
pub fn mul_div(a: u128, b: u128, denom: u128) -> Result<u128, MathError> {
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }

    let (hi, lo) = mul_wide(a, b);

    if hi == 0 {
        return Ok(lo / denom);
    }

    // Quotient fits in 128 bits exactly when the high limb is below the
    // divisor.
    if hi >= denom {
        return Err(MathError::Overflow);
    }

    Ok(div_wide(hi, lo, denom))
}

/// Full 128x128 -> 256 bit multiply, returned as (high, low) limbs.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = (1 << 64) - 1;

    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    // Middle column: ll's upper half plus the low halves of the cross
    // terms. At most 3 * (2^64 - 1), so it cannot overflow u128.
    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);

    let lo = (mid << 64) | (ll & MASK);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);

    (hi, lo)
}

/// Divide the 256-bit value `(hi, lo)` by `d`, truncating toward zero.
///
/// Caller guarantees `0 < d` and `hi < d`, so the quotient fits in u128.
fn div_wide(hi: u128, lo: u128, d: u128) -> u128 {
    debug_assert!(d > 0 && hi < d);

    // Shift-subtract long division, one bit of `lo` per step. The running
    // remainder is `carry * 2^128 + rem`; whenever it reaches `d` the
    // quotient gains a bit and the remainder drops below `d` again.
    let mut rem = hi;
    let mut quot: u128 = 0;

    for i in (0..128).rev() {
        let bit = (lo >> i) & 1;
        let carry = rem >> 127;
        rem = (rem << 1) | bit;

        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1 << i;
        }
    }

    quot
}
