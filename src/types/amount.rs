//! Token amounts with safe arithmetic.
//!
//! One `TokenAmount` type covers every asset the engine touches (staking
//! assets, the reward asset). Uses 18 decimal places for precision.
//! All arithmetic operations are checked to prevent overflow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Sub};

/// Number of decimal places (10^18 base units = 1 whole token)
pub const DECIMALS: u32 = 18;

/// One whole token in base units
pub const ONE_TOKEN: u128 = 10_u128.pow(DECIMALS);

/// Denominator for basis-point rates (10_000 bps = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// A token amount in the smallest unit (similar to wei for ETH).
///
/// Internally stores value as u128 to support large amounts without overflow.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from raw base units
    #[must_use]
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Create from whole tokens (will be multiplied by 10^18)
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole as u128 * ONE_TOKEN)
    }

    /// Create from a decimal string (e.g., `"1.5"`)
    ///
    /// # Errors
    /// Returns error if the string format is invalid
    pub fn from_decimal_str(s: &str) -> Result<Self, AmountError> {
        let parts: Vec<&str> = s.split('.').collect();

        if parts.len() > 2 {
            return Err(AmountError::InvalidFormat);
        }

        let whole: u128 = parts[0].parse().map_err(|_| AmountError::InvalidFormat)?;

        let fractional = if parts.len() == 2 {
            let frac_str = parts[1];
            if frac_str.len() > DECIMALS as usize {
                return Err(AmountError::TooManyDecimals);
            }

            // Pad with zeros to get the right precision
            let padded = format!("{:0<width$}", frac_str, width = DECIMALS as usize);
            padded[..DECIMALS as usize]
                .parse::<u128>()
                .map_err(|_| AmountError::InvalidFormat)?
        } else {
            0
        };

        let total = whole
            .checked_mul(ONE_TOKEN)
            .and_then(|w| w.checked_add(fractional))
            .ok_or(AmountError::Overflow)?;

        Ok(Self(total))
    }

    /// Get the raw base unit value
    #[must_use]
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Get the whole-token part (truncated)
    #[must_use]
    pub const fn whole(&self) -> u64 {
        (self.0 / ONE_TOKEN) as u64
    }

    /// Convert to a decimal string representation
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        let whole = self.0 / ONE_TOKEN;
        let frac = self.0 % ONE_TOKEN;

        if frac == 0 {
            format!("{whole}.0")
        } else {
            let frac_str = format!("{frac:018}");
            let trimmed = frac_str.trim_end_matches('0');
            format!("{whole}.{trimmed}")
        }
    }

    /// Checked addition
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Checked multiplication
    #[must_use]
    pub fn checked_mul(self, factor: u128) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// Checked division
    #[must_use]
    pub fn checked_div(self, divisor: u128) -> Option<Self> {
        if divisor == 0 {
            None
        } else {
            Some(Self(self.0 / divisor))
        }
    }

    /// Take a basis-point cut (1 bps = 0.01%), truncating toward zero.
    ///
    /// Exact for any amount: the value is split at the bps denominator so
    /// the intermediate products stay inside u128.
    #[must_use]
    pub fn checked_bps(self, bps: u16) -> Option<Self> {
        let whole = (self.0 / BPS_DENOMINATOR).checked_mul(u128::from(bps))?;
        let part = (self.0 % BPS_DENOMINATOR) * u128::from(bps) / BPS_DENOMINATOR;
        whole.checked_add(part).map(Self)
    }

    /// Saturating addition
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction (floors at 0)
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Check if amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({})", self.to_decimal_string())
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

impl Add for TokenAmount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(other).expect("amount overflow")
    }
}

impl Sub for TokenAmount {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.checked_sub(other).expect("amount underflow")
    }
}

impl Mul<u128> for TokenAmount {
    type Output = Self;

    fn mul(self, factor: u128) -> Self {
        self.checked_mul(factor).expect("amount overflow")
    }
}

impl Div<u128> for TokenAmount {
    type Output = Self;

    fn div(self, divisor: u128) -> Self {
        self.checked_div(divisor).expect("division by zero")
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

/// Amount parsing/arithmetic errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Invalid number format
    #[error("invalid amount format")]
    InvalidFormat,
    /// Too many decimal places
    #[error("too many decimal places (max {DECIMALS})")]
    TooManyDecimals,
    /// Arithmetic overflow
    #[error("amount overflow")]
    Overflow,
}
