//! Opaque 20-byte identities.
//!
//! Participants, staking assets, the reward asset, the treasury, and the
//! engine's own custody account are all addressed the same way. The engine
//! never interprets the bytes; authorization mechanics live upstream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of an address in bytes
pub const ADDRESS_LEN: usize = 20;

/// An opaque account/asset identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address
    pub const ZERO: Self = Self([0u8; ADDRESS_LEN]);

    /// Create from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Parse from a hex string (with or without `0x` prefix)
    ///
    /// # Errors
    /// Returns error if the string is not exactly 20 bytes of hex
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| AddressError::InvalidHex)?;

        let array: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength)?;

        Ok(Self(array))
    }

    /// Hex string form with `0x` prefix
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Address parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Not valid hex
    #[error("invalid hex encoding")]
    InvalidHex,
    /// Wrong number of bytes
    #[error("address must be {ADDRESS_LEN} bytes")]
    InvalidLength,
}
