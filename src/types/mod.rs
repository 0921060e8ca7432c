//! Core data types for the `lodepool` engine.

mod address;
mod amount;

pub use address::{Address, AddressError, ADDRESS_LEN};
pub use amount::{AmountError, TokenAmount, BPS_DENOMINATOR, DECIMALS, ONE_TOKEN};

use chrono::Utc;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Seconds in a (non-leap) year, used to annualize per-second rates
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Get the current wall-clock timestamp in seconds.
///
/// The engine itself never calls this: every operation takes `now` as an
/// argument. It exists for callers wiring the engine to real time.
#[must_use]
pub fn now_secs() -> Timestamp {
    let secs = Utc::now().timestamp();
    if secs <= 0 {
        0
    } else {
        secs as Timestamp
    }
}
