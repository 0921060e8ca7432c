//! # Lodepool
//!
//! A multi-pool staking reward-accrual engine with exact integer
//! accounting.
//!
//! ## Architecture
//!
//! - **Pools** pair a staking asset with a slice of the global emission
//!   rate over a bounded reward window
//! - **Positions** track per-(participant, pool) principal, reward debt,
//!   and settled-but-unclaimed reward
//! - **Lazy accrual** prices elapsed time into a reward-per-share
//!   accumulator on whichever call next touches a pool
//! - **Supply guard** commits emission against an immutable cap before
//!   anyone becomes entitled to it, and re-validates at payout
//!
//! ## Execution Model
//!
//! Fully serialized, single writer: every operation is a function of
//! (state, inputs, now), commits atomically or leaves no trace, and
//! performs external asset transfers as its last step.

#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms
)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod accrual;
pub mod engine;
pub mod math;
pub mod pool;
pub mod position;
pub mod query;
pub mod snapshot;
pub mod supply;
pub mod token;
pub mod types;

pub use engine::{
    ClaimReceipt, EmergencyWithdrawReceipt, EngineConfig, EngineError, EngineEvent, FeeApplies,
    MiningEngine, StakeReceipt, WithdrawReceipt,
};
pub use math::{mul_div, MathError, PRECISION};
pub use pool::{Pool, PoolError, PoolId, PoolRegistry, PoolStatus};
pub use position::{Position, PositionLedger};
pub use query::{LeaderboardEntry, LeaderboardKey, ParticipantStats, PoolStats, ProgramStats};
pub use supply::{SupplyError, SupplyGuard};
pub use token::{AssetTransfer, InMemoryBank, TransferError, TransferIntent};
pub use types::{now_secs, Address, Timestamp, TokenAmount};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
