//! Typed events appended by successful operations.

use serde::Serialize;

use crate::pool::PoolId;
use crate::types::{Address, Timestamp, TokenAmount};

/// One entry in the engine's event log.
///
/// Events are appended only by operations that fully commit; a failed
/// operation leaves the log untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum EngineEvent {
    /// A pool was created
    PoolCreated {
        /// New pool id
        pool_id: PoolId,
        /// Asset staked into the pool
        staking_asset: Address,
        /// Allocation weight
        alloc_weight: u64,
        /// Reward window start
        start_time: Timestamp,
        /// Reward window end
        end_time: Timestamp,
        /// Operation time
        at: Timestamp,
    },
    /// A participant's stake in a pool went from zero to positive
    PositionOpened {
        /// Participant
        participant: Address,
        /// Pool
        pool_id: PoolId,
        /// Operation time
        at: Timestamp,
    },
    /// Principal was staked
    Staked {
        /// Participant
        participant: Address,
        /// Pool
        pool_id: PoolId,
        /// Principal added
        amount: TokenAmount,
        /// Operation time
        at: Timestamp,
    },
    /// Principal was withdrawn
    Withdrawn {
        /// Participant
        participant: Address,
        /// Pool
        pool_id: PoolId,
        /// Principal removed (gross)
        amount: TokenAmount,
        /// Principal fee routed to the treasury
        fee: TokenAmount,
        /// Operation time
        at: Timestamp,
    },
    /// Settled reward left the engine
    RewardPaid {
        /// Participant
        participant: Address,
        /// Pool
        pool_id: PoolId,
        /// Entitlement before the fee
        gross: TokenAmount,
        /// Fee routed to the treasury
        fee: TokenAmount,
        /// Amount the participant received
        net: TokenAmount,
        /// Operation time
        at: Timestamp,
    },
    /// Settled reward was forfeited by a forced exit
    RewardForfeited {
        /// Participant
        participant: Address,
        /// Pool
        pool_id: PoolId,
        /// Unclaimed balance discarded
        amount: TokenAmount,
        /// Operation time
        at: Timestamp,
    },
    /// Principal was returned by a forced exit
    EmergencyWithdrawn {
        /// Participant
        participant: Address,
        /// Pool
        pool_id: PoolId,
        /// Principal returned
        principal: TokenAmount,
        /// Operation time
        at: Timestamp,
    },
    /// A pool's allocation weight changed
    AllocWeightUpdated {
        /// Pool
        pool_id: PoolId,
        /// Previous weight
        old_weight: u64,
        /// New weight
        new_weight: u64,
        /// Operation time
        at: Timestamp,
    },
    /// The global emission rate changed
    EmissionRateUpdated {
        /// Previous rate (units/second)
        old_rate: TokenAmount,
        /// New rate (units/second)
        new_rate: TokenAmount,
        /// Operation time
        at: Timestamp,
    },
    /// The fee rate changed
    FeeUpdated {
        /// Previous rate in basis points
        old_bps: u16,
        /// New rate in basis points
        new_bps: u16,
        /// Operation time
        at: Timestamp,
    },
    /// The treasury destination changed
    TreasuryUpdated {
        /// Previous treasury
        old_treasury: Address,
        /// New treasury
        new_treasury: Address,
        /// Operation time
        at: Timestamp,
    },
    /// Mutating operations (except emergency withdraw) were suspended
    Paused {
        /// Operation time
        at: Timestamp,
    },
    /// Normal operation resumed
    Unpaused {
        /// Operation time
        at: Timestamp,
    },
}
