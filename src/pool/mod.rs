//! Reward pools and the registry that owns them.
//!
//! A pool pairs a staking asset with a slice of the global emission rate
//! (its allocation weight) over a bounded reward window. The registry owns
//! the pool table and the weight sum; accrual state inside each pool is
//! advanced by the engine on every touching call.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Timestamp, TokenAmount};

/// Dense pool identifier (index into the pool table)
pub type PoolId = u32;

/// Derived lifecycle stage of a pool.
///
/// Never stored; computed from the reward window and the current stake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    /// Reward window has not opened yet
    Pending,
    /// Inside the reward window
    Active,
    /// Window elapsed, stake remains
    Ended,
    /// Window elapsed and all stake withdrawn
    Retired,
}

/// A reward pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Pool identifier
    pub id: PoolId,
    /// Asset participants stake into this pool
    pub staking_asset: Address,
    /// Relative share of the global emission rate
    pub alloc_weight: u64,
    /// Reward window start (inclusive)
    pub start_time: Timestamp,
    /// Reward window end (inclusive)
    pub end_time: Timestamp,
    /// Cumulative reward per staked unit, scaled by `PRECISION`.
    /// Monotonically non-decreasing.
    pub acc_reward_per_share: u128,
    /// Accrual has been priced up to this instant
    pub last_accrual_time: Timestamp,
    /// Total currently staked across all positions
    pub total_staked: TokenAmount,
    /// Gross rewards ever paid out through this pool
    pub lifetime_rewards_paid: TokenAmount,
}

impl Pool {
    /// Derive the pool's lifecycle stage as of `now`
    #[must_use]
    pub fn status(&self, now: Timestamp) -> PoolStatus {
        if now < self.start_time {
            PoolStatus::Pending
        } else if now <= self.end_time {
            PoolStatus::Active
        } else if self.total_staked.is_zero() {
            PoolStatus::Retired
        } else {
            PoolStatus::Ended
        }
    }

    /// Whether `now` falls inside the reward window
    #[must_use]
    pub const fn in_window(&self, now: Timestamp) -> bool {
        self.start_time <= now && now <= self.end_time
    }
}

/// Owns the pool table and the allocation-weight sum.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PoolRegistry {
    /// Pool table, indexed by `PoolId`
    pools: Vec<Pool>,
    /// Sum of every pool's allocation weight
    total_alloc_weight: u64,
}

impl PoolRegistry {
    /// Create an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: Vec::new(),
            total_alloc_weight: 0,
        }
    }

    /// Create a pool and return its id.
    ///
    /// The new pool starts with a zeroed accumulator, no stake, and its
    /// accrual clock set to the window start. The allocation-weight sum is
    /// updated in the same step.
    ///
    /// # Errors
    /// Returns [`PoolError::InvalidWeight`] for a zero weight,
    /// [`PoolError::InvalidWindow`] unless `end > start > 0`, and
    /// [`PoolError::WeightOverflow`] when the weight sum would not fit.
    pub fn create_pool(
        &mut self,
        staking_asset: Address,
        alloc_weight: u64,
        start_time: Timestamp,
        end_time: Timestamp,
    ) -> Result<PoolId, PoolError> {
        if alloc_weight == 0 {
            return Err(PoolError::InvalidWeight);
        }
        if start_time == 0 || end_time <= start_time {
            return Err(PoolError::InvalidWindow {
                start: start_time,
                end: end_time,
            });
        }

        let id = u32::try_from(self.pools.len()).map_err(|_| PoolError::TableFull)?;
        let new_total = self
            .total_alloc_weight
            .checked_add(alloc_weight)
            .ok_or(PoolError::WeightOverflow)?;

        self.pools.push(Pool {
            id,
            staking_asset,
            alloc_weight,
            start_time,
            end_time,
            acc_reward_per_share: 0,
            last_accrual_time: start_time,
            total_staked: TokenAmount::ZERO,
            lifetime_rewards_paid: TokenAmount::ZERO,
        });
        self.total_alloc_weight = new_total;

        Ok(id)
    }

    /// Swap a pool's allocation weight, keeping the weight sum exact.
    ///
    /// The caller must have settled accrual first; elapsed periods are
    /// priced at the old weights.
    ///
    /// # Errors
    /// Returns [`PoolError::NotFound`] for an unknown id,
    /// [`PoolError::InvalidWeight`] for a zero weight, and
    /// [`PoolError::WeightOverflow`] when the weight sum would not fit.
    pub fn set_alloc_weight(
        &mut self,
        pool_id: PoolId,
        new_weight: u64,
    ) -> Result<u64, PoolError> {
        if new_weight == 0 {
            return Err(PoolError::InvalidWeight);
        }

        let old_weight = self.get(pool_id)?.alloc_weight;
        let new_total = self
            .total_alloc_weight
            .checked_sub(old_weight)
            .and_then(|sum| sum.checked_add(new_weight))
            .ok_or(PoolError::WeightOverflow)?;

        self.get_mut(pool_id)?.alloc_weight = new_weight;
        self.total_alloc_weight = new_total;

        Ok(old_weight)
    }

    /// Get a pool by id
    ///
    /// # Errors
    /// Returns [`PoolError::NotFound`] for an unknown id
    pub fn get(&self, pool_id: PoolId) -> Result<&Pool, PoolError> {
        self.pools
            .get(pool_id as usize)
            .ok_or(PoolError::NotFound { pool_id })
    }

    /// Get a pool by id, mutably
    ///
    /// # Errors
    /// Returns [`PoolError::NotFound`] for an unknown id
    pub fn get_mut(&mut self, pool_id: PoolId) -> Result<&mut Pool, PoolError> {
        self.pools
            .get_mut(pool_id as usize)
            .ok_or(PoolError::NotFound { pool_id })
    }

    /// All pools, ordered by id
    #[must_use]
    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub(crate) fn pools_mut(&mut self) -> &mut [Pool] {
        &mut self.pools
    }

    /// Number of pools ever created
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool exists yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Sum of all pool allocation weights
    #[must_use]
    pub const fn total_alloc_weight(&self) -> u64 {
        self.total_alloc_weight
    }

    /// Total staked across every pool
    #[must_use]
    pub fn total_staked(&self) -> TokenAmount {
        self.pools.iter().map(|p| p.total_staked).sum()
    }
}

/// Pool registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Unknown pool id
    #[error("pool {pool_id} not found")]
    NotFound {
        /// The id that was requested
        pool_id: PoolId,
    },
    /// Allocation weight must be positive
    #[error("allocation weight must be positive")]
    InvalidWeight,
    /// Reward window must satisfy `end > start > 0`
    #[error("invalid reward window: start {start}, end {end}")]
    InvalidWindow {
        /// Requested window start
        start: Timestamp,
        /// Requested window end
        end: Timestamp,
    },
    /// Allocation-weight sum would exceed `u64::MAX`
    #[error("allocation weight sum overflow")]
    WeightOverflow,
    /// Pool id space exhausted
    #[error("pool table full")]
    TableFull,
}
