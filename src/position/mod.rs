//! Per-participant stake records.
//!
//! A position is keyed by (participant, pool). It carries the staked
//! principal, the reward debt that anchors lazy accrual, and the settled
//! but unclaimed reward balance. Records are retained after they are
//! zeroed so audit history and leaderboard tie-breaks stay stable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pool::PoolId;
use crate::types::{Address, Timestamp, TokenAmount};

/// A participant's stake in one pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Owning participant
    pub participant: Address,
    /// Pool this stake lives in
    pub pool_id: PoolId,
    /// Currently staked principal
    pub staked: TokenAmount,
    /// Accumulator value already priced into this stake
    pub reward_debt: TokenAmount,
    /// Settled reward not yet paid out
    pub unclaimed: TokenAmount,
    /// Gross rewards ever paid on behalf of this position
    pub lifetime_rewards: TokenAmount,
    /// Creation order across all positions, for deterministic tie-breaks
    pub created_seq: u64,
    /// When the position was first opened
    pub created_at: Timestamp,
    /// Last stake/withdraw/claim touching this position
    pub last_action_at: Timestamp,
}

impl Position {
    /// Whether any principal is currently staked
    #[must_use]
    pub const fn is_staked(&self) -> bool {
        !self.staked.is_zero()
    }
}

/// Owns every position record, keyed by (participant, pool).
#[derive(Clone, Debug, Default, Serialize)]
pub struct PositionLedger {
    positions: HashMap<(Address, PoolId), Position>,
    /// Positions ever created; next creation sequence number
    created_count: u64,
}

impl PositionLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for (participant, pool), creating a zeroed one on
    /// first contact.
    pub fn get_or_create(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        now: Timestamp,
    ) -> &mut Position {
        let created_count = &mut self.created_count;
        self.positions
            .entry((participant, pool_id))
            .or_insert_with(|| {
                let seq = *created_count;
                *created_count += 1;
                Position {
                    participant,
                    pool_id,
                    staked: TokenAmount::ZERO,
                    reward_debt: TokenAmount::ZERO,
                    unclaimed: TokenAmount::ZERO,
                    lifetime_rewards: TokenAmount::ZERO,
                    created_seq: seq,
                    created_at: now,
                    last_action_at: now,
                }
            })
    }

    /// Get a position, if it exists
    #[must_use]
    pub fn get(&self, participant: &Address, pool_id: PoolId) -> Option<&Position> {
        self.positions.get(&(*participant, pool_id))
    }

    /// Get a position mutably, if it exists
    pub fn get_mut(&mut self, participant: &Address, pool_id: PoolId) -> Option<&mut Position> {
        self.positions.get_mut(&(*participant, pool_id))
    }

    /// All positions, in unspecified order
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// All positions in one pool
    pub fn positions_for_pool(&self, pool_id: PoolId) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(move |p| p.pool_id == pool_id)
    }

    /// All positions held by one participant
    pub fn positions_for(&self, participant: &Address) -> impl Iterator<Item = &Position> + '_ {
        let participant = *participant;
        self.positions
            .values()
            .filter(move |p| p.participant == participant)
    }

    /// Number of position records ever created
    #[must_use]
    pub const fn created_count(&self) -> u64 {
        self.created_count
    }

    /// Sum of all staked principal in one pool
    #[must_use]
    pub fn pool_stake_sum(&self, pool_id: PoolId) -> TokenAmount {
        self.positions_for_pool(pool_id).map(|p| p.staked).sum()
    }

    /// Sum of settled-but-unclaimed reward across every position
    #[must_use]
    pub fn total_unclaimed(&self) -> TokenAmount {
        self.positions.values().map(|p| p.unclaimed).sum()
    }

    /// Put back the pre-operation image of a record after a failed
    /// operation. `before == None` removes a record that did not exist.
    pub(crate) fn restore(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        before: Option<Position>,
        created_count: u64,
    ) {
        match before {
            Some(position) => {
                self.positions.insert((participant, pool_id), position);
            }
            None => {
                self.positions.remove(&(participant, pool_id));
            }
        }
        self.created_count = created_count;
    }
}
