//! Read-only aggregation for external analytics tooling.
//!
//! Every time-dependent figure first runs the accrual projection, so the
//! numbers reflect accrual as of the query instant rather than the last
//! time someone happened to transact. Nothing here mutates stored state.

use serde::Serialize;

use crate::accrual;
use crate::engine::{EngineError, MiningEngine};
use crate::math::MathError;
use crate::pool::{Pool, PoolId, PoolStatus};
use crate::token::AssetTransfer;
use crate::types::{Address, Timestamp, TokenAmount, BPS_DENOMINATOR, SECONDS_PER_YEAR};

/// Leaderboard ranking key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LeaderboardKey {
    /// Rank by currently staked principal
    StakedAmount,
    /// Rank by gross rewards ever paid
    LifetimeRewards,
}

/// One leaderboard row: a participant aggregated across pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// Participant
    pub participant: Address,
    /// Total currently staked across pools
    pub staked: TokenAmount,
    /// Gross rewards ever paid across pools
    pub lifetime_rewards: TokenAmount,
}

/// Program-wide statistics bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgramStats {
    /// Total staked across every pool
    pub total_staked: TokenAmount,
    /// Pools ever created
    pub pool_count: usize,
    /// Participants that ever opened a position
    pub total_participants: usize,
    /// Participants with a positive stake right now
    pub active_participants: usize,
    /// Rewards ever paid out of the engine
    pub total_rewards_distributed: TokenAmount,
    /// Cap remainder not yet paid out
    pub rewards_remaining: TokenAmount,
    /// Cap remainder no settlement has drawn yet
    pub uncommitted_budget: TokenAmount,
    /// Mean stake per active participant
    pub average_stake: TokenAmount,
    /// Mean of per-pool APR proxies, in basis points
    pub average_apr_bps: u64,
    /// State version as of this query
    pub state_version: u64,
}

/// Per-pool statistics bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Pool id
    pub pool_id: PoolId,
    /// Asset staked into the pool
    pub staking_asset: Address,
    /// Allocation weight
    pub alloc_weight: u64,
    /// Reward window start
    pub start_time: Timestamp,
    /// Reward window end
    pub end_time: Timestamp,
    /// Derived lifecycle stage as of the query instant
    pub status: PoolStatus,
    /// Total currently staked
    pub total_staked: TokenAmount,
    /// Accumulator value settlement would commit as of the query instant
    pub projected_acc_reward_per_share: u128,
    /// Accrued-but-unclaimed reward across the pool's positions,
    /// projected to the query instant
    pub projected_unclaimed: TokenAmount,
    /// Gross rewards ever paid through this pool
    pub lifetime_rewards_paid: TokenAmount,
    /// APR proxy in basis points; zero when idle or outside the window
    pub apr_bps: u64,
}

/// Per-participant statistics bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParticipantStats {
    /// Participant
    pub participant: Address,
    /// Position records held (including zeroed ones)
    pub position_count: usize,
    /// Total currently staked across pools
    pub total_staked: TokenAmount,
    /// Settled plus projected-pending reward across pools
    pub projected_unclaimed: TokenAmount,
    /// Gross rewards ever paid across pools
    pub lifetime_rewards: TokenAmount,
}

impl<T: AssetTransfer> MiningEngine<T> {
    /// Program-wide statistics as of `now`.
    #[must_use]
    pub fn program_stats(&self, now: Timestamp) -> ProgramStats {
        let total_staked = self.registry.total_staked();

        let mut participants: Vec<Address> =
            self.ledger.positions().map(|p| p.participant).collect();
        participants.sort_unstable();
        participants.dedup();
        let total_participants = participants.len();

        let mut active: Vec<Address> = self
            .ledger
            .positions()
            .filter(|p| p.is_staked())
            .map(|p| p.participant)
            .collect();
        active.sort_unstable();
        active.dedup();
        let active_participants = active.len();

        let average_stake = if active_participants == 0 {
            TokenAmount::ZERO
        } else {
            total_staked / active_participants as u128
        };

        let pool_count = self.registry.len();
        // Each term fits u64, so the mean does too; sum in u128 to keep
        // many saturated pools from overflowing the accumulator
        let apr_sum: u128 = self
            .registry
            .pools()
            .iter()
            .map(|pool| u128::from(self.pool_apr_bps(pool, now)))
            .sum();
        let average_apr_bps = if pool_count == 0 {
            0
        } else {
            u64::try_from(apr_sum / pool_count as u128).unwrap_or(u64::MAX)
        };

        ProgramStats {
            total_staked,
            pool_count,
            total_participants,
            active_participants,
            total_rewards_distributed: self.guard.distributed(),
            rewards_remaining: self.guard.rewards_remaining(),
            uncommitted_budget: self.guard.remaining_budget(),
            average_stake,
            average_apr_bps,
            state_version: self.op_seq,
        }
    }

    /// Per-pool statistics as of `now`.
    ///
    /// # Errors
    /// Returns `PoolNotFound` for an unknown id.
    pub fn pool_stats(&self, pool_id: PoolId, now: Timestamp) -> Result<PoolStats, EngineError> {
        let pool = self.registry.get(pool_id)?;
        let projection = self.project(pool, now)?;

        let mut projected_unclaimed = TokenAmount::ZERO;
        for position in self.ledger.positions_for_pool(pool_id) {
            let pending = accrual::pending_reward(
                position.staked,
                projection.acc_reward_per_share,
                position.reward_debt,
            )?;
            projected_unclaimed = projected_unclaimed
                .saturating_add(position.unclaimed)
                .saturating_add(pending);
        }

        Ok(PoolStats {
            pool_id,
            staking_asset: pool.staking_asset,
            alloc_weight: pool.alloc_weight,
            start_time: pool.start_time,
            end_time: pool.end_time,
            status: pool.status(now),
            total_staked: pool.total_staked,
            projected_acc_reward_per_share: projection.acc_reward_per_share,
            projected_unclaimed,
            lifetime_rewards_paid: pool.lifetime_rewards_paid,
            apr_bps: self.pool_apr_bps(pool, now),
        })
    }

    /// Per-participant statistics as of `now`.
    #[must_use]
    pub fn participant_stats(&self, participant: &Address, now: Timestamp) -> ParticipantStats {
        let mut position_count = 0;
        let mut total_staked = TokenAmount::ZERO;
        let mut projected_unclaimed = TokenAmount::ZERO;
        let mut lifetime_rewards = TokenAmount::ZERO;

        for position in self.ledger.positions_for(participant) {
            position_count += 1;
            total_staked = total_staked.saturating_add(position.staked);
            lifetime_rewards = lifetime_rewards.saturating_add(position.lifetime_rewards);

            let pending = self
                .registry
                .get(position.pool_id)
                .ok()
                .and_then(|pool| self.project(pool, now).ok())
                .and_then(|projection| {
                    accrual::pending_reward(
                        position.staked,
                        projection.acc_reward_per_share,
                        position.reward_debt,
                    )
                    .ok()
                })
                .unwrap_or(TokenAmount::ZERO);
            projected_unclaimed = projected_unclaimed
                .saturating_add(position.unclaimed)
                .saturating_add(pending);
        }

        ParticipantStats {
            participant: *participant,
            position_count,
            total_staked,
            projected_unclaimed,
            lifetime_rewards,
        }
    }

    /// Top `n` participants by the given key, aggregated across pools.
    ///
    /// Ties are broken by ascending first-position-creation order, which
    /// is stable across runs.
    #[must_use]
    pub fn top_participants(&self, n: usize, by: LeaderboardKey) -> Vec<LeaderboardEntry> {
        // (participant, staked, lifetime, earliest creation seq)
        let mut rows: Vec<(Address, TokenAmount, TokenAmount, u64)> = Vec::new();

        for position in self.ledger.positions() {
            match rows.iter_mut().find(|r| r.0 == position.participant) {
                Some(row) => {
                    row.1 = row.1.saturating_add(position.staked);
                    row.2 = row.2.saturating_add(position.lifetime_rewards);
                    row.3 = row.3.min(position.created_seq);
                }
                None => rows.push((
                    position.participant,
                    position.staked,
                    position.lifetime_rewards,
                    position.created_seq,
                )),
            }
        }

        rows.sort_by(|a, b| {
            let key_a = match by {
                LeaderboardKey::StakedAmount => a.1,
                LeaderboardKey::LifetimeRewards => a.2,
            };
            let key_b = match by {
                LeaderboardKey::StakedAmount => b.1,
                LeaderboardKey::LifetimeRewards => b.2,
            };
            key_b.cmp(&key_a).then(a.3.cmp(&b.3))
        });
        rows.truncate(n);

        rows.into_iter()
            .map(|(participant, staked, lifetime_rewards, _)| LeaderboardEntry {
                participant,
                staked,
                lifetime_rewards,
            })
            .collect()
    }

    fn project(&self, pool: &Pool, now: Timestamp) -> Result<accrual::PoolProjection, MathError> {
        accrual::project_pool(
            pool,
            self.emission_rate,
            self.registry.total_alloc_weight(),
            self.guard.remaining_budget(),
            now,
        )
    }

    /// Annualized reward rate proxy for a pool, in basis points of the
    /// staked principal. Integer arithmetic only; zero when the pool has
    /// no stake or `now` is outside its window.
    fn pool_apr_bps(&self, pool: &Pool, now: Timestamp) -> u64 {
        if pool.total_staked.is_zero() || !pool.in_window(now) {
            return 0;
        }
        let total_weight = self.registry.total_alloc_weight();
        if total_weight == 0 {
            return 0;
        }

        let yearly = crate::math::mul_div(
            self.emission_rate.raw(),
            u128::from(pool.alloc_weight) * u128::from(SECONDS_PER_YEAR),
            u128::from(total_weight),
        )
        .unwrap_or(0);
        let bps = crate::math::mul_div(yearly, BPS_DENOMINATOR, pool.total_staked.raw())
            .unwrap_or(u128::from(u64::MAX));

        u64::try_from(bps).unwrap_or(u64::MAX)
    }
}
