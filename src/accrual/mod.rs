//! Lazy reward accrual.
//!
//! Nothing ticks in the background: whichever call next touches a pool
//! pays the cost of pricing the elapsed period into the pool's
//! reward-per-share accumulator, then the acting position is settled
//! against the updated accumulator. State growth is bounded by the number
//! of active pools, not by time.
//!
//! Settlement and read-only projection share one code path
//! ([`project_pool`]), so a query can never disagree with what the next
//! settlement will commit.

use tracing::debug;

use crate::math::{mul_div, MathError, PRECISION};
use crate::pool::Pool;
use crate::position::Position;
use crate::supply::SupplyGuard;
use crate::types::{Timestamp, TokenAmount};

/// What settling a pool as of some instant would commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolProjection {
    /// Accumulator value after pricing the elapsed period
    pub acc_reward_per_share: u128,
    /// Instant the accrual clock would advance to
    pub settled_to: Timestamp,
    /// Emission the period would draw from the supply budget
    pub emission_drawn: TokenAmount,
}

/// Price the period since the pool's last accrual into a new accumulator
/// value, without mutating anything.
///
/// Accrual time is clamped to the reward window: before `start_time` the
/// period is empty, past `end_time` it stops at the end. A pool with no
/// stake (or a zero weight sum) draws nothing; the period's emission is
/// simply skipped and the clock still advances. The drawn emission is
/// clamped to `emission_budget`, the uncommitted remainder of the supply
/// cap.
///
/// # Errors
/// Returns [`MathError`] if an intermediate quotient exceeds `u128`;
/// unreachable for realistic magnitudes.
pub fn project_pool(
    pool: &Pool,
    emission_rate: TokenAmount,
    total_alloc_weight: u64,
    emission_budget: TokenAmount,
    now: Timestamp,
) -> Result<PoolProjection, MathError> {
    let settled_to = now.clamp(pool.last_accrual_time, pool.end_time);
    let elapsed = settled_to - pool.last_accrual_time;

    if elapsed == 0 || pool.total_staked.is_zero() || total_alloc_weight == 0 {
        return Ok(PoolProjection {
            acc_reward_per_share: pool.acc_reward_per_share,
            settled_to,
            emission_drawn: TokenAmount::ZERO,
        });
    }

    let pool_rate = mul_div(
        emission_rate.raw(),
        u128::from(pool.alloc_weight),
        u128::from(total_alloc_weight),
    )?;
    let reward_for_period = pool_rate
        .checked_mul(u128::from(elapsed))
        .ok_or(MathError::Overflow)?;

    let drawn = TokenAmount::from_raw(reward_for_period).min(emission_budget);
    let delta = mul_div(drawn.raw(), PRECISION, pool.total_staked.raw())?;
    let acc_reward_per_share = pool
        .acc_reward_per_share
        .checked_add(delta)
        .ok_or(MathError::Overflow)?;

    Ok(PoolProjection {
        acc_reward_per_share,
        settled_to,
        emission_drawn: drawn,
    })
}

/// Settle a pool's accrual up to `now`, drawing the period's emission
/// from the supply guard. Returns the emission drawn.
///
/// # Errors
/// Returns [`MathError`] on fixed-point overflow; unreachable for
/// realistic magnitudes.
pub fn settle_pool(
    pool: &mut Pool,
    emission_rate: TokenAmount,
    total_alloc_weight: u64,
    guard: &mut SupplyGuard,
    now: Timestamp,
) -> Result<TokenAmount, MathError> {
    let projection = project_pool(
        pool,
        emission_rate,
        total_alloc_weight,
        guard.remaining_budget(),
        now,
    )?;

    let drawn = guard.draw_emission(projection.emission_drawn);
    debug_assert_eq!(drawn, projection.emission_drawn);

    pool.acc_reward_per_share = projection.acc_reward_per_share;
    pool.last_accrual_time = projection.settled_to;

    if !drawn.is_zero() {
        debug!(
            pool = pool.id,
            drawn = %drawn,
            acc = pool.acc_reward_per_share,
            "pool accrual settled"
        );
    }

    Ok(drawn)
}

/// Reward a stake has newly earned against an accumulator value: the full
/// entitlement minus the debt already priced in.
///
/// # Errors
/// Returns [`MathError`] on fixed-point overflow.
pub fn pending_reward(
    staked: TokenAmount,
    acc_reward_per_share: u128,
    reward_debt: TokenAmount,
) -> Result<TokenAmount, MathError> {
    let entitled = mul_div(staked.raw(), acc_reward_per_share, PRECISION)?;
    Ok(TokenAmount::from_raw(entitled).saturating_sub(reward_debt))
}

/// Move a position's newly accrued reward into its unclaimed balance.
/// The pool must already be settled. Returns the pending amount moved.
///
/// # Errors
/// Returns [`MathError`] on fixed-point overflow.
pub fn settle_position(pool: &Pool, position: &mut Position) -> Result<TokenAmount, MathError> {
    let pending = pending_reward(
        position.staked,
        pool.acc_reward_per_share,
        position.reward_debt,
    )?;
    position.unclaimed = position.unclaimed.saturating_add(pending);
    Ok(pending)
}

/// Re-anchor a position's reward debt to the current accumulator.
///
/// Must run in the same atomic step as any stake-amount change, after the
/// change is applied, so future accrual is measured only on the new
/// stake.
///
/// # Errors
/// Returns [`MathError`] on fixed-point overflow.
pub fn reset_reward_debt(pool: &Pool, position: &mut Position) -> Result<(), MathError> {
    let debt = mul_div(position.staked.raw(), pool.acc_reward_per_share, PRECISION)?;
    position.reward_debt = TokenAmount::from_raw(debt);
    Ok(())
}
