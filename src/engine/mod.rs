//! Public operation surface.
//!
//! Every mutating call lands here, runs under the reentrancy guard, and
//! follows one discipline: validate, settle accrual, apply the requested
//! effect, then perform external transfers as the very last step. On any
//! failure the touched records are restored, so an operation either fully
//! commits or leaves no trace (the operation sequence number and event
//! log included).

mod events;

pub use events::EngineEvent;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::accrual;
use crate::math::MathError;
use crate::pool::{Pool, PoolError, PoolId, PoolRegistry};
use crate::position::{Position, PositionLedger};
use crate::supply::{SupplyError, SupplyGuard};
use crate::token::{AssetTransfer, TransferError, TransferIntent};
use crate::types::{Address, Timestamp, TokenAmount};

/// Which payout components the fee is charged on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeApplies {
    /// Fee on reward payouts only
    #[default]
    Reward,
    /// Fee on withdrawn principal only
    Principal,
    /// Fee on both
    Both,
}

impl FeeApplies {
    /// Whether reward payouts are charged
    #[must_use]
    pub const fn charges_reward(self) -> bool {
        matches!(self, Self::Reward | Self::Both)
    }

    /// Whether withdrawn principal is charged
    #[must_use]
    pub const fn charges_principal(self) -> bool {
        matches!(self, Self::Principal | Self::Both)
    }
}

/// Constructor configuration for the engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Administrator allowed to call admin operations
    pub admin: Address,
    /// Destination for collected fees
    pub treasury: Address,
    /// Asset rewards are paid in
    pub reward_asset: Address,
    /// Account holding staked principal and the reward budget
    pub custody: Address,
    /// Immutable global reward supply cap
    pub reward_supply_cap: TokenAmount,
    /// Global emission rate, units per second
    pub emission_rate: TokenAmount,
    /// Fee rate in basis points (max 10_000)
    pub fee_bps: u16,
    /// Which payout components the fee applies to
    pub fee_applies: FeeApplies,
}

/// Result of a successful stake
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StakeReceipt {
    /// Pool staked into
    pub pool_id: PoolId,
    /// Principal added
    pub amount: TokenAmount,
    /// Position stake after the operation
    pub new_stake: TokenAmount,
    /// Whether the stake went from zero to positive
    pub position_opened: bool,
}

/// Result of a successful withdraw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WithdrawReceipt {
    /// Pool withdrawn from
    pub pool_id: PoolId,
    /// Principal removed from the position
    pub principal_gross: TokenAmount,
    /// Principal fee routed to the treasury
    pub principal_fee: TokenAmount,
    /// Principal the participant received
    pub principal_net: TokenAmount,
    /// Reward entitlement settled by this call
    pub reward_gross: TokenAmount,
    /// Reward fee routed to the treasury
    pub reward_fee: TokenAmount,
    /// Reward the participant received
    pub reward_net: TokenAmount,
    /// Position stake after the operation
    pub remaining_stake: TokenAmount,
}

/// Result of a successful claim
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    /// Pool claimed from
    pub pool_id: PoolId,
    /// Reward entitlement settled by this call
    pub reward_gross: TokenAmount,
    /// Reward fee routed to the treasury
    pub reward_fee: TokenAmount,
    /// Reward the participant received
    pub reward_net: TokenAmount,
}

/// Result of a successful emergency withdraw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EmergencyWithdrawReceipt {
    /// Pool exited
    pub pool_id: PoolId,
    /// Principal returned to the participant
    pub principal: TokenAmount,
    /// Settled-but-unclaimed reward discarded
    pub forfeited: TokenAmount,
}

/// The multi-pool staking reward-accrual engine.
///
/// Owns the pool registry, the position ledger, and the supply guard, and
/// drives them through the asset-transfer collaborator `T`. Fully
/// serialized: one operation runs to completion before the next begins,
/// and time is an explicit argument to every call.
pub struct MiningEngine<T: AssetTransfer> {
    pub(crate) admin: Address,
    pub(crate) treasury: Address,
    pub(crate) reward_asset: Address,
    pub(crate) custody: Address,
    pub(crate) emission_rate: TokenAmount,
    pub(crate) fee_bps: u16,
    pub(crate) fee_applies: FeeApplies,
    pub(crate) paused: bool,
    pub(crate) registry: PoolRegistry,
    pub(crate) ledger: PositionLedger,
    pub(crate) guard: SupplyGuard,
    pub(crate) bank: T,
    /// Reentrancy flag, held for the duration of every mutating call
    entered: bool,
    /// State version; bumped once per committed mutating operation
    pub(crate) op_seq: u64,
    events: Vec<EngineEvent>,
}

impl<T: AssetTransfer> MiningEngine<T> {
    /// Create an engine over a transfer collaborator.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidFee`] if `fee_bps` exceeds 10_000.
    pub fn new(config: EngineConfig, bank: T) -> Result<Self, EngineError> {
        if config.fee_bps > 10_000 {
            return Err(EngineError::InvalidFee {
                bps: config.fee_bps,
            });
        }

        Ok(Self {
            admin: config.admin,
            treasury: config.treasury,
            reward_asset: config.reward_asset,
            custody: config.custody,
            emission_rate: config.emission_rate,
            fee_bps: config.fee_bps,
            fee_applies: config.fee_applies,
            paused: false,
            registry: PoolRegistry::new(),
            ledger: PositionLedger::new(),
            guard: SupplyGuard::new(config.reward_supply_cap),
            bank,
            entered: false,
            op_seq: 0,
            events: Vec::new(),
        })
    }

    // ---- command surface ----

    /// Create a reward pool (admin only).
    ///
    /// Every existing pool is settled first: the weight sum is a shared
    /// accrual denominator, so elapsed periods must be priced at the old
    /// weights.
    ///
    /// # Errors
    /// `NotAuthorized`, `InvalidWeight`/`InvalidWindow` via [`PoolError`].
    pub fn create_pool(
        &mut self,
        caller: Address,
        staking_asset: Address,
        alloc_weight: u64,
        start_time: Timestamp,
        end_time: Timestamp,
        now: Timestamp,
    ) -> Result<PoolId, EngineError> {
        self.enter()?;
        let result = self.create_pool_locked(
            caller,
            staking_asset,
            alloc_weight,
            start_time,
            end_time,
            now,
        );
        self.entered = false;
        result
    }

    /// Stake principal into a pool.
    ///
    /// Settles the pool and the caller's position, increases the stake,
    /// re-anchors the reward debt, then pulls the principal from the
    /// participant into custody as the last step.
    ///
    /// # Errors
    /// `Paused`, `InvalidAmount`, `PoolNotFound`, `Transfer`.
    pub fn stake(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        amount: TokenAmount,
        now: Timestamp,
    ) -> Result<StakeReceipt, EngineError> {
        self.enter()?;
        let result = self.stake_locked(participant, pool_id, amount, now);
        self.entered = false;
        result
    }

    /// Withdraw principal, paying out any settled reward in the same call.
    ///
    /// # Errors
    /// `Paused`, `InvalidAmount`, `PoolNotFound`, `PositionNotFound`,
    /// `InsufficientStake`, `Supply`, `Transfer`.
    pub fn withdraw(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        amount: TokenAmount,
        now: Timestamp,
    ) -> Result<WithdrawReceipt, EngineError> {
        self.enter()?;
        let result = self.withdraw_locked(participant, pool_id, amount, now);
        self.entered = false;
        result
    }

    /// Pay out the caller's settled reward.
    ///
    /// Idempotent: a second call with no elapsed time and no intervening
    /// stake change pays exactly zero and performs no transfer.
    ///
    /// # Errors
    /// `Paused`, `PoolNotFound`, `PositionNotFound`, `Supply`, `Transfer`.
    pub fn claim(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        now: Timestamp,
    ) -> Result<ClaimReceipt, EngineError> {
        self.enter()?;
        let result = self.claim_locked(participant, pool_id, now);
        self.entered = false;
        result
    }

    /// Forced exit: return the full staked principal with no settlement.
    ///
    /// Pending and settled reward are forfeited; the supply guard is never
    /// consulted. Available even while paused.
    ///
    /// # Errors
    /// `PoolNotFound`, `PositionNotFound`, `Transfer`.
    pub fn emergency_withdraw(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        now: Timestamp,
    ) -> Result<EmergencyWithdrawReceipt, EngineError> {
        self.enter()?;
        let result = self.emergency_withdraw_locked(participant, pool_id, now);
        self.entered = false;
        result
    }

    /// Change a pool's allocation weight (admin only).
    ///
    /// All pools are settled up to `now` first, so already-elapsed periods
    /// keep their old attribution.
    ///
    /// # Errors
    /// `NotAuthorized`, `PoolNotFound`, `InvalidWeight`.
    pub fn set_alloc_weight(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        new_weight: u64,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.enter()?;
        let result = self.set_alloc_weight_locked(caller, pool_id, new_weight, now);
        self.entered = false;
        result
    }

    /// Change the global emission rate (admin only). All pools are
    /// settled at the old rate first.
    ///
    /// # Errors
    /// `NotAuthorized`.
    pub fn set_emission_rate(
        &mut self,
        caller: Address,
        new_rate: TokenAmount,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.enter()?;
        let result = self.set_emission_rate_locked(caller, new_rate, now);
        self.entered = false;
        result
    }

    /// Change the fee rate (admin only).
    ///
    /// # Errors
    /// `NotAuthorized`, `InvalidFee` above 10_000 bps.
    pub fn set_fee_basis_points(
        &mut self,
        caller: Address,
        new_bps: u16,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.enter()?;
        let result = self.set_fee_basis_points_locked(caller, new_bps, now);
        self.entered = false;
        result
    }

    /// Change the treasury destination (admin only).
    ///
    /// # Errors
    /// `NotAuthorized`.
    pub fn set_treasury(
        &mut self,
        caller: Address,
        new_treasury: Address,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.enter()?;
        let result = self.set_treasury_locked(caller, new_treasury, now);
        self.entered = false;
        result
    }

    /// Suspend stake/withdraw/claim (admin only). Emergency withdraw
    /// stays available. Idempotent.
    ///
    /// # Errors
    /// `NotAuthorized`.
    pub fn pause(&mut self, caller: Address, now: Timestamp) -> Result<(), EngineError> {
        self.enter()?;
        let result = self.set_paused_locked(caller, true, now);
        self.entered = false;
        result
    }

    /// Resume normal operation (admin only). Idempotent.
    ///
    /// # Errors
    /// `NotAuthorized`.
    pub fn unpause(&mut self, caller: Address, now: Timestamp) -> Result<(), EngineError> {
        self.enter()?;
        let result = self.set_paused_locked(caller, false, now);
        self.entered = false;
        result
    }

    // ---- raw query surface ----

    /// Get a pool by id
    ///
    /// # Errors
    /// Returns `PoolNotFound` for an unknown id
    pub fn get_pool(&self, pool_id: PoolId) -> Result<&Pool, EngineError> {
        Ok(self.registry.get(pool_id)?)
    }

    /// All pools, ordered by id
    #[must_use]
    pub fn pools(&self) -> &[Pool] {
        self.registry.pools()
    }

    /// Get a position record
    ///
    /// # Errors
    /// Returns `PositionNotFound` if the participant never staked there
    pub fn get_position(
        &self,
        participant: &Address,
        pool_id: PoolId,
    ) -> Result<&Position, EngineError> {
        self.ledger
            .get(participant, pool_id)
            .ok_or(EngineError::PositionNotFound {
                participant: *participant,
                pool_id,
            })
    }

    /// All position records, in unspecified order
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.ledger.positions()
    }

    /// Total rewards ever paid out of the engine
    #[must_use]
    pub fn total_rewards_distributed(&self) -> TokenAmount {
        self.guard.distributed()
    }

    /// The supply guard's figures
    #[must_use]
    pub const fn supply(&self) -> &SupplyGuard {
        &self.guard
    }

    /// Sum of all pool allocation weights
    #[must_use]
    pub const fn total_alloc_weight(&self) -> u64 {
        self.registry.total_alloc_weight()
    }

    /// Administrator identity
    #[must_use]
    pub const fn admin(&self) -> Address {
        self.admin
    }

    /// Current treasury destination
    #[must_use]
    pub const fn treasury(&self) -> Address {
        self.treasury
    }

    /// Asset rewards are paid in
    #[must_use]
    pub const fn reward_asset(&self) -> Address {
        self.reward_asset
    }

    /// Account holding staked principal and the reward budget
    #[must_use]
    pub const fn custody(&self) -> Address {
        self.custody
    }

    /// Global emission rate, units per second
    #[must_use]
    pub const fn emission_rate(&self) -> TokenAmount {
        self.emission_rate
    }

    /// Current fee rate in basis points
    #[must_use]
    pub const fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// Which payout components the fee applies to
    #[must_use]
    pub const fn fee_applies(&self) -> FeeApplies {
        self.fee_applies
    }

    /// Whether stake/withdraw/claim are suspended
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// State version: committed mutating operations so far
    #[must_use]
    pub const fn op_seq(&self) -> u64 {
        self.op_seq
    }

    /// Events appended by committed operations, oldest first
    #[must_use]
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Take the accumulated events, leaving the log empty
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// The transfer collaborator
    #[must_use]
    pub const fn bank(&self) -> &T {
        &self.bank
    }

    // ---- internals ----

    fn enter(&mut self) -> Result<(), EngineError> {
        if self.entered {
            return Err(EngineError::Reentrancy);
        }
        self.entered = true;
        Ok(())
    }

    fn require_admin(&self, caller: Address) -> Result<(), EngineError> {
        if caller == self.admin {
            Ok(())
        } else {
            Err(EngineError::NotAuthorized)
        }
    }

    /// Split an amount into (fee, net) at the current fee rate
    fn fee_split(&self, amount: TokenAmount, charged: bool) -> (TokenAmount, TokenAmount) {
        if !charged || amount.is_zero() {
            return (TokenAmount::ZERO, amount);
        }
        // fee_bps <= 10_000 is enforced at configuration time
        let fee = amount.checked_bps(self.fee_bps).unwrap_or(TokenAmount::ZERO);
        (fee, amount.saturating_sub(fee))
    }

    /// Settle every pool up to `now`. Used whenever a shared accrual
    /// denominator (weight sum, emission rate) is about to change.
    fn settle_all_pools(&mut self, now: Timestamp) -> Result<(), MathError> {
        let rate = self.emission_rate;
        let total_weight = self.registry.total_alloc_weight();
        for pool in self.registry.pools_mut() {
            accrual::settle_pool(pool, rate, total_weight, &mut self.guard, now)?;
        }
        Ok(())
    }

    /// Put back the pre-operation images of the records one pool-scoped
    /// operation touched.
    fn rollback(
        &mut self,
        pool_id: PoolId,
        pool_before: Pool,
        participant: Address,
        position_before: Option<Position>,
        guard_before: SupplyGuard,
        created_before: u64,
    ) {
        if let Ok(pool) = self.registry.get_mut(pool_id) {
            *pool = pool_before;
        }
        self.ledger
            .restore(participant, pool_id, position_before, created_before);
        self.guard = guard_before;
    }

    fn create_pool_locked(
        &mut self,
        caller: Address,
        staking_asset: Address,
        alloc_weight: u64,
        start_time: Timestamp,
        end_time: Timestamp,
        now: Timestamp,
    ) -> Result<PoolId, EngineError> {
        self.require_admin(caller)?;

        let registry_before = self.registry.clone();
        let guard_before = self.guard.clone();

        let staged = self
            .settle_all_pools(now)
            .map_err(EngineError::from)
            .and_then(|()| {
                Ok(self
                    .registry
                    .create_pool(staking_asset, alloc_weight, start_time, end_time)?)
            });

        let pool_id = match staged {
            Ok(pool_id) => pool_id,
            Err(err) => {
                self.registry = registry_before;
                self.guard = guard_before;
                return Err(err);
            }
        };

        self.op_seq += 1;
        self.events.push(EngineEvent::PoolCreated {
            pool_id,
            staking_asset,
            alloc_weight,
            start_time,
            end_time,
            at: now,
        });
        info!(pool = pool_id, weight = alloc_weight, "pool created");

        Ok(pool_id)
    }

    fn stake_locked(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        amount: TokenAmount,
        now: Timestamp,
    ) -> Result<StakeReceipt, EngineError> {
        if self.paused {
            return Err(EngineError::Paused);
        }
        if amount.is_zero() {
            return Err(EngineError::InvalidAmount);
        }

        let pool_before = self.registry.get(pool_id)?.clone();
        let position_before = self.ledger.get(&participant, pool_id).cloned();
        let guard_before = self.guard.clone();
        let created_before = self.ledger.created_count();

        let opened = position_before.as_ref().map_or(true, |p| !p.is_staked());
        let rate = self.emission_rate;
        let total_weight = self.registry.total_alloc_weight();

        let staged: Result<(TokenAmount, Address), EngineError> = (|| {
            let pool = self.registry.get_mut(pool_id)?;
            accrual::settle_pool(pool, rate, total_weight, &mut self.guard, now)?;

            let position = self.ledger.get_or_create(participant, pool_id, now);
            accrual::settle_position(pool, position)?;

            position.staked = position
                .staked
                .checked_add(amount)
                .ok_or(MathError::Overflow)?;
            pool.total_staked = pool.total_staked.saturating_add(amount);
            accrual::reset_reward_debt(pool, position)?;
            position.last_action_at = now;

            Ok((position.staked, pool.staking_asset))
        })();

        let (new_stake, staking_asset) = match staged {
            Ok(values) => values,
            Err(err) => {
                self.rollback(
                    pool_id,
                    pool_before,
                    participant,
                    position_before,
                    guard_before,
                    created_before,
                );
                return Err(err);
            }
        };

        // External interaction last
        if let Err(err) = self
            .bank
            .transfer_from(staking_asset, participant, self.custody, amount)
        {
            self.rollback(
                pool_id,
                pool_before,
                participant,
                position_before,
                guard_before,
                created_before,
            );
            return Err(err.into());
        }

        self.op_seq += 1;
        if opened {
            self.events.push(EngineEvent::PositionOpened {
                participant,
                pool_id,
                at: now,
            });
        }
        self.events.push(EngineEvent::Staked {
            participant,
            pool_id,
            amount,
            at: now,
        });
        info!(%participant, pool = pool_id, %amount, "staked");

        Ok(StakeReceipt {
            pool_id,
            amount,
            new_stake,
            position_opened: opened,
        })
    }

    fn withdraw_locked(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        amount: TokenAmount,
        now: Timestamp,
    ) -> Result<WithdrawReceipt, EngineError> {
        if self.paused {
            return Err(EngineError::Paused);
        }
        if amount.is_zero() {
            return Err(EngineError::InvalidAmount);
        }

        let pool_before = self.registry.get(pool_id)?.clone();
        let position_before = self.ledger.get(&participant, pool_id).cloned().ok_or(
            EngineError::PositionNotFound {
                participant,
                pool_id,
            },
        )?;
        if amount > position_before.staked {
            return Err(EngineError::InsufficientStake {
                have: position_before.staked,
                need: amount,
            });
        }
        let guard_before = self.guard.clone();
        let created_before = self.ledger.created_count();

        let rate = self.emission_rate;
        let total_weight = self.registry.total_alloc_weight();
        let guard = &mut self.guard;
        let ledger = &mut self.ledger;

        let staged: Result<(TokenAmount, TokenAmount, Address), EngineError> = (|| {
            let pool = self.registry.get_mut(pool_id)?;
            accrual::settle_pool(pool, rate, total_weight, guard, now)?;

            let position =
                ledger
                    .get_mut(&participant, pool_id)
                    .ok_or(EngineError::PositionNotFound {
                        participant,
                        pool_id,
                    })?;
            accrual::settle_position(pool, position)?;

            let reward_gross = position.unclaimed;
            if !reward_gross.is_zero() {
                guard.authorize_payout(reward_gross)?;
            }

            position.unclaimed = TokenAmount::ZERO;
            position.lifetime_rewards = position.lifetime_rewards.saturating_add(reward_gross);
            position.staked = position
                .staked
                .checked_sub(amount)
                .ok_or(MathError::Overflow)?;
            pool.total_staked = pool.total_staked.saturating_sub(amount);
            accrual::reset_reward_debt(pool, position)?;
            position.last_action_at = now;
            pool.lifetime_rewards_paid = pool.lifetime_rewards_paid.saturating_add(reward_gross);

            Ok((reward_gross, position.staked, pool.staking_asset))
        })();

        let (reward_gross, remaining_stake, staking_asset) = match staged {
            Ok(values) => values,
            Err(err) => {
                self.rollback(
                    pool_id,
                    pool_before,
                    participant,
                    Some(position_before),
                    guard_before,
                    created_before,
                );
                return Err(err);
            }
        };

        let (reward_fee, reward_net) =
            self.fee_split(reward_gross, self.fee_applies.charges_reward());
        let (principal_fee, principal_net) =
            self.fee_split(amount, self.fee_applies.charges_principal());

        let mut intents = Vec::with_capacity(4);
        if !reward_net.is_zero() {
            intents.push(TransferIntent {
                asset: self.reward_asset,
                from: self.custody,
                to: participant,
                amount: reward_net,
            });
        }
        if !reward_fee.is_zero() {
            intents.push(TransferIntent {
                asset: self.reward_asset,
                from: self.custody,
                to: self.treasury,
                amount: reward_fee,
            });
        }
        if !principal_net.is_zero() {
            intents.push(TransferIntent {
                asset: staking_asset,
                from: self.custody,
                to: participant,
                amount: principal_net,
            });
        }
        if !principal_fee.is_zero() {
            intents.push(TransferIntent {
                asset: staking_asset,
                from: self.custody,
                to: self.treasury,
                amount: principal_fee,
            });
        }

        if let Err(err) = self.bank.apply(&intents) {
            self.rollback(
                pool_id,
                pool_before,
                participant,
                Some(position_before),
                guard_before,
                created_before,
            );
            return Err(err.into());
        }

        self.op_seq += 1;
        if !reward_gross.is_zero() {
            self.events.push(EngineEvent::RewardPaid {
                participant,
                pool_id,
                gross: reward_gross,
                fee: reward_fee,
                net: reward_net,
                at: now,
            });
        }
        self.events.push(EngineEvent::Withdrawn {
            participant,
            pool_id,
            amount,
            fee: principal_fee,
            at: now,
        });
        info!(%participant, pool = pool_id, %amount, reward = %reward_gross, "withdrawn");

        Ok(WithdrawReceipt {
            pool_id,
            principal_gross: amount,
            principal_fee,
            principal_net,
            reward_gross,
            reward_fee,
            reward_net,
            remaining_stake,
        })
    }

    fn claim_locked(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        now: Timestamp,
    ) -> Result<ClaimReceipt, EngineError> {
        if self.paused {
            return Err(EngineError::Paused);
        }

        let pool_before = self.registry.get(pool_id)?.clone();
        let position_before = self.ledger.get(&participant, pool_id).cloned().ok_or(
            EngineError::PositionNotFound {
                participant,
                pool_id,
            },
        )?;
        let guard_before = self.guard.clone();
        let created_before = self.ledger.created_count();

        let rate = self.emission_rate;
        let total_weight = self.registry.total_alloc_weight();
        let guard = &mut self.guard;
        let ledger = &mut self.ledger;

        let staged: Result<TokenAmount, EngineError> = (|| {
            let pool = self.registry.get_mut(pool_id)?;
            accrual::settle_pool(pool, rate, total_weight, guard, now)?;

            let position =
                ledger
                    .get_mut(&participant, pool_id)
                    .ok_or(EngineError::PositionNotFound {
                        participant,
                        pool_id,
                    })?;
            accrual::settle_position(pool, position)?;

            let reward_gross = position.unclaimed;
            if !reward_gross.is_zero() {
                guard.authorize_payout(reward_gross)?;
            }

            position.unclaimed = TokenAmount::ZERO;
            position.lifetime_rewards = position.lifetime_rewards.saturating_add(reward_gross);
            accrual::reset_reward_debt(pool, position)?;
            position.last_action_at = now;
            pool.lifetime_rewards_paid = pool.lifetime_rewards_paid.saturating_add(reward_gross);

            Ok(reward_gross)
        })();

        let reward_gross = match staged {
            Ok(value) => value,
            Err(err) => {
                self.rollback(
                    pool_id,
                    pool_before,
                    participant,
                    Some(position_before),
                    guard_before,
                    created_before,
                );
                return Err(err);
            }
        };

        let (reward_fee, reward_net) =
            self.fee_split(reward_gross, self.fee_applies.charges_reward());

        let mut intents = Vec::with_capacity(2);
        if !reward_net.is_zero() {
            intents.push(TransferIntent {
                asset: self.reward_asset,
                from: self.custody,
                to: participant,
                amount: reward_net,
            });
        }
        if !reward_fee.is_zero() {
            intents.push(TransferIntent {
                asset: self.reward_asset,
                from: self.custody,
                to: self.treasury,
                amount: reward_fee,
            });
        }

        if let Err(err) = self.bank.apply(&intents) {
            self.rollback(
                pool_id,
                pool_before,
                participant,
                Some(position_before),
                guard_before,
                created_before,
            );
            return Err(err.into());
        }

        self.op_seq += 1;
        if !reward_gross.is_zero() {
            self.events.push(EngineEvent::RewardPaid {
                participant,
                pool_id,
                gross: reward_gross,
                fee: reward_fee,
                net: reward_net,
                at: now,
            });
            info!(%participant, pool = pool_id, gross = %reward_gross, "reward claimed");
        }

        Ok(ClaimReceipt {
            pool_id,
            reward_gross,
            reward_fee,
            reward_net,
        })
    }

    fn emergency_withdraw_locked(
        &mut self,
        participant: Address,
        pool_id: PoolId,
        now: Timestamp,
    ) -> Result<EmergencyWithdrawReceipt, EngineError> {
        // Deliberately no pause check and no settlement: principal only.
        let pool_before = self.registry.get(pool_id)?.clone();
        let position_before = self.ledger.get(&participant, pool_id).cloned().ok_or(
            EngineError::PositionNotFound {
                participant,
                pool_id,
            },
        )?;
        let guard_before = self.guard.clone();
        let created_before = self.ledger.created_count();

        let principal = position_before.staked;
        let forfeited = position_before.unclaimed;
        let staking_asset = pool_before.staking_asset;

        {
            let pool = self.registry.get_mut(pool_id)?;
            pool.total_staked = pool.total_staked.saturating_sub(principal);
        }
        if let Some(position) = self.ledger.get_mut(&participant, pool_id) {
            position.staked = TokenAmount::ZERO;
            position.reward_debt = TokenAmount::ZERO;
            position.unclaimed = TokenAmount::ZERO;
            position.last_action_at = now;
        }

        if !principal.is_zero() {
            if let Err(err) = self
                .bank
                .transfer(staking_asset, self.custody, participant, principal)
            {
                self.rollback(
                    pool_id,
                    pool_before,
                    participant,
                    Some(position_before),
                    guard_before,
                    created_before,
                );
                return Err(err.into());
            }
        }

        self.op_seq += 1;
        if !forfeited.is_zero() {
            self.events.push(EngineEvent::RewardForfeited {
                participant,
                pool_id,
                amount: forfeited,
                at: now,
            });
        }
        self.events.push(EngineEvent::EmergencyWithdrawn {
            participant,
            pool_id,
            principal,
            at: now,
        });
        info!(%participant, pool = pool_id, %principal, %forfeited, "emergency withdraw");

        Ok(EmergencyWithdrawReceipt {
            pool_id,
            principal,
            forfeited,
        })
    }

    fn set_alloc_weight_locked(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        new_weight: u64,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;

        let registry_before = self.registry.clone();
        let guard_before = self.guard.clone();

        let staged = self
            .settle_all_pools(now)
            .map_err(EngineError::from)
            .and_then(|()| Ok(self.registry.set_alloc_weight(pool_id, new_weight)?));

        let old_weight = match staged {
            Ok(old_weight) => old_weight,
            Err(err) => {
                self.registry = registry_before;
                self.guard = guard_before;
                return Err(err);
            }
        };

        self.op_seq += 1;
        self.events.push(EngineEvent::AllocWeightUpdated {
            pool_id,
            old_weight,
            new_weight,
            at: now,
        });
        info!(pool = pool_id, old_weight, new_weight, "allocation weight updated");

        Ok(())
    }

    fn set_emission_rate_locked(
        &mut self,
        caller: Address,
        new_rate: TokenAmount,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;

        let registry_before = self.registry.clone();
        let guard_before = self.guard.clone();

        if let Err(err) = self.settle_all_pools(now) {
            self.registry = registry_before;
            self.guard = guard_before;
            return Err(err.into());
        }

        let old_rate = self.emission_rate;
        self.emission_rate = new_rate;

        self.op_seq += 1;
        self.events.push(EngineEvent::EmissionRateUpdated {
            old_rate,
            new_rate,
            at: now,
        });
        info!(%old_rate, %new_rate, "emission rate updated");

        Ok(())
    }

    fn set_fee_basis_points_locked(
        &mut self,
        caller: Address,
        new_bps: u16,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        if new_bps > 10_000 {
            return Err(EngineError::InvalidFee { bps: new_bps });
        }

        let old_bps = self.fee_bps;
        self.fee_bps = new_bps;

        self.op_seq += 1;
        self.events.push(EngineEvent::FeeUpdated {
            old_bps,
            new_bps,
            at: now,
        });

        Ok(())
    }

    fn set_treasury_locked(
        &mut self,
        caller: Address,
        new_treasury: Address,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;

        let old_treasury = self.treasury;
        self.treasury = new_treasury;

        self.op_seq += 1;
        self.events.push(EngineEvent::TreasuryUpdated {
            old_treasury,
            new_treasury,
            at: now,
        });

        Ok(())
    }

    fn set_paused_locked(
        &mut self,
        caller: Address,
        paused: bool,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;

        if self.paused == paused {
            return Ok(());
        }
        self.paused = paused;

        self.op_seq += 1;
        self.events.push(if paused {
            EngineEvent::Paused { at: now }
        } else {
            EngineEvent::Unpaused { at: now }
        });
        info!(paused, "pause state changed");

        Ok(())
    }
}

/// Engine operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Amount must be positive
    #[error("amount must be positive")]
    InvalidAmount,
    /// Fee rate above 100%
    #[error("fee rate above 10000 bps: {bps}")]
    InvalidFee {
        /// The rejected rate
        bps: u16,
    },
    /// Withdraw larger than the staked amount
    #[error("insufficient stake: have {have}, need {need}")]
    InsufficientStake {
        /// Currently staked
        have: TokenAmount,
        /// Amount requested
        need: TokenAmount,
    },
    /// No position record exists for (participant, pool)
    #[error("no position for {participant} in pool {pool_id}")]
    PositionNotFound {
        /// Requested participant
        participant: Address,
        /// Requested pool
        pool_id: PoolId,
    },
    /// Caller is not the configured administrator
    #[error("caller is not the administrator")]
    NotAuthorized,
    /// Mutating operations are suspended
    #[error("operations are paused")]
    Paused,
    /// A mutating call re-entered the engine
    #[error("reentrant call rejected")]
    Reentrancy,
    /// Pool registry error
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Reward supply cap violation
    #[error(transparent)]
    Supply(#[from] SupplyError),
    /// Fixed-point arithmetic failure
    #[error(transparent)]
    Math(#[from] MathError),
    /// The transfer collaborator refused
    #[error(transparent)]
    Transfer(#[from] TransferError),
}
