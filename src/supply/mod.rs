//! Reward supply cap enforcement.
//!
//! The guard bounds the reward token in two stages. Emission drawn by pool
//! settlement is *committed* against the cap before any participant can
//! become entitled to it; payouts then move committed value to
//! *distributed*. Because entitlement can never outrun `committed`, the
//! conservation bound `distributed + unclaimed <= cap` holds at every
//! instant, not just at payout time.

use serde::Serialize;

use crate::types::TokenAmount;

/// Enforces the global reward-token cap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupplyGuard {
    /// Immutable total reward budget
    cap: TokenAmount,
    /// Emission drawn by pool settlement so far
    committed: TokenAmount,
    /// Rewards actually paid out of the engine so far
    distributed: TokenAmount,
}

impl SupplyGuard {
    /// Create a guard over a fixed reward supply cap
    #[must_use]
    pub const fn new(cap: TokenAmount) -> Self {
        Self {
            cap,
            committed: TokenAmount::ZERO,
            distributed: TokenAmount::ZERO,
        }
    }

    /// Clamp a requested emission to what the cap still allows.
    ///
    /// Pure counterpart of [`draw_emission`](Self::draw_emission), used by
    /// read-only accrual projections.
    #[must_use]
    pub fn clamp_to_budget(&self, requested: TokenAmount) -> TokenAmount {
        requested.min(self.remaining_budget())
    }

    /// Draw emission for a settlement period, clamped to the remaining
    /// budget. Returns the granted amount and commits it against the cap.
    pub fn draw_emission(&mut self, requested: TokenAmount) -> TokenAmount {
        let granted = self.clamp_to_budget(requested);
        self.committed = self.committed.saturating_add(granted);
        granted
    }

    /// Validate and record a reward payout.
    ///
    /// Re-validates the cap right before value leaves the engine; while
    /// the accrual invariants hold, a payout of settled entitlement can
    /// never fail here.
    ///
    /// # Errors
    /// Returns [`SupplyError::Exhausted`] if the payout would push
    /// `distributed` past the cap or past what was ever committed. The
    /// transfer must then be rejected in full; nothing is recorded.
    pub fn authorize_payout(&mut self, amount: TokenAmount) -> Result<(), SupplyError> {
        let after = self
            .distributed
            .checked_add(amount)
            .ok_or(SupplyError::Exhausted {
                requested: amount,
                available: self.rewards_remaining(),
            })?;

        if after > self.cap || after > self.committed {
            return Err(SupplyError::Exhausted {
                requested: amount,
                available: self.rewards_remaining(),
            });
        }

        self.distributed = after;
        Ok(())
    }

    /// The immutable supply cap
    #[must_use]
    pub const fn cap(&self) -> TokenAmount {
        self.cap
    }

    /// Total rewards paid out so far
    #[must_use]
    pub const fn distributed(&self) -> TokenAmount {
        self.distributed
    }

    /// Total emission committed by settlement so far
    #[must_use]
    pub const fn committed(&self) -> TokenAmount {
        self.committed
    }

    /// Cap remainder no settlement has drawn yet
    #[must_use]
    pub fn remaining_budget(&self) -> TokenAmount {
        self.cap.saturating_sub(self.committed)
    }

    /// Cap remainder not yet paid out
    #[must_use]
    pub fn rewards_remaining(&self) -> TokenAmount {
        self.cap.saturating_sub(self.distributed)
    }
}

/// Supply guard errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupplyError {
    /// The reward cap cannot cover the payout
    #[error("reward supply exhausted: requested {requested}, distributable {available}")]
    Exhausted {
        /// Payout that was requested
        requested: TokenAmount,
        /// What the cap can still cover
        available: TokenAmount,
    },
}
