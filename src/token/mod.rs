//! Asset-transfer collaborator.
//!
//! The engine never holds balances itself; it instructs an upstream
//! transfer capability and treats its refusals as typed errors. The crate
//! ships an in-memory implementation for tests, the benchmark, and the
//! demo binary.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{Address, TokenAmount};

/// One asset movement requested by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TransferIntent {
    /// Asset being moved
    pub asset: Address,
    /// Account debited
    pub from: Address,
    /// Account credited
    pub to: Address,
    /// Amount moved
    pub amount: TokenAmount,
}

/// The upstream transfer capability the engine consumes.
pub trait AssetTransfer {
    /// Move `amount` of `asset` from `from` to `to`.
    ///
    /// # Errors
    /// Returns [`TransferError`] if the holder cannot cover the amount.
    fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<(), TransferError>;

    /// Pull `amount` of `asset` from a third-party `owner` into `to`.
    /// Allowance mechanics, where they exist, live upstream.
    ///
    /// # Errors
    /// Returns [`TransferError`] if the owner cannot cover the amount.
    fn transfer_from(
        &mut self,
        asset: Address,
        owner: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<(), TransferError> {
        self.transfer(asset, owner, to, amount)
    }

    /// Apply a batch of transfers.
    ///
    /// Ledger-backed implementations must apply the batch atomically:
    /// either every intent lands or none does. The default applies intents
    /// sequentially and is only suitable where a later failure cannot
    /// occur or the caller can tolerate it.
    ///
    /// # Errors
    /// Returns the first [`TransferError`] encountered.
    fn apply(&mut self, intents: &[TransferIntent]) -> Result<(), TransferError> {
        for intent in intents {
            self.transfer(intent.asset, intent.from, intent.to, intent.amount)?;
        }
        Ok(())
    }
}

/// Transfer collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Holder balance cannot cover the transfer
    #[error("transfer failed: {holder} holds {have} of {asset}, needs {need}")]
    InsufficientBalance {
        /// Asset being moved
        asset: Address,
        /// Account that was debited
        holder: Address,
        /// Balance the holder has
        have: TokenAmount,
        /// Amount the transfer needed
        need: TokenAmount,
    },
}

/// In-memory balance table keyed by (asset, holder).
#[derive(Clone, Debug, Default, Serialize)]
pub struct InMemoryBank {
    balances: HashMap<(Address, Address), TokenAmount>,
}

impl InMemoryBank {
    /// Create an empty bank
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `holder` with freshly minted `asset`
    pub fn mint(&mut self, asset: Address, holder: Address, amount: TokenAmount) {
        let balance = self.balances.entry((asset, holder)).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Current balance of `holder` in `asset`
    #[must_use]
    pub fn balance_of(&self, asset: &Address, holder: &Address) -> TokenAmount {
        self.balances
            .get(&(*asset, *holder))
            .copied()
            .unwrap_or(TokenAmount::ZERO)
    }
}

impl AssetTransfer for InMemoryBank {
    fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<(), TransferError> {
        let have = self.balance_of(&asset, &from);
        let remaining = have
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientBalance {
                asset,
                holder: from,
                have,
                need: amount,
            })?;

        self.balances.insert((asset, from), remaining);
        let credit = self.balances.entry((asset, to)).or_default();
        *credit = credit.saturating_add(amount);

        Ok(())
    }

    fn apply(&mut self, intents: &[TransferIntent]) -> Result<(), TransferError> {
        // Feasibility first: net each debit against credits arriving
        // earlier in the same batch, so the batch lands whole or not at
        // all.
        let mut projected: HashMap<(Address, Address), TokenAmount> = HashMap::new();
        for intent in intents {
            let debit_key = (intent.asset, intent.from);
            let have = *projected
                .entry(debit_key)
                .or_insert_with(|| self.balance_of(&intent.asset, &intent.from));
            let remaining =
                have.checked_sub(intent.amount)
                    .ok_or(TransferError::InsufficientBalance {
                        asset: intent.asset,
                        holder: intent.from,
                        have,
                        need: intent.amount,
                    })?;
            projected.insert(debit_key, remaining);

            let credit_key = (intent.asset, intent.to);
            let credited = *projected
                .entry(credit_key)
                .or_insert_with(|| self.balance_of(&intent.asset, &intent.to));
            projected.insert(credit_key, credited.saturating_add(intent.amount));
        }

        self.balances.extend(projected);
        Ok(())
    }
}
