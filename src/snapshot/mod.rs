//! Flat key-value audit export.
//!
//! The entire persisted state — global scalars, supply figures, the pool
//! table, the position table — flattened into a sorted string map so it
//! can be diffed, archived, or fed to external audit tooling as JSON.

use std::collections::BTreeMap;

use crate::engine::MiningEngine;
use crate::token::AssetTransfer;

impl<T: AssetTransfer> MiningEngine<T> {
    /// Export the full engine state as a flat, sorted key-value map.
    ///
    /// Keys are grouped by prefix: `global/…`, `supply/…`,
    /// `pool/{id}/…`, `position/{participant}/{pool}/…`. Values are
    /// decimal strings (amounts) or plain scalars.
    #[must_use]
    pub fn audit_snapshot(&self) -> BTreeMap<String, String> {
        let mut snapshot = BTreeMap::new();

        snapshot.insert("global/admin".into(), self.admin.to_hex());
        snapshot.insert("global/treasury".into(), self.treasury.to_hex());
        snapshot.insert("global/reward_asset".into(), self.reward_asset.to_hex());
        snapshot.insert("global/custody".into(), self.custody.to_hex());
        snapshot.insert(
            "global/emission_rate".into(),
            self.emission_rate.to_decimal_string(),
        );
        snapshot.insert("global/fee_bps".into(), self.fee_bps.to_string());
        snapshot.insert(
            "global/fee_applies".into(),
            format!("{:?}", self.fee_applies),
        );
        snapshot.insert("global/paused".into(), self.paused.to_string());
        snapshot.insert("global/op_seq".into(), self.op_seq.to_string());
        snapshot.insert(
            "global/total_alloc_weight".into(),
            self.registry.total_alloc_weight().to_string(),
        );

        snapshot.insert("supply/cap".into(), self.guard.cap().to_decimal_string());
        snapshot.insert(
            "supply/committed".into(),
            self.guard.committed().to_decimal_string(),
        );
        snapshot.insert(
            "supply/distributed".into(),
            self.guard.distributed().to_decimal_string(),
        );

        for pool in self.registry.pools() {
            let prefix = format!("pool/{}", pool.id);
            snapshot.insert(
                format!("{prefix}/staking_asset"),
                pool.staking_asset.to_hex(),
            );
            snapshot.insert(
                format!("{prefix}/alloc_weight"),
                pool.alloc_weight.to_string(),
            );
            snapshot.insert(format!("{prefix}/start_time"), pool.start_time.to_string());
            snapshot.insert(format!("{prefix}/end_time"), pool.end_time.to_string());
            snapshot.insert(
                format!("{prefix}/acc_reward_per_share"),
                pool.acc_reward_per_share.to_string(),
            );
            snapshot.insert(
                format!("{prefix}/last_accrual_time"),
                pool.last_accrual_time.to_string(),
            );
            snapshot.insert(
                format!("{prefix}/total_staked"),
                pool.total_staked.to_decimal_string(),
            );
            snapshot.insert(
                format!("{prefix}/lifetime_rewards_paid"),
                pool.lifetime_rewards_paid.to_decimal_string(),
            );
        }

        for position in self.ledger.positions() {
            let prefix = format!(
                "position/{}/{}",
                position.participant.to_hex(),
                position.pool_id
            );
            snapshot.insert(
                format!("{prefix}/staked"),
                position.staked.to_decimal_string(),
            );
            snapshot.insert(
                format!("{prefix}/reward_debt"),
                position.reward_debt.to_decimal_string(),
            );
            snapshot.insert(
                format!("{prefix}/unclaimed"),
                position.unclaimed.to_decimal_string(),
            );
            snapshot.insert(
                format!("{prefix}/lifetime_rewards"),
                position.lifetime_rewards.to_decimal_string(),
            );
            snapshot.insert(
                format!("{prefix}/created_seq"),
                position.created_seq.to_string(),
            );
            snapshot.insert(
                format!("{prefix}/created_at"),
                position.created_at.to_string(),
            );
        }

        snapshot
    }

    /// The audit snapshot rendered as pretty JSON.
    ///
    /// # Errors
    /// Returns `serde_json::Error` if serialization fails (it cannot for
    /// a string map; the signature follows the serializer).
    pub fn audit_snapshot_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.audit_snapshot())
    }
}
