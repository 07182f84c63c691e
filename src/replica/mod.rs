use crate::fee_utils::utxo_view::UtxoAmounts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use std::fmt;

pub mod consistency;
pub mod memory;
pub mod polling;
pub mod snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub u32);

impl LedgerId {
    pub const DOMAIN: LedgerId = LedgerId(1);
    pub const CONFIG: LedgerId = LedgerId(2);
    pub const TOKEN: LedgerId = LedgerId(1001);
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub size: u64,
    pub uncommitted_size: u64,
    pub root_hash: String,
    pub uncommitted_root_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateInfo {
    /// head of the uncommitted state
    pub head_hash: String,
    pub committed_head_hash: String,
}

/// Read-only handle on one ledger-hosting node.
#[async_trait]
pub trait ReplicaNode: Send + Sync {
    fn name(&self) -> &str;

    async fn get_ledger(&self, ledger_id: LedgerId) -> anyhow::Result<LedgerInfo>;

    async fn get_state(&self, ledger_id: LedgerId) -> anyhow::Result<StateInfo>;

    /// Raw token ledger utxo cache contents.
    async fn get_utxo_cache_entries(&self) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>>;

    async fn get_utxo_amounts(&self, key: &[u8], committed: bool) -> anyhow::Result<UtxoAmounts>;
}
