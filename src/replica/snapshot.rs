use crate::replica::consistency::ConsistencyError;
use crate::replica::{LedgerId, ReplicaNode};
use anyhow::anyhow;

use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotField {
    CommittedSize,
    UncommittedSize,
    CommittedRootHash,
    UncommittedRootHash,
    CommittedHeadHash,
    UncommittedHeadHash,
}

impl SnapshotField {
    pub const COMMITTED: [SnapshotField; 3] = [
        SnapshotField::CommittedSize,
        SnapshotField::CommittedRootHash,
        SnapshotField::CommittedHeadHash,
    ];

    pub const UNCOMMITTED: [SnapshotField; 3] = [
        SnapshotField::UncommittedSize,
        SnapshotField::UncommittedRootHash,
        SnapshotField::UncommittedHeadHash,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SnapshotField::CommittedSize => "committed_size",
            SnapshotField::UncommittedSize => "uncommitted_size",
            SnapshotField::CommittedRootHash => "committed_root_hash",
            SnapshotField::UncommittedRootHash => "uncommitted_root_hash",
            SnapshotField::CommittedHeadHash => "committed_head_hash",
            SnapshotField::UncommittedHeadHash => "uncommitted_head_hash",
        }
    }
}

impl fmt::Display for SnapshotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Size(u64),
    Hash(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Size(size) => write!(f, "{size}"),
            FieldValue::Hash(hash) => f.write_str(hash),
        }
    }
}

/// What one node reported for one ledger at query time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    pub node: String,
    pub ledger_id: LedgerId,
    pub committed_size: u64,
    pub uncommitted_size: u64,
    pub committed_root_hash: String,
    pub uncommitted_root_hash: String,
    pub committed_head_hash: String,
    pub uncommitted_head_hash: String,
    pub utxo_cache: BTreeMap<Vec<u8>, Vec<u8>>,
    /// normalized committed amounts per cache key
    pub utxo_amounts: BTreeMap<Vec<u8>, String>,
}

impl ReplicaSnapshot {
    pub async fn capture(
        node: &dyn ReplicaNode,
        ledger_id: LedgerId,
    ) -> Result<Self, ConsistencyError> {
        let query_error = |source: anyhow::Error| ConsistencyError::NodeQuery {
            node: node.name().to_string(),
            source,
        };

        let ledger = node.get_ledger(ledger_id).await.map_err(query_error)?;
        let state = node.get_state(ledger_id).await.map_err(query_error)?;
        let mut utxo_cache = BTreeMap::new();
        for (key, value) in node
            .get_utxo_cache_entries()
            .await
            .map_err(query_error)?
        {
            if utxo_cache.contains_key(&key) {
                return Err(query_error(anyhow!(
                    "utxo cache key {} reported twice",
                    String::from_utf8_lossy(&key)
                )));
            }
            utxo_cache.insert(key, value);
        }

        let mut utxo_amounts = BTreeMap::new();
        for key in utxo_cache.keys() {
            let amounts = node
                .get_utxo_amounts(key, true)
                .await
                .map_err(query_error)?;
            utxo_amounts.insert(key.clone(), amounts.as_str());
        }

        Ok(Self {
            node: node.name().to_string(),
            ledger_id,
            committed_size: ledger.size,
            uncommitted_size: ledger.uncommitted_size,
            committed_root_hash: ledger.root_hash,
            uncommitted_root_hash: ledger.uncommitted_root_hash,
            committed_head_hash: state.committed_head_hash,
            uncommitted_head_hash: state.head_hash,
            utxo_cache,
            utxo_amounts,
        })
    }

    pub fn field(&self, field: SnapshotField) -> FieldValue {
        match field {
            SnapshotField::CommittedSize => FieldValue::Size(self.committed_size),
            SnapshotField::UncommittedSize => FieldValue::Size(self.uncommitted_size),
            SnapshotField::CommittedRootHash => FieldValue::Hash(self.committed_root_hash.clone()),
            SnapshotField::UncommittedRootHash => {
                FieldValue::Hash(self.uncommitted_root_hash.clone())
            }
            SnapshotField::CommittedHeadHash => FieldValue::Hash(self.committed_head_hash.clone()),
            SnapshotField::UncommittedHeadHash => {
                FieldValue::Hash(self.uncommitted_head_hash.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::fee_utils::utxo_view::UtxoAmounts;
    use crate::replica::consistency::ConsistencyError;
    use crate::replica::snapshot::ReplicaSnapshot;
    use crate::replica::{LedgerId, LedgerInfo, ReplicaNode, StateInfo};
    use async_trait::async_trait;

    struct FixedCache {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    }

    #[async_trait]
    impl ReplicaNode for FixedCache {
        fn name(&self) -> &str {
            "Alpha"
        }

        async fn get_ledger(&self, _ledger_id: LedgerId) -> anyhow::Result<LedgerInfo> {
            Ok(LedgerInfo {
                size: 1,
                uncommitted_size: 1,
                root_hash: "R".to_string(),
                uncommitted_root_hash: "R".to_string(),
            })
        }

        async fn get_state(&self, _ledger_id: LedgerId) -> anyhow::Result<StateInfo> {
            Ok(StateInfo {
                head_hash: "H".to_string(),
                committed_head_hash: "H".to_string(),
            })
        }

        async fn get_utxo_cache_entries(&self) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>> {
            Ok(self.entries.clone())
        }

        async fn get_utxo_amounts(
            &self,
            key: &[u8],
            _committed: bool,
        ) -> anyhow::Result<UtxoAmounts> {
            let value = self
                .entries
                .iter()
                .find(|(known, _)| known.as_slice() == key)
                .map(|(_, value)| String::from_utf8_lossy(value).to_string())
                .unwrap_or_default();
            UtxoAmounts::parse(&value)
        }
    }

    #[tokio::test]
    async fn captures_cache_and_amounts() {
        let node = FixedCache {
            entries: vec![
                (b"addrB".to_vec(), b"2:30".to_vec()),
                (b"addrA".to_vec(), b"1:10:3:7".to_vec()),
            ],
        };
        let snapshot = ReplicaSnapshot::capture(&node, LedgerId::TOKEN).await.unwrap();
        assert_eq!(snapshot.node, "Alpha");
        assert_eq!(snapshot.utxo_cache.len(), 2);
        assert_eq!(snapshot.utxo_amounts[&b"addrA".to_vec()], "1:10:3:7");
    }

    #[tokio::test]
    async fn repeated_cache_key_rejected() {
        let node = FixedCache {
            entries: vec![
                (b"addrA".to_vec(), b"1:10".to_vec()),
                (b"addrA".to_vec(), b"1:11".to_vec()),
            ],
        };
        match ReplicaSnapshot::capture(&node, LedgerId::TOKEN).await {
            Err(ConsistencyError::NodeQuery { node, source }) => {
                assert_eq!(node, "Alpha");
                assert!(source.to_string().contains("addrA"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
