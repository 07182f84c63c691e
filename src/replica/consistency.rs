use crate::config::ConsistencyConfig;
use crate::replica::polling::eventually;
use crate::replica::snapshot::{FieldValue, ReplicaSnapshot, SnapshotField};
use crate::replica::{LedgerId, ReplicaNode};
use futures::future::try_join_all;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    pub node: String,
    pub value: String,
}

/// Replicas disagree on `field`. `expected` is the value most nodes report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InconsistencyReport {
    pub ledger_id: Option<LedgerId>,
    pub field: String,
    pub expected: String,
    pub diverging: Vec<Divergence>,
}

impl fmt::Display for InconsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ledger_id {
            Some(ledger_id) => write!(f, "{} mismatch on ledger {}", self.field, ledger_id)?,
            None => write!(f, "{} mismatch", self.field)?,
        }
        write!(f, ", expected {}:", self.expected)?;
        for divergence in self.diverging.iter() {
            write!(f, " {} has {};", divergence.node, divergence.value)?;
        }
        Ok(())
    }
}

impl std::error::Error for InconsistencyReport {}

impl InconsistencyReport {
    pub fn diverging_nodes(&self) -> Vec<&str> {
        self.diverging
            .iter()
            .map(|divergence| divergence.node.as_str())
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsistencyError {
    #[error(transparent)]
    Inconsistent(#[from] InconsistencyReport),
    #[error("can't query node {node}: {source:#}")]
    NodeQuery {
        node: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("no nodes to check")]
    NoNodes,
    #[error("check did not finish before the deadline, {attempts} attempts started")]
    Timeout { attempts: u64 },
}

/// Returns the value every node agrees on. On disagreement the most common
/// value (first seen wins a tie) is taken as expected and the rest are
/// reported.
fn agreed_value<T: Clone + Eq + std::hash::Hash + fmt::Display>(
    ledger_id: Option<LedgerId>,
    field: &str,
    values: &[(&str, T)],
) -> Result<T, InconsistencyReport> {
    let mut counts = HashMap::<&T, usize>::new();
    for (_, value) in values.iter() {
        *counts.entry(value).or_default() += 1;
    }
    let mut expected: Option<(&T, usize)> = None;
    for (_, value) in values.iter() {
        let count = counts[value];
        if expected.map(|(_, best)| count > best).unwrap_or(true) {
            expected = Some((value, count));
        }
    }
    let expected = match expected {
        None => {
            return Err(InconsistencyReport {
                ledger_id,
                field: field.to_string(),
                expected: String::new(),
                diverging: vec![],
            })
        }
        Some((value, _)) => value.clone(),
    };

    let diverging = values
        .iter()
        .filter(|(_, value)| *value != expected)
        .map(|(node, value)| Divergence {
            node: node.to_string(),
            value: value.to_string(),
        })
        .collect::<Vec<_>>();
    if diverging.is_empty() {
        Ok(expected)
    } else {
        Err(InconsistencyReport {
            ledger_id,
            field: field.to_string(),
            expected: expected.to_string(),
            diverging,
        })
    }
}

fn agreed_field(
    snapshots: &[ReplicaSnapshot],
    field: SnapshotField,
) -> Result<FieldValue, InconsistencyReport> {
    let values = snapshots
        .iter()
        .map(|snapshot| (snapshot.node.as_str(), snapshot.field(field)))
        .collect::<Vec<_>>();
    let ledger_id = snapshots.first().map(|snapshot| snapshot.ledger_id);
    agreed_value(ledger_id, field.name(), &values)
}

fn check_fields(
    snapshots: &[ReplicaSnapshot],
    fields: &[SnapshotField],
) -> Result<(), InconsistencyReport> {
    for field in fields.iter() {
        agreed_field(snapshots, *field)?;
    }
    Ok(())
}

/// Committed size, root hash and state head must match across nodes.
pub fn check_committed(snapshots: &[ReplicaSnapshot]) -> Result<(), InconsistencyReport> {
    check_fields(snapshots, &SnapshotField::COMMITTED)
}

/// Uncommitted size, root hash and state head must match across nodes.
pub fn check_uncommitted(snapshots: &[ReplicaSnapshot]) -> Result<(), InconsistencyReport> {
    check_fields(snapshots, &SnapshotField::UNCOMMITTED)
}

/// With `is_equal` the node must have no pending work: committed and
/// uncommitted roots and heads are equal. Without it they must differ.
pub fn check_clean(snapshot: &ReplicaSnapshot, is_equal: bool) -> Result<(), InconsistencyReport> {
    let pairs = [
        (
            "root_hash",
            &snapshot.committed_root_hash,
            &snapshot.uncommitted_root_hash,
        ),
        (
            "head_hash",
            &snapshot.committed_head_hash,
            &snapshot.uncommitted_head_hash,
        ),
    ];
    for (field, committed, uncommitted) in pairs {
        if (committed == uncommitted) != is_equal {
            return Err(InconsistencyReport {
                ledger_id: Some(snapshot.ledger_id),
                field: format!("committed/uncommitted {field}"),
                expected: if is_equal { "equal" } else { "different" }.to_string(),
                diverging: vec![Divergence {
                    node: snapshot.node.clone(),
                    value: format!("committed {committed}, uncommitted {uncommitted}"),
                }],
            });
        }
    }
    Ok(())
}

/// Raw utxo caches must be byte-identical and the committed amounts per key
/// must match in their normalized string form.
pub fn check_utxo_caches(snapshots: &[ReplicaSnapshot]) -> Result<(), InconsistencyReport> {
    let caches = snapshots
        .iter()
        .map(|snapshot| (snapshot.node.as_str(), CacheContents(&snapshot.utxo_cache)))
        .collect::<Vec<_>>();
    agreed_value(None, "utxo_cache", &caches)?;

    let amounts = snapshots
        .iter()
        .map(|snapshot| (snapshot.node.as_str(), CacheContents(&snapshot.utxo_amounts)))
        .collect::<Vec<_>>();
    agreed_value(None, "utxo_amounts", &amounts)?;
    Ok(())
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheContents<'a, V>(&'a std::collections::BTreeMap<Vec<u8>, V>);

impl<'a, V: AsRef<[u8]>> fmt::Display for CacheContents<'a, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, (key, value)) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{}: {}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value.as_ref())
            )?;
        }
        write!(f, "}}")
    }
}

/// Queries every node at once.
pub async fn capture_all(
    nodes: &[Arc<dyn ReplicaNode>],
    ledger_id: LedgerId,
) -> Result<Vec<ReplicaSnapshot>, ConsistencyError> {
    if nodes.is_empty() {
        return Err(ConsistencyError::NoNodes);
    }
    try_join_all(
        nodes
            .iter()
            .map(|node| ReplicaSnapshot::capture(node.as_ref(), ledger_id)),
    )
    .await
}

/// One-shot committed and uncommitted agreement check for `ledger_id`.
pub async fn check_consistency(
    nodes: &[Arc<dyn ReplicaNode>],
    ledger_id: LedgerId,
) -> Result<(), ConsistencyError> {
    let snapshots = capture_all(nodes, ledger_id).await?;
    check_committed(&snapshots)?;
    check_uncommitted(&snapshots)?;
    Ok(())
}

/// The value of `field` all nodes agree on, e.g. the pool wide committed
/// ledger size.
pub async fn pool_value(
    nodes: &[Arc<dyn ReplicaNode>],
    ledger_id: LedgerId,
    field: SnapshotField,
) -> Result<FieldValue, ConsistencyError> {
    let snapshots = capture_all(nodes, ledger_id).await?;
    Ok(agreed_field(&snapshots, field)?)
}

/// Runs [`check_clean`] for each of `ledgers` on a single node.
pub async fn check_state(
    node: &dyn ReplicaNode,
    ledgers: &[LedgerId],
    is_equal: bool,
) -> Result<(), ConsistencyError> {
    for ledger_id in ledgers.iter() {
        let snapshot = ReplicaSnapshot::capture(node, *ledger_id).await?;
        check_clean(&snapshot, is_equal)?;
    }
    Ok(())
}

async fn check_data_equality(
    nodes: &[Arc<dyn ReplicaNode>],
    ledgers: &[LedgerId],
) -> Result<(), ConsistencyError> {
    if nodes.is_empty() {
        return Err(ConsistencyError::NoNodes);
    }
    for ledger_id in ledgers.iter() {
        let snapshots = capture_all(nodes, *ledger_id).await?;
        check_committed(&snapshots)?;
        check_uncommitted(&snapshots)?;
    }
    let snapshots = capture_all(nodes, LedgerId::TOKEN).await?;
    check_utxo_caches(&snapshots)?;
    Ok(())
}

/// Waits until every node reports the same ledgers, states and utxo caches.
pub async fn ensure_all_nodes_have_same_data(
    nodes: &[Arc<dyn ReplicaNode>],
    ledgers: &[LedgerId],
    config: &ConsistencyConfig,
) -> Result<(), ConsistencyError> {
    eventually(config, move || check_data_equality(nodes, ledgers)).await?;
    tracing::info!(
        "{} nodes agree on {} ledgers and utxo caches",
        nodes.len(),
        ledgers.len()
    );
    Ok(())
}
