use crate::fee_schedule::{FeeSchedule, StateProof, StateStore, FEES_STATE_KEY};
use crate::fee_utils::utxo_view::{AddressUtxoSet, UtxoAmounts, UtxoBatch, UtxoLedgerView};
use crate::replica::{LedgerId, LedgerInfo, ReplicaNode, StateInfo};
use crate::tx_types::{Address, FeeBearingRequest, SeqNo, XFER_PUBLIC};
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

fn chain_hash(previous: &str, data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn empty_hash() -> String {
    hex::encode(Sha256::digest(b""))
}

type StateWrites = Vec<(Vec<u8>, Vec<u8>)>;

struct PendingTxn {
    root_hash: String,
    head_hash: String,
    writes: StateWrites,
}

/// Hash-chained ledger with a key-value state on top.
struct InMemoryLedger {
    size: u64,
    root_hash: String,
    committed_head_hash: String,
    committed_state: HashMap<Vec<u8>, Vec<u8>>,
    pending: VecDeque<PendingTxn>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self {
            size: 0,
            root_hash: empty_hash(),
            committed_head_hash: empty_hash(),
            committed_state: HashMap::new(),
            pending: VecDeque::new(),
        }
    }
}

impl InMemoryLedger {
    fn uncommitted_size(&self) -> u64 {
        self.size + self.pending.len() as u64
    }

    fn uncommitted_root_hash(&self) -> &str {
        self.pending
            .back()
            .map(|txn| txn.root_hash.as_str())
            .unwrap_or(&self.root_hash)
    }

    fn head_hash(&self) -> &str {
        self.pending
            .back()
            .map(|txn| txn.head_hash.as_str())
            .unwrap_or(&self.committed_head_hash)
    }

    fn append(&mut self, txn: &[u8], writes: StateWrites) {
        let root_hash = chain_hash(self.uncommitted_root_hash(), txn);
        let mut head_hash = self.head_hash().to_string();
        for (key, value) in writes.iter() {
            head_hash = chain_hash(&head_hash, key);
            head_hash = chain_hash(&head_hash, value);
        }
        self.pending.push_back(PendingTxn {
            root_hash,
            head_hash,
            writes,
        });
    }

    fn commit(&mut self) -> bool {
        let txn = match self.pending.pop_front() {
            None => return false,
            Some(txn) => txn,
        };
        self.size += 1;
        self.root_hash = txn.root_hash;
        self.committed_head_hash = txn.head_hash;
        self.committed_state.extend(txn.writes);
        true
    }

    fn get(&self, key: &[u8], committed: bool) -> Option<Vec<u8>> {
        if !committed {
            let pending = self
                .pending
                .iter()
                .rev()
                .flat_map(|txn| txn.writes.iter().rev())
                .find(|(written, _)| written.as_slice() == key);
            if let Some((_, value)) = pending {
                return Some(value.clone());
            }
        }
        self.committed_state.get(key).cloned()
    }
}

#[derive(Default)]
struct ReplicaState {
    ledgers: HashMap<LedgerId, InMemoryLedger>,
    utxos: UtxoLedgerView,
    multi_signature: Option<Value>,
}

impl ReplicaState {
    fn ledger(&mut self, ledger_id: LedgerId) -> &mut InMemoryLedger {
        self.ledgers.entry(ledger_id).or_default()
    }
}

/// A ledger-hosting node kept entirely in memory.
pub struct InMemoryReplica {
    name: String,
    inner: Mutex<ReplicaState>,
}

impl InMemoryReplica {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(ReplicaState::default()),
        }
    }

    /// Starts from committed genesis utxos. The token ledger holds one
    /// genesis txn per seq_no, so new outputs never reuse a genesis seq_no.
    pub fn with_genesis(name: impl Into<String>, genesis: AddressUtxoSet) -> anyhow::Result<Self> {
        let replica = Self::new(name);
        {
            let mut state = replica.lock()?;
            let last_seq_no = genesis.utxos().map(|utxo| utxo.seq_no).max().unwrap_or(0);
            let ledger = state.ledger(LedgerId::TOKEN);
            for seq_no in 1..=last_seq_no {
                ledger.append(format!("genesis:{seq_no}").as_bytes(), vec![]);
                ledger.commit();
            }
            state.utxos = UtxoLedgerView::new(genesis);
        }
        Ok(replica)
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, ReplicaState>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("replica {} state is poisoned", self.name))
    }

    /// Writes the fee schedule through a config ledger txn (uncommitted).
    pub fn set_fees(&self, fees: &FeeSchedule) -> anyhow::Result<()> {
        let value = fees.to_state_value()?;
        let mut state = self.lock()?;
        state
            .ledger(LedgerId::CONFIG)
            .append(&value, vec![(FEES_STATE_KEY.to_vec(), value.clone())]);
        Ok(())
    }

    /// Multi-signature over the committed config state root, needed for proofs.
    pub fn set_multi_signature(&self, multi_signature: Option<Value>) -> anyhow::Result<()> {
        self.lock()?.multi_signature = multi_signature;
        Ok(())
    }

    /// Applies a fee bearing request as uncommitted txns. Non-transfer
    /// operations go to the domain ledger. The fee section goes to the token
    /// ledger, unless it is empty and then the token ledger is left alone.
    /// Returns the token seq_no the outputs got, if any.
    pub fn apply_request(&self, request: &FeeBearingRequest) -> anyhow::Result<Option<SeqNo>> {
        let txn = serde_json::to_vec(request)?;
        let is_transfer = request.txn_type() == Some(XFER_PUBLIC);
        let pays_fees = !request.fees.inputs.is_empty() || !request.fees.outputs.is_empty();
        let mut state = self.lock()?;

        let token_txn = if is_transfer || pays_fees {
            let seq_no = state.ledger(LedgerId::TOKEN).uncommitted_size() + 1;
            let batch = UtxoBatch::for_request(request, seq_no);
            let writes = utxo_writes(&batch);
            state.utxos.apply_batch(batch)?;
            Some((seq_no, writes))
        } else {
            None
        };

        if !is_transfer {
            let domain = state.ledger(LedgerId::DOMAIN);
            let key = format!(
                "{}:{}",
                request.txn_type().unwrap_or_default(),
                domain.uncommitted_size() + 1
            );
            domain.append(&txn, vec![(key.into_bytes(), txn.clone())]);
        }

        match token_txn {
            Some((seq_no, writes)) => {
                state.ledger(LedgerId::TOKEN).append(&txn, writes);
                tracing::debug!("{} applied txn {} to the token ledger", self.name, seq_no);
                Ok(Some(seq_no))
            }
            None => {
                tracing::debug!("{} applied a fee free request", self.name);
                Ok(None)
            }
        }
    }

    /// Commits every pending txn of `ledger_id`. Returns how many were committed.
    pub fn commit(&self, ledger_id: LedgerId) -> anyhow::Result<usize> {
        let mut state = self.lock()?;
        let mut committed = 0;
        while state.ledger(ledger_id).commit() {
            if ledger_id == LedgerId::TOKEN {
                state.utxos.commit_batch()?;
            }
            committed += 1;
        }
        Ok(committed)
    }

    pub fn utxo_view(&self, committed: bool) -> anyhow::Result<AddressUtxoSet> {
        Ok(self.lock()?.utxos.view(committed)?)
    }
}

/// Token state records `address:seq_no` to amount, spent outputs as empty values.
fn utxo_writes(batch: &UtxoBatch) -> StateWrites {
    let spent = batch
        .spent
        .iter()
        .map(|input| (input.to_string().into_bytes(), vec![]));
    let created = batch.created.iter().map(|utxo| {
        (
            utxo.input_ref().to_string().into_bytes(),
            utxo.amount.to_string().into_bytes(),
        )
    });
    spent.chain(created).collect()
}

impl StateStore for InMemoryReplica {
    fn get(&self, key: &[u8], committed: bool) -> anyhow::Result<Option<Vec<u8>>> {
        let mut state = self.lock()?;
        Ok(state.ledger(LedgerId::CONFIG).get(key, committed))
    }

    fn get_with_proof(&self, key: &[u8]) -> anyhow::Result<(Option<Vec<u8>>, Option<StateProof>)> {
        let mut state = self.lock()?;
        let multi_signature = state.multi_signature.clone();
        let ledger = state.ledger(LedgerId::CONFIG);
        let value = ledger.get(key, true);
        let proof = multi_signature.map(|multi_signature| StateProof {
            root_hash: ledger.committed_head_hash.clone(),
            multi_signature,
            proof_nodes: chain_hash(
                &ledger.committed_head_hash,
                value.as_deref().unwrap_or_default(),
            ),
        });
        Ok((value, proof))
    }
}

#[async_trait]
impl ReplicaNode for InMemoryReplica {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_ledger(&self, ledger_id: LedgerId) -> anyhow::Result<LedgerInfo> {
        let mut state = self.lock()?;
        let ledger = state.ledger(ledger_id);
        Ok(LedgerInfo {
            size: ledger.size,
            uncommitted_size: ledger.uncommitted_size(),
            root_hash: ledger.root_hash.clone(),
            uncommitted_root_hash: ledger.uncommitted_root_hash().to_string(),
        })
    }

    async fn get_state(&self, ledger_id: LedgerId) -> anyhow::Result<StateInfo> {
        let mut state = self.lock()?;
        let ledger = state.ledger(ledger_id);
        Ok(StateInfo {
            head_hash: ledger.head_hash().to_string(),
            committed_head_hash: ledger.committed_head_hash.clone(),
        })
    }

    async fn get_utxo_cache_entries(&self) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.lock()?.utxos.committed().cache_entries())
    }

    async fn get_utxo_amounts(&self, key: &[u8], committed: bool) -> anyhow::Result<UtxoAmounts> {
        let address = Address::new(String::from_utf8(key.to_vec())?);
        let view = self.lock()?.utxos.view(committed)?;
        Ok(view.amounts(&address).cloned().unwrap_or_default())
    }
}
