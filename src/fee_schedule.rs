use crate::tx_types::{Amount, TxnType};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use std::collections::BTreeMap;
use std::sync::Arc;

pub const GET_FEES: &str = "20001";

pub const FEES: &str = "fees";
pub const STATE_PROOF: &str = "state_proof";
pub const IDENTIFIER: &str = "identifier";
pub const REQ_ID: &str = "reqId";

/// Key of the fee mapping in the config ledger state.
pub const FEES_STATE_KEY: &[u8] = b"fees";

/// Fee per transaction type, as stored in replicated state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeSchedule {
    fees: BTreeMap<TxnType, Amount>,
}

impl FeeSchedule {
    pub fn new(fees: BTreeMap<TxnType, Amount>) -> Self {
        Self { fees }
    }

    pub fn get(&self, txn_type: &str) -> Option<Amount> {
        self.fees.get(txn_type).cloned()
    }

    /// Types without an entry are free.
    pub fn fee_for(&self, txn_type: &str) -> Amount {
        self.get(txn_type).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.fees.is_empty()
    }

    pub fn from_state_value(value: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(value).context("fee state value is not a fee mapping")
    }

    pub fn to_state_value(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl FromIterator<(TxnType, Amount)> for FeeSchedule {
    fn from_iter<T: IntoIterator<Item = (TxnType, Amount)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Proof binding a state value to a signed state root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateProof {
    pub root_hash: String,
    pub multi_signature: Value,
    pub proof_nodes: String,
}

/// Read side of the replicated state.
pub trait StateStore {
    fn get(&self, key: &[u8], committed: bool) -> anyhow::Result<Option<Vec<u8>>>;

    /// Reads the committed value together with a proof. The proof is `None`
    /// when no multi-signature over the current root is available.
    fn get_with_proof(&self, key: &[u8]) -> anyhow::Result<(Option<Vec<u8>>, Option<StateProof>)>;
}

impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    fn get(&self, key: &[u8], committed: bool) -> anyhow::Result<Option<Vec<u8>>> {
        self.as_ref().get(key, committed)
    }

    fn get_with_proof(&self, key: &[u8]) -> anyhow::Result<(Option<Vec<u8>>, Option<StateProof>)> {
        self.as_ref().get_with_proof(key)
    }
}

fn parse_fees(value: Option<Vec<u8>>) -> anyhow::Result<FeeSchedule> {
    match value {
        None => Ok(FeeSchedule::default()),
        Some(value) => FeeSchedule::from_state_value(&value),
    }
}

/// Reads the fee schedule at the committed or uncommitted head.
///
/// Proofs only exist for committed state. A failing proof read degrades to
/// a plain read without a proof.
pub fn read_fees<S: StateStore + ?Sized>(
    state: &S,
    committed: bool,
    with_proof: bool,
) -> anyhow::Result<(FeeSchedule, Option<StateProof>)> {
    if with_proof && committed {
        match state.get_with_proof(FEES_STATE_KEY) {
            Ok((value, proof)) => return Ok((parse_fees(value)?, proof)),
            Err(err) => {
                tracing::warn!("can't build fees state proof, reading without it: {:?}", err);
            }
        }
    } else if with_proof {
        tracing::debug!("state proofs are not produced for uncommitted fees");
    }
    let value = state.get(FEES_STATE_KEY, committed)?;
    Ok((parse_fees(value)?, None))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub identifier: String,
    #[serde(rename = "reqId")]
    pub req_id: u64,
    pub operation: Map<String, Value>,
}

/// Answers fee schedule queries from committed state.
pub struct GetFeesHandler<S> {
    state: S,
}

impl<S: StateStore> GetFeesHandler<S> {
    pub fn new(state: S) -> Self {
        Self { state }
    }

    pub fn get_result(&self, request: &ReadRequest) -> anyhow::Result<Map<String, Value>> {
        let (fees, proof) = read_fees(&self.state, true, true)?;
        let mut result = Map::new();
        result.insert(
            IDENTIFIER.to_string(),
            Value::String(request.identifier.clone()),
        );
        result.insert(REQ_ID.to_string(), Value::from(request.req_id));
        result.insert(FEES.to_string(), serde_json::to_value(&fees)?);
        if let Some(proof) = proof {
            result.insert(STATE_PROOF.to_string(), serde_json::to_value(&proof)?);
        }
        for (key, value) in request.operation.iter() {
            result.insert(key.clone(), value.clone());
        }
        Ok(result)
    }
}
