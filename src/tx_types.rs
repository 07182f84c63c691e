use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use std::fmt;

pub type SeqNo = u64;
pub type Amount = u64;

/// Transaction type used as a fee schedule key. The engine never interprets it.
pub type TxnType = String;

pub const NYM: &str = "1";
pub const XFER_PUBLIC: &str = "10001";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Utxo {
    pub address: Address,
    #[serde(rename = "seqNo")]
    pub seq_no: SeqNo,
    pub amount: Amount,
}

impl Utxo {
    pub fn input_ref(&self) -> InputRef {
        InputRef {
            address: self.address.clone(),
            seq_no: self.seq_no,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRef {
    pub address: Address,
    #[serde(rename = "seqNo")]
    pub seq_no: SeqNo,
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.seq_no)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Output {
    pub address: Address,
    pub amount: Amount,
}

impl Output {
    pub fn new(address: Address, amount: Amount) -> Self {
        Self { address, amount }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSection {
    pub inputs: Vec<InputRef>,
    pub outputs: Vec<Output>,
    pub fee: Amount,
}

/// A ledger changing request with the fee section attached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeeBearingRequest {
    pub operation: Map<String, Value>,
    pub fees: FeeSection,
}

impl FeeBearingRequest {
    pub fn txn_type(&self) -> Option<&str> {
        self.operation.get("type").and_then(Value::as_str)
    }
}

pub fn operation_of_type(txn_type: &str) -> Map<String, Value> {
    let mut operation = Map::new();
    operation.insert("type".to_string(), Value::String(txn_type.to_string()));
    operation
}

#[cfg(test)]
mod tests {
    use crate::tx_types::{operation_of_type, Address, FeeBearingRequest, FeeSection, InputRef, Output};

    #[test]
    fn input_ref_uses_wire_names() {
        let input = InputRef {
            address: Address::new("addrA"),
            seq_no: 3,
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json, serde_json::json!({"address": "addrA", "seqNo": 3}));
        assert_eq!(input.to_string(), "addrA:3");
    }

    #[test]
    fn request_exposes_txn_type() {
        let request = FeeBearingRequest {
            operation: operation_of_type("1"),
            fees: FeeSection {
                inputs: vec![],
                outputs: vec![Output::new(Address::new("addrA"), 1)],
                fee: 0,
            },
        };
        assert_eq!(request.txn_type(), Some("1"));
    }
}
