use crate::tx_types::{Address, Amount, SeqNo};

/// Errors raised while building or checking fee bearing requests.
///
/// None of these are recoverable locally: every variant describes an
/// accounting precondition the caller violated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    #[error("no utxos available for address {address}")]
    NoUtxoAvailable { address: Address },
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Amount, required: Amount },
    #[error("can't divide {amount} among {outputs} outputs")]
    InvalidTransferAmount { amount: Amount, outputs: usize },
    #[error("fee mismatch: inputs {inputs}, outputs {outputs}, fee {fee}")]
    FeeMismatch {
        inputs: Amount,
        outputs: Amount,
        fee: Amount,
    },
    #[error("utxo {address}:{seq_no} is not in the view")]
    UnknownUtxo { address: Address, seq_no: SeqNo },
    #[error("utxo {address}:{seq_no} already exists")]
    DuplicateUtxo { address: Address, seq_no: SeqNo },
    #[error("destination {address} is listed more than once")]
    DuplicateDestination { address: Address },
    #[error("no inputs provided")]
    NoInputs,
    #[error("no destination addresses provided")]
    NoDestinations,
    #[error("amount overflow")]
    AmountOverflow,
}

pub type FeeResult<T> = Result<T, FeeError>;
