use crate::error::{FeeError, FeeResult};
use crate::fee_schedule::FeeSchedule;
use crate::fee_utils::balance_verification::verify_io_balance;
use crate::fee_utils::input_selection::{resolve_inputs, select_inputs, total_amount, InputsStrategy};
use crate::fee_utils::output_allocation::{allocate_outputs, OutputsStrategy};
use crate::fee_utils::utxo_view::AddressUtxoSet;
use crate::tx_types::{Address, Amount, FeeBearingRequest, FeeSection, Output, SeqNo, Utxo};
use serde_json::{Map, Value};

/// Pays `fee_amount` out of `inputs`, returning whatever is left to
/// `change_address` as a single output. Fee that consumes the inputs
/// entirely leaves no output.
pub fn attach_fees(
    operation: Map<String, Value>,
    inputs: &[Utxo],
    fee_amount: Amount,
    change_address: &Address,
) -> FeeResult<FeeBearingRequest> {
    if inputs.is_empty() {
        return Err(FeeError::NoInputs);
    }
    let input_total = total_amount(inputs)?;
    let change = input_total
        .checked_sub(fee_amount)
        .ok_or(FeeError::InsufficientFunds {
            available: input_total,
            required: fee_amount,
        })?;

    let outputs = if change > 0 {
        vec![Output::new(change_address.clone(), change)]
    } else {
        vec![]
    };
    verify_io_balance(inputs, &outputs, fee_amount)?;

    Ok(FeeBearingRequest {
        operation,
        fees: FeeSection {
            inputs: inputs.iter().map(Utxo::input_ref).collect(),
            outputs,
            fee: fee_amount,
        },
    })
}

/// Charges the scheduled fee for the operation's type, spending every utxo of
/// `address`. Change returns to `change_address`, or to `address` itself.
pub fn add_fees_with_address(
    view: &AddressUtxoSet,
    schedule: &FeeSchedule,
    operation: Map<String, Value>,
    address: &Address,
    change_address: Option<&Address>,
) -> FeeResult<FeeBearingRequest> {
    let txn_type = operation
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let fee = schedule.fee_for(txn_type);
    let inputs = select_inputs(view, std::slice::from_ref(address), InputsStrategy::AllUtxos)?;
    let utxos = resolve_inputs(view, &inputs)?;
    attach_fees(operation, &utxos, fee, change_address.unwrap_or(address))
}

/// Builds a transfer from `sources` to `destinations` paying `fee`.
#[allow(clippy::too_many_arguments)]
pub fn build_transfer(
    view: &AddressUtxoSet,
    operation: Map<String, Value>,
    sources: &[Address],
    inputs_strategy: InputsStrategy,
    destinations: &[Address],
    outputs_strategy: OutputsStrategy,
    transfer_amount: Amount,
    fee: Amount,
) -> FeeResult<FeeBearingRequest> {
    let inputs = select_inputs(view, sources, inputs_strategy)?;
    let utxos = resolve_inputs(view, &inputs)?;
    let outputs = allocate_outputs(
        &inputs,
        total_amount(&utxos)?,
        fee,
        transfer_amount,
        destinations,
        outputs_strategy,
    )?;
    verify_io_balance(&utxos, &outputs, fee)?;

    tracing::debug!(
        "transfer of {} to {} destinations spends {} inputs, fee {}",
        transfer_amount,
        destinations.len(),
        inputs.len(),
        fee
    );

    Ok(FeeBearingRequest {
        operation,
        fees: FeeSection {
            inputs,
            outputs,
            fee,
        },
    })
}

/// Pays fees for a run of requests out of one running utxo.
///
/// Each charged request spends the change output of the previous one, which
/// the ledger records under the next seq_no.
#[derive(Clone, Debug)]
pub struct FeeChain {
    address: Address,
    amount: Amount,
    seq_no: SeqNo,
}

impl FeeChain {
    pub fn new(address: Address, amount: Amount, seq_no: SeqNo) -> Self {
        Self {
            address,
            amount,
            seq_no,
        }
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn seq_no(&self) -> SeqNo {
        self.seq_no
    }

    pub fn attach(
        &mut self,
        operation: Map<String, Value>,
        schedule: &FeeSchedule,
    ) -> FeeResult<FeeBearingRequest> {
        let txn_type = operation
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fee = schedule.fee_for(txn_type);
        if fee == 0 {
            return Ok(FeeBearingRequest {
                operation,
                fees: FeeSection {
                    inputs: vec![],
                    outputs: vec![],
                    fee: 0,
                },
            });
        }

        let utxo = Utxo {
            address: self.address.clone(),
            seq_no: self.seq_no,
            amount: self.amount,
        };
        let request = attach_fees(operation, &[utxo], fee, &self.address)?;
        self.amount -= fee;
        self.seq_no += 1;
        Ok(request)
    }
}
