use crate::error::{FeeError, FeeResult};
use crate::fee_utils::input_selection::total_amount;
use crate::tx_types::{Amount, Output, Utxo};

use itertools::Itertools;

/// Checks `sum(inputs) == sum(outputs) + fee` and that no utxo is spent twice.
pub fn verify_io_balance(inputs: &[Utxo], outputs: &[Output], fee: Amount) -> FeeResult<()> {
    if let Some(input) = inputs
        .iter()
        .map(|input| input.input_ref())
        .duplicates()
        .next()
    {
        return Err(FeeError::DuplicateUtxo {
            address: input.address,
            seq_no: input.seq_no,
        });
    }

    let input_total = total_amount(inputs)?;
    let output_total = outputs.iter().try_fold(0 as Amount, |acc, output| {
        acc.checked_add(output.amount).ok_or(FeeError::AmountOverflow)
    })?;

    let balanced = output_total
        .checked_add(fee)
        .map(|spent| spent == input_total)
        .unwrap_or(false);
    if !balanced {
        return Err(FeeError::FeeMismatch {
            inputs: input_total,
            outputs: output_total,
            fee,
        });
    }
    Ok(())
}
