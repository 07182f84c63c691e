use crate::error::{FeeError, FeeResult};
use crate::fee_utils::input_selection::{resolve_inputs, total_amount};
use crate::fee_utils::utxo_view::AddressUtxoSet;
use crate::tx_types::{Address, Amount, InputRef, Output};
use serde::{Deserialize, Serialize};

use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputsStrategy {
    /// divide the transfer amount among the destinations, the change goes
    /// back to an input address
    TransferEqual,
    /// divide everything left after the fee among the destinations
    TransferAllEqual,
}

impl Default for OutputsStrategy {
    fn default() -> Self {
        Self::TransferEqual
    }
}

/// Splits `amount` into equal shares. The remainder of the integer division
/// goes to the last address.
pub fn divide_equal(addresses: &[Address], amount: Amount) -> FeeResult<Vec<Output>> {
    if addresses.is_empty() {
        return Err(FeeError::NoDestinations);
    }
    let count = addresses.len() as Amount;
    let share = amount / count;
    if share == 0 {
        return Err(FeeError::InvalidTransferAmount {
            amount,
            outputs: addresses.len(),
        });
    }
    let mut outputs = addresses
        .iter()
        .map(|address| Output::new(address.clone(), share))
        .collect::<Vec<_>>();
    if let Some(last) = outputs.last_mut() {
        last.amount += amount % count;
    }
    Ok(outputs)
}

/// Change goes to the first destination (in destination order) that also
/// owns an input, otherwise to the owner of the first input.
pub fn choose_change_address(inputs: &[InputRef], destinations: &[Address]) -> Option<Address> {
    let input_owners = inputs
        .iter()
        .map(|input| &input.address)
        .collect::<HashSet<_>>();
    destinations
        .iter()
        .find(|address| input_owners.contains(address))
        .or_else(|| inputs.first().map(|input| &input.address))
        .cloned()
}

fn check_destinations(destinations: &[Address]) -> FeeResult<()> {
    if destinations.is_empty() {
        return Err(FeeError::NoDestinations);
    }
    let mut seen = HashSet::new();
    for address in destinations.iter() {
        if !seen.insert(address) {
            return Err(FeeError::DuplicateDestination {
                address: address.clone(),
            });
        }
    }
    Ok(())
}

/// Computes the outputs of a transfer paying `fee` out of `total_input_amount`.
///
/// Outputs come in destination order, followed by the change address when it
/// isn't a destination. All amounts are strictly positive and they sum to
/// `total_input_amount - fee`.
pub fn allocate_outputs(
    inputs: &[InputRef],
    total_input_amount: Amount,
    fee: Amount,
    transfer_amount: Amount,
    destinations: &[Address],
    strategy: OutputsStrategy,
) -> FeeResult<Vec<Output>> {
    check_destinations(destinations)?;
    if inputs.is_empty() {
        return Err(FeeError::NoInputs);
    }

    let spendable = total_input_amount
        .checked_sub(fee)
        .ok_or(FeeError::InsufficientFunds {
            available: total_input_amount,
            required: fee,
        })?;

    let transfer_amount = match strategy {
        OutputsStrategy::TransferEqual => transfer_amount,
        OutputsStrategy::TransferAllEqual => {
            if spendable == 0 {
                return Err(FeeError::InsufficientFunds {
                    available: total_input_amount,
                    required: fee.saturating_add(1),
                });
            }
            spendable
        }
    };
    if transfer_amount == 0 {
        return Err(FeeError::InvalidTransferAmount {
            amount: transfer_amount,
            outputs: destinations.len(),
        });
    }

    let change = spendable
        .checked_sub(transfer_amount)
        .ok_or(FeeError::InsufficientFunds {
            available: total_input_amount,
            required: transfer_amount.saturating_add(fee),
        })?;

    let mut outputs = divide_equal(destinations, transfer_amount)?;

    if change > 0 {
        let change_address =
            choose_change_address(inputs, destinations).ok_or(FeeError::NoInputs)?;
        tracing::debug!("change {} goes to {}", change, change_address);
        match outputs
            .iter_mut()
            .find(|output| output.address == change_address)
        {
            Some(output) => output.amount += change,
            None => {
                let mut output = Output::new(change_address, 0);
                output.amount += change;
                outputs.push(output);
            }
        }
    }

    Ok(outputs)
}

/// [`allocate_outputs`] with the input total looked up in `view`.
pub fn prepare_outputs(
    view: &AddressUtxoSet,
    inputs: &[InputRef],
    fee: Amount,
    destinations: &[Address],
    strategy: OutputsStrategy,
    transfer_amount: Amount,
) -> FeeResult<Vec<Output>> {
    let total_input_amount = total_amount(&resolve_inputs(view, inputs)?)?;
    allocate_outputs(
        inputs,
        total_input_amount,
        fee,
        transfer_amount,
        destinations,
        strategy,
    )
}
