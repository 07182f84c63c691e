use crate::error::{FeeError, FeeResult};
use crate::fee_utils::utxo_view::AddressUtxoSet;
use crate::tx_types::{Address, Amount, InputRef, Utxo};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputsStrategy {
    /// every unspent output of each address
    AllUtxos,
    /// only the earliest known unspent output of each address
    FirstUtxoOnly,
}

impl Default for InputsStrategy {
    fn default() -> Self {
        Self::AllUtxos
    }
}

/// Picks the utxos to spend from `addresses`, in address order and, per
/// address, in the order the outputs were recorded.
///
/// An address without unspent outputs is an error rather than being skipped.
pub fn select_inputs(
    view: &AddressUtxoSet,
    addresses: &[Address],
    strategy: InputsStrategy,
) -> FeeResult<Vec<InputRef>> {
    let mut inputs = vec![];
    for address in addresses.iter() {
        let amounts = match view.amounts(address) {
            Some(amounts) if !amounts.is_empty() => amounts,
            _ => {
                return Err(FeeError::NoUtxoAvailable {
                    address: address.clone(),
                })
            }
        };
        match strategy {
            InputsStrategy::AllUtxos => {
                inputs.extend(amounts.seq_nos().map(|seq_no| InputRef {
                    address: address.clone(),
                    seq_no,
                }));
            }
            InputsStrategy::FirstUtxoOnly => {
                if let Some(seq_no) = amounts.first_seq_no() {
                    inputs.push(InputRef {
                        address: address.clone(),
                        seq_no,
                    });
                }
            }
        }
    }
    tracing::debug!(
        "selected {} inputs from {} addresses using {:?}",
        inputs.len(),
        addresses.len(),
        strategy
    );
    Ok(inputs)
}

/// Looks up the amount of every input in the view.
pub fn resolve_inputs(view: &AddressUtxoSet, inputs: &[InputRef]) -> FeeResult<Vec<Utxo>> {
    inputs
        .iter()
        .map(|input| {
            view.amount(input)
                .map(|amount| Utxo {
                    address: input.address.clone(),
                    seq_no: input.seq_no,
                    amount,
                })
                .ok_or_else(|| FeeError::UnknownUtxo {
                    address: input.address.clone(),
                    seq_no: input.seq_no,
                })
        })
        .collect()
}

pub fn total_amount(utxos: &[Utxo]) -> FeeResult<Amount> {
    utxos.iter().try_fold(0 as Amount, |acc, utxo| {
        acc.checked_add(utxo.amount).ok_or(FeeError::AmountOverflow)
    })
}

#[cfg(test)]
mod tests {
    use crate::error::FeeError;
    use crate::fee_utils::input_selection::{
        resolve_inputs, select_inputs, total_amount, InputsStrategy,
    };
    use crate::fee_utils::utxo_view::AddressUtxoSet;
    use crate::tx_types::{Address, InputRef, Utxo};

    fn view() -> AddressUtxoSet {
        AddressUtxoSet::from_utxos(vec![
            Utxo {
                address: Address::new("a"),
                seq_no: 4,
                amount: 10,
            },
            Utxo {
                address: Address::new("b"),
                seq_no: 2,
                amount: 5,
            },
            Utxo {
                address: Address::new("a"),
                seq_no: 1,
                amount: 20,
            },
        ])
        .unwrap()
    }

    fn input(address: &str, seq_no: u64) -> InputRef {
        InputRef {
            address: Address::new(address),
            seq_no,
        }
    }

    #[test]
    fn all_utxos_in_insertion_order() {
        let inputs = select_inputs(
            &view(),
            &[Address::new("a"), Address::new("b")],
            InputsStrategy::AllUtxos,
        )
        .unwrap();
        assert_eq!(inputs, vec![input("a", 4), input("a", 1), input("b", 2)]);
    }

    #[test]
    fn first_utxo_only() {
        let inputs = select_inputs(
            &view(),
            &[Address::new("b"), Address::new("a")],
            InputsStrategy::FirstUtxoOnly,
        )
        .unwrap();
        assert_eq!(inputs, vec![input("b", 2), input("a", 4)]);
    }

    #[test]
    fn selection_is_repeatable() {
        let view = view();
        let addresses = [Address::new("a"), Address::new("b")];
        let first = select_inputs(&view, &addresses, InputsStrategy::AllUtxos).unwrap();
        let second = select_inputs(&view, &addresses, InputsStrategy::AllUtxos).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_address_fails() {
        for strategy in [InputsStrategy::AllUtxos, InputsStrategy::FirstUtxoOnly] {
            let result = select_inputs(&view(), &[Address::new("a"), Address::new("c")], strategy);
            assert_eq!(
                result.err(),
                Some(FeeError::NoUtxoAvailable {
                    address: Address::new("c")
                })
            );
        }
    }

    #[test]
    fn resolves_amounts() {
        let view = view();
        let utxos = resolve_inputs(&view, &[input("a", 1), input("b", 2)]).unwrap();
        assert_eq!(total_amount(&utxos).unwrap(), 25);
        assert_eq!(
            resolve_inputs(&view, &[input("b", 3)]).err(),
            Some(FeeError::UnknownUtxo {
                address: Address::new("b"),
                seq_no: 3
            })
        );
    }

    #[test]
    fn strategy_names() {
        let strategy: InputsStrategy = serde_yaml::from_str("first_utxo_only").unwrap();
        assert_eq!(strategy, InputsStrategy::FirstUtxoOnly);
        assert!(serde_yaml::from_str::<InputsStrategy>("largest_first").is_err());
    }
}
