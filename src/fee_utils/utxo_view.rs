use crate::error::{FeeError, FeeResult};
use crate::tx_types::{Address, Amount, FeeBearingRequest, InputRef, SeqNo, Utxo};
use anyhow::anyhow;

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;

/// Unspent outputs of a single address, kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtxoAmounts {
    amounts: Vec<(SeqNo, Amount)>,
}

impl UtxoAmounts {
    pub fn seq_nos(&self) -> impl Iterator<Item = SeqNo> + '_ {
        self.amounts.iter().map(|(seq_no, _)| *seq_no)
    }

    pub fn first_seq_no(&self) -> Option<SeqNo> {
        self.amounts.first().map(|(seq_no, _)| *seq_no)
    }

    pub fn amount(&self, seq_no: SeqNo) -> Option<Amount> {
        self.amounts
            .iter()
            .find(|(known, _)| *known == seq_no)
            .map(|(_, amount)| *amount)
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    pub fn total(&self) -> FeeResult<Amount> {
        self.amounts.iter().try_fold(0 as Amount, |acc, (_, amount)| {
            acc.checked_add(*amount).ok_or(FeeError::AmountOverflow)
        })
    }

    fn insert(&mut self, seq_no: SeqNo, amount: Amount) -> bool {
        if self.amount(seq_no).is_some() {
            return false;
        }
        self.amounts.push((seq_no, amount));
        true
    }

    fn remove(&mut self, seq_no: SeqNo) -> Option<Amount> {
        let position = self.amounts.iter().position(|(known, _)| *known == seq_no)?;
        Some(self.amounts.remove(position).1)
    }

    /// Normalized `seq_no:amount:seq_no:amount` form, the cache value format.
    pub fn as_str(&self) -> String {
        self.amounts
            .iter()
            .map(|(seq_no, amount)| format!("{seq_no}:{amount}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        if value.is_empty() {
            return Ok(Self::default());
        }
        let parts = value.split(':').collect::<Vec<_>>();
        if parts.len() % 2 != 0 {
            return Err(anyhow!("odd number of utxo fields in {:?}", value));
        }
        let mut amounts = Self::default();
        for pair in parts.chunks(2) {
            let seq_no = SeqNo::from_str(pair[0])?;
            let amount = Amount::from_str(pair[1])?;
            if !amounts.insert(seq_no, amount) {
                return Err(anyhow!("seq_no {} repeated in {:?}", seq_no, value));
            }
        }
        Ok(amounts)
    }
}

/// Immutable-by-convention snapshot of the unspent outputs per address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressUtxoSet {
    by_address: HashMap<Address, UtxoAmounts>,
}

impl AddressUtxoSet {
    pub fn from_utxos(utxos: impl IntoIterator<Item = Utxo>) -> FeeResult<Self> {
        let mut set = Self::default();
        for utxo in utxos {
            set.insert(utxo)?;
        }
        Ok(set)
    }

    pub fn amounts(&self, address: &Address) -> Option<&UtxoAmounts> {
        self.by_address.get(address)
    }

    pub fn utxos(&self) -> impl Iterator<Item = Utxo> + '_ {
        self.by_address.iter().flat_map(|(address, amounts)| {
            amounts.amounts.iter().map(move |(seq_no, amount)| Utxo {
                address: address.clone(),
                seq_no: *seq_no,
                amount: *amount,
            })
        })
    }

    pub fn seq_nos(&self, address: &Address) -> Vec<SeqNo> {
        self.by_address
            .get(address)
            .map(|amounts| amounts.seq_nos().collect())
            .unwrap_or_default()
    }

    pub fn amount(&self, input: &InputRef) -> Option<Amount> {
        self.by_address
            .get(&input.address)
            .and_then(|amounts| amounts.amount(input.seq_no))
    }

    pub fn balance(&self, address: &Address) -> FeeResult<Amount> {
        match self.by_address.get(address) {
            None => Ok(0),
            Some(amounts) => amounts.total(),
        }
    }

    pub fn insert(&mut self, utxo: Utxo) -> FeeResult<()> {
        let amounts = self.by_address.entry(utxo.address.clone()).or_default();
        if !amounts.insert(utxo.seq_no, utxo.amount) {
            return Err(FeeError::DuplicateUtxo {
                address: utxo.address,
                seq_no: utxo.seq_no,
            });
        }
        Ok(())
    }

    pub fn spend(&mut self, input: &InputRef) -> FeeResult<Amount> {
        let unknown = || FeeError::UnknownUtxo {
            address: input.address.clone(),
            seq_no: input.seq_no,
        };
        let amounts = self.by_address.get_mut(&input.address).ok_or_else(unknown)?;
        let amount = amounts.remove(input.seq_no).ok_or_else(unknown)?;
        if amounts.is_empty() {
            self.by_address.remove(&input.address);
        }
        Ok(amount)
    }

    /// Raw cache contents sorted by key: address bytes to normalized amounts.
    pub fn cache_entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut entries = self
            .by_address
            .iter()
            .filter(|(_, amounts)| !amounts.is_empty())
            .map(|(address, amounts)| (address.as_bytes().to_vec(), amounts.as_str().into_bytes()))
            .collect::<Vec<_>>();
        entries.sort();
        entries
    }

    fn apply(&mut self, batch: &UtxoBatch) -> FeeResult<()> {
        for input in batch.spent.iter() {
            self.spend(input)?;
        }
        for utxo in batch.created.iter() {
            self.insert(utxo.clone())?;
        }
        Ok(())
    }
}

/// Outputs spent and created by one applied request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtxoBatch {
    pub spent: Vec<InputRef>,
    pub created: Vec<Utxo>,
}

impl UtxoBatch {
    /// Outputs of a request become utxos under the seq_no of the txn carrying it.
    pub fn for_request(request: &FeeBearingRequest, seq_no: SeqNo) -> Self {
        Self {
            spent: request.fees.inputs.clone(),
            created: request
                .fees
                .outputs
                .iter()
                .map(|output| Utxo {
                    address: output.address.clone(),
                    seq_no,
                    amount: output.amount,
                })
                .collect(),
        }
    }
}

/// Committed utxo set plus the in-flight batches applied on top of it.
#[derive(Clone, Debug, Default)]
pub struct UtxoLedgerView {
    committed: AddressUtxoSet,
    pending: VecDeque<UtxoBatch>,
}

impl UtxoLedgerView {
    pub fn new(committed: AddressUtxoSet) -> Self {
        Self {
            committed,
            pending: VecDeque::new(),
        }
    }

    pub fn committed(&self) -> &AddressUtxoSet {
        &self.committed
    }

    /// Committed set with every pending batch replayed on top. Fails when a
    /// pending batch no longer replays.
    pub fn uncommitted(&self) -> FeeResult<AddressUtxoSet> {
        let mut view = self.committed.clone();
        for batch in self.pending.iter() {
            view.apply(batch)?;
        }
        Ok(view)
    }

    pub fn view(&self, committed: bool) -> FeeResult<AddressUtxoSet> {
        if committed {
            Ok(self.committed.clone())
        } else {
            self.uncommitted()
        }
    }

    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }

    /// Applies a batch to the uncommitted view. Spends are checked against
    /// the uncommitted view so in-flight outputs can't be spent twice.
    pub fn apply_batch(&mut self, batch: UtxoBatch) -> FeeResult<()> {
        let mut view = self.uncommitted()?;
        view.apply(&batch)?;
        self.pending.push_back(batch);
        Ok(())
    }

    /// Finalizes the oldest in-flight batch. Returns false when nothing is pending.
    pub fn commit_batch(&mut self) -> FeeResult<bool> {
        let batch = match self.pending.pop_front() {
            None => return Ok(false),
            Some(batch) => batch,
        };
        self.committed.apply(&batch)?;
        Ok(true)
    }

    pub fn revert_batch(&mut self) -> Option<UtxoBatch> {
        self.pending.pop_back()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FeeError;
    use crate::fee_utils::utxo_view::{AddressUtxoSet, UtxoAmounts, UtxoBatch, UtxoLedgerView};
    use crate::tx_types::{Address, InputRef, Utxo};

    fn utxo(address: &str, seq_no: u64, amount: u64) -> Utxo {
        Utxo {
            address: Address::new(address),
            seq_no,
            amount,
        }
    }

    fn input(address: &str, seq_no: u64) -> InputRef {
        InputRef {
            address: Address::new(address),
            seq_no,
        }
    }

    #[test]
    fn amounts_keep_insertion_order() {
        let set =
            AddressUtxoSet::from_utxos(vec![utxo("a", 5, 10), utxo("a", 2, 20), utxo("b", 1, 1)])
                .unwrap();
        assert_eq!(set.seq_nos(&Address::new("a")), vec![5, 2]);
        assert_eq!(set.balance(&Address::new("a")).unwrap(), 30);
        assert_eq!(set.amount(&input("a", 2)), Some(20));
        assert!(set.seq_nos(&Address::new("c")).is_empty());
    }

    #[test]
    fn duplicate_utxo_rejected() {
        let result = AddressUtxoSet::from_utxos(vec![utxo("a", 1, 10), utxo("a", 1, 11)]);
        assert_eq!(
            result.err(),
            Some(FeeError::DuplicateUtxo {
                address: Address::new("a"),
                seq_no: 1
            })
        );
    }

    #[test]
    fn amounts_string_form() {
        let set = AddressUtxoSet::from_utxos(vec![utxo("a", 1, 10), utxo("a", 3, 7)]).unwrap();
        let amounts = set.amounts(&Address::new("a")).unwrap();
        assert_eq!(amounts.as_str(), "1:10:3:7");
        assert_eq!(&UtxoAmounts::parse("1:10:3:7").unwrap(), amounts);
        assert!(UtxoAmounts::parse("1:10:3").is_err());
        assert!(UtxoAmounts::parse("").unwrap().is_empty());
        assert_eq!(
            set.cache_entries(),
            vec![(b"a".to_vec(), b"1:10:3:7".to_vec())]
        );
    }

    #[test]
    fn pending_batches_only_visible_uncommitted() {
        let committed = AddressUtxoSet::from_utxos(vec![utxo("a", 1, 100)]).unwrap();
        let mut view = UtxoLedgerView::new(committed);
        view.apply_batch(UtxoBatch {
            spent: vec![input("a", 1)],
            created: vec![utxo("b", 2, 90)],
        })
        .unwrap();

        assert_eq!(view.view(true).unwrap().amount(&input("a", 1)), Some(100));
        assert_eq!(view.view(false).unwrap().amount(&input("a", 1)), None);
        assert_eq!(view.view(false).unwrap().amount(&input("b", 2)), Some(90));

        assert!(view.commit_batch().unwrap());
        assert_eq!(view.committed(), &view.uncommitted().unwrap());
        assert!(!view.commit_batch().unwrap());
    }

    #[test]
    fn in_flight_output_cant_be_spent_twice() {
        let committed = AddressUtxoSet::from_utxos(vec![utxo("a", 1, 100)]).unwrap();
        let mut view = UtxoLedgerView::new(committed);
        let batch = UtxoBatch {
            spent: vec![input("a", 1)],
            created: vec![utxo("a", 2, 99)],
        };
        view.apply_batch(batch.clone()).unwrap();
        assert_eq!(
            view.apply_batch(batch).err(),
            Some(FeeError::UnknownUtxo {
                address: Address::new("a"),
                seq_no: 1
            })
        );
        assert_eq!(view.pending_batches(), 1);

        assert!(view.revert_batch().is_some());
        assert_eq!(view.uncommitted().unwrap(), *view.committed());
    }

    #[test]
    fn corrupt_pending_batch_is_reported() {
        let committed = AddressUtxoSet::from_utxos(vec![utxo("a", 1, 100)]).unwrap();
        let mut view = UtxoLedgerView::new(committed);
        view.pending.push_back(UtxoBatch {
            spent: vec![input("a", 7)],
            created: vec![utxo("b", 2, 100)],
        });

        let expected = FeeError::UnknownUtxo {
            address: Address::new("a"),
            seq_no: 7,
        };
        assert_eq!(view.uncommitted().err(), Some(expected.clone()));
        assert_eq!(view.view(false).err(), Some(expected));
        assert!(view.view(true).is_ok());
        assert!(view
            .apply_batch(UtxoBatch {
                spent: vec![input("a", 1)],
                created: vec![],
            })
            .is_err());
    }
}
