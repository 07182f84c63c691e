use crate::fee_schedule::FeeSchedule;
use crate::fee_utils::input_selection::InputsStrategy;
use crate::fee_utils::output_allocation::OutputsStrategy;
use crate::tx_types::{Address, Amount, TxnType, Utxo, XFER_PUBLIC};
use itertools::Itertools;
use serde::Deserialize;

use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_RETRY_INTERVAL_MS: u64 = 250;
const DEFAULT_REPLICAS: usize = 4;

/// Bounds of the polling loop used while replicas converge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsistencyConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn default_replicas() -> usize {
    DEFAULT_REPLICAS
}

fn default_txn_type() -> TxnType {
    XFER_PUBLIC.to_string()
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }
}

impl ConsistencyConfig {
    pub fn new(timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            retry_interval_ms: retry_interval.as_millis() as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputsConfig {
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub strategy: InputsStrategy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputsConfig {
    pub destinations: Vec<Address>,
    #[serde(default)]
    pub strategy: OutputsStrategy,
    #[serde(default)]
    pub transfer_amount: Amount,
}

/// A transfer scenario replayed against a set of in-memory replicas.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub fees: FeeSchedule,
    pub utxos: Vec<Utxo>,
    #[serde(default = "default_txn_type")]
    pub txn_type: TxnType,
    pub inputs: InputsConfig,
    pub outputs: OutputsConfig,
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default)]
    pub consistency: ConsistencyConfig,
}

impl ScenarioConfig {
    /// Source addresses then destinations, each listed once.
    pub fn addresses(&self) -> Vec<&Address> {
        self.inputs
            .addresses
            .iter()
            .chain(self.outputs.destinations.iter())
            .unique()
            .collect()
    }
}
