use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use clap::Parser;

use serde_json::json;
use std::fs::File;

use tracing_subscriber::prelude::*;
use utxo_fee_engine::config::ScenarioConfig;
use utxo_fee_engine::fee_schedule::{read_fees, GetFeesHandler, ReadRequest, GET_FEES};
use utxo_fee_engine::fee_utils::request_assembler::build_transfer;
use utxo_fee_engine::fee_utils::utxo_view::AddressUtxoSet;
use utxo_fee_engine::replica::consistency::{
    check_state, ensure_all_nodes_have_same_data, pool_value,
};
use utxo_fee_engine::replica::memory::InMemoryReplica;
use utxo_fee_engine::replica::snapshot::SnapshotField;
use utxo_fee_engine::replica::{LedgerId, ReplicaNode};
use utxo_fee_engine::tx_types::operation_of_type;

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file
    #[clap(long, value_parser)]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let result = _main().await;
    result.unwrap();
}

async fn _main() -> anyhow::Result<()> {
    // Start logging setup block
    let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();

    tracing_subscriber::registry().with(fmt_layer).init();

    let Cli { config_path } = Cli::parse();

    tracing::info!("Config file {:?}", config_path);
    let file = File::open(&config_path).with_context(|| {
        format!(
            "Cannot read config file {path}",
            path = config_path.display()
        )
    })?;
    let config: ScenarioConfig = serde_yaml::from_reader(file).with_context(|| {
        format!(
            "Cannot parse config file {path}",
            path = config_path.display()
        )
    })?;

    let genesis = AddressUtxoSet::from_utxos(config.utxos.clone())?;
    let pool = (1..=config.replicas)
        .map(|index| {
            InMemoryReplica::with_genesis(format!("Node{index}"), genesis.clone()).map(Arc::new)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let nodes = pool
        .iter()
        .map(|node| node.clone() as Arc<dyn ReplicaNode>)
        .collect::<Vec<_>>();
    let first = pool.first().context("scenario needs at least one replica")?;

    for node in pool.iter() {
        node.set_fees(&config.fees)?;
        node.commit(LedgerId::CONFIG)?;
        node.set_multi_signature(Some(json!({
            "participants": pool.iter().map(|node| node.name()).collect::<Vec<_>>(),
        })))?;
    }
    ensure_all_nodes_have_same_data(&nodes, &[LedgerId::CONFIG], &config.consistency).await?;

    let handler = GetFeesHandler::new(first.clone());
    let reply = handler.get_result(&ReadRequest {
        identifier: "scenario".to_string(),
        req_id: 1,
        operation: operation_of_type(GET_FEES),
    })?;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    let (fees, _) = read_fees(first.as_ref(), true, false)?;
    let fee = fees.fee_for(&config.txn_type);
    let request = build_transfer(
        &first.utxo_view(true)?,
        operation_of_type(&config.txn_type),
        &config.inputs.addresses,
        config.inputs.strategy,
        &config.outputs.destinations,
        config.outputs.strategy,
        config.outputs.transfer_amount,
        fee,
    )?;
    println!("{}", serde_json::to_string_pretty(&request)?);

    for node in pool.iter() {
        if let Some(seq_no) = node.apply_request(&request)? {
            tracing::info!("{} holds the transfer outputs at seq_no {}", node.name(), seq_no);
        }
    }
    for node in nodes.iter() {
        check_state(node.as_ref(), &[LedgerId::TOKEN], false).await?;
    }
    let ledgers = [LedgerId::DOMAIN, LedgerId::CONFIG, LedgerId::TOKEN];
    for node in pool.iter() {
        node.commit(LedgerId::DOMAIN)?;
        node.commit(LedgerId::TOKEN)?;
    }
    ensure_all_nodes_have_same_data(&nodes, &ledgers, &config.consistency).await?;
    for node in nodes.iter() {
        check_state(node.as_ref(), &ledgers, true).await?;
    }

    let size = pool_value(&nodes, LedgerId::TOKEN, SnapshotField::CommittedSize).await?;
    tracing::info!("token ledger size {}", size);

    let view = first.utxo_view(true)?;
    for address in config.addresses() {
        println!("{}: {}", address, view.balance(address)?);
    }
    Ok(())
}
