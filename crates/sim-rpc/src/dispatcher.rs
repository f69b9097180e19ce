//! Path: crates/sim-rpc/src/dispatcher.rs
//! The method table of §6.1: every JSON-RPC method the Sim exposes, routed
//! through the single `World` mutex (`crate::world`). Submission-bearing
//! methods allocate a transaction record, run Consensus, and advance the
//! block counter (§4.5); read-only methods never do either.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use sim_codec::{
    decode_add_transaction, decode_gen_call_data, decode_inner_payload, decode_raw_transaction,
    decode_status_prefixed, decode_value, encode_method_call, encode_success_bytes, pad_address_topic,
    InnerPayload,
};
use sim_engine::ContractHost;
use sim_liveio::MockTable;
use sim_types::{
    Address, CalldataValue, ContractSchema, Hash32, MethodCall, ResultStatus, Transaction, TriggeredOp,
    TxKind, TxStatus, ADDRESS_ZERO, CONSENSUS_CONTRACT_ADDR_HEX,
};

use crate::error::DispatchError;
use crate::params::Params;
use crate::sim_config;
use crate::wire::{
    calldata_to_json, hex_quantity, json_to_calldata_args, json_to_calldata_kwargs, optional_address,
    optional_str, parse_hash, request_object, required_address, required_str,
};
use crate::world::{with_world, SnapshotGuard, WorldHandle};

/// Per-submission consensus parameters; shared by every submission-bearing
/// method (native and production-compatible alike).
#[derive(Clone, Copy, Debug)]
pub struct DispatcherConfig {
    pub num_validators: u32,
    pub max_rotations: u32,
}

/// Routes one already-decoded JSON-RPC `(method, params)` pair to its
/// handler. The Server (§4.7) is responsible for the envelope (`jsonrpc`,
/// `id`, batch arrays); this function only ever sees a single call.
pub async fn dispatch<H>(
    world: &WorldHandle<H>,
    mocks: &Arc<MockTable>,
    config: &DispatcherConfig,
    method: &str,
    params: Value,
) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    match method {
        "ping" => Ok(json!("pong")),

        "sim_deploy" => sim_deploy(world, mocks, config, &params).await,
        "sim_call" => sim_call(world, mocks, config, &params).await,
        "sim_read" => sim_read(world, mocks, &params).await,
        "sim_fundAccount" => sim_fund_account(world, &params).await,
        "sim_getBalance" => sim_get_balance(world, &params).await,
        "sim_getTransactionByHash" => sim_get_transaction_by_hash(world, config, &params).await,
        "sim_getTransactionReceipt" => sim_get_transaction_receipt(world, &params).await,
        "sim_getContractSchema" => sim_get_contract_schema(world, &params).await,
        "sim_createSnapshot" => sim_create_snapshot(world).await,
        "sim_restoreSnapshot" => sim_restore_snapshot(world, &params).await,

        "eth_chainId" => eth_chain_id(world).await,
        "net_version" => net_version(world).await,
        "eth_blockNumber" => eth_block_number(world).await,
        "eth_getBalance" => eth_get_balance(world, &params).await,
        "eth_getTransactionCount" => eth_get_transaction_count(world, &params).await,
        "eth_gasPrice" => Ok(json!("0x0")),
        "eth_estimateGas" => Ok(json!("0x5208")),
        "eth_sendRawTransaction" => eth_send_raw_transaction(world, mocks, config, &params).await,
        "eth_getTransactionReceipt" => eth_get_transaction_receipt(world, &params).await,
        "eth_getTransactionByHash" => eth_get_transaction_by_hash(world, config, &params).await,

        "gen_call" => gen_call(world, mocks, &params).await,
        "gen_getContractSchema" => gen_get_contract_schema(world, &params).await,
        "gen_getContractSchemaForCode" => gen_get_contract_schema_for_code(world, &params).await,

        other => Err(DispatchError::UnknownMethod(other.to_string())),
    }
}

// ---------------------------------------------------------------------
// Submission plumbing shared by sim_deploy / sim_call / eth_sendRawTransaction
// ---------------------------------------------------------------------

/// What a submission's leader attempt actually does. Built by each
/// method's params-parsing step, then driven entirely inside the
/// `with_world` closure so every retry sees the same owned bytes.
enum Submission {
    Deploy { code: Vec<u8>, constructor_calldata: Vec<u8> },
    Call { to: Address, calldata: Vec<u8> },
}

/// Parses, runs, and records one submission. This is the one place that
/// implements §4.5 steps (ii)-(vii): allocate the PENDING record, install
/// simConfig mocks under the world mutex, run Consensus, record the
/// terminal status, clear the mocks, advance the block.
async fn run_submission<H>(
    world: &WorldHandle<H>,
    mocks: &Arc<MockTable>,
    config: &DispatcherConfig,
    sender: Address,
    external_hash: Option<Hash32>,
    submission: Submission,
    sim_config_value: Option<Value>,
) -> Result<Transaction, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let mocks = mocks.clone();
    let num_validators = config.num_validators;
    let max_rotations = config.max_rotations;

    with_world(world, move |engine| -> Result<Transaction, DispatchError> {
        // A panicking ContractHost (or any other unwind out of this closure)
        // must leave the world exactly as it was before this submission:
        // the guard restores on Drop unless disarmed just before returning.
        let mut snapshot_guard = SnapshotGuard::new(engine);

        // §4.5: per-submission mocks are installed and cleared entirely
        // under the world mutex so two concurrent submissions never see
        // each other's mock overrides (§8's "mocks never leak" property).
        struct ClearMocksOnDrop<'a> {
            mocks: &'a MockTable,
        }
        impl<'a> Drop for ClearMocksOnDrop<'a> {
            fn drop(&mut self) {
                self.mocks.clear();
            }
        }
        sim_config::install(sim_config_value.as_ref(), &mocks);
        let _clear_mocks = ClearMocksOnDrop { mocks: &mocks };

        let (kind, calldata_bytes, call_target) = match &submission {
            Submission::Deploy { constructor_calldata, .. } => {
                (TxKind::Deploy, constructor_calldata.clone(), None)
            }
            Submission::Call { to, calldata } => (TxKind::Call, calldata.clone(), Some(*to)),
        };

        let sequential_id = engine.state_mut().allocate_sequential_id();
        let internal_hash = engine
            .state()
            .generate_internal_hash(&format!("submission:{sequential_id}"));

        let mut tx = Transaction {
            internal_hash,
            external_hash,
            sequential_id,
            sender,
            recipient: call_target,
            kind,
            status: TxStatus::Pending,
            calldata_bytes,
            result_bytes: Vec::new(),
            num_validators,
            consensus_votes: BTreeMap::new(),
            rotation: 0,
            block_number: engine.state().block_number,
            error: None,
            triggered_ops: Vec::new(),
        };
        engine.state_mut().put_transaction(tx.clone());

        let deployed_address = std::cell::Cell::new(None);
        let outcome = sim_consensus::run(engine, num_validators, max_rotations, || match &submission {
            Submission::Deploy { code, constructor_calldata } => {
                let address = engine
                    .deploy_from_codebytes(code, constructor_calldata, sender)
                    .map_err(|e| e.to_string())?;
                deployed_address.set(Some(address));
                Ok(encode_success_bytes(&CalldataValue::Address(address)))
            }
            Submission::Call { to, calldata } => engine
                .call_from_calldata(*to, calldata, sender)
                .map(|(_, bytes)| bytes)
                .map_err(|e| e.to_string()),
        })?;

        tx.rotation = outcome.rotation;
        tx.consensus_votes = outcome.votes;
        if outcome.finalized {
            tx.status = TxStatus::Finalized;
            tx.result_bytes = outcome.result_bytes;
            tx.error = outcome.error;
            tx.triggered_ops = engine.triggered_ops();
            if let Some(address) = deployed_address.get() {
                tx.recipient = Some(address);
            }
        } else {
            tx.status = TxStatus::Undetermined;
            tx.error = outcome.error;
        }

        tx.block_number = engine.state_mut().advance_block();
        engine.state_mut().put_transaction(tx.clone());
        snapshot_guard.disarm();
        Ok(tx)
    })
    .await
}

// ---------------------------------------------------------------------
// Native methods
// ---------------------------------------------------------------------

fn sim_config_field(obj: &Map<String, Value>) -> Option<Value> {
    obj.get("sim_config").or_else(|| obj.get("simConfig")).cloned()
}

async fn sim_deploy<H>(
    world: &WorldHandle<H>,
    mocks: &Arc<MockTable>,
    config: &DispatcherConfig,
    params: &Value,
) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let obj = request_object(params)?;
    let code_path = required_str(obj, "code_path")?.to_string();
    let args = json_to_calldata_args(obj.get("args"))?;
    let kwargs = json_to_calldata_kwargs(obj.get("kwargs"))?;
    let sender = required_address(obj, "sender")?;
    let sim_config_value = sim_config_field(obj);

    let code = std::fs::read(&code_path)
        .map_err(|e| DispatchError::InvalidParams(format!("unreadable code_path {code_path:?}: {e}")))?;
    let constructor_calldata = encode_method_call(&MethodCall { method: None, args, kwargs });

    let tx = run_submission(
        world,
        mocks,
        config,
        sender,
        None,
        Submission::Deploy { code, constructor_calldata },
        sim_config_value,
    )
    .await?;

    Ok(json!({
        "contract_address": tx.recipient.map(|a| a.to_hex()),
        "tx_hash": tx.internal_hash.to_hex(),
    }))
}

async fn sim_call<H>(
    world: &WorldHandle<H>,
    mocks: &Arc<MockTable>,
    config: &DispatcherConfig,
    params: &Value,
) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let obj = request_object(params)?;

    // The SDK-format shape carries `data` as hex calldata and `from` as the
    // sender; the native shape carries `method`/`args`/`kwargs`/`sender`.
    if let Some(data_hex) = optional_str(obj, "data") {
        let to = required_address(obj, "to")?;
        let sender = required_address(obj, "from")?;
        let sim_config_value = sim_config_field(obj);
        let calldata = hex::decode(data_hex.strip_prefix("0x").unwrap_or(data_hex))
            .map_err(|e| DispatchError::InvalidParams(format!("invalid data hex: {e}")))?;

        let tx = run_submission(
            world,
            mocks,
            config,
            sender,
            None,
            Submission::Call { to, calldata },
            sim_config_value,
        )
        .await?;

        let (execution_result, result_value, stderr) = decode_tx_outcome(&tx);
        return Ok(json!({
            "status": tx.status.as_wire_str(),
            "result": result_value,
            "consensus_data": {
                "leader_receipt": [leader_receipt_entry(&tx, execution_result, &stderr, "leader", None)],
            },
        }));
    }

    let to = required_address(obj, "to")?;
    let method = required_str(obj, "method")?.to_string();
    let args = json_to_calldata_args(obj.get("args"))?;
    let kwargs = json_to_calldata_kwargs(obj.get("kwargs"))?;
    let sender = required_address(obj, "sender")?;
    let sim_config_value = sim_config_field(obj);

    let calldata = encode_method_call(&MethodCall { method: Some(method), args, kwargs });
    let tx = run_submission(world, mocks, config, sender, None, Submission::Call { to, calldata }, sim_config_value)
        .await?;

    let (_, result_value, _) = decode_tx_outcome(&tx);
    Ok(json!({ "result": result_value, "tx_hash": tx.internal_hash.to_hex() }))
}

async fn sim_read<H>(world: &WorldHandle<H>, mocks: &Arc<MockTable>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let obj = request_object(params)?;
    let to = required_address(obj, "to")?;
    let method = required_str(obj, "method")?.to_string();
    let args = json_to_calldata_args(obj.get("args"))?;
    let kwargs = json_to_calldata_kwargs(obj.get("kwargs"))?;
    let sim_config_value = sim_config_field(obj);

    let mocks = mocks.clone();
    let result = with_world(world, move |engine| -> Result<CalldataValue, DispatchError> {
        let mut snapshot_guard = SnapshotGuard::new(engine);
        struct ClearMocksOnDrop<'a> {
            mocks: &'a MockTable,
        }
        impl<'a> Drop for ClearMocksOnDrop<'a> {
            fn drop(&mut self) {
                self.mocks.clear();
            }
        }
        sim_config::install(sim_config_value.as_ref(), &mocks);
        let _clear_mocks = ClearMocksOnDrop { mocks: &mocks };
        let value = engine.call(to, &method, &args, &kwargs, ADDRESS_ZERO)?;
        snapshot_guard.disarm();
        Ok(value)
    })
    .await?;

    Ok(json!({ "result": calldata_to_json(&result) }))
}

async fn sim_fund_account<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let address = Address::parse_hex(&p.required_str(0, "address")?)
        .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;
    let amount = p.required_u128(1, "amount")?;

    let balance = with_world(world, move |engine| {
        engine.state_mut().fund(address, amount);
        engine.state().balance(address)
    })
    .await;
    Ok(json!({ "balance": balance }))
}

async fn sim_get_balance<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let address = Address::parse_hex(&p.required_str(0, "address")?)
        .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;
    let balance = with_world(world, move |engine| engine.state().balance(address)).await;
    Ok(json!(balance))
}

async fn sim_get_transaction_by_hash<H>(
    world: &WorldHandle<H>,
    config: &DispatcherConfig,
    params: &Value,
) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let hash = parse_hash(&p.required_str(0, "hash")?)?;
    let num_validators = config.num_validators;
    let tx = with_world(world, move |engine| {
        let state = engine.state();
        state
            .tx_by_internal_hash(hash)
            .or_else(|| state.tx_by_external_hash(hash))
            .cloned()
    })
    .await;
    Ok(tx.map(|tx| transaction_to_json(&tx, num_validators)).unwrap_or(Value::Null))
}

async fn sim_get_transaction_receipt<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let hash = parse_hash(&p.required_str(0, "hash")?)?;
    let tx = with_world(world, move |engine| {
        let state = engine.state();
        state
            .tx_by_internal_hash(hash)
            .or_else(|| state.tx_by_external_hash(hash))
            .cloned()
    })
    .await;
    Ok(tx.map(|tx| ethereum_receipt_json(&tx)).unwrap_or(Value::Null))
}

async fn sim_get_contract_schema<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let address = Address::parse_hex(&p.required_str(0, "address")?)
        .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;
    let schema = with_world(world, move |engine| engine.contract_schema(address)).await;
    match schema {
        Some(schema) => Ok(schema_to_json(&schema)),
        None => Err(DispatchError::Engine(sim_engine::EngineError::UnknownContract(address))),
    }
}

async fn sim_create_snapshot<H>(world: &WorldHandle<H>) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let id = with_world(world, |engine| engine.snapshot()).await;
    Ok(json!(id))
}

async fn sim_restore_snapshot<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let id = p.required_u128(0, "id")? as u64;
    let restored = with_world(world, move |engine| engine.restore(id)).await;
    Ok(json!(restored))
}

// ---------------------------------------------------------------------
// Production-compatible methods
// ---------------------------------------------------------------------

async fn eth_chain_id<H>(world: &WorldHandle<H>) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let chain_id = with_world(world, |engine| engine.chain_id()).await;
    Ok(json!(hex_quantity(chain_id as u128)))
}

async fn net_version<H>(world: &WorldHandle<H>) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let chain_id = with_world(world, |engine| engine.chain_id()).await;
    Ok(json!(chain_id.to_string()))
}

async fn eth_block_number<H>(world: &WorldHandle<H>) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let block_number = with_world(world, |engine| engine.state().block_number).await;
    Ok(json!(hex_quantity(block_number as u128)))
}

async fn eth_get_balance<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let address = Address::parse_hex(&p.required_str(0, "address")?)
        .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;
    let balance = with_world(world, move |engine| engine.state().balance(address)).await;
    Ok(json!(hex_quantity(balance)))
}

async fn eth_get_transaction_count<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let address = Address::parse_hex(&p.required_str(0, "address")?)
        .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;
    let nonce = with_world(world, move |engine| engine.state().nonce(address)).await;
    Ok(json!(hex_quantity(nonce as u128)))
}

async fn eth_send_raw_transaction<H>(
    world: &WorldHandle<H>,
    mocks: &Arc<MockTable>,
    config: &DispatcherConfig,
    params: &Value,
) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let raw_hex = p.required_str(0, "rawTransaction")?;
    let sim_config_value = match params {
        Value::Array(items) => items.get(1).cloned(),
        Value::Object(obj) => sim_config_field(obj),
        _ => None,
    };

    let raw = decode_raw_transaction(&raw_hex)?;
    let call = decode_add_transaction(&raw.data)?;
    let inner = decode_inner_payload(&call.inner_data)?;
    let num_validators = if call.num_validators > 0 { call.num_validators } else { config.num_validators };
    let max_rotations = if call.max_rotations > 0 { call.max_rotations } else { config.max_rotations };
    let submission_config = DispatcherConfig { num_validators, max_rotations };

    let external_hash = Hash32::from_slice(&raw.hash).map_err(|e| DispatchError::InvalidParams(e.to_string()))?;
    let submission = match inner {
        InnerPayload::Deploy { code, constructor_calldata, .. } => Submission::Deploy { code, constructor_calldata },
        InnerPayload::Call { method_calldata, .. } => {
            if call.recipient.is_zero() {
                return Err(DispatchError::InvalidParams(
                    "call payload cannot target the zero address".to_string(),
                ));
            }
            Submission::Call { to: call.recipient, calldata: method_calldata }
        }
    };

    let tx = run_submission(
        world,
        mocks,
        &submission_config,
        call.sender,
        Some(external_hash),
        submission,
        sim_config_value,
    )
    .await?;

    Ok(json!(tx.external_hash.expect("just recorded").to_hex()))
}

async fn eth_get_transaction_receipt<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let hash = parse_hash(&p.required_str(0, "hash")?)?;
    let tx = with_world(world, move |engine| {
        let state = engine.state();
        state
            .tx_by_external_hash(hash)
            .or_else(|| state.tx_by_internal_hash(hash))
            .cloned()
    })
    .await;
    Ok(tx.map(|tx| ethereum_receipt_json(&tx)).unwrap_or(Value::Null))
}

async fn eth_get_transaction_by_hash<H>(
    world: &WorldHandle<H>,
    config: &DispatcherConfig,
    params: &Value,
) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let hash_str = p.required_str(0, "hash")?;
    let hash = parse_hash(&hash_str)?;
    let num_validators = config.num_validators;

    // Lookup order per §6.1: sequential id parsed from the hex hash, then
    // external hash, then internal hash.
    let sequential_candidate = {
        let trimmed = hash_str.strip_prefix("0x").unwrap_or(&hash_str).trim_start_matches('0');
        let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
        u64::from_str_radix(trimmed, 16).ok()
    };

    let tx = with_world(world, move |engine| {
        let state = engine.state();
        if let Some(id) = sequential_candidate {
            if let Some(tx) = state.tx_by_sequential_id(id) {
                return Some(tx.clone());
            }
        }
        state
            .tx_by_external_hash(hash)
            .or_else(|| state.tx_by_internal_hash(hash))
            .cloned()
    })
    .await;

    Ok(tx.map(|tx| production_transaction_json(&tx, num_validators)).unwrap_or(Value::Null))
}

async fn gen_call<H>(world: &WorldHandle<H>, mocks: &Arc<MockTable>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let obj = request_object(params)?;
    let to = required_address(obj, "to")?;
    let sender = optional_address(obj, "from", ADDRESS_ZERO)?;
    let data = required_str(obj, "data")?;
    let (calldata_blob, _leader_only) = decode_gen_call_data(data)?;
    let sim_config_value = sim_config_field(obj);

    let mocks = mocks.clone();
    let (_, result_bytes) = with_world(world, move |engine| -> Result<(CalldataValue, Vec<u8>), DispatchError> {
        struct ClearMocksOnDrop<'a> {
            mocks: &'a MockTable,
        }
        impl<'a> Drop for ClearMocksOnDrop<'a> {
            fn drop(&mut self) {
                self.mocks.clear();
            }
        }
        sim_config::install(sim_config_value.as_ref(), &mocks);
        let _clear_mocks = ClearMocksOnDrop { mocks: &mocks };
        Ok(engine.call_from_calldata(to, &calldata_blob, sender)?)
    })
    .await?;

    Ok(json!(hex::encode(result_bytes)))
}

async fn gen_get_contract_schema<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    sim_get_contract_schema(world, params).await
}

async fn gen_get_contract_schema_for_code<H>(world: &WorldHandle<H>, params: &Value) -> Result<Value, DispatchError>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let p = Params::from_value(params);
    let hex_code = p.required_str(0, "code")?;
    let code = hex::decode(hex_code.strip_prefix("0x").unwrap_or(&hex_code))
        .map_err(|e| DispatchError::InvalidParams(format!("invalid code hex: {e}")))?;
    let schema = with_world(world, move |engine| engine.schema_for_codebytes(&code)).await?;
    Ok(schema_to_json(&schema))
}

// ---------------------------------------------------------------------
// Shared rendering helpers
// ---------------------------------------------------------------------

fn schema_to_json(schema: &ContractSchema) -> Value {
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

/// Decodes a transaction's recorded `result_bytes`/`error` into the three
/// pieces every receipt shape (native and production-compatible) renders:
/// the execution-result tag, the decoded return value (if any), and the
/// stderr-style error text.
fn decode_tx_outcome(tx: &Transaction) -> (&'static str, Value, String) {
    if let Some(err) = &tx.error {
        return ("ERROR", Value::Null, err.clone());
    }
    if tx.result_bytes.is_empty() {
        return ("SUCCESS", Value::Null, String::new());
    }
    match decode_status_prefixed(&tx.result_bytes) {
        Ok((ResultStatus::Success, rest)) => match decode_value(rest) {
            Ok((value, _consumed)) => ("SUCCESS", calldata_to_json(&value), String::new()),
            Err(e) => ("ERROR", Value::Null, e.to_string()),
        },
        Ok((ResultStatus::Rollback, rest)) => {
            ("ERROR", Value::Null, String::from_utf8_lossy(rest).to_string())
        }
        Err(e) => ("ERROR", Value::Null, e.to_string()),
    }
}

fn leader_receipt_entry(
    tx: &Transaction,
    execution_result: &str,
    stderr: &str,
    mode: &str,
    vote: Option<&str>,
) -> Value {
    let (_, result_value, _) = decode_tx_outcome(tx);
    json!({
        "execution_result": execution_result,
        "mode": mode,
        "calldata": base64_encode(&tx.calldata_bytes),
        "result": result_value,
        "eq_outputs": {},
        "genvm_result": { "stdout": "", "stderr": stderr },
        "contract_state": {},
        "pending_transactions": [],
        "gas_used": 0,
        "vote": vote,
        "node_config": { "address": tx.sender.to_hex() },
    })
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Builds the `consensus_data` object shared by `eth_getTransactionByHash`
/// and `sim_call`'s SDK-shape response: real votes when recorded, else a
/// synthetic `0x0000...00i`-addressed fallback (§6.1).
fn consensus_data_json(tx: &Transaction, num_validators_fallback: u32) -> Value {
    let (execution_result, _, stderr) = decode_tx_outcome(tx);
    let leader = leader_receipt_entry(tx, execution_result, &stderr, "leader", None);

    let (validators, votes): (Vec<Value>, Value) = if !tx.consensus_votes.is_empty() {
        let mut votes_map = Map::new();
        let validators = tx
            .consensus_votes
            .iter()
            .map(|(addr, vote)| {
                votes_map.insert(addr.to_hex(), json!(vote.as_wire_str()));
                validator_receipt_entry(tx, execution_result, &stderr, *addr, vote.as_wire_str())
            })
            .collect();
        (validators, Value::Object(votes_map))
    } else {
        let n = num_validators_fallback.max(1);
        let vote_str = if tx.status == TxStatus::Finalized { "agree" } else { "disagree" };
        let mut votes_map = Map::new();
        let validators = (0..n)
            .map(|i| {
                let addr = Address::synthetic_validator(i);
                votes_map.insert(addr.to_hex(), json!(vote_str));
                validator_receipt_entry(tx, execution_result, &stderr, addr, vote_str)
            })
            .collect();
        (validators, Value::Object(votes_map))
    };

    json!({ "leader_receipt": [leader], "validators": validators, "votes": votes })
}

fn validator_receipt_entry(
    tx: &Transaction,
    execution_result: &str,
    stderr: &str,
    addr: Address,
    vote: &str,
) -> Value {
    let (_, result_value, _) = decode_tx_outcome(tx);
    json!({
        "execution_result": execution_result,
        "mode": "validator",
        "calldata": base64_encode(&tx.calldata_bytes),
        "result": result_value,
        "eq_outputs": {},
        "genvm_result": { "stdout": "", "stderr": stderr },
        "contract_state": {},
        "pending_transactions": [],
        "gas_used": 0,
        "vote": vote,
        "node_config": { "address": addr.to_hex() },
    })
}

fn transaction_to_json(tx: &Transaction, num_validators_fallback: u32) -> Value {
    json!({
        "internal_hash": tx.internal_hash.to_hex(),
        "external_hash": tx.external_hash.map(|h| h.to_hex()),
        "sequential_id": tx.sequential_id,
        "sender": tx.sender.to_hex(),
        "recipient": tx.recipient.map(|a| a.to_hex()),
        "kind": tx.kind,
        "status": tx.status.as_wire_str(),
        "num_validators": tx.num_validators,
        "rotation": tx.rotation,
        "block_number": tx.block_number,
        "error": tx.error,
        "triggered_ops": triggered_ops_json(&tx.triggered_ops),
        "consensus_data": consensus_data_json(tx, num_validators_fallback),
    })
}

fn triggered_ops_json(ops: &[TriggeredOp]) -> Value {
    Value::Array(
        ops.iter()
            .map(|op| match op {
                TriggeredOp::Deploy { address } => json!({"type": "deploy", "address": address.to_hex()}),
                TriggeredOp::Post { address, method } => {
                    json!({"type": "post", "address": address.to_hex(), "method": method})
                }
            })
            .collect(),
    )
}

fn production_transaction_json(tx: &Transaction, num_validators_fallback: u32) -> Value {
    let hash = tx.external_hash.unwrap_or(tx.internal_hash);
    let tx_type = match tx.kind {
        TxKind::Deploy => 0,
        TxKind::Call => 2,
    };
    let contract_address = matches!(tx.kind, TxKind::Deploy).then(|| tx.recipient.map(|a| a.to_hex())).flatten();

    json!({
        "hash": hash.to_hex(),
        "status": tx.status.as_wire_str(),
        "from_address": tx.sender.to_hex(),
        "to_address": tx.recipient.map(|a| a.to_hex()),
        "type": tx_type,
        "nonce": 0,
        "value": 0,
        "gaslimit": 0,
        "r": 0,
        "s": 0,
        "v": 0,
        "created_at": Value::Null,
        "data": {
            "calldata": base64_encode(&tx.calldata_bytes),
            "contract_address": contract_address,
        },
        "consensus_data": consensus_data_json(tx, num_validators_fallback),
    })
}

/// Builds the fixed `NewTransaction` topic (§6.2): keccak256 of its ABI
/// signature string.
fn new_transaction_topic() -> String {
    format!("0x{}", hex::encode(sim_crypto::keccak256(b"NewTransaction(bytes32,address,address)")))
}

fn ethereum_receipt_json(tx: &Transaction) -> Value {
    let sequential_topic = {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&tx.sequential_id.to_be_bytes());
        format!("0x{}", hex::encode(word))
    };
    let recipient_topic = format!("0x{}", pad_address_topic(tx.recipient.unwrap_or(ADDRESS_ZERO)));
    let signer_topic = format!("0x{}", pad_address_topic(tx.sender));

    json!({
        "status": if tx.status == TxStatus::Finalized { "0x1" } else { "0x0" },
        "blockNumber": hex_quantity(tx.block_number as u128),
        "transactionHash": tx.external_hash.unwrap_or(tx.internal_hash).to_hex(),
        "logs": [{
            "address": CONSENSUS_CONTRACT_ADDR_HEX,
            "topics": [new_transaction_topic(), sequential_topic, recipient_topic, signer_topic],
            "data": "0x",
        }],
    })
}

#[cfg(test)]
mod tests {
    use sim_engine::test_support::TestHost;
    use sim_engine::Engine;

    use crate::world::new_world;

    use super::*;

    fn config() -> DispatcherConfig {
        DispatcherConfig { num_validators: 1, max_rotations: 1 }
    }

    fn new_test_world() -> WorldHandle<TestHost> {
        new_world(Engine::new(TestHost, 61_999))
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let world = new_test_world();
        let mocks = Arc::new(MockTable::new());
        let result = dispatch(&world, &mocks, &config(), "ping", Value::Null).await.unwrap();
        assert_eq!(result, json!("pong"));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let world = new_test_world();
        let mocks = Arc::new(MockTable::new());
        let err = dispatch(&world, &mocks, &config(), "not_a_method", Value::Null).await.unwrap_err();
        assert_eq!(err.to_json_rpc().code, -32601);
    }

    #[tokio::test]
    async fn deploy_then_read_round_trips_through_the_dispatcher() {
        let world = new_test_world();
        let mocks = Arc::new(MockTable::new());
        let cfg = config();

        let deploy_params = json!({
            "code_path": "does-not-matter",
            "args": ["hello"],
            "kwargs": {},
            "sender": Address([1u8; 20]).to_hex(),
        });

        // TestHost's classes are selected by code bytes, not by reading the
        // path from disk, so sim_deploy's own `std::fs::read` would fail for
        // a path that does not exist; exercise the lower-level call-path
        // instead by deploying directly and then reading through sim_read.
        let sender = Address([1u8; 20]);
        let address = {
            let world = world.clone();
            crate::world::with_world(&world, move |engine| {
                engine
                    .deploy_from_codebytes(
                        b"echo",
                        &encode_method_call(&MethodCall { method: None, args: vec![CalldataValue::Str("hello".into())], kwargs: Default::default() }),
                        sender,
                    )
                    .unwrap()
            })
            .await
        };

        let read_params = json!({"to": address.to_hex(), "method": "get", "args": [], "kwargs": {}});
        let result = dispatch(&world, &mocks, &cfg, "sim_read", read_params).await.unwrap();
        assert_eq!(result["result"], json!("hello"));
        let _ = deploy_params;
    }

    #[tokio::test]
    async fn sim_fund_account_and_get_balance_agree() {
        let world = new_test_world();
        let mocks = Arc::new(MockTable::new());
        let cfg = config();
        let address = Address([7u8; 20]).to_hex();

        let funded = dispatch(&world, &mocks, &cfg, "sim_fundAccount", json!([address, 500])).await.unwrap();
        assert_eq!(funded["balance"], json!(500));

        let balance = dispatch(&world, &mocks, &cfg, "sim_getBalance", json!([address])).await.unwrap();
        assert_eq!(balance, json!(500));
    }

    #[tokio::test]
    async fn eth_chain_id_and_net_version_report_the_configured_chain() {
        let world = new_test_world();
        let mocks = Arc::new(MockTable::new());
        let cfg = config();
        let chain_id = dispatch(&world, &mocks, &cfg, "eth_chainId", Value::Null).await.unwrap();
        assert_eq!(chain_id, json!("0xf21f"));
        let version = dispatch(&world, &mocks, &cfg, "net_version", Value::Null).await.unwrap();
        assert_eq!(version, json!("61999"));
    }

    #[tokio::test]
    async fn snapshot_then_restore_round_trips_balance() {
        let world = new_test_world();
        let mocks = Arc::new(MockTable::new());
        let cfg = config();
        let address = Address([9u8; 20]).to_hex();

        dispatch(&world, &mocks, &cfg, "sim_fundAccount", json!([address, 10])).await.unwrap();
        let id = dispatch(&world, &mocks, &cfg, "sim_createSnapshot", Value::Null).await.unwrap();
        dispatch(&world, &mocks, &cfg, "sim_fundAccount", json!([address, 990])).await.unwrap();
        assert_eq!(
            dispatch(&world, &mocks, &cfg, "sim_getBalance", json!([address])).await.unwrap(),
            json!(1000)
        );

        let restored = dispatch(&world, &mocks, &cfg, "sim_restoreSnapshot", json!([id])).await.unwrap();
        assert_eq!(restored, json!(true));
        assert_eq!(
            dispatch(&world, &mocks, &cfg, "sim_getBalance", json!([address])).await.unwrap(),
            json!(10)
        );
    }
}
