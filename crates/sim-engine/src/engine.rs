//! Path: crates/sim-engine/src/engine.rs
//! The Engine: per-contract storage routing, instance lifecycle, message
//! context injection, cross-contract call handling, post-message queue
//! draining, and snapshot/restore of the storage graph (§4.3).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use sim_codec::{decode_method_call, encode_rollback_bytes, encode_success_bytes};
use sim_state::StateStore;
use sim_types::{Address, CalldataValue, ContractSchema, DeployedContract, Hash32, TriggeredOp};

use crate::context::{EntryKind, MessageContext};
use crate::error::EngineError;
use crate::host::{
    ContractHost, HostServices, LlmHandler, LlmResponse, NondetRequest, NondetResponse, WebHandler,
    WebResponse,
};
use crate::storage::StoragePartition;
use crate::witness::Witness;

#[derive(Clone, Debug)]
struct PostMessageEntry {
    address: Address,
    calldata: Vec<u8>,
    sender: Address,
}

struct EngineInner<H: ContractHost> {
    partitions: HashMap<Address, StoragePartition>,
    instances: HashMap<Address, H::Instance>,
    schemas: HashMap<Address, ContractSchema>,
    path_cache: HashMap<String, H::Class>,
    content_hash_cache: HashMap<[u8; 32], H::Class>,
    archive_cache: HashMap<[u8; 32], String>,
    context: Option<MessageContext>,
    call_depth: u32,
    draining: bool,
    queue: VecDeque<PostMessageEntry>,
    witnesses: Vec<Witness>,
    triggered_ops: Vec<TriggeredOp>,
    pending_rollback: Option<String>,
    snapshots: BTreeMap<u64, EngineSnapshot<H>>,
    snapshot_counter: u64,
}

impl<H: ContractHost> Default for EngineInner<H> {
    fn default() -> Self {
        Self {
            partitions: HashMap::new(),
            instances: HashMap::new(),
            schemas: HashMap::new(),
            path_cache: HashMap::new(),
            content_hash_cache: HashMap::new(),
            archive_cache: HashMap::new(),
            context: None,
            call_depth: 0,
            draining: false,
            queue: VecDeque::new(),
            witnesses: Vec::new(),
            triggered_ops: Vec::new(),
            pending_rollback: None,
            snapshots: BTreeMap::new(),
            snapshot_counter: 0,
        }
    }
}

struct EngineSnapshot<H: ContractHost> {
    partitions: HashMap<Address, StoragePartition>,
    instances: HashMap<Address, H::Instance>,
    schemas: HashMap<Address, ContractSchema>,
    queue: VecDeque<PostMessageEntry>,
    context: Option<MessageContext>,
    call_depth: u32,
    state_snapshot_id: u64,
}

impl<H: ContractHost> Clone for EngineSnapshot<H>
where
    H::Instance: Clone,
{
    fn clone(&self) -> Self {
        Self {
            partitions: self.partitions.clone(),
            instances: self.instances.clone(),
            schemas: self.schemas.clone(),
            queue: self.queue.clone(),
            context: self.context,
            call_depth: self.call_depth,
            state_snapshot_id: self.state_snapshot_id,
        }
    }
}

/// The persistent host for contract instances: storage partitions, the
/// instance/class/schema caches, the post-message queue, the witness list,
/// and the embedded `StateStore` (accounts, nonces, transactions, block
/// counter) that deploy/call delegate to for address generation and nonce
/// bookkeeping.
///
/// `host: H` is held by shared reference throughout (`ContractHost`'s
/// methods all take `&self`); every other field lives behind a `RefCell` so
/// the cross-contract nondet callback can re-enter `Engine` methods while a
/// `construct`/`invoke` call is already on the stack, without needing
/// `unsafe`.
pub struct Engine<H: ContractHost> {
    host: H,
    state: RefCell<StateStore>,
    inner: RefCell<EngineInner<H>>,
    web_handler: RefCell<Option<Arc<dyn WebHandler>>>,
    llm_handler: RefCell<Option<Arc<dyn LlmHandler>>>,
    chain_id: u64,
}

struct EngineServices<'a, H: ContractHost> {
    engine: &'a Engine<H>,
    acting_contract: Address,
}

impl<'a, H: ContractHost> HostServices for EngineServices<'a, H> {
    fn storage_read(&mut self, slot: Hash32, offset: u32, length: u32) -> Vec<u8> {
        let inner = self.engine.inner.borrow();
        inner
            .partitions
            .get(&self.acting_contract)
            .map(|p| p.read(slot, offset, length))
            .unwrap_or_else(|| vec![0u8; length as usize])
    }

    fn storage_write(&mut self, slot: Hash32, offset: u32, data: &[u8]) {
        let mut inner = self.engine.inner.borrow_mut();
        inner
            .partitions
            .entry(self.acting_contract)
            .or_insert_with(StoragePartition::new)
            .write(slot, offset, data);
    }

    fn get_balance(&mut self, address: Address) -> u128 {
        self.engine.state.borrow().balance(address)
    }

    fn get_self_balance(&mut self) -> u128 {
        self.engine.state.borrow().balance(self.acting_contract)
    }

    fn nondet_call(&mut self, request: NondetRequest) -> NondetResponse {
        self.engine.handle_nondet(self.acting_contract, request)
    }
}

fn content_hash_of(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn web_response_to_calldata(response: &WebResponse) -> CalldataValue {
    let mut map = BTreeMap::new();
    map.insert(
        "status".to_string(),
        CalldataValue::Int(i128::from(response.status)),
    );
    map.insert(
        "body".to_string(),
        CalldataValue::Bytes(response.body.clone()),
    );
    CalldataValue::Map(map)
}

impl<H: ContractHost> Engine<H> {
    pub fn new(host: H, chain_id: u64) -> Self {
        Self::with_state(host, StateStore::new(chain_id))
    }

    pub fn with_state(host: H, state: StateStore) -> Self {
        Self {
            host,
            state: RefCell::new(state),
            inner: RefCell::new(EngineInner::default()),
            web_handler: RefCell::new(None),
            llm_handler: RefCell::new(None),
            chain_id: 0,
        }
        .with_chain_id_from_state()
    }

    fn with_chain_id_from_state(mut self) -> Self {
        self.chain_id = self.state.borrow().chain_id;
        self
    }

    pub fn set_web_handler(&self, handler: Arc<dyn WebHandler>) {
        *self.web_handler.borrow_mut() = Some(handler);
    }

    pub fn set_llm_handler(&self, handler: Arc<dyn LlmHandler>) {
        *self.llm_handler.borrow_mut() = Some(handler);
    }

    pub fn state(&self) -> std::cell::Ref<'_, StateStore> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, StateStore> {
        self.state.borrow_mut()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn clear_witnesses(&self) {
        self.inner.borrow_mut().witnesses.clear();
    }

    pub fn witness_count(&self) -> usize {
        self.inner.borrow().witnesses.len()
    }

    /// The vote-computation short-circuit of §4.4: deterministic execution
    /// (no witnesses) always agrees; otherwise every witness's
    /// validator-closure must accept the leader's captured result.
    pub fn witnesses_all_agree(&self) -> bool {
        let inner = self.inner.borrow();
        inner.witnesses.is_empty() || inner.witnesses.iter().all(Witness::agrees)
    }

    pub fn triggered_ops(&self) -> Vec<TriggeredOp> {
        self.inner.borrow().triggered_ops.clone()
    }

    pub fn contract_schema(&self, address: Address) -> Option<ContractSchema> {
        self.inner.borrow().schemas.get(&address).cloned()
    }

    pub fn schema_for_codebytes(&self, code: &[u8]) -> Result<ContractSchema, EngineError> {
        let content_hash = content_hash_of(code);
        let class = self.resolve_class(content_hash, code, None)?;
        Ok(self.host.schema_of(&class))
    }

    pub fn schema_for_path(&self, path: &str) -> Result<ContractSchema, EngineError> {
        let bytes = std::fs::read(path)
            .map_err(|e| EngineError::CodeUnreadable(path.to_string(), e.to_string()))?;
        let content_hash = content_hash_of(&bytes);
        let class = self.resolve_class(content_hash, &bytes, Some(path))?;
        Ok(self.host.schema_of(&class))
    }

    fn resolve_class(
        &self,
        content_hash: [u8; 32],
        bytes: &[u8],
        path_key: Option<&str>,
    ) -> Result<H::Class, EngineError> {
        {
            let inner = self.inner.borrow();
            if let Some(class) = inner.content_hash_cache.get(&content_hash) {
                return Ok(class.clone());
            }
            if let Some(key) = path_key {
                if let Some(class) = inner.path_cache.get(key) {
                    return Ok(class.clone());
                }
            }
        }
        let class = self
            .host
            .load_class(content_hash, bytes)
            .map_err(EngineError::from_host)?;
        let mut inner = self.inner.borrow_mut();
        inner.content_hash_cache.insert(content_hash, class.clone());
        if let Some(key) = path_key {
            inner.path_cache.insert(key.to_string(), class.clone());
        }
        tracing::debug!(
            target: "sim_engine::class_cache",
            content_hash = %hex::encode(content_hash),
            "loaded and cached contract class"
        );
        Ok(class)
    }

    fn note_archive_if_applicable(&self, code: &[u8], content_hash: [u8; 32]) {
        if code.len() >= 2 && code[0] == 0x50 && code[1] == 0x4B {
            let mut inner = self.inner.borrow_mut();
            inner
                .archive_cache
                .entry(content_hash)
                .or_insert_with(|| format!("/contract/{}", hex::encode(content_hash)));
        }
    }

    fn top_level_reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.queue.clear();
        inner.draining = false;
        inner.triggered_ops.clear();
        inner.pending_rollback = None;
    }

    /// Generates a contract address from `(sender, sender-nonce)`, bumps the
    /// sender's nonce, installs a fresh storage partition, injects the
    /// construction message context, and invokes the runtime's
    /// construction capability. Shared by top-level `deploy*` entry points
    /// and the `DeployContract` cross-contract hook — the only difference
    /// between the two is whether the caller clears the queue/witness
    /// bookkeeping and drains post-messages afterward.
    fn construct_and_install(
        &self,
        class: &H::Class,
        positional: &[CalldataValue],
        named: &BTreeMap<String, CalldataValue>,
        sender: Address,
        code_locator: String,
    ) -> Result<Address, EngineError> {
        let nonce = self.state.borrow().nonce(sender);
        let address = self.state.borrow().generate_contract_address(sender, nonce);
        self.state.borrow_mut().increment_nonce(sender);
        self.inner
            .borrow_mut()
            .partitions
            .insert(address, StoragePartition::new());

        let schema = self.host.schema_of(class);
        let saved_context = self.inner.borrow().context;
        let new_context =
            MessageContext::top_level(address, sender, self.chain_id, EntryKind::Construct);
        {
            let mut inner = self.inner.borrow_mut();
            inner.context = Some(new_context);
            inner.call_depth += 1;
        }

        let mut services = EngineServices {
            engine: self,
            acting_contract: address,
        };
        let result = self.host.construct(class, positional, named, &mut services);

        {
            let mut inner = self.inner.borrow_mut();
            inner.call_depth -= 1;
            inner.context = saved_context;
        }

        let instance = result.map_err(EngineError::from_host)?;
        self.check_pending_rollback_unit()?;

        {
            let mut inner = self.inner.borrow_mut();
            inner.instances.insert(address, instance);
            inner.schemas.insert(address, schema);
        }
        self.state.borrow_mut().register_contract(DeployedContract {
            address,
            code_locator,
        });
        tracing::info!(target: "sim_engine::deploy", address = %address, sender = %sender, "deployed contract");
        Ok(address)
    }

    fn check_pending_rollback_unit(&self) -> Result<(), EngineError> {
        let pending = self.inner.borrow_mut().pending_rollback.take();
        match pending {
            Some(msg) => Err(EngineError::ContractRollback(msg)),
            None => Ok(()),
        }
    }

    fn check_pending_rollback(&self, value: CalldataValue) -> Result<CalldataValue, EngineError> {
        self.check_pending_rollback_unit()?;
        Ok(value)
    }

    /// Top-level entry point for `sim_deploy`: reads `path` from disk,
    /// resolves (or loads) its class by content hash, and constructs an
    /// instance.
    pub fn deploy_from_path(
        &self,
        path: &str,
        positional: &[CalldataValue],
        named: &BTreeMap<String, CalldataValue>,
        sender: Address,
    ) -> Result<Address, EngineError> {
        let bytes = std::fs::read(path)
            .map_err(|e| EngineError::CodeUnreadable(path.to_string(), e.to_string()))?;
        let content_hash = content_hash_of(&bytes);
        self.note_archive_if_applicable(&bytes, content_hash);
        let class = self.resolve_class(content_hash, &bytes, Some(path))?;
        self.top_level_reset();
        let address =
            self.construct_and_install(&class, positional, named, sender, path.to_string())?;
        self.drain_post_messages();
        Ok(address)
    }

    /// Top-level entry point for a signed/raw deploy submission: decodes the
    /// constructor calldata blob and materializes `code` (§4.3 "materializes
    /// `code` into a loadable form"), content-hash addressed.
    pub fn deploy_from_codebytes(
        &self,
        code: &[u8],
        constructor_calldata: &[u8],
        sender: Address,
    ) -> Result<Address, EngineError> {
        let call = decode_method_call(constructor_calldata)?;
        let content_hash = content_hash_of(code);
        self.note_archive_if_applicable(code, content_hash);
        let class = self.resolve_class(content_hash, code, None)?;
        let locator = format!("/contract/{}", hex::encode(content_hash));
        self.top_level_reset();
        let address = self.construct_and_install(&class, &call.args, &call.kwargs, sender, locator)?;
        self.drain_post_messages();
        Ok(address)
    }

    /// Top-level `call`/`sim_call`/`sim_read` entry point.
    pub fn call(
        &self,
        address: Address,
        method: &str,
        positional: &[CalldataValue],
        named: &BTreeMap<String, CalldataValue>,
        sender: Address,
    ) -> Result<CalldataValue, EngineError> {
        self.top_level_reset();
        self.invoke_existing(address, method, positional, named, sender, EntryKind::Call)
    }

    /// Top-level entry point decoding a calldata-encoded method call, as used
    /// by `gen_call`/`eth_sendRawTransaction`'s call path.
    pub fn call_from_calldata(
        &self,
        address: Address,
        calldata: &[u8],
        sender: Address,
    ) -> Result<(CalldataValue, Vec<u8>), EngineError> {
        let call = decode_method_call(calldata)?;
        let method = call.method.clone().ok_or_else(|| EngineError::UnknownMethodOnContract {
            address,
            method: String::new(),
        })?;
        let value = self.call(address, &method, &call.args, &call.kwargs, sender)?;
        Ok((value.clone(), encode_success_bytes(&value)))
    }

    fn invoke_existing(
        &self,
        address: Address,
        method: &str,
        positional: &[CalldataValue],
        named: &BTreeMap<String, CalldataValue>,
        sender: Address,
        entry_kind: EntryKind,
    ) -> Result<CalldataValue, EngineError> {
        let mut instance = {
            let mut inner = self.inner.borrow_mut();
            inner
                .instances
                .remove(&address)
                .ok_or(EngineError::UnknownContract(address))?
        };

        let saved_context = self.inner.borrow().context;
        let new_context = match (entry_kind, saved_context) {
            (EntryKind::CrossContractCall, Some(parent)) => parent.cross_contract(address),
            _ => MessageContext::top_level(address, sender, self.chain_id, entry_kind),
        };
        {
            let mut inner = self.inner.borrow_mut();
            inner.context = Some(new_context);
            inner.call_depth += 1;
        }

        let mut services = EngineServices {
            engine: self,
            acting_contract: address,
        };
        let result = self.host.invoke(&mut instance, method, positional, named, &mut services);

        let depth_after = {
            let mut inner = self.inner.borrow_mut();
            inner.call_depth -= 1;
            inner.context = saved_context;
            inner.instances.insert(address, instance);
            inner.call_depth
        };

        let value = result.map_err(EngineError::from_host)?;
        let value = self.check_pending_rollback(value)?;

        if depth_after == 0 {
            self.drain_post_messages();
        }
        Ok(value)
    }

    fn drain_post_messages(&self) {
        let should_drain = {
            let inner = self.inner.borrow();
            inner.call_depth == 0 && !inner.draining && !inner.queue.is_empty()
        };
        if !should_drain {
            return;
        }
        let entry = {
            let mut inner = self.inner.borrow_mut();
            inner.draining = true;
            let entry = inner.queue.pop_front();
            inner.queue.clear();
            entry
        };
        if let Some(entry) = entry {
            let call = decode_method_call(&entry.calldata);
            let outcome = match call {
                Ok(call) => self.invoke_existing(
                    entry.address,
                    call.method.as_deref().unwrap_or_default(),
                    &call.args,
                    &call.kwargs,
                    entry.sender,
                    EntryKind::PostMessage,
                ),
                Err(e) => Err(EngineError::Codec(e)),
            };
            if let Err(e) = outcome {
                tracing::trace!(
                    target: "sim_engine::post_message",
                    address = %entry.address,
                    error = %e,
                    "post-message delivery failed (not propagated)"
                );
            }
        }
        self.inner.borrow_mut().draining = false;
    }

    fn deploy_child(&self, code: &[u8], calldata: &[u8], caller: Address) -> Result<Address, EngineError> {
        let call = decode_method_call(calldata)?;
        let content_hash = content_hash_of(code);
        self.note_archive_if_applicable(code, content_hash);
        let class = self.resolve_class(content_hash, code, None)?;
        let locator = format!("/contract/{}", hex::encode(content_hash));
        self.construct_and_install(&class, &call.args, &call.kwargs, caller, locator)
    }

    /// Never returns an error to the caller: a failed cross-contract call is
    /// encoded as `0x01 || utf8(message)` per §4.3/§7's non-propagation rule.
    fn call_child(&self, target: Address, calldata: &[u8], caller: Address) -> Vec<u8> {
        let call = match decode_method_call(calldata) {
            Ok(c) => c,
            Err(e) => return encode_rollback_bytes(&e.to_string()),
        };
        let Some(method) = call.method.clone() else {
            return encode_rollback_bytes("cross-contract call requires a method name");
        };
        match self.invoke_existing(target, &method, &call.args, &call.kwargs, caller, EntryKind::CrossContractCall) {
            Ok(value) => encode_success_bytes(&value),
            Err(e) => encode_rollback_bytes(&e.as_rollback_message()),
        }
    }

    fn handle_nondet(&self, caller: Address, request: NondetRequest) -> NondetResponse {
        match request {
            NondetRequest::DeployContract { code, calldata } => {
                match self.deploy_child(&code, &calldata, caller) {
                    Ok(address) => {
                        self.inner.borrow_mut().triggered_ops.push(TriggeredOp::Deploy { address });
                        NondetResponse::Deployed { address }
                    }
                    Err(e) => NondetResponse::Failed(e.to_string()),
                }
            }
            NondetRequest::CallContract { address, calldata } => {
                NondetResponse::CallResult(self.call_child(address, &calldata, caller))
            }
            NondetRequest::PostMessage { address, calldata } => {
                let method = decode_method_call(&calldata)
                    .ok()
                    .and_then(|c| c.method)
                    .unwrap_or_default();
                self.inner.borrow_mut().queue.push_back(PostMessageEntry {
                    address,
                    calldata,
                    sender: caller,
                });
                self.inner
                    .borrow_mut()
                    .triggered_ops
                    .push(TriggeredOp::Post { address, method });
                NondetResponse::Posted
            }
            NondetRequest::WebRequest(req) => {
                let handler = self.web_handler.borrow().clone();
                let response = match handler {
                    Some(h) => h.handle(req),
                    None => WebResponse {
                        status: 502,
                        headers: BTreeMap::new(),
                        body: b"no web handler configured".to_vec(),
                    },
                };
                let leader_value = web_response_to_calldata(&response);
                self.inner.borrow_mut().witnesses.push(Witness::equality(leader_value));
                NondetResponse::Web(response)
            }
            NondetRequest::ExecPrompt(req) => {
                let handler = self.llm_handler.borrow().clone();
                let response = match handler {
                    Some(h) => h.handle(req),
                    None => LlmResponse {
                        text: "no language-model handler configured".to_string(),
                        structured: None,
                    },
                };
                let leader_value = CalldataValue::Str(response.text.clone());
                self.inner.borrow_mut().witnesses.push(Witness::equality(leader_value));
                NondetResponse::Exec(response)
            }
            NondetRequest::RunNondet { result, validate } => {
                self.inner.borrow_mut().witnesses.push(Witness {
                    leader_result: result.clone(),
                    validate,
                });
                NondetResponse::Value(result)
            }
            NondetRequest::Trace(message) => {
                tracing::trace!(target: "sim_engine::trace", %message, "contract trace");
                NondetResponse::Ack
            }
            NondetRequest::Rollback(message) => {
                self.inner.borrow_mut().pending_rollback = Some(message);
                NondetResponse::Ack
            }
            NondetRequest::Return(value) => NondetResponse::Value(value),
            NondetRequest::Sandbox => NondetResponse::Ack,
        }
    }
}

impl<H: ContractHost> Engine<H>
where
    H::Instance: Clone,
{
    /// Deep-copies the storage-partition map, instance/schema maps, and
    /// post-message queue, and delegates account/transaction state to
    /// `StateStore` (§4.3). The class caches are never part of a snapshot:
    /// they are process-wide and append-only (§5).
    pub fn snapshot(&self) -> u64 {
        let state_snapshot_id = self.state.borrow_mut().snapshot();
        let mut inner = self.inner.borrow_mut();
        inner.snapshot_counter += 1;
        let id = inner.snapshot_counter;
        let snap = EngineSnapshot {
            partitions: inner.partitions.clone(),
            instances: inner.instances.clone(),
            schemas: inner.schemas.clone(),
            queue: inner.queue.clone(),
            context: inner.context,
            call_depth: inner.call_depth,
            state_snapshot_id,
        };
        inner.snapshots.insert(id, snap);
        tracing::debug!(target: "sim_engine::snapshot", snapshot_id = id, "created engine snapshot");
        id
    }

    /// Restores a prior snapshot; discards all snapshots with a higher id.
    /// Returns `false` (and changes nothing) if `id` is unknown.
    pub fn restore(&self, id: u64) -> bool {
        let snap = {
            let inner = self.inner.borrow();
            inner.snapshots.get(&id).cloned()
        };
        let Some(snap) = snap else {
            return false;
        };
        if !self.state.borrow_mut().restore(snap.state_snapshot_id) {
            return false;
        }
        let mut inner = self.inner.borrow_mut();
        inner.partitions = snap.partitions;
        inner.instances = snap.instances;
        inner.schemas = snap.schemas;
        inner.queue = snap.queue;
        inner.context = snap.context;
        inner.call_depth = snap.call_depth;
        inner.snapshots.retain(|&sid, _| sid <= id);
        tracing::debug!(target: "sim_engine::snapshot", snapshot_id = id, "restored engine snapshot");
        true
    }
}
