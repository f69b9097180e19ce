//! Path: crates/sim-state/src/store.rs
//! The world-state container: accounts, nonces, deployed-contract records,
//! the transaction map with its three indexes, and the block counter.

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use sim_types::{Account, Address, DeployedContract, Hash32, Transaction};
use tracing::debug;

/// A deep copy of everything `StateStore` owns, keyed by a monotone snapshot
/// id. Snapshots compose via stack discipline during consensus rotation.
#[derive(Clone, Debug)]
struct StateSnapshot {
    accounts: HashMap<Address, Account>,
    contracts: HashMap<Address, DeployedContract>,
    transactions: HashMap<Hash32, Transaction>,
    external_index: HashMap<Hash32, Hash32>,
    sequential_index: BTreeMap<u64, Hash32>,
    block_number: u64,
    next_sequential_id: u64,
}

/// In-memory state for the simulated network: accounts, deployed contracts,
/// and the transaction map with its three indexes (internal hash, external
/// hash, sequential id).
#[derive(Debug)]
pub struct StateStore {
    accounts: HashMap<Address, Account>,
    contracts: HashMap<Address, DeployedContract>,
    /// Primary map, keyed by internal hash.
    transactions: HashMap<Hash32, Transaction>,
    external_index: HashMap<Hash32, Hash32>,
    sequential_index: BTreeMap<u64, Hash32>,
    pub block_number: u64,
    pub chain_id: u64,
    next_sequential_id: u64,
    snapshots: BTreeMap<u64, StateSnapshot>,
    snapshot_counter: u64,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(sim_types::DEFAULT_CHAIN_ID)
    }
}

impl StateStore {
    pub fn new(chain_id: u64) -> Self {
        Self {
            accounts: HashMap::new(),
            contracts: HashMap::new(),
            transactions: HashMap::new(),
            external_index: HashMap::new(),
            sequential_index: BTreeMap::new(),
            block_number: 0,
            chain_id,
            next_sequential_id: 1,
            snapshots: BTreeMap::new(),
            snapshot_counter: 0,
        }
    }

    pub fn get_or_create_account(&mut self, addr: Address) -> &mut Account {
        self.accounts.entry(addr).or_insert_with(|| Account::new(addr))
    }

    pub fn fund(&mut self, addr: Address, amount: u128) {
        self.get_or_create_account(addr).balance += amount;
    }

    pub fn balance(&self, addr: Address) -> u128 {
        self.accounts.get(&addr).map(|a| a.balance).unwrap_or(0)
    }

    pub fn nonce(&self, addr: Address) -> u64 {
        self.accounts.get(&addr).map(|a| a.nonce).unwrap_or(0)
    }

    pub fn increment_nonce(&mut self, addr: Address) -> u64 {
        let account = self.get_or_create_account(addr);
        account.nonce += 1;
        account.nonce
    }

    pub fn register_contract(&mut self, contract: DeployedContract) {
        self.contracts.insert(contract.address, contract);
    }

    pub fn get_contract(&self, addr: Address) -> Option<&DeployedContract> {
        self.contracts.get(&addr)
    }

    pub fn allocate_sequential_id(&mut self) -> u64 {
        let id = self.next_sequential_id;
        self.next_sequential_id += 1;
        id
    }

    /// SHA-256 of `seed || current_nanoseconds`. Intentionally
    /// non-reproducible across runs: this is a process-local identity, not a
    /// content hash.
    pub fn generate_internal_hash(&self, seed: &str) -> Hash32 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(b":");
        hasher.update(nanos.to_string().as_bytes());
        let digest = hasher.finalize();
        Hash32::from_slice(&digest).expect("sha256 output is always 32 bytes")
    }

    /// The low (first) 20 bytes of `SHA-256(deployer-lowercase-hex || ":" ||
    /// nonce-decimal)`. Not RLP-keccak like Ethereum's: this scheme is the
    /// Sim's own and must be reproduced exactly for compatibility.
    pub fn generate_contract_address(&self, deployer: Address, nonce: u64) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(deployer.to_hex().as_bytes());
        hasher.update(b":");
        hasher.update(nonce.to_string().as_bytes());
        let digest = hasher.finalize();
        Address::from_slice(&digest[..20]).expect("slice is exactly 20 bytes")
    }

    pub fn put_transaction(&mut self, tx: Transaction) {
        let internal = tx.internal_hash;
        if let Some(external) = tx.external_hash {
            self.external_index.insert(external, internal);
        }
        self.sequential_index.insert(tx.sequential_id, internal);
        self.transactions.insert(internal, tx);
    }

    pub fn tx_by_internal_hash(&self, h: Hash32) -> Option<&Transaction> {
        self.transactions.get(&h)
    }

    pub fn tx_by_external_hash(&self, h: Hash32) -> Option<&Transaction> {
        let internal = self.external_index.get(&h)?;
        self.transactions.get(internal)
    }

    pub fn tx_by_sequential_id(&self, id: u64) -> Option<&Transaction> {
        let internal = self.sequential_index.get(&id)?;
        self.transactions.get(internal)
    }

    pub fn advance_block(&mut self) -> u64 {
        self.block_number += 1;
        self.block_number
    }

    /// Deep-copies everything this store owns under a freshly-allocated
    /// snapshot id.
    pub fn snapshot(&mut self) -> u64 {
        self.snapshot_counter += 1;
        let id = self.snapshot_counter;
        self.snapshots.insert(
            id,
            StateSnapshot {
                accounts: self.accounts.clone(),
                contracts: self.contracts.clone(),
                transactions: self.transactions.clone(),
                external_index: self.external_index.clone(),
                sequential_index: self.sequential_index.clone(),
                block_number: self.block_number,
                next_sequential_id: self.next_sequential_id,
            },
        );
        debug!(target: "sim_state::snapshot", snapshot_id = id, "created state snapshot");
        id
    }

    /// Restores a prior snapshot; discards all snapshots with a higher id.
    /// Returns `false` (and changes nothing) if `id` is unknown.
    pub fn restore(&mut self, id: u64) -> bool {
        let Some(snap) = self.snapshots.get(&id).cloned() else {
            return false;
        };
        self.accounts = snap.accounts;
        self.contracts = snap.contracts;
        self.transactions = snap.transactions;
        self.external_index = snap.external_index;
        self.sequential_index = snap.sequential_index;
        self.block_number = snap.block_number;
        self.next_sequential_id = snap.next_sequential_id;
        self.snapshots.retain(|&sid, _| sid <= id);
        debug!(target: "sim_state::snapshot", snapshot_id = id, "restored state snapshot");
        true
    }
}
