//! Test doubles for vm-host: an in-memory sharded ledger, an executor that
//! runs Rust closures as contract functions, and a token-transfer builtin.

use num_bigint::{BigInt, BigUint};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use vm_host::blockchain::BlockchainHook;
use vm_host::builtin::BuiltinFunctionContainer;
use vm_host::runtime::{Executor, ExecutorError, Instance, InstanceOptions, VmHooks};
use vm_host::types::LogEntry;
use vm_host::{Address, ContractCallInput, ReturnCode, VmOutput};

/// Address whose shard, under [`MockBlockchain`], is `shard`.
pub fn address(seed: u8, shard: u8) -> Address {
    let mut bytes = [seed; 32];
    bytes[31] = shard;
    Address(bytes)
}

#[derive(Debug, Clone, Default)]
pub struct MockAccount {
    pub balance: BigUint,
    pub nonce: u64,
    pub code: Option<Vec<u8>>,
    pub storage: HashMap<Vec<u8>, Vec<u8>>,
}

/// Ledger state shared by the shards of one test.
#[derive(Debug, Default)]
pub struct MockWorld {
    pub accounts: BTreeMap<Address, MockAccount>,
}

/// Ledger hook over a [`MockWorld`]. The shard of an address is its last
/// byte modulo the number of shards.
#[derive(Debug, Clone)]
pub struct MockBlockchain {
    world: Arc<RwLock<MockWorld>>,
    num_shards: u32,
    self_shard: u32,
}

impl MockBlockchain {
    pub fn new(num_shards: u32, self_shard: u32) -> Self {
        Self {
            world: Arc::new(RwLock::new(MockWorld::default())),
            num_shards: num_shards.max(1),
            self_shard,
        }
    }

    /// Single-shard ledger.
    pub fn single() -> Self {
        Self::new(1, 0)
    }

    /// View of the same world from another shard.
    pub fn on_shard(&self, shard: u32) -> Self {
        Self {
            world: Arc::clone(&self.world),
            num_shards: self.num_shards,
            self_shard: shard,
        }
    }

    pub fn add_account(&self, address: Address, balance: u64) {
        self.world.write().accounts.entry(address).or_default().balance = BigUint::from(balance);
    }

    pub fn deploy(&self, address: Address, code: &[u8]) {
        self.world.write().accounts.entry(address).or_default().code = Some(code.to_vec());
    }

    pub fn set_storage(&self, address: Address, key: &[u8], value: &[u8]) {
        self.world
            .write()
            .accounts
            .entry(address)
            .or_default()
            .storage
            .insert(key.to_vec(), value.to_vec());
    }

    pub fn balance(&self, address: &Address) -> BigUint {
        self.world
            .read()
            .accounts
            .get(address)
            .map(|account| account.balance.clone())
            .unwrap_or_default()
    }

    pub fn storage(&self, address: &Address, key: &[u8]) -> Vec<u8> {
        self.get_storage_data(address, key)
    }

    /// Commits the part of a transaction output that belongs to this shard.
    pub fn apply_output(&self, output: &VmOutput) {
        let mut world = self.world.write();
        for (address, delta) in &output.output_accounts {
            if self.get_shard_of_address(address) != self.self_shard {
                continue;
            }
            let account = world.accounts.entry(*address).or_default();
            let balance = BigInt::from(account.balance.clone()) + &delta.balance_delta;
            account.balance = balance.to_biguint().unwrap_or_default();
            account.nonce = account.nonce.max(delta.nonce);
            if let Some(code) = &delta.code {
                account.code = Some(code.clone());
            }
            for (key, update) in &delta.storage_updates {
                if update.data.is_empty() {
                    account.storage.remove(key);
                } else {
                    account.storage.insert(key.clone(), update.data.clone());
                }
            }
        }
        for address in &output.deleted_accounts {
            if self.get_shard_of_address(address) != self.self_shard {
                continue;
            }
            world.accounts.remove(address);
        }
    }
}

impl BlockchainHook for MockBlockchain {
    fn account_exists(&self, address: &Address) -> bool {
        self.world.read().accounts.contains_key(address)
    }

    fn get_balance(&self, address: &Address) -> BigUint {
        self.balance(address)
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.world
            .read()
            .accounts
            .get(address)
            .map_or(0, |account| account.nonce)
    }

    fn get_code(&self, address: &Address) -> Option<Vec<u8>> {
        self.world
            .read()
            .accounts
            .get(address)
            .and_then(|account| account.code.clone())
    }

    fn get_storage_data(&self, address: &Address, key: &[u8]) -> Vec<u8> {
        self.world
            .read()
            .accounts
            .get(address)
            .and_then(|account| account.storage.get(key).cloned())
            .unwrap_or_default()
    }

    fn get_shard_of_address(&self, address: &Address) -> u32 {
        u32::from(address.0[31]) % self.num_shards
    }

    fn self_shard_id(&self) -> u32 {
        self.self_shard
    }
}

pub type ScriptFn = Arc<dyn Fn(&mut dyn VmHooks) -> Result<(), ExecutorError> + Send + Sync>;

/// Contract whose exported functions are Rust closures.
#[derive(Clone)]
pub struct ScriptedContract {
    functions: BTreeMap<String, ScriptFn>,
    has_memory: bool,
    wrong_signature: BTreeSet<String>,
}

impl Default for ScriptedContract {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedContract {
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
            has_memory: true,
            wrong_signature: BTreeSet::new(),
        }
    }

    pub fn function<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut dyn VmHooks) -> Result<(), ExecutorError> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(body));
        self
    }

    /// Export that does nothing.
    pub fn noop(self, name: &str) -> Self {
        self.function(name, |_| Ok(()))
    }

    pub fn without_memory(mut self) -> Self {
        self.has_memory = false;
        self
    }

    /// Marks `name` as taking parameters, which entry points may not.
    pub fn with_wrong_signature(mut self, name: &str) -> Self {
        self.wrong_signature.insert(name.to_string());
        self
    }
}

struct ScriptedInstance {
    contract: Arc<ScriptedContract>,
    points: u64,
}

impl Instance for ScriptedInstance {
    fn call_function(&mut self, name: &str, hooks: &mut dyn VmHooks) -> Result<(), ExecutorError> {
        let body = self
            .contract
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutorError::FunctionNotFound(name.to_string()))?;
        body(hooks)
    }

    fn has_function(&self, name: &str) -> bool {
        self.contract.functions.contains_key(name)
    }

    fn function_names(&self) -> Vec<String> {
        self.contract.functions.keys().cloned().collect()
    }

    fn validate_void_function(&self, name: &str) -> Result<(), ExecutorError> {
        if self.contract.wrong_signature.contains(name) {
            return Err(ExecutorError::WrongSignature(name.to_string()));
        }
        Ok(())
    }

    fn has_memory(&self) -> bool {
        self.contract.has_memory
    }

    fn points_used(&self) -> u64 {
        self.points
    }

    fn set_points_used(&mut self, points: u64) {
        self.points = points;
    }

    fn reset(&mut self) -> bool {
        self.points = 0;
        true
    }
}

/// Executor that maps code bytes to registered [`ScriptedContract`]s.
#[derive(Default)]
pub struct ScriptedExecutor {
    contracts: RwLock<HashMap<Vec<u8>, Arc<ScriptedContract>>>,
    instances_created: Mutex<usize>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, code: &[u8], contract: ScriptedContract) {
        self.contracts.write().insert(code.to_vec(), Arc::new(contract));
    }

    pub fn instances_created(&self) -> usize {
        *self.instances_created.lock()
    }
}

impl Executor for ScriptedExecutor {
    fn new_instance(&self, code: &[u8], _options: &InstanceOptions) -> Result<Box<dyn Instance>, ExecutorError> {
        let contract = self
            .contracts
            .read()
            .get(code)
            .cloned()
            .ok_or_else(|| ExecutorError::InvalidCode("unknown code".into()))?;
        *self.instances_created.lock() += 1;
        Ok(Box::new(ScriptedInstance { contract, points: 0 }))
    }
}

pub const ESDT_TRANSFER: &str = "ESDTTransfer";

/// Gas a token transfer costs under [`MockBuiltins`].
pub const ESDT_TRANSFER_COST: u64 = 10;

/// Builtins with a single token transfer that only logs what it moved.
#[derive(Debug, Default)]
pub struct MockBuiltins {
    calls: Mutex<Vec<ContractCallInput>>,
}

impl MockBuiltins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ContractCallInput> {
        self.calls.lock().clone()
    }
}

impl BuiltinFunctionContainer for MockBuiltins {
    fn is_builtin(&self, function: &str) -> bool {
        function == ESDT_TRANSFER
    }

    fn names(&self) -> Vec<String> {
        vec![ESDT_TRANSFER.to_string()]
    }

    fn process_builtin_function(&self, input: &ContractCallInput) -> vm_host::Result<VmOutput> {
        self.calls.lock().push(input.clone());
        let arguments = &input.vm_input.arguments;
        if arguments.len() < 2 {
            return Ok(VmOutput::failed(ReturnCode::UserError, "token and amount required"));
        }
        let gas = input.vm_input.gas_provided;
        if gas < ESDT_TRANSFER_COST {
            return Ok(VmOutput::failed(ReturnCode::OutOfGas, "not enough gas"));
        }
        Ok(VmOutput {
            gas_remaining: gas - ESDT_TRANSFER_COST,
            logs: vec![LogEntry {
                identifier: ESDT_TRANSFER.as_bytes().to_vec(),
                address: input.recipient,
                topics: arguments[..2].to_vec(),
                data: Vec::new(),
            }],
            ..VmOutput::default()
        })
    }
}
