#![allow(dead_code)]

use std::sync::Arc;
use vm_host::config::{GasSchedule, HostConfig};
use vm_host::runtime::{CallRequest, ExecutorError, VmHooks};
use vm_host::{Address, ContractCallInput, VmHost};
use vm_host_mock::{MockBlockchain, MockBuiltins, ScriptedContract, ScriptedExecutor};

pub use vm_host_mock::address;

pub const TX_HASH: &[u8] = b"tx-hash";

/// Ledger, executor and builtins shared by the hosts of one test.
pub struct Fixture {
    pub chain: MockBlockchain,
    pub executor: Arc<ScriptedExecutor>,
    pub builtins: Arc<MockBuiltins>,
}

impl Fixture {
    pub fn new(num_shards: u32) -> Self {
        Self {
            chain: MockBlockchain::new(num_shards, 0),
            executor: Arc::new(ScriptedExecutor::new()),
            builtins: Arc::new(MockBuiltins::new()),
        }
    }

    /// Registers `contract` as the code of `address`.
    pub fn deploy(&self, address: Address, contract: ScriptedContract) {
        let code = code_of(&address);
        self.executor.register(&code, contract);
        self.chain.deploy(address, &code);
    }

    pub fn host(&self) -> VmHost {
        self.host_on_shard(0, HostConfig::default())
    }

    pub fn host_with_config(&self, config: HostConfig) -> VmHost {
        self.host_on_shard(0, config)
    }

    pub fn host_on_shard(&self, shard: u32, config: HostConfig) -> VmHost {
        self.host_with_schedule(shard, config, GasSchedule::zeroed())
    }

    pub fn host_with_schedule(&self, shard: u32, config: HostConfig, schedule: GasSchedule) -> VmHost {
        VmHost::builder()
            .executor(self.executor.clone())
            .blockchain_hook(Arc::new(self.chain.on_shard(shard)))
            .builtins(self.builtins.clone())
            .gas_schedule(schedule)
            .config(config)
            .build()
            .unwrap()
    }
}

pub fn code_of(address: &Address) -> Vec<u8> {
    format!("code-{}", address.to_hex()).into_bytes()
}

pub fn call(caller: Address, recipient: Address, function: &str, gas: u64) -> ContractCallInput {
    ContractCallInput::new(caller, recipient, function)
        .with_gas(gas)
        .with_tx_hash(TX_HASH.to_vec())
}

pub fn dest_call(destination: Address, function: &str, gas: u64) -> CallRequest {
    CallRequest {
        gas,
        destination,
        function: function.to_string(),
        ..CallRequest::default()
    }
}

/// Writes the status of a nested call as return data.
pub fn finish_status(hooks: &mut dyn VmHooks, status: i32) -> Result<(), ExecutorError> {
    hooks.finish(&[status as u8])?;
    Ok(())
}
