use super::ConfigError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Fixed and per-byte costs of the host itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BaseOperationCost {
    pub store_per_byte: u64,
    pub release_per_byte: u64,
    pub data_copy_per_byte: u64,
    pub persist_per_byte: u64,
    pub compile_per_byte: u64,
    pub aot_prepare_per_byte: u64,
    pub get_code: u64,
    /// Gas a caller always keeps back when forwarding gas to a callee.
    pub forwarded_gas_epsilon: u64,
}

impl Default for BaseOperationCost {
    fn default() -> Self {
        Self {
            store_per_byte: 10_000,
            release_per_byte: 1_000,
            data_copy_per_byte: 50,
            persist_per_byte: 1_000,
            compile_per_byte: 300,
            aot_prepare_per_byte: 100,
            get_code: 1_000_000,
            forwarded_gas_epsilon: 10_000,
        }
    }
}

/// Cost of each host call a contract can make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostApiCost {
    pub get_argument: u64,
    pub get_num_arguments: u64,
    pub get_function: u64,
    pub get_caller: u64,
    pub get_sc_address: u64,
    pub get_call_value: u64,
    pub get_gas_left: u64,
    pub finish: u64,
    pub signal_error: u64,
    pub storage_store: u64,
    pub storage_load: u64,
    pub log: u64,
    pub transfer_value: u64,
    pub execute_on_dest_context: u64,
    pub execute_on_same_context: u64,
    pub execute_read_only: u64,
    pub get_return_data: u64,
    pub create_contract: u64,
    pub async_call_step: u64,
    pub async_callback_gas_lock: u64,
    pub create_async_call: u64,
    pub set_async_group_callback: u64,
    pub get_callback_closure: u64,
}

impl Default for HostApiCost {
    fn default() -> Self {
        Self {
            get_argument: 1_000,
            get_num_arguments: 1_000,
            get_function: 1_000,
            get_caller: 1_000,
            get_sc_address: 1_000,
            get_call_value: 1_000,
            get_gas_left: 1_000,
            finish: 1_000,
            signal_error: 1_000,
            storage_store: 75_000,
            storage_load: 50_000,
            log: 3_750,
            transfer_value: 100_000,
            execute_on_dest_context: 100_000,
            execute_on_same_context: 100_000,
            execute_read_only: 160_000,
            get_return_data: 1_000,
            create_contract: 300_000,
            async_call_step: 100_000,
            async_callback_gas_lock: 4_000_000,
            create_async_call: 200_000,
            set_async_group_callback: 100_000,
            get_callback_closure: 10_000,
        }
    }
}

/// Cost of the managed-buffer host calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ManagedBufferApiCost {
    pub m_buffer_new: u64,
    pub m_buffer_get_bytes: u64,
    pub m_buffer_set_bytes: u64,
    pub m_buffer_append: u64,
}

impl Default for ManagedBufferApiCost {
    fn default() -> Self {
        Self {
            m_buffer_new: 2_000,
            m_buffer_get_bytes: 2_000,
            m_buffer_set_bytes: 2_000,
            m_buffer_append: 2_000,
        }
    }
}

/// Named cost constants, fixed for the duration of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GasSchedule {
    pub base_operation_cost: BaseOperationCost,
    pub host_api_cost: HostApiCost,
    pub managed_buffer_api_cost: ManagedBufferApiCost,
    /// Per-opcode costs, keyed by opcode name. Consulted by the executor.
    pub wasm_opcode_cost: BTreeMap<String, u64>,
}

impl GasSchedule {
    /// Schedule where every operation is free.
    pub fn zeroed() -> Self {
        Self {
            base_operation_cost: BaseOperationCost {
                store_per_byte: 0,
                release_per_byte: 0,
                data_copy_per_byte: 0,
                persist_per_byte: 0,
                compile_per_byte: 0,
                aot_prepare_per_byte: 0,
                get_code: 0,
                forwarded_gas_epsilon: 0,
            },
            host_api_cost: HostApiCost {
                get_argument: 0,
                get_num_arguments: 0,
                get_function: 0,
                get_caller: 0,
                get_sc_address: 0,
                get_call_value: 0,
                get_gas_left: 0,
                finish: 0,
                signal_error: 0,
                storage_store: 0,
                storage_load: 0,
                log: 0,
                transfer_value: 0,
                execute_on_dest_context: 0,
                execute_on_same_context: 0,
                execute_read_only: 0,
                get_return_data: 0,
                create_contract: 0,
                async_call_step: 0,
                async_callback_gas_lock: 0,
                create_async_call: 0,
                set_async_group_callback: 0,
                get_callback_closure: 0,
            },
            managed_buffer_api_cost: ManagedBufferApiCost {
                m_buffer_new: 0,
                m_buffer_get_bytes: 0,
                m_buffer_set_bytes: 0,
                m_buffer_append: 0,
            },
            wasm_opcode_cost: BTreeMap::new(),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn opcode_cost(&self, opcode: &str) -> u64 {
        self.wasm_opcode_cost.get(opcode).copied().unwrap_or(0)
    }
}

/// Hot-swappable gas schedule shared by every transaction of a host.
///
/// Each transaction takes one [`snapshot`](Self::snapshot) when it starts and
/// keeps it until it ends; a [`swap`](Self::swap) only affects transactions
/// started afterwards.
#[derive(Debug, Clone, Default)]
pub struct GasScheduleHandle {
    current: Arc<RwLock<Arc<GasSchedule>>>,
}

impl GasScheduleHandle {
    pub fn new(schedule: GasSchedule) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(schedule))),
        }
    }

    pub fn snapshot(&self) -> Arc<GasSchedule> {
        Arc::clone(&self.current.read())
    }

    pub fn swap(&self, schedule: GasSchedule) {
        *self.current.write() = Arc::new(schedule);
    }
}
