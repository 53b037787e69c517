use crate::types::Address;
use indexmap::IndexMap;
use serde::Serialize;

/// Gas consumed by one (contract, function) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GasTraceEntry {
    pub contract: Address,
    pub function: String,
    pub gas: u64,
}

/// Per-(contract, function) gas consumption, in first-seen order.
///
/// Recording is observational only: the ledger never reads it back.
#[derive(Debug, Clone, Default)]
pub struct GasTracer {
    records: IndexMap<(Address, String), u64>,
}

impl GasTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, contract: Address, function: &str, gas: u64) {
        if gas == 0 {
            return;
        }
        let slot = self
            .records
            .entry((contract, function.to_string()))
            .or_insert(0);
        *slot = slot.saturating_add(gas);
    }

    pub fn get(&self, contract: &Address, function: &str) -> u64 {
        self.records
            .get(&(*contract, function.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.records
            .values()
            .fold(0u64, |acc, gas| acc.saturating_add(*gas))
    }

    pub fn entries(&self) -> Vec<GasTraceEntry> {
        self.records
            .iter()
            .map(|((contract, function), gas)| GasTraceEntry {
                contract: *contract,
                function: function.clone(),
                gas: *gas,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
