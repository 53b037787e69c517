use super::executor::Instance;
use crate::{HostError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use wasmparser::{ExternalKind, Parser, Payload, TypeRef};

const MAX_FUNCTION_NAME_LEN: usize = 256;

/// What deployment validation needs to know about a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub has_memory: bool,
    pub exported_functions: Vec<String>,
    pub imported_functions: Vec<String>,
}

/// Rejects contract code before it is deployed.
#[derive(Debug, Clone, Default)]
pub struct ContractValidator {
    forbidden_exports: BTreeSet<String>,
}

impl ContractValidator {
    /// `forbidden_exports` are names a contract may not define, typically the
    /// builtin functions.
    pub fn new<I, S>(forbidden_exports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            forbidden_exports: forbidden_exports.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads memory and export information from raw module bytes.
    pub fn inspect(code: &[u8]) -> Result<ModuleSummary> {
        let mut summary = ModuleSummary::default();
        for payload in Parser::new(0).parse_all(code) {
            let payload = payload.map_err(|e| HostError::ContractInvalid(e.to_string()))?;
            match payload {
                Payload::ImportSection(reader) => {
                    for import in reader {
                        let import = import.map_err(|e| HostError::ContractInvalid(e.to_string()))?;
                        match import.ty {
                            TypeRef::Memory(_) => summary.has_memory = true,
                            TypeRef::Func(_) => summary
                                .imported_functions
                                .push(format!("{}.{}", import.module, import.name)),
                            _ => {}
                        }
                    }
                }
                Payload::MemorySection(reader) => {
                    if reader.count() > 0 {
                        summary.has_memory = true;
                    }
                }
                Payload::ExportSection(reader) => {
                    for export in reader {
                        let export = export.map_err(|e| HostError::ContractInvalid(e.to_string()))?;
                        if export.kind == ExternalKind::Func {
                            summary.exported_functions.push(export.name.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(summary)
    }

    /// Static checks on module bytes.
    pub fn validate_code(&self, code: &[u8]) -> Result<ModuleSummary> {
        let summary = Self::inspect(code)?;
        if !summary.has_memory {
            return Err(HostError::ContractInvalid("module has no memory".into()));
        }
        for name in &summary.exported_functions {
            self.check_export_name(name)?;
        }
        Ok(summary)
    }

    /// Checks that need a live instance: memory and void entry points.
    pub fn validate_instance(&self, instance: &dyn Instance) -> Result<()> {
        if !instance.has_memory() {
            return Err(HostError::ContractInvalid("instance has no memory".into()));
        }
        for name in instance.function_names() {
            self.check_export_name(&name)?;
            instance
                .validate_void_function(&name)
                .map_err(|_| HostError::FunctionWrongSignature(name.clone()))?;
        }
        Ok(())
    }

    fn check_export_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_FUNCTION_NAME_LEN {
            return Err(HostError::ContractInvalid(format!(
                "invalid exported function name length: {}",
                name.len()
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(HostError::ContractInvalid(format!(
                "invalid exported function name '{}'",
                name.escape_debug()
            )));
        }
        if self.forbidden_exports.contains(name) {
            return Err(HostError::ContractInvalid(format!(
                "contract exports reserved name '{}'",
                name
            )));
        }
        Ok(())
    }
}
