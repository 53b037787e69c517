//! Builtin-function collaborator.
//!
//! Builtins are protocol functions (token transfers and the like) that run
//! natively instead of as contract code. The host only asks whether a name is
//! a builtin and hands the call over.

use crate::types::{ContractCallInput, VmOutput};
use crate::{HostError, Result};
use num_bigint::BigUint;

pub trait BuiltinFunctionContainer: Send + Sync {
    fn is_builtin(&self, function: &str) -> bool;

    fn names(&self) -> Vec<String>;

    /// Runs the builtin named by `input.function`. A failed builtin is
    /// reported through the output's return code; `Err` is reserved for
    /// errors that must abort the transaction.
    fn process_builtin_function(&self, input: &ContractCallInput) -> Result<VmOutput>;
}

/// Container without any builtin.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBuiltins;

impl BuiltinFunctionContainer for NoBuiltins {
    fn is_builtin(&self, _function: &str) -> bool {
        false
    }

    fn names(&self) -> Vec<String> {
        Vec::new()
    }

    fn process_builtin_function(&self, input: &ContractCallInput) -> Result<VmOutput> {
        Err(HostError::FunctionNotFound(input.function.clone()))
    }
}

/// Arguments of a token transfer that carries an async callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EsdtCallbackArguments {
    pub token_identifier: Vec<u8>,
    pub value: BigUint,
    /// What the callback itself receives: return code first.
    pub callback_arguments: Vec<Vec<u8>>,
}

/// Splits `[token, amount, code, data…]` into the transfer and the callback
/// arguments that follow it.
pub fn parse_esdt_callback_arguments(arguments: &[Vec<u8>]) -> Result<EsdtCallbackArguments> {
    match arguments {
        [token, amount, rest @ ..] => Ok(EsdtCallbackArguments {
            token_identifier: token.clone(),
            value: BigUint::from_bytes_be(amount),
            callback_arguments: rest.to_vec(),
        }),
        _ => Err(HostError::InvalidArgument(format!(
            "token transfer callback needs at least 2 arguments, got {}",
            arguments.len()
        ))),
    }
}
