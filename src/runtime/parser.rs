//! Call-data encoding.
//!
//! Async calls and cross-shard messages carry their payload as
//! `function@hexarg@hexarg…`. Callback messages leave the function empty:
//! `@hexcode@hexarg…`.

use crate::{HostError, Result};

const SEPARATOR: u8 = b'@';

/// Function name and decoded arguments of a call-data payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCallData {
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
}

/// Parses `function@hex@hex…`. The function name must not be empty.
pub fn parse_call_data(data: &[u8]) -> Result<ParsedCallData> {
    let parsed = split_call_data(data)?;
    if parsed.function.is_empty() {
        return Err(HostError::InvalidArgument("call data has no function name".into()));
    }
    Ok(parsed)
}

/// Parses the `@hexcode@hex…` payload of a callback message.
pub fn parse_callback_data(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let parsed = split_call_data(data)?;
    if !parsed.function.is_empty() {
        return Err(HostError::InvalidArgument(format!(
            "callback data must not name a function, got '{}'",
            parsed.function
        )));
    }
    Ok(parsed.arguments)
}

pub fn build_call_data(function: &str, arguments: &[Vec<u8>]) -> Vec<u8> {
    let mut data = function.as_bytes().to_vec();
    for argument in arguments {
        data.push(SEPARATOR);
        data.extend_from_slice(hex::encode(argument).as_bytes());
    }
    data
}

pub fn build_callback_data(arguments: &[Vec<u8>]) -> Vec<u8> {
    build_call_data("", arguments)
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn split_call_data(data: &[u8]) -> Result<ParsedCallData> {
    let mut tokens = data.split(|byte| *byte == SEPARATOR);
    let function = tokens.next().unwrap_or_default();
    let function = std::str::from_utf8(function)
        .map_err(|e| HostError::InvalidArgument(format!("function name is not utf-8: {}", e)))?;
    if function.contains(|c: char| c.is_whitespace() || c.is_control()) {
        return Err(HostError::InvalidArgument(format!(
            "invalid function name '{}'",
            function.escape_debug()
        )));
    }

    let arguments = tokens
        .enumerate()
        .map(|(index, token)| {
            hex::decode(token).map_err(|e| {
                HostError::InvalidArgument(format!("argument {} is not valid hex: {}", index, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedCallData {
        function: function.to_string(),
        arguments,
    })
}

// ── tests ─────────────────────────────────────────────────────────────────────
