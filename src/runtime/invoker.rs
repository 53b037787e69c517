//! Function invocation and the execution-time watchdog.

use super::executor::{ExecutorError, Instance, VmHooks};
use super::result::ExitReason;
use super::BreakpointValue;
use crate::{HostError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Calls `function` on `instance` and turns the engine's answer into an
/// [`ExitReason`]. Errors that mean the call never started are returned as
/// [`HostError`]s.
#[tracing::instrument(skip_all, fields(function = function))]
pub fn invoke_function(
    instance: &mut dyn Instance,
    function: &str,
    hooks: &mut dyn VmHooks,
) -> Result<ExitReason> {
    if !instance.has_function(function) {
        return Err(HostError::FunctionNotFound(function.to_string()));
    }
    debug!("invoking contract function");
    match instance.call_function(function, hooks) {
        Ok(()) => Ok(ExitReason::Returned),
        Err(ExecutorError::Breakpoint(breakpoint)) => Ok(ExitReason::Breakpoint(breakpoint)),
        Err(ExecutorError::MemoryLimit) => Ok(ExitReason::Breakpoint(BreakpointValue::MemoryLimit)),
        Err(ExecutorError::Trap(message)) => Ok(ExitReason::Trap(message)),
        Err(other) => Err(other.into()),
    }
}

/// Wall-clock limit for one transaction.
///
/// A helper thread waits on a channel with `recv_timeout`; when the limit
/// passes first it raises the expiry flag, which the host polls at every host
/// call and call boundary. Dropping the watchdog stops the thread.
#[derive(Debug)]
pub struct Watchdog {
    limit_ms: u64,
    expired: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
}

impl Watchdog {
    /// Starts a watchdog; `limit_ms == 0` never expires.
    pub fn start(limit_ms: u64) -> Self {
        let expired = Arc::new(AtomicBool::new(false));
        if limit_ms == 0 {
            return Self {
                limit_ms,
                expired,
                stop: None,
            };
        }

        let (tx, rx) = mpsc::channel::<()>();
        let flag = Arc::clone(&expired);
        std::thread::spawn(move || match rx.recv_timeout(Duration::from_millis(limit_ms)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                error!("contract execution timed out after {} ms", limit_ms);
                flag.store(true, Ordering::SeqCst);
            }
        });

        Self {
            limit_ms,
            expired,
            stop: Some(tx),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// Fails with [`HostError::ExecutionTimeout`] once the limit has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            return Err(HostError::ExecutionTimeout(self.limit_ms));
        }
        Ok(())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
