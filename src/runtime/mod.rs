//! Runtime sub-system: drives opaque contract instances.
//!
//! Sub-modules:
//! - [`executor`]: executor/instance traits and the host-call surface.
//! - [`breakpoint`]: control-flow signals raised by host calls.
//! - [`context`]: per-invocation runtime state.
//! - [`invoker`]: function invocation and the execution-time watchdog.
//! - [`loader`]: instance acquisition through the warm pool.
//! - [`pool`]: warm instances with exclusive checkout.
//! - [`result`]: exit classification and breakpoint dispatch.
//! - [`parser`]: `function@hex@hex` call data.
//! - [`validator`]: deployment-time code checks.

pub mod breakpoint;
pub mod context;
pub mod executor;
pub mod invoker;
pub mod loader;
pub mod parser;
pub mod pool;
pub mod result;
pub mod validator;

pub use breakpoint::BreakpointValue;
pub use context::RuntimeContext;
pub use executor::{
    AsyncCallRequest, CallRequest, CreateRequest, Executor, ExecutorError, HookResult, Instance,
    InstanceOptions, VmHooks,
};
pub use invoker::Watchdog;
pub use pool::InstancePool;
pub use result::{Dispatch, ExitReason};
pub use validator::{ContractValidator, ModuleSummary};
