//! Async call bookkeeping: calls, groups, the per-invocation context and its
//! persisted form.

pub mod call;
pub mod codec;
pub mod context;
pub mod group;
pub mod results;

pub use call::{determine_execution_mode, AsyncCall, AsyncCallExecutionMode, AsyncCallStatus};
pub use codec::{decode_async_context, encode_async_context, SerializableAsyncContext};
pub use context::{AsyncContext, ASYNC_STORAGE_TAG, LEGACY_GROUP_ID};
pub use group::AsyncCallGroup;
pub use results::{AsyncCallResults, FinishedAsyncCall, ResultTransfer};
