//! Instance acquisition: warm pool first, executor otherwise.

use super::executor::{Executor, Instance, InstanceOptions};
use super::pool::{code_hash, CodeHash, InstancePool};
use crate::Result;
use tracing::debug;

/// Instance checked out for one invocation.
pub struct LoadedInstance {
    pub hash: CodeHash,
    pub instance: Box<dyn Instance>,
}

impl std::fmt::Debug for LoadedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedInstance")
            .field("hash", &hex::encode(self.hash))
            .finish()
    }
}

#[tracing::instrument(skip_all, fields(code_len = code.len()))]
pub fn load_instance(
    executor: &dyn Executor,
    pool: &InstancePool,
    code: &[u8],
    options: &InstanceOptions,
) -> Result<LoadedInstance> {
    let hash = code_hash(code);
    if let Some(mut instance) = pool.checkout(&hash) {
        instance.set_points_used(0);
        return Ok(LoadedInstance { hash, instance });
    }
    debug!("creating new instance");
    let instance = executor.new_instance(code, options)?;
    Ok(LoadedInstance { hash, instance })
}

pub fn release_instance(pool: &InstancePool, loaded: LoadedInstance) {
    pool.checkin(loaded.hash, loaded.instance);
}
