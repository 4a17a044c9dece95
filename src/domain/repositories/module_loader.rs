//! ModuleLoader trait: the narrow boundary to the (out of scope) module
//! definition loader.

use crate::domain::entities::ComputeModule;
use std::path::Path;

/// Reads declared compute modules from wherever they live on disk.
///
/// The orchestrator core never parses a module definition itself; it only
/// needs the resulting [`ComputeModule`] shapes.
pub trait ModuleLoader {
    fn load_all(&self, modules_dir: &Path) -> anyhow::Result<Vec<ComputeModule>>;
}
