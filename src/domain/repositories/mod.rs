mod executor;
mod module_loader;

pub use executor::{Executor, JobResult};
pub use module_loader::ModuleLoader;
