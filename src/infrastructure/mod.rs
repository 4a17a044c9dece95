pub mod config;
pub mod executor;
pub mod module_loader;
pub mod persistence;
