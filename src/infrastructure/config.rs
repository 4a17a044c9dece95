//! Run configuration, loaded from environment variables (optionally via a
//! `.env` file).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Environment-driven configuration for a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root workspace directory (`inputs/`, `outputs/`, state file).
    pub workspace: String,
    /// Directory of module descriptors, consumed by the `ModuleLoader`.
    pub modules_dir: String,
    /// Worker thread count handed to the executor as a param.
    pub threads: u32,
    /// Memory budget in GB handed to the executor as a param.
    pub mem_gb: u32,
    /// How long the executor should wait for filesystem sync before giving
    /// up on an output it expects, in seconds.
    pub file_system_wait_sec: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: "./workspace".to_string(),
            modules_dir: "./modules".to_string(),
            threads: 4,
            mem_gb: 8,
            file_system_wait_sec: 30,
        }
    }
}

impl Config {
    /// Loads config from `.env` (if present) and the process environment,
    /// falling back to defaults for anything unset.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();
        Self {
            workspace: std::env::var("LOOMWORK_WORKSPACE").unwrap_or(defaults.workspace),
            modules_dir: std::env::var("LOOMWORK_MODULES_DIR").unwrap_or(defaults.modules_dir),
            threads: env_u32("LOOMWORK_THREADS", defaults.threads),
            mem_gb: env_u32("LOOMWORK_MEM_GB", defaults.mem_gb),
            file_system_wait_sec: env_u32("LOOMWORK_FS_WAIT_SEC", defaults.file_system_wait_sec),
        }
    }

    /// Params passed through the `Executor` boundary untouched.
    pub fn as_executor_params(&self) -> HashMap<String, String> {
        HashMap::from([
            ("threads".to_string(), self.threads.to_string()),
            ("mem_gb".to_string(), self.mem_gb.to_string()),
            ("file_system_wait_sec".to_string(), self.file_system_wait_sec.to_string()),
        ])
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.threads, 4);
        assert_eq!(config.mem_gb, 8);
    }

    #[test]
    fn as_executor_params_carries_numeric_fields_as_strings() {
        let config = Config::default();
        let params = config.as_executor_params();
        assert_eq!(params.get("threads").map(String::as_str), Some("4"));
    }
}
