//! JSON-descriptor module loader.
//!
//! Concrete stand-in for the out-of-scope module definition loader: each
//! module is a directory under `modules_dir` containing a `module.json`
//! describing its inputs, outputs, grouping, and procedure.

use crate::domain::entities::{ComputeModule, Item, ModuleInput, ProcedureHandle};
use crate::domain::repositories::ModuleLoader;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct ModuleDescriptor {
    name: String,
    inputs: Vec<InputDescriptor>,
    outputs: Vec<String>,
    #[serde(default)]
    output_mask: Vec<String>,
    procedure: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InputDescriptor {
    item: String,
    #[serde(default)]
    group_by: Option<String>,
}

#[derive(Debug, Default)]
pub struct JsonModuleLoader;

impl JsonModuleLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for JsonModuleLoader {
    fn load_all(&self, modules_dir: &Path) -> Result<Vec<ComputeModule>> {
        let mut modules = Vec::new();
        if !modules_dir.exists() {
            return Ok(modules);
        }
        for entry in std::fs::read_dir(modules_dir).with_context(|| format!("reading {}", modules_dir.display()))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let descriptor_path = entry.path().join("module.json");
            if !descriptor_path.exists() {
                continue;
            }
            let bytes = std::fs::read(&descriptor_path)
                .with_context(|| format!("reading {}", descriptor_path.display()))?;
            let descriptor: ModuleDescriptor = serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", descriptor_path.display()))?;
            modules.push(to_compute_module(descriptor));
        }
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(modules)
    }
}

fn to_compute_module(descriptor: ModuleDescriptor) -> ComputeModule {
    let output_mask: HashSet<Item> = if descriptor.output_mask.is_empty() {
        descriptor.outputs.iter().map(|s| Item::new(s.as_str())).collect()
    } else {
        descriptor.output_mask.iter().map(|s| Item::new(s.as_str())).collect()
    };
    ComputeModule {
        name: descriptor.name.clone(),
        inputs: descriptor
            .inputs
            .into_iter()
            .map(|i| ModuleInput {
                item: Item::new(i.item.as_str()),
                group_by: i.group_by.map(|g| Item::new(g.as_str())),
            })
            .collect(),
        outputs: descriptor.outputs.iter().map(|s| Item::new(s.as_str())).collect(),
        output_mask,
        procedure: ProcedureHandle(descriptor.procedure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_modules_dir_yields_empty_set() {
        let loader = JsonModuleLoader::new();
        let modules = loader.load_all(Path::new("/nonexistent/path/loomwork-test")).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn unmasked_descriptor_masks_every_declared_output() {
        let descriptor = ModuleDescriptor {
            name: "align".to_string(),
            inputs: vec![],
            outputs: vec!["bam".to_string()],
            output_mask: vec![],
            procedure: "align.sh".to_string(),
        };
        let module = to_compute_module(descriptor);
        assert!(module.output_mask.contains(&Item::new("bam")));
    }
}
