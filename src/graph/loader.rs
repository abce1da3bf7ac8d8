// SPDX-License-Identifier: MIT

//! Graph definition loader
//!
//! Resolves a graph name to a parsed, validated `GraphDefinition`.
//! Files are looked up under a single root directory, trying `.yaml`,
//! `.yml` and `.json` in that order. Successful loads are cached by
//! name; the cached `Arc` is shared with every caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use serde_json::Value;

use super::types::GraphDefinition;
use super::validator::GraphValidator;
use crate::error::GraphError;

/// Extensions tried during lookup, in priority order.
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

pub struct GraphLoader {
    root: PathBuf,
    validator: GraphValidator,
    cache: Mutex<HashMap<String, Arc<GraphDefinition>>>,
}

impl GraphLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            validator: GraphValidator::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Use a validator wired to a tool registry, enabling the
    /// tool-reference pass on every load.
    pub fn with_validator(mut self, validator: GraphValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a graph by name, returning the cached definition when one
    /// exists. The returned definition is shared; treat it as
    /// immutable.
    pub fn load(&self, name: &str) -> Result<Arc<GraphDefinition>, GraphError> {
        if let Some(cached) = self.cache.lock().expect("loader cache poisoned").get(name) {
            debug!("graph '{}' served from cache", name);
            return Ok(Arc::clone(cached));
        }

        let definition = Arc::new(self.load_from_disk(name)?);
        self.cache
            .lock()
            .expect("loader cache poisoned")
            .insert(name.to_string(), Arc::clone(&definition));
        Ok(definition)
    }

    /// Evict any cached entry and load fresh from disk.
    pub fn reload(&self, name: &str) -> Result<Arc<GraphDefinition>, GraphError> {
        self.cache
            .lock()
            .expect("loader cache poisoned")
            .remove(name);
        self.load(name)
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("loader cache poisoned").clear();
    }

    /// Distinct definition file stems under the root, sorted.
    pub fn list_graphs(&self) -> Result<Vec<String>, GraphError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_definition = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| EXTENSIONS.contains(&ext));
            if !is_definition {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn load_from_disk(&self, name: &str) -> Result<GraphDefinition, GraphError> {
        let path = self.find_file(name)?;
        let file = path.display().to_string();
        info!("loading graph '{}' from {}", name, file);

        let text = std::fs::read_to_string(&path)?;
        let raw = parse_raw(&path, &text).map_err(|message| GraphError::Load {
            file: file.clone(),
            message,
        })?;

        let result = self.validator.validate(&raw);
        if !result.success {
            return Err(GraphError::Validation {
                name: name.to_string(),
                errors: result.errors,
            });
        }

        serde_json::from_value(raw).map_err(|e| GraphError::Load {
            file,
            message: e.to_string(),
        })
    }

    fn find_file(&self, name: &str) -> Result<PathBuf, GraphError> {
        for ext in EXTENSIONS {
            let candidate = self.root.join(format!("{}.{}", name, ext));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(GraphError::NotFound {
            name: name.to_string(),
            search_path: self.root.display().to_string(),
        })
    }
}

/// Parse file text into a raw JSON value based on extension. YAML
/// documents go through `serde_yaml` into the same `Value` shape the
/// validator expects.
fn parse_raw(path: &Path, text: &str) -> Result<Value, String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let value: Value = match ext {
        "yaml" | "yml" => serde_yaml::from_str(text).map_err(|e| e.to_string())?,
        "json" => serde_json::from_str(text).map_err(|e| e.to_string())?,
        other => return Err(format!("unsupported extension '{}'", other)),
    };
    if !value.is_object() {
        return Err("definition root must be a mapping".to_string());
    }
    Ok(value)
}
