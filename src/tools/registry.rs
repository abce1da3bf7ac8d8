// SPDX-License-Identifier: MIT

//! Name-keyed tool registry

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;

use super::Tool;

/// Shared registry of tools available to compiled graphs.
///
/// Cloning the registry clones the handle, not the contents. A std
/// `RwLock` keeps lookups callable from synchronous code (the
/// validator's tool-reference pass runs outside any async context).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!("registering tool '{}'", name);
        self.tools
            .write()
            .expect("tool registry lock poisoned")
            .insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .contains_key(name)
    }

    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeContext;
    use crate::tools::ToolResult;
    use async_trait::async_trait;
    use once_cell::sync::Lazy;
    use serde_json::{json, Value};

    static ECHO_SCHEMA: Lazy<Value> = Lazy::new(|| {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}}
        })
    });

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Returns its parameters unchanged"
        }

        fn schema(&self) -> &Value {
            &ECHO_SCHEMA
        }

        async fn execute(&self, _ctx: &RuntimeContext, params: Value) -> ToolResult {
            ToolResult::ok(params)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ToolRegistry::new();
        assert!(!registry.has_tool("echo"));

        registry.register(Arc::new(EchoTool));
        assert!(registry.has_tool("echo"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list_tools(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_clone_shares_contents() {
        let registry = ToolRegistry::new();
        let handle = registry.clone();
        registry.register(Arc::new(EchoTool));
        assert!(handle.has_tool("echo"));
    }
}
