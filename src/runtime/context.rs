// SPDX-License-Identifier: MIT

//! Per-run execution context
//!
//! A `RuntimeContext` travels with one graph run: who is running it,
//! which environment, which models to default to, and the run's input
//! values. Expressions see a fixed projection of it through the
//! `runtime` namespace.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Where a run is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    Local,
    Cloud,
}

impl RuntimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeType::Local => "local",
            RuntimeType::Cloud => "cloud",
        }
    }
}

/// Context for a single graph run.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub runtime_type: RuntimeType,
    pub user_id: String,
    /// Run inputs, exposed to expressions as the `inputs` namespace.
    pub inputs: Map<String, Value>,
    pub model_default: String,
    pub model_fast: String,
    pub device_type: String,
    pub trace_id: String,
    pub run_id: String,
    api_keys: HashMap<String, String>,
    /// Free-form bag for host-provided extras not covered by the fields
    /// above. Not visible to expressions.
    pub extra: HashMap<String, Value>,
}

impl RuntimeContext {
    pub fn new(runtime_type: RuntimeType, user_id: impl Into<String>) -> Self {
        Self {
            runtime_type,
            user_id: user_id.into(),
            inputs: Map::new(),
            model_default: String::new(),
            model_fast: String::new(),
            device_type: String::new(),
            trace_id: Uuid::new_v4().to_string(),
            run_id: Uuid::new_v4().to_string(),
            api_keys: HashMap::new(),
            extra: HashMap::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_models(
        mut self,
        model_default: impl Into<String>,
        model_fast: impl Into<String>,
    ) -> Self {
        self.model_default = model_default.into();
        self.model_fast = model_fast.into();
        self
    }

    pub fn set_api_key(&mut self, provider: impl Into<String>, key: impl Into<String>) {
        self.api_keys.insert(provider.into(), key.into());
    }

    pub fn get_api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys.get(provider).map(String::as_str)
    }

    /// Clone this context for a nested graph run, replacing the inputs
    /// with the values the parent node mapped in. Everything else
    /// (identity, models, keys, trace) carries over unchanged.
    pub fn for_subgraph(&self, inputs: Map<String, Value>) -> Self {
        let mut child = self.clone();
        child.inputs = inputs;
        child
    }

    /// The fixed set of fields expressions may read via `runtime.*`.
    pub fn runtime_namespace(&self) -> Value {
        json!({
            "user_id": self.user_id,
            "runtime_type": self.runtime_type.as_str(),
            "model_default": self.model_default,
            "model_fast": self.model_fast,
            "trace_id": self.trace_id,
            "run_id": self.run_id,
            "device_type": self.device_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_namespace_fields() {
        let ctx = RuntimeContext::new(RuntimeType::Local, "u1")
            .with_models("big-model", "small-model");
        let ns = ctx.runtime_namespace();

        assert_eq!(ns["user_id"], "u1");
        assert_eq!(ns["runtime_type"], "local");
        assert_eq!(ns["model_default"], "big-model");
        assert_eq!(ns["model_fast"], "small-model");
        assert!(ns["trace_id"].as_str().is_some());
        assert!(ns["run_id"].as_str().is_some());
    }

    #[test]
    fn test_for_subgraph_replaces_inputs_only() {
        let mut parent_inputs = Map::new();
        parent_inputs.insert("topic".to_string(), json!("rust"));
        let mut ctx = RuntimeContext::new(RuntimeType::Cloud, "u1").with_inputs(parent_inputs);
        ctx.set_api_key("openai", "sk-test");

        let mut child_inputs = Map::new();
        child_inputs.insert("text".to_string(), json!("hello"));
        let child = ctx.for_subgraph(child_inputs);

        assert_eq!(child.inputs["text"], json!("hello"));
        assert!(child.inputs.get("topic").is_none());
        assert_eq!(child.user_id, ctx.user_id);
        assert_eq!(child.trace_id, ctx.trace_id);
        assert_eq!(child.get_api_key("openai"), Some("sk-test"));
    }
}
