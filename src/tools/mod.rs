// SPDX-License-Identifier: MIT

//! Tool abstraction and registry
//!
//! Tools are the only side-effecting units a graph can invoke. The
//! engine never knows what a tool does; it hands over evaluated
//! parameters and gets back a `ToolResult`.

mod registry;

pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;

use crate::runtime::RuntimeContext;

/// Outcome of a tool invocation. `success == false` must carry an
/// `error` message; `data` is whatever the tool produced.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A callable capability exposed to graphs by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key; node `tool:` fields refer to this.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the accepted parameters.
    fn schema(&self) -> &Value;

    /// Whether the tool can run in the given context. Defaults to
    /// always available; override for tools gated on API keys or
    /// runtime type.
    fn is_available(&self, _ctx: &RuntimeContext) -> bool {
        true
    }

    async fn execute(&self, ctx: &RuntimeContext, params: Value) -> ToolResult;
}
