// SPDX-License-Identifier: MIT

//! Graph definition data model
//!
//! Typed form of the YAML/JSON definition files. Raw documents are
//! validated before deserialization, so these structs can assume the
//! shape checks already passed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved edge endpoint marking the entry transition.
pub const START: &str = "START";
/// Reserved edge endpoint marking termination.
pub const END: &str = "END";

/// A complete parsed graph definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: GraphMetadata,
    pub spec: GraphSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub inputs: HashMap<String, InputDecl>,
    #[serde(default)]
    pub state: HashMap<String, StateDecl>,
    pub nodes: Vec<NodeDecl>,
    pub edges: Vec<EdgeDecl>,
    /// Graph-level output templates, resolved against final state.
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    /// Declared skill names. Carried as metadata; equipping skills is
    /// the host's concern.
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Declared caller-supplied parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDecl {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Declared state key. `default` seeds the initial-state template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDecl {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
}

impl ValueType {
    pub const TOKENS: [&'static str; 6] =
        ["string", "integer", "float", "boolean", "object", "array"];
}

/// One unit of work: a tool invocation or a nested subgraph. Exactly
/// one of `tool`/`agent` is set (enforced by validation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Parameter template for tool nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Input template for subgraph nodes; the only channel by which
    /// parent data reaches the child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    /// `key` sets, `+key` appends. Values are literals or `$`-rooted
    /// paths into the node result.
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    /// Guard expression; false skips the node, passing state through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Directed transition. Endpoints are node names or sentinels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDecl {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl GraphDefinition {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn node(&self, name: &str) -> Option<&NodeDecl> {
        self.spec.nodes.iter().find(|n| n.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal_definition() {
        let raw = json!({
            "apiVersion": "agent/v1",
            "kind": "Graph",
            "metadata": {"name": "demo", "version": "1.0.0"},
            "spec": {
                "inputs": {"topic": {"type": "string", "required": true}},
                "state": {"draft": {"type": "string", "default": ""}},
                "nodes": [
                    {"name": "write", "tool": "writer",
                     "params": {"prompt": "${inputs.topic}"},
                     "outputs": {"draft": "$.content"}}
                ],
                "edges": [
                    {"from": "START", "to": "write"},
                    {"from": "write", "to": "END"}
                ],
            }
        });
        let def: GraphDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(def.name(), "demo");
        assert_eq!(def.api_version, "agent/v1");
        assert!(def.spec.inputs["topic"].required);
        assert_eq!(def.spec.state["draft"].default, Some(json!("")));
        let node = def.node("write").unwrap();
        assert_eq!(node.tool.as_deref(), Some("writer"));
        assert!(node.agent.is_none());
        assert_eq!(def.spec.edges[0].from, "START");
    }

    #[test]
    fn test_yaml_definition_parses() {
        let yaml = r#"
apiVersion: agent/v1
kind: Graph
metadata:
  name: looped
  version: 0.2.0
spec:
  state:
    tries:
      type: integer
      default: 0
  nodes:
    - name: attempt
      tool: runner
  edges:
    - from: START
      to: attempt
    - from: attempt
      to: attempt
      condition: "${state.tries < 3}"
    - from: attempt
      to: END
"#;
        let def: GraphDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.metadata.version, "0.2.0");
        assert_eq!(def.spec.edges.len(), 3);
        assert_eq!(
            def.spec.edges[1].condition.as_deref(),
            Some("${state.tries < 3}")
        );
    }
}
