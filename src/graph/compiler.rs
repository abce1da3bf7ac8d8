// SPDX-License-Identifier: MIT

//! Graph compiler
//!
//! Turns a validated `GraphDefinition` plus a caller context into a
//! runnable `CompiledGraph`. All expressions and output paths are
//! parsed here, and every tool is resolved here, so a graph that
//! compiles cannot fail on malformed declarations mid-run. Compilation
//! never returns a partially built graph.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use serde_json::{Map, Value};

use super::compiled::{
    CompiledGraph, CompiledNode, NodeKind, OutputBinding, OutputSource, PathSeg, Route, RouteArm,
};
use super::loader::GraphLoader;
use super::types::{EdgeDecl, GraphDefinition, NodeDecl, START};
use crate::error::CompileError;
use crate::expr::{self, ExprError, ParamTemplate, Template};
use crate::runtime::RuntimeContext;
use crate::state::PatchOp;
use crate::tools::ToolRegistry;

/// Upper bound on nodes executed per run. Cycles are a legal retry
/// pattern; this keeps a bad condition from looping forever.
pub const DEFAULT_STEP_LIMIT: u32 = 100;

pub struct GraphCompiler {
    registry: ToolRegistry,
    loader: Option<Arc<GraphLoader>>,
    step_limit: u32,
}

impl GraphCompiler {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            loader: None,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Supply a loader; required for definitions with subgraph nodes.
    pub fn with_loader(mut self, loader: Arc<GraphLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_step_limit(mut self, limit: u32) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn compile(
        &self,
        def: &GraphDefinition,
        ctx: RuntimeContext,
    ) -> Result<CompiledGraph, CompileError> {
        let entry = def
            .spec
            .edges
            .iter()
            .find(|e| e.from == START)
            .map(|e| e.to.clone())
            .ok_or(CompileError::MissingEntryPoint)?;

        let mut nodes = HashMap::new();
        for decl in &def.spec.nodes {
            let node = self.compile_node(decl)?;
            nodes.insert(decl.name.clone(), node);
        }

        let routes = wire_routes(&def.spec.edges)?;

        let mut initial_state_template = Map::new();
        for (name, decl) in &def.spec.state {
            if let Some(default) = &decl.default {
                initial_state_template.insert(name.clone(), default.clone());
            }
        }

        let outputs_template = if def.spec.outputs.is_empty() {
            None
        } else {
            let raw = Value::Object(
                def.spec
                    .outputs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
            Some(
                ParamTemplate::parse(&raw).map_err(|e| CompileError::Expression {
                    context: format!("graph '{}' outputs", def.name()),
                    source: e,
                })?,
            )
        };

        debug!(
            "compiled graph '{}': {} node(s), entry '{}'",
            def.name(),
            nodes.len(),
            entry
        );

        let inputs_value = Value::Object(ctx.inputs.clone());
        let runtime_value = ctx.runtime_namespace();

        Ok(CompiledGraph {
            name: def.metadata.name.clone(),
            version: def.metadata.version.clone(),
            entry,
            nodes,
            routes,
            initial_state_template,
            outputs_template,
            ctx,
            registry: self.registry.clone(),
            loader: self.loader.clone(),
            step_limit: self.step_limit,
            inputs_value,
            runtime_value,
        })
    }

    fn compile_node(&self, decl: &NodeDecl) -> Result<CompiledNode, CompileError> {
        let condition = decl
            .condition
            .as_deref()
            .map(|c| parse_condition(&decl.name, c))
            .transpose()?;

        let kind = match (&decl.tool, &decl.agent) {
            (Some(tool_name), _) => {
                let tool =
                    self.registry
                        .get(tool_name)
                        .ok_or_else(|| CompileError::ToolNotFound {
                            node: decl.name.clone(),
                            tool: tool_name.clone(),
                        })?;
                let raw = decl
                    .params
                    .clone()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                let params =
                    ParamTemplate::parse(&raw).map_err(|e| CompileError::Expression {
                        context: format!("node '{}' params", decl.name),
                        source: e,
                    })?;
                NodeKind::Tool {
                    name: tool_name.clone(),
                    tool,
                    params,
                }
            }
            (None, Some(agent)) => {
                if self.loader.is_none() {
                    return Err(CompileError::MissingLoader {
                        node: decl.name.clone(),
                    });
                }
                let raw = decl
                    .inputs
                    .clone()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                let inputs =
                    ParamTemplate::parse(&raw).map_err(|e| CompileError::Expression {
                        context: format!("node '{}' inputs", decl.name),
                        source: e,
                    })?;
                NodeKind::Subgraph {
                    graph: agent.clone(),
                    inputs,
                }
            }
            (None, None) => {
                // Validation rejects this; guard for directly-built
                // definitions.
                return Err(CompileError::ToolNotFound {
                    node: decl.name.clone(),
                    tool: String::new(),
                });
            }
        };

        let mut outputs = Vec::with_capacity(decl.outputs.len());
        for (key, source) in &decl.outputs {
            outputs.push(compile_output(&decl.name, key, source)?);
        }

        Ok(CompiledNode {
            name: decl.name.clone(),
            condition,
            kind,
            outputs,
        })
    }
}

/// Conditions may be written bare, wrapped in one `${...}`, or as an
/// interpolated template whose rendered string is tested for
/// truthiness. Span boundaries come from the expression scanner, so a
/// condition like `${a} and ${b}` parses as two spans rather than one
/// mangled expression.
fn parse_condition(node: &str, condition: &str) -> Result<Template, CompileError> {
    let wrap = |e: ExprError| CompileError::Expression {
        context: format!("node '{}' condition", node),
        source: e,
    };
    let trimmed = condition.trim();
    let spans = expr::find_spans(trimmed).map_err(wrap)?;
    if spans.is_empty() {
        return expr::parse(trimmed).map(Template::Expr).map_err(wrap);
    }
    Template::parse(trimmed).map_err(wrap)
}

/// Parse one `outputs` entry. A leading `+` on the key selects append
/// semantics; a `$`-rooted string value is a path into the node
/// result, anything else is a literal.
fn compile_output(node: &str, key: &str, source: &Value) -> Result<OutputBinding, CompileError> {
    let (key, op) = match key.strip_prefix('+') {
        Some(stripped) => (stripped, PatchOp::Append),
        None => (key, PatchOp::Set),
    };
    if key.is_empty() {
        return Err(CompileError::OutputPath {
            node: node.to_string(),
            path: format!("+{}", key),
            message: "output key is empty".to_string(),
        });
    }

    let source = match source {
        Value::String(s) if s.starts_with('$') => {
            OutputSource::Path(parse_result_path(node, s)?)
        }
        other => OutputSource::Literal(other.clone()),
    };

    Ok(OutputBinding {
        key: key.to_string(),
        op,
        source,
    })
}

fn parse_result_path(node: &str, path: &str) -> Result<Vec<PathSeg>, CompileError> {
    if path == "$" {
        return Ok(Vec::new());
    }
    let err = |message: &str| CompileError::OutputPath {
        node: node.to_string(),
        path: path.to_string(),
        message: message.to_string(),
    };

    let rest = path
        .strip_prefix("$.")
        .ok_or_else(|| err("path must be '$' or start with '$.'"))?;
    if rest.is_empty() {
        return Err(err("path has no segments after '$.'"));
    }

    let mut segments = Vec::new();
    for part in rest.split('.') {
        if part.is_empty() {
            return Err(err("empty path segment"));
        }
        if part.chars().all(|c| c.is_ascii_digit()) {
            let index = part.parse::<usize>().map_err(|_| err("index too large"))?;
            segments.push(PathSeg::Index(index));
        } else {
            segments.push(PathSeg::Key(part.to_string()));
        }
    }
    Ok(segments)
}

/// Group edges by source, preserving declared order. A source with one
/// unconditional edge routes directly; anything else gets a router.
fn wire_routes(edges: &[EdgeDecl]) -> Result<HashMap<String, Route>, CompileError> {
    let mut arms_by_source: HashMap<String, Vec<RouteArm>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for edge in edges {
        if edge.from == START {
            continue;
        }
        let condition = edge
            .condition
            .as_deref()
            .map(|c| parse_condition(&edge.from, c))
            .transpose()?;
        if !arms_by_source.contains_key(&edge.from) {
            order.push(edge.from.clone());
        }
        arms_by_source
            .entry(edge.from.clone())
            .or_default()
            .push(RouteArm {
                condition,
                target: edge.to.clone(),
            });
    }

    let mut routes = HashMap::new();
    for source in order {
        let mut arms = arms_by_source.remove(&source).unwrap_or_default();
        let route = if arms.len() == 1 && arms[0].condition.is_none() {
            Route::Direct(arms.remove(0).target)
        } else {
            Route::Router(arms)
        };
        routes.insert(source, route);
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{RuntimeContext, RuntimeType};
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use once_cell::sync::Lazy;
    use serde_json::json;

    static STUB_SCHEMA: Lazy<Value> = Lazy::new(|| json!({"type": "object"}));

    struct StubTool;

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            "writer"
        }
        fn description(&self) -> &str {
            "test stub"
        }
        fn schema(&self) -> &Value {
            &STUB_SCHEMA
        }
        async fn execute(&self, _ctx: &RuntimeContext, _params: Value) -> ToolResult {
            ToolResult::ok(json!({"content": "ok"}))
        }
    }

    fn definition(raw: Value) -> GraphDefinition {
        serde_json::from_value(raw).unwrap()
    }

    fn base_graph() -> Value {
        json!({
            "apiVersion": "agent/v1",
            "kind": "Graph",
            "metadata": {"name": "demo", "version": "1.0.0"},
            "spec": {
                "state": {"draft": {"type": "string", "default": ""}},
                "nodes": [
                    {"name": "write", "tool": "writer",
                     "outputs": {"draft": "$.content"}}
                ],
                "edges": [
                    {"from": "START", "to": "write"},
                    {"from": "write", "to": "END"}
                ]
            }
        })
    }

    fn registry_with_stub() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(StubTool));
        registry
    }

    fn ctx() -> RuntimeContext {
        RuntimeContext::new(RuntimeType::Local, "tester")
    }

    #[test]
    fn test_compile_resolves_entry_and_template() {
        let def = definition(base_graph());
        let compiled = GraphCompiler::new(registry_with_stub())
            .compile(&def, ctx())
            .unwrap();
        assert_eq!(compiled.entry(), "write");
        assert_eq!(
            compiled.initial_state().get("draft"),
            Some(&json!(""))
        );
    }

    #[test]
    fn test_compiled_graph_debug_names_graph_and_nodes() {
        let def = definition(base_graph());
        let compiled = GraphCompiler::new(registry_with_stub())
            .compile(&def, ctx())
            .unwrap();
        let rendered = format!("{:?}", compiled);
        assert!(rendered.contains("\"demo\""));
        assert!(rendered.contains("\"write\""));
    }

    #[test]
    fn test_condition_with_multiple_spans_compiles_as_template() {
        let mut raw = base_graph();
        raw["spec"]["nodes"][0]["condition"] = json!("${state.draft} and ${state.draft}");
        let def = definition(raw);
        let compiled = GraphCompiler::new(registry_with_stub())
            .compile(&def, ctx())
            .unwrap();
        let node = compiled.nodes.get("write").unwrap();
        assert!(matches!(node.condition, Some(Template::Interpolated(_))));
    }

    #[test]
    fn test_missing_start_edge_is_compile_error() {
        let mut raw = base_graph();
        raw["spec"]["edges"][0]["from"] = json!("write");
        let def = definition(raw);
        let err = GraphCompiler::new(registry_with_stub())
            .compile(&def, ctx())
            .unwrap_err();
        assert!(matches!(err, CompileError::MissingEntryPoint));
    }

    #[test]
    fn test_unregistered_tool_names_node_and_tool() {
        let def = definition(base_graph());
        let err = GraphCompiler::new(ToolRegistry::new())
            .compile(&def, ctx())
            .unwrap_err();
        match err {
            CompileError::ToolNotFound { node, tool } => {
                assert_eq!(node, "write");
                assert_eq!(tool, "writer");
            }
            other => panic!("expected ToolNotFound, got {}", other),
        }
    }

    #[test]
    fn test_subgraph_node_without_loader_fails() {
        let mut raw = base_graph();
        raw["spec"]["nodes"][0] = json!({"name": "helper", "agent": "child"});
        raw["spec"]["edges"] = json!([
            {"from": "START", "to": "helper"},
            {"from": "helper", "to": "END"}
        ]);
        let def = definition(raw);
        let err = GraphCompiler::new(registry_with_stub())
            .compile(&def, ctx())
            .unwrap_err();
        assert!(matches!(err, CompileError::MissingLoader { node } if node == "helper"));
    }

    #[test]
    fn test_malformed_condition_is_compile_error() {
        let mut raw = base_graph();
        raw["spec"]["nodes"][0]["condition"] = json!("${state.draft ==}");
        let def = definition(raw);
        let err = GraphCompiler::new(registry_with_stub())
            .compile(&def, ctx())
            .unwrap_err();
        assert!(matches!(err, CompileError::Expression { .. }));
    }

    #[test]
    fn test_malformed_output_path_is_compile_error() {
        let mut raw = base_graph();
        raw["spec"]["nodes"][0]["outputs"]["draft"] = json!("$bad");
        let def = definition(raw);
        let err = GraphCompiler::new(registry_with_stub())
            .compile(&def, ctx())
            .unwrap_err();
        match err {
            CompileError::OutputPath { node, path, .. } => {
                assert_eq!(node, "write");
                assert_eq!(path, "$bad");
            }
            other => panic!("expected OutputPath, got {}", other),
        }
    }

    #[test]
    fn test_parse_result_path_segments() {
        let segs = parse_result_path("n", "$.data.items.0.id").unwrap();
        assert_eq!(segs.len(), 4);
        assert!(matches!(&segs[2], PathSeg::Index(0)));

        assert!(parse_result_path("n", "$").unwrap().is_empty());
        assert!(parse_result_path("n", "$.").is_err());
        assert!(parse_result_path("n", "$.a..b").is_err());
    }

    #[test]
    fn test_append_key_parsed() {
        let binding = compile_output("n", "+messages", &json!("$.content")).unwrap();
        assert_eq!(binding.key, "messages");
        assert_eq!(binding.op, PatchOp::Append);

        let binding = compile_output("n", "status", &json!("done")).unwrap();
        assert_eq!(binding.op, PatchOp::Set);
        assert!(matches!(binding.source, OutputSource::Literal(_)));
    }
}
