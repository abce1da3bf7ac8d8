// SPDX-License-Identifier: MIT

//! Compiled graph execution
//!
//! A `CompiledGraph` is the immutable artifact the compiler produces:
//! resolved tools, parsed conditions, wired routes and the
//! initial-state template. It can be invoked repeatedly; every run
//! gets its own state copy.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::{debug, info};
use serde_json::{Map, Value};

use super::compiler::GraphCompiler;
use super::loader::GraphLoader;
use super::types::END;
use crate::error::CompileError;
use crate::expr::{self, ParamTemplate, Scope, Template};
use crate::runtime::RuntimeContext;
use crate::state::{ExecutionState, PatchOp, StatePatch};
use crate::tools::{Tool, ToolRegistry};

pub(super) struct CompiledNode {
    pub name: String,
    pub condition: Option<Template>,
    pub kind: NodeKind,
    pub outputs: Vec<OutputBinding>,
}

pub(super) enum NodeKind {
    Tool {
        name: String,
        tool: Arc<dyn Tool>,
        params: ParamTemplate,
    },
    Subgraph {
        graph: String,
        inputs: ParamTemplate,
    },
}

/// One `outputs` entry, parsed at compile time.
pub(super) struct OutputBinding {
    pub key: String,
    pub op: PatchOp,
    pub source: OutputSource,
}

pub(super) enum OutputSource {
    /// Plain literal copied into state as-is.
    Literal(Value),
    /// `$`-rooted path into the node result. Empty means the whole
    /// result.
    Path(Vec<PathSeg>),
}

pub(super) enum PathSeg {
    Key(String),
    Index(usize),
}

pub(super) enum Route {
    /// Single unconditional edge, no dispatch.
    Direct(String),
    /// Arms evaluated in declared order; first truthy condition wins,
    /// a condition-less arm matches unconditionally, no match ends the
    /// run.
    Router(Vec<RouteArm>),
}

pub(super) struct RouteArm {
    pub condition: Option<Template>,
    pub target: String,
}

pub struct CompiledGraph {
    pub(super) name: String,
    pub(super) version: String,
    pub(super) entry: String,
    pub(super) nodes: HashMap<String, CompiledNode>,
    pub(super) routes: HashMap<String, Route>,
    pub(super) initial_state_template: Map<String, Value>,
    /// Graph-level output templates, pre-parsed; `None` when the
    /// definition declares no outputs.
    pub(super) outputs_template: Option<ParamTemplate>,
    pub(super) ctx: RuntimeContext,
    pub(super) registry: ToolRegistry,
    pub(super) loader: Option<Arc<GraphLoader>>,
    pub(super) step_limit: u32,
    /// Context projections computed once at compile time; inputs and
    /// runtime fields do not change during a run.
    pub(super) inputs_value: Value,
    pub(super) runtime_value: Value,
}

// Hand-written because `Arc<dyn Tool>` rules out a derive; a compact
// listing of the topology is more useful in failure output anyway.
impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut node_names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        node_names.sort_unstable();
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("entry", &self.entry)
            .field("nodes", &node_names)
            .field("step_limit", &self.step_limit)
            .finish_non_exhaustive()
    }
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Fresh state for one run, deep-copied from the template.
    pub fn initial_state(&self) -> ExecutionState {
        ExecutionState::from_template(&self.initial_state_template)
    }

    /// Drive the graph from its entry node to END, sequentially along
    /// whichever path the routes select. Returns the final state.
    ///
    /// Boxed because subgraph nodes recurse through here.
    pub fn invoke(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionState, CompileError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.initial_state();
            let mut current = self.entry.clone();
            let mut steps: u32 = 0;

            info!(
                "running graph '{}' v{} (run {})",
                self.name, self.version, self.ctx.run_id
            );

            while current != END {
                steps += 1;
                if steps > self.step_limit {
                    return Err(CompileError::StepLimit {
                        limit: self.step_limit,
                    });
                }

                let node = self
                    .nodes
                    .get(&current)
                    .ok_or_else(|| CompileError::UnknownNode {
                        name: current.clone(),
                    })?;

                let patches = self.run_node(node, &state).await?;
                state.apply_all(patches);
                current = self.next_node(&current, &state)?;
            }

            info!("graph '{}' finished after {} step(s)", self.name, steps);
            Ok(state)
        })
    }

    /// Resolve graph-level `outputs` templates against a final state.
    /// Graphs without declared outputs yield the raw state.
    pub fn resolve_outputs(&self, state: &ExecutionState) -> Result<Value, CompileError> {
        let templates = match &self.outputs_template {
            Some(templates) => templates,
            None => return Ok(state.to_json()),
        };
        let state_json = state.to_json();
        let scope = Scope::new(&self.inputs_value, &state_json, &self.runtime_value);
        templates.evaluate(&scope).map_err(|e| CompileError::Expression {
            context: format!("graph '{}' outputs", self.name),
            source: e,
        })
    }

    async fn run_node(
        &self,
        node: &CompiledNode,
        state: &ExecutionState,
    ) -> Result<Vec<StatePatch>, CompileError> {
        let state_json = state.to_json();
        let scope = Scope::new(&self.inputs_value, &state_json, &self.runtime_value);

        if let Some(condition) = &node.condition {
            let value = condition.evaluate(&scope).map_err(|e| {
                CompileError::Expression {
                    context: format!("node '{}' condition", node.name),
                    source: e,
                }
            })?;
            if !expr::truthy(&value) {
                debug!("node '{}' skipped, condition false", node.name);
                return Ok(Vec::new());
            }
        }

        let result = match &node.kind {
            NodeKind::Tool { name, tool, params } => {
                let params = params.evaluate(&scope).map_err(|e| {
                    CompileError::Expression {
                        context: format!("node '{}' params", node.name),
                        source: e,
                    }
                })?;
                debug!("node '{}' invoking tool '{}'", node.name, name);
                let outcome = tool.execute(&self.ctx, params).await;
                if !outcome.success {
                    return Err(CompileError::ToolFailed {
                        node: node.name.clone(),
                        tool: name.clone(),
                        message: outcome.error.unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
                outcome.data
            }
            NodeKind::Subgraph { graph, inputs } => {
                self.run_subgraph(node, graph, inputs, &scope).await?
            }
        };

        Ok(extract_outputs(node, &result))
    }

    async fn run_subgraph(
        &self,
        node: &CompiledNode,
        graph: &str,
        inputs: &ParamTemplate,
        scope: &Scope<'_>,
    ) -> Result<Value, CompileError> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| CompileError::MissingLoader {
                node: node.name.clone(),
            })?;

        // The evaluated inputs template is the only data the child
        // sees; parent state never crosses the boundary.
        let evaluated = inputs.evaluate(scope).map_err(|e| {
            CompileError::Expression {
                context: format!("node '{}' inputs", node.name),
                source: e,
            }
        })?;
        let child_inputs = evaluated.as_object().cloned().unwrap_or_default();

        let wrap = |message: String| CompileError::Subgraph {
            node: node.name.clone(),
            graph: graph.to_string(),
            message,
        };

        debug!("node '{}' entering subgraph '{}'", node.name, graph);
        let child_def = loader.load(graph).map_err(|e| wrap(e.to_string()))?;
        let compiler = GraphCompiler::new(self.registry.clone())
            .with_loader(Arc::clone(loader))
            .with_step_limit(self.step_limit);
        let child = compiler
            .compile(&child_def, self.ctx.for_subgraph(child_inputs))
            .map_err(|e| wrap(e.to_string()))?;

        let final_state = child.invoke().await.map_err(|e| wrap(e.to_string()))?;
        child.resolve_outputs(&final_state).map_err(|e| wrap(e.to_string()))
    }

    fn next_node(&self, current: &str, state: &ExecutionState) -> Result<String, CompileError> {
        let route = match self.routes.get(current) {
            Some(route) => route,
            None => return Ok(END.to_string()),
        };
        match route {
            Route::Direct(target) => Ok(target.clone()),
            Route::Router(arms) => {
                let state_json = state.to_json();
                let scope = Scope::new(&self.inputs_value, &state_json, &self.runtime_value);
                for arm in arms {
                    let matched = match &arm.condition {
                        None => true,
                        Some(condition) => {
                            let value = condition.evaluate(&scope).map_err(|e| {
                                CompileError::Expression {
                                    context: format!("edge from '{}'", current),
                                    source: e,
                                }
                            })?;
                            expr::truthy(&value)
                        }
                    };
                    if matched {
                        debug!("routing '{}' -> '{}'", current, arm.target);
                        return Ok(arm.target.clone());
                    }
                }
                debug!("no edge matched from '{}', ending run", current);
                Ok(END.to_string())
            }
        }
    }
}

/// Turn a node result into state patches per the node's output
/// bindings. Missing path segments resolve to null rather than
/// failing, matching expression lookup semantics.
fn extract_outputs(node: &CompiledNode, result: &Value) -> Vec<StatePatch> {
    node.outputs
        .iter()
        .map(|binding| {
            let value = match &binding.source {
                OutputSource::Literal(literal) => literal.clone(),
                OutputSource::Path(segments) => resolve_path(result, segments),
            };
            StatePatch {
                key: binding.key.clone(),
                op: binding.op,
                value,
            }
        })
        .collect()
}

fn resolve_path(result: &Value, segments: &[PathSeg]) -> Value {
    let mut current = result;
    for segment in segments {
        let next = match segment {
            PathSeg::Key(key) => current.get(key),
            PathSeg::Index(index) => current.get(*index),
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}
