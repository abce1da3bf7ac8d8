// SPDX-License-Identifier: MIT

//! trellis-rs: a declarative agent-graph engine.
//!
//! Graphs are YAML/JSON documents declaring nodes (tool or subgraph
//! invocations), conditional edges and a shared key-value state. The
//! pipeline is load -> validate -> compile -> invoke:
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis_rs::graph::{GraphCompiler, GraphLoader};
//! use trellis_rs::runtime::{RuntimeContext, RuntimeType};
//! use trellis_rs::tools::ToolRegistry;
//!
//! # async fn run() -> Result<(), trellis_rs::error::GraphError> {
//! let loader = Arc::new(GraphLoader::new("graphs"));
//! let registry = ToolRegistry::new();
//! let def = loader.load("research")?;
//!
//! let ctx = RuntimeContext::new(RuntimeType::Local, "user-1");
//! let compiled = GraphCompiler::new(registry)
//!     .with_loader(Arc::clone(&loader))
//!     .compile(&def, ctx)?;
//! let final_state = compiled.invoke().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod expr;
pub mod graph;
pub mod runtime;
pub mod state;
pub mod tools;

pub use error::{CompileError, GraphError};
pub use graph::{CompiledGraph, GraphCompiler, GraphDefinition, GraphLoader, GraphValidator};
pub use runtime::{RuntimeContext, RuntimeType};
pub use state::{ExecutionState, PatchOp, StatePatch};
pub use tools::{Tool, ToolRegistry, ToolResult};
