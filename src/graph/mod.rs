// SPDX-License-Identifier: MIT

//! Graph subsystem: loader, validator, compiler and the compiled
//! runnable artifact.

pub mod compiled;
pub mod compiler;
pub mod loader;
pub mod types;
pub mod validator;

pub use compiled::CompiledGraph;
pub use compiler::{GraphCompiler, DEFAULT_STEP_LIMIT};
pub use loader::GraphLoader;
pub use types::{
    EdgeDecl, GraphDefinition, GraphMetadata, GraphSpec, InputDecl, NodeDecl, StateDecl,
    ValueType, END, START,
};
pub use validator::{GraphValidator, ValidationIssue, ValidationResult, RUNTIME_FIELDS};
