// SPDX-License-Identifier: MIT

//! Typed error handling for trellis-rs
//!
//! One top-level `GraphError` for the load → validate → compile → run
//! pipeline, with `CompileError` covering everything that can go wrong
//! while building or driving a compiled graph.

use thiserror::Error;

use crate::expr::ExprError;
use crate::graph::validator::ValidationIssue;

/// Top-level error type for the graph subsystem.
#[derive(Debug, Error)]
pub enum GraphError {
    /// No definition file exists for the requested graph name.
    #[error("graph '{name}' not found under {search_path}")]
    NotFound { name: String, search_path: String },

    /// A definition file exists but could not be parsed.
    #[error("failed to load {file}: {message}")]
    Load { file: String, message: String },

    /// The definition parsed but failed validation. Carries every
    /// collected issue, never just the first.
    #[error("graph '{name}' failed validation with {} error(s)", errors.len())]
    Validation {
        name: String,
        errors: Vec<ValidationIssue>,
    },

    /// Compilation or execution of a compiled graph failed.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// I/O errors while reading definition files or directories.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while compiling a definition or driving the compiled
/// graph. Messages name the offending node (and tool/subgraph) so a
/// failure is diagnosable without re-reading the definition.
#[derive(Debug, Error)]
pub enum CompileError {
    /// No edge originates at START.
    #[error("no entry point: graph has no edge from START")]
    MissingEntryPoint,

    /// A subgraph node was compiled without a loader to resolve it.
    #[error("node '{node}': subgraph nodes require a graph loader")]
    MissingLoader { node: String },

    /// A node references a tool that is not registered.
    #[error("node '{node}': tool '{tool}' not found")]
    ToolNotFound { node: String, tool: String },

    /// A tool ran and reported failure; wraps the tool's own error.
    #[error("node '{node}': tool '{tool}' failed: {message}")]
    ToolFailed {
        node: String,
        tool: String,
        message: String,
    },

    /// Loading, compiling or running a nested subgraph failed.
    #[error("node '{node}': subgraph '{graph}' failed: {message}")]
    Subgraph {
        node: String,
        graph: String,
        message: String,
    },

    /// An output mapping's JSONPath expression is malformed.
    #[error("node '{node}': invalid output path '{path}': {message}")]
    OutputPath {
        node: String,
        path: String,
        message: String,
    },

    /// A condition or parameter expression failed to parse or evaluate.
    #[error("{context}: {source}")]
    Expression {
        context: String,
        source: ExprError,
    },

    /// An edge routed to a node the compiled graph does not contain.
    #[error("routed to unknown node '{name}'")]
    UnknownNode { name: String },

    /// The run loop exceeded its step limit (cycles are legal, runaway
    /// loops are not).
    #[error("graph execution exceeded {limit} steps")]
    StepLimit { limit: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_names_node_and_tool() {
        let err = CompileError::ToolNotFound {
            node: "write".to_string(),
            tool: "llm_generate".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("write"), "{}", msg);
        assert!(msg.contains("llm_generate"), "{}", msg);
    }

    #[test]
    fn test_validation_error_counts_issues() {
        let err = GraphError::Validation {
            name: "demo".to_string(),
            errors: vec![
                ValidationIssue::new("spec", "missing nodes"),
                ValidationIssue::new("spec", "missing edges"),
            ],
        };
        assert!(err.to_string().contains("2 error(s)"));
    }
}
