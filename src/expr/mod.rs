// SPDX-License-Identifier: MIT

//! The `${...}` expression micro-language
//!
//! Graph definitions embed expressions in node parameters, edge
//! conditions and output templates. The language is deliberately
//! small: three read-only namespaces, arithmetic, comparisons,
//! boolean logic and a closed set of functions.

pub mod ast;
pub mod evaluator;
pub mod parser;

pub use ast::{Expr, Func};
pub use evaluator::{
    eval_expr, evaluate, evaluate_params, find_spans, truthy, ParamTemplate, Scope, Template,
};
pub use parser::parse;

use thiserror::Error;

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Clone, Error)]
pub enum ExprError {
    #[error("cannot parse '{expr}': {message}")]
    Parse { expr: String, message: String },

    /// Call target outside the function whitelist. Raised while
    /// parsing, never at evaluation time.
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    /// Name not rooted at `inputs`, `state` or `runtime`.
    #[error("unknown name '{name}'")]
    UnknownName { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{message}")]
    Type { message: String },
}
