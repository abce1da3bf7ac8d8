// SPDX-License-Identifier: MIT

//! Runtime environment for graph execution

mod context;

pub use context::{RuntimeContext, RuntimeType};
