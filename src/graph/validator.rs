// SPDX-License-Identifier: MIT

//! Multi-pass graph definition validator
//!
//! Validates the raw parsed document (not the typed structs) so every
//! problem can be tagged with the field path it came from. Five
//! passes, each running only if everything before it was clean:
//!
//! 1. schema shape (required keys, apiVersion, kind, version format)
//! 2. declared input/state types
//! 3. graph structure (unique nodes, resolvable edges, reachability)
//! 4. expression references
//! 5. tool references (only when a registry is supplied)
//!
//! The validator never fails; it always returns an aggregated result.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::Value;

use super::types::{ValueType, END, START};
use crate::expr;
use crate::tools::ToolRegistry;

/// The fields expressions may reference under `runtime.*`.
pub const RUNTIME_FIELDS: [&str; 7] = [
    "user_id",
    "runtime_type",
    "model_default",
    "model_fast",
    "trace_id",
    "run_id",
    "device_type",
];

/// One problem found during validation, tagged with the field path it
/// originated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Aggregated outcome of one `validate` call. Warnings never affect
/// `success`.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub success: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Default)]
pub struct GraphValidator {
    registry: Option<ToolRegistry>,
}

impl GraphValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the tool-reference pass against the given registry.
    pub fn with_registry(registry: ToolRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    pub fn validate(&self, raw: &Value) -> ValidationResult {
        let mut errors = Vec::new();
        let warnings = Vec::new();

        check_schema(raw, &mut errors);

        if errors.is_empty() {
            let spec = &raw["spec"];
            check_types(spec, &mut errors);
            if errors.is_empty() {
                check_structure(spec, &mut errors);
            }
            if errors.is_empty() {
                check_expressions(spec, &mut errors);
            }
            if errors.is_empty() {
                if let Some(registry) = &self.registry {
                    check_tools(spec, registry, &mut errors);
                }
            }
        }

        ValidationResult {
            success: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

fn check_schema(raw: &Value, errors: &mut Vec<ValidationIssue>) {
    let root = match raw.as_object() {
        Some(root) => root,
        None => {
            errors.push(ValidationIssue::new("", "definition must be a mapping"));
            return;
        }
    };

    match root.get("apiVersion").and_then(Value::as_str) {
        Some(version) if version.starts_with("agent/") => {}
        Some(other) => errors.push(ValidationIssue::new(
            "apiVersion",
            format!("must start with 'agent/', got '{}'", other),
        )),
        None => errors.push(ValidationIssue::new("apiVersion", "missing required field")),
    }

    match root.get("kind").and_then(Value::as_str) {
        Some("Graph") => {}
        Some(other) => errors.push(ValidationIssue::new(
            "kind",
            format!("must be 'Graph', got '{}'", other),
        )),
        None => errors.push(ValidationIssue::new("kind", "missing required field")),
    }

    match root.get("metadata").and_then(Value::as_object) {
        Some(metadata) => {
            if metadata.get("name").and_then(Value::as_str).is_none() {
                errors.push(ValidationIssue::new("metadata.name", "missing required field"));
            }
            match metadata.get("version").and_then(Value::as_str) {
                Some(version) if is_semver(version) => {}
                Some(other) => errors.push(ValidationIssue::new(
                    "metadata.version",
                    format!("must match MAJOR.MINOR.PATCH, got '{}'", other),
                )),
                None => errors.push(ValidationIssue::new(
                    "metadata.version",
                    "missing required field",
                )),
            }
        }
        None => errors.push(ValidationIssue::new("metadata", "missing required field")),
    }

    match root.get("spec").and_then(Value::as_object) {
        Some(spec) => {
            if !spec.get("nodes").map_or(false, Value::is_array) {
                errors.push(ValidationIssue::new("spec.nodes", "must be a list of nodes"));
            }
            if !spec.get("edges").map_or(false, Value::is_array) {
                errors.push(ValidationIssue::new("spec.edges", "must be a list of edges"));
            }
        }
        None => errors.push(ValidationIssue::new("spec", "missing required field")),
    }
}

fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn check_types(spec: &Value, errors: &mut Vec<ValidationIssue>) {
    for section in ["inputs", "state"] {
        let entries = match spec.get(section).and_then(Value::as_object) {
            Some(entries) => entries,
            None => continue,
        };
        for (name, decl) in entries {
            let field = format!("spec.{}.{}", section, name);
            let decl = match decl.as_object() {
                Some(decl) => decl,
                None => {
                    errors.push(ValidationIssue::new(field, "declaration must be a mapping"));
                    continue;
                }
            };
            if let Some(type_token) = decl.get("type") {
                let known = type_token
                    .as_str()
                    .map_or(false, |t| ValueType::TOKENS.contains(&t));
                if !known {
                    errors.push(ValidationIssue::new(
                        format!("{}.type", field),
                        format!(
                            "unknown type {}, expected one of {}",
                            type_token,
                            ValueType::TOKENS.join(", ")
                        ),
                    ));
                }
            }
            if let Some(required) = decl.get("required") {
                if !required.is_boolean() {
                    errors.push(ValidationIssue::new(
                        format!("{}.required", field),
                        "must be a boolean",
                    ));
                }
            }
        }
    }
}

fn check_structure(spec: &Value, errors: &mut Vec<ValidationIssue>) {
    let nodes = spec["nodes"].as_array().expect("checked by schema pass");
    let edges = spec["edges"].as_array().expect("checked by schema pass");

    let mut names = HashSet::new();
    for (i, node) in nodes.iter().enumerate() {
        let name = match node.get("name").and_then(Value::as_str) {
            Some(name) => name,
            None => {
                errors.push(ValidationIssue::new(
                    format!("spec.nodes[{}]", i),
                    "node must declare a name",
                ));
                continue;
            }
        };
        if !names.insert(name.to_string()) {
            errors.push(ValidationIssue::new(
                format!("spec.nodes[{}]", name),
                "duplicate node name",
            ));
        }
        let has_tool = node.get("tool").and_then(Value::as_str).is_some();
        let has_agent = node.get("agent").and_then(Value::as_str).is_some();
        match (has_tool, has_agent) {
            (true, true) => errors.push(ValidationIssue::new(
                format!("spec.nodes[{}]", name),
                "node declares both 'tool' and 'agent'",
            )),
            (false, false) => errors.push(ValidationIssue::new(
                format!("spec.nodes[{}]", name),
                "node must declare 'tool' or 'agent'",
            )),
            _ => {}
        }
    }

    let mut endpoint_errors = false;
    let mut start_edges = 0;
    for (i, edge) in edges.iter().enumerate() {
        let from = edge.get("from").and_then(Value::as_str);
        let to = edge.get("to").and_then(Value::as_str);

        match from {
            Some(START) => start_edges += 1,
            Some(from) if names.contains(from) => {}
            Some(from) => {
                endpoint_errors = true;
                errors.push(ValidationIssue::new(
                    format!("spec.edges[{}].from", i),
                    format!("'{}' is not a declared node", from),
                ));
            }
            None => {
                endpoint_errors = true;
                errors.push(ValidationIssue::new(
                    format!("spec.edges[{}].from", i),
                    "missing required field",
                ));
            }
        }
        match to {
            Some(END) => {}
            Some(to) if names.contains(to) => {}
            Some(to) => {
                endpoint_errors = true;
                errors.push(ValidationIssue::new(
                    format!("spec.edges[{}].to", i),
                    format!("'{}' is not a declared node", to),
                ));
            }
            None => {
                endpoint_errors = true;
                errors.push(ValidationIssue::new(
                    format!("spec.edges[{}].to", i),
                    "missing required field",
                ));
            }
        }
    }

    if start_edges != 1 {
        errors.push(ValidationIssue::new(
            "spec.edges",
            format!(
                "exactly one edge must originate at START, found {}",
                start_edges
            ),
        ));
    }

    // Reachability only makes sense over a well-formed edge set.
    if !endpoint_errors && start_edges == 1 {
        check_reachability(&names, edges, errors);
    }
}

/// Depth-first traversal from START. Cycles are legal; a declared node
/// the traversal never reaches is an error.
fn check_reachability(
    names: &HashSet<String>,
    edges: &[Value],
    errors: &mut Vec<ValidationIssue>,
) {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        let from = edge["from"].as_str().unwrap_or_default();
        let to = edge["to"].as_str().unwrap_or_default();
        if to != END {
            adjacency.entry(from).or_default().push(to);
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![START];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        if let Some(targets) = adjacency.get(current) {
            stack.extend(targets.iter().copied());
        }
    }

    let mut isolated: Vec<&String> = names.iter().filter(|n| !visited.contains(n.as_str())).collect();
    isolated.sort();
    for name in isolated {
        errors.push(ValidationIssue::new(
            format!("spec.nodes[{}]", name),
            "isolated node, unreachable from START",
        ));
    }
}

fn check_expressions(spec: &Value, errors: &mut Vec<ValidationIssue>) {
    let inputs: HashSet<String> = declared_keys(spec, "inputs");
    let states: HashSet<String> = declared_keys(spec, "state");

    walk_strings(spec, "spec", &mut |field, text| {
        let spans = match expr::find_spans(text) {
            Ok(spans) => spans,
            Err(e) => {
                errors.push(ValidationIssue::new(field, e.to_string()));
                return;
            }
        };
        for (start, end) in spans {
            let inner = &text[start + 2..end - 1];
            let parsed = match expr::parse(inner) {
                Ok(parsed) => parsed,
                Err(e) => {
                    errors.push(ValidationIssue::new(field, e.to_string()));
                    continue;
                }
            };
            for (root, key) in parsed.references() {
                match root.as_str() {
                    "inputs" => {
                        if let Some(key) = key {
                            if !inputs.contains(&key) {
                                errors.push(ValidationIssue::new(
                                    field,
                                    format!("references undeclared input '{}'", key),
                                ));
                            }
                        }
                    }
                    "state" => {
                        if let Some(key) = key {
                            if !states.contains(&key) {
                                errors.push(ValidationIssue::new(
                                    field,
                                    format!("references undeclared state key '{}'", key),
                                ));
                            }
                        }
                    }
                    "runtime" => {
                        if let Some(key) = key {
                            if !RUNTIME_FIELDS.contains(&key.as_str()) {
                                errors.push(ValidationIssue::new(
                                    field,
                                    format!("unknown runtime field '{}'", key),
                                ));
                            }
                        }
                    }
                    other => errors.push(ValidationIssue::new(
                        field,
                        format!("unknown namespace '{}'", other),
                    )),
                }
            }
        }
    });
}

fn declared_keys(spec: &Value, section: &str) -> HashSet<String> {
    spec.get(section)
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

/// Visit every string leaf under `value`, tracking the field path.
/// Array entries that carry a `name` are addressed by it.
fn walk_strings(value: &Value, path: &str, visit: &mut impl FnMut(&str, &str)) {
    match value {
        Value::String(s) => visit(path, s),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let segment = item
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| i.to_string());
                walk_strings(item, &format!("{}[{}]", path, segment), visit);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                walk_strings(item, &format!("{}.{}", path, key), visit);
            }
        }
        _ => {}
    }
}

fn check_tools(spec: &Value, registry: &ToolRegistry, errors: &mut Vec<ValidationIssue>) {
    let nodes = spec["nodes"].as_array().expect("checked by schema pass");
    for node in nodes {
        let name = node["name"].as_str().unwrap_or_default();
        if let Some(tool) = node.get("tool").and_then(Value::as_str) {
            if !registry.has_tool(tool) {
                errors.push(ValidationIssue::new(
                    format!("spec.nodes[{}].tool", name),
                    format!("tool '{}' is not registered", tool),
                ));
            }
        }
    }
}
