// SPDX-License-Identifier: MIT

//! Execution state and patch reduction
//!
//! Node execution never mutates state directly. Each node produces
//! `StatePatch`es, and the run loop applies them in order. Keeping the
//! write path behind `apply` makes the merge semantics (set vs append)
//! explicit and auditable.

use serde_json::{Map, Value};

/// How a patch combines with the current value of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    /// Replace the key's value.
    Set,
    /// Append to the key's list. A missing or non-list current value
    /// counts as an empty list; a list value is flattened in.
    Append,
}

/// A single pending state update.
#[derive(Debug, Clone)]
pub struct StatePatch {
    pub key: String,
    pub op: PatchOp,
    pub value: Value,
}

impl StatePatch {
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            op: PatchOp::Set,
            value,
        }
    }

    pub fn append(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            op: PatchOp::Append,
            value,
        }
    }
}

/// String-keyed state for one graph run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    fields: Map<String, Value>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build state from a template of initial values, deep-copying it.
    pub fn from_template(template: &Map<String, Value>) -> Self {
        Self {
            fields: template.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Nested lookup with dot notation, e.g. `draft.title`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn apply(&mut self, patch: StatePatch) {
        match patch.op {
            PatchOp::Set => {
                self.fields.insert(patch.key, patch.value);
            }
            PatchOp::Append => {
                let entry = self.fields.entry(patch.key).or_insert(Value::Array(vec![]));
                // Any non-list current value resets to an empty list;
                // append never silently drops its value.
                if !entry.is_array() {
                    *entry = Value::Array(vec![]);
                }
                if let Value::Array(items) = entry {
                    match patch.value {
                        Value::Array(new_items) => items.extend(new_items),
                        other => items.push(other),
                    }
                }
            }
        }
    }

    pub fn apply_all(&mut self, patches: Vec<StatePatch>) {
        for patch in patches {
            self.apply(patch);
        }
    }

    /// The state as a JSON object, for the `state` expression
    /// namespace and for returning final state to callers.
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_template_copies_defaults() {
        let template = json!({"count": 0, "messages": []});
        let state = ExecutionState::from_template(template.as_object().unwrap());
        assert_eq!(state.get("count"), Some(&json!(0)));
        assert_eq!(state.get("messages"), Some(&json!([])));
    }

    #[test]
    fn test_set_overwrites() {
        let mut state = ExecutionState::new();
        state.apply(StatePatch::set("status", json!("first")));
        state.apply(StatePatch::set("status", json!("second")));
        assert_eq!(state.get("status"), Some(&json!("second")));
    }

    #[test]
    fn test_append_defaults_to_empty_list() {
        let mut state = ExecutionState::new();
        state.apply(StatePatch::append("messages", json!("one")));
        assert_eq!(state.get("messages"), Some(&json!(["one"])));

        state.apply(StatePatch::append("messages", json!("two")));
        assert_eq!(state.get("messages"), Some(&json!(["one", "two"])));
    }

    #[test]
    fn test_append_flattens_lists() {
        let mut state = ExecutionState::new();
        state.apply(StatePatch::append("items", json!(["a", "b"])));
        state.apply(StatePatch::append("items", json!(["c"])));
        assert_eq!(state.get("items"), Some(&json!(["a", "b", "c"])));
    }

    #[test]
    fn test_append_over_null_treats_as_empty() {
        let template = json!({"log": null});
        let mut state = ExecutionState::from_template(template.as_object().unwrap());
        state.apply(StatePatch::append("log", json!("entry")));
        assert_eq!(state.get("log"), Some(&json!(["entry"])));
    }

    #[test]
    fn test_append_over_scalar_resets_to_list() {
        let mut state = ExecutionState::new();
        state.apply(StatePatch::set("draft", json!("existing")));
        state.apply(StatePatch::append("draft", json!("new")));
        assert_eq!(state.get("draft"), Some(&json!(["new"])));
    }

    #[test]
    fn test_get_path() {
        let mut state = ExecutionState::new();
        state.set("draft", json!({"title": "Intro", "meta": {"words": 5}}));
        assert_eq!(state.get_path("draft.title"), Some(&json!("Intro")));
        assert_eq!(state.get_path("draft.meta.words"), Some(&json!(5)));
        assert_eq!(state.get_path("draft.missing"), None);
    }

    #[test]
    fn test_patches_apply_in_order() {
        let mut state = ExecutionState::new();
        state.apply_all(vec![
            StatePatch::set("x", json!(1)),
            StatePatch::append("log", json!("a")),
            StatePatch::set("x", json!(2)),
            StatePatch::append("log", json!("b")),
        ]);
        assert_eq!(state.get("x"), Some(&json!(2)));
        assert_eq!(state.get("log"), Some(&json!(["a", "b"])));
    }
}
