// SPDX-License-Identifier: MIT

//! Expression and template evaluation
//!
//! Evaluates parsed expressions against the three read-only namespaces
//! (`inputs`, `state`, `runtime`) and implements the two template
//! modes: a string that is exactly one `${...}` span yields the
//! expression's native value, a string with interleaved text yields a
//! string with each span substituted.

use serde_json::{Map, Number, Value};

use super::ast::{BinaryOp, Expr, Func, Literal, UnaryOp};
use super::parser::parse;
use super::ExprError;

/// The namespaces visible to an expression. All three are JSON objects;
/// lookups of missing keys yield `null`.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub inputs: &'a Value,
    pub state: &'a Value,
    pub runtime: &'a Value,
}

impl<'a> Scope<'a> {
    pub fn new(inputs: &'a Value, state: &'a Value, runtime: &'a Value) -> Self {
        Self {
            inputs,
            state,
            runtime,
        }
    }

    fn resolve(&self, name: &str) -> Result<Value, ExprError> {
        match name {
            "inputs" => Ok(self.inputs.clone()),
            "state" => Ok(self.state.clone()),
            "runtime" => Ok(self.runtime.clone()),
            other => Err(ExprError::UnknownName {
                name: other.to_string(),
            }),
        }
    }
}

/// A template string parsed once. Evaluation only walks the scope;
/// no parsing happens per run.
#[derive(Debug, Clone)]
pub enum Template {
    /// No `${...}` spans; the string passes through verbatim.
    Literal(String),
    /// Exact-token mode: the whole string is one span, and evaluation
    /// yields the expression's native value.
    Expr(Expr),
    /// Interpolation mode: text interleaved with spans, each span's
    /// rendered value substituted in.
    Interpolated(Vec<TemplatePart>),
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

impl Template {
    pub fn parse(template: &str) -> Result<Self, ExprError> {
        let spans = find_spans(template)?;
        if spans.is_empty() {
            return Ok(Template::Literal(template.to_string()));
        }

        if spans.len() == 1 {
            let (start, end) = spans[0];
            if start == 0 && end == template.len() {
                return Ok(Template::Expr(parse(&template[start + 2..end - 1])?));
            }
        }

        let mut parts = Vec::new();
        let mut cursor = 0;
        for (start, end) in spans {
            if cursor < start {
                parts.push(TemplatePart::Text(template[cursor..start].to_string()));
            }
            parts.push(TemplatePart::Expr(parse(&template[start + 2..end - 1])?));
            cursor = end;
        }
        if cursor < template.len() {
            parts.push(TemplatePart::Text(template[cursor..].to_string()));
        }
        Ok(Template::Interpolated(parts))
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, ExprError> {
        match self {
            Template::Literal(s) => Ok(Value::String(s.clone())),
            Template::Expr(expr) => eval_expr(expr, scope),
            Template::Interpolated(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => {
                            out.push_str(&render(&eval_expr(expr, scope)?))
                        }
                    }
                }
                Ok(Value::String(out))
            }
        }
    }
}

/// A parameter value with every string leaf parsed as a template.
/// Maps and arrays keep their shape; other values pass through.
#[derive(Debug, Clone)]
pub enum ParamTemplate {
    Template(Template),
    Array(Vec<ParamTemplate>),
    Object(Vec<(String, ParamTemplate)>),
    Value(Value),
}

impl ParamTemplate {
    pub fn parse(params: &Value) -> Result<Self, ExprError> {
        match params {
            Value::String(s) => Ok(ParamTemplate::Template(Template::parse(s)?)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(ParamTemplate::parse(item)?);
                }
                Ok(ParamTemplate::Array(out))
            }
            Value::Object(map) => {
                let mut out = Vec::with_capacity(map.len());
                for (k, v) in map {
                    out.push((k.clone(), ParamTemplate::parse(v)?));
                }
                Ok(ParamTemplate::Object(out))
            }
            other => Ok(ParamTemplate::Value(other.clone())),
        }
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, ExprError> {
        match self {
            ParamTemplate::Template(template) => template.evaluate(scope),
            ParamTemplate::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.evaluate(scope)?);
                }
                Ok(Value::Array(out))
            }
            ParamTemplate::Object(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k.clone(), v.evaluate(scope)?);
                }
                Ok(Value::Object(out))
            }
            ParamTemplate::Value(value) => Ok(value.clone()),
        }
    }
}

/// Evaluate a template string. Non-template strings pass through
/// unchanged as string values.
pub fn evaluate(template: &str, scope: &Scope) -> Result<Value, ExprError> {
    Template::parse(template)?.evaluate(scope)
}

/// Deep-walk a parameter value, evaluating every string leaf as a
/// template.
pub fn evaluate_params(params: &Value, scope: &Scope) -> Result<Value, ExprError> {
    ParamTemplate::parse(params)?.evaluate(scope)
}

/// Find `${...}` spans as byte ranges `(start_of_dollar,
/// one_past_closing_brace)`. Nested braces and braces inside string
/// literals do not close a span.
pub fn find_spans(template: &str) -> Result<Vec<(usize, usize)>, ExprError> {
    let bytes = template.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let start = i;
            let mut depth = 1;
            let mut quote: Option<u8> = None;
            let mut j = i + 2;
            while j < bytes.len() {
                let b = bytes[j];
                match quote {
                    Some(q) => {
                        if b == b'\\' {
                            j += 1;
                        } else if b == q {
                            quote = None;
                        }
                    }
                    None => match b {
                        b'\'' | b'"' => quote = Some(b),
                        b'{' => depth += 1,
                        b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    },
                }
                j += 1;
            }
            if depth != 0 {
                return Err(ExprError::Parse {
                    expr: template.to_string(),
                    message: "unclosed '${'".to_string(),
                });
            }
            spans.push((start, j + 1));
            i = j + 1;
        } else {
            i += 1;
        }
    }

    Ok(spans)
}

/// Render a value for string interpolation. Strings are verbatim, null
/// renders empty, compound values render as JSON.
fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        compound => serde_json::to_string(compound).unwrap_or_default(),
    }
}

/// Python-like truthiness: null, false, zero, empty string, empty
/// list and empty object are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub fn eval_expr(expr: &Expr, scope: &Scope) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::Name(name) => scope.resolve(name),
        Expr::Attr { base, name } => {
            let base = eval_expr(base, scope)?;
            Ok(lookup(&base, name))
        }
        Expr::Index { base, index } => {
            let base = eval_expr(base, scope)?;
            let index = eval_expr(index, scope)?;
            eval_index(&base, &index)
        }
        Expr::Call { func, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, scope)?);
            }
            eval_call(*func, values)
        }
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => negate(&value),
            }
        }
        Expr::Binary { op, left, right } => {
            let left = eval_expr(left, scope)?;
            let right = eval_expr(right, scope)?;
            eval_binary(*op, &left, &right)
        }
        Expr::And(left, right) => {
            let left = eval_expr(left, scope)?;
            if truthy(&left) {
                eval_expr(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval_expr(left, scope)?;
            if truthy(&left) {
                Ok(left)
            } else {
                eval_expr(right, scope)
            }
        }
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, scope)?);
            }
            Ok(Value::Array(out))
        }
        Expr::Dict(entries) => {
            let mut out = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let key = eval_expr(key, scope)?;
                let key = match key {
                    Value::String(s) => s,
                    other => render(&other),
                };
                out.insert(key, eval_expr(value, scope)?);
            }
            Ok(Value::Object(out))
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Number(Number::from(*n)),
        Literal::Float(f) => float_value(*f),
        Literal::Str(s) => Value::String(s.clone()),
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Attribute lookup. Missing keys yield null rather than erroring, so
/// conditions can probe optional state.
fn lookup(base: &Value, name: &str) -> Value {
    match base {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn eval_index(base: &Value, index: &Value) -> Result<Value, ExprError> {
    match (base, index) {
        (Value::Object(map), Value::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Array(items), Value::Number(n)) => {
            let idx = n.as_i64().ok_or_else(|| ExprError::Type {
                message: "list index must be an integer".to_string(),
            })?;
            let len = items.len() as i64;
            let idx = if idx < 0 { idx + len } else { idx };
            if idx < 0 || idx >= len {
                Ok(Value::Null)
            } else {
                Ok(items[idx as usize].clone())
            }
        }
        (Value::Null, _) => Ok(Value::Null),
        (base, index) => Err(ExprError::Type {
            message: format!("cannot index {} with {}", type_name(base), type_name(index)),
        }),
    }
}

fn negate(value: &Value) -> Result<Value, ExprError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Number(Number::from(-i)))
            } else if let Some(f) = n.as_f64() {
                Ok(float_value(-f))
            } else {
                Err(ExprError::Type {
                    message: "cannot negate number".to_string(),
                })
            }
        }
        other => Err(ExprError::Type {
            message: format!("cannot negate {}", type_name(other)),
        }),
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => numeric(op, left, right),
        BinaryOp::Mul => numeric(op, left, right),
        BinaryOp::Div => divide(left, right),
        BinaryOp::Mod => modulo(left, right),
    }
}

/// Equality with numeric coercion: `1 == 1.0` holds, everything else
/// is structural.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (a, b) => a == b,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            match (a, b) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let ordering = ordering.ok_or_else(|| ExprError::Type {
        message: format!(
            "cannot order {} and {}",
            type_name(left),
            type_name(right)
        ),
    })?;
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

/// `+` adds numbers, concatenates strings and concatenates lists.
fn add(left: &Value, right: &Value) -> Result<Value, ExprError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Array(out))
        }
        _ => numeric(BinaryOp::Add, left, right),
    }
}

/// Integer arithmetic when both operands are integers, float otherwise.
fn numeric(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let (a, b) = match (left, right) {
        (Value::Number(a), Value::Number(b)) => (a, b),
        _ => {
            return Err(ExprError::Type {
                message: format!(
                    "unsupported operands for arithmetic: {} and {}",
                    type_name(left),
                    type_name(right)
                ),
            })
        }
    };
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            _ => unreachable!(),
        };
        return Ok(Value::Number(Number::from(result)));
    }
    let (a, b) = (as_f64(left)?, as_f64(right)?);
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => unreachable!(),
    };
    Ok(float_value(result))
}

/// `/` always yields a float.
fn divide(left: &Value, right: &Value) -> Result<Value, ExprError> {
    let (a, b) = (as_f64(left)?, as_f64(right)?);
    if b == 0.0 {
        return Err(ExprError::DivisionByZero);
    }
    Ok(float_value(a / b))
}

fn modulo(left: &Value, right: &Value) -> Result<Value, ExprError> {
    if let (Value::Number(a), Value::Number(b)) = (left, right) {
        if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
            if b == 0 {
                return Err(ExprError::DivisionByZero);
            }
            return Ok(Value::Number(Number::from(a.rem_euclid(b))));
        }
    }
    let (a, b) = (as_f64(left)?, as_f64(right)?);
    if b == 0.0 {
        return Err(ExprError::DivisionByZero);
    }
    Ok(float_value(a.rem_euclid(b)))
}

fn as_f64(value: &Value) -> Result<f64, ExprError> {
    value
        .as_f64()
        .ok_or_else(|| ExprError::Type {
            message: format!("expected a number, got {}", type_name(value)),
        })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn eval_call(func: Func, mut args: Vec<Value>) -> Result<Value, ExprError> {
    let argc = args.len();
    let arity = move |n: usize| -> Result<(), ExprError> {
        if argc == n {
            Ok(())
        } else {
            Err(ExprError::Type {
                message: format!("{}() takes {} argument(s), got {}", func.name(), n, argc),
            })
        }
    };

    match func {
        Func::Len => {
            arity(1)?;
            let n = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(ExprError::Type {
                        message: format!("len() of {}", type_name(other)),
                    })
                }
            };
            Ok(Value::Number(Number::from(n as i64)))
        }
        Func::Str => {
            arity(1)?;
            Ok(Value::String(match &args[0] {
                Value::String(s) => s.clone(),
                Value::Null => "null".to_string(),
                other => render(other),
            }))
        }
        Func::Int => {
            arity(1)?;
            let n = match &args[0] {
                Value::Number(n) => n.as_f64().map(|f| f.trunc() as i64),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                Value::Bool(b) => Some(*b as i64),
                _ => None,
            };
            n.map(|n| Value::Number(Number::from(n)))
                .ok_or_else(|| ExprError::Type {
                    message: format!("int() of {}", type_name(&args[0])),
                })
        }
        Func::Float => {
            arity(1)?;
            let f = match &args[0] {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            f.map(float_value).ok_or_else(|| ExprError::Type {
                message: format!("float() of {}", type_name(&args[0])),
            })
        }
        Func::Bool => {
            arity(1)?;
            Ok(Value::Bool(truthy(&args[0])))
        }
        Func::List => {
            if args.is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            arity(1)?;
            match args.remove(0) {
                Value::Array(items) => Ok(Value::Array(items)),
                Value::String(s) => Ok(Value::Array(
                    s.chars().map(|c| Value::String(c.to_string())).collect(),
                )),
                other => Err(ExprError::Type {
                    message: format!("list() of {}", type_name(&other)),
                }),
            }
        }
        Func::Dict => {
            if args.is_empty() {
                return Ok(Value::Object(Map::new()));
            }
            arity(1)?;
            match args.remove(0) {
                obj @ Value::Object(_) => Ok(obj),
                other => Err(ExprError::Type {
                    message: format!("dict() of {}", type_name(&other)),
                }),
            }
        }
        Func::Min | Func::Max => {
            // Either a single list or the values directly.
            let values = if args.len() == 1 {
                match args.remove(0) {
                    Value::Array(items) => items,
                    single => vec![single],
                }
            } else {
                args
            };
            if values.is_empty() {
                return Err(ExprError::Type {
                    message: format!("{}() of empty sequence", func.name()),
                });
            }
            let mut best = values[0].clone();
            for candidate in &values[1..] {
                let take = match compare(BinaryOp::Lt, candidate, &best)? {
                    Value::Bool(less) => {
                        if func == Func::Min {
                            less
                        } else {
                            !less && !loose_eq(candidate, &best)
                        }
                    }
                    _ => false,
                };
                if take {
                    best = candidate.clone();
                }
            }
            Ok(best)
        }
        Func::Sum => {
            arity(1)?;
            let items = match &args[0] {
                Value::Array(items) => items,
                other => {
                    return Err(ExprError::Type {
                        message: format!("sum() of {}", type_name(other)),
                    })
                }
            };
            let mut int_total: i64 = 0;
            let mut float_total = 0.0;
            let mut all_ints = true;
            for item in items {
                match item {
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            int_total = int_total.wrapping_add(i);
                            float_total += i as f64;
                        } else {
                            all_ints = false;
                            float_total += n.as_f64().unwrap_or(0.0);
                        }
                    }
                    other => {
                        return Err(ExprError::Type {
                            message: format!("sum() over {}", type_name(other)),
                        })
                    }
                }
            }
            if all_ints {
                Ok(Value::Number(Number::from(int_total)))
            } else {
                Ok(float_value(float_total))
            }
        }
        Func::Abs => {
            arity(1)?;
            match &args[0] {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(Value::Number(Number::from(i.wrapping_abs())))
                    } else {
                        Ok(float_value(n.as_f64().unwrap_or(0.0).abs()))
                    }
                }
                other => Err(ExprError::Type {
                    message: format!("abs() of {}", type_name(other)),
                }),
            }
        }
        Func::Round => {
            if args.len() != 1 && args.len() != 2 {
                return Err(ExprError::Type {
                    message: format!("round() takes 1 or 2 arguments, got {}", args.len()),
                });
            }
            let value = as_f64(&args[0])?;
            if args.len() == 1 {
                return Ok(Value::Number(Number::from(value.round() as i64)));
            }
            let digits = match &args[1] {
                Value::Number(n) => n.as_i64(),
                _ => None,
            }
            .ok_or_else(|| ExprError::Type {
                message: "round() digits must be an integer".to_string(),
            })?;
            let factor = 10f64.powi(digits as i32);
            Ok(float_value((value * factor).round() / factor))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope_values() -> (Value, Value, Value) {
        (
            json!({"topic": "rust", "name": "Bob", "count": 3}),
            json!({
                "messages": ["a", "b"],
                "score": 0.9,
                "draft": {"title": "Intro", "words": 120},
                "flag": true,
            }),
            json!({
                "user_id": "u1",
                "runtime_type": "local",
                "model_default": "big",
                "model_fast": "small",
                "trace_id": "t",
                "run_id": "r",
                "device_type": "laptop",
            }),
        )
    }

    fn eval(template: &str) -> Result<Value, ExprError> {
        let (inputs, state, runtime) = scope_values();
        let scope = Scope::new(&inputs, &state, &runtime);
        evaluate(template, &scope)
    }

    #[test]
    fn test_exact_token_returns_native_value() {
        assert_eq!(eval("${1 + 1}").unwrap(), json!(2));
        assert_eq!(eval("${state.messages}").unwrap(), json!(["a", "b"]));
        assert_eq!(eval("${state.flag}").unwrap(), json!(true));
    }

    #[test]
    fn test_interpolation_renders_string() {
        assert_eq!(
            eval("Hello ${inputs.name}!").unwrap(),
            json!("Hello Bob!")
        );
        assert_eq!(
            eval("count=${inputs.count} score=${state.score}").unwrap(),
            json!("count=3 score=0.9")
        );
    }

    #[test]
    fn test_plain_string_passes_through() {
        assert_eq!(eval("no templates here").unwrap(), json!("no templates here"));
    }

    #[test]
    fn test_template_parse_modes() {
        assert!(matches!(
            Template::parse("plain").unwrap(),
            Template::Literal(_)
        ));
        assert!(matches!(
            Template::parse("${state.flag}").unwrap(),
            Template::Expr(_)
        ));
        assert!(matches!(
            Template::parse("${state.flag} and ${inputs.count}").unwrap(),
            Template::Interpolated(_)
        ));
    }

    #[test]
    fn test_param_template_reevaluates_against_new_state() {
        let template = ParamTemplate::parse(&json!({"prompt": "Hi ${state.who}"})).unwrap();
        let (inputs, _, runtime) = scope_values();

        let state = json!({"who": "Ada"});
        let scope = Scope::new(&inputs, &state, &runtime);
        assert_eq!(template.evaluate(&scope).unwrap(), json!({"prompt": "Hi Ada"}));

        let state = json!({"who": "Grace"});
        let scope = Scope::new(&inputs, &state, &runtime);
        assert_eq!(
            template.evaluate(&scope).unwrap(),
            json!({"prompt": "Hi Grace"})
        );
    }

    #[test]
    fn test_missing_key_yields_null() {
        assert_eq!(eval("${state.nothing}").unwrap(), Value::Null);
        assert_eq!(eval("${state.draft.missing}").unwrap(), Value::Null);
        // Null renders as empty string in interpolation mode
        assert_eq!(eval("x=${state.nothing}").unwrap(), json!("x="));
    }

    #[test]
    fn test_unknown_root_is_error() {
        assert!(matches!(
            eval("${secrets.key}"),
            Err(ExprError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_division_always_float() {
        assert_eq!(eval("${4 / 2}").unwrap(), json!(2.0));
        assert!(matches!(eval("${1 / 0}"), Err(ExprError::DivisionByZero)));
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        assert_eq!(eval("${2 + 3 * 4}").unwrap(), json!(14));
        assert_eq!(eval("${2.0 + 3}").unwrap(), json!(5.0));
        assert_eq!(eval("${7 % 3}").unwrap(), json!(1));
    }

    #[test]
    fn test_and_or_return_operand_values() {
        assert_eq!(eval("${null or 'fallback'}").unwrap(), json!("fallback"));
        assert_eq!(eval("${'first' or 'second'}").unwrap(), json!("first"));
        assert_eq!(eval("${state.flag and inputs.topic}").unwrap(), json!("rust"));
        assert_eq!(eval("${0 and 'unreached'}").unwrap(), json!(0));
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(eval("${bool('')}").unwrap(), json!(false));
        assert_eq!(eval("${bool([])}").unwrap(), json!(false));
        assert_eq!(eval("${bool({})}").unwrap(), json!(false));
        assert_eq!(eval("${bool(0)}").unwrap(), json!(false));
        assert_eq!(eval("${bool(null)}").unwrap(), json!(false));
        assert_eq!(eval("${bool('x')}").unwrap(), json!(true));
        assert_eq!(eval("${not state.flag}").unwrap(), json!(false));
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("${len(state.messages)}").unwrap(), json!(2));
        assert_eq!(eval("${len(inputs.topic)}").unwrap(), json!(4));
        assert_eq!(eval("${min(3, 1, 2)}").unwrap(), json!(1));
        assert_eq!(eval("${max([3, 1, 2])}").unwrap(), json!(3));
        assert_eq!(eval("${sum([1, 2, 3])}").unwrap(), json!(6));
        assert_eq!(eval("${abs(-5)}").unwrap(), json!(5));
        assert_eq!(eval("${round(2.7)}").unwrap(), json!(3));
        assert_eq!(eval("${round(2.345, 2)}").unwrap(), json!(2.35));
        assert_eq!(eval("${int('42')}").unwrap(), json!(42));
        assert_eq!(eval("${str(42)}").unwrap(), json!("42"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("${state.score > 0.5}").unwrap(), json!(true));
        assert_eq!(eval("${inputs.count >= 3}").unwrap(), json!(true));
        assert_eq!(eval("${1 == 1.0}").unwrap(), json!(true));
        assert_eq!(eval("${'a' < 'b'}").unwrap(), json!(true));
        assert_eq!(eval("${inputs.topic != 'go'}").unwrap(), json!(true));
    }

    #[test]
    fn test_indexing() {
        assert_eq!(eval("${state.messages[0]}").unwrap(), json!("a"));
        assert_eq!(eval("${state.messages[-1]}").unwrap(), json!("b"));
        assert_eq!(eval("${state.messages[9]}").unwrap(), Value::Null);
        assert_eq!(eval("${state['score']}").unwrap(), json!(0.9));
    }

    #[test]
    fn test_string_and_list_concat() {
        assert_eq!(eval("${'a' + 'b'}").unwrap(), json!("ab"));
        assert_eq!(
            eval("${state.messages + ['c']}").unwrap(),
            json!(["a", "b", "c"])
        );
    }

    #[test]
    fn test_compound_renders_as_json() {
        assert_eq!(
            eval("msgs: ${state.messages}").unwrap(),
            json!("msgs: [\"a\",\"b\"]")
        );
    }

    #[test]
    fn test_evaluate_params_deep_walk() {
        let (inputs, state, runtime) = scope_values();
        let scope = Scope::new(&inputs, &state, &runtime);
        let params = json!({
            "prompt": "Write about ${inputs.topic}",
            "options": {"limit": "${inputs.count}", "flags": ["${state.flag}", "literal"]},
            "n": 7,
        });
        let out = evaluate_params(&params, &scope).unwrap();
        assert_eq!(out["prompt"], json!("Write about rust"));
        assert_eq!(out["options"]["limit"], json!(3));
        assert_eq!(out["options"]["flags"], json!([true, "literal"]));
        assert_eq!(out["n"], json!(7));
    }

    #[test]
    fn test_braces_in_strings_do_not_close_span() {
        assert_eq!(eval("${'}' + inputs.topic}").unwrap(), json!("}rust"));
        assert_eq!(eval("${ {'k': 1}['k'] }").unwrap(), json!(1));
    }
}
