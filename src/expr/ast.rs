// SPDX-License-Identifier: MIT

//! Expression AST
//!
//! Parsed form of the `${...}` micro-language. Expressions are parsed
//! once (at compile or validation time) and evaluated many times.

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Bare identifier, e.g. `inputs` or `state`.
    Name(String),
    /// Attribute access, `base.name`.
    Attr { base: Box<Expr>, name: String },
    /// Subscript, `base[index]`.
    Index { base: Box<Expr>, index: Box<Expr> },
    /// Whitelisted function call.
    Call { func: Func, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Short-circuiting `and`, yields the deciding operand value.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuiting `or`, yields the deciding operand value.
    Or(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// The closed set of callable functions. Enforced when parsing, so an
/// expression that names anything else never produces an AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Len,
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Min,
    Max,
    Sum,
    Abs,
    Round,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Func> {
        Some(match name {
            "len" => Func::Len,
            "str" => Func::Str,
            "int" => Func::Int,
            "float" => Func::Float,
            "bool" => Func::Bool,
            "list" => Func::List,
            "dict" => Func::Dict,
            "min" => Func::Min,
            "max" => Func::Max,
            "sum" => Func::Sum,
            "abs" => Func::Abs,
            "round" => Func::Round,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Len => "len",
            Func::Str => "str",
            Func::Int => "int",
            Func::Float => "float",
            Func::Bool => "bool",
            Func::List => "list",
            Func::Dict => "dict",
            Func::Min => "min",
            Func::Max => "max",
            Func::Sum => "sum",
            Func::Abs => "abs",
            Func::Round => "round",
        }
    }
}

/// A variable reference found in an expression: the root namespace name
/// plus the first attribute segment, if any. `state.draft.title` yields
/// `("state", Some("draft"))`.
pub type VarRef = (String, Option<String>);

impl Expr {
    /// Collect every variable reference in the expression. Used by the
    /// validator to cross-check references against declared inputs and
    /// state keys.
    pub fn references(&self) -> Vec<VarRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs(&self, refs: &mut Vec<VarRef>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Name(root) => refs.push((root.clone(), None)),
            Expr::Attr { base, name } => {
                if let Expr::Name(root) = base.as_ref() {
                    refs.push((root.clone(), Some(name.clone())));
                } else {
                    base.collect_refs(refs);
                }
            }
            Expr::Index { base, index } => {
                // A string subscript on a bare namespace counts as a
                // first-segment reference, same as dot access.
                match (base.as_ref(), index.as_ref()) {
                    (Expr::Name(root), Expr::Literal(Literal::Str(key))) => {
                        refs.push((root.clone(), Some(key.clone())));
                    }
                    _ => {
                        base.collect_refs(refs);
                        index.collect_refs(refs);
                    }
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_refs(refs);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_refs(refs),
            Expr::Binary { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_refs(refs);
                right.collect_refs(refs);
            }
            Expr::List(items) => {
                for item in items {
                    item.collect_refs(refs);
                }
            }
            Expr::Dict(entries) => {
                for (k, v) in entries {
                    k.collect_refs(refs);
                    v.collect_refs(refs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_func_whitelist_roundtrip() {
        for name in [
            "len", "str", "int", "float", "bool", "list", "dict", "min", "max", "sum", "abs",
            "round",
        ] {
            let func = Func::from_name(name).unwrap();
            assert_eq!(func.name(), name);
        }
        assert!(Func::from_name("eval").is_none());
        assert!(Func::from_name("open").is_none());
    }

    #[test]
    fn test_references_attr_chain() {
        // state.draft.title
        let expr = Expr::Attr {
            base: Box::new(Expr::Attr {
                base: Box::new(Expr::Name("state".to_string())),
                name: "draft".to_string(),
            }),
            name: "title".to_string(),
        };
        assert_eq!(
            expr.references(),
            vec![("state".to_string(), Some("draft".to_string()))]
        );
    }
}
