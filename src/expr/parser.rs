// SPDX-License-Identifier: MIT

//! Expression parser
//!
//! Hand-written lexer and recursive-descent parser for the `${...}`
//! micro-language. Precedence, lowest first:
//!
//! ```text
//! or -> and -> not -> comparison -> + - -> * / % -> unary -
//!    -> postfix (call, .attr, [index]) -> primary
//! ```
//!
//! The function whitelist is enforced here: a call whose target is not
//! one of the known functions fails to parse, so no evaluator ever sees
//! an unvetted call.

use super::ast::{BinaryOp, Expr, Func, Literal, UnaryOp};
use super::ExprError;

/// Parse an expression string into an AST.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = lex(input).map_err(|message| ExprError::Parse {
        expr: input.to_string(),
        message,
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input,
    };
    let expr = parser.parse_or()?;
    if !parser.at_end() {
        return Err(parser.error(format!("unexpected token {}", parser.peek_desc())));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    And,
    Or,
    Not,
    True,
    False,
    Null,
}

fn lex(input: &str) -> Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Tok::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Tok::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Tok::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Tok::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Tok::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Tok::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Tok::Colon);
                i += 1;
            }
            '.' => {
                tokens.push(Tok::Dot);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::EqEq);
                    i += 2;
                } else {
                    return Err("single '=' is not an operator, use '=='".to_string());
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::NotEq);
                    i += 2;
                } else {
                    return Err("unexpected '!', use 'not'".to_string());
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Le);
                    i += 2;
                } else {
                    tokens.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ge);
                    i += 2;
                } else {
                    tokens.push(Tok::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            i += 1;
                            match chars.get(i) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(&esc) if esc == '\'' || esc == '"' || esc == '\\' => {
                                    s.push(esc)
                                }
                                Some(&other) => {
                                    return Err(format!("unknown escape '\\{}'", other))
                                }
                                None => return Err("unterminated string literal".to_string()),
                            }
                            i += 1;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Tok::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_float = false;
                if i < chars.len()
                    && chars[i] == '.'
                    && chars.get(i + 1).map_or(false, |c| c.is_ascii_digit())
                {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| format!("invalid number '{}'", text))?;
                    tokens.push(Tok::Float(value));
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| format!("invalid number '{}'", text))?;
                    tokens.push(Tok::Int(value));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                // Python-spelled keywords are accepted alongside the
                // lowercase forms; graph authors use both.
                tokens.push(match word.as_str() {
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "not" => Tok::Not,
                    "true" | "True" => Tok::True,
                    "false" | "False" => Tok::False,
                    "null" | "None" => Tok::Null,
                    _ => Tok::Ident(word),
                });
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    input: &'a str,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn peek_desc(&self) -> String {
        match self.peek() {
            Some(tok) => format!("{:?}", tok),
            None => "end of expression".to_string(),
        }
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), ExprError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", what, self.peek_desc())))
        }
    }

    fn error(&self, message: String) -> ExprError {
        ExprError::Parse {
            expr: self.input.to_string(),
            message,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while self.eat(&Tok::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Tok::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => BinaryOp::Eq,
            Some(Tok::NotEq) => BinaryOp::NotEq,
            Some(Tok::Lt) => BinaryOp::Lt,
            Some(Tok::Le) => BinaryOp::Le,
            Some(Tok::Gt) => BinaryOp::Gt,
            Some(Tok::Ge) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinaryOp::Mul,
                Some(Tok::Slash) => BinaryOp::Div,
                Some(Tok::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Tok::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let name = match self.advance() {
                        Some(Tok::Ident(name)) => name,
                        _ => return Err(self.error("expected attribute name after '.'".into())),
                    };
                    expr = Expr::Attr {
                        base: Box::new(expr),
                        name,
                    };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_or()?;
                    self.expect(Tok::RBracket, "']'")?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Tok::LParen) => {
                    let func = match &expr {
                        Expr::Name(name) => Func::from_name(name).ok_or_else(|| {
                            ExprError::UnknownFunction { name: name.clone() }
                        })?,
                        _ => return Err(self.error("only named functions may be called".into())),
                    };
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !self.eat(&Tok::RParen) {
                        loop {
                            args.push(self.parse_or()?);
                            if self.eat(&Tok::Comma) {
                                continue;
                            }
                            self.expect(Tok::RParen, "')'")?;
                            break;
                        }
                    }
                    expr = Expr::Call { func, args };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Tok::Int(n)) => Ok(Expr::Literal(Literal::Int(n))),
            Some(Tok::Float(f)) => Ok(Expr::Literal(Literal::Float(f))),
            Some(Tok::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Tok::True) => Ok(Expr::Literal(Literal::Bool(true))),
            Some(Tok::False) => Ok(Expr::Literal(Literal::Bool(false))),
            Some(Tok::Null) => Ok(Expr::Literal(Literal::Null)),
            Some(Tok::Ident(name)) => Ok(Expr::Name(name)),
            Some(Tok::LParen) => {
                let expr = self.parse_or()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(expr)
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Tok::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat(&Tok::Comma) {
                            if self.eat(&Tok::RBracket) {
                                break;
                            }
                            continue;
                        }
                        self.expect(Tok::RBracket, "']'")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Tok::LBrace) => {
                let mut entries = Vec::new();
                if !self.eat(&Tok::RBrace) {
                    loop {
                        let key = self.parse_or()?;
                        self.expect(Tok::Colon, "':'")?;
                        let value = self.parse_or()?;
                        entries.push((key, value));
                        if self.eat(&Tok::Comma) {
                            if self.eat(&Tok::RBrace) {
                                break;
                            }
                            continue;
                        }
                        self.expect(Tok::RBrace, "'}'")?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            Some(other) => Err(self.error(format!("unexpected token {:?}", other))),
            None => Err(self.error("empty expression".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("42").unwrap(), Expr::Literal(Literal::Int(42)));
        assert_eq!(parse("3.5").unwrap(), Expr::Literal(Literal::Float(3.5)));
        assert_eq!(
            parse("'hi'").unwrap(),
            Expr::Literal(Literal::Str("hi".to_string()))
        );
        assert_eq!(parse("true").unwrap(), Expr::Literal(Literal::Bool(true)));
        assert_eq!(parse("None").unwrap(), Expr::Literal(Literal::Null));
        assert_eq!(parse("False").unwrap(), Expr::Literal(Literal::Bool(false)));
    }

    #[test]
    fn test_parse_attr_chain() {
        let expr = parse("state.draft.title").unwrap();
        assert_eq!(
            expr,
            Expr::Attr {
                base: Box::new(Expr::Attr {
                    base: Box::new(Expr::Name("state".to_string())),
                    name: "draft".to_string(),
                }),
                name: "title".to_string(),
            }
        );
    }

    #[test]
    fn test_precedence_mul_over_add() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => match *right {
                Expr::Binary {
                    op: BinaryOp::Mul, ..
                } => {}
                other => panic!("expected Mul on the right, got {:?}", other),
            },
            other => panic!("expected Add at the top, got {:?}", other),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a or b and c").unwrap();
        assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn test_whitelisted_call() {
        let expr = parse("len(state.messages)").unwrap();
        match expr {
            Expr::Call { func, args } => {
                assert_eq!(func, Func::Len);
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_function_rejected_at_parse_time() {
        let err = parse("__import__('os')").unwrap_err();
        assert!(matches!(err, ExprError::UnknownFunction { name } if name == "__import__"));

        let err = parse("open('/etc/passwd')").unwrap_err();
        assert!(matches!(err, ExprError::UnknownFunction { name } if name == "open"));
    }

    #[test]
    fn test_call_on_non_name_rejected() {
        assert!(parse("state.f()").is_err());
    }

    #[test]
    fn test_list_and_dict_literals() {
        let expr = parse("[1, 2, 3]").unwrap();
        assert!(matches!(expr, Expr::List(items) if items.len() == 3));

        let expr = parse("{'a': 1, 'b': state.x}").unwrap();
        assert!(matches!(expr, Expr::Dict(entries) if entries.len() == 2));
    }

    #[test]
    fn test_index_expression() {
        let expr = parse("state.items[0]").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse("1 + 2 extra").is_err());
        assert!(parse("").is_err());
        assert!(parse("state.").is_err());
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            parse(r"'it\'s'").unwrap(),
            Expr::Literal(Literal::Str("it's".to_string()))
        );
    }
}
