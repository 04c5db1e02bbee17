//! Boolean condition-expression interpreter.
//!
//! A small, purpose-built language evaluated against a fixed set of bound
//! names from the request context. No reflection, no host calls, no side
//! effects; evaluation is total and every failure is a typed error that
//! the policy evaluator converts to not-applicable or deny.
//!
//! Supported surface:
//! - literals: numbers, single/double-quoted strings, `true`, `false`,
//!   `null`, list literals `[a, b]`
//! - bound identifiers with dotted member access (`attributes.department`)
//! - comparisons `== != < > <= >=`, logic `&& || !`, parentheses
//! - `collection contains value` (also substring test on strings)
//! - helper calls `hasPermission(resource, action)` and
//!   `hasAnyPermission(["TYPE:ACTION", ..])`
//!
//! Values are JSON values; numeric comparison coerces integers and floats.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("lex error at byte {position}: {message}")]
    Lex { position: usize, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("cannot access field '{field}' on non-object value")]
    BadMemberAccess { field: String },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    BadArity {
        name: String,
        expected: usize,
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Bound names and the permission set backing the helper functions.
pub struct ExprContext {
    variables: HashMap<String, Value>,
    /// `(resource_type, action)` pairs held by the user.
    permissions: HashSet<(String, String)>,
}

impl ExprContext {
    pub fn new(
        variables: HashMap<String, Value>,
        permissions: HashSet<(String, String)>,
    ) -> Self {
        Self {
            variables,
            permissions,
        }
    }

    fn lookup(&self, name: &str) -> Result<&Value, ExprError> {
        self.variables
            .get(name)
            .ok_or_else(|| ExprError::UnknownIdentifier(name.to_string()))
    }

    fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.permissions
            .contains(&(resource.to_string(), action.to_string()))
    }
}

/// Parses and evaluates `source` against the context, expecting a boolean
/// result.
pub fn evaluate(source: &str, context: &ExprContext) -> Result<bool, ExprError> {
    let tokens = lex(source)?;
    let ast = Parser::new(tokens).parse()?;
    match eval(&ast, context)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::TypeMismatch(format!(
            "expression must evaluate to a boolean, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    Contains,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn lex(source: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ExprError::Lex {
                        position: i,
                        message: "single '=' (use '==')".into(),
                    });
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ExprError::Lex {
                        position: i,
                        message: "single '&' (use '&&')".into(),
                    });
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ExprError::Lex {
                        position: i,
                        message: "single '|' (use '||')".into(),
                    });
                }
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] as char != quote {
                    j += 1;
                }
                if j >= bytes.len() {
                    return Err(ExprError::Lex {
                        position: i,
                        message: "unterminated string".into(),
                    });
                }
                tokens.push(Token::Str(source[start..j].to_string()));
                i = j + 1;
            }
            '0'..='9' => {
                let start = i;
                let mut j = i;
                let mut seen_dot = false;
                while j < bytes.len() {
                    let d = bytes[j] as char;
                    if d.is_ascii_digit() {
                        j += 1;
                    } else if d == '.' && !seen_dot && bytes.get(j + 1).is_some_and(|n| (*n as char).is_ascii_digit()) {
                        seen_dot = true;
                        j += 1;
                    } else {
                        break;
                    }
                }
                let text = &source[start..j];
                let number = text.parse::<f64>().map_err(|e| ExprError::Lex {
                    position: start,
                    message: format!("bad number '{text}': {e}"),
                })?;
                tokens.push(Token::Number(number));
                i = j;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < bytes.len() {
                    let d = bytes[j] as char;
                    if d.is_ascii_alphanumeric() || d == '_' {
                        j += 1;
                    } else {
                        break;
                    }
                }
                let word = &source[start..j];
                tokens.push(match word {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "contains" => Token::Contains,
                    _ => Token::Ident(word.to_string()),
                });
                i = j;
            }
            other => {
                return Err(ExprError::Lex {
                    position: i,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    /// Base identifier followed by member accesses.
    Variable(String, Vec<String>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn parse(mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_or()?;
        if self.position < self.tokens.len() {
            return Err(ExprError::Parse(format!(
                "unexpected trailing token {:?}",
                self.tokens[self.position]
            )));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(ExprError::Parse(format!(
                "expected {expected:?}, got {other:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Contains) => BinaryOp::Contains,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_or()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    return Ok(Expr::Call(name, args));
                }

                let mut path = Vec::new();
                while self.peek() == Some(&Token::Dot) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(field)) => path.push(field),
                        other => {
                            return Err(ExprError::Parse(format!(
                                "expected field name after '.', got {other:?}"
                            )));
                        }
                    }
                }
                Ok(Expr::Variable(name, path))
            }
            other => Err(ExprError::Parse(format!(
                "unexpected token {other:?}"
            ))),
        }
    }
}

fn number_value(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, context: &ExprContext) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name, path) => {
            let mut current = context.lookup(name)?;
            for field in path {
                match current {
                    Value::Object(map) => {
                        current = map.get(field).unwrap_or(&Value::Null);
                    }
                    _ => {
                        return Err(ExprError::BadMemberAccess {
                            field: field.clone(),
                        });
                    }
                }
            }
            Ok(current.clone())
        }
        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| eval(item, context))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        }
        Expr::Not(inner) => match eval(inner, context)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(ExprError::TypeMismatch(format!(
                "'!' expects a boolean, got {other}"
            ))),
        },
        Expr::Binary(op, left, right) => eval_binary(op, left, right, context),
        Expr::Call(name, args) => eval_call(name, args, context),
    }
}

fn eval_binary(
    op: &BinaryOp,
    left: &Expr,
    right: &Expr,
    context: &ExprContext,
) -> Result<Value, ExprError> {
    // Short-circuit logic operators before evaluating the right side.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let lhs = match eval(left, context)? {
            Value::Bool(b) => b,
            other => {
                return Err(ExprError::TypeMismatch(format!(
                    "logical operand must be boolean, got {other}"
                )));
            }
        };
        match (op, lhs) {
            (BinaryOp::And, false) => return Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => return Ok(Value::Bool(true)),
            _ => {}
        }
        return match eval(right, context)? {
            Value::Bool(b) => Ok(Value::Bool(b)),
            other => Err(ExprError::TypeMismatch(format!(
                "logical operand must be boolean, got {other}"
            ))),
        };
    }

    let lhs = eval(left, context)?;
    let rhs = eval(right, context)?;

    let result = match op {
        BinaryOp::Eq => loose_eq(&lhs, &rhs),
        BinaryOp::NotEq => !loose_eq(&lhs, &rhs),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs)?;
            match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
        BinaryOp::Contains => contains(&lhs, &rhs)?,
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    };

    Ok(Value::Bool(result))
}

/// Equality with numeric coercion: `1 == 1.0` holds.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, ExprError> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r).ok_or_else(|| {
            ExprError::TypeMismatch("NaN is not comparable".into())
        });
    }
    if let (Value::String(l), Value::String(r)) = (left, right) {
        return Ok(l.cmp(r));
    }
    Err(ExprError::TypeMismatch(format!(
        "cannot order {left} against {right}"
    )))
}

fn contains(collection: &Value, needle: &Value) -> Result<bool, ExprError> {
    match collection {
        Value::Array(items) => Ok(items.iter().any(|item| loose_eq(item, needle))),
        Value::String(haystack) => match needle {
            Value::String(sub) => Ok(haystack.contains(sub.as_str())),
            other => Err(ExprError::TypeMismatch(format!(
                "string contains expects a string, got {other}"
            ))),
        },
        other => Err(ExprError::TypeMismatch(format!(
            "'contains' expects a list or string, got {other}"
        ))),
    }
}

fn eval_call(name: &str, args: &[Expr], context: &ExprContext) -> Result<Value, ExprError> {
    match name {
        "hasPermission" => {
            if args.len() != 2 {
                return Err(ExprError::BadArity {
                    name: name.into(),
                    expected: 2,
                    got: args.len(),
                });
            }
            let resource = expect_string(eval(&args[0], context)?)?;
            let action = expect_string(eval(&args[1], context)?)?;
            Ok(Value::Bool(context.has_permission(&resource, &action)))
        }
        "hasAnyPermission" => {
            if args.len() != 1 {
                return Err(ExprError::BadArity {
                    name: name.into(),
                    expected: 1,
                    got: args.len(),
                });
            }
            let list = match eval(&args[0], context)? {
                Value::Array(items) => items,
                other => {
                    return Err(ExprError::TypeMismatch(format!(
                        "hasAnyPermission expects a list, got {other}"
                    )));
                }
            };
            for item in list {
                let qualified = expect_string(item)?;
                let Some((resource, action)) = qualified.split_once(':') else {
                    return Err(ExprError::TypeMismatch(format!(
                        "permission name '{qualified}' must be TYPE:ACTION"
                    )));
                };
                if context.has_permission(resource, action) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        other => Err(ExprError::UnknownFunction(other.into())),
    }
}

fn expect_string(value: Value) -> Result<String, ExprError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ExprError::TypeMismatch(format!(
            "expected a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ExprContext {
        let mut variables = HashMap::new();
        variables.insert("userId".into(), json!("u-1"));
        variables.insert("action".into(), json!("READ"));
        variables.insert("hour".into(), json!(14));
        variables.insert("dayOfWeek".into(), json!("MONDAY"));
        variables.insert(
            "attributes".into(),
            json!({
                "department": "FINANCE",
                "clearance": 3,
                "groups": ["analysts", "reviewers"],
            }),
        );
        variables.insert(
            "permissionNames".into(),
            json!(["REPORT:READ", "DATASET:UPDATE"]),
        );

        let mut permissions = HashSet::new();
        permissions.insert(("REPORT".to_string(), "READ".to_string()));
        permissions.insert(("DATASET".to_string(), "UPDATE".to_string()));

        ExprContext::new(variables, permissions)
    }

    #[test]
    fn equality_on_strings() {
        let ctx = context();
        assert!(evaluate("action == 'READ'", &ctx).unwrap());
        assert!(!evaluate("action == 'WRITE'", &ctx).unwrap());
        assert!(evaluate("action != 'WRITE'", &ctx).unwrap());
    }

    #[test]
    fn numeric_comparisons() {
        let ctx = context();
        assert!(evaluate("hour >= 9 && hour <= 17", &ctx).unwrap());
        assert!(!evaluate("hour < 9", &ctx).unwrap());
        assert!(evaluate("attributes.clearance > 2", &ctx).unwrap());
    }

    #[test]
    fn numeric_coercion_in_equality() {
        let ctx = context();
        assert!(evaluate("attributes.clearance == 3.0", &ctx).unwrap());
    }

    #[test]
    fn dotted_member_access() {
        let ctx = context();
        assert!(evaluate("attributes.department == 'FINANCE'", &ctx).unwrap());
        // Missing fields resolve to null rather than erroring.
        assert!(evaluate("attributes.missing == null", &ctx).unwrap());
    }

    #[test]
    fn member_access_on_scalar_errors() {
        let ctx = context();
        let err = evaluate("action.foo == 1", &ctx).unwrap_err();
        assert!(matches!(err, ExprError::BadMemberAccess { .. }));
    }

    #[test]
    fn logic_and_negation() {
        let ctx = context();
        assert!(evaluate("!(action == 'WRITE')", &ctx).unwrap());
        assert!(evaluate("action == 'WRITE' || hour == 14", &ctx).unwrap());
        assert!(!evaluate("action == 'WRITE' && hour == 14", &ctx).unwrap());
    }

    #[test]
    fn short_circuit_skips_right_side_errors() {
        let ctx = context();
        // 'nope' is unbound but must never be evaluated.
        assert!(evaluate("action == 'READ' || nope == 1", &ctx).unwrap());
        assert!(!evaluate("action == 'WRITE' && nope == 1", &ctx).unwrap());
    }

    #[test]
    fn contains_on_lists_and_strings() {
        let ctx = context();
        assert!(evaluate("attributes.groups contains 'analysts'", &ctx).unwrap());
        assert!(!evaluate("attributes.groups contains 'admins'", &ctx).unwrap());
        assert!(evaluate("permissionNames contains 'REPORT:READ'", &ctx).unwrap());
        assert!(evaluate("attributes.department contains 'FIN'", &ctx).unwrap());
        assert!(evaluate("['MONDAY', 'TUESDAY'] contains dayOfWeek", &ctx).unwrap());
    }

    #[test]
    fn permission_helpers() {
        let ctx = context();
        assert!(evaluate("hasPermission('REPORT', 'READ')", &ctx).unwrap());
        assert!(!evaluate("hasPermission('REPORT', 'DELETE')", &ctx).unwrap());
        assert!(evaluate("hasAnyPermission(['REPORT:DELETE', 'DATASET:UPDATE'])", &ctx).unwrap());
        assert!(!evaluate("hasAnyPermission(['REPORT:DELETE'])", &ctx).unwrap());
    }

    #[test]
    fn unknown_identifier_is_an_error() {
        let ctx = context();
        assert_eq!(
            evaluate("somethingElse == 1", &ctx),
            Err(ExprError::UnknownIdentifier("somethingElse".into()))
        );
    }

    #[test]
    fn unknown_function_is_an_error() {
        let ctx = context();
        assert!(matches!(
            evaluate("system('rm -rf /')", &ctx),
            Err(ExprError::UnknownFunction(_))
        ));
    }

    #[test]
    fn non_boolean_result_is_an_error() {
        let ctx = context();
        assert!(matches!(
            evaluate("hour", &ctx),
            Err(ExprError::TypeMismatch(_))
        ));
    }

    #[test]
    fn malformed_input_is_an_error() {
        let ctx = context();
        assert!(matches!(evaluate("hour = 9", &ctx), Err(ExprError::Lex { .. })));
        assert!(matches!(evaluate("(hour == 9", &ctx), Err(ExprError::Parse(_))));
        assert!(matches!(evaluate("", &ctx), Err(ExprError::Parse(_))));
    }

    #[test]
    fn ordering_strings() {
        let ctx = context();
        assert!(evaluate("'09:00' <= '14:30'", &ctx).unwrap());
    }

    #[test]
    fn type_mismatch_in_ordering() {
        let ctx = context();
        assert!(matches!(
            evaluate("hour < 'nine'", &ctx),
            Err(ExprError::TypeMismatch(_))
        ));
    }
}
