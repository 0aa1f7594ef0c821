//! Restricted expression language for transitions, eval nodes and templates
//!
//! Dynamic behavior in workflows (conditional/switch/function transitions,
//! `eval` nodes, automation `custom` conditions, `${...}` prompt templates) is
//! evaluated by this module. It is a deliberately small language — dotted
//! paths, literals, comparisons and boolean operators — with no host access:
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := cmp ("&&" cmp)*
//! cmp     := unary (("==" | "!=" | "<=" | ">=" | "<" | ">") unary)?
//! unary   := "!" unary | primary
//! primary := literal | path | object | "(" expr ")"
//! path    := ident ("." ident)*
//! literal := string | number | "true" | "false" | "null"
//! object  := "{" (key ":" expr ("," key ":" expr)*)? "}"
//! ```
//!
//! Object literals exist for `eval` nodes, whose result must be an object
//! merged into the execution context.
//!
//! Evaluation is total: unresolvable paths yield `null`, and comparisons on
//! mismatched types yield `false`. Truthiness follows JavaScript coercion
//! (`null`, `false`, `0`, `NaN` and `""` are falsy; arrays and objects are
//! truthy).
//!
//! ```rust
//! use foundry_graph::expr::Expr;
//! use serde_json::json;
//!
//! let expr = Expr::parse("context.branch == 'A' && context.count > 1").unwrap();
//! let root = json!({"context": {"branch": "A", "count": 2}});
//! assert_eq!(expr.eval(&root), json!(true));
//! ```

use crate::error::{GraphError, Result};
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::OnceLock;

/// Comparison and boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Object(Vec<(String, Expr)>),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    Op(BinOp),
    Bang,
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\n' | '\r' => {
                    self.chars.next();
                }
                '(' => {
                    self.chars.next();
                    tokens.push(Token::LParen);
                }
                ')' => {
                    self.chars.next();
                    tokens.push(Token::RParen);
                }
                '{' => {
                    self.chars.next();
                    tokens.push(Token::LBrace);
                }
                '}' => {
                    self.chars.next();
                    tokens.push(Token::RBrace);
                }
                ',' => {
                    self.chars.next();
                    tokens.push(Token::Comma);
                }
                ':' => {
                    self.chars.next();
                    tokens.push(Token::Colon);
                }
                '.' => {
                    self.chars.next();
                    tokens.push(Token::Dot);
                }
                '\'' | '"' => tokens.push(self.string(c)?),
                '0'..='9' => tokens.push(self.number()?),
                '=' => {
                    self.chars.next();
                    self.expect('=')?;
                    tokens.push(Token::Op(BinOp::Eq));
                }
                '!' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::Op(BinOp::Ne));
                    } else {
                        tokens.push(Token::Bang);
                    }
                }
                '<' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::Op(BinOp::Le));
                    } else {
                        tokens.push(Token::Op(BinOp::Lt));
                    }
                }
                '>' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::Op(BinOp::Ge));
                    } else {
                        tokens.push(Token::Op(BinOp::Gt));
                    }
                }
                '&' => {
                    self.chars.next();
                    self.expect('&')?;
                    tokens.push(Token::Op(BinOp::And));
                }
                '|' => {
                    self.chars.next();
                    self.expect('|')?;
                    tokens.push(Token::Op(BinOp::Or));
                }
                c if c.is_alphabetic() || c == '_' || c == '$' => tokens.push(self.ident()),
                other => {
                    return Err(GraphError::ExprParse(format!(
                        "unexpected character '{other}'"
                    )))
                }
            }
        }
        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.chars.next() {
            Some(c) if c == expected => Ok(()),
            other => Err(GraphError::ExprParse(format!(
                "expected '{expected}', found {other:?}"
            ))),
        }
    }

    fn string(&mut self, quote: char) -> Result<Token> {
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote => return Ok(Token::Str(out)),
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(GraphError::ExprParse("unterminated escape".into())),
                },
                Some(c) => out.push(c),
                None => return Err(GraphError::ExprParse("unterminated string".into())),
            }
        }
    }

    fn number(&mut self) -> Result<Token> {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                out.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        out.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| GraphError::ExprParse(format!("invalid number '{out}'")))
    }

    fn ident(&mut self) -> Token {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' || c == '-' {
                out.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match out.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Ident(out),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Token::Op(BinOp::Or) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Expr::binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        while *self.peek() == Token::Op(BinOp::And) {
            self.next();
            let rhs = self.parse_cmp()?;
            lhs = Expr::binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let lhs = self.parse_unary()?;
        if let Token::Op(op @ (BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)) =
            *self.peek()
        {
            self.next();
            let rhs = self.parse_unary()?;
            return Ok(Expr::binary(op, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if *self.peek() == Token::Bang {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Number(n) => Ok(Expr::Literal(number_value(n))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Token::RParen => Ok(inner),
                    other => Err(GraphError::ExprParse(format!(
                        "expected ')', found {other:?}"
                    ))),
                }
            }
            Token::LBrace => self.parse_object(),
            Token::Ident(first) => {
                let mut segments = vec![first];
                while *self.peek() == Token::Dot {
                    self.next();
                    match self.next() {
                        Token::Ident(seg) => segments.push(seg),
                        other => {
                            return Err(GraphError::ExprParse(format!(
                                "expected identifier after '.', found {other:?}"
                            )))
                        }
                    }
                }
                Ok(Expr::Path(segments))
            }
            other => Err(GraphError::ExprParse(format!(
                "unexpected token {other:?}"
            ))),
        }
    }

    /// `{` already consumed.
    fn parse_object(&mut self) -> Result<Expr> {
        let mut fields = Vec::new();
        if *self.peek() == Token::RBrace {
            self.next();
            return Ok(Expr::Object(fields));
        }
        loop {
            let key = match self.next() {
                Token::Ident(k) => k,
                Token::Str(k) => k,
                other => {
                    return Err(GraphError::ExprParse(format!(
                        "expected object key, found {other:?}"
                    )))
                }
            };
            match self.next() {
                Token::Colon => {}
                other => {
                    return Err(GraphError::ExprParse(format!(
                        "expected ':' after key '{key}', found {other:?}"
                    )))
                }
            }
            let value = self.parse_expr()?;
            fields.push((key, value));
            match self.next() {
                Token::Comma => continue,
                Token::RBrace => return Ok(Expr::Object(fields)),
                other => {
                    return Err(GraphError::ExprParse(format!(
                        "expected ',' or '}}', found {other:?}"
                    )))
                }
            }
        }
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl Expr {
    /// Parse an expression source string.
    pub fn parse(src: &str) -> Result<Expr> {
        let tokens = Lexer::new(src).tokenize()?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr()?;
        match parser.peek() {
            Token::Eof => Ok(expr),
            other => Err(GraphError::ExprParse(format!(
                "trailing input at {other:?}"
            ))),
        }
    }

    /// Evaluate against a root object. Total: missing paths yield `null`.
    pub fn eval(&self, root: &Value) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Path(segments) => lookup_segments(root, segments).cloned().unwrap_or(Value::Null),
            Expr::Object(fields) => {
                let mut map = serde_json::Map::new();
                for (key, expr) in fields {
                    map.insert(key.clone(), expr.eval(root));
                }
                Value::Object(map)
            }
            Expr::Not(inner) => Value::Bool(!truthy(&inner.eval(root))),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(root);
                match op {
                    BinOp::And => {
                        if !truthy(&l) {
                            return Value::Bool(false);
                        }
                        Value::Bool(truthy(&rhs.eval(root)))
                    }
                    BinOp::Or => {
                        if truthy(&l) {
                            return Value::Bool(true);
                        }
                        Value::Bool(truthy(&rhs.eval(root)))
                    }
                    BinOp::Eq => Value::Bool(loose_eq(&l, &rhs.eval(root))),
                    BinOp::Ne => Value::Bool(!loose_eq(&l, &rhs.eval(root))),
                    BinOp::Lt => Value::Bool(ordering(&l, &rhs.eval(root)).is_some_and(|o| o.is_lt())),
                    BinOp::Le => Value::Bool(ordering(&l, &rhs.eval(root)).is_some_and(|o| o.is_le())),
                    BinOp::Gt => Value::Bool(ordering(&l, &rhs.eval(root)).is_some_and(|o| o.is_gt())),
                    BinOp::Ge => Value::Bool(ordering(&l, &rhs.eval(root)).is_some_and(|o| o.is_ge())),
                }
            }
        }
    }
}

/// JavaScript-style truthiness coercion.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn lookup_segments<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for seg in segments {
        current = current.get(seg)?;
    }
    Some(current)
}

/// Resolve a dotted key path against a JSON value.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    lookup_segments(root, &segments)
}

/// Render a value for `switch` matching and template interpolation:
/// strings as-is, everything else as compact JSON.
pub fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn template_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("template regex"))
}

/// Substitute `${dotted.path}` placeholders from a context object.
///
/// An unresolvable placeholder is an error (the caller surfaces it as a
/// template failure on the node).
pub fn render_template(template: &str, context: &Value) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in template_re().captures_iter(template) {
        let whole = caps.get(0).expect("capture 0");
        let path = caps.get(1).expect("capture 1").as_str().trim();
        out.push_str(&template[last..whole.start()]);
        match lookup_path(context, path) {
            Some(v) => out.push_str(&stringify(v)),
            None => return Err(GraphError::Template(path.to_string())),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literals_and_paths() {
        let root = json!({"a": {"b": 3}});
        assert_eq!(Expr::parse("42").unwrap().eval(&root), json!(42));
        assert_eq!(Expr::parse("'hi'").unwrap().eval(&root), json!("hi"));
        assert_eq!(Expr::parse("a.b").unwrap().eval(&root), json!(3));
        assert_eq!(Expr::parse("a.missing").unwrap().eval(&root), Value::Null);
    }

    #[test]
    fn test_comparisons() {
        let root = json!({"n": 5, "s": "x"});
        assert_eq!(Expr::parse("n > 4").unwrap().eval(&root), json!(true));
        assert_eq!(Expr::parse("n <= 4").unwrap().eval(&root), json!(false));
        assert_eq!(Expr::parse("s == 'x'").unwrap().eval(&root), json!(true));
        assert_eq!(Expr::parse("s != \"x\"").unwrap().eval(&root), json!(false));
        // mismatched types never order
        assert_eq!(Expr::parse("s > 3").unwrap().eval(&root), json!(false));
    }

    #[test]
    fn test_boolean_ops_and_precedence() {
        let root = json!({"a": 1, "b": 0});
        assert_eq!(
            Expr::parse("a == 1 && b == 0 || false").unwrap().eval(&root),
            json!(true)
        );
        assert_eq!(Expr::parse("!b").unwrap().eval(&root), json!(true));
        assert_eq!(Expr::parse("!(a == 1)").unwrap().eval(&root), json!(false));
    }

    #[test]
    fn test_short_circuit() {
        // rhs path would be null; && short-circuits before coercing it
        let root = json!({});
        assert_eq!(
            Expr::parse("false && missing.path").unwrap().eval(&root),
            json!(false)
        );
        assert_eq!(
            Expr::parse("true || missing.path").unwrap().eval(&root),
            json!(true)
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(false)));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!({})));
        assert!(truthy(&json!("0")));
    }

    #[test]
    fn test_object_literals() {
        let root = json!({"issue": {"number": 7}});
        assert_eq!(
            Expr::parse("{branch: 'A', n: issue.number}")
                .unwrap()
                .eval(&root),
            json!({"branch": "A", "n": 7})
        );
        assert_eq!(Expr::parse("{}").unwrap().eval(&root), json!({}));
        assert_eq!(
            Expr::parse("{'quoted key': true}").unwrap().eval(&root),
            json!({"quoted key": true})
        );
        assert!(Expr::parse("{broken").is_err());
        assert!(Expr::parse("{a 1}").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expr::parse("a ==").is_err());
        assert!(Expr::parse("(a").is_err());
        assert!(Expr::parse("a @ b").is_err());
        assert!(Expr::parse("'unterminated").is_err());
    }

    #[test]
    fn test_render_template() {
        let ctx = json!({"prompt": "hi", "issue": {"number": 7}});
        assert_eq!(render_template("say ${prompt}", &ctx).unwrap(), "say hi");
        assert_eq!(
            render_template("#${issue.number}!", &ctx).unwrap(),
            "#7!"
        );
        assert!(matches!(
            render_template("${missing}", &ctx),
            Err(GraphError::Template(v)) if v == "missing"
        ));
    }

    #[test]
    fn test_stringify_for_switch() {
        assert_eq!(stringify(&json!("a")), "a");
        assert_eq!(stringify(&json!(3)), "3");
        assert_eq!(stringify(&json!(true)), "true");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // The parser is total: any input yields Ok or Err, never a panic,
            // and parsed expressions evaluate without panicking.
            #[test]
            fn parse_and_eval_never_panic(src in ".{0,64}") {
                if let Ok(expr) = Expr::parse(&src) {
                    let _ = expr.eval(&json!({"context": {"a": 1}}));
                }
            }

            // Parsing a rendered literal gives back the literal. The
            // language has no unary minus, so only non-negative literals.
            #[test]
            fn number_literals_round_trip(n in 0i64..1_000_000) {
                let expr = Expr::parse(&n.to_string()).unwrap();
                prop_assert_eq!(expr.eval(&json!({})), json!(n));
            }

            // Dotted paths resolve whatever the context holds.
            #[test]
            fn paths_resolve_context_values(value in "[a-zA-Z0-9 ]{0,16}") {
                let root = json!({"context": {"field": value.clone()}});
                let expr = Expr::parse("context.field").unwrap();
                prop_assert_eq!(expr.eval(&root), json!(value));
            }
        }
    }
}
