// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Nunjucks renderer.
//!
//! Supports `{{ expr }}` output with filters, `{% if %}`/`{% elif %}`/`{% else %}`,
//! `{% for %}` loops (with `loop.*` variables and an `else` branch),
//! `{% set %}`, `{# comments #}` and `-` whitespace control.

use serde_json::{Map, Value};

use super::{display_value, escape_html, is_js_truthy, TemplateError};
use crate::expression::TemplateEngine;

// ---------------------------------------------------------------------------
// Template structure
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Chunk {
    Text(String),
    Output(String),
    Statement(String),
}

#[derive(Debug)]
enum Node {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For {
        vars: Vec<String>,
        iterable: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Set {
        name: String,
        value: Expr,
    },
}

pub(super) fn render(
    source: &str,
    data: &Value,
    autoescape: bool,
) -> Result<String, TemplateError> {
    let chunks = split_chunks(source)?;
    let mut iter = chunks.into_iter();
    let (nodes, terminator) = parse_nodes(&mut iter)?;
    if let Some((keyword, _)) = terminator {
        return Err(TemplateError::new(format!("Unexpected tag '{keyword}'")));
    }

    let mut renderer = Renderer {
        data,
        autoescape,
        scopes: vec![Map::new()],
    };
    let mut out = String::with_capacity(source.len());
    renderer.render_nodes(&nodes, &mut out)?;
    Ok(out)
}

fn split_chunks(source: &str) -> Result<Vec<Chunk>, TemplateError> {
    let mut chunks = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    loop {
        let next = ["{{", "{%", "{#"]
            .iter()
            .filter_map(|open| rest.find(open).map(|at| (at, *open)))
            .min_by_key(|(at, _)| *at);

        let Some((start, open)) = next else {
            push_text(&mut chunks, rest, trim_next, false);
            break;
        };

        let close = match open {
            "{{" => "}}",
            "{%" => "%}",
            _ => "#}",
        };
        let mut inner = &rest[start + 2..];
        let trim_before = inner.starts_with('-');
        if trim_before {
            inner = &inner[1..];
        }
        push_text(&mut chunks, &rest[..start], trim_next, trim_before);

        let end = inner
            .find(close)
            .ok_or_else(|| TemplateError::new(format!("Unclosed tag '{open}'")))?;
        let mut body = &inner[..end];
        trim_next = body.ends_with('-');
        if trim_next {
            body = &body[..body.len() - 1];
        }
        rest = &inner[end + 2..];

        match open {
            "{{" => chunks.push(Chunk::Output(body.trim().to_string())),
            "{%" => chunks.push(Chunk::Statement(body.trim().to_string())),
            _ => {}
        }
    }
    Ok(chunks)
}

fn push_text(chunks: &mut Vec<Chunk>, text: &str, trim_start: bool, trim_end: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    let text = if trim_end { text.trim_end() } else { text };
    if !text.is_empty() {
        chunks.push(Chunk::Text(text.to_string()));
    }
}

type Terminator = Option<(String, String)>;

/// Parse nodes until a statement that does not open a block of its own.
fn parse_nodes(
    iter: &mut impl Iterator<Item = Chunk>,
) -> Result<(Vec<Node>, Terminator), TemplateError> {
    let mut nodes = Vec::new();
    while let Some(chunk) = iter.next() {
        match chunk {
            Chunk::Text(text) => nodes.push(Node::Text(text)),
            Chunk::Output(source) => nodes.push(Node::Output(parse_expr(&source)?)),
            Chunk::Statement(statement) => {
                let (keyword, rest) = match statement.split_once(char::is_whitespace) {
                    Some((keyword, rest)) => (keyword.to_string(), rest.trim().to_string()),
                    None => (statement.clone(), String::new()),
                };
                match keyword.as_str() {
                    "if" => nodes.push(parse_if(iter, &rest)?),
                    "for" => nodes.push(parse_for(iter, &rest)?),
                    "set" => {
                        let (name, value) = rest.split_once('=').ok_or_else(|| {
                            TemplateError::new(format!("Expected '=' in set tag: {rest}"))
                        })?;
                        nodes.push(Node::Set {
                            name: name.trim().to_string(),
                            value: parse_expr(value)?,
                        });
                    }
                    other => return Ok((nodes, Some((other.to_string(), rest)))),
                }
            }
        }
    }
    Ok((nodes, None))
}

fn parse_if(
    iter: &mut impl Iterator<Item = Chunk>,
    condition: &str,
) -> Result<Node, TemplateError> {
    let mut branches = Vec::new();
    let mut condition = parse_expr(condition)?;
    loop {
        let (body, terminator) = parse_nodes(iter)?;
        match terminator {
            Some((keyword, rest)) if keyword == "elif" || keyword == "elseif" => {
                branches.push((condition, body));
                condition = parse_expr(&rest)?;
            }
            Some((keyword, _)) if keyword == "else" => {
                branches.push((condition, body));
                let (otherwise, terminator) = parse_nodes(iter)?;
                expect_end(terminator, "endif")?;
                return Ok(Node::If {
                    branches,
                    otherwise,
                });
            }
            terminator => {
                expect_end(terminator, "endif")?;
                branches.push((condition, body));
                return Ok(Node::If {
                    branches,
                    otherwise: Vec::new(),
                });
            }
        }
    }
}

fn parse_for(
    iter: &mut impl Iterator<Item = Chunk>,
    header: &str,
) -> Result<Node, TemplateError> {
    let (vars, iterable) = header
        .split_once(" in ")
        .ok_or_else(|| TemplateError::new(format!("Expected 'in' in for tag: {header}")))?;
    let vars: Vec<String> = vars.split(',').map(|var| var.trim().to_string()).collect();
    if vars.is_empty() || vars.len() > 2 || vars.iter().any(String::is_empty) {
        return Err(TemplateError::new(format!("Invalid loop variables: {header}")));
    }
    let iterable = parse_expr(iterable)?;

    let (body, terminator) = parse_nodes(iter)?;
    let otherwise = match terminator {
        Some((keyword, _)) if keyword == "else" => {
            let (otherwise, terminator) = parse_nodes(iter)?;
            expect_end(terminator, "endfor")?;
            otherwise
        }
        terminator => {
            expect_end(terminator, "endfor")?;
            Vec::new()
        }
    };
    Ok(Node::For {
        vars,
        iterable,
        body,
        otherwise,
    })
}

fn expect_end(terminator: Terminator, expected: &str) -> Result<(), TemplateError> {
    match terminator {
        Some((keyword, _)) if keyword == expected => Ok(()),
        Some((keyword, _)) => Err(TemplateError::new(format!(
            "Unexpected tag '{keyword}', expected '{expected}'"
        ))),
        None => Err(TemplateError::new(format!("Missing '{expected}'"))),
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "~", "(", ")", "[", "]", ".", ",",
    "|",
];

fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
        } else if c.is_alphabetic() || matches!(c, '_' | '@' | '$') {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_alphanumeric() || matches!(chars[pos], '_' | '@' | '$'))
            {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
        } else if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            let literal: String = chars[start..pos].iter().collect();
            let number = literal
                .parse::<f64>()
                .map_err(|_| TemplateError::new(format!("Invalid number: {literal}")))?;
            tokens.push(Token::Num(number));
        } else if c == '"' || c == '\'' {
            pos += 1;
            let mut text = String::new();
            loop {
                let Some(&next) = chars.get(pos) else {
                    return Err(TemplateError::new("Unterminated string literal"));
                };
                pos += 1;
                match next {
                    '\\' => {
                        let escaped = chars.get(pos).copied().unwrap_or('\\');
                        pos += 1;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                    quote if quote == c => break,
                    other => text.push(other),
                }
            }
            tokens.push(Token::Str(text));
        } else {
            let rest: String = chars[pos..chars.len().min(pos + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| TemplateError::new(format!("Unexpected character '{c}'")))?;
            pos += op.chars().count();
            tokens.push(Token::Op(*op));
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Var(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Filter {
        name: String,
        target: Box<Expr>,
        args: Vec<Expr>,
    },
}

fn parse_expr(source: &str) -> Result<Expr, TemplateError> {
    let tokens = tokenize(source)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.conditional()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(TemplateError::new(format!(
            "Unexpected token {token:?} in expression: {source}"
        ))),
    }
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(found)) if *found == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(found)) if found == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), TemplateError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(TemplateError::new(format!("Expected '{op}'")))
        }
    }

    fn conditional(&mut self) -> Result<Expr, TemplateError> {
        let then = self.or()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let condition = self.or()?;
        let otherwise = if self.eat_keyword("else") {
            Some(Box::new(self.conditional()?))
        } else {
            None
        };
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise,
        })
    }

    fn or(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, TemplateError> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.concat()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("==")) => BinOp::Eq,
                Some(Token::Op("!=")) => BinOp::Ne,
                Some(Token::Op("<")) => BinOp::Lt,
                Some(Token::Op(">")) => BinOp::Gt,
                Some(Token::Op("<=")) => BinOp::Le,
                Some(Token::Op(">=")) => BinOp::Ge,
                Some(Token::Ident(word)) if word == "in" => BinOp::In,
                Some(Token::Ident(word)) if word == "not" => BinOp::NotIn,
                _ => return Ok(left),
            };
            if op == BinOp::NotIn {
                let followed_by_in =
                    matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(next)) if next == "in");
                if !followed_by_in {
                    return Ok(left);
                }
                self.pos += 1;
            }
            self.pos += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.concat()?));
        }
    }

    fn concat(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.additive()?;
        while self.eat_op("~") {
            left = Expr::Binary(BinOp::Concat, Box::new(left), Box::new(self.additive()?));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Rem
            } else {
                return Ok(left);
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Expr, TemplateError> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_op(".") {
                match self.advance() {
                    Some(Token::Ident(name)) => expr = Expr::Attr(Box::new(expr), name),
                    Some(Token::Num(index)) if index.fract() == 0.0 => {
                        expr = Expr::Index(Box::new(expr), Box::new(Expr::Literal(number(index))))
                    }
                    _ => return Err(TemplateError::new("Expected attribute name after '.'")),
                }
            } else if self.eat_op("[") {
                let index = self.conditional()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_op("|") {
                let Some(Token::Ident(name)) = self.advance() else {
                    return Err(TemplateError::new("Expected filter name after '|'"));
                };
                let mut args = Vec::new();
                if self.eat_op("(") {
                    args = self.arguments(")")?;
                }
                expr = Expr::Filter {
                    name,
                    target: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self, close: &str) -> Result<Vec<Expr>, TemplateError> {
        let mut args = Vec::new();
        if self.eat_op(close) {
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            if self.eat_op(close) {
                return Ok(args);
            }
            self.expect_op(",")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, TemplateError> {
        match self.advance() {
            Some(Token::Num(value)) => Ok(Expr::Literal(number(value))),
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" | "True" => Expr::Literal(Value::Bool(true)),
                "false" | "False" => Expr::Literal(Value::Bool(false)),
                "none" | "None" | "null" => Expr::Literal(Value::Null),
                _ => Expr::Var(name),
            }),
            Some(Token::Op("(")) => {
                let expr = self.conditional()?;
                self.expect_op(")")?;
                Ok(expr)
            }
            Some(Token::Op("[")) => Ok(Expr::List(self.arguments("]")?)),
            Some(token) => Err(TemplateError::new(format!("Unexpected token {token:?}"))),
            None => Err(TemplateError::new("Unexpected end of expression")),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// JSON has no non-finite numbers; those become the strings JavaScript prints.
fn number(value: f64) -> Value {
    if value.is_nan() {
        Value::String("NaN".to_string())
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        Value::String(text.to_string())
    } else if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(num) => num.as_f64().unwrap_or(f64::NAN),
        Value::String(text) if text.trim().is_empty() => 0.0,
        Value::String(text) => parse_number(text.trim()),
        Value::Bool(flag) => f64::from(u8::from(*flag)),
        Value::Null => 0.0,
        _ => f64::NAN,
    }
}

fn parse_number(text: &str) -> f64 {
    match text {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust also accepts `inf` and `nan`, which JavaScript does not.
        _ if text.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) => f64::NAN,
        _ => text.parse().unwrap_or(f64::NAN),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), Value::Number(_))
        | (Value::Number(_), Value::Bool(_)) => to_number(left) == to_number(right),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => to_number(left).partial_cmp(&to_number(right)),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::String(text) => text.contains(&display_value(needle)),
        Value::Object(map) => map.contains_key(&display_value(needle)),
        _ => false,
    }
}

fn attribute(target: &Value, name: &str) -> Value {
    match target {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(items) if name == "length" => Value::from(items.len()),
        Value::Array(items) => name
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index).cloned())
            .unwrap_or(Value::Null),
        Value::String(text) if name == "length" => Value::from(text.chars().count()),
        _ => Value::Null,
    }
}

/// An evaluated expression; `safe` output skips autoescaping.
struct Evaluated {
    value: Value,
    safe: bool,
}

impl From<Value> for Evaluated {
    fn from(value: Value) -> Self {
        Self { value, safe: false }
    }
}

struct Renderer<'a> {
    data: &'a Value,
    autoescape: bool,
    scopes: Vec<Map<String, Value>>,
}

impl Renderer<'_> {
    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => {
                    let evaluated = self.eval(expr)?;
                    let text = display_value(&evaluated.value);
                    if self.autoescape && !evaluated.safe {
                        out.push_str(&escape_html(TemplateEngine::Nunjucks, &text));
                    } else {
                        out.push_str(&text);
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    for (condition, body) in branches {
                        if is_js_truthy(&self.eval(condition)?.value) {
                            taken = Some(body);
                            break;
                        }
                    }
                    self.render_nodes(taken.unwrap_or(otherwise), out)?;
                }
                Node::For {
                    vars,
                    iterable,
                    body,
                    otherwise,
                } => self.render_for(vars, iterable, body, otherwise, out)?,
                Node::Set { name, value } => {
                    let value = self.eval(value)?.value;
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.insert(name.clone(), value);
                    }
                }
            }
        }
        Ok(())
    }

    fn render_for(
        &mut self,
        vars: &[String],
        iterable: &Expr,
        body: &[Node],
        otherwise: &[Node],
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let entries: Vec<Vec<Value>> = match self.eval(iterable)?.value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match (vars.len(), item) {
                    (2, Value::Array(pair)) => pair,
                    (_, item) => vec![item],
                })
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| vec![Value::String(key), value])
                .collect(),
            _ => Vec::new(),
        };

        if entries.is_empty() {
            return self.render_nodes(otherwise, out);
        }

        let length = entries.len();
        for (index, entry) in entries.into_iter().enumerate() {
            let mut scope = Map::new();
            for (var, value) in vars.iter().zip(entry) {
                scope.insert(var.clone(), value);
            }
            scope.insert(
                "loop".to_string(),
                serde_json::json!({
                    "index": index + 1,
                    "index0": index,
                    "revindex": length - index,
                    "revindex0": length - index - 1,
                    "first": index == 0,
                    "last": index + 1 == length,
                    "length": length,
                }),
            );
            self.scopes.push(scope);
            let result = self.render_nodes(body, out);
            self.scopes.pop();
            result?;
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.data.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn eval(&self, expr: &Expr) -> Result<Evaluated, TemplateError> {
        Ok(match expr {
            Expr::Literal(value) => value.clone().into(),
            Expr::Var(name) => self.resolve(name).into(),
            Expr::Attr(target, name) => attribute(&self.eval(target)?.value, name).into(),
            Expr::Index(target, index) => {
                let target = self.eval(target)?.value;
                let index = self.eval(index)?.value;
                let key = match &index {
                    Value::String(key) => key.clone(),
                    other => display_value(other),
                };
                attribute(&target, &key).into()
            }
            Expr::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item).map(|evaluated| evaluated.value))
                    .collect::<Result<_, _>>()?,
            )
            .into(),
            Expr::Not(inner) => Value::Bool(!is_js_truthy(&self.eval(inner)?.value)).into(),
            Expr::Neg(inner) => number(-to_number(&self.eval(inner)?.value)).into(),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if is_js_truthy(&self.eval(condition)?.value) {
                    self.eval(then)?
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise)?
                } else {
                    Value::Null.into()
                }
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if is_js_truthy(&left.value) {
                    self.eval(right)?
                } else {
                    left
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if is_js_truthy(&left.value) {
                    left
                } else {
                    self.eval(right)?
                }
            }
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right)?,
            Expr::Filter { name, target, args } => {
                let target = self.eval(target)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg).map(|evaluated| evaluated.value))
                    .collect::<Result<Vec<_>, _>>()?;
                apply_filter(name, target, &args)?
            }
        })
    }

    fn eval_binary(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Evaluated, TemplateError> {
        let left = self.eval(left)?.value;
        let right = self.eval(right)?.value;
        let value = match op {
            BinOp::Eq => Value::Bool(loose_eq(&left, &right)),
            BinOp::Ne => Value::Bool(!loose_eq(&left, &right)),
            BinOp::Lt => Value::Bool(compare(&left, &right).map_or(false, |o| o.is_lt())),
            BinOp::Gt => Value::Bool(compare(&left, &right).map_or(false, |o| o.is_gt())),
            BinOp::Le => Value::Bool(compare(&left, &right).map_or(false, |o| o.is_le())),
            BinOp::Ge => Value::Bool(compare(&left, &right).map_or(false, |o| o.is_ge())),
            BinOp::In => Value::Bool(contains(&right, &left)),
            BinOp::NotIn => Value::Bool(!contains(&right, &left)),
            BinOp::Concat => Value::String(display_value(&left) + &display_value(&right)),
            BinOp::Add => match (&left, &right) {
                (Value::String(_), _) | (_, Value::String(_)) => {
                    Value::String(display_value(&left) + &display_value(&right))
                }
                _ => number(to_number(&left) + to_number(&right)),
            },
            BinOp::Sub => number(to_number(&left) - to_number(&right)),
            BinOp::Mul => number(to_number(&left) * to_number(&right)),
            BinOp::Div => number(to_number(&left) / to_number(&right)),
            BinOp::Rem => number(to_number(&left) % to_number(&right)),
        };
        Ok(value.into())
    }
}

fn apply_filter(name: &str, target: Evaluated, args: &[Value]) -> Result<Evaluated, TemplateError> {
    let value = target.value;
    let text = || display_value(&value);
    let arg = |index: usize| args.get(index).cloned().unwrap_or(Value::Null);

    let result = match name {
        "safe" => {
            return Ok(Evaluated { value, safe: true });
        }
        "escape" | "e" => {
            if target.safe {
                return Ok(Evaluated { value, safe: true });
            }
            let escaped = escape_html(TemplateEngine::Nunjucks, &text());
            return Ok(Evaluated {
                value: Value::String(escaped),
                safe: true,
            });
        }
        "upper" => Value::String(text().to_uppercase()),
        "lower" => Value::String(text().to_lowercase()),
        "trim" => Value::String(text().trim().to_string()),
        "capitalize" => {
            let lowered = text().to_lowercase();
            let mut chars = lowered.chars();
            Value::String(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            })
        }
        "title" => Value::String(
            text()
                .split(' ')
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first
                            .to_uppercase()
                            .chain(chars.as_str().to_lowercase().chars())
                            .collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<String>>()
                .join(" "),
        ),
        "length" => Value::from(match &value {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            Value::String(text) => text.chars().count(),
            _ => 0,
        }),
        "default" | "d" => {
            let use_default = if is_js_truthy(&arg(1)) {
                !is_js_truthy(&value)
            } else {
                value.is_null()
            };
            if use_default {
                arg(0)
            } else {
                return Ok(Evaluated {
                    value,
                    safe: target.safe,
                });
            }
        }
        "join" => {
            let separator = match arg(0) {
                Value::Null => String::new(),
                other => display_value(&other),
            };
            match &value {
                Value::Array(items) => Value::String(
                    items
                        .iter()
                        .map(display_value)
                        .collect::<Vec<_>>()
                        .join(&separator),
                ),
                _ => Value::String(text()),
            }
        }
        "first" => match &value {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            Value::String(text) => text
                .chars()
                .next()
                .map_or(Value::Null, |c| Value::String(c.to_string())),
            _ => Value::Null,
        },
        "last" => match &value {
            Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
            Value::String(text) => text
                .chars()
                .last()
                .map_or(Value::Null, |c| Value::String(c.to_string())),
            _ => Value::Null,
        },
        "reverse" => match &value {
            Value::Array(items) => Value::Array(items.iter().rev().cloned().collect()),
            _ => Value::String(text().chars().rev().collect()),
        },
        "dump" => {
            let dumped = if arg(0).is_null() {
                serde_json::to_string(&value)
            } else {
                serde_json::to_string_pretty(&value)
            };
            Value::String(dumped.map_err(|err| TemplateError::new(err.to_string()))?)
        }
        "int" => {
            let parsed = to_number(&value);
            if !parsed.is_finite() {
                match arg(0) {
                    Value::Null => Value::from(0),
                    fallback => fallback,
                }
            } else {
                Value::from(parsed.trunc() as i64)
            }
        }
        "float" => {
            let parsed = to_number(&value);
            if parsed.is_nan() {
                match arg(0) {
                    Value::Null => Value::from(0.0),
                    fallback => fallback,
                }
            } else {
                number(parsed)
            }
        }
        "abs" => number(to_number(&value).abs()),
        "round" => {
            let precision = to_number(&arg(0));
            let factor = 10f64.powi(if precision.is_nan() { 0 } else { precision as i32 });
            number((to_number(&value) * factor).round() / factor)
        }
        "string" => Value::String(text()),
        "replace" => {
            let from = display_value(&arg(0));
            let to = display_value(&arg(1));
            Value::String(text().replace(&from, &to))
        }
        _ => return Err(TemplateError::new(format!("Unknown filter: {name}"))),
    };
    Ok(result.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nunjucks(source: &str, data: Value) -> String {
        render(source, &data, true).unwrap()
    }

    #[test]
    fn test_output_and_filters() {
        let data = json!({"@input": {"name": "ada lovelace", "tags": ["a", "b"]}});
        assert_eq!(nunjucks("{{ @input.name | upper }}", data.clone()), "ADA LOVELACE");
        assert_eq!(nunjucks("{{ @input.name | title }}", data.clone()), "Ada Lovelace");
        assert_eq!(nunjucks("{{ @input.tags | join(', ') }}", data.clone()), "a, b");
        assert_eq!(nunjucks("{{ @input.tags | length }}", data.clone()), "2");
        assert_eq!(
            nunjucks("{{ @input.missing | default('none') }}", data.clone()),
            "none"
        );
        assert_eq!(nunjucks("{{ @input.tags | dump | safe }}", data), r#"["a","b"]"#);
    }

    #[test]
    fn test_escaping_and_safe() {
        let data = json!({"html": "<i>'x'</i>"});
        assert_eq!(nunjucks("{{ html }}", data.clone()), "&lt;i&gt;&#39;x&#39;&lt;/i&gt;");
        assert_eq!(nunjucks("{{ html | safe }}", data.clone()), "<i>'x'</i>");
        assert_eq!(render("{{ html }}", &data, false).unwrap(), "<i>'x'</i>");
    }

    #[test]
    fn test_if_elif_else() {
        let source = "{% if n > 10 %}big{% elif n > 1 %}medium{% else %}small{% endif %}";
        assert_eq!(nunjucks(source, json!({"n": 20})), "big");
        assert_eq!(nunjucks(source, json!({"n": 5})), "medium");
        assert_eq!(nunjucks(source, json!({"n": 0})), "small");
        assert_eq!(
            nunjucks("{% if a and not b %}yes{% endif %}", json!({"a": true, "b": false})),
            "yes"
        );
        assert_eq!(nunjucks("{% if 'x' in items %}in{% endif %}", json!({"items": ["x"]})), "in");
    }

    #[test]
    fn test_for_loops() {
        let data = json!({"items": ["a", "b", "c"], "user": {"name": "Ada"}});
        assert_eq!(
            nunjucks("{% for x in items %}{{ loop.index }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}", data.clone()),
            "1a,2b,3c"
        );
        assert_eq!(
            nunjucks("{% for k, v in user %}{{ k }}={{ v }}{% endfor %}", data.clone()),
            "name=Ada"
        );
        assert_eq!(
            nunjucks("{% for x in missing %}x{% else %}empty{% endfor %}", data),
            "empty"
        );
    }

    #[test]
    fn test_set_comments_and_whitespace_control() {
        let source = "{# note #}{% set greeting = 'hi ' ~ name %}\n  {{- greeting -}}  \n!";
        assert_eq!(nunjucks(source, json!({"name": "Ada"})), "hi Ada!");
    }

    #[test]
    fn test_arithmetic_and_inline_if() {
        assert_eq!(nunjucks("{{ 1 + 2 * 3 }}", json!({})), "7");
        assert_eq!(nunjucks("{{ 7 / 2 }}", json!({})), "3.5");
        assert_eq!(nunjucks("{{ 'on' if flag else 'off' }}", json!({"flag": false})), "off");
        assert_eq!(nunjucks("{{ items[1] }}", json!({"items": [1, 2]})), "2");
    }

    #[test]
    fn test_non_finite_arithmetic_prints_like_javascript() {
        assert_eq!(nunjucks("{{ 1 / 0 }}", json!({})), "Infinity");
        assert_eq!(nunjucks("{{ -1 / 0 }}", json!({})), "-Infinity");
        assert_eq!(nunjucks("{{ 3 % 0 }}", json!({})), "NaN");
        assert_eq!(nunjucks("{{ 'a' * 2 }}", json!({})), "NaN");
        assert_eq!(nunjucks("{% if 1 / 0 > 5 %}big{% endif %}", json!({})), "big");
        assert_eq!(nunjucks("{{ (1 / 0) | int(7) }}", json!({})), "7");
    }

    #[test]
    fn test_malformed_templates() {
        let data = json!({});
        assert!(render("{% if x %}open", &data, true).is_err());
        assert!(render("{% endfor %}", &data, true).is_err());
        assert!(render("{{ x | nosuchfilter }}", &data, true).is_err());
        assert!(render("{{ 'unterminated }}", &data, true).is_err());
        assert!(render("{{ x", &data, true).is_err());
    }
}
