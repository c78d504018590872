// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Mustache renderer, with the Handlebars block helpers layered on top.

use std::borrow::Cow;

use serde_json::Value;

use super::{display_value, escape_html, is_js_truthy, TemplateError};
use crate::expression::path::{get_path, parse_path, PathSegment};
use crate::expression::TemplateEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Dialect {
    Mustache,
    Handlebars,
}

impl Dialect {
    fn engine(self) -> TemplateEngine {
        match self {
            Self::Mustache => TemplateEngine::Mustache,
            Self::Handlebars => TemplateEngine::Handlebars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Helper {
    If,
    Unless,
    Each,
    With,
}

impl Helper {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "if" => Some(Self::If),
            "unless" => Some(Self::Unless),
            "each" => Some(Self::Each),
            "with" => Some(Self::With),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Unless => "unless",
            Self::Each => "each",
            Self::With => "with",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tag {
    Text(String),
    Variable { name: String, escape: bool },
    Open { name: String, inverted: bool },
    Helper { helper: Helper, arg: String },
    Else,
    Close(String),
    Comment,
}

impl Tag {
    /// Tags that vanish together with their line when they stand alone on it.
    fn is_block_tag(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::Helper { .. } | Self::Else | Self::Close(_) | Self::Comment
        )
    }
}

#[derive(Debug)]
enum Node {
    Text(String),
    Variable {
        name: String,
        escape: bool,
    },
    Section {
        name: String,
        inverted: bool,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Helper {
        helper: Helper,
        arg: String,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

enum Terminator {
    Close(String),
    Else,
}

pub(super) fn render(
    source: &str,
    data: &Value,
    autoescape: bool,
    dialect: Dialect,
) -> Result<String, TemplateError> {
    let mut tags = tokenize(source, dialect)?;
    strip_standalone(&mut tags);
    let nodes = parse(tags)?;

    let mut renderer = Renderer {
        dialect,
        autoescape,
        stack: vec![Frame {
            value: data,
            iteration: None,
        }],
    };
    let mut out = String::with_capacity(source.len());
    renderer.render_nodes(&nodes, &mut out);
    Ok(out)
}

fn tokenize(source: &str, dialect: Dialect) -> Result<Vec<Tag>, TemplateError> {
    let mut tags = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            tags.push(Tag::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];

        if let Some(inner) = after.strip_prefix('{') {
            let end = inner
                .find("}}}")
                .ok_or_else(|| TemplateError::new("Unclosed tag '{{{'"))?;
            tags.push(Tag::Variable {
                name: non_empty(inner[..end].trim())?,
                escape: false,
            });
            rest = &inner[end + 3..];
            continue;
        }

        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::new("Unclosed tag '{{'"))?;
        tags.push(classify(after[..end].trim(), dialect)?);
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        tags.push(Tag::Text(rest.to_string()));
    }
    Ok(tags)
}

fn non_empty(name: &str) -> Result<String, TemplateError> {
    if name.is_empty() {
        Err(TemplateError::new("Empty tag name"))
    } else {
        Ok(name.to_string())
    }
}

fn classify(content: &str, dialect: Dialect) -> Result<Tag, TemplateError> {
    let mut chars = content.chars();
    let sigil = chars.next();
    let rest = chars.as_str().trim();

    match sigil {
        Some('!') => Ok(Tag::Comment),
        Some('&') => Ok(Tag::Variable {
            name: non_empty(rest)?,
            escape: false,
        }),
        Some('#') => {
            if dialect == Dialect::Handlebars {
                if let Some((word, arg)) = rest.split_once(char::is_whitespace) {
                    if let Some(helper) = Helper::parse(word) {
                        return Ok(Tag::Helper {
                            helper,
                            arg: non_empty(arg.trim())?,
                        });
                    }
                }
            }
            Ok(Tag::Open {
                name: non_empty(rest)?,
                inverted: false,
            })
        }
        Some('^') => Ok(Tag::Open {
            name: non_empty(rest)?,
            inverted: true,
        }),
        Some('/') => Ok(Tag::Close(non_empty(rest)?)),
        Some('>') => Err(TemplateError::new("Partials are not supported")),
        Some('=') => Err(TemplateError::new("Custom delimiters are not supported")),
        _ if content == "else" && dialect == Dialect::Handlebars => Ok(Tag::Else),
        _ => Ok(Tag::Variable {
            name: non_empty(content)?,
            escape: true,
        }),
    }
}

/// Drop block tags that sit alone on a line, along with that line's
/// indentation and newline.
fn strip_standalone(tags: &mut [Tag]) {
    for i in 0..tags.len() {
        if !tags[i].is_block_tag() {
            continue;
        }

        let before_ok = match i.checked_sub(1).map(|j| &tags[j]) {
            None => true,
            Some(Tag::Text(text)) => match text.rfind('\n') {
                Some(newline) => text[newline + 1..].trim().is_empty(),
                None => i == 1 && text.trim().is_empty(),
            },
            Some(_) => false,
        };
        let after_ok = match tags.get(i + 1) {
            None => true,
            Some(Tag::Text(text)) => match text.find('\n') {
                Some(newline) => text[..newline].trim().is_empty(),
                None => i + 2 == tags.len() && text.trim().is_empty(),
            },
            Some(_) => false,
        };
        if !(before_ok && after_ok) {
            continue;
        }

        if let Some(Tag::Text(text)) = i.checked_sub(1).and_then(|j| tags.get_mut(j)) {
            let keep = text.rfind('\n').map_or(0, |newline| newline + 1);
            text.truncate(keep);
        }
        if let Some(Tag::Text(text)) = tags.get_mut(i + 1) {
            let drop = text.find('\n').map_or(text.len(), |newline| newline + 1);
            text.drain(..drop);
        }
    }
}

fn parse(tags: Vec<Tag>) -> Result<Vec<Node>, TemplateError> {
    let mut iter = tags.into_iter();
    let (nodes, terminator) = parse_block(&mut iter)?;
    match terminator {
        None => Ok(nodes),
        Some(Terminator::Close(name)) => Err(TemplateError::new(format!(
            "Unopened section '{name}'"
        ))),
        Some(Terminator::Else) => Err(TemplateError::new("'else' outside of a block")),
    }
}

fn parse_block(
    iter: &mut impl Iterator<Item = Tag>,
) -> Result<(Vec<Node>, Option<Terminator>), TemplateError> {
    let mut nodes = Vec::new();
    while let Some(tag) = iter.next() {
        match tag {
            Tag::Text(text) => {
                if !text.is_empty() {
                    nodes.push(Node::Text(text));
                }
            }
            Tag::Variable { name, escape } => nodes.push(Node::Variable { name, escape }),
            Tag::Comment => {}
            Tag::Open { name, inverted } => {
                let (body, otherwise) = parse_section(iter, &name)?;
                nodes.push(Node::Section {
                    name,
                    inverted,
                    body,
                    otherwise,
                });
            }
            Tag::Helper { helper, arg } => {
                let (body, otherwise) = parse_section(iter, helper.name())?;
                nodes.push(Node::Helper {
                    helper,
                    arg,
                    body,
                    otherwise,
                });
            }
            Tag::Else => return Ok((nodes, Some(Terminator::Else))),
            Tag::Close(name) => return Ok((nodes, Some(Terminator::Close(name)))),
        }
    }
    Ok((nodes, None))
}

fn parse_section(
    iter: &mut impl Iterator<Item = Tag>,
    expected: &str,
) -> Result<(Vec<Node>, Vec<Node>), TemplateError> {
    let unclosed = || TemplateError::new(format!("Unclosed section '{expected}'"));
    let mismatch = |found: &str| {
        TemplateError::new(format!(
            "Unexpected closing tag '{found}', expected '{expected}'"
        ))
    };

    let (body, terminator) = parse_block(iter)?;
    match terminator {
        Some(Terminator::Close(name)) if name == expected => Ok((body, Vec::new())),
        Some(Terminator::Close(name)) => Err(mismatch(&name)),
        Some(Terminator::Else) => {
            let (otherwise, terminator) = parse_block(iter)?;
            match terminator {
                Some(Terminator::Close(name)) if name == expected => Ok((body, otherwise)),
                Some(Terminator::Close(name)) => Err(mismatch(&name)),
                _ => Err(unclosed()),
            }
        }
        None => Err(unclosed()),
    }
}

#[derive(Debug, Clone)]
struct Iteration {
    index: usize,
    key: Option<String>,
    len: usize,
}

struct Frame<'a> {
    value: &'a Value,
    iteration: Option<Iteration>,
}

struct Renderer<'a> {
    dialect: Dialect,
    autoescape: bool,
    stack: Vec<Frame<'a>>,
}

/// Sections skip falsy values and empty lists.
fn is_section_truthy(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        other => is_js_truthy(other),
    }
}

impl<'a> Renderer<'a> {
    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Variable { name, escape } => {
                    if let Some(value) = self.lookup(name) {
                        let text = display_value(&value);
                        if *escape && self.autoescape {
                            out.push_str(&escape_html(self.dialect.engine(), &text));
                        } else {
                            out.push_str(&text);
                        }
                    }
                }
                Node::Section {
                    name,
                    inverted,
                    body,
                    otherwise,
                } => self.render_section(name, *inverted, body, otherwise, out),
                Node::Helper {
                    helper,
                    arg,
                    body,
                    otherwise,
                } => self.render_helper(*helper, arg, body, otherwise, out),
            }
        }
    }

    fn render_section(
        &mut self,
        name: &str,
        inverted: bool,
        body: &[Node],
        otherwise: &[Node],
        out: &mut String,
    ) {
        let value = self.lookup(name);
        let active = value.as_deref().map_or(false, is_section_truthy);

        if inverted || !active {
            let branch = if inverted != active { body } else { otherwise };
            self.render_nodes(branch, out);
            return;
        }

        match value {
            Some(Cow::Borrowed(Value::Array(items))) => {
                let len = items.len();
                for (index, item) in items.iter().enumerate() {
                    let iteration = Iteration {
                        index,
                        key: None,
                        len,
                    };
                    self.with_frame(item, Some(iteration), body, out);
                }
            }
            Some(Cow::Borrowed(item)) => self.with_frame(item, None, body, out),
            _ => self.render_nodes(body, out),
        }
    }

    fn render_helper(
        &mut self,
        helper: Helper,
        arg: &str,
        body: &[Node],
        otherwise: &[Node],
        out: &mut String,
    ) {
        let value = self.lookup(arg);
        let active = value.as_deref().map_or(false, is_section_truthy);

        match helper {
            Helper::If | Helper::Unless => {
                let take_body = active == (helper == Helper::If);
                self.render_nodes(if take_body { body } else { otherwise }, out);
            }
            Helper::With => match value {
                Some(Cow::Borrowed(item)) if active => self.with_frame(item, None, body, out),
                _ => self.render_nodes(otherwise, out),
            },
            Helper::Each => match value {
                Some(Cow::Borrowed(Value::Array(items))) if !items.is_empty() => {
                    let len = items.len();
                    for (index, item) in items.iter().enumerate() {
                        let iteration = Iteration {
                            index,
                            key: None,
                            len,
                        };
                        self.with_frame(item, Some(iteration), body, out);
                    }
                }
                Some(Cow::Borrowed(Value::Object(map))) if !map.is_empty() => {
                    let len = map.len();
                    for (index, (key, item)) in map.iter().enumerate() {
                        let iteration = Iteration {
                            index,
                            key: Some(key.clone()),
                            len,
                        };
                        self.with_frame(item, Some(iteration), body, out);
                    }
                }
                _ => self.render_nodes(otherwise, out),
            },
        }
    }

    fn with_frame(
        &mut self,
        value: &'a Value,
        iteration: Option<Iteration>,
        body: &[Node],
        out: &mut String,
    ) {
        self.stack.push(Frame { value, iteration });
        self.render_nodes(body, out);
        self.stack.pop();
    }

    fn iteration_data(&self, name: &str) -> Option<Value> {
        let iteration = self
            .stack
            .iter()
            .rev()
            .find_map(|frame| frame.iteration.as_ref())?;
        match name {
            "@index" => Some(Value::from(iteration.index)),
            "@key" => iteration.key.clone().map(Value::String),
            "@first" => Some(Value::Bool(iteration.index == 0)),
            "@last" => Some(Value::Bool(iteration.index + 1 == iteration.len)),
            _ => None,
        }
    }

    fn lookup(&self, name: &str) -> Option<Cow<'a, Value>> {
        let top: &'a Value = self.stack.last()?.value;
        if name == "." || name == "this" {
            return Some(Cow::Borrowed(top));
        }
        if self.dialect == Dialect::Handlebars && name.starts_with('@') {
            if let Some(value) = self.iteration_data(name) {
                return Some(Cow::Owned(value));
            }
        }

        if let Some(rest) = name.strip_prefix("this.") {
            let segments = parse_path(rest).ok()?;
            return get_path(top, &segments).map(Cow::Borrowed);
        }

        let segments = parse_path(name).ok()?;
        let PathSegment::Key(root) = segments.first()? else {
            return None;
        };
        for frame in self.stack.iter().rev() {
            let value: &'a Value = frame.value;
            if let Value::Object(map) = value {
                if map.contains_key(root) {
                    return get_path(value, &segments).map(Cow::Borrowed);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mustache(source: &str, data: Value) -> String {
        render(source, &data, true, Dialect::Mustache).unwrap()
    }

    fn handlebars(source: &str, data: Value) -> String {
        render(source, &data, true, Dialect::Handlebars).unwrap()
    }

    #[test]
    fn test_variables() {
        let data = json!({"@input": {"name": "Ada", "html": "<b>"}});
        assert_eq!(mustache("hello, {{ @input.name }}", data.clone()), "hello, Ada");
        assert_eq!(mustache("{{ @input.html }}", data.clone()), "&lt;b&gt;");
        assert_eq!(mustache("{{{ @input.html }}}", data.clone()), "<b>");
        assert_eq!(mustache("{{& @input.html }}", data.clone()), "<b>");
        assert_eq!(mustache("[{{ @input.missing }}]", data), "[]");
    }

    #[test]
    fn test_sections() {
        let data = json!({"items": [{"n": 1}, {"n": 2}], "empty": [], "flag": true});
        assert_eq!(mustache("{{#items}}{{n}};{{/items}}", data.clone()), "1;2;");
        assert_eq!(mustache("{{#empty}}x{{/empty}}", data.clone()), "");
        assert_eq!(mustache("{{^empty}}none{{/empty}}", data.clone()), "none");
        assert_eq!(mustache("{{#flag}}on{{/flag}}", data.clone()), "on");
        assert_eq!(mustache("{{! ignored }}ok", data), "ok");
    }

    #[test]
    fn test_implicit_iterator_and_outer_scope() {
        let data = json!({"tags": ["a", "b"], "sep": "|"});
        assert_eq!(mustache("{{#tags}}{{.}}{{sep}}{{/tags}}", data), "a|b|");
    }

    #[test]
    fn test_standalone_lines_are_removed() {
        let data = json!({"items": [1, 2]});
        let source = "start\n{{#items}}\n- {{.}}\n{{/items}}\nend";
        assert_eq!(mustache(source, data), "start\n- 1\n- 2\nend");
    }

    #[test]
    fn test_handlebars_helpers() {
        let data = json!({"user": {"name": "Ada"}, "items": ["x", "y"], "off": false});
        assert_eq!(
            handlebars("{{#if off}}yes{{else}}no{{/if}}", data.clone()),
            "no"
        );
        assert_eq!(handlebars("{{#unless off}}shown{{/unless}}", data.clone()), "shown");
        assert_eq!(
            handlebars("{{#each items}}{{@index}}={{this}}{{#unless @last}},{{/unless}}{{/each}}", data.clone()),
            "0=x,1=y"
        );
        assert_eq!(
            handlebars("{{#with user}}{{name}}{{/with}}", data.clone()),
            "Ada"
        );
        assert_eq!(
            handlebars("{{#each user}}{{@key}}:{{this}}{{/each}}", data),
            "name:Ada"
        );
    }

    #[test]
    fn test_escape_tables_by_dialect() {
        let data = json!({"v": "a/b='c'"});
        assert_eq!(mustache("{{v}}", data.clone()), "a&#x2F;b&#x3D;&#39;c&#39;");
        assert_eq!(handlebars("{{v}}", data), "a/b&#x3D;&#x27;c&#x27;");
    }

    #[test]
    fn test_malformed_templates() {
        let data = json!({});
        assert!(render("{{#a}}", &data, true, Dialect::Mustache).is_err());
        assert!(render("{{/a}}", &data, true, Dialect::Mustache).is_err());
        assert!(render("{{#a}}{{/b}}", &data, true, Dialect::Mustache).is_err());
        assert!(render("{{ unclosed", &data, true, Dialect::Mustache).is_err());
        assert!(render("{{> partial}}", &data, true, Dialect::Mustache).is_err());
    }
}
