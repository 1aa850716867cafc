//! Command script template engine.
//!
//! Templates turn a model object into a CLI command script (and into delete
//! scripts). The output is compared byte-for-byte against device grammar in
//! tests, so rendering is whitespace-exact: every byte outside a tag is
//! emitted verbatim and tags themselves contribute nothing.
//!
//! Supported syntax:
//!
//! - `{$var}` and `{$var.field}` — variable substitution; an undefined
//!   variable renders as empty, never as an error (templates rely on this to
//!   omit whole lines behind `if`/`onEmpty` guards).
//! - `{% if ($var) %}...{% else %}...{% endif %}` — truthiness test, with
//!   `!$var` negation and `$var == literal` comparison forms.
//! - `{% loop in $list as $item %}...{% divider %}...{% onEmpty %}...{% endloop %}`
//!   — the divider is inserted between iterations only; the `onEmpty` body is
//!   used when the list is absent or empty.
//!
//! A [`Switch`] binding carries the three-valued set/clear/leave-alone
//! semantics device commands need: `Set` compares equal to `true`, `Cleared`
//! compares equal to `false`, and `Unchanged` matches neither branch.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::TranslateError;
use crate::model::{FieldValue, ModelObject};

/// Three-valued command chunk selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Switch {
    /// Emit the "set" form of the command.
    Set,
    /// Emit the "unset"/"no" form of the command.
    Cleared,
    /// Emit neither form; the device value is left as-is.
    Unchanged,
}

/// A value bound to a template variable.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Switch(Switch),
    List(Vec<TemplateValue>),
    Object(BTreeMap<String, TemplateValue>),
}

impl TemplateValue {
    fn scalar_text(&self) -> String {
        match self {
            TemplateValue::Str(s) => s.clone(),
            TemplateValue::Int(v) => v.to_string(),
            TemplateValue::Bool(v) => v.to_string(),
            TemplateValue::Switch(Switch::Set) => "true".to_string(),
            TemplateValue::Switch(Switch::Cleared) => "false".to_string(),
            // Containers and an unchanged switch have no scalar form.
            TemplateValue::Switch(Switch::Unchanged) => String::new(),
            TemplateValue::List(_) | TemplateValue::Object(_) => String::new(),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            TemplateValue::Str(s) => !s.is_empty(),
            TemplateValue::Int(_) => true,
            TemplateValue::Bool(v) => *v,
            TemplateValue::Switch(s) => *s == Switch::Set,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Object(_) => true,
        }
    }

    fn equals_literal(&self, literal: &str) -> bool {
        match self {
            // Unchanged deliberately matches no literal, so a template with a
            // `== true` block and a `== false` block emits neither.
            TemplateValue::Switch(Switch::Unchanged) => false,
            other => other.scalar_text() == literal,
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(v: &str) -> Self {
        TemplateValue::Str(v.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(v: String) -> Self {
        TemplateValue::Str(v)
    }
}

impl From<i64> for TemplateValue {
    fn from(v: i64) -> Self {
        TemplateValue::Int(v)
    }
}

impl From<u16> for TemplateValue {
    fn from(v: u16) -> Self {
        TemplateValue::Int(i64::from(v))
    }
}

impl From<bool> for TemplateValue {
    fn from(v: bool) -> Self {
        TemplateValue::Bool(v)
    }
}

impl From<Switch> for TemplateValue {
    fn from(v: Switch) -> Self {
        TemplateValue::Switch(v)
    }
}

impl<T: Into<TemplateValue>> From<Vec<T>> for TemplateValue {
    fn from(v: Vec<T>) -> Self {
        TemplateValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<&FieldValue> for TemplateValue {
    fn from(v: &FieldValue) -> Self {
        match v {
            FieldValue::Str(s) => TemplateValue::Str(s.clone()),
            FieldValue::Int(i) => TemplateValue::Int(*i),
            FieldValue::Bool(b) => TemplateValue::Bool(*b),
            FieldValue::List(items) => {
                TemplateValue::List(items.iter().map(TemplateValue::from).collect())
            }
            FieldValue::Object(fields) => TemplateValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), TemplateValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Variable bindings for one template expansion.
///
/// Created fresh per render call and discarded afterwards.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    vars: BTreeMap<String, TemplateValue>,
}

impl RenderContext {
    pub fn new() -> Self {
        RenderContext::default()
    }

    /// Binds every field of a model object under its field name.
    pub fn from_model(model: &ModelObject) -> Self {
        let mut ctx = RenderContext::new();
        for (name, value) in model.fields() {
            ctx.vars.insert(name.to_string(), TemplateValue::from(value));
        }
        ctx
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.vars.get(name)
    }
}

/// Renders `template` with `ctx` in one call.
pub fn render(template: &str, ctx: &RenderContext) -> Result<String, TranslateError> {
    Ok(Template::parse(template)?.render(ctx))
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Var(Vec<String>),
    If {
        cond: Condition,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    Loop {
        list: Vec<String>,
        binding: String,
        body: Vec<Node>,
        divider: Vec<Node>,
        on_empty: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
struct Condition {
    negated: bool,
    var: Vec<String>,
    compare: Option<String>,
}

/// A parsed, reusable command template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

static VAR_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(?:\.[A-Za-z_][A-Za-z0-9_-]*)*$")
        .expect("invalid VAR_PATH regex")
});

static IF_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^if\s*\(\s*(!)?\s*\$([A-Za-z0-9_.-]+)\s*(?:==\s*(?:"([^"]*)"|(\S+)))?\s*\)$"#)
        .expect("invalid IF_TAG regex")
});

static LOOP_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^loop\s+in\s+\$([A-Za-z0-9_.-]+)\s+as\s+\$([A-Za-z_][A-Za-z0-9_]*)$")
        .expect("invalid LOOP_TAG regex")
});

#[derive(Debug, Clone)]
enum Token {
    Text(String),
    Var(String),
    Tag(String),
}

fn lex(template: &str) -> Result<Vec<Token>, TranslateError> {
    let mut tokens = Vec::new();
    let mut rest = template;
    while !rest.is_empty() {
        let var_at = rest.find("{$");
        let tag_at = rest.find("{%");
        let next = match (var_at, tag_at) {
            (Some(v), Some(t)) => v.min(t),
            (Some(v), None) => v,
            (None, Some(t)) => t,
            (None, None) => {
                tokens.push(Token::Text(rest.to_string()));
                break;
            }
        };
        if next > 0 {
            tokens.push(Token::Text(rest[..next].to_string()));
        }
        rest = &rest[next..];
        if rest.starts_with("{$") {
            let close = rest.find('}').ok_or_else(|| {
                TranslateError::InvalidTemplate("unterminated variable expression".to_string())
            })?;
            let path = rest[2..close].trim();
            if !VAR_PATH.is_match(path) {
                return Err(TranslateError::InvalidTemplate(format!(
                    "bad variable expression '{{${path}}}'"
                )));
            }
            tokens.push(Token::Var(path.to_string()));
            rest = &rest[close + 1..];
        } else {
            let close = rest.find("%}").ok_or_else(|| {
                TranslateError::InvalidTemplate("unterminated tag".to_string())
            })?;
            tokens.push(Token::Tag(rest[2..close].trim().to_string()));
            rest = &rest[close + 2..];
        }
    }
    Ok(tokens)
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

fn parse_condition(tag: &str) -> Result<Condition, TranslateError> {
    let caps = IF_TAG
        .captures(tag)
        .ok_or_else(|| TranslateError::InvalidTemplate(format!("bad if tag '{{% {tag} %}}'")))?;
    let negated = caps.get(1).is_some();
    let var = split_path(caps.get(2).map(|m| m.as_str()).unwrap_or_default());
    let compare = caps
        .get(3)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str().to_string());
    if negated && compare.is_some() {
        return Err(TranslateError::InvalidTemplate(format!(
            "negation cannot be combined with comparison in '{{% {tag} %}}'"
        )));
    }
    Ok(Condition {
        negated,
        var,
        compare,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Parses nodes until one of `terminators` is hit; returns the nodes and
    /// the terminator tag. `terminators` empty means parse to end of input.
    fn parse_until(&mut self, terminators: &[&str]) -> Result<(Vec<Node>, Option<String>), TranslateError> {
        let mut nodes = Vec::new();
        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::Var(path) => nodes.push(Node::Var(split_path(&path))),
                Token::Tag(tag) => {
                    if terminators.iter().any(|t| tag == *t || tag.starts_with(&format!("{t} "))) {
                        return Ok((nodes, Some(tag)));
                    }
                    if tag.starts_with("if") {
                        nodes.push(self.parse_if(&tag)?);
                    } else if tag.starts_with("loop") {
                        nodes.push(self.parse_loop(&tag)?);
                    } else {
                        return Err(TranslateError::InvalidTemplate(format!(
                            "unexpected tag '{{% {tag} %}}'"
                        )));
                    }
                }
            }
        }
        if terminators.is_empty() {
            Ok((nodes, None))
        } else {
            Err(TranslateError::InvalidTemplate(format!(
                "missing closing tag, expected one of: {}",
                terminators.join(", ")
            )))
        }
    }

    fn parse_if(&mut self, tag: &str) -> Result<Node, TranslateError> {
        let cond = parse_condition(tag)?;
        let (then_body, terminator) = self.parse_until(&["else", "endif"])?;
        let else_body = match terminator.as_deref() {
            Some("else") => {
                let (body, terminator) = self.parse_until(&["endif"])?;
                debug_assert_eq!(terminator.as_deref(), Some("endif"));
                body
            }
            _ => Vec::new(),
        };
        Ok(Node::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_loop(&mut self, tag: &str) -> Result<Node, TranslateError> {
        let caps = LOOP_TAG.captures(tag).ok_or_else(|| {
            TranslateError::InvalidTemplate(format!("bad loop tag '{{% {tag} %}}'"))
        })?;
        let list = split_path(caps.get(1).map(|m| m.as_str()).unwrap_or_default());
        let binding = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();

        let (body, mut terminator) = self.parse_until(&["divider", "onEmpty", "endloop"])?;
        let mut divider = Vec::new();
        let mut on_empty = Vec::new();
        if terminator.as_deref() == Some("divider") {
            let (nodes, next) = self.parse_until(&["onEmpty", "endloop"])?;
            divider = nodes;
            terminator = next;
        }
        if terminator.as_deref() == Some("onEmpty") {
            let (nodes, next) = self.parse_until(&["endloop"])?;
            on_empty = nodes;
            terminator = next;
        }
        debug_assert_eq!(terminator.as_deref(), Some("endloop"));
        Ok(Node::Loop {
            list,
            binding,
            body,
            divider,
            on_empty,
        })
    }
}

/// Lookup scope: loop bindings shadow context variables.
struct Scope<'a> {
    ctx: &'a RenderContext,
    locals: Vec<(String, TemplateValue)>,
}

impl Scope<'_> {
    fn lookup(&self, path: &[String]) -> Option<TemplateValue> {
        let head = path.first()?;
        let root = self
            .locals
            .iter()
            .rev()
            .find(|(name, _)| name == head)
            .map(|(_, value)| value)
            .or_else(|| self.ctx.get(head))?;
        let mut current = root;
        for field in &path[1..] {
            match current {
                TemplateValue::Object(fields) => current = fields.get(field)?,
                _ => return None,
            }
        }
        Some(current.clone())
    }
}

impl Template {
    /// Parses a template. Malformed tags fail here, not at render time.
    pub fn parse(template: &str) -> Result<Self, TranslateError> {
        let tokens = lex(template)?;
        let mut parser = Parser { tokens, pos: 0 };
        let (nodes, _) = parser.parse_until(&[])?;
        Ok(Template { nodes })
    }

    /// Renders with the given bindings. Pure: identical inputs produce
    /// byte-identical output.
    pub fn render(&self, ctx: &RenderContext) -> String {
        let mut out = String::new();
        let mut scope = Scope {
            ctx,
            locals: Vec::new(),
        };
        render_nodes(&self.nodes, &mut scope, &mut out);
        out
    }
}

fn render_nodes(nodes: &[Node], scope: &mut Scope<'_>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(path) => {
                if let Some(value) = scope.lookup(path) {
                    out.push_str(&value.scalar_text());
                }
            }
            Node::If {
                cond,
                then_body,
                else_body,
            } => {
                let value = scope.lookup(&cond.var);
                let holds = match (&cond.compare, value) {
                    (Some(literal), Some(value)) => value.equals_literal(literal),
                    (Some(_), None) => false,
                    (None, Some(value)) => value.truthy() != cond.negated,
                    (None, None) => cond.negated,
                };
                let body = if holds { then_body } else { else_body };
                render_nodes(body, scope, out);
            }
            Node::Loop {
                list,
                binding,
                body,
                divider,
                on_empty,
            } => {
                let items = match scope.lookup(list) {
                    Some(TemplateValue::List(items)) if !items.is_empty() => items,
                    _ => {
                        render_nodes(on_empty, scope, out);
                        continue;
                    }
                };
                for (idx, item) in items.into_iter().enumerate() {
                    if idx > 0 {
                        render_nodes(divider, scope, out);
                    }
                    scope.locals.push((binding.clone(), item));
                    render_nodes(body, scope, out);
                    scope.locals.pop();
                }
            }
        }
    }
}
