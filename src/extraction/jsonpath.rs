//! JSONPath queries over `serde_json::Value`.
//!
//! Supported syntax:
//!
//! | Form | Meaning |
//! |---|---|
//! | `$` | document root |
//! | `.key`, `['key']` | object member |
//! | `[n]`, `[-n]` | array element, negative counts from the end |
//! | `.*`, `[*]` | every member or element |
//! | `..key`, `..*` | recursive descent |
//! | `[0,2]`, `['a','b']` | union |
//! | `[a:b]`, `[a:b:step]` | array slice |
//! | `[?(@.k)]` | members that have `k` |
//! | `[?(@.k op literal)]` | comparison with `==`, `!=`, `<`, `<=`, `>`, `>=` |
//!
//! A leading `$` may be omitted (`user.id` is read as `$.user.id`).

use super::ExtractionError;
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Name(String),
    Wildcard,
    Index(i64),
    Union(Vec<Selector>),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: i64,
    },
    Filter(Box<Filter>),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Child(Selector),
    Descendant(Selector),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    const ALL: [(&'static str, CompareOp); 6] = [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    fn holds(self, ordering: Option<Ordering>) -> bool {
        match ordering {
            None => self == CompareOp::Ne,
            Some(ordering) => match self {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    path: Vec<Segment>,
    comparison: Option<(CompareOp, Value)>,
}

impl Filter {
    fn matches(&self, candidate: &Value) -> bool {
        let found = evaluate(&self.path, candidate);
        match &self.comparison {
            None => !found.is_empty(),
            Some((op, literal)) => found
                .first()
                .map(|value| compare(value, *op, literal))
                .unwrap_or(false),
        }
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => op.holds(a.partial_cmp(&b)),
            _ => false,
        },
        (Value::String(a), Value::String(b)) => op.holds(Some(a.cmp(b))),
        _ => match op {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            _ => false,
        },
    }
}

/// A parsed JSONPath expression.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parses an expression.
    ///
    /// # Errors
    ///
    /// Returns `ExtractionError::InvalidPattern` for malformed expressions.
    pub fn parse(expression: &str) -> Result<Self, ExtractionError> {
        let segments = Parser::new(expression.trim(), '$').parse()?;
        Ok(Self { segments })
    }

    /// Returns every node matched by the expression, in document order.
    pub fn query<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        evaluate(&self.segments, root)
    }
}

impl FromStr for JsonPath {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JsonPath::parse(s)
    }
}

/// Runs `expression` against `root` and returns every match.
pub fn query<'a>(root: &'a Value, expression: &str) -> Result<Vec<&'a Value>, ExtractionError> {
    Ok(JsonPath::parse(expression)?.query(root))
}

/// Runs `expression` against `root`.
///
/// # Returns
///
/// `None` for zero matches, the value itself for exactly one match, and an
/// array of the matches otherwise.
pub fn select(root: &Value, expression: &str) -> Result<Option<Value>, ExtractionError> {
    Ok(collapse(query(root, expression)?))
}

fn collapse(mut matches: Vec<&Value>) -> Option<Value> {
    match matches.len() {
        0 => None,
        1 => matches.pop().cloned(),
        _ => Some(Value::Array(matches.into_iter().cloned().collect())),
    }
}

/// Parses `body` as JSON and runs `expression` against it.
///
/// # Examples
///
/// ```
/// use rest_client_scripting::extraction::extract_from_json;
/// use serde_json::json;
///
/// let body = r#"{"user": {"id": 123, "roles": ["admin", "dev"]}}"#;
/// assert_eq!(extract_from_json(body, "$.user.id").unwrap(), Some(json!(123)));
/// assert_eq!(extract_from_json(body, "$.user.roles[*]").unwrap(), Some(json!(["admin", "dev"])));
/// assert_eq!(extract_from_json(body, "$.user.email").unwrap(), None);
/// assert!(extract_from_json("not json", "$.a").is_err());
/// ```
pub fn extract_from_json(body: &str, expression: &str) -> Result<Option<Value>, ExtractionError> {
    let path = JsonPath::parse(expression)?;
    let document: Value = serde_json::from_str(body)
        .map_err(|e| ExtractionError::Parse(format!("invalid JSON: {}", e)))?;

    Ok(collapse(path.query(&document)))
}

/// Converts an extracted value to its stored textual form.
///
/// - Strings: returned as-is (without quotes)
/// - Numbers, booleans, null: their JSON text
/// - Objects, arrays: compact JSON
pub fn json_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn evaluate<'a>(segments: &[Segment], root: &'a Value) -> Vec<&'a Value> {
    let mut nodes = vec![root];
    for segment in segments {
        let mut next = Vec::new();
        for node in nodes {
            match segment {
                Segment::Child(selector) => apply(selector, node, &mut next),
                Segment::Descendant(selector) => {
                    let mut all = Vec::new();
                    descendants(node, &mut all);
                    for descendant in all {
                        apply(selector, descendant, &mut next);
                    }
                }
            }
        }
        if next.is_empty() {
            return next;
        }
        nodes = next;
    }
    nodes
}

fn descendants<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(node);
    match node {
        Value::Array(items) => items.iter().for_each(|item| descendants(item, out)),
        Value::Object(map) => map.values().for_each(|item| descendants(item, out)),
        _ => {}
    }
}

fn children(node: &Value) -> Vec<&Value> {
    match node {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn apply<'a>(selector: &Selector, node: &'a Value, out: &mut Vec<&'a Value>) {
    match selector {
        Selector::Name(name) => {
            if let Some(value) = node.as_object().and_then(|map| map.get(name)) {
                out.push(value);
            }
        }
        Selector::Wildcard => out.extend(children(node)),
        Selector::Index(index) => {
            if let Some(items) = node.as_array() {
                let len = items.len() as i64;
                let index = if *index < 0 { len + index } else { *index };
                if (0..len).contains(&index) {
                    out.push(&items[index as usize]);
                }
            }
        }
        Selector::Union(selectors) => selectors.iter().for_each(|s| apply(s, node, out)),
        Selector::Slice { start, end, step } => {
            if let Some(items) = node.as_array() {
                out.extend(
                    slice_indices(items.len() as i64, *start, *end, *step)
                        .into_iter()
                        .map(|i| &items[i]),
                );
            }
        }
        Selector::Filter(filter) => out.extend(
            children(node)
                .into_iter()
                .filter(|candidate| filter.matches(candidate)),
        ),
    }
}

fn slice_indices(len: i64, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let mut indices = Vec::new();
    if step > 0 {
        let clamp = |v: i64| if v < 0 { (len + v).max(0) } else { v.min(len) };
        let mut i = start.map(clamp).unwrap_or(0);
        let end = end.map(clamp).unwrap_or(len);
        while i < end {
            indices.push(i as usize);
            i += step;
        }
    } else {
        let clamp = |v: i64| if v < 0 { (len + v).max(-1) } else { v.min(len - 1) };
        let mut i = start.map(clamp).unwrap_or(len - 1);
        let end = end.map(clamp).unwrap_or(-1);
        while i > end {
            indices.push(i as usize);
            i += step;
        }
    }
    indices
}

/// Character-level parser; `root` is `$` for documents and `@` in filters.
struct Parser<'a> {
    expression: &'a str,
    chars: Vec<char>,
    pos: usize,
    root: char,
}

impl<'a> Parser<'a> {
    fn new(expression: &'a str, root: char) -> Self {
        Self {
            expression,
            chars: expression.chars().collect(),
            pos: 0,
            root,
        }
    }

    fn error(&self, message: &str) -> ExtractionError {
        ExtractionError::InvalidPattern(format!(
            "{} in JSONPath '{}' at position {}",
            message, self.expression, self.pos
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn parse(mut self) -> Result<Vec<Segment>, ExtractionError> {
        let mut segments = Vec::new();

        match self.peek() {
            None => return Err(self.error("empty expression")),
            Some(c) if c == self.root => self.pos += 1,
            Some('.') | Some('[') => {}
            Some(_) => segments.push(Segment::Child(Selector::Name(self.parse_name()?))),
        }

        while let Some(c) = self.peek() {
            match c {
                '.' if self.peek_at(1) == Some('.') => {
                    self.pos += 2;
                    let selector = match self.peek() {
                        Some('[') => self.parse_bracket()?,
                        Some('*') => {
                            self.pos += 1;
                            Selector::Wildcard
                        }
                        _ => Selector::Name(self.parse_name()?),
                    };
                    segments.push(Segment::Descendant(selector));
                }
                '.' => {
                    self.pos += 1;
                    let selector = if self.peek() == Some('*') {
                        self.pos += 1;
                        Selector::Wildcard
                    } else {
                        Selector::Name(self.parse_name()?)
                    };
                    segments.push(Segment::Child(selector));
                }
                '[' => segments.push(Segment::Child(self.parse_bracket()?)),
                c if c.is_whitespace() => self.pos += 1,
                _ => return Err(self.error(&format!("unexpected '{}'", c))),
            }
        }

        Ok(segments)
    }

    fn parse_name(&mut self) -> Result<String, ExtractionError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' {
                break;
            }
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        let name = name.trim();
        if name.is_empty() {
            return Err(self.error("expected a member name"));
        }
        Ok(name.to_string())
    }

    fn parse_bracket(&mut self) -> Result<Selector, ExtractionError> {
        let open = self.pos;
        let close = self.find_closing(open)?;
        let inner: String = self.chars[open + 1..close].iter().collect();
        self.pos = close + 1;
        parse_bracket_content(inner.trim()).map_err(|msg| self.error(&msg))
    }

    fn find_closing(&self, open: usize) -> Result<usize, ExtractionError> {
        let mut depth = 0i32;
        let mut quote: Option<char> = None;

        for (idx, &c) in self.chars.iter().enumerate().skip(open) {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '[' | '(' => depth += 1,
                ']' | ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(idx);
                    }
                }
                _ => {}
            }
        }

        Err(self.error("unclosed '['"))
    }
}

fn parse_bracket_content(inner: &str) -> Result<Selector, String> {
    if inner.is_empty() {
        return Err("empty brackets".to_string());
    }
    if inner == "*" {
        return Ok(Selector::Wildcard);
    }
    if let Some(filter) = inner.strip_prefix('?') {
        return parse_filter(filter.trim()).map(|f| Selector::Filter(Box::new(f)));
    }

    let parts = split_top_level(inner, ',');
    if parts.len() > 1 {
        return parts
            .iter()
            .map(|part| parse_single(part.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map(Selector::Union);
    }

    if !is_quoted(inner) && inner.contains(':') {
        return parse_slice(inner);
    }

    parse_single(inner)
}

fn parse_single(part: &str) -> Result<Selector, String> {
    if is_quoted(part) {
        return Ok(Selector::Name(part[1..part.len() - 1].to_string()));
    }
    if part == "*" {
        return Ok(Selector::Wildcard);
    }
    part.parse::<i64>()
        .map(Selector::Index)
        .map_err(|_| format!("unsupported selector '{}'", part))
}

fn parse_slice(inner: &str) -> Result<Selector, String> {
    let parts: Vec<&str> = inner.split(':').map(str::trim).collect();
    if parts.len() > 3 {
        return Err(format!("invalid slice '{}'", inner));
    }

    let bound = |text: &str| -> Result<Option<i64>, String> {
        if text.is_empty() {
            Ok(None)
        } else {
            text.parse()
                .map(Some)
                .map_err(|_| format!("invalid slice bound '{}'", text))
        }
    };

    let start = bound(parts[0])?;
    let end = bound(parts.get(1).copied().unwrap_or(""))?;
    let step = bound(parts.get(2).copied().unwrap_or(""))?.unwrap_or(1);
    if step == 0 {
        return Err("slice step must not be 0".to_string());
    }

    Ok(Selector::Slice { start, end, step })
}

fn parse_filter(text: &str) -> Result<Filter, String> {
    let expr = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| format!("filter must be wrapped in parentheses: '{}'", text))?
        .trim();

    let (lhs, comparison) = match find_operator(expr) {
        Some((pos, symbol, op)) => {
            let literal = parse_literal(expr[pos + symbol.len()..].trim())?;
            (expr[..pos].trim(), Some((op, literal)))
        }
        None => (expr, None),
    };

    if !lhs.starts_with('@') {
        return Err(format!("filter must start with '@': '{}'", lhs));
    }
    let path = Parser::new(lhs, '@')
        .parse()
        .map_err(|err| err.to_string())?;

    Ok(Filter { path, comparison })
}

fn find_operator(expr: &str) -> Option<(usize, &'static str, CompareOp)> {
    let mut quote: Option<char> = None;
    for (pos, c) in expr.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
            continue;
        }
        let rest = &expr[pos..];
        if let Some((symbol, op)) = CompareOp::ALL
            .iter()
            .find(|(symbol, _)| rest.starts_with(symbol))
        {
            return Some((pos, *symbol, *op));
        }
    }
    None
}

fn parse_literal(text: &str) -> Result<Value, String> {
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return Ok(Value::String(text[1..text.len() - 1].to_string()));
    }
    serde_json::from_str(text).map_err(|_| format!("invalid filter literal '{}'", text))
}

fn is_quoted(text: &str) -> bool {
    text.len() >= 2
        && ((text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"')))
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (pos, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == separator => {
                parts.push(&text[start..pos]);
                start = pos + c.len_utf8();
            }
            None => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
