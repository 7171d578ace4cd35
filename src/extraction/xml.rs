//! Minimal XML tree parser and path lookup.
//!
//! The parser handles what API responses actually contain: the XML
//! declaration, comments, processing instructions, DOCTYPE, CDATA sections,
//! self-closing tags, attributes in either quote style, the five predefined
//! entities and numeric character references. Namespaces are not resolved;
//! a path segment without a prefix also matches prefixed element names.
//!
//! Paths come in two flavours:
//! - dotted, `root.user.id`, with 0-based `[n]` indexes
//! - slash, `/root/user/id` or `//id`, with 1-based `[n]` indexes
//!
//! In both, a final `@name` segment selects an attribute and `*` matches any
//! element. Slash paths also accept a final `text()`.

use super::ExtractionError;

/// A parsed element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Element content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    /// Value of an attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name || local_name(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Concatenated text of the element and its descendants, trimmed.
    pub fn text(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text.trim().to_string()
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(text) => out.push_str(text),
                XmlNode::Element(element) => element.collect_text(out),
            }
        }
    }

    fn matches(&self, name: &str) -> bool {
        name == "*" || self.name == name || (!name.contains(':') && local_name(&self.name) == name)
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Parses a document and returns its root element.
///
/// # Errors
///
/// Returns `ExtractionError::Parse` for malformed documents.
pub fn parse_xml(input: &str) -> Result<XmlElement, ExtractionError> {
    let mut parser = XmlParser { src: input, pos: 0 };
    parser.skip_misc()?;
    if !parser.rest().starts_with('<') {
        return Err(parser.error("expected root element"));
    }
    let root = parser.parse_element()?;
    parser.skip_misc()?;
    if parser.pos < parser.src.len() {
        return Err(parser.error("unexpected content after root element"));
    }
    Ok(root)
}

/// Parses `body` and returns the text (or attribute) at `path`.
///
/// # Examples
///
/// ```
/// use rest_client_scripting::extraction::extract_from_xml;
///
/// let body = r#"<root><user id="7"><name>Ann</name></user></root>"#;
/// assert_eq!(extract_from_xml(body, "root.user.name").unwrap(), Some("Ann".to_string()));
/// assert_eq!(extract_from_xml(body, "/root/user/@id").unwrap(), Some("7".to_string()));
/// assert_eq!(extract_from_xml(body, "root.user.email").unwrap(), None);
/// ```
pub fn extract_from_xml(body: &str, path: &str) -> Result<Option<String>, ExtractionError> {
    let query = XmlPath::parse(path)?;
    let root = parse_xml(body)?;
    Ok(query.evaluate(&root))
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    name: String,
    index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum Target {
    Text,
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq)]
struct XmlPath {
    steps: Vec<Step>,
    target: Target,
    anywhere: bool,
}

impl XmlPath {
    fn parse(path: &str) -> Result<Self, ExtractionError> {
        let path = path.trim();
        let invalid = |msg: &str| ExtractionError::InvalidPattern(format!("{} in XML path '{}'", msg, path));

        let slash = path.contains('/');
        let (anywhere, body) = match path.strip_prefix("//") {
            Some(rest) => (true, rest),
            None => (false, path.trim_start_matches('/')),
        };
        let separator = if slash { '/' } else { '.' };

        let mut raw: Vec<&str> = body.split(separator).map(str::trim).collect();
        if raw.iter().any(|segment| segment.is_empty()) {
            return Err(invalid("empty segment"));
        }

        let mut target = Target::Text;
        if let Some(&last) = raw.last() {
            if let Some(attribute) = last.strip_prefix('@') {
                if attribute.is_empty() {
                    return Err(invalid("empty attribute name"));
                }
                target = Target::Attribute(attribute.to_string());
                raw.pop();
            } else if slash && last == "text()" {
                raw.pop();
            }
        }

        let steps = raw
            .into_iter()
            .map(|segment| parse_step(segment, slash).map_err(|msg| invalid(&msg)))
            .collect::<Result<Vec<_>, _>>()?;
        if steps.is_empty() {
            return Err(invalid("no element segments"));
        }

        Ok(Self {
            steps,
            target,
            anywhere,
        })
    }

    fn evaluate(&self, root: &XmlElement) -> Option<String> {
        let (first, rest) = self.steps.split_first()?;

        let mut current: Vec<&XmlElement> = if self.anywhere {
            let mut all = Vec::new();
            descendants(root, &mut all);
            pick(all.into_iter().filter(|e| e.matches(&first.name)), first.index)
        } else if root.matches(&first.name) {
            pick(std::iter::once(root), first.index)
        } else {
            // Paths may also start below the document element.
            step(&[root], first)
        };

        for next in rest {
            current = step(&current, next);
            if current.is_empty() {
                return None;
            }
        }

        current.into_iter().find_map(|element| match &self.target {
            Target::Text => Some(element.text()),
            Target::Attribute(name) => element.attribute(name).map(str::to_string),
        })
    }
}

fn parse_step(segment: &str, one_based: bool) -> Result<Step, String> {
    let Some(open) = segment.find('[') else {
        return Ok(Step {
            name: segment.to_string(),
            index: None,
        });
    };
    let close = segment
        .strip_suffix(']')
        .ok_or_else(|| format!("unclosed '[' in '{}'", segment))?;
    let number: usize = close[open + 1..]
        .trim()
        .parse()
        .map_err(|_| format!("invalid index in '{}'", segment))?;
    let index = if one_based {
        number
            .checked_sub(1)
            .ok_or_else(|| format!("index must be at least 1 in '{}'", segment))?
    } else {
        number
    };
    Ok(Step {
        name: segment[..open].trim().to_string(),
        index: Some(index),
    })
}

fn step<'a>(parents: &[&'a XmlElement], next: &Step) -> Vec<&'a XmlElement> {
    parents
        .iter()
        .flat_map(|parent| pick(parent.elements().filter(|e| e.matches(&next.name)), next.index))
        .collect()
}

fn pick<'a>(candidates: impl Iterator<Item = &'a XmlElement>, index: Option<usize>) -> Vec<&'a XmlElement> {
    match index {
        Some(index) => candidates.skip(index).take(1).collect(),
        None => candidates.collect(),
    }
}

fn descendants<'a>(element: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
    out.push(element);
    for child in element.elements() {
        descendants(child, out);
    }
}

struct XmlParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> XmlParser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: &str) -> ExtractionError {
        let line = self.src[..self.pos].matches('\n').count() + 1;
        ExtractionError::Parse(format!("malformed XML at line {}: {}", line, message))
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Skips past `terminator`, erroring on end of input.
    fn skip_past(&mut self, terminator: &str, what: &str) -> Result<&'a str, ExtractionError> {
        match self.rest().find(terminator) {
            Some(offset) => {
                let skipped = &self.rest()[..offset];
                self.pos += offset + terminator.len();
                Ok(skipped)
            }
            None => Err(self.error(&format!("unterminated {}", what))),
        }
    }

    /// Skips whitespace, comments, processing instructions and DOCTYPE.
    fn skip_misc(&mut self) -> Result<(), ExtractionError> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<!DOCTYPE") || rest.starts_with("<!doctype") {
                self.skip_doctype()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_doctype(&mut self) -> Result<(), ExtractionError> {
        let mut depth = 0usize;
        for (offset, c) in self.rest().char_indices() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => {
                    self.pos += offset + 1;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(self.error("unterminated DOCTYPE"))
    }

    fn read_name(&mut self) -> Result<&'a str, ExtractionError> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '/' | '>' | '=' | '<'))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.error("expected a name"));
        }
        self.pos += end;
        Ok(&rest[..end])
    }

    fn expect(&mut self, token: &str) -> Result<(), ExtractionError> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", token)))
        }
    }

    fn parse_element(&mut self) -> Result<XmlElement, ExtractionError> {
        self.expect("<")?;
        let name = self.read_name()?.to_string();
        let mut attributes = Vec::new();

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(XmlElement {
                    name,
                    attributes,
                    children: Vec::new(),
                });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break;
            }
            if rest.is_empty() {
                return Err(self.error(&format!("unterminated tag <{}>", name)));
            }

            let key = self.read_name()?.to_string();
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let quote = match self.rest().chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.error("expected quoted attribute value")),
            };
            self.pos += 1;
            let raw = self.skip_past(&quote.to_string(), "attribute value")?;
            attributes.push((key, decode_entities(raw)));
        }

        let children = self.parse_content(&name)?;
        Ok(XmlElement {
            name,
            attributes,
            children,
        })
    }

    fn parse_content(&mut self, parent: &str) -> Result<Vec<XmlNode>, ExtractionError> {
        let mut children = Vec::new();

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(&format!("missing </{}>", parent)));
            }

            if rest.starts_with("</") {
                self.pos += 2;
                let closing = self.read_name()?;
                if closing != parent {
                    return Err(self.error(&format!(
                        "expected </{}>, found </{}>",
                        parent, closing
                    )));
                }
                self.skip_whitespace();
                self.expect(">")?;
                return Ok(children);
            } else if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let data = self.skip_past("]]>", "CDATA section")?;
                children.push(XmlNode::Text(data.to_string()));
            } else if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if rest.starts_with('<') {
                children.push(XmlNode::Element(self.parse_element()?));
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                children.push(XmlNode::Text(decode_entities(&rest[..end])));
                self.pos += end;
            }
        }
    }
}

/// Replaces predefined entities and numeric references; unknown entities are
/// kept verbatim.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let c = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
