//! Rewrites JavaScript-flavoured and Groovy-style scripts into Rhai.
//!
//! The rewriter works on tokens and never adds or removes line breaks, so
//! line numbers in interpreter errors point at the user's source.
//!
//! Supported JavaScript forms: `let`/`const`/`var`, `function` declarations
//! and expressions, arrow functions, `===`/`!==`, single-quoted strings,
//! template literals, object literals, regex literals, `for (x of xs)`,
//! `for (k in obj)`, counting `for (let i = a; i < b; i++)`, `i++`,
//! `typeof x`, `throw new Error(...)`, `null`/`undefined` and automatic
//! semicolon insertion at line ends.
//!
//! Supported Groovy forms: `def`, closures with explicit parameters or an
//! implicit `it`, trailing closures (`list.each { ... }`,
//! `test("name") { ... }`), map literals `[k: v]`/`[:]`, `println x`,
//! `assert cond : "message"`, GStrings, inclusive ranges and `?:`.
//!
//! Not supported in either syntax: the conditional operator `a ? b : c`,
//! `switch`, classes, destructuring, default parameters, hoisting of named
//! functions and functions calling themselves recursively.

use super::error::ScriptError;
use super::ScriptLanguage;
use std::collections::HashSet;

const PUNCTS: &[&str] = &[
    "===", "!==", "...", "..<", "?.", "?:", "??", "=>", "->", "==", "!=", "<=", ">=", "&&", "||",
    "++", "--", "+=", "-=", "*=", "/=", "%=", "..", "::", "{", "}", "(", ")", "[", "]", ";", ",",
    ".", ":", "?", "=", "<", ">", "+", "-", "*", "/", "%", "!", "&", "|", "^", "~", "@", "#",
];

/// Keywords after which a `/` starts a regex literal.
const REGEX_PREFIX_WORDS: &[&str] = &["return", "typeof", "case", "in", "of", "throw"];

/// Property names that are keywords in Rhai, with their replacements.
const RENAMED_PROPERTIES: &[(&str, &str)] = &[
    ("true", "is_true"),
    ("false", "is_false"),
    ("null", "is_null"),
    ("undefined", "is_undefined"),
    ("match", "matches"),
    ("with", "with_"),
    ("new", "new_"),
    ("default", "default_"),
];

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(String),
    Str { text: String, quote: char },
    Template(String),
    Regex { pattern: String, flags: String },
    Punct(&'static str),
    Space(String),
    Newline,
    Comment(String),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

impl Token {
    fn is_significant(&self) -> bool {
        !matches!(self.tok, Tok::Space(_) | Tok::Newline | Tok::Comment(_))
    }
}

/// Rewrites `source` written in `language` into Rhai.
///
/// # Examples
///
/// ```
/// use rest_client_scripting::scripting::dialect::translate;
/// use rest_client_scripting::scripting::ScriptLanguage;
///
/// let rhai = translate("const ok = x === 1", ScriptLanguage::JavaScript).unwrap();
/// assert_eq!(rhai, "let ok = x == 1");
/// ```
pub fn translate(source: &str, language: ScriptLanguage) -> Result<String, ScriptError> {
    let tokens = tokenize(source)?;
    Translator::new(&tokens, language).run()
}

fn error(line: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Translation {
        message: message.into(),
        line,
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;
    let mut line = 1;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let start = i;
        let start_line = line;

        let tok = if c == '\n' {
            line += 1;
            i += 1;
            Tok::Newline
        } else if c == '\r' {
            i += 1;
            continue;
        } else if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() && chars[i] != '\n' {
                i += 1;
            }
            Tok::Space(chars[start..i].iter().filter(|c| **c != '\r').collect())
        } else if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            Tok::Comment(chars[start..i].iter().filter(|c| **c != '\r').collect())
        } else if c == '/' && next == Some('*') {
            i += 2;
            loop {
                match chars.get(i) {
                    None => return Err(error(start_line, "unterminated comment")),
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        break;
                    }
                    Some('\n') => line += 1,
                    _ => {}
                }
                i += 1;
            }
            Tok::Comment(chars[start..i].iter().collect())
        } else if c == '"' || c == '\'' {
            i += 1;
            loop {
                match chars.get(i) {
                    None | Some('\n') => return Err(error(start_line, "unterminated string")),
                    Some('\\') => i += 2,
                    Some(q) if *q == c => break,
                    _ => i += 1,
                }
            }
            i += 1;
            Tok::Str {
                text: chars[start + 1..i - 1].iter().collect(),
                quote: c,
            }
        } else if c == '`' {
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(error(start_line, "unterminated template string")),
                    Some('\\') => i += 2,
                    Some('`') => break,
                    Some('\n') => {
                        line += 1;
                        i += 1;
                    }
                    _ => i += 1,
                }
            }
            i += 1;
            Tok::Template(chars[start + 1..i - 1].iter().collect())
        } else if c == '/' && regex_allowed(&tokens) {
            i += 1;
            let mut in_class = false;
            loop {
                match chars.get(i) {
                    None | Some('\n') => return Err(error(start_line, "unterminated regex")),
                    Some('\\') => i += 2,
                    Some('[') => {
                        in_class = true;
                        i += 1;
                    }
                    Some(']') => {
                        in_class = false;
                        i += 1;
                    }
                    Some('/') if !in_class => break,
                    _ => i += 1,
                }
            }
            let pattern: String = chars[start + 1..i].iter().collect();
            i += 1;
            let flags_start = i;
            while i < chars.len() && chars[i].is_ascii_alphabetic() {
                i += 1;
            }
            Tok::Regex {
                pattern,
                flags: chars[flags_start..i].iter().collect(),
            }
        } else if c.is_ascii_digit() {
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                let exponent_sign =
                    (d == '+' || d == '-') && matches!(chars[i - 1], 'e' | 'E') && !is_hex(&chars[start..i]);
                let fraction = d == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit());
                if d.is_ascii_alphanumeric() || d == '_' || fraction || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            Tok::Number(chars[start..i].iter().collect())
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            Tok::Ident(chars[start..i].iter().collect())
        } else {
            let punct = PUNCTS
                .iter()
                .find(|p| p.chars().enumerate().all(|(k, pc)| chars.get(i + k) == Some(&pc)))
                .ok_or_else(|| error(line, format!("unexpected character '{}'", c)))?;
            i += punct.len();
            Tok::Punct(punct)
        };

        tokens.push(Token {
            tok,
            line: start_line,
        });
    }
    Ok(tokens)
}

fn is_hex(digits: &[char]) -> bool {
    digits.len() > 1 && digits[0] == '0' && matches!(digits[1], 'x' | 'X')
}

fn regex_allowed(tokens: &[Token]) -> bool {
    match tokens.iter().rev().find(|t| t.is_significant()).map(|t| &t.tok) {
        None => true,
        Some(Tok::Punct(p)) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
        Some(Tok::Ident(word)) => REGEX_PREFIX_WORDS.contains(&word.as_str()),
        Some(_) => false,
    }
}

/// Converts a single- or double-quoted literal body into a Rhai string.
fn quote_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some('/') => out.push('/'),
                Some('$') => out.push('$'),
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Regex literal as a Rhai string; `i`, `m` and `s` flags become an inline group.
fn regex_string(pattern: &str, flags: &str) -> String {
    let inline: String = flags.chars().filter(|f| matches!(f, 'i' | 'm' | 's')).collect();
    let mut out = String::from("\"");
    if !inline.is_empty() {
        out.push_str(&format!("(?{})", inline));
    }
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'/') => {
                chars.next();
                out.push('/');
            }
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Groovy double-quoted string: interpolating ones become template literals.
fn groovy_string(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let interpolates = chars.windows(2).any(|w| {
        w[0] == '$' && (w[1] == '{' || w[1].is_alphabetic() || w[1] == '_')
    });
    if !interpolates {
        return quote_string(raw);
    }

    let mut out = String::from("`");
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if i + 1 < chars.len() => {
                match chars[i + 1] {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    other => out.push(other),
                }
                i += 2;
                continue;
            }
            '`' => out.push_str("\\`"),
            '$' if chars.get(i + 1).map_or(false, |n| n.is_alphabetic() || *n == '_') => {
                let mut end = i + 1;
                while end < chars.len()
                    && (chars[end].is_alphanumeric()
                        || chars[end] == '_'
                        || (chars[end] == '.'
                            && chars.get(end + 1).map_or(false, |n| n.is_alphabetic())))
                {
                    end += 1;
                }
                let path: String = chars[i + 1..end].iter().collect();
                out.push_str(&format!("${{{}}}", path));
                i = end;
                continue;
            }
            other => out.push(other),
        }
        i += 1;
    }
    out.push('`');
    out
}

fn raw_text(tok: &Tok) -> String {
    match tok {
        Tok::Ident(s) | Tok::Number(s) | Tok::Space(s) | Tok::Comment(s) => s.clone(),
        Tok::Str { text, .. } => quote_string(text),
        Tok::Template(text) => format!("`{}`", text),
        Tok::Regex { pattern, flags } => regex_string(pattern, flags),
        Tok::Punct(p) => p.to_string(),
        Tok::Newline => "\n".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    /// Statement block (`if`, loops, `try`, bare blocks).
    Block,
    /// Body of a closure used as an expression.
    Closure,
    /// Body of a named function declaration.
    Function,
    Object,
    Paren,
    Bracket,
    Map,
    /// Groovy command call without parentheses, closed at end of line.
    Command,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    close: String,
    line: usize,
}

struct Translator<'a> {
    tokens: &'a [Token],
    language: ScriptLanguage,
    out: Vec<String>,
    frames: Vec<Frame>,
    callables: HashSet<String>,
    last_sig_out: usize,
    last_closed: Option<FrameKind>,
}

impl<'a> Translator<'a> {
    fn new(tokens: &'a [Token], language: ScriptLanguage) -> Self {
        Self {
            tokens,
            language,
            out: Vec::with_capacity(tokens.len()),
            frames: Vec::new(),
            callables: HashSet::new(),
            last_sig_out: 0,
            last_closed: None,
        }
    }

    fn groovy(&self) -> bool {
        self.language == ScriptLanguage::Groovy
    }

    fn run(mut self) -> Result<String, ScriptError> {
        let mut i = 0;
        while i < self.tokens.len() {
            i = self.step(i)?;
        }
        self.close_commands();
        if let Some(frame) = self.frames.last() {
            return Err(error(frame.line, "unclosed bracket"));
        }
        Ok(self.out.concat())
    }

    fn step(&mut self, i: usize) -> Result<usize, ScriptError> {
        let token = &self.tokens[i];
        match &token.tok {
            Tok::Newline => {
                self.close_commands();
                if self.needs_semicolon(i) {
                    self.insert_after_last_sig(";");
                }
                self.out.push("\n".to_string());
                Ok(i + 1)
            }
            Tok::Space(_) | Tok::Comment(_) => {
                self.out.push(raw_text(&token.tok));
                Ok(i + 1)
            }
            Tok::Str { text, quote } => {
                let text = if self.groovy() && *quote == '"' {
                    groovy_string(text)
                } else {
                    quote_string(text)
                };
                self.emit(text);
                Ok(i + 1)
            }
            Tok::Number(text) => {
                let hex = text.starts_with("0x") || text.starts_with("0X");
                let trimmed = if self.groovy() && !hex {
                    text.trim_end_matches(['L', 'l', 'G', 'g', 'D', 'd', 'F', 'f'])
                } else {
                    text.as_str()
                };
                self.emit(trimmed.to_string());
                Ok(i + 1)
            }
            Tok::Template(_) | Tok::Regex { .. } => {
                self.emit(raw_text(&token.tok));
                Ok(i + 1)
            }
            Tok::Ident(word) => self.ident(i, word),
            Tok::Punct(p) => self.punct(i, p),
        }
    }

    fn emit(&mut self, text: impl Into<String>) {
        self.out.push(text.into());
        self.last_sig_out = self.out.len();
    }

    fn insert_after_last_sig(&mut self, text: &str) {
        self.out.insert(self.last_sig_out, text.to_string());
        self.last_sig_out += 1;
    }

    fn line(&self, i: usize) -> usize {
        self.tokens.get(i).map_or(0, |t| t.line)
    }

    fn punct_at(&self, i: usize) -> Option<&'static str> {
        match self.tokens.get(i).map(|t| &t.tok) {
            Some(Tok::Punct(p)) => Some(p),
            _ => None,
        }
    }

    fn ident_at(&self, i: usize) -> Option<&str> {
        match self.tokens.get(i).map(|t| &t.tok) {
            Some(Tok::Ident(word)) => Some(word.as_str()),
            _ => None,
        }
    }

    fn next_sig(&self, i: usize) -> Option<usize> {
        (i + 1..self.tokens.len()).find(|&j| self.tokens[j].is_significant())
    }

    fn next_sig_same_line(&self, i: usize) -> Option<usize> {
        for j in i + 1..self.tokens.len() {
            match self.tokens[j].tok {
                Tok::Newline => return None,
                _ if self.tokens[j].is_significant() => return Some(j),
                _ => {}
            }
        }
        None
    }

    fn prev_sig(&self, i: usize) -> Option<usize> {
        (0..i).rev().find(|&j| self.tokens[j].is_significant())
    }

    fn matching(&self, open: usize) -> Result<usize, ScriptError> {
        let mut depth = 0usize;
        for j in open..self.tokens.len() {
            match self.punct_at(j) {
                Some("(" | "[" | "{") => depth += 1,
                Some(")" | "]" | "}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(j);
                    }
                }
                _ => {}
            }
        }
        Err(error(self.line(open), "unclosed bracket"))
    }

    fn matching_back(&self, close: usize) -> Option<usize> {
        let mut depth = 0usize;
        for j in (0..=close).rev() {
            match self.punct_at(j) {
                Some(")" | "]" | "}") => depth += 1,
                Some("(" | "[" | "{") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(j);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Emits the line breaks found in `tokens[from..to]`, dropping the rest.
    fn skip(&mut self, from: usize, to: usize) {
        for j in from..to.min(self.tokens.len()) {
            let breaks = match &self.tokens[j].tok {
                Tok::Newline => 1,
                Tok::Comment(text) => text.matches('\n').count(),
                Tok::Template(text) => text.matches('\n').count(),
                _ => 0,
            };
            for _ in 0..breaks {
                self.out.push("\n".to_string());
            }
        }
    }

    /// Plain rendering of a token range, used for loop bounds.
    fn render(&self, from: usize, to: usize) -> String {
        self.tokens[from..to]
            .iter()
            .filter(|t| !matches!(t.tok, Tok::Newline | Tok::Comment(_)))
            .map(|t| raw_text(&t.tok))
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn at_statement_start(&self, i: usize) -> bool {
        match self.prev_sig(i) {
            None => true,
            Some(p) => {
                matches!(self.punct_at(p), Some(";" | "{" | "}"))
                    || self.tokens[p + 1..i].iter().any(|t| t.tok == Tok::Newline)
            }
        }
    }

    /// Name bound by `let|const|var|def name = <closure at i>`.
    fn declared_name(&self, i: usize) -> Option<String> {
        let eq = self.prev_sig(i)?;
        if self.punct_at(eq) != Some("=") {
            return None;
        }
        let name_at = self.prev_sig(eq)?;
        let name = self.ident_at(name_at)?;
        let keyword = self.ident_at(self.prev_sig(name_at)?)?;
        matches!(keyword, "let" | "const" | "var" | "def").then(|| name.to_string())
    }

    fn statement_context(&self) -> bool {
        match self.frames.last() {
            None => true,
            Some(frame) => matches!(
                frame.kind,
                FrameKind::Block | FrameKind::Closure | FrameKind::Function
            ),
        }
    }

    fn ends_statement(&self, i: usize) -> bool {
        match &self.tokens[i].tok {
            Tok::Ident(word) => !matches!(
                word.as_str(),
                "else" | "do" | "try" | "finally" | "let" | "const" | "var" | "def" | "function"
                    | "new" | "typeof" | "in" | "of" | "instanceof"
            ),
            Tok::Number(_) | Tok::Str { .. } | Tok::Template(_) | Tok::Regex { .. } => true,
            Tok::Punct(")" | "]" | "++" | "--") => true,
            Tok::Punct("}") => matches!(
                self.last_closed,
                Some(FrameKind::Object | FrameKind::Closure | FrameKind::Map)
            ),
            _ => false,
        }
    }

    fn continues_expression(&self, i: usize) -> bool {
        match &self.tokens[i].tok {
            Tok::Punct(p) => matches!(
                *p,
                "." | "?."
                    | ")"
                    | "]"
                    | "}"
                    | ","
                    | "+"
                    | "-"
                    | "*"
                    | "/"
                    | "%"
                    | "&&"
                    | "||"
                    | "&"
                    | "|"
                    | "=="
                    | "!="
                    | "==="
                    | "!=="
                    | "<"
                    | ">"
                    | "<="
                    | ">="
                    | "??"
                    | "?:"
                    | "?"
                    | ":"
                    | "="
                    | "+="
                    | "-="
                    | "*="
                    | "/="
                    | "%="
                    | "=>"
                    | "->"
            ),
            Tok::Ident(word) => matches!(word.as_str(), "else" | "catch" | "finally"),
            _ => false,
        }
    }

    /// Automatic semicolon insertion for the line break at `i`.
    fn needs_semicolon(&self, i: usize) -> bool {
        let Some(last) = self.prev_sig(i) else {
            return false;
        };
        if self.tokens[last + 1..i].iter().any(|t| t.tok == Tok::Newline) {
            return false;
        }
        if !self.statement_context() || !self.ends_statement(last) {
            return false;
        }
        match self.next_sig(i) {
            Some(next) => !self.continues_expression(next),
            None => false,
        }
    }

    fn close_commands(&mut self) {
        while matches!(self.frames.last(), Some(f) if f.kind == FrameKind::Command) {
            if let Some(frame) = self.frames.pop() {
                self.insert_after_last_sig(&frame.close);
            }
        }
    }

    fn push_frame(&mut self, kind: FrameKind, close: &str, i: usize) {
        self.frames.push(Frame {
            kind,
            close: close.to_string(),
            line: self.line(i),
        });
    }

    fn ident(&mut self, i: usize, word: &str) -> Result<usize, ScriptError> {
        let after_dot = self
            .prev_sig(i)
            .map_or(false, |p| matches!(self.punct_at(p), Some("." | "?.")));
        if matches!(word, "expect" | "equal" | "equals") {
            if let Some(next) = self.bound_call(i, word, after_dot) {
                return Ok(next);
            }
        }
        if after_dot {
            if let Some(method) = self.string_method(i, word) {
                self.emit(method);
                return Ok(i + 1);
            }
            let renamed = RENAMED_PROPERTIES
                .iter()
                .find(|(from, _)| *from == word)
                .map_or(word, |(_, to)| *to);
            self.emit(renamed);
            return Ok(i + 1);
        }

        match word {
            "let" | "const" | "var" | "def" => self.emit("let"),
            "null" | "undefined" => self.emit("()"),
            "async" | "await" => {
                return Err(error(self.line(i), "async code is not supported in scripts"))
            }
            "class" => return Err(error(self.line(i), "classes are not supported in scripts")),
            "function" if !self.groovy() => return self.function(i),
            "for" => return self.for_loop(i),
            "typeof" if !self.groovy() => return self.type_of(i),
            "new" => return self.new_expression(i),
            "if" | "while" if self.next_sig(i).and_then(|n| self.punct_at(n)) == Some("(") => {
                let open = self.next_sig(i).unwrap_or(i + 1);
                self.emit(format!("{} truthy", word));
                self.skip(i + 1, open);
                return Ok(open);
            }
            "println" | "print" | "assert" if self.groovy() => {
                self.emit(word);
                match self.next_sig_same_line(i) {
                    Some(next) if self.punct_at(next) != Some("(") => {
                        self.emit("(");
                        self.push_frame(FrameKind::Command, ")", i);
                        return Ok(next);
                    }
                    None if word == "println" => self.emit("()"),
                    _ => {}
                }
            }
            _ => {
                let next = self.next_sig(i);
                if !self.groovy() && next.and_then(|n| self.punct_at(n)) == Some("=>") {
                    let arrow = next.unwrap_or(i);
                    return Ok(self.arrow_body(i, arrow, word.to_string()));
                }
                if self.callables.contains(word) && next.and_then(|n| self.punct_at(n)) == Some("(")
                {
                    self.emit(format!("{}.call", word));
                } else {
                    self.emit(word);
                }
            }
        }
        Ok(i + 1)
    }

    /// Replacement name for a string method whose Rhai namesake differs.
    ///
    /// A regex literal argument selects the regex variant; its `g` flag
    /// selects replace-all. Groovy's `replace` is literal and global, its
    /// `replaceAll`/`replaceFirst` take a pattern string.
    fn string_method(&self, i: usize, word: &str) -> Option<&'static str> {
        let open = self.next_sig(i).filter(|&o| self.punct_at(o) == Some("("))?;
        let regex_global = self
            .next_sig(open)
            .and_then(|arg| match &self.tokens[arg].tok {
                Tok::Regex { flags, .. } => Some(flags.contains('g')),
                _ => None,
            });
        match (self.groovy(), word, regex_global) {
            (false, "replace", Some(false)) => Some("replaceRegex"),
            (false, "replace" | "replaceAll", Some(_)) => Some("replaceRegexAll"),
            (true, "replace", _) => Some("replaceAll"),
            (true, "replaceAll", _) => Some("replaceRegexAll"),
            (true, "replaceFirst", _) => Some("replaceRegex"),
            _ => None,
        }
    }

    /// `expect(a)` and `.equal(a)` on a bare variable also pass the variable
    /// name, so `expect(a).to.equal(a)` holds for arrays and objects.
    fn bound_call(&mut self, i: usize, word: &str, after_dot: bool) -> Option<usize> {
        if word != "expect" && !after_dot {
            return None;
        }
        let open = i + 1;
        let close = i + 3;
        if self.punct_at(open) != Some("(") || self.punct_at(close) != Some(")") {
            return None;
        }
        let name = self.ident_at(i + 2).filter(|name| {
            !matches!(
                *name,
                "null" | "undefined" | "true" | "false" | "this" | "NaN" | "Infinity"
            )
        })?;
        let name = name.to_string();
        let function = if word == "expect" { "expectBound" } else { "equalBound" };
        self.emit(format!("{}({}, \"{}\")", function, name, name));
        Some(close + 1)
    }

    /// Emits `|params|` for an arrow function whose `=>` is at `arrow`.
    fn arrow_body(&mut self, start: usize, arrow: usize, params: String) -> usize {
        if let Some(name) = self.declared_name(start) {
            self.callables.insert(name);
        }
        match self.next_sig(arrow) {
            Some(brace) if self.punct_at(brace) == Some("{") => {
                self.emit(format!("|{}| {{", params));
                self.skip(start + 1, brace);
                self.push_frame(FrameKind::Closure, "}", brace);
                brace + 1
            }
            _ => {
                self.emit(format!("|{}|", params));
                self.skip(start + 1, arrow + 1);
                arrow + 1
            }
        }
    }

    /// Identifier parameter list between `open` and `close`.
    fn params(&self, open: usize, close: usize) -> Result<String, ScriptError> {
        let mut names = Vec::new();
        for j in open + 1..close {
            match &self.tokens[j].tok {
                Tok::Ident(name) => names.push(name.clone()),
                Tok::Punct(",") => {}
                _ if !self.tokens[j].is_significant() => {}
                _ => {
                    return Err(error(
                        self.line(j),
                        "only plain parameter names are supported",
                    ))
                }
            }
        }
        Ok(names.join(", "))
    }

    fn function(&mut self, i: usize) -> Result<usize, ScriptError> {
        let line = self.line(i);
        let mut j = self.next_sig(i).ok_or_else(|| error(line, "incomplete function"))?;
        let name = self.ident_at(j).map(str::to_string);
        if name.is_some() {
            j = self.next_sig(j).ok_or_else(|| error(line, "incomplete function"))?;
        }
        if self.punct_at(j) != Some("(") {
            return Err(error(line, "expected '(' after function"));
        }
        let close = self.matching(j)?;
        let params = self.params(j, close)?;
        let brace = self
            .next_sig(close)
            .filter(|&b| self.punct_at(b) == Some("{"))
            .ok_or_else(|| error(line, "expected '{' to start the function body"))?;

        match name {
            Some(name) if self.at_statement_start(i) => {
                self.emit(format!("let {} = |{}| {{", name, params));
                self.callables.insert(name);
                self.push_frame(FrameKind::Function, "};", i);
            }
            _ => {
                if let Some(declared) = self.declared_name(i) {
                    self.callables.insert(declared);
                }
                self.emit(format!("|{}| {{", params));
                self.push_frame(FrameKind::Closure, "}", i);
            }
        }
        self.skip(i + 1, brace);
        Ok(brace + 1)
    }

    fn for_loop(&mut self, i: usize) -> Result<usize, ScriptError> {
        let line = self.line(i);
        let open = match self.next_sig(i) {
            Some(open) if self.punct_at(open) == Some("(") => open,
            _ => {
                self.emit("for");
                return Ok(i + 1);
            }
        };
        let close = self.matching(open)?;
        let inner: Vec<usize> = (open + 1..close)
            .filter(|&j| self.tokens[j].is_significant())
            .collect();

        let mut k = 0;
        if inner
            .first()
            .and_then(|&j| self.ident_at(j))
            .map_or(false, |w| matches!(w, "let" | "const" | "var" | "def"))
        {
            k = 1;
        }

        let var = inner.get(k).and_then(|&j| self.ident_at(j));
        let keyword = inner.get(k + 1).and_then(|&j| self.ident_at(j));
        if let (Some(var), Some(keyword @ ("of" | "in")), Some(&iterable)) =
            (var, keyword, inner.get(k + 2))
        {
            let var = var.to_string();
            let keys = keyword == "in" && !self.groovy();
            self.emit(format!("for {} in ", var));
            if keys {
                self.emit("(");
                self.push_frame(FrameKind::Paren, ").keys()", open);
            } else {
                self.push_frame(FrameKind::Paren, "", open);
            }
            self.skip(i + 1, iterable);
            return Ok(iterable);
        }

        self.counting_loop(i, open, close, &inner[k..])
            .ok_or_else(|| error(line, "unsupported for loop; use for (x of items)"))
    }

    /// `for (i = a; i < b; i++)` as `for i in (a)..(b)`.
    fn counting_loop(
        &mut self,
        i: usize,
        open: usize,
        close: usize,
        inner: &[usize],
    ) -> Option<usize> {
        let var = self.ident_at(*inner.first()?)?.to_string();
        if self.punct_at(*inner.get(1)?) != Some("=") {
            return None;
        }
        let semis: Vec<usize> = (open + 1..close)
            .filter(|&j| self.punct_at(j) == Some(";"))
            .collect();
        let (&first, &second) = (semis.first()?, semis.get(1)?);

        let cond: Vec<usize> = inner.iter().copied().filter(|&j| j > first && j < second).collect();
        if self.ident_at(*cond.first()?)? != var {
            return None;
        }
        let inclusive = match self.punct_at(*cond.get(1)?)? {
            "<" => false,
            "<=" => true,
            _ => return None,
        };

        let step: Vec<usize> = inner.iter().copied().filter(|&j| j > second).collect();
        let step_ok = match step.as_slice() {
            [a, b] => {
                (self.ident_at(*a) == Some(var.as_str()) && self.punct_at(*b) == Some("++"))
                    || (self.punct_at(*a) == Some("++") && self.ident_at(*b) == Some(var.as_str()))
            }
            [a, b, c] => {
                self.ident_at(*a) == Some(var.as_str())
                    && self.punct_at(*b) == Some("+=")
                    && matches!(&self.tokens[*c].tok, Tok::Number(n) if n == "1")
            }
            _ => false,
        };
        if !step_ok {
            return None;
        }

        let start = self.render(inner[1] + 1, first);
        let end = self.render(cond[1] + 1, second);
        let range = if inclusive { "..=" } else { ".." };
        self.emit(format!("for {} in ({}){}({})", var, start, range, end));
        self.skip(i + 1, close + 1);
        Some(close + 1)
    }

    /// `typeof a.b` as `typeof(a.b)`.
    fn type_of(&mut self, i: usize) -> Result<usize, ScriptError> {
        let line = self.line(i);
        let first = self
            .next_sig(i)
            .filter(|&j| self.ident_at(j).is_some())
            .ok_or_else(|| error(line, "typeof needs a variable or property"))?;
        let mut end = first + 1;
        while self.punct_at(end) == Some(".") && self.ident_at(end + 1).is_some() {
            end += 2;
        }
        let operand = self.render(first, end);
        self.emit(format!("typeof({})", operand));
        self.skip(i + 1, end);
        Ok(end)
    }

    /// `new SomeError(args)` as `(args)`; other constructors are rejected.
    fn new_expression(&mut self, i: usize) -> Result<usize, ScriptError> {
        let line = self.line(i);
        let name = self.next_sig(i).filter(|&j| {
            self.ident_at(j).map_or(false, |n| n.ends_with("Error") || n == "Exception")
        });
        match name.and_then(|j| self.next_sig(j)) {
            Some(open) if self.punct_at(open) == Some("(") => {
                self.skip(i + 1, open);
                Ok(open)
            }
            _ => Err(error(line, "'new' is only supported for error values")),
        }
    }

    fn punct(&mut self, i: usize, p: &'static str) -> Result<usize, ScriptError> {
        match p {
            "===" => self.emit("=="),
            "!==" => self.emit("!="),
            "{" => return self.open_brace(i),
            "(" => return self.open_paren(i),
            "[" => return self.open_bracket(i),
            "}" | ")" | "]" => self.close_frame(i, p)?,
            ";" => {
                self.close_commands();
                self.emit(";");
            }
            "++" | "--" => {
                let postfix = self.prev_sig(i).map_or(false, |prev| {
                    self.ident_at(prev).is_some() || matches!(self.punct_at(prev), Some(")" | "]"))
                });
                if !postfix {
                    return Err(error(self.line(i), format!("prefix {} is not supported", p)));
                }
                self.emit(if p == "++" { " += 1" } else { " -= 1" });
            }
            ".." if self.groovy() => self.emit("..="),
            "..<" if self.groovy() => self.emit(".."),
            "?:" if self.groovy() => self.emit("??"),
            ":" if matches!(self.frames.last(), Some(f) if f.kind == FrameKind::Command) => {
                self.emit(",")
            }
            "/=" => {
                return Err(error(
                    self.line(i),
                    "'/=' is not supported; write x = x / y",
                ));
            }
            "=>" | "->" => {
                return Err(error(self.line(i), format!("unexpected '{}'", p)));
            }
            _ => self.emit(p),
        }
        Ok(i + 1)
    }

    fn close_frame(&mut self, i: usize, p: &str) -> Result<(), ScriptError> {
        self.close_commands();
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| error(self.line(i), format!("unexpected '{}'", p)))?;
        let matches_kind = match p {
            "}" => matches!(
                frame.kind,
                FrameKind::Block | FrameKind::Closure | FrameKind::Function | FrameKind::Object
            ),
            ")" => frame.kind == FrameKind::Paren,
            _ => matches!(frame.kind, FrameKind::Bracket | FrameKind::Map),
        };
        if !matches_kind {
            return Err(error(self.line(i), format!("unbalanced '{}'", p)));
        }
        self.emit(frame.close);
        self.last_closed = Some(frame.kind);
        Ok(())
    }

    fn open_paren(&mut self, i: usize) -> Result<usize, ScriptError> {
        if !self.groovy() {
            let close = self.matching(i)?;
            if let Some(arrow) = self.next_sig(close).filter(|&a| self.punct_at(a) == Some("=>")) {
                let params = self.params(i, close)?;
                return Ok(self.arrow_body(i, arrow, params));
            }
        }
        self.emit("(");
        self.push_frame(FrameKind::Paren, ")", i);
        Ok(i + 1)
    }

    fn open_bracket(&mut self, i: usize) -> Result<usize, ScriptError> {
        if self.groovy() {
            if let Some(colon) = self.next_sig(i).filter(|&c| self.punct_at(c) == Some(":")) {
                if let Some(end) = self.next_sig(colon).filter(|&e| self.punct_at(e) == Some("]")) {
                    self.emit("#{}");
                    self.skip(i + 1, end + 1);
                    self.last_closed = Some(FrameKind::Map);
                    return Ok(end + 1);
                }
            }
            if self.is_map_literal(i)? {
                self.emit("#{");
                self.push_frame(FrameKind::Map, "}", i);
                return Ok(i + 1);
            }
        }
        self.emit("[");
        self.push_frame(FrameKind::Bracket, "]", i);
        Ok(i + 1)
    }

    fn is_map_literal(&self, open: usize) -> Result<bool, ScriptError> {
        let close = self.matching(open)?;
        let mut depth = 0usize;
        for j in open + 1..close {
            match self.punct_at(j) {
                Some("(" | "[" | "{") => depth += 1,
                Some(")" | "]" | "}") => depth = depth.saturating_sub(1),
                Some(":") if depth == 0 => return Ok(true),
                _ => {}
            }
        }
        Ok(false)
    }

    fn open_brace(&mut self, i: usize) -> Result<usize, ScriptError> {
        if self.groovy() {
            if self.groovy_block(i) {
                self.emit("{");
                self.push_frame(FrameKind::Block, "}", i);
                return Ok(i + 1);
            }
            return self.groovy_closure(i);
        }

        let object = self.prev_sig(i).map_or(false, |p| {
            matches!(
                self.punct_at(p),
                Some("=" | "(" | "," | ":" | "[" | "?" | "??" | "||" | "&&")
            ) || self.ident_at(p) == Some("return")
        });
        if object {
            self.emit("#{");
            self.push_frame(FrameKind::Object, "}", i);
        } else {
            self.emit("{");
            self.push_frame(FrameKind::Block, "}", i);
        }
        Ok(i + 1)
    }

    fn groovy_block(&self, i: usize) -> bool {
        let Some(prev) = self.prev_sig(i) else {
            return true;
        };
        if matches!(self.punct_at(prev), Some(";" | "{" | "}")) {
            return true;
        }
        if matches!(self.ident_at(prev), Some("else" | "try" | "finally" | "do")) {
            return true;
        }
        if self.punct_at(prev) == Some(")") {
            let owner = self
                .matching_back(prev)
                .and_then(|open| self.prev_sig(open))
                .and_then(|o| self.ident_at(o));
            return matches!(
                owner,
                Some("if" | "for" | "while" | "catch" | "switch" | "synchronized")
            );
        }
        false
    }

    fn groovy_closure(&mut self, i: usize) -> Result<usize, ScriptError> {
        let close = self.matching(i)?;

        let mut names = Vec::new();
        let mut body_start = None;
        let mut k = self.next_sig(i);
        while let Some(j) = k.filter(|&j| j < close) {
            if self.punct_at(j) == Some("->") {
                body_start = Some(j + 1);
                break;
            }
            match self.ident_at(j) {
                Some(name) => names.push(name.to_string()),
                None => break,
            }
            k = self.next_sig(j);
            match k {
                Some(c) if self.punct_at(c) == Some(",") => k = self.next_sig(c),
                Some(a) if self.punct_at(a) == Some("->") => continue,
                _ => break,
            }
        }

        let params = match body_start {
            Some(_) => names.join(", "),
            None if self.uses_it(i, close) => "it".to_string(),
            None => String::new(),
        };
        let body_start = body_start.unwrap_or(i + 1);

        let prev = self.prev_sig(i);
        let after_call = prev.map_or(false, |p| self.punct_at(p) == Some(")"));
        let after_name = prev
            .and_then(|p| self.ident_at(p))
            .map_or(false, |w| !matches!(w, "return" | "in"));

        if after_call && self.pop_close_paren() {
            let no_args = self
                .out
                .iter()
                .rev()
                .find(|piece| !piece.trim().is_empty())
                .map_or(false, |piece| piece.ends_with('('));
            let sep = if no_args { "" } else { ", " };
            self.emit(format!("{}|{}| {{", sep, params));
            self.push_frame(FrameKind::Closure, "})", i);
        } else if after_name {
            self.emit(format!("(|{}| {{", params));
            self.push_frame(FrameKind::Closure, "})", i);
        } else {
            if let Some(name) = self.declared_name(i) {
                self.callables.insert(name);
            }
            self.emit(format!("|{}| {{", params));
            self.push_frame(FrameKind::Closure, "}", i);
        }
        self.skip(i + 1, body_start);
        Ok(body_start)
    }

    fn uses_it(&self, open: usize, close: usize) -> bool {
        (open + 1..close).any(|j| {
            self.ident_at(j) == Some("it")
                && !self
                    .prev_sig(j)
                    .map_or(false, |p| matches!(self.punct_at(p), Some("." | "?.")))
        })
    }

    /// Removes the `)` just emitted so a trailing closure joins the call.
    fn pop_close_paren(&mut self) -> bool {
        let mut trailing = Vec::new();
        while let Some(last) = self.out.last() {
            if last.trim().is_empty() && !last.contains('\n') {
                if let Some(space) = self.out.pop() {
                    trailing.push(space);
                }
            } else {
                break;
            }
        }
        if self.out.last().map(String::as_str) == Some(")") {
            self.out.pop();
            self.last_sig_out = self.out.len();
            return true;
        }
        while let Some(space) = trailing.pop() {
            self.out.push(space);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js(source: &str) -> String {
        translate(source, ScriptLanguage::JavaScript).unwrap()
    }

    fn groovy(source: &str) -> String {
        translate(source, ScriptLanguage::Groovy).unwrap()
    }

    #[test]
    fn test_declarations_and_equality() {
        assert_eq!(js("const a = 1;\nvar b = a !== 2"), "let a = 1;\nlet b = a != 2");
        assert_eq!(js("let c = null"), "let c = ()");
    }

    #[test]
    fn test_semicolon_insertion() {
        assert_eq!(js("let a = 1\nlet b = 2\n"), "let a = 1;\nlet b = 2\n");
        assert_eq!(js("foo()\n  .bar()\nbaz()"), "foo()\n  .bar();\nbaz()");
        assert_eq!(js("let x = 1 // one\nx"), "let x = 1; // one\nx");
    }

    #[test]
    fn test_strings_and_regex() {
        assert_eq!(js(r#"let s = 'it"s'"#), r#"let s = "it\"s""#);
        assert_eq!(js(r"let s = 'don\'t'"), r#"let s = "don't""#);
        assert_eq!(
            js(r"expect(s).to.match(/^a\d+$/i)"),
            r#"expectBound(s, "s").to.matches("(?i)^a\\d+$")"#
        );
        assert_eq!(js("let r = a / b / c"), "let r = a / b / c");
    }

    #[test]
    fn test_string_replace_variants() {
        assert_eq!(js("s.replace('a', 'x')"), r#"s.replace("a", "x")"#);
        assert_eq!(js("s.replace(/a/, 'x')"), r#"s.replaceRegex("a", "x")"#);
        assert_eq!(js(r"s.replace(/\d/g, '#')"), r##"s.replaceRegexAll("\\d", "#")"##);
        assert_eq!(js("s.replaceAll('a', 'x')"), r#"s.replaceAll("a", "x")"#);
        assert_eq!(groovy("s.replace('a', 'x')"), r#"s.replaceAll("a", "x")"#);
        assert_eq!(groovy("s.replaceAll('a+', 'x')"), r#"s.replaceRegexAll("a+", "x")"#);
        assert_eq!(groovy("s.replaceFirst('a+', 'x')"), r#"s.replaceRegex("a+", "x")"#);
    }

    #[test]
    fn test_divide_assign_is_rejected() {
        let err = translate("let x = 4\nx /= 2", ScriptLanguage::JavaScript).unwrap_err();
        assert!(err.to_string().contains("'/=' is not supported"), "{}", err);
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_bare_variables_carry_their_name() {
        assert_eq!(
            js("pm.expect(a).to.equal(a)"),
            r#"pm.expectBound(a, "a").to.equalBound(a, "a")"#
        );
        assert_eq!(js("expect(a.b).to.equal(1)"), "expect(a.b).to.equal(1)");
        assert_eq!(js("expect(null).to.equal(x)"), r#"expect(()).to.equalBound(x, "x")"#);
        assert_eq!(js("equal(a)"), "equal(a)");
    }

    #[test]
    fn test_function_expression_and_test_block() {
        let source = "pm.test(\"ok\", function () {\n  pm.expect(1).to.equal(1)\n})";
        assert_eq!(
            js(source),
            "pm.test(\"ok\", || {\n  pm.expect(1).to.equal(1)\n})"
        );
    }

    #[test]
    fn test_arrow_functions() {
        assert_eq!(js("items.map(x => x * 2)"), "items.map(|x| x * 2)");
        assert_eq!(
            js("pm.test('a', () => {\n  x = 1\n  y = 2\n})"),
            "pm.test(\"a\", || {\n  x = 1;\n  y = 2\n})"
        );
        assert_eq!(
            js("let add = (a, b) => a + b\nadd(1, 2)"),
            "let add = |a, b| a + b;\nadd.call(1, 2)"
        );
    }

    #[test]
    fn test_named_function_declaration() {
        assert_eq!(
            js("function double(x) {\n  return x * 2\n}\ndouble(2)"),
            "let double = |x| {\n  return x * 2\n};\ndouble.call(2)"
        );
    }

    #[test]
    fn test_object_literals_and_blocks() {
        assert_eq!(js("let o = { a: 1, 'b': { c: 2 } }"), "let o = #{ a: 1, \"b\": #{ c: 2 } }");
        assert_eq!(js("if (x) {\n  y = 1\n}"), "if truthy(x) {\n  y = 1\n}");
    }

    #[test]
    fn test_property_renames() {
        assert_eq!(
            js("expect(a).to.be.true;\nexpect(b).to.not.be.null"),
            "expectBound(a, \"a\").to.be.is_true;\nexpectBound(b, \"b\").to.not.be.is_null"
        );
    }

    #[test]
    fn test_for_loops() {
        assert_eq!(js("for (const x of xs) {\n}"), "for x in xs {\n}");
        assert_eq!(js("for (const k in obj) {}"), "for k in (obj).keys() {}");
        assert_eq!(
            js("for (let i = 0; i < items.length; i++) {}"),
            "for i in (0)..(items.length) {}"
        );
        assert!(translate("for (;;) {}", ScriptLanguage::JavaScript).is_err());
    }

    #[test]
    fn test_increment_typeof_and_throw() {
        assert_eq!(js("count++"), "count += 1");
        assert_eq!(js("let t = typeof a.b"), "let t = typeof(a.b)");
        assert_eq!(js("throw new Error('bad')"), "throw (\"bad\")");
        assert!(translate("let d = new Date()", ScriptLanguage::JavaScript).is_err());
    }

    #[test]
    fn test_line_numbers_are_preserved() {
        let source = "let a = 1\n\nfunction f(\n  x\n) {\n  return x\n}\nlet s = `a\nb`\n";
        let out = js(source);
        assert_eq!(out.lines().count(), source.lines().count());
    }

    #[test]
    fn test_translation_errors_carry_line() {
        let err = translate("let a = 1\nlet s = 'open", ScriptLanguage::JavaScript).unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(translate("await x", ScriptLanguage::JavaScript).is_err());
        assert!(translate("if (x) {", ScriptLanguage::JavaScript).is_err());
    }

    #[test]
    fn test_groovy_closures() {
        assert_eq!(groovy("items.each { println it }"), "items.each (|it| { println(it) })");
        assert_eq!(groovy("def f = { a, b -> a + b }\nf(1, 2)"), "let f = |a, b| { a + b };\nf.call(1, 2)");
        assert_eq!(
            groovy("test(\"ok\") {\n  assert x == 1\n}"),
            "test(\"ok\", || {\n  assert(x == 1)\n})"
        );
        assert_eq!(groovy("run() { x }"), "run(|| { x })");
    }

    #[test]
    fn test_groovy_blocks_are_not_closures() {
        assert_eq!(
            groovy("if (a) {\n  b = 1\n} else {\n  b = 2\n}"),
            "if truthy(a) {\n  b = 1\n} else {\n  b = 2\n}"
        );
        assert_eq!(groovy("for (x in xs) { println x }"), "for x in xs { println(x) }");
    }

    #[test]
    fn test_groovy_literals() {
        assert_eq!(groovy("def m = [name: 'x', n: 1]"), "let m = #{name: \"x\", n: 1}");
        assert_eq!(groovy("def e = [:]"), "let e = #{}");
        assert_eq!(groovy("def l = [1, 2]"), "let l = [1, 2]");
        assert_eq!(groovy("def r = 1..3"), "let r = 1..=3");
        assert_eq!(groovy("def v = a ?: b"), "let v = a ?? b");
        assert_eq!(groovy("println \"id: $user.id ${n}\""), "println(`id: ${user.id} ${n}`)");
        assert_eq!(
            groovy("assert ok : \"failed\""),
            "assert(ok , \"failed\")"
        );
    }
}
