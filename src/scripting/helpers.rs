//! Global helpers shared by both script syntaxes: console output, `JSON`,
//! base64, number parsing and the collection methods used by Groovy-style
//! closures (`each`, `collect`, `find`, ...).

use super::assertions::is_truthy;
use super::convert::{dynamic_to_json, js_type_name, json_to_dynamic};
use super::error::ScriptError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use rhai::{
    Array, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, NativeCallContext, FLOAT,
    INT,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Bounded collector for console output of one invocation.
#[derive(Debug, Clone)]
pub(crate) struct LogSink {
    lines: Arc<Mutex<Vec<String>>>,
    dropped: Arc<AtomicUsize>,
    limit: usize,
}

impl LogSink {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            dropped: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    pub(crate) fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        if lines.len() < self.limit {
            lines.push(line.into());
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Captured lines, with a trailer when lines were dropped.
    pub(crate) fn take(&self) -> Vec<String> {
        let mut lines =
            std::mem::take(&mut *self.lines.lock().unwrap_or_else(|p| p.into_inner()));
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            lines.push(format!("... {} more log lines dropped", dropped));
        }
        lines
    }
}

/// `console` global.
#[derive(Debug, Clone)]
pub(crate) struct Console;

/// `JSON` global.
#[derive(Debug, Clone)]
pub(crate) struct JsonApi;

/// Joins console arguments the way a browser console prints them.
fn join_args(args: &[Dynamic]) -> String {
    args.iter()
        .map(to_display)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text form of a value for printing: strings raw, everything else as JSON.
pub(crate) fn to_display(value: &Dynamic) -> String {
    let value = value.flatten_clone();
    if value.is_string() || value.is_char() {
        return value.to_string();
    }
    match dynamic_to_json(&value) {
        serde_json::Value::Null => "undefined".to_string(),
        other => other.to_string(),
    }
}

fn register_console(engine: &mut Engine, logs: &LogSink) {
    engine.register_type_with_name::<Console>("Console");

    for level in ["log", "info", "warn", "error"] {
        let prefix = match level {
            "log" | "info" => String::new(),
            other => format!("[{}] ", other),
        };

        let (sink, p) = (logs.clone(), prefix.clone());
        engine.register_fn(level, move |_: Console| sink.push(p.clone()));
        let (sink, p) = (logs.clone(), prefix.clone());
        engine.register_fn(level, move |_: Console, a: Dynamic| {
            sink.push(format!("{}{}", p, join_args(&[a])))
        });
        let (sink, p) = (logs.clone(), prefix.clone());
        engine.register_fn(level, move |_: Console, a: Dynamic, b: Dynamic| {
            sink.push(format!("{}{}", p, join_args(&[a, b])))
        });
        let (sink, p) = (logs.clone(), prefix.clone());
        engine.register_fn(
            level,
            move |_: Console, a: Dynamic, b: Dynamic, c: Dynamic| {
                sink.push(format!("{}{}", p, join_args(&[a, b, c])))
            },
        );
        let (sink, p) = (logs.clone(), prefix);
        engine.register_fn(
            level,
            move |_: Console, a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| {
                sink.push(format!("{}{}", p, join_args(&[a, b, c, d])))
            },
        );
    }

    let sink = logs.clone();
    engine.register_fn("println", move |value: Dynamic| sink.push(to_display(&value)));
    let sink = logs.clone();
    engine.register_fn("println", move || sink.push(String::new()));

    let sink = logs.clone();
    engine.on_print(move |text| sink.push(text));
    let sink = logs.clone();
    engine.on_debug(move |text, _source, _position| sink.push(format!("[debug] {}", text)));
}

fn register_json(engine: &mut Engine) {
    engine.register_type_with_name::<JsonApi>("JSON");

    engine.register_fn("parse", |_: JsonApi, text: &str| -> HostResult<Dynamic> {
        parse_json(text)
    });
    engine.register_fn("stringify", |_: JsonApi, value: Dynamic| {
        dynamic_to_json(&value).to_string()
    });
    engine.register_fn(
        "stringify",
        |_: JsonApi, value: Dynamic, _replacer: Dynamic, indent: INT| -> HostResult<String> {
            let json = dynamic_to_json(&value);
            if indent <= 0 {
                return Ok(json.to_string());
            }
            serde_json::to_string_pretty(&json)
                .map_err(|e| ScriptError::runtime(e.to_string()).into_rhai())
        },
    );
}

pub(crate) fn parse_json(text: &str) -> HostResult<Dynamic> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|value| json_to_dynamic(&value))
        .map_err(|e| ScriptError::runtime(format!("JSON.parse: {}", e)).into_rhai())
}

fn register_encoding(engine: &mut Engine) {
    engine.register_fn("btoa", |text: &str| STANDARD.encode(text.as_bytes()));
    engine.register_fn("atob", |encoded: &str| -> HostResult<String> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ScriptError::runtime(format!("atob: {}", e)).into_rhai())?;
        String::from_utf8(bytes)
            .map_err(|e| ScriptError::runtime(format!("atob: {}", e)).into_rhai())
    });

    engine.register_fn("parseInt", |text: &str| parse_int(text, 10));
    engine.register_fn("parseInt", |text: &str, radix: INT| parse_int(text, radix));
    engine.register_fn("parseInt", |value: INT| Dynamic::from_int(value));
    engine.register_fn("parseFloat", parse_float);
    engine.register_fn("parseFloat", |value: INT| Dynamic::from_float(value as FLOAT));
    engine.register_fn("typeof", |value: Dynamic| js_type_name(&value).to_string());
}

/// Leading integer of `text`, or unit when there is none.
fn parse_int(text: &str, radix: INT) -> Dynamic {
    let radix = if (2..=36).contains(&radix) { radix as u32 } else { 10 };
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map_or(digits.len(), |(i, _)| i);

    match INT::from_str_radix(&digits[..end], radix) {
        Ok(value) if negative => Dynamic::from_int(-value),
        Ok(value) => Dynamic::from_int(value),
        Err(_) => Dynamic::UNIT,
    }
}

/// Leading decimal number of `text`, or unit when there is none.
fn parse_float(text: &str) -> Dynamic {
    let trimmed = text.trim();
    let mut end = 0;
    for (i, _) in trimmed.char_indices().skip(1) {
        if trimmed[..i].parse::<FLOAT>().is_ok() {
            end = i;
        }
    }
    if trimmed.parse::<FLOAT>().is_ok() {
        end = trimmed.len();
    }
    match trimmed[..end].parse::<FLOAT>() {
        Ok(value) if end > 0 => Dynamic::from_float(value),
        _ => Dynamic::UNIT,
    }
}

fn call1(ctx: &NativeCallContext, f: &FnPtr, item: Dynamic) -> HostResult<Dynamic> {
    f.call_within_context::<Dynamic>(ctx, (item,))
}

/// Calls `f` for its side effects only.
fn visit(ctx: &NativeCallContext, f: &FnPtr, item: Dynamic) -> HostResult<()> {
    call1(ctx, f, item).map(|_| ())
}

fn register_collections(engine: &mut Engine) {
    for name in ["each", "forEach"] {
        engine.register_fn(
            name,
            |ctx: NativeCallContext, items: Array, f: FnPtr| -> HostResult<()> {
                for item in items {
                    visit(&ctx, &f, item)?;
                }
                Ok(())
            },
        );
        engine.register_fn(
            name,
            |ctx: NativeCallContext, fields: Map, f: FnPtr| -> HostResult<()> {
                for (key, value) in fields {
                    let mut entry = Map::new();
                    entry.insert("key".into(), Dynamic::from(key.to_string()));
                    entry.insert("value".into(), value);
                    visit(&ctx, &f, Dynamic::from_map(entry))?;
                }
                Ok(())
            },
        );
    }

    engine.register_fn(
        "collect",
        |ctx: NativeCallContext, items: Array, f: FnPtr| -> HostResult<Array> {
            items.into_iter().map(|item| call1(&ctx, &f, item)).collect()
        },
    );
    engine.register_fn(
        "find",
        |ctx: NativeCallContext, items: Array, f: FnPtr| -> HostResult<Dynamic> {
            for item in items {
                if is_truthy(&call1(&ctx, &f, item.clone())?) {
                    return Ok(item);
                }
            }
            Ok(Dynamic::UNIT)
        },
    );
    engine.register_fn(
        "findAll",
        |ctx: NativeCallContext, items: Array, f: FnPtr| -> HostResult<Array> {
            let mut found = Array::new();
            for item in items {
                if is_truthy(&call1(&ctx, &f, item.clone())?) {
                    found.push(item);
                }
            }
            Ok(found)
        },
    );
    engine.register_fn(
        "any",
        |ctx: NativeCallContext, items: Array, f: FnPtr| -> HostResult<bool> {
            for item in items {
                if is_truthy(&call1(&ctx, &f, item)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        },
    );
    engine.register_fn(
        "every",
        |ctx: NativeCallContext, items: Array, f: FnPtr| -> HostResult<bool> {
            for item in items {
                if !is_truthy(&call1(&ctx, &f, item)?) {
                    return Ok(false);
                }
            }
            Ok(true)
        },
    );

    engine.register_fn("includes", |items: Array, needle: Dynamic| {
        let needle = dynamic_to_json(&needle);
        items.iter().any(|item| dynamic_to_json(item) == needle)
    });
    engine.register_fn("size", |items: Array| items.len() as INT);
    engine.register_fn("size", |fields: Map| fields.len() as INT);
    engine.register_fn("size", |text: ImmutableString| text.chars().count() as INT);
    engine.register_get("length", |items: &mut Array| items.len() as INT);
    engine.register_get("length", |text: &mut ImmutableString| {
        text.chars().count() as INT
    });
    engine.register_fn("join", |items: Array, separator: &str| {
        items.iter().map(to_display).collect::<Vec<_>>().join(separator)
    });
}

fn register_strings(engine: &mut Engine) {
    engine.register_fn("includes", |text: &str, needle: &str| text.contains(needle));
    engine.register_fn("startsWith", |text: &str, prefix: &str| text.starts_with(prefix));
    engine.register_fn("endsWith", |text: &str, suffix: &str| text.ends_with(suffix));
    engine.register_fn("toUpperCase", |text: &str| text.to_uppercase());
    engine.register_fn("toLowerCase", |text: &str| text.to_lowercase());

    // These shadow Rhai's in-place string methods, which return unit.
    engine.register_fn("trim", |text: &str| text.trim().to_string());
    engine.register_fn("trimStart", |text: &str| text.trim_start().to_string());
    engine.register_fn("trimEnd", |text: &str| text.trim_end().to_string());
    engine.register_fn("replace", |text: &str, from: &str, to: &str| {
        text.replacen(from, to, 1)
    });
    engine.register_fn("replaceAll", |text: &str, from: &str, to: &str| {
        text.replace(from, to)
    });
    engine.register_fn("replaceRegex", |text: &str, pattern: &str, to: &str| {
        regex_replace(text, pattern, to, false)
    });
    engine.register_fn("replaceRegexAll", |text: &str, pattern: &str, to: &str| {
        regex_replace(text, pattern, to, true)
    });
    engine.register_fn("indexOf", |text: &str, needle: &str| -> INT {
        text.find(needle)
            .map_or(-1, |byte| text[..byte].chars().count() as INT)
    });
    engine.register_fn("substring", |text: &str, start: INT| {
        substring(text, start, INT::MAX)
    });
    engine.register_fn("substring", |text: &str, start: INT, end: INT| {
        substring(text, start, end)
    });
    engine.register_fn("toString", |value: Dynamic| to_display(&value));
    engine.register_fn("matches", |text: &str, pattern: &str| -> HostResult<bool> {
        Regex::new(pattern)
            .map(|regex| regex.is_match(text))
            .map_err(|e| {
                ScriptError::runtime(format!("Invalid pattern '{}': {}", pattern, e)).into_rhai()
            })
    });
}

/// `$1` and `$&` references in a replacement, in the `${1}` form the regex
/// crate expects.
fn replacement_template(to: &str) -> String {
    let mut out = String::with_capacity(to.len());
    let mut chars = to.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    group.push(*d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", group));
            }
            _ => out.push_str("$$"),
        }
    }
    out
}

fn regex_replace(text: &str, pattern: &str, to: &str, all: bool) -> HostResult<String> {
    let regex = Regex::new(pattern).map_err(|e| {
        ScriptError::runtime(format!("Invalid pattern '{}': {}", pattern, e)).into_rhai()
    })?;
    let template = replacement_template(to);
    let replaced = if all {
        regex.replace_all(text, template.as_str())
    } else {
        regex.replace(text, template.as_str())
    };
    Ok(replaced.into_owned())
}

/// Characters `[start, end)`; negative bounds clamp to 0 and reversed bounds swap.
fn substring(text: &str, start: INT, end: INT) -> String {
    let clamp = |n: INT| n.max(0) as usize;
    let (from, to) = (clamp(start.min(end)), clamp(start.max(end)));
    text.chars().skip(from).take(to - from).collect()
}

/// Integer division that yields a float when the quotient is inexact.
fn divide(a: INT, b: INT) -> Dynamic {
    match (a.checked_rem(b), a.checked_div(b)) {
        (Some(0), Some(quotient)) => Dynamic::from_int(quotient),
        _ => Dynamic::from_float(a as FLOAT / b as FLOAT),
    }
}

fn register_arithmetic(engine: &mut Engine) {
    // Overloads of built-in operators only run with fast operators off.
    engine.set_fast_operators(false);
    engine.register_fn("/", divide);
}

fn register_assert(engine: &mut Engine) {
    engine.register_fn("truthy", |value: Dynamic| is_truthy(&value));
    engine.register_fn("assert", |condition: Dynamic| -> HostResult<()> {
        if is_truthy(&condition) {
            Ok(())
        } else {
            Err(ScriptError::Assertion("assertion failed".to_string()).into_rhai())
        }
    });
    engine.register_fn(
        "assert",
        |condition: Dynamic, message: Dynamic| -> HostResult<()> {
            if is_truthy(&condition) {
                Ok(())
            } else {
                Err(ScriptError::Assertion(to_display(&message)).into_rhai())
            }
        },
    );
}

/// Registers every helper on `engine`; console output goes to `logs`.
pub(crate) fn register(engine: &mut Engine, logs: &LogSink) {
    register_console(engine, logs);
    register_json(engine);
    register_encoding(engine);
    register_collections(engine);
    register_strings(engine);
    register_arithmetic(engine);
    register_assert(engine);
}
