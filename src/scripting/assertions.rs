//! Chainable `expect(value)` assertions.
//!
//! ```text
//! expect(5).to.be.above(1);
//! expect(json.items).to.have.length(3);
//! expect([1, 2]).to.eql([1, 2]);
//! expect(body).to.not.include("error");
//! ```
//!
//! `equal` is strict: scalars compare by type and value (ints and floats
//! compare numerically). Values reaching a host function are copies, so two
//! arrays or objects are `equal` only when both sides name the same variable
//! (`expect(a).to.equal(a)`). Use `eql` or `deep.equal` for structural
//! comparison.

use super::convert::{as_number, describe, dynamic_to_json, js_type_name};
use super::error::ScriptError;
use regex::Regex;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, FLOAT, INT};

type CheckResult = Result<Expectation, Box<EvalAltResult>>;

/// Words that only make a chain read naturally.
const CHAIN_WORDS: &[&str] = &[
    "to", "be", "been", "that", "which", "and", "has", "have", "with_", "at", "of", "same",
    "does", "is",
];

/// Subject of an assertion chain plus its modifier flags.
#[derive(Debug, Clone)]
pub struct Expectation {
    value: Dynamic,
    /// Script variable the subject was read from, if it was a bare name.
    binding: Option<ImmutableString>,
    negated: bool,
    deep: bool,
}

impl Expectation {
    pub fn new(value: Dynamic) -> Self {
        Self {
            value: value.flatten_clone(),
            binding: None,
            negated: false,
            deep: false,
        }
    }

    /// Subject read from the variable `binding`.
    pub fn bound(value: Dynamic, binding: impl Into<ImmutableString>) -> Self {
        Self {
            binding: Some(binding.into()),
            ..Self::new(value)
        }
    }

    fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Passes when `pass` agrees with the negation flag.
    ///
    /// `claim` completes "expected X to ..."; negated chains insert "not".
    fn check(&self, pass: bool, claim: impl FnOnce() -> String) -> CheckResult {
        if pass != self.negated {
            return Ok(self.clone());
        }
        let not = if self.negated { "not " } else { "" };
        Err(ScriptError::Assertion(format!(
            "expected {} to {}{}",
            describe(&self.value),
            not,
            claim()
        ))
        .into_rhai())
    }

    fn compare(&self, other: &Dynamic) -> bool {
        if self.deep {
            deep_equal(&self.value, other)
        } else {
            strict_equal(&self.value, other)
        }
    }

    fn number(&self) -> Result<FLOAT, Box<EvalAltResult>> {
        as_number(&self.value).ok_or_else(|| {
            ScriptError::Assertion(format!(
                "expected {} to be a number",
                describe(&self.value)
            ))
            .into_rhai()
        })
    }

    pub fn equal(&self, expected: Dynamic) -> CheckResult {
        let pass = self.compare(&expected);
        let verb = if self.deep { "deeply equal" } else { "equal" };
        self.check(pass, || format!("{} {}", verb, describe(&expected)))
    }

    /// `equal` against the variable `binding`; the same variable on both
    /// sides is one reference.
    pub fn equal_bound(&self, expected: Dynamic, binding: &str) -> CheckResult {
        let same_reference = self.binding.as_deref() == Some(binding);
        let pass = (same_reference && is_composite(&self.value)) || self.compare(&expected);
        let verb = if self.deep { "deeply equal" } else { "equal" };
        self.check(pass, || format!("{} {}", verb, describe(&expected)))
    }

    pub fn eql(&self, expected: Dynamic) -> CheckResult {
        let pass = deep_equal(&self.value, &expected);
        self.check(pass, || format!("deeply equal {}", describe(&expected)))
    }

    pub fn a(&self, type_name: &str) -> CheckResult {
        let wanted = type_name.to_ascii_lowercase();
        let actual = js_type_name(&self.value);
        let pass = actual == wanted || (self.value.is_unit() && wanted == "null");
        let article = if wanted.starts_with(['a', 'e', 'i', 'o', 'u']) {
            "an"
        } else {
            "a"
        };
        self.check(pass, || format!("be {} {}", article, wanted))
    }

    pub fn an(&self, type_name: &str) -> CheckResult {
        self.a(type_name)
    }

    pub fn ok(&self) -> CheckResult {
        self.check(is_truthy(&self.value), || "be truthy".to_string())
    }

    pub fn is_true(&self) -> CheckResult {
        let pass = self.value.as_bool() == Ok(true);
        self.check(pass, || "be true".to_string())
    }

    pub fn is_false(&self) -> CheckResult {
        let pass = self.value.as_bool() == Ok(false);
        self.check(pass, || "be false".to_string())
    }

    pub fn is_null(&self) -> CheckResult {
        self.check(self.value.is_unit(), || "be null".to_string())
    }

    pub fn is_undefined(&self) -> CheckResult {
        self.check(self.value.is_unit(), || "be undefined".to_string())
    }

    pub fn exist(&self) -> CheckResult {
        self.check(!self.value.is_unit(), || "exist".to_string())
    }

    pub fn empty(&self) -> CheckResult {
        let pass = length_of(&self.value) == Some(0);
        self.check(pass, || "be empty".to_string())
    }

    /// Asserts a property exists (and optionally equals `expected`).
    ///
    /// A passing, non-negated check continues the chain on the property value.
    pub fn property(&self, key: &str, expected: Option<Dynamic>) -> CheckResult {
        let found = self
            .value
            .read_lock::<Map>()
            .and_then(|map| map.get(key).cloned());

        let pass = match (&found, &expected) {
            (Some(actual), Some(expected)) => {
                if self.deep {
                    deep_equal(actual, expected)
                } else {
                    strict_equal(actual, expected)
                }
            }
            (Some(_), None) => true,
            (None, _) => false,
        };

        let mut next = self.check(pass, || match &expected {
            Some(expected) => format!("have property '{}' of {}", key, describe(expected)),
            None => format!("have property '{}'", key),
        })?;
        if let (false, Some(value)) = (self.negated, found) {
            next.value = value;
            next.binding = None;
        }
        Ok(next)
    }

    pub fn length(&self, expected: INT) -> CheckResult {
        let actual = length_of(&self.value);
        let pass = actual == Some(expected);
        self.check(pass, || match actual {
            Some(actual) => format!("have length {} but got {}", expected, actual),
            None => format!("have length {}", expected),
        })
    }

    pub fn include(&self, item: Dynamic) -> CheckResult {
        let pass = if let Some(text) = as_text(&self.value) {
            as_text(&item).map_or(false, |needle| text.contains(needle.as_str()))
        } else if let Some(items) = self.value.read_lock::<Array>() {
            items.iter().any(|candidate| {
                if self.deep {
                    deep_equal(candidate, &item)
                } else {
                    strict_equal(candidate, &item)
                }
            })
        } else if let Some(fields) = self.value.read_lock::<Map>() {
            match item.read_lock::<Map>() {
                Some(subset) => subset.iter().all(|(k, v)| {
                    fields.get(k.as_str()).map_or(false, |actual| deep_equal(actual, v))
                }),
                None => as_text(&item).map_or(false, |key| fields.contains_key(key.as_str())),
            }
        } else {
            false
        };
        self.check(pass, || format!("include {}", describe(&item)))
    }

    pub fn matches(&self, pattern: &str) -> CheckResult {
        let regex = Regex::new(pattern).map_err(|e| {
            ScriptError::runtime(format!("Invalid pattern '{}': {}", pattern, e)).into_rhai()
        })?;
        let pass = as_text(&self.value).map_or(false, |text| regex.is_match(&text));
        self.check(pass, || format!("match /{}/", pattern))
    }

    pub fn above(&self, bound: Dynamic) -> CheckResult {
        let limit = bound_number(&bound)?;
        let pass = self.number()? > limit;
        self.check(pass, || format!("be above {}", describe(&bound)))
    }

    pub fn below(&self, bound: Dynamic) -> CheckResult {
        let limit = bound_number(&bound)?;
        let pass = self.number()? < limit;
        self.check(pass, || format!("be below {}", describe(&bound)))
    }

    pub fn least(&self, bound: Dynamic) -> CheckResult {
        let limit = bound_number(&bound)?;
        let pass = self.number()? >= limit;
        self.check(pass, || format!("be at least {}", describe(&bound)))
    }

    pub fn most(&self, bound: Dynamic) -> CheckResult {
        let limit = bound_number(&bound)?;
        let pass = self.number()? <= limit;
        self.check(pass, || format!("be at most {}", describe(&bound)))
    }

    pub fn within(&self, low: Dynamic, high: Dynamic) -> CheckResult {
        let (lo, hi) = (bound_number(&low)?, bound_number(&high)?);
        let actual = self.number()?;
        let pass = actual >= lo && actual <= hi;
        self.check(pass, || {
            format!("be within {}..{}", describe(&low), describe(&high))
        })
    }

    pub fn one_of(&self, options: Array) -> CheckResult {
        let pass = options.iter().any(|option| self.compare(option));
        let list = Dynamic::from_array(options);
        self.check(pass, || format!("be one of {}", describe(&list)))
    }
}

fn bound_number(value: &Dynamic) -> Result<FLOAT, Box<EvalAltResult>> {
    as_number(value).ok_or_else(|| {
        ScriptError::runtime(format!("{} is not a number", describe(value))).into_rhai()
    })
}

fn as_text(value: &Dynamic) -> Option<String> {
    if value.is_string() || value.is_char() {
        Some(value.to_string())
    } else {
        None
    }
}

fn length_of(value: &Dynamic) -> Option<INT> {
    if let Some(text) = as_text(value) {
        return Some(text.chars().count() as INT);
    }
    if let Some(items) = value.read_lock::<Array>() {
        return Some(items.len() as INT);
    }
    value.read_lock::<Map>().map(|fields| fields.len() as INT)
}

pub(crate) fn is_truthy(value: &Dynamic) -> bool {
    if value.is_unit() {
        return false;
    }
    if let Ok(b) = value.as_bool() {
        return b;
    }
    if let Some(n) = as_number(value) {
        return n != 0.0 && !n.is_nan();
    }
    if let Some(text) = as_text(value) {
        return !text.is_empty();
    }
    true
}

fn is_composite(value: &Dynamic) -> bool {
    value.is_array() || value.is_map()
}

/// Strict equality over copies: same scalar type and value, composites never
/// equal.
pub(crate) fn strict_equal(left: &Dynamic, right: &Dynamic) -> bool {
    if is_composite(left) || is_composite(right) {
        return false;
    }
    if left.is_unit() || right.is_unit() {
        return left.is_unit() && right.is_unit();
    }
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a == b;
    }
    if let (Ok(a), Ok(b)) = (left.as_bool(), right.as_bool()) {
        return a == b;
    }
    match (as_text(left), as_text(right)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Structural equality over the JSON form of both values.
pub(crate) fn deep_equal(left: &Dynamic, right: &Dynamic) -> bool {
    dynamic_to_json(left) == dynamic_to_json(right)
}

/// Registers the `Expectation` type, its chain words and checks.
pub(crate) fn register(engine: &mut Engine) {
    engine.register_type_with_name::<Expectation>("Expectation");

    for word in CHAIN_WORDS {
        engine.register_get(word, |e: &mut Expectation| e.clone());
    }
    engine.register_get("not", |e: &mut Expectation| e.clone().negate());
    engine.register_get("deep", |e: &mut Expectation| e.clone().deep());

    engine.register_get("ok", |e: &mut Expectation| e.ok());
    engine.register_get("is_true", |e: &mut Expectation| e.is_true());
    engine.register_get("is_false", |e: &mut Expectation| e.is_false());
    engine.register_get("is_null", |e: &mut Expectation| e.is_null());
    engine.register_get("is_undefined", |e: &mut Expectation| e.is_undefined());
    engine.register_get("exist", |e: &mut Expectation| e.exist());
    engine.register_get("empty", |e: &mut Expectation| e.empty());

    engine.register_fn("equal", |e: Expectation, v: Dynamic| e.equal(v));
    engine.register_fn("equals", |e: Expectation, v: Dynamic| e.equal(v));
    engine.register_fn("equalBound", |e: Expectation, v: Dynamic, name: &str| {
        e.equal_bound(v, name)
    });
    engine.register_fn("eql", |e: Expectation, v: Dynamic| e.eql(v));
    engine.register_fn("a", |e: Expectation, t: ImmutableString| e.a(&t));
    engine.register_fn("an", |e: Expectation, t: ImmutableString| e.an(&t));
    engine.register_fn("property", |e: Expectation, k: ImmutableString| {
        e.property(&k, None)
    });
    engine.register_fn(
        "property",
        |e: Expectation, k: ImmutableString, v: Dynamic| e.property(&k, Some(v)),
    );
    engine.register_fn("length", |e: Expectation, n: INT| e.length(n));
    engine.register_fn("lengthOf", |e: Expectation, n: INT| e.length(n));
    engine.register_fn("include", |e: Expectation, v: Dynamic| e.include(v));
    engine.register_fn("contain", |e: Expectation, v: Dynamic| e.include(v));
    engine.register_fn("includes", |e: Expectation, v: Dynamic| e.include(v));
    engine.register_fn("matches", |e: Expectation, p: ImmutableString| e.matches(&p));
    engine.register_fn("above", |e: Expectation, n: Dynamic| e.above(n));
    engine.register_fn("greaterThan", |e: Expectation, n: Dynamic| e.above(n));
    engine.register_fn("gt", |e: Expectation, n: Dynamic| e.above(n));
    engine.register_fn("below", |e: Expectation, n: Dynamic| e.below(n));
    engine.register_fn("lessThan", |e: Expectation, n: Dynamic| e.below(n));
    engine.register_fn("lt", |e: Expectation, n: Dynamic| e.below(n));
    engine.register_fn("least", |e: Expectation, n: Dynamic| e.least(n));
    engine.register_fn("most", |e: Expectation, n: Dynamic| e.most(n));
    engine.register_fn("within", |e: Expectation, lo: Dynamic, hi: Dynamic| {
        e.within(lo, hi)
    });
    engine.register_fn("oneOf", |e: Expectation, options: Array| e.one_of(options));

    engine.register_fn("expect", Expectation::new);
    engine.register_fn("expectBound", |value: Dynamic, name: &str| {
        Expectation::bound(value, name)
    });
}
