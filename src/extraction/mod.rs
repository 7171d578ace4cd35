//! Value extraction from response bodies and headers.
//!
//! Four extractors share one contract: `Ok(Some(value))` on a match,
//! `Ok(None)` when nothing matched, and `Err` only for malformed input or a
//! malformed query. [`ExtractionEngine`] binds them to a variable store.

pub mod engine;
pub mod error;
pub mod header;
pub mod jsonpath;
pub mod pattern;
pub mod xml;

pub use engine::{ExtractionEngine, ExtractionTarget};
pub use error::ExtractionError;
pub use header::{extract_from_header, headers_as_json, headers_as_text};
pub use jsonpath::{extract_from_json, json_value_to_string, JsonPath};
pub use pattern::{compile_pattern, extract_with_compiled, extract_with_regex, has_capture_group};
pub use xml::{extract_from_xml, parse_xml, XmlElement, XmlNode};
