//! Dynamic `{{$name args...}}` variables resolved at substitution time.
//!
//! Supported names:
//! - `$guid`, `$randomUUID`: a fresh v4 UUID
//! - `$timestamp [offset unit]`: Unix seconds
//! - `$isoTimestamp`: current time as ISO 8601 with milliseconds
//! - `$datetime iso8601|rfc1123 [offset unit]`
//! - `$randomInt min max`: inclusive range

use super::VarError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use uuid::Uuid;

/// Resolves a system variable given its name (without `$`) and arguments.
///
/// # Examples
///
/// ```
/// use rest_client_scripting::variables::resolve_system_variable;
///
/// assert_eq!(resolve_system_variable("guid", &[]).unwrap().len(), 36);
/// assert!(resolve_system_variable("timestamp", &["-1", "d"]).is_ok());
/// assert!(resolve_system_variable("nope", &[]).is_err());
/// ```
pub fn resolve_system_variable(name: &str, args: &[&str]) -> Result<String, VarError> {
    match name {
        "guid" | "randomUUID" => Ok(Uuid::new_v4().to_string()),
        "timestamp" => timestamp(args),
        "isoTimestamp" => Ok(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        "datetime" => datetime(args),
        "randomInt" => random_int(args),
        _ => Err(VarError::UndefinedVariable(format!("${}", name))),
    }
}

/// Parses the inner text of a `{{$...}}` token (`$name arg arg`) and resolves it.
pub fn resolve_system_expression(expression: &str) -> Result<String, VarError> {
    let mut parts = expression.split_whitespace();
    let name = parts
        .next()
        .and_then(|head| head.strip_prefix('$'))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            VarError::InvalidSyntax(format!("not a system variable: '{}'", expression))
        })?;
    let args: Vec<&str> = parts.collect();
    resolve_system_variable(name, &args)
}

fn timestamp(args: &[&str]) -> Result<String, VarError> {
    let at = if args.is_empty() {
        Utc::now()
    } else {
        apply_offset(Utc::now(), args)?
    };
    Ok(at.timestamp().to_string())
}

fn datetime(args: &[&str]) -> Result<String, VarError> {
    let (format, offset) = args.split_first().ok_or_else(|| {
        VarError::InvalidSyntax("$datetime needs a format (iso8601 or rfc1123)".to_string())
    })?;

    let at = if offset.is_empty() {
        Utc::now()
    } else {
        apply_offset(Utc::now(), offset)?
    };

    match *format {
        "iso8601" => Ok(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        "rfc1123" => Ok(at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
        other => Err(VarError::InvalidSyntax(format!(
            "unknown $datetime format '{}'",
            other
        ))),
    }
}

/// Applies an `amount unit` offset, e.g. `-1 d` or `30 m`.
fn apply_offset(base: DateTime<Utc>, args: &[&str]) -> Result<DateTime<Utc>, VarError> {
    let (amount, unit) = match args {
        [amount, unit, ..] => (*amount, *unit),
        _ => {
            return Err(VarError::InvalidOffset(
                "expected '<amount> <unit>', e.g. '-1 d'".to_string(),
            ))
        }
    };

    let amount: i64 = amount
        .trim_start_matches('+')
        .parse()
        .map_err(|_| VarError::InvalidOffset(format!("'{}' is not an integer", amount)))?;

    let delta = match unit {
        "ms" => Duration::milliseconds(amount),
        "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        "w" => Duration::weeks(amount),
        other => {
            return Err(VarError::InvalidOffset(format!(
                "unknown unit '{}' (ms, s, m, h, d, w)",
                other
            )))
        }
    };

    Ok(base + delta)
}

fn random_int(args: &[&str]) -> Result<String, VarError> {
    let bounds: Vec<i64> = args
        .iter()
        .take(2)
        .map(|arg| {
            arg.parse()
                .map_err(|_| VarError::InvalidSyntax(format!("'{}' is not an integer", arg)))
        })
        .collect::<Result<_, _>>()?;

    match bounds.as_slice() {
        [min, max] if min <= max => Ok(rand::thread_rng().gen_range(*min..=*max).to_string()),
        [min, max] => Err(VarError::InvalidSyntax(format!(
            "$randomInt min ({}) is greater than max ({})",
            min, max
        ))),
        _ => Err(VarError::InvalidSyntax(
            "$randomInt needs min and max".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_and_random_uuid() {
        let a = resolve_system_variable("guid", &[]).unwrap();
        let b = resolve_system_variable("randomUUID", &[]).unwrap();
        assert!(Uuid::parse_str(&a).is_ok());
        assert!(Uuid::parse_str(&b).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamp_with_offset() {
        let now: i64 = resolve_system_variable("timestamp", &[]).unwrap().parse().unwrap();
        let yesterday: i64 = resolve_system_variable("timestamp", &["-1", "d"])
            .unwrap()
            .parse()
            .unwrap();
        let diff = now - yesterday;
        assert!((86_399..=86_401).contains(&diff));
    }

    #[test]
    fn test_datetime_formats() {
        let iso = resolve_system_variable("datetime", &["iso8601"]).unwrap();
        assert!(DateTime::parse_from_rfc3339(&iso).is_ok());

        let rfc = resolve_system_variable("datetime", &["rfc1123", "+2", "h"]).unwrap();
        assert!(rfc.ends_with(" GMT"));

        assert!(resolve_system_variable("datetime", &[]).is_err());
        assert!(resolve_system_variable("datetime", &["unix"]).is_err());
    }

    #[test]
    fn test_iso_timestamp() {
        let iso = resolve_system_variable("isoTimestamp", &[]).unwrap();
        assert!(iso.ends_with('Z'));
    }

    #[test]
    fn test_random_int_bounds() {
        for _ in 0..50 {
            let n: i64 = resolve_system_variable("randomInt", &["5", "7"])
                .unwrap()
                .parse()
                .unwrap();
            assert!((5..=7).contains(&n));
        }
        assert!(resolve_system_variable("randomInt", &["9", "1"]).is_err());
        assert!(resolve_system_variable("randomInt", &["1"]).is_err());
        assert!(resolve_system_variable("randomInt", &["a", "b"]).is_err());
    }

    #[test]
    fn test_invalid_offset() {
        assert!(matches!(
            resolve_system_variable("timestamp", &["1"]),
            Err(VarError::InvalidOffset(_))
        ));
        assert!(matches!(
            resolve_system_variable("timestamp", &["1", "y"]),
            Err(VarError::InvalidOffset(_))
        ));
    }

    #[test]
    fn test_expression_parsing() {
        assert!(resolve_system_expression("$randomInt 1 1").unwrap() == "1");
        assert!(resolve_system_expression("guid").is_err());
        assert!(resolve_system_expression("$").is_err());
        assert!(matches!(
            resolve_system_expression("$processEnv HOME"),
            Err(VarError::UndefinedVariable(_))
        ));
    }
}
