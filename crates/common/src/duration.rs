//! Parsing for Go-style duration strings such as `"1h30m"`, `"90s"` or
//! `"1.5h"`, which is how volume options spell lease TTLs.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { input: String, unit: String },
    #[error("negative duration {0:?}")]
    Negative(String),
    #[error("duration {0:?} is too large")]
    Overflow(String),
}

fn unit_nanos(unit: &str) -> Option<f64> {
    Some(match unit {
        "ns" => 1.0,
        "us" | "µs" | "μs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60.0 * 1e9,
        "h" => 3600.0 * 1e9,
        _ => return None,
    })
}

/// Parse a sequence of decimal numbers each followed by a unit
/// (`ns`, `us`, `ms`, `s`, `m`, `h`). A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    let invalid = || DurationError::Invalid(input.to_string());

    let s = match s.strip_prefix('+') {
        Some(rest) => rest,
        None => s,
    };
    if s.starts_with('-') {
        return Err(DurationError::Negative(input.to_string()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            input: input.to_string(),
            unit: unit.to_string(),
        })?;
        rest = &rest[unit_len..];

        total += value * scale;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return Err(DurationError::Overflow(input.to_string()));
    }
    Ok(Duration::from_nanos(total.round() as u64))
}

/// Parse a lease TTL. A negative duration is accepted and means the same as
/// zero: no TTL hint, use the backend default.
pub fn parse_ttl(input: &str) -> Result<Duration, DurationError> {
    match input.trim().strip_prefix('-') {
        Some(magnitude) if !magnitude.starts_with(['-', '+']) => {
            parse_duration(magnitude).map_err(|e| match e {
                DurationError::Invalid(_) => DurationError::Invalid(input.to_string()),
                DurationError::UnknownUnit { unit, .. } => DurationError::UnknownUnit {
                    input: input.to_string(),
                    unit,
                },
                other => other,
            })?;
            Ok(Duration::ZERO)
        }
        Some(_) => Err(DurationError::Invalid(input.to_string())),
        None => parse_duration(input),
    }
}
