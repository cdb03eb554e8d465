//! Declarative validation predicates shared by handlers.
//!
//! Each predicate returns `Ok(())` or a specific [`ValidationError`]; they
//! carry no side effects and never allocate beyond the error path, so
//! handlers can chain them with [`validate_all`] and short-circuit on the
//! first failure.

use crate::error::ValidationError;

const POSITION_BOUND: f32 = 100_000.0;
const MAX_NAME_LEN: usize = 64;
const MIN_NAME_LEN: usize = 3;
const MAX_CHAT_LEN: usize = 1024;

/// Default byte cap for [`validate_string`] callers that have no
/// more specific limit of their own.
pub const DEFAULT_MAX_STRING_LEN: usize = 4096;

/// A position component must be finite and within `+/-100000`.
pub fn validate_position(x: f32, y: f32, z: f32) -> Result<(), ValidationError> {
    for v in [x, y, z] {
        if !v.is_finite() || v.abs() > POSITION_BOUND {
            return Err(ValidationError::InvalidPositionValue);
        }
    }
    Ok(())
}

/// A generic string bound by byte length, with optional empty-string
/// rejection.
pub fn validate_string(s: &str, max_len: usize, allow_empty: bool) -> Result<(), ValidationError> {
    if s.is_empty() && !allow_empty {
        return Err(ValidationError::StringEmpty);
    }
    if s.len() > max_len {
        return Err(ValidationError::StringTooLong {
            max: max_len,
            actual: s.len(),
        });
    }
    Ok(())
}

/// Character/account names: 3-64 characters, first character an ASCII
/// letter, remaining characters ASCII letters or digits.
pub fn validate_name(s: &str) -> Result<(), ValidationError> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < MIN_NAME_LEN || chars.len() > MAX_NAME_LEN {
        return Err(ValidationError::InvalidName);
    }
    if !chars[0].is_ascii_alphabetic() {
        return Err(ValidationError::InvalidName);
    }
    if !chars.iter().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidName);
    }
    Ok(())
}

/// Chat messages: non-empty, bounded, and must be valid UTF-8 (guaranteed by
/// `&str`, but this also rejects a raw byte slice containing invalid UTF-8
/// before it is converted).
pub fn validate_chat(raw: &[u8]) -> Result<(), ValidationError> {
    let s = std::str::from_utf8(raw).map_err(|_| ValidationError::InvalidUtf8)?;
    validate_string(s, MAX_CHAT_LEN, false)
}

/// Checks `value` is one of `allowed`.
pub fn validate_enum<T>(value: &T, allowed: &[T]) -> Result<(), ValidationError>
where
    T: PartialEq + std::fmt::Debug,
{
    if allowed.iter().any(|a| a == value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEnum {
            got: format!("{value:?}"),
            allowed: allowed.iter().map(|a| format!("{a:?}")).collect(),
        })
    }
}

/// Checks `value` falls within `[lo, hi]` inclusive.
pub fn validate_range<T>(value: T, lo: T, hi: T) -> Result<(), ValidationError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < lo || value > hi {
        Err(ValidationError::OutOfRange {
            value: value.to_string(),
            lo: lo.to_string(),
            hi: hi.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Runs a sequence of already-evaluated validation results and returns the
/// first failure, short-circuiting; `Ok(())` if every check passed.
pub fn validate_all(
    checks: impl IntoIterator<Item = Result<(), ValidationError>>,
) -> Result<(), ValidationError> {
    for check in checks {
        check?;
    }
    Ok(())
}
