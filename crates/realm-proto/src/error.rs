use thiserror::Error;

/// Errors raised by the bit codec and wide-string transcoding.
///
/// Mirrors the `NetworkError` / `ErrorType` split used by the connection
/// layer: codec errors are always "hard" (the caller has no sensible retry),
/// unlike the `Wait`/`Fatal` split used further up the stack for partial
/// reads.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("unexpected end of input while reading bit stream")]
    Eof,

    #[error("wide string length {0} exceeds the 15-bit maximum of 32767 code units")]
    StringTooLong(usize),

    #[error("invalid utf-16 sequence in wide string")]
    InvalidUtf16,
}

/// Errors raised while framing or parsing the length-prefixed wire header.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FrameError {
    #[error("frame header declares size {0}, which is smaller than the minimum of 4")]
    Malformed(u32),
}

/// Errors raised by the declarative validation predicates in [`crate::validate`].
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ValidationError {
    #[error("position component is NaN, infinite, or exceeds +/-100000")]
    InvalidPositionValue,

    #[error("string exceeds maximum length of {max} bytes (got {actual})")]
    StringTooLong { max: usize, actual: usize },

    #[error("string must not be empty")]
    StringEmpty,

    #[error("string is not valid utf-8")]
    InvalidUtf8,

    #[error("name must be 3-64 characters, start with an ascii letter and contain only letters/digits")]
    InvalidName,

    #[error("value {got} is not one of the allowed values {allowed:?}")]
    InvalidEnum { got: String, allowed: Vec<String> },

    #[error("value {value} is out of range [{lo}, {hi}]")]
    OutOfRange { value: String, lo: String, hi: String },
}
