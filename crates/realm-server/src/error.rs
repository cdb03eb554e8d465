use thiserror::Error;

/// Errors raised by the connection runtime. Variants map directly to the
/// error kinds of the wire protocol: the "hard" ones (`Framing`,
/// `Transport`, `HandlerFail`, `CodecFailure`) always move the connection to
/// `Disconnected`; the rest are soft and are logged and otherwise ignored by
/// the receive loop.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("malformed frame header: {0}")]
    Framing(#[from] realm_proto::FrameError),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("handler failed: {0}")]
    HandlerFail(String),

    #[error("codec failure while decoding payload: {0}")]
    CodecFailure(#[from] realm_proto::CodecError),
}

impl ConnectionError {
    /// Hard errors terminate the connection; this crate has no soft
    /// `ConnectionError` variants today (unknown opcodes, missing handlers,
    /// rate-limit denies and validation failures are handled inline without
    /// ever being turned into a `ConnectionError` at all), but the
    /// distinction is named here because §7 of the protocol draws it.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
