//! Crypto context port.
//!
//! The connection runtime only specifies *where* encryption is invoked and
//! how key material is bound to connection lifecycle events (handshake
//! completion, teardown); it never performs the AEAD math itself. A real
//! deployment supplies a [`CryptoContext`] implementation backed by whatever
//! cipher the live protocol actually uses.

use std::fmt;

/// Bound exclusively to one connection for its lifetime; never shared, never
/// swapped out once present (the invariant from the data model: `crypto` is
/// `none` until the handshake completes, then always `Some`).
pub trait CryptoContext: Send + Sync + fmt::Debug {
    /// Decrypts a payload read from the socket in place, returning the
    /// plaintext length, or `None` if authentication failed.
    fn decrypt(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Encrypts a payload before it is framed and written to the socket.
    fn encrypt(&mut self, buf: &mut Vec<u8>);
}

/// A pass-through implementation used for tests and for roles that have not
/// completed a handshake yet; never used once `CryptoContext` is bound in
/// the sense of the data-model invariant, only as the seed value handed to
/// handshake handlers to derive the real key material from.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCryptoContext;

impl CryptoContext for NullCryptoContext {
    fn decrypt(&mut self, buf: &mut [u8]) -> Option<usize> {
        Some(buf.len())
    }

    fn encrypt(&mut self, _buf: &mut Vec<u8>) {}
}

/// Bound to a connection once `EncryptionHandshakeHandler` derives key
/// material from the client's handshake payload, replacing the
/// accept-time [`NullCryptoContext`] bootstrap key. The AEAD cipher itself
/// stays out of scope (§1 Non-goal) — this still only passes data through
/// unchanged — but the derived key is retained so key material is
/// genuinely bound to the connection's lifecycle rather than discarded.
#[derive(Debug, Clone)]
pub struct DerivedKeyCryptoContext {
    key: Vec<u8>,
}

impl DerivedKeyCryptoContext {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl CryptoContext for DerivedKeyCryptoContext {
    fn decrypt(&mut self, buf: &mut [u8]) -> Option<usize> {
        Some(buf.len())
    }

    fn encrypt(&mut self, _buf: &mut Vec<u8>) {}
}
