//! Default bootstrap handler set: auth, encryption handshake, realm
//! handshake, keepalive. Key derivation for the crypto context happens
//! here, in `EncryptionHandshakeHandler`, per the design note "Key
//! derivation is invoked by the handshake handlers, not by the codec."

use std::sync::Arc;

use parking_lot::Mutex;
use realm_proto::{BitReader, BitWriter, Symbol};

use crate::connection::ConnectionState;
use crate::crypto::DerivedKeyCryptoContext;
use crate::error::ConnectionError;
use crate::ratelimit::HitOutcome;

use super::{Handler, HandlerResult, Registry};

/// Length, in bytes, of the client-supplied key material `EncryptionHandshake`
/// reads before deriving the connection's post-handshake `CryptoContext`.
const KEY_MATERIAL_LEN: usize = 16;

/// Handles `EncryptionHandshake`: reads the client's key material and
/// installs a [`DerivedKeyCryptoContext`] built from it, replacing the
/// accept-time bootstrap key (§9, "Crypto context lifetime"). A payload
/// shorter than [`KEY_MATERIAL_LEN`] bytes is a `CodecFailure` (§7): the
/// read fails with `CodecError::Eof`, which is folded into
/// `ConnectionError::CodecFailure` and returned as `HandlerResult::Fail`,
/// closing the connection.
struct EncryptionHandshakeHandler;

impl Handler for EncryptionHandshakeHandler {
    fn handle(&self, payload: &[u8], mut ctx: super::ConnectionContext) -> HandlerResult {
        let mut reader = BitReader::new(payload);
        let mut key = Vec::with_capacity(KEY_MATERIAL_LEN);
        for _ in 0..KEY_MATERIAL_LEN {
            match reader.read_u8() {
                Ok(byte) => key.push(byte),
                Err(e) => return HandlerResult::Fail(ConnectionError::from(e).to_string()),
            }
        }
        ctx.crypto = Some(Arc::new(Mutex::new(DerivedKeyCryptoContext::new(key))));
        HandlerResult::Continue(ctx)
    }
}

/// Handles `ClientHelloAuth`: rate-limits by client IP (§4.5's documented
/// `"auth:<client_ip>"` key), then transitions `authenticating ->
/// authenticated` on success. A rate-limit deny responds with an
/// auth-denied `AuthResult` frame rather than closing the connection
/// (§7: `RateLimitDeny`).
struct AuthHandler;

impl Handler for AuthHandler {
    fn handle(&self, _payload: &[u8], mut ctx: super::ConnectionContext) -> HandlerResult {
        let key = format!("auth:{}", ctx.remote_addr.ip());
        let outcome = ctx.rate_limiter.hit(
            &key,
            ctx.config.rate_limit.window_ms,
            ctx.config.rate_limit.limit,
        );

        let mut reply = BitWriter::new();
        match outcome {
            HitOutcome::Deny(_) => {
                reply.write_u8(0); // auth-denied
                HandlerResult::Reply(realm_proto::to_wire(Symbol::AuthResult), reply.to_bytes(), ctx)
            }
            HitOutcome::Allow(_) => {
                ctx.state = ConnectionState::Authenticated;
                reply.write_u8(1); // auth-ok
                HandlerResult::Reply(realm_proto::to_wire(Symbol::AuthResult), reply.to_bytes(), ctx)
            }
        }
    }
}

/// Handles `ClientHelloRealm`: completes the handshake for the world role
/// and replies with the realm's identity. Character selection and any
/// further gameplay state are out of scope (§1 Non-goals).
struct RealmHandshakeHandler;

impl Handler for RealmHandshakeHandler {
    fn handle(&self, _payload: &[u8], mut ctx: super::ConnectionContext) -> HandlerResult {
        ctx.state = ConnectionState::Authenticated;
        let mut reply = BitWriter::new();
        reply.write_u32(ctx.config.realm_id);
        reply.write_u32(ctx.config.realm_group_id);
        HandlerResult::Reply(realm_proto::to_wire(Symbol::RealmList), reply.to_bytes(), ctx)
    }
}

/// Handles `Keepalive`: a no-op that keeps `last_ingress` fresh at the
/// transport level; no reply, no state change.
struct KeepaliveHandler;

impl Handler for KeepaliveHandler {
    fn handle(&self, _payload: &[u8], ctx: super::ConnectionContext) -> HandlerResult {
        HandlerResult::Continue(ctx)
    }
}

pub fn register_defaults(registry: &Registry) {
    registry.register(
        realm_proto::to_wire(Symbol::EncryptionHandshake),
        Arc::new(EncryptionHandshakeHandler),
    );
    registry.register(realm_proto::to_wire(Symbol::ClientHelloAuth), Arc::new(AuthHandler));
    registry.register(
        realm_proto::to_wire(Symbol::ClientHelloRealm),
        Arc::new(RealmHandshakeHandler),
    );
    registry.register(realm_proto::to_wire(Symbol::Keepalive), Arc::new(KeepaliveHandler));
}
