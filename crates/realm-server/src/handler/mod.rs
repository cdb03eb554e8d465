//! Handler Registry: a process-wide map from opcode to handler, backed by a
//! `parking_lot::RwLock` so dispatch (hot path) takes a read lock that never
//! blocks other readers, while registration (module load time) takes the
//! write lock.

mod bootstrap;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use realm_proto::Opcode;

use crate::connection::ConnectionContext;

pub use bootstrap::register_defaults;

/// The outcome of invoking a handler, mirroring §3's `HandlerResult` sum
/// type exactly.
pub enum HandlerResult {
    Continue(ConnectionContext),
    Reply(Opcode, Vec<u8>, ConnectionContext),
    ReplyMany(Vec<(Opcode, Vec<u8>)>, ConnectionContext),
    Fail(String),
}

/// A pluggable procedure invoked per inbound opcode. Implementations must
/// not block or perform long-running work inline (§5): delegate to an
/// external worker and return `Continue` immediately if needed.
pub trait Handler: Send + Sync {
    fn handle(&self, payload: &[u8], ctx: ConnectionContext) -> HandlerResult;
}

/// Process-wide opcode -> handler table.
#[derive(Default)]
pub struct Registry {
    handlers: RwLock<HashMap<Opcode, Arc<dyn Handler>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a registry pre-populated with the default bootstrap set (auth,
    /// encryption handshake, realm handshake).
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        register_defaults(&registry);
        registry
    }

    pub fn register(&self, opcode: Opcode, handler: Arc<dyn Handler>) {
        self.handlers.write().insert(opcode, handler);
    }

    pub fn lookup(&self, opcode: Opcode) -> Option<Arc<dyn Handler>> {
        self.handlers.read().get(&opcode).cloned()
    }

    pub fn all(&self) -> Vec<(Opcode, Arc<dyn Handler>)> {
        self.handlers
            .read()
            .iter()
            .map(|(opcode, handler)| (*opcode, handler.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
