//! Connection runtime for the realm protocol: handler registry, rate
//! limiter, per-connection actor, listener and session persistence
//! scheduler. Wire-level encoding lives in `realm-proto`; this crate owns
//! sockets, tasks, timers and the external ports (crypto, persistence).

pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod handler;
pub mod listener;
pub mod persistence;
pub mod ratelimit;

pub use config::{Cli, ListenerConfig, Role, ServerConfig};
pub use connection::{Connection, ConnectionContext, ConnectionHandle, ConnectionState, ExternalMessage};
pub use error::{ConfigError, ConnectionError};
pub use handler::{Handler, HandlerResult, Registry};
pub use listener::Listeners;
pub use persistence::{InMemoryQuestPersistence, PersistError, QuestPersistence};
pub use ratelimit::{HitOutcome, RateLimiter};
