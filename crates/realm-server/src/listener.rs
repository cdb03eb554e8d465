//! TCP acceptor (§4.7): binds one address per configured role, and for each
//! accepted socket spawns a connection actor parameterized with that role.
//! Concurrency of in-flight accept-handshakes is bounded by a semaphore
//! sized from `concurrent_acceptors`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::config::{ListenerConfig, ServerConfig};
use crate::connection::{Connection, ConnectionHandle};
use crate::handler::Registry;
use crate::persistence::QuestPersistence;
use crate::ratelimit::RateLimiter;

struct RunningListener {
    local_addr: SocketAddr,
    connection_count: Arc<AtomicUsize>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the set of bound listeners and the connections they've spawned.
/// API mirrors §4.7: `start`, `port_of`, `stop`, `connection_count`.
#[derive(Default)]
pub struct Listeners {
    running: RwLock<HashMap<String, RunningListener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds and starts one listener from `listener_config`, spawning a
    /// connection actor (with the listener's configured role) per accepted
    /// socket.
    pub async fn start(
        &self,
        listener_config: ListenerConfig,
        registry: Arc<Registry>,
        rate_limiter: Arc<RateLimiter>,
        config: Arc<ServerConfig>,
        persistence: Arc<dyn QuestPersistence>,
    ) -> std::io::Result<SocketAddr> {
        let addr = SocketAddr::new(listener_config.bind, listener_config.port);
        let tcp_listener = TokioTcpListener::bind(addr).await?;
        let local_addr = tcp_listener.local_addr()?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let connection_count = Arc::new(AtomicUsize::new(0));
        let acceptor_limit = Arc::new(Semaphore::new(listener_config.concurrent_acceptors));
        let role = listener_config.role;
        let name = listener_config.name.clone();

        let count_for_task = connection_count.clone();
        let task = tokio::spawn(async move {
            loop {
                let permit = acceptor_limit.clone().acquire_owned();
                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                    accepted = tcp_listener.accept() => {
                        let Ok((stream, _peer)) = accepted else { continue };
                        let Ok(permit) = permit.await else { continue };
                        let registry = registry.clone();
                        let rate_limiter = rate_limiter.clone();
                        let config = config.clone();
                        let persistence = persistence.clone();
                        let count = count_for_task.clone();
                        count.fetch_add(1, Ordering::Relaxed);
                        tokio::spawn(async move {
                            let _permit = permit;
                            let _handle: ConnectionHandle =
                                Connection::accept_and_run(stream, role, registry, rate_limiter, config, persistence)
                                    .await;
                            count.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                }
            }
        });

        self.running.write().insert(
            name,
            RunningListener {
                local_addr,
                connection_count,
                stop_tx,
                task,
            },
        );

        Ok(local_addr)
    }

    pub fn port_of(&self, name: &str) -> Option<u16> {
        self.running.read().get(name).map(|l| l.local_addr.port())
    }

    pub fn connection_count(&self, name: &str) -> Option<usize> {
        self.running
            .read()
            .get(name)
            .map(|l| l.connection_count.load(Ordering::Relaxed))
    }

    /// Signals the named listener to stop accepting new connections and
    /// waits for its accept loop to exit. Already-accepted connections keep
    /// running independently.
    pub async fn stop(&self, name: &str) {
        let removed = self.running.write().remove(name);
        if let Some(listener) = removed {
            let _ = listener.stop_tx.send(true);
            let _ = listener.task.await;
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.running.read().keys().cloned().collect()
    }
}
