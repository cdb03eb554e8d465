//! Per-socket connection actor: reassembly buffer, crypto context, session,
//! dispatch loop, reply fan-out (§4.6). Implemented as a `tokio::task` with
//! an `mpsc` mailbox per the REDESIGN FLAG in §9 ("map to a task executor
//! where each task is single-consumer of its mailbox") rather than the
//! reference's OS-thread/mio-poll model.

pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use realm_proto::{frame, parse_frames, BitWriter, Opcode, Symbol};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::{Role, ServerConfig};
use crate::crypto::{CryptoContext, NullCryptoContext};
use crate::error::ConnectionError;
use crate::handler::{Handler, HandlerResult, Registry};
use crate::persistence::QuestPersistence;
use crate::ratelimit::RateLimiter;

pub use session::{AchievementWorkerHandle, CharacterHandle, QuestProgress, Session};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Authenticating,
    Authenticated,
    Disconnected,
}

/// The value passed to handlers by value and returned by value (§3: "the
/// handler receives it by value and returns a new value; no aliasing").
/// Everything the actor needs for socket I/O (the socket itself, the
/// reassembly buffer) stays out of this struct; this only carries what a
/// handler is actually allowed to read or mutate.
pub struct ConnectionContext {
    pub id: u64,
    pub role: Role,
    pub remote_addr: std::net::SocketAddr,
    pub state: ConnectionState,
    pub session: Session,
    pub crypto: Option<Arc<parking_lot::Mutex<dyn CryptoContext>>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<ServerConfig>,
}

impl ConnectionContext {
    /// Builds a minimal context for unit tests that exercise handlers
    /// directly without a real socket.
    pub fn test_fixture(state: ConnectionState) -> Self {
        Self::test_fixture_with_limiter(state, Arc::new(RateLimiter::new()))
    }

    /// Same as [`ConnectionContext::test_fixture`], but sharing a caller
    /// supplied rate limiter so tests can observe state accumulating across
    /// several handler invocations.
    pub fn test_fixture_with_limiter(state: ConnectionState, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            id: 0,
            role: Role::Auth,
            remote_addr: "127.0.0.1:0".parse().unwrap(),
            state,
            session: Session::new(),
            crypto: None,
            rate_limiter,
            config: Arc::new(ServerConfig::default()),
        }
    }
}

/// Asynchronous messages the connection accepts from non-socket sources
/// (§4.6, "External message channel"). Delivered over the same mailbox as
/// socket-derived work, so they interleave in FIFO order with inbound
/// frames as §5 requires.
pub enum ExternalMessage {
    GameEvent { kind: String, data: Vec<u8> },
    PersistQuests,
    SchedulePersistence,
}

/// A lightweight reference to a running connection actor: enough to send it
/// external messages and to read back its liveness.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: u64,
    sender: mpsc::Sender<ExternalMessage>,
}

impl ConnectionHandle {
    pub async fn send(&self, msg: ExternalMessage) -> Result<(), mpsc::error::SendError<ExternalMessage>> {
        self.sender.send(msg).await
    }
}

const AUTH_MESSAGE_TOKEN: u32 = 0x0979_98A0;
const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(30);

pub struct Connection {
    id: u64,
    role: Role,
    remote_addr: std::net::SocketAddr,
    stream: TcpStream,
    buffer: BytesMut,
    ctx: Option<ConnectionContext>,
    /// Mirrors `ctx.session` after every successful handler invocation, so
    /// the termination hook can still see the last known session even when
    /// a handler returns `Fail` without handing the context back.
    session_snapshot: Session,
    registry: Arc<Registry>,
    persistence: Arc<dyn QuestPersistence>,
    persist_interval: Duration,
    terminated: bool,
}

impl Connection {
    /// Accepts sequence (§4.6): build and send `ServerHello`, enter
    /// `authenticating`, then run the receive loop until the connection
    /// terminates.
    pub async fn accept_and_run(
        stream: TcpStream,
        role: Role,
        registry: Arc<Registry>,
        rate_limiter: Arc<RateLimiter>,
        config: Arc<ServerConfig>,
        persistence: Arc<dyn QuestPersistence>,
    ) -> ConnectionHandle {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let remote_addr = stream
            .peer_addr()
            .unwrap_or_else(|_| "0.0.0.0:0".parse().unwrap());
        let (tx, rx) = mpsc::channel(64);
        let persist_interval = Duration::from_secs(config.persistence_interval_secs);

        let ctx = ConnectionContext {
            id,
            role,
            remote_addr,
            state: ConnectionState::Connected,
            session: Session::new(),
            crypto: Some(Arc::new(parking_lot::Mutex::new(NullCryptoContext))),
            rate_limiter,
            config,
        };

        let connection = Connection {
            id,
            role,
            remote_addr,
            stream,
            buffer: BytesMut::with_capacity(4096),
            session_snapshot: ctx.session.clone(),
            ctx: Some(ctx),
            registry,
            persistence,
            persist_interval,
            terminated: false,
        };

        tokio::spawn(connection.run(rx));

        ConnectionHandle { id, sender: tx }
    }

    fn build_server_hello(&self) -> Vec<u8> {
        let config = &self.ctx.as_ref().unwrap().config;
        let mut w = BitWriter::new();
        w.write_u32(config.auth_version);
        w.write_u32(config.realm_id);
        w.write_u32(config.realm_group_id);
        w.write_u32(AUTH_MESSAGE_TOKEN);
        w.write_bits(self.role.connection_type() as u64, 5);
        w.write_bits(0, 11);
        w.to_bytes()
    }

    async fn send_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), ConnectionError> {
        let mut payload = payload.to_vec();
        if let Some(crypto) = self.ctx.as_ref().and_then(|c| c.crypto.clone()) {
            crypto.lock().encrypt(&mut payload);
        }
        let bytes = frame(opcode, &payload);
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<ExternalMessage>) {
        let hello = self.build_server_hello();
        if self
            .send_frame(realm_proto::to_wire(Symbol::ServerHello), &hello)
            .await
            .is_err()
        {
            self.terminate("transport error sending ServerHello").await;
            return;
        }
        self.ctx.as_mut().unwrap().state = ConnectionState::Authenticating;

        let mut persist_interval = tokio::time::interval(self.persist_interval);
        persist_interval.tick().await; // first tick is immediate; consume it
        let mut persistence_scheduled = false;
        let mut read_buf = [0u8; 4096];

        loop {
            tokio::select! {
                result = self.stream.read(&mut read_buf) => {
                    match result {
                        Ok(0) => {
                            self.terminate("peer closed the socket").await;
                            break;
                        }
                        Ok(n) => {
                            self.buffer.extend_from_slice(&read_buf[..n]);
                            if let Err(e) = self.drain_frames().await {
                                self.terminate(&e.to_string()).await;
                                break;
                            }
                        }
                        Err(e) => {
                            let msg = e.to_string();
                            self.terminate(&msg).await;
                            break;
                        }
                    }
                }
                maybe_msg = mailbox.recv() => {
                    match maybe_msg {
                        Some(ExternalMessage::SchedulePersistence) => {
                            persistence_scheduled = true;
                        }
                        Some(ExternalMessage::PersistQuests) => {
                            self.persist_tick().await;
                        }
                        Some(ExternalMessage::GameEvent { kind, .. }) => {
                            tracing::debug!(kind = %kind, "ignoring game event: no gameplay simulation in scope");
                        }
                        None => {
                            self.terminate("mailbox closed").await;
                            break;
                        }
                    }
                }
                _ = persist_interval.tick(), if persistence_scheduled => {
                    self.persist_tick().await;
                }
            }

            if matches!(self.ctx.as_ref().map(|c| c.state), Some(ConnectionState::Disconnected)) {
                break;
            }
        }
    }

    async fn drain_frames(&mut self) -> Result<(), ConnectionError> {
        loop {
            let (frames, consumed) = parse_frames(&self.buffer)?;
            if frames.is_empty() {
                break;
            }
            self.buffer.advance(consumed);
            for (opcode, payload) in frames {
                self.dispatch(opcode, &payload).await?;
                if matches!(self.ctx.as_ref().map(|c| c.state), Some(ConnectionState::Disconnected)) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), ConnectionError> {
        match realm_proto::from_wire(opcode) {
            Some(symbol) => tracing::trace!(opcode, ?symbol, "dispatching frame"),
            None => {
                tracing::warn!(opcode, "unknown opcode, ignoring");
                return Ok(());
            }
        }

        let Some(handler) = self.registry.lookup(opcode) else {
            tracing::debug!(opcode, "no handler registered, ignoring");
            return Ok(());
        };

        let mut payload = payload.to_vec();
        if let Some(crypto) = self.ctx.as_ref().and_then(|c| c.crypto.clone()) {
            match crypto.lock().decrypt(&mut payload) {
                Some(len) => payload.truncate(len),
                None => return Err(ConnectionError::HandlerFail("payload decryption failed".to_string())),
            }
        }

        let ctx = self.ctx.take().expect("ctx is always Some between dispatches");
        match handler.handle(&payload, ctx) {
            HandlerResult::Continue(new_ctx) => {
                self.session_snapshot = new_ctx.session.clone();
                self.ctx = Some(new_ctx);
                Ok(())
            }
            HandlerResult::Reply(opcode, reply_payload, new_ctx) => {
                self.session_snapshot = new_ctx.session.clone();
                self.ctx = Some(new_ctx);
                self.send_frame(opcode, &reply_payload).await
            }
            HandlerResult::ReplyMany(replies, new_ctx) => {
                self.session_snapshot = new_ctx.session.clone();
                self.ctx = Some(new_ctx);
                for (opcode, reply_payload) in replies {
                    self.send_frame(opcode, &reply_payload).await?;
                }
                Ok(())
            }
            HandlerResult::Fail(reason) => Err(ConnectionError::HandlerFail(reason)),
        }
    }

    async fn persist_tick(&mut self) {
        let Some(character) = self.session_snapshot.character.clone() else {
            return;
        };
        match self
            .persistence
            .persist_dirty(character.id, self.session_snapshot.clone())
            .await
        {
            Ok((_count, new_session)) => {
                self.session_snapshot = new_session.clone();
                if let Some(ctx) = self.ctx.as_mut() {
                    ctx.session = new_session;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "persist_dirty failed, retaining session for next tick");
            }
        }
    }

    /// Runs exactly once per connection regardless of how it terminates
    /// (socket close, handler `Fail`, or transport error): cancels the
    /// persistence timer (implicit: the task itself is about to end, so the
    /// interval is dropped), flushes dirty quest state if a character was
    /// ever selected, and stops the achievement worker first so it cannot
    /// race the flush.
    async fn terminate(&mut self, reason: &str) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        if let Some(ctx) = self.ctx.as_mut() {
            ctx.state = ConnectionState::Disconnected;
        }
        tracing::info!(connection_id = self.id, reason, "connection terminating");

        if let Some(worker) = self.session_snapshot.achievement_worker.take() {
            tracing::debug!(worker_id = worker.id, "stopping achievement worker before logout flush");
        }

        if let Some(character) = self.session_snapshot.character.clone() {
            if let Err(e) = self
                .persistence
                .persist_on_logout(character.id, self.session_snapshot.clone())
                .await
            {
                tracing::warn!(error = %e, "persist_on_logout failed; teardown proceeds regardless");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryQuestPersistence;

    #[tokio::test]
    async fn server_hello_has_the_documented_byte_layout_for_world_role() {
        let config = Arc::new(ServerConfig {
            auth_version: 0x0000_3EAA,
            realm_id: 1,
            realm_group_id: 1,
            ..ServerConfig::default()
        });
        let ctx = ConnectionContext {
            id: 1,
            role: Role::World,
            remote_addr: "127.0.0.1:1".parse().unwrap(),
            state: ConnectionState::Connected,
            session: Session::new(),
            crypto: None,
            rate_limiter: Arc::new(RateLimiter::new()),
            config,
        };
        let registry = Arc::new(Registry::with_defaults());
        let persistence: Arc<dyn QuestPersistence> = Arc::new(InMemoryQuestPersistence::new());

        // Build the hello payload the same way accept_and_run does, without
        // needing a live socket.
        let connection = Connection {
            id: 1,
            role: Role::World,
            remote_addr: ctx.remote_addr,
            stream: dummy_connected_stream(),
            buffer: BytesMut::new(),
            session_snapshot: ctx.session.clone(),
            ctx: Some(ctx),
            registry,
            persistence,
            persist_interval: DEFAULT_PERSIST_INTERVAL,
            terminated: false,
        };

        let payload = connection.build_server_hello();
        let framed = frame(realm_proto::to_wire(Symbol::ServerHello), &payload);

        assert_eq!(payload.len(), 18);
        // size = 4 (self) + payload_len, per the frame codec's resolution
        // of the spec's size-formula/worked-example discrepancy (DESIGN.md).
        assert_eq!(&framed[0..4], &22u32.to_le_bytes());
        assert_eq!(&framed[4..6], &0x0003u16.to_le_bytes());
        assert_eq!(
            &payload[0..16],
            &[0xAA, 0x3E, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xA0, 0x98, 0x99, 0x09]
        );

        let mut r = realm_proto::BitReader::new(&payload[16..]);
        assert_eq!(r.read_bits(5).unwrap(), 11); // world connection_type
        assert_eq!(r.read_bits(11).unwrap(), 0);
    }

    // A `TcpStream` cannot be constructed without a real socket; this helper
    // only exists so the hello-payload test above can build a `Connection`
    // without driving the accept/run machinery. It is never read from or
    // written to in that test.
    fn dummy_connected_stream() -> TcpStream {
        use std::net::TcpListener as StdTcpListener;
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();
        TcpStream::from_std(client).unwrap()
    }

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    async fn skip_server_hello(client: &mut TcpStream) {
        let mut header = [0u8; 6];
        client.read_exact(&mut header).await.unwrap();
        let size = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let mut payload = vec![0u8; (size - 4) as usize];
        client.read_exact(&mut payload).await.unwrap();
    }

    async fn read_one_frame(client: &mut TcpStream) -> (Opcode, Vec<u8>) {
        let mut header = [0u8; 6];
        client.read_exact(&mut header).await.unwrap();
        let size = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let opcode = u16::from_le_bytes(header[4..6].try_into().unwrap());
        let mut payload = vec![0u8; (size - 4) as usize];
        client.read_exact(&mut payload).await.unwrap();
        (opcode, payload)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    /// S5: an unknown opcode (0xFFFF) is logged and ignored, and the next
    /// frame in the same buffer is still dispatched normally.
    #[tokio::test]
    async fn s5_unknown_opcode_is_ignored_and_the_next_frame_still_dispatches() {
        let (server, mut client) = connected_pair().await;
        let registry = Arc::new(Registry::with_defaults());
        let rate_limiter = Arc::new(RateLimiter::new());
        let config = Arc::new(ServerConfig::default());
        let persistence: Arc<dyn QuestPersistence> = Arc::new(InMemoryQuestPersistence::new());

        let _handle =
            Connection::accept_and_run(server, Role::Auth, registry, rate_limiter, config, persistence).await;
        skip_server_hello(&mut client).await;

        let unknown = frame(0xFFFF, &[]);
        let hello_auth = frame(realm_proto::to_wire(Symbol::ClientHelloAuth), &[]);
        let mut buf = unknown;
        buf.extend_from_slice(&hello_auth);
        client.write_all(&buf).await.unwrap();

        let (opcode, payload) = read_one_frame(&mut client).await;
        assert_eq!(opcode, realm_proto::to_wire(Symbol::AuthResult));
        assert_eq!(payload, vec![1]);
    }

    /// S6: a handler's `ReplyMany` frames arrive back to back on the wire,
    /// undisturbed by an `ExternalMessage::GameEvent` delivered to the same
    /// mailbox around the same time (game events carry no reply of their
    /// own, so the assertion is that only the two expected frames appear).
    #[tokio::test]
    async fn s6_reply_many_frames_arrive_contiguously_around_a_concurrent_game_event() {
        struct QuestAcceptReplyManyHandler;
        impl Handler for QuestAcceptReplyManyHandler {
            fn handle(&self, _payload: &[u8], ctx: ConnectionContext) -> HandlerResult {
                let mut progress = BitWriter::new();
                progress.write_u32(1);
                let mut complete = BitWriter::new();
                complete.write_u32(1);
                HandlerResult::ReplyMany(
                    vec![
                        (realm_proto::to_wire(Symbol::QuestProgressUpdate), progress.to_bytes()),
                        (realm_proto::to_wire(Symbol::QuestComplete), complete.to_bytes()),
                    ],
                    ctx,
                )
            }
        }

        let (server, mut client) = connected_pair().await;
        let registry = Arc::new(Registry::with_defaults());
        registry.register(
            realm_proto::to_wire(Symbol::QuestAccept),
            Arc::new(QuestAcceptReplyManyHandler),
        );
        let rate_limiter = Arc::new(RateLimiter::new());
        let config = Arc::new(ServerConfig::default());
        let persistence: Arc<dyn QuestPersistence> = Arc::new(InMemoryQuestPersistence::new());

        let handle =
            Connection::accept_and_run(server, Role::World, registry, rate_limiter, config, persistence).await;
        skip_server_hello(&mut client).await;

        handle
            .send(ExternalMessage::GameEvent {
                kind: "tick".to_string(),
                data: vec![],
            })
            .await
            .unwrap();
        let quest_accept = frame(realm_proto::to_wire(Symbol::QuestAccept), &[]);
        client.write_all(&quest_accept).await.unwrap();

        let (opcode1, _) = read_one_frame(&mut client).await;
        let (opcode2, _) = read_one_frame(&mut client).await;
        assert_eq!(opcode1, realm_proto::to_wire(Symbol::QuestProgressUpdate));
        assert_eq!(opcode2, realm_proto::to_wire(Symbol::QuestComplete));
    }

    /// S7: an abrupt close with a dirty, character-bound session triggers
    /// exactly one `persist_on_logout` call, and termination is idempotent.
    #[tokio::test]
    async fn s7_abrupt_close_flushes_dirty_session_exactly_once() {
        let registry = Arc::new(Registry::with_defaults());
        let persistence = Arc::new(InMemoryQuestPersistence::new());
        let mut session = Session::new();
        session.character = Some(CharacterHandle {
            id: 42,
            name: "Kailen".to_string(),
        });
        session.touch_quest(
            1,
            QuestProgress {
                quest_id: 1,
                objectives_complete: 1,
                objectives_total: 2,
            },
        );

        let ctx = ConnectionContext {
            id: 7,
            role: Role::World,
            remote_addr: "127.0.0.1:1".parse().unwrap(),
            state: ConnectionState::Authenticated,
            session: session.clone(),
            crypto: None,
            rate_limiter: Arc::new(RateLimiter::new()),
            config: Arc::new(ServerConfig::default()),
        };

        let mut connection = Connection {
            id: 7,
            role: Role::World,
            remote_addr: ctx.remote_addr,
            stream: dummy_connected_stream(),
            buffer: BytesMut::new(),
            session_snapshot: session,
            ctx: Some(ctx),
            registry,
            persistence: persistence.clone(),
            persist_interval: DEFAULT_PERSIST_INTERVAL,
            terminated: false,
        };

        connection.terminate("peer closed the socket").await;
        connection.terminate("peer closed the socket").await;

        assert_eq!(persistence.logout_call_count(42), 1);
        assert_eq!(connection.ctx.as_ref().unwrap().state, ConnectionState::Disconnected);
    }

    /// Persistence cadence (§4.8): no tick fires before
    /// `ExternalMessage::SchedulePersistence` arrives, and once scheduled it
    /// repeats on the configured interval rather than firing once.
    #[tokio::test(start_paused = true)]
    async fn persistence_ticks_only_after_scheduling_and_then_repeats_on_cadence() {
        let registry = Arc::new(Registry::with_defaults());
        let persistence = Arc::new(InMemoryQuestPersistence::new());
        let mut session = Session::new();
        session.character = Some(CharacterHandle {
            id: 42,
            name: "Kailen".to_string(),
        });
        session.touch_quest(
            1,
            QuestProgress {
                quest_id: 1,
                objectives_complete: 1,
                objectives_total: 2,
            },
        );

        let ctx = ConnectionContext {
            id: 9,
            role: Role::World,
            remote_addr: "127.0.0.1:1".parse().unwrap(),
            state: ConnectionState::Authenticated,
            session: session.clone(),
            crypto: None,
            rate_limiter: Arc::new(RateLimiter::new()),
            config: Arc::new(ServerConfig::default()),
        };

        let (tx, rx) = mpsc::channel(8);
        let connection = Connection {
            id: 9,
            role: Role::World,
            remote_addr: ctx.remote_addr,
            stream: dummy_connected_stream(),
            buffer: BytesMut::new(),
            session_snapshot: session,
            ctx: Some(ctx),
            registry,
            persistence: persistence.clone(),
            persist_interval: Duration::from_secs(30),
            terminated: false,
        };

        let task = tokio::spawn(connection.run(rx));

        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(persistence.dirty_call_count(42), 0);

        tx.send(ExternalMessage::SchedulePersistence).await.unwrap();
        settle().await;
        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(persistence.dirty_call_count(42), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(persistence.dirty_call_count(42), 2);

        drop(tx);
        let _ = task.await;
    }
}
