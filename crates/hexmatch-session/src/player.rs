//! The `Player` session: one accepted connection, wrapped.
//!
//! A `Player` owns the receive buffer and read task for its socket and
//! exposes three things to the layers above:
//!
//! - an event stream (message received / initialized / disconnected)
//!   delivered through registered listener callbacks,
//! - an atomic [`send`](Player::send) for outbound frames,
//! - the per-connection match state (name, team, ready, preview, flags).
//!
//! `Player` is a cheap clone handle (an `Arc` underneath); the read task,
//! the game session, and the server all hold clones of the same session.
//!
//! # Initialization
//!
//! A freshly accepted connection is not yet a *player* — it might be a
//! port scanner or a stalled client. The session becomes initialized the
//! first time it proves liveness by sending a Ping, or when the init
//! timeout elapses, whichever comes first; exactly one of the two fires
//! the `Initialized` event, and that event is the matchmaker's cue to
//! seat the player.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use hexmatch_protocol::{Frame, Message, MessageType, PlayerId, Team};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::SessionError;

/// Counter for generating unique player IDs.
static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

/// How long a connection gets to send its first Ping before it is
/// force-initialized anyway.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Read chunk size. Frames are at most 8 + 65535 bytes; one chunk rarely
/// holds more than a handful of messages.
const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// Events and listeners
// ---------------------------------------------------------------------------

/// An event emitted by a player session.
///
/// Events are delivered in order, on the session's read task (or on
/// whichever task triggered a close). Listeners must not block; the
/// intended pattern is to enqueue into a channel and return.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// A complete frame was decoded from the connection.
    Message(Message),
    /// The connection proved liveness (first Ping) or the init timeout
    /// elapsed. Fired exactly once per session.
    Initialized,
    /// The connection closed. Fired exactly once, on the first
    /// [`Player::close`], whatever the cause.
    Disconnected,
}

/// Handle for unregistering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Player, &PlayerEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// The game-relevant state of one connection. Mutated both by inbound
/// traffic (the table in `handle_inbound`) and by the owning game session.
#[derive(Debug, Clone)]
struct PlayerState {
    name: String,
    team: Team,
    ready: bool,
    preview_moves: bool,
    initialized: bool,
    sent_surrender: bool,
    sent_disconnect: bool,
    sent_connect: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            name: "Opponent".to_string(),
            team: Team::Black,
            ready: false,
            preview_moves: true,
            initialized: false,
            sent_surrender: false,
            sent_disconnect: false,
            sent_connect: false,
        }
    }
}

struct Inner {
    id: PlayerId,
    state: StdMutex<PlayerState>,
    listeners: StdMutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
    /// `Some(reason)` once closed. Checked by every send; set exactly once.
    closed: StdMutex<Option<String>>,
    /// Write half of the socket. The lock makes each send atomic with
    /// respect to concurrent senders; `None` once closed.
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Read half, parked here until [`Player::listen`] hands it to the
    /// read task.
    reader: StdMutex<Option<OwnedReadHalf>>,
    /// Wakes the read task out of a blocked read on close.
    shutdown: Notify,
    init_timer: StdMutex<Option<JoinHandle<()>>>,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One player's session. Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct Player {
    inner: Arc<Inner>,
}

impl Player {
    /// Wraps an accepted connection with the default init timeout.
    ///
    /// The init timer starts immediately; call [`listen`](Self::listen) to
    /// start the receive loop (after registering listeners, so no event is
    /// missed).
    pub fn new(stream: TcpStream) -> Self {
        Self::with_init_timeout(stream, INIT_TIMEOUT)
    }

    /// Wraps an accepted connection with a custom init timeout.
    pub fn with_init_timeout(stream: TcpStream, init_timeout: Duration) -> Self {
        let (read_half, write_half) = stream.into_split();
        let player = Self {
            inner: Arc::new(Inner {
                id: PlayerId(NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed)),
                state: StdMutex::new(PlayerState::default()),
                listeners: StdMutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                closed: StdMutex::new(None),
                writer: Mutex::new(Some(write_half)),
                reader: StdMutex::new(Some(read_half)),
                shutdown: Notify::new(),
                init_timer: StdMutex::new(None),
            }),
        };

        // One-shot init timer: if no Ping has arrived when it fires, the
        // session is force-initialized so a silent client still gets
        // seated. A Ping-initialized session makes this a no-op; close
        // aborts it.
        let timer_player = player.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(init_timeout).await;
            if timer_player.mark_initialized() {
                tracing::debug!(
                    player = %timer_player.id(),
                    "init timeout elapsed, force-initializing"
                );
                timer_player.emit(&PlayerEvent::Initialized);
            }
        });
        *player.inner.init_timer.lock().expect("init timer lock") = Some(handle);

        player
    }

    /// This session's process-unique ID.
    pub fn id(&self) -> PlayerId {
        self.inner.id
    }

    // -- Listener registry --------------------------------------------------

    /// Registers an event listener. Listeners are invoked in registration
    /// order, synchronously on the task that produced the event.
    ///
    /// A listener may call [`remove_listener`](Self::remove_listener) —
    /// including on its own ID — from inside the callback.
    pub fn add_listener(
        &self,
        listener: impl Fn(&Player, &PlayerEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .expect("listener lock")
            .push((id, Arc::new(listener)));
        id
    }

    /// Unregisters a listener. Unknown IDs are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        self.inner
            .listeners
            .lock()
            .expect("listener lock")
            .retain(|(lid, _)| *lid != id);
    }

    /// Delivers an event to every registered listener, in order.
    ///
    /// The registry lock is released before any callback runs (a snapshot
    /// is taken), so callbacks can re-enter the registry safely. A
    /// listener removed mid-dispatch still sees the in-flight event.
    fn emit(&self, event: &PlayerEvent) {
        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .expect("listener lock")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(self, event);
        }
    }

    // -- State accessors ----------------------------------------------------

    /// The display name last announced by this player.
    pub fn name(&self) -> String {
        self.state().name.clone()
    }

    /// This player's current team.
    pub fn team(&self) -> Team {
        self.state().team
    }

    /// Directly assigns this player's team (used by the game session when
    /// relaying an approved team change).
    pub fn set_team(&self, team: Team) {
        self.state().team = team;
    }

    /// Whether this player has declared ready.
    pub fn is_ready(&self) -> bool {
        self.state().ready
    }

    /// This player's move-preview preference.
    pub fn preview_moves(&self) -> bool {
        self.state().preview_moves
    }

    /// Whether the session has initialized (Ping or timeout).
    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// Whether this player has sent a Surrender.
    pub fn sent_surrender(&self) -> bool {
        self.state().sent_surrender
    }

    /// Whether this player has sent a Disconnect notice.
    pub fn sent_disconnect(&self) -> bool {
        self.state().sent_disconnect
    }

    /// Whether this connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.lock().expect("closed lock").is_some()
    }

    /// The reason the connection closed, if it has.
    pub fn closed_reason(&self) -> Option<String> {
        self.inner.closed.lock().expect("closed lock").clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PlayerState> {
        self.inner.state.lock().expect("player state lock")
    }

    /// Flips `initialized` and reports whether this call did the flip.
    /// The compare-and-set under the state lock is what guarantees that
    /// only one of {Ping, timeout} ever fires the `Initialized` event.
    fn mark_initialized(&self) -> bool {
        let mut state = self.state();
        if state.initialized {
            return false;
        }
        state.initialized = true;
        true
    }

    // -- Send path ----------------------------------------------------------

    /// Encodes and writes one frame to the connection.
    ///
    /// The frame is written as a single unit under the writer lock, so
    /// concurrent sends from different tasks never interleave bytes on
    /// the wire. A send to a closed connection is logged and dropped; a
    /// write failure closes the connection.
    pub async fn send(&self, message: &Message) {
        if self.is_closed() {
            tracing::debug!(
                player = %self.inner.id,
                %message,
                "ignoring send to closed connection"
            );
            return;
        }

        match message.message_type() {
            MessageType::Ping | MessageType::Pong | MessageType::UpdateName => {
                tracing::trace!(player = %self.inner.id, %message, "send");
            }
            _ => tracing::debug!(player = %self.inner.id, %message, "send"),
        }

        let bytes = message.encode();
        let write_result = {
            let mut writer = self.inner.writer.lock().await;
            match writer.as_mut() {
                Some(write_half) => write_half.write_all(&bytes).await,
                None => return, // closed between the check and the lock
            }
        };

        if let Err(err) = write_result {
            tracing::warn!(player = %self.inner.id, error = %err, "send failed");
            self.close(&format!("write failed: {err}")).await;
            return;
        }

        // Some outbound types update local state symmetrically with the
        // inbound table: announcing an opponent via Connect switches later
        // announcements to UpdateName, and pushing a preview toggle keeps
        // the session's own preview flag in sync.
        match message.message_type() {
            MessageType::Connect => self.state().sent_connect = true,
            MessageType::PreviewMovesOn => self.state().preview_moves = true,
            MessageType::PreviewMovesOff => self.state().preview_moves = false,
            _ => {}
        }
    }

    /// Announces the opponent's name to this player: a `Connect` frame the
    /// first time, an `UpdateName` frame afterwards.
    pub async fn set_opponent_name(&self, name: &[u8]) {
        let already_announced = self.state().sent_connect;
        let message = if already_announced {
            Message::update_name(name)
        } else {
            Message::connect(name)
        };
        match message {
            Ok(message) => self.send(&message).await,
            Err(err) => tracing::warn!(
                player = %self.inner.id,
                error = %err,
                "opponent name not announceable"
            ),
        }
    }

    /// Moves this player to the other team: informs the remote client with
    /// an `ApproveTeamChange`, then flips the local team value.
    pub async fn swap_team(&self) {
        self.send(&Message::approve_team_change()).await;
        let mut state = self.state();
        state.team = state.team.opposite();
    }

    // -- Close --------------------------------------------------------------

    /// Closes the connection. Idempotent: only the first call wins; it
    /// cancels the init timer, unblocks the read task, shuts the socket
    /// down for writing, and fires the `Disconnected` event exactly once.
    pub async fn close(&self, reason: &str) {
        {
            let mut closed = self.inner.closed.lock().expect("closed lock");
            if closed.is_some() {
                return;
            }
            *closed = Some(reason.to_string());
        }
        tracing::debug!(player = %self.inner.id, reason, "closing connection");

        if let Some(timer) = self.inner.init_timer.lock().expect("init timer lock").take() {
            timer.abort();
        }

        // notify_one stores a permit, so the read task picks the shutdown
        // up even if it isn't parked in select! at this instant.
        self.inner.shutdown.notify_one();

        if let Some(mut write_half) = self.inner.writer.lock().await.take() {
            let _ = write_half.shutdown().await;
        }

        self.emit(&PlayerEvent::Disconnected);
    }

    // -- Receive path -------------------------------------------------------

    /// Starts the receive loop. Safe to call once; repeated calls are
    /// ignored. Register listeners *before* calling this, or early
    /// messages race the registration.
    pub fn listen(&self) {
        let Some(read_half) = self.inner.reader.lock().expect("reader lock").take() else {
            tracing::warn!(player = %self.inner.id, "listen called twice");
            return;
        };
        let player = self.clone();
        tokio::spawn(player.receive_loop(read_half));
    }

    /// Reads the socket until close, decoding and dispatching frames.
    ///
    /// Each read appends to the buffer; every complete frame in the
    /// unconsumed region is decoded, applied, and dispatched, and the
    /// buffer is compacted so memory stays bounded by one partial frame
    /// plus one read chunk.
    async fn receive_loop(self, mut read_half: OwnedReadHalf) {
        let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            tokio::select! {
                _ = self.inner.shutdown.notified() => break,
                read = read_half.read(&mut chunk) => match read {
                    // A zero-byte read is the peer's orderly close.
                    Ok(0) => {
                        self.close("peer closed the connection").await;
                        break;
                    }
                    Ok(n) => {
                        buffer.extend_from_slice(&chunk[..n]);
                        if let Err(err) = self.drain_frames(&mut buffer) {
                            self.close(&err.to_string()).await;
                            break;
                        }
                    }
                    Err(err) => {
                        self.close(&SessionError::Io(err).to_string()).await;
                        break;
                    }
                },
            }
        }
    }

    /// Decodes every complete frame at the front of `buffer`, stopping at
    /// the first incomplete one, then compacts the buffer.
    ///
    /// # Errors
    /// Returns the fatal framing error if the stream is corrupt; the
    /// caller closes the connection.
    fn drain_frames(&self, buffer: &mut Vec<u8>) -> Result<(), SessionError> {
        let mut cursor = 0;
        while let Some(frame) = Frame::try_read(&buffer[cursor..])? {
            let message = frame.to_message();
            cursor += frame.total_len();
            self.handle_inbound(&message);
            self.emit(&PlayerEvent::Message(message));
        }

        if cursor == buffer.len() {
            buffer.clear();
        } else if cursor > 0 {
            // Shift the unconsumed tail (a partial frame) to the front.
            buffer.drain(..cursor);
        }
        Ok(())
    }

    /// Applies a received message's session-state side effects. Runs for
    /// every inbound message, before listeners see it.
    fn handle_inbound(&self, message: &Message) {
        match message.message_type() {
            MessageType::ApproveTeamChange => {
                let mut state = self.state();
                state.team = state.team.opposite();
            }
            MessageType::Ping => {
                if self.mark_initialized() {
                    self.emit(&PlayerEvent::Initialized);
                }
            }
            MessageType::Ready => self.state().ready = true,
            MessageType::Unready => self.state().ready = false,
            MessageType::PreviewMovesOn => self.state().preview_moves = true,
            MessageType::PreviewMovesOff => self.state().preview_moves = false,
            MessageType::UpdateName => {
                self.state().name = message.payload_text().into_owned();
            }
            MessageType::Surrender => self.state().sent_surrender = true,
            MessageType::Disconnect => self.state().sent_disconnect = true,
            _ => {}
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.id)
    }
}
