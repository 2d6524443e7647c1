//! Game-session actor: an isolated Tokio task that owns one pairing.
//!
//! Each session runs in its own task, communicating with the outside
//! world through an mpsc channel — no shared mutable state, just message
//! passing. Player events (decoded frames, disconnects) are funneled into
//! the same channel by listener callbacks registered on each seated
//! player, so everything a session does is serialized through one loop:
//! seat changes, message routing, the searching animation, and teardown
//! never race each other.

use std::sync::Arc;

use hexmatch_protocol::{GameId, GameParams, Message, MessageType, PlayerId};
use hexmatch_session::{ListenerId, Player, PlayerEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::{GameError, GameState, MatchConfig, MatchmakerHandle, Metrics};

/// The rotating placeholder shown as a lone player's "opponent" while the
/// matchmaker looks for a real one.
const SEARCHING_FRAMES: [&str; 4] =
    ["Searching", "Searching.", "Searching..", "Searching..."];

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

/// Commands sent to a game-session actor through its channel.
pub(crate) enum GameCommand {
    /// Seat a player.
    AddPlayer {
        player: Player,
        reply: oneshot::Sender<Result<bool, GameError>>,
    },

    /// A decoded frame arrived from a seated player.
    PlayerMessage { from: PlayerId, message: Message },

    /// A seated player's connection closed.
    PlayerDisconnected { from: PlayerId },

    /// Request a metadata snapshot.
    GetInfo { reply: oneshot::Sender<GameInfo> },
}

/// A snapshot of session metadata.
#[derive(Debug, Clone)]
pub struct GameInfo {
    /// The session's unique ID.
    pub game_id: GameId,
    /// Current lifecycle state.
    pub state: GameState,
    /// Number of occupied seats (0–2).
    pub player_count: usize,
}

/// Handle to a running game-session actor. Cheap to clone.
#[derive(Clone)]
pub struct GameHandle {
    game_id: GameId,
    sender: mpsc::UnboundedSender<GameCommand>,
}

impl GameHandle {
    /// The session's unique ID.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Seats a player in this session.
    ///
    /// Returns `Ok(true)` when the session is now full (both seats taken)
    /// so the caller knows to retire it, `Ok(false)` when the player is
    /// waiting for an opponent.
    ///
    /// # Errors
    /// - [`GameError::NotJoinable`] — the session has left `WaitingForPlayers`
    /// - [`GameError::GameFull`] — both seats already taken
    /// - [`GameError::Unavailable`] — the actor is gone
    pub async fn add_player(&self, player: Player) -> Result<bool, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GameCommand::AddPlayer {
                player,
                reply: reply_tx,
            })
            .map_err(|_| GameError::Unavailable(self.game_id))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.game_id))?
    }

    /// Requests the current session info.
    ///
    /// # Errors
    /// Returns [`GameError::Unavailable`] if the actor is gone.
    pub async fn info(&self) -> Result<GameInfo, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GameCommand::GetInfo { reply: reply_tx })
            .map_err(|_| GameError::Unavailable(self.game_id))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.game_id))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// One of the two player positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    A,
    B,
}

/// A seated player plus the session's bookkeeping about them.
struct Seat {
    player: Player,
    /// Registration on the player's event stream, removed at teardown so
    /// a re-queued player doesn't keep feeding a dead session.
    listener: ListenerId,
    /// Session-side duplicate-surrender tracking.
    surrendered: bool,
}

/// The internal actor state. Runs inside a Tokio task.
struct GameActor {
    game_id: GameId,
    state: GameState,
    config: MatchConfig,
    metrics: Arc<Metrics>,
    matchmaker: MatchmakerHandle,
    slot_a: Option<Seat>,
    slot_b: Option<Seat>,
    /// Session-wide move-preview flag, mirroring whichever player set it
    /// last. Baked into the StartMatch parameters for both sides.
    preview_moves: bool,
    search_frame: usize,
    /// The actor's own handle on its command channel, for wiring player
    /// listeners back into the loop. Dropped once the session is complete
    /// and emptied, so the channel closes when the last outside handle
    /// goes away and the task can end.
    sender: Option<mpsc::UnboundedSender<GameCommand>>,
    receiver: mpsc::UnboundedReceiver<GameCommand>,
}

impl GameActor {
    /// Runs the actor loop until the session completes (or every handle
    /// drops).
    async fn run(mut self) {
        tracing::debug!(game = %self.game_id, "game session started");

        let mut search_tick = tokio::time::interval(self.config.search_interval);
        search_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // Every handle is gone; nothing can ever reach this
                    // session again.
                    None => break,
                },
                _ = search_tick.tick() => self.on_search_tick().await,
            }

            // A completed, emptied session is dead for good — it is never
            // reused. Dropping our own sender lets the channel close as
            // soon as the last outside handle does, ending the task,
            // while still answering info requests until then.
            if self.state == GameState::Complete
                && self.slot_a.is_none()
                && self.slot_b.is_none()
            {
                self.sender = None;
            }
        }

        tracing::debug!(game = %self.game_id, "game session stopped");
    }

    async fn handle_command(&mut self, cmd: GameCommand) {
        match cmd {
            GameCommand::AddPlayer { player, reply } => {
                let result = self.handle_add_player(player).await;
                let _ = reply.send(result);
            }
            GameCommand::PlayerMessage { from, message } => {
                self.handle_player_message(from, message).await;
            }
            GameCommand::PlayerDisconnected { from } => {
                self.handle_player_disconnected(from).await;
            }
            GameCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
        }
    }

    // -- Seating ------------------------------------------------------------

    /// Routes every event from a seated player into this actor's channel.
    fn register_listener(&self, player: &Player) -> ListenerId {
        // Players are only seated while waiting, long before the sender
        // is dropped at teardown.
        let sender = self
            .sender
            .clone()
            .expect("accepting session has a live command channel");
        player.add_listener(move |p, event| {
            let cmd = match event {
                PlayerEvent::Message(message) => GameCommand::PlayerMessage {
                    from: p.id(),
                    message: message.clone(),
                },
                PlayerEvent::Disconnected => {
                    GameCommand::PlayerDisconnected { from: p.id() }
                }
                // Initialization already happened — the matchmaker only
                // seats initialized players.
                PlayerEvent::Initialized => return,
            };
            let _ = sender.send(cmd);
        })
    }

    /// Seats a player: first arrival into slot A, second into slot B.
    /// Returns whether the session is now full.
    async fn handle_add_player(&mut self, player: Player) -> Result<bool, GameError> {
        if self.state != GameState::WaitingForPlayers {
            return Err(GameError::NotJoinable {
                game_id: self.game_id,
                state: self.state,
            });
        }
        if self.slot_a.is_some() && self.slot_b.is_some() {
            return Err(GameError::GameFull(self.game_id));
        }

        let seat = Seat {
            listener: self.register_listener(&player),
            player,
            surrendered: false,
        };
        let slot = if self.slot_a.is_none() { Slot::A } else { Slot::B };
        match slot {
            Slot::A => self.slot_a = Some(seat),
            Slot::B => self.slot_b = Some(seat),
        }

        // A player can vanish between initialization and seating; its
        // Disconnected event then fired before this session was listening.
        // Catch up here so a dead connection can't hold a seat open.
        if let (Some(seat), Some(sender)) = (self.seat(slot), &self.sender) {
            if seat.player.is_closed() {
                let _ = sender.send(GameCommand::PlayerDisconnected {
                    from: seat.player.id(),
                });
            }
        }

        if let (Some(a), Some(b)) = (&self.slot_a, &self.slot_b) {
            let (first, second) = (a.player.clone(), b.player.clone());
            tracing::info!(
                game = %self.game_id,
                %first,
                %second,
                "players paired"
            );

            // The pair must sit on opposite teams; the newcomer moves.
            if first.team() == second.team() {
                second.swap_team().await;
            }

            // Tell each side who they're facing and mirror the opponent's
            // current readiness.
            let name_for_first = self.display_name(&second);
            let name_for_second = self.display_name(&first);
            first.set_opponent_name(name_for_first.as_bytes()).await;
            second.set_opponent_name(name_for_second.as_bytes()).await;
            first.send(&ready_message(second.is_ready())).await;
            second.send(&ready_message(first.is_ready())).await;

            Ok(true)
        } else {
            let lone = self
                .seat(slot)
                .expect("seat was just filled")
                .player
                .clone();
            tracing::info!(game = %self.game_id, player = %lone, "waiting for an opponent");

            lone.set_opponent_name(SEARCHING_FRAMES[0].as_bytes()).await;
            self.preview_moves = lone.preview_moves();
            lone.send(&Message::unready()).await;

            Ok(false)
        }
    }

    /// Advances the "Searching…" animation on a lone waiting player.
    /// Cosmetic; never runs once the session is paired or done.
    async fn on_search_tick(&mut self) {
        if self.state != GameState::WaitingForPlayers {
            return;
        }
        let lone = match (&self.slot_a, &self.slot_b) {
            (Some(seat), None) | (None, Some(seat)) => seat.player.clone(),
            _ => return,
        };
        self.search_frame = (self.search_frame + 1) % SEARCHING_FRAMES.len();
        lone.set_opponent_name(SEARCHING_FRAMES[self.search_frame].as_bytes())
            .await;
    }

    // -- Message routing ----------------------------------------------------

    async fn handle_player_message(&mut self, from: PlayerId, message: Message) {
        let Some(slot) = self.slot_of(from) else {
            tracing::warn!(
                game = %self.game_id,
                player = %from,
                %message,
                "message from a player in neither seat, discarding"
            );
            return;
        };
        let sender = self.seat_player(slot);
        let other = self.other_player(slot);

        match message.message_type() {
            MessageType::Ping | MessageType::Pong => {
                tracing::trace!(game = %self.game_id, from = %sender, %message, "relay");
            }
            _ => {
                tracing::debug!(game = %self.game_id, from = %sender, %message, "relay");
            }
        }

        match message.message_type() {
            // Forward or silently drop.
            MessageType::None
            | MessageType::Pong
            | MessageType::ProposeTeamChange
            | MessageType::DenyTeamChange => {
                if let Some(other) = &other {
                    other.send(&message).await;
                }
            }

            // Forward, and an absent opponent is worth a warning.
            MessageType::Promotion
            | MessageType::BoardState
            | MessageType::OfferDraw
            | MessageType::DenyDraw => {
                self.forward_or_warn(&other, &message).await;
            }

            // Game-ending results: complete the session, then forward.
            MessageType::AcceptDraw
            | MessageType::FlagFall
            | MessageType::Checkmate
            | MessageType::Stalemate => {
                self.end_match();
                self.forward_or_warn(&other, &message).await;
            }

            // Handled locally.
            MessageType::Ping => {
                sender.send(&Message::pong()).await;
            }
            MessageType::PreviewMovesOn | MessageType::PreviewMovesOff => {
                self.preview_moves =
                    message.message_type() == MessageType::PreviewMovesOn;
                if let Some(other) = &other {
                    other.send(&message).await;
                }
            }
            MessageType::UpdateName => {
                // The sender renamed themself; refresh what their opponent
                // sees. The sender's own session state already took the
                // new name on receive.
                if let Some(other) = &other {
                    let display = self.display_name(&sender);
                    other.set_opponent_name(display.as_bytes()).await;
                }
            }
            MessageType::Disconnect => {
                if self.state == GameState::Playing {
                    if let Some(other) = &other {
                        other.send(&message).await;
                    }
                }
                sender.close("client requested disconnect").await;
            }
            MessageType::ApproveTeamChange => {
                if let Some(other) = &other {
                    other.set_team(other.team().opposite());
                    other.send(&message).await;
                }
            }
            MessageType::Surrender => {
                self.handle_surrender(slot, &other, &message).await;
            }
            MessageType::Ready | MessageType::Unready => {
                self.refresh_readiness().await;
                if let Some(other) = &other {
                    other.send(&message).await;
                }
            }

            // Only ever sent by the server; a client sending one is broken.
            MessageType::Connect | MessageType::StartMatch => {
                tracing::error!(
                    game = %self.game_id,
                    from = %sender,
                    %message,
                    "received server-only message from a client"
                );
            }

            // Tags from the future: forward best-effort.
            MessageType::Unknown(tag) => {
                tracing::warn!(
                    game = %self.game_id,
                    from = %sender,
                    tag,
                    "unknown message type, forwarding anyway"
                );
                if let Some(other) = &other {
                    other.send(&message).await;
                }
            }
        }
    }

    async fn forward_or_warn(&self, other: &Option<Player>, message: &Message) {
        match other {
            Some(other) => other.send(message).await,
            None => tracing::warn!(
                game = %self.game_id,
                %message,
                "no opponent to forward to"
            ),
        }
    }

    async fn handle_surrender(
        &mut self,
        slot: Slot,
        other: &Option<Player>,
        message: &Message,
    ) {
        if self.seat(slot).is_some_and(|seat| seat.surrendered) {
            tracing::warn!(
                game = %self.game_id,
                player = %self.seat_player(slot),
                "duplicate surrender"
            );
        }

        // A surrender outside an active match is an anomaly, not a result:
        // tear the session down instead of relaying nonsense.
        match self.state {
            GameState::WaitingForPlayers => {
                self.force_end("surrender received while waiting for players")
                    .await;
                return;
            }
            GameState::Complete => {
                self.force_end("surrender received after the game completed")
                    .await;
                return;
            }
            GameState::Playing => {}
        }

        if let Some(seat) = self.seat_mut(slot) {
            seat.surrendered = true;
        }
        self.end_match();
        match other {
            // Forward with the original "when" payload intact.
            Some(other) => other.send(message).await,
            None => tracing::error!(
                game = %self.game_id,
                "no opponent to forward the surrender to"
            ),
        }
    }

    /// Re-evaluates readiness after a Ready/Unready: starts the match when
    /// both seated players are ready, otherwise just refreshes the
    /// announced names (they may carry a ready indicator).
    async fn refresh_readiness(&mut self) {
        let (Some(a), Some(b)) = (&self.slot_a, &self.slot_b) else {
            return;
        };
        let (first, second) = (a.player.clone(), b.player.clone());

        if self.state == GameState::WaitingForPlayers
            && first.is_ready()
            && second.is_ready()
        {
            self.transition(GameState::Playing);
            tracing::info!(
                game = %self.game_id,
                %first,
                %second,
                "both players ready, starting match"
            );

            let name_for_first = self.display_name(&second);
            let name_for_second = self.display_name(&first);
            first.set_opponent_name(name_for_first.as_bytes()).await;
            second.set_opponent_name(name_for_second.as_bytes()).await;

            for player in [&first, &second] {
                let params = GameParams::new(
                    player.team(),
                    self.preview_moves,
                    self.config.timer_duration,
                    self.config.show_clock,
                );
                match Message::start_match(&params) {
                    Ok(message) => player.send(&message).await,
                    Err(err) => tracing::error!(
                        game = %self.game_id,
                        error = %err,
                        "failed to encode match parameters"
                    ),
                }
            }
        } else {
            let name_for_first = self.display_name(&second);
            let name_for_second = self.display_name(&first);
            first.set_opponent_name(name_for_first.as_bytes()).await;
            second.set_opponent_name(name_for_second.as_bytes()).await;
        }
    }

    // -- Teardown -----------------------------------------------------------

    /// Reacts to a seated player's connection closing.
    async fn handle_player_disconnected(&mut self, from: PlayerId) {
        let Some(slot) = self.slot_of(from) else {
            // Already torn down (e.g. force_end closed both sides).
            tracing::debug!(
                game = %self.game_id,
                player = %from,
                "disconnect for a player no longer seated"
            );
            return;
        };
        tracing::info!(game = %self.game_id, player = %from, "player disconnected");

        // Detach from both players before anything else so no further
        // events from either reach this session.
        for seat in [&self.slot_a, &self.slot_b].into_iter().flatten() {
            seat.player.remove_listener(seat.listener);
        }

        let other = match slot {
            Slot::A => self.slot_b.take(),
            Slot::B => self.slot_a.take(),
        };
        let _gone = match slot {
            Slot::A => self.slot_a.take(),
            Slot::B => self.slot_b.take(),
        };

        match self.state {
            GameState::WaitingForPlayers => {
                // The lobby emptied before the match: the survivor goes
                // back to the matchmaker for a fresh pairing.
                if let Some(other) = &other {
                    tracing::info!(
                        game = %self.game_id,
                        player = %other.player,
                        "re-queueing waiting player"
                    );
                    self.matchmaker.requeue(other.player.clone());
                }
            }
            GameState::Playing => {
                // Mid-match disconnect: the survivor wins by forfeit,
                // delivered as a synthetic surrender on the quitter's
                // behalf — unless the survivor had already surrendered.
                if let Some(other) = &other {
                    if !other.player.sent_surrender() {
                        match Message::surrender(0.0) {
                            Ok(message) => other.player.send(&message).await,
                            Err(err) => tracing::error!(
                                game = %self.game_id,
                                error = %err,
                                "failed to encode forfeit surrender"
                            ),
                        }
                    }
                }
            }
            GameState::Complete => {}
        }

        self.end_match();
    }

    /// Abnormal teardown: complete the session, close both connections,
    /// and make sure the matchmaker isn't left holding this session open.
    async fn force_end(&mut self, reason: &str) {
        tracing::error!(game = %self.game_id, reason, "force ending game session");

        let seats: Vec<Seat> = self
            .slot_a
            .take()
            .into_iter()
            .chain(self.slot_b.take())
            .collect();
        for seat in &seats {
            seat.player.remove_listener(seat.listener);
        }

        self.end_match();

        for seat in seats {
            seat.player.close(reason).await;
        }
        self.matchmaker.retire(self.game_id);
    }

    /// Completes the session (idempotent).
    fn end_match(&mut self) {
        if self.state != GameState::Complete {
            self.transition(GameState::Complete);
        }
    }

    /// Moves the state machine, enforcing the transition table. An illegal
    /// transition can only come from a server bug — remote input is
    /// guarded before ever reaching this — so it fails loudly rather than
    /// being absorbed.
    fn transition(&mut self, next: GameState) {
        assert!(
            self.state.can_transition_to(next),
            "illegal game state transition {} -> {} in {}",
            self.state,
            next,
            self.game_id
        );
        tracing::debug!(
            game = %self.game_id,
            from = %self.state,
            to = %next,
            "state transition"
        );
        match (self.state, next) {
            (GameState::WaitingForPlayers, GameState::Playing) => {
                self.metrics.game_started();
            }
            (GameState::Playing, GameState::Complete) => {
                self.metrics.game_finished();
            }
            _ => {}
        }
        self.state = next;
    }

    // -- Seat helpers -------------------------------------------------------

    fn seat(&self, slot: Slot) -> Option<&Seat> {
        match slot {
            Slot::A => self.slot_a.as_ref(),
            Slot::B => self.slot_b.as_ref(),
        }
    }

    fn seat_mut(&mut self, slot: Slot) -> Option<&mut Seat> {
        match slot {
            Slot::A => self.slot_a.as_mut(),
            Slot::B => self.slot_b.as_mut(),
        }
    }

    /// The player in `slot`. Only called for slots just resolved by
    /// [`slot_of`](Self::slot_of).
    fn seat_player(&self, slot: Slot) -> Player {
        self.seat(slot)
            .expect("slot resolved to an occupied seat")
            .player
            .clone()
    }

    fn other_player(&self, slot: Slot) -> Option<Player> {
        let other = match slot {
            Slot::A => &self.slot_b,
            Slot::B => &self.slot_a,
        };
        other.as_ref().map(|seat| seat.player.clone())
    }

    fn slot_of(&self, id: PlayerId) -> Option<Slot> {
        if self.slot_a.as_ref().is_some_and(|s| s.player.id() == id) {
            Some(Slot::A)
        } else if self.slot_b.as_ref().is_some_and(|s| s.player.id() == id) {
            Some(Slot::B)
        } else {
            None
        }
    }

    /// The name to announce for `player`, optionally decorated with a
    /// ready indicator.
    fn display_name(&self, player: &Player) -> String {
        let name = player.name();
        if self.config.show_ready_in_name {
            let marker = if player.is_ready() { '+' } else { '-' };
            format!("{marker}{name}")
        } else {
            name
        }
    }

    fn info(&self) -> GameInfo {
        GameInfo {
            game_id: self.game_id,
            state: self.state,
            player_count: self.slot_a.iter().count() + self.slot_b.iter().count(),
        }
    }
}

fn ready_message(ready: bool) -> Message {
    if ready {
        Message::ready()
    } else {
        Message::unready()
    }
}

/// Spawns a new game-session actor and returns a handle to it.
pub(crate) fn spawn_game(
    game_id: GameId,
    config: MatchConfig,
    metrics: Arc<Metrics>,
    matchmaker: MatchmakerHandle,
) -> GameHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let actor = GameActor {
        game_id,
        state: GameState::WaitingForPlayers,
        config,
        metrics,
        matchmaker,
        slot_a: None,
        slot_b: None,
        preview_moves: true,
        search_frame: 0,
        sender: Some(tx.clone()),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    GameHandle {
        game_id,
        sender: tx,
    }
}
