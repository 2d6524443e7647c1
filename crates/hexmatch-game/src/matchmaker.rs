//! The matchmaker: a single guarded "open session" slot.
//!
//! At any moment exactly one game session is accepting players. Arrivals
//! flow into it; the instant it fills (or dies), it is replaced by a
//! fresh one. The whole check-replace-add-replace sequence for one
//! arrival runs under one lock hold, so two players arriving
//! simultaneously can never both land in a session the other just
//! filled.
//!
//! Game sessions reach back into the matchmaker (re-queueing a survivor
//! after a lobby disconnect, eagerly retiring a force-ended session)
//! through a command channel serviced by a dispatcher task — never by
//! taking the lock from inside an actor, which keeps the lock order
//! strictly matchmaker → game and deadlock-free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hexmatch_protocol::GameId;
use hexmatch_session::Player;
use tokio::sync::{mpsc, Mutex};

use crate::game::{spawn_game, GameHandle};
use crate::{GameError, MatchConfig, Metrics};

/// Counter for generating unique game-session IDs.
static NEXT_GAME_ID: AtomicU64 = AtomicU64::new(1);

/// Commands a game session can send back to the matchmaker.
enum MatchmakerCommand {
    /// Seat this player in the current open session (a lobby survivor
    /// whose opponent vanished before the match started).
    Requeue(Player),
    /// If this session is still the open one, replace it now rather than
    /// waiting for the next arrival to notice it's dead.
    Retire(GameId),
}

/// Cheap handle game sessions use to reach the matchmaker.
#[derive(Clone)]
pub struct MatchmakerHandle {
    sender: mpsc::UnboundedSender<MatchmakerCommand>,
}

impl MatchmakerHandle {
    pub(crate) fn requeue(&self, player: Player) {
        let _ = self.sender.send(MatchmakerCommand::Requeue(player));
    }

    pub(crate) fn retire(&self, game_id: GameId) {
        let _ = self.sender.send(MatchmakerCommand::Retire(game_id));
    }
}

/// Owns the open-session slot. One per process, shared as `Arc`.
pub struct Matchmaker {
    /// The session currently accepting a first or second player. Every
    /// read-check-act on this slot happens under the lock.
    open: Mutex<GameHandle>,
    config: MatchConfig,
    metrics: Arc<Metrics>,
    handle: MatchmakerHandle,
}

impl Matchmaker {
    /// Creates the matchmaker with one fresh open session, and spawns the
    /// dispatcher task that services session-originated commands.
    pub fn new(config: MatchConfig, metrics: Arc<Metrics>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = MatchmakerHandle { sender: tx };

        let first = spawn_game(
            next_game_id(),
            config.clone(),
            Arc::clone(&metrics),
            handle.clone(),
        );

        let matchmaker = Arc::new(Self {
            open: Mutex::new(first),
            config,
            metrics,
            handle,
        });

        let dispatcher = Arc::clone(&matchmaker);
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    MatchmakerCommand::Requeue(player) => {
                        dispatcher.place_player(player).await;
                    }
                    MatchmakerCommand::Retire(game_id) => {
                        dispatcher.retire(game_id).await;
                    }
                }
            }
        });

        matchmaker
    }

    /// Seats an initialized player in the open session, replacing the
    /// session first if it is no longer accepting and again the moment it
    /// fills. Returns the session the player landed in.
    ///
    /// Atomic with respect to concurrent arrivals: the lock is held for
    /// the entire sequence.
    pub async fn place_player(&self, player: Player) -> GameHandle {
        let mut open = self.open.lock().await;

        loop {
            let accepting = match open.info().await {
                Ok(info) => info.state.is_waiting(),
                // Actor gone (completed and drained) — treat as not
                // accepting and replace below.
                Err(_) => false,
            };
            if !accepting {
                *open = self.fresh_game();
            }

            match open.add_player(player.clone()).await {
                Ok(full) => {
                    let placed_in = open.clone();
                    tracing::info!(
                        player = %player,
                        game = %placed_in.game_id(),
                        full,
                        "placed player"
                    );
                    if full {
                        // Retire the filled session immediately so the
                        // next arrival never contends for it.
                        *open = self.fresh_game();
                    }
                    return placed_in;
                }
                Err(GameError::NotJoinable { game_id, state }) => {
                    // The session moved on between the check and the add
                    // (its lone occupant vanished). Replace and retry.
                    tracing::debug!(
                        game = %game_id,
                        %state,
                        "open session no longer joinable, replacing"
                    );
                    *open = self.fresh_game();
                }
                Err(GameError::Unavailable(game_id)) => {
                    tracing::debug!(
                        game = %game_id,
                        "open session gone, replacing"
                    );
                    *open = self.fresh_game();
                }
                Err(err @ GameError::GameFull(_)) => {
                    // Impossible: only the matchmaker seats players, and a
                    // full session is replaced within the same critical
                    // section that filled it.
                    unreachable!("matchmaker routed a player into a full game: {err}");
                }
            }
        }
    }

    /// Replaces the open session if it is still `game_id`. Called (via the
    /// dispatcher) by a session force-ending itself.
    async fn retire(&self, game_id: GameId) {
        let mut open = self.open.lock().await;
        if open.game_id() == game_id {
            tracing::debug!(game = %game_id, "retiring force-ended open session");
            *open = self.fresh_game();
        }
    }

    /// A snapshot of the current open session's handle (primarily for
    /// inspection and tests).
    pub async fn open_game(&self) -> GameHandle {
        self.open.lock().await.clone()
    }

    /// The process-wide status counters.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn fresh_game(&self) -> GameHandle {
        spawn_game(
            next_game_id(),
            self.config.clone(),
            Arc::clone(&self.metrics),
            self.handle.clone(),
        )
    }
}

fn next_game_id() -> GameId {
    GameId(NEXT_GAME_ID.fetch_add(1, Ordering::Relaxed))
}
