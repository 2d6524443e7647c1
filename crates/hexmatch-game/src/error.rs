//! Error types for the game layer.

use hexmatch_protocol::GameId;

use crate::GameState;

/// Errors that can occur while seating players into game sessions.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Both seats are already taken. Seeing this means the caller routed a
    /// third player into a session the matchmaker should have retired.
    #[error("game {0} is full")]
    GameFull(GameId),

    /// The session has left `WaitingForPlayers` and accepts no one.
    #[error("game {game_id} is not accepting players in state {state}")]
    NotJoinable {
        /// The session that refused the player.
        game_id: GameId,
        /// Its state at the time.
        state: GameState,
    },

    /// The session's actor is gone (its command channel closed).
    #[error("game {0} is unavailable")]
    Unavailable(GameId),
}
