//! Process-wide status counters.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Connected-player and active-game counters.
///
/// Status reporting only — nothing correctness-critical reads these. The
/// connected-player count additionally feeds the server's shutdown guard
/// ("refuse to exit while players are connected"). A player counts as
/// connected from protocol initialization, not from accept.
#[derive(Debug, Default)]
pub struct Metrics {
    connected_players: AtomicUsize,
    active_games: AtomicUsize,
}

impl Metrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an initialized player; returns the new count.
    pub fn player_connected(&self) -> usize {
        self.connected_players.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Records a disconnected player; returns the new count.
    pub fn player_disconnected(&self) -> usize {
        self.connected_players.fetch_sub(1, Ordering::Relaxed) - 1
    }

    /// Players currently connected (initialized and not yet disconnected).
    pub fn connected_players(&self) -> usize {
        self.connected_players.load(Ordering::Relaxed)
    }

    /// Records a match entering `Playing`.
    pub(crate) fn game_started(&self) {
        self.active_games.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a playing match completing.
    pub(crate) fn game_finished(&self) {
        self.active_games.fetch_sub(1, Ordering::Relaxed);
    }

    /// Matches currently in `Playing`.
    pub fn active_games(&self) -> usize {
        self.active_games.load(Ordering::Relaxed)
    }
}
