//! Match configuration and the session state machine.

use std::time::Duration;

// ---------------------------------------------------------------------------
// MatchConfig
// ---------------------------------------------------------------------------

/// Server-side match settings, shared by every session the matchmaker
/// creates. Operators override the defaults at startup.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Cadence of the "Searching…" name animation pushed to a lone
    /// waiting player.
    pub search_interval: Duration,

    /// Whether announced opponent names carry a `+`/`-` ready indicator.
    pub show_ready_in_name: bool,

    /// Whether clients should display a clock. Ignored (forced off in the
    /// match parameters) whenever a countdown timer is configured.
    pub show_clock: bool,

    /// Countdown timer duration in seconds. 0 disables the timer.
    pub timer_duration: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            search_interval: Duration::from_millis(100),
            show_ready_in_name: false,
            show_clock: true,
            timer_duration: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The lifecycle state of a game session.
///
/// ```text
/// WaitingForPlayers ──(both ready)──→ Playing ──(result/forfeit)──→ Complete
///         │                                                            ↑
///         └———————————(lobby emptied before the match)————————————————┘
/// ```
///
/// `Complete` is terminal: a completed session is never reused, it is
/// dropped and replaced by a fresh one. Any transition not drawn above is
/// a server bug (the matchmaker routed something impossibly), never a
/// consequence of remote input, and the actor treats it as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    WaitingForPlayers,
    Playing,
    Complete,
}

impl GameState {
    /// Returns `true` if the session is accepting players.
    pub fn is_waiting(self) -> bool {
        matches!(self, Self::WaitingForPlayers)
    }

    /// Returns `true` if transitioning to `next` is legal.
    ///
    /// The match is deliberately exhaustive — every state pair has an
    /// explicit verdict, so adding a state forces this table to be
    /// revisited at compile time.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::WaitingForPlayers, Self::Playing)
            | (Self::WaitingForPlayers, Self::Complete)
            | (Self::Playing, Self::Complete) => true,

            (Self::WaitingForPlayers, Self::WaitingForPlayers)
            | (Self::Playing, Self::WaitingForPlayers)
            | (Self::Playing, Self::Playing)
            | (Self::Complete, Self::WaitingForPlayers)
            | (Self::Complete, Self::Playing)
            | (Self::Complete, Self::Complete) => false,
        }
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitingForPlayers => write!(f, "WaitingForPlayers"),
            Self::Playing => write!(f, "Playing"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(GameState::WaitingForPlayers.can_transition_to(GameState::Playing));
        assert!(GameState::WaitingForPlayers.can_transition_to(GameState::Complete));
        assert!(GameState::Playing.can_transition_to(GameState::Complete));
    }

    #[test]
    fn test_complete_is_terminal() {
        for next in [
            GameState::WaitingForPlayers,
            GameState::Playing,
            GameState::Complete,
        ] {
            assert!(!GameState::Complete.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!GameState::Playing.can_transition_to(GameState::WaitingForPlayers));
        assert!(!GameState::Playing.can_transition_to(GameState::Playing));
        assert!(
            !GameState::WaitingForPlayers.can_transition_to(GameState::WaitingForPlayers)
        );
    }

    #[test]
    fn test_is_waiting() {
        assert!(GameState::WaitingForPlayers.is_waiting());
        assert!(!GameState::Playing.is_waiting());
        assert!(!GameState::Complete.is_waiting());
    }

    #[test]
    fn test_match_config_defaults() {
        let config = MatchConfig::default();
        assert_eq!(config.search_interval, Duration::from_millis(100));
        assert!(!config.show_ready_in_name);
        assert!(config.show_clock);
        assert_eq!(config.timer_duration, 0.0);
    }
}
