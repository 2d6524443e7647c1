//! Match parameters: the payload of a `StartMatch` frame.

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Team};

/// The parameters a client needs to set up its side of a match.
///
/// Serialized as JSON text with camelCase field names — the exact shape
/// clients already parse:
///
/// ```text
/// {"localTeam":0,"showMovePreviews":true,"timerDuration":0,"showClock":true}
/// ```
///
/// Each player receives their own copy with `local_team` set to *their*
/// team; the other fields are shared match state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameParams {
    /// The receiving player's team.
    pub local_team: Team,
    /// Whether move previews are shown (shared, last-writer-wins).
    pub show_move_previews: bool,
    /// Countdown timer duration in seconds. 0 disables the timer.
    pub timer_duration: f32,
    /// Whether to display a clock. Always false when a timer is running —
    /// the timer display replaces the clock.
    pub show_clock: bool,
}

impl GameParams {
    /// Builds match parameters, enforcing the clock/timer exclusion:
    /// a nonzero `timer_duration` forces `show_clock` off.
    pub fn new(
        local_team: Team,
        show_move_previews: bool,
        timer_duration: f32,
        show_clock: bool,
    ) -> Self {
        Self {
            local_team,
            show_move_previews,
            timer_duration,
            show_clock: if timer_duration > 0.0 { false } else { show_clock },
        }
    }

    /// Serializes to the JSON payload bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Payload`] if serialization fails (a
    /// non-finite `timer_duration`).
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses the JSON payload of a `StartMatch` frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Payload`] for malformed or mistyped JSON.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}

// =========================================================================
// Tests
// =========================================================================
