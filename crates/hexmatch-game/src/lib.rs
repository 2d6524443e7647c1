//! Game-session pairing and relaying for Hexmatch.
//!
//! Each game session runs as an isolated Tokio task (actor model) owning
//! up to two seated players, its lifecycle state machine, and the message
//! routing policy between the pair. The matchmaker owns the single
//! "open session" slot that new players flow into.
//!
//! # Key types
//!
//! - [`GameHandle`] — send commands to a running game-session actor
//! - [`GameState`] — the session lifecycle state machine
//! - [`Matchmaker`] — pairs initialized players into sessions
//! - [`MatchConfig`] — match settings (timer, clock, search animation)
//! - [`Metrics`] — process-wide status counters

mod config;
mod error;
mod game;
mod matchmaker;
mod metrics;

pub use config::{GameState, MatchConfig};
pub use error::GameError;
pub use game::{GameHandle, GameInfo};
pub use matchmaker::{Matchmaker, MatchmakerHandle};
pub use metrics::Metrics;
