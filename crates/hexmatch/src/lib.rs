//! # Hexmatch
//!
//! Relay and matchmaking backend for a two-player hex-chess game.
//!
//! The server accepts raw TCP connections speaking a length-prefixed
//! binary protocol, pairs unmatched connections into game sessions, and
//! relays game messages between the two participants of each session.
//! Game rules live entirely in the clients; the relay understands message
//! *types* just well enough to route them and to run the session
//! lifecycle (pairing, readiness, surrender, forfeit-on-disconnect).
//!
//! Layering, bottom up: `hexmatch-protocol` (framing) →
//! `hexmatch-session` (one `Player` per connection) → `hexmatch-game`
//! (game-session actors + matchmaker) → this crate (accept loop, hand-off
//! on initialization, shutdown guard, binary).

mod error;
mod server;

pub use error::ServerError;
pub use server::{Server, ServerConfig, DEFAULT_PORT};
