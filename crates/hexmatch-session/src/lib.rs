//! Player session management for Hexmatch.
//!
//! This crate turns one accepted TCP connection into a stream of typed
//! protocol messages and back:
//!
//! 1. **Receive path** — a per-connection task reads raw bytes, reassembles
//!    frames across arbitrary chunk boundaries, and dispatches decoded
//!    messages to registered listeners.
//! 2. **Send path** — [`Player::send`] encodes a frame and writes it
//!    atomically, safe to call concurrently from any task.
//! 3. **Session state** — the per-connection game-relevant state (display
//!    name, team, ready flag, preview flag, surrender/disconnect markers)
//!    that both the wire traffic and the game layer mutate.
//!
//! # How it fits in the stack
//!
//! ```text
//! Game layer (above)   ← routes messages between the two players of a match
//!     ↕
//! Session layer (this crate)   ← one Player per connection
//!     ↕
//! Protocol layer (below)   ← framing, message types
//! ```

mod error;
mod player;

pub use error::SessionError;
pub use player::{ListenerId, Player, PlayerEvent, INIT_TIMEOUT};
