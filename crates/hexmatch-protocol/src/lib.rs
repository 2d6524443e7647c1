//! Wire protocol for Hexmatch.
//!
//! This crate defines the "language" that game clients and the relay server
//! speak:
//!
//! - **Types** ([`Message`], [`MessageType`], [`Team`], identity newtypes) —
//!   the values that travel on the wire.
//! - **Codec** ([`Message::encode`], [`Frame::try_read`]) — the
//!   length-prefixed binary framing that converts those values to/from bytes.
//! - **Match parameters** ([`GameParams`]) — the serialized payload of a
//!   `StartMatch` frame.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while framing.
//!
//! # Architecture
//!
//! The protocol layer sits between the raw byte stream and the session
//! layer. It doesn't know about sockets, players, or games — it only knows
//! how to frame and unframe messages:
//!
//! ```text
//! TcpStream (bytes) → Protocol (Message) → Session (player context)
//! ```
//!
//! Decoding is deliberately pull-based: [`Frame::try_read`] inspects a byte
//! window without consuming it, so the session layer can call it repeatedly
//! against a growing receive buffer and advance its own cursor by
//! [`Frame::total_len`] per decoded frame.

mod codec;
mod error;
mod params;
mod types;

pub use codec::{Frame, HEADER_LEN, MAX_PAYLOAD_LEN, SIGNATURE};
pub use error::ProtocolError;
pub use params::GameParams;
pub use types::{GameId, Message, MessageType, PlayerId, Team};
