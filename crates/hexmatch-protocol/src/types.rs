//! Core protocol types for Hexmatch's wire format.
//!
//! This module defines every value that travels "on the wire" between a
//! game client and the relay server, plus the identity newtypes the upper
//! layers use to talk about connections and game sessions.
//!
//! The relay does not understand game rules. It understands message *types*
//! just well enough to route them, which is why [`Message`] is a thin pair
//! of a type tag and an opaque payload rather than a rich enum of decoded
//! game structures.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::codec::MAX_PAYLOAD_LEN;
use crate::{GameParams, ProtocolError};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player connection.
///
/// Newtype over `u64` so a player id can never be confused with a game id,
/// even though both are counters underneath. Ids are process-unique and
/// monotonic; they are never reused within a server's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a game session (a pairing of up to two players).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// One of the two sides of a match.
///
/// On the wire (inside a `StartMatch` payload) a team is a bare integer:
/// `0` = White, `1` = Black. The serde impls below preserve that encoding
/// rather than serializing a string name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Team {
    White,
    Black,
}

impl Team {
    /// Returns the other team.
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// The integer the wire format uses for this team.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::White => 0,
            Self::Black => 1,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "White"),
            Self::Black => write!(f, "Black"),
        }
    }
}

impl Serialize for Team {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Team {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(Self::White),
            1 => Ok(Self::Black),
            other => Err(de::Error::custom(format!("invalid team value {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// The 1-byte type tag of a frame.
///
/// Tags are fixed by the wire protocol and must never be renumbered. Tags
/// the relay doesn't recognize decode as [`MessageType::Unknown`] and are
/// forwarded best-effort rather than rejected, so newer clients can speak
/// through an older relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    None,
    Disconnect,
    Ping,
    Pong,
    ProposeTeamChange,
    ApproveTeamChange,
    DenyTeamChange,
    Ready,
    Unready,
    StartMatch,
    Surrender,
    BoardState,
    Promotion,
    PreviewMovesOn,
    PreviewMovesOff,
    OfferDraw,
    AcceptDraw,
    DenyDraw,
    UpdateName,
    FlagFall,
    Connect,
    Checkmate,
    Stalemate,
    /// A tag this build doesn't know. Carries the raw tag byte so the frame
    /// can be re-encoded and forwarded unchanged.
    Unknown(u8),
}

impl MessageType {
    /// Decodes a raw tag byte.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::None,
            1 => Self::Disconnect,
            2 => Self::Ping,
            3 => Self::Pong,
            4 => Self::ProposeTeamChange,
            5 => Self::ApproveTeamChange,
            6 => Self::DenyTeamChange,
            7 => Self::Ready,
            8 => Self::Unready,
            9 => Self::StartMatch,
            10 => Self::Surrender,
            11 => Self::BoardState,
            12 => Self::Promotion,
            13 => Self::PreviewMovesOn,
            14 => Self::PreviewMovesOff,
            15 => Self::OfferDraw,
            16 => Self::AcceptDraw,
            17 => Self::DenyDraw,
            18 => Self::UpdateName,
            19 => Self::FlagFall,
            20 => Self::Connect,
            21 => Self::Checkmate,
            22 => Self::Stalemate,
            other => Self::Unknown(other),
        }
    }

    /// The raw tag byte this type encodes as.
    pub fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Disconnect => 1,
            Self::Ping => 2,
            Self::Pong => 3,
            Self::ProposeTeamChange => 4,
            Self::ApproveTeamChange => 5,
            Self::DenyTeamChange => 6,
            Self::Ready => 7,
            Self::Unready => 8,
            Self::StartMatch => 9,
            Self::Surrender => 10,
            Self::BoardState => 11,
            Self::Promotion => 12,
            Self::PreviewMovesOn => 13,
            Self::PreviewMovesOff => 14,
            Self::OfferDraw => 15,
            Self::AcceptDraw => 16,
            Self::DenyDraw => 17,
            Self::UpdateName => 18,
            Self::FlagFall => 19,
            Self::Connect => 20,
            Self::Checkmate => 21,
            Self::Stalemate => 22,
            Self::Unknown(other) => other,
        }
    }

    /// Whether this type's payload is UTF-8 text (names, board state,
    /// connect announcements). Used for log formatting only.
    pub fn payload_is_text(self) -> bool {
        matches!(self, Self::BoardState | Self::Connect | Self::UpdateName)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(tag) => write!(f, "Unknown({tag})"),
            other => write!(f, "{other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One complete protocol message: a type tag plus an opaque payload.
///
/// The payload's meaning depends on the type — UTF-8 text for names and
/// board state, JSON for match parameters and surrender timestamps, empty
/// for pure control messages. The relay never interprets payloads it only
/// forwards.
///
/// Invariant: the payload is at most [`MAX_PAYLOAD_LEN`] bytes, so its
/// length always fits the frame header's 16-bit length field. Constructors
/// that accept arbitrary bytes enforce this and are fallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    payload: Vec<u8>,
}

impl Message {
    /// Creates a payload-free control message (Ping, Ready, …).
    pub fn control(kind: MessageType) -> Self {
        Self {
            kind,
            payload: Vec::new(),
        }
    }

    /// Creates a message with the given payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::PayloadTooLarge`] if the payload doesn't
    /// fit the 16-bit length field.
    pub fn with_payload(
        kind: MessageType,
        payload: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { kind, payload })
    }

    /// The message's type tag.
    pub fn message_type(&self) -> MessageType {
        self.kind
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload decoded as UTF-8 text, with invalid sequences replaced.
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    // -- Typed constructors -------------------------------------------------

    /// Liveness probe. Also serves as the client's "hello": the first Ping
    /// a connection sends marks it initialized.
    pub fn ping() -> Self {
        Self::control(MessageType::Ping)
    }

    /// Reply to a [`ping`](Self::ping).
    pub fn pong() -> Self {
        Self::control(MessageType::Pong)
    }

    /// Marks the sender ready to start the match.
    pub fn ready() -> Self {
        Self::control(MessageType::Ready)
    }

    /// Clears the sender's ready flag.
    pub fn unready() -> Self {
        Self::control(MessageType::Unready)
    }

    /// Accepts a team change; the receiving side flips its team.
    pub fn approve_team_change() -> Self {
        Self::control(MessageType::ApproveTeamChange)
    }

    /// Enables or disables move previews.
    pub fn preview_moves(enabled: bool) -> Self {
        Self::control(if enabled {
            MessageType::PreviewMovesOn
        } else {
            MessageType::PreviewMovesOff
        })
    }

    /// First-time opponent announcement, carrying the opponent's name.
    ///
    /// # Errors
    /// Returns [`ProtocolError::PayloadTooLarge`] for an oversized name.
    pub fn connect(opponent_name: &[u8]) -> Result<Self, ProtocolError> {
        Self::with_payload(MessageType::Connect, opponent_name.to_vec())
    }

    /// Subsequent opponent-name update.
    ///
    /// # Errors
    /// Returns [`ProtocolError::PayloadTooLarge`] for an oversized name.
    pub fn update_name(name: &[u8]) -> Result<Self, ProtocolError> {
        Self::with_payload(MessageType::UpdateName, name.to_vec())
    }

    /// Surrender at the given match-clock time (seconds). The timestamp is
    /// carried as JSON text, matching what clients send.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Payload`] if the timestamp is not a
    /// representable JSON number (NaN or infinite).
    pub fn surrender(when: f32) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(&when)?;
        // A JSON float is a handful of bytes; the length check cannot fail.
        Self::with_payload(MessageType::Surrender, payload)
    }

    /// Tells a client its match is starting, with that client's view of the
    /// match parameters.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Payload`] if the parameters fail to
    /// serialize.
    pub fn start_match(params: &GameParams) -> Result<Self, ProtocolError> {
        let payload = params.to_bytes()?;
        Self::with_payload(MessageType::StartMatch, payload)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "Message(type={})", self.kind)
        } else if self.kind.payload_is_text() {
            write!(f, "Message(type={}, payload={})", self.kind, self.payload_text())
        } else {
            write!(
                f,
                "Message(type={}, payload={} bytes)",
                self.kind,
                self.payload.len()
            )
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_player_id_display() {
        assert_eq!(PlayerId(7).to_string(), "P-7");
    }

    #[test]
    fn test_game_id_display() {
        assert_eq!(GameId(3).to_string(), "G-3");
    }

    // =====================================================================
    // Team
    // =====================================================================

    #[test]
    fn test_team_opposite() {
        assert_eq!(Team::White.opposite(), Team::Black);
        assert_eq!(Team::Black.opposite(), Team::White);
    }

    #[test]
    fn test_team_serializes_as_integer() {
        // The wire format uses 0/1, not "White"/"Black".
        assert_eq!(serde_json::to_string(&Team::White).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Team::Black).unwrap(), "1");
    }

    #[test]
    fn test_team_deserializes_from_integer() {
        let team: Team = serde_json::from_str("1").unwrap();
        assert_eq!(team, Team::Black);
    }

    #[test]
    fn test_team_rejects_out_of_range_integer() {
        let result: Result<Team, _> = serde_json::from_str("7");
        assert!(result.is_err());
    }

    // =====================================================================
    // MessageType tags — fixed by the wire protocol, must never drift
    // =====================================================================

    #[test]
    fn test_message_type_tags_match_wire_protocol() {
        let expected: [(MessageType, u8); 23] = [
            (MessageType::None, 0),
            (MessageType::Disconnect, 1),
            (MessageType::Ping, 2),
            (MessageType::Pong, 3),
            (MessageType::ProposeTeamChange, 4),
            (MessageType::ApproveTeamChange, 5),
            (MessageType::DenyTeamChange, 6),
            (MessageType::Ready, 7),
            (MessageType::Unready, 8),
            (MessageType::StartMatch, 9),
            (MessageType::Surrender, 10),
            (MessageType::BoardState, 11),
            (MessageType::Promotion, 12),
            (MessageType::PreviewMovesOn, 13),
            (MessageType::PreviewMovesOff, 14),
            (MessageType::OfferDraw, 15),
            (MessageType::AcceptDraw, 16),
            (MessageType::DenyDraw, 17),
            (MessageType::UpdateName, 18),
            (MessageType::FlagFall, 19),
            (MessageType::Connect, 20),
            (MessageType::Checkmate, 21),
            (MessageType::Stalemate, 22),
        ];
        for (kind, tag) in expected {
            assert_eq!(kind.tag(), tag, "{kind} has wrong tag");
            assert_eq!(MessageType::from_tag(tag), kind, "tag {tag} decodes wrong");
        }
    }

    #[test]
    fn test_message_type_unknown_round_trips_raw_tag() {
        let kind = MessageType::from_tag(200);
        assert_eq!(kind, MessageType::Unknown(200));
        assert_eq!(kind.tag(), 200);
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::UpdateName.to_string(), "UpdateName");
        assert_eq!(MessageType::Unknown(42).to_string(), "Unknown(42)");
    }

    // =====================================================================
    // Message constructors
    // =====================================================================

    #[test]
    fn test_control_message_has_empty_payload() {
        let msg = Message::ping();
        assert_eq!(msg.message_type(), MessageType::Ping);
        assert!(msg.payload().is_empty());
    }

    #[test]
    fn test_update_name_carries_utf8() {
        let msg = Message::update_name("Lande 💪".as_bytes()).unwrap();
        assert_eq!(msg.message_type(), MessageType::UpdateName);
        assert_eq!(msg.payload_text(), "Lande 💪");
    }

    #[test]
    fn test_with_payload_rejects_oversized_payload() {
        let result = Message::with_payload(MessageType::BoardState, vec![0; 65536]);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge(65536))));
    }

    #[test]
    fn test_with_payload_accepts_max_payload() {
        let msg = Message::with_payload(MessageType::BoardState, vec![0; 65535]);
        assert!(msg.is_ok());
    }

    #[test]
    fn test_surrender_payload_is_json_number() {
        let msg = Message::surrender(12.5).unwrap();
        assert_eq!(msg.message_type(), MessageType::Surrender);
        let when: f32 = serde_json::from_slice(msg.payload()).unwrap();
        assert_eq!(when, 12.5);
    }

    #[test]
    fn test_surrender_rejects_nan() {
        assert!(Message::surrender(f32::NAN).is_err());
    }

    #[test]
    fn test_preview_moves_picks_tag_from_flag() {
        assert_eq!(
            Message::preview_moves(true).message_type(),
            MessageType::PreviewMovesOn
        );
        assert_eq!(
            Message::preview_moves(false).message_type(),
            MessageType::PreviewMovesOff
        );
    }

    #[test]
    fn test_display_shows_text_payloads() {
        let msg = Message::update_name(b"Circe").unwrap();
        assert_eq!(msg.to_string(), "Message(type=UpdateName, payload=Circe)");
    }

    #[test]
    fn test_display_summarizes_binary_payloads() {
        let msg = Message::with_payload(MessageType::Promotion, vec![1, 2, 3]).unwrap();
        assert_eq!(msg.to_string(), "Message(type=Promotion, payload=3 bytes)");
    }
}
