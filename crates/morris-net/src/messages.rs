//! Protocol messages and their binary encoding.
//!
//! Every message is an envelope of a caller-chosen reference number, an
//! optional [`GameStatus`] snapshot, and a [`Payload`] from a closed set. On
//! the wire it is encoded with [`postcard`] behind a one-byte protocol
//! version: `[version: u8] [postcard-encoded Message]`.

use morris_engine::{Colour, GameStatus};
use serde::{Deserialize, Serialize};

/// Current wire-protocol version. Prepended to every serialized message.
pub const PROTOCOL_VERSION: u8 = 1;

/// Reference used on messages the server sends on its own initiative, and on
/// replies that have nothing on the client to refer back to.
pub const SERVER_REFERENCE: i32 = -1;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Echoed back on the reply to a client request. Negative when the
    /// message does not answer anything.
    pub reference: i32,
    /// Game state after the event, on game-affecting messages.
    pub status: Option<GameStatus>,
    pub payload: Payload,
}

impl Message {
    pub fn new(reference: i32, payload: Payload) -> Self {
        Self {
            reference,
            status: None,
            payload,
        }
    }

    /// A server-initiated message.
    pub fn unsolicited(payload: Payload) -> Self {
        Self::new(SERVER_REFERENCE, payload)
    }

    /// Attach a game-state snapshot.
    #[must_use]
    pub fn with_status(mut self, status: GameStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// An `IllegalMove` rejection carrying `reason`.
    pub fn illegal(reference: i32, reason: impl Into<String>) -> Self {
        Self::new(
            reference,
            Payload::IllegalMove(IllegalMove {
                reason: reason.into(),
            }),
        )
    }

    pub fn tag(&self) -> MessageTag {
        self.payload.tag()
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Method-specific content. The variant is the message's method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Payload {
    // --- Liveness ---
    Ping(Ping),
    Pong(Pong),

    // --- Accounts ---
    Login(Credentials),
    Register(Credentials),
    Logout,
    AuthResponse(AuthResponse),

    // --- Lobby ---
    EnterQuickMatchQueue,
    LeaveQuickMatchQueue,
    /// Client to server: invite `username`. Server to client: `username`
    /// invites you.
    MatchRequest(MatchRequest),
    /// Client to server: answer the invite from `username`. Server to
    /// client: `username` answered your invite.
    MatchRequestResponse(MatchRequestResponse),
    BroadcastPlayerPool(PlayerPool),

    // --- Match lifecycle ---
    GameStart(GameStart),
    GameAborted(GameAborted),
    GameOver(GameOver),

    // --- Game actions ---
    PlaceStone(PlaceStone),
    RemoveStone(RemoveStone),
    MoveStone(MoveStone),
    IllegalMove(IllegalMove),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ping {
    pub sequence: u32,
}

/// Reply to [`Ping`] with the same sequence number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pong {
    pub sequence: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// An account as other players see it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct User {
    pub id: u64,
    pub username: String,
}

/// Outcome of a [`Payload::Login`] or [`Payload::Register`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthResponse {
    /// Which request this answers.
    pub method: MessageTag,
    pub success: bool,
    /// Human-readable explanation.
    pub message: String,
    /// The logged-in account on success.
    pub user: Option<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRequestResponse {
    pub username: String,
    pub accepted: bool,
}

/// Everyone currently idle in the lobby.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerPool {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameStart {
    /// The colour the recipient plays.
    pub colour: Colour,
    /// The colour that moves first.
    pub starting: Colour,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameAborted {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameOver {
    pub winner: Option<Colour>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceStone {
    pub x: i32,
    pub y: i32,
    pub colour: Colour,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveStone {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveStone {
    pub from_x: i32,
    pub from_y: i32,
    pub to_x: i32,
    pub to_y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IllegalMove {
    pub reason: String,
}

// ---------------------------------------------------------------------------
// MessageTag
// ---------------------------------------------------------------------------

/// Fieldless name of a payload variant, for logging and for
/// [`AuthResponse::method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageTag {
    Ping,
    Pong,
    Login,
    Register,
    Logout,
    AuthResponse,
    EnterQuickMatchQueue,
    LeaveQuickMatchQueue,
    MatchRequest,
    MatchRequestResponse,
    BroadcastPlayerPool,
    GameStart,
    GameAborted,
    GameOver,
    PlaceStone,
    RemoveStone,
    MoveStone,
    IllegalMove,
}

impl Payload {
    pub fn tag(&self) -> MessageTag {
        match self {
            Payload::Ping(_) => MessageTag::Ping,
            Payload::Pong(_) => MessageTag::Pong,
            Payload::Login(_) => MessageTag::Login,
            Payload::Register(_) => MessageTag::Register,
            Payload::Logout => MessageTag::Logout,
            Payload::AuthResponse(_) => MessageTag::AuthResponse,
            Payload::EnterQuickMatchQueue => MessageTag::EnterQuickMatchQueue,
            Payload::LeaveQuickMatchQueue => MessageTag::LeaveQuickMatchQueue,
            Payload::MatchRequest(_) => MessageTag::MatchRequest,
            Payload::MatchRequestResponse(_) => MessageTag::MatchRequestResponse,
            Payload::BroadcastPlayerPool(_) => MessageTag::BroadcastPlayerPool,
            Payload::GameStart(_) => MessageTag::GameStart,
            Payload::GameAborted(_) => MessageTag::GameAborted,
            Payload::GameOver(_) => MessageTag::GameOver,
            Payload::PlaceStone(_) => MessageTag::PlaceStone,
            Payload::RemoveStone(_) => MessageTag::RemoveStone,
            Payload::MoveStone(_) => MessageTag::MoveStone,
            Payload::IllegalMove(_) => MessageTag::IllegalMove,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("empty payload, no version byte")]
    EmptyPayload,

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

pub fn serialize_message(msg: &Message) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn deserialize_message(data: &[u8]) -> Result<Message, MessageError> {
    let (&version, body) = data.split_first().ok_or(MessageError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}
