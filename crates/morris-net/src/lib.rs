//! Wire protocol: message framing, the message set and its encoding, and a TCP client.

pub mod framing;
pub mod messages;
pub mod tcp_client;

pub use framing::{DEFAULT_MAX_PAYLOAD, FrameConfig, FrameError, read_frame, write_frame};
pub use messages::{
    Message, MessageError, MessageTag, PROTOCOL_VERSION, Payload, SERVER_REFERENCE, User,
    deserialize_message, serialize_message,
};
pub use tcp_client::{ClientConfig, ClientError, ConnectionState, ConnectionStateWatch, GameClient};
