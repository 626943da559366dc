//! Authoritative Nine Men's Morris server: accounts, lobby, matches and the
//! per-connection workers that tie them to sockets.

pub mod accounts;
pub mod game_match;
pub mod lobby;
pub mod peer;
pub mod server;
pub mod worker;

pub use accounts::{AccountStore, MemoryAccountStore};
pub use game_match::{ABORT_REASON, ActionReport, GameAction, Match, MatchError, MatchId, MatchStatus};
pub use lobby::{Lobby, LobbyError};
pub use peer::{ConnectionLimitReached, ConnectionMap, IdGenerator, Outbox, PeerHandle, PeerId};
pub use server::{GameServer, ServerConfig, ServerConfigError};
pub use worker::{PROTOCOL_ERROR, WorkerContext, WorkerError, serve};
