//! Per-connection worker.
//!
//! Each accepted socket gets a reader (this module's [`serve`]) and a writer
//! task. The reader decodes requests and dispatches them to the lobby or the
//! peer's match; everything addressed to the peer, including direct replies,
//! goes through its outbound channel so the writer is the only task touching
//! the write half.

use std::sync::Arc;
use std::time::Duration;

use morris_engine::Position;
use morris_net::messages::{AuthResponse, Pong};
use morris_net::{
    FrameConfig, FrameError, Message, MessageTag, Payload, SERVER_REFERENCE, User,
    deserialize_message, read_frame, serialize_message, write_frame,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot, watch};

use crate::accounts::AccountStore;
use crate::game_match::{GameAction, MatchError};
use crate::lobby::{Lobby, LobbyError};
use crate::peer::{Outbox, PeerHandle, PeerId};

pub const PROTOCOL_ERROR: &str =
    "Your client sent a message this server does not understand. Please update your programme!";
const NO_MATCH: &str =
    "The game has not started yet or there is no match linked to this connection.";
const SERVER_ONLY: &str = "This message may only be sent by the server.";
const NOT_LOGGED_IN: &str = "You are not logged in.";

/// Shared services every worker needs.
pub struct WorkerContext {
    pub lobby: Arc<Lobby>,
    pub accounts: Arc<dyn AccountStore>,
    pub frame: FrameConfig,
    /// Drop the connection after this long without a frame. `None` waits
    /// forever.
    pub idle_timeout: Option<Duration>,
}

/// Why a connection ended.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("no frame for {0:?}")]
    IdleTimeout(Duration),

    #[error("invariant violated: {0}")]
    Invariant(#[from] MatchError),

    #[error("writer task ended")]
    WriterGone,

    #[error("server shutting down")]
    Shutdown,
}

/// Run one connection to completion: read and dispatch until the peer goes
/// away, then unwind its lobby membership and any running match.
pub async fn serve(
    id: PeerId,
    stream: TcpStream,
    ctx: Arc<WorkerContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = oneshot::channel();
    let (dead_tx, mut dead_rx) = oneshot::channel::<()>();

    let writer_task = tokio::spawn(write_loop(
        id,
        writer,
        rx,
        ctx.frame.clone(),
        close_rx,
        dead_tx,
    ));

    let mut worker = Worker::new(PeerHandle::new(id, tx), ctx);
    let reason = worker
        .read_loop(&mut reader, &mut dead_rx, &mut shutdown)
        .await;
    match &reason {
        WorkerError::Invariant(e) => tracing::error!(?id, "closing connection: {e}"),
        WorkerError::Frame(FrameError::ConnectionClosed) | WorkerError::Shutdown => {
            tracing::debug!(?id, "connection ended: {reason}")
        }
        _ => tracing::info!(?id, "connection dropped: {reason}"),
    }

    worker.ctx.lobby.leave(id).await.deliver();
    let _ = close_tx.send(());
    drop(worker);
    if let Err(e) = writer_task.await {
        tracing::warn!(?id, "writer task failed: {e}");
    }
}

/// Drain the peer's outbound queue onto the socket. Exits on a write error,
/// or once `close_rx` fires and whatever was already queued is flushed.
/// Dropping `_dead` tells the reader the writer is gone.
async fn write_loop(
    id: PeerId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Message>,
    frame: FrameConfig,
    mut close_rx: oneshot::Receiver<()>,
    _dead: oneshot::Sender<()>,
) {
    'outer: loop {
        let msg = tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = &mut close_rx => {
                while let Ok(msg) = rx.try_recv() {
                    if write_message(&mut writer, &msg, &frame).await.is_err() {
                        break;
                    }
                }
                break 'outer;
            }
        };
        if let Err(e) = write_message(&mut writer, &msg, &frame).await {
            tracing::debug!(?id, "write failed: {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_message(
    writer: &mut OwnedWriteHalf,
    msg: &Message,
    frame: &FrameConfig,
) -> Result<(), FrameError> {
    let bytes = serialize_message(msg).map_err(|e| {
        FrameError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    tracing::trace!(tag = ?msg.tag(), reference = msg.reference, "send");
    write_frame(writer, &bytes, frame).await
}

fn field(x: i32, y: i32) -> Result<Position, String> {
    Position::from_wire(x, y).ok_or_else(|| format!("The field ({x}, {y}) is not on the board."))
}

fn auth_failure(method: MessageTag, message: impl Into<String>) -> Payload {
    Payload::AuthResponse(AuthResponse {
        method,
        success: false,
        message: message.into(),
        user: None,
    })
}

struct Worker {
    id: PeerId,
    handle: PeerHandle,
    ctx: Arc<WorkerContext>,
    user: Option<User>,
}

impl Worker {
    fn new(handle: PeerHandle, ctx: Arc<WorkerContext>) -> Self {
        Self {
            id: handle.id(),
            handle,
            ctx,
            user: None,
        }
    }

    async fn read_loop(
        &mut self,
        reader: &mut OwnedReadHalf,
        dead_rx: &mut oneshot::Receiver<()>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> WorkerError {
        loop {
            let bytes = tokio::select! {
                result = self.next_frame(reader) => match result {
                    Ok(bytes) => bytes,
                    Err(e) => return e,
                },
                _ = &mut *dead_rx => return WorkerError::WriterGone,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return WorkerError::Shutdown;
                    }
                    continue;
                }
            };

            match deserialize_message(&bytes) {
                Ok(msg) => {
                    tracing::trace!(id = ?self.id, tag = ?msg.tag(), reference = msg.reference, "recv");
                    if let Err(e) = self.dispatch(msg).await {
                        return e;
                    }
                }
                Err(e) => {
                    tracing::debug!(id = ?self.id, "undecodable message: {e}");
                    self.reply(Message::illegal(SERVER_REFERENCE, PROTOCOL_ERROR));
                }
            }
        }
    }

    async fn next_frame(&self, reader: &mut OwnedReadHalf) -> Result<Vec<u8>, WorkerError> {
        let read = read_frame(reader, &self.ctx.frame);
        match self.ctx.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| WorkerError::IdleTimeout(limit))?
                .map_err(WorkerError::from),
            None => Ok(read.await?),
        }
    }

    fn reply(&self, msg: Message) {
        // A closed channel means the writer is gone; the read loop notices.
        let _ = self.handle.send(msg);
    }

    fn lobby_result(&self, reference: i32, result: Result<Outbox, LobbyError>) {
        match result {
            Ok(outbox) => outbox.deliver(),
            Err(e) => self.reply(Message::illegal(reference, e.to_string())),
        }
    }

    async fn dispatch(&mut self, msg: Message) -> Result<(), WorkerError> {
        let reference = msg.reference;
        let lobby = Arc::clone(&self.ctx.lobby);
        match msg.payload {
            Payload::Ping(ping) => self.reply(Message::new(
                reference,
                Payload::Pong(Pong {
                    sequence: ping.sequence,
                }),
            )),
            Payload::Pong(_) => {}

            Payload::Login(creds) => self.login(reference, &creds.username, &creds.password).await,
            Payload::Register(creds) => {
                let response = self.ctx.accounts.register(&creds.username, &creds.password);
                self.reply(Message::new(reference, Payload::AuthResponse(response)));
            }
            Payload::Logout => self.logout(reference).await,

            Payload::EnterQuickMatchQueue => {
                let result = lobby.enter_queue(self.id).await;
                self.lobby_result(reference, result);
            }
            Payload::LeaveQuickMatchQueue => {
                let result = lobby.leave_queue(self.id).await;
                self.lobby_result(reference, result);
            }
            Payload::MatchRequest(request) => {
                let result = lobby.request_match(self.id, &request.username).await;
                self.lobby_result(reference, result);
            }
            Payload::MatchRequestResponse(response) => {
                let result = lobby
                    .respond_match(self.id, &response.username, response.accepted)
                    .await;
                self.lobby_result(reference, result);
            }

            Payload::PlaceStone(place) => match field(place.x, place.y) {
                Ok(at) => {
                    let action = GameAction::Place {
                        at,
                        colour: place.colour,
                    };
                    self.game_action(action, reference).await?;
                }
                Err(reason) => self.reply(Message::illegal(reference, reason)),
            },
            Payload::MoveStone(mv) => {
                match (field(mv.from_x, mv.from_y), field(mv.to_x, mv.to_y)) {
                    (Ok(from), Ok(to)) => {
                        self.game_action(GameAction::Move { from, to }, reference)
                            .await?;
                    }
                    (Err(reason), _) | (_, Err(reason)) => {
                        self.reply(Message::illegal(reference, reason));
                    }
                }
            }
            Payload::RemoveStone(remove) => match field(remove.x, remove.y) {
                Ok(at) => self.game_action(GameAction::Remove { at }, reference).await?,
                Err(reason) => self.reply(Message::illegal(SERVER_REFERENCE, reason)),
            },

            Payload::AuthResponse(_)
            | Payload::BroadcastPlayerPool(_)
            | Payload::GameStart(_)
            | Payload::GameAborted(_)
            | Payload::GameOver(_)
            | Payload::IllegalMove(_) => self.reply(Message::illegal(reference, SERVER_ONLY)),
        }
        Ok(())
    }

    async fn login(&mut self, reference: i32, username: &str, password: &str) {
        if self.user.is_some() {
            let payload = auth_failure(MessageTag::Login, LobbyError::AlreadyLoggedIn.to_string());
            self.reply(Message::new(reference, payload));
            return;
        }

        let mut response = self.ctx.accounts.login(username, password);
        let mut joined = None;
        if response.success
            && let Some(user) = response.user.clone()
        {
            match self.ctx.lobby.join(self.handle.clone(), user.clone()).await {
                Ok(outbox) => {
                    tracing::info!(id = ?self.id, username = %user.username, "logged in");
                    self.user = Some(user);
                    joined = Some(outbox);
                }
                Err(e) => {
                    response.success = false;
                    response.message = e.to_string();
                    response.user = None;
                }
            }
        }

        self.reply(Message::new(reference, Payload::AuthResponse(response)));
        if let Some(outbox) = joined {
            outbox.deliver();
        }
    }

    async fn logout(&mut self, reference: i32) {
        let Some(user) = self.user.take() else {
            self.reply(Message::new(
                reference,
                auth_failure(MessageTag::Logout, NOT_LOGGED_IN),
            ));
            return;
        };

        self.ctx.lobby.leave(self.id).await.deliver();
        tracing::info!(id = ?self.id, username = %user.username, "logged out");
        self.reply(Message::new(
            reference,
            Payload::AuthResponse(AuthResponse {
                method: MessageTag::Logout,
                success: true,
                message: "Logged out.".to_string(),
                user: Some(user),
            }),
        ));
    }

    /// Forward `action` to the peer's match. A finished match hands both
    /// players back to the lobby.
    async fn game_action(&self, action: GameAction, reference: i32) -> Result<(), MatchError> {
        let Some(game) = self.ctx.lobby.match_for(self.id).await else {
            let reference = match action {
                GameAction::Remove { .. } => SERVER_REFERENCE,
                _ => reference,
            };
            self.reply(Message::illegal(reference, NO_MATCH));
            return Ok(());
        };

        let report = game.apply(self.id, action, reference).await?;
        if report.finished {
            self.ctx.lobby.finish_match(&game).await.deliver();
        }
        Ok(())
    }
}
