//! TCP client for a Morris server.
//!
//! Decodes inbound frames on a background task and hands complete messages
//! to the caller through [`GameClient::recv`]. An optional heartbeat sends
//! [`Payload::Ping`] on an interval and marks the connection dead when the
//! server stays silent for too long. State changes are broadcast via a
//! [`watch`] channel so any number of consumers can react without polling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;

use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::messages::{Message, Payload, Ping, deserialize_message, serialize_message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub frame: FrameConfig,
    /// Ping interval. `None` disables the heartbeat.
    pub heartbeat_interval: Option<Duration>,
    /// Silence after which the connection is declared dead.
    pub heartbeat_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            heartbeat_interval: Some(Duration::from_secs(5)),
            heartbeat_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("encode failed: {0}")]
    Encode(#[from] postcard::Error),

    #[error("timed out waiting for a message")]
    Timeout,

    #[error("connection closed")]
    Closed,
}

/// Handle to a connected server session.
pub struct GameClient {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    inbox: mpsc::UnboundedReceiver<Message>,
    state: Arc<ConnectionStateWatch>,
    frame: FrameConfig,
    /// Sending `true` causes reader and heartbeat tasks to exit.
    shutdown_tx: watch::Sender<bool>,
}

impl GameClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::connect_with(addr, ClientConfig::default()).await
    }

    /// Connect to `addr`, set `TCP_NODELAY`, and spawn the reader (and, if
    /// configured, heartbeat) tasks.
    pub async fn connect_with(addr: SocketAddr, config: ClientConfig) -> Result<Self, ClientError> {
        let state = Arc::new(ConnectionStateWatch::new());
        state.set(ConnectionState::Connecting);

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        stream.set_nodelay(true)?;
        state.set(ConnectionState::Connected);

        let (reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let last_heard = Arc::new(Mutex::new(Instant::now()));

        let reader_state = Arc::clone(&state);
        let reader_heard = Arc::clone(&last_heard);
        let reader_frame = config.frame.clone();
        let mut reader_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            Self::read_loop(
                reader,
                &reader_frame,
                inbox_tx,
                &reader_heard,
                &reader_state,
                &mut reader_shutdown,
            )
            .await;
        });

        if let Some(interval) = config.heartbeat_interval {
            let hb_writer = Arc::clone(&writer);
            let hb_state = Arc::clone(&state);
            let hb_frame = config.frame.clone();
            let timeout = config.heartbeat_timeout;
            let mut hb_shutdown = shutdown_rx;
            tokio::spawn(async move {
                Self::heartbeat_loop(
                    &hb_writer,
                    &hb_frame,
                    interval,
                    timeout,
                    &last_heard,
                    &hb_state,
                    &mut hb_shutdown,
                )
                .await;
            });
        }

        Ok(Self {
            writer,
            inbox,
            state,
            frame: config.frame,
            shutdown_tx,
        })
    }

    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    pub async fn send(&self, msg: &Message) -> Result<(), ClientError> {
        let bytes = serialize_message(msg)?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &bytes, &self.frame).await?;
        Ok(())
    }

    /// Send `payload` tagged with `reference`.
    pub async fn request(&self, reference: i32, payload: Payload) -> Result<(), ClientError> {
        self.send(&Message::new(reference, payload)).await
    }

    /// Write raw bytes as one frame, bypassing the message encoding.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, bytes, &self.frame).await?;
        Ok(())
    }

    /// Next decoded message. `None` once the connection is gone and the
    /// backlog is drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    pub async fn recv_timeout(&mut self, wait: Duration) -> Result<Message, ClientError> {
        match tokio::time::timeout(wait, self.inbox.recv()).await {
            Ok(Some(msg)) => Ok(msg),
            Ok(None) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Signal background tasks to exit, shut the write half, and mark the
    /// connection disconnected.
    pub async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut writer = self.writer.lock().await;
        let _ = tokio::io::AsyncWriteExt::shutdown(&mut *writer).await;
        self.state.set(ConnectionState::Disconnected);
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        frame: &FrameConfig,
        inbox: mpsc::UnboundedSender<Message>,
        last_heard: &Mutex<Instant>,
        state: &ConnectionStateWatch,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                result = read_frame(&mut reader, frame) => {
                    let bytes = match result {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::debug!("client read loop ended: {e}");
                            state.set(ConnectionState::Disconnected);
                            break;
                        }
                    };
                    *last_heard.lock().await = Instant::now();
                    match deserialize_message(&bytes) {
                        Ok(msg) => {
                            if inbox.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("dropping undecodable server message: {e}"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn heartbeat_loop(
        writer: &Mutex<OwnedWriteHalf>,
        frame: &FrameConfig,
        ping_interval: Duration,
        timeout: Duration,
        last_heard: &Mutex<Instant>,
        state: &ConnectionStateWatch,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let sequence = AtomicU32::new(0);
        let mut interval = tokio::time::interval(ping_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if state.current() != ConnectionState::Connected {
                        break;
                    }
                    if last_heard.lock().await.elapsed() > timeout {
                        tracing::warn!("heartbeat timeout, no traffic in {timeout:?}");
                        state.set(ConnectionState::Disconnected);
                        break;
                    }

                    let ping = Message::new(
                        0,
                        Payload::Ping(Ping {
                            sequence: sequence.fetch_add(1, Ordering::Relaxed),
                        }),
                    );
                    let Ok(bytes) = serialize_message(&ping) else {
                        break;
                    };
                    let mut w = writer.lock().await;
                    if write_frame(&mut *w, &bytes, frame).await.is_err() {
                        state.set(ConnectionState::Disconnected);
                        break;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Pong;
    use tokio::net::TcpListener;

    fn quiet() -> ClientConfig {
        ClientConfig {
            heartbeat_interval: None,
            ..ClientConfig::default()
        }
    }

    /// Accepts one connection and answers every Ping with a Pong.
    async fn pong_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let config = FrameConfig::default();
            while let Ok(bytes) = read_frame(&mut stream, &config).await {
                let Ok(msg) = deserialize_message(&bytes) else {
                    continue;
                };
                if let Payload::Ping(ping) = msg.payload {
                    let pong = Message::new(
                        msg.reference,
                        Payload::Pong(Pong {
                            sequence: ping.sequence,
                        }),
                    );
                    let out = serialize_message(&pong).unwrap();
                    if write_frame(&mut stream, &out, &config).await.is_err() {
                        break;
                    }
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_request_and_reply() {
        let addr = pong_server().await;
        let mut client = GameClient::connect_with(addr, quiet()).await.unwrap();
        assert_eq!(client.state().current(), ConnectionState::Connected);

        client
            .request(42, Payload::Ping(Ping { sequence: 7 }))
            .await
            .unwrap();
        let reply = client.recv_timeout(Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply.reference, 42);
        assert_eq!(reply.payload, Payload::Pong(Pong { sequence: 7 }));
    }

    #[tokio::test]
    async fn test_recv_timeout_when_silent() {
        let addr = pong_server().await;
        let mut client = GameClient::connect_with(addr, quiet()).await.unwrap();
        let result = client.recv_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_connection_alive() {
        let addr = pong_server().await;
        let config = ClientConfig {
            heartbeat_interval: Some(Duration::from_millis(50)),
            heartbeat_timeout: Duration::from_millis(400),
            ..ClientConfig::default()
        };
        let mut client = GameClient::connect_with(addr, config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(client.state().current(), ConnectionState::Connected);
        assert!(matches!(
            client.recv_timeout(Duration::from_secs(1)).await.unwrap().payload,
            Payload::Pong(_)
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let config = ClientConfig {
            heartbeat_interval: Some(Duration::from_millis(50)),
            heartbeat_timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        };
        let client = GameClient::connect_with(addr, config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_server_close_ends_inbox() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = GameClient::connect_with(addr, quiet()).await.unwrap();
        assert!(client.recv().await.is_none());
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_notifies_subscribers() {
        let addr = pong_server().await;
        let client = GameClient::connect_with(addr, quiet()).await.unwrap();
        let mut rx = client.state().subscribe();
        assert_eq!(*rx.borrow(), ConnectionState::Connected);

        client.disconnect().await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }
}
