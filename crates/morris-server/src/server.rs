//! TCP accept loop and connection lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use morris_net::FrameConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::accounts::{AccountStore, MemoryAccountStore};
use crate::lobby::Lobby;
use crate::peer::{ConnectionMap, IdGenerator};
use crate::worker::{WorkerContext, serve};

#[derive(Debug, thiserror::Error)]
pub enum ServerConfigError {
    #[error("invalid listen address {addr:?}: {source}")]
    BadAddress {
        addr: String,
        source: std::net::AddrParseError,
    },
}

/// Runtime settings for [`GameServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Default: `0.0.0.0:7777`.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections. Default: 256.
    pub max_connections: usize,
    /// Silence after which a connection is dropped. `None` disables it.
    pub idle_timeout: Option<Duration>,
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            max_connections: 256,
            idle_timeout: Some(Duration::from_secs(60)),
            frame: FrameConfig::default(),
        }
    }
}

impl TryFrom<&morris_config::Config> for ServerConfig {
    type Error = ServerConfigError;

    fn try_from(config: &morris_config::Config) -> Result<Self, Self::Error> {
        let addr = config.server.listen_addr();
        let bind_addr = addr
            .parse()
            .map_err(|source| ServerConfigError::BadAddress { addr, source })?;
        let idle = config.server.idle_timeout_seconds;
        Ok(Self {
            bind_addr,
            max_connections: config.server.max_connections,
            idle_timeout: (idle > 0).then(|| Duration::from_secs(idle)),
            frame: FrameConfig {
                max_payload_size: config.server.max_frame_bytes,
            },
        })
    }
}

/// Game server: accepts connections and runs one worker per peer.
pub struct GameServer {
    config: ServerConfig,
    /// Active connection map (public for test inspection).
    pub connections: Arc<ConnectionMap>,
    lobby: Arc<Lobby>,
    accounts: Arc<dyn AccountStore>,
    id_gen: Arc<IdGenerator>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GameServer {
    /// Create a server backed by an in-memory account store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_accounts(config, Arc::new(MemoryAccountStore::new()))
    }

    pub fn with_accounts(config: ServerConfig, accounts: Arc<dyn AccountStore>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            connections: Arc::new(ConnectionMap::new(config.max_connections)),
            lobby: Arc::new(Lobby::new()),
            accounts,
            id_gen: Arc::new(IdGenerator::new()),
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn lobby(&self) -> &Arc<Lobby> {
        &self.lobby
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let ctx = Arc::new(WorkerContext {
            lobby: Arc::clone(&self.lobby),
            accounts: Arc::clone(&self.accounts),
            frame: self.config.frame.clone(),
            idle_timeout: self.config.idle_timeout,
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("set_nodelay failed for {peer_addr}: {e}");
                    }

                    let id = self.id_gen.next_peer();
                    if let Err(e) = self.connections.insert(id, peer_addr).await {
                        tracing::warn!("{e}, rejecting {peer_addr}");
                        continue;
                    }

                    tracing::info!("Accepted connection {id:?} from {peer_addr}");

                    let connections = Arc::clone(&self.connections);
                    let ctx = Arc::clone(&ctx);
                    let task_shutdown = self.shutdown_rx.clone();

                    tokio::spawn(async move {
                        serve(id, stream, ctx, task_shutdown).await;
                        connections.remove(&id).await;
                        tracing::info!("Connection {id:?} closed");
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the server and every connection to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
