//! The accept loop: adopts connections, seats initialized players, and
//! guards shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hexmatch_game::{MatchConfig, Matchmaker, Metrics};
use hexmatch_session::{Player, PlayerEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::ServerError;

/// The port clients connect to unless told otherwise.
pub const DEFAULT_PORT: u16 = 65530;

/// How soon a second interrupt must follow the first to stop the server
/// while players are still connected.
const INTERRUPT_CONFIRM_WINDOW: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for the listen socket.
    pub bind_addr: String,
    /// Match settings handed to every game session.
    pub match_config: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            match_config: MatchConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A running Hexmatch relay server.
///
/// [`bind`](Self::bind) it, then [`run`](Self::run) it. `run` returns when
/// an interrupt is confirmed (see the shutdown guard there).
pub struct Server {
    listener: TcpListener,
    matchmaker: Arc<Matchmaker>,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Binds the listen socket and sets up the matchmaker.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if the address can't be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener =
            TcpListener::bind(&config.bind_addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: config.bind_addr.clone(),
                    source,
                })?;
        let metrics = Arc::new(Metrics::new());
        let matchmaker = Matchmaker::new(config.match_config, Arc::clone(&metrics));

        tracing::info!(addr = %listener.local_addr()?, "listening");

        Ok(Self {
            listener,
            matchmaker,
            metrics,
        })
    }

    /// The address the listen socket actually bound (useful with port 0).
    ///
    /// # Errors
    /// Propagates the socket's `local_addr` error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The process-wide status counters.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs the accept loop until shutdown is confirmed.
    ///
    /// Each accepted connection becomes a [`Player`] whose receive loop
    /// starts immediately; the player is handed to the matchmaker only
    /// once it initializes (first Ping or init timeout).
    ///
    /// Shutdown guard: a single CTRL-C with players connected only warns;
    /// a second one within five seconds — or any CTRL-C with nobody
    /// connected — stops the loop.
    ///
    /// # Errors
    /// Currently infallible at runtime; the `Result` reserves room for
    /// fatal listener errors.
    pub async fn run(self) -> Result<(), ServerError> {
        // Initialized players flow from listener callbacks (synchronous)
        // to the matchmaker (async) through this channel.
        let (seat_tx, mut seat_rx) = mpsc::unbounded_channel::<Player>();
        let mut last_interrupt: Option<Instant> = None;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::info!(%addr, "new connection");
                        self.adopt(stream, &seat_tx);
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "accept failed");
                    }
                },

                Some(player) = seat_rx.recv() => {
                    self.matchmaker.place_player(player).await;
                },

                _ = tokio::signal::ctrl_c() => {
                    let connected = self.metrics.connected_players();
                    let confirmed = last_interrupt
                        .is_some_and(|at| at.elapsed() < INTERRUPT_CONFIRM_WINDOW);
                    if connected > 0 && !confirmed {
                        tracing::warn!(
                            connected,
                            "players still connected; interrupt again within 5s to stop"
                        );
                        last_interrupt = Some(Instant::now());
                    } else {
                        tracing::info!(connected, "shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Wraps an accepted stream in a `Player`, wires up counting and
    /// seating, and starts its receive loop.
    fn adopt(&self, stream: TcpStream, seat_tx: &mpsc::UnboundedSender<Player>) {
        let player = Player::new(stream);

        let metrics = Arc::clone(&self.metrics);
        let seat_tx = seat_tx.clone();
        player.add_listener(move |p, event| match event {
            PlayerEvent::Initialized => {
                let connected = metrics.player_connected();
                tracing::info!(player = %p, connected, "player initialized");
                let _ = seat_tx.send(p.clone());
            }
            PlayerEvent::Disconnected => {
                // Only initialized players were counted in.
                if p.is_initialized() {
                    let connected = metrics.player_disconnected();
                    tracing::info!(player = %p, connected, "player disconnected");
                }
            }
            PlayerEvent::Message(_) => {}
        });

        // Listeners are registered; safe to start reading.
        player.listen();
    }
}
