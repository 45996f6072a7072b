//! # Transaction Manager
//!
//! The TCP front of the group coordinator: frames requests off client connections, hands them to
//! the [`Coordinator`] and runs the background sweepers.
//!
//! ## Example
//! ```no_run
//! use gts_manager::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Server::builder()
//!         .port(9876)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

pub mod maintenance;
pub mod transport;

use anyhow::{Context, Result};
use gts_cache::MemoryCache;
use gts_coordinator::{ChannelBroadcaster, Coordinator, GroupNotification, ProducerRegistry};
use gts_kernel::domain::config::ManagerConfig;
use gts_store::{GarbageCollector, TxGroupStore};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// The coordinator as wired by [`Server`].
pub type ManagerCoordinator = Coordinator<MemoryCache, ChannelBroadcaster>;

/// A fluent builder for configuring and initializing the [`Server`].
#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    cfg: ManagerConfig,
}

impl ServerBuilder {
    /// Set up the server's configuration.
    pub fn config(mut self, cfg: ManagerConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.cfg.server.port = port;
        self
    }

    /// Consumes the builder and wires store, registry and broadcaster together.
    ///
    /// # Errors
    /// Returns an error if the frame limit is zero.
    pub fn build(self) -> Result<Server> {
        anyhow::ensure!(self.cfg.server.max_frame_bytes > 0, "server.max_frame_bytes must be positive");

        let domain = self.cfg.coordinator_domain();
        info!(domain = %domain, gc = self.cfg.gc.enabled, "Initializing transaction manager");

        let broadcaster = ChannelBroadcaster::new();
        let coordinator = Coordinator::new(
            TxGroupStore::new(MemoryCache::new()),
            ProducerRegistry::new(),
            broadcaster.clone(),
            domain,
        );

        Ok(Server { cfg: self.cfg, coordinator, broadcaster })
    }
}

/// A fully initialized manager ready to accept connections.
#[must_use = "call .run().await to start the server"]
#[derive(Debug)]
pub struct Server {
    cfg: ManagerConfig,
    coordinator: ManagerCoordinator,
    broadcaster: ChannelBroadcaster,
}

impl Server {
    /// Returns a new [`ServerBuilder`] to configure the server.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    #[must_use]
    pub const fn coordinator(&self) -> &ManagerCoordinator {
        &self.coordinator
    }

    /// Phase decisions for the participant fan-out.
    #[must_use]
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Arc<GroupNotification>> {
        self.broadcaster.subscribe()
    }

    /// Binds the configured address and serves until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound or the signal handlers fail to install.
    pub async fn run(self) -> Result<()> {
        let address = SocketAddr::new(self.cfg.server.address, self.cfg.server.port);
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;

        self.serve(listener, async {
            if let Err(e) = shutdown_signal().await {
                error!("Error while waiting for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accepts connections on `listener` until `shutdown` resolves, then drains every connection
    /// and background task.
    ///
    /// # Errors
    /// Returns an error if the listener's local address is unavailable.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let local = listener.local_addr().context("Listener has no local address")?;
        info!(address = %local, "Starting transaction manager");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut background = vec![maintenance::spawn_registry_sweeper(
            self.coordinator.registry().clone(),
            Duration::from_secs(self.cfg.registry.scan_interval_secs),
            Duration::from_secs(self.cfg.registry.channel_expired_secs),
            stop_rx.clone(),
        )];
        if self.cfg.gc.enabled {
            background.push(maintenance::spawn_garbage_collector(
                GarbageCollector::new(self.coordinator.store().clone()),
                Duration::from_secs(self.cfg.gc.interval_secs),
                stop_rx.clone(),
            ));
        }

        let max_frame_bytes = self.cfg.server.max_frame_bytes;
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(remote = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        connections.spawn(transport::serve_connection(
                            self.coordinator.clone(),
                            stream,
                            peer,
                            max_frame_bytes,
                            stop_rx.clone(),
                        ));
                    },
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task panicked");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        info!(connections = connections.len(), "Shutdown signal received, draining connections");
        drop(listener);
        stop_tx.send_replace(true);

        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Connection task panicked");
            }
        }
        for task in background {
            if let Err(e) = task.await {
                error!(error = %e, "Background task failed");
            }
        }

        info!("Transaction manager shutdown complete");
        Ok(())
    }
}

/// Listens for shutdown signals (Ctrl+C, SIGTERM).
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => {
            res.context("Ctrl+C signal received")?;
        },
        res = terminate => {
            res.context("SIGTERM signal received")?;
        },
    }

    Ok(())
}
