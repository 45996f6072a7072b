use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

/// Top-level transaction manager configuration.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfigInner {
    pub server: ServerConfig,
    pub coordinator: CoordinatorConfig,
    pub registry: RegistryConfig,
    pub gc: GcConfig,
    pub log: LogConfig,
}

/// Thin Arc-wrapped config for inexpensive cloning into subsystems.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    #[serde(flatten, default)]
    inner: Arc<ManagerConfigInner>,
}

impl Deref for ManagerConfig {
    type Target = ManagerConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ManagerConfig {
    fn deref_mut(&mut self) -> &mut ManagerConfigInner {
        Arc::make_mut(&mut self.inner)
    }
}

impl ManagerConfig {
    /// The domain stamped into enlisted items: explicit `coordinator.domain`, else `address:port`.
    #[must_use]
    pub fn coordinator_domain(&self) -> String {
        self.coordinator
            .domain
            .clone()
            .filter(|domain| !domain.trim().is_empty())
            .unwrap_or_else(|| format!("{}:{}", self.server.address, self.server.port))
    }
}

/// RPC listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    /// Upper bound for one inbound frame; larger frames close the connection.
    pub max_frame_bytes: usize,
}

#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub domain: Option<String>,
}

/// Liveness registry sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registrations without a heartbeat for this long are evicted.
    pub channel_expired_secs: u64,
    pub scan_interval_secs: u64,
}

/// Resolved-group garbage collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Directive string such as `gts_coordinator=debug`.
    pub filter: Option<String>,
    /// Directory for rolling log files; console only when absent.
    pub path: Option<PathBuf>,
    pub json: bool,
}

// --- Default ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9876,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { channel_expired_secs: 120, scan_interval_secs: 10 }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: 60 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), filter: None, path: None, json: false }
    }
}
