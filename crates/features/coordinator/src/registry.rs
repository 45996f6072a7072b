//! Which clients are connected, keyed by the address the coordinator sees them on.

use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// One client behind one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientChannelInfo {
    pub connection: ConnectionId,
    pub client_id: String,
    /// Time of the last heartbeat.
    pub last_update: Instant,
}

impl ClientChannelInfo {
    pub fn new(connection: ConnectionId, client_id: impl Into<String>) -> Self {
        Self { connection, client_id: client_id.into(), last_update: Instant::now() }
    }
}

type Channels = FxHashMap<String, ClientChannelInfo>;

#[derive(Debug, Default)]
pub struct ProducerRegistryInner {
    /// address -> client id -> registration
    producers: RwLock<FxHashMap<String, Channels>>,
}

/// The client liveness registry.
///
/// Every mutation takes the write lock once, so concurrent heartbeats for the same
/// `(address, client id)` collapse into one registration with the latest timestamp.
#[derive(Debug, Clone, Default)]
pub struct ProducerRegistry {
    inner: Arc<ProducerRegistryInner>,
}

impl Deref for ProducerRegistry {
    type Target = ProducerRegistryInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl ProducerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes the registration of `info.client_id` at `address`.
    pub fn register_producer(&self, address: &str, info: ClientChannelInfo) {
        let mut producers = self.producers.write();
        let channels = producers.entry(address.to_owned()).or_default();
        let refreshed = channels.insert(info.client_id.clone(), info.clone()).is_some();
        drop(producers);

        if refreshed {
            debug!(remote = address, client_id = %info.client_id, "Producer heartbeat refreshed");
        } else {
            info!(
                remote = address,
                client_id = %info.client_id,
                connection = info.connection.as_u64(),
                "Producer registered"
            );
        }
    }

    /// Removes the registration of `client_id` at `address`. Returns whether one existed.
    pub fn unregister_producer(&self, address: &str, client_id: &str) -> bool {
        let mut producers = self.producers.write();
        let Some(channels) = producers.get_mut(address) else {
            return false;
        };
        let removed = channels.remove(client_id).is_some();
        if channels.is_empty() {
            producers.remove(address);
        }
        drop(producers);

        if removed {
            info!(remote = address, client_id, "Producer unregistered");
        }
        removed
    }

    /// Removes every registration bound to a closed connection and returns them.
    pub fn unregister_connection(&self, connection: ConnectionId) -> Vec<(String, ClientChannelInfo)> {
        let removed = self.remove_where(|info| info.connection == connection);
        if !removed.is_empty() {
            info!(
                connection = connection.as_u64(),
                count = removed.len(),
                "Producers of closed connection unregistered"
            );
        }
        removed
    }

    /// Evicts registrations without a heartbeat for longer than `max_idle`.
    pub fn scan_inactive(&self, max_idle: Duration) -> Vec<(String, ClientChannelInfo)> {
        self.scan_inactive_at(Instant::now(), max_idle)
    }

    /// [`Self::scan_inactive`] against an explicit clock reading.
    pub fn scan_inactive_at(
        &self,
        now: Instant,
        max_idle: Duration,
    ) -> Vec<(String, ClientChannelInfo)> {
        let expired = self.remove_where(|info| now.saturating_duration_since(info.last_update) > max_idle);
        for (address, info) in &expired {
            info!(
                remote = %address,
                client_id = %info.client_id,
                idle_ms = now.saturating_duration_since(info.last_update).as_millis(),
                "Producer expired"
            );
        }
        expired
    }

    /// Registrations at `address`, in unspecified order.
    #[must_use]
    pub fn producers(&self, address: &str) -> Vec<ClientChannelInfo> {
        self.producers
            .read()
            .get(address)
            .map(|channels| channels.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, address: &str, client_id: &str) -> bool {
        self.producers.read().get(address).is_some_and(|channels| channels.contains_key(client_id))
    }

    /// Total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.producers.read().values().map(FxHashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.producers.read().is_empty()
    }

    fn remove_where(
        &self,
        mut predicate: impl FnMut(&ClientChannelInfo) -> bool,
    ) -> Vec<(String, ClientChannelInfo)> {
        let mut removed = Vec::new();
        let mut producers = self.producers.write();
        producers.retain(|address, channels| {
            channels.retain(|_, info| {
                if predicate(info) {
                    removed.push((address.clone(), info.clone()));
                    false
                } else {
                    true
                }
            });
            !channels.is_empty()
        });
        removed
    }
}
