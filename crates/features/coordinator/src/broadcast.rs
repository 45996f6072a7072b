//! Hand-off of pre-commit and rollback decisions to the participant fan-out.
//!
//! The coordinator does not contact participants itself. It tells a [`BroadcastExecutor`] that a
//! group reached a phase and moves on; retries and participant discovery live behind the trait.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

const DEFAULT_CAPACITY: usize = 1024;

/// Failures reported by a [`BroadcastExecutor`].
#[gts_derive::gts_error]
pub enum BroadcastError {
    /// The notification could not be handed to the fan-out side.
    #[error("Broadcast delivery failed{}: {message}", format_context(.context))]
    Delivery { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal broadcast error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreCommit,
    Rollback,
}

/// A phase decision for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNotification {
    pub group_id: String,
    pub phase: Phase,
}

/// Delivers phase decisions to every participant of a group.
pub trait BroadcastExecutor: Send + Sync + 'static {
    fn notify_pre_commit(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<(), BroadcastError>> + Send;

    fn notify_rollback(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<(), BroadcastError>> + Send;
}

impl<B: BroadcastExecutor> BroadcastExecutor for Arc<B> {
    fn notify_pre_commit(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<(), BroadcastError>> + Send {
        (**self).notify_pre_commit(group_id)
    }

    fn notify_rollback(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<(), BroadcastError>> + Send {
        (**self).notify_rollback(group_id)
    }
}

/// Publishes [`GroupNotification`]s on an in-process broadcast channel.
///
/// Subscribers are the fan-out workers. Publishing while nobody listens succeeds and drops the
/// notification.
///
/// ```rust
/// use gts_coordinator::{BroadcastExecutor, ChannelBroadcaster, NotificationReceiverExt, Phase};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), gts_coordinator::BroadcastError> {
/// let broadcaster = ChannelBroadcaster::new();
/// let mut rx = broadcaster.subscribe();
/// broadcaster.notify_rollback("G1").await?;
///
/// let notification = rx.next_notification().await.unwrap();
/// assert_eq!(notification.phase, Phase::Rollback);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<Arc<GroupNotification>>,
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ChannelBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GroupNotification>> {
        self.sender.subscribe()
    }

    /// Publishes and returns the number of subscribers reached.
    pub fn publish(&self, group_id: &str, phase: Phase) -> usize {
        let notification = Arc::new(GroupNotification { group_id: group_id.to_owned(), phase });
        self.sender.send(notification).map_or_else(
            |_| {
                trace!(group_id, ?phase, "Notification dropped: no active subscribers");
                0
            },
            |count| {
                trace!(group_id, ?phase, count, "Notification dispatched");
                count
            },
        )
    }
}

impl BroadcastExecutor for ChannelBroadcaster {
    async fn notify_pre_commit(&self, group_id: &str) -> Result<(), BroadcastError> {
        self.publish(group_id, Phase::PreCommit);
        Ok(())
    }

    async fn notify_rollback(&self, group_id: &str) -> Result<(), BroadcastError> {
        self.publish(group_id, Phase::Rollback);
        Ok(())
    }
}

/// Lag-tolerant receiving for fan-out workers.
pub trait NotificationReceiverExt {
    /// The next notification, skipping over any the receiver lagged behind on. `None` once every
    /// sender is gone.
    fn next_notification(&mut self) -> impl Future<Output = Option<Arc<GroupNotification>>> + Send;
}

impl NotificationReceiverExt for broadcast::Receiver<Arc<GroupNotification>> {
    async fn next_notification(&mut self) -> Option<Arc<GroupNotification>> {
        let mut skipped = 0u64;

        loop {
            match self.recv().await {
                Ok(notification) => {
                    if skipped > 0 {
                        warn!(skipped, "Notification receiver lagged; continuing from latest");
                    }
                    return Some(notification);
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    skipped = skipped.saturating_add(n);
                    debug!(skipped = n, total_skipped = skipped, "Notification receiver lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
