#![allow(dead_code)]

use gts_cache::MemoryCache;
use gts_coordinator::{
    BroadcastError, BroadcastExecutor, ConnectionId, Coordinator, Phase, ProducerRegistry,
    ProtocolError, RemotingCommand, ReplySink, RequestContext,
};
use gts_store::TxGroupStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const REMOTE: &str = "/10.0.0.7:51234";
pub const DOMAIN: &str = "tm-a:9876";

/// Collects every response written by a handler.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub sent: Arc<Mutex<Vec<RemotingCommand>>>,
    pub broken: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<RemotingCommand> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl ReplySink for RecordingSink {
    async fn send(&self, response: RemotingCommand) -> Result<(), ProtocolError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone").into());
        }
        self.sent.lock().push(response);
        Ok(())
    }
}

/// Records phase notifications; optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    pub calls: Mutex<Vec<(String, Phase)>>,
    pub failing: AtomicBool,
}

impl RecordingBroadcaster {
    fn record(&self, group_id: &str, phase: Phase) -> Result<(), BroadcastError> {
        self.calls.lock().push((group_id.to_owned(), phase));
        if self.failing.load(Ordering::SeqCst) {
            return Err(BroadcastError::Delivery { message: "no route".into(), context: None });
        }
        Ok(())
    }
}

impl BroadcastExecutor for RecordingBroadcaster {
    async fn notify_pre_commit(&self, group_id: &str) -> Result<(), BroadcastError> {
        self.record(group_id, Phase::PreCommit)
    }

    async fn notify_rollback(&self, group_id: &str) -> Result<(), BroadcastError> {
        self.record(group_id, Phase::Rollback)
    }
}

pub struct Harness {
    pub coordinator: Coordinator<MemoryCache, Arc<RecordingBroadcaster>>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub sink: RecordingSink,
    pub ctx: RequestContext<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let coordinator = Coordinator::new(
            TxGroupStore::new(MemoryCache::new()),
            ProducerRegistry::new(),
            Arc::clone(&broadcaster),
            DOMAIN,
        );
        let sink = RecordingSink::default();
        let ctx = RequestContext::new(REMOTE, ConnectionId::next(), sink.clone());
        Self { coordinator, broadcaster, sink, ctx }
    }
}
