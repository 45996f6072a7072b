//! Request dispatch and the per-code lifecycle handlers.

use crate::broadcast::BroadcastExecutor;
use crate::error::ProtocolError;
use crate::protocol::{
    GroupStatusHeader, HeartbeatData, RemotingCommand, RequestCode, ResponseCode, TxGroupHeader,
    UnregisterClientHeader,
};
use crate::registry::{ClientChannelInfo, ConnectionId, ProducerRegistry};
use gts_cache::HashCache;
use gts_domain::model::{
    GroupEnlistment, Origin, ParticipantItem, TransactionGroup, TransactionItem,
};
use gts_store::TxGroupStore;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Writes responses back on the connection a request arrived on.
pub trait ReplySink: Send + Sync {
    fn send(&self, response: RemotingCommand) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}

/// Where a request came from.
#[derive(Debug)]
pub struct RequestContext<S> {
    /// Network identity of the peer, as observed by the transport.
    pub remote: String,
    pub connection: ConnectionId,
    pub sink: S,
}

impl<S: ReplySink> RequestContext<S> {
    pub fn new(remote: impl Into<String>, connection: ConnectionId, sink: S) -> Self {
        Self { remote: remote.into(), connection, sink }
    }
}

/// What the transport must do after a request was handled.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Dispatch {
    /// Send this response.
    Reply(RemotingCommand),
    /// The handler already wrote its response through the [`ReplySink`].
    AlreadySent,
    /// Nothing is sent; the client's own timeout applies.
    NoReply,
}

#[derive(Debug)]
pub struct CoordinatorInner<C, B> {
    store: TxGroupStore<C>,
    registry: ProducerRegistry,
    broadcaster: B,
    domain: String,
}

/// The coordinator protocol engine.
///
/// Owns no state of its own: groups live in the [`TxGroupStore`], connected clients in the
/// [`ProducerRegistry`], and phase decisions leave through the [`BroadcastExecutor`]. Handlers
/// run concurrently without any per-group serialization.
#[derive(Debug)]
pub struct Coordinator<C, B> {
    inner: Arc<CoordinatorInner<C, B>>,
}

impl<C, B> Clone for Coordinator<C, B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C, B> Deref for Coordinator<C, B> {
    type Target = CoordinatorInner<C, B>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<C: HashCache, B: BroadcastExecutor> Coordinator<C, B> {
    /// `domain` is stamped into every item enlisted through this coordinator.
    pub fn new(
        store: TxGroupStore<C>,
        registry: ProducerRegistry,
        broadcaster: B,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner { store, registry, broadcaster, domain: domain.into() }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &TxGroupStore<C> {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &ProducerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Routes `request` to its handler.
    ///
    /// Unknown codes and stray responses yield [`Dispatch::NoReply`]. A malformed header or body
    /// is returned as an error before any state is touched.
    pub async fn dispatch<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        if request.is_response() {
            debug!(remote = %ctx.remote, opaque = request.opaque, "Ignoring unsolicited response");
            return Ok(Dispatch::NoReply);
        }
        let Some(code) = request.request_code() else {
            warn!(remote = %ctx.remote, code = request.code, opaque = request.opaque, "Unknown request code");
            return Ok(Dispatch::NoReply);
        };

        match code {
            RequestCode::HeartBeat => self.heart_beat(ctx, &request),
            RequestCode::UnregisterClient => self.unregister_client(ctx, &request),
            RequestCode::SaveTransGroup => self.create_group(ctx, &request).await,
            RequestCode::AddTrans => self.add_transaction(ctx, &request).await,
            RequestCode::FindTransGroupStatus => self.find_group_status(ctx, &request).await,
            RequestCode::PreCommitTrans => self.pre_commit(ctx, &request).await,
            RequestCode::RollbackTransGroup => self.rollback(ctx, &request).await,
            RequestCode::CommitTrans => self.complete_commit(ctx, &request).await,
        }
    }

    fn heart_beat<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: &RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        let Some(heartbeat) = request.decode_body::<HeartbeatData>()? else {
            debug!(remote = %ctx.remote, opaque = request.opaque, "Heartbeat without body");
            return Ok(Dispatch::NoReply);
        };

        self.registry
            .register_producer(&ctx.remote, ClientChannelInfo::new(ctx.connection, heartbeat.client_id));
        Ok(Dispatch::Reply(success(request)))
    }

    fn unregister_client<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: &RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        let header = request.decode_header::<UnregisterClientHeader>()?;
        self.registry.unregister_producer(&ctx.remote, &header.client_id);
        Ok(Dispatch::Reply(success(request)))
    }

    async fn create_group<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: &RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        let Some(group) = request.decode_body::<TransactionGroup>()? else {
            return Ok(Dispatch::NoReply);
        };

        let mut enlistment = GroupEnlistment::from(group);
        if enlistment.initiator.is_none() {
            warn!(group_id = %enlistment.id, remote = %ctx.remote, "Group created without initiator");
        }
        enlistment.stamp_initiator(&self.origin(ctx));
        let group = TransactionGroup::from(enlistment);

        if let Err(err) = self.store.save_group(&group).await {
            error!(group_id = %group.id, remote = %ctx.remote, error = %err, "Failed to save transaction group");
            return Ok(Dispatch::Reply(system_error(request, &err)));
        }

        info!(group_id = %group.id, remote = %ctx.remote, items = group.item_list.len(), "Transaction group created");
        Ok(reply(ctx, success(request)).await)
    }

    async fn add_transaction<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: &RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        let header = request.decode_header::<TxGroupHeader>()?;
        let Some(item) = request.decode_body::<TransactionItem>()? else {
            return Ok(Dispatch::NoReply);
        };

        let mut participant = ParticipantItem::new(item);
        participant.stamp(&self.origin(ctx));
        let item = participant.into_inner();

        if let Err(err) = self.store.add_item(&header.tx_group_id, &item).await {
            error!(
                group_id = %header.tx_group_id,
                task_key = %item.task_key,
                error = %err,
                "Failed to add transaction item"
            );
            return Ok(Dispatch::Reply(system_error(request, &err)));
        }

        debug!(group_id = %header.tx_group_id, task_key = %item.task_key, remote = %ctx.remote, "Participant enlisted");
        Ok(reply(ctx, success(request)).await)
    }

    async fn find_group_status<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: &RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        let header = request.decode_header::<TxGroupHeader>()?;
        let status = self.store.find_group_status(&header.tx_group_id).await;

        let response = success(request).with_header(&GroupStatusHeader { status });
        Ok(reply(ctx, response).await)
    }

    async fn pre_commit<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: &RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        let header = request.decode_header::<TxGroupHeader>()?;
        if let Err(err) = self.broadcaster.notify_pre_commit(&header.tx_group_id).await {
            warn!(group_id = %header.tx_group_id, error = %err, "Pre-commit broadcast failed");
        }
        info!(group_id = %header.tx_group_id, remote = %ctx.remote, "Pre-commit requested");
        Ok(reply(ctx, success(request)).await)
    }

    async fn rollback<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: &RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        let header = request.decode_header::<TxGroupHeader>()?;
        if let Err(err) = self.broadcaster.notify_rollback(&header.tx_group_id).await {
            warn!(group_id = %header.tx_group_id, error = %err, "Rollback broadcast failed");
        }
        info!(group_id = %header.tx_group_id, remote = %ctx.remote, "Rollback requested");
        Ok(reply(ctx, success(request)).await)
    }

    /// Folds a commit acknowledgement into the group descriptor's status.
    async fn complete_commit<S: ReplySink>(
        &self,
        ctx: &RequestContext<S>,
        request: &RemotingCommand,
    ) -> Result<Dispatch, ProtocolError> {
        let Some(group) = request.decode_body::<TransactionGroup>()? else {
            return Ok(Dispatch::NoReply);
        };

        let enlistment = GroupEnlistment::from(group);
        if let Some(descriptor) = &enlistment.descriptor {
            let result = self
                .store
                .update_item_status(&enlistment.id, descriptor.task_key(), descriptor.status())
                .await;
            match result {
                Ok(()) => info!(
                    group_id = %enlistment.id,
                    status = descriptor.status().code(),
                    "Commit acknowledgement recorded"
                ),
                Err(err) => error!(
                    group_id = %enlistment.id,
                    task_key = descriptor.task_key(),
                    error = %err,
                    "Failed to record commit acknowledgement"
                ),
            }
        }

        Ok(reply(ctx, success(request)).await)
    }

    fn origin<S>(&self, ctx: &RequestContext<S>) -> Origin {
        Origin { model_name: ctx.remote.clone(), tm_domain: self.domain.clone() }
    }
}

/// Writes `response` through the sink. The request counts as handled even if the write fails.
async fn reply<S: ReplySink>(ctx: &RequestContext<S>, response: RemotingCommand) -> Dispatch {
    let opaque = response.opaque;
    if let Err(err) = ctx.sink.send(response).await {
        warn!(remote = %ctx.remote, opaque, error = %err, "Failed to deliver response");
    }
    Dispatch::AlreadySent
}

fn success(request: &RemotingCommand) -> RemotingCommand {
    RemotingCommand::response(ResponseCode::Success, request.opaque)
}

fn system_error(request: &RemotingCommand, err: &impl std::fmt::Display) -> RemotingCommand {
    RemotingCommand::response(ResponseCode::SystemError, request.opaque).with_remark(err.to_string())
}
