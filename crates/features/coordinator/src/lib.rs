//! # Coordinator
//!
//! The server side of the two-phase transaction protocol.
//!
//! * [`protocol`]: the [`RemotingCommand`] envelope, request and response codes, typed headers.
//! * [`ProducerRegistry`]: which clients are reachable, refreshed by heartbeats and swept for
//!   staleness.
//! * [`BroadcastExecutor`]: the seam towards participant fan-out, with [`ChannelBroadcaster`] as
//!   the in-process implementation.
//! * [`Coordinator`]: routes each request to its lifecycle handler and answers either by value
//!   ([`Dispatch::Reply`]) or through the connection's [`ReplySink`] ([`Dispatch::AlreadySent`]).

mod broadcast;
mod engine;
mod error;
pub mod protocol;
mod registry;

pub use broadcast::{
    BroadcastError, BroadcastErrorExt, BroadcastExecutor, ChannelBroadcaster, GroupNotification,
    NotificationReceiverExt, Phase,
};
pub use engine::{Coordinator, CoordinatorInner, Dispatch, ReplySink, RequestContext};
pub use error::{ProtocolError, ProtocolErrorExt};
pub use protocol::{RemotingCommand, RequestCode, ResponseCode};
pub use registry::{ClientChannelInfo, ConnectionId, ProducerRegistry, ProducerRegistryInner};
