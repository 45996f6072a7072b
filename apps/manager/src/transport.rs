//! Length-prefixed JSON framing over TCP.
//!
//! A frame is a big-endian `u32` byte count followed by that many bytes of a JSON encoded
//! [`RemotingCommand`]. Each connection gets one reader loop, one writer task and one task per
//! inbound request, so slow handlers never stall the socket. At most [`MAX_IN_FLIGHT`] requests
//! of a connection are handled at once; past that the reader stops pulling frames until one
//! finishes.

use gts_cache::HashCache;
use gts_coordinator::{
    BroadcastExecutor, ConnectionId, Coordinator, Dispatch, ProtocolError, ProtocolErrorExt,
    RemotingCommand, ReplySink, RequestContext,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Responses queued per connection before handlers start waiting on the writer.
const OUTBOUND_CAPACITY: usize = 256;

/// Requests of one connection handled concurrently.
pub const MAX_IN_FLIGHT: usize = 64;

/// Reads one frame. `Ok(None)` means the peer closed the stream between frames.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(source) => {
            return Err(ProtocolError::Transport {
                source,
                context: Some("Failed to read frame length".into()),
            });
        },
    };
    if len > max_frame_bytes {
        return Err(ProtocolError::FrameTooLarge { size: len, limit: max_frame_bytes, context: None });
    }

    let mut frame = vec![0; len];
    reader.read_exact(&mut frame).await.context("Failed to read frame body")?;
    Ok(Some(frame))
}

/// Encodes and writes one command, then flushes.
pub async fn write_frame<W>(writer: &mut W, command: &RemotingCommand) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = serde_json::to_vec(command).context("Failed to encode command")?;
    let len = u32::try_from(frame.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: frame.len(),
        limit: u32::MAX as usize,
        context: Some("Outbound frame".into()),
    })?;
    writer.write_u32(len).await.context("Failed to write frame length")?;
    writer.write_all(&frame).await.context("Failed to write frame body")?;
    writer.flush().await.context("Failed to flush frame")?;
    Ok(())
}

/// Hands responses to the connection's writer task.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<RemotingCommand>,
}

impl ReplySink for FrameSender {
    async fn send(&self, response: RemotingCommand) -> Result<(), ProtocolError> {
        self.tx.send(response).await.map_err(|_| ProtocolError::Transport {
            source: io::Error::new(io::ErrorKind::BrokenPipe, "connection writer closed"),
            context: None,
        })
    }
}

/// Serves one client connection until it closes, misbehaves or `stop` flips.
///
/// Every registration made over the connection is dropped once it ends.
pub async fn serve_connection<C, B>(
    coordinator: Coordinator<C, B>,
    stream: TcpStream,
    peer: SocketAddr,
    max_frame_bytes: usize,
    mut stop: watch::Receiver<bool>,
) where
    C: HashCache,
    B: BroadcastExecutor,
{
    let connection = ConnectionId::next();
    let remote = peer.to_string();
    info!(remote = %remote, connection = connection.as_u64(), "Client connected");

    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let writer = tokio::spawn(write_loop(BufWriter::new(write_half), rx, remote.clone()));
    let ctx = Arc::new(RequestContext::new(remote.clone(), connection, FrameSender { tx }));

    let in_flight = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut reader = BufReader::new(read_half);
    loop {
        let permit = tokio::select! {
            permit = Arc::clone(&in_flight).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = stop.changed() => break,
        };
        let frame = tokio::select! {
            frame = read_frame(&mut reader, max_frame_bytes) => frame,
            _ = stop.changed() => break,
        };

        match frame {
            Ok(Some(frame)) => match serde_json::from_slice::<RemotingCommand>(&frame) {
                Ok(request) => {
                    let coordinator = coordinator.clone();
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        handle_request(&coordinator, &ctx, request).await;
                        drop(permit);
                    });
                },
                Err(err) => warn!(remote = %remote, error = %err, "Dropping undecodable frame"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(remote = %remote, error = %err, "Closing connection");
                break;
            },
        }
    }

    coordinator.registry().unregister_connection(connection);
    drop(ctx);
    // In-flight handlers keep the writer alive until their responses are out.
    if let Err(err) = writer.await {
        warn!(remote = %remote, error = %err, "Connection writer task failed");
    }
    info!(remote = %remote, connection = connection.as_u64(), "Client disconnected");
}

async fn handle_request<C, B>(
    coordinator: &Coordinator<C, B>,
    ctx: &RequestContext<FrameSender>,
    request: RemotingCommand,
) where
    C: HashCache,
    B: BroadcastExecutor,
{
    let (code, opaque) = (request.code, request.opaque);
    trace!(remote = %ctx.remote, code, opaque, "Request received");

    match coordinator.dispatch(ctx, request).await {
        Ok(Dispatch::Reply(response)) => {
            if let Err(err) = ctx.sink.send(response).await {
                warn!(remote = %ctx.remote, code, opaque, error = %err, "Failed to queue response");
            }
        },
        Ok(Dispatch::AlreadySent | Dispatch::NoReply) => {},
        Err(err) => warn!(remote = %ctx.remote, code, opaque, error = %err, "Rejected malformed request"),
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<RemotingCommand>, remote: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        if let Err(err) = write_frame(&mut writer, &response).await {
            debug!(remote = %remote, error = %err, "Stopping writer");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxhash::FxHashMap;
    use gts_cache::{CacheError, MemoryCache};
    use gts_coordinator::{ChannelBroadcaster, ProducerRegistry, RequestCode, ResponseCode};
    use gts_kernel::domain::model::{TransactionGroup, TransactionItem, TransactionRole};
    use gts_store::TxGroupStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    /// Holds every `hset` until the gate is opened.
    #[derive(Debug)]
    struct GatedCache {
        memory: MemoryCache,
        gate: Semaphore,
        entered: AtomicUsize,
    }

    impl GatedCache {
        fn closed() -> Self {
            Self { memory: MemoryCache::new(), gate: Semaphore::new(0), entered: AtomicUsize::new(0) }
        }
    }

    impl HashCache for GatedCache {
        async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            self.memory.hset(key, field, value).await
        }

        async fn hset_existing(&self, key: &str, field: &str, value: String) -> Result<bool, CacheError> {
            self.memory.hset_existing(key, field, value).await
        }

        async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
            self.memory.hget(key, field).await
        }

        async fn hget_all(&self, key: &str) -> Result<FxHashMap<String, String>, CacheError> {
            self.memory.hget_all(key).await
        }

        async fn del(&self, key: &str) -> Result<bool, CacheError> {
            self.memory.del(key).await
        }

        async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
            self.memory.keys(pattern).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipelined_requests_wait_for_a_free_slot() {
        let cache = Arc::new(GatedCache::closed());
        let coordinator = Coordinator::new(
            TxGroupStore::new(Arc::clone(&cache)),
            ProducerRegistry::new(),
            ChannelBroadcaster::new(),
            "tm-a:9876",
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let server = tokio::spawn(serve_connection(coordinator, stream, peer, 1024 * 1024, stop_rx));

        let total = MAX_IN_FLIGHT + 8;
        for n in 0..total {
            let group = TransactionGroup {
                id: format!("G{n}"),
                item_list: vec![TransactionItem::new(format!("G{n}"), TransactionRole::Participant)],
            };
            let opaque = i32::try_from(n).unwrap();
            let create = RemotingCommand::request(RequestCode::SaveTransGroup, opaque).with_body(&group).unwrap();
            write_frame(&mut client, &create).await.unwrap();
        }

        timeout(Duration::from_secs(5), async {
            while cache.entered.load(Ordering::SeqCst) < MAX_IN_FLIGHT {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("handlers never started");
        sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.entered.load(Ordering::SeqCst), MAX_IN_FLIGHT);

        cache.gate.add_permits(total);
        for _ in 0..total {
            let frame = timeout(Duration::from_secs(5), read_frame(&mut client, 1024 * 1024))
                .await
                .expect("response timed out")
                .unwrap()
                .unwrap();
            let response: RemotingCommand = serde_json::from_slice(&frame).unwrap();
            assert_eq!(response.response_code(), Some(ResponseCode::Success));
        }
        assert_eq!(cache.entered.load(Ordering::SeqCst), total);

        drop(client);
        timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_frames_survive_the_wire() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let request = RemotingCommand::request(RequestCode::HeartBeat, 3);

        write_frame(&mut client, &request).await.unwrap();
        let frame = read_frame(&mut server, 1024).await.unwrap().unwrap();

        assert_eq!(serde_json::from_slice::<RemotingCommand>(&frame).unwrap(), request);
    }

    #[tokio::test]
    async fn test_clean_close_reads_as_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frames_are_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let response = RemotingCommand::response(ResponseCode::Success, 1).with_remark("x".repeat(64));
        write_frame(&mut client, &response).await.unwrap();

        let err = read_frame(&mut server, 16).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_a_transport_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(10).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server, 1024).await,
            Err(ProtocolError::Transport { .. })
        ));
    }
}
