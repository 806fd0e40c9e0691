// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Connection sessions
//!
//! A session owns one established peer socket and runs two tasks against it:
//! a reader that decodes frames and hands chat messages to the peer manager,
//! and a writer that drains the session's outbound queue. Whichever task stops
//! first cancels the session token, which unblocks the other one, and the
//! session is then dropped from the live set.

use crate::counters::NetworkMetrics;
use crate::protocols::{InboundFrame, MessageCodec, NetworkMessage};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use telephone_types::Message;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

/// Identifier of a live session, unique per peer manager
pub type SessionId = u64;

/// How long a closing writer may spend on the goodbye frame
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// A chat message received on a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Session the message arrived on
    pub session_id: SessionId,
    /// The message itself
    pub message: Message,
}

/// Which side opened the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted by one of our listeners
    Inbound,
    /// Dialed by us
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Information about a session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub remote_addr: SocketAddr,
    pub direction: Direction,
    pub connected_at: SystemTime,
}

impl SessionInfo {
    pub fn new(id: SessionId, remote_addr: SocketAddr, is_inbound: bool) -> Self {
        Self {
            id,
            remote_addr,
            direction: if is_inbound {
                Direction::Inbound
            } else {
                Direction::Outbound
            },
            connected_at: SystemTime::now(),
        }
    }

    /// Get connection duration
    pub fn connection_duration(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.connected_at)
            .unwrap_or(Duration::ZERO)
    }
}

/// Everything a running session needs from its owner
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub inbound_tx: mpsc::UnboundedSender<Inbound>,
    pub max_frame_size: usize,
    pub metrics: NetworkMetrics,
    /// Invoked by each task as it exits; must tolerate repeated calls
    pub on_close: Arc<dyn Fn(SessionId) + Send + Sync>,
}

/// One established peer link
pub struct Session {
    info: SessionInfo,
    outbound_tx: mpsc::UnboundedSender<NetworkMessage>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Create the session and its outbound queue; tasks are started by [`Session::start`]
    pub(crate) fn open(
        info: SessionInfo,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<NetworkMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            info,
            outbound_tx,
            cancel,
            tasks: Mutex::new(Vec::with_capacity(2)),
        });
        (session, outbound_rx)
    }

    /// Spawn the reader and writer tasks over `stream`
    pub(crate) fn start(
        &self,
        stream: TcpStream,
        outbound_rx: mpsc::UnboundedReceiver<NetworkMessage>,
        ctx: SessionContext,
    ) {
        let (read_half, write_half) = stream.into_split();
        let codec = MessageCodec::new(ctx.max_frame_size);
        let id = self.info.id;

        let reader = FramedRead::new(read_half, codec.clone());
        let writer = FramedWrite::new(write_half, codec);

        let reader_task = {
            let cancel = self.cancel.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                read_loop(id, reader, &ctx, &cancel).await;
                cancel.cancel();
                (ctx.on_close)(id);
            })
        };

        let writer_task = {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                write_loop(id, writer, outbound_rx, &ctx.metrics, &cancel).await;
                cancel.cancel();
                (ctx.on_close)(id);
            })
        };

        self.tasks.lock().extend([reader_task, writer_task]);
    }

    pub fn id(&self) -> SessionId {
        self.info.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Queue a frame for the writer task. Never blocks.
    ///
    /// Returns false once the session is closing.
    pub fn enqueue(&self, message: NetworkMessage) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.outbound_tx.send(message).is_ok()
    }

    /// Ask both tasks to stop
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the reader and writer tasks have exited
    pub async fn wait_closed(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(session_id = self.info.id, error = %e, "Session task failed");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_loop(
    id: SessionId,
    mut frames: FramedRead<OwnedReadHalf, MessageCodec>,
    ctx: &SessionContext,
    cancel: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(InboundFrame::Message(NetworkMessage::Broadcast(message)))) => {
                ctx.metrics.inc_messages_received();
                tracing::trace!(session_id = id, message_id = %message.id(), "Frame received");
                if ctx
                    .inbound_tx
                    .send(Inbound {
                        session_id: id,
                        message,
                    })
                    .is_err()
                {
                    tracing::debug!(session_id = id, "Inbound queue closed, stopping reader");
                    break;
                }
            }
            Some(Ok(InboundFrame::Message(NetworkMessage::Disconnect { reason }))) => {
                tracing::info!(session_id = id, %reason, "Peer disconnected");
                break;
            }
            Some(Ok(InboundFrame::Unrecognized { len, reason })) => {
                ctx.metrics.inc_unrecognized_frames();
                tracing::warn!(session_id = id, len, %reason, "Discarding frame of unexpected type");
            }
            Some(Err(e)) => {
                ctx.metrics.inc_receive_errors();
                tracing::warn!(session_id = id, error = %e, "Read failed, closing session");
                break;
            }
            None => {
                tracing::debug!(session_id = id, "Peer closed the connection");
                break;
            }
        }
    }
}

async fn write_loop(
    id: SessionId,
    mut sink: FramedWrite<OwnedWriteHalf, MessageCodec>,
    mut outbound_rx: mpsc::UnboundedReceiver<NetworkMessage>,
    metrics: &NetworkMetrics,
    cancel: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let goodbye = sink.send(NetworkMessage::disconnect("session closed"));
                let _ = tokio::time::timeout(DISCONNECT_GRACE, goodbye).await;
                break;
            }
            next = outbound_rx.recv() => next,
        };

        let Some(message) = next else {
            break;
        };

        let size = bincode::serialized_size(&message).unwrap_or(0);
        // `send` flushes after every frame
        match sink.send(message).await {
            Ok(()) => {
                metrics.inc_messages_sent();
                metrics.add_bytes_sent(size);
            }
            Err(e) => {
                metrics.inc_send_errors();
                tracing::warn!(session_id = id, error = %e, "Write failed, closing session");
                break;
            }
        }
    }

    // Shut down our half so the peer's reader sees EOF
    let _ = tokio::time::timeout(DISCONNECT_GRACE, sink.close()).await;
}
