//! TCP endpoint adapter.
//!
//! Carries one JSON value per frame over a peer-to-peer TCP stream: a 4-byte
//! little-endian length prefix followed by UTF-8 JSON. Frames that fail to
//! parse are logged and swallowed so a misbehaving peer can never throw into
//! the RPC handlers. The socket is tuned for low latency (TCP_NODELAY plus
//! sized kernel buffers).

use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{MessageEndpoint, MessageSubscription, SubscriberSet};
use crate::error::TransportError;

/// Upper bound on a single frame; anything larger tears the stream down.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Kernel send/receive buffer size applied to each stream.
const SOCKET_BUFFER_BYTES: usize = 64 * 1024;

/// A duplex endpoint over one TCP stream.
pub struct TcpEndpoint {
    outgoing: mpsc::UnboundedSender<Value>,
    subscribers: Arc<SubscriberSet>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl Drop for TcpEndpoint {
    fn drop(&mut self) {
        // The writer task ends on its own once `outgoing` is gone; the reader
        // holds the read half and must be torn down so the socket closes.
        self.reader_task.abort();
    }
}

/// Accepts inbound bridge connections, one endpoint per peer.
pub struct TcpEndpointListener {
    listener: TcpListener,
}

impl TcpEndpointListener {
    /// Bind on `addr` (e.g. `127.0.0.1:0` for an ephemeral port).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        debug!("bridge listener bound on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next peer as a ready endpoint.
    pub async fn accept(&self) -> Result<TcpEndpoint, TransportError> {
        let (stream, peer) = self.listener.accept().await?;
        debug!("accepted bridge peer {peer}");
        TcpEndpoint::from_stream(stream)
    }
}

impl TcpEndpoint {
    /// Connect to a listening peer.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        debug!("connected to bridge peer {addr}");
        Self::from_stream(stream)
    }

    /// Build an endpoint over an already-established stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        let stream = tune_for_latency(stream)?;
        let (reader, writer) = stream.into_split();

        let subscribers = Arc::new(SubscriberSet::new());
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(read_loop(reader, subscribers.clone()));
        tokio::spawn(write_loop(writer, outgoing_rx));

        Ok(Self {
            outgoing,
            subscribers,
            reader_task,
        })
    }
}

#[async_trait]
impl MessageEndpoint for TcpEndpoint {
    async fn post(&self, message: Value) -> Result<(), TransportError> {
        self.outgoing
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    fn subscribe(&self) -> MessageSubscription {
        self.subscribers.subscribe()
    }
}

/// Apply TCP_NODELAY and buffer sizes, as the frames are small and
/// latency-bound.
fn tune_for_latency(stream: TcpStream) -> Result<TcpStream, TransportError> {
    let std_stream = stream.into_std()?;
    let socket = socket2::Socket::from(std_stream.try_clone()?);
    socket.set_nodelay(true)?;
    socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;
    socket.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;
    Ok(TcpStream::from_std(std_stream)?)
}

enum Frame {
    Message(Value),
    /// A frame arrived but was not valid JSON; skipped by contract.
    Skipped,
    Closed,
}

async fn read_frame(reader: &mut OwnedReadHalf) -> std::io::Result<Frame> {
    let mut len_bytes = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut len_bytes).await {
        return if e.kind() == ErrorKind::UnexpectedEof {
            Ok(Frame::Closed)
        } else {
            Err(e)
        };
    }
    let frame_len = u32::from_le_bytes(len_bytes) as usize;
    if frame_len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame too large: {frame_len} bytes"),
        ));
    }

    let mut frame = vec![0u8; frame_len];
    reader.read_exact(&mut frame).await?;

    match serde_json::from_slice(&frame) {
        Ok(value) => Ok(Frame::Message(value)),
        Err(e) => {
            // Text transports swallow parse failures rather than throwing
            // them into the RPC handlers.
            warn!("discarding frame that is not valid JSON: {e}");
            Ok(Frame::Skipped)
        }
    }
}

async fn read_loop(mut reader: OwnedReadHalf, subscribers: Arc<SubscriberSet>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Frame::Message(value)) => subscribers.deliver(&value),
            Ok(Frame::Skipped) => continue,
            Ok(Frame::Closed) => {
                debug!("tcp endpoint closed by peer");
                break;
            }
            Err(e) => {
                debug!("tcp endpoint read failed: {e}");
                break;
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outgoing: mpsc::UnboundedReceiver<Value>) {
    while let Some(message) = outgoing.recv().await {
        let frame = match serde_json::to_vec(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping message that does not serialise: {e}");
                continue;
            }
        };
        let result = async {
            writer.write_all(&(frame.len() as u32).to_le_bytes()).await?;
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!("tcp endpoint write failed, closing: {e}");
            break;
        }
    }
    debug!("tcp endpoint writer finished");
}
