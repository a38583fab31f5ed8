//! TCP connection to the game server.
//!
//! The stream is split between two tasks. The reader decodes envelopes,
//! answers server pings itself and forwards everything else to
//! [`NetworkClient::recv`]. The writer stamps outgoing messages with this
//! client's identity and a strictly increasing sequence number.

use crate::error::ClientError;
use log::{debug, info, warn};
use shared::protocol::{read_envelope, write_envelope, SequenceCounter, SequenceTracker};
use shared::{now_millis, Envelope, Identity, Message, PlayerState, ProtocolError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

const OUTBOUND_CAPACITY: usize = 256;
const INBOUND_CAPACITY: usize = 1024;
const LEAVE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

type Inbound = Result<Envelope, ProtocolError>;

/// Tracks the most recent ping we sent and the round trip of its answer.
#[derive(Debug)]
struct PingClock {
    sequence: AtomicU32,
    sent_at: AtomicU64,
    rtt_ms: AtomicU64,
}

impl PingClock {
    fn new() -> Self {
        Self {
            sequence: AtomicU32::new(0),
            sent_at: AtomicU64::new(0),
            rtt_ms: AtomicU64::new(u64::MAX),
        }
    }

    fn sent(&self, sequence: u32, now: u64) {
        self.sent_at.store(now, Ordering::Relaxed);
        self.sequence.store(sequence, Ordering::Relaxed);
    }

    fn answered(&self, echo: u32, now: u64) -> Option<u64> {
        if echo == 0 || echo != self.sequence.load(Ordering::Relaxed) {
            return None;
        }
        let rtt = now.saturating_sub(self.sent_at.load(Ordering::Relaxed));
        self.rtt_ms.store(rtt, Ordering::Relaxed);
        Some(rtt)
    }

    fn rtt_ms(&self) -> Option<u64> {
        match self.rtt_ms.load(Ordering::Relaxed) {
            u64::MAX => None,
            rtt => Some(rtt),
        }
    }
}

pub struct NetworkClient {
    identity: Identity,
    server_addr: SocketAddr,
    outbound: mpsc::Sender<Message>,
    inbound: mpsc::Receiver<Inbound>,
    ping: Arc<PingClock>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl NetworkClient {
    pub async fn connect(addr: &str, identity: impl Into<Identity>) -> Result<Self, ClientError> {
        let connect_error = |source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        };

        let stream = TcpStream::connect(addr).await.map_err(connect_error)?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Could not disable Nagle: {}", e);
        }
        let server_addr = stream.peer_addr().map_err(connect_error)?;
        let identity = identity.into();

        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let ping = Arc::new(PingClock::new());

        let writer = tokio::spawn(write_loop(
            write_half,
            identity.clone(),
            outbound_rx,
            Arc::clone(&ping),
        ));
        let reader = tokio::spawn(read_loop(
            read_half,
            inbound_tx,
            outbound_tx.clone(),
            Arc::clone(&ping),
        ));

        info!("Connected to {} as {}", server_addr, identity);

        Ok(Self {
            identity,
            server_addr,
            outbound: outbound_tx,
            inbound: inbound_rx,
            ping,
            reader,
            writer,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Queues `message` for the writer. Waits only while the queue is full.
    pub async fn send(&self, message: Message) -> Result<(), ClientError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| ClientError::Closed)
    }

    pub async fn join(&self, player: PlayerState) -> Result<(), ClientError> {
        self.send(Message::Join(player)).await
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.send(Message::Ping).await
    }

    /// Round trip of the last answered ping.
    pub fn rtt_ms(&self) -> Option<u64> {
        self.ping.rtt_ms()
    }

    /// Waits for the next message from the server.
    pub async fn recv(&mut self) -> Result<Envelope, ClientError> {
        match self.inbound.recv().await {
            Some(Ok(envelope)) => Ok(envelope),
            Some(Err(e)) => Err(ClientError::Protocol(e)),
            None => Err(ClientError::Closed),
        }
    }

    /// Returns a message if one is already waiting.
    pub fn try_recv(&mut self) -> Result<Option<Envelope>, ClientError> {
        match self.inbound.try_recv() {
            Ok(Ok(envelope)) => Ok(Some(envelope)),
            Ok(Err(e)) => Err(ClientError::Protocol(e)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ClientError::Closed),
        }
    }

    /// Sends LEAVE and waits briefly for the writer to flush it.
    pub async fn leave(mut self) -> Result<(), ClientError> {
        self.send(Message::Leave {
            id: self.identity.clone(),
        })
        .await?;

        // The writer exits once every sender is gone, after draining the queue.
        self.reader.abort();
        let (closed, _) = mpsc::channel(1);
        drop(std::mem::replace(&mut self.outbound, closed));

        if tokio::time::timeout(LEAVE_FLUSH_TIMEOUT, &mut self.writer)
            .await
            .is_err()
        {
            warn!("Timed out flushing LEAVE for {}", self.identity);
        }
        info!("Left {} as {}", self.server_addr, self.identity);
        Ok(())
    }
}

impl Drop for NetworkClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    identity: Identity,
    mut outbound: mpsc::Receiver<Message>,
    ping: Arc<PingClock>,
) {
    let mut sequence = SequenceCounter::new();

    while let Some(message) = outbound.recv().await {
        let mut envelope = Envelope::new(identity.clone(), message);
        envelope.sequence = sequence.next();
        if envelope.message == Message::Ping {
            ping.sent(envelope.sequence, envelope.timestamp);
        }

        if let Err(e) = write_envelope(&mut writer, &envelope).await {
            warn!("Send to server failed: {}", e);
            break;
        }
    }

    debug!("Writer for {} stopped", identity);
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    inbound: mpsc::Sender<Inbound>,
    replies: mpsc::Sender<Message>,
    ping: Arc<PingClock>,
) {
    let mut sequences = SequenceTracker::new();

    loop {
        let envelope = match read_envelope(&mut reader).await {
            Ok(envelope) => envelope,
            Err(ProtocolError::ConnectionClosed) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) if e.is_fatal() => {
                warn!("Connection to server failed: {}", e);
                let _ = inbound.send(Err(e)).await;
                break;
            }
            Err(e) => {
                warn!("Dropped message from server: {}", e);
                continue;
            }
        };

        if !sequences.observe(envelope.sequence) {
            warn!(
                "Sequence {} from server did not advance past {:?}",
                envelope.sequence,
                sequences.last()
            );
        }

        match &envelope.message {
            Message::Ping => {
                let pong = Message::Pong {
                    echo: envelope.sequence,
                };
                if replies.try_send(pong).is_err() {
                    debug!("Outbound queue full, pong skipped");
                }
            }
            Message::Pong { echo } => {
                if let Some(rtt) = ping.answered(*echo, now_millis()) {
                    debug!("Round trip {}ms", rtt);
                }
            }
            _ => {
                if inbound.send(Ok(envelope)).await.is_err() {
                    break;
                }
            }
        }
    }
}
