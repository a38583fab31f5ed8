//! One connected client: a receive loop and an independent send loop.
//!
//! The receive loop reads one envelope at a time and dispatches it
//! synchronously into the [`BroadcastEngine`]. Everything addressed to the
//! client goes through the bounded outbound queue behind [`SessionHandle`],
//! drained by the send loop, which stamps sequence numbers in write order.

use crate::broadcast::BroadcastEngine;
use crate::error::{DisconnectReason, SessionError};
use crate::metrics::SessionMetrics;
use log::{debug, info, trace, warn};
use shared::protocol::{read_envelope, write_envelope, SequenceCounter, SequenceTracker};
use shared::{now_millis, Envelope, Identity, Message, MessageKind, ProtocolError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued,
    /// Queue full, the message was discarded.
    Dropped,
    /// The send loop has ended.
    Closed,
}

/// Cloneable sending side of a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    addr: SocketAddr,
    outbound: mpsc::Sender<Envelope>,
    metrics: Arc<SessionMetrics>,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Envelope>,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            id,
            addr,
            outbound,
            metrics,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Queues `envelope` without waiting. When the queue is full the newest
    /// message (this one) is dropped and counted.
    pub fn enqueue(&self, envelope: Envelope) -> EnqueueResult {
        let kind = envelope.kind();
        match self.outbound.try_send(envelope) {
            Ok(()) => EnqueueResult::Queued,
            Err(TrySendError::Full(_)) => {
                let critical = !kind.is_best_effort();
                self.metrics.record_dropped(critical);
                if critical {
                    warn!("Session {} queue full, dropped {:?}", self.id, kind);
                } else {
                    trace!("Session {} queue full, dropped {:?}", self.id, kind);
                }
                EnqueueResult::Dropped
            }
            Err(TrySendError::Closed(_)) => EnqueueResult::Closed,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Leave,
}

struct Session {
    handle: SessionHandle,
    engine: Arc<BroadcastEngine>,
    identity: Option<Identity>,
    inbound: SequenceTracker,
}

impl Session {
    fn joined_as(&self, envelope: &Envelope) -> Result<Identity, SessionError> {
        let identity = self
            .identity
            .clone()
            .ok_or(SessionError::NotJoined(envelope.kind()))?;
        if envelope.sender != identity {
            return Err(SessionError::SenderMismatch {
                expected: identity,
                got: envelope.sender.clone(),
            });
        }
        Ok(identity)
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<Flow, SessionError> {
        match &envelope.message {
            Message::Ping => {
                let pong = Envelope::from_server(Message::Pong {
                    echo: envelope.sequence,
                });
                self.handle.enqueue(pong);
            }
            Message::Pong { .. } => {
                self.handle.metrics().record_pong(now_millis());
            }
            Message::Join(state) => {
                if let Some(identity) = &self.identity {
                    return Err(SessionError::AlreadyJoined(identity.clone()));
                }
                if state.id.is_empty() {
                    return Err(SessionError::EmptyIdentity);
                }
                if state.id != envelope.sender {
                    return Err(SessionError::SenderMismatch {
                        expected: state.id.clone(),
                        got: envelope.sender.clone(),
                    });
                }
                self.engine.handle_join(state.clone(), self.handle.clone())?;
                self.identity = Some(state.id.clone());
            }
            Message::Leave { .. } => {
                let identity = self.joined_as(&envelope)?;
                self.engine.handle_leave(&identity, self.handle.id());
                self.identity = None;
                return Ok(Flow::Leave);
            }
            Message::PlayerUpdate(state) => {
                let identity = self.joined_as(&envelope)?;
                if state.id != identity {
                    return Err(SessionError::SenderMismatch {
                        expected: identity,
                        got: state.id.clone(),
                    });
                }
                self.engine.handle_player_update(&identity, state.clone());
            }
            Message::BulletSpawn(spawn) => {
                let identity = self.joined_as(&envelope)?;
                self.engine.handle_bullet_spawn(&identity, *spawn)?;
            }
            Message::Hit(report) => {
                let identity = self.joined_as(&envelope)?;
                self.engine.handle_hit(&identity, report.clone())?;
            }
            Message::NpcUpdate(_) => {
                return Err(SessionError::UnexpectedKind(MessageKind::NpcUpdate));
            }
        }
        Ok(Flow::Continue)
    }

    async fn receive_loop<R>(&mut self, reader: &mut R, idle_timeout: Duration) -> DisconnectReason
    where
        R: AsyncRead + Unpin,
    {
        let metrics = Arc::clone(self.handle.metrics());
        loop {
            let envelope = match tokio::time::timeout(idle_timeout, read_envelope(reader)).await {
                Err(_) => return DisconnectReason::TimedOut,
                Ok(Ok(envelope)) => envelope,
                Ok(Err(e)) if e.is_fatal() => return DisconnectReason::Transport(e),
                Ok(Err(e)) => {
                    warn!("Session {} rejected frame: {}", self.handle.id(), e);
                    metrics.record_rejected();
                    continue;
                }
            };

            metrics.record_received();
            if !self.inbound.observe(envelope.sequence) {
                warn!(
                    "Session {} sequence went from {:?} to {}",
                    self.handle.id(),
                    self.inbound.last(),
                    envelope.sequence
                );
                metrics.record_sequence_violation();
            }

            let kind = envelope.kind();
            match self.dispatch(envelope) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Leave) => return DisconnectReason::Left,
                Err(e) => {
                    warn!("Session {} rejected {:?}: {}", self.handle.id(), kind, e);
                    metrics.record_rejected();
                }
            }
        }
    }
}

async fn send_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Envelope>,
    metrics: Arc<SessionMetrics>,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut sequence = SequenceCounter::new();
    while let Some(mut envelope) = outbound.recv().await {
        envelope.sequence = sequence.next();
        write_envelope(&mut writer, &envelope).await?;
        metrics.record_sent();
    }
    Ok(())
}

/// Runs a session over `stream` until the transport fails, the peer leaves
/// or it goes quiet for longer than the idle timeout.
pub async fn run_session<S>(stream: S, addr: SocketAddr, id: SessionId, engine: Arc<BroadcastEngine>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let config = engine.config();
    let (mut reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let metrics = Arc::new(SessionMetrics::default());
    let handle = SessionHandle::new(id, addr, tx, Arc::clone(&metrics));

    engine.metrics().session_opened();
    info!("Session {} opened from {}", id, addr);

    let mut sender = tokio::spawn(send_loop(writer, rx, Arc::clone(&metrics)));
    let mut session = Session {
        handle,
        engine: Arc::clone(&engine),
        identity: None,
        inbound: SequenceTracker::new(),
    };

    let reason = tokio::select! {
        reason = session.receive_loop(&mut reader, config.idle_timeout) => reason,
        result = &mut sender => match result {
            Ok(Err(e)) => DisconnectReason::Transport(e),
            _ => DisconnectReason::SendFailed,
        },
    };
    sender.abort();

    if let Some(identity) = session.identity.take() {
        engine.handle_leave(&identity, id);
    }
    engine.metrics().session_closed();

    let stats = metrics.stats();
    info!("Session {} closed: {}", id, reason);
    debug!(
        "Session {} sent {} frames, received {}, dropped {}, rejected {}",
        id, stats.frames_sent, stats.frames_received, stats.frames_dropped, stats.messages_rejected
    );
}

/// Spawns [`run_session`] on the runtime.
pub fn spawn_session<S>(
    stream: S,
    addr: SocketAddr,
    id: SessionId,
    engine: Arc<BroadcastEngine>,
) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(run_session(stream, addr, id, engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use shared::protocol::{encode_header, write_frame, WireHeader, PROTOCOL_VERSION};
    use shared::{PlayerState, Vector2};
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn test_engine() -> Arc<BroadcastEngine> {
        Arc::new(BroadcastEngine::new(Arc::new(
            ServerConfig::default().without_creatures(),
        )))
    }

    fn join(id: &str, sequence: u32) -> Envelope {
        let mut envelope = Envelope::new(
            id,
            Message::Join(PlayerState::new(id, id, Vector2::new(400.0, 400.0))),
        );
        envelope.sequence = sequence;
        envelope
    }

    async fn send(stream: &mut DuplexStream, envelope: &Envelope) {
        write_envelope(stream, envelope).await.unwrap();
    }

    #[test]
    fn test_enqueue_drops_newest_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = SessionHandle::new(1, test_addr(), tx, Arc::new(SessionMetrics::default()));

        let first = Envelope::from_server(Message::Ping);
        let second = Envelope::from_server(Message::Pong { echo: 1 });
        assert_eq!(handle.enqueue(first.clone()), EnqueueResult::Queued);
        assert_eq!(handle.enqueue(second), EnqueueResult::Dropped);
        assert_eq!(handle.metrics().stats().frames_dropped, 1);
        assert_eq!(handle.metrics().stats().critical_dropped, 0);

        assert_eq!(rx.try_recv().unwrap(), first);
        drop(rx);
        assert_eq!(
            handle.enqueue(Envelope::from_server(Message::Ping)),
            EnqueueResult::Closed
        );
    }

    #[test]
    fn test_critical_drop_is_counted() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = SessionHandle::new(1, test_addr(), tx, Arc::new(SessionMetrics::default()));
        handle.enqueue(Envelope::from_server(Message::Ping));
        handle.enqueue(Envelope::from_server(Message::Leave { id: "p1".into() }));
        assert_eq!(handle.metrics().stats().critical_dropped, 1);
    }

    #[tokio::test]
    async fn test_send_loop_stamps_increasing_sequences() {
        let (client, server) = duplex(4096);
        let (tx, rx) = mpsc::channel(8);
        let metrics = Arc::new(SessionMetrics::default());
        let task = tokio::spawn(send_loop(server, rx, Arc::clone(&metrics)));

        for _ in 0..3 {
            tx.send(Envelope::from_server(Message::Ping)).await.unwrap();
        }
        drop(tx);
        task.await.unwrap().unwrap();

        let mut client = client;
        let mut tracker = SequenceTracker::new();
        for expected in 1..=3 {
            let envelope = read_envelope(&mut client).await.unwrap();
            assert_eq!(envelope.sequence, expected);
            assert!(tracker.observe(envelope.sequence));
        }
        assert_eq!(metrics.stats().frames_sent, 3);
    }

    #[tokio::test]
    async fn test_ping_is_answered_before_join() {
        let engine = test_engine();
        let (mut client, server) = duplex(4096);
        let task = spawn_session(server, test_addr(), 1, Arc::clone(&engine));

        let mut ping = Envelope::new("anyone", Message::Ping);
        ping.sequence = 7;
        send(&mut client, &ping).await;

        let pong = read_envelope(&mut client).await.unwrap();
        assert_eq!(pong.message, Message::Pong { echo: 7 });
        assert_eq!(pong.sender, shared::protocol::SERVER_IDENTITY);

        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_kind_keeps_connection_open() {
        let engine = test_engine();
        let (mut client, server) = duplex(4096);
        let task = spawn_session(server, test_addr(), 1, Arc::clone(&engine));

        let bogus = encode_header(&WireHeader {
            version: PROTOCOL_VERSION,
            kind: 200,
            sender: "p1".into(),
            timestamp: 0,
            sequence: 1,
            payload: vec![1, 2, 3],
        })
        .unwrap();
        write_frame(&mut client, &bogus).await.unwrap();

        let mut ping = Envelope::new("p1", Message::Ping);
        ping.sequence = 2;
        send(&mut client, &ping).await;
        let pong = read_envelope(&mut client).await.unwrap();
        assert_eq!(pong.message, Message::Pong { echo: 2 });

        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_join_then_disconnect_removes_player() {
        let engine = test_engine();
        let (mut client, server) = duplex(4096);
        let task = spawn_session(server, test_addr(), 1, Arc::clone(&engine));

        send(&mut client, &join("p1", 1)).await;
        // Ping round trip guarantees the JOIN was dispatched.
        let mut ping = Envelope::new("p1", Message::Ping);
        ping.sequence = 2;
        send(&mut client, &ping).await;
        read_envelope(&mut client).await.unwrap();
        assert!(engine.world().player("p1").is_some());

        client.shutdown().await.unwrap();
        drop(client);
        task.await.unwrap();
        assert!(engine.world().player("p1").is_none());
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_messages_before_join_are_rejected() {
        let engine = test_engine();
        let (tx, _rx) = mpsc::channel(8);
        let handle = SessionHandle::new(1, test_addr(), tx, Arc::new(SessionMetrics::default()));
        let mut session = Session {
            handle,
            engine: Arc::clone(&engine),
            identity: None,
            inbound: SequenceTracker::new(),
        };

        let update = Envelope::new(
            "p1",
            Message::PlayerUpdate(PlayerState::new("p1", "p1", Vector2::ZERO)),
        );
        assert_eq!(
            session.dispatch(update),
            Err(SessionError::NotJoined(MessageKind::PlayerUpdate))
        );

        assert_eq!(session.dispatch(join("p1", 1)), Ok(Flow::Continue));
        assert_eq!(
            session.dispatch(join("p1", 2)),
            Err(SessionError::AlreadyJoined("p1".into()))
        );

        let spoofed = Envelope::new(
            "p2",
            Message::PlayerUpdate(PlayerState::new("p2", "p2", Vector2::ZERO)),
        );
        assert!(matches!(
            session.dispatch(spoofed),
            Err(SessionError::SenderMismatch { .. })
        ));

        let leave = Envelope::new("p1", Message::Leave { id: "p1".into() });
        assert_eq!(session.dispatch(leave), Ok(Flow::Leave));
        assert!(engine.world().player("p1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_times_out() {
        let engine = test_engine();
        let (_client, server) = duplex(4096);
        let task = spawn_session(server, test_addr(), 1, Arc::clone(&engine));
        tokio::time::advance(engine.config().idle_timeout + Duration::from_millis(10)).await;
        task.await.unwrap();
        assert_eq!(engine.metrics().open_sessions(), 0);
    }
}
