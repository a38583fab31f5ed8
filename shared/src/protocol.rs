//! Wire protocol: envelope, message kinds and length-prefixed framing.
//!
//! Every frame on the stream is a big-endian `u32` length followed by a
//! bincode-encoded [`WireHeader`]. The header names the message kind as a small
//! integer and carries the kind-specific payload as opaque bytes, which are
//! decoded separately so that an unknown kind or a payload of the wrong shape
//! rejects one message without poisoning the stream.

use crate::error::ProtocolError;
use crate::state::{BulletSpawn, HitReport, Identity, NpcSnapshot, PlayerState};
use bincode::Options;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u16 = 1;
pub const MAX_FRAME_LEN: usize = 64 * 1024;
/// Sender identity used for messages the server originates itself.
pub const SERVER_IDENTITY: &str = "server";

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .with_limit(MAX_FRAME_LEN as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Join = 1,
    Leave = 2,
    PlayerUpdate = 3,
    BulletSpawn = 4,
    Hit = 5,
    NpcUpdate = 6,
    Ping = 7,
    Pong = 8,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageKind::Join),
            2 => Some(MessageKind::Leave),
            3 => Some(MessageKind::PlayerUpdate),
            4 => Some(MessageKind::BulletSpawn),
            5 => Some(MessageKind::Hit),
            6 => Some(MessageKind::NpcUpdate),
            7 => Some(MessageKind::Ping),
            8 => Some(MessageKind::Pong),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// State-carrying kinds whose loss is superseded by the next update.
    pub fn is_best_effort(self) -> bool {
        matches!(
            self,
            MessageKind::PlayerUpdate | MessageKind::NpcUpdate | MessageKind::Ping | MessageKind::Pong
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Join(PlayerState),
    Leave { id: Identity },
    PlayerUpdate(PlayerState),
    BulletSpawn(BulletSpawn),
    Hit(HitReport),
    NpcUpdate(NpcSnapshot),
    Ping,
    /// Echoes the sequence number of the ping being answered.
    Pong { echo: u32 },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Join(_) => MessageKind::Join,
            Message::Leave { .. } => MessageKind::Leave,
            Message::PlayerUpdate(_) => MessageKind::PlayerUpdate,
            Message::BulletSpawn(_) => MessageKind::BulletSpawn,
            Message::Hit(_) => MessageKind::Hit,
            Message::NpcUpdate(_) => MessageKind::NpcUpdate,
            Message::Ping => MessageKind::Ping,
            Message::Pong { .. } => MessageKind::Pong,
        }
    }

    fn encode_payload(&self) -> bincode::Result<Vec<u8>> {
        match self {
            Message::Join(player) | Message::PlayerUpdate(player) => {
                wire_options().serialize(player)
            }
            Message::Leave { id } => wire_options().serialize(id),
            Message::BulletSpawn(spawn) => wire_options().serialize(spawn),
            Message::Hit(hit) => wire_options().serialize(hit),
            Message::NpcUpdate(npc) => wire_options().serialize(npc),
            Message::Ping => wire_options().serialize(&()),
            Message::Pong { echo } => wire_options().serialize(echo),
        }
    }

    fn decode_payload(kind: MessageKind, bytes: &[u8]) -> Result<Message, ProtocolError> {
        let mismatch = |e: bincode::Error| ProtocolError::PayloadMismatch {
            kind,
            reason: e.to_string(),
        };

        let message = match kind {
            MessageKind::Join => Message::Join(wire_options().deserialize(bytes).map_err(mismatch)?),
            MessageKind::Leave => Message::Leave {
                id: wire_options().deserialize(bytes).map_err(mismatch)?,
            },
            MessageKind::PlayerUpdate => {
                Message::PlayerUpdate(wire_options().deserialize(bytes).map_err(mismatch)?)
            }
            MessageKind::BulletSpawn => {
                Message::BulletSpawn(wire_options().deserialize(bytes).map_err(mismatch)?)
            }
            MessageKind::Hit => Message::Hit(wire_options().deserialize(bytes).map_err(mismatch)?),
            MessageKind::NpcUpdate => {
                Message::NpcUpdate(wire_options().deserialize(bytes).map_err(mismatch)?)
            }
            MessageKind::Ping => {
                wire_options()
                    .deserialize::<()>(bytes)
                    .map_err(mismatch)?;
                Message::Ping
            }
            MessageKind::Pong => Message::Pong {
                echo: wire_options().deserialize(bytes).map_err(mismatch)?,
            },
        };
        Ok(message)
    }
}

/// One message as exchanged between client and server.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender: Identity,
    /// Epoch millis at creation.
    pub timestamp: u64,
    /// Assigned by the sending side's writer, strictly increasing per connection.
    pub sequence: u32,
    pub message: Message,
}

impl Envelope {
    pub fn new(sender: impl Into<Identity>, message: Message) -> Self {
        Self {
            sender: sender.into(),
            timestamp: crate::now_millis(),
            sequence: 0,
            message,
        }
    }

    pub fn from_server(message: Message) -> Self {
        Self::new(SERVER_IDENTITY, message)
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}

/// Versioned header as it appears on the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireHeader {
    pub version: u16,
    pub kind: u8,
    pub sender: String,
    pub timestamp: u64,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let payload = envelope
        .message
        .encode_payload()
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;

    let header = WireHeader {
        version: PROTOCOL_VERSION,
        kind: envelope.kind().as_u8(),
        sender: envelope.sender.clone(),
        timestamp: envelope.timestamp,
        sequence: envelope.sequence,
        payload,
    };

    wire_options()
        .serialize(&header)
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Encodes a raw header. Exposed so tests can craft frames a well-behaved
/// peer would never send.
pub fn encode_header(header: &WireHeader) -> Result<Vec<u8>, ProtocolError> {
    wire_options()
        .serialize(header)
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    let header: WireHeader = wire_options()
        .deserialize(bytes)
        .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

    if header.version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            received: header.version,
            expected: PROTOCOL_VERSION,
        });
    }

    let kind = MessageKind::from_u8(header.kind).ok_or(ProtocolError::UnknownKind(header.kind))?;
    let message = Message::decode_payload(kind, &header.payload)?;

    Ok(Envelope {
        sender: header.sender,
        timestamp: header.timestamp,
        sequence: header.sequence,
        message,
    })
}

/// Reads one length-prefixed frame body.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads and decodes one envelope. Non-fatal errors leave the stream aligned
/// on the next frame.
pub async fn read_envelope<R>(reader: &mut R) -> Result<Envelope, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let body = read_frame(reader).await?;
    decode_envelope(&body)
}

pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let body = encode_envelope(envelope)?;
    write_frame(writer, &body).await
}

/// Hands out strictly increasing sequence numbers, starting at 1.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: u32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1);
        self.last
    }
}

/// Verifies that sequence numbers observed from one sender keep increasing.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u32>,
    violations: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sequence` and returns false if it did not advance.
    pub fn observe(&mut self, sequence: u32) -> bool {
        let ok = self.last.map_or(true, |last| sequence > last);
        if ok {
            self.last = Some(sequence);
        } else {
            self.violations += 1;
        }
        ok
    }

    pub fn last(&self) -> Option<u32> {
        self.last
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }
}
