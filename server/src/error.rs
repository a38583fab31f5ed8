use shared::{Identity, MessageKind, ProtocolError};
use thiserror::Error;

/// Errors that can stop the server itself. Only binding is fatal.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a single inbound message is rejected. The session stays open.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("{0:?} received before JOIN")]
    NotJoined(MessageKind),

    #[error("session already joined as {0}")]
    AlreadyJoined(Identity),

    #[error("identity {0} is already connected")]
    IdentityInUse(Identity),

    #[error("empty identity in JOIN")]
    EmptyIdentity,

    #[error("sender {got} does not match session identity {expected}")]
    SenderMismatch { expected: Identity, got: Identity },

    #[error("clients may not send {0:?}")]
    UnexpectedKind(MessageKind),

    #[error("{0} cannot fire while dead")]
    DeadShooter(Identity),

    #[error("melee hit on creature {npc} rejected: {reason}")]
    InvalidMelee { npc: u32, reason: &'static str },
}

/// Why a session ended.
#[derive(Debug)]
pub enum DisconnectReason {
    Left,
    TimedOut,
    SendFailed,
    Transport(ProtocolError),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Left => write!(f, "client left"),
            DisconnectReason::TimedOut => write!(f, "read timed out"),
            DisconnectReason::SendFailed => write!(f, "send loop failed"),
            DisconnectReason::Transport(e) => write!(f, "{}", e),
        }
    }
}
