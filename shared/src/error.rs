use crate::protocol::MessageKind;
use thiserror::Error;

/// Errors raised while reading, writing or decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed the stream between frames
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The envelope header itself could not be decoded
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unsupported protocol version {received} (expected {expected})")]
    VersionMismatch { received: u16, expected: u16 },

    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    #[error("payload does not match declared kind {kind:?}: {reason}")]
    PayloadMismatch { kind: MessageKind, reason: String },

    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Transport faults end the session; everything else rejects one message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionClosed
                | ProtocolError::Io(_)
                | ProtocolError::FrameTooLarge { .. }
                | ProtocolError::MalformedEnvelope(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ProtocolError::ConnectionClosed.is_fatal());
        assert!(ProtocolError::FrameTooLarge { len: 10, max: 5 }.is_fatal());
        assert!(ProtocolError::MalformedEnvelope("bad".into()).is_fatal());
        assert!(!ProtocolError::UnknownKind(99).is_fatal());
        assert!(!ProtocolError::VersionMismatch {
            received: 9,
            expected: 1
        }
        .is_fatal());
        assert!(!ProtocolError::PayloadMismatch {
            kind: MessageKind::Hit,
            reason: "short".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_error_message_formatting() {
        let err = ProtocolError::FrameTooLarge { len: 70000, max: 65536 };
        assert_eq!(
            err.to_string(),
            "frame of 70000 bytes exceeds the 65536 byte limit"
        );
        assert_eq!(
            ProtocolError::UnknownKind(42).to_string(),
            "unknown message kind 42"
        );
    }
}
