use shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to server closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
