use thiserror::Error;

/// Errors raised by the framing, codec, and transport layers.
///
/// Framing and decode errors are fatal to the session that hit them,
/// never to the server. Handler failures are not represented here; they
/// travel back to the peer inside an error reply.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("frame length {len} exceeds maximum {max} bytes")]
    InvalidLength { len: usize, max: usize },

    #[error("receive buffer grew to {size} bytes (cap {max})")]
    BufferOverflow { size: usize, max: usize },

    #[error("connection closed mid-frame with {buffered} bytes buffered")]
    IncompleteMessage { buffered: usize },

    #[error("message decode failed: {0}")]
    Decode(String),

    #[error("message encode failed: {0}")]
    Encode(String),

    #[error("TLS setup failed: {reason}")]
    Tls { reason: String },

    #[error("listen failed on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RpcError>;
