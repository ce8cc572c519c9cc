pub mod framing;
pub mod shutdown;
pub mod tcp;
pub mod tls;

pub use framing::{write_frame, FrameReader, MAX_BUFFER_SIZE, MAX_MESSAGE_SIZE};
pub use shutdown::ShutdownCoordinator;
pub use tcp::{Server, ServerConfig, SHUTDOWN_TIMEOUT_MS};
pub use tls::TlsConfig;
