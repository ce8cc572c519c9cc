// Wire message and MessagePack codec
pub mod message;

// Error taxonomy
pub mod error;

// Pattern registry
pub mod registry;

// Middleware pipeline
pub mod middleware;

// W3C trace context propagation
pub mod trace;

// Per-connection dispatch loop
mod session;

// Traffic counters and logging setup
pub mod metrics;

// Transport layer: framing, TLS, server, shutdown wiring
pub mod transport;

// Declarative controller registration
pub mod controller;

// Minimal client
pub mod client;

// Macros
pub mod macros;

pub use client::RpcClient;
pub use controller::ControllerRoutes;
pub use error::{Result, RpcError};
pub use message::{
    error_data, map_get, map_value, Codec, PatternType, RpcMessage, HEALTH_PATTERN, REPLY_PATTERN,
};
pub use metrics::{init_logging, Metrics, MetricsSnapshot};
pub use middleware::{middleware, ApiKeyAuth, Middleware, Next};
pub use registry::{Handler, HandlerFuture, HandlerResult, Registry};
pub use session::DEFAULT_TIMEOUT_MS;
pub use trace::{TraceParent, TRACEPARENT_KEY};
pub use transport::{
    write_frame, FrameReader, Server, ServerConfig, ShutdownCoordinator, TlsConfig,
    MAX_BUFFER_SIZE, MAX_MESSAGE_SIZE, SHUTDOWN_TIMEOUT_MS,
};
