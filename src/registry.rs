use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rmpv::Value;

use crate::message::{map_value, PatternType, HEALTH_PATTERN};
use crate::middleware::Middleware;

/// What a handler produces: an optional payload value, or an error whose
/// message travels back to the peer inside an error reply.
pub type HandlerResult = anyhow::Result<Option<Value>>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A handler is an async function from the message payload to a result.
pub type Handler = dyn Fn(Value) -> HandlerFuture + Send + Sync + 'static;

// Captured once, by whichever registry is constructed first, so every
// health handler reports the same process uptime.
static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Maps patterns to handlers for the two dispatch namespaces and holds
/// the middleware configuration.
///
/// A registry is populated before the transport starts accepting and is
/// read-only while serving; builders take `&mut self` and the server
/// wraps the finished registry in an `Arc`.
pub struct Registry {
    request_handlers: HashMap<String, Arc<Handler>>,
    event_handlers: HashMap<String, Arc<Handler>>,
    global_middleware: Vec<Arc<Middleware>>,
    handler_middleware: HashMap<String, Vec<Arc<Middleware>>>,
}

impl Registry {
    /// Creates a registry with the built-in `__health__` request handler
    /// installed.
    pub fn new() -> Self {
        let mut registry = Self {
            request_handlers: HashMap::new(),
            event_handlers: HashMap::new(),
            global_middleware: Vec::new(),
            handler_middleware: HashMap::new(),
        };

        let started = *PROCESS_START.get_or_init(Instant::now);
        registry.register_request(HEALTH_PATTERN, move |_data| async move {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            Ok(Some(map_value([
                ("status", Value::from("ok")),
                ("timestamp", Value::from(timestamp)),
                ("uptime", Value::from(started.elapsed().as_secs())),
            ])))
        });

        registry
    }

    /// Registers a request handler. The last registration for a pattern
    /// wins.
    pub fn register_request<F, Fut>(&mut self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert_request(pattern, Arc::new(move |data| Box::pin(handler(data))));
    }

    /// Registers an event handler. The last registration for a pattern
    /// wins.
    pub fn register_event<F, Fut>(&mut self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert_event(pattern, Arc::new(move |data| Box::pin(handler(data))));
    }

    /// Inserts an already-boxed request handler.
    pub fn insert_request(&mut self, pattern: impl Into<String>, handler: Arc<Handler>) {
        self.request_handlers.insert(pattern.into(), handler);
    }

    /// Inserts an already-boxed event handler.
    pub fn insert_event(&mut self, pattern: impl Into<String>, handler: Arc<Handler>) {
        self.event_handlers.insert(pattern.into(), handler);
    }

    /// Appends middleware to the global chain. Execution order is
    /// registration order, outermost first.
    pub fn use_global(&mut self, middleware: Arc<Middleware>) {
        self.global_middleware.push(middleware);
    }

    /// Replaces the per-pattern middleware list for `pattern`. Runs after
    /// the global chain, before the terminal handler.
    pub fn use_for_pattern(&mut self, pattern: impl Into<String>, chain: Vec<Arc<Middleware>>) {
        self.handler_middleware.insert(pattern.into(), chain);
    }

    pub fn lookup(&self, pattern: &str, kind: PatternType) -> Option<Arc<Handler>> {
        let handlers = match kind {
            PatternType::Request => &self.request_handlers,
            PatternType::Event => &self.event_handlers,
        };
        handlers.get(pattern).cloned()
    }

    /// Full middleware chain for a pattern: global followed by
    /// per-pattern.
    pub fn middleware_for(&self, pattern: &str) -> Vec<Arc<Middleware>> {
        let mut chain = self.global_middleware.clone();
        if let Some(per_pattern) = self.handler_middleware.get(pattern) {
            chain.extend(per_pattern.iter().cloned());
        }
        chain
    }

    /// Copies `other`'s handler maps into this registry, later wins on
    /// collision. Middleware is not transferred.
    pub fn merge(&mut self, other: Registry) {
        self.request_handlers.extend(other.request_handlers);
        self.event_handlers.extend(other.event_handlers);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
