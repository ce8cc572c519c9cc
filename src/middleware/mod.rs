//! Middleware pipeline: ordered wrappers composed around a terminal
//! handler invocation.

pub mod auth;

use std::future::Future;
use std::sync::Arc;

use crate::message::RpcMessage;
use crate::registry::{Handler, HandlerFuture};

pub use auth::ApiKeyAuth;

/// Continuation handed to a middleware. Calling it runs the rest of the
/// chain; a middleware may call it at most once, or not at all to
/// short-circuit with its own result.
pub type Next = Box<dyn FnOnce(RpcMessage) -> HandlerFuture + Send>;

/// A middleware observes the (trace-enriched) message and decides
/// whether and with what to continue the chain.
pub type Middleware = dyn Fn(RpcMessage, Next) -> HandlerFuture + Send + Sync + 'static;

/// Wraps an async closure into a shareable [`Middleware`].
pub fn middleware<F, Fut>(f: F) -> Arc<Middleware>
where
    F: Fn(RpcMessage, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::registry::HandlerResult> + Send + 'static,
{
    Arc::new(move |message, next| Box::pin(f(message, next)))
}

/// Composes `chain` around `handler` so the first element sees the outer
/// invocation and the last element's `next` invokes the handler with the
/// message payload.
pub fn compose(chain: &[Arc<Middleware>], handler: Arc<Handler>) -> Next {
    let mut next: Next = Box::new(move |message: RpcMessage| handler(message.data));
    for layer in chain.iter().rev() {
        let layer = layer.clone();
        let inner = next;
        next = Box::new(move |message| layer(message, inner));
    }
    next
}
