//! Per-connection read/dispatch/write loop.
//!
//! A session is serial: one message is read, dispatched, and (for
//! requests) replied to before the next is taken up, so replies leave in
//! the order the requests arrived. Handler and timeout failures become
//! error replies; framing and decode failures end the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use crate::message::{Codec, PatternType, RpcMessage};
use crate::metrics::Metrics;
use crate::middleware;
use crate::registry::Registry;
use crate::trace;
use crate::transport::framing::{write_frame, FrameReader};
use crate::error::RpcError;

/// Deadline applied to a request that carries no `timeoutMs`.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Shared collaborators handed to every session.
pub(crate) struct SessionContext {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

/// Drives one accepted connection until the peer closes, the session is
/// cancelled, or a protocol error occurs.
pub(crate) async fn run_session<S>(stream: S, ctx: Arc<SessionContext>, cancel: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut frames = FrameReader::new(read_half);

    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => match next {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "framing error, closing session");
                    cancel.cancel();
                    break;
                }
            },
        };

        let message = match Codec::decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "undecodable frame, closing session");
                cancel.cancel();
                break;
            }
        };

        match message.pattern_type {
            PatternType::Request => {
                if !dispatch_request(message, &ctx, &cancel, &mut write_half).await {
                    break;
                }
            }
            PatternType::Event => dispatch_event(message, &ctx).await,
        }
    }
}

/// Dispatches one request and writes its reply. Returns `false` when the
/// session should stop.
async fn dispatch_request<W>(
    mut message: RpcMessage,
    ctx: &SessionContext,
    cancel: &CancellationToken,
    writer: &mut W,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    ctx.metrics.record_request();

    let Some(handler) = ctx.registry.lookup(&message.pattern, PatternType::Request) else {
        warn!(pattern = %message.pattern, "no handler registered for request, dropping");
        return true;
    };

    let id = message.id.clone();
    let timeout_ms = message
        .timeout_ms
        .filter(|&ms| ms > 0)
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    let span = trace::start_dispatch(&message);
    trace::inject(&mut message.data, &span.context);

    let chain = ctx.registry.middleware_for(&message.pattern);
    let invocation =
        middleware::compose(&chain, handler)(message).instrument(span.span().clone());

    let reply = tokio::select! {
        _ = cancel.cancelled() => {
            // Cancelled mid-dispatch: suppress the reply and exit. The
            // span still closes with an outcome.
            span.finish_err("cancelled");
            return false;
        }
        outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), invocation) => {
            match outcome {
                Ok(Ok(value)) => {
                    span.finish_ok();
                    RpcMessage::reply(id, value)
                }
                Ok(Err(err)) => {
                    ctx.metrics.record_handler_error();
                    span.finish_err(&err.to_string());
                    warn!(error = %err, "request handler failed");
                    RpcMessage::error_reply(id, &err.to_string())
                }
                Err(_elapsed) => {
                    ctx.metrics.record_timeout();
                    span.finish_err("timeout");
                    warn!(timeout_ms, "request timed out");
                    RpcMessage::error_reply(id, &format!("Timeout after {timeout_ms}ms"))
                }
            }
        }
    };

    let encoded = match Codec::encode(&reply) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "reply could not be encoded, dropping");
            return true;
        }
    };

    if let Err(err) = write_frame(writer, &encoded).await {
        match &err {
            RpcError::Io(io) if io.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("peer went away before the reply was written");
            }
            other => {
                warn!(error = %other, "reply write failed, closing session");
            }
        }
        cancel.cancel();
        return false;
    }

    true
}

/// Runs an event through the pipeline. No reply is ever written; errors
/// are logged and swallowed.
async fn dispatch_event(mut message: RpcMessage, ctx: &SessionContext) {
    ctx.metrics.record_event();

    let Some(handler) = ctx.registry.lookup(&message.pattern, PatternType::Event) else {
        warn!(pattern = %message.pattern, "no handler registered for event, dropping");
        return;
    };

    let span = trace::start_dispatch(&message);
    trace::inject(&mut message.data, &span.context);

    let chain = ctx.registry.middleware_for(&message.pattern);
    let invocation =
        middleware::compose(&chain, handler)(message).instrument(span.span().clone());

    match invocation.await {
        Ok(_) => span.finish_ok(),
        Err(err) => {
            ctx.metrics.record_handler_error();
            span.finish_err(&err.to_string());
            warn!(error = %err, "event handler failed");
        }
    }
}
