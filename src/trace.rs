//! W3C Trace Context carried in-band on message payloads.
//!
//! The remote context travels as a `traceparent` string inside the
//! message `data` map, in the form `00-<32 hex>-<16 hex>-<2 hex>`.
//! Malformed values are ignored, never fatal.

use std::fmt;

use rmpv::Value;
use tracing::field::Empty;
use tracing::Span;
use uuid::Uuid;

use crate::message::{map_get, PatternType, RpcMessage};

/// Reserved key on the message `data` map.
pub const TRACEPARENT_KEY: &str = "traceparent";

const TRACEPARENT_LENGTH: usize = 55;
const SAMPLED: u8 = 0x01;

/// Parsed `traceparent` value: trace id, span id, and the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub flags: u8,
}

impl TraceParent {
    /// Starts a fresh trace with the sampled flag set.
    pub fn new_root() -> Self {
        let mut trace_id = Uuid::new_v4().into_bytes();
        trace_id[0] &= 0x7f;
        Self {
            trace_id,
            span_id: random_span_id(),
            flags: SAMPLED,
        }
    }

    /// Derives the server-side child context: same trace, new span id,
    /// sampled.
    pub fn child_of(parent: &TraceParent) -> Self {
        Self {
            trace_id: parent.trace_id,
            span_id: random_span_id(),
            flags: SAMPLED,
        }
    }

    /// Parses a `traceparent` string. Returns `None` on wrong length,
    /// wrong version, non-hex fields, or all-zero ids.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != TRACEPARENT_LENGTH {
            return None;
        }
        let mut parts = s.split('-');
        let version = parts.next()?;
        let trace_id: [u8; 16] = hex_field(parts.next()?)?;
        let span_id: [u8; 8] = hex_field(parts.next()?)?;
        let flags: [u8; 1] = hex_field(parts.next()?)?;
        if parts.next().is_some() || version != "00" {
            return None;
        }
        if trace_id.iter().all(|&b| b == 0) || span_id.iter().all(|&b| b == 0) {
            return None;
        }
        Some(Self {
            trace_id,
            span_id,
            flags: flags[0],
        })
    }

    pub fn sampled(&self) -> bool {
        self.flags & SAMPLED != 0
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "00-{}-{}-{:02x}",
            hex(&self.trace_id),
            hex(&self.span_id),
            self.flags
        )
    }
}

fn random_span_id() -> [u8; 8] {
    let bytes = Uuid::new_v4().into_bytes();
    let mut span_id = [0u8; 8];
    span_id.copy_from_slice(&bytes[..8]);
    span_id
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_field<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut out = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).ok()?;
        out[i] = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(out)
}

/// Reads a syntactically valid remote context off a map payload.
pub fn extract(data: &Value) -> Option<TraceParent> {
    TraceParent::parse(map_get(data, TRACEPARENT_KEY)?.as_str()?)
}

/// Writes `context` into a map payload, overwriting any caller-supplied
/// `traceparent` in place. Non-map payloads are left untouched.
pub fn inject(data: &mut Value, context: &TraceParent) {
    if let Value::Map(entries) = data {
        let encoded = Value::from(context.to_string());
        for (key, value) in entries.iter_mut() {
            if key.as_str() == Some(TRACEPARENT_KEY) {
                *value = encoded;
                return;
            }
        }
        entries.push((Value::from(TRACEPARENT_KEY), encoded));
    }
}

/// Span wrapper for one dispatch: created before the pipeline runs,
/// always closed with an outcome.
pub struct DispatchSpan {
    span: Span,
    /// The server-side context injected into the outbound payload.
    pub context: TraceParent,
}

/// Begins the dispatch span for `message`, parented by the extracted
/// remote context when one is present.
pub fn start_dispatch(message: &RpcMessage) -> DispatchSpan {
    let remote = extract(&message.data);
    let context = match &remote {
        Some(parent) => TraceParent::child_of(parent),
        None => TraceParent::new_root(),
    };
    let kind = match message.pattern_type {
        PatternType::Request => "server",
        PatternType::Event => "consumer",
    };
    let span = tracing::info_span!(
        "rpc",
        otel.name = %format!("rpc.{}", message.pattern),
        otel.kind = kind,
        pattern = %message.pattern,
        trace_id = %hex(&context.trace_id),
        span_id = %hex(&context.span_id),
        remote_parent = remote.is_some(),
        outcome = Empty,
        error = Empty,
    );
    DispatchSpan { span, context }
}

impl DispatchSpan {
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn finish_ok(&self) {
        self.span.record("outcome", "success");
    }

    pub fn finish_err(&self, error: &str) {
        self.span.record("outcome", "error");
        self.span.record("error", error);
    }
}
