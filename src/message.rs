use rmpv::Value;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, RpcError};

/// Pattern the server stamps on every outbound reply frame.
pub const REPLY_PATTERN: &str = "REPLY";

/// Pattern of the built-in health check, registered at construction.
pub const HEALTH_PATTERN: &str = "__health__";

/// Dispatch kind of a message: requests expect exactly one reply,
/// events expect none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PatternType {
    Request = 0,
    Event = 1,
}

impl Serialize for PatternType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for PatternType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PatternTypeVisitor;

        impl Visitor<'_> for PatternTypeVisitor {
            type Value = PatternType;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("0 (request) or 1 (event)")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                match v {
                    0 => Ok(PatternType::Request),
                    1 => Ok(PatternType::Event),
                    other => Err(E::custom(format!("invalid patternType {other}"))),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("invalid patternType {v}")))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(PatternTypeVisitor)
    }
}

/// The unit of dispatch, on the wire and in memory.
///
/// Encodes as a MessagePack map with keys `id`, `pattern`, `data`,
/// `patternType`, and `timeoutMs`. `id` and `timeoutMs` are omitted
/// entirely when absent rather than encoded as nil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    /// Opaque correlation token, echoed verbatim on the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Dispatch key, matched by exact equality.
    pub pattern: String,
    /// Arbitrary payload. A map payload may carry the reserved
    /// `traceparent` key.
    #[serde(default = "nil")]
    pub data: Value,
    #[serde(rename = "patternType")]
    pub pattern_type: PatternType,
    /// Per-request deadline override in milliseconds. Ignored on events.
    #[serde(rename = "timeoutMs", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn nil() -> Value {
    Value::Nil
}

impl RpcMessage {
    pub fn request(pattern: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            pattern: pattern.into(),
            data,
            pattern_type: PatternType::Request,
            timeout_ms: None,
        }
    }

    pub fn event(pattern: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            pattern: pattern.into(),
            data,
            pattern_type: PatternType::Event,
            timeout_ms: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Builds a reply frame. A handler that produced no value yields a
    /// nil payload; an absent request id stays absent.
    pub fn reply(id: Option<String>, data: Option<Value>) -> Self {
        Self {
            id,
            pattern: REPLY_PATTERN.to_string(),
            data: data.unwrap_or(Value::Nil),
            pattern_type: PatternType::Request,
            timeout_ms: None,
        }
    }

    pub fn error_reply(id: Option<String>, message: &str) -> Self {
        Self::reply(id, Some(error_data(message)))
    }
}

/// Stateless MessagePack codec for [`RpcMessage`]. Safe to share across
/// sessions.
pub struct Codec;

impl Codec {
    pub fn encode(message: &RpcMessage) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(message).map_err(|e| RpcError::Encode(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<RpcMessage> {
        let message: RpcMessage =
            rmp_serde::from_slice(payload).map_err(|e| RpcError::Decode(e.to_string()))?;
        if message.pattern.is_empty() {
            return Err(RpcError::Decode("empty pattern".to_string()));
        }
        Ok(message)
    }
}

/// Looks up `key` in a map-shaped value. Returns `None` for any other
/// payload shape.
pub fn map_get<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    match data {
        Value::Map(entries) => entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v),
        _ => None,
    }
}

/// Builds a map-shaped value from string keys.
pub fn map_value<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
    )
}

/// The `{error: <message>}` payload carried by error replies.
pub fn error_data(message: &str) -> Value {
    map_value([("error", Value::from(message))])
}
