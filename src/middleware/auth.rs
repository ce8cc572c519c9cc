use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use rmpv::Value;

use super::{middleware, Middleware};
use crate::message::map_get;

/// API-key middleware: rejects any message whose `data` map does not
/// carry a known `api_key`, short-circuiting with an error result.
///
/// Ships as a working example of the middleware contract; install it
/// globally or per pattern via the registry.
pub struct ApiKeyAuth {
    valid_keys: HashSet<String>,
}

impl ApiKeyAuth {
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            valid_keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn into_middleware(self) -> Arc<Middleware> {
        middleware(move |message, next| {
            let authorized = map_get(&message.data, "api_key")
                .and_then(Value::as_str)
                .is_some_and(|key| self.valid_keys.contains(key));
            async move {
                if authorized {
                    next(message).await
                } else {
                    Err(anyhow!("invalid or missing api key"))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{map_value, RpcMessage};
    use crate::middleware::compose;
    use crate::registry::Handler;

    fn echo_handler() -> Arc<Handler> {
        Arc::new(|data| Box::pin(async move { Ok(Some(data)) }))
    }

    #[tokio::test]
    async fn valid_key_passes_through() {
        let chain = vec![ApiKeyAuth::new(["secret"]).into_middleware()];
        let message = RpcMessage::request("p", map_value([("api_key", "secret".into())]));
        let result = compose(&chain, echo_handler())(message).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_key_is_rejected() {
        let chain = vec![ApiKeyAuth::new(["secret"]).into_middleware()];
        let message = RpcMessage::request("p", map_value([("other", 1.into())]));
        let err = compose(&chain, echo_handler())(message).await.unwrap_err();
        assert!(err.to_string().contains("api key"));
    }

    #[tokio::test]
    async fn wrong_key_is_rejected() {
        let chain = vec![ApiKeyAuth::new(["secret"]).into_middleware()];
        let message = RpcMessage::request("p", map_value([("api_key", "nope".into())]));
        assert!(compose(&chain, echo_handler())(message).await.is_err());
    }

    #[tokio::test]
    async fn non_map_payload_is_rejected() {
        let chain = vec![ApiKeyAuth::new(["secret"]).into_middleware()];
        let message = RpcMessage::request("p", Value::from("scalar"));
        assert!(compose(&chain, echo_handler())(message).await.is_err());
    }
}
