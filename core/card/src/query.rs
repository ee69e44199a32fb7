//! Query adapter turning a callback-style native query into a future.

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use idcard_common::{BoxError, Error, Result};

/// Completion callback handed to a native query.
///
/// Being `FnOnce`, it can complete the query at most once.
pub type QueryCallback = Box<dyn FnOnce(std::result::Result<Value, BoxError>) + Send + 'static>;

/// Native query hook supplied by the hosting environment.
pub trait NativeQuery: Send + Sync {
    /// Start executing `query` and eventually call `callback` with the
    /// outcome.
    fn query_native(&self, query: &str, callback: QueryCallback);
}

/// Query capability exposed to callers.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Execute a native query string and return its result.
    async fn query(&self, query: &str) -> Result<Value>;
}

/// [`QueryService`] built on a [`NativeQuery`] hook.
///
/// Serializes as an empty object so it never leaks into the serialized
/// form of whatever owns it.
pub struct CallbackQueryService<N> {
    native: N,
}

impl<N: NativeQuery> CallbackQueryService<N> {
    /// Wrap a native query hook.
    pub fn new(native: N) -> Self {
        Self { native }
    }
}

#[async_trait]
impl<N: NativeQuery> QueryService for CallbackQueryService<N> {
    async fn query(&self, query: &str) -> Result<Value> {
        debug!(query, "Executing native query");

        let (tx, rx) = oneshot::channel();
        self.native.query_native(
            query,
            Box::new(move |outcome| {
                // The caller may have stopped waiting.
                let _ = tx.send(outcome);
            }),
        );

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(cause)) => Err(Error::Query(cause)),
            Err(_) => Err(Error::Query(
                "native query dropped its callback without completing".into(),
            )),
        }
    }
}

impl<N> Serialize for CallbackQueryService<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    /// Answers every query with its own text, or fails on `"fail"`.
    struct EchoQuery;

    impl NativeQuery for EchoQuery {
        fn query_native(&self, query: &str, callback: QueryCallback) {
            if query == "fail" {
                callback(Err("query rejected".into()));
            } else {
                callback(Ok(json!({ "docs": [query] })));
            }
        }
    }

    /// Completes from another task.
    struct DeferredQuery;

    impl NativeQuery for DeferredQuery {
        fn query_native(&self, query: &str, callback: QueryCallback) {
            let query = query.to_string();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                callback(Ok(Value::String(query)));
            });
        }
    }

    /// Never completes.
    struct SilentQuery;

    impl NativeQuery for SilentQuery {
        fn query_native(&self, _query: &str, callback: QueryCallback) {
            drop(callback);
        }
    }

    #[tokio::test]
    async fn test_query_resolves() {
        let service = CallbackQueryService::new(EchoQuery);
        let result = service.query(r#"{"selector":{}}"#).await.unwrap();
        assert_eq!(result, json!({ "docs": [r#"{"selector":{}}"#] }));
    }

    #[tokio::test]
    async fn test_query_error_rejects() {
        let service = CallbackQueryService::new(EchoQuery);
        let err = service.query("fail").await.unwrap_err();

        assert!(matches!(err, Error::Query(_)));
        assert_eq!(err.to_string(), "Query error: query rejected");
    }

    #[tokio::test]
    async fn test_deferred_completion() {
        let service: Arc<dyn QueryService> = Arc::new(CallbackQueryService::new(DeferredQuery));
        let result = service.query("later").await.unwrap();
        assert_eq!(result, json!("later"));
    }

    #[tokio::test]
    async fn test_dropped_callback_is_an_error() {
        let service = CallbackQueryService::new(SilentQuery);
        let err = service.query("anything").await.unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_serializes_as_empty_object() {
        let service = CallbackQueryService::new(EchoQuery);
        assert_eq!(serde_json::to_value(&service).unwrap(), json!({}));
    }
}
