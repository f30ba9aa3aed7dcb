//! Handler table.
//!
//! Maps each refresh key to the async operation that fetches its data and
//! commits it into whatever state the hosting view owns. Handlers are expected
//! to catch recoverable failures themselves and record them in that state;
//! an `Err` is reserved for unexpected conditions.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::keys::RefreshKey;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

pub type HandlerResult = Result<(), HandlerError>;
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// A registered fetch-and-apply operation.
pub type Handler = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

/// Handlers keyed by refresh key, plus an optional privileged "force" variant
/// for one key that bypasses the backend's own rate limiting.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<RefreshKey, Handler>,
    forced: Option<(RefreshKey, Handler)>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `key`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, key: impl Into<RefreshKey>, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move || -> HandlerFuture { handler().boxed() });
        self.handlers.insert(key.into(), handler);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F, Fut>(mut self, key: impl Into<RefreshKey>, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(key, handler);
        self
    }

    /// Register the forced variant used by `refresh_all(true)` for `key`.
    ///
    /// `key` still needs a regular handler; the forced one replaces it only
    /// for forced refreshes.
    pub fn register_forced<F, Fut>(&mut self, key: impl Into<RefreshKey>, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move || -> HandlerFuture { handler().boxed() });
        self.forced = Some((key.into(), handler));
    }

    pub fn get(&self, key: &RefreshKey) -> Option<Handler> {
        self.handlers.get(key).cloned()
    }

    pub fn contains(&self, key: &RefreshKey) -> bool {
        self.handlers.contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<RefreshKey> {
        let mut keys: Vec<_> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn forced(&self) -> Option<(&RefreshKey, Handler)> {
        self.forced
            .as_ref()
            .map(|(key, handler)| (key, handler.clone()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("keys", &self.keys())
            .field("forced", &self.forced.as_ref().map(|(key, _)| key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_registered_handler_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let table = HandlerTable::new().with("positions", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let handler = table.get(&"positions".into()).unwrap();
        handler().await.unwrap();
        handler().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(table.get(&"account_summary".into()).is_none());
    }

    #[tokio::test]
    async fn test_handler_error_is_returned() {
        let table =
            HandlerTable::new().with("bridge_status", || async { Err(HandlerError::failed("boom")) });
        let handler = table.get(&"bridge_status".into()).unwrap();
        let err = handler().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_keys_sorted_and_forced_tracked() {
        let mut table = HandlerTable::new()
            .with("b", || async { Ok(()) })
            .with("a", || async { Ok(()) });
        table.register_forced("b", || async { Ok(()) });

        assert_eq!(table.keys(), vec![RefreshKey::from("a"), RefreshKey::from("b")]);
        assert_eq!(table.forced().map(|(k, _)| k.as_str()), Some("b"));
        assert_eq!(table.len(), 2);
        assert!(format!("{:?}", table).contains("forced"));
    }
}
