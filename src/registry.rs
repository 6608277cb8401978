//! In-flight cancellation registry: `{response_id -> cancel}`.
//!
//! Registration happens when the engine emits `response.created`; removal
//! happens on terminal event or panic. `Cancel` is idempotent — a second
//! call against the same id returns `false` rather than cancelling twice.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, response_id: impl Into<String>, token: CancellationToken) {
        self.inner.lock().await.insert(response_id.into(), token);
    }

    /// Cancels the entry for `response_id`. Returns `true` the first time,
    /// `false` on any later call (the entry is already gone or already
    /// cancelled) — a racing `Cancel`/normal-completion pair is safe because
    /// whichever wins removes the entry first.
    pub async fn cancel(&self, response_id: &str) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.remove(response_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes the entry without cancelling it — used on normal completion.
    pub async fn remove(&self, response_id: &str) {
        self.inner.lock().await.remove(response_id);
    }

    pub async fn contains(&self, response_id: &str) -> bool {
        self.inner.lock().await.contains_key(response_id)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let registry = InFlightRegistry::new();
        let token = CancellationToken::new();
        registry.register("resp_a", token.clone()).await;

        assert!(registry.cancel("resp_a").await);
        assert!(!registry.cancel("resp_a").await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn remove_does_not_cancel() {
        let registry = InFlightRegistry::new();
        let token = CancellationToken::new();
        registry.register("resp_a", token.clone()).await;

        registry.remove("resp_a").await;
        assert!(!token.is_cancelled());
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn cancel_unknown_id_returns_false() {
        let registry = InFlightRegistry::new();
        assert!(!registry.cancel("resp_missing").await);
    }

    #[tokio::test]
    async fn concurrent_cancel_and_remove_race_free() {
        let registry = InFlightRegistry::new();
        let token = CancellationToken::new();
        registry.register("resp_a", token.clone()).await;

        let r1 = registry.clone();
        let r2 = registry.clone();
        let (cancelled, ()) = tokio::join!(
            async move { r1.cancel("resp_a").await },
            async move { r2.remove("resp_a").await },
        );
        // Exactly one of the two operations observes the entry; either way
        // the registry ends up empty and no panic/deadlock occurs.
        let _ = cancelled;
        assert_eq!(registry.len().await, 0);
    }
}
