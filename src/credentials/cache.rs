//! Single-flight credential cache.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::credentials::{Credential, CredentialSource};
use crate::error::{PipelineError, Result};

type RefreshFuture = Shared<BoxFuture<'static, std::result::Result<Credential, Arc<PipelineError>>>>;

#[derive(Default)]
struct CacheState {
    current: Option<Credential>,
    /// The in-flight refresh, tagged so a slow waiter cannot clear a
    /// newer refresh installed after its own completed.
    inflight: Option<(u64, RefreshFuture)>,
    generation: u64,
}

/// Caches an expiring credential and deduplicates concurrent refreshes.
///
/// Callers that observe an expired credential all await the same in-flight
/// refresh future, so N concurrent `get()` calls produce exactly one
/// upstream authentication request. A failed refresh fails every waiter
/// uniformly and discards the stale credential; the next `get()` starts a
/// fresh refresh.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    refresh_buffer: Duration,
    state: Mutex<CacheState>,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn CredentialSource>, refresh_buffer: Duration) -> Self {
        Self {
            source,
            refresh_buffer,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Return a valid token, refreshing through the source if needed.
    pub async fn get(&self) -> Result<String> {
        let (generation, refresh) = {
            let mut state = self.state.lock().await;

            if let Some(credential) = &state.current {
                if credential.is_valid(self.refresh_buffer, Utc::now()) {
                    return Ok(credential.token.clone());
                }
                debug!(
                    source = self.source.name(),
                    expired_at = %credential.effective_expiry(self.refresh_buffer),
                    "credential expired"
                );
                state.current = None;
            }

            match &state.inflight {
                Some((generation, refresh)) => (*generation, refresh.clone()),
                None => {
                    let source = Arc::clone(&self.source);
                    let refresh: RefreshFuture = async move {
                        source.fetch().await.map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    state.generation += 1;
                    state.inflight = Some((state.generation, refresh.clone()));
                    (state.generation, refresh)
                }
            }
        };

        let outcome = refresh.await;

        let mut state = self.state.lock().await;
        if state
            .inflight
            .as_ref()
            .is_some_and(|(current, _)| *current == generation)
        {
            state.inflight = None;
        }

        match outcome {
            Ok(credential) => {
                let token = credential.token.clone();
                state.current = Some(credential);
                Ok(token)
            }
            Err(err) => Err(PipelineError::Credential(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct CountingSource {
        fetches: AtomicUsize,
        ttl: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(ttl: Duration) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                ttl,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                ttl: Duration::seconds(60),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self) -> Result<Credential> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            // Hold the refresh open long enough for callers to pile up.
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            if self.fail {
                return Err(PipelineError::Credential("login rejected".to_string()));
            }
            Ok(Credential {
                token: format!("token-{n}"),
                issued_at: Utc::now(),
                ttl: self.ttl,
            })
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let source = Arc::new(CountingSource::new(Duration::seconds(300)));
        let cache = Arc::new(CredentialCache::new(source.clone(), Duration::seconds(30)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get().await }));
        }
        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token, "token-1");
        }

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn valid_credential_is_served_without_refresh() {
        let source = Arc::new(CountingSource::new(Duration::seconds(300)));
        let cache = CredentialCache::new(source.clone(), Duration::seconds(30));

        assert_eq!(cache.get().await.unwrap(), "token-1");
        assert_eq!(cache.get().await.unwrap(), "token-1");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_credential_triggers_refresh() {
        // ttl shorter than the refresh buffer: every get() sees it expired.
        let source = Arc::new(CountingSource::new(Duration::seconds(10)));
        let cache = CredentialCache::new(source.clone(), Duration::seconds(30));

        assert_eq!(cache.get().await.unwrap(), "token-1");
        assert_eq!(cache.get().await.unwrap(), "token-2");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_fails_all_waiters_then_retries() {
        let source = Arc::new(CountingSource::failing());
        let cache = Arc::new(CredentialCache::new(source.clone(), Duration::seconds(30)));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get().await }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(PipelineError::Credential(_))));
        }
        // All four waiters shared one failed refresh.
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        // The failure is not cached: the next call retries from scratch.
        let result = cache.get().await;
        assert!(result.is_err());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}
