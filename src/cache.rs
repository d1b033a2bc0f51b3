// Per-collection TTL cache in front of a CollectionSource
//
// Each domain has its own slot. A slot's lock is held across the fetch, so
// readers arriving while a refresh is in flight wait for it and share the
// result instead of starting their own.

use crate::entities::{Domain, Record};
use crate::source::{CollectionSource, FetchError};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

struct Entry {
    fetched_at: Instant,
    rows: Arc<dyn Any + Send + Sync>,
}

pub struct CollectionCache<S> {
    source: S,
    ttl: Duration,
    slots: HashMap<Domain, Mutex<Option<Entry>>>,
}

impl<S: CollectionSource> CollectionCache<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        let slots = Domain::ALL
            .into_iter()
            .map(|domain| (domain, Mutex::new(None)))
            .collect();

        CollectionCache { source, ttl, slots }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Rows for `R`, from the slot while it is fresh, otherwise from the source.
    pub async fn get<R: Record>(&self) -> Result<Arc<Vec<R>>, FetchError> {
        self.load::<R>(false).await
    }

    /// Always fetch and replace the slot.
    pub async fn refresh<R: Record>(&self) -> Result<Arc<Vec<R>>, FetchError> {
        self.load::<R>(true).await
    }

    /// Forget the cached rows of one domain.
    pub async fn invalidate(&self, domain: Domain) {
        if let Some(slot) = self.slots.get(&domain) {
            *slot.lock().await = None;
        }
    }

    async fn load<R: Record>(&self, force: bool) -> Result<Arc<Vec<R>>, FetchError> {
        let domain = R::DOMAIN;
        let slot = &self.slots[&domain];
        let mut entry = slot.lock().await;

        if !force {
            if let Some(hit) = entry.as_ref().and_then(|e| self.fresh::<R>(e)) {
                debug!(domain = domain.as_str(), "cache hit");
                return Ok(hit);
            }
        }

        let rows = Arc::new(self.source.fetch_all::<R>().await?);
        debug!(domain = domain.as_str(), rows = rows.len(), "cache filled");
        *entry = Some(Entry {
            fetched_at: Instant::now(),
            rows: rows.clone(),
        });

        Ok(rows)
    }

    fn fresh<R: Record>(&self, entry: &Entry) -> Option<Arc<Vec<R>>> {
        if entry.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        Arc::clone(&entry.rows).downcast::<Vec<R>>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Owner, Pet};
    use crate::source::testing::FakeSource;

    fn cache() -> Arc<CollectionCache<FakeSource>> {
        Arc::new(CollectionCache::new(FakeSource::default(), DEFAULT_TTL))
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_fetches_once() {
        let cache = cache();

        cache.get::<Pet>().await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        cache.get::<Pet>().await.unwrap();

        assert_eq!(cache.source().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_slot_fetches_again() {
        let cache = cache();

        cache.get::<Pet>().await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.get::<Pet>().await.unwrap();

        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domains_have_independent_slots() {
        let cache = cache();

        cache.get::<Pet>().await.unwrap();
        cache.get::<Owner>().await.unwrap();
        cache.get::<Owner>().await.unwrap();

        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_readers_share_one_fetch() {
        let cache = cache();
        *cache.source().delay.lock().unwrap() = Some(Duration::from_millis(500));

        let (a, b) = tokio::join!(cache.get::<Pet>(), cache.get::<Pet>());

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(cache.source().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_is_not_cached() {
        let cache = cache();
        cache
            .source()
            .fail_next(FetchError::Api { status: 500, message: "boom".into() });

        assert!(cache.get::<Pet>().await.is_err());
        assert!(cache.get::<Pet>().await.is_ok());
        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_and_invalidate_bypass_ttl() {
        let cache = cache();

        cache.get::<Pet>().await.unwrap();
        cache.refresh::<Pet>().await.unwrap();
        cache.invalidate(Domain::Pets).await;
        cache.get::<Pet>().await.unwrap();

        assert_eq!(cache.source().calls(), 3);
    }
}
