use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Short-TTL cache for account valuations, keyed by (account, day).
///
/// Shared process-local state: readers see either a fresh or a cached value,
/// never a torn one. Invalidation is cooperative — every mutator of starting
/// balance, cash transactions or realized P&L must call
/// `invalidate_account`; the cache cannot detect staleness on its own, and a
/// mutation racing a concurrent read-then-cache can lose an invalidation.
#[derive(Clone)]
pub struct ValuationCache {
    inner: Arc<Mutex<HashMap<(Uuid, NaiveDate), CacheEntry>>>,
    ttl: Duration,
}

struct CacheEntry {
    value: Decimal,
    cached_at: Instant,
}

impl ValuationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Fresh cached value for (account, day), if any. Expired entries are
    /// evicted on read.
    pub async fn get(&self, account_id: Uuid, day: NaiveDate) -> Option<Decimal> {
        let mut inner = self.inner.lock().await;
        match inner.get(&(account_id, day)) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => Some(entry.value),
            Some(_) => {
                inner.remove(&(account_id, day));
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, account_id: Uuid, day: NaiveDate, value: Decimal) {
        let mut inner = self.inner.lock().await;
        inner.insert(
            (account_id, day),
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every cached day for one account.
    pub async fn invalidate_account(&self, account_id: Uuid) {
        let mut inner = self.inner.lock().await;
        let before = inner.len();
        inner.retain(|(acct, _), _| *acct != account_id);
        let dropped = before - inner.len();
        if dropped > 0 {
            tracing::debug!(
                account = %account_id,
                dropped,
                "Valuation cache: invalidated"
            );
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
