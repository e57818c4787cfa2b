use crate::utils::error::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Instant::now())
    }

    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now < self.stored_at + self.ttl
    }
}

/// 單值的行程內 TTL 快取 (token、參考資料)。
///
/// 刷新時持有鎖，同時間的呼叫者會等待同一次刷新結果，而不是各自發出請求。
/// 過期的值在刷新時直接覆寫，沒有其他淘汰策略。
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone + Send> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Option<T> {
        let slot = self.slot.lock().await;
        slot.as_ref()
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, value: T) {
        self.insert_with_ttl(value, self.ttl).await;
    }

    pub async fn insert_with_ttl(&self, value: T, ttl: Duration) {
        *self.slot.lock().await = Some(CacheEntry::new(value, ttl));
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let default_ttl = self.ttl;
        self.get_or_refresh_with_ttl(|| async move { fetch().await.map(|v| (v, default_ttl)) })
            .await
    }

    /// 與 `get_or_refresh` 相同，但由 `fetch` 決定新值的存活時間 (例如 OAuth `expires_in`)
    pub async fn get_or_refresh_with_ttl<F, Fut>(&self, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Duration)>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref().filter(|entry| entry.is_fresh()) {
            return Ok(entry.value.clone());
        }

        tracing::debug!("Cache miss, refreshing");
        let (value, ttl) = fetch().await?;
        *slot = Some(CacheEntry::new(value.clone(), ttl));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::FreightError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_entry_freshness_boundary() {
        let entry = CacheEntry::new(1, Duration::from_secs(10));
        assert!(entry.is_fresh_at(entry.stored_at));
        assert!(entry.is_fresh_at(entry.stored_at + Duration::from_secs(9)));
        assert!(!entry.is_fresh_at(entry.stored_at + Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_refresh_runs_once_while_fresh() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_refresh(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("token".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "token");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_overwritten() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert_with_ttl(1u32, Duration::ZERO).await;
        assert_eq!(cache.get().await, None);

        let value = cache.get_or_refresh(|| async { Ok(2u32) }).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(cache.get().await, Some(2));
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_cache_empty() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let result = cache
            .get_or_refresh(|| async {
                Err(FreightError::ValidationError {
                    message: "boom".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42u32)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_drops_value() {
        tokio_test::block_on(async {
            let cache = TtlCache::new(Duration::from_secs(60));
            cache.insert("abc".to_string()).await;
            assert_eq!(cache.get().await.as_deref(), Some("abc"));
            cache.invalidate().await;
            assert_eq!(cache.get().await, None);
        });
    }
}
