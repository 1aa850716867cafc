//! Per-transaction read-path cache.
//!
//! Enumerating every instance of a configuration type often needs one
//! expensive `show running-config` scrape that several sibling reads in the
//! same transaction share. Recomputing per sibling is the default behavior;
//! this cache is the explicit opt-in for identified expensive paths.
//!
//! The cache lives on the read transaction and dies with it. It is never
//! process-global, so nothing leaks across transactions or devices.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use log::trace;
use tokio::sync::Mutex;

use crate::error::TranslateError;

/// Memoization scope for one read transaction.
///
/// Entries are keyed by requester identity. Values are stored type-erased and
/// handed back as `Arc<T>`.
#[derive(Clone, Default)]
pub struct TransactionCache {
    entries: Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl TransactionCache {
    pub fn new() -> Self {
        TransactionCache::default()
    }

    /// Returns the cached value for `requester`, computing it on first use.
    ///
    /// The internal lock is held across the computation, so within one
    /// transaction the computation runs at most once per requester even if
    /// callers race.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        requester: &str,
        compute: F,
    ) -> Result<Arc<T>, TranslateError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TranslateError>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(requester) {
            trace!("read cache hit for '{requester}'");
            return entry.clone().downcast::<T>().map_err(|_| {
                TranslateError::InternalError(format!(
                    "read cache type mismatch for requester '{requester}'"
                ))
            });
        }
        trace!("read cache miss for '{requester}', computing");
        // Failed computations are not cached; the next caller retries.
        let value = Arc::new(compute().await?);
        entries.insert(requester.to_string(), value.clone());
        Ok(value)
    }

    /// Number of cached entries (diagnostics only).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn computes_once_per_requester_per_transaction() {
        let cache = TransactionCache::new();
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_compute("vlan-ids", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![12u16, 13])
            })
            .await
            .expect("first compute");
        let second = cache
            .get_or_compute("vlan-ids", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![99u16])
            })
            .await
            .expect("cached value");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*first, vec![12, 13]);
        assert_eq!(*second, vec![12, 13]);
    }

    #[tokio::test]
    async fn new_transaction_recomputes() {
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let cache = TransactionCache::new();
            cache
                .get_or_compute("vlan-ids", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1u32)
                })
                .await
                .expect("compute");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn requesters_are_independent() {
        let cache = TransactionCache::new();
        cache
            .get_or_compute("a", || async { Ok(1u32) })
            .await
            .expect("a");
        cache
            .get_or_compute("b", || async { Ok(2u32) })
            .await
            .expect("b");
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn failed_computation_is_not_cached() {
        let cache = TransactionCache::new();
        let calls = AtomicUsize::new(0);

        let result: Result<Arc<u32>, _> = cache
            .get_or_compute("flaky", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TranslateError::InternalError("boom".to_string()))
            })
            .await;
        assert!(result.is_err());

        let value = cache
            .get_or_compute("flaky", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .await
            .expect("retry succeeds");
        assert_eq!(*value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn type_mismatch_is_an_internal_error() {
        let cache = TransactionCache::new();
        cache
            .get_or_compute("entry", || async { Ok(1u32) })
            .await
            .expect("store u32");
        let err = match cache
            .get_or_compute::<String, _, _>("entry", || async { Ok(String::new()) })
            .await
        {
            Ok(_) => panic!("type mismatch should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, TranslateError::InternalError(_)));
    }
}
