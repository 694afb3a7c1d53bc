/// A map of per-key mutexes, so unrelated keys never block each other while
/// same-key callers serialise. Used to keep concurrent `SyncService` calls
/// for one FQDN, and concurrent `IssueCertificate` calls for one
/// `(tenant, domain)`, from racing each other.
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating its mutex on first use. The map
    /// entry for `key` is never removed, which is fine: the key space here
    /// (FQDNs, tenant/domain pairs) is small and bounded by configuration.
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn same_key_serialises_concurrent_critical_sections() {
        let locks: Arc<KeyedLocks<String>> = Arc::new(KeyedLocks::new());
        let counter = Arc::new(AtomicU32::new(0));
        let max_concurrent = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("edge.example.com".to_string()).await;
                let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let _a = locks.lock("a".to_string()).await;
        // Locking a different key must not deadlock even while "a" is held.
        let _b = locks.lock("b".to_string()).await;
    }
}
