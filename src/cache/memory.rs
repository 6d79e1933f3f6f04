use super::{Cache, CacheError, CacheResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: String,
    expires: Instant,
}

/// In-process cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    closed: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_open(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.ensure_open()?;
        let mut entries = self.entries();

        match entries.get(key) {
            Some(entry) if entry.expires > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.ensure_open()?;
        self.entries().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn close(&self) -> CacheResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.entries().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("nope").unwrap(), None);
    }

    #[test]
    fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("a").unwrap(), Some("1".to_string()));

        cache.set("a", "2", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("a").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_empty_value_is_a_hit() {
        let cache = MemoryCache::new();
        cache.set("a", "", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("a").unwrap(), Some(String::new()));
    }

    #[test]
    fn test_expired_entry() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::ZERO).unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn test_closed_cache_rejects() {
        let cache = MemoryCache::new();
        cache.close().unwrap();
        assert!(matches!(cache.get("a"), Err(CacheError::Closed)));
        assert!(matches!(
            cache.set("a", "1", Duration::from_secs(1)),
            Err(CacheError::Closed)
        ));
    }
}
