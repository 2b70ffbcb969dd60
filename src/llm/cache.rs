use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};

/// Optional response memoization for provider calls.
///
/// The cache is a performance optimization only: the pipeline must behave
/// identically with no cache configured, and cache hits contribute zero
/// token usage (nothing was billed).
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: String, value: String);
}

/// Content-addressed cache key over everything that determines a provider
/// response: model, system prompt, and every user content part (including
/// inline image data).
pub fn response_cache_key<'a>(
    model: &str,
    system: &str,
    user_parts: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(system.as_bytes());
    for part in user_parts {
        hasher.update([0u8]);
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Bounded in-memory LRU cache.
pub struct InMemoryResponseCache {
    entries: Mutex<LruCache<String, String>>,
}

impl InMemoryResponseCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl ResponseCache for InMemoryResponseCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("cache lock poisoned").get(key).cloned()
    }

    fn put(&self, key: String, value: String) {
        self.entries.lock().expect("cache lock poisoned").put(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_stable_and_content_sensitive() {
        let a = response_cache_key("model-a", "system prompt", ["image-bytes", "question"]);
        let b = response_cache_key("model-a", "system prompt", ["image-bytes", "question"]);
        assert_eq!(a, b);

        let other_model = response_cache_key("model-b", "system prompt", ["image-bytes", "question"]);
        assert_ne!(a, other_model);

        let other_part = response_cache_key("model-a", "system prompt", ["image-bytes", "other"]);
        assert_ne!(a, other_part);
    }

    #[test]
    fn test_part_boundaries_matter() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = response_cache_key("m", "s", ["ab", "c"]);
        let b = response_cache_key("m", "s", ["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_in_memory_cache_put_get_and_eviction() {
        let cache = InMemoryResponseCache::new(NonZeroUsize::new(2).unwrap());
        cache.put("k1".to_string(), "v1".to_string());
        cache.put("k2".to_string(), "v2".to_string());
        assert_eq!(cache.get("k1").as_deref(), Some("v1"));

        // k2 is now least recently used and should be evicted.
        cache.put("k3".to_string(), "v3".to_string());
        assert_eq!(cache.get("k2"), None);
        assert_eq!(cache.get("k1").as_deref(), Some("v1"));
        assert_eq!(cache.get("k3").as_deref(), Some("v3"));
    }
}
