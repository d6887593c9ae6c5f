//! Remote result cache
//!
//! Accepted remote readings keyed by the SHA-256 of the encoded image, so a
//! card held still in front of the camera is not paid for twice.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::remote::RemoteVisionResponse;

struct CacheEntry {
    response: RemoteVisionResponse,
    stored_at: Instant,
}

/// Bounded, time-limited cache of accepted remote responses
pub struct RemoteCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

/// Hex SHA-256 of the image bytes sent to the remote service
pub fn image_key(image_bytes: &[u8]) -> String {
    Sha256::digest(image_bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl RemoteCache {
    /// A capacity of zero disables caching
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0 && !self.ttl.is_zero()
    }

    pub fn get(&self, key: &str) -> Option<RemoteVisionResponse> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a response, evicting expired entries and then the oldest one when full
    pub fn insert(&self, key: String, response: RemoteVisionResponse) {
        if !self.is_enabled() {
            return;
        }

        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn response(name: &str) -> RemoteVisionResponse {
        RemoteVisionResponse {
            success: true,
            card_name: name.to_string(),
            confidence: 95.0,
            diagnostic: String::new(),
        }
    }

    #[test]
    fn test_image_key_is_stable_hex() {
        let key = image_key(b"card");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, image_key(b"card"));
        assert_ne!(key, image_key(b"card2"));
        assert_eq!(
            image_key(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_get_and_insert() {
        let cache = RemoteCache::new(Duration::from_secs(60), 4);
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());

        cache.insert("a".to_string(), response("Island"));
        assert_eq!(cache.get("a").map(|r| r.card_name), Some("Island".to_string()));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = RemoteCache::new(Duration::from_millis(30), 4);
        cache.insert("a".to_string(), response("Island"));
        thread::sleep(Duration::from_millis(50));
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = RemoteCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), response("Island"));
        thread::sleep(Duration::from_millis(2));
        cache.insert("b".to_string(), response("Swamp"));
        thread::sleep(Duration::from_millis(2));
        cache.insert("c".to_string(), response("Forest"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = RemoteCache::new(Duration::from_secs(60), 0);
        assert!(!cache.is_enabled());
        cache.insert("a".to_string(), response("Island"));
        assert!(cache.get("a").is_none());
    }
}
