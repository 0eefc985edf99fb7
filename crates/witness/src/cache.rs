use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessCacheEntry {
    pub uid: String,
    pub attester: String,
    pub observed_at: u64,
}

/// Witness attestations issued by this process, keyed by the exact
/// `subject|controller` pair. Entries live for the process lifetime and the
/// first record for a key wins.
#[derive(Clone, Default)]
pub struct WitnessCache {
    cache: Arc<RwLock<HashMap<String, WitnessCacheEntry>>>,
}

impl WitnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(subject: &str, controller: &str) -> String {
        format!("{}|{}", subject, controller)
    }

    pub async fn lookup(&self, subject: &str, controller: &str) -> Option<WitnessCacheEntry> {
        let cache = self.cache.read().await;
        cache.get(&Self::key(subject, controller)).cloned()
    }

    /// Stores an entry unless one already exists; returns the entry that is
    /// cached for the key afterwards.
    pub async fn record(
        &self,
        subject: &str,
        controller: &str,
        uid: &str,
        attester: &str,
        observed_at: u64,
    ) -> WitnessCacheEntry {
        let mut cache = self.cache.write().await;
        match cache.entry(Self::key(subject, controller)) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => slot
                .insert(WitnessCacheEntry {
                    uid: uid.to_string(),
                    attester: attester.to_string(),
                    observed_at,
                })
                .clone(),
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_misses_until_recorded() {
        let cache = WitnessCache::new();
        assert!(cache.lookup("did:web:a.example", "did:pkh:x").await.is_none());

        cache
            .record("did:web:a.example", "did:pkh:x", "0xuid", "0xattester", 42)
            .await;
        let entry = cache
            .lookup("did:web:a.example", "did:pkh:x")
            .await
            .expect("entry should be cached");
        assert_eq!(entry.uid, "0xuid");
        assert_eq!(entry.observed_at, 42);
    }

    #[tokio::test]
    async fn first_record_wins() {
        let cache = WitnessCache::new();
        cache.record("s", "c", "0xfirst", "0xa", 1).await;
        let kept = cache.record("s", "c", "0xsecond", "0xb", 2).await;

        assert_eq!(kept.uid, "0xfirst");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn keys_are_case_sensitive() {
        let cache = WitnessCache::new();
        cache.record("did:web:example.com", "c", "0x1", "0xa", 1).await;

        assert!(cache.lookup("did:web:EXAMPLE.com", "c").await.is_none());
        assert_eq!(
            WitnessCache::key("did:web:example.com", "c"),
            "did:web:example.com|c"
        );
    }
}
