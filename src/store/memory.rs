use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::{CounterStore, StoreError, WindowCount};
use crate::metrics::TRACKED_CLIENTS;

// In-process store. Good for a single instance and for tests; every
// instance keeps its own counts, so it is not shared across replicas.
#[derive(Default)]
pub struct MemoryStore {
    hits: DashMap<String, VecDeque<u64>>, // key -> hit timestamps (ms), oldest first
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    // Remove keys whose newest hit has left the window
    pub fn purge(&self, now_ms: u64, window: Duration) -> usize {
        let window_ms = window.as_millis() as u64;
        let before = self.hits.len();
        self.hits.retain(|_, log| {
            log.back()
                .is_some_and(|&newest| now_ms.saturating_sub(newest) < window_ms)
        });
        before - self.hits.len()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn hit(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowCount, StoreError> {
        let window_ms = window.as_millis() as u64;

        // the entry guard holds the shard lock, so hits on one key are serialized
        let mut log = self.hits.entry(key.to_string()).or_default();

        while log
            .front()
            .is_some_and(|&ts| now_ms.saturating_sub(ts) >= window_ms)
        {
            log.pop_front();
        }

        // a full log refuses the hit without storing it
        let held = log.len() as u64;
        if held < limit {
            log.push_back(now_ms);
        }

        let count = WindowCount {
            count: held + 1,
            oldest_ms: log.front().copied().unwrap_or(now_ms),
        };
        drop(log);

        TRACKED_CLIENTS.set(self.hits.len() as f64);
        Ok(count)
    }
}

// Sweeper - drops idle clients so the map does not grow forever
pub async fn sweeper(store: Arc<MemoryStore>, window: Duration, sweep_interval: Duration) {
    let mut interval = interval(sweep_interval);

    tracing::info!(?sweep_interval, "memory store sweeper started");

    loop {
        interval.tick().await;

        let removed = store.purge(crate::rate_limit::now_millis(), window);
        TRACKED_CLIENTS.set(store.len() as f64);

        if removed > 0 {
            tracing::debug!(removed, remaining = store.len(), "swept idle clients");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);
    const LIMIT: u64 = 5;

    fn held(store: &MemoryStore, key: &str) -> usize {
        store.hits.get(key).map_or(0, |log| log.len())
    }

    #[tokio::test]
    async fn counts_hits_inside_the_window() {
        let store = MemoryStore::new();

        for expected in 1..=3 {
            let count = store.hit("10.0.0.1", 1_000 + expected, WINDOW, LIMIT).await.unwrap();
            assert_eq!(count.count, expected);
            assert_eq!(count.oldest_ms, 1_001);
        }
    }

    #[tokio::test]
    async fn drops_hits_once_a_full_window_has_passed() {
        let store = MemoryStore::new();
        store.hit("a", 0, WINDOW, LIMIT).await.unwrap();
        store.hit("a", 4_000, WINDOW, LIMIT).await.unwrap();

        // exactly one window after the first hit, that hit is gone
        let count = store.hit("a", 10_000, WINDOW, LIMIT).await.unwrap();
        assert_eq!(count.count, 2);
        assert_eq!(count.oldest_ms, 4_000);
    }

    #[tokio::test]
    async fn refused_hits_are_reported_but_not_recorded() {
        let store = MemoryStore::new();
        for t in 0..5 {
            store.hit("full", t, WINDOW, LIMIT).await.unwrap();
        }

        let refused = store.hit("full", 5, WINDOW, LIMIT).await.unwrap();
        assert_eq!(refused.count, LIMIT + 1);
        assert_eq!(refused.oldest_ms, 0);
        assert_eq!(held(&store, "full"), 5);
    }

    #[tokio::test]
    async fn flooding_client_never_holds_more_than_the_limit() {
        let store = MemoryStore::new();

        for i in 0..200_000u64 {
            let count = store.hit("flood", 1_000 + i / 100, WINDOW, LIMIT).await.unwrap();
            assert!(count.count <= LIMIT + 1);
            assert!(held(&store, "flood") <= LIMIT as usize);
        }
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = MemoryStore::new();
        store.hit("a", 0, WINDOW, LIMIT).await.unwrap();
        store.hit("a", 1, WINDOW, LIMIT).await.unwrap();

        let other = store.hit("b", 2, WINDOW, LIMIT).await.unwrap();
        assert_eq!(other.count, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn purge_removes_only_idle_keys() {
        let store = MemoryStore::new();
        store.hit("idle", 0, WINDOW, LIMIT).await.unwrap();
        store.hit("busy", 9_000, WINDOW, LIMIT).await.unwrap();

        let removed = store.purge(12_000, WINDOW);
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_hits_never_overshoot_the_limit() {
        let store = Arc::new(MemoryStore::new());

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.hit("shared", 500, WINDOW, 20).await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap().count <= 20 {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 20);
        assert_eq!(held(&store, "shared"), 20);
    }
}
