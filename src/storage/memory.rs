//! In-process work-queue storage
//!
//! Mirrors the Redis semantics closely enough for tests and single-process
//! dry runs. All operations take one lock, so each is atomic.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

use super::QueueStore;
use crate::error::Result;

#[derive(Debug, Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// Memory-backed [`QueueStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a list, head first
    pub async fn list_snapshot(&self, key: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.sets.get(key).is_some_and(|s| s.contains(member)))
    }

    async fn set_len(&self, key: &str) -> Result<usize> {
        let state = self.state.lock().await;
        Ok(state.sets.get(key).map_or(0, HashSet::len))
    }

    async fn list_push(&self, key: &str, values: &[String]) -> Result<usize> {
        let mut state = self.state.lock().await;
        let list = state.lists.entry(key.to_string()).or_default();
        list.extend(values.iter().cloned());
        Ok(list.len())
    }

    async fn list_range(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .lists
            .get(key)
            .map(|l| l.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_trim_front(&self, key: &str, count: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(list) = state.lists.get_mut(key) {
            let n = count.min(list.len());
            list.drain(..n);
        }
        Ok(())
    }

    async fn list_pop_front(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        Ok(match state.lists.get_mut(key) {
            Some(list) => {
                let n = count.min(list.len());
                list.drain(..n).collect()
            }
            None => Vec::new(),
        })
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let state = self.state.lock().await;
        Ok(state.lists.get(key).map_or(0, VecDeque::len))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let hash = state.hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_add_reports_novelty() {
        let store = MemoryStore::new();
        assert!(store.set_add("s", "a").await.unwrap());
        assert!(!store.set_add("s", "a").await.unwrap());
        assert_eq!(store.set_len("s").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_range_then_trim() {
        let store = MemoryStore::new();
        let values: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        store.list_push("l", &values).await.unwrap();

        let head = store.list_range("l", 2).await.unwrap();
        assert_eq!(head, vec!["a", "b"]);

        store.list_trim_front("l", head.len()).await.unwrap();
        assert_eq!(store.list_snapshot("l").await, vec!["c"]);
    }

    #[tokio::test]
    async fn test_pop_front_more_than_available() {
        let store = MemoryStore::new();
        store.list_push("l", &["x".to_string()]).await.unwrap();
        assert_eq!(store.list_pop_front("l", 10).await.unwrap(), vec!["x"]);
        assert!(store.list_pop_front("l", 10).await.unwrap().is_empty());
        assert!(store.list_pop_front("missing", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hash_set_if_absent_first_writer_wins() {
        let store = MemoryStore::new();
        assert!(store.hash_set_if_absent("h", "f", "one").await.unwrap());
        assert!(!store.hash_set_if_absent("h", "f", "two").await.unwrap());
        assert_eq!(store.hash_get("h", "f").await.unwrap().as_deref(), Some("one"));
    }
}
