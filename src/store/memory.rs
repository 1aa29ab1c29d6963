use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{ResqError, Result};
use crate::store::Store;

#[derive(Debug, Clone)]
enum Entry {
    Str(String),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

/// In-process store with Redis semantics for the commands the crate uses.
///
/// Empty lists and sets are removed, matching Redis, so `dbsize` and
/// `del` behave the same on both backends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

fn wrong_type(key: &str) -> ResqError {
    ResqError::Internal(format!(
        "WRONGTYPE operation against key {} holding the wrong kind of value",
        key
    ))
}

/// Resolve a Redis-style inclusive range against a list of `len` items.
fn clamp_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut data = self.data();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()));
        match entry {
            Entry::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let mut data = self.data();
        let (removed, now_empty) = match data.get_mut(key) {
            None => return Ok(false),
            Some(Entry::Set(set)) => (set.remove(member), set.is_empty()),
            Some(_) => return Err(wrong_type(key)),
        };
        if now_empty {
            data.remove(key);
        }
        Ok(removed)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        match self.data().get(key) {
            None => Ok(false),
            Some(Entry::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        match self.data().get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize> {
        let mut data = self.data();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        match entry {
            Entry::List(list) => {
                list.push_back(value.to_string());
                Ok(list.len())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let mut data = self.data();
        let (item, now_empty) = match data.get_mut(key) {
            None => return Ok(None),
            Some(Entry::List(list)) => {
                let item = list.pop_front();
                (item, list.is_empty())
            }
            Some(_) => return Err(wrong_type(key)),
        };
        if now_empty {
            data.remove(key);
        }
        Ok(item)
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        match self.data().get(key) {
            None => Ok(0),
            Some(Entry::List(list)) => Ok(list.len()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        match self.data().get(key) {
            None => Ok(Vec::new()),
            Some(Entry::List(list)) => Ok(match clamp_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.data().get(key) {
            None => Ok(None),
            Some(Entry::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.data()
            .insert(key.to_string(), Entry::Str(value.to_string()));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self.data().remove(key).is_some())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        let mut data = self.data();
        let current = match data.get(key) {
            None => 0,
            Some(Entry::Str(value)) => value.parse::<i64>().map_err(|_| {
                ResqError::Internal(format!("value at {} is not an integer", key))
            })?,
            Some(_) => return Err(wrong_type(key)),
        };
        let next = current.checked_add(by).ok_or_else(|| {
            ResqError::Internal(format!("increment or decrement would overflow at {}", key))
        })?;
        data.insert(key.to_string(), Entry::Str(next.to_string()));
        Ok(next)
    }

    async fn dbsize(&self) -> Result<usize> {
        Ok(self.data().len())
    }

    async fn flushdb(&self) -> Result<()> {
        self.data().clear();
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_fifo() {
        let store = MemoryStore::new();
        store.rpush("q", "1").await.unwrap();
        store.rpush("q", "2").await.unwrap();
        assert_eq!(store.llen("q").await.unwrap(), 2);
        assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.lpop("q").await.unwrap(), None);
        assert_eq!(store.dbsize().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_membership() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "a").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        assert!(store.sismember("s", "a").await.unwrap());
        assert!(store.srem("s", "a").await.unwrap());
        assert!(!store.srem("s", "a").await.unwrap());
        assert!(store.smembers("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn strings_and_counters() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());

        assert_eq!(store.incr("n", 1).await.unwrap(), 1);
        assert_eq!(store.incr("n", 4).await.unwrap(), 5);
        assert_eq!(store.get("n").await.unwrap().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn incr_overflow_is_an_error() {
        let store = MemoryStore::new();
        store.set("n", &i64::MAX.to_string()).await.unwrap();
        assert!(store.incr("n", 1).await.is_err());
        assert_eq!(
            store.get("n").await.unwrap(),
            Some(i64::MAX.to_string())
        );
    }

    #[tokio::test]
    async fn wrong_type_is_an_error() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.rpush("k", "x").await.is_err());
        assert!(store.sadd("k", "x").await.is_err());
    }

    #[tokio::test]
    async fn lrange_handles_negative_indices() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c", "d"] {
            store.rpush("l", v).await.unwrap();
        }
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(store.lrange("l", 1, 2).await.unwrap(), vec!["b", "c"]);
        assert_eq!(store.lrange("l", -2, -1).await.unwrap(), vec!["c", "d"]);
        assert_eq!(store.lrange("l", 0, 100).await.unwrap().len(), 4);
        assert!(store.lrange("l", 5, 10).await.unwrap().is_empty());
        assert!(store.lrange("missing", 0, -1).await.unwrap().is_empty());
    }
}
