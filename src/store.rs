use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Current wall-clock time as UNIX epoch milliseconds. Deadlines are kept in
/// wall-clock terms because RDB files carry absolute UNIX timestamps.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Cloneable handle to the process-wide keyspace. Every connection holds a
/// clone; all access goes through `lock()`.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
    wakeup: Arc<Notify>,
}

pub struct StoreInner {
    kv: HashMap<String, Bytes>,
    /// Key deadlines. A key appears here only while it is present in `kv`.
    expirations: HashMap<String, Deadline>,
    /// Pending removals ordered by deadline. Entries whose generation no
    /// longer matches `expirations` are stale and skipped at pop time.
    queue: BinaryHeap<Reverse<QueueEntry>>,
    generation: u64,
    wakeup: Arc<Notify>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Deadline {
    at_ms: u64,
    generation: u64,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    at_ms: u64,
    generation: u64,
    key: String,
}

impl Store {
    pub fn new() -> Store {
        let wakeup = Arc::new(Notify::new());
        let inner = StoreInner {
            kv: HashMap::new(),
            expirations: HashMap::new(),
            queue: BinaryHeap::new(),
            generation: 0,
            wakeup: wakeup.clone(),
        };

        Store {
            inner: Arc::new(Mutex::new(inner)),
            wakeup,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInner {
    /// Stores a value with no expiration, replacing any prior value and
    /// clearing any prior deadline.
    pub fn set(&mut self, key: String, value: Bytes) {
        self.expirations.remove(&key);
        self.kv.insert(key, value);
    }

    /// Stores a value that expires `ttl` from now.
    pub fn set_with_ttl(&mut self, key: String, value: Bytes, ttl: Duration) {
        let at_ms = now_ms().saturating_add(ttl.as_millis() as u64);
        self.kv.insert(key.clone(), value);
        self.arm_deadline(key, at_ms);
    }

    /// Returns the live value for `key`. An expired key is removed on the
    /// spot and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        if self.expired(key) {
            self.evict(key);
            return None;
        }
        self.kv.get(key).cloned()
    }

    /// Removes `key`, returning its value if it was present and live.
    pub fn remove(&mut self, key: &str) -> Option<Bytes> {
        if self.expired(key) {
            self.evict(key);
            return None;
        }
        self.expirations.remove(key);
        self.kv.remove(key)
    }

    pub fn exists(&mut self, key: &str) -> bool {
        if self.expired(key) {
            self.evict(key);
            return false;
        }
        self.kv.contains_key(key)
    }

    /// Snapshot of all live keys; expired ones found along the way are
    /// removed.
    pub fn keys(&mut self) -> Vec<String> {
        let expired: Vec<String> = self
            .expirations
            .iter()
            .filter(|(_, deadline)| deadline.at_ms <= now_ms())
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.evict(&key);
        }

        self.kv.keys().cloned().collect()
    }

    /// Remaining time to live, if `key` is live and carries a deadline.
    pub fn get_ttl(&mut self, key: &str) -> Option<Duration> {
        if self.expired(key) {
            self.evict(key);
            return None;
        }
        self.expirations
            .get(key)
            .map(|deadline| Duration::from_millis(deadline.at_ms.saturating_sub(now_ms())))
    }

    pub fn remove_ttl(&mut self, key: &str) {
        self.expirations.remove(key);
    }

    /// Inserts a record replayed from a snapshot. Unlike the command path,
    /// duplicates are reported; the last record seen wins.
    pub fn load_record(&mut self, key: String, value: Bytes, expires_at_ms: Option<u64>) {
        if self.kv.contains_key(&key) {
            debug!(key = %key, "duplicate key in snapshot, keeping last");
        }
        match expires_at_ms {
            Some(at_ms) => {
                self.kv.insert(key.clone(), value);
                self.arm_deadline(key, at_ms);
            }
            None => self.set(key, value),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = now_ms();
        self.kv
            .keys()
            .filter(|key| {
                self.expirations
                    .get(*key)
                    .map_or(true, |deadline| deadline.at_ms > now)
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn arm_deadline(&mut self, key: String, at_ms: u64) {
        self.generation += 1;
        let generation = self.generation;

        self.expirations
            .insert(key.clone(), Deadline { at_ms, generation });

        let earliest = self.queue.peek().map(|Reverse(entry)| entry.at_ms);
        self.queue.push(Reverse(QueueEntry {
            at_ms,
            generation,
            key,
        }));

        // Re-arm the sweeper when this deadline precedes everything queued.
        if earliest.map_or(true, |e| at_ms < e) {
            self.wakeup.notify_one();
        }
    }

    fn expired(&self, key: &str) -> bool {
        self.expirations
            .get(key)
            .is_some_and(|deadline| deadline.at_ms <= now_ms())
    }

    fn evict(&mut self, key: &str) {
        self.expirations.remove(key);
        if self.kv.remove(key).is_some() {
            debug!(key = %key, "expired key removed");
        }
    }

    /// Drops every queued entry that is due, removing the keys whose
    /// deadline is still current. Returns the next pending deadline.
    fn collect_due(&mut self, now: u64) -> Option<u64> {
        loop {
            match self.queue.peek() {
                None => return None,
                Some(Reverse(entry)) if entry.at_ms > now => return Some(entry.at_ms),
                Some(_) => {}
            }

            if let Some(Reverse(entry)) = self.queue.pop() {
                // A later set without TTL, a fresher deadline, or an
                // explicit delete all invalidate this entry.
                let current = self.expirations.get(&entry.key);
                if current
                    == Some(&Deadline {
                        at_ms: entry.at_ms,
                        generation: entry.generation,
                    })
                {
                    self.evict(&entry.key);
                }
            }
        }
    }

    #[cfg(test)]
    fn contains_raw(&self, key: &str) -> bool {
        self.kv.contains_key(key)
    }
}

/// Runs the active half of the expiration contract: sleep until the
/// earliest queued deadline, then remove whatever is both due and still
/// current. The lazy half in `get` keeps semantics correct regardless of
/// scheduling latency here.
pub fn spawn_expiry_worker(store: Store) -> JoinHandle<()> {
    let wakeup = store.wakeup.clone();

    tokio::spawn(async move {
        loop {
            let next = store.lock().collect_due(now_ms());

            match next {
                Some(at_ms) => {
                    let wait = Duration::from_millis(at_ms.saturating_sub(now_ms()));
                    tokio::select! {
                        _ = sleep(wait) => {}
                        _ = wakeup.notified() => {}
                    }
                }
                None => wakeup.notified().await,
            }
        }
    })
}
