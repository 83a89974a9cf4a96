use std::collections::HashMap;
use tracing::{debug, info};

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct CacheEntry {
    count: usize,
    last_used: u64,
}

/// Word counts keyed by file name, bounded by `capacity`. A full cache evicts
/// the least recently used entry before inserting.
#[derive(Debug)]
pub struct WordCountCache {
    capacity: usize,
    clock: u64,
    entries: HashMap<String, CacheEntry>,
}

impl WordCountCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            entries: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the cached count and marks the entry most recently used.
    pub fn get(&mut self, name: &str) -> Option<usize> {
        let now = self.tick();
        let entry = self.entries.get_mut(name)?;
        entry.last_used = now;
        debug!("Cache hit for {}", name);
        Some(entry.count)
    }

    pub fn insert(&mut self, name: String, count: usize) {
        let now = self.tick();
        if let Some(entry) = self.entries.get_mut(&name) {
            entry.count = count;
            entry.last_used = now;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            name,
            CacheEntry {
                count,
                last_used: now,
            },
        );
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(name, _)| name.clone());
        if let Some(name) = oldest {
            self.entries.remove(&name);
            info!("Evicted {} from the word count cache", name);
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl Default for WordCountCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
