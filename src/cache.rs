//! Bounded least-recently-used cache for built execution graphs.
//!
//! Graph construction resolves tools, which may be expensive; identical
//! options reuse the same graph. The cache is bounded so long-lived services
//! with many distinct option sets do not grow without limit.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::graph::ExecutionGraph;

pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug)]
pub struct GraphCache {
    inner: Mutex<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    capacity: usize,
    entries: FxHashMap<String, Arc<ExecutionGraph>>,
    /// Keys from least to most recently used.
    order: VecDeque<String>,
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl GraphCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity 0 disables caching entirely.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity,
                entries: FxHashMap::default(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<ExecutionGraph>> {
        let mut inner = self.inner.lock().expect("graph cache poisoned");
        let graph = inner.entries.get(key).cloned()?;
        inner.touch(key);
        Some(graph)
    }

    pub fn insert(&self, key: String, graph: Arc<ExecutionGraph>) {
        let mut inner = self.inner.lock().expect("graph cache poisoned");
        if inner.capacity == 0 {
            return;
        }
        if inner.entries.insert(key.clone(), graph).is_none() {
            inner.order.push_back(key);
        } else {
            inner.touch(&key);
        }
        while inner.entries.len() > inner.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("graph cache poisoned").entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let key = self.order.remove(pos).expect("position just found");
            self.order.push_back(key);
        }
    }
}
