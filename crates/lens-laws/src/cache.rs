//! Bounded evaluation cache keyed by value digest and law set.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::Evaluation;

/// Cache key: SHA-256 of the canonical JSON encoding plus the sorted law IDs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    digest: [u8; 32],
    law_ids: Vec<String>,
}

impl CacheKey {
    /// `law_ids` must already be sorted.
    pub(crate) fn new(value: &Value, law_ids: Vec<String>) -> Option<Self> {
        // Object keys serialize in sorted order, so this encoding is canonical.
        let encoded = serde_json::to_vec(value).ok()?;
        Some(Self {
            digest: Sha256::digest(&encoded).into(),
            law_ids,
        })
    }
}

/// FIFO-evicting map with a catalog generation stamp.
pub(crate) struct EvaluationCache {
    entries: HashMap<CacheKey, Evaluation>,
    order: VecDeque<CacheKey>,
    capacity: usize,
    generation: u64,
}

impl EvaluationCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            generation: 0,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<Evaluation> {
        self.entries.get(key).cloned()
    }

    /// Insert unless the catalog changed since `generation` was read.
    pub(crate) fn insert(&mut self, generation: u64, key: CacheKey, evaluation: Evaluation) {
        if self.capacity == 0 || generation != self.generation || self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            let _ = self.entries.remove(&oldest);
        }
        self.order.push_back(key.clone());
        let _ = self.entries.insert(key, evaluation);
    }

    /// Drop everything and start a new generation.
    pub(crate) fn invalidate(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.generation += 1;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
