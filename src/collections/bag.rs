//! A multiset of ids with integer counts

use crate::zfx_id::Id;

use std::collections::{hash_map, HashMap};

/// A bag of ids, each with a vote count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bag {
    counts: HashMap<Id, u64>,
}

impl Bag {
    pub fn new() -> Self {
        Bag { counts: HashMap::default() }
    }

    pub fn add(&mut self, id: Id) {
        self.add_count(id, 1);
    }

    pub fn add_count(&mut self, id: Id, count: u64) {
        if count == 0 {
            return;
        }
        *self.counts.entry(id).or_insert(0) += count;
    }

    pub fn set_count(&mut self, id: Id, count: u64) {
        if count == 0 {
            let _ = self.counts.remove(&id);
        } else {
            let _ = self.counts.insert(id, count);
        }
    }

    pub fn count(&self, id: &Id) -> u64 {
        self.counts.get(id).cloned().unwrap_or(0)
    }

    /// The number of distinct ids in the bag.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Id, u64> {
        self.counts.iter()
    }

    /// Returns the ids whose count is at least `threshold`.
    pub fn threshold(&self, threshold: u64) -> Vec<Id> {
        self.counts
            .iter()
            .filter(|(_, count)| **count >= threshold)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
