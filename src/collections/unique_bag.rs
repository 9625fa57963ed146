//! A bag keyed by id where each vote is attributed to a distinct respondent

use super::{Bag, BitSet64};
use crate::zfx_id::Id;

use std::collections::{hash_map, HashMap};

/// A bag of ids where votes carry the identity of the poll respondent that cast
/// them, so that one respondent can never be counted twice for the same id.
#[derive(Debug, Clone, Default)]
pub struct UniqueBag {
    sets: HashMap<Id, BitSet64>,
}

impl UniqueBag {
    pub fn new() -> Self {
        UniqueBag { sets: HashMap::default() }
    }

    /// Attributes a vote for `id` to respondent `i`.
    pub fn add(&mut self, id: Id, i: usize) {
        self.sets.entry(id).or_insert_with(BitSet64::new).add(i);
    }

    /// Merges a whole respondent set into the entry for `id`.
    pub fn union_set(&mut self, id: Id, set: BitSet64) {
        if set.is_empty() {
            return;
        }
        self.sets.entry(id).or_insert_with(BitSet64::new).union(set);
    }

    /// Removes the respondents in `set` from the entry for `id`.
    pub fn difference_set(&mut self, id: &Id, set: BitSet64) {
        if let Some(s) = self.sets.get_mut(id) {
            s.difference(set);
        }
    }

    pub fn get_set(&self, id: &Id) -> BitSet64 {
        self.sets.get(id).cloned().unwrap_or_default()
    }

    /// The union of every respondent set in the bag.
    pub fn respondents(&self) -> BitSet64 {
        let mut all = BitSet64::new();
        for set in self.sets.values() {
            all.union(*set);
        }
        all
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Id, BitSet64> {
        self.sets.iter()
    }

    pub fn ids(&self) -> Vec<Id> {
        self.sets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }

    /// Collapses the bag into a count [Bag], keeping only the ids whose number
    /// of distinct respondents is at least `threshold`.
    pub fn bag(&self, threshold: usize) -> Bag {
        let mut bag = Bag::new();
        for (id, set) in self.sets.iter() {
            let count = set.len();
            if count >= threshold {
                bag.set_count(id.clone(), count as u64);
            }
        }
        bag
    }
}
