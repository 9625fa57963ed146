//! The Snowball conflict graph

use super::tx::{Status, Tx};
use super::{Error, Result};

use crate::collections::Bag;
use crate::colored::Colorize;
use crate::params::Parameters;
use crate::zfx_id::Id;

use tracing::debug;

use std::collections::{HashMap, HashSet};

/// Per-transaction Snowball state.
#[derive(Debug, Clone)]
struct TxState {
    tx: Tx,
    /// Processing transactions conflicting with this one.
    conflicts: HashSet<Id>,
    /// Total number of polls in which this transaction reached alpha.
    num_successful_polls: u32,
    /// Consecutive successful polls; resets whenever a poll misses alpha.
    confidence: u32,
    /// Poll number of the last successful poll.
    last_poll: u64,
    /// Whether this transaction has ever had a conflict. Sticky.
    rogue: bool,
}

/// The state changes produced by one poll.
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    pub accepted: Vec<Id>,
    pub rejected: Vec<Id>,
    pub preferences_changed: bool,
}

impl PollOutcome {
    /// Whether any transaction status or preference changed.
    pub fn changed(&self) -> bool {
        self.preferences_changed || !self.accepted.is_empty() || !self.rejected.is_empty()
    }
}

/// Snowball over conflict sets.
///
/// A virtuous transaction is accepted once its confidence reaches `beta1`; a
/// rogue transaction needs `beta2` and must be the preferred member of every
/// conflict set it belongs to. Accepting a transaction rejects all of its
/// processing conflicts.
pub struct ConflictGraph {
    params: Parameters,
    /// Processing transactions.
    txs: HashMap<Id, TxState>,
    accepted: HashSet<Id>,
    rejected: HashSet<Id>,
    /// Conflicts declared against transactions that have not arrived yet,
    /// keyed by the absent target.
    pending_conflicts: HashMap<Id, HashSet<Id>>,
    preferences: HashSet<Id>,
    virtuous: HashSet<Id>,
    /// Virtuous transactions still waiting for enough confidence.
    virtuous_voting: HashSet<Id>,
    poll_number: u64,
}

impl ConflictGraph {
    pub fn new(params: Parameters) -> Self {
        ConflictGraph {
            params,
            txs: HashMap::default(),
            accepted: HashSet::new(),
            rejected: HashSet::new(),
            pending_conflicts: HashMap::default(),
            preferences: HashSet::new(),
            virtuous: HashSet::new(),
            virtuous_voting: HashSet::new(),
            poll_number: 0,
        }
    }

    /// Registers a transaction and its conflict set. Registering an already
    /// known or decided transaction is a noop: the same transaction may be
    /// batched into more than one vertex.
    pub fn add(&mut self, tx: Tx) -> Result<()> {
        let id = tx.id.clone();
        if self.txs.contains_key(&id) || self.accepted.contains(&id) || self.rejected.contains(&id)
        {
            debug!("[{}] {} already known", "snowstorm".magenta(), tx);
            return Ok(());
        }

        // A conflict that has already been accepted excludes this transaction.
        if tx.conflicts.iter().any(|c| self.accepted.contains(c)) {
            debug!("[{}] {} conflicts with an accepted transaction", "snowstorm".magenta(), tx);
            let _ = self.rejected.insert(id);
            return Ok(());
        }

        // Live conflicts: declared targets that are processing, plus reverse
        // declarations made against this id before it arrived.
        let mut conflicts: HashSet<Id> =
            tx.conflicts.iter().filter(|c| self.txs.contains_key(*c)).cloned().collect();
        if let Some(reverse) = self.pending_conflicts.remove(&id) {
            conflicts.extend(reverse);
        }

        // Remember declarations against targets we have not seen.
        for target in tx.conflicts.iter() {
            if !self.txs.contains_key(target) && !self.rejected.contains(target) {
                self.pending_conflicts
                    .entry(target.clone())
                    .or_insert_with(HashSet::new)
                    .insert(id.clone());
            }
        }

        let rogue = !conflicts.is_empty();
        for neighbour in conflicts.iter() {
            if let Some(state) = self.txs.get_mut(neighbour) {
                let _ = state.conflicts.insert(id.clone());
                if !state.rogue {
                    state.rogue = true;
                    let _ = self.virtuous.remove(neighbour);
                    let _ = self.virtuous_voting.remove(neighbour);
                }
            }
        }

        if !rogue {
            let _ = self.preferences.insert(id.clone());
            let _ = self.virtuous.insert(id.clone());
            let _ = self.virtuous_voting.insert(id.clone());
        }

        let _ = self.txs.insert(
            id,
            TxState {
                tx,
                conflicts,
                num_successful_polls: 0,
                confidence: 0,
                last_poll: 0,
                rogue,
            },
        );
        Ok(())
    }

    /// Whether the transaction would be virtuous if registered now.
    pub fn is_virtuous(&self, tx: &Tx) -> bool {
        if let Some(state) = self.txs.get(&tx.id) {
            return !state.rogue;
        }
        if tx.conflicts.iter().any(|c| self.txs.contains_key(c) || self.accepted.contains(c)) {
            return false;
        }
        !self.pending_conflicts.contains_key(&tx.id)
    }

    /// The preferred members of their conflict sets.
    pub fn preferences(&self) -> &HashSet<Id> {
        &self.preferences
    }

    /// The virtuous processing transactions.
    pub fn virtuous(&self) -> &HashSet<Id> {
        &self.virtuous
    }

    /// Virtuous transactions still pending enough confidence for acceptance.
    pub fn virtuous_voting(&self) -> &HashSet<Id> {
        &self.virtuous_voting
    }

    /// The processing conflict set of a transaction.
    pub fn conflicts(&self, id: &Id) -> HashSet<Id> {
        self.txs.get(id).map(|state| state.conflicts.clone()).unwrap_or_default()
    }

    pub fn status(&self, id: &Id) -> Option<Status> {
        if self.txs.contains_key(id) {
            Some(Status::Processing)
        } else if self.accepted.contains(id) {
            Some(Status::Accepted)
        } else if self.rejected.contains(id) {
            Some(Status::Rejected)
        } else {
            None
        }
    }

    pub fn num_processing(&self) -> usize {
        self.txs.len()
    }

    /// True when no processing transactions remain.
    pub fn finalized(&self) -> bool {
        self.txs.is_empty()
    }

    /// Integrates one poll. The bag carries, per transaction, the number of
    /// distinct respondents that voted for it; entries below alpha are
    /// ignored. An empty bag still advances the poll number, which breaks
    /// every confidence chain.
    pub fn record_poll(&mut self, votes: &Bag) -> Result<PollOutcome> {
        self.poll_number += 1;
        let mut outcome = PollOutcome::default();

        let successful: Vec<Id> = votes
            .iter()
            .filter(|(id, count)| {
                **count >= self.params.alpha as u64 && self.txs.contains_key(*id)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in successful.iter() {
            let state = self.txs.get_mut(id).unwrap();
            state.num_successful_polls += 1;
            state.confidence =
                if state.last_poll + 1 == self.poll_number { state.confidence + 1 } else { 1 };
            state.last_poll = self.poll_number;
        }

        // Preference flips: a transaction takes over its conflict sets when its
        // successful-poll count strictly exceeds every conflicting one.
        for id in successful.iter() {
            if self.preferences.contains(id) {
                continue;
            }
            let (polls, conflicts) = {
                let state = self.txs.get(id).unwrap();
                (state.num_successful_polls, state.conflicts.clone())
            };
            let beats_all = conflicts.iter().all(|c| match self.txs.get(c) {
                Some(state) => state.num_successful_polls < polls,
                None => true,
            });
            if beats_all {
                let _ = self.preferences.insert(id.clone());
                for c in conflicts.iter() {
                    if self.preferences.remove(c) {
                        debug!("[{}] preference moved to {}", "snowstorm".magenta(), id);
                    }
                }
                outcome.preferences_changed = true;
            }
        }

        // Acceptance at the confidence thresholds.
        let mut accepted_now = vec![];
        for id in successful.iter() {
            let state = self.txs.get(id).unwrap();
            let threshold = if state.rogue { self.params.beta2 } else { self.params.beta1 };
            if state.confidence >= threshold && (!state.rogue || self.preferences.contains(id)) {
                accepted_now.push(id.clone());
            }
        }
        for id in accepted_now {
            self.accept_tx(id, &mut outcome)?;
        }

        Ok(outcome)
    }

    /// Stops polling for a virtuous transaction without deciding it. Used when
    /// its containing vertex has lost virtuousness at the vertex level.
    pub fn drop_virtuous_voting(&mut self, id: &Id) {
        let _ = self.virtuous_voting.remove(id);
    }

    /// Force-drops a non-decided transaction. Used when its containing vertex
    /// is being rejected; calling this for a decided transaction is a
    /// conflict-graph inconsistency.
    pub fn remove(&mut self, id: &Id) -> Result<()> {
        if self.accepted.contains(id) || self.rejected.contains(id) {
            return Err(Error::RemoveDecided(id.clone()));
        }
        let state = self.txs.remove(id).ok_or_else(|| Error::UnknownTx(id.clone()))?;
        for neighbour in state.conflicts.iter() {
            if let Some(ns) = self.txs.get_mut(neighbour) {
                let _ = ns.conflicts.remove(id);
            }
        }
        let _ = self.preferences.remove(id);
        let _ = self.virtuous.remove(id);
        let _ = self.virtuous_voting.remove(id);
        let _ = self.pending_conflicts.remove(id);
        Ok(())
    }

    fn accept_tx(&mut self, id: Id, outcome: &mut PollOutcome) -> Result<()> {
        let state = match self.txs.remove(&id) {
            Some(state) => state,
            // Already swept away by an earlier acceptance this poll.
            None => return Ok(()),
        };
        let _ = self.accepted.insert(id.clone());
        let _ = self.preferences.remove(&id);
        let _ = self.virtuous.remove(&id);
        let _ = self.virtuous_voting.remove(&id);
        let _ = self.pending_conflicts.remove(&id);
        debug!("[{}] accepted {}", "snowstorm".magenta(), id);
        outcome.accepted.push(id);

        for conflict in state.conflicts {
            self.reject_tx(conflict, outcome);
        }
        Ok(())
    }

    fn reject_tx(&mut self, id: Id, outcome: &mut PollOutcome) {
        if let Some(state) = self.txs.remove(&id) {
            let _ = self.rejected.insert(id.clone());
            let _ = self.preferences.remove(&id);
            let _ = self.virtuous.remove(&id);
            let _ = self.virtuous_voting.remove(&id);
            for neighbour in state.conflicts.iter() {
                if let Some(ns) = self.txs.get_mut(neighbour) {
                    let _ = ns.conflicts.remove(&id);
                }
            }
            debug!("[{}] rejected {}", "snowstorm".magenta(), id);
            outcome.rejected.push(id);
        }
    }
}
