//! Deadline tracking for outstanding Interests.
//!
//! Two views of the same entries are kept consistent: a token-keyed map for
//! O(1) removal when Data or a Nack arrives, and a deadline-sorted map the
//! periodic scan walks from the front. Entries with equal deadlines expire
//! in insertion order.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct DeadlineIndex {
    by_token: HashMap<u64, (Instant, u64)>,
    by_deadline: BTreeMap<(Instant, u64), u64>,
    insert_seq: u64,
}

impl DeadlineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    /// Record the deadline for a token. Tokens are unique per process, so
    /// an existing entry is never silently replaced.
    pub fn insert(&mut self, token: u64, deadline: Instant) {
        debug_assert!(!self.by_token.contains_key(&token));
        let seq = self.insert_seq;
        self.insert_seq += 1;
        self.by_token.insert(token, (deadline, seq));
        self.by_deadline.insert((deadline, seq), token);
    }

    /// Remove a token from both views. Returns false if it was not present
    /// (already expired or never tracked).
    pub fn remove(&mut self, token: u64) -> bool {
        match self.by_token.remove(&token) {
            Some(key) => {
                self.by_deadline.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Remove and return every token whose deadline is at or before `now`,
    /// in (deadline, insertion) order.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<u64> {
        let mut expired = Vec::new();

        while let Some((&(deadline, seq), &token)) = self.by_deadline.iter().next() {
            if deadline > now {
                break;
            }
            self.by_deadline.remove(&(deadline, seq));
            self.by_token.remove(&token);
            expired.push(token);
        }

        expired
    }
}
