use std::collections::HashSet;

use log::debug;

use crate::error::{Error, Result};
use crate::session::SessionPersistence;

/// The authoritative ordered address list.
///
/// Insertion order drives both display and routing order. Entries are only
/// deduplicated at extraction-merge time; manual edits may introduce
/// duplicates and that is allowed. Every mutating operation mirrors the
/// resulting list to the session store before returning; a store failure is
/// swallowed inside the adapter and the in-memory list stays authoritative.
pub struct Roster {
    items: Vec<String>,
    session: SessionPersistence,
}

impl Roster {
    pub fn new(session: SessionPersistence) -> Self {
        Self {
            items: Vec::new(),
            session,
        }
    }

    /// Rebuilds the roster from previously persisted entries without
    /// writing anything back.
    pub fn restore(session: SessionPersistence, items: Vec<String>) -> Self {
        Self { items, session }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends to the end. Never fails and never deduplicates.
    pub fn add(&mut self, address: impl Into<String>) {
        self.items.push(address.into());
        self.persist();
    }

    pub fn edit_at(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        self.items[index] = text.into();
        self.persist();
        Ok(())
    }

    pub fn delete_at(&mut self, index: usize) -> Result<String> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        let removed = self.items.remove(index);
        self.persist();
        Ok(removed)
    }

    /// Removes the element at `from` and reinserts it at `to`, with `to`
    /// interpreted against the sequence after removal (splice-then-insert
    /// semantics).
    pub fn move_to(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.items.len();
        if from >= len {
            return Err(self.out_of_range(from));
        }
        if to >= len {
            return Err(self.out_of_range(to));
        }

        let item = self.items.remove(from);
        self.items.insert(to, item);
        self.persist();
        Ok(())
    }

    /// Replaces the list with the first-seen-order deduplication of
    /// `existing` followed by `new_addresses` (case-sensitive equality).
    /// The only operation with dedup semantics. Returns the new length.
    pub fn merge_from_extraction(
        &mut self,
        existing: Vec<String>,
        new_addresses: Vec<String>,
    ) -> usize {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for address in existing.into_iter().chain(new_addresses) {
            if seen.insert(address.clone()) {
                merged.push(address);
            }
        }

        self.items = merged;
        self.persist();
        self.items.len()
    }

    /// Removes every element whose value appears in `targets`. Matching is
    /// by value, so duplicate strings in the list are all removed together.
    /// Returns how many elements were removed.
    pub fn remove_batch(&mut self, targets: &[String]) -> usize {
        let targets: HashSet<&str> = targets.iter().map(String::as_str).collect();
        let before = self.items.len();
        self.items.retain(|item| !targets.contains(item.as_str()));
        let removed = before - self.items.len();
        if removed > 0 {
            debug!("removed {removed} routed address(es) from the roster");
        }
        self.persist();
        removed
    }

    fn persist(&self) {
        self.session.save_addresses(&self.items);
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::IndexOutOfRange {
            index,
            len: self.items.len(),
        }
    }
}
