//! Ordered address set backed by a singly linked map with a sentinel head.
//!
//! `entries[SENTINEL]` points at the most recently pushed entry, the last entry
//! points back at [`SENTINEL`]. An entry is a member iff it maps to a non-zero
//! successor, which makes membership O(1) and removal O(1) given the predecessor.

use std::{collections::HashMap, iter::FusedIterator};

use alloy_primitives::Address;
use thiserror::Error;

use crate::constants::SENTINEL;

/// Errors raised by [`SentinelList`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SentinelListError {
    /// `init` was called on an initialized list.
    #[error("linked list already initialized")]
    AlreadyInitialized,

    /// An entry was pushed before `init`.
    #[error("linked list not initialized")]
    NotInitialized,

    /// Zero, the sentinel, or an entry whose predecessor does not match.
    #[error("invalid linked list entry {0}")]
    InvalidEntry(Address),

    /// The entry is already a member.
    #[error("entry {0} already in linked list")]
    EntryAlreadyInList(Address),

    /// A page of zero entries was requested.
    #[error("invalid page size")]
    InvalidPage,
}

/// One page of a paginated walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Entries in list order.
    pub entries: Vec<Address>,
    /// Cursor for the next page, or [`SENTINEL`] once the walk is complete.
    pub next: Address,
}

impl Page {
    /// Returns true if no further page exists.
    pub fn is_last(&self) -> bool {
        self.next == SENTINEL
    }
}

/// Ordered set of non-zero addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentinelList {
    entries: HashMap<Address, Address>,
}

impl SentinelList {
    /// Creates an uninitialized list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once `init` has linked the sentinel.
    pub fn is_initialized(&self) -> bool {
        self.entries.get(&SENTINEL).is_some_and(|next| !next.is_zero())
    }

    /// Links the sentinel to itself.
    pub fn init(&mut self) -> Result<(), SentinelListError> {
        if self.is_initialized() {
            return Err(SentinelListError::AlreadyInitialized);
        }
        self.entries.insert(SENTINEL, SENTINEL);
        Ok(())
    }

    /// Prepends `entry`.
    pub fn push(&mut self, entry: Address) -> Result<(), SentinelListError> {
        if entry.is_zero() || entry == SENTINEL {
            return Err(SentinelListError::InvalidEntry(entry));
        }
        if !self.is_initialized() {
            return Err(SentinelListError::NotInitialized);
        }
        if self.contains(entry) {
            return Err(SentinelListError::EntryAlreadyInList(entry));
        }
        let head = self.successor(SENTINEL);
        self.entries.insert(entry, head);
        self.entries.insert(SENTINEL, entry);
        Ok(())
    }

    /// Unlinks `entry`, which must directly follow `prev`.
    pub fn pop(&mut self, prev: Address, entry: Address) -> Result<(), SentinelListError> {
        if entry.is_zero() || entry == SENTINEL || self.successor(prev) != entry {
            return Err(SentinelListError::InvalidEntry(entry));
        }
        let next = self.successor(entry);
        self.entries.insert(prev, next);
        self.entries.remove(&entry);
        Ok(())
    }

    /// Removes every entry and relinks the sentinel to itself.
    pub fn pop_all(&mut self) {
        self.entries.clear();
        self.entries.insert(SENTINEL, SENTINEL);
    }

    /// Returns true if `entry` is a member.
    pub fn contains(&self, entry: Address) -> bool {
        entry != SENTINEL && !self.successor(entry).is_zero()
    }

    /// Returns the entry linked after `entry`, zero if `entry` is not linked.
    pub fn successor(&self, entry: Address) -> Address {
        self.entries.get(&entry).copied().unwrap_or_default()
    }

    /// Returns the predecessor of `entry`, which is what [`Self::pop`] expects.
    pub fn predecessor(&self, entry: Address) -> Option<Address> {
        if !self.contains(entry) {
            return None;
        }
        let mut cursor = SENTINEL;
        loop {
            let next = self.successor(cursor);
            if next == entry {
                return Some(cursor);
            }
            if next.is_zero() || next == SENTINEL {
                return None;
            }
            cursor = next;
        }
    }

    /// Lazily walks the list from the head.
    pub fn iter(&self) -> Iter<'_> {
        Iter { list: self, cursor: SENTINEL, done: false }
    }

    /// Returns up to `size` entries following `cursor`.
    ///
    /// A zero cursor starts at the head. The returned [`Page::next`] is the last
    /// entry of the page while more may follow, and [`SENTINEL`] at the end.
    pub fn entries_paginated(
        &self,
        cursor: Address,
        size: usize,
    ) -> Result<Page, SentinelListError> {
        let start = if cursor.is_zero() { SENTINEL } else { cursor };
        if start != SENTINEL && !self.contains(start) {
            return Err(SentinelListError::InvalidEntry(start));
        }
        if size == 0 {
            return Err(SentinelListError::InvalidPage);
        }

        let mut entries = Vec::new();
        let mut next = self.successor(start);
        while !next.is_zero() && next != SENTINEL && entries.len() < size {
            entries.push(next);
            next = self.successor(next);
        }
        if next != SENTINEL {
            next = entries.last().copied().unwrap_or(next);
        }

        Ok(Page { entries, next })
    }
}

/// Forward-only iterator over a [`SentinelList`].
#[derive(Debug)]
pub struct Iter<'a> {
    list: &'a SentinelList,
    cursor: Address,
    done: bool,
}

impl Iterator for Iter<'_> {
    type Item = Address;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.list.successor(self.cursor);
        if next.is_zero() || next == SENTINEL {
            self.done = true;
            return None;
        }
        self.cursor = next;
        Some(next)
    }
}

impl FusedIterator for Iter<'_> {}
