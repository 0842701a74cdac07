// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The transposition cache: a memo of search results keyed by position.
//!
//! Many move sequences reach the same position, and the cache lets the
//! search reuse a score proven earlier instead of re-searching the subtree.
//! An entry is only ever served when its stored depth is at least the depth
//! the caller needs; a score proven to lesser depth proves nothing about a
//! deeper search. Replacement is always-replace: a colliding store wins
//! unconditionally.
//!
//! Mate-range scores never enter the cache. Their distance-to-mate component
//! is relative to the ply where the mate was found, which is meaningless at
//! the same position reached through a different number of moves.

use std::mem;

use rustc_hash::FxHashMap;

/// One memoized search result. Entries are value-copied in and out of the
/// cache; the cache owns its own storage exclusively.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Zobrist key of the position this score belongs to.
    pub key: u64,
    /// Remaining search depth the score was proven to.
    pub depth: i16,
    /// The proven score, in centipawns.
    pub score: i32,
}

/// Maps position keys to [`Entry`] values. Single-threaded by contract; the
/// search and the cache live on the same thread, so no locking happens here.
#[derive(Default)]
pub struct TranspositionTable {
    entries: FxHashMap<u64, Entry>,
}

impl TranspositionTable {
    pub fn new() -> TranspositionTable {
        TranspositionTable {
            entries: FxHashMap::default(),
        }
    }

    /// Looks up `key`, returning the stored entry only if it exists *and*
    /// was proven to at least `depth`. A shallower entry is a miss.
    pub fn find(&self, key: u64, depth: i16) -> Option<Entry> {
        match self.entries.get(&key) {
            Some(entry) if entry.key == key && entry.depth >= depth => Some(*entry),
            _ => None,
        }
    }

    /// Inserts `entry` at `key`, replacing any previous entry.
    pub fn add(&mut self, key: u64, entry: Entry) {
        self.entries.insert(key, entry);
    }

    /// Erases any entry stored at `key`.
    pub fn remove(&mut self, key: u64) {
        self.entries.remove(&key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of positions currently memoized.
    pub fn positions(&self) -> usize {
        self.entries.len()
    }

    /// Approximate memory footprint in bytes, for reporting only.
    pub fn size(&self) -> usize {
        self.positions() * mem::size_of::<(u64, Entry)>()
    }
}
