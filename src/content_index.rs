//! ContentIndex: content-addressed lookup with stable slots.
//!
//! Handles live in a generational `SlotMap`; a `HashTable` of slot keys,
//! hashed by each atom's content hash, provides lookup by content. The
//! hash is stored with the entry, so the table never recomputes one while
//! rehashing.
//!
//! Content probes call `Atom::content_eq`, which may run a per-type
//! equivalence hook. Everything else is identity-based.

use crate::atom::Atom;
use crate::content_hash::ContentHash;
use crate::handle::Handle;
use hashbrown::hash_table::Entry as TableEntry;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};

/// Stable reference to an index entry; stale after removal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Slot(DefaultKey);

#[derive(Debug)]
struct Entry {
    handle: Handle,
    hash: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    /// A live, content-equal atom is already indexed.
    DuplicateContent(Slot),
    InvalidHandle,
}

#[derive(Default)]
pub struct ContentIndex {
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry>, // storage using generational keys
}

/// Iterator over indexed handles.
pub struct Iter<'a> {
    it: slotmap::basic::Iter<'a, DefaultKey, Entry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Slot, &'a Handle);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(k, e)| (Slot(k), &e.handle))
    }
}

// An entry answers content probes only while it is not being removed.
fn live_match(entry: &Entry, atom: &Atom) -> bool {
    entry
        .handle
        .atom()
        .map(|a| !a.is_marked_for_removal() && a.content_eq(atom))
        .unwrap_or(false)
}

impl ContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashTable::with_capacity(capacity),
            slots: SlotMap::with_capacity_and_key(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot of a live entry content-equal to `atom`.
    pub fn find(&self, atom: &Atom) -> Option<Slot> {
        let hash = atom.get_hash();
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| live_match(e, atom))
                    .unwrap_or(false)
            })
            .map(|&k| Slot(k))
    }

    /// Handle of a live entry content-equal to `atom`.
    pub fn find_handle(&self, atom: &Atom) -> Option<&Handle> {
        self.find(atom).and_then(|s| self.get(s))
    }

    /// True if this exact atom (by identity) is indexed.
    pub fn contains(&self, handle: &Handle) -> bool {
        self.slot_of(handle).is_some()
    }

    fn slot_of(&self, handle: &Handle) -> Option<DefaultKey> {
        let atom = handle.atom()?;
        let addr = handle.addr();
        self.index
            .find(atom.get_hash(), |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.handle.addr() == addr)
                    .unwrap_or(false)
            })
            .copied()
    }

    pub fn get(&self, slot: Slot) -> Option<&Handle> {
        self.slots.get(slot.0).map(|e| &e.handle)
    }

    /// Index `handle` unless a live content-equal atom is already present.
    pub fn insert(&mut self, handle: Handle) -> Result<Slot, InsertError> {
        let Some(atom) = handle.atom() else {
            return Err(InsertError::InvalidHandle);
        };
        let hash = atom.get_hash();
        match self.index.entry(
            hash,
            |&kk| {
                self.slots
                    .get(kk)
                    .map(|e| live_match(e, atom))
                    .unwrap_or(false)
            },
            |&kk| self.slots.get(kk).map(|e| e.hash).unwrap_or(0),
        ) {
            TableEntry::Occupied(o) => Err(InsertError::DuplicateContent(Slot(*o.get()))),
            TableEntry::Vacant(v) => {
                let k = self.slots.insert(Entry { handle, hash });
                let _ = v.insert(k);
                Ok(Slot(k))
            }
        }
    }

    /// Remove this exact atom (by identity); returns the indexed handle.
    pub fn remove(&mut self, handle: &Handle) -> Option<Handle> {
        let k = self.slot_of(handle)?;

        // Remove slot
        let entry = self.slots.remove(k)?;

        // Unlink from index via occupied entry removal
        if let Ok(occupied) = self.index.find_entry(entry.hash, |&kk| kk == k) {
            let _ = occupied.remove();
        }

        Some(entry.handle)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            it: self.slots.iter(),
        }
    }

    /// Remove every entry, returning the handles.
    pub fn drain(&mut self) -> Vec<Handle> {
        self.index.clear();
        self.slots.drain().map(|(_, e)| e.handle).collect()
    }
}
