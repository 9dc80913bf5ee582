//! Per-atom registry of the links that reference it.
//!
//! Entries are `WeakHandle`s so a target never keeps its containers alive.
//! They are bucketed by link type, making "all links of type X pointing
//! here" proportional to the bucket rather than the whole set. Within a
//! bucket, entries are keyed by allocation address in a `HashTable`, which
//! gives uniqueness and O(1) average insert/remove.
//!
//! Expired entries are not evicted when their link dies; readers skip them.
//! The owning atom's lock guards every method here.

use crate::handle::{Handle, WeakHandle};
use crate::types::Type;
use hashbrown::hash_table::Entry;
use hashbrown::HashTable;
use std::collections::BTreeMap;

/// Point-in-time copy of (part of) an incoming set.
pub type IncomingSet = Vec<Handle>;

#[inline]
fn addr_hash(addr: usize) -> u64 {
    // Allocation addresses are aligned; multiply to push entropy into the
    // bits the table actually indexes with.
    (addr as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .rotate_left(32)
}

#[derive(Default)]
pub(crate) struct IncomingIndex {
    buckets: BTreeMap<Type, HashTable<WeakHandle>>,
}

impl IncomingIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `link`. Returns false if it was already present.
    pub(crate) fn insert(&mut self, link: WeakHandle) -> bool {
        let bucket = self
            .buckets
            .entry(link.atom_type())
            .or_insert_with(HashTable::new);
        let addr = link.addr();
        match bucket.entry(
            addr_hash(addr),
            |w| w.addr() == addr,
            |w| addr_hash(w.addr()),
        ) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(link);
                true
            }
        }
    }

    /// Unregister the link of type `ty` at `addr`. Empty buckets are pruned.
    pub(crate) fn remove(&mut self, ty: Type, addr: usize) -> bool {
        let Some(bucket) = self.buckets.get_mut(&ty) else {
            return false;
        };
        let removed = match bucket.find_entry(addr_hash(addr), |w| w.addr() == addr) {
            Ok(occupied) => {
                let _ = occupied.remove();
                true
            }
            Err(_) => false,
        };
        if bucket.is_empty() {
            self.buckets.remove(&ty);
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, ty: Type, addr: usize) -> bool {
        self.buckets
            .get(&ty)
            .and_then(|b| b.find(addr_hash(addr), |w| w.addr() == addr))
            .is_some()
    }

    /// Count of entries whose link is still alive.
    pub(crate) fn live_count(&self) -> usize {
        self.buckets
            .values()
            .flat_map(|b| b.iter())
            .filter(|w| !w.is_expired())
            .count()
    }

    /// Count of entries including expired ones.
    pub(crate) fn entry_count(&self) -> usize {
        self.buckets.values().map(HashTable::len).sum()
    }

    /// Upgrade every live entry (optionally of one type) into `out`.
    pub(crate) fn snapshot_into(&self, ty: Option<Type>, out: &mut IncomingSet) {
        match ty {
            Some(t) => {
                if let Some(bucket) = self.buckets.get(&t) {
                    out.extend(bucket.iter().filter_map(WeakHandle::upgrade));
                }
            }
            None => {
                for bucket in self.buckets.values() {
                    out.extend(bucket.iter().filter_map(WeakHandle::upgrade));
                }
            }
        }
    }

    /// Drop expired entries and empty buckets; returns how many were dropped.
    pub(crate) fn purge_expired(&mut self) -> usize {
        let before = self.entry_count();
        for bucket in self.buckets.values_mut() {
            bucket.retain(|w| !w.is_expired());
        }
        self.buckets.retain(|_, b| !b.is_empty());
        before - self.entry_count()
    }

    pub(crate) fn types(&self) -> impl Iterator<Item = Type> + '_ {
        self.buckets.keys().copied()
    }
}
