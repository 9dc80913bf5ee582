//! AtomTable: the container that owns atoms and keeps them unique.
//!
//! A table holds at most one live atom per content. Adding an atom
//! canonicalises its outgoing set first, so every link in a table points
//! only at atoms of the same table. Insertion registers a link in its
//! targets' incoming sets; removal unregisters it.
//!
//! Locking
//! - One table mutex guards the content index. While it is held the table
//!   may lock individual atoms (table -> atom); atoms never call back into a
//!   table, so the order cannot invert.
//! - Lifecycle callbacks run after the table lock is released.
//! - Content probes may run a type's equivalence hook under the table lock.
//!   A hook that calls back into the same table would deadlock; debug builds
//!   panic instead.

use crate::atom::{AtomKind, Link, Node};
use crate::config::TableConfig;
use crate::content_index::{ContentIndex, InsertError};
use crate::error::{Error, Result};
use crate::handle::{Handle, HandleSeq};
use crate::reentrancy::{DebugReentrancy, ReentrancyGuard};
use crate::types::{self, Type};
use core::num::NonZeroU64;
use core::ops::{Deref, DerefMut};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-unique identity of a table. Atoms record it as their owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(NonZeroU64);

impl TableId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let raw = NEXT.fetch_add(1, Ordering::Relaxed);
        TableId(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Inverse of [`TableId::raw`]; 0 means "no table".
    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(TableId)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Observer = Arc<dyn Fn(&Handle) + Send + Sync>;

#[derive(Default)]
struct Observers {
    added: Vec<Observer>,
    removed: Vec<Observer>,
}

// Holding the table lock. `_mark` is declared first so the reentrancy mark
// is cleared before the mutex is released.
struct Locked<'a> {
    _mark: ReentrancyGuard<'a>,
    index: MutexGuard<'a, ContentIndex>,
}

impl Deref for Locked<'_> {
    type Target = ContentIndex;
    fn deref(&self) -> &ContentIndex {
        &self.index
    }
}

impl DerefMut for Locked<'_> {
    fn deref_mut(&mut self) -> &mut ContentIndex {
        &mut self.index
    }
}

pub struct AtomTable {
    id: TableId,
    config: TableConfig,
    index: Mutex<ContentIndex>,
    reentrancy: DebugReentrancy,
    observers: RwLock<Observers>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::with_config(TableConfig::default())
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self {
            id: TableId::next(),
            index: Mutex::new(ContentIndex::with_capacity(config.initial_capacity)),
            config,
            reentrancy: DebugReentrancy::new(),
            observers: RwLock::new(Observers::default()),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    fn lock(&self) -> Locked<'_> {
        self.reentrancy.check();
        let index = self.index.lock();
        let _mark = self.reentrancy.enter();
        Locked { _mark, index }
    }

    /// Insert `h`, or find the atom already holding its content.
    ///
    /// Returns the canonical handle. When that differs from `h`, the values
    /// attached to `h` are copied onto it.
    pub fn add(&self, h: &Handle) -> Result<Handle> {
        let atom = h.atom().ok_or(Error::InvalidHandle)?;
        if atom.owning_table() == Some(self.id) && !atom.is_marked_for_removal() {
            return Ok(h.clone());
        }

        let (canonical, inserted) = loop {
            let candidate = self.canonicalize(h)?;
            let mut index = self.lock();
            // A concurrent removal may have taken a child out after it was
            // canonicalised; canonicalise again rather than orphan the link.
            if !self.children_live(&candidate) {
                drop(index);
                tracing::trace!(table = %self.config.label, atom = %h, "child removed, retrying add");
                continue;
            }
            break match index.insert(candidate.clone()) {
                Ok(_) => {
                    candidate.unset_removal_flag();
                    candidate.set_owning_table(Some(self.id));
                    candidate.install();
                    (candidate, true)
                }
                Err(InsertError::DuplicateContent(slot)) => {
                    let existing = index.get(slot).cloned().ok_or(Error::InvalidHandle)?;
                    (existing, false)
                }
                Err(InsertError::InvalidHandle) => return Err(Error::InvalidHandle),
            };
        };

        if !canonical.ptr_eq(h) && !h.get_keys().is_empty() {
            canonical.copy_values(h)?;
            tracing::debug!(
                table = %self.config.label,
                atom = %canonical,
                "merged values into canonical atom"
            );
        }

        if inserted {
            tracing::trace!(table = %self.config.label, atom = %canonical, "added");
            let observers = self.observers.read().added.clone();
            for cb in &observers {
                cb(&canonical);
            }
        }
        Ok(canonical)
    }

    // The atom to insert in place of `h`: `h` itself when it is free and
    // already points only at this table's atoms, otherwise a fresh copy.
    fn canonicalize(&self, h: &Handle) -> Result<Handle> {
        match h.kind() {
            AtomKind::Node { name } => {
                if h.is_free() {
                    Ok(h.clone())
                } else {
                    Node::new(h.atom_type(), name.clone())
                }
            }
            AtomKind::Link { outgoing } => {
                let mut changed = false;
                let mut children = HandleSeq::with_capacity(outgoing.len());
                for child in outgoing {
                    let c = self.add(child)?;
                    changed |= !c.ptr_eq(child);
                    children.push(c);
                }
                if changed || !h.is_free() {
                    Link::new(h.atom_type(), children)
                } else {
                    Ok(h.clone())
                }
            }
        }
    }

    // Every outgoing atom is still owned here and not being removed. Must be
    // called with the table lock held; removals take the same lock.
    fn children_live(&self, h: &Handle) -> bool {
        match h.kind() {
            AtomKind::Node { .. } => true,
            AtomKind::Link { outgoing } => outgoing
                .iter()
                .all(|c| c.owning_table() == Some(self.id) && !c.is_marked_for_removal()),
        }
    }

    /// The table's atom with the same content as `h`, if any.
    pub fn get(&self, h: &Handle) -> Option<Handle> {
        let atom = h.atom()?;
        self.lock().find_handle(atom).cloned()
    }

    pub fn get_node(&self, ty: Type, name: &str) -> Option<Handle> {
        let probe = Node::new(ty, name).ok()?;
        self.get(&probe)
    }

    pub fn get_link(&self, ty: Type, outgoing: &[Handle]) -> Option<Handle> {
        let probe = Link::new(ty, outgoing.to_vec()).ok()?;
        self.get(&probe)
    }

    /// True if this exact atom is stored here.
    pub fn contains(&self, h: &Handle) -> bool {
        self.lock().contains(h)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.lock().iter().map(|(_, h)| h.clone()).collect()
    }

    pub fn handles_by_type(&self, ty: Type, include_subtypes: bool) -> Vec<Handle> {
        let mut out = self.handles();
        if include_subtypes {
            let reg = types::registry();
            out.retain(|h| reg.is_a(h.atom_type(), ty));
        } else {
            out.retain(|h| h.atom_type() == ty);
        }
        out
    }

    /// Remove `h` from the table.
    ///
    /// If links in this table still reference `h`, a non-recursive call
    /// fails with [`Error::HasIncoming`] and leaves everything in place; a
    /// recursive call removes those links first. Returns every removed
    /// atom, dependents before the atoms they point at.
    pub fn remove(&self, h: &Handle, recursive: bool) -> Result<Vec<Handle>> {
        let atom = h.atom().ok_or(Error::InvalidHandle)?;
        if atom.owning_table() != Some(self.id) {
            return Err(Error::NotInTable);
        }
        let mut removed = Vec::new();
        {
            let mut index = self.lock();
            self.remove_locked(&mut index, h, recursive, &mut removed)?;
        }
        self.notify_removed(&removed);
        Ok(removed)
    }

    fn remove_locked(
        &self,
        index: &mut ContentIndex,
        h: &Handle,
        recursive: bool,
        removed: &mut Vec<Handle>,
    ) -> Result<()> {
        // Already marked: another removal of this atom is under way.
        if h.owning_table() != Some(self.id) || !h.mark_for_removal() {
            return Ok(());
        }
        let dependents = h.incoming_set_for(self.id);
        if !dependents.is_empty() {
            if !recursive {
                h.unset_removal_flag();
                tracing::debug!(
                    table = %self.config.label,
                    atom = %h,
                    dependents = dependents.len(),
                    "removal refused"
                );
                return Err(Error::HasIncoming {
                    count: dependents.len(),
                });
            }
            for link in &dependents {
                self.remove_locked(index, link, true, removed)?;
            }
        }
        index.remove(h);
        h.uninstall();
        h.set_owning_table(None);
        tracing::trace!(table = %self.config.label, atom = %h, "removed");
        removed.push(h.clone());
        Ok(())
    }

    /// Remove every atom.
    pub fn clear(&self) {
        let drained = {
            let mut index = self.lock();
            let drained = index.drain();
            for h in &drained {
                h.mark_for_removal();
                h.uninstall();
                h.set_owning_table(None);
            }
            drained
        };
        tracing::trace!(table = %self.config.label, count = drained.len(), "cleared");
        self.notify_removed(&drained);
    }

    fn notify_removed(&self, removed: &[Handle]) {
        if removed.is_empty() {
            return;
        }
        let observers = self.observers.read().removed.clone();
        for h in removed {
            for cb in &observers {
                cb(h);
            }
        }
    }

    /// Register a callback fired once per atom newly inserted.
    pub fn on_add<F>(&self, f: F)
    where
        F: Fn(&Handle) + Send + Sync + 'static,
    {
        self.observers.write().added.push(Arc::new(f));
    }

    /// Register a callback fired once per atom removed (including by `clear`).
    pub fn on_remove<F>(&self, f: F)
    where
        F: Fn(&Handle) + Send + Sync + 'static,
    {
        self.observers.write().removed.push(Arc::new(f));
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AtomTable {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for AtomTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomTable")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ids_are_unique_and_nonzero() {
        let a = AtomTable::new();
        let b = AtomTable::new();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id().raw(), 0);
        assert_eq!(TableId::from_raw(a.id().raw()), Some(a.id()));
        assert_eq!(TableId::from_raw(0), None);
    }

    /// Invariant: an added atom records the table as its owner and a removed
    /// one returns to the free state.
    #[test]
    fn ownership_follows_membership() {
        let t = AtomTable::with_config(TableConfig::new().with_label("own"));
        let a = t.add(&Node::new(Type::CONCEPT_NODE, "a").unwrap()).unwrap();
        assert_eq!(a.owning_table(), Some(t.id()));
        assert!(a.id_string().ends_with(&format!("[{}]", t.id())));
        assert_eq!(t.remove(&a, false).unwrap(), vec![a.clone()]);
        assert!(a.is_free());
        assert!(!t.contains(&a));
        assert_eq!(t.remove(&a, false), Err(Error::NotInTable));
    }

    /// Invariant: adding a link also adds its children and wires the
    /// link into their incoming sets.
    #[test]
    fn add_installs_links() {
        let t = AtomTable::new();
        let a = Node::new(Type::CONCEPT_NODE, "a").unwrap();
        let l = t.add(&Link::new(Type::LIST_LINK, vec![a.clone()]).unwrap()).unwrap();
        assert_eq!(t.len(), 2);
        assert!(t.contains(&a));
        assert_eq!(a.incoming_set(), vec![l.clone()]);
        assert_eq!(a.incoming_set_for(t.id()), vec![l]);
    }

    #[test]
    fn drop_frees_atoms() {
        let a = Node::new(Type::CONCEPT_NODE, "a").unwrap();
        {
            let t = AtomTable::new();
            t.add(&a).unwrap();
            assert!(!a.is_free());
        }
        assert!(a.is_free());
    }
}
