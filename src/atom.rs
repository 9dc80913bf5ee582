//! Atoms: the shared, immutable-content vertices of the hypergraph.
//!
//! An atom is either a node (a type plus a name) or a link (a type plus an
//! ordered outgoing sequence of handles). Content never changes after
//! construction. What does change lives behind a per-atom mutex: the flag
//! byte, the value table, and the lazily allocated incoming-set index.
//!
//! Locking rules
//! - Only `state` is locked. Type, content and the outgoing set are
//!   read without locking; the content hash and owning table are atomics.
//! - No method holds two atom locks at once. Operations touching several
//!   atoms (install, uninstall, copy_values) lock them one after another,
//!   so observers may briefly see a link registered in one target but not
//!   yet in another.
//! - Callbacks (`foreach_incoming`) run on a snapshot, after the lock is
//!   released.

use crate::atom_table::TableId;
use crate::content_hash::{ContentHash, ContentHasher, INVALID_HASH};
use crate::error::{Error, Result};
use crate::handle::{Handle, HandleSeq, HandleSet, WeakHandle};
use crate::incoming_set::{IncomingIndex, IncomingSet};
use crate::types::{self, Type};
use crate::value::{truth_key, TruthValue, Value, ValuePtr};
use bitflags::bitflags;
use hashbrown::HashSet;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering as MemOrdering};
use std::sync::{Arc, Weak};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AtomFlags: u8 {
        /// Logically removed; must not be returned by lookups.
        const MARKED_FOR_REMOVAL = 1 << 0;
        /// Scratch bit for traversals run by collaborators.
        const CHECKED = 1 << 1;
        /// The link is (or, while marked, was) registered in its targets'
        /// incoming sets.
        const INSTALLED = 1 << 2;
    }
}

/// The variant-specific payload.
#[derive(Debug)]
pub enum AtomKind {
    Node { name: String },
    Link { outgoing: HandleSeq },
}

#[derive(Default)]
struct AtomState {
    flags: AtomFlags,
    values: BTreeMap<Handle, ValuePtr>,
    incoming: Option<Box<IncomingIndex>>,
}

pub struct Atom {
    ty: Type,
    kind: AtomKind,
    content_hash: AtomicU64,
    owning_table: AtomicU64,
    this: Weak<Atom>,
    state: Mutex<AtomState>,
}

/// Constructor namespace for node atoms.
pub struct Node;

impl Node {
    /// Create a free-floating node. `ty` must be a node type.
    pub fn new(ty: Type, name: impl Into<String>) -> Result<Handle> {
        if !types::registry().is_node(ty) {
            return Err(Error::WrongKind {
                op: "Node::new",
                type_name: ty.name(),
            });
        }
        Ok(Atom::alloc(ty, AtomKind::Node { name: name.into() }))
    }
}

/// Constructor namespace for link atoms.
pub struct Link;

impl Link {
    /// Create a free-floating link. `ty` must be a link type and every
    /// outgoing handle must be valid. Unordered link types store their
    /// outgoing set sorted by content.
    pub fn new(ty: Type, mut outgoing: HandleSeq) -> Result<Handle> {
        let reg = types::registry();
        if !reg.is_link(ty) {
            return Err(Error::WrongKind {
                op: "Link::new",
                type_name: ty.name(),
            });
        }
        if outgoing.iter().any(|h| !h.is_valid()) {
            return Err(Error::InvalidHandle);
        }
        if reg.is_unordered(ty) {
            outgoing.sort_by(|a, b| a.content_cmp(b));
        }
        Ok(Atom::alloc(ty, AtomKind::Link { outgoing }))
    }
}

impl Atom {
    fn alloc(ty: Type, kind: AtomKind) -> Handle {
        Handle::from_arc(Arc::new_cyclic(|this| Atom {
            ty,
            kind,
            content_hash: AtomicU64::new(INVALID_HASH),
            owning_table: AtomicU64::new(0),
            this: this.clone(),
            state: Mutex::new(AtomState::default()),
        }))
    }

    // -------------------------------------------------------------------
    // Identity and content
    // -------------------------------------------------------------------

    pub fn atom_type(&self) -> Type {
        self.ty
    }

    pub fn kind(&self) -> &AtomKind {
        &self.kind
    }

    pub fn is_node(&self) -> bool {
        matches!(self.kind, AtomKind::Node { .. })
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, AtomKind::Link { .. })
    }

    /// A new strong handle to this atom. `INVALID` only while the atom is
    /// being destroyed.
    pub fn handle(&self) -> Handle {
        self.this.upgrade().map(Handle::from_arc).unwrap_or_default()
    }

    fn wrong_kind(&self, op: &'static str) -> Error {
        Error::WrongKind {
            op,
            type_name: self.ty.name(),
        }
    }

    pub fn name(&self) -> Result<&str> {
        match &self.kind {
            AtomKind::Node { name } => Ok(name),
            AtomKind::Link { .. } => Err(self.wrong_kind("name")),
        }
    }

    pub fn outgoing_set(&self) -> Result<&[Handle]> {
        match &self.kind {
            AtomKind::Link { outgoing } => Ok(outgoing),
            AtomKind::Node { .. } => Err(self.wrong_kind("outgoing_set")),
        }
    }

    pub fn arity(&self) -> Result<usize> {
        self.outgoing_set().map(<[Handle]>::len)
    }

    pub fn outgoing_atom(&self, index: usize) -> Result<&Handle> {
        let outgoing = self.outgoing_set()?;
        outgoing.get(index).ok_or(Error::OutOfRange {
            index,
            arity: outgoing.len(),
        })
    }

    /// 1 for a node; 1 plus the sizes of the outgoing atoms for a link.
    /// Shared sub-atoms are counted each time they appear.
    pub fn size(&self) -> usize {
        match &self.kind {
            AtomKind::Node { .. } => 1,
            AtomKind::Link { outgoing } => 1 + outgoing.iter().map(|h| h.size()).sum::<usize>(),
        }
    }

    /// Cached content hash, computed on first use.
    ///
    /// Concurrent first calls may both compute; they store the same value.
    pub fn get_hash(&self) -> ContentHash {
        let cached = self.content_hash.load(MemOrdering::Relaxed);
        if cached != INVALID_HASH {
            return cached;
        }
        let h = self.compute_hash();
        self.content_hash.store(h, MemOrdering::Relaxed);
        h
    }

    fn compute_hash(&self) -> ContentHash {
        match types::registry().equivalence(self.ty) {
            Some(eqv) => match (eqv.hash)(self) {
                INVALID_HASH => INVALID_HASH - 1,
                h => h,
            },
            None => self.structural_hash(),
        }
    }

    /// Hash of type plus name, or type plus arity plus outgoing hashes.
    pub fn structural_hash(&self) -> ContentHash {
        match &self.kind {
            AtomKind::Node { name } => ContentHasher::node(self.ty).update_str(name).finish(),
            AtomKind::Link { outgoing } => {
                let mut hasher = ContentHasher::link(self.ty);
                hasher.update_len(outgoing.len());
                for h in outgoing {
                    hasher.update_hash(h.get_hash());
                }
                hasher.finish()
            }
        }
    }

    /// Content equality, honouring any per-type equivalence override.
    pub fn content_eq(&self, other: &Atom) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.ty != other.ty {
            return false;
        }
        match types::registry().equivalence(self.ty) {
            Some(eqv) => (eqv.eq)(self, other),
            None => self.get_hash() == other.get_hash() && self.structural_eq(other),
        }
    }

    /// Same type and same name, or same type and pairwise content-equal
    /// outgoing sets.
    pub fn structural_eq(&self, other: &Atom) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.kind, &other.kind) {
            (AtomKind::Node { name: a }, AtomKind::Node { name: b }) => a == b,
            (AtomKind::Link { outgoing: a }, AtomKind::Link { outgoing: b }) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.content_eq(y))
            }
            _ => false,
        }
    }

    /// Total order over content: type, then nodes before links, then name
    /// or arity followed by the outgoing atoms in order.
    pub fn content_cmp(&self, other: &Atom) -> Ordering {
        if std::ptr::eq(self, other) {
            return Ordering::Equal;
        }
        self.ty
            .cmp(&other.ty)
            .then_with(|| match (&self.kind, &other.kind) {
                (AtomKind::Node { name: a }, AtomKind::Node { name: b }) => a.cmp(b),
                (AtomKind::Link { outgoing: a }, AtomKind::Link { outgoing: b }) => {
                    a.len().cmp(&b.len()).then_with(|| {
                        a.iter()
                            .zip(b)
                            .map(|(x, y)| x.content_cmp(y))
                            .find(|o| o.is_ne())
                            .unwrap_or(Ordering::Equal)
                    })
                }
                (AtomKind::Node { .. }, AtomKind::Link { .. }) => Ordering::Less,
                (AtomKind::Link { .. }, AtomKind::Node { .. }) => Ordering::Greater,
            })
    }

    // -------------------------------------------------------------------
    // Ownership and flags
    // -------------------------------------------------------------------

    pub fn owning_table(&self) -> Option<TableId> {
        TableId::from_raw(self.owning_table.load(MemOrdering::Acquire))
    }

    /// Record the containing table; `None` returns the atom to the free state.
    /// Called by the table once per insertion and once per removal.
    pub fn set_owning_table(&self, table: Option<TableId>) {
        self.owning_table
            .store(table.map_or(0, TableId::raw), MemOrdering::Release);
    }

    pub fn is_free(&self) -> bool {
        self.owning_table().is_none()
    }

    pub fn flags(&self) -> AtomFlags {
        self.state.lock().flags
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.flags().contains(AtomFlags::MARKED_FOR_REMOVAL)
    }

    /// Flag the atom as logically removed. An installed link is first
    /// unregistered from its targets, so no incoming-set snapshot taken
    /// after the flag is visible can contain it.
    ///
    /// Returns false if the atom was already marked.
    pub fn mark_for_removal(&self) -> bool {
        if self.flags().contains(AtomFlags::INSTALLED) {
            self.unregister_from_targets();
        }
        let mut st = self.state.lock();
        let newly = !st.flags.contains(AtomFlags::MARKED_FOR_REMOVAL);
        st.flags.insert(AtomFlags::MARKED_FOR_REMOVAL);
        newly
    }

    /// Abort a removal: clear the flag and, if the link was installed,
    /// register it with its targets again.
    ///
    /// Returns false if the atom was not marked.
    pub fn unset_removal_flag(&self) -> bool {
        let (was_marked, installed) = {
            let mut st = self.state.lock();
            let was = st.flags.contains(AtomFlags::MARKED_FOR_REMOVAL);
            st.flags.remove(AtomFlags::MARKED_FOR_REMOVAL);
            (was, st.flags.contains(AtomFlags::INSTALLED))
        };
        if was_marked && installed {
            self.register_in_targets();
        }
        was_marked
    }

    pub fn is_checked(&self) -> bool {
        self.flags().contains(AtomFlags::CHECKED)
    }

    pub fn set_checked(&self) {
        self.state.lock().flags.insert(AtomFlags::CHECKED);
    }

    pub fn set_unchecked(&self) {
        self.state.lock().flags.remove(AtomFlags::CHECKED);
    }

    // -------------------------------------------------------------------
    // Outgoing-set registration
    // -------------------------------------------------------------------

    /// Register this link in the incoming set of every distinct atom in its
    /// outgoing set. No-op for nodes.
    /// Idempotent: a link already installed is left alone.
    pub fn install(&self) {
        if !self.is_link() {
            return;
        }
        {
            let mut st = self.state.lock();
            if st.flags.contains(AtomFlags::INSTALLED) {
                return;
            }
            st.flags.insert(AtomFlags::INSTALLED);
        }
        self.register_in_targets();
    }

    /// Inverse of [`Atom::install`].
    pub fn uninstall(&self) {
        if !self.is_link() {
            return;
        }
        {
            let mut st = self.state.lock();
            if !st.flags.contains(AtomFlags::INSTALLED) {
                return;
            }
            st.flags.remove(AtomFlags::INSTALLED);
        }
        self.unregister_from_targets();
    }

    fn distinct_targets(&self) -> impl Iterator<Item = &Handle> {
        let outgoing: &[Handle] = match &self.kind {
            AtomKind::Link { outgoing } => outgoing,
            AtomKind::Node { .. } => &[],
        };
        let mut seen = HashSet::with_capacity(outgoing.len());
        outgoing.iter().filter(move |h| seen.insert(h.addr()))
    }

    fn register_in_targets(&self) {
        let me = WeakHandle::from_weak(self.this.clone(), self.ty);
        for target in self.distinct_targets() {
            target.insert_weak(me.clone());
        }
    }

    fn unregister_from_targets(&self) {
        let addr = self.this.as_ptr() as usize;
        for target in self.distinct_targets() {
            target.remove_weak(self.ty, addr);
        }
    }

    // -------------------------------------------------------------------
    // Incoming set
    // -------------------------------------------------------------------

    fn insert_weak(&self, link: WeakHandle) -> bool {
        let link_type = link.atom_type();
        let inserted = self
            .state
            .lock()
            .incoming
            .get_or_insert_with(|| Box::new(IncomingIndex::new()))
            .insert(link);
        if !inserted {
            tracing::warn!(
                target_atom = %self,
                link_type = %link_type,
                "duplicate incoming-set registration"
            );
        }
        inserted
    }

    fn remove_weak(&self, ty: Type, addr: usize) -> bool {
        match self.state.lock().incoming.as_mut() {
            Some(idx) => idx.remove(ty, addr),
            None => false,
        }
    }

    fn check_link<'a>(link: &'a Handle, op: &'static str) -> Result<&'a Atom> {
        let atom = link.atom().ok_or(Error::InvalidHandle)?;
        if !atom.is_link() {
            return Err(atom.wrong_kind(op));
        }
        Ok(atom)
    }

    /// Add `link` to this atom's incoming set. Returns `Ok(false)` (and logs)
    /// if it was already registered.
    pub fn insert_atom(&self, link: &Handle) -> Result<bool> {
        let atom = Self::check_link(link, "insert_atom")?;
        Ok(self.insert_weak(WeakHandle::from_weak(atom.this.clone(), atom.ty)))
    }

    /// Remove `link` from this atom's incoming set; false if it was absent.
    pub fn remove_atom(&self, link: &Handle) -> bool {
        match link.atom() {
            Some(atom) => self.remove_weak(atom.ty, link.addr()),
            None => false,
        }
    }

    /// Replace the registration of `old` with `new` under one lock
    /// acquisition, so no observer sees neither.
    pub fn swap_atom(&self, old: &Handle, new: &Handle) -> Result<()> {
        let old_atom = Self::check_link(old, "swap_atom")?;
        let new_atom = Self::check_link(new, "swap_atom")?;
        let replacement = WeakHandle::from_weak(new_atom.this.clone(), new_atom.ty);
        let mut st = self.state.lock();
        let idx = st
            .incoming
            .get_or_insert_with(|| Box::new(IncomingIndex::new()));
        idx.remove(old_atom.ty, old.addr());
        idx.insert(replacement);
        Ok(())
    }

    /// Number of live links referencing this atom.
    pub fn incoming_set_size(&self) -> usize {
        self.state
            .lock()
            .incoming
            .as_ref()
            .map_or(0, |idx| idx.live_count())
    }

    fn snapshot(&self, ty: Option<Type>) -> IncomingSet {
        let mut out = IncomingSet::new();
        if let Some(idx) = self.state.lock().incoming.as_ref() {
            idx.snapshot_into(ty, &mut out);
        }
        out
    }

    /// Every live link referencing this atom, as of the call.
    pub fn incoming_set(&self) -> IncomingSet {
        self.snapshot(None)
    }

    /// Live referencing links of exactly type `ty`.
    pub fn incoming_set_by_type(&self, ty: Type) -> IncomingSet {
        self.snapshot(Some(ty))
    }

    /// Live referencing links owned by `table` and not marked for removal.
    pub fn incoming_set_for(&self, table: TableId) -> IncomingSet {
        let mut set = self.snapshot(None);
        set.retain(|l| l.owning_table() == Some(table) && !l.is_marked_for_removal());
        set
    }

    /// Link types that currently have a bucket here.
    pub fn incoming_types(&self) -> Vec<Type> {
        self.state
            .lock()
            .incoming
            .as_ref()
            .map(|idx| idx.types().collect())
            .unwrap_or_default()
    }

    /// Call `f` on each incoming link until it returns true. Runs on a
    /// snapshot with no lock held, so `f` may touch any atom.
    pub fn foreach_incoming<F>(&self, f: F) -> bool
    where
        F: FnMut(&Handle) -> bool,
    {
        self.incoming_set().iter().any(f)
    }

    /// As [`Atom::foreach_incoming`], restricted to links of type `ty`.
    pub fn foreach_incoming_by_type<F>(&self, ty: Type, f: F) -> bool
    where
        F: FnMut(&Handle) -> bool,
    {
        self.incoming_set_by_type(ty).iter().any(f)
    }

    pub fn has_incoming_index(&self) -> bool {
        self.state.lock().incoming.is_some()
    }

    /// Allocate the incoming index now rather than on first registration.
    pub fn keep_incoming_set(&self) {
        self.state
            .lock()
            .incoming
            .get_or_insert_with(|| Box::new(IncomingIndex::new()));
    }

    /// Discard the incoming index and every registration in it.
    pub fn drop_incoming_set(&self) {
        let dropped = self.state.lock().incoming.take();
        drop(dropped);
    }

    /// Evict expired entries; returns how many were dropped.
    pub fn compact_incoming_set(&self) -> usize {
        self.state
            .lock()
            .incoming
            .as_mut()
            .map_or(0, |idx| idx.purge_expired())
    }

    // -------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------

    fn put_value(&self, key: Handle, value: Option<ValuePtr>) {
        let previous = {
            let mut st = self.state.lock();
            match value {
                Some(v) => st.values.insert(key, v),
                None => st.values.remove(&key),
            }
        };
        // Payloads may hold handles; release them outside the lock.
        drop(previous);
    }

    /// Attach `value` under `key`, or erase `key` when `value` is `None`.
    pub fn set_value(&self, key: &Handle, value: Option<ValuePtr>) -> Result<()> {
        if !key.is_valid() {
            return Err(Error::InvalidHandle);
        }
        self.put_value(key.clone(), value);
        Ok(())
    }

    pub fn get_value(&self, key: &Handle) -> Option<ValuePtr> {
        self.state.lock().values.get(key).cloned()
    }

    pub fn get_keys(&self) -> HandleSet {
        self.state.lock().values.keys().cloned().collect()
    }

    /// Copy every key/value pair of `from` onto this atom, overwriting
    /// keys present on both.
    pub fn copy_values(&self, from: &Handle) -> Result<()> {
        let source = from.atom().ok_or(Error::InvalidHandle)?;
        if std::ptr::eq(source, self) {
            return Ok(());
        }
        let pairs: Vec<(Handle, ValuePtr)> = source
            .state
            .lock()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let replaced: Vec<ValuePtr> = {
            let mut st = self.state.lock();
            pairs
                .into_iter()
                .filter_map(|(k, v)| st.values.insert(k, v))
                .collect()
        };
        drop(replaced);
        Ok(())
    }

    pub fn truth_value(&self) -> TruthValue {
        self.get_value(truth_key())
            .and_then(|v| v.as_truth())
            .unwrap_or_default()
    }

    pub fn set_truth_value(&self, tv: TruthValue) {
        self.put_value(truth_key().clone(), Some(Arc::new(Value::Truth(tv))));
    }

    /// One `key => value` line per attached value.
    pub fn values_to_string(&self) -> String {
        let pairs: Vec<(Handle, ValuePtr)> = self
            .state
            .lock()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut out = String::new();
        for (k, v) in pairs {
            let _ = writeln!(out, "{k} => {v}");
        }
        out
    }

    // -------------------------------------------------------------------
    // Text forms
    // -------------------------------------------------------------------

    /// Multi-line s-expression, children indented two spaces per level.
    pub fn to_indented_string(&self, indent: &str) -> String {
        let mut out = String::new();
        self.write_indented(&mut out, indent);
        out
    }

    fn write_indented(&self, out: &mut String, indent: &str) {
        match &self.kind {
            AtomKind::Node { name } => {
                let _ = write!(out, "{indent}({} {name:?})", self.ty);
            }
            AtomKind::Link { outgoing } => {
                let _ = write!(out, "{indent}({}", self.ty);
                let inner = format!("{indent}  ");
                for h in outgoing {
                    out.push('\n');
                    h.write_indented(out, &inner);
                }
                out.push(')');
            }
        }
    }

    /// `[content hash][owning table]`, with `-` for a free atom.
    pub fn id_string(&self) -> String {
        match self.owning_table() {
            Some(t) => format!("[{:016x}][{}]", self.get_hash(), t.raw()),
            None => format!("[{:016x}][-]", self.get_hash()),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AtomKind::Node { name } => write!(f, "({} {name:?})", self.ty),
            AtomKind::Link { outgoing } => {
                write!(f, "({}", self.ty)?;
                for h in outgoing {
                    write!(f, " {h}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom{} {self}", self.id_string())
    }
}
