//! Strong and weak references to atoms.
//!
//! `Handle` shares ownership of an atom through an `Arc`; the last handle
//! to drop destroys the atom. Equality, ordering and hashing are by
//! identity (allocation address), never by content; use
//! [`Handle::content_eq`] for the latter.
//!
//! `WeakHandle` is the non-owning form kept in incoming sets. It hashes by
//! the atom's type only and compares by allocation identity, which stays
//! well-defined after the referent is destroyed because a `Weak` keeps the
//! allocation (not the atom) alive.

use crate::atom::Atom;
use crate::types::Type;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

/// Owning, identity-compared reference to an atom.
#[derive(Clone, Default)]
pub struct Handle(Option<Arc<Atom>>);

/// Ordered sequence of handles (a link's outgoing set, a snapshot).
pub type HandleSeq = Vec<Handle>;

/// Ordered set of handles (the key set of a value table).
pub type HandleSet = BTreeSet<Handle>;

impl Handle {
    /// The handle that refers to no atom.
    pub const INVALID: Handle = Handle(None);

    pub(crate) fn from_arc(atom: Arc<Atom>) -> Self {
        Handle(Some(atom))
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn atom(&self) -> Option<&Atom> {
        self.0.as_deref()
    }

    /// Address of the referenced atom; 0 for `INVALID`.
    pub fn addr(&self) -> usize {
        self.0.as_ref().map_or(0, |a| Arc::as_ptr(a) as usize)
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        self.addr() == other.addr()
    }

    /// Structural (or type-overridden) equality of the referenced atoms.
    /// Two invalid handles are content-equal.
    pub fn content_eq(&self, other: &Handle) -> bool {
        match (self.atom(), other.atom()) {
            (Some(a), Some(b)) => a.content_eq(b),
            (None, None) => true,
            _ => false,
        }
    }

    pub fn downgrade(&self) -> Option<WeakHandle> {
        self.0.as_ref().map(|a| WeakHandle {
            ptr: Arc::downgrade(a),
            ty: a.atom_type(),
        })
    }

    /// Number of strong owners, 0 for `INVALID`.
    pub fn strong_count(&self) -> usize {
        self.0.as_ref().map_or(0, Arc::strong_count)
    }
}

impl Deref for Handle {
    type Target = Atom;

    /// # Panics
    ///
    /// Dereferencing `Handle::INVALID` panics, like dereferencing a null
    /// pointer; check [`Handle::is_valid`] or use [`Handle::atom`] first.
    fn deref(&self) -> &Atom {
        match &self.0 {
            Some(a) => a,
            None => panic!("dereferenced Handle::INVALID"),
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Handle {}

impl PartialOrd for Handle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Handle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.atom() {
            Some(a) => write!(f, "Handle({a})"),
            None => f.write_str("Handle::INVALID"),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.atom() {
            Some(a) => fmt::Display::fmt(a, f),
            None => f.write_str("(INVALID)"),
        }
    }
}

impl From<Arc<Atom>> for Handle {
    fn from(atom: Arc<Atom>) -> Self {
        Handle::from_arc(atom)
    }
}

/// Non-owning reference to an atom; must be upgraded before use.
#[derive(Clone)]
pub struct WeakHandle {
    ptr: Weak<Atom>,
    ty: Type,
}

impl WeakHandle {
    pub(crate) fn from_weak(ptr: Weak<Atom>, ty: Type) -> Self {
        Self { ptr, ty }
    }

    /// Strong handle if the atom is still alive.
    pub fn upgrade(&self) -> Option<Handle> {
        self.ptr.upgrade().map(Handle::from_arc)
    }

    pub fn is_expired(&self) -> bool {
        self.ptr.strong_count() == 0
    }

    /// Type recorded when the reference was taken; available after expiry.
    pub fn atom_type(&self) -> Type {
        self.ty
    }

    /// Allocation address. Remains unique while this reference exists.
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn refers_to(&self, h: &Handle) -> bool {
        self.addr() == h.addr()
    }
}

impl PartialEq for WeakHandle {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.ptr, &other.ptr)
    }
}

impl Eq for WeakHandle {}

impl Hash for WeakHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("type", &self.ty)
            .field("expired", &self.is_expired())
            .finish()
    }
}
