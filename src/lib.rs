//! rc-atomspace: a concurrent, in-memory hypergraph of reference-counted
//! atoms with type-bucketed incoming sets.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: atoms that can be shared freely across threads, whose content
//!   never changes, and whose reverse edges ("which links point at me?")
//!   never keep anything alive.
//! - Layers:
//!   - Handle / WeakHandle: `Arc`/`Weak` wrappers compared by identity.
//!     The last strong handle destroys the atom.
//!   - Atom (Node or Link): immutable type plus name or outgoing set; a
//!     per-atom mutex guards flags, the value table and the lazily
//!     allocated incoming index.
//!   - IncomingIndex: per-target map from link type to a hash table of
//!     weak references, keyed by allocation address.
//!   - AtomTable: keeps content unique, records ownership, installs links
//!     in their targets' incoming sets, and fires lifecycle callbacks.
//!     Its ContentIndex is a hash table of generational slot keys.
//!
//! Constraints
//! - `Send + Sync` throughout; every atom method may be called from any
//!   thread.
//! - Outgoing handles are strong and incoming entries weak, so the
//!   ownership graph is acyclic by construction.
//! - No method holds two atom locks at once. Table methods may lock atoms
//!   while holding the table lock; never the reverse.
//! - Callbacks (`foreach_incoming`, table observers) run without any
//!   lock held and may re-enter freely.
//!
//! Hashing
//! - Content hashes are computed once and cached. A link's hash folds in
//!   its children's cached hashes, so hashing a new link is O(arity).
//! - A type may replace equality and hashing for itself and its subtypes
//!   through `TypeRegistry::set_equivalence`.
//! - The table index stores each entry's hash, so rehashing never calls
//!   back into atom code.
//!
//! Reentrancy
//! - Equivalence hooks run while the table lock is held. A hook that
//!   re-enters the same table panics in debug builds instead of
//!   deadlocking; in release builds the guard compiles away.
//!
//! Notes
//! - Expired incoming entries are skipped on read rather than evicted on
//!   drop; `Atom::compact_incoming_set` purges them on demand.
//! - Values are immutable once attached; replacing one swaps the pointer.

mod atom;
mod atom_table;
mod config;
mod content_hash;
#[cfg(feature = "bench_internal")]
pub mod content_index;
#[cfg(not(feature = "bench_internal"))]
mod content_index;
#[cfg(test)]
mod content_index_proptest;
mod error;
mod handle;
mod incoming_set;
mod reentrancy;
pub mod types;
mod value;

// Public surface
pub use atom::{Atom, AtomFlags, AtomKind, Link, Node};
pub use atom_table::{AtomTable, TableId};
pub use config::TableConfig;
pub use content_hash::{ContentHash, ContentHasher, INVALID_HASH};
pub use error::{Error, Result};
pub use handle::{Handle, HandleSeq, HandleSet, WeakHandle};
pub use incoming_set::IncomingSet;
pub use reentrancy::{DebugReentrancy, ReentrancyGuard};
pub use types::{is_type, registry, Equivalence, Type, TypeRegistry};
pub use value::{truth_key, TruthValue, Value, ValuePtr, TRUTH_KEY_NAME};
