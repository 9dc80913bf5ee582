//! Crate-wide error type.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to callers of the atom and table APIs.
///
/// Stale incoming-set entries, duplicate incoming registrations and missing
/// values are absorbed locally and never show up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A node-only or link-only operation was invoked on the other variant.
    #[error("WrongKind: `{op}` is not defined for {type_name}")]
    WrongKind {
        op: &'static str,
        type_name: &'static str,
    },

    /// Outgoing index past the arity of a link.
    #[error("OutOfRange: index {index} for arity {arity}")]
    OutOfRange { index: usize, arity: usize },

    /// `Handle::INVALID` was passed where an atom is required.
    #[error("InvalidHandle: operation requires a live atom")]
    InvalidHandle,

    /// Type tag not present in the registry.
    #[error("UnknownType: {0}")]
    UnknownType(u16),

    /// A type name was re-declared with a different parent.
    #[error("TypeConflict: `{name}` already declared with another parent")]
    TypeConflict { name: String },

    /// Non-recursive removal refused because links still reference the atom.
    #[error("HasIncoming: atom is referenced by {count} link(s)")]
    HasIncoming { count: usize },

    /// The atom is not owned by the table the operation was issued on.
    #[error("NotInTable: atom is not owned by this table")]
    NotInTable,
}
