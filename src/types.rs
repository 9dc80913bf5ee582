//! Atom type tags and the process-wide type registry.
//!
//! Types form a single-inheritance tree rooted at [`Type::ATOM`]. The
//! registry is the only place hierarchy questions are answered; atoms
//! carry just the 16-bit tag.

use crate::atom::Atom;
use crate::content_hash::ContentHash;
use crate::error::{Error, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::OnceLock;

/// Type tag of an atom.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Type(u16);

impl Type {
    pub const NOTYPE: Type = Type(0);
    pub const ATOM: Type = Type(1);
    pub const NODE: Type = Type(2);
    pub const LINK: Type = Type(3);
    pub const CONCEPT_NODE: Type = Type(4);
    pub const PREDICATE_NODE: Type = Type(5);
    pub const VARIABLE_NODE: Type = Type(6);
    pub const ORDERED_LINK: Type = Type(7);
    pub const UNORDERED_LINK: Type = Type(8);
    pub const LIST_LINK: Type = Type(9);
    pub const SET_LINK: Type = Type(10);
    pub const AND_LINK: Type = Type(11);
    pub const OR_LINK: Type = Type(12);
    pub const EVALUATION_LINK: Type = Type(13);
    pub const INHERITANCE_LINK: Type = Type(14);
    pub const MEMBER_LINK: Type = Type(15);
    pub const SCOPE_LINK: Type = Type(16);

    pub const fn from_raw(raw: u16) -> Self {
        Type(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Registered name, or `"UnknownType"` for a tag the registry never issued.
    pub fn name(self) -> &'static str {
        registry().name(self).unwrap_or("UnknownType")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Replacement content semantics for a type and its subtypes.
///
/// `eq` and `hash` must agree: atoms that compare equal must hash equal,
/// or the table will fail to deduplicate them.
#[derive(Copy, Clone)]
pub struct Equivalence {
    pub eq: fn(&Atom, &Atom) -> bool,
    pub hash: fn(&Atom) -> ContentHash,
}

impl fmt::Debug for Equivalence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equivalence").finish_non_exhaustive()
    }
}

struct TypeInfo {
    name: &'static str,
    parent: Type,
    equivalence: Option<Equivalence>,
}

struct Registry {
    infos: Vec<TypeInfo>,
    by_name: HashMap<&'static str, Type>,
}

// Position in this table is the raw tag value.
const BUILTINS: &[(Type, &str, Type)] = &[
    (Type::NOTYPE, "Notype", Type::NOTYPE),
    (Type::ATOM, "Atom", Type::NOTYPE),
    (Type::NODE, "Node", Type::ATOM),
    (Type::LINK, "Link", Type::ATOM),
    (Type::CONCEPT_NODE, "ConceptNode", Type::NODE),
    (Type::PREDICATE_NODE, "PredicateNode", Type::NODE),
    (Type::VARIABLE_NODE, "VariableNode", Type::NODE),
    (Type::ORDERED_LINK, "OrderedLink", Type::LINK),
    (Type::UNORDERED_LINK, "UnorderedLink", Type::LINK),
    (Type::LIST_LINK, "ListLink", Type::ORDERED_LINK),
    (Type::SET_LINK, "SetLink", Type::UNORDERED_LINK),
    (Type::AND_LINK, "AndLink", Type::UNORDERED_LINK),
    (Type::OR_LINK, "OrLink", Type::UNORDERED_LINK),
    (Type::EVALUATION_LINK, "EvaluationLink", Type::ORDERED_LINK),
    (Type::INHERITANCE_LINK, "InheritanceLink", Type::ORDERED_LINK),
    (Type::MEMBER_LINK, "MemberLink", Type::ORDERED_LINK),
    (Type::SCOPE_LINK, "ScopeLink", Type::ORDERED_LINK),
];

/// Process-wide mapping from type tags to names and parents.
pub struct TypeRegistry {
    inner: RwLock<Registry>,
}

impl TypeRegistry {
    fn with_builtins() -> Self {
        let mut infos = Vec::with_capacity(BUILTINS.len());
        let mut by_name = HashMap::with_capacity(BUILTINS.len());
        for &(t, name, parent) in BUILTINS {
            debug_assert_eq!(t.raw() as usize, infos.len());
            infos.push(TypeInfo {
                name,
                parent,
                equivalence: None,
            });
            by_name.insert(name, t);
        }
        Self {
            inner: RwLock::new(Registry { infos, by_name }),
        }
    }

    /// Declare a new type under `parent`.
    ///
    /// Re-declaring an existing name with the same parent returns the
    /// existing tag.
    pub fn declare(&self, name: &str, parent: Type) -> Result<Type> {
        let mut reg = self.inner.write();
        if parent.raw() as usize >= reg.infos.len() {
            return Err(Error::UnknownType(parent.raw()));
        }
        if let Some(&existing) = reg.by_name.get(name) {
            return if reg.infos[existing.raw() as usize].parent == parent {
                Ok(existing)
            } else {
                Err(Error::TypeConflict {
                    name: name.to_string(),
                })
            };
        }
        let raw = u16::try_from(reg.infos.len()).map_err(|_| Error::UnknownType(u16::MAX))?;
        // Type names live for the whole process, like the tags that refer to them.
        let name: &'static str = Box::leak(name.to_string().into_boxed_str());
        let t = Type(raw);
        reg.infos.push(TypeInfo {
            name,
            parent,
            equivalence: None,
        });
        reg.by_name.insert(name, t);
        Ok(t)
    }

    pub fn lookup(&self, name: &str) -> Option<Type> {
        self.inner.read().by_name.get(name).copied()
    }

    pub fn name(&self, t: Type) -> Option<&'static str> {
        self.inner.read().infos.get(t.raw() as usize).map(|i| i.name)
    }

    pub fn parent(&self, t: Type) -> Option<Type> {
        self.inner.read().infos.get(t.raw() as usize).map(|i| i.parent)
    }

    pub fn len(&self) -> usize {
        self.inner.read().infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `t` is `supertype` or inherits from it.
    pub fn is_a(&self, t: Type, supertype: Type) -> bool {
        let reg = self.inner.read();
        let mut cur = t;
        loop {
            if cur == supertype {
                return true;
            }
            match reg.infos.get(cur.raw() as usize) {
                Some(info) if info.parent != cur => cur = info.parent,
                _ => return false,
            }
        }
    }

    pub fn is_node(&self, t: Type) -> bool {
        self.is_a(t, Type::NODE)
    }

    pub fn is_link(&self, t: Type) -> bool {
        self.is_a(t, Type::LINK)
    }

    pub fn is_unordered(&self, t: Type) -> bool {
        self.is_a(t, Type::UNORDERED_LINK)
    }

    /// Install custom equality and hashing for `t` and every subtype that
    /// does not override it again.
    pub fn set_equivalence(&self, t: Type, equivalence: Equivalence) -> Result<()> {
        let mut reg = self.inner.write();
        let info = reg
            .infos
            .get_mut(t.raw() as usize)
            .ok_or(Error::UnknownType(t.raw()))?;
        info.equivalence = Some(equivalence);
        Ok(())
    }

    /// Nearest equivalence override on the path from `t` to the root.
    pub fn equivalence(&self, t: Type) -> Option<Equivalence> {
        let reg = self.inner.read();
        let mut cur = t;
        loop {
            let info = reg.infos.get(cur.raw() as usize)?;
            if let Some(eq) = info.equivalence {
                return Some(eq);
            }
            if info.parent == cur {
                return None;
            }
            cur = info.parent;
        }
    }
}

/// The process-wide registry, populated with the built-in types on first use.
pub fn registry() -> &'static TypeRegistry {
    static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(TypeRegistry::with_builtins)
}

/// Dynamic type check against the process-wide registry.
pub fn is_type(t: Type, supertype: Type) -> bool {
    registry().is_a(t, supertype)
}
