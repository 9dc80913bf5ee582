//! Payloads attached to atoms through their value tables.

use crate::atom::Node;
use crate::handle::Handle;
use crate::types::Type;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Shared, immutable value payload.
pub type ValuePtr = Arc<Value>;

/// Opaque value stored under a key atom.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Float(Vec<f64>),
    String(Vec<String>),
    Link(Vec<ValuePtr>),
    Atom(Handle),
    Truth(TruthValue),
}

impl Value {
    pub fn as_truth(&self) -> Option<TruthValue> {
        match self {
            Value::Truth(tv) => Some(*tv),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => {
                f.write_str("(FloatValue")?;
                for x in v {
                    write!(f, " {x}")?;
                }
                f.write_str(")")
            }
            Value::String(v) => {
                f.write_str("(StringValue")?;
                for s in v {
                    write!(f, " {s:?}")?;
                }
                f.write_str(")")
            }
            Value::Link(v) => {
                f.write_str("(LinkValue")?;
                for x in v {
                    write!(f, " {x}")?;
                }
                f.write_str(")")
            }
            Value::Atom(h) => write!(f, "{h}"),
            Value::Truth(tv) => write!(f, "{tv}"),
        }
    }
}

/// Strength/confidence pair stored under the reserved truth-value key.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TruthValue {
    pub strength: f64,
    pub confidence: f64,
}

impl TruthValue {
    /// Returned when an atom has no truth value attached.
    pub const DEFAULT: TruthValue = TruthValue::new(1.0, 0.0);
    pub const TRUE: TruthValue = TruthValue::new(1.0, 1.0);
    pub const FALSE: TruthValue = TruthValue::new(0.0, 1.0);

    pub const fn new(strength: f64, confidence: f64) -> Self {
        Self {
            strength,
            confidence,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for TruthValue {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for TruthValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(stv {} {})", self.strength, self.confidence)
    }
}

/// Name of the predicate node used as the truth-value key.
pub const TRUTH_KEY_NAME: &str = "*-TruthValueKey-*";

/// The process-wide key under which truth values are stored.
pub fn truth_key() -> &'static Handle {
    static KEY: OnceLock<Handle> = OnceLock::new();
    KEY.get_or_init(|| {
        // PREDICATE_NODE is a built-in node type, so construction cannot fail.
        Node::new(Type::PREDICATE_NODE, TRUTH_KEY_NAME).unwrap_or_default()
    })
}
