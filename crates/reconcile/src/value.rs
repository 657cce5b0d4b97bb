//! Tri-state value model
//!
//! A declared value can be [`Declared::Unresolved`] (the remote side will
//! compute it), [`Declared::Absent`] (the user did not write it) or
//! [`Declared::Concrete`]. Observed values are always resolved, so
//! [`Observed`] has no unresolved variant.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of one member of a keyed collection (e.g. `ide2`, `net0`)
pub type SlotKey = String;

/// Resolved sub-fields of a composite or slot, keyed by attribute name
pub type Fields = BTreeMap<String, Scalar>;

/// Declared sub-fields; a missing key means [`Declared::Absent`]
pub type DeclaredFields = BTreeMap<String, Declared<Scalar>>;

/// Kind of a scalar attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalarKind {
    String,
    Int,
    Bool,
    Set,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::String => write!(f, "string"),
            ScalarKind::Int => write!(f, "int"),
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::Set => write!(f, "set"),
        }
    }
}

/// A single resolved attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
    Set(BTreeSet<String>),
}

impl Scalar {
    /// Build a set value from any iterator of strings
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// The kind this value belongs to
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::Int(_) => ScalarKind::Int,
            Self::Str(_) => ScalarKind::String,
            Self::Set(_) => ScalarKind::Set,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Set(items) => {
                let joined: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "[{}]", joined.join(", "))
            }
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A value as currently declared by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declared<T> {
    /// Will be computed remotely; must not influence any decision
    Unresolved,
    /// Explicitly unspecified
    Absent,
    Concrete(T),
}

impl<T> Declared<T> {
    /// The concrete value, if any
    pub fn concrete(&self) -> Option<&T> {
        match self {
            Self::Concrete(value) => Some(value),
            _ => None,
        }
    }
}

macro_rules! declared_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Declared<Scalar> {
                fn from(value: $ty) -> Self {
                    Self::Concrete(value.into())
                }
            }
        )*
    };
}

declared_from!(Scalar, &str, String, i64, bool);

/// The last recorded value of an attribute on the remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed<T> {
    Absent,
    Concrete(T),
}

impl<T> From<Option<T>> for Observed<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Concrete(value),
            None => Self::Absent,
        }
    }
}

/// Outcome of reconciling one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction<T> {
    Keep,
    Set(T),
    Remove,
}

/// Where the object's initial observed configuration came from
///
/// A cloned object inherits every attribute its source had, so attributes
/// the user never declared are not removal candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// Created from a blank default
    #[default]
    Created,
    /// Copied from another pre-existing object
    Cloned,
}

impl Origin {
    pub fn from_clone_flag(cloned: bool) -> Self {
        if cloned { Self::Cloned } else { Self::Created }
    }

    pub fn is_clone(self) -> bool {
        matches!(self, Self::Cloned)
    }
}

/// Declared configuration of a remote object, or of one collection slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredObject {
    pub scalars: DeclaredFields,
    pub composites: BTreeMap<String, Declared<DeclaredFields>>,
    pub collections: BTreeMap<String, Declared<BTreeMap<SlotKey, DeclaredObject>>>,
}

impl DeclaredObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, name: &str, value: impl Into<Declared<Scalar>>) -> Self {
        self.scalars.insert(name.to_string(), value.into());
        self
    }

    pub fn with_composite(mut self, name: &str, value: Declared<DeclaredFields>) -> Self {
        self.composites.insert(name.to_string(), value);
        self
    }

    pub fn with_collection(
        mut self,
        name: &str,
        value: Declared<BTreeMap<SlotKey, DeclaredObject>>,
    ) -> Self {
        self.collections.insert(name.to_string(), value);
        self
    }
}

/// Last full read of a remote object, or of one collection slot
///
/// Missing keys are absent. An empty composite is the same as an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedObject {
    pub scalars: Fields,
    pub composites: BTreeMap<String, Fields>,
    pub collections: BTreeMap<String, BTreeMap<SlotKey, ObservedObject>>,
}

impl ObservedObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, name: &str, value: impl Into<Scalar>) -> Self {
        self.scalars.insert(name.to_string(), value.into());
        self
    }

    pub fn with_composite(mut self, name: &str, fields: Fields) -> Self {
        self.composites.insert(name.to_string(), fields);
        self
    }

    pub fn with_collection(mut self, name: &str, slots: BTreeMap<SlotKey, ObservedObject>) -> Self {
        self.collections.insert(name.to_string(), slots);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.composites.is_empty() && self.collections.is_empty()
    }

    /// Observed sub-fields of a composite (empty when absent)
    pub fn composite(&self, name: &str) -> &Fields {
        static EMPTY: Fields = BTreeMap::new();
        self.composites.get(name).unwrap_or(&EMPTY)
    }

    /// Observed slots of a collection (empty when absent)
    pub fn collection(&self, name: &str) -> &BTreeMap<SlotKey, ObservedObject> {
        static EMPTY: BTreeMap<SlotKey, ObservedObject> = BTreeMap::new();
        self.collections.get(name).unwrap_or(&EMPTY)
    }
}
