//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output across runs and in dumps.
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Interned identifiers: method names, local-variable names, block labels.
pub type Id = internment::Intern<String>;

/// The two value types `iota` knows about. Booleans are represented as
/// integers from the bytecode emitter onward (see [`crate::front::bytecode`]),
/// but the front end keeps them distinct for type checking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum Type {
    #[display("I")]
    Int,
    #[display("Z")]
    Bool,
    #[display("V")]
    Void,
}

impl Type {
    /// The single-character descriptor code used in method descriptors.
    pub fn code(self) -> char {
        match self {
            Type::Int => 'I',
            Type::Bool => 'Z',
            Type::Void => 'V',
        }
    }
}

/// A resolved method descriptor: ordered parameter types and a return type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Descriptor {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for p in &self.params {
            write!(f, "{p}")?;
        }
        write!(f, "){}", self.ret)
    }
}

/// A qualified method key: name plus descriptor, used to address call
/// targets and to key the global `methodAddresses` table during linking.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodKey {
    pub name: Id,
    pub descriptor: Descriptor,
}

impl std::fmt::Display for MethodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

impl MethodKey {
    /// Is this the `read()I` builtin?
    pub fn is_read_builtin(&self) -> bool {
        self.name.as_str() == "read"
            && self.descriptor.params.is_empty()
            && self.descriptor.ret == Type::Int
    }

    /// Is this the `write(I)V` / `write(Z)V` builtin?
    pub fn is_write_builtin(&self) -> bool {
        self.name.as_str() == "write"
            && self.descriptor.params.len() == 1
            && matches!(self.descriptor.params[0], Type::Int | Type::Bool)
            && self.descriptor.ret == Type::Void
    }

    pub fn is_builtin(&self) -> bool {
        self.is_read_builtin() || self.is_write_builtin()
    }
}
