//! Method identities and symbolic member references.
//!
//! Class loading and member resolution happen outside this crate. What arrives here
//! are already-resolved, symbolic references: a [`MethodActor`] for the method being
//! compiled, and [`MethodRef`], [`FieldRef`] and [`TypeRef`] for the members its
//! instructions mention.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bitflags::bitflags;

use crate::bir::Kind;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Declaration flags of a compiled method
    pub struct MethodFlags: u32 {
        /// The method has no receiver
        const STATIC = 0x0001;
        /// The method may be evaluated at compile time when its arguments are constant
        const FOLDABLE = 0x0002;
        /// The method is implemented outside the VM
        const NATIVE = 0x0004;
        /// The method acquires the receiver's monitor
        const SYNCHRONIZED = 0x0008;
    }
}

/// Identity and signature of a compiled method.
///
/// Equality and hashing only consider the resolved signature
/// (`holder`, `name`, parameter kinds and return kind). Flags and the inlining budget
/// are attributes of the identity and never distinguish two otherwise equal methods.
#[derive(Debug, Clone)]
pub struct MethodActor {
    /// Name of the declaring class.
    pub holder: Arc<str>,
    /// Method name.
    pub name: Arc<str>,
    /// Declaration flags.
    pub flags: MethodFlags,
    /// Kinds of the declared parameters, excluding the receiver.
    pub parameter_kinds: Vec<Kind>,
    /// Kind of the returned value.
    pub return_kind: Kind,
    /// Explicit number of block inlinings allowed while optimizing this method.
    pub inlining_budget: Option<u32>,
}

impl MethodActor {
    /// Creates a new method identity without any flags.
    #[must_use]
    pub fn new(
        holder: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        parameter_kinds: Vec<Kind>,
        return_kind: Kind,
    ) -> Self {
        Self {
            holder: holder.into(),
            name: name.into(),
            flags: MethodFlags::empty(),
            parameter_kinds,
            return_kind,
            inlining_budget: None,
        }
    }

    /// Returns this identity with the given flags added.
    #[must_use]
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns this identity with an explicit inlining budget attached.
    #[must_use]
    pub fn with_inlining_budget(mut self, budget: u32) -> Self {
        self.inlining_budget = Some(budget);
        self
    }

    /// Returns `true` if the method has no receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns `true` if the method is declared foldable.
    #[must_use]
    pub fn is_foldable(&self) -> bool {
        self.flags.contains(MethodFlags::FOLDABLE)
    }

    /// Returns `true` if the method qualifies for the fold-at-compile-time fast path:
    /// static, foldable and without parameters.
    #[must_use]
    pub fn is_foldable_without_arguments(&self) -> bool {
        self.is_static() && self.is_foldable() && self.parameter_kinds.is_empty()
    }

    /// Kinds of all incoming arguments, including the receiver for instance methods.
    #[must_use]
    pub fn argument_kinds(&self) -> Vec<Kind> {
        let mut kinds = Vec::with_capacity(self.parameter_kinds.len() + 1);
        if !self.is_static() {
            kinds.push(Kind::Reference);
        }
        kinds.extend_from_slice(&self.parameter_kinds);
        kinds
    }
}

impl PartialEq for MethodActor {
    fn eq(&self, other: &Self) -> bool {
        self.holder == other.holder
            && self.name == other.name
            && self.parameter_kinds == other.parameter_kinds
            && self.return_kind == other.return_kind
    }
}

impl Eq for MethodActor {}

impl Hash for MethodActor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.holder.hash(state);
        self.name.hash(state);
        self.parameter_kinds.hash(state);
        self.return_kind.hash(state);
    }
}

impl fmt::Display for MethodActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.holder, self.name)?;
        for (i, kind) in self.parameter_kinds.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{kind}")?;
        }
        write!(f, "){}", self.return_kind)
    }
}

/// Symbolic reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Declaring class.
    pub holder: Arc<str>,
    /// Field name.
    pub name: Arc<str>,
    /// Kind of the stored value.
    pub kind: Kind,
}

impl FieldRef {
    /// Creates a new field reference.
    #[must_use]
    pub fn new(holder: impl Into<Arc<str>>, name: impl Into<Arc<str>>, kind: Kind) -> Self {
        Self {
            holder: holder.into(),
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.holder, self.name)
    }
}

/// Symbolic reference to a method invoked by an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Declaring class.
    pub holder: Arc<str>,
    /// Method name.
    pub name: Arc<str>,
    /// Declared parameter kinds, excluding the receiver.
    pub parameter_kinds: Arc<[Kind]>,
    /// Kind of the returned value.
    pub return_kind: Kind,
}

impl MethodRef {
    /// Creates a new method reference.
    #[must_use]
    pub fn new(
        holder: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        parameter_kinds: &[Kind],
        return_kind: Kind,
    ) -> Self {
        Self {
            holder: holder.into(),
            name: name.into(),
            parameter_kinds: parameter_kinds.into(),
            return_kind,
        }
    }

    /// Returns `true` for instance initializers.
    #[must_use]
    pub fn is_initializer(&self) -> bool {
        &*self.name == "<init>"
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.holder, self.name)
    }
}

/// Symbolic reference to a class or array type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Fully qualified type name.
    pub name: Arc<str>,
}

impl TypeRef {
    /// Creates a new type reference.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_identity_ignores_flags() {
        let plain = MethodActor::new("Foo", "bar", vec![Kind::Int], Kind::Int);
        let flagged = plain
            .clone()
            .with_flags(MethodFlags::STATIC)
            .with_inlining_budget(3);

        assert_eq!(plain, flagged);

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(set.contains(&flagged));
    }

    #[test]
    fn test_argument_kinds_include_receiver() {
        let instance = MethodActor::new("Foo", "bar", vec![Kind::Long], Kind::Void);
        assert_eq!(instance.argument_kinds(), vec![Kind::Reference, Kind::Long]);

        let stat = instance.clone().with_flags(MethodFlags::STATIC);
        assert_eq!(stat.argument_kinds(), vec![Kind::Long]);
    }

    #[test]
    fn test_foldable_fast_path_requirements() {
        let actor = MethodActor::new("Foo", "answer", vec![], Kind::Int)
            .with_flags(MethodFlags::STATIC | MethodFlags::FOLDABLE);
        assert!(actor.is_foldable_without_arguments());

        let with_args = MethodActor::new("Foo", "sum", vec![Kind::Int], Kind::Int)
            .with_flags(MethodFlags::STATIC | MethodFlags::FOLDABLE);
        assert!(!with_args.is_foldable_without_arguments());

        let instance =
            MethodActor::new("Foo", "get", vec![], Kind::Int).with_flags(MethodFlags::FOLDABLE);
        assert!(!instance.is_foldable_without_arguments());
    }

    #[test]
    fn test_display() {
        let actor = MethodActor::new("Foo", "bar", vec![Kind::Int, Kind::Reference], Kind::Void);
        assert_eq!(actor.to_string(), "Foo.bar(int,ref)void");
    }
}
