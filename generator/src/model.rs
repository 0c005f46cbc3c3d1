// Copyright 2024 Metagen project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::hash::Hash;

use depresolver::{Node, Requires};

///
/// The introspection surface the generator consumes from a meta-model.
///
/// An `Object` is a cheap handle: equality and hashing are identity (two
/// clones of one handle are equal, two structurally identical anonymous
/// objects are not), and `Display` renders the full path. Everything the
/// dependency builder and the identifier service need to know about an
/// object is answered through this trait; the meta-model's internals stay
/// opaque.
///
pub trait Object: Node + Hash {
    ///
    /// The object's own identifier (the last path segment). For procedures
    /// this includes the argument list, e.g. `add(int32 a,int32 b)`.
    ///
    fn ident(&self) -> String;

    ///
    /// The type of this object, itself an object.
    ///
    fn type_of(&self) -> Self;

    ///
    /// The parent scope, or `None` for the root scope object.
    ///
    fn parent(&self) -> Option<Self>;

    ///
    /// True if the object has a name and lives under the root scope.
    /// Anything else is anonymous and compared by value.
    ///
    fn is_named(&self) -> bool;

    ///
    /// True for objects baked into the runtime. Encountering one flags the
    /// whole run as a bootstrap.
    ///
    fn is_builtin(&self) -> bool;

    /// True for package objects.
    fn is_package(&self) -> bool;

    ///
    /// True for class-like reference types; the identifier service applies
    /// its casing rules to the path segments of these.
    ///
    fn is_class(&self) -> bool;

    ///
    /// True if the object's type is a procedure kind.
    ///
    fn is_procedure(&self) -> bool;

    ///
    /// False for value-less slots (void, non-reference). Define callbacks
    /// are suppressed for these.
    ///
    fn has_value(&self) -> bool;

    ///
    /// True if the object's source metadata points at the marker of the
    /// current generation. Unmarked objects already existed in their scope
    /// and are skipped by scope walks.
    ///
    fn marked(&self) -> bool;

    ///
    /// True if generated code must disambiguate this procedure from others
    /// with the same name in its scope.
    ///
    fn overloaded(&self) -> bool;

    ///
    /// Structural equality, used to merge anonymous objects into one
    /// canonical representative.
    ///
    fn value_eq(&self, other: &Self) -> bool;

    ///
    /// The objects in this object's scope, in a stable order.
    ///
    fn scope(&self) -> Vec<Self>;

    ///
    /// Parameter types of a procedure, in signature order. Empty for
    /// non-procedures.
    ///
    fn param_types(&self) -> Vec<Self>;

    ///
    /// For a method on a class that has a base, the base; `None` for plain
    /// functions and for methods on baseless classes.
    ///
    fn method_base(&self) -> Option<Self>;

    ///
    /// The state the parent must reach before this object may be declared
    /// (an option of the object's type).
    ///
    fn parent_requires(&self) -> Requires;

    ///
    /// The reference-valued fields of this object's value, in declaration
    /// order, with null references already filtered out.
    ///
    fn reference_uses(&self) -> Vec<RefUse<Self>>;

    ///
    /// Packages this package depends on; used to load prefix metadata of
    /// indirect imports.
    ///
    fn package_imports(&self) -> Vec<Self> {
        Vec::new()
    }

    ///
    /// All members of a type, inherited members first, in declaration
    /// order. Used to disambiguate colliding member names.
    ///
    fn inherited_members(&self) -> Vec<Self> {
        Vec::new()
    }
}

///
/// One reference-valued field encountered while walking an object's value.
///
pub struct RefUse<O> {
    /// The referenced object.
    pub target: O,
    ///
    /// Present when the reference sits in a reference-typed member; absent
    /// for embedded (non-reference-typed) fields, which always require the
    /// target to be valid.
    ///
    pub member: Option<RefMember>,
}

///
/// The dependency requirement carried by a reference-typed member.
///
pub struct RefMember {
    /// The state the member requires of its target.
    pub requires: Requires,
    ///
    /// The member's state condition evaluated against the current value, if
    /// the member carries one. A false condition flips the requirement.
    ///
    pub cond: Option<bool>,
}
