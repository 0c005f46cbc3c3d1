// Copyright 2023 Metagen project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt::Display;

///
/// The bound the resolver places on the handles it orders.
///
/// A `Node` is a cheap handle with identity semantics: two clones of the same
/// handle compare equal, and equality never changes over the lifetime of a
/// walk. `Display` renders the full path of the underlying object and is used
/// for diagnostics only.
///
pub trait Node: Clone + Eq + Display {
    ///
    /// True for the root scope object. An item created for the root starts
    /// out declared and defined, so that top-level objects need not depend
    /// on it.
    ///
    fn is_root(&self) -> bool {
        false
    }
}
