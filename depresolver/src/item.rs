// Copyright 2023 Metagen project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use smallvec::SmallVec;

///
/// The two-point state lattice an object moves through during a walk:
/// `none -> Declared -> Valid`.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Declared,
    Valid,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Declared => write!(f, "DECLARED"),
            State::Valid => write!(f, "VALID"),
        }
    }
}

///
/// The state a dependency must reach before an edge depending on it can be
/// resolved. `Either` accepts both states and marks the edge as weak: weak
/// edges are the demotion candidates of the cycle breaker.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Requires {
    Declared,
    Valid,
    Either,
}

impl Requires {
    pub(crate) fn is_weak(self) -> bool {
        matches!(self, Requires::Either)
    }
}

impl fmt::Display for Requires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requires::Declared => write!(f, "DECLARED"),
            Requires::Valid => write!(f, "VALID"),
            Requires::Either => write!(f, "DECLARED|VALID"),
        }
    }
}

// 2^32 items ought to be more than enough for anyone!
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ItemId(u32);

impl ItemId {
    pub(crate) fn new(index: usize) -> ItemId {
        ItemId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct EdgeId(u32);

impl EdgeId {
    pub(crate) fn new(index: usize) -> EdgeId {
        EdgeId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

///
/// Bookkeeping for one inserted node. The counts are the number of
/// outstanding dependencies currently blocking the corresponding transition;
/// the edge lists hold the edges through which *other* items depend on this
/// item reaching the named state.
///
pub(crate) struct Item<N> {
    pub(crate) node: N,
    pub(crate) declared: bool,
    pub(crate) defined: bool,
    pub(crate) declare_count: u32,
    pub(crate) define_count: u32,
    pub(crate) on_declared: SmallVec<[EdgeId; 2]>,
    pub(crate) on_defined: SmallVec<[EdgeId; 2]>,
}

impl<N> Item<N> {
    pub(crate) fn new(node: N, root: bool) -> Item<N> {
        Item {
            node,
            declared: root,
            defined: root,
            declare_count: 0,
            define_count: 0,
            on_declared: SmallVec::new(),
            on_defined: SmallVec::new(),
        }
    }
}

///
/// A directed requirement: the dependent cannot reach the state named by
/// `kind` until the dependency has reached its required state. Which list the
/// edge is parked on encodes the required state; `weak` records that either
/// state was acceptable.
///
pub(crate) struct Edge {
    pub(crate) kind: State,
    pub(crate) dependent: ItemId,
    pub(crate) dependency: ItemId,
    // A weak edge may be demoted to DECLARED if a cycle cannot otherwise be
    // broken.
    pub(crate) weak: bool,
    // Equals the current cycle-walk iteration once the edge has been
    // explored in that pass.
    pub(crate) marked: u32,
    // Breaking a cycle can resolve an edge that the normal drain would
    // resolve again later; a processed edge is never resolved twice, which
    // keeps the counts from dropping below zero.
    pub(crate) processed: bool,
}
