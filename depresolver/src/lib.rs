// Copyright 2023 Metagen project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be copied and pasted across crates, but there doesn't appear to be a way to include inner attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
// It is often more clear to show that nothing is being moved.
#![allow(clippy::match_ref_pats)]
// Subjective style.
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
// Default isn't as big a deal as people seem to think it is.
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

mod item;
mod node;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{debug, trace, warn};
use petgraph::dot;
use petgraph::graph::DiGraph;

use crate::item::{Edge, EdgeId, Item, ItemId};
pub use crate::item::{Requires, State};
pub use crate::node::Node;

// Hard bound on the cycle-search stack. Cycles deeper than this cannot arise
// from well-formed meta-models.
const CYCLE_DEPTH: usize = 1024;

///
/// The declare/define callbacks fired by `DepResolver::walk`, with `&mut
/// self` standing in for whatever state the caller wants the callbacks to
/// reach.
///
/// `on_declare` fires exactly once per resolvable item; `on_define` fires
/// exactly once per resolvable item and never before `on_declare` for the
/// same item. An error return aborts the walk.
///
pub trait WalkActions<N> {
    fn on_declare(&mut self, node: &N) -> Result<(), String>;
    fn on_define(&mut self, node: &N) -> Result<(), String>;
}

///
/// Orders inserted nodes by "declared before defined": a node must not be
/// declared before the type it depends on is defined, a parent must not be
/// defined before its declared children are valid, and so on. Callers insert
/// nodes and dependency edges, then `walk` fires the declare/define
/// callbacks in an order that satisfies every edge, breaking dependency
/// cycles by demoting weak edges where possible.
///
/// Items live in an insertion-ordered vector and edges in a side arena, both
/// addressed by index; edges never hold references into the item table.
///
pub struct DepResolver<N: Node> {
    items: Vec<Item<N>>,
    edges: Vec<Edge>,
    to_emit: VecDeque<ItemId>,
    // DFS stack of the cycle search.
    stack: Vec<EdgeId>,
    // Edges marked with the current iteration have already been explored in
    // this cycle pass.
    iteration: u32,
}

impl<N: Node> DepResolver<N> {
    pub fn new() -> DepResolver<N> {
        DepResolver {
            items: Vec::new(),
            edges: Vec::new(),
            to_emit: VecDeque::new(),
            stack: Vec::new(),
            iteration: 0,
        }
    }

    ///
    /// The number of items currently in the graph.
    ///
    pub fn len(&self) -> usize {
        self.items.len()
    }

    ///
    /// Ensures an item exists for `node`. Inserting the same node twice
    /// yields the same item.
    ///
    pub fn insert(&mut self, node: &N) {
        self.ensure_item(node);
    }

    ///
    /// Installs the requirement that `dependent` cannot reach the state
    /// named by `kind` until `dependency` has reached `requires`. A
    /// dependency of a node on itself is not representable and is silently
    /// skipped; both items are still created.
    ///
    pub fn depend(&mut self, dependent: &N, kind: State, dependency: &N, requires: Requires) {
        debug!("depend: can't {kind} '{dependent}' before {requires} '{dependency}'");

        let dependent_id = self.ensure_item(dependent);
        let dependency_id = self.ensure_item(dependency);

        if dependent_id == dependency_id {
            return;
        }

        let edge = EdgeId::new(self.edges.len());
        self.edges.push(Edge {
            kind,
            dependent: dependent_id,
            dependency: dependency_id,
            weak: requires.is_weak(),
            marked: 0,
            processed: false,
        });

        match kind {
            State::Declared => self.items[dependent_id.index()].declare_count += 1,
            State::Valid => self.items[dependent_id.index()].define_count += 1,
        }

        // A weak requirement is parked with the define-waiters: it is
        // satisfied by the definition of the dependency unless the cycle
        // breaker demotes it first.
        match requires {
            Requires::Declared => self.items[dependency_id.index()].on_declared.push(edge),
            Requires::Valid | Requires::Either => {
                self.items[dependency_id.index()].on_defined.push(edge)
            }
        }
    }

    ///
    /// Fires the declare/define callbacks for every resolvable item, in an
    /// order that satisfies the installed edges. Items that cannot be
    /// resolved (they participate in a cycle with no demotable weak edge)
    /// are reported with a warning and cause an error return; callbacks
    /// fired before the walk completes are not rolled back.
    ///
    /// The resolver is consumed: items and edges are freed when the walk
    /// returns.
    ///
    pub fn walk<A: WalkActions<N>>(mut self, actions: &mut A) -> Result<(), String> {
        // Emit everything that is unblocked from the start.
        self.drain(actions)?;

        // Remaining undefined items sit on cycles. Search each one for a
        // cycle, demote one weak edge per cycle found, and drain again to
        // propagate the unblocking.
        for index in 0..self.items.len() {
            self.iteration += 1;

            if !self.items[index].defined {
                debug!(
                    "'{}' has cycles (declare_count = {}, define_count = {})",
                    self.items[index].node,
                    self.items[index].declare_count,
                    self.items[index].define_count
                );

                self.stack.clear();
                self.resolve_cycles(ItemId::new(index));
                self.drain(actions)?;
            }
        }

        let mut unresolved = 0;
        for item in &self.items {
            if !item.defined {
                if item.declared {
                    warn!("not defined: '{}'", item.node);
                } else {
                    warn!("not declared/defined: '{}'", item.node);
                }
                unresolved += 1;
            }
        }

        if unresolved != 0 {
            return Err(format!(
                "{unresolved} object(s) unresolvable due to dependency cycles"
            ));
        }

        Ok(())
    }

    ///
    /// Renders the current items and edges as a GraphViz dot file. Edges
    /// point from dependency to dependent (the direction in which
    /// resolution propagates); weak edges are tagged in their label.
    ///
    pub fn visualize(&self, path: &Path) -> io::Result<()> {
        let mut graph: DiGraph<String, String, u32> = DiGraph::new();

        let ids: Vec<_> = self
            .items
            .iter()
            .map(|item| graph.add_node(item.node.to_string()))
            .collect();
        for (index, edge) in self.edges.iter().enumerate() {
            let requires = if edge.weak {
                Requires::Either
            } else if self.items[edge.dependency.index()]
                .on_declared
                .contains(&EdgeId::new(index))
            {
                Requires::Declared
            } else {
                Requires::Valid
            };
            graph.add_edge(
                ids[edge.dependency.index()],
                ids[edge.dependent.index()],
                format!("{} before {}", edge.kind, requires),
            );
        }

        let file = File::create(path)?;
        let mut f = BufWriter::new(file);
        f.write_all(format!("{}", dot::Dot::with_config(&graph, &[])).as_bytes())?;

        Ok(())
    }

    fn ensure_item(&mut self, node: &N) -> ItemId {
        if let Some(index) = self.items.iter().position(|item| item.node == *node) {
            return ItemId::new(index);
        }

        let id = ItemId::new(self.items.len());
        let root = node.is_root();
        self.items.push(Item::new(node.clone(), root));
        id
    }

    ///
    /// Seeds the ready queue with every item whose declare transition is
    /// unblocked, then drains it. Items whose transitions already fired are
    /// requeued harmlessly; `emit` is idempotent.
    ///
    fn drain<A: WalkActions<N>>(&mut self, actions: &mut A) -> Result<(), String> {
        for index in 0..self.items.len() {
            if self.items[index].declare_count == 0 {
                self.to_emit.push_back(ItemId::new(index));
            }
        }

        while let Some(id) = self.to_emit.pop_front() {
            self.emit(id, actions)?;
        }

        Ok(())
    }

    ///
    /// Fires the transitions of one item that are unblocked right now, and
    /// resolves the edges waiting on each transition that fires.
    ///
    fn emit<A: WalkActions<N>>(&mut self, id: ItemId, actions: &mut A) -> Result<(), String> {
        let index = id.index();

        if !self.items[index].declared && self.items[index].declare_count == 0 {
            self.items[index].declared = true;
            debug!("declare '{}'", self.items[index].node);
            actions.on_declare(&self.items[index].node)?;
            for edge in self.items[index].on_declared.clone() {
                self.resolve_edge(edge);
            }
        }

        if self.items[index].declared
            && !self.items[index].defined
            && self.items[index].define_count == 0
        {
            self.items[index].defined = true;
            debug!("define '{}'", self.items[index].node);
            actions.on_define(&self.items[index].node)?;
            for edge in self.items[index].on_defined.clone() {
                self.resolve_edge(edge);
            }
        }

        Ok(())
    }

    ///
    /// Resolves one edge: decrements the count it charged on its dependent
    /// and queues the dependent once the count reaches zero. A processed
    /// edge is never resolved again.
    ///
    fn resolve_edge(&mut self, id: EdgeId) {
        let edge = id.index();

        if !self.edges[edge].processed {
            let dependent = self.edges[edge].dependent;
            let kind = self.edges[edge].kind;

            trace!(
                "resolve: {} '{}' no longer waits for '{}'",
                kind,
                self.items[dependent.index()].node,
                self.items[self.edges[edge].dependency.index()].node
            );

            let item = &mut self.items[dependent.index()];
            match kind {
                State::Declared => {
                    assert!(
                        item.declare_count > 0,
                        "declare count of '{}' would go negative",
                        item.node
                    );
                    item.declare_count -= 1;
                    if item.declare_count == 0 {
                        self.to_emit.push_back(dependent);
                    }
                }
                State::Valid => {
                    assert!(
                        item.define_count > 0,
                        "define count of '{}' would go negative",
                        item.node
                    );
                    item.define_count -= 1;
                    if item.define_count == 0 {
                        self.to_emit.push_back(dependent);
                    }
                }
            }
        }

        self.edges[edge].processed = true;
    }

    ///
    /// DFS step of the cycle search: follows every unexplored edge through
    /// which another item waits on `id`, for the lists whose transition has
    /// not fired yet.
    ///
    fn resolve_cycles(&mut self, id: ItemId) {
        let saved = self.stack.len();
        let index = id.index();

        // Edges in the on_declared list of a declared item have already been
        // resolved, so they need not be evaluated again; same for the
        // on_defined list of a defined item.
        if !self.items[index].declared {
            for edge in self.items[index].on_declared.clone() {
                self.resolve_edge_cycles(edge);
            }
        }

        if !self.items[index].defined {
            for edge in self.items[index].on_defined.clone() {
                self.resolve_edge_cycles(edge);
            }
        }

        self.stack.truncate(saved);
    }

    ///
    /// Explores one edge. Finding the edge already on the DFS stack means a
    /// cycle: the stack slice from that position to the top is the cycle,
    /// and the first weak edge on it whose dependency is already declared is
    /// demoted to break it.
    ///
    fn resolve_edge_cycles(&mut self, id: EdgeId) {
        if self.edges[id.index()].marked == self.iteration {
            return;
        }

        if let Some(found) = self.stack.iter().position(|&edge| edge == id) {
            trace!(
                "begin breaking cycle at '{}'",
                self.items[self.edges[id.index()].dependency.index()].node
            );

            let cycle: Vec<EdgeId> = self.stack[found..].to_vec();
            for demoted in cycle {
                let edge = demoted.index();
                if self.edges[edge].weak
                    && self.items[self.edges[edge].dependency.index()].declared
                {
                    debug!(
                        "break: can't {} '{}' before DECLARED|VALID '{}'",
                        self.edges[edge].kind,
                        self.items[self.edges[edge].dependent.index()].node,
                        self.items[self.edges[edge].dependency.index()].node
                    );

                    self.resolve_edge(demoted);
                    // An edge can only be weakened once.
                    self.edges[edge].weak = false;
                    break;
                }
            }
        } else {
            self.stack.push(id);
            assert!(self.stack.len() < CYCLE_DEPTH, "cycle stack overflow");

            let dependent = self.edges[id.index()].dependent;
            self.resolve_cycles(dependent);
            self.edges[id.index()].marked = self.iteration;
            self.stack.pop();
        }
    }
}
