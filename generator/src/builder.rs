// Copyright 2024 Metagen project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use depresolver::{DepResolver, Requires, State, WalkActions};
use log::debug;

use crate::model::Object;
use crate::Generator;

///
/// The declare/define callbacks of an ordered walk, fired once per covered
/// object in dependency order. Both default to no-ops so a back-end that
/// only cares about definitions can leave `on_declare` out.
///
pub trait OrderedActions<O: Object> {
    fn on_declare(&mut self, g: &mut Generator<O>, o: &O) -> Result<(), String> {
        let _ = (g, o);
        Ok(())
    }

    fn on_define(&mut self, g: &mut Generator<O>, o: &O) -> Result<(), String> {
        let _ = (g, o);
        Ok(())
    }
}

///
/// Translates the structure of walked objects into dependency edges.
///
struct BuildState<O: Object> {
    resolver: DepResolver<O>,
    // A builtin was encountered: the builtin types are being generated, and
    // their dependencies are unresolvable (typeof(class) == class), so the
    // dependency administration must be disregarded.
    bootstrap: bool,
    // Canonical representatives of anonymous objects, matched by value.
    anonymous: Vec<O>,
}

impl<O: Object> BuildState<O> {
    fn new() -> BuildState<O> {
        BuildState {
            resolver: DepResolver::new(),
            bootstrap: false,
            anonymous: Vec::new(),
        }
    }

    ///
    /// Anonymous objects have no identity of their own: structurally equal
    /// ones are merged into the first representative seen, so the graph
    /// holds each value once.
    ///
    fn find_anonymous(&mut self, o: O) -> O {
        if o.is_named() {
            return o;
        }

        for candidate in &self.anonymous {
            if candidate.value_eq(&o) {
                return candidate.clone();
            }
        }

        self.anonymous.push(o.clone());
        o
    }

    ///
    /// Installs the edges one object contributes. `Ok(false)` stops the
    /// surrounding walk: a builtin was found and the run is a bootstrap.
    ///
    fn build_object(&mut self, g: &mut Generator<O>, o: &O) -> Result<bool, String> {
        if o.is_builtin() {
            self.bootstrap = true;
            return Ok(false);
        }

        // An object can only be declared after its type is defined.
        let type_of = o.type_of();
        if g.must_parse(&type_of) {
            let type_of = self.find_anonymous(type_of);
            self.resolver
                .depend(o, State::Declared, &type_of, Requires::Valid);
        }

        if o.is_procedure() {
            // Methods may only be declared after the base of their class is
            // defined.
            if let Some(base) = o.method_base() {
                if g.must_parse(&base) {
                    self.resolver
                        .depend(o, State::Declared, &base, Requires::Valid);
                }
            }

            // Parameter types need only be declared when the procedure is
            // declared.
            for param in o.param_types() {
                if g.must_parse(&param) {
                    let param = self.find_anonymous(param);
                    self.resolver
                        .depend(o, State::Declared, &param, Requires::Either);
                }
            }
        }

        if o.is_named() {
            if let Some(parent) = o.parent() {
                // The root is always available.
                if !parent.is_root() {
                    let requires = o.parent_requires();
                    self.resolver.depend(o, State::Declared, &parent, requires);

                    if requires == Requires::Declared {
                        // Defining the parent must wait until its declared
                        // children are valid.
                        self.resolver
                            .depend(&parent, State::Valid, o, Requires::Valid);
                    }
                }
            }
        }

        // Guard: the object reaches the administration even when nothing
        // depends on it.
        self.resolver.insert(o);

        // References in the object's value.
        for reference in o.reference_uses() {
            if !g.must_parse(&reference.target) {
                continue;
            }

            let target = if reference.target.is_named() {
                reference.target
            } else {
                let canonical = self.find_anonymous(reference.target);
                self.build_object(g, &canonical)?;
                canonical
            };

            let requires = match reference.member {
                Some(member) => {
                    let mut requires = member.requires;
                    if member.cond == Some(false) {
                        requires = match requires {
                            Requires::Either | Requires::Declared => Requires::Valid,
                            Requires::Valid => Requires::Declared,
                        };
                    }
                    requires
                }
                None => Requires::Valid,
            };

            self.resolver.depend(o, State::Valid, &target, requires);
        }

        Ok(true)
    }
}

struct OrderedSink<'g, O: Object, A: OrderedActions<O>> {
    g: &'g mut Generator<O>,
    actions: &'g mut A,
}

impl<'g, O: Object, A: OrderedActions<O>> WalkActions<O> for OrderedSink<'g, O, A> {
    fn on_declare(&mut self, o: &O) -> Result<(), String> {
        self.actions.on_declare(self.g, o)
    }

    fn on_define(&mut self, o: &O) -> Result<(), String> {
        if o.has_value() {
            self.actions.on_define(self.g, o)
        } else {
            Ok(())
        }
    }
}

impl<O: Object> Generator<O> {
    ///
    /// Walks every covered object in dependency order, firing the actions'
    /// declare/define callbacks. When a builtin is encountered the resolver
    /// is bypassed entirely: every object is declared and then defined in
    /// two straight recursive walks.
    ///
    pub fn walk_ordered<A: OrderedActions<O>>(&mut self, actions: &mut A) -> Result<(), String> {
        let mut build = BuildState::new();
        self.walk_recursive(&mut |g, o| build.build_object(g, o))?;

        if build.bootstrap {
            debug!("builtin object found, bypassing the dependency administration");
            self.walk_recursive(&mut |g, o| {
                actions.on_declare(g, o)?;
                Ok(true)
            })?;
            self.walk_recursive(&mut |g, o| {
                if o.has_value() {
                    actions.on_define(g, o)?;
                }
                Ok(true)
            })?;
            return Ok(());
        }

        let mut sink = OrderedSink { g: self, actions };
        build.resolver.walk(&mut sink)
    }
}
