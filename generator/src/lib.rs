// Copyright 2024 Metagen project contributors (see CONTRIBUTORS.md).
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
// Arc<Mutex> can be more clear than needing to grok Orderings:
#![allow(clippy::mutex_atomic)]

mod builder;
mod file;
mod ident;
mod model;

use fnv::FnvHashMap;
use indexmap::IndexSet;
use log::warn;

pub use depresolver::{Requires, State};

pub use crate::builder::OrderedActions;
pub use crate::file::GenFile;
pub use crate::ident::MemberCache;
pub use crate::model::{Object, RefMember, RefUse};

///
/// How identifiers are rendered for the target language.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdKind {
    /// Full object paths.
    Default,
    /// Paths relative to the enclosing scope of the current root.
    Local,
    /// Full paths with class segments upper-cased.
    ClassUpper,
    /// Full paths with class segments lower-cased.
    ClassLower,
}

///
/// Post-processing applied to every identifier before it reaches the
/// output. A plain function pointer: drivers surrender it once, at load
/// time, like a symbol looked up from a shared object.
///
pub type IdTransform = fn(&str) -> String;

///
/// A generator back-end. `start` drives the whole generation through the
/// host it is handed; the host keeps the driver loaded until it is reset or
/// replaced.
///
pub trait Driver<O: Object> {
    /// The required entry point. An error result fails the run.
    fn start(&mut self, g: &mut Generator<O>) -> Result<(), String>;

    /// Invoked when the host resets or tears down.
    fn stop(&mut self, g: &mut Generator<O>) {
        let _ = g;
    }

    /// Optional identifier post-processing.
    fn id_transform(&self) -> Option<IdTransform> {
        None
    }
}

///
/// One configured root object: generate for the object itself, for the
/// objects in its scope, or both. A prefix substitutes the root's path
/// segment in generated identifiers.
///
#[derive(Clone)]
pub(crate) struct GenObject<O> {
    pub(crate) object: O,
    pub(crate) parse_self: bool,
    pub(crate) parse_scope: bool,
    pub(crate) prefix: Option<String>,
}

///
/// The generator host: holds the configuration of one run (target language,
/// root objects, attributes, imports, loaded driver) and exposes the walk,
/// identifier and file services that driver callbacks consume.
///
pub struct Generator<O: Object> {
    name: Option<String>,
    language: String,
    id_kind: IdKind,
    objects: Vec<GenObject<O>>,
    attributes: FnvHashMap<String, String>,
    imports: IndexSet<O>,
    imports_nested: IndexSet<O>,
    // Cursor of the object currently being walked.
    current: Option<usize>,
    // Makes the walk API re-entrant from within a driver callback.
    in_walk: bool,
    driver: Option<Box<dyn Driver<O>>>,
    pub(crate) id_transform: Option<IdTransform>,
    pub(crate) files: Vec<GenFile<O>>,
    // Anonymous objects that received an identifier, in naming order.
    pub(crate) anonymous: Vec<O>,
}

impl<O: Object> Generator<O> {
    pub fn new(name: Option<&str>, language: Option<&str>) -> Generator<O> {
        Generator {
            name: name.map(str::to_string),
            language: language.unwrap_or("c").to_string(),
            id_kind: IdKind::Default,
            objects: Vec::new(),
            attributes: FnvHashMap::default(),
            imports: IndexSet::new(),
            imports_nested: IndexSet::new(),
            current: None,
            in_walk: false,
            driver: None,
            id_transform: None,
            files: Vec::new(),
            anonymous: Vec::new(),
        }
    }

    ///
    /// The configured name, or the identifier of the current root when no
    /// name was configured.
    ///
    pub fn name(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.current_object().map(|o| o.ident()))
    }

    ///
    /// The project name: the part of the generator name after the last `/`
    /// or `:` separator.
    ///
    pub fn project_name(&self) -> Option<String> {
        self.name().map(|name| {
            name.rsplit(['/', ':'])
                .next()
                .expect("rsplit yields at least one segment")
                .to_string()
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    ///
    /// Controls how identifiers are generated; returns the previous kind.
    ///
    pub fn set_id_kind(&mut self, kind: IdKind) -> IdKind {
        std::mem::replace(&mut self.id_kind, kind)
    }

    pub fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    ///
    /// The object currently being walked.
    ///
    pub fn current_object(&self) -> Option<O> {
        self.current
            .and_then(|index| self.objects.get(index))
            .map(|root| root.object.clone())
    }

    ///
    /// Instructs the generator to generate for `object`. Registering the
    /// same object twice is a no-op.
    ///
    pub fn parse(&mut self, object: O, parse_self: bool, parse_scope: bool, prefix: Option<&str>) {
        if self.objects.iter().any(|root| root.object == object) {
            return;
        }

        self.objects.push(GenObject {
            object,
            parse_self,
            parse_scope,
            prefix: prefix.map(str::to_string),
        });

        if (parse_self || parse_scope) && self.current.is_none() {
            self.current = Some(self.objects.len() - 1);
        }
    }

    pub fn set_attribute(&mut self, key: &str, value: &str) {
        self.attributes.insert(key.to_string(), value.to_string());
    }

    ///
    /// The value of an attribute; the empty string when unset.
    ///
    pub fn attribute(&self, key: &str) -> &str {
        self.attributes.get(key).map(String::as_str).unwrap_or("")
    }

    ///
    /// Imports a package, transitively loading the packages it depends on
    /// into the nested-imports list (their prefixes must be known to
    /// translate identifiers that cross package boundaries).
    ///
    pub fn import(&mut self, package: O) {
        if self.imports.insert(package.clone()) {
            for nested in package.package_imports() {
                self.import_nested(nested);
            }
        }
    }

    fn import_nested(&mut self, package: O) {
        if !self.imports.contains(&package) && self.imports_nested.insert(package.clone()) {
            for nested in package.package_imports() {
                self.import_nested(nested);
            }
        }
    }

    pub fn imports(&self) -> impl Iterator<Item = &O> {
        self.imports.iter()
    }

    pub fn nested_imports(&self) -> impl Iterator<Item = &O> {
        self.imports_nested.iter()
    }

    ///
    /// Loads a driver, replacing any previous one. The generator is reset
    /// to its initial state first, so a driver never observes files or id
    /// configuration left behind by its predecessor.
    ///
    pub fn load(&mut self, driver: Box<dyn Driver<O>>) {
        self.reset();
        self.id_transform = driver.id_transform();
        self.driver = Some(driver);
    }

    ///
    /// Runs the loaded driver's entry point.
    ///
    pub fn start(&mut self) -> Result<(), String> {
        let mut driver = self
            .driver
            .take()
            .ok_or_else(|| "no driver loaded".to_string())?;
        let result = driver.start(self);
        self.driver = Some(driver);
        result.map_err(|message| format!("generator failed: {message}"))
    }

    ///
    /// Returns the generator to its initial state: stops and drops the
    /// driver, closes open files (re-emitting their unused code islands),
    /// and restores the default identifier configuration. Configured
    /// objects, attributes and imports survive a reset.
    ///
    pub fn reset(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.stop(self);
        }

        let files = std::mem::take(&mut self.files);
        for file in files {
            if let Err(err) = file.flush_unused() {
                warn!("{}: {}", file.path().display(), err);
            }
        }

        self.id_kind = IdKind::Default;
        self.id_transform = None;
        self.in_walk = false;
        self.current = self
            .objects
            .iter()
            .position(|root| root.parse_self || root.parse_scope);
    }

    ///
    /// True if generation must cover `o`: anonymous objects always, named
    /// objects when they carry the generation marker and the current root
    /// covers them.
    ///
    pub fn must_parse(&self, o: &O) -> bool {
        if o.is_named() {
            self.is_marked(o) && self.covered_by_current(o)
        } else {
            true
        }
    }

    // When generating core types (bootstrap = true) every object in the
    // configured scopes is covered, since bootstrap objects were not created
    // by this generator. Ordinary runs only cover marked objects, so new
    // objects can be dropped into existing scopes without regenerating their
    // neighbors.
    pub(crate) fn is_marked(&self, o: &O) -> bool {
        self.attribute("bootstrap") == "true" || o.marked()
    }

    fn covered_by_current(&self, o: &O) -> bool {
        let Some(index) = self.current else {
            return false;
        };
        let root = &self.objects[index];

        if root.parse_self && root.object == *o {
            return true;
        }

        if root.parse_scope {
            let mut ancestor = o.parent();
            while let Some(scope) = ancestor {
                if scope == root.object {
                    return true;
                }
                ancestor = scope.parent();
            }
        }

        false
    }

    pub(crate) fn roots(&self) -> &[GenObject<O>] {
        &self.objects
    }

    ///
    /// Visits every configured root and, where configured, one level into
    /// its scope. Returns `Ok(false)` if the action stopped the walk.
    ///
    pub fn walk<F>(&mut self, action: &mut F) -> Result<bool, String>
    where
        F: FnMut(&mut Generator<O>, &O) -> Result<bool, String>,
    {
        self.walk_ext(action, true, false)
    }

    ///
    /// Visits only the configured roots themselves, even those configured
    /// for scope parsing.
    ///
    pub fn walk_no_scope<F>(&mut self, action: &mut F) -> Result<bool, String>
    where
        F: FnMut(&mut Generator<O>, &O) -> Result<bool, String>,
    {
        self.walk_ext(action, false, false)
    }

    ///
    /// Visits every configured root and its full subtree.
    ///
    pub fn walk_recursive<F>(&mut self, action: &mut F) -> Result<bool, String>
    where
        F: FnMut(&mut Generator<O>, &O) -> Result<bool, String>,
    {
        self.walk_ext(action, true, true)
    }

    fn walk_ext<F>(
        &mut self,
        action: &mut F,
        scope_walk: bool,
        recursive: bool,
    ) -> Result<bool, String>
    where
        F: FnMut(&mut Generator<O>, &O) -> Result<bool, String>,
    {
        if self.in_walk {
            // Re-entered from a driver callback: continue with the object
            // that is currently being walked.
            let saved = self.current;
            let result = match saved {
                Some(index) => self.walk_object(index, action, scope_walk, recursive),
                None => Ok(true),
            };
            self.current = saved;
            return result;
        }

        self.in_walk = true;
        let mut result = Ok(true);
        for index in 0..self.objects.len() {
            match self.walk_object(index, action, scope_walk, recursive) {
                Ok(true) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }
        self.in_walk = false;
        result
    }

    fn walk_object<F>(
        &mut self,
        index: usize,
        action: &mut F,
        scope_walk: bool,
        recursive: bool,
    ) -> Result<bool, String>
    where
        F: FnMut(&mut Generator<O>, &O) -> Result<bool, String>,
    {
        let root = self.objects[index].clone();

        if root.parse_self {
            self.current = Some(index);
            if !action(self, &root.object)? {
                return Ok(false);
            }
        }

        if root.parse_scope && scope_walk {
            self.current = Some(index);
            if recursive {
                if !self.scope_walk_recursive(&root.object, action)? {
                    return Ok(false);
                }
            } else if !self.scope_walk(&root.object, action)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn scope_walk<F>(&mut self, o: &O, action: &mut F) -> Result<bool, String>
    where
        F: FnMut(&mut Generator<O>, &O) -> Result<bool, String>,
    {
        for child in o.scope() {
            if self.is_marked(&child) && !action(self, &child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn scope_walk_recursive<F>(&mut self, o: &O, action: &mut F) -> Result<bool, String>
    where
        F: FnMut(&mut Generator<O>, &O) -> Result<bool, String>,
    {
        for child in o.scope() {
            if self.is_marked(&child) {
                if !action(self, &child)? {
                    return Ok(false);
                }
                if !self.scope_walk_recursive(&child, action)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests;
