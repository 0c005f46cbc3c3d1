// Copyright 2024 Metagen project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use itertools::Itertools;

use crate::model::Object;
use crate::{GenObject, Generator, IdKind};

impl<O: Object> Generator<O> {
    ///
    /// Translates an object to a language-specific identifier, honoring the
    /// configured id kind.
    ///
    pub fn full_id(&mut self, o: &O) -> String {
        let kind = self.id_kind();
        self.full_id_ext(o, kind)
    }

    ///
    /// Translates an object to a local identifier (no package path).
    ///
    pub fn local_id(&mut self, o: &O) -> String {
        self.full_id_ext(o, IdKind::Local)
    }

    ///
    /// Translates an object to an identifier with the id kind provided.
    ///
    pub fn full_id_ext(&mut self, o: &O, kind: IdKind) -> String {
        let id = if o.is_named() {
            let path = match kind {
                IdKind::Local => self.local_path(o),
                _ => self.prefixed_path(o),
            };
            let mangled = mangle_procedure(o, path);
            match kind {
                IdKind::ClassUpper => case_class_segments(o, mangled, true),
                IdKind::ClassLower => case_class_segments(o, mangled, false),
                _ => mangled,
            }
        } else {
            self.anonymous_id(o)
        };

        self.transform(&id)
    }

    ///
    /// Applies the driver's identifier transform to a raw string.
    ///
    pub fn id(&self, raw: &str) -> String {
        self.transform(raw)
    }

    ///
    /// The prefix configured for the nearest root that covers `o`, if any.
    ///
    pub fn prefix_for(&self, o: &O) -> Option<String> {
        self.nearest_root(o).and_then(|root| root.prefix.clone())
    }

    ///
    /// Builds the member-name cache for a type: every member, inherited ones
    /// first, tagged with the number of earlier members carrying the same
    /// name.
    ///
    pub fn member_cache(&self, type_of: &O) -> MemberCache<O> {
        let mut entries: Vec<(O, u32)> = Vec::new();
        for member in type_of.inherited_members() {
            let occurred = entries
                .iter()
                .filter(|(existing, _)| existing.ident() == member.ident())
                .count() as u32;
            entries.push((member, occurred));
        }
        MemberCache { entries }
    }

    ///
    /// The name of a member, suffixed with its occurrence index when the
    /// name collides with an inherited member, so that flattened members can
    /// share one scope.
    ///
    pub fn member_name(&self, cache: &MemberCache<O>, member: &O) -> String {
        let occurred = cache
            .entries
            .iter()
            .find(|(existing, _)| existing == member)
            .map(|(_, occurred)| *occurred)
            .unwrap_or(0);

        let name = if occurred > 0 {
            format!("{}_{}", member.ident(), occurred)
        } else {
            member.ident()
        };

        self.transform(&name)
    }

    pub(crate) fn transform(&self, raw: &str) -> String {
        match self.id_transform {
            Some(transform) => transform(raw),
            None => raw.to_string(),
        }
    }

    // The configured root closest to `o` on its parent chain, `o` itself
    // included.
    fn nearest_root(&self, o: &O) -> Option<&GenObject<O>> {
        let mut ancestor = Some(o.clone());
        while let Some(scope) = ancestor {
            if let Some(root) = self.roots().iter().find(|root| root.object == scope) {
                return Some(root);
            }
            ancestor = scope.parent();
        }
        None
    }

    fn prefixed_path(&self, o: &O) -> String {
        if let Some(root) = self.nearest_root(o) {
            if let Some(prefix) = root.prefix.clone() {
                let rest = path_between(&root.object, o);
                return if rest.is_empty() {
                    prefix
                } else {
                    format!("{prefix}/{rest}")
                };
            }
        }
        full_path(o)
    }

    // Identifier relative to the enclosing scope of the current root.
    // Packages keep their full path; so does anything the current scope does
    // not reach.
    fn local_path(&self, o: &O) -> String {
        if o.is_package() {
            return full_path(o);
        }
        match self.current_object().and_then(|current| current.parent()) {
            Some(scope) if is_ancestor(&scope, o) => path_between(&scope, o),
            _ => full_path(o),
        }
    }

    ///
    /// Anonymous objects have no path; they are named by their position in
    /// the dedup list instead. Structurally equal anonymous objects share
    /// one position, and thereby one identifier.
    ///
    fn anonymous_id(&mut self, o: &O) -> String {
        let mut count = 0;
        let mut found = false;
        for existing in &self.anonymous {
            if existing == o || existing.value_eq(o) {
                found = true;
                break;
            }
            count += 1;
        }
        if !found {
            self.anonymous.push(o.clone());
        }

        match self.current_object() {
            Some(current) if current.is_package() => {
                let package = self.full_id(&current);
                format!("anonymous_{package}_{count}")
            }
            _ => format!("anonymous_{count}"),
        }
    }
}

///
/// A type's members tagged with their name-collision count; see
/// `Generator::member_cache`.
///
pub struct MemberCache<O> {
    entries: Vec<(O, u32)>,
}

fn full_path<O: Object>(o: &O) -> String {
    let mut segments = Vec::new();
    let mut cursor = Some(o.clone());
    while let Some(object) = cursor {
        if object.is_root() {
            break;
        }
        segments.push(object.ident());
        cursor = object.parent();
    }
    segments.reverse();
    segments.join("/")
}

// The path from `from` (exclusive) down to `o`; empty when they are the same
// object. `from` must be `o` or one of its ancestors.
fn path_between<O: Object>(from: &O, o: &O) -> String {
    let mut segments = Vec::new();
    let mut cursor = Some(o.clone());
    while let Some(object) = cursor {
        if object == *from || object.is_root() {
            break;
        }
        segments.push(object.ident());
        cursor = object.parent();
    }
    segments.reverse();
    segments.join("/")
}

fn is_ancestor<O: Object>(scope: &O, o: &O) -> bool {
    let mut cursor = o.parent();
    while let Some(parent) = cursor {
        if parent == *scope {
            return true;
        }
        cursor = parent.parent();
    }
    false
}

///
/// Procedures drop their argument list when they are not overloaded, which
/// keeps processing for back-ends trivial. An overloaded procedure keeps a
/// signature with only the parameter types, which is enough to generate
/// unique names in languages that do not support overloading.
///
fn mangle_procedure<O: Object>(o: &O, id: String) -> String {
    if !o.is_procedure() {
        return id;
    }

    if o.overloaded() {
        let (Some(open), Some(close)) = (id.find('('), id.rfind(')')) else {
            panic!("invalid signature '{id}'");
        };
        assert!(open < close, "invalid signature '{id}'");

        let types = id[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|param| !param.is_empty())
            .map(|param| match param.rfind(' ') {
                Some(space) => param[..space].trim_end(),
                None => param,
            })
            .join(",");
        format!("{}({})", &id[..open], types)
    } else {
        match id.find('(') {
            Some(open) => id[..open].to_string(),
            None => id,
        }
    }
}

fn case_class_segments<O: Object>(o: &O, id: String, upper: bool) -> String {
    let mut segments: Vec<String> = id.split('/').map(str::to_string).collect();

    // Walk the parent chain upwards while walking the segments backwards;
    // only segments belonging to class-like types change case.
    let mut cursor = Some(o.clone());
    for segment in segments.iter_mut().rev() {
        let Some(object) = cursor.take() else {
            break;
        };
        if object.is_class() && !segment.is_empty() {
            let first = segment.remove(0);
            let first = if upper {
                first.to_ascii_uppercase()
            } else {
                first.to_ascii_lowercase()
            };
            segment.insert(0, first);
        }
        cursor = object.parent().filter(|parent| !parent.is_root());
    }

    segments.join("/")
}
