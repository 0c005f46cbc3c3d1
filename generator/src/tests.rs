// Copyright 2024 Metagen project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use depresolver::{Node, Requires};

use crate::{
    Driver, Generator, IdKind, IdTransform, Object, OrderedActions, RefMember, RefUse,
};

///
/// A small reflective object model: handles with identity semantics around
/// shared, mutable descriptions, enough to exercise every introspection
/// path the generator consumes.
///
#[derive(Clone)]
struct TObj(Rc<TData>);

// A reference-valued field: target plus the member's (requirement,
// condition) pair, when the reference sits in a member.
type TRef = (TObj, Option<(Requires, Option<bool>)>);

struct TData {
    name: Option<String>,
    root: bool,
    value_key: u32,
    builtin: Cell<bool>,
    package: Cell<bool>,
    class: Cell<bool>,
    procedure: Cell<bool>,
    has_value: Cell<bool>,
    marked: Cell<bool>,
    overloaded: Cell<bool>,
    parent_requires: Cell<Requires>,
    parent: RefCell<Option<TObj>>,
    type_of: RefCell<Option<TObj>>,
    base: RefCell<Option<TObj>>,
    scope: RefCell<Vec<TObj>>,
    params: RefCell<Vec<TObj>>,
    refs: RefCell<Vec<TRef>>,
    imports: RefCell<Vec<TObj>>,
    members: RefCell<Vec<TObj>>,
}

impl TObj {
    fn raw(name: Option<&str>, root: bool, value_key: u32) -> TObj {
        TObj(Rc::new(TData {
            name: name.map(str::to_string),
            root,
            value_key,
            builtin: Cell::new(false),
            package: Cell::new(false),
            class: Cell::new(false),
            procedure: Cell::new(false),
            has_value: Cell::new(true),
            marked: Cell::new(true),
            overloaded: Cell::new(false),
            parent_requires: Cell::new(Requires::Valid),
            parent: RefCell::new(None),
            type_of: RefCell::new(None),
            base: RefCell::new(None),
            scope: RefCell::new(Vec::new()),
            params: RefCell::new(Vec::new()),
            refs: RefCell::new(Vec::new()),
            imports: RefCell::new(Vec::new()),
            members: RefCell::new(Vec::new()),
        }))
    }

    fn root() -> TObj {
        TObj::raw(Some("/"), true, 0)
    }

    fn named(name: &str, parent: &TObj) -> TObj {
        let o = TObj::raw(Some(name), false, 0);
        *o.0.parent.borrow_mut() = Some(parent.clone());
        parent.0.scope.borrow_mut().push(o.clone());
        o
    }

    fn anonymous(value_key: u32) -> TObj {
        TObj::raw(None, false, value_key)
    }

    fn as_package(self) -> TObj {
        self.0.package.set(true);
        self
    }

    fn as_class(self) -> TObj {
        self.0.class.set(true);
        self
    }

    fn as_procedure(self) -> TObj {
        self.0.procedure.set(true);
        self
    }

    fn as_builtin(self) -> TObj {
        self.0.builtin.set(true);
        self
    }

    fn without_value(self) -> TObj {
        self.0.has_value.set(false);
        self
    }

    fn unmarked(self) -> TObj {
        self.0.marked.set(false);
        self
    }

    fn with_overload(self) -> TObj {
        self.0.overloaded.set(true);
        self
    }

    fn with_parent_requires(self, requires: Requires) -> TObj {
        self.0.parent_requires.set(requires);
        self
    }

    fn with_type(self, type_of: &TObj) -> TObj {
        *self.0.type_of.borrow_mut() = Some(type_of.clone());
        self
    }

    fn with_base(self, base: &TObj) -> TObj {
        *self.0.base.borrow_mut() = Some(base.clone());
        self
    }

    fn with_param(self, param: &TObj) -> TObj {
        self.0.params.borrow_mut().push(param.clone());
        self
    }

    fn with_ref(self, target: &TObj, member: Option<(Requires, Option<bool>)>) -> TObj {
        self.0.refs.borrow_mut().push((target.clone(), member));
        self
    }

    fn with_import(self, package: &TObj) -> TObj {
        self.0.imports.borrow_mut().push(package.clone());
        self
    }

    fn with_member(self, member: &TObj) -> TObj {
        self.0.members.borrow_mut().push(member.clone());
        self
    }
}

impl PartialEq for TObj {
    fn eq(&self, other: &TObj) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TObj {}

impl Hash for TObj {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for TObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for TObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.root {
            return write!(f, "/");
        }
        if self.0.name.is_none() {
            return write!(f, "<anonymous:{}>", self.0.value_key);
        }

        let mut segments = Vec::new();
        let mut cursor = Some(self.clone());
        while let Some(o) = cursor {
            if o.0.root {
                break;
            }
            segments.push(o.ident());
            cursor = o.parent();
        }
        segments.reverse();
        write!(f, "/{}", segments.join("/"))
    }
}

impl Node for TObj {
    fn is_root(&self) -> bool {
        self.0.root
    }
}

impl Object for TObj {
    fn ident(&self) -> String {
        self.0.name.clone().unwrap_or_default()
    }

    fn type_of(&self) -> TObj {
        self.0.type_of.borrow().clone().unwrap_or_else(|| self.clone())
    }

    fn parent(&self) -> Option<TObj> {
        self.0.parent.borrow().clone()
    }

    fn is_named(&self) -> bool {
        self.0.name.is_some()
    }

    fn is_builtin(&self) -> bool {
        self.0.builtin.get()
    }

    fn is_package(&self) -> bool {
        self.0.package.get()
    }

    fn is_class(&self) -> bool {
        self.0.class.get()
    }

    fn is_procedure(&self) -> bool {
        self.0.procedure.get()
    }

    fn has_value(&self) -> bool {
        self.0.has_value.get()
    }

    fn marked(&self) -> bool {
        self.0.marked.get()
    }

    fn overloaded(&self) -> bool {
        self.0.overloaded.get()
    }

    fn value_eq(&self, other: &TObj) -> bool {
        if self == other {
            return true;
        }
        self.0.name.is_none() && other.0.name.is_none() && self.0.value_key == other.0.value_key
    }

    fn scope(&self) -> Vec<TObj> {
        self.0.scope.borrow().clone()
    }

    fn param_types(&self) -> Vec<TObj> {
        self.0.params.borrow().clone()
    }

    fn method_base(&self) -> Option<TObj> {
        self.0.base.borrow().clone()
    }

    fn parent_requires(&self) -> Requires {
        self.0.parent_requires.get()
    }

    fn reference_uses(&self) -> Vec<RefUse<TObj>> {
        self.0
            .refs
            .borrow()
            .iter()
            .map(|(target, member)| RefUse {
                target: target.clone(),
                member: (*member).map(|(requires, cond)| RefMember { requires, cond }),
            })
            .collect()
    }

    fn package_imports(&self) -> Vec<TObj> {
        self.0.imports.borrow().clone()
    }

    fn inherited_members(&self) -> Vec<TObj> {
        self.0.members.borrow().clone()
    }
}

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl OrderedActions<TObj> for Recorder {
    fn on_declare(&mut self, _g: &mut Generator<TObj>, o: &TObj) -> Result<(), String> {
        self.events.push(format!("declare {o}"));
        Ok(())
    }

    fn on_define(&mut self, _g: &mut Generator<TObj>, o: &TObj) -> Result<(), String> {
        self.events.push(format!("define {o}"));
        Ok(())
    }
}

fn generator() -> Generator<TObj> {
    Generator::new(Some("test"), Some("c"))
}

#[test]
fn ordered_walk_defines_references_first() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let a = TObj::named("a", &app);
    let b = TObj::named("b", &app);
    let _a = a.with_ref(&b, Some((Requires::Valid, None)));

    let mut g = generator();
    g.parse(app, true, true, None);

    let mut recorder = Recorder::default();
    g.walk_ordered(&mut recorder).unwrap();
    assert_eq!(
        recorder.events,
        vec![
            "declare /app",
            "define /app",
            "declare /app/a",
            "declare /app/b",
            "define /app/b",
            "define /app/a",
        ]
    );
}

#[test]
fn declared_parent_waits_for_valid_children() {
    let root = TObj::root();
    let p = TObj::named("p", &root);
    let c = TObj::named("c", &p).with_parent_requires(Requires::Declared);

    let mut g = generator();
    g.parse(p, true, true, None);

    let mut recorder = Recorder::default();
    g.walk_ordered(&mut recorder).unwrap();
    assert_eq!(
        recorder.events,
        vec!["declare /p", "declare /p/c", "define /p/c", "define /p"]
    );
    let _ = c;
}

#[test]
fn builtin_bypasses_the_resolver() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package().as_builtin();
    let x = TObj::named("x", &app);
    let v = TObj::named("v", &app).without_value();
    // Edges that would deadlock a dependency walk must be ignored outright.
    let _x = x.with_ref(&v, Some((Requires::Valid, None)));

    let mut g = generator();
    g.parse(app, true, true, None);

    let mut recorder = Recorder::default();
    g.walk_ordered(&mut recorder).unwrap();
    assert_eq!(
        recorder.events,
        vec![
            "declare /app",
            "declare /app/x",
            "declare /app/v",
            "define /app",
            "define /app/x",
        ]
    );
}

#[test]
fn false_member_condition_flips_the_requirement() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let a = TObj::named("a", &app);
    let b = TObj::named("b", &app);
    // Unflipped this would be a VALID-on-VALID cycle; the false condition
    // downgrades a's requirement on b to DECLARED.
    let _a = a.clone().with_ref(&b, Some((Requires::Valid, Some(false))));
    let _b = b.with_ref(&a, Some((Requires::Valid, None)));

    let mut g = generator();
    g.parse(app, true, true, None);

    let mut recorder = Recorder::default();
    g.walk_ordered(&mut recorder).unwrap();
    assert_eq!(
        recorder.events,
        vec![
            "declare /app",
            "define /app",
            "declare /app/a",
            "declare /app/b",
            "define /app/a",
            "define /app/b",
        ]
    );
}

#[test]
fn type_and_parameter_edges_order_declarations() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let ty = TObj::named("ty", &app);
    TObj::named("o", &app).with_type(&ty);
    TObj::named("f(ty a)", &app).as_procedure().with_param(&ty);

    let mut g = generator();
    g.parse(app, true, true, None);

    let mut recorder = Recorder::default();
    g.walk_ordered(&mut recorder).unwrap();
    assert_eq!(
        recorder.events,
        vec![
            "declare /app",
            "define /app",
            "declare /app/ty",
            "define /app/ty",
            "declare /app/o",
            "define /app/o",
            "declare /app/f(ty a)",
            "define /app/f(ty a)",
        ]
    );
}

#[test]
fn methods_wait_for_the_base_of_their_class() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let m = TObj::named("m()", &app).as_procedure();
    let base = TObj::named("base", &app);
    m.with_base(&base);

    let mut g = generator();
    g.parse(app, true, true, None);

    let mut recorder = Recorder::default();
    g.walk_ordered(&mut recorder).unwrap();
    // The method comes first in the scope, but its declaration waits for
    // the base to be defined.
    assert_eq!(
        recorder.events,
        vec![
            "declare /app",
            "define /app",
            "declare /app/base",
            "define /app/base",
            "declare /app/m()",
            "define /app/m()",
        ]
    );
}

#[test]
fn value_less_slots_skip_define() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let v = TObj::named("v", &app).without_value();

    let mut g = generator();
    g.parse(app, true, true, None);

    let mut recorder = Recorder::default();
    g.walk_ordered(&mut recorder).unwrap();
    assert_eq!(
        recorder.events,
        vec!["declare /app", "define /app", "declare /app/v"]
    );
    let _ = v;
}

#[test]
fn structurally_equal_anonymous_objects_merge() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let first = TObj::anonymous(7);
    let second = TObj::anonymous(7);
    let _a = TObj::named("a", &app).with_ref(&first, Some((Requires::Valid, None)));
    let _b = TObj::named("b", &app).with_ref(&second, Some((Requires::Valid, None)));

    let mut g = generator();
    g.parse(app, true, true, None);

    let mut recorder = Recorder::default();
    g.walk_ordered(&mut recorder).unwrap();

    let anonymous_events = recorder
        .events
        .iter()
        .filter(|event| event.contains("anonymous"))
        .count();
    assert_eq!(anonymous_events, 2, "events: {:?}", recorder.events);

    // Both handles resolve to the identifier of the canonical representative.
    assert_eq!(g.full_id(&first), "anonymous_app_0");
    assert_eq!(g.full_id(&second), "anonymous_app_0");
}

#[test]
fn unmarked_children_are_skipped() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let marked = TObj::named("m", &app);
    let unmarked = TObj::named("u", &app).unmarked();

    let mut g = generator();
    g.parse(app.clone(), false, true, None);

    let mut visited = Vec::new();
    g.walk(&mut |_g, o| {
        visited.push(o.to_string());
        Ok(true)
    })
    .unwrap();
    assert_eq!(visited, vec!["/app/m"]);

    // The bootstrap attribute includes every object in scope.
    g.set_attribute("bootstrap", "true");
    let mut visited = Vec::new();
    g.walk(&mut |_g, o| {
        visited.push(o.to_string());
        Ok(true)
    })
    .unwrap();
    assert_eq!(visited, vec!["/app/m", "/app/u"]);

    let _ = (marked, unmarked);
}

#[test]
fn reentrant_walk_stays_on_the_current_root() {
    let root = TObj::root();
    let one = TObj::named("one", &root);
    let two = TObj::named("two", &root);

    let mut g = generator();
    g.parse(one, true, false, None);
    g.parse(two, true, false, None);

    let mut outer = Vec::new();
    let mut inner = Vec::new();
    g.walk_no_scope(&mut |g, o| {
        outer.push(o.to_string());
        let mut seen = Vec::new();
        g.walk_no_scope(&mut |_g, o| {
            seen.push(o.to_string());
            Ok(true)
        })?;
        inner.push(seen);
        Ok(true)
    })
    .unwrap();

    assert_eq!(outer, vec!["/one", "/two"]);
    assert_eq!(inner, vec![vec!["/one"], vec!["/two"]]);
}

#[test]
fn full_id_uses_the_object_path() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let foo = TObj::named("foo", &app);

    let mut g = generator();
    g.parse(app, true, true, None);
    assert_eq!(g.full_id(&foo), "app/foo");
}

#[test]
fn prefix_substitutes_the_root_segment() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let foo = TObj::named("foo", &app);

    let mut g = generator();
    g.parse(app.clone(), true, true, Some("ap"));
    assert_eq!(g.full_id(&foo), "ap/foo");
    assert_eq!(g.full_id(&app), "ap");
    assert_eq!(g.prefix_for(&foo).as_deref(), Some("ap"));
}

#[test]
fn non_overloaded_procedures_drop_their_arguments() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let bar = TObj::named("bar(int32 a)", &app).as_procedure();

    let mut g = generator();
    g.parse(app, true, true, None);
    assert_eq!(g.full_id(&bar), "app/bar");
}

#[test]
fn overloaded_procedures_keep_a_type_only_signature() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let baz = TObj::named("baz(int32 a,string b)", &app)
        .as_procedure()
        .with_overload();

    let mut g = generator();
    g.parse(app, true, true, None);
    assert_eq!(g.full_id(&baz), "app/baz(int32,string)");
}

#[test]
fn class_segments_follow_the_id_kind() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let foo = TObj::named("foo", &app).as_class();

    let mut g = generator();
    g.parse(app, true, true, None);

    g.set_id_kind(IdKind::ClassUpper);
    assert_eq!(g.full_id(&foo), "app/Foo");

    g.set_id_kind(IdKind::ClassLower);
    assert_eq!(g.full_id(&foo), "app/foo");
}

#[test]
fn local_id_is_relative_to_the_current_scope() {
    let root = TObj::root();
    let vendor = TObj::named("vendor", &root).as_package();
    let app = TObj::named("app", &vendor).as_package();
    let foo = TObj::named("foo", &app);

    let mut g = generator();
    g.parse(app, true, true, None);
    assert_eq!(g.full_id(&foo), "vendor/app/foo");
    assert_eq!(g.local_id(&foo), "app/foo");
}

#[test]
fn driver_transform_reaches_every_identifier() {
    struct UnderscoreDriver;

    impl Driver<TObj> for UnderscoreDriver {
        fn start(&mut self, _g: &mut Generator<TObj>) -> Result<(), String> {
            Ok(())
        }

        fn id_transform(&self) -> Option<IdTransform> {
            let transform: IdTransform = |id| id.replace('/', "_");
            Some(transform)
        }
    }

    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let foo = TObj::named("foo", &app);

    let mut g = generator();
    g.parse(app, true, true, None);
    g.load(Box::new(UnderscoreDriver));

    assert_eq!(g.full_id(&foo), "app_foo");
    assert_eq!(g.id("raw/id"), "raw_id");
}

#[test]
fn member_names_disambiguate_collisions() {
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let base_x = TObj::named("x", &app);
    let x = TObj::named("x", &app);
    let y = TObj::named("y", &app);
    let ty = TObj::named("ty", &app)
        .with_member(&base_x)
        .with_member(&y)
        .with_member(&x);

    let g = generator();
    let cache = g.member_cache(&ty);
    assert_eq!(g.member_name(&cache, &base_x), "x");
    assert_eq!(g.member_name(&cache, &y), "y");
    assert_eq!(g.member_name(&cache, &x), "x_1");
}

#[test]
fn project_name_strips_the_path() {
    let g: Generator<TObj> = Generator::new(Some("driver/gen/c"), None);
    assert_eq!(g.project_name().as_deref(), Some("c"));

    let g: Generator<TObj> = Generator::new(Some("vendor:tool"), None);
    assert_eq!(g.project_name().as_deref(), Some("tool"));
}

#[test]
fn imports_load_nested_packages_transitively() {
    let root = TObj::root();
    let p3 = TObj::named("p3", &root).as_package();
    let p2 = TObj::named("p2", &root).as_package().with_import(&p3);
    let p1 = TObj::named("p1", &root).as_package().with_import(&p2);

    let mut g = generator();
    g.import(p1.clone());
    g.import(p1.clone());

    assert_eq!(g.imports().collect::<Vec<_>>(), vec![&p1]);
    assert_eq!(g.nested_imports().collect::<Vec<_>>(), vec![&p2, &p3]);
}

#[test]
fn driver_start_runs_an_ordered_walk() {
    struct TestDriver {
        log: Rc<RefCell<Vec<String>>>,
    }

    struct SharedRecorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl OrderedActions<TObj> for SharedRecorder {
        fn on_define(&mut self, _g: &mut Generator<TObj>, o: &TObj) -> Result<(), String> {
            self.log.borrow_mut().push(format!("define {o}"));
            Ok(())
        }
    }

    impl Driver<TObj> for TestDriver {
        fn start(&mut self, g: &mut Generator<TObj>) -> Result<(), String> {
            let mut actions = SharedRecorder {
                log: self.log.clone(),
            };
            g.walk_ordered(&mut actions)
        }
    }

    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();
    let a = TObj::named("a", &app);

    let mut g = generator();
    g.parse(app, true, true, None);

    let log = Rc::new(RefCell::new(Vec::new()));
    g.load(Box::new(TestDriver { log: log.clone() }));
    g.start().unwrap();

    assert_eq!(*log.borrow(), vec!["define /app", "define /app/a"]);
    let _ = a;
}

#[test]
fn failing_driver_is_surfaced() {
    struct FailingDriver;

    impl Driver<TObj> for FailingDriver {
        fn start(&mut self, _g: &mut Generator<TObj>) -> Result<(), String> {
            Err("no output directory".to_string())
        }
    }

    let mut g = generator();
    g.load(Box::new(FailingDriver));
    let err = g.start().unwrap_err();
    assert_eq!(err, "generator failed: no output directory");
}

#[test]
fn loading_a_driver_stops_the_previous_one() {
    struct StopDriver {
        stopped: Rc<Cell<bool>>,
    }

    impl Driver<TObj> for StopDriver {
        fn start(&mut self, _g: &mut Generator<TObj>) -> Result<(), String> {
            Ok(())
        }

        fn stop(&mut self, _g: &mut Generator<TObj>) {
            self.stopped.set(true);
        }
    }

    let stopped = Rc::new(Cell::new(false));
    let mut g = generator();
    g.load(Box::new(StopDriver {
        stopped: stopped.clone(),
    }));
    assert!(!stopped.get());

    g.load(Box::new(StopDriver {
        stopped: Rc::new(Cell::new(false)),
    }));
    assert!(stopped.get());
}

#[test]
fn files_are_bucketed_by_extension_attribute() {
    let dir = tempfile::tempdir().unwrap();
    let include = dir.path().join("include");

    let mut g = generator();
    g.set_attribute("h", include.to_str().unwrap());

    let file = g.open_file("foo.h").unwrap();
    file.write("#pragma once\n").unwrap();
    g.close_file(file).unwrap();

    assert_eq!(
        std::fs::read_to_string(include.join("foo.h")).unwrap(),
        "#pragma once\n"
    );
    // read_file resolves through the same extension attribute.
    assert_eq!(g.read_file("foo.h").unwrap(), "#pragma once\n");
}

#[test]
fn indentation_prefixes_new_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.c");

    let mut g = generator();
    let file = g.open_file(path.to_str().unwrap()).unwrap();
    file.write("one\n").unwrap();
    file.indent();
    file.write("two\n").unwrap();
    file.write("continued ").unwrap();
    file.write("line\n").unwrap();
    file.dedent();
    file.write("three\n").unwrap();
    g.close_file(file).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, "one\n    two\n    continued line\nthree\n");
}

#[test]
fn code_islands_survive_regeneration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("impl.c");
    std::fs::write(
        &path,
        "/* $header(impl) */\n#include \"x.h\"\n$end */\n\
         int before;\n\
         /* $begin(app/main) */\nreturn custom();\n$end */\n\
         /* $begin(app/gone) */\nkeep me\n$end */\n",
    )
    .unwrap();

    let mut g = generator();
    let file = g.open_file(path.to_str().unwrap()).unwrap();

    assert_eq!(
        file.lookup_header("impl").as_deref(),
        Some("#include \"x.h\"\n")
    );
    // Leading scope separators and case differences are tolerated.
    assert_eq!(
        file.lookup_snippet("/App/Main").as_deref(),
        Some("return custom();\n")
    );
    assert_eq!(file.lookup_snippet("app/missing"), None);

    file.write("int regenerated;\n").unwrap();
    g.close_file(file).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("int regenerated;\n"));
    // The unused island is re-emitted verbatim.
    assert!(written.contains("$begin(app/gone)\nkeep me\n$end\n"));
    // Referenced islands are not.
    assert!(!written.contains("app/main"));
}

#[test]
fn nested_begin_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.c");
    std::fs::write(
        &path,
        "/* $begin(outer) */\n/* $begin(inner) */\n$end */\n",
    )
    .unwrap();

    let mut g = generator();
    let err = g.open_file(path.to_str().unwrap()).unwrap_err();
    assert!(err.contains("nested $begin"), "unexpected error: {err}");
}

#[test]
fn old_files_are_recovered_before_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gen.c");
    let mut old = path.as_os_str().to_owned();
    old.push(".old");
    std::fs::write(
        std::path::PathBuf::from(old),
        "/* $begin(saved) */\nold code\n$end */\n",
    )
    .unwrap();

    let mut g = generator();
    let file = g.open_file(path.to_str().unwrap()).unwrap();
    assert_eq!(file.lookup_snippet("saved").as_deref(), Some("old code\n"));
    g.close_file(file).unwrap();
}

#[test]
fn open_files_can_be_looked_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.c");

    let mut g = generator();
    let file = g.open_file(path.to_str().unwrap()).unwrap();
    let again = g.lookup_file(path.to_str().unwrap()).unwrap();

    file.write("a\n").unwrap();
    again.write("b\n").unwrap();
    g.close_file(file).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    assert!(g.lookup_file(path.to_str().unwrap()).is_none());
}

#[test]
fn hidden_files_use_the_hidden_attribute() {
    let dir = tempfile::tempdir().unwrap();

    let mut g = generator();
    assert_eq!(
        g.hidden_file_path("state.json"),
        std::path::PathBuf::from(".corto/state.json")
    );

    g.set_attribute("hidden", dir.path().join(".hidden").to_str().unwrap());
    let file = g.open_hidden_file("state.json").unwrap();
    file.write("{}\n").unwrap();
    g.close_file(file).unwrap();

    let written = std::fs::read_to_string(dir.path().join(".hidden/state.json")).unwrap();
    assert_eq!(written, "{}\n");
}

#[test]
fn file_scope_is_tracked() {
    let dir = tempfile::tempdir().unwrap();
    let root = TObj::root();
    let app = TObj::named("app", &root).as_package();

    let mut g = generator();
    let file = g.open_file(dir.path().join("s.c").to_str().unwrap()).unwrap();
    assert!(file.scope().is_none());
    file.set_scope(Some(app.clone()));
    assert_eq!(file.scope(), Some(app));
    g.close_file(file).unwrap();
}

#[test]
fn reset_closes_files_and_restores_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.c");
    std::fs::write(&path, "/* $begin(kept) */\nuser code\n$end */\n").unwrap();

    let mut g = generator();
    g.set_id_kind(IdKind::ClassUpper);
    let _file = g.open_file(path.to_str().unwrap()).unwrap();
    g.reset();

    assert_eq!(g.id_kind(), IdKind::Default);
    // The unreferenced island was re-emitted during the reset.
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("$begin(kept)\nuser code\n$end\n"));
}
