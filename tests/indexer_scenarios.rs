// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scenario tests for the per-TU indexer, driven by hand-built event
//! streams matching small C++ snippets.

mod common;

use common::*;
use semindex::frontend::{
    BaseClassInfo, ContainerKind, DeclEvent, DiagnosticEvent, EntityKind, IncludeEvent,
    MacroEvent, MacroEventKind, ParseEvent, RefEvent, TranslationUnit, TypeRefChild, VarTypeInfo,
};
use semindex::index_file::IndexFuncRef;
use semindex::types::{ClangSymbolKind, Diagnostic, DiagnosticSeverity, Range};

/// class Foo {
///   void foo() const;
/// };
///
/// void Foo::foo() const {}
#[test]
fn method_definition() {
    let path = "/src/method.cc";
    let source = "class Foo {\n  void foo() const;\n};\n\nvoid Foo::foo() const {}\n";

    let class_usr = "c:@S@Foo";
    let method_usr = "c:@S@Foo@F@foo#1";
    let class_container = type_container(class_usr, "Foo", ContainerKind::Class);

    let class_decl = class_def(
        path,
        class_usr,
        "Foo",
        Range::spanning(1, 7, 1, 10),
        Range::spanning(1, 1, 3, 2),
    );

    let mut method_decl = DeclEvent::named(path, method_usr, "foo", EntityKind::CxxInstanceMethod);
    method_decl.spelling = Range::spanning(2, 8, 2, 11);
    method_decl.extent = Range::spanning(2, 3, 2, 19);
    method_decl.func_type_desc = Some("void () const".to_string());
    method_decl.semantic_container = Some(class_container.clone());
    method_decl.lexical_container = Some(class_container.clone());

    let mut method_def = DeclEvent::named(path, method_usr, "foo", EntityKind::CxxInstanceMethod);
    method_def.is_definition = true;
    method_def.is_redeclaration = true;
    method_def.spelling = Range::spanning(5, 11, 5, 14);
    method_def.extent = Range::spanning(5, 1, 5, 25);
    method_def.func_type_desc = Some("void () const".to_string());
    method_def.semantic_container = Some(class_container.clone());
    method_def.lexical_container = Some(type_container("", "", ContainerKind::TranslationUnit));
    // Out-of-line definition: the trailing TypeRef to Foo is skipped by
    // the declaration walk; the reference event below records the use.
    method_def.type_refs = vec![TypeRefChild {
        usr: class_usr.to_string(),
        spelling: Range::spanning(5, 6, 5, 9),
    }];

    let class_ref = RefEvent::to_entity(
        path,
        class_usr,
        EntityKind::CxxClass,
        Range::spanning(5, 6, 5, 9),
    );

    let indexes = index_tu(
        path,
        source,
        events(vec![class_decl, method_decl, method_def], vec![class_ref]),
    );
    let index = index_for(&indexes, path);

    let foo_type = index.find_type("Foo").expect("type Foo indexed");
    assert_eq!(
        foo_type.def.definition_spelling,
        Some(Range::spanning(1, 7, 1, 10))
    );
    assert_eq!(
        foo_type.def.definition_extent,
        Some(Range::spanning(1, 1, 3, 2))
    );
    assert_eq!(
        foo_type.uses,
        vec![Range::spanning(1, 7, 1, 10), Range::spanning(5, 6, 5, 9)]
    );

    let foo_func = index.find_func("foo").expect("func foo indexed");
    assert_eq!(foo_func.def.detailed_name, "void Foo::foo() const");
    assert!(!foo_func.def.is_operator);
    assert_eq!(
        foo_func.def.definition_spelling,
        Some(Range::spanning(5, 11, 5, 14))
    );
    assert_eq!(
        foo_func.def.definition_extent,
        Some(Range::spanning(5, 1, 5, 25))
    );
    assert_eq!(foo_func.declarations.len(), 1);
    let declaration = &foo_func.declarations[0];
    assert_eq!(declaration.spelling, Range::spanning(2, 8, 2, 11));
    assert_eq!(declaration.extent, Range::spanning(2, 3, 2, 19));
    assert_eq!(declaration.content, "void foo() const");

    assert_eq!(foo_func.def.declaring_type, Some(foo_type.id));
    assert_eq!(foo_type.def.funcs, vec![foo_func.id]);
}

/// void called() {}
/// void caller() {
///   called();
/// }
#[test]
fn function_call_records_both_directions() {
    let path = "/src/call.cc";
    let source = "void called() {}\nvoid caller() {\n  called();\n}\n";

    let called_usr = "c:@F@called#";
    let caller_usr = "c:@F@caller#";

    let tu = events(
        vec![
            function_def(
                path,
                called_usr,
                "called",
                "void ()",
                Range::spanning(1, 6, 1, 12),
                Range::spanning(1, 1, 1, 17),
            ),
            function_def(
                path,
                caller_usr,
                "caller",
                "void ()",
                Range::spanning(2, 6, 2, 12),
                Range::spanning(2, 1, 4, 2),
            ),
        ],
        vec![call_ref(
            path,
            called_usr,
            EntityKind::Function,
            "called",
            caller_usr,
            Range::spanning(3, 3, 3, 9),
            Range::spanning(3, 3, 3, 11),
        )],
    );

    let indexes = index_tu(path, source, tu);
    let index = index_for(&indexes, path);

    let called = index.find_func("called").unwrap();
    let caller = index.find_func("caller").unwrap();

    assert_eq!(
        called.callers,
        vec![IndexFuncRef::new(
            Some(caller.id),
            Range::spanning(3, 3, 3, 9),
            false
        )]
    );
    assert_eq!(
        caller.def.callees,
        vec![IndexFuncRef::new(
            Some(called.id),
            Range::spanning(3, 3, 3, 9),
            false
        )]
    );
}

/// struct Type {
///   Type() {}
/// };
///
/// void Make() {
///   Type foo;
///   auto foo2 = Type();
/// }
#[test]
fn implicit_constructor_calls() {
    let path = "/src/ctor.cc";
    let source =
        "struct Type {\n  Type() {}\n};\n\nvoid Make() {\n  Type foo;\n  auto foo2 = Type();\n}\n";

    let type_usr = "c:@S@Type";
    let ctor_usr = "c:@S@Type@F@Type#";
    let make_usr = "c:@F@Make#";
    let struct_container = type_container(type_usr, "Type", ContainerKind::Struct);

    let type_decl = class_def(
        path,
        type_usr,
        "Type",
        Range::spanning(1, 8, 1, 12),
        Range::spanning(1, 1, 3, 2),
    );

    let mut ctor_decl = DeclEvent::named(path, ctor_usr, "Type", EntityKind::CxxConstructor);
    ctor_decl.is_definition = true;
    ctor_decl.spelling = Range::spanning(2, 3, 2, 7);
    ctor_decl.extent = Range::spanning(2, 3, 2, 12);
    ctor_decl.func_type_desc = Some("void ()".to_string());
    ctor_decl.semantic_container = Some(struct_container.clone());
    ctor_decl.lexical_container = Some(struct_container.clone());

    let make_decl = function_def(
        path,
        make_usr,
        "Make",
        "void ()",
        Range::spanning(5, 6, 5, 10),
        Range::spanning(5, 1, 8, 2),
    );

    // For `Type foo;` the reference range covers the variable name, so
    // the constructor name is not spelled at the call site.
    let declaration_site = call_ref(
        path,
        ctor_usr,
        EntityKind::CxxConstructor,
        "Type",
        make_usr,
        Range::spanning(6, 8, 6, 11),
        Range::spanning(6, 8, 6, 11),
    );

    // `Type()` spells the constructor name, hence explicit.
    let expression_site = call_ref(
        path,
        ctor_usr,
        EntityKind::CxxConstructor,
        "Type",
        make_usr,
        Range::spanning(7, 15, 7, 19),
        Range::spanning(7, 15, 7, 21),
    );

    let indexes = index_tu(
        path,
        source,
        events(
            vec![type_decl, ctor_decl, make_decl],
            vec![declaration_site, expression_site],
        ),
    );
    let index = index_for(&indexes, path);

    let ctor = index.find_func("Type").unwrap();
    let make = index.find_func("Make").unwrap();
    assert_eq!(
        ctor.callers,
        vec![
            IndexFuncRef::new(Some(make.id), Range::spanning(6, 8, 6, 11), true),
            IndexFuncRef::new(Some(make.id), Range::spanning(7, 15, 7, 19), false),
        ]
    );

    // Constructor declarations also mark a use of the declaring type.
    let ty = index.find_type("Type").unwrap();
    assert!(ty.uses.contains(&Range::spanning(2, 3, 2, 7)));
    assert_eq!(ty.def.funcs, vec![ctor.id]);
}

/// struct Type { Type() {} };
/// void Make() { auto x = make_unique<Type>(); }
#[test]
fn make_heuristic_attributes_factory_calls_to_the_constructor() {
    let path = "/src/make.cc";
    let source = "struct Type { Type() {} };\nvoid Make() { auto x = make_unique<Type>(); }\n";

    let type_usr = "c:@S@Type";
    let ctor_usr = "c:@S@Type@F@Type#";
    let make_usr = "c:@F@Make#";
    let factory_usr = "c:@N@std@FT@>1#Tmake_unique#";
    let struct_container = type_container(type_usr, "Type", ContainerKind::Struct);

    let type_decl = class_def(
        path,
        type_usr,
        "Type",
        Range::spanning(1, 8, 1, 12),
        Range::spanning(1, 1, 1, 26),
    );
    let mut ctor_decl = DeclEvent::named(path, ctor_usr, "Type", EntityKind::CxxConstructor);
    ctor_decl.is_definition = true;
    ctor_decl.spelling = Range::spanning(1, 15, 1, 19);
    ctor_decl.extent = Range::spanning(1, 15, 1, 24);
    ctor_decl.semantic_container = Some(struct_container.clone());
    ctor_decl.lexical_container = Some(struct_container);
    let make_decl = function_def(
        path,
        make_usr,
        "Make",
        "void ()",
        Range::spanning(2, 6, 2, 10),
        Range::spanning(2, 1, 2, 46),
    );

    let mut factory_call = call_ref(
        path,
        factory_usr,
        EntityKind::Function,
        "make_unique",
        make_usr,
        Range::spanning(2, 24, 2, 35),
        Range::spanning(2, 24, 2, 44),
    );
    factory_call.referenced_is_template = true;
    factory_call.first_type_ref_usr = Some(type_usr.to_string());

    let indexes = index_tu(
        path,
        source,
        events(
            vec![type_decl, ctor_decl, make_decl],
            vec![factory_call],
        ),
    );
    let index = index_for(&indexes, path);

    let ctor = index.find_func("Type").unwrap();
    // One implicit caller entry attributed via the constructor cache, with
    // no caller id (the factory itself is the direct callee).
    assert!(ctor
        .callers
        .iter()
        .any(|r| r.id.is_none() && r.is_implicit && r.loc == Range::spanning(2, 24, 2, 35)));
}

/// struct A {};
/// struct B : A {};
#[test]
fn inheritance_is_symmetric() {
    let path = "/src/inherit.cc";
    let source = "struct A {};\nstruct B : A {};\n";

    let a_usr = "c:@S@A";
    let b_usr = "c:@S@B";

    let a_decl = class_def(
        path,
        a_usr,
        "A",
        Range::spanning(1, 8, 1, 9),
        Range::spanning(1, 1, 1, 12),
    );
    let mut b_decl = class_def(
        path,
        b_usr,
        "B",
        Range::spanning(2, 8, 2, 9),
        Range::spanning(2, 1, 2, 16),
    );
    b_decl.bases = vec![BaseClassInfo {
        declaration_usr: a_usr.to_string(),
        type_refs: vec![TypeRefChild {
            usr: a_usr.to_string(),
            spelling: Range::spanning(2, 12, 2, 13),
        }],
    }];

    let indexes = index_tu(path, source, events(vec![a_decl, b_decl], vec![]));
    let index = index_for(&indexes, path);

    let a = index.find_type("A").unwrap();
    let b = index.find_type("B").unwrap();
    assert_eq!(a.derived, vec![b.id]);
    assert_eq!(b.def.parents, vec![a.id]);
    // The base spelling is recorded as a use of A.
    assert!(a.uses.contains(&Range::spanning(2, 12, 2, 13)));
}

#[test]
fn virtual_overrides_link_base_and_derived() {
    let path = "/src/virtual.cc";
    let source = "struct A { virtual void f(); };\nstruct B : A { void f() override; };\n";

    let base_usr = "c:@S@A@F@f#";
    let override_usr = "c:@S@B@F@f#";

    let mut base_decl = DeclEvent::named(path, base_usr, "f", EntityKind::CxxInstanceMethod);
    base_decl.spelling = Range::spanning(1, 25, 1, 26);
    base_decl.extent = Range::spanning(1, 12, 1, 28);
    base_decl.func_type_desc = Some("void ()".to_string());
    base_decl.is_virtual = true;
    base_decl.semantic_container = Some(type_container("c:@S@A", "A", ContainerKind::Struct));

    let mut override_decl =
        DeclEvent::named(path, override_usr, "f", EntityKind::CxxInstanceMethod);
    override_decl.spelling = Range::spanning(2, 21, 2, 22);
    override_decl.extent = Range::spanning(2, 16, 2, 33);
    override_decl.func_type_desc = Some("void ()".to_string());
    override_decl.is_virtual = true;
    override_decl.overridden_usrs = vec![base_usr.to_string()];
    override_decl.semantic_container = Some(type_container("c:@S@B", "B", ContainerKind::Struct));

    let indexes = index_tu(
        path,
        source,
        events(vec![base_decl, override_decl], vec![]),
    );
    let index = index_for(&indexes, path);

    let base = index.funcs.iter().find(|f| f.usr == semindex::hash_usr(base_usr)).unwrap();
    let derived = index
        .funcs
        .iter()
        .find(|f| f.usr == semindex::hash_usr(override_usr))
        .unwrap();
    assert_eq!(derived.def.base, vec![base.id]);
    assert_eq!(base.derived, vec![derived.id]);
}

#[test]
fn variables_get_detail_hover_and_type_instances() {
    let path = "/src/vars.cc";
    let source = "struct Foo {};\nFoo foo = Foo();\nint x = 3;\n";

    let foo_type_usr = "c:@S@Foo";
    let type_decl = class_def(
        path,
        foo_type_usr,
        "Foo",
        Range::spanning(1, 8, 1, 11),
        Range::spanning(1, 1, 1, 14),
    );

    let mut var_decl = DeclEvent::named(path, "c:@foo", "foo", EntityKind::Variable);
    var_decl.is_definition = true;
    var_decl.spelling = Range::spanning(2, 5, 2, 8);
    var_decl.extent = Range::spanning(2, 1, 2, 16);
    var_decl.var_type = Some(VarTypeInfo {
        spelling: "Foo".to_string(),
        declaration_usr: foo_type_usr.to_string(),
        is_plain: true,
    });

    let mut int_decl = DeclEvent::named(path, "c:@x", "x", EntityKind::Variable);
    int_decl.is_definition = true;
    int_decl.spelling = Range::spanning(3, 5, 3, 6);
    int_decl.extent = Range::spanning(3, 1, 3, 10);
    int_decl.var_type = Some(VarTypeInfo {
        spelling: "int".to_string(),
        declaration_usr: String::new(),
        is_plain: true,
    });

    let indexes = index_tu(
        path,
        source,
        events(vec![type_decl, var_decl, int_decl], vec![]),
    );
    let index = index_for(&indexes, path);

    let foo_var = index.find_var("foo").unwrap();
    assert_eq!(foo_var.def.detailed_name, "Foo foo");
    // Hover carries everything from the spelled name to the end of the
    // extent.
    assert_eq!(foo_var.def.hover.as_deref(), Some("Foo foo = Foo()"));
    assert_eq!(foo_var.def.kind, ClangSymbolKind::Variable);
    assert_eq!(foo_var.uses, vec![Range::spanning(2, 5, 2, 8)]);

    let x = index.find_var("x").unwrap();
    assert_eq!(x.def.detailed_name, "int x");
    assert_eq!(x.def.hover.as_deref(), Some("int x = 3"));

    // foo is an instance of Foo, and its variable_type edge is set.
    let foo_type = index.find_type("Foo").unwrap();
    assert_eq!(foo_type.instances, vec![foo_var.id]);
    assert_eq!(foo_var.def.variable_type, Some(foo_type.id));
}

#[test]
fn enumerators_show_their_value() {
    let path = "/src/enum.cc";
    let source = "enum E { A = 7 };\n";

    let enum_container = type_container("c:@E@E", "E", ContainerKind::Enum);
    let mut enum_decl = DeclEvent::named(path, "c:@E@E", "E", EntityKind::Enum);
    enum_decl.is_definition = true;
    enum_decl.spelling = Range::spanning(1, 6, 1, 7);
    enum_decl.extent = Range::spanning(1, 1, 1, 17);

    let mut enumerator = DeclEvent::named(path, "c:@E@E@A", "A", EntityKind::EnumConstant);
    enumerator.is_definition = true;
    enumerator.spelling = Range::spanning(1, 10, 1, 11);
    enumerator.extent = Range::spanning(1, 10, 1, 15);
    enumerator.semantic_container = Some(enum_container);
    enumerator.enum_value = Some(semindex::frontend::EnumValue::Signed(7));
    enumerator.var_type = Some(VarTypeInfo {
        spelling: "E".to_string(),
        declaration_usr: "c:@E@E".to_string(),
        is_plain: true,
    });

    let indexes = index_tu(path, source, events(vec![enum_decl, enumerator], vec![]));
    let index = index_for(&indexes, path);

    let a = index.find_var("A").unwrap();
    assert_eq!(a.def.detailed_name, "E::A");
    assert_eq!(a.def.hover.as_deref(), Some("E::A = 7"));
    assert_eq!(a.def.kind, ClangSymbolKind::EnumConstant);

    // Enum members are not instances of the enum type.
    let e = index.find_type("E").unwrap();
    assert!(e.instances.is_empty());
}

#[test]
fn macros_index_as_vars_with_define_hover() {
    let path = "/src/macro.cc";
    let source = "#define FOO 1\nint x = FOO;\n";

    let tu = TranslationUnit {
        macros: vec![
            MacroEvent {
                kind: MacroEventKind::Definition,
                file: path.to_string(),
                usr: "c:macro@FOO".to_string(),
                name: "FOO".to_string(),
                spelling: Range::spanning(1, 9, 1, 12),
                extent: Range::spanning(1, 9, 1, 14),
                comments: None,
            },
            MacroEvent {
                kind: MacroEventKind::Expansion,
                file: path.to_string(),
                usr: "c:macro@FOO".to_string(),
                name: "FOO".to_string(),
                spelling: Range::spanning(2, 9, 2, 12),
                extent: Range::spanning(2, 9, 2, 12),
                comments: None,
            },
        ],
        ..Default::default()
    };

    let indexes = index_tu(path, source, tu);
    let index = index_for(&indexes, path);

    let foo = index.find_var("FOO").unwrap();
    assert!(foo.def.is_macro);
    assert_eq!(foo.def.kind, ClangSymbolKind::Macro);
    assert_eq!(foo.def.hover.as_deref(), Some("#define FOO 1"));
    assert_eq!(
        foo.uses,
        vec![Range::spanning(1, 9, 1, 12), Range::spanning(2, 9, 2, 12)]
    );
}

#[test]
fn headers_are_owned_once_and_errors_surface_at_the_include() {
    let tu_path = "/src/main.cc";
    let header_path = "/src/common.h";

    let header_error = Diagnostic {
        range: Range::spanning(4, 1, 4, 9),
        severity: DiagnosticSeverity::Error,
        message: "unknown type name 'Broken'".to_string(),
        code: None,
    };

    let tu = TranslationUnit {
        events: vec![
            ParseEvent::Include(IncludeEvent {
                file: tu_path.to_string(),
                line: 1,
                resolved_path: header_path.to_string(),
            }),
            ParseEvent::Declaration(class_def(
                header_path,
                "c:@S@Shared",
                "Shared",
                Range::spanning(2, 8, 2, 14),
                Range::spanning(2, 1, 2, 17),
            )),
            ParseEvent::Diagnostic(DiagnosticEvent {
                file: header_path.to_string(),
                diagnostic: header_error.clone(),
            }),
        ],
        ..Default::default()
    };

    let shared = semindex::FileConsumerSharedState::new();
    let request = semindex::ParseRequest {
        path: tu_path.to_string(),
        args: vec![],
        unsaved: vec![],
    };
    let indexes = semindex::indexer::index_translation_unit(&shared, &request, &tu);

    assert_eq!(indexes.len(), 2);
    let main = index_for(&indexes, tu_path);
    let header = index_for(&indexes, header_path);

    // The header owns its symbol and diagnostic.
    assert!(header.find_type("Shared").is_some());
    assert_eq!(header.diagnostics, vec![header_error.clone()]);
    assert_eq!(header.import_file, tu_path);
    assert!(header.dependencies.contains(&tu_path.to_string()));

    // The TU records the include and mirrors the header's first error at
    // column 10 of the include line.
    assert_eq!(main.includes.len(), 1);
    assert_eq!(main.diagnostics.len(), 1);
    assert_eq!(main.diagnostics[0].range, Range::spanning(1, 10, 1, 10));
    assert_eq!(main.diagnostics[0].message, header_error.message);

    // A second TU seeing the same header does not index it again.
    let other_request = semindex::ParseRequest {
        path: "/src/other.cc".to_string(),
        args: vec![],
        unsaved: vec![],
    };
    let other_tu = TranslationUnit {
        events: vec![ParseEvent::Declaration(class_def(
            header_path,
            "c:@S@Shared",
            "Shared",
            Range::spanning(2, 8, 2, 14),
            Range::spanning(2, 1, 2, 17),
        ))],
        ..Default::default()
    };
    let other_indexes =
        semindex::indexer::index_translation_unit(&shared, &other_request, &other_tu);
    assert!(other_indexes.iter().all(|index| index.path != header_path));
}

#[test]
fn skipped_preprocessor_ranges_start_at_the_hash() {
    let path = "/src/skip.cc";
    let tu = TranslationUnit {
        skipped_ranges: vec![(path.to_string(), Range::spanning(3, 2, 5, 7))],
        ..Default::default()
    };

    let indexes = index_tu(path, "#if 0\nint x;\n#endif\n", tu);
    let index = index_for(&indexes, path);
    assert_eq!(
        index.skipped_by_preprocessor,
        vec![Range::spanning(3, 1, 5, 7)]
    );
}

#[test]
fn unnamed_parameter_spellings_shrink_to_points() {
    let path = "/src/params.cc";
    let source = "void f(int, int named);\n";

    let mut decl = DeclEvent::named(path, "c:@F@f#I#I#", "f", EntityKind::Function);
    decl.spelling = Range::spanning(1, 6, 1, 7);
    decl.extent = Range::spanning(1, 1, 1, 23);
    decl.func_type_desc = Some("void (int, int)".to_string());
    decl.params = vec![
        semindex::frontend::ParamInfo {
            spelling: Range::spanning(1, 11, 1, 12),
            name: String::new(),
        },
        semindex::frontend::ParamInfo {
            spelling: Range::spanning(1, 17, 1, 22),
            name: "named".to_string(),
        },
    ];

    let indexes = index_tu(path, source, events(vec![decl], vec![]));
    let index = index_for(&indexes, path);

    let f = index.find_func("f").unwrap();
    assert_eq!(f.declarations.len(), 1);
    assert_eq!(
        f.declarations[0].param_spellings,
        vec![Range::spanning(1, 11, 1, 11), Range::spanning(1, 17, 1, 22)]
    );
}

#[test]
fn calls_outside_any_function_have_no_caller_id() {
    let path = "/src/global.cc";
    let source = "int gen();\nint x = gen();\n";

    let gen_usr = "c:@F@gen#";
    let mut gen_decl = DeclEvent::named(path, gen_usr, "gen", EntityKind::Function);
    gen_decl.spelling = Range::spanning(1, 5, 1, 8);
    gen_decl.extent = Range::spanning(1, 1, 1, 10);
    gen_decl.func_type_desc = Some("int ()".to_string());

    let mut global_call = RefEvent::to_entity(
        path,
        gen_usr,
        EntityKind::Function,
        Range::spanning(2, 9, 2, 12),
    );
    global_call.referenced_name = Some("gen".to_string());
    global_call.extent = Range::spanning(2, 9, 2, 14);

    let indexes = index_tu(path, source, events(vec![gen_decl], vec![global_call]));
    let index = index_for(&indexes, path);

    let gen = index.find_func("gen").unwrap();
    assert_eq!(
        gen.callers,
        vec![IndexFuncRef::new(None, Range::spanning(2, 9, 2, 12), false)]
    );
}
