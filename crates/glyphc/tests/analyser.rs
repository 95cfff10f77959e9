//! Whole-package analysis: protocol conformance, boxing layers,
//! inheritance, and build fitness.

mod common;

use common::{base_package, pos, ty};
use glyph_ast::{
    AccessLevel, Expr, Function, Parameter, Stmt, Type, TypeDefinition, TypeDefKind, START_FLAG,
};
use glyphc::compiler::Compiler;
use glyphc::sema::SemanticAnalyser;

fn method(name: &str, return_type: Option<Type>, line: u32) -> Function {
    Function::new(name, return_type, pos(line))
}

fn body_returning(expr: Expr, line: u32) -> Vec<Stmt> {
    vec![Stmt::Return(Some(expr), pos(line))]
}

#[test]
fn conforming_class_gets_direct_heir() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let protocol = package.add_type(TypeDefinition::new("P", TypeDefKind::Protocol, pos(1)));
    let protocol_foo = package.add_method(protocol, method("foo", Some(integer), 1));

    let class = package.add_type(TypeDefinition::new(
        "C",
        TypeDefKind::Class { superclass: None },
        pos(2),
    ));
    let mut class_foo = method("foo", Some(integer), 3);
    class_foo.body = Some(body_returning(Expr::IntegerLiteral(1, pos(3)), 3));
    let class_foo = package.add_method(class, class_foo);
    package.def_mut(class).protocols.push(ty(protocol));

    let mut compiler = Compiler::new();
    let mut analyser = SemanticAnalyser::new(&mut package, &mut compiler);
    analyser.analyse(false);

    assert_eq!(analyser.heirs().get(&protocol_foo), Some(&class_foo));
    assert!(!compiler.has_errors());
    // The implementation gained its unspecific reification.
    assert!(package
        .function(class_foo)
        .unspecific_reification()
        .is_some());
}

#[test]
fn missing_protocol_method_names_type_and_method() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let protocol = package.add_type(TypeDefinition::new("P", TypeDefKind::Protocol, pos(1)));
    package.add_method(protocol, method("foo", Some(integer), 1));

    let class = package.add_type(TypeDefinition::new(
        "C",
        TypeDefKind::Class { superclass: None },
        pos(2),
    ));
    package.def_mut(class).protocols.push(ty(protocol));

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    assert_eq!(compiler.errors().len(), 1);
    let message = &compiler.errors()[0].message;
    assert!(message.contains("C"), "error names the class: {}", message);
    assert!(message.contains("foo"), "error names the method: {}", message);
    assert!(message.contains("P"), "error names the protocol: {}", message);
}

#[test]
fn storage_mismatched_return_synthesises_boxing_layer() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    // Integer conforms to Q, so returning Integer where Q is promised is
    // type-correct but needs a representation change.
    let q = package.add_type(TypeDefinition::new("Q", TypeDefKind::Protocol, pos(1)));
    package.def_mut(builtins.integer).protocols.push(ty(q));

    let protocol = package.add_type(TypeDefinition::new("P", TypeDefKind::Protocol, pos(2)));
    let protocol_foo = package.add_method(protocol, method("foo", Some(ty(q)), 2));

    let class = package.add_type(TypeDefinition::new(
        "C",
        TypeDefKind::Class { superclass: None },
        pos(3),
    ));
    let mut class_foo = method("foo", Some(integer), 4);
    class_foo.body = Some(body_returning(Expr::IntegerLiteral(7, pos(4)), 4));
    let class_foo = package.add_method(class, class_foo);
    package.def_mut(class).protocols.push(ty(protocol));

    let method_count_before = package.def(class).methods.len();
    let mut compiler = Compiler::new();
    let mut analyser = SemanticAnalyser::new(&mut package, &mut compiler);
    analyser.analyse(false);
    let heirs = analyser.into_heirs();

    assert!(!compiler.has_errors());
    // Exactly one boxing layer joined the class's methods.
    assert_eq!(package.def(class).methods.len(), method_count_before + 1);
    let layer = *heirs.get(&protocol_foo).expect("heir appointed");
    assert_ne!(layer, class_foo, "heir is the layer, not the original");
    let layer_fn = package.function(layer);
    assert!(layer_fn.boxing_layer);
    assert_eq!(layer_fn.name, "foo");
    assert_eq!(layer_fn.owner, Some(class));
    assert!(package.def(class).methods.contains(&class_foo));
    assert!(package.def(class).methods.contains(&layer));
}

#[test]
fn storage_mismatched_parameter_synthesises_boxing_layer() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();

    let q = package.add_type(TypeDefinition::new("Q", TypeDefKind::Protocol, pos(1)));

    // The class argument is more specific in representation only: D
    // conforms to Q, the protocol promises a D, the class accepts any Q.
    let d = package.add_type(TypeDefinition::new(
        "D",
        TypeDefKind::Class { superclass: None },
        pos(1),
    ));
    package.def_mut(d).protocols.push(ty(q));

    let protocol = package.add_type(TypeDefinition::new("P", TypeDefKind::Protocol, pos(2)));
    let mut promised = method("handle", None, 2);
    promised.arguments = vec![Parameter {
        name: "x".into(),
        ty: ty(d),
    }];
    let promised = package.add_method(protocol, promised);

    let class = package.add_type(TypeDefinition::new(
        "C",
        TypeDefKind::Class { superclass: None },
        pos(3),
    ));
    let mut implementation = method("handle", None, 4);
    implementation.arguments = vec![Parameter {
        name: "x".into(),
        ty: ty(q),
    }];
    implementation.body = Some(vec![]);
    let implementation = package.add_method(class, implementation);
    package.def_mut(class).protocols.push(ty(protocol));

    let mut compiler = Compiler::new();
    let mut analyser = SemanticAnalyser::new(&mut package, &mut compiler);
    analyser.analyse(false);
    let heirs = analyser.into_heirs();

    assert!(!compiler.has_errors(), "errors: {:?}", compiler.errors());
    let layer = *heirs.get(&promised).expect("heir appointed");
    assert_ne!(layer, implementation);
    assert!(package.function(layer).boxing_layer);
    // The layer carries the protocol's signature.
    assert_eq!(package.function(layer).arguments[0].ty, ty(d));
}

#[test]
fn final_method_reimplementation_is_an_error() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let protocol = package.add_type(TypeDefinition::new("P", TypeDefKind::Protocol, pos(1)));
    let mut promised = method("foo", Some(integer), 1);
    promised.is_final = true;
    package.add_method(protocol, promised);

    let class = package.add_type(TypeDefinition::new(
        "C",
        TypeDefKind::Class { superclass: None },
        pos(2),
    ));
    let mut class_foo = method("foo", Some(integer), 9);
    class_foo.body = Some(body_returning(Expr::IntegerLiteral(1, pos(9)), 9));
    package.add_method(class, class_foo);
    package.def_mut(class).protocols.push(ty(protocol));

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    assert_eq!(compiler.errors().len(), 1);
    assert_eq!(compiler.errors()[0].position, pos(9));
    assert!(compiler.errors()[0].message.contains("final"));
}

#[test]
fn access_level_mismatch_is_an_error() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let protocol = package.add_type(TypeDefinition::new("P", TypeDefKind::Protocol, pos(1)));
    package.add_method(protocol, method("foo", Some(integer), 1));

    let class = package.add_type(TypeDefinition::new(
        "C",
        TypeDefKind::Class { superclass: None },
        pos(2),
    ));
    let mut class_foo = method("foo", Some(integer), 3);
    class_foo.access_level = AccessLevel::Private;
    class_foo.body = Some(body_returning(Expr::IntegerLiteral(1, pos(3)), 3));
    package.add_method(class, class_foo);
    package.def_mut(class).protocols.push(ty(protocol));

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    assert_eq!(compiler.errors().len(), 1);
    assert!(compiler.errors()[0].message.contains("Access level"));
}

#[test]
fn executable_without_start_flag_is_fatal_library_is_not() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, _) = base_package();

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(true);
    assert_eq!(compiler.errors().len(), 1);
    assert!(compiler.errors()[0].message.contains(START_FLAG));

    let (mut library, _) = base_package();
    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut library, &mut compiler).analyse(false);
    assert!(!compiler.has_errors());
}

#[test]
fn executable_with_start_flag_passes() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, _) = base_package();
    let mut start = Function::new(START_FLAG, None, pos(1));
    start.body = Some(vec![]);
    package.add_free_function(start);

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(true);
    assert!(!compiler.has_errors());
}

#[test]
fn instance_variables_without_initializers_warn() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();

    let vt = package.add_type(TypeDefinition::new(
        "Pair",
        TypeDefKind::ValueType { primitive: None },
        pos(5),
    ));
    package.def_mut(vt).instance_variables = vec![
        glyph_ast::InstanceVariable {
            name: "first".into(),
            ty: ty(builtins.integer),
            position: pos(5),
        },
        glyph_ast::InstanceVariable {
            name: "second".into(),
            ty: ty(builtins.integer),
            position: pos(6),
        },
    ];

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    assert!(!compiler.has_errors());
    assert_eq!(compiler.warnings().len(), 1);
    assert!(compiler.warnings()[0].1.contains("2 instance variables"));
}

#[test]
fn class_inherits_superclass_methods_deduplicated() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let base = package.add_type(TypeDefinition::new(
        "Base",
        TypeDefKind::Class { superclass: None },
        pos(1),
    ));
    let mut inherited = method("inherited", Some(integer), 1);
    inherited.body = Some(body_returning(Expr::IntegerLiteral(1, pos(1)), 1));
    let inherited = package.add_method(base, inherited);
    let mut overridden = method("overridden", Some(integer), 2);
    overridden.body = Some(body_returning(Expr::IntegerLiteral(2, pos(2)), 2));
    let overridden_base = package.add_method(base, overridden);

    let sub = package.add_type(TypeDefinition::new(
        "Sub",
        TypeDefKind::Class {
            superclass: Some(base),
        },
        pos(3),
    ));
    let mut override_fn = method("overridden", Some(integer), 4);
    override_fn.body = Some(body_returning(Expr::IntegerLiteral(3, pos(4)), 4));
    let override_sub = package.add_method(sub, override_fn);

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    assert!(!compiler.has_errors());
    let methods = &package.def(sub).methods;
    assert!(methods.contains(&inherited), "inherited method is visible");
    assert!(methods.contains(&override_sub));
    assert!(
        !methods.contains(&overridden_base),
        "overridden superclass method is deduplicated"
    );
}

#[test]
fn function_bodies_get_dense_ids_and_counts() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let mut function = Function::new("locals", Some(integer), pos(1));
    function.arguments = vec![Parameter {
        name: "seed".into(),
        ty: integer,
    }];
    function.body = Some(vec![
        Stmt::VariableDeclaration {
            name: "count".into(),
            ty: integer,
            frozen: false,
            init: Some(Expr::variable("seed", pos(2))),
            position: pos(2),
            id: None,
        },
        Stmt::Assignment {
            name: "count".into(),
            value: Expr::IntegerLiteral(5, pos(3)),
            position: pos(3),
            id: None,
            in_instance_scope: false,
        },
        Stmt::Return(Some(Expr::variable("count", pos(4))), pos(4)),
    ]);
    let function = package.add_free_function(function);

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    assert!(!compiler.has_errors());
    let analysed = package.function(function);
    assert_eq!(analysed.variable_count, 2);
    let Some(Stmt::VariableDeclaration { id, .. }) = analysed.body.as_ref().map(|b| &b[0]) else {
        panic!("declaration survived analysis");
    };
    assert_eq!(*id, Some(1));
}

#[test]
fn frozen_variable_assignment_is_an_error() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let mut function = Function::new("stubborn", None, pos(1));
    function.body = Some(vec![
        Stmt::VariableDeclaration {
            name: "ice".into(),
            ty: integer,
            frozen: true,
            init: Some(Expr::IntegerLiteral(1, pos(2))),
            position: pos(2),
            id: None,
        },
        Stmt::Assignment {
            name: "ice".into(),
            value: Expr::IntegerLiteral(2, pos(3)),
            position: pos(3),
            id: None,
            in_instance_scope: false,
        },
    ]);
    package.add_free_function(function);

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    assert_eq!(compiler.errors().len(), 1);
    assert!(compiler.errors()[0].message.contains("frozen"));
    assert_eq!(compiler.errors()[0].position, pos(3));
}

#[test]
fn one_bad_function_does_not_suppress_the_rest() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let mut bad = Function::new("bad", None, pos(1));
    bad.body = Some(vec![Stmt::ExprStmt(Expr::variable("ghost", pos(1)))]);
    package.add_free_function(bad);

    let mut also_bad = Function::new("also_bad", None, pos(2));
    also_bad.body = Some(vec![Stmt::Assignment {
        name: "phantom".into(),
        value: Expr::IntegerLiteral(1, pos(2)),
        position: pos(2),
        id: None,
        in_instance_scope: false,
    }]);
    package.add_free_function(also_bad);

    let mut fine = Function::new("fine", Some(integer), pos(3));
    fine.body = Some(body_returning(Expr::IntegerLiteral(1, pos(3)), 3));
    let fine = package.add_free_function(fine);

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    // Both failures surface and the healthy function is still analysed.
    assert_eq!(compiler.errors().len(), 2);
    assert!(package.function(fine).body.is_some());
}

#[test]
fn extension_adds_methods_and_conformance_before_analysis() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();
    let integer = ty(builtins.integer);

    let protocol = package.add_type(TypeDefinition::new("P", TypeDefKind::Protocol, pos(1)));
    let promised = package.add_method(protocol, method("foo", Some(integer), 1));

    let class = package.add_type(TypeDefinition::new(
        "C",
        TypeDefKind::Class { superclass: None },
        pos(2),
    ));

    // The extension supplies both the conformance and the implementation.
    let mut extension_foo = method("foo", Some(integer), 3);
    extension_foo.body = Some(body_returning(Expr::IntegerLiteral(1, pos(3)), 3));
    let extension_foo = package.add_function(extension_foo);
    package.extensions.push(glyph_ast::Extension {
        target: class,
        methods: vec![extension_foo],
        protocols: vec![ty(protocol)],
        position: pos(3),
    });

    let mut compiler = Compiler::new();
    let mut analyser = SemanticAnalyser::new(&mut package, &mut compiler);
    analyser.analyse(false);

    assert!(!compiler.has_errors());
    assert_eq!(analyser.heirs().get(&promised), Some(&extension_foo));
    assert_eq!(package.function(extension_foo).owner, Some(class));
}

#[test]
fn argument_promise_violation_names_both_types() {
    let _guard = glyphc::diagnostics::suppress();
    let (mut package, builtins) = base_package();

    let protocol = package.add_type(TypeDefinition::new("P", TypeDefKind::Protocol, pos(1)));
    let mut promised = method("take", None, 1);
    promised.arguments = vec![Parameter {
        name: "x".into(),
        ty: ty(builtins.integer),
    }];
    package.add_method(protocol, promised);

    let class = package.add_type(TypeDefinition::new(
        "C",
        TypeDefKind::Class { superclass: None },
        pos(2),
    ));
    let mut implementation = method("take", None, 3);
    implementation.arguments = vec![Parameter {
        name: "x".into(),
        ty: ty(builtins.double),
    }];
    implementation.body = Some(vec![]);
    package.add_method(class, implementation);
    package.def_mut(class).protocols.push(ty(protocol));

    let mut compiler = Compiler::new();
    SemanticAnalyser::new(&mut package, &mut compiler).analyse(false);

    assert!(compiler.has_errors());
    let message = &compiler.errors()[0].message;
    // Sub-type and super-type appear distinctly.
    assert!(message.contains("Double"), "{}", message);
    assert!(message.contains("Integer"), "{}", message);
}
