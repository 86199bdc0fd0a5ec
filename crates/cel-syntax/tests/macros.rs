//! Macro expansion through the public parser.

mod common;

use std::collections::HashSet;

use cel_syntax::operators::{
    ADD, CONDITIONAL, EQUALS, GREATER, LESS_EQUALS, LOGICAL_AND, LOGICAL_NOT, LOGICAL_OR,
    MAP_INSERT, NOT_STRICTLY_FALSE,
};
use cel_syntax::{
    ArgCount, Ast, Comprehension, Constant, Expr, ExprKind, Macro, MacroError, MacroExprHelper,
    MacroStyle, Parser,
};
use common::{error_messages, root};
use pretty_assertions::assert_eq;

fn comprehension(expr: &Expr) -> &Comprehension {
    match &expr.kind {
        ExprKind::Comprehension(c) => c,
        other => panic!("expected comprehension, got {other:?}"),
    }
}

fn accu() -> String {
    "@result".to_string()
}

fn assert_ids_unique_and_located(ast: &Ast) {
    let ids = ast.root.ids();
    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len(), "duplicate ids in {:?}", ast.root);
    for id in ids {
        assert!(!ast.location(id).is_none(), "id {id} has no location");
    }
}

// ============================================================================
// has()
// ============================================================================

#[test]
fn has_becomes_presence_test() {
    let ast = common::assert_parses("has(a.b)");
    assert_eq!(ast.root, Expr::select(1, Expr::ident(2, "a"), "b", true));
    assert_eq!(ast.location(1).column, 3);
}

#[test]
fn presence_tests_take_over_the_call_ids() {
    let ast = common::assert_parses("has(a.b) && has(c.d)");
    assert_eq!(
        ast.root,
        Expr::call(
            7,
            LOGICAL_AND,
            vec![
                Expr::select(1, Expr::ident(2, "a"), "b", true),
                Expr::select(4, Expr::ident(5, "c"), "d", true),
            ],
        )
    );
    assert_ids_unique_and_located(&ast);
    assert_eq!(ast.location(4).column, 15);
}

#[test]
fn has_requires_a_selection() {
    assert_eq!(
        error_messages("has(a)"),
        vec!["invalid argument to has() macro"]
    );
    assert_eq!(
        error_messages("has(a.b())"),
        vec!["invalid argument to has() macro"]
    );
}

// ============================================================================
// Quantifiers
// ============================================================================

#[test]
fn all_expands_to_comprehension() {
    let expr = root("xs.all(x, x > 0)");
    assert_eq!(expr.id, 2);
    let c = comprehension(&expr);
    assert_eq!(c.iter_var, "x");
    assert_eq!(c.iter_var2, None);
    assert_eq!(c.iter_range, Expr::ident(1, "xs"));
    assert_eq!(c.accu_var, accu());
    assert_eq!(c.accu_init.kind, ExprKind::Const(Constant::Bool(true)));
    assert_eq!(c.loop_condition.function(), Some(NOT_STRICTLY_FALSE));
    assert_eq!(c.loop_step.function(), Some(LOGICAL_AND));
    assert_eq!(c.result.as_ident(), Some("@result"));
}

#[test]
fn exists_expands_to_comprehension() {
    let expr = root("xs.exists(x, x > 0)");
    let c = comprehension(&expr);
    assert_eq!(c.accu_init.kind, ExprKind::Const(Constant::Bool(false)));
    let ExprKind::Call { args, .. } = &c.loop_condition.kind else {
        panic!("expected call");
    };
    assert_eq!(args[0].function(), Some(LOGICAL_NOT));
    assert_eq!(c.loop_step.function(), Some(LOGICAL_OR));
}

#[test]
fn exists_one_spellings() {
    for input in ["xs.exists_one(x, x > 0)", "xs.existsOne(x, x > 0)"] {
        let expr = root(input);
        let c = comprehension(&expr);
        assert_eq!(c.accu_init.kind, ExprKind::Const(Constant::Int(0)));
        assert_eq!(c.loop_condition.function(), Some(LESS_EQUALS));
        assert_eq!(c.loop_step.function(), Some(CONDITIONAL));
        assert_eq!(c.result.function(), Some(EQUALS));
    }
}

#[test]
fn two_variable_quantifiers() {
    let expr = root("m.all(k, v, k == v)");
    let c = comprehension(&expr);
    assert_eq!(c.iter_var, "k");
    assert_eq!(c.iter_var2.as_deref(), Some("v"));
}

// ============================================================================
// map() / filter()
// ============================================================================

#[test]
fn map_appends_transformed_elements() {
    let expr = root("xs.map(x, x * 2)");
    let c = comprehension(&expr);
    assert_eq!(
        c.accu_init.kind,
        ExprKind::CreateList {
            elements: vec![],
            optional_indices: vec![],
        }
    );
    assert_eq!(c.loop_condition.kind, ExprKind::Const(Constant::Bool(true)));
    assert_eq!(c.loop_step.function(), Some(ADD));
}

#[test]
fn map_with_filter_guards_the_step() {
    let expr = root("xs.map(x, x > 0, x * 2)");
    let c = comprehension(&expr);
    let ExprKind::Call { function, args, .. } = &c.loop_step.kind else {
        panic!("expected call");
    };
    assert_eq!(function, CONDITIONAL);
    assert_eq!(args[0].function(), Some(GREATER));
    assert_eq!(args[1].function(), Some(ADD));
    assert_eq!(args[2].as_ident(), Some("@result"));
}

#[test]
fn filter_appends_the_element() {
    let expr = root("xs.filter(x, x > 0)");
    let c = comprehension(&expr);
    let ExprKind::Call { args, .. } = &c.loop_step.kind else {
        panic!("expected call");
    };
    let ExprKind::Call { args: append, .. } = &args[1].kind else {
        panic!("expected append");
    };
    let ExprKind::CreateList { elements, .. } = &append[1].kind else {
        panic!("expected list");
    };
    assert_eq!(elements[0].as_ident(), Some("x"));
}

#[test]
fn transform_macros() {
    let expr = root("xs.transformList(i, v, v + i)");
    let c = comprehension(&expr);
    assert_eq!(c.iter_var2.as_deref(), Some("v"));
    assert_eq!(c.loop_step.function(), Some(ADD));

    let expr = root("m.transformMap(k, v, v > 0, v)");
    let c = comprehension(&expr);
    assert!(matches!(
        &c.accu_init.kind,
        ExprKind::CreateStruct { message_name, entries } if message_name.is_empty() && entries.is_empty()
    ));
    let ExprKind::Call { args, .. } = &c.loop_step.kind else {
        panic!("expected call");
    };
    assert_eq!(args[1].function(), Some(MAP_INSERT));
}

// ============================================================================
// Argument validation
// ============================================================================

#[test]
fn iteration_variables_must_be_names() {
    assert_eq!(
        error_messages("xs.all(x.y, true)"),
        vec!["argument must be a simple name"]
    );
    assert_eq!(
        error_messages("xs.map(1, x)"),
        vec!["argument must be a simple name"]
    );
}

#[test]
fn iteration_variables_must_differ() {
    assert_eq!(
        error_messages("m.all(k, k, true)"),
        vec!["duplicate variable name: k"]
    );
}

#[test]
fn failed_expansion_leaves_placeholder_at_call() {
    let result = cel_syntax::parse("xs.all(1, true)").unwrap();
    let ast = result.ast.unwrap();
    assert_eq!(ast.root, Expr::unspecified(2));
}

#[test]
fn macros_match_on_style_and_arity() {
    assert_eq!(root("all(x, y)").function(), Some("all"));
    assert_eq!(root("xs.has(a.b)").function(), Some("has"));
    assert_eq!(root("xs.all(x)").function(), Some("all"));
    assert_eq!(root("xs.filter(x, y, z)").function(), Some("filter"));
}

#[test]
fn expansions_keep_ids_unique() {
    let ast = common::assert_parses("xs.map(x, x > 0, x * 2).filter(y, ys.exists(z, z == y))");
    assert_ids_unique_and_located(&ast);
    let ast = common::assert_parses("has(a.b) && m.transformMap(k, v, v)");
    assert_ids_unique_and_located(&ast);
}

// ============================================================================
// Macro call recording
// ============================================================================

#[test]
fn macro_calls_not_recorded_by_default() {
    let ast = common::assert_parses("xs.all(x, x > 0)");
    assert!(ast.source_info.macro_calls().is_empty());
}

#[test]
fn macro_calls_are_recorded() {
    let parser = Parser::builder()
        .with_populate_macro_calls(true)
        .build()
        .unwrap();
    let ast = common::assert_parses_with(&parser, "xs.all(x, x > 0)");
    assert_eq!(
        ast.macro_call(2),
        Some(&Expr::member_call(
            0,
            "all",
            Expr::ident(1, "xs"),
            vec![
                Expr::ident(3, "x"),
                Expr::call(
                    5,
                    GREATER,
                    vec![Expr::ident(4, "x"), Expr::constant(6, Constant::Int(0))]
                ),
            ]
        ))
    );
}

#[test]
fn nested_macro_calls_reference_expansions() {
    let parser = Parser::builder()
        .with_populate_macro_calls(true)
        .build()
        .unwrap();
    let ast = common::assert_parses_with(&parser, "xs.map(x, ys.all(y, y))");
    assert!(ast.macro_call(5).is_some());
    let Some(outer) = ast.macro_call(2) else {
        panic!("outer macro call not recorded");
    };
    let ExprKind::Call { args, .. } = &outer.kind else {
        panic!("expected call");
    };
    assert_eq!(args[1], Expr::unspecified(5));
}

// ============================================================================
// Custom macros
// ============================================================================

fn expand_answer(
    helper: &mut MacroExprHelper<'_>,
    _target: Option<&Expr>,
    _args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    Ok(Some(helper.literal(Constant::Int(42))))
}

fn expand_vsum(
    helper: &mut MacroExprHelper<'_>,
    _target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    Ok(Some(helper.list(args.to_vec())))
}

fn expand_never(
    _helper: &mut MacroExprHelper<'_>,
    _target: Option<&Expr>,
    _args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    Ok(None)
}

fn expand_reject(
    helper: &mut MacroExprHelper<'_>,
    _target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    match args.first() {
        Some(arg) => Err(helper.error_at(arg, "rejected")),
        None => Err(MacroError::new("rejected")),
    }
}

#[test]
fn custom_global_macro() {
    let parser = Parser::builder()
        .with_macro(Macro::new(
            "answer",
            MacroStyle::Global,
            ArgCount::Exact(0),
            expand_answer,
        ))
        .build()
        .unwrap();
    let ast = common::assert_parses_with(&parser, "answer()");
    assert_eq!(ast.root, Expr::constant(2, Constant::Int(42)));
    assert!(ast.location(1).is_none());
    assert_eq!(ast.location(2).column, 6);
}

#[test]
fn custom_vararg_macro() {
    let parser = Parser::builder()
        .with_macro(Macro::new(
            "vsum",
            MacroStyle::Global,
            ArgCount::VarArg(1),
            expand_vsum,
        ))
        .build()
        .unwrap();
    let ast = common::assert_parses_with(&parser, "vsum(1, 2, 3)");
    assert_eq!(
        ast.root,
        Expr::new(
            5,
            ExprKind::CreateList {
                elements: vec![
                    Expr::constant(2, Constant::Int(1)),
                    Expr::constant(3, Constant::Int(2)),
                    Expr::constant(4, Constant::Int(3)),
                ],
                optional_indices: vec![],
            }
        )
    );
    assert_eq!(
        common::assert_parses_with(&parser, "vsum()").root,
        Expr::call(1, "vsum", vec![])
    );
}

#[test]
fn declining_macro_leaves_the_call() {
    let parser = Parser::builder()
        .with_macro(Macro::new(
            "never",
            MacroStyle::Receiver,
            ArgCount::Exact(1),
            expand_never,
        ))
        .build()
        .unwrap();
    let ast = common::assert_parses_with(&parser, "a.never(b)");
    assert_eq!(
        ast.root,
        Expr::member_call(2, "never", Expr::ident(1, "a"), vec![Expr::ident(3, "b")])
    );
}

#[test]
fn custom_macro_errors_are_reported() {
    let parser = Parser::builder()
        .with_macro(Macro::new(
            "reject",
            MacroStyle::Global,
            ArgCount::Exact(1),
            expand_reject,
        ))
        .build()
        .unwrap();
    let errors = common::assert_parse_error_with(&parser, "reject(  x)");
    assert_eq!(common::messages(&errors), vec!["rejected"]);
    assert_eq!(errors[0].location.column, 9);
}

#[test]
fn macros_can_be_disabled() {
    let parser = Parser::builder().without_macros().build().unwrap();
    let ast = common::assert_parses_with(&parser, "has(a.b)");
    assert_eq!(
        ast.root,
        Expr::call(
            1,
            "has",
            vec![Expr::select(3, Expr::ident(2, "a"), "b", false)]
        )
    );
}
