//! Diagnostics: messages, positions, recovery and reporting limits.

mod common;

use cel_syntax::{parse, ExprKind, Location, Parser};
use common::{assert_parse_error, error_messages};
use pretty_assertions::assert_eq;

// ============================================================================
// Syntax errors
// ============================================================================

#[test]
fn error_on_unclosed_paren() {
    assert_eq!(
        error_messages("(1 + 2"),
        vec!["Syntax error: mismatched input '<EOF>' expecting ')'"]
    );
}

#[test]
fn error_on_trailing_tokens() {
    assert_eq!(
        error_messages("1 2"),
        vec!["Syntax error: mismatched input '2' expecting <EOF>"]
    );
}

#[test]
fn error_on_incomplete_ternary() {
    assert_eq!(
        error_messages("a ? b"),
        vec!["Syntax error: mismatched input '<EOF>' expecting ':'"]
    );
}

#[test]
fn error_on_empty_input() {
    let messages = error_messages("");
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Syntax error: mismatched input '<EOF>' expecting {"));
}

#[test]
fn error_on_unknown_character() {
    assert_parse_error("a # b");
    assert_eq!(
        error_messages("a # b")[0],
        "Syntax error: token recognition error at: '#'"
    );
}

#[test]
fn error_on_unterminated_string() {
    let messages = error_messages("\"hello");
    assert!(messages[0].starts_with("Syntax error: token recognition error at: '\"hello"));
}

// ============================================================================
// Positions
// ============================================================================

#[test]
fn errors_carry_locations() {
    let errors = assert_parse_error("a +");
    assert_eq!(
        errors[0].location,
        Location {
            offset: 3,
            line: 1,
            column: 3
        }
    );
    assert_eq!(
        errors[0].to_string(),
        "1:3: Syntax error: mismatched input '<EOF>' expecting {'[', '{', '(', '.', '-', '!', \
         'true', 'false', 'null', NUM_FLOAT, NUM_INT, NUM_UINT, STRING, BYTES, IDENTIFIER}"
    );
}

#[test]
fn error_locations_span_lines() {
    let errors = assert_parse_error("a &&\n  1 +");
    assert_eq!(
        errors[0].location,
        Location {
            offset: 10,
            line: 2,
            column: 5
        }
    );
}

#[test]
fn error_columns_count_code_points() {
    let errors = assert_parse_error("'ñ' + #");
    assert_eq!(errors[0].location.column, 6);
    assert_eq!(errors[0].location.offset, 7);
}

// ============================================================================
// Semantic errors
// ============================================================================

#[test]
fn error_on_reserved_identifier() {
    let errors = assert_parse_error("if");
    assert_eq!(errors[0].message, "reserved identifier: if");

    let result = parse("if").unwrap();
    let ast = result.ast.unwrap();
    assert!(ast.root.is_unspecified());
    assert_eq!(errors[0].expr_id, ast.root.id);
}

#[test]
fn error_on_reserved_function() {
    assert_eq!(
        error_messages("while(1)"),
        vec!["reserved identifier: while"]
    );
}

#[test]
fn error_on_out_of_range_literals() {
    assert_eq!(
        error_messages("9223372036854775808"),
        vec!["invalid int literal"]
    );
    assert_eq!(
        error_messages("18446744073709551616u"),
        vec!["invalid uint literal"]
    );
    assert_eq!(error_messages("1e400"), vec!["invalid double literal"]);
}

#[test]
fn error_on_bad_escapes() {
    assert_eq!(
        error_messages(r#""\q""#),
        vec!["invalid escape sequence: \\q"]
    );
}

#[test]
fn error_on_disabled_optional_syntax() {
    assert_eq!(error_messages("a.?b"), vec!["unsupported syntax '.?'"]);
    assert_eq!(error_messages("a[?0]"), vec!["unsupported syntax '[?'"]);
    assert_eq!(error_messages("[?a]"), vec!["unsupported syntax '?'"]);
    assert_eq!(error_messages("{?a: 1}"), vec!["unsupported syntax '?'"]);
}

#[test]
fn error_on_disabled_identifier_escapes() {
    assert_eq!(error_messages("a.`b`"), vec!["unsupported syntax '`'"]);
}

#[test]
fn error_on_macro_arguments_points_at_argument() {
    let errors = assert_parse_error("xs.all(1, true)");
    assert_eq!(errors[0].message, "argument must be a simple name");
    assert_eq!(errors[0].location.column, 7);
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn independent_errors_are_all_reported() {
    assert_eq!(
        error_messages("99999999999999999999 + while"),
        vec!["invalid int literal", "reserved identifier: while"]
    );
}

#[test]
fn partial_ast_is_returned() {
    let result = parse("a + ").unwrap();
    assert!(result.is_err());
    let ast = result.ast.expect("partial AST");
    let ExprKind::Call { function, args, .. } = &ast.root.kind else {
        panic!("expected call, got {:?}", ast.root.kind);
    };
    assert_eq!(function, "_+_");
    assert_eq!(args[0], cel_syntax::Expr::ident(1, "a"));
    assert!(args[1].is_unspecified());
}

#[test]
fn error_reporting_limit() {
    let parser = Parser::builder()
        .with_error_reporting_limit(2)
        .build()
        .unwrap();
    let errors = common::assert_parse_error_with(&parser, "# # # #");
    assert_eq!(
        common::messages(&errors),
        vec![
            "Syntax error: token recognition error at: '#'",
            "Syntax error: token recognition error at: '#'",
            "More than 2 syntax errors",
        ]
    );
}

#[test]
fn error_recovery_limit() {
    let parser = Parser::builder()
        .with_error_recovery_limit(0)
        .build()
        .unwrap();
    let errors = common::assert_parse_error_with(&parser, "f(1 2)");
    assert_eq!(
        common::messages(&errors),
        vec![
            "Syntax error: extraneous input '2' expecting ')'",
            "error recovery attempt limit exceeded: 0",
        ]
    );
}
