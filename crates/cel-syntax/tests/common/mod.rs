//! Common test utilities for cel-syntax integration tests.

use cel_syntax::{parse, Ast, Expr, ParseError, Parser};

/// Parse input and assert it succeeds, returning the AST.
#[allow(dead_code)]
pub fn assert_parses(input: &str) -> Ast {
    assert_parses_with(&Parser::new(), input)
}

/// Parse input with a configured parser and assert it succeeds.
#[allow(dead_code)]
pub fn assert_parses_with(parser: &Parser, input: &str) -> Ast {
    let result = parser.parse(input).expect("internal parser fault");
    if !result.errors.is_empty() {
        panic!(
            "failed to parse '{}': {:?}",
            input,
            result
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
        );
    }
    result.ast.expect("expected AST")
}

/// Parse input and assert it succeeds, returning the root expression.
#[allow(dead_code)]
pub fn root(input: &str) -> Expr {
    assert_parses(input).root
}

/// Parse input and assert it fails, returning the errors.
#[allow(dead_code)]
pub fn assert_parse_error(input: &str) -> Vec<ParseError> {
    assert_parse_error_with(&Parser::new(), input)
}

#[allow(dead_code)]
pub fn assert_parse_error_with(parser: &Parser, input: &str) -> Vec<ParseError> {
    let result = parser.parse(input).expect("internal parser fault");
    if result.errors.is_empty() {
        panic!("expected parse error for '{}', but got: {:?}", input, result.ast);
    }
    result.errors
}

/// Messages of the errors reported for `input`.
#[allow(dead_code)]
pub fn error_messages(input: &str) -> Vec<String> {
    messages(&assert_parse_error(input))
}

#[allow(dead_code)]
pub fn messages(errors: &[ParseError]) -> Vec<String> {
    errors.iter().map(|e| e.message.clone()).collect()
}

/// Parse with default options and unparse the result.
#[allow(dead_code)]
pub fn roundtrip(input: &str) -> String {
    cel_syntax::unparse(&parse(input).expect("internal parser fault").ast.expect("expected AST"))
}
