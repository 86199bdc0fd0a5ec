//! CEL (Common Expression Language) parser.
//!
//! Source text is lexed, recognised into a concrete parse tree and then
//! lowered to the canonical AST: operators become calls to their internal
//! function names, macros are expanded, and every node carries a unique id
//! that resolves to a source location through [`SourceInfo`].
//!
//! Parsing recovers from errors. A [`ParseResult`] may hold both an AST and
//! the diagnostics collected along the way; placeholders
//! ([`ExprKind::Unspecified`]) stand in for the parts that failed.
//!
//! # Example
//!
//! ```
//! use cel_syntax::{ExprKind, Parser};
//!
//! let parser = Parser::new();
//! let result = parser.parse("a.all(x, x > 0)").unwrap();
//! let ast = result.into_result().unwrap();
//! assert!(matches!(ast.root.kind, ExprKind::Comprehension(_)));
//! ```

pub mod ast;
mod builder;
mod cst;
pub mod errors;
mod grammar;
mod guard;
mod lexer;
mod literal;
mod logic;
pub mod macros;
pub mod operators;
mod options;
mod session;
pub mod source;
mod stack;
pub mod unparser;

use std::sync::Arc;

use tracing::{debug, warn};

pub use ast::{Ast, Comprehension, Constant, Entry, EntryKey, Expr, ExprKind};
pub use errors::{ConfigError, InternalError, ParseError};
pub use lexer::Span;
pub use literal::EscapeError;
pub use macros::{ArgCount, Macro, MacroError, MacroExprHelper, MacroRegistry, MacroStyle};
pub use options::{ParserBuilder, ParserOptions};
pub use source::{Location, SourceInfo};
pub use unparser::unparse;

use builder::AstBuilder;
use grammar::Grammar;
use session::ParseSession;

/// Result of parsing a CEL expression.
///
/// Supports error recovery: may return both an AST and errors.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The AST, absent only when the input was rejected before parsing
    /// (expression size limit).
    pub ast: Option<Ast>,
    /// Diagnostics in the order they were reported.
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    /// Returns true if parsing completed without errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.ast.is_some()
    }

    /// Returns true if there are any parse errors.
    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Converts to a Result, discarding partial AST on error.
    pub fn into_result(self) -> Result<Ast, Vec<ParseError>> {
        if self.errors.is_empty() {
            self.ast.ok_or_else(Vec::new)
        } else {
            Err(self.errors)
        }
    }
}

/// A configured CEL parser. Immutable and reusable; every call to
/// [`parse`](Self::parse) runs with its own session state.
#[derive(Debug, Clone)]
pub struct Parser {
    options: ParserOptions,
    macros: MacroRegistry,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Parser with default options and the standard macros.
    pub fn new() -> Self {
        Self::from_parts(ParserOptions::default(), MacroRegistry::standard())
    }

    pub fn builder() -> ParserBuilder {
        ParserBuilder::new()
    }

    pub(crate) fn from_parts(options: ParserOptions, macros: MacroRegistry) -> Self {
        Self { options, macros }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    /// Parse a CEL expression.
    ///
    /// User errors are returned in the [`ParseResult`]. `Err` is reserved
    /// for faults in the parser itself.
    pub fn parse(&self, input: &str) -> Result<ParseResult, InternalError> {
        debug!(len = input.len(), "parsing expression");

        let limit = self.options.expression_size_code_point_limit;
        let size = input.chars().count();
        if limit >= 0 && size > usize::try_from(limit).unwrap_or(usize::MAX) {
            warn!(size, limit, "expression code point size exceeds limit");
            return Ok(ParseResult {
                ast: None,
                errors: vec![ParseError {
                    message: format!(
                        "expression code point size exceeds limit: size: {size}, limit {limit}"
                    ),
                    span: 0..0,
                    location: Location::NONE,
                    expr_id: 0,
                }],
            });
        }

        let source: Arc<str> = Arc::from(input);
        let mut session = ParseSession::new(Arc::clone(&source), &self.options, &self.macros);

        let (tokens, lex_errors) = lexer::lex(input);
        for error in lex_errors {
            if !session.report_syntax(error.span, &error.message) {
                break;
            }
        }

        let tree = Grammar::new(&tokens, &mut session).parse();
        let root = AstBuilder::new(&mut session).build(&tree)?;

        let (source_info, errors) = session.finish();
        debug!(errors = errors.len(), "parsed expression");
        Ok(ParseResult {
            ast: Some(Ast::new(root, source_info)),
            errors,
        })
    }
}

/// Parse a CEL expression with default options and the standard macros.
pub fn parse(input: &str) -> Result<ParseResult, InternalError> {
    Parser::new().parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn parser_is_shareable() {
        assert_send_sync::<Parser>();
    }

    #[test]
    fn parser_is_reusable() {
        let parser = Parser::new();
        let first = parser.parse("a + b").unwrap().into_result().unwrap();
        let second = parser.parse("a + b").unwrap().into_result().unwrap();
        assert_eq!(first.root, second.root);
    }

    #[test]
    fn lex_errors_are_syntax_errors() {
        let result = parse("a # b").unwrap();
        assert!(result.is_err());
        assert_eq!(
            result.errors[0].message,
            "Syntax error: token recognition error at: '#'"
        );
    }

    #[test]
    fn into_result_discards_partial_ast() {
        let result = parse("a +").unwrap();
        assert!(result.ast.is_some());
        assert!(result.into_result().is_err());
    }
}
