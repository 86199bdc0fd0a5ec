//! Parse diagnostics and error types.

use thiserror::Error;

use crate::lexer::Span;
use crate::source::Location;

/// A user-facing parse diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
    pub location: Location,
    /// Id of the placeholder node standing in for the failed expression, or 0
    /// when the error is not tied to a node.
    pub expr_id: i64,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.location.is_none() {
            write!(f, "{}", self.message)
        } else {
            write!(
                f,
                "{}:{}: {}",
                self.location.line, self.location.column, self.message
            )
        }
    }
}

impl std::error::Error for ParseError {}

/// Ordered, append-only collection of the diagnostics of one parse.
///
/// At most `limit` entries are stored. Syntax errors beyond the limit are
/// replaced by a single "More than N syntax errors" entry, after which the
/// front end stops recognising input.
#[derive(Debug, Clone)]
pub struct ParseErrors {
    errors: Vec<ParseError>,
    reported: usize,
    syntax_reported: usize,
    limit: usize,
}

impl ParseErrors {
    pub fn new(limit: usize) -> Self {
        Self {
            errors: Vec::new(),
            reported: 0,
            syntax_reported: 0,
            limit,
        }
    }

    /// Record a diagnostic. Every call counts toward [`Self::reported`], but
    /// nothing is stored once the limit is reached.
    pub fn report(&mut self, error: ParseError) {
        self.reported += 1;
        if self.errors.len() < self.limit {
            self.errors.push(error);
        }
    }

    /// Record a front-end syntax error. Returns `false` once the reporting
    /// limit is exhausted, in which case the caller must stop recovering.
    pub fn report_syntax(&mut self, span: Span, location: Location, message: &str) -> bool {
        if self.syntax_reported < self.limit {
            self.syntax_reported += 1;
            self.report(ParseError {
                message: format!("Syntax error: {message}"),
                span,
                location,
                expr_id: 0,
            });
            true
        } else {
            if self.syntax_reported == self.limit {
                self.reported += 1;
                self.errors.push(ParseError {
                    message: format!("More than {} syntax errors", self.limit),
                    span,
                    location,
                    expr_id: 0,
                });
            }
            self.syntax_reported += 1;
            false
        }
    }

    /// Total number of diagnostics reported, stored or not.
    pub fn reported(&self) -> usize {
        self.reported
    }

    pub fn is_empty(&self) -> bool {
        self.reported == 0
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<ParseError> {
        self.errors
    }
}

/// A fault in the parser itself rather than in the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    /// A literal node carried a token that is not a literal.
    #[error("literal node at {}..{} holds non-literal token {found}", .span.start, .span.end)]
    NotALiteral { found: String, span: Span },

    /// A node carried a token of the wrong kind for its position.
    #[error("expected {expected} at {}..{}, found {found}", .span.start, .span.end)]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        span: Span,
    },
}

/// Invalid parser configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max recursion depth must be greater than or equal to -1: {0}")]
    MaxRecursionDepth(i32),

    #[error("error recovery lookahead limit must be at least 1: {0}")]
    ErrorRecoveryLookahead(i32),

    #[error("error recovery limit must be greater than or equal to -1: {0}")]
    ErrorRecoveryLimit(i32),

    #[error("error reporting limit must be at least 1: {0}")]
    ErrorReportingLimit(i32),

    #[error("expression size code point limit must be greater than or equal to -1: {0}")]
    ExpressionSizeCodePointLimit(i32),
}
