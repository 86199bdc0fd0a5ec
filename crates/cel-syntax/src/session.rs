//! Per-parse mutable state shared by the grammar and the AST builder.

use std::sync::Arc;

use crate::errors::{ParseError, ParseErrors};
use crate::lexer::Span;
use crate::macros::MacroRegistry;
use crate::options::ParserOptions;
use crate::source::{IdRegistry, SourceInfo};

/// Everything one `parse` call mutates: the id registry and the error
/// collector, plus read-only access to the parser's configuration.
#[derive(Debug)]
pub struct ParseSession<'p> {
    pub source: Arc<str>,
    pub ids: IdRegistry,
    pub errors: ParseErrors,
    pub options: &'p ParserOptions,
    pub macros: &'p MacroRegistry,
}

impl<'p> ParseSession<'p> {
    pub fn new(source: Arc<str>, options: &'p ParserOptions, macros: &'p MacroRegistry) -> Self {
        let limit = usize::try_from(options.error_reporting_limit).unwrap_or(1);
        Self {
            ids: IdRegistry::new(Arc::clone(&source)),
            source,
            errors: ParseErrors::new(limit),
            options,
            macros,
        }
    }

    /// Record an error at the start of `span`.
    pub fn report(&mut self, span: Span, expr_id: i64, message: impl Into<String>) {
        let location = self.ids.location_at(span.start);
        self.errors.report(ParseError {
            message: message.into(),
            span,
            location,
            expr_id,
        });
    }

    /// Record a syntax error. Returns `false` once the reporting limit is
    /// exhausted.
    pub fn report_syntax(&mut self, span: Span, message: &str) -> bool {
        let location = self.ids.location_at(span.start);
        self.errors.report_syntax(span, location, message)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn finish(self) -> (SourceInfo, Vec<ParseError>) {
        (self.ids.into_source_info(), self.errors.into_vec())
    }
}
