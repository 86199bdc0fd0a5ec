//! Parser configuration.

use crate::errors::ConfigError;
use crate::macros::{Macro, MacroRegistry};
use crate::Parser;

/// Validated parser settings. Limits use `-1` for "unlimited" where allowed.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub max_recursion_depth: i32,
    pub error_recovery_lookahead_token_limit: i32,
    pub error_recovery_limit: i32,
    pub error_reporting_limit: i32,
    pub expression_size_code_point_limit: i32,
    /// Record the original call of every macro expansion in `SourceInfo`.
    pub populate_macro_calls: bool,
    /// Accept `.?field`, `[?index]` and `?` optional entries.
    pub enable_optional_syntax: bool,
    /// Accept backtick-quoted field names.
    pub enable_identifier_escape_syntax: bool,
    /// Build `||` and `&&` chains as a single call instead of a balanced tree.
    pub enable_variadic_operator_asts: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_recursion_depth: 250,
            error_recovery_lookahead_token_limit: 256,
            error_recovery_limit: 30,
            error_reporting_limit: 100,
            expression_size_code_point_limit: 100_000,
            populate_macro_calls: false,
            enable_optional_syntax: false,
            enable_identifier_escape_syntax: false,
            enable_variadic_operator_asts: false,
        }
    }
}

impl ParserOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_recursion_depth < -1 {
            return Err(ConfigError::MaxRecursionDepth(self.max_recursion_depth));
        }
        if self.error_recovery_lookahead_token_limit < 1 {
            return Err(ConfigError::ErrorRecoveryLookahead(
                self.error_recovery_lookahead_token_limit,
            ));
        }
        if self.error_recovery_limit < -1 {
            return Err(ConfigError::ErrorRecoveryLimit(self.error_recovery_limit));
        }
        if self.error_reporting_limit < 1 {
            return Err(ConfigError::ErrorReportingLimit(self.error_reporting_limit));
        }
        if self.expression_size_code_point_limit < -1 {
            return Err(ConfigError::ExpressionSizeCodePointLimit(
                self.expression_size_code_point_limit,
            ));
        }
        Ok(())
    }
}

/// Builder for [`Parser`].
///
/// # Example
///
/// ```
/// use cel_syntax::Parser;
///
/// let parser = Parser::builder()
///     .with_max_recursion_depth(32)
///     .with_optional_syntax(true)
///     .build()
///     .unwrap();
///
/// assert!(parser.parse("a.?b").unwrap().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ParserBuilder {
    options: ParserOptions,
    macros: MacroRegistry,
}

impl Default for ParserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserBuilder {
    /// Default options with the standard macros.
    pub fn new() -> Self {
        Self {
            options: ParserOptions::default(),
            macros: MacroRegistry::standard(),
        }
    }

    pub fn with_max_recursion_depth(mut self, depth: i32) -> Self {
        self.options.max_recursion_depth = depth;
        self
    }

    pub fn with_error_recovery_lookahead_token_limit(mut self, limit: i32) -> Self {
        self.options.error_recovery_lookahead_token_limit = limit;
        self
    }

    pub fn with_error_recovery_limit(mut self, limit: i32) -> Self {
        self.options.error_recovery_limit = limit;
        self
    }

    pub fn with_error_reporting_limit(mut self, limit: i32) -> Self {
        self.options.error_reporting_limit = limit;
        self
    }

    pub fn with_expression_size_code_point_limit(mut self, limit: i32) -> Self {
        self.options.expression_size_code_point_limit = limit;
        self
    }

    pub fn with_populate_macro_calls(mut self, enabled: bool) -> Self {
        self.options.populate_macro_calls = enabled;
        self
    }

    pub fn with_optional_syntax(mut self, enabled: bool) -> Self {
        self.options.enable_optional_syntax = enabled;
        self
    }

    pub fn with_identifier_escape_syntax(mut self, enabled: bool) -> Self {
        self.options.enable_identifier_escape_syntax = enabled;
        self
    }

    pub fn with_variadic_operator_asts(mut self, enabled: bool) -> Self {
        self.options.enable_variadic_operator_asts = enabled;
        self
    }

    /// Add one macro. A macro with the same name, arity and style replaces
    /// the existing one.
    pub fn with_macro(mut self, macro_def: Macro) -> Self {
        self.macros.register(macro_def);
        self
    }

    /// Add several macros on top of those already configured.
    pub fn with_macros(mut self, macros: impl IntoIterator<Item = Macro>) -> Self {
        for macro_def in macros {
            self.macros.register(macro_def);
        }
        self
    }

    /// Drop every configured macro, including the standard ones.
    pub fn without_macros(mut self) -> Self {
        self.macros = MacroRegistry::new();
        self
    }

    pub fn build(self) -> Result<Parser, ConfigError> {
        self.options.validate()?;
        Ok(Parser::from_parts(self.options, self.macros))
    }
}
