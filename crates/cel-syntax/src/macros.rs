//! Macro system for CEL parser.
//!
//! Macros in CEL are syntactic transformations that expand at parse time.
//! They transform specific call patterns (like `list.all(x, cond)`) into
//! expanded AST nodes (like `Comprehension`).
//!
//! This module provides:
//! - [`Macro`] - Definition of a single macro
//! - [`MacroRegistry`] - Collection of macros with lookup by [`MacroKey`]
//! - [`MacroExpander`] - The expansion function type
//! - [`MacroExprHelper`] - Node factory passed to expanders
//!
//! # Architecture
//!
//! Macros are keyed by name, argument count and receiver style. An exact
//! arity key is tried first, then the variadic key for the same name and
//! style.

use std::collections::HashMap;

use tracing::trace;

use crate::ast::{Comprehension, Constant, Entry, EntryKey, Expr, ExprKind};
use crate::lexer::Span;
use crate::operators;
use crate::source::IdRegistry;

/// Indicates whether a macro is called as a global function or as a method on a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroStyle {
    /// Global function call: `macro_name(args...)`
    Global,
    /// Receiver-style method call: `receiver.macro_name(args...)`
    Receiver,
}

/// Arguments a macro takes, not counting the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgCount {
    Exact(usize),
    /// At least this many.
    VarArg(usize),
}

impl ArgCount {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            ArgCount::Exact(n) => count == n,
            ArgCount::VarArg(min) => count >= min,
        }
    }

    /// The arity component of a [`MacroKey`]; variadic macros share `None`.
    pub fn arity(self) -> Option<usize> {
        match self {
            ArgCount::Exact(n) => Some(n),
            ArgCount::VarArg(_) => None,
        }
    }
}

/// Registry lookup key. `arity` is `None` for variadic macros.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacroKey {
    pub name: String,
    pub arity: Option<usize>,
    pub receiver: bool,
}

impl MacroKey {
    pub fn new(name: impl Into<String>, arity: Option<usize>, receiver: bool) -> Self {
        Self {
            name: name.into(),
            arity,
            receiver,
        }
    }
}

/// Expansion failure. Reported at `span` when set, otherwise at the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroError {
    pub message: String,
    pub span: Option<Span>,
}

impl MacroError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }
}

impl std::fmt::Display for MacroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Node factory handed to macro expanders.
///
/// Every node it creates gets a fresh id located at the macro call, except
/// [`comprehension`](Self::comprehension) which takes over the call's own id.
pub struct MacroExprHelper<'a> {
    ids: &'a mut IdRegistry,
    call_id: i64,
    call_span: Span,
}

impl<'a> MacroExprHelper<'a> {
    pub fn new(ids: &'a mut IdRegistry, call_id: i64, call_span: Span) -> Self {
        Self {
            ids,
            call_id,
            call_span,
        }
    }

    /// Id of the call being expanded.
    pub fn call_id(&self) -> i64 {
        self.call_id
    }

    pub fn next_id(&mut self) -> i64 {
        self.ids.next_id(self.call_span.clone())
    }

    pub fn literal(&mut self, value: Constant) -> Expr {
        Expr::constant(self.next_id(), value)
    }

    pub fn ident(&mut self, name: &str) -> Expr {
        Expr::ident(self.next_id(), name)
    }

    /// Reference to the comprehension accumulator.
    pub fn accu_ident(&mut self) -> Expr {
        self.ident(ACCU_VAR)
    }

    pub fn call(&mut self, function: &str, args: Vec<Expr>) -> Expr {
        Expr::call(self.next_id(), function, args)
    }

    pub fn list(&mut self, elements: Vec<Expr>) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::CreateList {
                elements,
                optional_indices: Vec::new(),
            },
        )
    }

    /// Map literal from key/value pairs.
    pub fn map(&mut self, pairs: Vec<(Expr, Expr)>) -> Expr {
        let id = self.next_id();
        let entries = pairs
            .into_iter()
            .map(|(key, value)| Entry {
                id: self.next_id(),
                key: EntryKey::Map(key),
                value,
                optional: false,
            })
            .collect();
        Expr::new(
            id,
            ExprKind::CreateStruct {
                message_name: String::new(),
                entries,
            },
        )
    }

    /// A test-only select that takes over the call's id.
    pub fn presence_test(&self, operand: Expr, field: &str) -> Expr {
        Expr::select(self.call_id, operand, field, true)
    }

    /// Wrap a comprehension in a node carrying the call's id.
    pub fn comprehension(&self, comprehension: Comprehension) -> Expr {
        Expr::new(
            self.call_id,
            ExprKind::Comprehension(Box::new(comprehension)),
        )
    }

    /// An error located at `expr`, or at the call when `expr` has no position.
    pub fn error_at(&self, expr: &Expr, message: impl Into<String>) -> MacroError {
        MacroError {
            message: message.into(),
            span: self.ids.span(expr.id),
        }
    }
}

/// Type alias for macro expander functions.
///
/// # Parameters
/// - `helper`: Node factory for synthetic nodes and positioned errors
/// - `target`: The receiver expression for receiver-style macros, None for global macros
/// - `args`: The arguments passed to the macro
///
/// # Returns
/// - `Ok(Some(expr))` on successful expansion
/// - `Ok(None)` to leave the call as an ordinary function call
/// - `Err(error)` if the arguments are unusable
pub type MacroExpander = fn(
    helper: &mut MacroExprHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError>;

/// Definition of a single macro.
#[derive(Clone)]
pub struct Macro {
    /// The macro name (e.g., "all", "has", "map").
    pub name: &'static str,
    /// Whether this is a global or receiver-style macro.
    pub style: MacroStyle,
    /// The expected argument count.
    pub arg_count: ArgCount,
    /// The expansion function.
    pub expander: MacroExpander,
    /// Optional description for documentation.
    pub description: Option<&'static str>,
}

impl Macro {
    /// Create a new macro definition.
    pub const fn new(
        name: &'static str,
        style: MacroStyle,
        arg_count: ArgCount,
        expander: MacroExpander,
    ) -> Self {
        Self {
            name,
            style,
            arg_count,
            expander,
            description: None,
        }
    }

    /// Create a new macro definition with a description.
    pub const fn with_description(
        name: &'static str,
        style: MacroStyle,
        arg_count: ArgCount,
        expander: MacroExpander,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            style,
            arg_count,
            expander,
            description: Some(description),
        }
    }

    /// The registry key for this macro.
    pub fn key(&self) -> MacroKey {
        MacroKey::new(
            self.name,
            self.arg_count.arity(),
            self.style == MacroStyle::Receiver,
        )
    }
}

impl std::fmt::Debug for Macro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Macro")
            .field("name", &self.name)
            .field("style", &self.style)
            .field("arg_count", &self.arg_count)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Registry of macros with efficient lookup.
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: HashMap<MacroKey, Macro>,
}

impl MacroRegistry {
    /// Create an empty macro registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the standard CEL macros.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for macro_def in STANDARD_MACROS {
            registry.register(macro_def.clone());
        }
        registry
    }

    /// Register a macro, replacing any macro with the same key.
    pub fn register(&mut self, macro_def: Macro) {
        self.macros.insert(macro_def.key(), macro_def);
    }

    /// Look up a macro by name, argument count, and receiver style.
    ///
    /// First tries exact match, then falls back to vararg match if applicable.
    pub fn lookup(&self, name: &str, arg_count: usize, is_receiver: bool) -> Option<&Macro> {
        let mut key = MacroKey::new(name, Some(arg_count), is_receiver);
        if let Some(m) = self.macros.get(&key) {
            return Some(m);
        }

        key.arity = None;
        self.macros
            .get(&key)
            .filter(|m| m.arg_count.accepts(arg_count))
    }

    /// Check if the registry contains a macro with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.macros.values().any(|m| m.name == name)
    }

    /// Get an iterator over all registered macros.
    pub fn iter(&self) -> impl Iterator<Item = &Macro> {
        self.macros.values()
    }

    /// Get the number of registered macros.
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Offer a call to the matching macro, if any.
    ///
    /// Returns `Ok(None)` when no macro matches or the expander declines.
    pub fn expand(
        &self,
        ids: &mut IdRegistry,
        call_id: i64,
        call_span: Span,
        function: &str,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> Result<Option<Expr>, MacroError> {
        let Some(macro_def) = self.lookup(function, args.len(), target.is_some()) else {
            return Ok(None);
        };
        trace!(
            name = macro_def.name,
            args = args.len(),
            call_id,
            "expanding macro"
        );
        let mut helper = MacroExprHelper::new(ids, call_id, call_span);
        (macro_def.expander)(&mut helper, target, args)
    }
}

// ============================================================================
// Standard CEL Macros
// ============================================================================

/// Accumulator variable name used in comprehension expansions. Not a valid
/// CEL identifier, so user expressions cannot shadow it.
pub const ACCU_VAR: &str = "@result";

/// Standard CEL macros.
pub static STANDARD_MACROS: &[Macro] = &[
    // has(m.x) - global, 1 arg
    Macro::with_description(
        "has",
        MacroStyle::Global,
        ArgCount::Exact(1),
        expand_has,
        "Tests whether a field is set on a message",
    ),
    // all - receiver, 2 or 3 args
    Macro::with_description(
        "all",
        MacroStyle::Receiver,
        ArgCount::Exact(2),
        expand_all,
        "Tests whether all elements satisfy a condition",
    ),
    Macro::with_description(
        "all",
        MacroStyle::Receiver,
        ArgCount::Exact(3),
        expand_all,
        "Tests whether all elements satisfy a condition (two-variable form)",
    ),
    // exists - receiver, 2 or 3 args
    Macro::with_description(
        "exists",
        MacroStyle::Receiver,
        ArgCount::Exact(2),
        expand_exists,
        "Tests whether any element satisfies a condition",
    ),
    Macro::with_description(
        "exists",
        MacroStyle::Receiver,
        ArgCount::Exact(3),
        expand_exists,
        "Tests whether any element satisfies a condition (two-variable form)",
    ),
    // exists_one / existsOne - receiver, 2 or 3 args
    Macro::with_description(
        "exists_one",
        MacroStyle::Receiver,
        ArgCount::Exact(2),
        expand_exists_one,
        "Tests whether exactly one element satisfies a condition",
    ),
    Macro::with_description(
        "exists_one",
        MacroStyle::Receiver,
        ArgCount::Exact(3),
        expand_exists_one,
        "Tests whether exactly one element satisfies a condition (two-variable form)",
    ),
    Macro::with_description(
        "existsOne",
        MacroStyle::Receiver,
        ArgCount::Exact(2),
        expand_exists_one,
        "Tests whether exactly one element satisfies a condition",
    ),
    Macro::with_description(
        "existsOne",
        MacroStyle::Receiver,
        ArgCount::Exact(3),
        expand_exists_one,
        "Tests whether exactly one element satisfies a condition (two-variable form)",
    ),
    // map - receiver, 2 or 3 args
    Macro::with_description(
        "map",
        MacroStyle::Receiver,
        ArgCount::Exact(2),
        expand_map,
        "Transforms elements of a list",
    ),
    Macro::with_description(
        "map",
        MacroStyle::Receiver,
        ArgCount::Exact(3),
        expand_map,
        "Transforms elements of a list with filtering",
    ),
    // filter - receiver, 2 args
    Macro::with_description(
        "filter",
        MacroStyle::Receiver,
        ArgCount::Exact(2),
        expand_filter,
        "Filters elements of a list by a condition",
    ),
    // transformList - receiver, 3 or 4 args
    Macro::with_description(
        "transformList",
        MacroStyle::Receiver,
        ArgCount::Exact(3),
        expand_transform_list,
        "Transforms list elements with index and value variables",
    ),
    Macro::with_description(
        "transformList",
        MacroStyle::Receiver,
        ArgCount::Exact(4),
        expand_transform_list,
        "Transforms list elements with index, value, and filter",
    ),
    // transformMap - receiver, 3 or 4 args
    Macro::with_description(
        "transformMap",
        MacroStyle::Receiver,
        ArgCount::Exact(3),
        expand_transform_map,
        "Transforms map entries with key and value variables",
    ),
    Macro::with_description(
        "transformMap",
        MacroStyle::Receiver,
        ArgCount::Exact(4),
        expand_transform_map,
        "Transforms map entries with key, value, and filter",
    ),
];

// === Helper Functions ===

/// Extract an iteration variable name from a macro argument.
fn iter_var(helper: &MacroExprHelper<'_>, arg: &Expr) -> Result<String, MacroError> {
    let Some(name) = arg.as_ident() else {
        return Err(helper.error_at(arg, "argument must be a simple name"));
    };
    if name == ACCU_VAR {
        return Err(helper.error_at(arg, "iteration variable overwrites accumulator variable"));
    }
    Ok(name.to_string())
}

/// Extract the variables of a two-variable macro, which must differ.
fn iter_vars(
    helper: &MacroExprHelper<'_>,
    first: &Expr,
    second: &Expr,
) -> Result<(String, String), MacroError> {
    let var1 = iter_var(helper, first)?;
    let var2 = iter_var(helper, second)?;
    if var1 == var2 {
        return Err(helper.error_at(second, format!("duplicate variable name: {var1}")));
    }
    Ok((var1, var2))
}

/// Iteration variables plus the remaining arguments. Two-variable forms are
/// recognised by their argument count.
fn split_vars<'e>(
    helper: &MacroExprHelper<'_>,
    args: &'e [Expr],
    single_arity: usize,
) -> Result<(String, Option<String>, &'e [Expr]), MacroError> {
    match args {
        [first, second, rest @ ..] if args.len() > single_arity => {
            let (var1, var2) = iter_vars(helper, first, second)?;
            Ok((var1, Some(var2), rest))
        }
        [first, rest @ ..] => Ok((iter_var(helper, first)?, None, rest)),
        [] => Err(MacroError::new("missing iteration variable")),
    }
}

fn receiver(target: Option<&Expr>) -> Result<Expr, MacroError> {
    target
        .cloned()
        .ok_or_else(|| MacroError::new("macro requires a receiver"))
}

struct Fold {
    iter_var: String,
    iter_var2: Option<String>,
    iter_range: Expr,
    accu_init: Expr,
    loop_condition: Expr,
    loop_step: Expr,
    result: Expr,
}

fn fold(helper: &MacroExprHelper<'_>, parts: Fold) -> Expr {
    helper.comprehension(Comprehension {
        iter_var: parts.iter_var,
        iter_var2: parts.iter_var2,
        iter_range: parts.iter_range,
        accu_var: ACCU_VAR.to_string(),
        accu_init: parts.accu_init,
        loop_condition: parts.loop_condition,
        loop_step: parts.loop_step,
        result: parts.result,
    })
}

/// `filter ? step : @result`
fn guarded_step(helper: &mut MacroExprHelper<'_>, filter: Option<&Expr>, step: Expr) -> Expr {
    match filter {
        Some(filter) => {
            let skip = helper.accu_ident();
            helper.call(operators::CONDITIONAL, vec![filter.clone(), step, skip])
        }
        None => step,
    }
}

// === has() Macro ===

/// Expand `has(m.x)` to a presence-test select of `x` on `m`.
fn expand_has(
    helper: &mut MacroExprHelper<'_>,
    _target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    let [arg] = args else {
        return Err(MacroError::new("invalid argument to has() macro"));
    };
    match &arg.kind {
        ExprKind::Select {
            operand,
            field,
            test_only: false,
        } => Ok(Some(helper.presence_test((**operand).clone(), field))),
        _ => Err(helper.error_at(arg, "invalid argument to has() macro")),
    }
}

// === Quantifiers ===

fn expand_all(
    helper: &mut MacroExprHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    let (iter_var, iter_var2, [predicate]) = split_vars(helper, args, 2)? else {
        return Err(MacroError::new("all() requires a predicate"));
    };
    let iter_range = receiver(target)?;

    let accu_init = helper.literal(Constant::Bool(true));
    let accu = helper.accu_ident();
    let loop_condition = helper.call(operators::NOT_STRICTLY_FALSE, vec![accu]);
    let accu = helper.accu_ident();
    let loop_step = helper.call(operators::LOGICAL_AND, vec![accu, predicate.clone()]);
    let result = helper.accu_ident();

    Ok(Some(fold(
        helper,
        Fold {
            iter_var,
            iter_var2,
            iter_range,
            accu_init,
            loop_condition,
            loop_step,
            result,
        },
    )))
}

fn expand_exists(
    helper: &mut MacroExprHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    let (iter_var, iter_var2, [predicate]) = split_vars(helper, args, 2)? else {
        return Err(MacroError::new("exists() requires a predicate"));
    };
    let iter_range = receiver(target)?;

    let accu_init = helper.literal(Constant::Bool(false));
    let accu = helper.accu_ident();
    let not_accu = helper.call(operators::LOGICAL_NOT, vec![accu]);
    let loop_condition = helper.call(operators::NOT_STRICTLY_FALSE, vec![not_accu]);
    let accu = helper.accu_ident();
    let loop_step = helper.call(operators::LOGICAL_OR, vec![accu, predicate.clone()]);
    let result = helper.accu_ident();

    Ok(Some(fold(
        helper,
        Fold {
            iter_var,
            iter_var2,
            iter_range,
            accu_init,
            loop_condition,
            loop_step,
            result,
        },
    )))
}

fn expand_exists_one(
    helper: &mut MacroExprHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    let (iter_var, iter_var2, [predicate]) = split_vars(helper, args, 2)? else {
        return Err(MacroError::new("exists_one() requires a predicate"));
    };
    let iter_range = receiver(target)?;

    let accu_init = helper.literal(Constant::Int(0));

    let accu = helper.accu_ident();
    let one = helper.literal(Constant::Int(1));
    let loop_condition = helper.call(operators::LESS_EQUALS, vec![accu, one]);

    let accu = helper.accu_ident();
    let one = helper.literal(Constant::Int(1));
    let increment = helper.call(operators::ADD, vec![accu, one]);
    let unchanged = helper.accu_ident();
    let loop_step = helper.call(
        operators::CONDITIONAL,
        vec![predicate.clone(), increment, unchanged],
    );

    let accu = helper.accu_ident();
    let one = helper.literal(Constant::Int(1));
    let result = helper.call(operators::EQUALS, vec![accu, one]);

    Ok(Some(fold(
        helper,
        Fold {
            iter_var,
            iter_var2,
            iter_range,
            accu_init,
            loop_condition,
            loop_step,
            result,
        },
    )))
}

// === map() / filter() Macros ===

fn expand_map(
    helper: &mut MacroExprHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    let (iter_var, filter, transform) = match args {
        [var, transform] => (iter_var(helper, var)?, None, transform),
        [var, filter, transform] => (iter_var(helper, var)?, Some(filter), transform),
        _ => return Err(MacroError::new("map() requires 2 or 3 arguments")),
    };
    let iter_range = receiver(target)?;
    list_fold(helper, iter_var, None, iter_range, filter, transform.clone())
}

fn expand_filter(
    helper: &mut MacroExprHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    let [var, predicate] = args else {
        return Err(MacroError::new("filter() requires 2 arguments"));
    };
    let iter_var = iter_var(helper, var)?;
    let iter_range = receiver(target)?;
    let element = helper.ident(&iter_var);
    list_fold(helper, iter_var, None, iter_range, Some(predicate), element)
}

/// Comprehension appending `[element]` to a list accumulator, optionally
/// guarded by `filter`.
fn list_fold(
    helper: &mut MacroExprHelper<'_>,
    iter_var: String,
    iter_var2: Option<String>,
    iter_range: Expr,
    filter: Option<&Expr>,
    element: Expr,
) -> Result<Option<Expr>, MacroError> {
    let accu_init = helper.list(Vec::new());
    let loop_condition = helper.literal(Constant::Bool(true));

    let accu = helper.accu_ident();
    let appended = helper.list(vec![element]);
    let append = helper.call(operators::ADD, vec![accu, appended]);
    let loop_step = guarded_step(helper, filter, append);
    let result = helper.accu_ident();

    Ok(Some(fold(
        helper,
        Fold {
            iter_var,
            iter_var2,
            iter_range,
            accu_init,
            loop_condition,
            loop_step,
            result,
        },
    )))
}

// === transformList() / transformMap() Macros ===

fn expand_transform_list(
    helper: &mut MacroExprHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    let (var1, var2, filter, transform) = match args {
        [v1, v2, transform] => (v1, v2, None, transform),
        [v1, v2, filter, transform] => (v1, v2, Some(filter), transform),
        _ => return Err(MacroError::new("transformList() requires 3 or 4 arguments")),
    };
    let (iter_var, iter_var2) = iter_vars(helper, var1, var2)?;
    let iter_range = receiver(target)?;
    list_fold(
        helper,
        iter_var,
        Some(iter_var2),
        iter_range,
        filter,
        transform.clone(),
    )
}

fn expand_transform_map(
    helper: &mut MacroExprHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> Result<Option<Expr>, MacroError> {
    let (var1, var2, filter, transform) = match args {
        [v1, v2, transform] => (v1, v2, None, transform),
        [v1, v2, filter, transform] => (v1, v2, Some(filter), transform),
        _ => return Err(MacroError::new("transformMap() requires 3 or 4 arguments")),
    };
    let (iter_var, iter_var2) = iter_vars(helper, var1, var2)?;
    let iter_range = receiver(target)?;

    let accu_init = helper.map(Vec::new());
    let loop_condition = helper.literal(Constant::Bool(true));

    let accu = helper.accu_ident();
    let key = helper.ident(&iter_var);
    let insert = helper.call(operators::MAP_INSERT, vec![accu, key, transform.clone()]);
    let loop_step = guarded_step(helper, filter, insert);
    let result = helper.accu_ident();

    Ok(Some(fold(
        helper,
        Fold {
            iter_var,
            iter_var2: Some(iter_var2),
            iter_range,
            accu_init,
            loop_condition,
            loop_step,
            result,
        },
    )))
}
