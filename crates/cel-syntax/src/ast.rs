//! CEL Abstract Syntax Tree definitions.
//!
//! The tree mirrors CEL's canonical expression form: operators are plain
//! calls to their internal function names (see [`crate::operators`]) and
//! macros are already expanded. Every node carries a parse-unique id; source
//! positions live in [`SourceInfo`] keyed by that id.

use crate::source::{Location, SourceInfo};

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// CEL expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Unique identifier for this node (1-indexed, assigned during parsing).
    pub id: i64,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Placeholder left by error recovery. Inside a recorded macro call it
    /// refers to the already-expanded macro with the same id.
    Unspecified,
    Const(Constant),
    /// Identifier, possibly root-scoped (`.name`).
    Ident(String),
    /// Field selection. `test_only` marks a `has()` presence test.
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
    },
    /// Function, method, or operator call.
    Call {
        function: String,
        target: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    CreateList {
        elements: Vec<Expr>,
        /// Indices of elements declared with the optional `?` marker.
        optional_indices: Vec<usize>,
    },
    /// Map literal (empty `message_name`) or message construction.
    CreateStruct {
        message_name: String,
        entries: Vec<Entry>,
    },
    Comprehension(Box<Comprehension>),
}

/// A map entry or message field initializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: i64,
    pub key: EntryKey,
    pub value: Expr,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKey {
    Map(Expr),
    Field(String),
}

/// Comprehension expression (result of macro expansion).
///
/// Semantics:
/// ```text
/// let accu_var = accu_init
/// for (let iter_var, iter_var2 in iter_range) {
///    if (!loop_condition) { break }
///    accu_var = loop_step
/// }
/// return result
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub iter_var: String,
    /// Second iteration variable of the two-variable macro forms.
    pub iter_var2: Option<String>,
    pub iter_range: Expr,
    pub accu_var: String,
    pub accu_init: Expr,
    pub loop_condition: Expr,
    pub loop_step: Expr,
    pub result: Expr,
}

impl Expr {
    pub fn new(id: i64, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    pub fn unspecified(id: i64) -> Self {
        Self::new(id, ExprKind::Unspecified)
    }

    pub fn constant(id: i64, value: Constant) -> Self {
        Self::new(id, ExprKind::Const(value))
    }

    pub fn ident(id: i64, name: impl Into<String>) -> Self {
        Self::new(id, ExprKind::Ident(name.into()))
    }

    pub fn call(id: i64, function: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(
            id,
            ExprKind::Call {
                function: function.into(),
                target: None,
                args,
            },
        )
    }

    pub fn member_call(id: i64, function: impl Into<String>, target: Expr, args: Vec<Expr>) -> Self {
        Self::new(
            id,
            ExprKind::Call {
                function: function.into(),
                target: Some(Box::new(target)),
                args,
            },
        )
    }

    pub fn select(id: i64, operand: Expr, field: impl Into<String>, test_only: bool) -> Self {
        Self::new(
            id,
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.into(),
                test_only,
            },
        )
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self.kind, ExprKind::Unspecified)
    }

    /// The called function name, if this is a call.
    pub fn function(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Call { function, .. } => Some(function),
            _ => None,
        }
    }

    /// The identifier name, if this is an identifier.
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Direct sub-expressions in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Unspecified | ExprKind::Const(_) | ExprKind::Ident(_) => Vec::new(),
            ExprKind::Select { operand, .. } => vec![operand],
            ExprKind::Call { target, args, .. } => {
                target.iter().map(|t| &**t).chain(args.iter()).collect()
            }
            ExprKind::CreateList { elements, .. } => elements.iter().collect(),
            ExprKind::CreateStruct { entries, .. } => entries
                .iter()
                .flat_map(|entry| {
                    let key = match &entry.key {
                        EntryKey::Map(key) => Some(key),
                        EntryKey::Field(_) => None,
                    };
                    key.into_iter().chain(std::iter::once(&entry.value))
                })
                .collect(),
            ExprKind::Comprehension(c) => vec![
                &c.iter_range,
                &c.accu_init,
                &c.loop_condition,
                &c.loop_step,
                &c.result,
            ],
        }
    }

    /// Visit this node and every descendant, parents before children.
    pub fn walk<'a>(&'a self, mut f: impl FnMut(&'a Expr)) {
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            f(expr);
            stack.extend(expr.children().into_iter().rev());
        }
    }

    /// Every id in the tree: node ids plus map/message entry ids.
    pub fn ids(&self) -> Vec<i64> {
        let mut ids = Vec::new();
        self.walk(|expr| {
            ids.push(expr.id);
            if let ExprKind::CreateStruct { entries, .. } = &expr.kind {
                ids.extend(entries.iter().map(|e| e.id));
            }
        });
        ids
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((expr, depth)) = stack.pop() {
            max = max.max(depth);
            stack.extend(expr.children().into_iter().map(|c| (c, depth + 1)));
        }
        max
    }
}

/// A parsed expression together with its source bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub root: Expr,
    pub source_info: SourceInfo,
}

impl Ast {
    pub fn new(root: Expr, source_info: SourceInfo) -> Self {
        Self { root, source_info }
    }

    /// Source location of the node with the given id, or [`Location::NONE`].
    pub fn location(&self, id: i64) -> Location {
        self.source_info.location(id)
    }

    /// The original call recorded for a macro expansion, when macro calls are
    /// populated.
    pub fn macro_call(&self, id: i64) -> Option<&Expr> {
        self.source_info.macro_call(id)
    }
}
