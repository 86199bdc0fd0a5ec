//! Source positions and expression-id bookkeeping.
//!
//! [`IdRegistry`] hands out the monotonically increasing ids attached to
//! every AST node and remembers the source span each id was allocated for.
//! The finished table travels with the AST as [`SourceInfo`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Entry, EntryKey, Expr, ExprKind};
use crate::lexer::{Span, Tok};

/// A resolved position: byte offset, 1-based line, 0-based column counted in
/// code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub offset: i32,
    pub line: i32,
    pub column: i32,
}

impl Location {
    /// Sentinel for ids and offsets that do not map to the source.
    pub const NONE: Location = Location {
        offset: -1,
        line: -1,
        column: -1,
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            f.write_str("<unknown>")
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Compute byte offsets of each line start.
///
/// Returns a vector where index i contains the byte offset where line i starts.
/// Line 0 always starts at offset 0.
pub fn compute_line_offsets(source: &str) -> Vec<i32> {
    let mut offsets = vec![0];
    for (i, c) in source.char_indices() {
        if c == '\n' {
            offsets.push((i + 1) as i32);
        }
    }
    offsets
}

/// Source text plus the id → position and id → macro call tables built while
/// parsing it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    content: Arc<str>,
    line_offsets: Vec<i32>,
    positions: HashMap<i64, Span>,
    macro_calls: HashMap<i64, Expr>,
}

impl SourceInfo {
    pub fn new(content: Arc<str>) -> Self {
        let line_offsets = compute_line_offsets(&content);
        Self {
            content,
            line_offsets,
            positions: HashMap::new(),
            macro_calls: HashMap::new(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn line_offsets(&self) -> &[i32] {
        &self.line_offsets
    }

    /// The source span recorded for an id.
    pub fn span(&self, id: i64) -> Option<Span> {
        self.positions.get(&id).cloned()
    }

    /// Every id that still has a recorded position.
    pub fn positions(&self) -> &HashMap<i64, Span> {
        &self.positions
    }

    /// Resolve an id to its location, or [`Location::NONE`] when unknown.
    pub fn location(&self, id: i64) -> Location {
        match self.positions.get(&id) {
            Some(span) => self.location_at(span.start),
            None => Location::NONE,
        }
    }

    /// Resolve a byte offset to its location, or [`Location::NONE`] when it
    /// falls outside the source or inside a multi-byte character.
    pub fn location_at(&self, offset: usize) -> Location {
        if offset > self.content.len() || !self.content.is_char_boundary(offset) {
            return Location::NONE;
        }
        let line = self
            .line_offsets
            .partition_point(|&start| start as usize <= offset);
        let line_start = self.line_offsets[line.saturating_sub(1)] as usize;
        let column = self.content[line_start..offset].chars().count();
        Location {
            offset: offset as i32,
            line: line as i32,
            column: column as i32,
        }
    }

    pub fn macro_calls(&self) -> &HashMap<i64, Expr> {
        &self.macro_calls
    }

    pub fn macro_call(&self, id: i64) -> Option<&Expr> {
        self.macro_calls.get(&id)
    }
}

/// Allocates expression ids for one parse and records their positions.
#[derive(Debug)]
pub struct IdRegistry {
    next_id: i64,
    info: SourceInfo,
}

impl IdRegistry {
    pub fn new(content: Arc<str>) -> Self {
        Self {
            next_id: 1,
            info: SourceInfo::new(content),
        }
    }

    /// Allocate the next id and record the span it belongs to.
    pub fn next_id(&mut self, span: Span) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.info.positions.insert(id, span);
        id
    }

    /// Allocate an id located at a token.
    pub fn id_for(&mut self, tok: &Tok) -> i64 {
        self.next_id(tok.span.clone())
    }

    pub fn span(&self, id: i64) -> Option<Span> {
        self.info.span(id)
    }

    pub fn location(&self, id: i64) -> Location {
        self.info.location(id)
    }

    pub fn location_at(&self, offset: usize) -> Location {
        self.info.location_at(offset)
    }

    /// Forget an id whose node was replaced. The id is never handed out again.
    pub fn delete_id(&mut self, id: i64) {
        self.info.positions.remove(&id);
    }

    pub fn is_macro_call(&self, id: i64) -> bool {
        self.info.macro_calls.contains_key(&id)
    }

    /// Record the call a macro expansion replaced, keyed by the id of the
    /// replacement. Arguments that are themselves expanded macros are stored
    /// as [`ExprKind::Unspecified`] references to their replacement ids.
    pub fn add_macro_call(
        &mut self,
        id: i64,
        function: &str,
        target: Option<&Expr>,
        args: &[Expr],
    ) {
        let target = target.map(|t| {
            if self.is_macro_call(t.id) {
                Expr::unspecified(t.id)
            } else {
                t.clone()
            }
        });
        let args = args.iter().map(|arg| self.macro_call_arg(arg)).collect();
        let call = match target {
            Some(target) => Expr::member_call(0, function, target, args),
            None => Expr::call(0, function, args),
        };
        self.info.macro_calls.insert(id, call);
    }

    fn macro_call_arg(&self, expr: &Expr) -> Expr {
        if self.is_macro_call(expr.id) {
            return Expr::unspecified(expr.id);
        }
        let kind = match &expr.kind {
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => ExprKind::Select {
                operand: Box::new(self.macro_call_arg(operand)),
                field: field.clone(),
                test_only: *test_only,
            },
            ExprKind::Call {
                function,
                target,
                args,
            } => ExprKind::Call {
                function: function.clone(),
                target: target.as_ref().map(|t| Box::new(self.macro_call_arg(t))),
                args: args.iter().map(|a| self.macro_call_arg(a)).collect(),
            },
            ExprKind::CreateList {
                elements,
                optional_indices,
            } => ExprKind::CreateList {
                elements: elements.iter().map(|e| self.macro_call_arg(e)).collect(),
                optional_indices: optional_indices.clone(),
            },
            ExprKind::CreateStruct {
                message_name,
                entries,
            } => ExprKind::CreateStruct {
                message_name: message_name.clone(),
                entries: entries
                    .iter()
                    .map(|entry| Entry {
                        id: entry.id,
                        key: match &entry.key {
                            EntryKey::Map(key) => EntryKey::Map(self.macro_call_arg(key)),
                            EntryKey::Field(name) => EntryKey::Field(name.clone()),
                        },
                        value: self.macro_call_arg(&entry.value),
                        optional: entry.optional,
                    })
                    .collect(),
            },
            other => other.clone(),
        };
        Expr::new(expr.id, kind)
    }

    pub fn into_source_info(self) -> SourceInfo {
        self.info
    }
}
