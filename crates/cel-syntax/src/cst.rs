//! Concrete parse tree produced by the grammar front end.
//!
//! Node shapes follow CEL's grammar rules one to one, including the
//! pass-through levels (an `Expr` without `?:`, a `Relation` without
//! operators, ...) that the AST builder skips over when it un-nests.

use crate::lexer::{Span, Tok};

/// The grammar rule a node instantiates. Used by the recursion guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Expr,
    ConditionalOr,
    ConditionalAnd,
    Relation,
    Calc,
    Unary,
    Member,
    Primary,
}

/// A concrete parse tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `conditionalOr ('?' conditionalOr ':' expr)?`
    Expr {
        cond: Box<Node>,
        ternary: Option<Ternary>,
    },
    /// `conditionalAnd ('||' conditionalAnd)*`
    ConditionalOr(Chain),
    /// `relation ('&&' relation)*`
    ConditionalAnd(Chain),
    /// Left-associative relational chain.
    Relation(Chain),
    /// Left-associative `+`/`-` chain.
    Additive(Chain),
    /// Left-associative `*`/`/`/`%` chain.
    Multiplicative(Chain),
    /// A run of `!` or `-` operators applied to a member.
    Unary {
        ops: Vec<Tok>,
        member: Box<Node>,
    },
    /// A primary followed by select, call and index suffixes.
    Member {
        primary: Box<Node>,
        suffixes: Vec<Suffix>,
    },
    Ident {
        leading_dot: Option<Tok>,
        name: Tok,
    },
    GlobalCall {
        leading_dot: Option<Tok>,
        name: Tok,
        open: Tok,
        args: Vec<Node>,
    },
    /// Parenthesised expression.
    Nested {
        open: Tok,
        inner: Box<Node>,
    },
    CreateList {
        open: Tok,
        elements: Vec<ListElement>,
    },
    CreateMap {
        open: Tok,
        entries: Vec<MapInit>,
    },
    CreateMessage {
        leading_dot: Option<Tok>,
        ids: Vec<Tok>,
        open: Tok,
        fields: Vec<FieldInit>,
    },
    Literal {
        sign: Option<Tok>,
        tok: Tok,
    },
    /// A sub-tree the front end could not recognise. Always accompanied by a
    /// reported error.
    Error {
        span: Span,
    },
}

/// The `? then : otherwise` tail of a conditional.
#[derive(Debug, Clone, PartialEq)]
pub struct Ternary {
    pub question: Tok,
    pub then: Box<Node>,
    pub otherwise: Box<Node>,
}

/// A flat operator chain. `ops[i]` joins the running result with `rest[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub first: Box<Node>,
    pub ops: Vec<Tok>,
    pub rest: Vec<Node>,
}

impl Chain {
    pub fn single(node: Node) -> Self {
        Self {
            first: Box::new(node),
            ops: Vec::new(),
            rest: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Suffix {
    /// `.field` or `.?field`
    Select {
        dot: Tok,
        optional: Option<Tok>,
        field: Tok,
    },
    /// `.name(args)`
    Call {
        dot: Tok,
        name: Tok,
        open: Tok,
        args: Vec<Node>,
    },
    /// `[index]` or `[?index]`
    Index {
        open: Tok,
        optional: Option<Tok>,
        index: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListElement {
    pub optional: Option<Tok>,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapInit {
    pub optional: Option<Tok>,
    pub key: Node,
    pub colon: Tok,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInit {
    pub optional: Option<Tok>,
    pub name: Tok,
    pub colon: Tok,
    pub value: Node,
}

impl Node {
    /// Skip over pass-through wrappers until a node that contributes to the
    /// AST is reached. Iterative, so redundant parentheses add no depth.
    pub fn unnest(&self) -> &Node {
        let mut node = self;
        loop {
            node = match node {
                Node::Expr {
                    cond,
                    ternary: None,
                } => &**cond,
                Node::ConditionalOr(chain)
                | Node::ConditionalAnd(chain)
                | Node::Relation(chain)
                | Node::Additive(chain)
                | Node::Multiplicative(chain)
                    if chain.ops.is_empty() && chain.rest.is_empty() =>
                {
                    &*chain.first
                }
                Node::Unary { ops, member } if ops.is_empty() => &**member,
                Node::Member { primary, suffixes } if suffixes.is_empty() => &**primary,
                Node::Nested { inner, .. } => &**inner,
                _ => return node,
            };
        }
    }
}

/// Dropping is iterative: a tree nested thousands of levels deep would
/// otherwise overflow the stack in the compiler-generated recursive drop.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);
        while let Some(mut node) = pending.pop() {
            node.detach_children(&mut pending);
        }
    }
}

impl Node {
    fn has_children(&self) -> bool {
        !matches!(
            self,
            Node::Ident { .. } | Node::Literal { .. } | Node::Error { .. }
        )
    }

    /// Move every child node onto `pending`, leaving leaves in their place.
    fn detach_children(&mut self, pending: &mut Vec<Node>) {
        fn take(slot: &mut Node, pending: &mut Vec<Node>) {
            if slot.has_children() {
                pending.push(std::mem::replace(slot, Node::Error { span: 0..0 }));
            }
        }

        match self {
            Node::Expr { cond, ternary } => {
                take(cond, pending);
                if let Some(ternary) = ternary {
                    take(&mut ternary.then, pending);
                    take(&mut ternary.otherwise, pending);
                }
            }
            Node::ConditionalOr(chain)
            | Node::ConditionalAnd(chain)
            | Node::Relation(chain)
            | Node::Additive(chain)
            | Node::Multiplicative(chain) => {
                take(&mut chain.first, pending);
                pending.append(&mut chain.rest);
            }
            Node::Unary { member, .. } => take(member, pending),
            Node::Member { primary, suffixes } => {
                take(primary, pending);
                for suffix in suffixes {
                    match suffix {
                        Suffix::Select { .. } => {}
                        Suffix::Call { args, .. } => pending.append(args),
                        Suffix::Index { index, .. } => take(index, pending),
                    }
                }
            }
            Node::GlobalCall { args, .. } => pending.append(args),
            Node::Nested { inner, .. } => take(inner, pending),
            Node::CreateList { elements, .. } => {
                for element in elements {
                    take(&mut element.value, pending);
                }
            }
            Node::CreateMap { entries, .. } => {
                for entry in entries {
                    take(&mut entry.key, pending);
                    take(&mut entry.value, pending);
                }
            }
            Node::CreateMessage { fields, .. } => {
                for field in fields {
                    take(&mut field.value, pending);
                }
            }
            Node::Ident { .. } | Node::Literal { .. } | Node::Error { .. } => {}
        }
    }
}
