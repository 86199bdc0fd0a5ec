//! Concrete parse tree to AST.
//!
//! [`AstBuilder`] walks the tree produced by the grammar, skips pass-through
//! wrappers, assigns ids in parse order and offers every call to the macro
//! registry. User errors are reported to the session and replaced by
//! [`ExprKind::Unspecified`](crate::ast::ExprKind::Unspecified) placeholders
//! so that construction always runs to completion.

use std::sync::Arc;

use tracing::warn;

use crate::ast::{Constant, Entry, EntryKey, Expr, ExprKind};
use crate::cst::{Chain, FieldInit, ListElement, MapInit, Node, Suffix, Ternary};
use crate::errors::InternalError;
use crate::lexer::{Span, Tok, Token};
use crate::literal;
use crate::logic::LogicManager;
use crate::operators;
use crate::session::ParseSession;
use crate::stack;

/// Words that may not be used as identifiers or global function names.
pub const RESERVED_IDENTIFIERS: &[&str] = &[
    "as",
    "break",
    "const",
    "continue",
    "else",
    "false",
    "for",
    "function",
    "if",
    "import",
    "in",
    "let",
    "loop",
    "package",
    "namespace",
    "null",
    "return",
    "true",
    "var",
    "void",
    "while",
];

/// Name substituted for an escaped field when escapes are disabled.
const UNSUPPORTED_FIELD: &str = "#unsupported_syntax";

type BuildResult = Result<Expr, InternalError>;

pub struct AstBuilder<'s, 'p> {
    source: Arc<str>,
    session: &'s mut ParseSession<'p>,
    depth: i32,
    depth_exceeded: bool,
}

impl<'s, 'p> AstBuilder<'s, 'p> {
    pub fn new(session: &'s mut ParseSession<'p>) -> Self {
        Self {
            source: Arc::clone(&session.source),
            session,
            depth: 0,
            depth_exceeded: false,
        }
    }

    pub fn build(&mut self, node: &Node) -> BuildResult {
        self.visit(node)
    }

    fn visit(&mut self, node: &Node) -> BuildResult {
        stack::ensure_sufficient_stack(|| self.visit_node(node))
    }

    fn visit_node(&mut self, node: &Node) -> BuildResult {
        match node.unnest() {
            Node::Expr {
                cond,
                ternary: Some(ternary),
            } => self.conditional(cond, ternary),
            Node::Expr {
                cond,
                ternary: None,
            } => self.visit(cond),
            Node::ConditionalOr(chain) => self.logic(operators::LOGICAL_OR, "||", chain),
            Node::ConditionalAnd(chain) => self.logic(operators::LOGICAL_AND, "&&", chain),
            Node::Relation(chain) | Node::Additive(chain) | Node::Multiplicative(chain) => {
                let len = chain.ops.len().min(chain.rest.len());
                self.binary(chain, len)
            }
            Node::Unary { ops, member } => self.unary(ops, member),
            Node::Member { primary, suffixes } => self.member(primary, suffixes),
            Node::Ident { leading_dot, name } => self.ident(leading_dot.as_ref(), name),
            Node::GlobalCall {
                leading_dot,
                name,
                open,
                args,
            } => self.global_call(leading_dot.as_ref(), name, open, args),
            Node::Nested { inner, .. } => self.visit(inner),
            Node::CreateList { open, elements } => self.create_list(open, elements),
            Node::CreateMap { open, entries } => self.create_map(open, entries),
            Node::CreateMessage {
                leading_dot,
                ids,
                open,
                fields,
            } => self.create_message(leading_dot.as_ref(), ids, open, fields),
            Node::Literal { sign, tok } => self.literal(sign.as_ref(), tok),
            Node::Error { span } => Ok(self.missing(span.clone())),
        }
    }

    // === Helpers ===

    fn text(&self, tok: &Tok) -> String {
        tok.text(&self.source).to_string()
    }

    fn report(&mut self, span: Span, expr_id: i64, message: impl Into<String>) {
        self.session.report(span, expr_id, message);
    }

    /// Placeholder for a sub-tree the grammar could not recognise.
    fn missing(&mut self, span: Span) -> Expr {
        let id = self.session.ids.next_id(span.clone());
        if !self.session.has_errors() {
            self.report(span, id, "unknown parse element encountered");
        }
        Expr::unspecified(id)
    }

    /// Build one nesting level under the depth limit. Past the limit the
    /// level becomes a placeholder and its children are not visited.
    fn guarded(&mut self, span: Span, f: impl FnOnce(&mut Self) -> BuildResult) -> BuildResult {
        let max = self.session.options.max_recursion_depth;
        if max >= 0 && self.depth >= max {
            let id = self.session.ids.next_id(span.clone());
            if !self.depth_exceeded {
                self.depth_exceeded = true;
                warn!(limit = max, "max recursion depth exceeded");
                self.report(span, id, "max recursion depth exceeded");
            }
            return Ok(Expr::unspecified(id));
        }

        self.depth += 1;
        let result = stack::ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        result
    }

    /// Create a call, or its macro expansion when a macro matches.
    fn call_or_macro(
        &mut self,
        call_id: i64,
        call_span: Span,
        function: &str,
        target: Option<Expr>,
        args: Vec<Expr>,
    ) -> BuildResult {
        let macros = self.session.macros;
        let expansion = macros.expand(
            &mut self.session.ids,
            call_id,
            call_span.clone(),
            function,
            target.as_ref(),
            &args,
        );

        match expansion {
            Ok(Some(expr)) => {
                if self.session.options.populate_macro_calls {
                    self.session
                        .ids
                        .add_macro_call(expr.id, function, target.as_ref(), &args);
                }
                if expr.id != call_id {
                    self.session.ids.delete_id(call_id);
                }
                Ok(expr)
            }
            Ok(None) => Ok(match target {
                Some(target) => Expr::member_call(call_id, function, target, args),
                None => Expr::call(call_id, function, args),
            }),
            Err(err) => {
                let span = err.span.unwrap_or(call_span);
                self.report(span, call_id, err.message);
                Ok(Expr::unspecified(call_id))
            }
        }
    }

    fn args(&mut self, args: &[Node]) -> Result<Vec<Expr>, InternalError> {
        args.iter().map(|arg| self.visit(arg)).collect()
    }

    /// Resolve a field token, stripping backticks from escaped names.
    fn field_name(&mut self, field: &Tok, expr_id: i64) -> String {
        let text = self.text(field);
        if field.kind != Token::EscapedIdent {
            return text;
        }
        if !self.session.options.enable_identifier_escape_syntax {
            self.report(field.span.clone(), expr_id, "unsupported syntax '`'");
            return UNSUPPORTED_FIELD.to_string();
        }
        text.strip_prefix('`')
            .and_then(|t| t.strip_suffix('`'))
            .unwrap_or(&text)
            .to_string()
    }

    /// Whether an optional marker takes effect. A marker used while optional
    /// syntax is disabled is reported and then ignored.
    fn optional(&mut self, marker: Option<&Tok>, syntax: &str, expr_id: i64) -> bool {
        let Some(marker) = marker else {
            return false;
        };
        if self.session.options.enable_optional_syntax {
            return true;
        }
        self.report(
            marker.span.clone(),
            expr_id,
            format!("unsupported syntax '{syntax}'"),
        );
        false
    }

    // === Operators ===

    fn conditional(&mut self, cond: &Node, ternary: &Ternary) -> BuildResult {
        self.guarded(ternary.question.span.clone(), |b| {
            let cond = b.visit(cond)?;
            let op_id = b.session.ids.id_for(&ternary.question);
            let then = b.visit(&ternary.then)?;
            let otherwise = b.visit(&ternary.otherwise)?;
            b.call_or_macro(
                op_id,
                ternary.question.span.clone(),
                operators::CONDITIONAL,
                None,
                vec![cond, then, otherwise],
            )
        })
    }

    fn logic(&mut self, function: &'static str, symbol: &str, chain: &Chain) -> BuildResult {
        let first = self.visit(&chain.first)?;
        let mut manager = if self.session.options.enable_variadic_operator_asts {
            LogicManager::variadic(function, first)
        } else {
            LogicManager::balanced(function, first)
        };
        for (i, op) in chain.ops.iter().enumerate() {
            // Operators without an operand keep the terms seen so far.
            let Some(term) = chain.rest.get(i) else {
                let id = self.session.ids.id_for(op);
                self.report(
                    op.span.clone(),
                    id,
                    format!("unexpected character, wanted '{symbol}'"),
                );
                break;
            };
            let term = self.visit(term)?;
            let op_id = self.session.ids.id_for(op);
            manager.add_term(op_id, term);
        }
        Ok(manager.to_expr())
    }

    /// Fold the first `len` links of a left-associative chain. Each link is
    /// one nesting level.
    fn binary(&mut self, chain: &Chain, len: usize) -> BuildResult {
        let Some(last) = len.checked_sub(1) else {
            return self.visit(&chain.first);
        };
        let (Some(op), Some(rhs)) = (chain.ops.get(last), chain.rest.get(last)) else {
            return self.visit(&chain.first);
        };
        self.guarded(op.span.clone(), |b| {
            let lhs = b.binary(chain, last)?;
            let op_id = b.session.ids.id_for(op);
            let rhs = b.visit(rhs)?;
            let text = b.text(op);
            let function = operators::find(&text).ok_or_else(|| InternalError::UnexpectedToken {
                expected: "binary operator",
                found: text.clone(),
                span: op.span.clone(),
            })?;
            b.call_or_macro(op_id, op.span.clone(), function, None, vec![lhs, rhs])
        })
    }

    /// An even run of the same operator cancels out; an odd run applies it
    /// once.
    fn unary(&mut self, ops: &[Tok], member: &Node) -> BuildResult {
        let Some(first) = ops.first() else {
            return self.visit(member);
        };
        if ops.len() % 2 == 0 {
            return self.visit(member);
        }
        let function = match first.kind {
            Token::Not => operators::LOGICAL_NOT,
            Token::Minus => operators::NEGATE,
            other => {
                return Err(InternalError::UnexpectedToken {
                    expected: "'!' or '-'",
                    found: other.to_string(),
                    span: first.span.clone(),
                })
            }
        };
        let op_id = self.session.ids.id_for(first);
        let operand = self.visit(member)?;
        self.call_or_macro(op_id, first.span.clone(), function, None, vec![operand])
    }

    // === Member Access ===

    fn member(&mut self, primary: &Node, suffixes: &[Suffix]) -> BuildResult {
        let Some((last, rest)) = suffixes.split_last() else {
            return self.visit(primary);
        };
        let span = match last {
            Suffix::Select { dot, .. } => dot.span.clone(),
            Suffix::Call { open, .. } | Suffix::Index { open, .. } => open.span.clone(),
        };
        self.guarded(span, |b| {
            let operand = b.member(primary, rest)?;
            b.suffix(operand, last)
        })
    }

    fn suffix(&mut self, operand: Expr, suffix: &Suffix) -> BuildResult {
        match suffix {
            Suffix::Select {
                dot,
                optional,
                field,
            } => {
                let id = self.session.ids.id_for(dot);
                let optional = self.optional(optional.as_ref(), ".?", id);
                let name = self.field_name(field, id);
                if optional {
                    let field_id = self.session.ids.id_for(field);
                    let field = Expr::constant(field_id, Constant::String(name));
                    return Ok(Expr::call(id, operators::OPT_SELECT, vec![operand, field]));
                }
                Ok(Expr::select(id, operand, name, false))
            }
            Suffix::Call {
                name, open, args, ..
            } => {
                let id = self.session.ids.id_for(open);
                let args = self.args(args)?;
                let function = self.text(name);
                self.call_or_macro(id, open.span.clone(), &function, Some(operand), args)
            }
            Suffix::Index {
                open,
                optional,
                index,
            } => {
                let id = self.session.ids.id_for(open);
                let function = if self.optional(optional.as_ref(), "[?", id) {
                    operators::OPT_INDEX
                } else {
                    operators::INDEX
                };
                let index = self.visit(index)?;
                self.call_or_macro(id, open.span.clone(), function, None, vec![operand, index])
            }
        }
    }

    // === Primaries ===

    fn qualified(&self, leading_dot: Option<&Tok>, name: &str) -> String {
        match leading_dot {
            Some(_) => format!(".{name}"),
            None => name.to_string(),
        }
    }

    fn ident(&mut self, leading_dot: Option<&Tok>, name: &Tok) -> BuildResult {
        let text = self.qualified(leading_dot, &self.text(name));
        let id = self.session.ids.id_for(name);
        if RESERVED_IDENTIFIERS.contains(&text.as_str()) {
            self.report(name.span.clone(), id, format!("reserved identifier: {text}"));
            return Ok(Expr::unspecified(id));
        }
        Ok(Expr::ident(id, text))
    }

    fn global_call(
        &mut self,
        leading_dot: Option<&Tok>,
        name: &Tok,
        open: &Tok,
        args: &[Node],
    ) -> BuildResult {
        let function = self.qualified(leading_dot, &self.text(name));
        if RESERVED_IDENTIFIERS.contains(&function.as_str()) {
            let id = self.session.ids.id_for(name);
            self.report(
                name.span.clone(),
                id,
                format!("reserved identifier: {function}"),
            );
            return Ok(Expr::unspecified(id));
        }
        let id = self.session.ids.id_for(open);
        let args = self.args(args)?;
        self.call_or_macro(id, open.span.clone(), &function, None, args)
    }

    fn create_list(&mut self, open: &Tok, elements: &[ListElement]) -> BuildResult {
        let id = self.session.ids.id_for(open);
        let mut exprs = Vec::with_capacity(elements.len());
        let mut optional_indices = Vec::new();
        for (i, element) in elements.iter().enumerate() {
            if self.optional(element.optional.as_ref(), "?", id) {
                optional_indices.push(i);
            }
            exprs.push(self.visit(&element.value)?);
        }
        Ok(Expr::new(
            id,
            ExprKind::CreateList {
                elements: exprs,
                optional_indices,
            },
        ))
    }

    fn create_map(&mut self, open: &Tok, inits: &[MapInit]) -> BuildResult {
        let id = self.session.ids.id_for(open);
        let mut entries = Vec::with_capacity(inits.len());
        for init in inits {
            let entry_id = self.session.ids.id_for(&init.colon);
            let optional = self.optional(init.optional.as_ref(), "?", entry_id);
            let key = self.visit(&init.key)?;
            let value = self.visit(&init.value)?;
            entries.push(Entry {
                id: entry_id,
                key: EntryKey::Map(key),
                value,
                optional,
            });
        }
        Ok(Expr::new(
            id,
            ExprKind::CreateStruct {
                message_name: String::new(),
                entries,
            },
        ))
    }

    fn create_message(
        &mut self,
        leading_dot: Option<&Tok>,
        name_parts: &[Tok],
        open: &Tok,
        fields: &[FieldInit],
    ) -> BuildResult {
        let name = name_parts
            .iter()
            .map(|part| part.text(&self.source))
            .collect::<Vec<_>>()
            .join(".");
        let message_name = self.qualified(leading_dot, &name);
        let id = self.session.ids.id_for(open);

        let mut entries = Vec::with_capacity(fields.len());
        for field in fields {
            let entry_id = self.session.ids.id_for(&field.colon);
            let optional = self.optional(field.optional.as_ref(), "?", entry_id);
            let name = self.field_name(&field.name, entry_id);
            let value = self.visit(&field.value)?;
            entries.push(Entry {
                id: entry_id,
                key: EntryKey::Field(name),
                value,
                optional,
            });
        }
        Ok(Expr::new(
            id,
            ExprKind::CreateStruct {
                message_name,
                entries,
            },
        ))
    }

    fn literal(&mut self, sign: Option<&Tok>, tok: &Tok) -> BuildResult {
        let start = sign.map_or(tok.span.start, |sign| sign.span.start);
        let span = start..tok.span.end;
        let text = self.text(tok);
        let negative = sign.is_some();

        let value = match tok.kind {
            Token::Int => literal::parse_int(&text, negative)
                .map(Constant::Int)
                .ok_or_else(|| "invalid int literal".to_string()),
            Token::Uint if !negative => literal::parse_uint(&text)
                .map(Constant::Uint)
                .ok_or_else(|| "invalid uint literal".to_string()),
            Token::Uint => Err("invalid uint literal".to_string()),
            Token::Double => literal::parse_double(&text, negative)
                .map(Constant::Double)
                .ok_or_else(|| "invalid double literal".to_string()),
            Token::String => literal::unquote_string(&text)
                .map(Constant::String)
                .map_err(|e| e.to_string()),
            Token::Bytes => literal::unquote_bytes(&text)
                .map(Constant::Bytes)
                .map_err(|e| e.to_string()),
            Token::True => Ok(Constant::Bool(true)),
            Token::False => Ok(Constant::Bool(false)),
            Token::Null => Ok(Constant::Null),
            other => {
                return Err(InternalError::NotALiteral {
                    found: other.to_string(),
                    span,
                })
            }
        };

        let id = self.session.ids.next_id(span.clone());
        match value {
            Ok(value) => Ok(Expr::constant(id, value)),
            Err(message) => {
                self.report(span, id, message);
                Ok(Expr::unspecified(id))
            }
        }
    }
}
