//! CEL grammar - hand-written recursive descent producing the concrete parse
//! tree.
//!
//! The recogniser never gives up on the first error. Mismatched tokens are
//! reported ANTLR-style and recovered from by single-token deletion, by
//! leaving the expected token missing, or by substituting an error node for
//! a primary that cannot start. Errors reported while recovering are
//! suppressed until a token is matched again.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::cst::{Chain, FieldInit, ListElement, MapInit, Node, RuleKind, Suffix, Ternary};
use crate::guard::RecursionGuard;
use crate::lexer::{Span, Tok, Token};
use crate::session::ParseSession;
use crate::stack;

/// Tokens that may start a primary expression, as listed in diagnostics.
const PRIMARY_START: &str = "{'[', '{', '(', '.', '-', '!', 'true', 'false', 'null', \
                             NUM_FLOAT, NUM_INT, NUM_UINT, STRING, BYTES, IDENTIFIER}";

/// Recursive descent recogniser over a token slice.
pub struct Grammar<'a, 'p> {
    source: Arc<str>,
    tokens: &'a [Tok],
    pos: usize,
    session: &'a mut ParseSession<'p>,
    guard: RecursionGuard,
    recovery_attempts: i32,
    /// Set after an error is reported; cleared when a token is matched.
    error_mode: bool,
    /// Set once a limit stops recognition. Nothing further is reported.
    halted: bool,
}

impl<'a, 'p> Grammar<'a, 'p> {
    pub fn new(tokens: &'a [Tok], session: &'a mut ParseSession<'p>) -> Self {
        Self {
            source: Arc::clone(&session.source),
            tokens,
            pos: 0,
            guard: RecursionGuard::new(session.options.max_recursion_depth),
            session,
            recovery_attempts: 0,
            error_mode: false,
            halted: false,
        }
    }

    /// Recognise a complete expression followed by end of input.
    pub fn parse(mut self) -> Node {
        let node = self.expr();
        if self.peek().is_some() {
            let message = format!("mismatched input {} expecting <EOF>", self.describe_current());
            self.syntax_error(self.peek_span(), message);
        }
        node
    }

    // === Utility Methods ===

    /// Peek at the current token without consuming it.
    fn peek(&self) -> Option<Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<Token> {
        self.tokens.get(self.pos + offset).map(|tok| tok.kind)
    }

    /// Get the span of the current token.
    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|tok| tok.span.clone())
            .unwrap_or_else(|| self.eof_span())
    }

    /// Get the span representing end-of-input.
    fn eof_span(&self) -> Span {
        let end = self.source.len();
        end..end
    }

    /// End offset of the last consumed token.
    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |tok| tok.span.end)
    }

    /// Check if the current token matches the given token.
    fn check(&self, kind: Token) -> bool {
        self.peek() == Some(kind)
    }

    /// Consume the current token if it matches.
    fn eat(&mut self, kind: Token) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).filter(|tok| tok.kind == kind)?.clone();
        self.pos += 1;
        self.error_mode = false;
        Some(tok)
    }

    /// Consume a run of identical tokens.
    fn eat_run(&mut self, kind: Token) -> Vec<Tok> {
        let mut run = Vec::new();
        while let Some(tok) = self.eat(kind) {
            run.push(tok);
        }
        run
    }

    /// Expect a specific token. A single extraneous token in front of it is
    /// deleted; otherwise the token is treated as missing.
    fn expect(&mut self, kind: Token) -> Option<Tok> {
        if let Some(tok) = self.eat(kind) {
            return Some(tok);
        }
        if self.peek().is_some() && self.peek_at(1) == Some(kind) {
            let message = format!(
                "extraneous input {} expecting {}",
                self.describe_current(),
                kind
            );
            self.syntax_error(self.peek_span(), message);
            if self.halted {
                return None;
            }
            self.pos += 1;
            return self.eat(kind);
        }
        self.mismatched(&kind.to_string());
        None
    }

    fn mismatched(&mut self, expected: &str) {
        let message = format!(
            "mismatched input {} expecting {}",
            self.describe_current(),
            expected
        );
        self.syntax_error(self.peek_span(), message);
    }

    /// The current token quoted for diagnostics.
    fn describe_current(&self) -> String {
        match self.tokens.get(self.pos) {
            Some(tok) => format!("'{}'", tok.text(&self.source)),
            None => "'<EOF>'".to_string(),
        }
    }

    fn syntax_error(&mut self, span: Span, message: String) {
        if self.halted || self.error_mode {
            return;
        }
        self.error_mode = true;
        if !self.session.report_syntax(span.clone(), &message) {
            warn!("error reporting limit reached");
            self.halt();
            return;
        }

        self.recovery_attempts += 1;
        let limit = self.session.options.error_recovery_limit;
        if limit >= 0 && self.recovery_attempts > limit {
            warn!(limit, "error recovery attempt limit exceeded");
            self.session.report(
                span,
                0,
                format!("error recovery attempt limit exceeded: {limit}"),
            );
            self.halt();
        }
    }

    /// Stop recognising: the remaining input is dropped.
    fn halt(&mut self) {
        self.halted = true;
        self.pos = self.tokens.len();
    }

    /// Report that recovery needed more lookahead than allowed.
    fn lookahead_exceeded(&mut self) {
        let limit = self.session.options.error_recovery_lookahead_token_limit;
        warn!(limit, "error recovery token lookahead limit exceeded");
        if !self.halted {
            self.session.report(
                self.peek_span(),
                0,
                format!("error recovery token lookahead limit exceeded: {limit}"),
            );
        }
        self.halt();
    }

    fn lookahead_limit(&self) -> usize {
        usize::try_from(self.session.options.error_recovery_lookahead_token_limit).unwrap_or(1)
    }

    // === Rule Plumbing ===

    /// Run a rule under the recursion guard. A rule nested too deeply skips
    /// its balanced token group and yields an error node.
    fn rule(&mut self, kind: RuleKind, f: impl FnOnce(&mut Self) -> Node) -> Node {
        let node = if self.guard.enter(kind) {
            trace!(rule = ?kind, depth = self.guard.depth(kind), pos = self.pos, "enter rule");
            stack::ensure_sufficient_stack(|| f(self))
        } else {
            if let Some(message) = self.guard.notify() {
                if !self.halted {
                    self.session.report(self.peek_span(), 0, message);
                }
                self.error_mode = true;
            }
            self.skip_nested()
        };
        self.guard.exit(kind);
        node
    }

    /// Consume tokens up to the first closer that has no matching opener.
    fn skip_nested(&mut self) -> Node {
        let start = self.peek_span().start;
        let limit = self.lookahead_limit();
        let mut depth = 0usize;
        let mut scanned = 0usize;
        while let Some(kind) = self.peek() {
            if kind.is_closer() {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            } else if matches!(kind, Token::LParen | Token::LBracket | Token::LBrace) {
                depth += 1;
            }
            scanned += 1;
            if scanned > limit {
                self.lookahead_exceeded();
                break;
            }
            self.pos += 1;
        }
        Node::Error {
            span: start..self.prev_end().max(start),
        }
    }

    // === Expression Rules ===

    /// `conditionalOr ('?' conditionalOr ':' expr)?`
    fn expr(&mut self) -> Node {
        self.rule(RuleKind::Expr, |g| {
            let cond = Box::new(g.conditional_or());
            let Some(question) = g.eat(Token::Question) else {
                return Node::Expr {
                    cond,
                    ternary: None,
                };
            };
            let then = Box::new(g.conditional_or());
            let otherwise = match g.expect(Token::Colon) {
                Some(_) => g.expr(),
                None => Node::Error {
                    span: g.peek_span(),
                },
            };
            Node::Expr {
                cond,
                ternary: Some(Ternary {
                    question,
                    then,
                    otherwise: Box::new(otherwise),
                }),
            }
        })
    }

    fn conditional_or(&mut self) -> Node {
        self.rule(RuleKind::ConditionalOr, |g| {
            Node::ConditionalOr(g.chain(&[Token::Or], Self::conditional_and))
        })
    }

    fn conditional_and(&mut self) -> Node {
        self.rule(RuleKind::ConditionalAnd, |g| {
            Node::ConditionalAnd(g.chain(&[Token::And], Self::relation))
        })
    }

    fn relation(&mut self) -> Node {
        const RELATIONS: &[Token] = &[
            Token::Lt,
            Token::Le,
            Token::Ge,
            Token::Gt,
            Token::EqEq,
            Token::Ne,
            Token::In,
        ];
        self.rule(RuleKind::Relation, |g| {
            Node::Relation(g.chain(RELATIONS, Self::additive))
        })
    }

    fn additive(&mut self) -> Node {
        self.rule(RuleKind::Calc, |g| {
            Node::Additive(g.chain(&[Token::Plus, Token::Minus], Self::multiplicative))
        })
    }

    /// The multiplicative level belongs to the same `calc` rule as the
    /// additive level, so it is not guarded separately.
    fn multiplicative(&mut self) -> Node {
        Node::Multiplicative(self.chain(&[Token::Star, Token::Slash, Token::Percent], Self::unary))
    }

    /// `operand (op operand)*` for any of the given operators.
    fn chain(&mut self, ops: &[Token], operand: fn(&mut Self) -> Node) -> Chain {
        let mut chain = Chain::single(operand(self));
        while let Some(op) = self
            .peek()
            .filter(|kind| ops.contains(kind))
            .and_then(|kind| self.eat(kind))
        {
            chain.ops.push(op);
            chain.rest.push(operand(self));
        }
        chain
    }

    /// `'!'+ member | '-'+ member | member`. A single `-` directly in front
    /// of a number is the literal's sign, not an operator.
    fn unary(&mut self) -> Node {
        self.rule(RuleKind::Unary, |g| {
            let ops = match g.peek() {
                Some(Token::Not) => g.eat_run(Token::Not),
                Some(Token::Minus)
                    if !g.peek_at(1).is_some_and(Token::is_signed_number) =>
                {
                    g.eat_run(Token::Minus)
                }
                _ => Vec::new(),
            };
            Node::Unary {
                ops,
                member: Box::new(g.member()),
            }
        })
    }

    fn member(&mut self) -> Node {
        self.rule(RuleKind::Member, |g| {
            let start = g.peek_span().start;
            let primary = Box::new(g.primary());
            let mut suffixes = Vec::new();
            loop {
                let suffix = match g.peek() {
                    Some(Token::Dot) => g.select_or_call(),
                    Some(Token::LBracket) => g.index(),
                    _ => break,
                };
                match suffix {
                    Some(suffix) => suffixes.push(suffix),
                    None => {
                        return Node::Error {
                            span: start..g.prev_end().max(start),
                        }
                    }
                }
            }
            Node::Member { primary, suffixes }
        })
    }

    /// `'.' '?'? escapeIdent` or `'.' IDENTIFIER '(' exprList? ')'`
    fn select_or_call(&mut self) -> Option<Suffix> {
        let dot = self.eat(Token::Dot)?;
        let optional = self.eat(Token::Question);
        let field = match self.peek() {
            Some(Token::Ident) => self.eat(Token::Ident)?,
            Some(Token::EscapedIdent) => self.eat(Token::EscapedIdent)?,
            _ => {
                let expected = if optional.is_some() {
                    "{IDENTIFIER, ESC_IDENTIFIER}"
                } else {
                    "{'?', IDENTIFIER, ESC_IDENTIFIER}"
                };
                self.mismatched(expected);
                return None;
            }
        };

        if optional.is_none() && field.kind == Token::Ident {
            if let Some(open) = self.eat(Token::LParen) {
                let args = self.expr_list(Token::RParen);
                self.expect(Token::RParen);
                return Some(Suffix::Call {
                    dot,
                    name: field,
                    open,
                    args,
                });
            }
        }
        Some(Suffix::Select {
            dot,
            optional,
            field,
        })
    }

    /// `'[' '?'? expr ']'`
    fn index(&mut self) -> Option<Suffix> {
        let open = self.eat(Token::LBracket)?;
        let optional = self.eat(Token::Question);
        let index = Box::new(self.expr());
        self.expect(Token::RBracket);
        Some(Suffix::Index {
            open,
            optional,
            index,
        })
    }

    /// Comma separated expressions up to (not including) `close`. No
    /// trailing comma.
    fn expr_list(&mut self, close: Token) -> Vec<Node> {
        let mut exprs = Vec::new();
        if self.check(close) || self.peek().is_none() {
            return exprs;
        }
        loop {
            exprs.push(self.expr());
            if self.halted || self.eat(Token::Comma).is_none() {
                break;
            }
        }
        exprs
    }

    fn primary(&mut self) -> Node {
        self.rule(RuleKind::Primary, |g| match g.peek() {
            Some(Token::Dot | Token::Ident) => g.ident_or_message(),
            Some(Token::LParen) => g.nested(),
            Some(Token::LBracket) => g.create_list(),
            Some(Token::LBrace) => g.create_map(),
            Some(Token::Minus) if g.peek_at(1).is_some_and(Token::is_signed_number) => {
                let sign = g.eat(Token::Minus);
                g.literal(sign)
            }
            Some(kind) if kind.is_literal() => g.literal(None),
            _ => {
                let span = g.peek_span();
                g.mismatched(PRIMARY_START);
                Node::Error {
                    span: span.start..span.start,
                }
            }
        })
    }

    fn literal(&mut self, sign: Option<Tok>) -> Node {
        match self.peek().and_then(|kind| self.eat(kind)) {
            Some(tok) => Node::Literal { sign, tok },
            None => {
                self.mismatched(PRIMARY_START);
                Node::Error {
                    span: self.peek_span(),
                }
            }
        }
    }

    /// `'.'? IDENTIFIER`, `'.'? IDENTIFIER '(' exprList? ')'` or
    /// `'.'? IDENTIFIER ('.' IDENTIFIER)* '{' fieldInits '}'`
    fn ident_or_message(&mut self) -> Node {
        let start = self.peek_span().start;
        let leading_dot = self.eat(Token::Dot);
        if !self.check(Token::Ident) {
            self.mismatched(&Token::Ident.to_string());
            return Node::Error {
                span: start..self.peek_span().start,
            };
        }

        if self.message_ahead() {
            return self.create_message(leading_dot);
        }

        let Some(name) = self.eat(Token::Ident) else {
            return Node::Error {
                span: start..self.peek_span().start,
            };
        };
        match self.eat(Token::LParen) {
            Some(open) => {
                let args = self.expr_list(Token::RParen);
                self.expect(Token::RParen);
                Node::GlobalCall {
                    leading_dot,
                    name,
                    open,
                    args,
                }
            }
            None => Node::Ident { leading_dot, name },
        }
    }

    /// Whether a qualified name followed by `{` starts here.
    fn message_ahead(&mut self) -> bool {
        let limit = self.lookahead_limit();
        let mut offset = 0;
        loop {
            if self.peek_at(offset) != Some(Token::Ident) {
                return false;
            }
            match self.peek_at(offset + 1) {
                Some(Token::LBrace) => return true,
                Some(Token::Dot) => offset += 2,
                _ => return false,
            }
            if offset > limit {
                self.lookahead_exceeded();
                return false;
            }
        }
    }

    fn create_message(&mut self, leading_dot: Option<Tok>) -> Node {
        let start = self.peek_span().start;
        let mut ids = Vec::new();
        while let Some(id) = self.eat(Token::Ident) {
            ids.push(id);
            if !self.check(Token::Dot) {
                break;
            }
            self.eat(Token::Dot);
        }
        let Some(open) = self.expect(Token::LBrace) else {
            return Node::Error {
                span: start..self.prev_end().max(start),
            };
        };

        let mut fields = Vec::new();
        if !self.check(Token::RBrace) {
            loop {
                let optional = self.eat(Token::Question);
                let name = match self.peek() {
                    Some(Token::Ident) => self.eat(Token::Ident),
                    Some(Token::EscapedIdent) => self.eat(Token::EscapedIdent),
                    _ => None,
                };
                let Some(name) = name else {
                    self.mismatched("{'?', IDENTIFIER, ESC_IDENTIFIER}");
                    break;
                };
                let Some(colon) = self.expect(Token::Colon) else {
                    break;
                };
                let value = self.expr();
                fields.push(FieldInit {
                    optional,
                    name,
                    colon,
                    value,
                });
                if self.halted || self.eat(Token::Comma).is_none() || self.check(Token::RBrace) {
                    break;
                }
            }
        }
        self.expect(Token::RBrace);

        Node::CreateMessage {
            leading_dot,
            ids,
            open,
            fields,
        }
    }

    fn nested(&mut self) -> Node {
        let Some(open) = self.eat(Token::LParen) else {
            return Node::Error {
                span: self.peek_span(),
            };
        };
        let inner = Box::new(self.expr());
        self.expect(Token::RParen);
        Node::Nested { open, inner }
    }

    /// `'[' (optExpr (',' optExpr)*)? ','? ']'`
    fn create_list(&mut self) -> Node {
        let Some(open) = self.eat(Token::LBracket) else {
            return Node::Error {
                span: self.peek_span(),
            };
        };
        let mut elements = Vec::new();
        if !self.check(Token::RBracket) && self.peek().is_some() {
            loop {
                let optional = self.eat(Token::Question);
                let value = self.expr();
                elements.push(ListElement { optional, value });
                if self.halted || self.eat(Token::Comma).is_none() || self.check(Token::RBracket) {
                    break;
                }
            }
        }
        self.expect(Token::RBracket);
        Node::CreateList { open, elements }
    }

    /// `'{' (optExpr ':' expr (',' optExpr ':' expr)*)? ','? '}'`
    fn create_map(&mut self) -> Node {
        let Some(open) = self.eat(Token::LBrace) else {
            return Node::Error {
                span: self.peek_span(),
            };
        };
        let mut entries = Vec::new();
        if !self.check(Token::RBrace) && self.peek().is_some() {
            loop {
                let optional = self.eat(Token::Question);
                let key = self.expr();
                let Some(colon) = self.expect(Token::Colon) else {
                    break;
                };
                let value = self.expr();
                entries.push(MapInit {
                    optional,
                    key,
                    colon,
                    value,
                });
                if self.halted || self.eat(Token::Comma).is_none() || self.check(Token::RBrace) {
                    break;
                }
            }
        }
        self.expect(Token::RBrace);
        Node::CreateMap { open, entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::macros::MacroRegistry;
    use crate::options::ParserOptions;

    fn recognise_with(source: &str, options: &ParserOptions) -> (Node, Vec<String>) {
        let macros = MacroRegistry::new();
        let mut session = ParseSession::new(Arc::from(source), options, &macros);
        let (tokens, lex_errors) = lex(source);
        assert!(lex_errors.is_empty());
        let node = Grammar::new(&tokens, &mut session).parse();
        let (_, errors) = session.finish();
        (node, errors.into_iter().map(|e| e.message).collect())
    }

    fn recognise(source: &str) -> (Node, Vec<String>) {
        recognise_with(source, &ParserOptions::default())
    }

    #[test]
    fn well_formed_input_has_no_errors() {
        for source in [
            "a + b * c",
            "x ? y : z",
            "a.b.c(1, 2)[3]",
            "f(x) || !g(y) && -h",
            "[1, 2, 3,]",
            "{'a': 1, 'b': 2,}",
            ".pkg.Msg{field: 1, other: [],}",
            "a.?b[?0]",
            "x in [1, 2]",
            "-1 - -2",
        ] {
            let (_, errors) = recognise(source);
            assert!(errors.is_empty(), "{source}: {errors:?}");
        }
    }

    #[test]
    fn wrappers_are_present_for_simple_input() {
        let (node, _) = recognise("x");
        let Node::Expr { cond, ternary: None } = &node else {
            panic!("expected expr wrapper, got {node:?}");
        };
        assert!(matches!(**cond, Node::ConditionalOr(_)));
        assert!(matches!(node.unnest(), Node::Ident { .. }));
    }

    #[test]
    fn sign_attaches_to_single_minus_before_number() {
        let (node, _) = recognise("-1");
        assert!(matches!(
            node.unnest(),
            Node::Literal { sign: Some(_), .. }
        ));

        let (node, _) = recognise("--1");
        let Node::Unary { ops, member } = node.unnest() else {
            panic!("expected unary");
        };
        assert_eq!(ops.len(), 2);
        assert!(matches!(member.unnest(), Node::Literal { sign: None, .. }));
    }

    #[test]
    fn message_construction_is_detected() {
        let (node, _) = recognise("a.b.C{f: 1}");
        let Node::CreateMessage { ids, fields, .. } = node.unnest() else {
            panic!("expected message");
        };
        assert_eq!(ids.len(), 3);
        assert_eq!(fields.len(), 1);

        let (node, _) = recognise("a.b.c");
        let Node::Member { suffixes, .. } = node.unnest() else {
            panic!("expected member");
        };
        assert_eq!(suffixes.len(), 2);
    }

    #[test]
    fn missing_operand_reports_expected_set() {
        let (_, errors) = recognise("1 +");
        assert_eq!(
            errors,
            vec![format!("Syntax error: mismatched input '<EOF>' expecting {PRIMARY_START}")]
        );
    }

    #[test]
    fn trailing_tokens_are_reported() {
        let (_, errors) = recognise("1 2");
        assert_eq!(
            errors,
            vec!["Syntax error: mismatched input '2' expecting <EOF>"]
        );
    }

    #[test]
    fn extraneous_token_is_deleted() {
        let (node, errors) = recognise("f(1 2)");
        assert_eq!(
            errors,
            vec!["Syntax error: extraneous input '2' expecting ')'"]
        );
        assert!(matches!(node.unnest(), Node::GlobalCall { args, .. } if args.len() == 1));
    }

    #[test]
    fn errors_are_not_repeated_while_recovering() {
        let (_, errors) = recognise("(1 + ");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn deep_nesting_reports_once_and_completes() {
        let source = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        let (_, errors) = recognise(&source);
        assert_eq!(errors, vec!["expression recursion limit exceeded: 250"]);
    }

    #[test]
    fn recovery_attempts_are_limited() {
        let options = ParserOptions {
            error_recovery_limit: 1,
            ..ParserOptions::default()
        };
        // Each `f(1 2)` deletes one token and then matches `)`.
        let (_, errors) = recognise_with("[f(1 2), f(1 2), f(1 2)]", &options);
        assert_eq!(
            errors,
            vec![
                "Syntax error: extraneous input '2' expecting ')'",
                "Syntax error: extraneous input '2' expecting ')'",
                "error recovery attempt limit exceeded: 1",
            ]
        );
    }

    #[test]
    fn lookahead_is_limited() {
        let options = ParserOptions {
            error_recovery_lookahead_token_limit: 4,
            ..ParserOptions::default()
        };
        let (_, errors) = recognise_with("a.b.c.d.e", &options);
        assert_eq!(errors, vec!["error recovery token lookahead limit exceeded: 4"]);
    }
}
