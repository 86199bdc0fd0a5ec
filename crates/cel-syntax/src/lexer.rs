//! CEL lexer using logos.
//!
//! Tokens only classify and locate source text. Literal values are decoded
//! later by the AST builder so that bad literals surface as positioned parse
//! errors instead of lexing failures.

use logos::Logos;

/// A span in the source input (byte offsets).
pub type Span = std::ops::Range<usize>;

/// Lexer error with span information.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

/// A classified token and where it sits in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Tok {
    pub kind: Token,
    pub span: Span,
}

impl Tok {
    pub fn new(kind: Token, span: Span) -> Self {
        Self { kind, span }
    }

    /// The source text covered by this token.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.span.clone()).unwrap_or("")
    }
}

/// CEL tokens.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\n\r\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // === Numeric Literals ===
    #[regex(r"0[xX][0-9a-fA-F]+[uU]")]
    #[regex(r"[0-9]+[uU]")]
    Uint,

    #[regex(r"0[xX][0-9a-fA-F]+")]
    #[regex(r"[0-9]+")]
    Int,

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    Double,

    // === String Literals ===
    // The callback scans to the closing delimiter; the token keeps the raw
    // text including prefix and quotes.
    #[token("\"", lex_quoted)]
    #[token("'", lex_quoted)]
    #[token("\"\"\"", lex_quoted)]
    #[token("'''", lex_quoted)]
    #[regex(r#"[rR]""#, lex_quoted)]
    #[regex(r"[rR]'", lex_quoted)]
    #[regex(r#"[rR]""""#, lex_quoted)]
    #[regex(r"[rR]'''", lex_quoted)]
    String,

    #[regex(r#"[bB]""#, lex_quoted)]
    #[regex(r"[bB]'", lex_quoted)]
    #[regex(r#"[bB]""""#, lex_quoted)]
    #[regex(r"[bB]'''", lex_quoted)]
    #[regex(r#"([bB][rR]|[rR][bB])""#, lex_quoted)]
    #[regex(r"([bB][rR]|[rR][bB])'", lex_quoted)]
    #[regex(r#"([bB][rR]|[rR][bB])""""#, lex_quoted)]
    #[regex(r"([bB][rR]|[rR][bB])'''", lex_quoted)]
    Bytes,

    // === Keywords ===
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("in")]
    In,

    // === Identifiers ===
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
    #[regex(r"`[a-zA-Z0-9_./ \-]+`")]
    EscapedIdent,

    // === Operators (multi-char first) ===
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    And,
    #[token("||")]
    Or,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Not,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
}

impl Token {
    /// True for tokens that can only be a literal primary.
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            Token::Int
                | Token::Uint
                | Token::Double
                | Token::String
                | Token::Bytes
                | Token::True
                | Token::False
                | Token::Null
        )
    }

    /// True for the numeric literals a leading `-` may attach to.
    pub fn is_signed_number(self) -> bool {
        matches!(self, Token::Int | Token::Double)
    }

    /// True for tokens that close a bracketed group.
    pub fn is_closer(self) -> bool {
        matches!(self, Token::RParen | Token::RBracket | Token::RBrace)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Token::Int => "NUM_INT",
            Token::Uint => "NUM_UINT",
            Token::Double => "NUM_FLOAT",
            Token::String => "STRING",
            Token::Bytes => "BYTES",
            Token::True => "'true'",
            Token::False => "'false'",
            Token::Null => "'null'",
            Token::In => "'in'",
            Token::Ident => "IDENTIFIER",
            Token::EscapedIdent => "ESC_IDENTIFIER",
            Token::EqEq => "'=='",
            Token::Ne => "'!='",
            Token::Le => "'<='",
            Token::Ge => "'>='",
            Token::And => "'&&'",
            Token::Or => "'||'",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Lt => "'<'",
            Token::Gt => "'>'",
            Token::Not => "'!'",
            Token::Question => "'?'",
            Token::Colon => "':'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::Dot => "'.'",
            Token::Comma => "','",
        };
        f.write_str(name)
    }
}

// === Lexer Callbacks for Quoted Literals ===

/// Consume the body of a quoted literal whose opening delimiter was just
/// matched. An unterminated literal swallows the rest of its line (or the
/// rest of the input for triple quotes) and reports an error.
fn lex_quoted(lex: &mut logos::Lexer<Token>) -> bool {
    let opening = lex.slice();
    let quote = if opening.ends_with('\'') { '\'' } else { '"' };
    let triple = opening.ends_with("'''") || opening.ends_with("\"\"\"");
    let raw = opening.contains(['r', 'R']);

    let remainder = lex.remainder();
    match closing_offset(remainder, quote, triple, raw) {
        Some(end) => {
            lex.bump(end);
            true
        }
        None => {
            let rest = if triple {
                remainder.len()
            } else {
                remainder.find('\n').unwrap_or(remainder.len())
            };
            lex.bump(rest);
            false
        }
    }
}

/// Byte offset just past the closing delimiter, if the literal is terminated.
fn closing_offset(body: &str, quote: char, triple: bool, raw: bool) -> Option<usize> {
    let delimiter: &str = if quote == '"' { "\"\"\"" } else { "'''" };
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if !raw => match chars.next() {
                Some((_, '\n' | '\r')) if !triple => return None,
                Some(_) => {}
                None => return None,
            },
            '\n' | '\r' if !triple => return None,
            c if c == quote => {
                if !triple {
                    return Some(i + 1);
                }
                if body[i..].starts_with(delimiter) {
                    return Some(i + delimiter.len());
                }
            }
            _ => {}
        }
    }

    None
}

// === Public Lexer API ===

/// Tokenize the input string.
///
/// Lexing never stops early: unrecognised input is reported and skipped so
/// the grammar sees every token that could be classified.
pub fn lex(input: &str) -> (Vec<Tok>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = Token::lexer(input);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(kind) => tokens.push(Tok::new(kind, span)),
            Err(()) => errors.push(LexError {
                message: format!(
                    "token recognition error at: '{}'",
                    input.get(span.clone()).unwrap_or_default()
                ),
                span,
            }),
        }
    }

    (tokens, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_tokens(input: &str) -> Vec<Token> {
        let (tokens, errors) = lex(input);
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        tokens.into_iter().map(|tok| tok.kind).collect()
    }

    fn lex_texts(input: &str) -> Vec<&str> {
        let (tokens, _) = lex(input);
        tokens
            .iter()
            .map(|tok| &input[tok.span.clone()])
            .collect()
    }

    #[test]
    fn lex_integers() {
        assert_eq!(lex_tokens("123"), vec![Token::Int]);
        assert_eq!(lex_tokens("0"), vec![Token::Int]);
        assert_eq!(lex_tokens("0x1F"), vec![Token::Int]);
        assert_eq!(lex_tokens("0XAB"), vec![Token::Int]);
    }

    #[test]
    fn lex_unsigned_integers() {
        assert_eq!(lex_tokens("123u"), vec![Token::Uint]);
        assert_eq!(lex_tokens("123U"), vec![Token::Uint]);
        assert_eq!(lex_tokens("0x1Fu"), vec![Token::Uint]);
    }

    #[test]
    fn lex_floats() {
        assert_eq!(lex_tokens("1.5"), vec![Token::Double]);
        assert_eq!(lex_tokens("1e10"), vec![Token::Double]);
        assert_eq!(lex_tokens("1.5e-3"), vec![Token::Double]);
        assert_eq!(lex_tokens(".5"), vec![Token::Double]);
    }

    #[test]
    fn lex_strings_keep_raw_text() {
        assert_eq!(lex_texts(r#""hello""#), vec![r#""hello""#]);
        assert_eq!(lex_texts("'world'"), vec!["'world'"]);
        assert_eq!(lex_texts(r#""a\"b" + c"#), vec![r#""a\"b""#, "+", "c"]);
        assert_eq!(lex_tokens(r#""hello\nworld""#), vec![Token::String]);
    }

    #[test]
    fn lex_raw_strings() {
        assert_eq!(lex_tokens(r#"r"hello\n""#), vec![Token::String]);
        assert_eq!(lex_tokens(r"R'hello\n'"), vec![Token::String]);
        // A backslash does not escape the quote in a raw string.
        assert_eq!(lex_texts(r#"r"\" + x"#), vec![r#"r"\""#, "+", "x"]);
    }

    #[test]
    fn lex_triple_strings() {
        assert_eq!(
            lex_texts("\"\"\"multi\nline\"\"\" + x"),
            vec!["\"\"\"multi\nline\"\"\"", "+", "x"]
        );
        assert_eq!(lex_tokens("'''it's'''"), vec![Token::String]);
    }

    #[test]
    fn lex_empty_string() {
        assert_eq!(lex_texts(r#""" + ''"#), vec![r#""""#, "+", "''"]);
    }

    #[test]
    fn lex_bytes() {
        assert_eq!(lex_tokens(r#"b"hello""#), vec![Token::Bytes]);
        assert_eq!(lex_tokens("B'world'"), vec![Token::Bytes]);
        assert_eq!(lex_tokens(r#"br"\d""#), vec![Token::Bytes]);
        assert_eq!(lex_tokens(r#"Rb"\d""#), vec![Token::Bytes]);
    }

    #[test]
    fn lex_keywords() {
        assert_eq!(lex_tokens("true"), vec![Token::True]);
        assert_eq!(lex_tokens("false"), vec![Token::False]);
        assert_eq!(lex_tokens("null"), vec![Token::Null]);
        assert_eq!(lex_tokens("in"), vec![Token::In]);
        assert_eq!(lex_tokens("int"), vec![Token::Ident]);
    }

    #[test]
    fn lex_reserved_words_are_identifiers() {
        // Reserved words are rejected by the AST builder, not the lexer.
        assert_eq!(lex_tokens("if"), vec![Token::Ident]);
        assert_eq!(lex_tokens("while"), vec![Token::Ident]);
        assert_eq!(lex_tokens("namespace"), vec![Token::Ident]);
    }

    #[test]
    fn lex_identifiers() {
        assert_eq!(lex_texts("foo _bar baz123"), vec!["foo", "_bar", "baz123"]);
        assert_eq!(lex_tokens("b"), vec![Token::Ident]);
        assert_eq!(lex_tokens("rb"), vec![Token::Ident]);
    }

    #[test]
    fn lex_escaped_identifiers() {
        assert_eq!(lex_tokens("`a-b`"), vec![Token::EscapedIdent]);
        assert_eq!(lex_tokens("`a/b.c d`"), vec![Token::EscapedIdent]);
        assert_eq!(
            lex_tokens("a.`b-c`"),
            vec![Token::Ident, Token::Dot, Token::EscapedIdent]
        );
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            lex_tokens("+ - * / %"),
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::Percent
            ]
        );
        assert_eq!(
            lex_tokens("== != < <= > >="),
            vec![
                Token::EqEq,
                Token::Ne,
                Token::Lt,
                Token::Le,
                Token::Gt,
                Token::Ge
            ]
        );
        assert_eq!(lex_tokens("&& || !"), vec![Token::And, Token::Or, Token::Not]);
        assert_eq!(lex_tokens("? :"), vec![Token::Question, Token::Colon]);
    }

    #[test]
    fn lex_delimiters() {
        assert_eq!(
            lex_tokens("( ) [ ] { } . ,"),
            vec![
                Token::LParen,
                Token::RParen,
                Token::LBracket,
                Token::RBracket,
                Token::LBrace,
                Token::RBrace,
                Token::Dot,
                Token::Comma
            ]
        );
    }

    #[test]
    fn lex_optional_markers() {
        assert_eq!(
            lex_tokens("a.?b[?c]"),
            vec![
                Token::Ident,
                Token::Dot,
                Token::Question,
                Token::Ident,
                Token::LBracket,
                Token::Question,
                Token::Ident,
                Token::RBracket
            ]
        );
    }

    #[test]
    fn lex_with_comments() {
        assert_eq!(
            lex_tokens("a // comment\n+ b"),
            vec![Token::Ident, Token::Plus, Token::Ident]
        );
    }

    #[test]
    fn lex_spans() {
        let (tokens, _) = lex("a +\n  12");
        let spans: Vec<Span> = tokens.into_iter().map(|t| t.span).collect();
        assert_eq!(spans, vec![0..1, 2..3, 6..8]);
    }

    #[test]
    fn lex_recovers_from_unknown_characters() {
        let (tokens, errors) = lex("a @ b");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![Token::Ident, Token::Ident]
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "token recognition error at: '@'");
        assert_eq!(errors[0].span, 2..3);
    }

    #[test]
    fn lex_unterminated_string() {
        let (tokens, errors) = lex("\"hello\n+ 1");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "token recognition error at: '\"hello'");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![Token::Plus, Token::Int]
        );
    }
}
