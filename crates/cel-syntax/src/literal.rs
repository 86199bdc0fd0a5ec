//! Conversion of literal token text into typed values.
//!
//! The lexer only delimits literals. Everything here works on the raw token
//! text so that malformed numbers and escapes become ordinary parse errors.

use std::str::Chars;

use thiserror::Error;

/// A string or bytes literal whose body could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscapeError {
    #[error("literal is not terminated")]
    Unterminated,

    #[error("invalid escape sequence: \\{0}")]
    UnknownEscape(char),

    #[error("escape sequence is truncated")]
    Truncated,

    #[error("invalid digit in escape sequence: {0}")]
    InvalidDigit(char),

    #[error("invalid unicode code point: {0:#x}")]
    InvalidCodePoint(u32),

    #[error("unicode escape sequences are not allowed in bytes literals")]
    UnicodeInBytes,
}

/// Parse an int literal (decimal or `0x` hex). `negative` carries a `-` sign
/// that the grammar attached to the literal, which lets `-9223372036854775808`
/// parse even though its magnitude does not fit in an `i64`.
pub fn parse_int(text: &str, negative: bool) -> Option<i64> {
    let (digits, radix) = split_radix(text);
    if negative {
        i64::from_str_radix(&format!("-{digits}"), radix).ok()
    } else {
        i64::from_str_radix(digits, radix).ok()
    }
}

/// Parse a uint literal: digits with a trailing `u`/`U`.
pub fn parse_uint(text: &str) -> Option<u64> {
    let text = text.strip_suffix(['u', 'U'])?;
    let (digits, radix) = split_radix(text);
    u64::from_str_radix(digits, radix).ok()
}

/// Parse a double literal. Values that overflow to infinity are rejected.
pub fn parse_double(text: &str, negative: bool) -> Option<f64> {
    let value: f64 = text.parse().ok()?;
    if value.is_infinite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

fn split_radix(text: &str) -> (&str, u32) {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (text, 10),
    }
}

/// Decode the full text of a string literal, quotes and prefix included.
pub fn unquote_string(text: &str) -> Result<String, EscapeError> {
    let quoted = Quoted::split(text)?;
    if quoted.raw {
        return Ok(quoted.body.to_string());
    }

    let mut out = String::with_capacity(quoted.body.len());
    let mut chars = quoted.body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match unescape(&mut chars, false)? {
            Unescaped::Char(c) => out.push(c),
            Unescaped::Byte(b) => out.push(char::from(b)),
        }
    }
    Ok(out)
}

/// Decode the full text of a bytes literal. Characters contribute their UTF-8
/// encoding; `\x` and octal escapes contribute single raw bytes.
pub fn unquote_bytes(text: &str) -> Result<Vec<u8>, EscapeError> {
    let quoted = Quoted::split(text)?;
    if quoted.raw {
        return Ok(quoted.body.as_bytes().to_vec());
    }

    let mut out = Vec::with_capacity(quoted.body.len());
    let mut chars = quoted.body.chars();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        let decoded = if c == '\\' {
            unescape(&mut chars, true)?
        } else {
            Unescaped::Char(c)
        };
        match decoded {
            Unescaped::Char(c) => out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
            Unescaped::Byte(b) => out.push(b),
        }
    }
    Ok(out)
}

/// A literal split into its prefix flags and the text between the quotes.
struct Quoted<'a> {
    raw: bool,
    body: &'a str,
}

impl<'a> Quoted<'a> {
    fn split(text: &'a str) -> Result<Self, EscapeError> {
        let prefix_len = text
            .chars()
            .take_while(|c| matches!(c, 'r' | 'R' | 'b' | 'B'))
            .count();
        let (prefix, quoted) = text.split_at(prefix_len);
        let raw = prefix.contains(['r', 'R']);

        for delimiter in ["\"\"\"", "'''", "\"", "'"] {
            if quoted.len() >= 2 * delimiter.len()
                && quoted.starts_with(delimiter)
                && quoted.ends_with(delimiter)
            {
                let body = &quoted[delimiter.len()..quoted.len() - delimiter.len()];
                return Ok(Self { raw, body });
            }
        }
        Err(EscapeError::Unterminated)
    }
}

enum Unescaped {
    Char(char),
    Byte(u8),
}

/// Decode one escape sequence; the leading backslash has been consumed.
fn unescape(chars: &mut Chars<'_>, bytes: bool) -> Result<Unescaped, EscapeError> {
    let c = chars.next().ok_or(EscapeError::Truncated)?;
    let simple = match c {
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0C',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\x0B',
        '\\' | '?' | '"' | '\'' | '`' => c,
        'x' | 'X' => {
            let value = read_digits(chars, 2, 16)?;
            return Ok(Unescaped::Byte(value as u8));
        }
        '0'..='3' => {
            let rest = read_digits(chars, 2, 8)?;
            let value = (c as u32 - '0' as u32) * 64 + rest;
            return Ok(Unescaped::Byte(value as u8));
        }
        'u' | 'U' => {
            if bytes {
                return Err(EscapeError::UnicodeInBytes);
            }
            let width = if c == 'u' { 4 } else { 8 };
            let value = read_digits(chars, width, 16)?;
            let decoded = char::from_u32(value).ok_or(EscapeError::InvalidCodePoint(value))?;
            return Ok(Unescaped::Char(decoded));
        }
        other => return Err(EscapeError::UnknownEscape(other)),
    };
    Ok(Unescaped::Char(simple))
}

fn read_digits(chars: &mut Chars<'_>, count: usize, radix: u32) -> Result<u32, EscapeError> {
    let mut value = 0u32;
    for _ in 0..count {
        let c = chars.next().ok_or(EscapeError::Truncated)?;
        let digit = c.to_digit(radix).ok_or(EscapeError::InvalidDigit(c))?;
        value = value * radix + digit;
    }
    Ok(value)
}
