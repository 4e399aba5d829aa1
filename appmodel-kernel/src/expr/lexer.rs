//! Tokenizer for "when" clauses.

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    Null,
    In,
    NotKw,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier {:?}", name),
            Token::Str(s) => format!("string {:?}", s),
            Token::Int(n) => format!("number {}", n),
            Token::Float(x) => format!("number {}", x),
            Token::True => "'true'".into(),
            Token::False => "'false'".into(),
            Token::Null => "'null'".into(),
            Token::In => "'in'".into(),
            Token::NotKw => "'not'".into(),
            Token::Bang => "'!'".into(),
            Token::AndAnd => "'&&'".into(),
            Token::OrOr => "'||'".into(),
            Token::EqEq => "'=='".into(),
            Token::NotEq => "'!='".into(),
            Token::Lt => "'<'".into(),
            Token::Le => "'<='".into(),
            Token::Gt => "'>'".into(),
            Token::Ge => "'>='".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::LBracket => "'['".into(),
            Token::RBracket => "']'".into(),
            Token::Comma => "','".into(),
        }
    }
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let two = bytes.get(i + 1).copied();
        let token = match (c, two) {
            (b'&', Some(b'&')) => {
                i += 2;
                Token::AndAnd
            }
            (b'|', Some(b'|')) => {
                i += 2;
                Token::OrOr
            }
            (b'=', Some(b'=')) => {
                i += 2;
                Token::EqEq
            }
            (b'!', Some(b'=')) => {
                i += 2;
                Token::NotEq
            }
            (b'<', Some(b'=')) => {
                i += 2;
                Token::Le
            }
            (b'>', Some(b'=')) => {
                i += 2;
                Token::Ge
            }
            (b'!', _) => {
                i += 1;
                Token::Bang
            }
            (b'<', _) => {
                i += 1;
                Token::Lt
            }
            (b'>', _) => {
                i += 1;
                Token::Gt
            }
            (b'(', _) => {
                i += 1;
                Token::LParen
            }
            (b')', _) => {
                i += 1;
                Token::RParen
            }
            (b'[', _) => {
                i += 1;
                Token::LBracket
            }
            (b']', _) => {
                i += 1;
                Token::RBracket
            }
            (b',', _) => {
                i += 1;
                Token::Comma
            }
            (b'&' | b'|' | b'=', _) => {
                return Err(ParseError::new(format!("unknown operator '{}'", c as char), start));
            }
            (b'\'' | b'"', _) => {
                let (s, end) = lex_string(source, i)?;
                i = end;
                Token::Str(s)
            }
            (b'0'..=b'9', _) => {
                let (tok, end) = lex_number(source, i)?;
                i = end;
                tok
            }
            (b'-', Some(b'0'..=b'9')) => {
                let (tok, end) = lex_number(source, i + 1)?;
                i = end;
                match tok {
                    Token::Int(n) => Token::Int(-n),
                    Token::Float(x) => Token::Float(-x),
                    other => other,
                }
            }
            _ if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                match &source[start..i] {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "in" => Token::In,
                    "not" => Token::NotKw,
                    word => Token::Ident(word.to_string()),
                }
            }
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(ParseError::new(format!("unexpected character '{}'", ch), start));
            }
        };

        tokens.push(Spanned { token, pos: start });
    }

    Ok(tokens)
}

/// Lex a quoted string starting at `start`. Returns the contents and the end offset.
fn lex_string(source: &str, start: usize) -> Result<(String, usize), ParseError> {
    let mut chars = source[start..].char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return Err(ParseError::new("unterminated string", start)),
    };
    let mut out = String::new();
    let mut escaped = false;

    for (offset, c) in chars {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((out, start + offset + c.len_utf8()));
        } else {
            out.push(c);
        }
    }

    Err(ParseError::new("unterminated string", start))
}

fn lex_number(source: &str, start: usize) -> Result<(Token, usize), ParseError> {
    let bytes = source.as_bytes();
    let mut i = start;
    let mut is_float = false;

    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => i += 1,
            b'.' if !is_float && matches!(bytes.get(i + 1), Some(b'0'..=b'9')) => {
                is_float = true;
                i += 1;
            }
            _ => break,
        }
    }

    // Exponent: `1e16`, `2.5E-7`.
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let digits_at = match bytes.get(i + 1) {
            Some(b'+' | b'-') => i + 2,
            _ => i + 1,
        };
        if matches!(bytes.get(digits_at), Some(b'0'..=b'9')) {
            is_float = true;
            i = digits_at;
            while matches!(bytes.get(i), Some(b'0'..=b'9')) {
                i += 1;
            }
        }
    }

    let text = &source[start..i];
    let invalid = || ParseError::new(format!("invalid number {:?}", text), start);
    let token = if is_float {
        let x: f64 = text.parse().map_err(|_| invalid())?;
        if !x.is_finite() {
            return Err(ParseError::new(format!("number out of range {:?}", text), start));
        }
        Token::Float(x)
    } else {
        Token::Int(text.parse().map_err(|_| invalid())?)
    };
    Ok((token, i))
}
