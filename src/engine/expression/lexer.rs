//! Tokenizer for the expression language.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Question,
    Colon,
    /// `=>` introducing a lambda argument.
    Arrow,
}

impl Token {
    /// Human-readable token description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Str(s) => format!("string \"{s}\""),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Null => "'null'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::AndAnd => "'&&'".to_string(),
            Token::OrOr => "'||'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Question => "'?'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Arrow => "'=>'".to_string(),
        }
    }
}

/// A token together with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub position: usize,
}

/// Tokenize an expression string.
///
/// Keywords (`true`, `false`, `null`, `and`, `or`, `not`) are matched
/// case-insensitively; `and`/`or`/`not` lex to the same tokens as
/// `&&`/`||`/`!`.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ExprError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos] as char;

        match c {
            ' ' | '\t' | '\r' | '\n' => {
                pos += 1;
                continue;
            }
            '(' => push_single(&mut tokens, Token::LParen, &mut pos, start),
            ')' => push_single(&mut tokens, Token::RParen, &mut pos, start),
            '[' => push_single(&mut tokens, Token::LBracket, &mut pos, start),
            ']' => push_single(&mut tokens, Token::RBracket, &mut pos, start),
            ',' => push_single(&mut tokens, Token::Comma, &mut pos, start),
            '.' => push_single(&mut tokens, Token::Dot, &mut pos, start),
            '?' => push_single(&mut tokens, Token::Question, &mut pos, start),
            ':' => push_single(&mut tokens, Token::Colon, &mut pos, start),
            '+' => push_single(&mut tokens, Token::Plus, &mut pos, start),
            '-' => push_single(&mut tokens, Token::Minus, &mut pos, start),
            '*' => push_single(&mut tokens, Token::Star, &mut pos, start),
            '/' => push_single(&mut tokens, Token::Slash, &mut pos, start),
            '%' => push_single(&mut tokens, Token::Percent, &mut pos, start),
            '=' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(SpannedToken {
                        token: Token::EqEq,
                        position: start,
                    });
                    pos += 2;
                } else if bytes.get(pos + 1) == Some(&b'>') {
                    tokens.push(SpannedToken {
                        token: Token::Arrow,
                        position: start,
                    });
                    pos += 2;
                } else {
                    return Err(ExprError::Parse {
                        position: start,
                        message: "unexpected '='; use '==' for comparison".to_string(),
                    });
                }
            }
            '!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(SpannedToken {
                        token: Token::NotEq,
                        position: start,
                    });
                    pos += 2;
                } else {
                    push_single(&mut tokens, Token::Bang, &mut pos, start);
                }
            }
            '<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(SpannedToken {
                        token: Token::Le,
                        position: start,
                    });
                    pos += 2;
                } else {
                    push_single(&mut tokens, Token::Lt, &mut pos, start);
                }
            }
            '>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(SpannedToken {
                        token: Token::Ge,
                        position: start,
                    });
                    pos += 2;
                } else {
                    push_single(&mut tokens, Token::Gt, &mut pos, start);
                }
            }
            '&' => {
                if bytes.get(pos + 1) == Some(&b'&') {
                    tokens.push(SpannedToken {
                        token: Token::AndAnd,
                        position: start,
                    });
                    pos += 2;
                } else {
                    return Err(ExprError::Parse {
                        position: start,
                        message: "unexpected '&'; use '&&' for logical and".to_string(),
                    });
                }
            }
            '|' => {
                if bytes.get(pos + 1) == Some(&b'|') {
                    tokens.push(SpannedToken {
                        token: Token::OrOr,
                        position: start,
                    });
                    pos += 2;
                } else {
                    return Err(ExprError::Parse {
                        position: start,
                        message: "unexpected '|'; use '||' for logical or".to_string(),
                    });
                }
            }
            '"' | '\'' => {
                let (string, consumed) = lex_string(source, pos, c)?;
                tokens.push(SpannedToken {
                    token: Token::Str(string),
                    position: start,
                });
                pos += consumed;
            }
            '0'..='9' => {
                let (number, consumed) = lex_number(source, pos)?;
                tokens.push(SpannedToken {
                    token: Token::Number(number),
                    position: start,
                });
                pos += consumed;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let end = source[pos..]
                    .find(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
                    .map(|offset| pos + offset)
                    .unwrap_or(source.len());
                let word = &source[pos..end];
                let token = match word.to_ascii_lowercase().as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::AndAnd,
                    "or" => Token::OrOr,
                    "not" => Token::Bang,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push(SpannedToken {
                    token,
                    position: start,
                });
                pos = end;
            }
            other => {
                return Err(ExprError::Parse {
                    position: start,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

fn push_single(tokens: &mut Vec<SpannedToken>, token: Token, pos: &mut usize, start: usize) {
    tokens.push(SpannedToken {
        token,
        position: start,
    });
    *pos += 1;
}

/// Lex a quoted string starting at `start`; returns the unescaped content
/// and the number of bytes consumed including both quotes.
fn lex_string(source: &str, start: usize, quote: char) -> Result<(String, usize), ExprError> {
    let mut out = String::new();
    let mut chars = source[start + 1..].char_indices();

    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\'')) => out.push('\''),
                Some((_, other)) => {
                    return Err(ExprError::Parse {
                        position: start + 1 + offset,
                        message: format!("unknown escape sequence '\\{other}'"),
                    });
                }
                None => {
                    return Err(ExprError::Parse {
                        position: start,
                        message: "unterminated string literal".to_string(),
                    });
                }
            },
            c if c == quote => {
                return Ok((out, offset + 1 + c.len_utf8()));
            }
            other => out.push(other),
        }
    }

    Err(ExprError::Parse {
        position: start,
        message: "unterminated string literal".to_string(),
    })
}

/// Lex a number literal: digits with optional fraction and exponent.
fn lex_number(source: &str, start: usize) -> Result<(f64, usize), ExprError> {
    let bytes = source.as_bytes();
    let mut end = start;

    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    // Fraction: a '.' only belongs to the number when a digit follows,
    // otherwise it is a member-access dot (e.g. `1.to_string()` is invalid
    // anyway, but `items[0].name` must not eat the dot).
    if end < bytes.len()
        && bytes[end] == b'.'
        && bytes.get(end + 1).is_some_and(|b| b.is_ascii_digit())
    {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        if exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            end = exp_end;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }

    source[start..end]
        .parse::<f64>()
        .map(|n| (n, end - start))
        .map_err(|_| ExprError::Parse {
            position: start,
            message: format!("invalid number literal '{}'", &source[start..end]),
        })
}
