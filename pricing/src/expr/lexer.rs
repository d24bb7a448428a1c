//! Tokenizer for rule conditions.

use super::CompileError;

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Str(s) => format!("{s:?}"),
            Self::Ident(name) => name.clone(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::And => "'&&'".into(),
            Self::Or => "'||'".into(),
            Self::Not => "'!'".into(),
            Self::In => "'in'".into(),
            Self::Eq => "'=='".into(),
            Self::Ne => "'!='".into(),
            Self::Lt => "'<'".into(),
            Self::Le => "'<='".into(),
            Self::Gt => "'>'".into(),
            Self::Ge => "'>='".into(),
            Self::Plus => "'+'".into(),
            Self::Minus => "'-'".into(),
            Self::Star => "'*'".into(),
            Self::Slash => "'/'".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::LBracket => "'['".into(),
            Self::RBracket => "']'".into(),
            Self::Comma => "','".into(),
            Self::Eof => "end of input".into(),
        }
    }
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, CompileError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let two = bytes.get(pos + 1).copied();
        let token = match (c, two) {
            (b'=', Some(b'=')) => {
                pos += 2;
                Token::Eq
            }
            (b'!', Some(b'=')) => {
                pos += 2;
                Token::Ne
            }
            (b'<', Some(b'=')) => {
                pos += 2;
                Token::Le
            }
            (b'>', Some(b'=')) => {
                pos += 2;
                Token::Ge
            }
            (b'&', Some(b'&')) => {
                pos += 2;
                Token::And
            }
            (b'|', Some(b'|')) => {
                pos += 2;
                Token::Or
            }
            (b'<', _) => single(&mut pos, Token::Lt),
            (b'>', _) => single(&mut pos, Token::Gt),
            (b'!', _) => single(&mut pos, Token::Not),
            (b'+', _) => single(&mut pos, Token::Plus),
            (b'-', _) => single(&mut pos, Token::Minus),
            (b'*', _) => single(&mut pos, Token::Star),
            (b'/', _) => single(&mut pos, Token::Slash),
            (b'(', _) => single(&mut pos, Token::LParen),
            (b')', _) => single(&mut pos, Token::RParen),
            (b'[', _) => single(&mut pos, Token::LBracket),
            (b']', _) => single(&mut pos, Token::RBracket),
            (b',', _) => single(&mut pos, Token::Comma),
            (b'"' | b'\'', _) => {
                let (text, end) = string(source, pos)?;
                pos = end;
                Token::Str(text)
            }
            (b'0'..=b'9', _) => {
                let (token, end) = number(source, pos)?;
                pos = end;
                token
            }
            (c, _) if c == b'_' || c.is_ascii_alphabetic() => {
                while pos < bytes.len() && (bytes[pos] == b'_' || bytes[pos].is_ascii_alphanumeric()) {
                    pos += 1;
                }
                keyword_or_ident(&source[start..pos])
            }
            _ => {
                let found = source[pos..].chars().next().unwrap_or('?');
                return Err(CompileError::new(pos, format!("unexpected character '{found}'")));
            }
        };
        tokens.push(Spanned { token, offset: start });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: source.len(),
    });
    Ok(tokens)
}

fn single(pos: &mut usize, token: Token) -> Token {
    *pos += 1;
    token
}

fn keyword_or_ident(word: &str) -> Token {
    match word {
        "true" => Token::True,
        "false" => Token::False,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        _ => Token::Ident(word.to_string()),
    }
}

fn number(source: &str, start: usize) -> Result<(Token, usize), CompileError> {
    let bytes = source.as_bytes();
    let mut pos = start;
    let mut is_float = false;
    while pos < bytes.len() {
        match bytes[pos] {
            b'0'..=b'9' | b'_' => pos += 1,
            b'.' if !is_float && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                is_float = true;
                pos += 1;
            }
            _ => break,
        }
    }

    let text: String = source[start..pos].chars().filter(|c| *c != '_').collect();
    let token = if is_float {
        text.parse()
            .map(Token::Float)
            .map_err(|_| CompileError::new(start, format!("invalid number '{text}'")))?
    } else {
        text.parse()
            .map(Token::Int)
            .map_err(|_| CompileError::new(start, format!("integer '{text}' out of range")))?
    };
    Ok((token, pos))
}

fn string(source: &str, start: usize) -> Result<(String, usize), CompileError> {
    let mut chars = source[start..].char_indices();
    let quote = chars.next().map_or('"', |(_, q)| q);
    let mut text = String::new();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((text, start + i + c.len_utf8())),
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, escaped @ ('\\' | '"' | '\''))) => text.push(escaped),
                Some((j, other)) => {
                    return Err(CompileError::new(start + j, format!("unknown escape '\\{other}'")));
                }
                None => break,
            },
            c => text.push(c),
        }
    }
    Err(CompileError::new(start, "unterminated string"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn operators_and_keywords() {
        assert_eq!(
            kinds("a >= 1 and not b || c != 'x'"),
            vec![
                Token::Ident("a".into()),
                Token::Ge,
                Token::Int(1),
                Token::And,
                Token::Not,
                Token::Ident("b".into()),
                Token::Or,
                Token::Ident("c".into()),
                Token::Ne,
                Token::Str("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("0.8 100_000 3"), vec![Token::Float(0.8), Token::Int(100_000), Token::Int(3), Token::Eof]);
        assert!(tokenize("99999999999999999999").is_err());
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(kinds(r#""say \"hi\"""#), vec![Token::Str("say \"hi\"".into()), Token::Eof]);
        assert_eq!(kinds("'Dhaka'"), vec![Token::Str("Dhaka".into()), Token::Eof]);
        let err = tokenize("\"open").unwrap_err();
        assert_eq!(err.position, 0);
    }

    #[test]
    fn offsets_point_at_the_token() {
        let tokens = tokenize("hour  >= 22").unwrap();
        assert_eq!(tokens[1].offset, 6);
        let err = tokenize("hour # 2").unwrap_err();
        assert_eq!(err.position, 5);
    }
}
