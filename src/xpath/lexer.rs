//! XPath tokenizer

use crate::error::XPathError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Dot,
    DotDot,
    Comma,
    Pipe,
    Star,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    ColonColon,
    Literal(String),
    Number(f64),
    Name(String),
}

/// Token plus its byte offset in the expression
pub(crate) type Spanned = (Token, usize);

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, XPathError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let token = match c {
            b'/' => {
                if bytes.get(pos + 1) == Some(&b'/') {
                    pos += 2;
                    Token::DoubleSlash
                } else {
                    pos += 1;
                    Token::Slash
                }
            }
            b'[' => {
                pos += 1;
                Token::LBracket
            }
            b']' => {
                pos += 1;
                Token::RBracket
            }
            b'(' => {
                pos += 1;
                Token::LParen
            }
            b')' => {
                pos += 1;
                Token::RParen
            }
            b'@' => {
                pos += 1;
                Token::At
            }
            b',' => {
                pos += 1;
                Token::Comma
            }
            b'|' => {
                pos += 1;
                Token::Pipe
            }
            b'*' => {
                pos += 1;
                Token::Star
            }
            b'+' => {
                pos += 1;
                Token::Plus
            }
            b'-' => {
                pos += 1;
                Token::Minus
            }
            b'=' => {
                pos += 1;
                Token::Eq
            }
            b'!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    pos += 2;
                    Token::Neq
                } else {
                    return Err(XPathError::new("expected '=' after '!'", pos));
                }
            }
            b'<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    pos += 2;
                    Token::Le
                } else {
                    pos += 1;
                    Token::Lt
                }
            }
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    pos += 2;
                    Token::Ge
                } else {
                    pos += 1;
                    Token::Gt
                }
            }
            b':' => {
                if bytes.get(pos + 1) == Some(&b':') {
                    pos += 2;
                    Token::ColonColon
                } else {
                    return Err(XPathError::new("unexpected ':'", pos));
                }
            }
            b'"' | b'\'' => {
                let end = input[pos + 1..]
                    .find(c as char)
                    .ok_or_else(|| XPathError::new("unterminated string literal", pos))?;
                let literal = input[pos + 1..pos + 1 + end].to_string();
                pos += end + 2;
                Token::Literal(literal)
            }
            b'.' => {
                if bytes.get(pos + 1) == Some(&b'.') {
                    pos += 2;
                    Token::DotDot
                } else if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) {
                    let (number, next) = read_number(input, pos)?;
                    pos = next;
                    Token::Number(number)
                } else {
                    pos += 1;
                    Token::Dot
                }
            }
            b'0'..=b'9' => {
                let (number, next) = read_number(input, pos)?;
                pos = next;
                Token::Number(number)
            }
            _ if is_name_start(c) => {
                let mut end = pos + 1;
                while end < bytes.len() && is_name_char(bytes[end]) {
                    end += 1;
                }
                // `prefix:name` is kept as one name; `axis::` is not
                if bytes.get(end) == Some(&b':')
                    && bytes.get(end + 1) != Some(&b':')
                    && bytes.get(end + 1).is_some_and(|b| is_name_start(*b))
                {
                    end += 1;
                    while end < bytes.len() && is_name_char(bytes[end]) {
                        end += 1;
                    }
                }
                let name = input[pos..end].to_string();
                pos = end;
                Token::Name(name)
            }
            _ => {
                let ch = input[pos..].chars().next().unwrap_or('?');
                return Err(XPathError::new(format!("unexpected character '{ch}'"), pos));
            }
        };

        tokens.push((token, start));
    }

    Ok(tokens)
}

fn read_number(input: &str, start: usize) -> Result<(f64, usize), XPathError> {
    let bytes = input.as_bytes();
    let mut end = start;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot && bytes.get(end + 1) != Some(&b'.') => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    input[start..end]
        .parse::<f64>()
        .map(|n| (n, end))
        .map_err(|_| XPathError::new("invalid number", start))
}

fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

fn is_name_char(c: u8) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == b'-' || c == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_tokenize_path() {
        assert_eq!(
            kinds("//a[contains(@href, 'item?id=')]/@href"),
            vec![
                Token::DoubleSlash,
                Token::Name("a".into()),
                Token::LBracket,
                Token::Name("contains".into()),
                Token::LParen,
                Token::At,
                Token::Name("href".into()),
                Token::Comma,
                Token::Literal("item?id=".into()),
                Token::RParen,
                Token::RBracket,
                Token::Slash,
                Token::At,
                Token::Name("href".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_axis_and_numbers() {
        assert_eq!(
            kinds("following-sibling::td[.5 <= 2]"),
            vec![
                Token::Name("following-sibling".into()),
                Token::ColonColon,
                Token::Name("td".into()),
                Token::LBracket,
                Token::Number(0.5),
                Token::Le,
                Token::Number(2.0),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_unterminated_literal() {
        let err = tokenize("//a[@href='x]").unwrap_err();
        assert_eq!(err.position, 10);
    }
}
