//! Query tokenizer
//!
//! Produces the token stream for the small FOR/FILTER/SORT/LIMIT/RETURN
//! dialect. Unlike an interactive lexer this one is strict: any character it
//! cannot place is a syntax error carrying its byte offset.

use serde_json::{Number, Value};

use crate::error::{QueryError, Result};

/// Reserved words, matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    For,
    In,
    Filter,
    Sort,
    Limit,
    Return,
    Asc,
    Desc,
}

/// Comparison operators usable in FILTER
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident(String),
    /// `@name`
    BindParam(String),
    /// `@@name`
    CollectionParam(String),
    /// String, number, boolean or null literal
    Literal(Value),
    Op(CompareOp),
    Dot,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the whole input; the last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let offset = self.pos;
            let Some(&c) = self.bytes.get(self.pos) else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    offset,
                });
                return Ok(tokens);
            };
            let kind = match c {
                b'.' => {
                    self.pos += 1;
                    TokenKind::Dot
                }
                b',' => {
                    self.pos += 1;
                    TokenKind::Comma
                }
                b'=' | b'!' | b'<' | b'>' => TokenKind::Op(self.operator()?),
                b'@' => self.parameter()?,
                b'"' | b'\'' => TokenKind::Literal(Value::String(self.string(c)?)),
                b'-' | b'0'..=b'9' => TokenKind::Literal(self.number()?),
                c if c.is_ascii_alphabetic() || c == b'_' => self.word(),
                _ => return Err(self.error("unexpected character", offset)),
            };
            tokens.push(Token { kind, offset });
        }
    }

    fn skip_whitespace(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn operator(&mut self) -> Result<CompareOp> {
        let start = self.pos;
        let first = self.bytes[self.pos];
        let second = self.bytes.get(self.pos + 1).copied();
        let (op, len) = match (first, second) {
            (b'=', Some(b'=')) => (CompareOp::Eq, 2),
            (b'!', Some(b'=')) => (CompareOp::Ne, 2),
            (b'<', Some(b'=')) => (CompareOp::Le, 2),
            (b'>', Some(b'=')) => (CompareOp::Ge, 2),
            (b'<', _) => (CompareOp::Lt, 1),
            (b'>', _) => (CompareOp::Gt, 1),
            _ => return Err(self.error("unknown operator", start)),
        };
        self.pos += len;
        Ok(op)
    }

    fn parameter(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.pos += 1;
        let collection = self.bytes.get(self.pos) == Some(&b'@');
        if collection {
            self.pos += 1;
        }
        let name = self.identifier();
        if name.is_empty() {
            return Err(self.error("bind parameter name expected", start));
        }
        Ok(if collection {
            TokenKind::CollectionParam(name)
        } else {
            TokenKind::BindParam(name)
        })
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
        {
            self.pos += 1;
        }
        self.input[start..self.pos].to_string()
    }

    fn word(&mut self) -> TokenKind {
        let word = self.identifier();
        let keyword = match word.to_ascii_uppercase().as_str() {
            "FOR" => Some(Keyword::For),
            "IN" => Some(Keyword::In),
            "FILTER" => Some(Keyword::Filter),
            "SORT" => Some(Keyword::Sort),
            "LIMIT" => Some(Keyword::Limit),
            "RETURN" => Some(Keyword::Return),
            "ASC" => Some(Keyword::Asc),
            "DESC" => Some(Keyword::Desc),
            "TRUE" => return TokenKind::Literal(Value::Bool(true)),
            "FALSE" => return TokenKind::Literal(Value::Bool(false)),
            "NULL" => return TokenKind::Literal(Value::Null),
            _ => None,
        };
        match keyword {
            Some(k) => TokenKind::Keyword(k),
            None => TokenKind::Ident(word),
        }
    }

    fn string(&mut self, quote: u8) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.input[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c if c as u32 == quote as u32 => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string literal", start))
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.bytes[self.pos] == b'-' {
            self.pos += 1;
        }
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == b'.')
        {
            self.pos += 1;
        }
        let text = &self.input[start..self.pos];
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error("invalid number literal", start))
    }

    fn error(&self, message: &str, position: usize) -> crate::error::CursordError {
        QueryError::Syntax {
            message: message.to_string(),
            position,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_cursor_query() {
        let tokens = kinds("FOR doc IN @@coll LIMIT 4 RETURN doc");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Keyword(Keyword::For),
                TokenKind::Ident("doc".into()),
                TokenKind::Keyword(Keyword::In),
                TokenKind::CollectionParam("coll".into()),
                TokenKind::Keyword(Keyword::Limit),
                TokenKind::Literal(json!(4)),
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Ident("doc".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_and_literals() {
        let tokens = kinds(r#"d.x >= -1.5 d.y != 'a\'b' d.z == null"#);
        assert!(tokens.contains(&TokenKind::Op(CompareOp::Ge)));
        assert!(tokens.contains(&TokenKind::Literal(json!(-1.5))));
        assert!(tokens.contains(&TokenKind::Literal(json!("a'b"))));
        assert!(tokens.contains(&TokenKind::Literal(Value::Null)));
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(kinds("for")[0], TokenKind::Keyword(Keyword::For));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = Lexer::new("RETURN \"abc").tokenize().unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_unexpected_character_position() {
        match Lexer::new("FOR d IN c # x").tokenize() {
            Err(crate::error::CursordError::Query(QueryError::Syntax { position, .. })) => {
                assert_eq!(position, 11)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
