//! UTF-8 tokenizer for `.xkb` source text, spec §4.2/§6.

use crate::error::{Error, Location, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    /// A `<FOUR>`-style key name, without the angle brackets.
    KeyName(String),
    Number(i64),
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Semi,
    Comma,
    Equals,
    Plus,
    Pipe,
    Caret,
    Bang,
    Dot,
    Minus,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
    pub column: u32,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn loc(&self) -> Location {
        Location {
            file: None,
            line: self.line,
            column: self.column,
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned> {
        self.skip_trivia();
        let line = self.line;
        let column = self.column;
        let token = match self.peek() {
            None => Token::Eof,
            Some(b'{') => {
                self.bump();
                Token::LBrace
            }
            Some(b'}') => {
                self.bump();
                Token::RBrace
            }
            Some(b'[') => {
                self.bump();
                Token::LBracket
            }
            Some(b']') => {
                self.bump();
                Token::RBracket
            }
            Some(b'(') => {
                self.bump();
                Token::LParen
            }
            Some(b')') => {
                self.bump();
                Token::RParen
            }
            Some(b';') => {
                self.bump();
                Token::Semi
            }
            Some(b',') => {
                self.bump();
                Token::Comma
            }
            Some(b'=') => {
                self.bump();
                Token::Equals
            }
            Some(b'+') => {
                self.bump();
                Token::Plus
            }
            Some(b'|') => {
                self.bump();
                Token::Pipe
            }
            Some(b'^') => {
                self.bump();
                Token::Caret
            }
            Some(b'!') => {
                self.bump();
                Token::Bang
            }
            Some(b'.') => {
                self.bump();
                Token::Dot
            }
            Some(b'-') => {
                self.bump();
                Token::Minus
            }
            Some(b'<') => self.lex_keyname()?,
            Some(b'"') => self.lex_string()?,
            Some(c) if c.is_ascii_digit() => self.lex_number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.lex_ident(),
            Some(c) => {
                return Err(Error::syntax(
                    self.loc(),
                    format!("unexpected byte {:#04x} ({:?})", c, c as char),
                ))
            }
        };
        Ok(Spanned { token, line, column })
    }

    fn lex_keyname(&mut self) -> Result<Token> {
        self.bump(); // '<'
        let start = self.pos;
        while !matches!(self.peek(), None | Some(b'>')) {
            self.bump();
        }
        let name = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .to_owned();
        if self.bump() != Some(b'>') {
            return Err(Error::syntax(self.loc(), "unterminated key name"));
        }
        Ok(Token::KeyName(name))
    }

    fn lex_string(&mut self) -> Result<Token> {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(Error::syntax(self.loc(), "unterminated string literal")),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => s.push('\n'),
                    Some(b't') => s.push('\t'),
                    Some(b'\\') => s.push('\\'),
                    Some(b'"') => s.push('"'),
                    Some(c) => s.push(c as char),
                    None => return Err(Error::syntax(self.loc(), "unterminated escape")),
                },
                Some(c) => s.push(c as char),
            }
        }
        Ok(Token::Str(s))
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            let hex_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            let text = std::str::from_utf8(&self.src[hex_start..self.pos]).unwrap_or("0");
            let value = i64::from_str_radix(text, 16).unwrap_or(0);
            return Token::Number(value);
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("0");
        Token::Number(text.parse().unwrap_or(0))
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .to_owned();
        Token::Ident(text)
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.token == Token::Eof;
            out.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn tokenizes_keycode_statement() {
        assert_eq!(
            toks("<AD01> = 30;"),
            vec![
                Token::KeyName("AD01".into()),
                Token::Equals,
                Token::Number(30),
                Token::Semi,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_hex_and_comments() {
        let toks = toks("// comment\nvirtual_modifiers X = 0x2000; /* block */");
        assert_eq!(
            toks,
            vec![
                Token::Ident("virtual_modifiers".into()),
                Token::Ident("X".into()),
                Token::Equals,
                Token::Number(0x2000),
                Token::Semi,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_string_with_escapes() {
        assert_eq!(
            toks(r#""hello\nworld""#),
            vec![Token::Str("hello\nworld".into()), Token::Eof]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = Lexer::new("\"oops").tokenize().unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }
}
