//! Tokenizer and object parser for PDF syntax.
//!
//! The same lexer serves both the file structure (indirect objects, xref
//! streams, trailers) and page content streams, which share the token
//! grammar of PDF 32000-1:2008 Section 7.2.

use crate::objects::{Dictionary, ObjId, PdfObject};

/// Arrays and dictionaries nested deeper than this are rejected.
pub const MAX_NESTING: usize = 64;

/// A single lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    Integer(i64),
    Real(f64),
    Name(String),
    String(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    /// Any other run of regular characters: `obj`, `R`, `true`, `Tj`, `'`, ...
    Keyword(&'a [u8]),
}

pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Cursor over a byte buffer producing [`Token`]s.
///
/// `Lexer` is `Copy`, so callers that need lookahead (indirect references are
/// three tokens long) take a copy, try, and keep whichever cursor won.
#[derive(Debug, Clone, Copy)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Lexer { data, pos: 0 }
    }

    /// Start lexing at byte offset `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Lexer {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unread remainder of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Skip whitespace and `%` comments up to the next token.
    pub fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while self.pos < self.data.len()
                    && self.data[self.pos] != b'\n'
                    && self.data[self.pos] != b'\r'
                {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Skip the single end-of-line marker that follows the `stream` keyword.
    pub fn skip_stream_eol(&mut self) {
        if self.data[self.pos..].starts_with(b"\r\n") {
            self.pos += 2;
        } else if matches!(self.data.get(self.pos), Some(b'\n') | Some(b'\r')) {
            self.pos += 1;
        }
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    /// Read the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token<'a>> {
        self.skip_whitespace_and_comments();
        let b = *self.data.get(self.pos)?;
        match b {
            b'/' => {
                self.pos += 1;
                Some(Token::Name(self.read_name()))
            }
            b'(' => {
                self.pos += 1;
                Some(Token::String(self.read_literal_string()))
            }
            b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                self.pos += 2;
                Some(Token::DictStart)
            }
            b'<' => {
                self.pos += 1;
                Some(Token::String(self.read_hex_string()))
            }
            b'>' if self.data.get(self.pos + 1) == Some(&b'>') => {
                self.pos += 2;
                Some(Token::DictEnd)
            }
            b'[' => {
                self.pos += 1;
                Some(Token::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Some(Token::ArrayEnd)
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => Some(self.read_number_or_keyword()),
            _ if is_regular(b) => {
                let start = self.pos;
                while self.pos < self.data.len() && is_regular(self.data[self.pos]) {
                    self.pos += 1;
                }
                Some(Token::Keyword(&self.data[start..self.pos]))
            }
            _ => {
                // Stray delimiter (`)`, `>`, `{`, `}`): surface it as a keyword.
                self.pos += 1;
                Some(Token::Keyword(&self.data[self.pos - 1..self.pos]))
            }
        }
    }

    fn read_number_or_keyword(&mut self) -> Token<'a> {
        let start = self.pos;
        while self.pos < self.data.len() && is_regular(self.data[self.pos]) {
            self.pos += 1;
        }
        let raw = &self.data[start..self.pos];
        let text = std::str::from_utf8(raw).unwrap_or("");
        if !text.contains('.') {
            if let Ok(n) = text.parse::<i64>() {
                return Token::Integer(n);
            }
        } else if let Ok(f) = text.parse::<f64>() {
            return Token::Real(f);
        }
        Token::Keyword(raw)
    }

    fn read_name(&mut self) -> String {
        let mut out = Vec::new();
        while self.pos < self.data.len() && is_regular(self.data[self.pos]) {
            let b = self.data[self.pos];
            if b == b'#' {
                if let Some(v) = self
                    .data
                    .get(self.pos + 1..self.pos + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    out.push(v);
                    self.pos += 3;
                    continue;
                }
            }
            out.push(b);
            self.pos += 1;
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Read a `(...)` literal string body; the opening paren is already consumed.
    fn read_literal_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            self.pos += 1;
            match b {
                b'\\' => {
                    let Some(&esc) = self.data.get(self.pos) else {
                        break;
                    };
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'0'..=b'7' => {
                            let mut value = u32::from(esc - b'0');
                            for _ in 0..2 {
                                match self.data.get(self.pos) {
                                    Some(&d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        }
                        // Backslash before an end-of-line continues the string.
                        b'\r' => {
                            if self.data.get(self.pos) == Some(&b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\r' => {
                    if self.data.get(self.pos) == Some(&b'\n') {
                        self.pos += 1;
                    }
                    out.push(b'\n');
                }
                _ => out.push(b),
            }
        }
        out
    }

    /// Read a `<...>` hex string body; the opening bracket is already consumed.
    fn read_hex_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut high: Option<u8> = None;
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            self.pos += 1;
            if b == b'>' {
                break;
            }
            let Some(nibble) = (b as char).to_digit(16) else {
                continue;
            };
            let nibble = nibble as u8;
            match high.take() {
                Some(h) => out.push(h << 4 | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            out.push(h << 4);
        }
        out
    }
}

/// Parse one complete object starting at the lexer's position.
///
/// `N G R` sequences become [`PdfObject::Reference`]. Keywords other than
/// `true`, `false` and `null` are not objects and yield `None`, leaving the
/// lexer positioned after the keyword. Arrays and dictionaries nested deeper
/// than [`MAX_NESTING`] also yield `None`.
pub fn parse_object(lexer: &mut Lexer<'_>) -> Option<PdfObject> {
    let token = lexer.next_token()?;
    parse_object_from(token, lexer, 0)
}

fn parse_object_from(token: Token<'_>, lexer: &mut Lexer<'_>, depth: usize) -> Option<PdfObject> {
    match token {
        Token::Integer(n) => {
            let mut ahead = *lexer;
            if let (Some(Token::Integer(gen)), Some(Token::Keyword(b"R"))) =
                (ahead.next_token(), ahead.next_token())
            {
                if let (Ok(num), Ok(gen)) = (u32::try_from(n), u16::try_from(gen)) {
                    *lexer = ahead;
                    return Some(PdfObject::Reference(ObjId(num, gen)));
                }
            }
            Some(PdfObject::Integer(n))
        }
        Token::Real(f) => Some(PdfObject::Real(f)),
        Token::Name(n) => Some(PdfObject::Name(n)),
        Token::String(s) => Some(PdfObject::String(s)),
        Token::ArrayStart if depth < MAX_NESTING => {
            let mut items = Vec::new();
            loop {
                match lexer.next_token()? {
                    Token::ArrayEnd => break,
                    tok => items.push(parse_object_from(tok, lexer, depth + 1)?),
                }
            }
            Some(PdfObject::Array(items))
        }
        Token::DictStart if depth < MAX_NESTING => {
            parse_dictionary_body(lexer, depth + 1).map(PdfObject::Dictionary)
        }
        Token::ArrayStart | Token::DictStart => None,
        Token::Keyword(b"true") => Some(PdfObject::Boolean(true)),
        Token::Keyword(b"false") => Some(PdfObject::Boolean(false)),
        Token::Keyword(b"null") => Some(PdfObject::Null),
        Token::ArrayEnd | Token::DictEnd | Token::Keyword(_) => None,
    }
}

/// Parse dictionary entries after `<<` up to and including `>>`.
fn parse_dictionary_body(lexer: &mut Lexer<'_>, depth: usize) -> Option<Dictionary> {
    let mut dict = Dictionary::new();
    loop {
        match lexer.next_token()? {
            Token::DictEnd => break,
            Token::Name(key) => {
                let token = lexer.next_token()?;
                let value = parse_object_from(token, lexer, depth)?;
                dict.insert(key, value);
            }
            _ => return None,
        }
    }
    Some(dict)
}

/// Parse an `N G obj` header, returning the object id.
pub fn parse_object_header(lexer: &mut Lexer<'_>) -> Option<ObjId> {
    let num = match lexer.next_token()? {
        Token::Integer(n) => u32::try_from(n).ok()?,
        _ => return None,
    };
    let gen = match lexer.next_token()? {
        Token::Integer(g) => u16::try_from(g).ok()?,
        _ => return None,
    };
    match lexer.next_token()? {
        Token::Keyword(b"obj") => Some(ObjId(num, gen)),
        _ => None,
    }
}
