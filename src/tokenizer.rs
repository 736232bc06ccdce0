//! Lexer for the FinTS wire format.
//!
//! Four reserved characters structure a message: `+` separates data element groups,
//! `:` separates data elements, `'` terminates a segment and `?` escapes the following
//! byte. Binary values are written as `@<len>@` followed by exactly `len` raw bytes that
//! are never escaped.
//!
//! Text is ISO-8859-1 on the wire; [`decode_text`] and [`encode_text`] convert between the
//! wire bytes and Rust strings.

use crate::error::WireError;

pub const ESCAPE: u8 = b'?';
pub const GROUP_SEPARATOR: u8 = b'+';
pub const ELEMENT_SEPARATOR: u8 = b':';
pub const SEGMENT_TERMINATOR: u8 = b'\'';
pub const BINARY_MARKER: u8 = b'@';

/// One classified token. Escapes are already resolved inside [`Token::Text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text(Vec<u8>),
    Binary(&'a [u8]),
    GroupSeparator,
    ElementSeparator,
    SegmentTerminator,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Previous {
    Delimiter,
    Text,
    Binary,
}

/// Iterator over the tokens of a byte buffer. Yields [`Token::End`] exactly once.
pub struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
    previous: Previous,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Tokenizer {
            data,
            pos: 0,
            previous: Previous::Delimiter,
            finished: false,
        }
    }

    /// Byte offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// If a binary marker `@<digits>@` starts at `at`, returns (declared length, header length).
    fn binary_marker_at(&self, at: usize) -> Option<(usize, usize)> {
        let rest = &self.data[at..];
        if rest.first() != Some(&BINARY_MARKER) {
            return None;
        }
        let digits = rest[1..].iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 || rest.get(1 + digits) != Some(&BINARY_MARKER) {
            return None;
        }
        let len = std::str::from_utf8(&rest[1..1 + digits]).ok()?.parse().ok()?;
        Some((len, digits + 2))
    }

    fn read_binary(&mut self, len: usize, header: usize) -> Result<Token<'a>, WireError> {
        if self.previous != Previous::Delimiter {
            return Err(WireError::MalformedToken {
                offset: self.pos,
                reason: "binary marker adjacent to preceding data",
            });
        }
        let start = self.pos + header;
        let end = start.checked_add(len).filter(|&e| e <= self.data.len()).ok_or_else(|| {
            WireError::MalformedStructure {
                offset: self.pos,
                reason: format!(
                    "binary length {} exceeds remaining {} bytes",
                    len,
                    self.data.len().saturating_sub(start)
                ),
            }
        })?;
        self.pos = end;
        self.previous = Previous::Binary;
        Ok(Token::Binary(&self.data[start..end]))
    }

    fn read_text(&mut self) -> Result<Token<'a>, WireError> {
        if self.previous == Previous::Binary {
            return Err(WireError::MalformedToken {
                offset: self.pos,
                reason: "text directly following binary data",
            });
        }
        let mut out = Vec::new();
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            match b {
                GROUP_SEPARATOR | ELEMENT_SEPARATOR | SEGMENT_TERMINATOR => break,
                ESCAPE => {
                    let escaped = *self.data.get(self.pos + 1).ok_or(WireError::MalformedToken {
                        offset: self.pos,
                        reason: "escape character at end of input",
                    })?;
                    out.push(escaped);
                    self.pos += 2;
                }
                BINARY_MARKER if self.binary_marker_at(self.pos).is_some() => break,
                _ => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        self.previous = Previous::Text;
        Ok(Token::Text(out))
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let Some(&b) = self.data.get(self.pos) else {
            self.finished = true;
            return Some(Ok(Token::End));
        };
        let delimiter = match b {
            GROUP_SEPARATOR => Some(Token::GroupSeparator),
            ELEMENT_SEPARATOR => Some(Token::ElementSeparator),
            SEGMENT_TERMINATOR => Some(Token::SegmentTerminator),
            _ => None,
        };
        let token = if let Some(token) = delimiter {
            self.pos += 1;
            self.previous = Previous::Delimiter;
            Ok(token)
        } else if let Some((len, header)) = self.binary_marker_at(self.pos) {
            self.read_binary(len, header)
        } else {
            self.read_text()
        };
        if token.is_err() {
            self.finished = true;
        }
        Some(token)
    }
}

/// Tokenize a whole buffer.
pub fn tokenize(data: &[u8]) -> Result<Vec<Token<'_>>, WireError> {
    Tokenizer::new(data).collect()
}

pub fn is_reserved(b: u8) -> bool {
    matches!(b, GROUP_SEPARATOR | ELEMENT_SEPARATOR | SEGMENT_TERMINATOR | ESCAPE)
}

/// Offset of the first `@<digits>@` run in unescaped text, which the lexer would read as a
/// binary marker.
pub fn find_binary_marker(text: &[u8]) -> Option<usize> {
    let lexer = Tokenizer::new(text);
    text.iter()
        .enumerate()
        .filter(|&(_, &b)| b == BINARY_MARKER)
        .map(|(i, _)| i)
        .find(|&i| lexer.binary_marker_at(i).is_some())
}

/// Escape the four reserved characters and nothing else.
pub fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &b in raw {
        if is_reserved(b) {
            out.push(ESCAPE);
        }
        out.push(b);
    }
    out
}

/// Inverse of [`escape`] for a single data element (no delimiters expected).
pub fn unescape(escaped: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut iter = escaped.iter().enumerate();
    while let Some((i, &b)) = iter.next() {
        if b == ESCAPE {
            let (_, &next) = iter.next().ok_or(WireError::MalformedToken {
                offset: i,
                reason: "escape character at end of input",
            })?;
            out.push(next);
        } else {
            out.push(b);
        }
    }
    Ok(out)
}

/// ISO-8859-1 bytes to string. Every byte maps to the code point of the same value.
pub fn decode_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// String to ISO-8859-1 bytes.
pub fn encode_text(text: &str) -> Result<Vec<u8>, WireError> {
    text.chars()
        .map(|ch| u8::try_from(u32::from(ch)).map_err(|_| WireError::Unencodable { ch }))
        .collect()
}
