//! Distinguished name syntax check (RFC 4514).
//!
//! Only tokenizes: attribute types are not looked up in any schema and
//! values are not normalized. The decoder uses it to reject LDAPDN fields
//! that cannot be a DN at all.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    #[error("missing '=' after attribute type at offset {0}")]
    MissingEquals(usize),

    #[error("empty attribute type at offset {0}")]
    EmptyAttributeType(usize),

    #[error("invalid attribute type {0:?}")]
    InvalidAttributeType(String),

    #[error("invalid escape sequence at offset {0}")]
    BadEscape(usize),

    #[error("invalid hex string value at offset {0}")]
    BadHexString(usize),

    #[error("character {ch:?} must be escaped (offset {position})")]
    UnescapedSpecial { ch: char, position: usize },

    #[error("expected exactly one RDN, found {0}")]
    NotSingleRdn(usize),
}

/// One `type=value` pair. The value is unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeTypeAndValue {
    pub attr_type: String,
    pub value: Vec<u8>,
}

/// Relative distinguished name: one or more `+`-joined pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn(pub Vec<AttributeTypeAndValue>);

/// Tokenize a DN string. The empty string is the root DSE and yields no RDNs.
pub fn parse(dn: &str) -> Result<Vec<Rdn>, DnError> {
    let mut tokenizer = Tokenizer {
        input: dn.as_bytes(),
        pos: 0,
    };
    tokenizer.skip_spaces();
    if tokenizer.at_end() {
        return Ok(Vec::new());
    }

    let mut rdns = Vec::new();
    let mut current = Vec::new();
    loop {
        current.push(tokenizer.attribute_type_and_value()?);
        tokenizer.skip_spaces();
        match tokenizer.next() {
            None => {
                rdns.push(Rdn(current));
                return Ok(rdns);
            }
            Some(b'+') => {}
            Some(b',' | b';') => rdns.push(Rdn(std::mem::take(&mut current))),
            Some(other) => {
                return Err(DnError::UnescapedSpecial {
                    ch: other as char,
                    position: tokenizer.pos - 1,
                })
            }
        }
    }
}

pub fn is_valid(dn: &str) -> bool {
    parse(dn).is_ok()
}

/// ModifyDNRequest.newrdn: a DN of exactly one RDN.
pub fn parse_rdn(rdn: &str) -> Result<Rdn, DnError> {
    let mut rdns = parse(rdn)?;
    match rdns.len() {
        1 => Ok(rdns.remove(0)),
        n => Err(DnError::NotSingleRdn(n)),
    }
}

struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Tokenizer<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn attribute_type_and_value(&mut self) -> Result<AttributeTypeAndValue, DnError> {
        self.skip_spaces();
        let attr_type = self.attribute_type()?;
        self.skip_spaces();
        if self.next() != Some(b'=') {
            return Err(DnError::MissingEquals(self.pos.saturating_sub(1)));
        }
        self.skip_spaces();
        let value = if self.peek() == Some(b'#') {
            self.hex_value()?
        } else {
            self.string_value()?
        };
        Ok(AttributeTypeAndValue { attr_type, value })
    }

    /// descr (`ALPHA *(ALPHA / DIGIT / "-")`) or numericoid, with an
    /// optional legacy `OID.` prefix on the latter.
    fn attribute_type(&mut self) -> Result<String, DnError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'-' || b == b'.') {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(DnError::EmptyAttributeType(start));
        }
        let raw = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        let name = raw
            .strip_prefix("OID.")
            .or_else(|| raw.strip_prefix("oid."))
            .unwrap_or(&raw);

        let is_descr = name.starts_with(|c: char| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        let is_oid = !name.is_empty()
            && name
                .split('.')
                .all(|arc| !arc.is_empty() && arc.chars().all(|c| c.is_ascii_digit()));
        if !(is_descr || is_oid) {
            return Err(DnError::InvalidAttributeType(raw));
        }
        Ok(name.to_string())
    }

    /// `#` followed by an even number of hex digits (the BER of the value).
    fn hex_value(&mut self) -> Result<Vec<u8>, DnError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        while let Some(hi) = self.peek().and_then(hex_digit) {
            let lo = self
                .input
                .get(self.pos + 1)
                .copied()
                .and_then(hex_digit)
                .ok_or(DnError::BadHexString(start))?;
            out.push(hi << 4 | lo);
            self.pos += 2;
        }
        if out.is_empty() {
            return Err(DnError::BadHexString(start));
        }
        Ok(out)
    }

    fn string_value(&mut self) -> Result<Vec<u8>, DnError> {
        let mut out = Vec::new();
        // Length of `out` up to the last byte that was not an unescaped space.
        let mut significant = 0;
        while let Some(b) = self.peek() {
            match b {
                b',' | b';' | b'+' => break,
                b'\\' => {
                    out.push(self.escape()?);
                    significant = out.len();
                    continue;
                }
                b'"' | b'<' | b'>' | 0 => {
                    return Err(DnError::UnescapedSpecial {
                        ch: b as char,
                        position: self.pos,
                    })
                }
                b' ' => out.push(b),
                _ => {
                    out.push(b);
                    significant = out.len();
                }
            }
            self.pos += 1;
        }
        out.truncate(significant);
        Ok(out)
    }

    /// `\` followed by a special character or two hex digits.
    fn escape(&mut self) -> Result<u8, DnError> {
        let start = self.pos;
        self.pos += 1;
        match self.peek() {
            Some(b' ' | b'"' | b'#' | b'+' | b',' | b';' | b'<' | b'=' | b'>' | b'\\') => {
                let b = self.input[self.pos];
                self.pos += 1;
                Ok(b)
            }
            Some(hi) => {
                let hi = hex_digit(hi).ok_or(DnError::BadEscape(start))?;
                let lo = self
                    .input
                    .get(self.pos + 1)
                    .copied()
                    .and_then(hex_digit)
                    .ok_or(DnError::BadEscape(start))?;
                self.pos += 2;
                Ok(hi << 4 | lo)
            }
            None => Err(DnError::BadEscape(start)),
        }
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
