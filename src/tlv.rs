// TLV primitive reader: one tag, one length, one value window.
// Works on whatever bytes are available and reports Incomplete instead of failing
// when the buffer ends mid-header or mid-value.

use crate::error::DecoderError;

/// Universal tags used by LDAP.
pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_ENUMERATED: u8 = 0x0A;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

/// Lengths above this are rejected even though four length octets could express them.
pub const MAX_LENGTH: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    Context,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
    octet: u8,
}

impl Tag {
    /// Build a tag from its (single) identifier octet.
    pub fn from_octet(octet: u8) -> Self {
        let class = match octet >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::Context,
            _ => TagClass::Private,
        };
        Self {
            class,
            constructed: octet & 0x20 != 0,
            number: (octet & 0x1F) as u32,
            octet,
        }
    }

    /// First identifier octet. For high-tag-number form this ends in 0x1F,
    /// which no LDAP production uses, so grammar dispatch can match on it.
    pub fn octet(&self) -> u8 {
        self.octet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    pub length: u32,
    /// Bytes taken by the tag and length fields.
    pub header_len: usize,
}

impl Header {
    /// Header plus value.
    pub fn total_len(&self) -> usize {
        self.header_len + self.length as usize
    }
}

/// Outcome of a read attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Read<T> {
    /// The item and the number of bytes it took.
    Complete(T, usize),
    /// Not enough bytes yet; retry from the same position once more arrive.
    Incomplete,
}

pub fn read_tag(buf: &[u8]) -> Result<Read<Tag>, DecoderError> {
    let Some(&first) = buf.first() else {
        return Ok(Read::Incomplete);
    };
    let mut tag = Tag::from_octet(first);
    if first & 0x1F != 0x1F {
        return Ok(Read::Complete(tag, 1));
    }

    // High-tag-number form: base-128, at most four continuation octets.
    let mut number: u32 = 0;
    for i in 1..=4 {
        let Some(&b) = buf.get(i) else {
            return Ok(Read::Incomplete);
        };
        number = (number << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            tag.number = number;
            return Ok(Read::Complete(tag, i + 1));
        }
    }
    Err(DecoderError::invalid("tag number does not fit in four octets"))
}

/// Short form (one octet up to 0x7F) or long form (0x81..=0x84 followed by
/// that many big-endian octets).
pub fn read_length(buf: &[u8]) -> Result<Read<u32>, DecoderError> {
    let Some(&first) = buf.first() else {
        return Ok(Read::Incomplete);
    };
    if first & 0x80 == 0 {
        return Ok(Read::Complete(first as u32, 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 {
        return Err(DecoderError::BadLength("indefinite length form is not allowed".to_string()));
    }
    if count > 4 {
        return Err(DecoderError::BadLength(format!("{} length octets, at most 4 supported", count)));
    }
    if buf.len() < 1 + count {
        return Ok(Read::Incomplete);
    }
    let length = buf[1..=count]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32);
    if length > MAX_LENGTH {
        return Err(DecoderError::BadLength(format!("length {} overflows the representable range", length)));
    }
    Ok(Read::Complete(length, 1 + count))
}

pub fn read_header(buf: &[u8]) -> Result<Read<Header>, DecoderError> {
    let (tag, tag_len) = match read_tag(buf)? {
        Read::Complete(tag, n) => (tag, n),
        Read::Incomplete => return Ok(Read::Incomplete),
    };
    let (length, len_len) = match read_length(&buf[tag_len..])? {
        Read::Complete(length, n) => (length, n),
        Read::Incomplete => return Ok(Read::Incomplete),
    };
    let header_len = tag_len + len_len;
    Ok(Read::Complete(
        Header {
            tag,
            length,
            header_len,
        },
        header_len,
    ))
}

/// Header plus its value window, once the whole value is in `buf`.
pub fn read_tlv(buf: &[u8]) -> Result<Read<(Header, &[u8])>, DecoderError> {
    let header = match read_header(buf)? {
        Read::Complete(header, _) => header,
        Read::Incomplete => return Ok(Read::Incomplete),
    };
    let total = header.total_len();
    if buf.len() < total {
        return Ok(Read::Incomplete);
    }
    Ok(Read::Complete((header, &buf[header.header_len..total]), total))
}

/// Two's-complement INTEGER that must fit an i32.
pub fn parse_i32(value: &[u8]) -> Result<i32, DecoderError> {
    if value.is_empty() {
        return Err(DecoderError::invalid("INTEGER with zero-length value"));
    }
    if value.len() > 4 {
        return Err(DecoderError::BadLength(format!(
            "INTEGER of {} bytes does not fit 32 bits",
            value.len()
        )));
    }
    let negative = value[0] & 0x80 != 0;
    let init: i32 = if negative { -1 } else { 0 };
    Ok(value.iter().fold(init, |acc, &b| (acc << 8) | b as i32))
}

/// ENUMERATED is an INTEGER on the wire; a malformed one is a value error.
pub fn parse_enumerated(value: &[u8]) -> Result<i32, DecoderError> {
    match parse_i32(value) {
        Err(DecoderError::BadLength(_)) => Err(DecoderError::invalid(format!(
            "ENUMERATED of {} bytes",
            value.len()
        ))),
        other => other.map_err(|_| DecoderError::invalid("ENUMERATED with zero-length value")),
    }
}

/// BOOLEAN: exactly one octet, any non-zero value is TRUE.
pub fn parse_boolean(value: &[u8]) -> Result<bool, DecoderError> {
    match value {
        [b] => Ok(*b != 0),
        _ => Err(DecoderError::invalid(format!("BOOLEAN of {} bytes, expected 1", value.len()))),
    }
}

/// LDAPString / LDAPOID: UTF-8 octets.
pub fn parse_string(value: &[u8], what: &str) -> Result<String, DecoderError> {
    String::from_utf8(value.to_vec()).map_err(|_| DecoderError::invalid(format!("{} is not valid UTF-8", what)))
}

/// Cursor over a complete buffer (control values and other embedded BER).
pub struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read one TLV; running out of bytes is a length error here since the
    /// buffer is all there will ever be.
    pub fn read_tlv(&mut self) -> Result<(Tag, &'a [u8]), DecoderError> {
        let data: &'a [u8] = self.data;
        match read_tlv(&data[self.pos..])? {
            Read::Complete((header, value), n) => {
                self.pos += n;
                Ok((header.tag, value))
            }
            Read::Incomplete => Err(DecoderError::BadLength(format!(
                "BER truncated: {} bytes remaining",
                self.remaining()
            ))),
        }
    }

    pub fn expect(&mut self, tag: u8, context: &'static str) -> Result<&'a [u8], DecoderError> {
        let (got, value) = self.read_tlv()?;
        if got.octet() != tag {
            return Err(DecoderError::unexpected(got.octet(), context));
        }
        Ok(value)
    }

    pub fn read_sequence(&mut self, context: &'static str) -> Result<BerReader<'a>, DecoderError> {
        self.expect(TAG_SEQUENCE, context).map(BerReader::new)
    }

    pub fn read_integer(&mut self, context: &'static str) -> Result<i32, DecoderError> {
        parse_i32(self.expect(TAG_INTEGER, context)?)
    }

    pub fn read_enumerated(&mut self, context: &'static str) -> Result<i32, DecoderError> {
        parse_enumerated(self.expect(TAG_ENUMERATED, context)?)
    }

    pub fn read_boolean(&mut self, context: &'static str) -> Result<bool, DecoderError> {
        parse_boolean(self.expect(TAG_BOOLEAN, context)?)
    }

    pub fn read_octet_string(&mut self, context: &'static str) -> Result<Vec<u8>, DecoderError> {
        self.expect(TAG_OCTET_STRING, context).map(<[u8]>::to_vec)
    }

    /// Fails if anything is left over.
    pub fn finish(&self, context: &'static str) -> Result<(), DecoderError> {
        match self.peek_tag() {
            None => Ok(()),
            Some(tag) => Err(DecoderError::unexpected(tag, context)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete<T>(r: Read<T>) -> (T, usize) {
        match r {
            Read::Complete(v, n) => (v, n),
            Read::Incomplete => panic!("expected a complete read"),
        }
    }

    #[test]
    fn test_read_tag_classes() {
        let (tag, n) = complete(read_tag(&[0x30]).unwrap());
        assert_eq!(n, 1);
        assert_eq!(tag.class, TagClass::Universal);
        assert!(tag.constructed);
        assert_eq!(tag.number, 16);

        let (tag, _) = complete(read_tag(&[0x63]).unwrap());
        assert_eq!(tag.class, TagClass::Application);
        assert!(tag.constructed);
        assert_eq!(tag.number, 3);

        let (tag, _) = complete(read_tag(&[0x87]).unwrap());
        assert_eq!(tag.class, TagClass::Context);
        assert!(!tag.constructed);
        assert_eq!(tag.number, 7);

        let (tag, _) = complete(read_tag(&[0xC1]).unwrap());
        assert_eq!(tag.class, TagClass::Private);
    }

    #[test]
    fn test_read_tag_high_number_form() {
        assert_eq!(read_tag(&[0x5F]).unwrap(), Read::Incomplete);
        let (tag, n) = complete(read_tag(&[0x5F, 0x81, 0x00]).unwrap());
        assert_eq!(n, 3);
        assert_eq!(tag.number, 128);
        assert_eq!(tag.octet(), 0x5F);
        assert!(read_tag(&[0x1F, 0x80, 0x80, 0x80, 0x80, 0x01]).is_err());
    }

    #[test]
    fn test_read_length_short_form() {
        assert_eq!(read_length(&[]).unwrap(), Read::Incomplete);
        assert_eq!(complete(read_length(&[0x00]).unwrap()), (0, 1));
        assert_eq!(complete(read_length(&[0x7F]).unwrap()), (127, 1));
    }

    #[test]
    fn test_read_length_long_form() {
        assert_eq!(complete(read_length(&[0x81, 0x80]).unwrap()), (128, 2));
        assert_eq!(complete(read_length(&[0x82, 0x01, 0x00]).unwrap()), (256, 3));
        assert_eq!(complete(read_length(&[0x84, 0x00, 0x00, 0x00, 0x2D]).unwrap()), (45, 5));
        assert_eq!(read_length(&[0x84, 0x00, 0x00]).unwrap(), Read::Incomplete);
    }

    #[test]
    fn test_read_length_malformed() {
        assert!(matches!(read_length(&[0x80]), Err(DecoderError::BadLength(_))));
        assert!(matches!(read_length(&[0x85, 0, 0, 0, 0, 1]), Err(DecoderError::BadLength(_))));
        assert!(matches!(read_length(&[0xFF]), Err(DecoderError::BadLength(_))));
        assert!(matches!(
            read_length(&[0x84, 0x80, 0x00, 0x00, 0x00]),
            Err(DecoderError::BadLength(_))
        ));
    }

    #[test]
    fn test_read_tlv_waits_for_value() {
        let data = [0x04, 0x05, b'h', b'e', b'l'];
        assert_eq!(read_tlv(&data).unwrap(), Read::Incomplete);
        let data = [0x04, 0x05, b'h', b'e', b'l', b'l', b'o', 0xFF];
        let ((header, value), n) = complete(read_tlv(&data).unwrap());
        assert_eq!(header.tag.octet(), TAG_OCTET_STRING);
        assert_eq!(value, b"hello");
        assert_eq!(n, 7);
    }

    #[test]
    fn test_parse_i32() {
        assert_eq!(parse_i32(&[0x2A]).unwrap(), 42);
        assert_eq!(parse_i32(&[0xFF]).unwrap(), -1);
        assert_eq!(parse_i32(&[0x00, 0x80]).unwrap(), 128);
        assert_eq!(parse_i32(&[0xFF, 0x7F]).unwrap(), -129);
        assert_eq!(parse_i32(&[0x7F, 0xFF, 0xFF, 0xFF]).unwrap(), i32::MAX);
        assert_eq!(parse_i32(&[0x80, 0x00, 0x00, 0x00]).unwrap(), i32::MIN);
        assert!(matches!(parse_i32(&[]), Err(DecoderError::InvalidValue(_))));
        assert!(matches!(parse_i32(&[0, 0, 0, 0, 1]), Err(DecoderError::BadLength(_))));
    }

    #[test]
    fn test_parse_enumerated_errors_are_value_errors() {
        assert_eq!(parse_enumerated(&[0x02]).unwrap(), 2);
        assert!(matches!(parse_enumerated(&[]), Err(DecoderError::InvalidValue(_))));
        assert!(matches!(parse_enumerated(&[0, 0, 0, 0, 1]), Err(DecoderError::InvalidValue(_))));
    }

    #[test]
    fn test_parse_boolean() {
        assert!(parse_boolean(&[0xFF]).unwrap());
        assert!(parse_boolean(&[0x01]).unwrap());
        assert!(!parse_boolean(&[0x00]).unwrap());
        assert!(parse_boolean(&[]).is_err());
        assert!(parse_boolean(&[0x00, 0x00]).is_err());
    }

    #[test]
    fn test_ber_reader_sequence() {
        // SEQUENCE { INTEGER 42, OCTET STRING "ab", BOOLEAN TRUE }
        let data = [0x30, 0x0A, 0x02, 0x01, 0x2A, 0x04, 0x02, b'a', b'b', 0x01, 0x01, 0xFF];
        let mut reader = BerReader::new(&data);
        let mut seq = reader.read_sequence("test").unwrap();
        assert!(reader.is_empty());
        assert_eq!(seq.read_integer("test").unwrap(), 42);
        assert_eq!(seq.read_octet_string("test").unwrap(), b"ab");
        assert!(seq.read_boolean("test").unwrap());
        assert!(seq.finish("test").is_ok());
    }

    #[test]
    fn test_ber_reader_truncated() {
        let data = [0x04, 0x05, b'h'];
        let mut reader = BerReader::new(&data);
        assert!(matches!(reader.read_tlv(), Err(DecoderError::BadLength(_))));
    }

    #[test]
    fn test_ber_reader_wrong_tag() {
        let data = [0x04, 0x00];
        let mut reader = BerReader::new(&data);
        assert_eq!(
            reader.read_integer("ctx").unwrap_err(),
            DecoderError::unexpected(0x04, "ctx")
        );
    }
}
