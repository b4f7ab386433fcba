// Search filter model (RFC 4511 section 4.5.1) and its string form (RFC 4515).

use std::fmt;
use thiserror::Error;

// Filter CHOICE tags
pub const FILTER_AND: u8 = 0xA0;
pub const FILTER_OR: u8 = 0xA1;
pub const FILTER_NOT: u8 = 0xA2;
pub const FILTER_EQUALITY: u8 = 0xA3;
pub const FILTER_SUBSTRINGS: u8 = 0xA4;
pub const FILTER_GREATER_OR_EQUAL: u8 = 0xA5;
pub const FILTER_LESS_OR_EQUAL: u8 = 0xA6;
pub const FILTER_PRESENT: u8 = 0x87;
pub const FILTER_APPROX: u8 = 0xA8;
pub const FILTER_EXTENSIBLE: u8 = 0xA9;

// SubstringFilter choice tags
pub const SUBSTRING_INITIAL: u8 = 0x80;
pub const SUBSTRING_ANY: u8 = 0x81;
pub const SUBSTRING_FINAL: u8 = 0x82;

// MatchingRuleAssertion field tags
pub const MATCHING_RULE: u8 = 0x81;
pub const MATCHING_TYPE: u8 = 0x82;
pub const MATCHING_VALUE: u8 = 0x83;
pub const MATCHING_DN_ATTRIBUTES: u8 = 0x84;

/// Nesting limit applied when none is configured.
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 100;

/// Hard upper bound on filter nesting. Rendering, encoding and dropping a
/// `Filter` recurse once per level.
pub const FILTER_DEPTH_CEILING: usize = 512;

/// Effective nesting limit for a configured value, where 0 means "only the
/// ceiling".
pub fn effective_depth_limit(max_depth: usize) -> usize {
    match max_depth {
        0 => FILTER_DEPTH_CEILING,
        n => n.min(FILTER_DEPTH_CEILING),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    EqualityMatch(AttributeValueAssertion),
    Substrings(SubstringFilter),
    GreaterOrEqual(AttributeValueAssertion),
    LessOrEqual(AttributeValueAssertion),
    Present(String),
    ApproxMatch(AttributeValueAssertion),
    ExtensibleMatch(MatchingRuleAssertion),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValueAssertion {
    pub attribute_desc: String,
    pub assertion_value: Vec<u8>,
}

impl AttributeValueAssertion {
    pub fn new(attribute_desc: impl Into<String>, assertion_value: impl Into<Vec<u8>>) -> Self {
        Self {
            attribute_desc: attribute_desc.into(),
            assertion_value: assertion_value.into(),
        }
    }
}

/// Invariant: at least one of `initial`, `any`, `final` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringFilter {
    pub attr_type: String,
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub r#final: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingRuleAssertion {
    pub matching_rule: Option<String>,
    pub attr_type: Option<String>,
    pub match_value: Vec<u8>,
    pub dn_attributes: bool,
}

impl Filter {
    /// Wire tag of this filter choice.
    pub fn tag(&self) -> u8 {
        match self {
            Filter::And(_) => FILTER_AND,
            Filter::Or(_) => FILTER_OR,
            Filter::Not(_) => FILTER_NOT,
            Filter::EqualityMatch(_) => FILTER_EQUALITY,
            Filter::Substrings(_) => FILTER_SUBSTRINGS,
            Filter::GreaterOrEqual(_) => FILTER_GREATER_OR_EQUAL,
            Filter::LessOrEqual(_) => FILTER_LESS_OR_EQUAL,
            Filter::Present(_) => FILTER_PRESENT,
            Filter::ApproxMatch(_) => FILTER_APPROX,
            Filter::ExtensibleMatch(_) => FILTER_EXTENSIBLE,
        }
    }

    /// Nesting depth; a leaf counts as 1.
    pub fn depth(&self) -> usize {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                1 + children.iter().map(Filter::depth).max().unwrap_or(0)
            }
            Filter::Not(child) => 1 + child.depth(),
            _ => 1,
        }
    }

    pub fn equality(attr: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Filter::EqualityMatch(AttributeValueAssertion::new(attr, value))
    }

    pub fn present(attr: impl Into<String>) -> Self {
        Filter::Present(attr.into())
    }

    /// Parse an RFC 4515 string with the default nesting limit.
    pub fn parse(input: &str) -> Result<Filter, FilterParseError> {
        Self::parse_with_depth(input, DEFAULT_MAX_FILTER_DEPTH)
    }

    /// Parse with at most `max_depth` nesting levels. 0 applies only
    /// [`FILTER_DEPTH_CEILING`], as in `CodecConfig::max_filter_depth`.
    pub fn parse_with_depth(input: &str, max_depth: usize) -> Result<Filter, FilterParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FilterParseError::Empty);
        }
        let mut parser = Parser {
            input: trimmed.as_bytes(),
            pos: 0,
            max_depth: effective_depth_limit(max_depth),
        };
        let filter = if trimmed.starts_with('(') {
            parser.filter(1)?
        } else {
            // Bare item such as `cn=foo`, as accepted by most tools.
            parser.item(trimmed.len())?
        };
        if parser.pos != parser.input.len() {
            return Err(parser.error("trailing characters after filter"));
        }
        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) => write_list(f, '&', children),
            Filter::Or(children) => write_list(f, '|', children),
            Filter::Not(child) => write!(f, "(!{})", child),
            Filter::EqualityMatch(ava) => write_ava(f, ava, "="),
            Filter::GreaterOrEqual(ava) => write_ava(f, ava, ">="),
            Filter::LessOrEqual(ava) => write_ava(f, ava, "<="),
            Filter::ApproxMatch(ava) => write_ava(f, ava, "~="),
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::Substrings(sub) => {
                write!(f, "({}=", sub.attr_type)?;
                if let Some(initial) = &sub.initial {
                    write_escaped(f, initial)?;
                }
                f.write_str("*")?;
                for any in &sub.any {
                    write_escaped(f, any)?;
                    f.write_str("*")?;
                }
                if let Some(last) = &sub.r#final {
                    write_escaped(f, last)?;
                }
                f.write_str(")")
            }
            Filter::ExtensibleMatch(mra) => {
                f.write_str("(")?;
                if let Some(attr) = &mra.attr_type {
                    f.write_str(attr)?;
                }
                if mra.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &mra.matching_rule {
                    write!(f, ":{}", rule)?;
                }
                f.write_str(":=")?;
                write_escaped(f, &mra.match_value)?;
                f.write_str(")")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, op: char, children: &[Filter]) -> fmt::Result {
    write!(f, "({}", op)?;
    for child in children {
        write!(f, "{}", child)?;
    }
    f.write_str(")")
}

fn write_ava(f: &mut fmt::Formatter<'_>, ava: &AttributeValueAssertion, op: &str) -> fmt::Result {
    write!(f, "({}{}", ava.attribute_desc, op)?;
    write_escaped(f, &ava.assertion_value)?;
    f.write_str(")")
}

/// Escape an assertion value as `\xx`. UTF-8 text passes through except
/// for the filter metacharacters and control bytes.
fn write_escaped(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    match std::str::from_utf8(value) {
        Ok(text) => {
            for c in text.chars() {
                match c {
                    '*' | '(' | ')' | '\\' | '\0' => write!(f, "\\{:02x}", c as u32)?,
                    c if c.is_control() => {
                        let mut buf = [0u8; 4];
                        for b in c.encode_utf8(&mut buf).bytes() {
                            write!(f, "\\{:02x}", b)?;
                        }
                    }
                    c => write!(f, "{}", c)?,
                }
            }
            Ok(())
        }
        Err(_) => {
            for &b in value {
                if b.is_ascii_graphic() && !matches!(b, b'*' | b'(' | b')' | b'\\') || b == b' ' {
                    write!(f, "{}", b as char)?;
                } else {
                    write!(f, "\\{:02x}", b)?;
                }
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("empty filter string")]
    Empty,

    #[error("filter syntax error at offset {position}: {reason}")]
    Syntax { position: usize, reason: String },

    #[error("filter nesting exceeds {0} levels")]
    TooDeep(usize),
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> FilterParseError {
        FilterParseError::Syntax {
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, b: u8) -> Result<(), FilterParseError> {
        if self.peek() != Some(b) {
            return Err(self.error(format!("expected '{}'", b as char)));
        }
        self.pos += 1;
        Ok(())
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// `"(" filtercomp ")"`
    fn filter(&mut self, depth: usize) -> Result<Filter, FilterParseError> {
        if depth > self.max_depth {
            return Err(FilterParseError::TooDeep(self.max_depth));
        }
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list(depth)?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list(depth)?)
            }
            Some(b'!') => {
                self.pos += 1;
                self.skip_spaces();
                let child = self.filter(depth + 1)?;
                self.skip_spaces();
                Filter::Not(Box::new(child))
            }
            _ => {
                let end = self.closing_paren()?;
                self.item(end)?
            }
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self, depth: usize) -> Result<Vec<Filter>, FilterParseError> {
        let mut children = Vec::new();
        self.skip_spaces();
        while self.peek() == Some(b'(') {
            children.push(self.filter(depth + 1)?);
            self.skip_spaces();
        }
        if children.is_empty() {
            return Err(self.error("'&' and '|' need at least one filter"));
        }
        Ok(children)
    }

    /// Offset of the `)` closing the current item. Items never nest.
    fn closing_paren(&self) -> Result<usize, FilterParseError> {
        self.input[self.pos..]
            .iter()
            .position(|&b| b == b')')
            .map(|offset| self.pos + offset)
            .ok_or_else(|| self.error("unterminated filter item"))
    }

    /// simple / present / substring / extensible, ending at `end`.
    fn item(&mut self, end: usize) -> Result<Filter, FilterParseError> {
        let start = self.pos;
        while self.pos < end && !matches!(self.input[self.pos], b'=' | b'~' | b'<' | b'>' | b':') {
            self.pos += 1;
        }
        let attr = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("attribute description is not UTF-8"))?
            .to_string();

        match self.peek() {
            Some(b':') if self.pos < end => self.extensible(attr, end),
            Some(op) if self.pos < end => {
                check_attribute(&attr).map_err(|reason| self.error(reason))?;
                self.pos += 1;
                if op != b'=' {
                    self.expect(b'=')?;
                }
                let raw = &self.input[self.pos..end];
                let filter = match op {
                    b'=' => self.equality_or_substrings(attr, raw)?,
                    b'~' => Filter::ApproxMatch(AttributeValueAssertion::new(attr, self.unescape(raw)?)),
                    b'>' => Filter::GreaterOrEqual(AttributeValueAssertion::new(attr, self.unescape(raw)?)),
                    _ => Filter::LessOrEqual(AttributeValueAssertion::new(attr, self.unescape(raw)?)),
                };
                self.pos = end;
                Ok(filter)
            }
            _ => Err(self.error("missing filter operator")),
        }
    }

    fn equality_or_substrings(&self, attr: String, raw: &[u8]) -> Result<Filter, FilterParseError> {
        if raw == b"*" {
            return Ok(Filter::Present(attr));
        }
        if !raw.contains(&b'*') {
            return Ok(Filter::EqualityMatch(AttributeValueAssertion::new(attr, self.unescape(raw)?)));
        }

        let pieces: Vec<&[u8]> = raw.split(|&b| b == b'*').collect();
        let last = pieces.len() - 1;
        let mut sub = SubstringFilter {
            attr_type: attr,
            initial: None,
            any: Vec::new(),
            r#final: None,
        };
        for (i, piece) in pieces.iter().enumerate() {
            if piece.is_empty() {
                continue;
            }
            let value = self.unescape(piece)?;
            if i == 0 {
                sub.initial = Some(value);
            } else if i == last {
                sub.r#final = Some(value);
            } else {
                sub.any.push(value);
            }
        }
        if sub.initial.is_none() && sub.any.is_empty() && sub.r#final.is_none() {
            return Err(self.error("substring filter without any substring"));
        }
        Ok(Filter::Substrings(sub))
    }

    /// `attr [":dn"] [":" rule] ":=" value`, attr may be empty.
    fn extensible(&mut self, attr: String, end: usize) -> Result<Filter, FilterParseError> {
        let attr_type = if attr.is_empty() {
            None
        } else {
            check_attribute(&attr).map_err(|reason| self.error(reason))?;
            Some(attr)
        };
        let mut dn_attributes = false;
        let mut matching_rule = None;
        loop {
            self.expect(b':')?;
            if self.peek() == Some(b'=') {
                self.pos += 1;
                break;
            }
            let start = self.pos;
            while self.pos < end && !matches!(self.input[self.pos], b':' | b'=') {
                self.pos += 1;
            }
            let token = std::str::from_utf8(&self.input[start..self.pos])
                .map_err(|_| self.error("matching rule is not UTF-8"))?;
            if token.is_empty() {
                return Err(self.error("empty extensible match component"));
            }
            if token.eq_ignore_ascii_case("dn") && !dn_attributes && matching_rule.is_none() {
                dn_attributes = true;
            } else if matching_rule.is_none() {
                check_attribute(token).map_err(|reason| self.error(reason))?;
                matching_rule = Some(token.to_string());
            } else {
                return Err(self.error("more than one matching rule"));
            }
        }
        let match_value = self.unescape(&self.input[self.pos..end])?;
        self.pos = end;
        Ok(Filter::ExtensibleMatch(MatchingRuleAssertion {
            matching_rule,
            attr_type,
            match_value,
            dn_attributes,
        }))
    }

    fn unescape(&self, raw: &[u8]) -> Result<Vec<u8>, FilterParseError> {
        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            match raw[i] {
                b'\\' => {
                    let mut byte = [0u8; 1];
                    raw.get(i + 1..i + 3)
                        .and_then(|h| hex::decode_to_slice(h, &mut byte).ok())
                        .ok_or_else(|| self.error("'\\' must be followed by two hex digits"))?;
                    out.push(byte[0]);
                    i += 3;
                }
                b'(' | b')' | b'*' => return Err(self.error("unescaped metacharacter in value")),
                b => {
                    out.push(b);
                    i += 1;
                }
            }
        }
        Ok(out)
    }
}

/// AttributeDescription: descriptor or numeric OID plus `;options`.
fn check_attribute(attr: &str) -> Result<(), String> {
    if attr.is_empty() {
        return Err("empty attribute description".to_string());
    }
    match attr
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ';' | '_')))
    {
        Some(c) => Err(format!("invalid character {:?} in attribute description", c)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substrings(initial: Option<&str>, any: &[&str], last: Option<&str>) -> Filter {
        Filter::Substrings(SubstringFilter {
            attr_type: "cn".to_string(),
            initial: initial.map(|s| s.as_bytes().to_vec()),
            any: any.iter().map(|s| s.as_bytes().to_vec()).collect(),
            r#final: last.map(|s| s.as_bytes().to_vec()),
        })
    }

    #[test]
    fn test_display_simple_items() {
        assert_eq!(Filter::present("objectClass").to_string(), "(objectClass=*)");
        assert_eq!(Filter::equality("cn", "admin").to_string(), "(cn=admin)");
        assert_eq!(
            Filter::GreaterOrEqual(AttributeValueAssertion::new("age", "21")).to_string(),
            "(age>=21)"
        );
        assert_eq!(
            Filter::ApproxMatch(AttributeValueAssertion::new("sn", "smyth")).to_string(),
            "(sn~=smyth)"
        );
    }

    #[test]
    fn test_display_escapes_metacharacters() {
        let filter = Filter::equality("cn", b"a*b(c)\\d\0".to_vec());
        assert_eq!(filter.to_string(), "(cn=a\\2ab\\28c\\29\\5cd\\00)");
        let binary = Filter::equality("objectGUID", vec![0x04, 0xFF, b'a']);
        assert_eq!(binary.to_string(), "(objectGUID=\\04\\ffa)");
        assert_eq!(Filter::equality("cn", "Lučić").to_string(), "(cn=Lučić)");
    }

    #[test]
    fn test_display_composites() {
        let filter = Filter::And(vec![
            Filter::equality("objectClass", "person"),
            Filter::Not(Box::new(Filter::present("mail"))),
            Filter::Or(vec![substrings(Some("t"), &["t"], Some("t"))]),
        ]);
        assert_eq!(
            filter.to_string(),
            "(&(objectClass=person)(!(mail=*))(|(cn=t*t*t)))"
        );
        assert_eq!(filter.depth(), 3);
    }

    #[test]
    fn test_display_extensible() {
        let mra = MatchingRuleAssertion {
            matching_rule: Some("2.5.13.5".to_string()),
            attr_type: Some("cn".to_string()),
            match_value: b"Fred".to_vec(),
            dn_attributes: true,
        };
        assert_eq!(Filter::ExtensibleMatch(mra).to_string(), "(cn:dn:2.5.13.5:=Fred)");
    }

    #[test]
    fn test_parse_simple_items() {
        assert_eq!(Filter::parse("(objectClass=*)").unwrap(), Filter::present("objectClass"));
        assert_eq!(Filter::parse("(cn=admin)").unwrap(), Filter::equality("cn", "admin"));
        assert_eq!(Filter::parse("cn=admin").unwrap(), Filter::equality("cn", "admin"));
        assert_eq!(
            Filter::parse("(uidNumber<=1000)").unwrap(),
            Filter::LessOrEqual(AttributeValueAssertion::new("uidNumber", "1000"))
        );
    }

    #[test]
    fn test_parse_substrings() {
        assert_eq!(Filter::parse("(cn=t*t*t)").unwrap(), substrings(Some("t"), &["t"], Some("t")));
        assert_eq!(Filter::parse("(cn=ab*)").unwrap(), substrings(Some("ab"), &[], None));
        assert_eq!(Filter::parse("(cn=*ab)").unwrap(), substrings(None, &[], Some("ab")));
        assert_eq!(Filter::parse("(cn=*a*b*)").unwrap(), substrings(None, &["a", "b"], None));
        assert_eq!(Filter::parse("(cn=a**b)").unwrap(), substrings(Some("a"), &[], Some("b")));
        assert!(Filter::parse("(cn=**)").is_err());
    }

    #[test]
    fn test_parse_escapes() {
        assert_eq!(
            Filter::parse("(cn=a\\2ab\\28\\29)").unwrap(),
            Filter::equality("cn", "a*b()")
        );
        assert!(Filter::parse("(cn=a\\2)").is_err());
        assert!(Filter::parse("(cn=a\\zz)").is_err());
        assert!(Filter::parse("(cn=\\+a)").is_err());
        assert!(Filter::parse("(cn=\\-1)").is_err());
    }

    #[test]
    fn test_parse_extensible() {
        let parsed = Filter::parse("(cn:dn:2.5.13.5:=Fred)").unwrap();
        assert_eq!(
            parsed,
            Filter::ExtensibleMatch(MatchingRuleAssertion {
                matching_rule: Some("2.5.13.5".to_string()),
                attr_type: Some("cn".to_string()),
                match_value: b"Fred".to_vec(),
                dn_attributes: true,
            })
        );
        let parsed = Filter::parse("(:caseExactMatch:=x)").unwrap();
        assert!(matches!(parsed, Filter::ExtensibleMatch(ref m)
            if m.attr_type.is_none() && m.matching_rule.as_deref() == Some("caseExactMatch")));
        assert!(Filter::parse("(cn:a:b:=x)").is_err());
    }

    #[test]
    fn test_parse_composites() {
        let parsed = Filter::parse("(&(objectClass=person) (|(cn=a)(cn=b))(!(mail=*)))").unwrap();
        assert_eq!(
            parsed,
            Filter::And(vec![
                Filter::equality("objectClass", "person"),
                Filter::Or(vec![Filter::equality("cn", "a"), Filter::equality("cn", "b")]),
                Filter::Not(Box::new(Filter::present("mail"))),
            ])
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(Filter::parse("  ").unwrap_err(), FilterParseError::Empty);
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(!(a=b)(c=d))").is_err());
        assert!(Filter::parse("(cn=a").is_err());
        assert!(Filter::parse("(cn=a))").is_err());
        assert!(Filter::parse("(=a)").is_err());
        assert!(Filter::parse("(c n=a)").is_err());
    }

    #[test]
    fn test_parse_depth_limit() {
        let deep = format!("{}(cn=a){}", "(!".repeat(5), ")".repeat(5));
        assert!(Filter::parse_with_depth(&deep, 6).is_ok());
        assert_eq!(
            Filter::parse_with_depth(&deep, 5).unwrap_err(),
            FilterParseError::TooDeep(5)
        );
    }

    #[test]
    fn test_parse_depth_zero_means_ceiling() {
        let deep = format!("{}(cn=a){}", "(!".repeat(50), ")".repeat(50));
        assert_eq!(Filter::parse_with_depth(&deep, 0).unwrap().depth(), 51);

        let n = FILTER_DEPTH_CEILING;
        let too_deep = format!("{}(cn=a){}", "(!".repeat(n), ")".repeat(n));
        assert_eq!(
            Filter::parse_with_depth(&too_deep, 0).unwrap_err(),
            FilterParseError::TooDeep(FILTER_DEPTH_CEILING)
        );
        assert_eq!(
            Filter::parse_with_depth(&too_deep, usize::MAX).unwrap_err(),
            FilterParseError::TooDeep(FILTER_DEPTH_CEILING)
        );
    }

    #[test]
    fn test_display_parse_round_trip() {
        let inputs = [
            "(&(objectClass=person)(|(sn=smith)(cn=j*n*s)))",
            "(!(cn=\\2a))",
            "(cn:dn:=x)",
            "(member:1.2.840.113556.1.4.1941:=cn=admins\\2cdc=example)",
        ];
        for input in inputs {
            let filter = Filter::parse(input).unwrap();
            assert_eq!(Filter::parse(&filter.to_string()).unwrap(), filter);
        }
    }
}
