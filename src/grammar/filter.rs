// Filter CHOICE grammar (RFC 4511 section 4.5.1).
//
// Filters nest through the decoder's stack rather than through recursion.
// Depth is capped by `CodecConfig::filter_depth_limit`.

use super::{mismatch, string, Built, GrammarNode, Node};
use crate::config::CodecConfig;
use crate::error::DecoderError;
use crate::filter::*;
use crate::tlv::{parse_boolean, Tag, TAG_OCTET_STRING, TAG_SEQUENCE};
use tracing::trace;

fn check_depth(depth: usize, config: &CodecConfig) -> Result<(), DecoderError> {
    let limit = config.filter_depth_limit();
    if depth > limit {
        return Err(DecoderError::invalid(format!("filter nesting exceeds {} levels", limit)));
    }
    Ok(())
}

/// Node for a constructed filter at nesting level `depth` (1 = top level).
pub(crate) fn open_filter(tag: Tag, depth: usize, config: &CodecConfig) -> Result<Node, DecoderError> {
    check_depth(depth, config)?;
    trace!(tag = tag.octet(), depth, "open filter");
    let node: Node = match tag.octet() {
        FILTER_AND | FILTER_OR | FILTER_NOT => CompositeFilterNode::new(tag.octet(), depth).into(),
        FILTER_EQUALITY | FILTER_GREATER_OR_EQUAL | FILTER_LESS_OR_EQUAL | FILTER_APPROX => {
            AvaNode::new(Some(tag.octet())).into()
        }
        FILTER_SUBSTRINGS => SubstringsFilterNode::default().into(),
        FILTER_EXTENSIBLE => ExtensibleFilterNode::default().into(),
        other => return Err(DecoderError::unexpected(other, "Filter")),
    };
    Ok(node)
}

/// The only primitive filter choice: `present [7] AttributeDescription`.
pub(crate) fn primitive_filter(tag: Tag, value: &[u8], depth: usize, config: &CodecConfig) -> Result<Filter, DecoderError> {
    check_depth(depth, config)?;
    match tag.octet() {
        FILTER_PRESENT => {
            if value.is_empty() {
                return Err(DecoderError::invalid("present filter with empty attribute"));
            }
            Ok(Filter::Present(string(value, "present filter")?))
        }
        other => Err(DecoderError::unexpected(other, "Filter")),
    }
}

/// and / or / not.
pub(crate) struct CompositeFilterNode {
    tag: u8,
    depth: usize,
    children: Vec<Filter>,
}

impl CompositeFilterNode {
    fn new(tag: u8, depth: usize) -> Self {
        Self {
            tag,
            depth,
            children: Vec::new(),
        }
    }

    fn check_not_arity(&self) -> Result<(), DecoderError> {
        if self.tag == FILTER_NOT && !self.children.is_empty() {
            return Err(DecoderError::filter("not filter holds more than one filter"));
        }
        Ok(())
    }
}

impl GrammarNode for CompositeFilterNode {
    fn name(&self) -> &'static str {
        match self.tag {
            FILTER_AND => "and filter",
            FILTER_OR => "or filter",
            _ => "not filter",
        }
    }

    fn open(&mut self, tag: Tag, config: &CodecConfig) -> Result<Node, DecoderError> {
        self.check_not_arity()?;
        open_filter(tag, self.depth + 1, config)
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], config: &CodecConfig) -> Result<(), DecoderError> {
        self.check_not_arity()?;
        let child = primitive_filter(tag, value, self.depth + 1, config)?;
        self.children.push(child);
        Ok(())
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Filter(filter) => {
                self.children.push(filter);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(mut self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let filter = match (self.tag, self.children.pop()) {
            (_, None) => return Err(DecoderError::filter(format!("empty {}", self.name()))),
            (FILTER_NOT, Some(child)) => Filter::Not(Box::new(child)),
            (FILTER_AND, Some(last)) => {
                self.children.push(last);
                Filter::And(self.children)
            }
            (_, Some(last)) => {
                self.children.push(last);
                Filter::Or(self.children)
            }
        };
        Ok(Built::Filter(filter))
    }
}

/// `AttributeValueAssertion ::= SEQUENCE { attributeDesc, assertionValue }`,
/// either as a filter choice or inside a CompareRequest.
pub(crate) struct AvaNode {
    filter_tag: Option<u8>,
    attribute_desc: Option<String>,
    assertion_value: Option<Vec<u8>>,
}

impl AvaNode {
    pub(crate) fn new(filter_tag: Option<u8>) -> Self {
        Self {
            filter_tag,
            attribute_desc: None,
            assertion_value: None,
        }
    }
}

impl GrammarNode for AvaNode {
    fn name(&self) -> &'static str {
        match self.filter_tag {
            Some(FILTER_EQUALITY) => "equalityMatch filter",
            Some(FILTER_GREATER_OR_EQUAL) => "greaterOrEqual filter",
            Some(FILTER_LESS_OR_EQUAL) => "lessOrEqual filter",
            Some(_) => "approxMatch filter",
            None => "AttributeValueAssertion",
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.attribute_desc.is_none() => {
                if value.is_empty() {
                    return Err(DecoderError::invalid("empty attributeDesc"));
                }
                self.attribute_desc = Some(string(value, "attributeDesc")?);
            }
            TAG_OCTET_STRING if self.assertion_value.is_none() => self.assertion_value = Some(value.to_vec()),
            other => return Err(DecoderError::unexpected(other, self.name())),
        }
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let name = self.name();
        let (Some(attribute_desc), Some(assertion_value)) = (self.attribute_desc, self.assertion_value) else {
            return Err(DecoderError::invalid(format!("{} is incomplete", name)));
        };
        let ava = AttributeValueAssertion {
            attribute_desc,
            assertion_value,
        };
        Ok(match self.filter_tag {
            None => Built::Ava(ava),
            Some(FILTER_EQUALITY) => Built::Filter(Filter::EqualityMatch(ava)),
            Some(FILTER_GREATER_OR_EQUAL) => Built::Filter(Filter::GreaterOrEqual(ava)),
            Some(FILTER_LESS_OR_EQUAL) => Built::Filter(Filter::LessOrEqual(ava)),
            Some(_) => Built::Filter(Filter::ApproxMatch(ava)),
        })
    }
}

/// `SubstringFilter ::= SEQUENCE { type AttributeDescription, substrings SEQUENCE ... }`
#[derive(Default)]
pub(crate) struct SubstringsFilterNode {
    attr_type: Option<String>,
    parts: Option<(Option<Vec<u8>>, Vec<Vec<u8>>, Option<Vec<u8>>)>,
}

impl GrammarNode for SubstringsFilterNode {
    fn name(&self) -> &'static str {
        "substrings filter"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE if self.attr_type.is_some() && self.parts.is_none() => Ok(SubstringSeqNode::default().into()),
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.attr_type.is_none() => {
                if value.is_empty() {
                    return Err(DecoderError::invalid("substrings filter with empty type"));
                }
                self.attr_type = Some(string(value, "substrings type")?);
                Ok(())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::SubstringParts { initial, any, r#final } => {
                self.parts = Some((initial, any, r#final));
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let (Some(attr_type), Some((initial, any, r#final))) = (self.attr_type, self.parts) else {
            return Err(DecoderError::invalid("substrings filter is incomplete"));
        };
        Ok(Built::Filter(Filter::Substrings(SubstringFilter {
            attr_type,
            initial,
            any,
            r#final,
        })))
    }
}

/// `SEQUENCE SIZE (1..MAX) OF substring CHOICE { initial [0], any [1], final [2] }`
///
/// `initial` may only come first, `final` only last, each at most once.
#[derive(Default)]
pub(crate) struct SubstringSeqNode {
    count: usize,
    initial: Option<Vec<u8>>,
    any: Vec<Vec<u8>>,
    r#final: Option<Vec<u8>>,
}

impl GrammarNode for SubstringSeqNode {
    fn name(&self) -> &'static str {
        "substrings"
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        let octet = tag.octet();
        if !matches!(octet, SUBSTRING_INITIAL | SUBSTRING_ANY | SUBSTRING_FINAL) {
            return Err(DecoderError::unexpected(octet, self.name()));
        }
        if self.r#final.is_some() {
            return Err(DecoderError::filter("substring after final"));
        }
        match octet {
            SUBSTRING_INITIAL if self.count > 0 => {
                return Err(DecoderError::filter("initial substring must come first"));
            }
            SUBSTRING_INITIAL => self.initial = Some(value.to_vec()),
            SUBSTRING_ANY => self.any.push(value.to_vec()),
            _ => self.r#final = Some(value.to_vec()),
        }
        self.count += 1;
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        if self.count == 0 {
            return Err(DecoderError::filter("substrings sequence is empty"));
        }
        Ok(Built::SubstringParts {
            initial: self.initial,
            any: self.any,
            r#final: self.r#final,
        })
    }
}

/// `MatchingRuleAssertion ::= SEQUENCE { matchingRule [1] OPTIONAL, type [2] OPTIONAL,
///                                       matchValue [3], dnAttributes [4] DEFAULT FALSE }`
#[derive(Default)]
pub(crate) struct ExtensibleFilterNode {
    last_tag: u8,
    matching_rule: Option<String>,
    attr_type: Option<String>,
    match_value: Option<Vec<u8>>,
    dn_attributes: bool,
}

impl GrammarNode for ExtensibleFilterNode {
    fn name(&self) -> &'static str {
        "extensibleMatch filter"
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        let octet = tag.octet();
        if !matches!(octet, MATCHING_RULE | MATCHING_TYPE | MATCHING_VALUE | MATCHING_DN_ATTRIBUTES) {
            return Err(DecoderError::unexpected(octet, self.name()));
        }
        if octet <= self.last_tag {
            return Err(DecoderError::filter(format!(
                "extensibleMatch field 0x{:02X} out of order",
                octet
            )));
        }
        match octet {
            MATCHING_RULE => self.matching_rule = Some(string(value, "matchingRule")?),
            MATCHING_TYPE => self.attr_type = Some(string(value, "extensibleMatch type")?),
            MATCHING_VALUE => self.match_value = Some(value.to_vec()),
            _ => {
                if self.match_value.is_none() {
                    return Err(DecoderError::filter("dnAttributes before matchValue"));
                }
                self.dn_attributes = parse_boolean(value)?;
            }
        }
        self.last_tag = octet;
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let match_value = self
            .match_value
            .ok_or_else(|| DecoderError::filter("extensibleMatch without matchValue"))?;
        Ok(Built::Filter(Filter::ExtensibleMatch(MatchingRuleAssertion {
            matching_rule: self.matching_rule,
            attr_type: self.attr_type,
            match_value,
            dn_attributes: self.dn_attributes,
        })))
    }
}
