//! Decoder error taxonomy.
//!
//! "Not enough bytes yet" is deliberately absent: the decoder reports it as
//! [`DecodeStatus::Suspended`](crate::decoder::DecodeStatus) instead.

use crate::message::LdapMessage;
use thiserror::Error;

/// Terminal failure for the PDU being decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    /// Malformed length field, or a TLV that overruns its enclosing value.
    #[error("bad BER length: {0}")]
    BadLength(String),

    /// A tag that the grammar does not allow at the current position.
    #[error("unexpected tag 0x{tag:02X} while decoding {context}")]
    UnexpectedTag { tag: u8, context: &'static str },

    /// The protocolOp CHOICE carried a tag that names no LDAP operation.
    #[error("unknown protocol operation tag 0x{0:02X}")]
    UnknownProtocolOp(u8),

    /// A primitive value that violates the basic syntax of its type.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Substring ordering, composite filter cardinality or extensibleMatch
    /// field combination violation.
    #[error("invalid filter: {0}")]
    InvalidFilterOrder(String),

    /// The envelope announced more bytes than the configured limit.
    #[error("PDU of {length} bytes exceeds the {limit} byte limit")]
    PduTooLarge { length: usize, limit: usize },

    /// Structurally valid PDU with a semantically invalid field. Carries a
    /// ready-to-send response.
    #[error(transparent)]
    Semantic(Box<ResponseCarryingError>),
}

impl DecoderError {
    /// Short stable name, used for metrics labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DecoderError::BadLength(_) => "bad_length",
            DecoderError::UnexpectedTag { .. } => "unexpected_tag",
            DecoderError::UnknownProtocolOp(_) => "unknown_protocol_op",
            DecoderError::InvalidValue(_) => "invalid_value",
            DecoderError::InvalidFilterOrder(_) => "invalid_filter_order",
            DecoderError::PduTooLarge { .. } => "pdu_too_large",
            DecoderError::Semantic(_) => "semantic",
        }
    }

    /// The pre-built negative response, if this error carries one.
    pub fn response(&self) -> Option<&LdapMessage> {
        match self {
            DecoderError::Semantic(e) => Some(&e.response),
            _ => None,
        }
    }

    pub(crate) fn unexpected(tag: u8, context: &'static str) -> Self {
        DecoderError::UnexpectedTag { tag, context }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DecoderError::InvalidValue(msg.into())
    }

    pub(crate) fn filter(msg: impl Into<String>) -> Self {
        DecoderError::InvalidFilterOrder(msg.into())
    }
}

/// A semantic decode failure together with the response the server should
/// send back for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{diagnostic}")]
pub struct ResponseCarryingError {
    pub message_id: i32,
    pub diagnostic: String,
    pub response: LdapMessage,
}

impl From<ResponseCarryingError> for DecoderError {
    fn from(err: ResponseCarryingError) -> Self {
        DecoderError::Semantic(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{LdapResult, ProtocolOp, ResultCode};

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            DecoderError::BadLength("x".into()),
            DecoderError::unexpected(0x30, "test"),
            DecoderError::UnknownProtocolOp(0x7F),
            DecoderError::invalid("x"),
            DecoderError::filter("x"),
            DecoderError::PduTooLarge { length: 10, limit: 5 },
        ];
        let mut kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_semantic_error_exposes_response() {
        let response = LdapMessage::new(
            4,
            ProtocolOp::SearchResultDone(LdapResult::new(ResultCode::InvalidDnSyntax, "bad dn")),
        );
        let err: DecoderError = ResponseCarryingError {
            message_id: 4,
            diagnostic: "bad dn".to_string(),
            response: response.clone(),
        }
        .into();
        assert_eq!(err.kind(), "semantic");
        assert_eq!(err.response(), Some(&response));
        assert_eq!(err.to_string(), "bad dn");
        assert!(DecoderError::invalid("x").response().is_none());
    }

    #[test]
    fn test_unexpected_tag_display() {
        let err = DecoderError::unexpected(0x87, "SearchRequest");
        assert_eq!(err.to_string(), "unexpected tag 0x87 while decoding SearchRequest");
    }
}
