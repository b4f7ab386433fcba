//! Resumable LDAP message decoder.
//!
//! [`LdapDecoder`] accepts bytes in whatever pieces the transport delivers
//! them and yields complete [`LdapMessage`]s. Between calls it keeps the
//! unconsumed bytes and a stack of open constructed TLVs, each with the
//! number of value bytes still to come. A TLV header or a primitive value is
//! only consumed once it is complete, so splitting the input differently
//! never changes the outcome.
//!
//! After a failure the decoder skips the rest of the offending PDU when the
//! envelope length is known and carries on with the next one. If the
//! envelope itself is unreadable it stays failed until [`LdapDecoder::reset`].

use crate::config::CodecConfig;
use crate::error::DecoderError;
use crate::grammar::{self, Built, Node};
use crate::message::LdapMessage;
use crate::tlv::{read_header, Header, Read, TAG_SEQUENCE};
use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

/// Result of a successful `feed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    Message(LdapMessage),
    /// Everything buffered has been consumed; more bytes are needed.
    Suspended,
}

struct Frame {
    /// Value bytes of this TLV not yet consumed.
    remaining: usize,
    node: Node,
}

pub struct LdapDecoder {
    config: CodecConfig,
    buffer: BytesMut,
    stack: Vec<Frame>,
    /// Bytes of an abandoned PDU still to be dropped.
    skip: usize,
    /// An envelope header was consumed and its message not yet returned.
    pdu_open: bool,
    failed: Option<DecoderError>,
}

impl Default for LdapDecoder {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl LdapDecoder {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            buffer: BytesMut::new(),
            stack: Vec::new(),
            skip: 0,
            pdu_open: false,
            failed: None,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Append `data` and decode as far as possible. At most one message is
    /// returned per call; call again with an empty slice to drain the rest.
    pub fn feed(&mut self, data: &[u8]) -> Result<DecodeStatus, DecoderError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        self.buffer.extend_from_slice(data);
        match self.step() {
            Ok(status) => Ok(status),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Drop all buffered input and any failure.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stack.clear();
        self.skip = 0;
        self.pdu_open = false;
        self.failed = None;
    }

    /// No partial PDU is buffered.
    pub fn is_idle(&self) -> bool {
        self.failed.is_none() && self.stack.is_empty() && self.skip == 0 && self.buffer.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of open constructed TLVs.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn step(&mut self) -> Result<DecodeStatus, DecoderError> {
        loop {
            if self.skip > 0 {
                let n = self.skip.min(self.buffer.len());
                self.buffer.advance(n);
                self.skip -= n;
                if self.skip > 0 {
                    return Ok(DecodeStatus::Suspended);
                }
            }

            if self.stack.last().is_some_and(|frame| frame.remaining == 0) {
                if let Some(message) = self.close_frame()? {
                    debug!(
                        message_id = message.message_id,
                        op = message.protocol_op.name(),
                        controls = message.controls.len(),
                        "decoded LDAP message"
                    );
                    return Ok(DecodeStatus::Message(message));
                }
                continue;
            }

            // A child header must fit in what its parent has left.
            let window = match self.stack.last() {
                Some(top) if top.remaining < 2 => return Err(header_overrun(top)),
                Some(top) => top.remaining.min(self.buffer.len()),
                None => self.buffer.len(),
            };
            let header = match read_header(&self.buffer[..window])? {
                Read::Complete(header, _) => header,
                Read::Incomplete => {
                    if let Some(top) = self.stack.last().filter(|top| window == top.remaining) {
                        return Err(header_overrun(top));
                    }
                    if !self.buffer.is_empty() || !self.stack.is_empty() {
                        debug!(buffered = self.buffer.len(), depth = self.stack.len(), "suspended mid-PDU");
                    }
                    return Ok(DecodeStatus::Suspended);
                }
            };

            if self.stack.is_empty() {
                self.open_envelope(header)?;
                continue;
            }
            if !self.consume(header)? {
                return Ok(DecodeStatus::Suspended);
            }
        }
    }

    fn open_envelope(&mut self, header: Header) -> Result<(), DecoderError> {
        if header.tag.octet() != TAG_SEQUENCE {
            return Err(DecoderError::unexpected(header.tag.octet(), "LDAPMessage"));
        }
        if let Some(limit) = self.config.pdu_size_limit() {
            if header.total_len() > limit {
                return Err(DecoderError::PduTooLarge {
                    length: header.total_len(),
                    limit,
                });
            }
        }
        trace!(length = header.length, "open LDAPMessage");
        self.buffer.advance(header.header_len);
        self.pdu_open = true;
        self.stack.push(Frame {
            remaining: header.length as usize,
            node: grammar::envelope(),
        });
        Ok(())
    }

    /// Hand one child TLV to the innermost open node. Returns false when a
    /// primitive value is not fully buffered yet.
    fn consume(&mut self, header: Header) -> Result<bool, DecoderError> {
        let Some(top) = self.stack.last_mut() else {
            return Ok(true);
        };
        let total = header.total_len();
        if total > top.remaining {
            return Err(DecoderError::BadLength(format!(
                "TLV of {} bytes overruns {} ({} bytes left)",
                total,
                top.node.name(),
                top.remaining
            )));
        }

        if header.tag.constructed {
            let child = top.node.open(header.tag, &self.config)?;
            trace!(parent = top.node.name(), child = child.name(), length = header.length, "open");
            top.remaining -= total;
            self.buffer.advance(header.header_len);
            self.stack.push(Frame {
                remaining: header.length as usize,
                node: child,
            });
            return Ok(true);
        }

        if self.buffer.len() < total {
            return Ok(false);
        }
        let value = &self.buffer[header.header_len..total];
        trace!(node = top.node.name(), tag = header.tag.octet(), length = header.length, "primitive");
        top.node.primitive(header.tag, value, &self.config)?;
        top.remaining -= total;
        self.buffer.advance(total);
        Ok(true)
    }

    /// Finish the innermost node and pass its value up. Returns the message
    /// when the envelope itself closes.
    fn close_frame(&mut self) -> Result<Option<LdapMessage>, DecoderError> {
        let Some(frame) = self.stack.pop() else {
            return Ok(None);
        };
        trace!(node = frame.node.name(), "close");
        let built = frame.node.finish(&self.config)?;
        match self.stack.last_mut() {
            Some(parent) => {
                parent.node.accept(built, &self.config)?;
                Ok(None)
            }
            None => match built {
                Built::Message(message) => {
                    self.pdu_open = false;
                    Ok(Some(message))
                }
                other => Err(grammar::mismatch("decoder", &other)),
            },
        }
    }

    /// Log the failure and decide between skipping the PDU and staying failed.
    fn fail(&mut self, err: DecoderError) -> DecoderError {
        let preview_len = self.buffer.len().min(self.config.hex_preview_bytes);
        warn!(
            error = %err,
            kind = err.kind(),
            depth = self.stack.len(),
            "LDAP decode failed, next bytes: {}",
            hex::encode(&self.buffer[..preview_len])
        );

        let skip = if self.pdu_open {
            Some(self.stack.iter().map(|frame| frame.remaining).sum())
        } else if let DecoderError::PduTooLarge { length, .. } = err {
            Some(length)
        } else {
            None
        };
        self.stack.clear();
        self.pdu_open = false;

        match skip {
            Some(skip) => {
                debug!(skip, "skipping rest of failed PDU");
                self.skip = skip;
            }
            None => self.failed = Some(err.clone()),
        }
        err
    }
}

fn header_overrun(top: &Frame) -> DecoderError {
    DecoderError::BadLength(format!(
        "TLV header overruns {} ({} bytes left)",
        top.node.name(),
        top.remaining
    ))
}

/// Decode exactly one message from a complete buffer.
pub fn decode_message(data: &[u8]) -> Result<LdapMessage, DecoderError> {
    decode_message_with(data, CodecConfig::default())
}

pub fn decode_message_with(data: &[u8], config: CodecConfig) -> Result<LdapMessage, DecoderError> {
    let mut decoder = LdapDecoder::new(config);
    match decoder.feed(data)? {
        DecodeStatus::Message(message) if decoder.buffered() == 0 => Ok(message),
        DecodeStatus::Message(_) => Err(DecoderError::invalid(format!(
            "{} trailing bytes after LDAPMessage",
            decoder.buffered()
        ))),
        DecodeStatus::Suspended => Err(DecoderError::BadLength(format!(
            "LDAPMessage truncated after {} bytes",
            data.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, MatchingRuleAssertion, SubstringFilter};
    use crate::message::*;
    use proptest::prelude::*;

    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        match content.len() {
            n if n < 0x80 => out.push(n as u8),
            n if n < 0x100 => out.extend_from_slice(&[0x81, n as u8]),
            n => out.extend_from_slice(&[0x82, (n >> 8) as u8, n as u8]),
        }
        out.extend_from_slice(content);
        out
    }

    fn envelope(id: u8, parts: &[Vec<u8>]) -> Vec<u8> {
        let mut content = tlv(0x02, &[id]);
        for part in parts {
            content.extend_from_slice(part);
        }
        tlv(0x30, &content)
    }

    fn search(id: u8, base: &str, filter: Vec<u8>) -> Vec<u8> {
        let op = [
            tlv(0x04, base.as_bytes()),
            tlv(0x0A, &[0x00]),
            tlv(0x0A, &[0x03]),
            tlv(0x02, &[0x00]),
            tlv(0x02, &[0x00]),
            tlv(0x01, &[0x00]),
            filter,
            tlv(0x30, &[]),
        ]
        .concat();
        envelope(id, &[tlv(0x63, &op)])
    }

    fn equality(attr: &str, value: &str) -> Vec<u8> {
        tlv(0xA3, &[tlv(0x04, attr.as_bytes()), tlv(0x04, value.as_bytes())].concat())
    }

    fn filter_of(message: &LdapMessage) -> &Filter {
        match &message.protocol_op {
            ProtocolOp::SearchRequest(req) => &req.filter,
            other => panic!("expected search request, got {:?}", other),
        }
    }

    /// Feed `data` and pull out every result it yields.
    fn drain(decoder: &mut LdapDecoder, data: &[u8], out: &mut Vec<Result<LdapMessage, DecoderError>>) {
        let mut input = data;
        loop {
            match decoder.feed(input) {
                Ok(DecodeStatus::Suspended) => break,
                Ok(DecodeStatus::Message(message)) => out.push(Ok(message)),
                Err(err) => {
                    out.push(Err(err));
                    if decoder.is_failed() {
                        break;
                    }
                }
            }
            input = &[];
        }
    }

    fn decode_all(data: &[u8]) -> Vec<Result<LdapMessage, DecoderError>> {
        let mut decoder = LdapDecoder::default();
        let mut out = Vec::new();
        drain(&mut decoder, data, &mut out);
        out
    }

    #[test]
    fn test_present_filter_search() {
        let bytes = search(3, "ou=users,ou=system", tlv(0x87, b"objectClass"));
        let message = decode_message(&bytes).unwrap();
        assert_eq!(message.message_id, 3);
        match &message.protocol_op {
            ProtocolOp::SearchRequest(req) => {
                assert_eq!(req.base_object, "ou=users,ou=system");
                assert_eq!(req.scope, SearchScope::BaseObject);
                assert_eq!(req.deref_aliases, DerefAliases::Always);
                assert_eq!(req.size_limit, 0);
                assert!(!req.types_only);
                assert_eq!(req.filter, Filter::present("objectClass"));
                assert!(req.attributes.is_empty());
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let bytes = search(3, "ou=users,ou=system", tlv(0x87, b"objectClass"));
        let mut decoder = LdapDecoder::default();
        let mut results = Vec::new();
        for byte in &bytes {
            drain(&mut decoder, std::slice::from_ref(byte), &mut results);
        }
        assert_eq!(results, vec![decode_message(&bytes)]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_extensible_match_filter() {
        let filter = tlv(
            0xA9,
            &[
                tlv(0x81, b"cn"),
                tlv(0x82, b"1.2.840.48018.1.2.2"),
                tlv(0x83, b"aok"),
                tlv(0x84, &[0xFF]),
            ]
            .concat(),
        );
        assert_eq!(filter.len(), 0x23);
        let message = decode_message(&search(1, "", filter)).unwrap();
        assert_eq!(
            filter_of(&message),
            &Filter::ExtensibleMatch(MatchingRuleAssertion {
                matching_rule: Some("cn".to_string()),
                attr_type: Some("1.2.840.48018.1.2.2".to_string()),
                match_value: b"aok".to_vec(),
                dn_attributes: true,
            })
        );
    }

    #[test]
    fn test_extensible_match_out_of_order() {
        let filter = tlv(0xA9, &[tlv(0x83, b"aok"), tlv(0x81, b"cn")].concat());
        let err = decode_message(&search(1, "", filter)).unwrap_err();
        assert!(matches!(err, DecoderError::InvalidFilterOrder(_)), "{:?}", err);
    }

    #[test]
    fn test_malformed_dn_yields_response_and_decoder_continues() {
        let bad = search(7, "uid:akarasulu,dc=example,dc=com", tlv(0x87, b"objectClass"));
        let next = envelope(8, &[tlv(0x42, &[])]);
        let results = decode_all(&[bad, next].concat());
        assert_eq!(results.len(), 2);

        let err = results[0].clone().unwrap_err();
        let response = err.response().expect("semantic error carries a response");
        assert_eq!(response.message_id, 7);
        match &response.protocol_op {
            ProtocolOp::SearchResultDone(result) => assert_eq!(result.result_code, ResultCode::InvalidDnSyntax),
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(results[1], Ok(LdapMessage::new(8, ProtocolOp::UnbindRequest)));
    }

    #[test]
    fn test_dn_checks_can_be_disabled() {
        let bytes = search(1, "not a dn", tlv(0x87, b"cn"));
        assert!(decode_message(&bytes).is_err());
        let config = CodecConfig {
            validate_dns: false,
            ..CodecConfig::default()
        };
        assert!(decode_message_with(&bytes, config).is_ok());
    }

    #[test]
    fn test_substrings_filter() {
        let filter = tlv(
            0xA4,
            &[
                tlv(0x04, b"objectclass"),
                tlv(0x30, &[tlv(0x80, b"t"), tlv(0x81, b"t"), tlv(0x82, b"t")].concat()),
            ]
            .concat(),
        );
        let message = decode_message(&search(2, "", filter)).unwrap();
        assert_eq!(
            filter_of(&message),
            &Filter::Substrings(SubstringFilter {
                attr_type: "objectclass".to_string(),
                initial: Some(b"t".to_vec()),
                any: vec![b"t".to_vec()],
                r#final: Some(b"t".to_vec()),
            })
        );
        assert_eq!(filter_of(&message).to_string(), "(objectclass=t*t*t)");
    }

    #[test]
    fn test_substrings_final_before_initial() {
        let filter = tlv(
            0xA4,
            &[tlv(0x04, b"cn"), tlv(0x30, &[tlv(0x82, b"z"), tlv(0x80, b"a")].concat())].concat(),
        );
        let err = decode_message(&search(2, "", filter)).unwrap_err();
        assert!(matches!(err, DecoderError::InvalidFilterOrder(_)), "{:?}", err);
    }

    #[test]
    fn test_composite_filter_rules() {
        let not_two = tlv(0xA2, &[equality("cn", "a"), equality("cn", "b")].concat());
        assert!(matches!(
            decode_message(&search(1, "", not_two)),
            Err(DecoderError::InvalidFilterOrder(_))
        ));

        let empty_and = tlv(0xA0, &[]);
        assert!(matches!(
            decode_message(&search(1, "", empty_and)),
            Err(DecoderError::InvalidFilterOrder(_))
        ));

        let nested = tlv(0xA1, &[equality("cn", "a"), tlv(0xA2, &tlv(0x87, b"sn"))].concat());
        let message = decode_message(&search(1, "", nested)).unwrap();
        assert_eq!(filter_of(&message).to_string(), "(|(cn=a)(!(sn=*)))");
    }

    /// Decode `bad` followed by an Unbind, whole and one byte at a time.
    /// Both must report the same error and then the Unbind.
    fn assert_rejected_then_recovers(bad: &[u8]) -> DecoderError {
        let unbind = envelope(9, &[tlv(0x42, &[])]);
        let stream = [bad, &unbind[..]].concat();
        let whole = decode_all(&stream);

        let mut decoder = LdapDecoder::default();
        let mut chunked = Vec::new();
        for byte in &stream {
            drain(&mut decoder, std::slice::from_ref(byte), &mut chunked);
        }
        assert_eq!(chunked, whole);
        assert!(decoder.is_idle());
        assert_eq!(whole.len(), 2, "{:?}", whole);
        assert_eq!(whole[1], Ok(LdapMessage::new(9, ProtocolOp::UnbindRequest)));
        whole[0].clone().unwrap_err()
    }

    #[test]
    fn test_empty_composite_filters_rejected() {
        for tag in [0xA0, 0xA1, 0xA2] {
            let err = assert_rejected_then_recovers(&search(1, "", tlv(tag, &[])));
            assert!(matches!(err, DecoderError::InvalidFilterOrder(_)), "tag {:#x}: {:?}", tag, err);
        }
    }

    #[test]
    fn test_substring_ordering_rules() {
        let cases: [[u8; 2]; 4] = [
            [0x80, 0x80], // two initials
            [0x81, 0x80], // initial after any
            [0x82, 0x81], // any after final
            [0x82, 0x82], // two finals
        ];
        for [first, second] in cases {
            let filter = tlv(
                0xA4,
                &[tlv(0x04, b"cn"), tlv(0x30, &[tlv(first, b"a"), tlv(second, b"b")].concat())].concat(),
            );
            let err = assert_rejected_then_recovers(&search(2, "", filter));
            assert!(
                matches!(err, DecoderError::InvalidFilterOrder(_)),
                "{:#x} then {:#x}: {:?}",
                first,
                second,
                err
            );
        }
    }

    #[test]
    fn test_header_past_parent_end_fails_without_more_input() {
        // one byte left in the envelope after the messageID
        let mut decoder = LdapDecoder::default();
        let err = decoder.feed(&[0x30, 0x04, 0x02, 0x01, 0x01, 0x04]).unwrap_err();
        assert!(matches!(err, DecoderError::BadLength(_)), "{:?}", err);
        assert_eq!(decoder.feed(&[]), Ok(DecodeStatus::Suspended));
        assert!(decoder.is_idle());

        // two bytes left, but the header needs three
        let err = assert_rejected_then_recovers(&[0x30, 0x05, 0x02, 0x01, 0x01, 0x04, 0x81]);
        assert!(matches!(err, DecoderError::BadLength(_)), "{:?}", err);

        // the error comes before the dangling byte even arrives
        let mut decoder = LdapDecoder::default();
        let err = decoder.feed(&[0x30, 0x04, 0x02, 0x01, 0x01]).unwrap_err();
        assert!(matches!(err, DecoderError::BadLength(_)), "{:?}", err);
        assert_eq!(decoder.feed(&[0x04]), Ok(DecodeStatus::Suspended));
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_filter_depth_ceiling() {
        let mut filter = tlv(0x87, b"cn");
        for _ in 0..crate::filter::FILTER_DEPTH_CEILING {
            filter = tlv(0xA2, &filter);
        }
        let bytes = search(1, "", filter);
        for max_filter_depth in [0, usize::MAX] {
            let config = CodecConfig {
                max_filter_depth,
                max_pdu_size: 0,
                ..CodecConfig::default()
            };
            assert!(matches!(
                decode_message_with(&bytes, config),
                Err(DecoderError::InvalidValue(_))
            ));
        }
    }

    #[test]
    fn test_filter_depth_limit() {
        let mut filter = tlv(0x87, b"cn");
        for _ in 0..5 {
            filter = tlv(0xA2, &filter);
        }
        let bytes = search(1, "", filter);
        assert_eq!(filter_of(&decode_message(&bytes).unwrap()).depth(), 6);

        let config = CodecConfig {
            max_filter_depth: 5,
            ..CodecConfig::default()
        };
        assert!(matches!(
            decode_message_with(&bytes, config.clone()),
            Err(DecoderError::InvalidValue(_))
        ));
        let unlimited = CodecConfig {
            max_filter_depth: 0,
            ..config
        };
        assert!(decode_message_with(&bytes, unlimited).is_ok());
    }

    #[test]
    fn test_unknown_protocol_op() {
        let constructed = envelope(1, &[tlv(0x74, &[])]);
        assert_eq!(decode_message(&constructed), Err(DecoderError::UnknownProtocolOp(0x74)));
        let primitive = envelope(1, &[tlv(0x45, &[])]);
        assert_eq!(decode_message(&primitive), Err(DecoderError::UnknownProtocolOp(0x45)));
    }

    #[test]
    fn test_bad_envelope_length_poisons_until_reset() {
        let mut decoder = LdapDecoder::default();
        let err = decoder.feed(&[0x30, 0x85, 0x01, 0x02, 0x03, 0x04, 0x05]).unwrap_err();
        assert!(matches!(err, DecoderError::BadLength(_)));
        assert!(decoder.is_failed());

        let unbind = envelope(2, &[tlv(0x42, &[])]);
        assert_eq!(decoder.feed(&unbind), Err(err));

        decoder.reset();
        assert!(decoder.is_idle());
        assert_eq!(
            decoder.feed(&unbind),
            Ok(DecodeStatus::Message(LdapMessage::new(2, ProtocolOp::UnbindRequest)))
        );
    }

    #[test]
    fn test_indefinite_length_rejected() {
        assert!(matches!(decode_message(&[0x30, 0x80, 0x00, 0x00]), Err(DecoderError::BadLength(_))));
    }

    #[test]
    fn test_wide_message_id() {
        let bytes = tlv(0x30, &[tlv(0x02, &[0x01, 0x00, 0x00, 0x00, 0x00]), tlv(0x42, &[])].concat());
        assert!(matches!(decode_message(&bytes), Err(DecoderError::BadLength(_))));
    }

    #[test]
    fn test_negative_message_id() {
        let bytes = tlv(0x30, &[tlv(0x02, &[0xFF]), tlv(0x42, &[])].concat());
        assert!(matches!(decode_message(&bytes), Err(DecoderError::InvalidValue(_))));
    }

    #[test]
    fn test_child_overrunning_parent() {
        // messageID claims 3 bytes, envelope only has 2 left
        let bytes = [0x30, 0x04, 0x02, 0x03, 0x01, 0x02];
        assert!(matches!(decode_message(&bytes), Err(DecoderError::BadLength(_))));
    }

    #[test]
    fn test_pdu_too_large_is_skipped() {
        let config = CodecConfig {
            max_pdu_size: 32,
            ..CodecConfig::default()
        };
        let big = search(1, "ou=users,ou=system", tlv(0x87, b"objectClass"));
        let small = envelope(2, &[tlv(0x42, &[])]);
        let mut decoder = LdapDecoder::new(config);
        let mut results = Vec::new();
        // deliver the oversized PDU in two pieces so the skip spans feeds
        drain(&mut decoder, &big[..10], &mut results);
        drain(&mut decoder, &[&big[10..], &small[..]].concat(), &mut results);

        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(DecoderError::PduTooLarge { length, limit: 32 }) if length == big.len()
        ));
        assert_eq!(results[1], Ok(LdapMessage::new(2, ProtocolOp::UnbindRequest)));
        assert!(!decoder.is_failed());
    }

    #[test]
    fn test_empty_envelope_is_skipped() {
        let results = decode_all(&[&[0x30, 0x00][..], &envelope(4, &[tlv(0x42, &[])])].concat());
        assert!(matches!(results[0], Err(DecoderError::InvalidValue(_))));
        assert_eq!(results[1], Ok(LdapMessage::new(4, ProtocolOp::UnbindRequest)));
    }

    #[test]
    fn test_controls() {
        let control = tlv(
            0x30,
            &[tlv(0x04, b"1.2.840.113556.1.4.319"), tlv(0x01, &[0x00]), tlv(0x04, &[0x30, 0x00])].concat(),
        );
        let bytes = envelope(5, &[tlv(0x4A, b"cn=x"), tlv(0xA0, &control)]);
        let message = decode_message(&bytes).unwrap();
        assert_eq!(
            message.controls,
            vec![Control {
                ctype: "1.2.840.113556.1.4.319".to_string(),
                critical: false,
                value: Some(vec![0x30, 0x00]),
            }]
        );

        let empty = envelope(5, &[tlv(0x4A, b"cn=x"), tlv(0xA0, &[])]);
        assert!(matches!(decode_message(&empty), Err(DecoderError::InvalidValue(_))));

        let no_type = envelope(5, &[tlv(0x4A, b"cn=x"), tlv(0xA0, &tlv(0x30, &tlv(0x01, &[0xFF])))]);
        assert!(decode_message(&no_type).is_err());
    }

    #[test]
    fn test_bind_requests() {
        let simple = envelope(
            1,
            &[tlv(0x60, &[tlv(0x02, &[3]), tlv(0x04, b"cn=admin"), tlv(0x80, b"secret")].concat())],
        );
        assert_eq!(
            decode_message(&simple).unwrap().protocol_op,
            ProtocolOp::BindRequest(BindRequest {
                version: 3,
                name: "cn=admin".to_string(),
                authentication: BindAuthentication::Simple(b"secret".to_vec()),
            })
        );

        let sasl = envelope(
            1,
            &[tlv(0x60, &[tlv(0x02, &[3]), tlv(0x04, b""), tlv(0xA3, &tlv(0x04, b"EXTERNAL"))].concat())],
        );
        assert_eq!(
            decode_message(&sasl).unwrap().protocol_op,
            ProtocolOp::BindRequest(BindRequest {
                version: 3,
                name: String::new(),
                authentication: BindAuthentication::Sasl {
                    mechanism: "EXTERNAL".to_string(),
                    credentials: None,
                },
            })
        );

        let bad_version = envelope(1, &[tlv(0x60, &[tlv(0x02, &[0]), tlv(0x04, b""), tlv(0x80, b"")].concat())]);
        assert!(matches!(decode_message(&bad_version), Err(DecoderError::InvalidValue(_))));
    }

    #[test]
    fn test_primitive_ops() {
        assert_eq!(
            decode_message(&envelope(1, &[tlv(0x42, &[])])).unwrap().protocol_op,
            ProtocolOp::UnbindRequest
        );
        assert!(decode_message(&envelope(1, &[tlv(0x42, &[0x00])])).is_err());
        assert_eq!(
            decode_message(&envelope(2, &[tlv(0x50, &[0x01])])).unwrap().protocol_op,
            ProtocolOp::AbandonRequest(1)
        );
        assert_eq!(
            decode_message(&envelope(3, &[tlv(0x4A, b"cn=gone,dc=example")])).unwrap().protocol_op,
            ProtocolOp::DelRequest(DelRequest {
                entry: "cn=gone,dc=example".to_string(),
            })
        );
    }

    #[test]
    fn test_result_with_referral() {
        let op = tlv(
            0x65,
            &[
                tlv(0x0A, &[10]),
                tlv(0x04, b""),
                tlv(0x04, b"moved"),
                tlv(0xA3, &tlv(0x04, b"ldap://other.example.com/dc=example")),
            ]
            .concat(),
        );
        let message = decode_message(&envelope(9, &[op])).unwrap();
        match message.protocol_op {
            ProtocolOp::SearchResultDone(result) => {
                assert_eq!(result.result_code, ResultCode::Referral);
                assert_eq!(result.diagnostic_message, "moved");
                assert_eq!(result.referral, Some(vec!["ldap://other.example.com/dc=example".to_string()]));
            }
            other => panic!("unexpected op {:?}", other),
        }

        let bogus = tlv(
            0x65,
            &[tlv(0x0A, &[10]), tlv(0x04, b""), tlv(0x04, b""), tlv(0xA3, &tlv(0x04, b"http://x"))].concat(),
        );
        assert!(decode_message(&envelope(9, &[bogus])).is_err());
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = envelope(1, &[tlv(0x42, &[])]);
        bytes.push(0x30);
        assert!(matches!(decode_message(&bytes), Err(DecoderError::InvalidValue(_))));
    }

    #[test]
    fn test_truncated_message() {
        let bytes = envelope(1, &[tlv(0x42, &[])]);
        assert!(matches!(decode_message(&bytes[..4]), Err(DecoderError::BadLength(_))));
    }

    #[test]
    fn test_depth_tracks_open_tlvs() {
        let bytes = search(3, "", tlv(0x87, b"cn"));
        let mut decoder = LdapDecoder::default();
        // envelope header, messageID and the SearchRequest header
        assert_eq!(decoder.feed(&bytes[..7]), Ok(DecodeStatus::Suspended));
        assert_eq!(decoder.depth(), 2);
        assert!(!decoder.is_idle());
    }

    fn sample_pdus() -> Vec<Vec<u8>> {
        vec![
            search(1, "ou=users,ou=system", tlv(0x87, b"objectClass")),
            envelope(2, &[tlv(0x42, &[])]),
            search(3, "uid:bad,dc=x", tlv(0x87, b"cn")),
            search(4, "", tlv(0xA0, &[])),
            envelope(5, &[tlv(0x4A, b"cn=x"), tlv(0xA0, &tlv(0x30, &tlv(0x04, b"1.2.3")))]),
            vec![0x30, 0x00],
            envelope(6, &[tlv(0x74, &[tlv(0x04, b"x")].concat())]),
            envelope(7, &[tlv(0x50, &[0x05])]),
            vec![0x30, 0x05, 0x02, 0x01, 0x08, 0x04, 0x81],
        ]
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_results(
            picks in prop::collection::vec(0usize..9, 1..8),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let pdus = sample_pdus();
            let stream: Vec<u8> = picks.iter().flat_map(|&i| pdus[i].clone()).collect();
            let expected = decode_all(&stream);

            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(stream.len() + 1)).collect();
            points.push(0);
            points.push(stream.len());
            points.sort_unstable();
            points.dedup();

            let mut decoder = LdapDecoder::default();
            let mut actual = Vec::new();
            for window in points.windows(2) {
                drain(&mut decoder, &stream[window[0]..window[1]], &mut actual);
            }
            prop_assert_eq!(actual, expected);
            prop_assert!(decoder.is_idle());
        }
    }
}
