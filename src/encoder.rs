// Two-phase BER encoder.
//
// Encoding walks the object model twice through the same `BerEncode` impl:
// `LengthPass` records the payload length of every constructed node in
// pre-order, then `WritePass` replays the walk and writes each header from
// the recorded lengths. Nothing is patched after the fact, and
// `compute_length` is exactly the number of bytes `encode` writes.

use crate::filter::*;
use crate::message::*;
use crate::tlv::{TAG_BOOLEAN, TAG_ENUMERATED, TAG_INTEGER, TAG_OCTET_STRING, TAG_SEQUENCE, TAG_SET};
use bytes::{BufMut, BytesMut};

/// Receives the TLV walk of a value.
pub trait BerSink {
    fn primitive(&mut self, tag: u8, value: &[u8]);

    fn constructed<F: FnOnce(&mut Self)>(&mut self, tag: u8, body: F);

    /// Minimal two's-complement INTEGER (or ENUMERATED).
    fn integer(&mut self, tag: u8, value: i64) {
        let (bytes, start) = integer_bytes(value);
        self.primitive(tag, &bytes[start..]);
    }

    /// TRUE is always written as 0xFF.
    fn boolean(&mut self, tag: u8, value: bool) {
        self.primitive(tag, &[if value { 0xFF } else { 0x00 }]);
    }

    fn string(&mut self, tag: u8, value: &str) {
        self.primitive(tag, value.as_bytes());
    }
}

/// A value that knows its own BER layout.
pub trait BerEncode {
    fn encode_ber<S: BerSink>(&self, sink: &mut S);
}

/// Big-endian bytes of `value` and the index of the first significant one.
fn integer_bytes(value: i64) -> ([u8; 8], usize) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        let redundant = (b == 0x00 && next & 0x80 == 0) || (b == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    (bytes, start)
}

/// Bytes taken by the length field for a payload of `len` bytes.
pub fn length_octets(len: usize) -> usize {
    if len < 0x80 {
        1
    } else {
        1 + (usize::BITS as usize / 8 - len.leading_zeros() as usize / 8)
    }
}

fn write_length(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        out.put_u8(len as u8);
        return;
    }
    let count = length_octets(len) - 1;
    out.put_u8(0x80 | count as u8);
    for i in (0..count).rev() {
        out.put_u8((len >> (i * 8)) as u8);
    }
}

/// First pass: payload lengths of constructed nodes, in pre-order.
#[derive(Debug, Default)]
struct LengthPass {
    slots: Vec<usize>,
    total: usize,
}

impl BerSink for LengthPass {
    fn primitive(&mut self, _tag: u8, value: &[u8]) {
        self.total += 1 + length_octets(value.len()) + value.len();
    }

    fn constructed<F: FnOnce(&mut Self)>(&mut self, _tag: u8, body: F) {
        let slot = self.slots.len();
        self.slots.push(0);
        let before = self.total;
        body(self);
        let payload = self.total - before;
        self.slots[slot] = payload;
        self.total += 1 + length_octets(payload);
    }
}

/// Second pass: headers from the recorded lengths, then payload.
struct WritePass<'a> {
    slots: &'a [usize],
    next: usize,
    out: &'a mut BytesMut,
}

impl BerSink for WritePass<'_> {
    fn primitive(&mut self, tag: u8, value: &[u8]) {
        self.out.put_u8(tag);
        write_length(self.out, value.len());
        self.out.put_slice(value);
    }

    fn constructed<F: FnOnce(&mut Self)>(&mut self, tag: u8, body: F) {
        let payload = self.slots.get(self.next).copied().unwrap_or_default();
        self.next += 1;
        self.out.put_u8(tag);
        write_length(self.out, payload);
        body(self);
    }
}

/// Memoized lengths of one value, ready to be written.
#[derive(Debug)]
pub struct LengthPlan {
    slots: Vec<usize>,
    total: usize,
}

impl LengthPlan {
    pub fn new<T: BerEncode + ?Sized>(value: &T) -> Self {
        let mut pass = LengthPass::default();
        value.encode_ber(&mut pass);
        Self {
            slots: pass.slots,
            total: pass.total,
        }
    }

    /// Encoded size in bytes.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Write `value`, which must be the value this plan was computed for.
    pub fn write<T: BerEncode + ?Sized>(&self, value: &T, out: &mut BytesMut) {
        out.reserve(self.total);
        let mut pass = WritePass {
            slots: &self.slots,
            next: 0,
            out,
        };
        value.encode_ber(&mut pass);
    }
}

pub fn compute_length(message: &LdapMessage) -> usize {
    LengthPlan::new(message).total()
}

pub fn encode(message: &LdapMessage) -> Vec<u8> {
    to_vec(message)
}

pub fn encode_into(message: &LdapMessage, out: &mut BytesMut) {
    LengthPlan::new(message).write(message, out);
}

pub fn encode_filter(filter: &Filter) -> Vec<u8> {
    to_vec(filter)
}

/// Encode any value into a fresh buffer.
pub fn to_vec<T: BerEncode + ?Sized>(value: &T) -> Vec<u8> {
    let plan = LengthPlan::new(value);
    let mut out = BytesMut::with_capacity(plan.total());
    plan.write(value, &mut out);
    out.to_vec()
}

impl BerEncode for LdapMessage {
    fn encode_ber<S: BerSink>(&self, s: &mut S) {
        s.constructed(TAG_SEQUENCE, |s| {
            s.integer(TAG_INTEGER, self.message_id as i64);
            self.protocol_op.encode_ber(s);
            if !self.controls.is_empty() {
                s.constructed(LDAP_CONTEXT_CONTROLS, |s| {
                    for control in &self.controls {
                        control.encode_ber(s);
                    }
                });
            }
        });
    }
}

impl BerEncode for Control {
    fn encode_ber<S: BerSink>(&self, s: &mut S) {
        s.constructed(TAG_SEQUENCE, |s| {
            s.string(TAG_OCTET_STRING, &self.ctype);
            if self.critical {
                s.boolean(TAG_BOOLEAN, true);
            }
            if let Some(value) = &self.value {
                s.primitive(TAG_OCTET_STRING, value);
            }
        });
    }
}

fn encode_result<S: BerSink>(s: &mut S, result: &LdapResult) {
    s.integer(TAG_ENUMERATED, result.result_code.code() as i64);
    s.string(TAG_OCTET_STRING, &result.matched_dn);
    s.string(TAG_OCTET_STRING, &result.diagnostic_message);
    if let Some(referral) = &result.referral {
        s.constructed(0xA3, |s| {
            for uri in referral {
                s.string(TAG_OCTET_STRING, uri);
            }
        });
    }
}

fn encode_attribute<S: BerSink>(s: &mut S, attribute: &Attribute) {
    s.constructed(TAG_SEQUENCE, |s| {
        s.string(TAG_OCTET_STRING, &attribute.attr_type);
        s.constructed(TAG_SET, |s| {
            for value in &attribute.attr_values {
                s.primitive(TAG_OCTET_STRING, value);
            }
        });
    });
}

fn encode_attributes<S: BerSink>(s: &mut S, attributes: &[Attribute]) {
    s.constructed(TAG_SEQUENCE, |s| {
        for attribute in attributes {
            encode_attribute(s, attribute);
        }
    });
}

impl BerEncode for ProtocolOp {
    fn encode_ber<S: BerSink>(&self, s: &mut S) {
        let tag = self.tag();
        match self {
            ProtocolOp::BindRequest(req) => s.constructed(tag, |s| {
                s.integer(TAG_INTEGER, req.version as i64);
                s.string(TAG_OCTET_STRING, &req.name);
                match &req.authentication {
                    BindAuthentication::Simple(password) => s.primitive(0x80, password),
                    BindAuthentication::Sasl { mechanism, credentials } => s.constructed(0xA3, |s| {
                        s.string(TAG_OCTET_STRING, mechanism);
                        if let Some(credentials) = credentials {
                            s.primitive(TAG_OCTET_STRING, credentials);
                        }
                    }),
                }
            }),
            ProtocolOp::BindResponse(resp) => s.constructed(tag, |s| {
                encode_result(s, &resp.result);
                if let Some(creds) = &resp.server_sasl_creds {
                    s.primitive(0x87, creds);
                }
            }),
            ProtocolOp::UnbindRequest => s.primitive(tag, &[]),
            ProtocolOp::SearchRequest(req) => s.constructed(tag, |s| {
                s.string(TAG_OCTET_STRING, &req.base_object);
                s.integer(TAG_ENUMERATED, req.scope as i64);
                s.integer(TAG_ENUMERATED, req.deref_aliases as i64);
                s.integer(TAG_INTEGER, req.size_limit as i64);
                s.integer(TAG_INTEGER, req.time_limit as i64);
                s.boolean(TAG_BOOLEAN, req.types_only);
                req.filter.encode_ber(s);
                s.constructed(TAG_SEQUENCE, |s| {
                    for attribute in &req.attributes {
                        s.string(TAG_OCTET_STRING, attribute);
                    }
                });
            }),
            ProtocolOp::SearchResultEntry(entry) => s.constructed(tag, |s| {
                s.string(TAG_OCTET_STRING, &entry.object_name);
                encode_attributes(s, &entry.attributes);
            }),
            ProtocolOp::SearchResultReference(reference) => s.constructed(tag, |s| {
                for uri in &reference.uris {
                    s.string(TAG_OCTET_STRING, uri);
                }
            }),
            ProtocolOp::ModifyRequest(req) => s.constructed(tag, |s| {
                s.string(TAG_OCTET_STRING, &req.object);
                s.constructed(TAG_SEQUENCE, |s| {
                    for change in &req.changes {
                        s.constructed(TAG_SEQUENCE, |s| {
                            s.integer(TAG_ENUMERATED, change.operation as i64);
                            encode_attribute(s, &change.modification);
                        });
                    }
                });
            }),
            ProtocolOp::AddRequest(req) => s.constructed(tag, |s| {
                s.string(TAG_OCTET_STRING, &req.entry);
                encode_attributes(s, &req.attributes);
            }),
            ProtocolOp::DelRequest(req) => s.string(tag, &req.entry),
            ProtocolOp::ModifyDNRequest(req) => s.constructed(tag, |s| {
                s.string(TAG_OCTET_STRING, &req.entry);
                s.string(TAG_OCTET_STRING, &req.newrdn);
                s.boolean(TAG_BOOLEAN, req.delete_old_rdn);
                if let Some(superior) = &req.new_superior {
                    s.string(0x80, superior);
                }
            }),
            ProtocolOp::CompareRequest(req) => s.constructed(tag, |s| {
                s.string(TAG_OCTET_STRING, &req.entry);
                s.constructed(TAG_SEQUENCE, |s| {
                    s.string(TAG_OCTET_STRING, &req.attr);
                    s.primitive(TAG_OCTET_STRING, &req.assertion_value);
                });
            }),
            ProtocolOp::AbandonRequest(id) => s.integer(tag, *id as i64),
            ProtocolOp::ExtendedRequest(req) => s.constructed(tag, |s| {
                s.string(0x80, &req.request_name);
                if let Some(value) = &req.request_value {
                    s.primitive(0x81, value);
                }
            }),
            ProtocolOp::ExtendedResponse(resp) => s.constructed(tag, |s| {
                encode_result(s, &resp.result);
                if let Some(name) = &resp.response_name {
                    s.string(0x8A, name);
                }
                if let Some(value) = &resp.response_value {
                    s.primitive(0x8B, value);
                }
            }),
            ProtocolOp::IntermediateResponse(resp) => s.constructed(tag, |s| {
                if let Some(name) = &resp.response_name {
                    s.string(0x80, name);
                }
                if let Some(value) = &resp.response_value {
                    s.primitive(0x81, value);
                }
            }),
            ProtocolOp::SearchResultDone(result)
            | ProtocolOp::ModifyResponse(result)
            | ProtocolOp::AddResponse(result)
            | ProtocolOp::DelResponse(result)
            | ProtocolOp::ModifyDNResponse(result)
            | ProtocolOp::CompareResponse(result) => s.constructed(tag, |s| encode_result(s, result)),
        }
    }
}

fn encode_ava<S: BerSink>(s: &mut S, tag: u8, ava: &AttributeValueAssertion) {
    s.constructed(tag, |s| {
        s.string(TAG_OCTET_STRING, &ava.attribute_desc);
        s.primitive(TAG_OCTET_STRING, &ava.assertion_value);
    });
}

impl BerEncode for Filter {
    fn encode_ber<S: BerSink>(&self, s: &mut S) {
        let tag = self.tag();
        match self {
            Filter::And(children) | Filter::Or(children) => s.constructed(tag, |s| {
                for child in children {
                    child.encode_ber(s);
                }
            }),
            Filter::Not(child) => s.constructed(tag, |s| child.encode_ber(s)),
            Filter::EqualityMatch(ava)
            | Filter::GreaterOrEqual(ava)
            | Filter::LessOrEqual(ava)
            | Filter::ApproxMatch(ava) => encode_ava(s, tag, ava),
            Filter::Present(attr) => s.string(tag, attr),
            Filter::Substrings(sub) => s.constructed(tag, |s| {
                s.string(TAG_OCTET_STRING, &sub.attr_type);
                s.constructed(TAG_SEQUENCE, |s| {
                    if let Some(initial) = &sub.initial {
                        s.primitive(SUBSTRING_INITIAL, initial);
                    }
                    for any in &sub.any {
                        s.primitive(SUBSTRING_ANY, any);
                    }
                    if let Some(last) = &sub.r#final {
                        s.primitive(SUBSTRING_FINAL, last);
                    }
                });
            }),
            Filter::ExtensibleMatch(mra) => s.constructed(tag, |s| {
                if let Some(rule) = &mra.matching_rule {
                    s.string(MATCHING_RULE, rule);
                }
                if let Some(attr) = &mra.attr_type {
                    s.string(MATCHING_TYPE, attr);
                }
                s.primitive(MATCHING_VALUE, &mra.match_value);
                if mra.dn_attributes {
                    s.boolean(MATCHING_DN_ATTRIBUTES, true);
                }
            }),
        }
    }
}
