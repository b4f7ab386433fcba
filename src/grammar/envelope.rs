// LDAPMessage envelope and the controls that may trail it.
//
//   LDAPMessage ::= SEQUENCE {
//        messageID       MessageID,
//        protocolOp      CHOICE { ... },
//        controls        [0] Controls OPTIONAL }

use super::{mismatch, ops, Built, GrammarNode, Node};
use crate::config::CodecConfig;
use crate::dn;
use crate::error::{DecoderError, ResponseCarryingError};
use crate::message::*;
use crate::tlv::{parse_boolean, Tag, TAG_BOOLEAN, TAG_INTEGER, TAG_OCTET_STRING, TAG_SEQUENCE};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnvelopeState {
    AwaitMessageId,
    AwaitProtocolOp,
    AwaitControlsOrEnd,
    Complete,
}

pub(crate) struct Envelope {
    state: EnvelopeState,
    message_id: i32,
    op_tag: u8,
    protocol_op: Option<ProtocolOp>,
    controls: Vec<Control>,
}

impl Envelope {
    pub(crate) fn new() -> Self {
        Self {
            state: EnvelopeState::AwaitMessageId,
            message_id: 0,
            op_tag: 0,
            protocol_op: None,
            controls: Vec::new(),
        }
    }

    fn set_op(&mut self, op: ProtocolOp, config: &CodecConfig) -> Result<(), DecoderError> {
        if config.validate_dns {
            if let Err(diagnostic) = check_dns(&op) {
                return Err(self.semantic_error(diagnostic));
            }
        }
        trace!(message_id = self.message_id, op = op.name(), "protocol op complete");
        self.protocol_op = Some(op);
        self.state = EnvelopeState::AwaitControlsOrEnd;
        Ok(())
    }

    /// invalidDNSyntax failure carrying the response for this request.
    fn semantic_error(&self, diagnostic: String) -> DecoderError {
        let result = LdapResult::new(ResultCode::InvalidDnSyntax, diagnostic.clone());
        match response_for_request(self.op_tag, result) {
            Some(op) => ResponseCarryingError {
                message_id: self.message_id,
                diagnostic,
                response: LdapMessage::new(self.message_id, op),
            }
            .into(),
            None => DecoderError::invalid(diagnostic),
        }
    }
}

impl GrammarNode for Envelope {
    fn name(&self) -> &'static str {
        "LDAPMessage"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match self.state {
            EnvelopeState::AwaitProtocolOp => {
                self.op_tag = tag.octet();
                ops::open_op(tag)
            }
            EnvelopeState::AwaitControlsOrEnd if tag.octet() == LDAP_CONTEXT_CONTROLS => {
                Ok(ControlsNode::default().into())
            }
            _ => Err(DecoderError::unexpected(tag.octet(), self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], config: &CodecConfig) -> Result<(), DecoderError> {
        match (self.state, tag.octet()) {
            (EnvelopeState::AwaitMessageId, TAG_INTEGER) => {
                self.message_id = super::non_negative(value, "messageID")?;
                self.state = EnvelopeState::AwaitProtocolOp;
                Ok(())
            }
            (EnvelopeState::AwaitProtocolOp, op_tag) => {
                self.op_tag = op_tag;
                let op = match op_tag {
                    LDAP_TAG_UNBIND_REQUEST => {
                        if !value.is_empty() {
                            return Err(DecoderError::invalid("UnbindRequest NULL with non-zero length"));
                        }
                        ProtocolOp::UnbindRequest
                    }
                    LDAP_TAG_DEL_REQUEST => ProtocolOp::DelRequest(DelRequest {
                        entry: super::string(value, "DelRequest")?,
                    }),
                    LDAP_TAG_ABANDON_REQUEST => {
                        ProtocolOp::AbandonRequest(super::non_negative(value, "AbandonRequest messageID")?)
                    }
                    other => return Err(DecoderError::UnknownProtocolOp(other)),
                };
                self.set_op(op, config)
            }
            _ => Err(DecoderError::unexpected(tag.octet(), self.name())),
        }
    }

    fn accept(&mut self, built: Built, config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Op(op) if self.state == EnvelopeState::AwaitProtocolOp => self.set_op(op, config),
            Built::Controls(controls) if self.state == EnvelopeState::AwaitControlsOrEnd => {
                self.controls = controls;
                self.state = EnvelopeState::Complete;
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.state, self.protocol_op) {
            (EnvelopeState::AwaitControlsOrEnd | EnvelopeState::Complete, Some(protocol_op)) => {
                Ok(Built::Message(LdapMessage {
                    message_id: self.message_id,
                    protocol_op,
                    controls: self.controls,
                }))
            }
            (EnvelopeState::AwaitMessageId, _) => Err(DecoderError::invalid("LDAPMessage without messageID")),
            _ => Err(DecoderError::invalid("LDAPMessage without protocolOp")),
        }
    }
}

/// Every LDAPDN-typed field of a request must tokenize as a DN.
fn check_dns(op: &ProtocolOp) -> Result<(), String> {
    let check = |field: &str, value: &str| {
        dn::parse(value)
            .map(|_| ())
            .map_err(|e| format!("invalid {} '{}': {}", field, value, e))
    };
    match op {
        ProtocolOp::BindRequest(req) => check("bind DN", &req.name),
        ProtocolOp::SearchRequest(req) => check("base DN", &req.base_object),
        ProtocolOp::ModifyRequest(req) => check("object DN", &req.object),
        ProtocolOp::AddRequest(req) => check("entry DN", &req.entry),
        ProtocolOp::DelRequest(req) => check("entry DN", &req.entry),
        ProtocolOp::CompareRequest(req) => check("entry DN", &req.entry),
        ProtocolOp::ModifyDNRequest(req) => {
            check("entry DN", &req.entry)?;
            dn::parse_rdn(&req.newrdn).map_err(|e| format!("invalid new RDN '{}': {}", req.newrdn, e))?;
            match &req.new_superior {
                Some(superior) => check("new superior DN", superior),
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

/// `[0] Controls ::= SEQUENCE OF control Control`
#[derive(Default)]
pub(crate) struct ControlsNode {
    controls: Vec<Control>,
}

impl GrammarNode for ControlsNode {
    fn name(&self) -> &'static str {
        "Controls"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE => Ok(ControlNode::default().into()),
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Control(control) => {
                self.controls.push(control);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        if self.controls.is_empty() {
            return Err(DecoderError::invalid("empty Controls sequence"));
        }
        Ok(Built::Controls(self.controls))
    }
}

/// `Control ::= SEQUENCE { controlType LDAPOID, criticality BOOLEAN DEFAULT FALSE,
///                         controlValue OCTET STRING OPTIONAL }`
#[derive(Default)]
pub(crate) struct ControlNode {
    ctype: Option<String>,
    critical: Option<bool>,
    value: Option<Vec<u8>>,
}

impl GrammarNode for ControlNode {
    fn name(&self) -> &'static str {
        "Control"
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        let have_type = self.ctype.is_some();
        match tag.octet() {
            TAG_OCTET_STRING if !have_type => {
                if value.is_empty() {
                    return Err(DecoderError::invalid("empty controlType"));
                }
                self.ctype = Some(super::string(value, "controlType")?);
            }
            TAG_BOOLEAN if have_type && self.critical.is_none() && self.value.is_none() => {
                self.critical = Some(parse_boolean(value)?);
            }
            TAG_OCTET_STRING if self.value.is_none() => {
                self.value = Some(value.to_vec());
            }
            other => return Err(DecoderError::unexpected(other, self.name())),
        }
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let ctype = self
            .ctype
            .ok_or_else(|| DecoderError::invalid("Control without controlType"))?;
        Ok(Built::Control(Control {
            ctype,
            critical: self.critical.unwrap_or(false),
            value: self.value,
        }))
    }
}
