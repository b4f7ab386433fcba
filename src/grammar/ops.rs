// Protocol op bodies (RFC 4511 section 4.2 - 4.14) and the lists shared
// between them.

use super::filter::{open_filter, primitive_filter, AvaNode};
use super::{mismatch, non_negative, string, Built, GrammarNode, Node};
use crate::config::CodecConfig;
use crate::error::DecoderError;
use crate::filter::Filter;
use crate::ldap_url::LdapUrl;
use crate::message::*;
use crate::tlv::{
    parse_boolean, parse_enumerated, Tag, TAG_BOOLEAN, TAG_ENUMERATED, TAG_INTEGER, TAG_OCTET_STRING,
    TAG_SEQUENCE, TAG_SET,
};

const TAG_SIMPLE_AUTH: u8 = 0x80;
const TAG_SASL_AUTH: u8 = 0xA3;
const TAG_REFERRAL: u8 = 0xA3;
const TAG_SERVER_SASL_CREDS: u8 = 0x87;
const TAG_NEW_SUPERIOR: u8 = 0x80;
const TAG_EXTENDED_REQUEST_NAME: u8 = 0x80;
const TAG_EXTENDED_REQUEST_VALUE: u8 = 0x81;
const TAG_EXTENDED_RESPONSE_NAME: u8 = 0x8A;
const TAG_EXTENDED_RESPONSE_VALUE: u8 = 0x8B;
const TAG_INTERMEDIATE_NAME: u8 = 0x80;
const TAG_INTERMEDIATE_VALUE: u8 = 0x81;

/// Node for a constructed protocolOp.
pub(crate) fn open_op(tag: Tag) -> Result<Node, DecoderError> {
    let node: Node = match tag.octet() {
        LDAP_TAG_BIND_REQUEST => BindRequestNode::default().into(),
        LDAP_TAG_SEARCH_REQUEST => SearchRequestNode::default().into(),
        LDAP_TAG_SEARCH_RESULT_ENTRY => SearchResultEntryNode::default().into(),
        LDAP_TAG_SEARCH_RESULT_REFERENCE => StringListNode::new(ListKind::References).into(),
        LDAP_TAG_MODIFY_REQUEST => ModifyRequestNode::default().into(),
        LDAP_TAG_ADD_REQUEST => AddRequestNode::default().into(),
        LDAP_TAG_MODIFY_DN_REQUEST => ModifyDNRequestNode::default().into(),
        LDAP_TAG_COMPARE_REQUEST => CompareRequestNode::default().into(),
        LDAP_TAG_EXTENDED_REQUEST => ExtendedRequestNode::default().into(),
        LDAP_TAG_INTERMEDIATE_RESPONSE => IntermediateResponseNode::default().into(),
        LDAP_TAG_BIND_RESPONSE
        | LDAP_TAG_SEARCH_RESULT_DONE
        | LDAP_TAG_MODIFY_RESPONSE
        | LDAP_TAG_ADD_RESPONSE
        | LDAP_TAG_DEL_RESPONSE
        | LDAP_TAG_MODIFY_DN_RESPONSE
        | LDAP_TAG_COMPARE_RESPONSE
        | LDAP_TAG_EXTENDED_RESPONSE => ResultNode::new(tag.octet()).into(),
        other => return Err(DecoderError::UnknownProtocolOp(other)),
    };
    Ok(node)
}

fn missing(what: &str) -> DecoderError {
    DecoderError::invalid(format!("{} is incomplete", what))
}

// ---------------------------------------------------------------------------
// Bind

#[derive(Default)]
pub(crate) struct BindRequestNode {
    version: Option<i32>,
    name: Option<String>,
    authentication: Option<BindAuthentication>,
}

impl GrammarNode for BindRequestNode {
    fn name(&self) -> &'static str {
        "BindRequest"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SASL_AUTH if self.name.is_some() && self.authentication.is_none() => Ok(SaslNode::default().into()),
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_INTEGER if self.version.is_none() => {
                let version = crate::tlv::parse_i32(value)?;
                if !(1..=127).contains(&version) {
                    return Err(DecoderError::invalid(format!("bind version {} out of range", version)));
                }
                self.version = Some(version);
            }
            TAG_OCTET_STRING if self.version.is_some() && self.name.is_none() => {
                self.name = Some(string(value, "bind name")?);
            }
            TAG_SIMPLE_AUTH if self.name.is_some() && self.authentication.is_none() => {
                self.authentication = Some(BindAuthentication::Simple(value.to_vec()));
            }
            other => return Err(DecoderError::unexpected(other, self.name())),
        }
        Ok(())
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Auth(auth) => {
                self.authentication = Some(auth);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.version, self.name, self.authentication) {
            (Some(version), Some(name), Some(authentication)) => Ok(Built::Op(ProtocolOp::BindRequest(BindRequest {
                version,
                name,
                authentication,
            }))),
            _ => Err(missing("BindRequest")),
        }
    }
}

/// `SaslCredentials ::= SEQUENCE { mechanism LDAPString, credentials OCTET STRING OPTIONAL }`
#[derive(Default)]
pub(crate) struct SaslNode {
    mechanism: Option<String>,
    credentials: Option<Vec<u8>>,
}

impl GrammarNode for SaslNode {
    fn name(&self) -> &'static str {
        "SaslCredentials"
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.mechanism.is_none() => self.mechanism = Some(string(value, "SASL mechanism")?),
            TAG_OCTET_STRING if self.credentials.is_none() => self.credentials = Some(value.to_vec()),
            other => return Err(DecoderError::unexpected(other, self.name())),
        }
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let mechanism = self.mechanism.ok_or_else(|| missing("SaslCredentials"))?;
        Ok(Built::Auth(BindAuthentication::Sasl {
            mechanism,
            credentials: self.credentials,
        }))
    }
}

// ---------------------------------------------------------------------------
// LDAPResult based responses

/// Any response built on LDAPResult. The op tag decides which trailing
/// fields are allowed and which variant `finish` builds.
pub(crate) struct ResultNode {
    op_tag: u8,
    result_code: Option<ResultCode>,
    matched_dn: Option<String>,
    diagnostic_message: Option<String>,
    referral: Option<Vec<String>>,
    server_sasl_creds: Option<Vec<u8>>,
    response_name: Option<String>,
    response_value: Option<Vec<u8>>,
}

impl ResultNode {
    pub(crate) fn new(op_tag: u8) -> Self {
        Self {
            op_tag,
            result_code: None,
            matched_dn: None,
            diagnostic_message: None,
            referral: None,
            server_sasl_creds: None,
            response_name: None,
            response_value: None,
        }
    }

    fn has_trailer(&self) -> bool {
        self.server_sasl_creds.is_some() || self.response_name.is_some() || self.response_value.is_some()
    }
}

impl GrammarNode for ResultNode {
    fn name(&self) -> &'static str {
        match self.op_tag {
            LDAP_TAG_BIND_RESPONSE => "BindResponse",
            LDAP_TAG_EXTENDED_RESPONSE => "ExtendedResponse",
            _ => "LDAPResult",
        }
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_REFERRAL if self.diagnostic_message.is_some() && self.referral.is_none() && !self.has_trailer() => {
                Ok(StringListNode::new(ListKind::Referral).into())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        let after_result = self.diagnostic_message.is_some();
        match tag.octet() {
            TAG_ENUMERATED if self.result_code.is_none() => {
                let code = parse_enumerated(value)?;
                if code < 0 {
                    return Err(DecoderError::invalid(format!("negative resultCode {}", code)));
                }
                self.result_code = Some(ResultCode::from_code(code));
            }
            TAG_OCTET_STRING if self.result_code.is_some() && self.matched_dn.is_none() => {
                self.matched_dn = Some(string(value, "matchedDN")?);
            }
            TAG_OCTET_STRING if self.matched_dn.is_some() && !after_result => {
                self.diagnostic_message = Some(string(value, "diagnosticMessage")?);
            }
            TAG_SERVER_SASL_CREDS
                if after_result && self.op_tag == LDAP_TAG_BIND_RESPONSE && self.server_sasl_creds.is_none() =>
            {
                self.server_sasl_creds = Some(value.to_vec());
            }
            TAG_EXTENDED_RESPONSE_NAME
                if after_result && self.op_tag == LDAP_TAG_EXTENDED_RESPONSE && !self.has_trailer() =>
            {
                self.response_name = Some(string(value, "responseName")?);
            }
            TAG_EXTENDED_RESPONSE_VALUE
                if after_result && self.op_tag == LDAP_TAG_EXTENDED_RESPONSE && self.response_value.is_none() =>
            {
                self.response_value = Some(value.to_vec());
            }
            other => return Err(DecoderError::unexpected(other, self.name())),
        }
        Ok(())
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Strings(uris) => {
                self.referral = Some(uris);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let op_tag = self.op_tag;
        let (Some(result_code), Some(matched_dn), Some(diagnostic_message)) =
            (self.result_code, self.matched_dn, self.diagnostic_message)
        else {
            return Err(missing(op_name(op_tag)));
        };
        let result = LdapResult {
            result_code,
            matched_dn,
            diagnostic_message,
            referral: self.referral,
        };
        let op = match op_tag {
            LDAP_TAG_BIND_RESPONSE => ProtocolOp::BindResponse(BindResponse {
                result,
                server_sasl_creds: self.server_sasl_creds,
            }),
            LDAP_TAG_EXTENDED_RESPONSE => ProtocolOp::ExtendedResponse(ExtendedResponse {
                result,
                response_name: self.response_name,
                response_value: self.response_value,
            }),
            LDAP_TAG_SEARCH_RESULT_DONE => ProtocolOp::SearchResultDone(result),
            LDAP_TAG_MODIFY_RESPONSE => ProtocolOp::ModifyResponse(result),
            LDAP_TAG_ADD_RESPONSE => ProtocolOp::AddResponse(result),
            LDAP_TAG_DEL_RESPONSE => ProtocolOp::DelResponse(result),
            LDAP_TAG_MODIFY_DN_RESPONSE => ProtocolOp::ModifyDNResponse(result),
            LDAP_TAG_COMPARE_RESPONSE => ProtocolOp::CompareResponse(result),
            other => return Err(DecoderError::UnknownProtocolOp(other)),
        };
        Ok(Built::Op(op))
    }
}

// ---------------------------------------------------------------------------
// Search

#[derive(Default)]
pub(crate) struct SearchRequestNode {
    /// Index of the next positional field, 0 (baseObject) through 8 (done).
    field: u8,
    base_object: String,
    scope: Option<SearchScope>,
    deref_aliases: Option<DerefAliases>,
    size_limit: u32,
    time_limit: u32,
    types_only: bool,
    filter: Option<Filter>,
    attributes: Vec<String>,
}

impl GrammarNode for SearchRequestNode {
    fn name(&self) -> &'static str {
        "SearchRequest"
    }

    fn open(&mut self, tag: Tag, config: &CodecConfig) -> Result<Node, DecoderError> {
        match (self.field, tag.octet()) {
            (6, _) => open_filter(tag, 1, config),
            (7, TAG_SEQUENCE) => Ok(StringListNode::new(ListKind::Attributes).into()),
            (_, other) => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], config: &CodecConfig) -> Result<(), DecoderError> {
        match (self.field, tag.octet()) {
            (0, TAG_OCTET_STRING) => self.base_object = string(value, "baseObject")?,
            (1, TAG_ENUMERATED) => {
                let scope = parse_enumerated(value)?;
                self.scope = Some(
                    SearchScope::try_from(scope)
                        .map_err(|v| DecoderError::invalid(format!("invalid search scope {}", v)))?,
                );
            }
            (2, TAG_ENUMERATED) => {
                let deref = parse_enumerated(value)?;
                self.deref_aliases = Some(
                    DerefAliases::try_from(deref)
                        .map_err(|v| DecoderError::invalid(format!("invalid derefAliases {}", v)))?,
                );
            }
            (3, TAG_INTEGER) => self.size_limit = non_negative(value, "sizeLimit")? as u32,
            (4, TAG_INTEGER) => self.time_limit = non_negative(value, "timeLimit")? as u32,
            (5, TAG_BOOLEAN) => self.types_only = parse_boolean(value)?,
            (6, _) => self.filter = Some(primitive_filter(tag, value, 1, config)?),
            (_, other) => return Err(DecoderError::unexpected(other, self.name())),
        }
        self.field += 1;
        Ok(())
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Filter(filter) => self.filter = Some(filter),
            Built::Strings(attributes) => self.attributes = attributes,
            other => return Err(mismatch(self.name(), &other)),
        }
        self.field += 1;
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.field, self.scope, self.deref_aliases, self.filter) {
            (8, Some(scope), Some(deref_aliases), Some(filter)) => Ok(Built::Op(ProtocolOp::SearchRequest(SearchRequest {
                base_object: self.base_object,
                scope,
                deref_aliases,
                size_limit: self.size_limit,
                time_limit: self.time_limit,
                types_only: self.types_only,
                filter,
                attributes: self.attributes,
            }))),
            _ => Err(missing("SearchRequest")),
        }
    }
}

#[derive(Default)]
pub(crate) struct SearchResultEntryNode {
    object_name: Option<String>,
    attributes: Option<Vec<Attribute>>,
}

impl GrammarNode for SearchResultEntryNode {
    fn name(&self) -> &'static str {
        "SearchResultEntry"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE if self.object_name.is_some() && self.attributes.is_none() => {
                Ok(AttributeListNode::new("PartialAttributeList", false).into())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.object_name.is_none() => {
                self.object_name = Some(string(value, "objectName")?);
                Ok(())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Attributes(attributes) => {
                self.attributes = Some(attributes);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.object_name, self.attributes) {
            (Some(object_name), Some(attributes)) => Ok(Built::Op(ProtocolOp::SearchResultEntry(SearchResultEntry {
                object_name,
                attributes,
            }))),
            _ => Err(missing("SearchResultEntry")),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared lists

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind {
    /// AttributeSelection, may be empty.
    Attributes,
    /// LDAPResult referral, non-empty LDAP URLs.
    Referral,
    /// SearchResultReference body, non-empty LDAP URLs.
    References,
}

/// SEQUENCE OF LDAPString.
pub(crate) struct StringListNode {
    kind: ListKind,
    items: Vec<String>,
}

impl StringListNode {
    pub(crate) fn new(kind: ListKind) -> Self {
        Self { kind, items: Vec::new() }
    }
}

impl GrammarNode for StringListNode {
    fn name(&self) -> &'static str {
        match self.kind {
            ListKind::Attributes => "AttributeSelection",
            ListKind::Referral => "Referral",
            ListKind::References => "SearchResultReference",
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], config: &CodecConfig) -> Result<(), DecoderError> {
        if tag.octet() != TAG_OCTET_STRING {
            return Err(DecoderError::unexpected(tag.octet(), self.name()));
        }
        let item = string(value, self.name())?;
        if self.kind != ListKind::Attributes && config.validate_referral_urls {
            LdapUrl::parse(&item).map_err(|e| DecoderError::invalid(format!("bad URI '{}': {}", item, e)))?;
        }
        self.items.push(item);
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        if self.kind != ListKind::Attributes && self.items.is_empty() {
            return Err(DecoderError::invalid(format!("empty {}", self.name())));
        }
        Ok(match self.kind {
            ListKind::References => Built::Op(ProtocolOp::SearchResultReference(SearchResultReference {
                uris: self.items,
            })),
            _ => Built::Strings(self.items),
        })
    }
}

/// SEQUENCE OF (Partial)Attribute.
pub(crate) struct AttributeListNode {
    name: &'static str,
    require_values: bool,
    attributes: Vec<Attribute>,
}

impl AttributeListNode {
    pub(crate) fn new(name: &'static str, require_values: bool) -> Self {
        Self {
            name,
            require_values,
            attributes: Vec::new(),
        }
    }
}

impl GrammarNode for AttributeListNode {
    fn name(&self) -> &'static str {
        self.name
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE => Ok(AttributeNode::new(self.require_values).into()),
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Attribute(attribute) => {
                self.attributes.push(attribute);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        Ok(Built::Attributes(self.attributes))
    }
}

/// `SEQUENCE { type AttributeDescription, vals SET OF AttributeValue }`
pub(crate) struct AttributeNode {
    require_values: bool,
    attr_type: Option<String>,
    attr_values: Option<Vec<Vec<u8>>>,
}

impl AttributeNode {
    pub(crate) fn new(require_values: bool) -> Self {
        Self {
            require_values,
            attr_type: None,
            attr_values: None,
        }
    }
}

impl GrammarNode for AttributeNode {
    fn name(&self) -> &'static str {
        "PartialAttribute"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SET if self.attr_type.is_some() && self.attr_values.is_none() => Ok(ValueSetNode::default().into()),
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.attr_type.is_none() => {
                if value.is_empty() {
                    return Err(DecoderError::invalid("zero-length attribute type"));
                }
                self.attr_type = Some(string(value, "attribute type")?);
                Ok(())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Values(values) => {
                self.attr_values = Some(values);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let (Some(attr_type), Some(attr_values)) = (self.attr_type, self.attr_values) else {
            return Err(missing("PartialAttribute"));
        };
        if self.require_values && attr_values.is_empty() {
            return Err(DecoderError::invalid(format!("attribute '{}' has no values", attr_type)));
        }
        Ok(Built::Attribute(Attribute { attr_type, attr_values }))
    }
}

/// SET OF AttributeValue.
#[derive(Default)]
pub(crate) struct ValueSetNode {
    values: Vec<Vec<u8>>,
}

impl GrammarNode for ValueSetNode {
    fn name(&self) -> &'static str {
        "AttributeValueSet"
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING => {
                self.values.push(value.to_vec());
                Ok(())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        Ok(Built::Values(self.values))
    }
}

// ---------------------------------------------------------------------------
// Modify

#[derive(Default)]
pub(crate) struct ModifyRequestNode {
    object: Option<String>,
    changes: Option<Vec<ModifyChange>>,
}

impl GrammarNode for ModifyRequestNode {
    fn name(&self) -> &'static str {
        "ModifyRequest"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE if self.object.is_some() && self.changes.is_none() => Ok(ChangeListNode::default().into()),
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.object.is_none() => {
                self.object = Some(string(value, "object")?);
                Ok(())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Changes(changes) => {
                self.changes = Some(changes);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.object, self.changes) {
            (Some(object), Some(changes)) => Ok(Built::Op(ProtocolOp::ModifyRequest(ModifyRequest { object, changes }))),
            _ => Err(missing("ModifyRequest")),
        }
    }
}

#[derive(Default)]
pub(crate) struct ChangeListNode {
    changes: Vec<ModifyChange>,
}

impl GrammarNode for ChangeListNode {
    fn name(&self) -> &'static str {
        "ModifyRequest changes"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE => Ok(ChangeNode::default().into()),
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Change(change) => {
                self.changes.push(change);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        Ok(Built::Changes(self.changes))
    }
}

#[derive(Default)]
pub(crate) struct ChangeNode {
    operation: Option<ModifyOperation>,
    modification: Option<Attribute>,
}

impl GrammarNode for ChangeNode {
    fn name(&self) -> &'static str {
        "change"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE if self.operation.is_some() && self.modification.is_none() => {
                Ok(AttributeNode::new(false).into())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_ENUMERATED if self.operation.is_none() => {
                let op = parse_enumerated(value)?;
                self.operation = Some(
                    ModifyOperation::try_from(op)
                        .map_err(|v| DecoderError::invalid(format!("invalid modify operation {}", v)))?,
                );
                Ok(())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Attribute(attribute) => {
                self.modification = Some(attribute);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.operation, self.modification) {
            (Some(operation), Some(modification)) => Ok(Built::Change(ModifyChange { operation, modification })),
            _ => Err(missing("change")),
        }
    }
}

// ---------------------------------------------------------------------------
// Add, ModifyDN, Compare

#[derive(Default)]
pub(crate) struct AddRequestNode {
    entry: Option<String>,
    attributes: Option<Vec<Attribute>>,
}

impl GrammarNode for AddRequestNode {
    fn name(&self) -> &'static str {
        "AddRequest"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE if self.entry.is_some() && self.attributes.is_none() => {
                Ok(AttributeListNode::new("AttributeList", true).into())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.entry.is_none() => {
                self.entry = Some(string(value, "entry")?);
                Ok(())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Attributes(attributes) => {
                self.attributes = Some(attributes);
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.entry, self.attributes) {
            (Some(entry), Some(attributes)) => Ok(Built::Op(ProtocolOp::AddRequest(AddRequest { entry, attributes }))),
            _ => Err(missing("AddRequest")),
        }
    }
}

#[derive(Default)]
pub(crate) struct ModifyDNRequestNode {
    entry: Option<String>,
    newrdn: Option<String>,
    delete_old_rdn: Option<bool>,
    new_superior: Option<String>,
}

impl GrammarNode for ModifyDNRequestNode {
    fn name(&self) -> &'static str {
        "ModifyDNRequest"
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.entry.is_none() => self.entry = Some(string(value, "entry")?),
            TAG_OCTET_STRING if self.newrdn.is_none() => self.newrdn = Some(string(value, "newrdn")?),
            TAG_BOOLEAN if self.newrdn.is_some() && self.delete_old_rdn.is_none() => {
                self.delete_old_rdn = Some(parse_boolean(value)?)
            }
            TAG_NEW_SUPERIOR if self.delete_old_rdn.is_some() && self.new_superior.is_none() => {
                self.new_superior = Some(string(value, "newSuperior")?)
            }
            other => return Err(DecoderError::unexpected(other, self.name())),
        }
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.entry, self.newrdn, self.delete_old_rdn) {
            (Some(entry), Some(newrdn), Some(delete_old_rdn)) => {
                Ok(Built::Op(ProtocolOp::ModifyDNRequest(ModifyDNRequest {
                    entry,
                    newrdn,
                    delete_old_rdn,
                    new_superior: self.new_superior,
                })))
            }
            _ => Err(missing("ModifyDNRequest")),
        }
    }
}

#[derive(Default)]
pub(crate) struct CompareRequestNode {
    entry: Option<String>,
    ava: Option<(String, Vec<u8>)>,
}

impl GrammarNode for CompareRequestNode {
    fn name(&self) -> &'static str {
        "CompareRequest"
    }

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        match tag.octet() {
            TAG_SEQUENCE if self.entry.is_some() && self.ava.is_none() => Ok(AvaNode::new(None).into()),
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_OCTET_STRING if self.entry.is_none() => {
                self.entry = Some(string(value, "entry")?);
                Ok(())
            }
            other => Err(DecoderError::unexpected(other, self.name())),
        }
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        match built {
            Built::Ava(ava) => {
                self.ava = Some((ava.attribute_desc, ava.assertion_value));
                Ok(())
            }
            other => Err(mismatch(self.name(), &other)),
        }
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        match (self.entry, self.ava) {
            (Some(entry), Some((attr, assertion_value))) => Ok(Built::Op(ProtocolOp::CompareRequest(CompareRequest {
                entry,
                attr,
                assertion_value,
            }))),
            _ => Err(missing("CompareRequest")),
        }
    }
}

// ---------------------------------------------------------------------------
// Extended and intermediate

#[derive(Default)]
pub(crate) struct ExtendedRequestNode {
    request_name: Option<String>,
    request_value: Option<Vec<u8>>,
}

impl GrammarNode for ExtendedRequestNode {
    fn name(&self) -> &'static str {
        "ExtendedRequest"
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_EXTENDED_REQUEST_NAME if self.request_name.is_none() => {
                self.request_name = Some(string(value, "requestName")?)
            }
            TAG_EXTENDED_REQUEST_VALUE if self.request_name.is_some() && self.request_value.is_none() => {
                self.request_value = Some(value.to_vec())
            }
            other => return Err(DecoderError::unexpected(other, self.name())),
        }
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        let request_name = self.request_name.ok_or_else(|| missing("ExtendedRequest"))?;
        Ok(Built::Op(ProtocolOp::ExtendedRequest(ExtendedRequest {
            request_name,
            request_value: self.request_value,
        })))
    }
}

#[derive(Default)]
pub(crate) struct IntermediateResponseNode {
    response_name: Option<String>,
    response_value: Option<Vec<u8>>,
}

impl GrammarNode for IntermediateResponseNode {
    fn name(&self) -> &'static str {
        "IntermediateResponse"
    }

    fn primitive(&mut self, tag: Tag, value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        match tag.octet() {
            TAG_INTERMEDIATE_NAME if self.response_name.is_none() && self.response_value.is_none() => {
                self.response_name = Some(string(value, "responseName")?)
            }
            TAG_INTERMEDIATE_VALUE if self.response_value.is_none() => self.response_value = Some(value.to_vec()),
            other => return Err(DecoderError::unexpected(other, self.name())),
        }
        Ok(())
    }

    fn finish(self, _config: &CodecConfig) -> Result<Built, DecoderError> {
        Ok(Built::Op(ProtocolOp::IntermediateResponse(IntermediateResponse {
            response_name: self.response_name,
            response_value: self.response_value,
        })))
    }
}
