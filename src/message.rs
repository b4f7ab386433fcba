// LDAP message object model (RFC 4511 section 4).
// Plain data holders: produced by the decoder, consumed by the encoder.

use crate::filter::Filter;

// LDAP protocol tag constants
pub const LDAP_TAG_BIND_REQUEST: u8 = 0x60;
pub const LDAP_TAG_BIND_RESPONSE: u8 = 0x61;
pub const LDAP_TAG_UNBIND_REQUEST: u8 = 0x42;
pub const LDAP_TAG_SEARCH_REQUEST: u8 = 0x63;
pub const LDAP_TAG_SEARCH_RESULT_ENTRY: u8 = 0x64;
pub const LDAP_TAG_SEARCH_RESULT_DONE: u8 = 0x65;
pub const LDAP_TAG_SEARCH_RESULT_REFERENCE: u8 = 0x73;
pub const LDAP_TAG_MODIFY_REQUEST: u8 = 0x66;
pub const LDAP_TAG_MODIFY_RESPONSE: u8 = 0x67;
pub const LDAP_TAG_ADD_REQUEST: u8 = 0x68;
pub const LDAP_TAG_ADD_RESPONSE: u8 = 0x69;
pub const LDAP_TAG_DEL_REQUEST: u8 = 0x4A;
pub const LDAP_TAG_DEL_RESPONSE: u8 = 0x6B;
pub const LDAP_TAG_MODIFY_DN_REQUEST: u8 = 0x6C;
pub const LDAP_TAG_MODIFY_DN_RESPONSE: u8 = 0x6D;
pub const LDAP_TAG_COMPARE_REQUEST: u8 = 0x6E;
pub const LDAP_TAG_COMPARE_RESPONSE: u8 = 0x6F;
pub const LDAP_TAG_ABANDON_REQUEST: u8 = 0x50;
pub const LDAP_TAG_EXTENDED_REQUEST: u8 = 0x77;
pub const LDAP_TAG_EXTENDED_RESPONSE: u8 = 0x78;
pub const LDAP_TAG_INTERMEDIATE_RESPONSE: u8 = 0x79;

/// Context [0] IMPLICIT SEQUENCE OF control
pub const LDAP_CONTEXT_CONTROLS: u8 = 0xA0;

/// Largest message ID allowed by RFC 4511 (maxInt).
pub const MAX_MESSAGE_ID: i32 = i32::MAX;

// LDAP Message structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapMessage {
    pub message_id: i32,
    pub protocol_op: ProtocolOp,
    /// Empty when the PDU carried no controls.
    pub controls: Vec<Control>,
}

impl LdapMessage {
    pub fn new(message_id: i32, protocol_op: ProtocolOp) -> Self {
        Self {
            message_id,
            protocol_op,
            controls: Vec::new(),
        }
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }
}

// LDAP Control (request or response)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub ctype: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOp {
    BindRequest(BindRequest),
    BindResponse(BindResponse),
    UnbindRequest,
    SearchRequest(SearchRequest),
    SearchResultEntry(SearchResultEntry),
    SearchResultDone(LdapResult),
    SearchResultReference(SearchResultReference),
    ModifyRequest(ModifyRequest),
    ModifyResponse(LdapResult),
    AddRequest(AddRequest),
    AddResponse(LdapResult),
    DelRequest(DelRequest),
    DelResponse(LdapResult),
    ModifyDNRequest(ModifyDNRequest),
    ModifyDNResponse(LdapResult),
    CompareRequest(CompareRequest),
    CompareResponse(LdapResult),
    AbandonRequest(i32),
    ExtendedRequest(ExtendedRequest),
    ExtendedResponse(ExtendedResponse),
    IntermediateResponse(IntermediateResponse),
}

impl ProtocolOp {
    /// APPLICATION tag octet of this operation.
    pub fn tag(&self) -> u8 {
        match self {
            ProtocolOp::BindRequest(_) => LDAP_TAG_BIND_REQUEST,
            ProtocolOp::BindResponse(_) => LDAP_TAG_BIND_RESPONSE,
            ProtocolOp::UnbindRequest => LDAP_TAG_UNBIND_REQUEST,
            ProtocolOp::SearchRequest(_) => LDAP_TAG_SEARCH_REQUEST,
            ProtocolOp::SearchResultEntry(_) => LDAP_TAG_SEARCH_RESULT_ENTRY,
            ProtocolOp::SearchResultDone(_) => LDAP_TAG_SEARCH_RESULT_DONE,
            ProtocolOp::SearchResultReference(_) => LDAP_TAG_SEARCH_RESULT_REFERENCE,
            ProtocolOp::ModifyRequest(_) => LDAP_TAG_MODIFY_REQUEST,
            ProtocolOp::ModifyResponse(_) => LDAP_TAG_MODIFY_RESPONSE,
            ProtocolOp::AddRequest(_) => LDAP_TAG_ADD_REQUEST,
            ProtocolOp::AddResponse(_) => LDAP_TAG_ADD_RESPONSE,
            ProtocolOp::DelRequest(_) => LDAP_TAG_DEL_REQUEST,
            ProtocolOp::DelResponse(_) => LDAP_TAG_DEL_RESPONSE,
            ProtocolOp::ModifyDNRequest(_) => LDAP_TAG_MODIFY_DN_REQUEST,
            ProtocolOp::ModifyDNResponse(_) => LDAP_TAG_MODIFY_DN_RESPONSE,
            ProtocolOp::CompareRequest(_) => LDAP_TAG_COMPARE_REQUEST,
            ProtocolOp::CompareResponse(_) => LDAP_TAG_COMPARE_RESPONSE,
            ProtocolOp::AbandonRequest(_) => LDAP_TAG_ABANDON_REQUEST,
            ProtocolOp::ExtendedRequest(_) => LDAP_TAG_EXTENDED_REQUEST,
            ProtocolOp::ExtendedResponse(_) => LDAP_TAG_EXTENDED_RESPONSE,
            ProtocolOp::IntermediateResponse(_) => LDAP_TAG_INTERMEDIATE_RESPONSE,
        }
    }

    /// Operation name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        op_name(self.tag())
    }
}

/// Operation name for an APPLICATION tag octet, "unknown" otherwise.
pub fn op_name(tag: u8) -> &'static str {
    match tag {
        LDAP_TAG_BIND_REQUEST => "bind_request",
        LDAP_TAG_BIND_RESPONSE => "bind_response",
        LDAP_TAG_UNBIND_REQUEST => "unbind_request",
        LDAP_TAG_SEARCH_REQUEST => "search_request",
        LDAP_TAG_SEARCH_RESULT_ENTRY => "search_result_entry",
        LDAP_TAG_SEARCH_RESULT_DONE => "search_result_done",
        LDAP_TAG_SEARCH_RESULT_REFERENCE => "search_result_reference",
        LDAP_TAG_MODIFY_REQUEST => "modify_request",
        LDAP_TAG_MODIFY_RESPONSE => "modify_response",
        LDAP_TAG_ADD_REQUEST => "add_request",
        LDAP_TAG_ADD_RESPONSE => "add_response",
        LDAP_TAG_DEL_REQUEST => "del_request",
        LDAP_TAG_DEL_RESPONSE => "del_response",
        LDAP_TAG_MODIFY_DN_REQUEST => "modify_dn_request",
        LDAP_TAG_MODIFY_DN_RESPONSE => "modify_dn_response",
        LDAP_TAG_COMPARE_REQUEST => "compare_request",
        LDAP_TAG_COMPARE_RESPONSE => "compare_response",
        LDAP_TAG_ABANDON_REQUEST => "abandon_request",
        LDAP_TAG_EXTENDED_REQUEST => "extended_request",
        LDAP_TAG_EXTENDED_RESPONSE => "extended_response",
        LDAP_TAG_INTERMEDIATE_RESPONSE => "intermediate_response",
        _ => "unknown",
    }
}

/// Negative response for a request tag. None for requests that get no
/// response (unbind, abandon) and for tags that are not requests.
pub fn response_for_request(request_tag: u8, result: LdapResult) -> Option<ProtocolOp> {
    let op = match request_tag {
        LDAP_TAG_BIND_REQUEST => ProtocolOp::BindResponse(BindResponse {
            result,
            server_sasl_creds: None,
        }),
        LDAP_TAG_SEARCH_REQUEST => ProtocolOp::SearchResultDone(result),
        LDAP_TAG_MODIFY_REQUEST => ProtocolOp::ModifyResponse(result),
        LDAP_TAG_ADD_REQUEST => ProtocolOp::AddResponse(result),
        LDAP_TAG_DEL_REQUEST => ProtocolOp::DelResponse(result),
        LDAP_TAG_MODIFY_DN_REQUEST => ProtocolOp::ModifyDNResponse(result),
        LDAP_TAG_COMPARE_REQUEST => ProtocolOp::CompareResponse(result),
        LDAP_TAG_EXTENDED_REQUEST => ProtocolOp::ExtendedResponse(ExtendedResponse {
            result,
            response_name: None,
            response_value: None,
        }),
        _ => return None,
    };
    Some(op)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub version: i32,
    pub name: String,
    pub authentication: BindAuthentication,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAuthentication {
    Simple(Vec<u8>),
    Sasl {
        mechanism: String,
        credentials: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindResponse {
    pub result: LdapResult,
    pub server_sasl_creds: Option<Vec<u8>>,
}

/// LDAPResult, shared by every response operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub result_code: ResultCode,
    pub matched_dn: String,
    pub diagnostic_message: String,
    /// Referral URIs; when present the list is never empty.
    pub referral: Option<Vec<String>>,
}

impl LdapResult {
    pub fn new(result_code: ResultCode, diagnostic_message: impl Into<String>) -> Self {
        Self {
            result_code,
            matched_dn: String::new(),
            diagnostic_message: diagnostic_message.into(),
            referral: None,
        }
    }

    pub fn success() -> Self {
        Self::new(ResultCode::Success, "")
    }
}

macro_rules! result_codes {
    ($($name:ident = $code:literal,)*) => {
        /// LDAP resultCode. Codes outside RFC 4511 are kept as `Unknown`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ResultCode {
            $($name,)*
            Unknown(i32),
        }

        impl ResultCode {
            pub fn code(self) -> i32 {
                match self {
                    $(ResultCode::$name => $code,)*
                    ResultCode::Unknown(code) => code,
                }
            }

            pub fn from_code(code: i32) -> Self {
                match code {
                    $($code => ResultCode::$name,)*
                    other => ResultCode::Unknown(other),
                }
            }
        }
    };
}

result_codes! {
    Success = 0,
    OperationsError = 1,
    ProtocolError = 2,
    TimeLimitExceeded = 3,
    SizeLimitExceeded = 4,
    CompareFalse = 5,
    CompareTrue = 6,
    AuthMethodNotSupported = 7,
    StrongerAuthRequired = 8,
    Referral = 10,
    AdminLimitExceeded = 11,
    UnavailableCriticalExtension = 12,
    ConfidentialityRequired = 13,
    SaslBindInProgress = 14,
    NoSuchAttribute = 16,
    UndefinedAttributeType = 17,
    InappropriateMatching = 18,
    ConstraintViolation = 19,
    AttributeOrValueExists = 20,
    InvalidAttributeSyntax = 21,
    NoSuchObject = 32,
    AliasProblem = 33,
    InvalidDnSyntax = 34,
    AliasDereferencingProblem = 36,
    InappropriateAuthentication = 48,
    InvalidCredentials = 49,
    InsufficientAccessRights = 50,
    Busy = 51,
    Unavailable = 52,
    UnwillingToPerform = 53,
    LoopDetect = 54,
    NamingViolation = 64,
    ObjectClassViolation = 65,
    NotAllowedOnNonLeaf = 66,
    NotAllowedOnRdn = 67,
    EntryAlreadyExists = 68,
    ObjectClassModsProhibited = 69,
    AffectsMultipleDsas = 71,
    Other = 80,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_object: String,
    pub scope: SearchScope,
    pub deref_aliases: DerefAliases,
    pub size_limit: u32,
    pub time_limit: u32,
    pub types_only: bool,
    pub filter: Filter,
    /// Empty means "no attributes were listed", which is not the same as `*`.
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    BaseObject = 0,
    SingleLevel = 1,
    WholeSubtree = 2,
}

impl TryFrom<i32> for SearchScope {
    type Error = i32;
    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(SearchScope::BaseObject),
            1 => Ok(SearchScope::SingleLevel),
            2 => Ok(SearchScope::WholeSubtree),
            _ => Err(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    Never = 0,
    InSearching = 1,
    FindingBaseObj = 2,
    Always = 3,
}

impl TryFrom<i32> for DerefAliases {
    type Error = i32;
    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(DerefAliases::Never),
            1 => Ok(DerefAliases::InSearching),
            2 => Ok(DerefAliases::FindingBaseObj),
            3 => Ok(DerefAliases::Always),
            _ => Err(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultEntry {
    pub object_name: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultReference {
    pub uris: Vec<String>,
}

/// PartialAttribute / Attribute: a type and its (possibly empty) value set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub attr_type: String,
    pub attr_values: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub object: String,
    pub changes: Vec<ModifyChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyChange {
    pub operation: ModifyOperation,
    pub modification: Attribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add = 0,
    Delete = 1,
    Replace = 2,
    /// RFC 4525
    Increment = 3,
}

impl TryFrom<i32> for ModifyOperation {
    type Error = i32;
    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(ModifyOperation::Add),
            1 => Ok(ModifyOperation::Delete),
            2 => Ok(ModifyOperation::Replace),
            3 => Ok(ModifyOperation::Increment),
            _ => Err(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub entry: String,
    /// Every attribute carries at least one value.
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelRequest {
    pub entry: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyDNRequest {
    pub entry: String,
    pub newrdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub entry: String,
    pub attr: String,
    pub assertion_value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub request_name: String,
    pub request_value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedResponse {
    pub result: LdapResult,
    pub response_name: Option<String>,
    pub response_value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateResponse {
    pub response_name: Option<String>,
    pub response_value: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_scope_try_from() {
        assert_eq!(SearchScope::try_from(0).unwrap(), SearchScope::BaseObject);
        assert_eq!(SearchScope::try_from(1).unwrap(), SearchScope::SingleLevel);
        assert_eq!(SearchScope::try_from(2).unwrap(), SearchScope::WholeSubtree);
        assert!(SearchScope::try_from(3).is_err());
        assert!(SearchScope::try_from(-1).is_err());
    }

    #[test]
    fn test_deref_aliases_try_from() {
        assert_eq!(DerefAliases::try_from(3).unwrap(), DerefAliases::Always);
        assert!(DerefAliases::try_from(4).is_err());
    }

    #[test]
    fn test_result_code_mapping() {
        assert_eq!(ResultCode::from_code(34), ResultCode::InvalidDnSyntax);
        assert_eq!(ResultCode::InvalidDnSyntax.code(), 34);
        assert_eq!(ResultCode::from_code(0), ResultCode::Success);
        assert_eq!(ResultCode::from_code(4096), ResultCode::Unknown(4096));
        assert_eq!(ResultCode::Unknown(4096).code(), 4096);
    }

    #[test]
    fn test_response_for_request() {
        let result = LdapResult::new(ResultCode::InvalidDnSyntax, "bad");
        assert!(matches!(
            response_for_request(LDAP_TAG_SEARCH_REQUEST, result.clone()),
            Some(ProtocolOp::SearchResultDone(_))
        ));
        assert!(matches!(
            response_for_request(LDAP_TAG_BIND_REQUEST, result.clone()),
            Some(ProtocolOp::BindResponse(_))
        ));
        assert!(response_for_request(LDAP_TAG_UNBIND_REQUEST, result.clone()).is_none());
        assert!(response_for_request(LDAP_TAG_ABANDON_REQUEST, result).is_none());
    }

    #[test]
    fn test_op_names_follow_tags() {
        assert_eq!(ProtocolOp::UnbindRequest.name(), "unbind_request");
        assert_eq!(ProtocolOp::AbandonRequest(3).tag(), LDAP_TAG_ABANDON_REQUEST);
        assert_eq!(op_name(0x7F), "unknown");
    }
}
