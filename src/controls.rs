//! Typed values for commonly used LDAP controls.
//!
//! On the wire a [`Control`] value is an opaque OCTET STRING; the types here
//! decode and encode the BER carried inside it.

use crate::encoder::{to_vec, BerEncode, BerSink};
use crate::error::DecoderError;
use crate::message::Control;
use crate::tlv::{BerReader, TAG_BOOLEAN, TAG_ENUMERATED, TAG_INTEGER, TAG_OCTET_STRING, TAG_SEQUENCE};

/// RFC 4533 Sync Request Control OID
pub const SYNC_REQUEST_OID: &str = "1.3.6.1.4.1.4203.1.9.1.1";
/// RFC 2696 Simple Paged Results
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";
pub const PERSISTENT_SEARCH_OID: &str = "2.16.840.1.113730.3.4.3";
/// RFC 3672
pub const SUBENTRIES_OID: &str = "1.3.6.1.4.1.4203.1.10.1";
/// RFC 3296, carries no value
pub const MANAGE_DSA_IT_OID: &str = "2.16.840.1.113730.3.4.2";

/// A control whose value has a known BER layout.
pub trait ControlValue: Sized {
    const OID: &'static str;

    fn decode(value: &[u8]) -> Result<Self, DecoderError>;

    fn encode(&self) -> Vec<u8>;

    /// Wrap into a [`Control`] ready to attach to a message.
    fn to_control(&self, critical: bool) -> Control {
        Control {
            ctype: Self::OID.to_string(),
            critical,
            value: Some(self.encode()),
        }
    }
}

/// Sync Request mode (RFC 4533 section 2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    RefreshOnly = 1,
    RefreshAndPersist = 3,
}

/// Parsed Sync Request control value (RFC 4533)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequestControl {
    pub mode: SyncMode,
    pub cookie: Option<Vec<u8>>,
    pub reload_hint: bool,
}

impl SyncRequestControl {
    pub fn is_refresh_and_persist(&self) -> bool {
        self.mode == SyncMode::RefreshAndPersist
    }
}

impl BerEncode for SyncRequestControl {
    fn encode_ber<S: BerSink>(&self, s: &mut S) {
        s.constructed(TAG_SEQUENCE, |s| {
            s.integer(TAG_ENUMERATED, self.mode as i64);
            if let Some(cookie) = &self.cookie {
                s.primitive(TAG_OCTET_STRING, cookie);
            }
            if self.reload_hint {
                s.boolean(TAG_BOOLEAN, true);
            }
        });
    }
}

impl ControlValue for SyncRequestControl {
    const OID: &'static str = SYNC_REQUEST_OID;

    /// `SEQUENCE { mode ENUMERATED, cookie OCTET STRING OPTIONAL, reloadHint BOOLEAN DEFAULT FALSE }`
    fn decode(value: &[u8]) -> Result<Self, DecoderError> {
        let mut seq = BerReader::new(value).read_sequence("syncRequestValue")?;
        let mode = match seq.read_enumerated("sync mode")? {
            1 => SyncMode::RefreshOnly,
            3 => SyncMode::RefreshAndPersist,
            other => return Err(DecoderError::invalid(format!("sync request mode {}", other))),
        };
        let mut cookie = None;
        let mut reload_hint = false;
        if seq.peek_tag() == Some(TAG_OCTET_STRING) {
            cookie = Some(seq.read_octet_string("sync cookie")?);
        }
        if seq.peek_tag() == Some(TAG_BOOLEAN) {
            reload_hint = seq.read_boolean("reloadHint")?;
        }
        seq.finish("syncRequestValue")?;
        Ok(Self {
            mode,
            cookie,
            reload_hint,
        })
    }

    fn encode(&self) -> Vec<u8> {
        to_vec(self)
    }
}

/// `realSearchControlValue ::= SEQUENCE { size INTEGER, cookie OCTET STRING }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResultsControl {
    pub size: i32,
    pub cookie: Vec<u8>,
}

impl BerEncode for PagedResultsControl {
    fn encode_ber<S: BerSink>(&self, s: &mut S) {
        s.constructed(TAG_SEQUENCE, |s| {
            s.integer(TAG_INTEGER, self.size as i64);
            s.primitive(TAG_OCTET_STRING, &self.cookie);
        });
    }
}

impl ControlValue for PagedResultsControl {
    const OID: &'static str = PAGED_RESULTS_OID;

    fn decode(value: &[u8]) -> Result<Self, DecoderError> {
        let mut seq = BerReader::new(value).read_sequence("pagedResults")?;
        let size = seq.read_integer("page size")?;
        let cookie = seq.read_octet_string("paged cookie")?;
        seq.finish("pagedResults")?;
        Ok(Self { size, cookie })
    }

    fn encode(&self) -> Vec<u8> {
        to_vec(self)
    }
}

/// Persistent search change types, OR-ed into `change_types`.
pub mod change_type {
    pub const ADD: i32 = 1;
    pub const DELETE: i32 = 2;
    pub const MODIFY: i32 = 4;
    pub const MODDN: i32 = 8;
    pub const ALL: i32 = ADD | DELETE | MODIFY | MODDN;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentSearchControl {
    pub change_types: i32,
    pub changes_only: bool,
    pub return_ecs: bool,
}

impl BerEncode for PersistentSearchControl {
    fn encode_ber<S: BerSink>(&self, s: &mut S) {
        s.constructed(TAG_SEQUENCE, |s| {
            s.integer(TAG_INTEGER, self.change_types as i64);
            s.boolean(TAG_BOOLEAN, self.changes_only);
            s.boolean(TAG_BOOLEAN, self.return_ecs);
        });
    }
}

impl ControlValue for PersistentSearchControl {
    const OID: &'static str = PERSISTENT_SEARCH_OID;

    fn decode(value: &[u8]) -> Result<Self, DecoderError> {
        let mut seq = BerReader::new(value).read_sequence("persistentSearch")?;
        let change_types = seq.read_integer("changeTypes")?;
        if !(1..=change_type::ALL).contains(&change_types) {
            return Err(DecoderError::invalid(format!("changeTypes {} out of range", change_types)));
        }
        let changes_only = seq.read_boolean("changesOnly")?;
        let return_ecs = seq.read_boolean("returnECs")?;
        seq.finish("persistentSearch")?;
        Ok(Self {
            change_types,
            changes_only,
            return_ecs,
        })
    }

    fn encode(&self) -> Vec<u8> {
        to_vec(self)
    }
}

/// The value is a bare BOOLEAN: TRUE shows only subentries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubentriesControl {
    pub visibility: bool,
}

impl BerEncode for SubentriesControl {
    fn encode_ber<S: BerSink>(&self, s: &mut S) {
        s.boolean(TAG_BOOLEAN, self.visibility);
    }
}

impl ControlValue for SubentriesControl {
    const OID: &'static str = SUBENTRIES_OID;

    fn decode(value: &[u8]) -> Result<Self, DecoderError> {
        let mut reader = BerReader::new(value);
        let visibility = reader.read_boolean("subentries visibility")?;
        reader.finish("subentries")?;
        Ok(Self { visibility })
    }

    fn encode(&self) -> Vec<u8> {
        to_vec(self)
    }
}

pub fn manage_dsa_it(critical: bool) -> Control {
    Control {
        ctype: MANAGE_DSA_IT_OID.to_string(),
        critical,
        value: None,
    }
}

pub fn find_control<'a>(controls: &'a [Control], oid: &str) -> Option<&'a Control> {
    controls.iter().find(|c| c.ctype == oid)
}

/// Find a control of type `T` and decode its value. `Ok(None)` if absent;
/// a present control without a value is an error.
pub fn get_control<T: ControlValue>(controls: &[Control]) -> Result<Option<T>, DecoderError> {
    let Some(control) = find_control(controls, T::OID) else {
        return Ok(None);
    };
    let value = control
        .value
        .as_deref()
        .ok_or_else(|| DecoderError::invalid(format!("control {} without value", T::OID)))?;
    T::decode(value).map(Some)
}

pub fn get_sync_request_control(controls: &[Control]) -> Result<Option<SyncRequestControl>, DecoderError> {
    get_control(controls)
}

pub fn get_paged_results_control(controls: &[Control]) -> Result<Option<PagedResultsControl>, DecoderError> {
    get_control(controls)
}

pub fn get_persistent_search_control(controls: &[Control]) -> Result<Option<PersistentSearchControl>, DecoderError> {
    get_control(controls)
}

pub fn get_subentries_control(controls: &[Control]) -> Result<Option<SubentriesControl>, DecoderError> {
    get_control(controls)
}

pub fn has_manage_dsa_it(controls: &[Control]) -> bool {
    find_control(controls, MANAGE_DSA_IT_OID).is_some()
}
