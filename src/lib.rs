pub mod codec;
pub mod config;
pub mod controls;
pub mod decoder;
pub mod dn;
pub mod encoder;
pub mod error;
pub mod filter;
mod grammar;
pub mod interop;
pub mod ldap_url;
pub mod message;
pub mod metrics;
pub mod tlv;

pub use codec::{CodecError, LdapCodec};
pub use config::CodecConfig;
pub use decoder::{decode_message, decode_message_with, DecodeStatus, LdapDecoder};
pub use encoder::{compute_length, encode, encode_filter, encode_into};
pub use error::{DecoderError, ResponseCarryingError};
pub use filter::Filter;
pub use ldap_url::LdapUrl;
pub use message::{Control, LdapMessage, LdapResult, ProtocolOp, ResultCode};
pub use metrics::CodecMetrics;
