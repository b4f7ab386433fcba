//! Grammar nodes driven by [`LdapDecoder`](crate::decoder::LdapDecoder).
//!
//! Every constructed TLV the decoder enters gets one node. The decoder owns
//! the byte budget of each node; a node only sees the TLVs directly inside
//! it:
//!
//! * `open` is called for a constructed child and returns the child's node,
//! * `primitive` is called for a primitive child once its value is buffered,
//! * `accept` receives the finished value of a child opened earlier,
//! * `finish` runs when the node's byte budget is used up.
//!
//! A node holds only the partially built value, so suspending between
//! `feed` calls keeps the whole parse position in the decoder's stack.

pub(crate) mod envelope;
pub(crate) mod filter;
pub(crate) mod ops;

use crate::config::CodecConfig;
use crate::error::DecoderError;
use crate::filter::{AttributeValueAssertion, Filter};
use crate::message::{Attribute, BindAuthentication, Control, LdapMessage, ModifyChange, ProtocolOp};
use crate::tlv::Tag;

/// Value produced by a finished node, handed to its parent.
#[derive(Debug)]
pub(crate) enum Built {
    Message(LdapMessage),
    Op(ProtocolOp),
    Filter(Filter),
    SubstringParts {
        initial: Option<Vec<u8>>,
        any: Vec<Vec<u8>>,
        r#final: Option<Vec<u8>>,
    },
    Ava(AttributeValueAssertion),
    Auth(BindAuthentication),
    Strings(Vec<String>),
    Values(Vec<Vec<u8>>),
    Attribute(Attribute),
    Attributes(Vec<Attribute>),
    Change(ModifyChange),
    Changes(Vec<ModifyChange>),
    Control(Control),
    Controls(Vec<Control>),
}

impl Built {
    fn kind(&self) -> &'static str {
        match self {
            Built::Message(_) => "message",
            Built::Op(_) => "protocol op",
            Built::Filter(_) => "filter",
            Built::SubstringParts { .. } => "substrings",
            Built::Ava(_) => "attribute value assertion",
            Built::Auth(_) => "authentication",
            Built::Strings(_) => "string list",
            Built::Values(_) => "value set",
            Built::Attribute(_) => "attribute",
            Built::Attributes(_) => "attribute list",
            Built::Change(_) => "change",
            Built::Changes(_) => "change list",
            Built::Control(_) => "control",
            Built::Controls(_) => "controls",
        }
    }
}

pub(crate) trait GrammarNode {
    /// Production name, used as the context of tag errors.
    fn name(&self) -> &'static str;

    fn open(&mut self, tag: Tag, _config: &CodecConfig) -> Result<Node, DecoderError> {
        Err(DecoderError::unexpected(tag.octet(), self.name()))
    }

    fn primitive(&mut self, tag: Tag, _value: &[u8], _config: &CodecConfig) -> Result<(), DecoderError> {
        Err(DecoderError::unexpected(tag.octet(), self.name()))
    }

    fn accept(&mut self, built: Built, _config: &CodecConfig) -> Result<(), DecoderError> {
        Err(mismatch(self.name(), &built))
    }

    fn finish(self, config: &CodecConfig) -> Result<Built, DecoderError>;
}

pub(crate) fn mismatch(name: &str, built: &Built) -> DecoderError {
    DecoderError::invalid(format!("{} cannot hold a {}", name, built.kind()))
}

macro_rules! grammar_nodes {
    ($($variant:ident($ty:ty),)*) => {
        /// Closed set of grammar nodes; dispatch is a plain match.
        pub(crate) enum Node {
            $($variant($ty),)*
        }

        impl Node {
            pub(crate) fn name(&self) -> &'static str {
                match self {
                    $(Node::$variant(node) => node.name(),)*
                }
            }

            pub(crate) fn open(&mut self, tag: Tag, config: &CodecConfig) -> Result<Node, DecoderError> {
                match self {
                    $(Node::$variant(node) => node.open(tag, config),)*
                }
            }

            pub(crate) fn primitive(&mut self, tag: Tag, value: &[u8], config: &CodecConfig) -> Result<(), DecoderError> {
                match self {
                    $(Node::$variant(node) => node.primitive(tag, value, config),)*
                }
            }

            pub(crate) fn accept(&mut self, built: Built, config: &CodecConfig) -> Result<(), DecoderError> {
                match self {
                    $(Node::$variant(node) => node.accept(built, config),)*
                }
            }

            pub(crate) fn finish(self, config: &CodecConfig) -> Result<Built, DecoderError> {
                match self {
                    $(Node::$variant(node) => node.finish(config),)*
                }
            }
        }

        $(
            impl From<$ty> for Node {
                fn from(node: $ty) -> Node {
                    Node::$variant(node)
                }
            }
        )*
    };
}

grammar_nodes! {
    Envelope(envelope::Envelope),
    Controls(envelope::ControlsNode),
    Control(envelope::ControlNode),
    BindRequest(ops::BindRequestNode),
    Sasl(ops::SaslNode),
    Result(ops::ResultNode),
    SearchRequest(ops::SearchRequestNode),
    SearchResultEntry(ops::SearchResultEntryNode),
    StringList(ops::StringListNode),
    AttributeList(ops::AttributeListNode),
    Attribute(ops::AttributeNode),
    ValueSet(ops::ValueSetNode),
    ModifyRequest(ops::ModifyRequestNode),
    ChangeList(ops::ChangeListNode),
    Change(ops::ChangeNode),
    AddRequest(ops::AddRequestNode),
    ModifyDNRequest(ops::ModifyDNRequestNode),
    CompareRequest(ops::CompareRequestNode),
    ExtendedRequest(ops::ExtendedRequestNode),
    IntermediateResponse(ops::IntermediateResponseNode),
    Ava(filter::AvaNode),
    CompositeFilter(filter::CompositeFilterNode),
    SubstringsFilter(filter::SubstringsFilterNode),
    SubstringSeq(filter::SubstringSeqNode),
    ExtensibleFilter(filter::ExtensibleFilterNode),
}

/// Node for the outer LDAPMessage SEQUENCE.
pub(crate) fn envelope() -> Node {
    Node::Envelope(envelope::Envelope::new())
}

/// LDAPString / LDAPDN / LDAPOID field values.
pub(crate) fn string(value: &[u8], what: &str) -> Result<String, DecoderError> {
    crate::tlv::parse_string(value, what)
}

/// A positive INTEGER (0..=maxInt), as used for limits and message IDs.
pub(crate) fn non_negative(value: &[u8], what: &str) -> Result<i32, DecoderError> {
    let n = crate::tlv::parse_i32(value)?;
    if n < 0 {
        return Err(DecoderError::invalid(format!("{} {} is negative", what, n)));
    }
    Ok(n)
}
