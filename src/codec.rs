//! `tokio_util` codec over [`LdapDecoder`] and the two-phase encoder, for use
//! with `Framed`, `FramedRead` and `FramedWrite`.

use crate::config::CodecConfig;
use crate::decoder::{DecodeStatus, LdapDecoder};
use crate::encoder::LengthPlan;
use crate::error::DecoderError;
use crate::message::LdapMessage;
use crate::metrics::CodecMetrics;
use bytes::BytesMut;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Decode(#[from] DecoderError),
    /// The stream ended inside a PDU.
    #[error("stream ended with {0} bytes of an incomplete LDAP message")]
    Truncated(usize),
}

impl CodecError {
    pub fn decoder_error(&self) -> Option<&DecoderError> {
        match self {
            CodecError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

pub struct LdapCodec {
    decoder: LdapDecoder,
    metrics: Arc<CodecMetrics>,
}

impl Default for LdapCodec {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl LdapCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self::with_metrics(config, Arc::new(CodecMetrics::new()))
    }

    pub fn with_metrics(config: CodecConfig, metrics: Arc<CodecMetrics>) -> Self {
        Self {
            decoder: LdapDecoder::new(config),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<CodecMetrics> {
        &self.metrics
    }

    /// The decoder stays failed until reset; see [`LdapDecoder::feed`].
    pub fn is_failed(&self) -> bool {
        self.decoder.is_failed()
    }

    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    fn encode_message(&mut self, item: &LdapMessage, dst: &mut BytesMut) {
        let plan = LengthPlan::new(item);
        plan.write(item, dst);
        self.metrics.inc_encoded(plan.total());
        trace!(message_id = item.message_id, op = item.protocol_op.name(), bytes = plan.total(), "encoded");
    }
}

impl Decoder for LdapCodec {
    type Item = LdapMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // The decoder keeps its own buffer, so everything in `src` moves over.
        let data = src.split();
        self.metrics.add_bytes_fed(data.len());
        match self.decoder.feed(&data) {
            Ok(DecodeStatus::Message(message)) => {
                self.metrics.inc_decoded(message.protocol_op.name());
                Ok(Some(message))
            }
            Ok(DecodeStatus::Suspended) => Ok(None),
            Err(err) => {
                self.metrics.inc_error(err.kind());
                Err(err.into())
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if self.decoder.is_idle() {
            return Ok(None);
        }
        let buffered = self.decoder.buffered();
        self.decoder.reset();
        Err(CodecError::Truncated(buffered))
    }
}

impl Encoder<LdapMessage> for LdapCodec {
    type Error = CodecError;

    fn encode(&mut self, item: LdapMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_message(&item, dst);
        Ok(())
    }
}

impl<'a> Encoder<&'a LdapMessage> for LdapCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &'a LdapMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_message(item, dst);
        Ok(())
    }
}
