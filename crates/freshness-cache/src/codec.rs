//! Entry file encoding
//!
//! Layout:
//!
//! ```text
//! "FCE1" | version: u8 | envelope_len: u32 BE | envelope JSON | payload JSON
//! ```
//!
//! The fixed prefix plus the declared envelope length is all a reader needs
//! to get at the timestamp and TTL; the payload is never touched.

use crate::error::CodecError;
use crate::types::Envelope;
use serde::de::DeserializeOwned;
use serde::Serialize;

const MAGIC: &[u8; 4] = b"FCE1";
const VERSION: u8 = 1;

/// Bytes before the envelope
pub const PREFIX_LEN: usize = MAGIC.len() + 1 + 4;

/// Upper bound on envelope size, so a corrupt length can't force a huge read
pub const MAX_ENVELOPE_LEN: usize = 64 * 1024;

pub struct EntryCodec;

impl EntryCodec {
    pub fn encode<T: Serialize>(envelope: &Envelope, payload: &T) -> Result<Vec<u8>, CodecError> {
        let header = serde_json::to_vec(envelope)?;
        if header.len() > MAX_ENVELOPE_LEN {
            return Err(CodecError::EnvelopeTooLarge(header.len()));
        }
        let body = serde_json::to_vec(payload)?;

        let mut out = Vec::with_capacity(PREFIX_LEN + header.len() + body.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&(header.len() as u32).to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Validate the fixed prefix and return the envelope length it declares
    pub fn envelope_len(prefix: &[u8]) -> Result<usize, CodecError> {
        if prefix.len() < PREFIX_LEN {
            return Err(CodecError::Truncated);
        }
        if &prefix[..4] != MAGIC {
            return Err(CodecError::BadMagic);
        }
        if prefix[4] != VERSION {
            return Err(CodecError::UnsupportedVersion(prefix[4]));
        }

        let len = u32::from_be_bytes([prefix[5], prefix[6], prefix[7], prefix[8]]) as usize;
        if len > MAX_ENVELOPE_LEN {
            return Err(CodecError::EnvelopeTooLarge(len));
        }
        Ok(len)
    }

    pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
        let (envelope, _) = Self::split(bytes)?;
        Ok(envelope)
    }

    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<(Envelope, T), CodecError> {
        let (envelope, body) = Self::split(bytes)?;
        let payload = serde_json::from_slice(body)?;
        Ok((envelope, payload))
    }

    fn split(bytes: &[u8]) -> Result<(Envelope, &[u8]), CodecError> {
        let len = Self::envelope_len(bytes)?;
        let end = PREFIX_LEN + len;
        if bytes.len() < end {
            return Err(CodecError::Truncated);
        }
        let envelope = serde_json::from_slice(&bytes[PREFIX_LEN..end])?;
        Ok((envelope, &bytes[end..]))
    }
}
