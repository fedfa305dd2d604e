//! Connection preamble: the JSON `Options` handshake sent once by the
//! client immediately after opening a connection, before any framed
//! request.
//!
//! Mirrors `option.Options` (`CodecType`, `ConnectTimeout`,
//! `HandleTimeout`), with `CodecType`
//! narrowed to [`SerializerKind`] since the compressor is negotiated
//! per-message via the header's `CompressType` field instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serialize::SerializerKind;

/// Handshake sent by the client right after connecting, before the first
/// framed request. The server reads exactly one JSON value terminated by a
/// newline, then switches to frame-oriented reads for the rest of the
/// connection's lifetime.
///
/// Wire shape: `{"CodecType": <int>, "ConnectTimeout": <nanoseconds>,
/// "HandleTimeout": <nanoseconds>}`, matching `option.Options` field-for-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Serializer the client will use for every body on this connection.
    #[serde(rename = "CodecType")]
    pub codec_type: SerializerKind,

    /// Deadline for completing this handshake. `None` means no limit.
    #[serde(rename = "ConnectTimeout", with = "duration_nanos_opt")]
    pub connect_timeout: Option<Duration>,

    /// Advisory per-call deadline the server should apply when dispatching
    /// requests on this connection. `None` means no limit.
    #[serde(rename = "HandleTimeout", with = "duration_nanos_opt")]
    pub handle_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            codec_type: SerializerKind::Json,
            connect_timeout: Some(Duration::from_secs(3)),
            handle_timeout: Some(Duration::from_secs(3)),
        }
    }
}

impl Options {
    /// Serialize as a single line of JSON, newline-terminated, ready to
    /// write to the connection.
    pub fn to_line(&self) -> crate::error::Result<Vec<u8>> {
        let mut buf = serde_json::to_vec(self).map_err(|e| crate::error::Error::Protocol(e.to_string()))?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Parse a single line of JSON (without the trailing newline) into
    /// `Options`.
    pub fn from_line(line: &[u8]) -> crate::error::Result<Self> {
        serde_json::from_slice(line).map_err(|e| crate::error::Error::Protocol(e.to_string()))
    }
}

mod duration_nanos_opt {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_nanos() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let nanos: Option<u64> = Option::deserialize(d)?;
        Ok(nanos.map(Duration::from_nanos))
    }
}
