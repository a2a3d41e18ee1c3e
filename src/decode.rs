//! Producer frame decoding
//!
//! Producers send gzip-compressed UTF-8 JSON snapshots as binary frames.
//! One widely deployed agent build mislabels those compressed frames as
//! text, and a text-safe transport then re-encodes the raw bytes as UTF-16
//! code units, corrupting the stream. Text frames are therefore run through
//! a decode ladder that recovers the common corruption shapes before the
//! frame is rejected.

use std::fmt;
use std::io::Read;

use flate2::read::GzDecoder;

use crate::MonitorSnapshot;

/// Result type alias for frame decoding
pub type DecodeResult = Result<MonitorSnapshot, DecodeError>;

/// Errors produced while decoding a producer frame
///
/// None of these close the connection; the offending frame is dropped and
/// logged by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Binary frame failed decompression or JSON parsing
    Corrupt,

    /// Text frame failed every strategy in the decode ladder
    Undecodable,

    /// Frame decoded but carries no host identity
    MissingIdentity,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Corrupt => write!(f, "corrupt binary frame"),
            DecodeError::Undecodable => write!(f, "text frame undecodable by any strategy"),
            DecodeError::MissingIdentity => write!(f, "decoded frame carries no host identity"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode an authoritative binary frame: gunzip, then parse as JSON.
pub fn decode_binary(data: &[u8]) -> DecodeResult {
    let json = gunzip(data).ok_or(DecodeError::Corrupt)?;
    let snapshot =
        serde_json::from_slice::<MonitorSnapshot>(&json).map_err(|_| DecodeError::Corrupt)?;
    require_identity(snapshot)
}

/// Decode a text frame via the fallback ladder, first success wins:
///
/// 1. parse the text directly as JSON (legitimate uncompressed senders);
/// 2. truncate each UTF-16 code unit to its low byte and gunzip that
///    (recovers transport-mangled compressed frames in the Latin-1 range);
/// 3. gunzip the UTF-8 bytes of the text (low-probability fallback).
pub fn decode_text(text: &str) -> DecodeResult {
    if let Ok(snapshot) = serde_json::from_str::<MonitorSnapshot>(text) {
        return require_identity(snapshot);
    }

    let low_bytes: Vec<u8> = text.encode_utf16().map(|unit| (unit & 0xFF) as u8).collect();
    if let Some(snapshot) = gunzip_json(&low_bytes) {
        return require_identity(snapshot);
    }

    if let Some(snapshot) = gunzip_json(text.as_bytes()) {
        return require_identity(snapshot);
    }

    Err(DecodeError::Undecodable)
}

fn require_identity(snapshot: MonitorSnapshot) -> DecodeResult {
    if snapshot.name.trim().is_empty() {
        return Err(DecodeError::MissingIdentity);
    }
    Ok(snapshot)
}

fn gunzip(data: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

fn gunzip_json(data: &[u8]) -> Option<MonitorSnapshot> {
    let json = gunzip(data)?;
    serde_json::from_slice(&json).ok()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_snapshot(name: &str) -> MonitorSnapshot {
        MonitorSnapshot {
            name: name.to_string(),
            observed_at: 1_700_000_000,
            ..Default::default()
        }
    }

    fn gzip_snapshot(snapshot: &MonitorSnapshot) -> Vec<u8> {
        let json = serde_json::to_vec(snapshot).unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn binary_frame_roundtrips() {
        let snapshot = sample_snapshot("HK1");
        let frame = gzip_snapshot(&snapshot);

        assert_eq!(decode_binary(&frame).unwrap(), snapshot);
    }

    #[test]
    fn binary_garbage_is_corrupt() {
        assert_matches!(decode_binary(b"not gzip at all"), Err(DecodeError::Corrupt));
    }

    #[test]
    fn plain_json_text_decodes_directly() {
        let snapshot = sample_snapshot("HK2");
        let text = serde_json::to_string(&snapshot).unwrap();

        assert_eq!(decode_text(&text).unwrap(), snapshot);
    }

    #[test]
    fn latin1_mangled_compressed_text_is_recovered() {
        // Transport decoded the gzip bytes as Latin-1: each byte became one
        // code unit. Low-byte truncation must recover the original stream.
        let snapshot = sample_snapshot("HK10");
        let frame = gzip_snapshot(&snapshot);
        let mangled: String = frame.iter().map(|&b| b as char).collect();

        assert_eq!(decode_text(&mangled).unwrap(), snapshot);
        assert_eq!(decode_text(&mangled).unwrap(), decode_binary(&frame).unwrap());
    }

    #[test]
    fn unrecoverable_text_is_undecodable() {
        assert_matches!(decode_text("definitely not a frame"), Err(DecodeError::Undecodable));
    }

    #[test]
    fn missing_identity_is_rejected_on_every_path() {
        let snapshot = MonitorSnapshot::default();
        let frame = gzip_snapshot(&snapshot);
        let text = serde_json::to_string(&snapshot).unwrap();

        assert_matches!(decode_binary(&frame), Err(DecodeError::MissingIdentity));
        assert_matches!(decode_text(&text), Err(DecodeError::MissingIdentity));
    }
}
