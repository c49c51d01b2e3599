//! The versioned memory-snapshot artifact.
//!
//! Layout, little-endian: a 4-byte header length, a UTF-8 JSON header
//! `{version, heap_size, captured_at, engine_version?, extension_names?}`,
//! then exactly `heap_size` raw heap bytes. A reader rejects any artifact
//! whose trailing byte count differs from the declared size.
//!
//! An optional gzip envelope may wrap the whole artifact; it is detected
//! by the two magic bytes, and their absence means the payload is used
//! as-is. Snapshots are immutable, shareable artifacts — produced and
//! consumed whole, never patched in place.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use pglet_error::{PgletError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The one artifact version this runtime reads and writes.
pub const SNAPSHOT_VERSION: u32 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotHeader {
    version: u32,
    heap_size: u64,
    captured_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extension_names: Vec<String>,
}

/// A captured copy of the engine's entire addressable memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Artifact format version.
    pub version: u32,
    /// Capture time, milliseconds since the Unix epoch.
    pub captured_at: u64,
    /// Version string of the engine that produced the heap.
    pub engine_version: Option<String>,
    /// Extensions loaded when the capture was taken.
    pub extension_names: Vec<String>,
    /// The heap bytes, verbatim.
    pub heap: Vec<u8>,
}

impl Snapshot {
    /// Wrap a defensive heap copy with the current version and timestamp.
    #[must_use]
    pub fn capture(
        heap: Vec<u8>,
        engine_version: Option<String>,
        extension_names: Vec<String>,
    ) -> Self {
        let captured_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            version: SNAPSHOT_VERSION,
            captured_at,
            engine_version,
            extension_names,
            heap,
        }
    }

    /// Declared heap size in bytes.
    #[must_use]
    pub fn heap_size(&self) -> usize {
        self.heap.len()
    }

    /// Serialize to the portable artifact form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = SnapshotHeader {
            version: self.version,
            heap_size: self.heap.len() as u64,
            captured_at: self.captured_at,
            engine_version: self.engine_version.clone(),
            extension_names: self.extension_names.clone(),
        };
        let header_json = serde_json::to_vec(&header)?;
        let header_len = u32::try_from(header_json.len())
            .map_err(|_| PgletError::internal("snapshot header exceeds u32 length"))?;
        let mut out = Vec::with_capacity(4 + header_json.len() + self.heap.len());
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header_json);
        out.extend_from_slice(&self.heap);
        Ok(out)
    }

    /// Serialize inside a gzip envelope.
    pub fn encode_compressed(&self) -> Result<Vec<u8>> {
        let raw = self.encode()?;
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    }

    /// Parse an artifact, transparently unwrapping a gzip envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(&GZIP_MAGIC) {
            debug!(compressed_bytes = bytes.len(), "unwrapping gzip envelope");
            let mut decoder = GzDecoder::new(bytes);
            let mut raw = Vec::new();
            decoder.read_to_end(&mut raw)?;
            return Self::decode_raw(&raw);
        }
        Self::decode_raw(bytes)
    }

    fn decode_raw(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(PgletError::SnapshotMalformed {
                detail: format!("artifact of {} bytes has no header length", bytes.len()),
            });
        }
        let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let heap_start = 4usize.checked_add(header_len).ok_or_else(|| {
            PgletError::SnapshotMalformed {
                detail: "header length overflows".to_owned(),
            }
        })?;
        if bytes.len() < heap_start {
            return Err(PgletError::SnapshotMalformed {
                detail: format!(
                    "header declares {header_len} bytes but only {} remain",
                    bytes.len() - 4
                ),
            });
        }
        let header: SnapshotHeader = serde_json::from_slice(&bytes[4..heap_start])?;
        if header.version != SNAPSHOT_VERSION {
            return Err(PgletError::SnapshotVersionMismatch {
                found: header.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        let heap = &bytes[heap_start..];
        let expected = usize::try_from(header.heap_size).map_err(|_| {
            PgletError::SnapshotMalformed {
                detail: "heap size exceeds addressable range".to_owned(),
            }
        })?;
        if heap.len() != expected {
            return Err(PgletError::SnapshotTruncated {
                expected,
                actual: heap.len(),
            });
        }
        Ok(Self {
            version: header.version,
            captured_at: header.captured_at,
            engine_version: header.engine_version,
            extension_names: header.extension_names,
            heap: heap.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot::capture(
            vec![7u8; 512],
            Some("scripted-16.4".to_owned()),
            vec!["vector".to_owned()],
        )
    }

    #[test]
    fn encode_decode_round_trip() {
        let snap = sample();
        let decoded = Snapshot::decode(&snap.encode().expect("encode")).expect("decode");
        assert_eq!(decoded, snap);
    }

    #[test]
    fn gzip_envelope_detected_by_magic() {
        let snap = sample();
        let compressed = snap.encode_compressed().expect("encode");
        assert_eq!(&compressed[..2], &GZIP_MAGIC);
        let decoded = Snapshot::decode(&compressed).expect("decode");
        assert_eq!(decoded, snap);
    }

    #[test]
    fn trailing_byte_mismatch_rejected() {
        let snap = sample();
        let mut bytes = snap.encode().expect("encode");
        bytes.truncate(bytes.len() - 10);
        let err = Snapshot::decode(&bytes).expect_err("truncated");
        assert!(matches!(
            err,
            PgletError::SnapshotTruncated {
                expected: 512,
                actual: 502
            }
        ));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut snap = sample();
        snap.version = 42;
        let bytes = snap.encode().expect("encode");
        let err = Snapshot::decode(&bytes).expect_err("version");
        assert!(matches!(
            err,
            PgletError::SnapshotVersionMismatch {
                found: 42,
                supported: SNAPSHOT_VERSION
            }
        ));
    }

    #[test]
    fn tiny_artifact_is_malformed() {
        let err = Snapshot::decode(&[1, 2]).expect_err("too small");
        assert!(matches!(err, PgletError::SnapshotMalformed { .. }));
    }

    #[test]
    fn header_is_little_endian_length_prefixed_json() {
        let snap = sample();
        let bytes = snap.encode().expect("encode");
        let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let header: serde_json::Value =
            serde_json::from_slice(&bytes[4..4 + header_len]).expect("header json");
        assert_eq!(header["version"], 1);
        assert_eq!(header["heap_size"], 512);
        assert_eq!(header["extension_names"][0], "vector");
    }
}
