//! Checkpoint container format.
//!
//! Layout (safetensors-compatible):
//! - 0-7: header size (u64, little-endian)
//! - 8..8+N: JSON header mapping entry names to
//!   `{"dtype", "shape", "data_offsets": [begin, end]}`, plus an optional
//!   `__metadata__` string map
//! - rest: data section; offsets are relative to its start
//!
//! Entry names are dotted paths (`model.encoder.weight`). The segment before
//! the first dot is the entry's top-level key.

use crate::config::ArtifactConfig;
use crate::error::{Result, WaypointError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Reasons a file could not be decoded as a checkpoint container.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("file is {size} bytes, too short for a header length prefix")]
    MissingLengthPrefix { size: u64 },

    #[error("header length {declared} exceeds the {limit} byte limit")]
    HeaderTooLarge { declared: u64, limit: u64 },

    #[error("header length {declared} runs past end of file ({available} bytes available)")]
    TruncatedHeader { declared: u64, available: u64 },

    #[error("header is not valid JSON: {0}")]
    InvalidHeader(String),

    #[error("entry {name:?} is malformed: {message}")]
    BadEntry { name: String, message: String },

    #[error("data section is {actual} bytes but entries describe {expected}")]
    DataLengthMismatch { expected: u64, actual: u64 },

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// Location and shape of one entry in the data section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDescriptor {
    pub dtype: String,
    pub shape: Vec<u64>,
    pub data_offsets: [u64; 2],
}

/// Result of fully decoding a container.
#[derive(Debug, Clone)]
pub struct DecodedArtifact {
    /// Raw parsed header, kept so callers can check its shape.
    pub header: serde_json::Value,
    /// Entry descriptors, present when the header is a mapping.
    pub entries: BTreeMap<String, EntryDescriptor>,
    pub metadata: BTreeMap<String, String>,
    pub data_len: u64,
}

impl DecodedArtifact {
    /// Whether the header deserialized to a mapping.
    pub fn is_mapping(&self) -> bool {
        self.header.is_object()
    }

    /// Distinct top-level keys across all entries.
    pub fn top_level_keys(&self) -> BTreeSet<String> {
        top_level_keys(self.entries.keys().map(String::as_str))
    }
}

/// Collapse dotted entry names to their first segment.
pub fn top_level_keys<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    names
        .into_iter()
        .map(|name| name.split('.').next().unwrap_or(name).to_string())
        .collect()
}

/// Decode the container at `path`, reading the whole data section.
///
/// Reading every byte surfaces short reads and media errors that a header
/// check alone would miss.
pub fn decode(path: &Path) -> std::result::Result<DecodedArtifact, FormatError> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    if file_size < 8 {
        return Err(FormatError::MissingLengthPrefix { size: file_size });
    }

    let mut size_buf = [0u8; 8];
    file.read_exact(&mut size_buf)?;
    let header_len = u64::from_le_bytes(size_buf);

    if header_len > ArtifactConfig::MAX_HEADER_BYTES {
        return Err(FormatError::HeaderTooLarge {
            declared: header_len,
            limit: ArtifactConfig::MAX_HEADER_BYTES,
        });
    }
    if header_len > file_size - 8 {
        return Err(FormatError::TruncatedHeader {
            declared: header_len,
            available: file_size - 8,
        });
    }

    let mut header_buf = vec![0u8; header_len as usize];
    file.read_exact(&mut header_buf)?;
    let header: serde_json::Value = serde_json::from_slice(&header_buf)
        .map_err(|e| FormatError::InvalidHeader(e.to_string()))?;

    let data_len = file_size - 8 - header_len;
    let (entries, metadata) = match header.as_object() {
        Some(map) => parse_entries(map, data_len)?,
        None => (BTreeMap::new(), BTreeMap::new()),
    };

    let drained = io::copy(&mut file, &mut io::sink())?;
    if drained != data_len {
        return Err(FormatError::DataLengthMismatch {
            expected: data_len,
            actual: drained,
        });
    }

    Ok(DecodedArtifact {
        header,
        entries,
        metadata,
        data_len,
    })
}

type ParsedEntries = (BTreeMap<String, EntryDescriptor>, BTreeMap<String, String>);

fn parse_entries(
    map: &serde_json::Map<String, serde_json::Value>,
    data_len: u64,
) -> std::result::Result<ParsedEntries, FormatError> {
    let mut entries = BTreeMap::new();
    let mut metadata = BTreeMap::new();
    let mut described_end = 0u64;

    for (name, value) in map {
        if name == ArtifactConfig::HEADER_METADATA_KEY {
            metadata = serde_json::from_value(value.clone()).map_err(|e| FormatError::BadEntry {
                name: name.clone(),
                message: e.to_string(),
            })?;
            continue;
        }

        let descriptor: EntryDescriptor =
            serde_json::from_value(value.clone()).map_err(|e| FormatError::BadEntry {
                name: name.clone(),
                message: e.to_string(),
            })?;

        let [begin, end] = descriptor.data_offsets;
        if begin > end {
            return Err(FormatError::BadEntry {
                name: name.clone(),
                message: format!("offsets [{}, {}] are reversed", begin, end),
            });
        }
        if end > data_len {
            return Err(FormatError::DataLengthMismatch {
                expected: end,
                actual: data_len,
            });
        }
        described_end = described_end.max(end);
        entries.insert(name.clone(), descriptor);
    }

    if described_end != data_len {
        return Err(FormatError::DataLengthMismatch {
            expected: described_end,
            actual: data_len,
        });
    }

    Ok((entries, metadata))
}

/// One entry to be written into a container.
#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub name: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub data: Vec<u8>,
}

impl ArtifactEntry {
    /// Raw byte entry with a flat shape.
    pub fn bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            dtype: "U8".to_string(),
            shape: vec![data.len() as u64],
            data,
        }
    }
}

/// Encode entries into a container at `path`.
///
/// The header is space-padded to an 8-byte boundary so the data section is
/// aligned. Returns the total number of bytes written.
pub fn write_artifact(
    path: &Path,
    entries: &[ArtifactEntry],
    metadata: &BTreeMap<String, String>,
) -> Result<u64> {
    let mut header = serde_json::Map::new();
    let mut offset = 0u64;

    for entry in entries {
        if entry.name == ArtifactConfig::HEADER_METADATA_KEY {
            return Err(WaypointError::Encoding {
                message: format!("entry name {} is reserved", entry.name),
            });
        }
        let end = offset + entry.data.len() as u64;
        let descriptor = EntryDescriptor {
            dtype: entry.dtype.clone(),
            shape: entry.shape.clone(),
            data_offsets: [offset, end],
        };
        if header
            .insert(entry.name.clone(), serde_json::to_value(descriptor)?)
            .is_some()
        {
            return Err(WaypointError::Encoding {
                message: format!("duplicate entry name {}", entry.name),
            });
        }
        offset = end;
    }

    if !metadata.is_empty() {
        header.insert(
            ArtifactConfig::HEADER_METADATA_KEY.to_string(),
            serde_json::to_value(metadata)?,
        );
    }

    let mut header_bytes = serde_json::to_vec(&serde_json::Value::Object(header))?;
    while header_bytes.len() % 8 != 0 {
        header_bytes.push(b' ');
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| WaypointError::io_with_path(e, path))?;
    let mut writer = BufWriter::new(file);

    let io_err = |e| WaypointError::io_with_path(e, path);
    writer
        .write_all(&(header_bytes.len() as u64).to_le_bytes())
        .map_err(io_err)?;
    writer.write_all(&header_bytes).map_err(io_err)?;
    for entry in entries {
        writer.write_all(&entry.data).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;

    Ok(8 + header_bytes.len() as u64 + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_entries() -> Vec<ArtifactEntry> {
        vec![
            ArtifactEntry {
                name: "model.encoder.weight".to_string(),
                dtype: "F32".to_string(),
                shape: vec![2, 2],
                data: vec![0u8; 16],
            },
            ArtifactEntry::bytes("model.decoder.bias", vec![1u8; 8]),
            ArtifactEntry::bytes("vocab", b"a b c".to_vec()),
            ArtifactEntry::bytes("optimizer.state", vec![7u8; 32]),
        ]
    }

    #[test]
    fn test_write_then_decode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model_last");
        let mut metadata = BTreeMap::new();
        metadata.insert("epoch".to_string(), "12".to_string());

        let written = write_artifact(&path, &sample_entries(), &metadata).unwrap();
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());

        let decoded = decode(&path).unwrap();
        assert!(decoded.is_mapping());
        assert_eq!(decoded.entries.len(), 4);
        assert_eq!(decoded.data_len, 16 + 8 + 5 + 32);
        assert_eq!(decoded.metadata.get("epoch").map(String::as_str), Some("12"));

        let keys: Vec<_> = decoded.top_level_keys().into_iter().collect();
        assert_eq!(keys, vec!["model", "optimizer", "vocab"]);
    }

    #[test]
    fn test_header_is_aligned() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("aligned");
        write_artifact(&path, &sample_entries(), &BTreeMap::new()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header_len = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        assert_eq!(header_len % 8, 0);
    }

    #[test]
    fn test_truncated_data_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("truncated");
        let written = write_artifact(&path, &sample_entries(), &BTreeMap::new()).unwrap();

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(written - 4).unwrap();

        assert!(matches!(
            decode(&path),
            Err(FormatError::DataLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("padded");
        write_artifact(&path, &sample_entries(), &BTreeMap::new()).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"garbage").unwrap();

        assert!(matches!(
            decode(&path),
            Err(FormatError::DataLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_short_and_random_files() {
        let temp = TempDir::new().unwrap();

        let short = temp.path().join("short");
        std::fs::write(&short, b"abc").unwrap();
        assert!(matches!(
            decode(&short),
            Err(FormatError::MissingLengthPrefix { size: 3 })
        ));

        let random = temp.path().join("random");
        std::fs::write(&random, [0xffu8; 64]).unwrap();
        assert!(matches!(
            decode(&random),
            Err(FormatError::HeaderTooLarge { .. })
        ));

        let lying = temp.path().join("lying");
        let mut bytes = 40u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        std::fs::write(&lying, bytes).unwrap();
        assert!(matches!(
            decode(&lying),
            Err(FormatError::TruncatedHeader { declared: 40, .. })
        ));
    }

    #[test]
    fn test_non_mapping_header_decodes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("list");
        let header = b"[1,2,3]";
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header);
        std::fs::write(&path, bytes).unwrap();

        let decoded = decode(&path).unwrap();
        assert!(!decoded.is_mapping());
        assert!(decoded.entries.is_empty());
    }

    #[test]
    fn test_reserved_and_duplicate_names() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad");

        let reserved = vec![ArtifactEntry::bytes("__metadata__", vec![0])];
        assert!(write_artifact(&path, &reserved, &BTreeMap::new()).is_err());

        let duplicate = vec![
            ArtifactEntry::bytes("model", vec![0]),
            ArtifactEntry::bytes("model", vec![1]),
        ];
        assert!(write_artifact(&path, &duplicate, &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_top_level_keys() {
        let keys = top_level_keys(["model.a", "model.b.c", "vocab", "config.json"]);
        assert_eq!(keys.len(), 3);
        assert!(keys.contains("config"));
    }
}
