//! On-disk snapshots of the element store.
//!
//! A snapshot is a `bincode` payload that starts with a fixed header: the
//! `OSMC` magic followed by a little-endian `u16` format version. The
//! dependency index is not persisted; loading rebuilds it from the stored
//! elements.

use camino::{Utf8Path, Utf8PathBuf};
use osmstage_core::{Element, ElementKind, Node, Relation, Way};
use osmstage_fs::{read_file, write_atomically};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ElementStore;

/// File identifier for element store snapshots.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"OSMC";

/// Supported snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    magic: [u8; 4],
    version: u16,
    nodes: Vec<Node>,
    ways: Vec<Way>,
    relations: Vec<Relation>,
}

/// Errors raised while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the snapshot file failed.
    #[error("failed to access element cache at {path}: {source}")]
    Io {
        /// Snapshot location.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The store could not be encoded.
    #[error("failed to encode element cache for {path}: {source}")]
    Encode {
        /// Snapshot location.
        path: Utf8PathBuf,
        /// Encoder failure from `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// The payload could not be decoded.
    #[error("failed to decode element cache from {path}: {source}")]
    Decode {
        /// Snapshot location.
        path: Utf8PathBuf,
        /// Decoder failure from `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// The file is shorter than the header.
    #[error("element cache at {path} is truncated")]
    Truncated {
        /// Snapshot location.
        path: Utf8PathBuf,
    },
    /// The file does not start with [`SNAPSHOT_MAGIC`].
    #[error("invalid element cache magic: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        /// Expected header bytes.
        expected: [u8; 4],
        /// Header bytes read from the file.
        found: [u8; 4],
    },
    /// The header names a version this build cannot read.
    #[error("unsupported element cache version {found}; supported version is {supported}")]
    UnsupportedVersion {
        /// Version in the file header.
        found: u16,
        /// Version written by this build.
        supported: u16,
    },
}

impl ElementStore {
    /// Write every element to `path`, replacing the file atomically.
    ///
    /// Elements are written in id order so that identical stores produce
    /// identical files.
    pub fn save(&self, path: &Utf8Path) -> Result<(), CacheError> {
        let payload = SnapshotFile {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            nodes: self
                .ids(ElementKind::Node)
                .into_iter()
                .filter_map(|id| self.node(id))
                .collect(),
            ways: self
                .ids(ElementKind::Way)
                .into_iter()
                .filter_map(|id| self.way(id))
                .collect(),
            relations: self
                .ids(ElementKind::Relation)
                .into_iter()
                .filter_map(|id| self.relation(id))
                .collect(),
        };
        let bytes = bincode::serialize(&payload).map_err(|source| CacheError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomically(path, &bytes).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a store written by [`ElementStore::save`].
    pub fn load(path: &Utf8Path) -> Result<Self, CacheError> {
        let bytes = read_file(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (magic, version) = read_header(&bytes).ok_or_else(|| CacheError::Truncated {
            path: path.to_path_buf(),
        })?;
        if magic != SNAPSHOT_MAGIC {
            return Err(CacheError::InvalidMagic {
                expected: SNAPSHOT_MAGIC,
                found: magic,
            });
        }
        if version != SNAPSHOT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                found: version,
                supported: SNAPSHOT_VERSION,
            });
        }

        let payload: SnapshotFile =
            bincode::deserialize(&bytes).map_err(|source| CacheError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        let store = Self::new();
        payload
            .nodes
            .into_iter()
            .map(Element::Node)
            .chain(payload.ways.into_iter().map(Element::Way))
            .chain(payload.relations.into_iter().map(Element::Relation))
            .for_each(|element| {
                store.put(element);
            });
        Ok(store)
    }
}

fn read_header(bytes: &[u8]) -> Option<([u8; 4], u16)> {
    let header = bytes.get(..HEADER_LEN)?;
    let (magic, version) = header.split_at(4);
    Some((magic.try_into().ok()?, u16::from_le_bytes(version.try_into().ok()?)))
}
