//! Native `.bgrd` container format.
//!
//! A container is a fixed 32-byte header followed by the encoded root
//! [`Group`](super::Group). Payloads are Postcard unless a JSON dump was
//! asked for; the header records which, so any codec can read any file.
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | magic `BGRD`                            |
//! | 4      | 1    | format version                          |
//! | 5      | 1    | [`ObjectTag`] of the root               |
//! | 6      | 1    | [`Encoding`] of the payload             |
//! | 8      | 4    | payload length                          |
//! | 12     | 4    | CRC32 of the payload                    |
//! | 16     | 4    | number of children of the root group    |
//!
//! Integers are little-endian and unlisted bytes are zero.

use thiserror::Error;

use super::schema::SchemaError;
use crate::distribution::DistributionError;
use crate::histogram::HistogramError;

pub const MAGIC: &[u8; 4] = b"BGRD";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 32;

// ============================================================================
// Object Tag
// ============================================================================

/// Kind of object stored at the root of a container.
///
/// The same names appear as the `repr` attribute of the group holding the
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectTag {
    /// A plain group of named objects.
    Group = 0,
    Histogram1D = 1,
    Normal = 2,
    LogNormal = 3,
}

impl ObjectTag {
    const ALL: [ObjectTag; 4] = [Self::Group, Self::Histogram1D, Self::Normal, Self::LogNormal];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| *tag as u8 == value)
    }

    /// Value of the `repr` attribute for this object.
    pub fn repr(self) -> &'static str {
        match self {
            Self::Group => "Group",
            Self::Histogram1D => "Histogram1D",
            Self::Normal => "Normal",
            Self::LogNormal => "LogNormal",
        }
    }

    /// Parse a `repr` attribute.
    pub fn from_repr(repr: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.repr() == repr)
    }
}

/// Payload encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    #[default]
    Postcard = 0,
    Json = 1,
}

impl Encoding {
    fn from_u8(value: u8) -> Result<Self, DeserializeError> {
        match value {
            0 => Ok(Self::Postcard),
            1 => Ok(Self::Json),
            other => Err(DeserializeError::UnknownEncoding(other)),
        }
    }
}

// ============================================================================
// Header
// ============================================================================

/// Decoded container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub tag: ObjectTag,
    pub encoding: Encoding,
    pub payload_len: u32,
    pub checksum: u32,
    pub n_children: u32,
}

impl ContainerHeader {
    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = FORMAT_VERSION;
        buf[5] = self.tag as u8;
        buf[6] = self.encoding as u8;
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        buf[16..20].copy_from_slice(&self.n_children.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, DeserializeError> {
        if &buf[0..4] != MAGIC {
            return Err(DeserializeError::NotAContainer);
        }
        if buf[4] > FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(buf[4]));
        }
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Ok(Self {
            tag: ObjectTag::from_u8(buf[5]).ok_or(DeserializeError::UnknownTag(buf[5]))?,
            encoding: Encoding::from_u8(buf[6])?,
            payload_len: word(8),
            checksum: word(12),
            n_children: word(16),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("postcard encoding failed: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} exceeds the u32 range of the header")]
    TooLarge(usize),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a bayesgrid container")]
    NotAContainer,

    #[error("container format version {0} is newer than this reader")]
    UnsupportedVersion(u8),

    #[error("unknown object tag {0}")]
    UnknownTag(u8),

    #[error("unknown payload encoding {0}")]
    UnknownEncoding(u8),

    #[error("container truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("checksum mismatch: header {expected:#010x}, payload {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("postcard decoding failed: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("JSON decoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("group has no 'repr' attribute")]
    MissingRepr,

    #[error("unknown object type '{0}'")]
    UnknownObject(String),

    #[error("expected a {expected:?}, found a {actual:?}")]
    TypeMismatch { expected: ObjectTag, actual: ObjectTag },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Histogram(#[from] HistogramError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

// ============================================================================
// Codec
// ============================================================================

/// Encodes values into containers and decodes them back.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCodec {
    pub encoding: Encoding,
}

impl NativeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec writing JSON payloads.
    pub fn json() -> Self {
        Self {
            encoding: Encoding::Json,
        }
    }

    pub fn serialize<T: serde::Serialize>(
        &self,
        tag: ObjectTag,
        n_children: u32,
        value: &T,
    ) -> Result<Vec<u8>, SerializeError> {
        let payload = match self.encoding {
            Encoding::Postcard => postcard::to_allocvec(value)?,
            Encoding::Json => serde_json::to_vec(value)?,
        };
        let header = ContainerHeader {
            tag,
            encoding: self.encoding,
            payload_len: u32::try_from(payload.len()).map_err(|_| SerializeError::TooLarge(payload.len()))?,
            checksum: crc32fast::hash(&payload),
            n_children,
        };

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode a container.
    ///
    /// The payload encoding comes from the header, not from `self`.
    pub fn deserialize<T: serde::de::DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<(ContainerHeader, T), DeserializeError> {
        let header = bytes
            .get(..HEADER_SIZE)
            .and_then(|h| <&[u8; HEADER_SIZE]>::try_from(h).ok())
            .ok_or(DeserializeError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            })?;
        let header = ContainerHeader::from_bytes(header)?;

        let end = (header.payload_len as usize)
            .checked_add(HEADER_SIZE)
            .unwrap_or(usize::MAX);
        let payload = bytes.get(HEADER_SIZE..end).ok_or(DeserializeError::Truncated {
            expected: end,
            actual: bytes.len(),
        })?;

        let actual = crc32fast::hash(payload);
        if actual != header.checksum {
            return Err(DeserializeError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        let value = match header.encoding {
            Encoding::Postcard => postcard::from_bytes(payload)?,
            Encoding::Json => serde_json::from_slice(payload)?,
        };
        Ok((header, value))
    }
}
