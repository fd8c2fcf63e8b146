//! Binary format definitions for checkpoint blobs.

use std::io::{self, Read, Write};

use crate::compute::RunnerState;

/// Magic bytes identifying a checkpoint blob.
pub const CHECKPOINT_MAGIC: &[u8; 4] = b"PDDY";

/// Current format version.
pub const CHECKPOINT_VERSION: u16 = 1;

/// Compression type for the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// Plain JSON.
    #[default]
    None = 0,
    /// LZ4 fast compression.
    Lz4 = 1,
}

impl CompressionType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

/// Checkpoint header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointFlags {
    /// Compression type (lower 4 bits).
    pub compression: CompressionType,
}

impl CheckpointFlags {
    pub fn to_u16(self) -> u16 {
        self.compression as u16
    }

    pub fn from_u16(v: u16) -> io::Result<Self> {
        let compression = CompressionType::from_u8((v & 0x0F) as u8).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown PDDY compression: {}", v & 0x0F),
            )
        })?;
        Ok(Self { compression })
    }
}

/// Header preceding every checkpoint payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointHeader {
    pub flags: CheckpointFlags,
    /// Payload size in bytes, as stored.
    pub payload_len: u64,
}

impl CheckpointHeader {
    /// Size of header in bytes.
    /// Magic(4) + Version(2) + Flags(2) + PayloadLen(8) + Reserved(8) = 24
    pub const SIZE: usize = 24;

    /// Write header to output.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(CHECKPOINT_MAGIC)?;
        w.write_all(&CHECKPOINT_VERSION.to_le_bytes())?;
        w.write_all(&self.flags.to_u16().to_le_bytes())?;
        w.write_all(&self.payload_len.to_le_bytes())?;
        // Reserved bytes
        w.write_all(&[0u8; 8])?;
        Ok(())
    }

    /// Read header from input.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != CHECKPOINT_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid PDDY magic bytes",
            ));
        }

        let mut buf2 = [0u8; 2];
        let mut buf8 = [0u8; 8];

        r.read_exact(&mut buf2)?;
        let version = u16::from_le_bytes(buf2);
        if version != CHECKPOINT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported PDDY version: {}", version),
            ));
        }

        r.read_exact(&mut buf2)?;
        let flags = CheckpointFlags::from_u16(u16::from_le_bytes(buf2))?;

        r.read_exact(&mut buf8)?;
        let payload_len = u64::from_le_bytes(buf8);

        // Skip reserved bytes
        r.read_exact(&mut buf8)?;

        Ok(Self { flags, payload_len })
    }
}

/// Cheap integrity probe: does the blob start with the magic bytes?
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(CHECKPOINT_MAGIC)
}

/// Serialize a run state into a complete blob.
///
/// LZ4 is only applied when the `lz4` feature is enabled; otherwise the
/// payload is written uncompressed and flagged as such.
pub fn encode_state(state: &RunnerState, compression: CompressionType) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(state).map_err(io::Error::other)?;
    let (compression, payload) = match compression {
        CompressionType::Lz4 if cfg!(feature = "lz4") => (CompressionType::Lz4, compress_lz4(&json)),
        _ => (CompressionType::None, json),
    };

    let header = CheckpointHeader {
        flags: CheckpointFlags { compression },
        payload_len: payload.len() as u64,
    };
    let mut blob = Vec::with_capacity(CheckpointHeader::SIZE + payload.len());
    header.write_to(&mut blob)?;
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Parse a blob, rejecting bad headers, truncated payloads and undecodable state.
pub fn decode_state(bytes: &[u8]) -> io::Result<RunnerState> {
    let mut reader = bytes;
    let header = CheckpointHeader::read_from(&mut reader)?;

    let declared = usize::try_from(header.payload_len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "PDDY payload too large"))?;
    if reader.len() < declared {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "Truncated PDDY payload: {} of {} bytes",
                reader.len(),
                declared
            ),
        ));
    }
    let payload = &reader[..declared];

    let json = match header.flags.compression {
        CompressionType::None => payload.to_vec(),
        CompressionType::Lz4 => decompress_lz4(payload)?,
    };
    let state: RunnerState = serde_json::from_slice(&json)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if !state.is_valid() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Inconsistent run state in PDDY payload",
        ));
    }
    Ok(state)
}

/// Compress data using LZ4.
#[cfg(feature = "lz4")]
pub fn compress_lz4(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

/// Decompress LZ4 data.
#[cfg(feature = "lz4")]
pub fn decompress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Fallback when LZ4 is not available.
#[cfg(not(feature = "lz4"))]
pub fn compress_lz4(data: &[u8]) -> Vec<u8> {
    data.to_vec()
}

#[cfg(not(feature = "lz4"))]
pub fn decompress_lz4(_data: &[u8]) -> io::Result<Vec<u8>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "PDDY payload is LZ4 compressed; rebuild with the `lz4` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::Runner;
    use crate::schema::{CandidateValue, ParameterSpace, ParameterSpec, RunnerConfig};
    use std::io::Cursor;

    fn state() -> RunnerState {
        let spec = ParameterSpec::builder(0.0, 1.0, 0.1)
            .limits(0.0, 1.0)
            .build()
            .unwrap();
        let space = ParameterSpace::from_pairs([("x", spec)]).unwrap();
        let config = RunnerConfig {
            rand_seed_number: 6,
            threshold: 3,
            iterations: 2,
            random_seed: Some(1),
            ..Default::default()
        };
        let evaluator = |v: &[CandidateValue]| -(v[0].value - 0.4).abs();
        let mut runner = Runner::new(config, space, evaluator).unwrap();
        runner.run().unwrap();
        runner.into_state()
    }

    #[test]
    fn test_header_roundtrip() {
        let header = CheckpointHeader {
            flags: CheckpointFlags {
                compression: CompressionType::Lz4,
            },
            payload_len: 4096,
        };

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), CheckpointHeader::SIZE);
        assert!(has_magic(&buf));

        let mut cursor = Cursor::new(&buf);
        let decoded = CheckpointHeader::read_from(&mut cursor).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_state_roundtrip() {
        let state = state();
        let blob = encode_state(&state, CompressionType::None).unwrap();
        assert_eq!(decode_state(&blob).unwrap(), state);
    }

    #[test]
    fn test_compressed_state_roundtrip() {
        let state = state();
        let blob = encode_state(&state, CompressionType::Lz4).unwrap();
        let header = CheckpointHeader::read_from(&mut blob.as_slice()).unwrap();
        let expected = if cfg!(feature = "lz4") {
            CompressionType::Lz4
        } else {
            CompressionType::None
        };
        assert_eq!(header.flags.compression, expected);
        assert_eq!(decode_state(&blob).unwrap(), state);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut blob = encode_state(&state(), CompressionType::None).unwrap();
        blob[0] = b'X';
        assert!(!has_magic(&blob));
        let err = decode_state(&blob).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_truncation() {
        let blob = encode_state(&state(), CompressionType::None).unwrap();
        assert!(decode_state(&blob[..blob.len() - 10]).is_err());
        assert!(decode_state(&blob[..10]).is_err());
        assert!(decode_state(&[]).is_err());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut blob = encode_state(&state(), CompressionType::None).unwrap();
        blob[4..6].copy_from_slice(&7u16.to_le_bytes());
        assert!(decode_state(&blob).is_err());
    }

    #[test]
    fn test_rejects_garbled_payload() {
        let mut blob = encode_state(&state(), CompressionType::None).unwrap();
        let mid = CheckpointHeader::SIZE + (blob.len() - CheckpointHeader::SIZE) / 2;
        blob[mid] = 0xFF;
        assert!(decode_state(&blob).is_err());
    }
}
