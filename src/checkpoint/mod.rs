//! Durable run state for resuming interrupted optimizations.
//!
//! Each run keeps two blobs: the primary `{name}`, rewritten after random
//! initialization and every iteration, and `{name}_backup`, rewritten on
//! even iterations. Recovery prefers the primary and falls back to the
//! backup when the primary is missing or fails the integrity check.
//!
//! # Blob Format
//!
//! ```text
//! Header (24 bytes, little endian):
//!   Magic: "PDDY" (4 bytes)
//!   Version: u16
//!   Flags: u16 (compression in the lower 4 bits)
//!   Payload length: u64
//!   Reserved: 8 bytes
//!
//! Payload:
//!   JSON-encoded run state, optionally LZ4 compressed
//! ```

mod format;
mod store;

pub use format::{
    CHECKPOINT_MAGIC, CHECKPOINT_VERSION, CheckpointFlags, CheckpointHeader, CompressionType,
    decode_state, encode_state, has_magic,
};
pub use store::{CheckpointStore, RecoveryError, backup_path};
