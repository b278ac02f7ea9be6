//! # Persistence Format
//!
//! Binary serialization for Geode traces.
//!
//! Format: Header (5 bytes) + a sequence of checksummed frames, one Mark
//! per frame, in append order.
//! - 4 bytes: Magic ("GEOD")
//! - 1 byte: Version
//! - per frame: u32 LE payload length, postcard payload, u64 LE checksum
//!
//! The trailing checksum word is the integrity marker: a partially-written
//! frame (crash mid-append) fails its length or checksum test and is
//! skipped on reload, never treated as a valid Mark.
//!
//! ## Security
//!
//! Pre-deserialization validation throughout:
//! - Maximum payload size limit (`MAX_PERSISTENCE_PAYLOAD_SIZE`)
//! - Per-frame size limit before allocation (`MAX_FRAME_SIZE`)
//! - Header validation before any frame parsing

use crate::store::MemoryTrace;
use crate::{GeodeError, Mark, primitives};

/// Maximum allowed total payload size (500 MB).
///
/// Validated BEFORE attempting deserialization to prevent allocation-based
/// memory exhaustion on corrupted or malicious input.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 500 * 1024 * 1024;

/// Maximum size of one frame payload: content bound plus record overhead.
pub const MAX_FRAME_SIZE: usize = primitives::MAX_CONTENT_LENGTH + 4096;

/// Minimum valid file size (header only).
const MIN_FILE_SIZE: usize = 5;

/// Bytes of frame framing around a payload: length word + checksum word.
const FRAME_OVERHEAD: usize = 4 + 8;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes all frames.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), GeodeError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(GeodeError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(GeodeError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GeodeError> {
        if bytes.len() < 5 {
            return Err(GeodeError::SerializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CHECKSUM
// =============================================================================

/// Position-mixing XOR fold over a payload.
///
/// Not cryptographic: the goal is detecting torn writes, not adversaries.
/// Canonical verification digests are a separate concern (`trace_digest`).
#[must_use]
pub fn frame_checksum(payload: &[u8]) -> u64 {
    let mut checksum = payload.len() as u64;
    for (i, byte) in payload.iter().enumerate() {
        checksum ^= u64::from(*byte).rotate_left((i % 8) as u32 * 8);
        checksum = checksum.rotate_left(1);
    }
    checksum
}

/// Digest of a full serialized trace for export verification.
///
/// With the `crypto-hash` feature this is a truncated BLAKE3; otherwise
/// the same XOR fold as frames.
#[must_use]
pub fn trace_digest(bytes: &[u8]) -> u64 {
    #[cfg(feature = "crypto-hash")]
    {
        let hash = blake3::hash(bytes);
        let mut word = [0u8; 8];
        word.copy_from_slice(&hash.as_bytes()[0..8]);
        u64::from_le_bytes(word)
    }
    #[cfg(not(feature = "crypto-hash"))]
    {
        frame_checksum(bytes)
    }
}

// =============================================================================
// FRAME ENCODING
// =============================================================================

/// Encode one Mark as an appendable frame.
///
/// A surface layer appends exactly these bytes to an existing file; the
/// frame is self-delimiting and self-checking.
pub fn mark_to_frame(mark: &Mark) -> Result<Vec<u8>, GeodeError> {
    let payload =
        postcard::to_stdvec(mark).map_err(|e| GeodeError::SerializationError(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(GeodeError::SerializationError(
            "Frame exceeds maximum size".to_string(),
        ));
    }

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&frame_checksum(&payload).to_le_bytes());
    Ok(frame)
}

/// Serialize a whole trace to bytes (header + frames).
///
/// This is a pure transformation - no file I/O.
pub fn trace_to_bytes(trace: &MemoryTrace) -> Result<Vec<u8>, GeodeError> {
    let mut result = Vec::new();
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    for mark in trace.marks() {
        result.extend_from_slice(&mark_to_frame(mark)?);
    }
    Ok(result)
}

/// Outcome of a reload: the Marks recovered and whether trailing bytes
/// were skipped as a torn write.
#[derive(Debug)]
pub struct ReloadedTrace {
    pub trace: MemoryTrace,
    pub skipped_partial: bool,
}

/// Deserialize a trace from bytes.
///
/// All validation occurs BEFORE payload deserialization. A torn trailing
/// frame — short length word, short payload, or checksum mismatch — is
/// skipped and reported; everything before it loads normally.
pub fn trace_from_bytes(bytes: &[u8]) -> Result<ReloadedTrace, GeodeError> {
    if bytes.len() < MIN_FILE_SIZE {
        return Err(GeodeError::SerializationError(
            "Data too short: minimum 5 bytes required".to_string(),
        ));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(GeodeError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    let mut marks: Vec<Mark> = Vec::new();
    let mut skipped_partial = false;
    let mut offset = 5;

    while offset < bytes.len() {
        // Length word present?
        if offset + 4 > bytes.len() {
            skipped_partial = true;
            break;
        }
        let mut len_word = [0u8; 4];
        len_word.copy_from_slice(&bytes[offset..offset + 4]);
        let payload_len = u32::from_le_bytes(len_word) as usize;
        if payload_len > MAX_FRAME_SIZE {
            skipped_partial = true;
            break;
        }

        // Full payload and checksum present?
        let payload_start = offset + 4;
        let checksum_start = payload_start + payload_len;
        if checksum_start + 8 > bytes.len() {
            skipped_partial = true;
            break;
        }
        let payload = &bytes[payload_start..checksum_start];
        let mut checksum_word = [0u8; 8];
        checksum_word.copy_from_slice(&bytes[checksum_start..checksum_start + 8]);
        if frame_checksum(payload) != u64::from_le_bytes(checksum_word) {
            skipped_partial = true;
            break;
        }

        let mark: Mark = postcard::from_bytes(payload).map_err(|e| {
            GeodeError::DeserializationError(format!("Failed to deserialize mark: {}", e))
        })?;
        marks.push(mark);
        offset = checksum_start + 8;
    }

    if skipped_partial {
        tracing::warn!(recovered = marks.len(), "skipped torn trailing frame on reload");
    }
    Ok(ReloadedTrace {
        trace: MemoryTrace::from_marks(marks),
        skipped_partial,
    })
}

// =============================================================================
// TESTS
// =============================================================================
