// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Content digesting for unit payloads.
//!
//! Determinism contract
//! - A payload digest is a BLAKE3 digest over a canonical byte stream that
//!   encodes the complete positional section sequence of a unit's mutable
//!   content.
//! - Ordering is positional and meaningful: section `i` of the payload is the
//!   `i`-th vertical section of the unit, so the stream encodes sections in
//!   the order given. Reordering equal sections changes the digest by design.
//! - Encoding is fixed-size and architecture-independent:
//!   - 8-byte little-endian section count first,
//!   - per section, a 1-byte presence tag (`0` = empty, `1` = blocks),
//!   - for present sections, an 8-byte little-endian byte length followed by
//!     the exact state bytes.
//! - An empty payload (zero sections) therefore digests to the fixed sentinel
//!   `BLAKE3(LE_u64(0))`, see [`empty_payload_digest`].
//!
//! Notes
//! - Little-endian for all length fields; changing endianness changes every
//!   digest and must be treated as a breaking change.
//! - An [`SectionPayload::Empty`] section and a present section whose cells
//!   all hold a trivial state are **distinct** inputs and hash distinctly:
//!   absence is a first-class encoding (tag `0`), not a degenerate content
//!   case. A pipeline that materializes an all-default section produced a
//!   different artifact than one that skipped the section entirely, and the
//!   whole point of this crate is to surface exactly that kind of drift.

use bytes::Bytes;

/// Width in bytes of one packed cell state id.
///
/// Present sections carry their cell states as consecutive 4-byte
/// little-endian words; a section whose byte length is not a multiple of
/// this width is malformed (a torn or truncated snapshot).
pub const STATE_ID_BYTES: usize = 4;

/// A 32-byte BLAKE3 payload digest.
///
/// Thin newtype over `[u8; 32]` following the `BlobHash`/`NodeId` pattern.
/// Carries no meaning beyond equality; the `Display` impl renders lowercase
/// hex for reports and error messages.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// View the digest as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One positional sub-block of a unit's payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SectionPayload {
    /// Absence-representing section (e.g. an all-air vertical slice that the
    /// pipeline never materialized).
    Empty,
    /// Packed cell state ids: consecutive 4-byte little-endian words.
    Blocks(Bytes),
}

impl SectionPayload {
    /// Packs a slice of cell state ids into a `Blocks` section
    /// (little-endian words).
    #[must_use]
    pub fn from_state_ids(states: &[u32]) -> Self {
        let mut buf = Vec::with_capacity(states.len() * STATE_ID_BYTES);
        for state in states {
            buf.extend_from_slice(&state.to_le_bytes());
        }
        Self::Blocks(Bytes::from(buf))
    }

    /// Byte length of the section's content (`0` for empty sections).
    #[must_use]
    pub fn content_len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Blocks(bytes) => bytes.len(),
        }
    }
}

/// Errors produced while digesting a payload.
///
/// Digesting is the single fallible step of a checkpoint: a failure here must
/// reach the caller rather than record a wrong digest, since a silently-wrong
/// digest defeats the purpose of determinism checking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// A present section's byte length is not a whole number of cell states.
    #[error("[DIGEST_MALFORMED_SECTION] section {index} has {len} bytes, not a multiple of {STATE_ID_BYTES}")]
    MalformedSection {
        /// Position of the offending section in the payload sequence.
        index: usize,
        /// Its byte length.
        len: usize,
    },
}

/// Canonical digest of an empty payload: BLAKE3 of `0u64.to_le_bytes()`.
///
/// Equal to `digest_sections(&[])` by construction; exposed so callers can
/// recognize the sentinel without recomputing it.
#[must_use]
pub fn empty_payload_digest() -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&0u64.to_le_bytes());
    Digest(hasher.finalize().into())
}

/// Digests a unit payload: a point-in-time, positionally-ordered snapshot of
/// its sections.
///
/// Pure and lock-free; safe to call concurrently; linear in total payload
/// bytes. See the module docs for the canonical encoding.
///
/// # Errors
///
/// Returns [`DigestError::MalformedSection`] if any present section's byte
/// length is not a multiple of [`STATE_ID_BYTES`]. Nothing is recorded
/// anywhere on failure — digesting has no side effects.
pub fn digest_sections(sections: &[SectionPayload]) -> Result<Digest, DigestError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(sections.len() as u64).to_le_bytes());
    for (index, section) in sections.iter().enumerate() {
        match section {
            SectionPayload::Empty => {
                hasher.update(&[0u8]);
            }
            SectionPayload::Blocks(bytes) => {
                if bytes.len() % STATE_ID_BYTES != 0 {
                    return Err(DigestError::MalformedSection {
                        index,
                        len: bytes.len(),
                    });
                }
                hasher.update(&[1u8]);
                hasher.update(&(bytes.len() as u64).to_le_bytes());
                hasher.update(bytes);
            }
        }
    }
    Ok(Digest(hasher.finalize().into()))
}
