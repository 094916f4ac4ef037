//! Trame filaire attendue par le serveur d'exécution.
//!
//! ```text
//! offset 0..7   : durée totale, nanosecondes, u64 little-endian
//! offset 8..11  : masque TTL, u32 little-endian
//! offset 12..   : buffer d'instructions (opaque)
//! ```
//!
//! Le format n'a pas de numéro de version : toute modification casse le
//! consommateur en aval.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{ByteReader, ByteWriter, CoreError, CoreResult};

/// Pas d'horloge fixe : 10 ns par pas. Non configurable.
pub const NS_PER_STEP: u64 = 10;

/// Taille de l'en-tête (8 + 4).
pub const HEADER_LEN: usize = 12;

/// En-tête d'une trame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameHeader {
    /// Durée totale de la séquence en nanosecondes.
    pub duration_ns: u64,
    /// Canaux TTL pilotés par la séquence.
    pub ttl_mask: u32,
}

impl FrameHeader {
    /// En-tête pour `steps` pas et le masque donné.
    pub const fn from_steps(steps: u64, ttl_mask: u32) -> Self {
        Self { duration_ns: steps_to_ns(steps), ttl_mask }
    }

    /// Sérialise l'en-tête (12 octets LE).
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut w = ByteWriter::with_capacity(HEADER_LEN);
        w.write_u64_le(self.duration_ns);
        w.write_u32_le(self.ttl_mask);
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(w.as_slice());
        out
    }

    /// Relit un en-tête depuis le début d'une trame.
    pub fn from_bytes(frame: &[u8]) -> CoreResult<Self> {
        if frame.len() < HEADER_LEN {
            return Err(CoreError::TruncatedFrame { len: frame.len() as u64 });
        }
        let mut r = ByteReader::new(frame);
        let duration_ns = r.read_u64_le()?;
        let ttl_mask = r.read_u32_le()?;
        Ok(Self { duration_ns, ttl_mask })
    }
}

/// Convertit un nombre de pas en nanosecondes.
///
/// Arithmétique modulo 2^64, comme le consommateur en aval.
pub const fn steps_to_ns(steps: u64) -> u64 { steps.wrapping_mul(NS_PER_STEP) }

/// Préfixe `code` par l'en-tête, sans recopier le buffer dans un nouveau.
///
/// Résultat : `HEADER_LEN + code.len()` octets.
pub fn encode_frame(mut code: Vec<u8>, header: FrameHeader) -> Vec<u8> {
    let n = code.len();
    code.reserve_exact(HEADER_LEN);
    code.resize(n + HEADER_LEN, 0);
    code.copy_within(0..n, HEADER_LEN);
    code[..HEADER_LEN].copy_from_slice(&header.to_bytes());
    code
}

/// Sépare une trame en `(en-tête, code)`.
pub fn split_frame(frame: &[u8]) -> CoreResult<(FrameHeader, &[u8])> {
    let header = FrameHeader::from_bytes(frame)?;
    Ok((header, &frame[HEADER_LEN..]))
}
