//! Résultat terminal d’un job et charge utile tramée.

use cmdlist_compiler::SyntaxError;
use cmdlist_core::{frame::encode_frame, FrameHeader, HEADER_LEN};

/// Message des jobs annulés avant leur démarrage.
pub const CANCELLED: &str = "compilation cancelled";

/// Trame prête à expédier : `[durée ns][masque TTL][code]`.
///
/// Le buffer est déplacé, jamais copié, du worker jusqu’au handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    header: FrameHeader,
    bytes: Vec<u8>,
}

impl Payload {
    /// Préfixe `code` par l’en-tête, en place.
    pub fn encode(code: Vec<u8>, header: FrameHeader) -> Self {
        Self { header, bytes: encode_frame(code, header) }
    }

    /// En-tête de la trame.
    pub const fn header(&self) -> FrameHeader { self.header }

    /// Trame complète.
    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    /// Buffer d’instructions, sans l’en-tête.
    pub fn code(&self) -> &[u8] { &self.bytes[HEADER_LEN..] }

    /// Longueur totale (`12 + N`).
    pub fn len(&self) -> usize { self.bytes.len() }

    /// Toujours faux : une trame contient au moins son en-tête.
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Récupère le buffer.
    pub fn into_vec(self) -> Vec<u8> { self.bytes }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] { &self.bytes }
}

impl From<Payload> for Vec<u8> {
    fn from(p: Payload) -> Self { p.bytes }
}

/// Issue d’un job : exactement une variante, figée à la fin du job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Compilation réussie, trame prête.
    Success(Payload),
    /// Source invalide.
    SyntaxFailure(SyntaxError),
    /// Tout autre échec, avec le meilleur message disponible.
    OpaqueFailure(String),
}

impl CompileOutcome {
    /// Issue d’un job annulé avant démarrage.
    pub fn cancelled() -> Self { Self::OpaqueFailure(CANCELLED.to_owned()) }

    /// Nom court de la variante (traces).
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::SyntaxFailure(_) => "syntax",
            Self::OpaqueFailure(_) => "opaque",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn payload_exposes_header_and_code() {
        let p = Payload::encode(vec![0xAA, 0xBB], FrameHeader { duration_ns: 30, ttl_mask: 2 });
        assert_eq!(p.len(), HEADER_LEN + 2);
        assert_eq!(p.code(), &[0xAA, 0xBB]);
        assert_eq!(&p.as_bytes()[..8], &30u64.to_le_bytes());
        assert_eq!(p.header().ttl_mask, 2);
        assert_eq!(&Vec::from(p)[8..12], &2u32.to_le_bytes());
    }
}
