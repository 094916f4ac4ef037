//! cmdlist-compiler : source → buffer d’instructions + masque TTL
//!
//! - Entrée : texte d’une liste de commandes
//! - Sortie : [`Compiled`] (code opaque + masque des sorties TTL pilotées)
//! - Estimation de durée : [`DurationEstimator::total_steps`]
//! - Diagnostics : [`SyntaxError`] (ligne, colonnes 1-based, rendu caret)
//!
//! Les deux traits [`Compiler`] et [`DurationEstimator`] sont la frontière
//! vue par le service de compilation ; [`CmdListCompiler`] en est
//! l’implémentation de référence.
//!
//! ```
//! use cmdlist_compiler::{CmdListCompiler, Compiler, DurationEstimator};
//!
//! let c = CmdListCompiler::default();
//! let out = c.compile("ttl(0) = on t=97").unwrap();
//! assert_eq!(out.ttl_mask, 1);
//! assert_eq!(c.total_steps(&out.code).unwrap(), 100);
//! ```

#![deny(missing_docs)]

use cmdlist_core::CoreResult;
use cmdlist_parser::Limits;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod bytecode;
pub mod diagnostic;
pub mod disasm;

pub use diagnostic::SyntaxError;
pub use disasm::disassemble;

/// Message de repli quand un échec ne porte aucun texte.
pub const UNKNOWN_PARSER_ERROR: &str = "Unknown parser error";

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Options du compilateur (nombre de canaux par périphérique).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompilerOptions {
    /// Sorties TTL (plafonné à 32).
    pub ttl_channels: u8,
    /// Canaux DDS.
    pub dds_channels: u8,
    /// Canaux DAC.
    pub dac_channels: u8,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        let l = Limits::default();
        Self { ttl_channels: l.ttl_channels, dds_channels: l.dds_channels, dac_channels: l.dac_channels }
    }
}

impl CompilerOptions {
    /// Limites passées au parser.
    pub const fn limits(&self) -> Limits {
        Limits { ttl_channels: self.ttl_channels, dds_channels: self.dds_channels, dac_channels: self.dac_channels }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frontière adapter / estimateur
// ─────────────────────────────────────────────────────────────────────────────

/// Résultat d’une compilation réussie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compiled {
    /// Buffer d’instructions (opaque pour l’appelant).
    pub code: Vec<u8>,
    /// Sorties TTL pilotées par le programme.
    pub ttl_mask: u32,
}

/// Échec de compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileFailure {
    /// Erreur de syntaxe localisée.
    #[error("syntax error: {0}")]
    Syntax(SyntaxError),
    /// Autre échec, avec un message.
    #[error("{0}")]
    Message(String),
    /// Échec sans information.
    #[error("{}", UNKNOWN_PARSER_ERROR)]
    Unknown,
}

impl CompileFailure {
    /// Échec porteur d’un message (vide → [`CompileFailure::Unknown`]).
    pub fn message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if msg.is_empty() { Self::Unknown } else { Self::Message(msg) }
    }
}

/// Adapter de compilation : source → code + masque.
///
/// Appelé sur un thread de travail : pas d’accès à un état de l’appelant.
pub trait Compiler: Send + Sync {
    /// Compile `source`.
    fn compile(&self, source: &str) -> Result<Compiled, CompileFailure>;
}

/// Estimateur de durée : code → nombre de pas.
///
/// Ne reçoit que du code produit par le [`Compiler`] associé ; un échec est
/// une violation de contrat.
pub trait DurationEstimator: Send + Sync {
    /// Nombre total de pas d’horloge de `code`.
    fn total_steps(&self, code: &[u8]) -> CoreResult<u64>;
}

impl<T: Compiler + ?Sized> Compiler for std::sync::Arc<T> {
    fn compile(&self, source: &str) -> Result<Compiled, CompileFailure> { (**self).compile(source) }
}

impl<T: DurationEstimator + ?Sized> DurationEstimator for std::sync::Arc<T> {
    fn total_steps(&self, code: &[u8]) -> CoreResult<u64> { (**self).total_steps(code) }
}

// ─────────────────────────────────────────────────────────────────────────────
// Implémentation de référence
// ─────────────────────────────────────────────────────────────────────────────

/// Compilateur du langage cmdlist.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmdListCompiler {
    opts: CompilerOptions,
}

impl CmdListCompiler {
    /// Nouveau compilateur.
    pub const fn new(opts: CompilerOptions) -> Self { Self { opts } }
}

impl Compiler for CmdListCompiler {
    #[tracing::instrument(level = "trace", skip_all, fields(len = source.len()))]
    fn compile(&self, source: &str) -> Result<Compiled, CompileFailure> {
        let program = cmdlist_parser::parse_with(source, self.opts.limits())
            .map_err(|e| CompileFailure::Syntax(SyntaxError::from_parse(&e, source)))?;
        let (code, ttl_mask) = bytecode::encode(&program);
        tracing::trace!(instrs = program.len(), bytes = code.len(), ttl_mask, "compiled");
        Ok(Compiled { code, ttl_mask })
    }
}

impl DurationEstimator for CmdListCompiler {
    fn total_steps(&self, code: &[u8]) -> CoreResult<u64> { bytecode::total_steps(code) }
}
