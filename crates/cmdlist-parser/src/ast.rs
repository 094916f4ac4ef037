//! AST d’une liste de commandes.
//!
//! Un programme est une suite plate d’instructions : pas d’expressions, pas
//! de blocs. Chaque instruction porte une commande et une attente
//! supplémentaire (`t=N`, ou l’argument de `wait(N)`).

#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use core::fmt;

use cmdlist_core::Span;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Programme complet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Program {
    /// Instructions dans l’ordre d’exécution.
    pub stmts: Vec<Stmt>,
}

impl Program {
    /// Vrai si le programme ne contient aucune instruction.
    pub fn is_empty(&self) -> bool { self.stmts.is_empty() }
    /// Nombre d’instructions.
    pub fn len(&self) -> usize { self.stmts.len() }
}

/// Une instruction : commande + attente.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stmt {
    /// La commande.
    pub cmd: Cmd,
    /// Pas d’attente après la commande (`wait(N)` et `t=N` cumulés).
    pub wait: u32,
    /// Localisation de la commande complète.
    pub span: Span,
}

/// Commande matérielle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Cmd {
    /// `ttl = v` : les 32 sorties TTL d’un coup.
    TtlAll(u32),
    /// `ttl(chn) = on|off`.
    Ttl {
        /// Canal TTL.
        chn: u8,
        /// Niveau.
        on: bool,
    },
    /// `wait(N)` : la durée vit dans [`Stmt::wait`].
    Wait,
    /// `clock(period)`.
    Clock(u8),
    /// `freq(chn) = v`.
    Freq {
        /// Canal DDS.
        chn: u8,
        /// Mot de fréquence.
        value: u32,
    },
    /// `amp(chn) = v`.
    Amp {
        /// Canal DDS.
        chn: u8,
        /// Amplitude (12 bits).
        value: u16,
    },
    /// `phase(chn) = v`.
    Phase {
        /// Canal DDS.
        chn: u8,
        /// Phase.
        value: u16,
    },
    /// `dac(chn) = v`.
    Dac {
        /// Canal DAC.
        chn: u8,
        /// Tension brute.
        value: u16,
    },
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TtlAll(v) => write!(f, "ttl = 0x{v:08x}"),
            Self::Ttl { chn, on } => write!(f, "ttl({chn}) = {}", if on { "on" } else { "off" }),
            Self::Wait => write!(f, "wait"),
            Self::Clock(p) => write!(f, "clock({p})"),
            Self::Freq { chn, value } => write!(f, "freq({chn}) = {value}"),
            Self::Amp { chn, value } => write!(f, "amp({chn}) = {value}"),
            Self::Phase { chn, value } => write!(f, "phase({chn}) = {value}"),
            Self::Dac { chn, value } => write!(f, "dac({chn}) = {value}"),
        }
    }
}
