//! Buffer d’instructions du séquenceur.
//!
//! Chaque instruction : `[opcode u8][attente u32 LE][opérandes]`.
//!
//! | op   | commande | opérandes           | pas de base |
//! |------|----------|---------------------|------------:|
//! | 0x00 | ttl all  | valeur u32          | 3  |
//! | 0x01 | ttl one  | canal u8, niveau u8 | 3  |
//! | 0x02 | wait     | -                   | 0  |
//! | 0x03 | clock    | période u8          | 5  |
//! | 0x04 | freq     | canal u8, u32       | 50 |
//! | 0x05 | amp      | canal u8, u16       | 50 |
//! | 0x06 | phase    | canal u8, u16       | 50 |
//! | 0x07 | dac      | canal u8, u16       | 45 |
//!
//! Une instruction dure `base + attente` pas.

use cmdlist_core::{ByteReader, ByteWriter, CoreError, CoreResult};
use cmdlist_parser::ast::{Cmd, Program};

/// Taille du préfixe commun (opcode + attente).
pub const INSTR_PREFIX_LEN: usize = 5;

/// Opcodes du séquenceur.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Les 32 sorties TTL.
    TtlAll = 0x00,
    /// Une sortie TTL.
    Ttl = 0x01,
    /// Attente pure.
    Wait = 0x02,
    /// Période d’horloge.
    Clock = 0x03,
    /// Fréquence DDS.
    Freq = 0x04,
    /// Amplitude DDS.
    Amp = 0x05,
    /// Phase DDS.
    Phase = 0x06,
    /// Sortie DAC.
    Dac = 0x07,
}

impl Op {
    /// Décodage d’un opcode brut.
    pub const fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            0x00 => Self::TtlAll,
            0x01 => Self::Ttl,
            0x02 => Self::Wait,
            0x03 => Self::Clock,
            0x04 => Self::Freq,
            0x05 => Self::Amp,
            0x06 => Self::Phase,
            0x07 => Self::Dac,
            _ => return None,
        })
    }

    /// Opcode d’une commande.
    pub const fn of(cmd: &Cmd) -> Self {
        match cmd {
            Cmd::TtlAll(_) => Self::TtlAll,
            Cmd::Ttl { .. } => Self::Ttl,
            Cmd::Wait => Self::Wait,
            Cmd::Clock(_) => Self::Clock,
            Cmd::Freq { .. } => Self::Freq,
            Cmd::Amp { .. } => Self::Amp,
            Cmd::Phase { .. } => Self::Phase,
            Cmd::Dac { .. } => Self::Dac,
        }
    }

    /// Coût fixe en pas d’horloge.
    pub const fn base_steps(self) -> u64 {
        match self {
            Self::TtlAll | Self::Ttl => 3,
            Self::Wait => 0,
            Self::Clock => 5,
            Self::Freq | Self::Amp | Self::Phase => 50,
            Self::Dac => 45,
        }
    }

    /// Taille des opérandes (après le préfixe).
    pub const fn operand_len(self) -> usize {
        match self {
            Self::TtlAll => 4,
            Self::Ttl => 2,
            Self::Clock => 1,
            Self::Wait => 0,
            Self::Freq => 5,
            Self::Amp | Self::Phase | Self::Dac => 3,
        }
    }

    /// Mnémonique (désassemblage).
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::TtlAll => "TTL.ALL",
            Self::Ttl => "TTL",
            Self::Wait => "WAIT",
            Self::Clock => "CLOCK",
            Self::Freq => "FREQ",
            Self::Amp => "AMP",
            Self::Phase => "PHASE",
            Self::Dac => "DAC",
        }
    }
}

/// Instruction décodée.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    /// Offset de l’opcode dans le buffer.
    pub offset: usize,
    /// Commande.
    pub cmd: Cmd,
    /// Attente supplémentaire.
    pub wait: u32,
}

impl Instr {
    /// Opcode de l’instruction.
    pub const fn op(&self) -> Op { Op::of(&self.cmd) }
    /// Durée en pas.
    pub const fn steps(&self) -> u64 { self.op().base_steps() + self.wait as u64 }
}

/* ─────────────────────────── Émission ─────────────────────────── */

/// Émet le buffer d’instructions et le masque des sorties TTL pilotées.
pub fn encode(program: &Program) -> (Vec<u8>, u32) {
    let size = program
        .stmts
        .iter()
        .map(|s| INSTR_PREFIX_LEN + Op::of(&s.cmd).operand_len())
        .sum();
    let mut w = ByteWriter::with_capacity(size);
    let mut mask = 0u32;

    for stmt in &program.stmts {
        w.write_u8(Op::of(&stmt.cmd) as u8);
        w.write_u32_le(stmt.wait);
        match stmt.cmd {
            Cmd::TtlAll(v) => {
                mask = u32::MAX;
                w.write_u32_le(v);
            }
            Cmd::Ttl { chn, on } => {
                mask |= 1u32.checked_shl(u32::from(chn)).unwrap_or(0);
                w.write_u8(chn);
                w.write_u8(u8::from(on));
            }
            Cmd::Wait => {}
            Cmd::Clock(period) => w.write_u8(period),
            Cmd::Freq { chn, value } => {
                w.write_u8(chn);
                w.write_u32_le(value);
            }
            Cmd::Amp { chn, value } | Cmd::Phase { chn, value } | Cmd::Dac { chn, value } => {
                w.write_u8(chn);
                w.write_u16_le(value);
            }
        }
    }

    (w.into_vec(), mask)
}

/* ─────────────────────────── Décodage ─────────────────────────── */

/// Itérateur d’instructions sur un buffer. S’arrête après la première erreur.
#[derive(Debug, Clone)]
pub struct Instrs<'a> {
    r: ByteReader<'a>,
    failed: bool,
}

/// Décode `code` instruction par instruction.
pub const fn decode(code: &[u8]) -> Instrs<'_> { Instrs { r: ByteReader::new(code), failed: false } }

impl Instrs<'_> {
    fn read_one(&mut self) -> CoreResult<Instr> {
        let offset = self.r.offset();
        let raw = self.r.read_u8()?;
        let op = Op::from_u8(raw).ok_or(CoreError::InvalidOpcode { op: raw, at: offset as u64 })?;
        let wait = self.r.read_u32_le()?;
        let cmd = match op {
            Op::TtlAll => Cmd::TtlAll(self.r.read_u32_le()?),
            Op::Ttl => {
                let chn = self.r.read_u8()?;
                let level = self.r.read_u8()?;
                if chn >= 32 || level > 1 {
                    return Err(CoreError::corrupted("TTL operand out of range"));
                }
                Cmd::Ttl { chn, on: level == 1 }
            }
            Op::Wait => Cmd::Wait,
            Op::Clock => Cmd::Clock(self.r.read_u8()?),
            Op::Freq => Cmd::Freq { chn: self.r.read_u8()?, value: self.r.read_u32_le()? },
            Op::Amp => Cmd::Amp { chn: self.r.read_u8()?, value: self.r.read_u16_le()? },
            Op::Phase => Cmd::Phase { chn: self.r.read_u8()?, value: self.r.read_u16_le()? },
            Op::Dac => Cmd::Dac { chn: self.r.read_u8()?, value: self.r.read_u16_le()? },
        };
        Ok(Instr { offset, cmd, wait })
    }
}

impl Iterator for Instrs<'_> {
    type Item = CoreResult<Instr>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.r.remaining() == 0 {
            return None;
        }
        let item = self.read_one();
        self.failed = item.is_err();
        Some(item)
    }
}

/// Nombre total de pas d’un buffer : `Σ (base + attente)`.
pub fn total_steps(code: &[u8]) -> CoreResult<u64> {
    decode(code).try_fold(0u64, |acc, instr| Ok(acc.wrapping_add(instr?.steps())))
}

/* ─────────────────────────── Tests ─────────────────────────── */
