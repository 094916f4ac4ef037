//! cmdlist-parser : parseur des listes de commandes
//!
//! Branches :
//! - `cmdlist-lexer` pour la tokenisation
//! - `cmdlist-core` pour `Span`
//! - module [`ast`] pour l’AST cible
//!
//! Grammaire :
//! ```text
//! program := (stmt? (NEWLINE | ";"))* stmt?
//! stmt    := command ("t" "=" INT)?
//! command := "ttl" "=" INT
//!          | "ttl" "(" INT ")" "=" level
//!          | "wait" "(" INT ")"
//!          | "clock" "(" INT ")"
//!          | ("freq" | "amp" | "phase" | "dac") "(" INT ")" "=" INT
//! level   := "0" | "1" | "on" | "off" | "true" | "false"
//! ```
//!
//! Les bornes (canaux, valeurs) sont vérifiées ici : une erreur de portée est
//! une erreur de syntaxe, avec la plage fautive en surbrillance.

#![deny(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

/* ─────────────────────────── Imports / alloc ─────────────────────────── */

#[cfg(not(feature = "std"))]
extern crate alloc;

use core::fmt;

#[cfg(feature = "std")]
use std::{format, string::{String, ToString}, vec::Vec};

#[cfg(not(feature = "std"))]
use alloc::{format, string::{String, ToString}, vec::Vec};

use cmdlist_core::{SourceId, Span};
use cmdlist_lexer::{LexError, LexErrorKind, Lexer, LineMap, Token, TokenKind};

pub mod ast;

use ast::{Cmd, Program, Stmt};

/* ─────────────────────────── Limites matérielles ─────────────────────────── */

/// Nombre de canaux par périphérique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Sorties TTL (au plus 32 : le masque est un u32).
    pub ttl_channels: u8,
    /// Canaux DDS.
    pub dds_channels: u8,
    /// Canaux DAC.
    pub dac_channels: u8,
}

impl Default for Limits {
    fn default() -> Self { Self { ttl_channels: 32, dds_channels: 22, dac_channels: 4 } }
}

impl Limits {
    fn ttl(self) -> u8 { self.ttl_channels.min(32) }
}

/// Amplitude DDS maximale (12 bits).
pub const AMP_MAX: u16 = 4095;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreur de parsing avec span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Position principale (premier caractère fautif).
    pub span: Span,
    /// Message humain.
    pub message: String,
    /// Plage à surligner, quand l’erreur porte sur un littéral entier.
    pub highlight: Option<Span>,
}

impl ParseError {
    fn at(span: Span, message: impl Into<String>) -> Self {
        Self { span, message: message.into(), highlight: None }
    }

    fn range(span: Span, message: impl Into<String>) -> Self {
        Self { span, message: message.into(), highlight: Some(span) }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        match e.kind {
            LexErrorKind::UnexpectedChar(_) => Self::at(e.span, e.to_string()),
            LexErrorKind::InvalidNumber | LexErrorKind::IntOverflow => Self::range(e.span, e.to_string()),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{}..{}", self.message, self.span.start.0, self.span.end.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseError {}

type PResult<T> = core::result::Result<T, ParseError>;

/* ─────────────────────────── API courte ─────────────────────────── */

/// Parse `src` avec les limites par défaut.
pub fn parse(src: &str) -> PResult<Program> { Parser::new(src, SourceId(0)).parse_program() }

/// Parse `src` avec des limites explicites.
pub fn parse_with(src: &str, limits: Limits) -> PResult<Program> {
    Parser::new(src, SourceId(0)).with_limits(limits).parse_program()
}

/* ─────────────────────────── Parser ─────────────────────────── */

/// Parser cmdlist.
pub struct Parser<'a> {
    lx: Lexer<'a>,
    /// Buffer 1-token d’anticipation.
    look: Option<Token<'a>>,
    /// Dernier span consommé.
    last_span: Span,
    limits: Limits,
}

impl<'a> Parser<'a> {
    /// Crée un parser depuis une source.
    pub fn new(src: &'a str, source: SourceId) -> Self {
        Self { lx: Lexer::new(src, source), look: None, last_span: Span::default(), limits: Limits::default() }
    }

    /// Remplace les limites de canaux.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Table des lignes de la source (diagnostics).
    pub const fn lines(&self) -> &LineMap { &self.lx.lines }

    /// Parse un programme complet.
    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut stmts = Vec::new();
        loop {
            let t = self.peek()?;
            match t.value {
                TokenKind::Eof => break,
                TokenKind::Newline | TokenKind::Semi => {
                    self.bump()?;
                    continue;
                }
                _ => {}
            }

            stmts.push(self.parse_stmt()?);

            let t = self.peek()?;
            match t.value {
                TokenKind::Newline | TokenKind::Semi => {
                    self.bump()?;
                }
                TokenKind::Eof => {}
                other => return Err(ParseError::at(t.span, format!("expected end of command, found {other}"))),
            }
        }
        Ok(Program { stmts })
    }

    /* ─────────── Instructions ─────────── */

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let head = self.bump()?;
        let TokenKind::Ident(name) = head.value else {
            return Err(ParseError::at(head.span, format!("expected a command, found {}", head.value)));
        };

        let limits = self.limits;
        let (cmd, mut wait) = match name {
            "ttl" if self.check(TokenKind::Eq)? => {
                self.bump()?;
                (Cmd::TtlAll(self.int(u32::MAX, "TTL value")?), 0)
            }
            "ttl" => {
                let chn = self.channel(limits.ttl(), "TTL")?;
                self.expect(TokenKind::Eq)?;
                (Cmd::Ttl { chn, on: self.level()? }, 0)
            }
            "wait" => {
                self.expect(TokenKind::LParen)?;
                let n = self.int(u32::MAX, "wait duration")?;
                self.expect(TokenKind::RParen)?;
                (Cmd::Wait, n)
            }
            "clock" => {
                self.expect(TokenKind::LParen)?;
                let period = self.int(u8::MAX, "clock period")?;
                self.expect(TokenKind::RParen)?;
                (Cmd::Clock(period), 0)
            }
            "freq" => {
                let chn = self.channel(limits.dds_channels, "DDS")?;
                self.expect(TokenKind::Eq)?;
                (Cmd::Freq { chn, value: self.int(u32::MAX, "frequency")? }, 0)
            }
            "amp" => {
                let chn = self.channel(limits.dds_channels, "DDS")?;
                self.expect(TokenKind::Eq)?;
                (Cmd::Amp { chn, value: self.int(AMP_MAX, "amplitude")? }, 0)
            }
            "phase" => {
                let chn = self.channel(limits.dds_channels, "DDS")?;
                self.expect(TokenKind::Eq)?;
                (Cmd::Phase { chn, value: self.int(u16::MAX, "phase")? }, 0)
            }
            "dac" => {
                let chn = self.channel(limits.dac_channels, "DAC")?;
                self.expect(TokenKind::Eq)?;
                (Cmd::Dac { chn, value: self.int(u16::MAX, "DAC value")? }, 0)
            }
            other => return Err(ParseError::at(head.span, format!("unknown command `{other}`"))),
        };

        if self.check(TokenKind::Ident("t"))? {
            self.bump()?;
            self.expect(TokenKind::Eq)?;
            let extra = self.int(u32::MAX, "wait time")?;
            wait = wait
                .checked_add(extra)
                .ok_or_else(|| ParseError::range(self.last_span, "total wait overflows 32 bits"))?;
        }

        Ok(Stmt { cmd, wait, span: head.span.join(self.last_span) })
    }

    /// `"(" INT ")"` avec `INT < count`.
    fn channel(&mut self, count: u8, what: &str) -> PResult<u8> {
        self.expect(TokenKind::LParen)?;
        let t = self.bump()?;
        let chn = match t.value {
            TokenKind::Int(v) if v < u64::from(count) => u8::try_from(v).ok(),
            TokenKind::Int(v) => {
                return Err(ParseError::range(t.span, format!("{what} channel {v} out of range (0..{count})")));
            }
            other => {
                return Err(ParseError::at(t.span, format!("expected {what} channel number, found {other}")));
            }
        };
        let chn = chn.ok_or_else(|| ParseError::range(t.span, format!("invalid {what} channel")))?;
        self.expect(TokenKind::RParen)?;
        Ok(chn)
    }

    /// Littéral entier dans `0..=max`, converti vers le type de `max`.
    fn int<T>(&mut self, max: T, what: &str) -> PResult<T>
    where
        T: Copy + fmt::Display + Into<u64> + TryFrom<u64>,
    {
        let limit: u64 = max.into();
        let t = self.bump()?;
        match t.value {
            TokenKind::Int(v) if v <= limit => {
                T::try_from(v).map_err(|_| ParseError::range(t.span, format!("{what} {v} out of range (0..={max})")))
            }
            TokenKind::Int(v) => Err(ParseError::range(t.span, format!("{what} {v} out of range (0..={max})"))),
            other => Err(ParseError::at(t.span, format!("expected {what}, found {other}"))),
        }
    }

    fn level(&mut self) -> PResult<bool> {
        let t = self.bump()?;
        match t.value {
            TokenKind::Int(0) | TokenKind::Ident("off" | "false") => Ok(false),
            TokenKind::Int(1) | TokenKind::Ident("on" | "true") => Ok(true),
            TokenKind::Int(v) => Err(ParseError::range(t.span, format!("TTL level must be 0 or 1, got {v}"))),
            other => Err(ParseError::at(t.span, format!("expected a TTL level (0, 1, on, off), found {other}"))),
        }
    }

    /* ─────────── Utilitaires ─────────── */

    fn peek(&mut self) -> PResult<Token<'a>> {
        if let Some(t) = &self.look {
            return Ok(t.clone());
        }
        let t = match self.lx.next()? {
            Some(t) => t,
            None => Token::new(TokenKind::Eof, self.last_span),
        };
        self.look = Some(t.clone());
        Ok(t)
    }

    fn bump(&mut self) -> PResult<Token<'a>> {
        let t = self.peek()?;
        self.look = None;
        self.last_span = t.span;
        Ok(t)
    }

    fn check(&mut self, kind: TokenKind<'a>) -> PResult<bool> { Ok(self.peek()?.value == kind) }

    fn expect(&mut self, kind: TokenKind<'a>) -> PResult<Token<'a>> {
        let t = self.peek()?;
        if t.value == kind {
            return self.bump();
        }
        Err(ParseError::at(t.span, format!("expected {kind}, found {}", t.value)))
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
