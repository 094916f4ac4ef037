//! cmdlist-lexer : analyse lexicale des listes de commandes
//!
//! Faits saillants :
//! - `Lexer` : identifiants, entiers (2/8/10/16, `_`), ponctuation `( ) = ;`
//! - Commentaires `#` jusqu’à la fin de ligne
//! - Les fins de ligne sont des jetons (`Newline`) : elles terminent une commande
//! - `LineMap` pour `(ligne, colonne)` et le texte d’une ligne
//!
//! Exemple éclair :
//! ```
//! use cmdlist_core::SourceId;
//! use cmdlist_lexer::{Lexer, TokenKind};
//!
//! let mut lx = Lexer::new("ttl(3) = 1 t=100 # commentaire\n", SourceId(0));
//! let mut n = 0;
//! while let Ok(Some(tok)) = lx.next() {
//!     if matches!(tok.value, TokenKind::Eof) { break; }
//!     n += 1;
//! }
//! assert_eq!(n, 10);
//! ```

#![deny(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;

#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(not(feature = "std"))]
extern crate alloc;

use cmdlist_core::{Pos, SourceId, Span, Spanned};

/* ─────────────────────────── LineMap ─────────────────────────── */

/// Table des lignes pour (byte offset) → (ligne, colonne).
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Offsets des débuts de lignes (toujours contient 0).
    pub line_starts: Vec<u32>,
    /// Longueur totale de la source.
    pub len: u32,
}

impl LineMap {
    /// Construit la table à partir d’un `&str`.
    pub fn new(src: &str) -> Self {
        let mut ls = Vec::with_capacity(64);
        ls.push(0);
        for (i, b) in src.as_bytes().iter().enumerate() {
            if *b == b'\n' {
                ls.push((i as u32) + 1);
            }
        }
        Self { line_starts: ls, len: src.len() as u32 }
    }

    /// Convertit un `Pos` en (ligne, colonne), 1-based.
    pub fn line_col(&self, pos: Pos) -> (u32, u32) {
        let off = pos.0;
        let idx = match self.line_starts.binary_search(&off) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[idx];
        let col = off.saturating_sub(line_start) + 1;
        ((idx as u32) + 1, col)
    }

    /// Bornes `[début, fin)` de la ligne `line` (1-based), sans `\n` ni `\r` final.
    pub fn line_bounds(&self, line: u32, src: &str) -> (usize, usize) {
        let idx = (line.max(1) - 1) as usize;
        let Some(&start) = self.line_starts.get(idx) else {
            return (src.len(), src.len());
        };
        let mut end = self.line_starts.get(idx + 1).map_or(self.len, |next| next - 1) as usize;
        let start = start as usize;
        if end > start && src.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        (start, end)
    }

    /// Texte de la ligne `line` (1-based).
    pub fn line_text<'s>(&self, line: u32, src: &'s str) -> &'s str {
        let (start, end) = self.line_bounds(line, src);
        &src[start..end]
    }

    /// Nombre de lignes.
    pub fn line_count(&self) -> usize { self.line_starts.len() }
}

/* ─────────────────────────── Tokens ─────────────────────────── */

/// Genre de jeton lexical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// Fin de source.
    Eof,
    /// Fin de ligne (termine une commande).
    Newline,
    /// Identifiant (`ttl`, `wait`, `t`, `on`…).
    Ident(&'a str),
    /// Littéral entier non signé.
    Int(u64),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `=`
    Eq,
    /// `;`
    Semi,
}

impl fmt::Display for TokenKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Eof => write!(f, "end of input"),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Ident(s) => write!(f, "`{s}`"),
            TokenKind::Int(v) => write!(f, "`{v}`"),
            TokenKind::LParen => write!(f, "`(`"),
            TokenKind::RParen => write!(f, "`)`"),
            TokenKind::Eq => write!(f, "`=`"),
            TokenKind::Semi => write!(f, "`;`"),
        }
    }
}

/// Jeton avec span.
pub type Token<'a> = Spanned<TokenKind<'a>>;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Genre d’erreur lexicale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    /// Caractère inattendu.
    UnexpectedChar(char),
    /// Littéral numérique invalide.
    InvalidNumber,
    /// Dépassement entier u64.
    IntOverflow,
}

/// Erreur lexicale avec localisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// Localisation.
    pub span: Span,
    /// Genre d’erreur.
    pub kind: LexErrorKind,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LexErrorKind::UnexpectedChar(c) => write!(f, "unexpected character: {c:?}"),
            LexErrorKind::InvalidNumber => write!(f, "invalid number literal"),
            LexErrorKind::IntOverflow => write!(f, "integer literal overflows u64"),
        }
    }
}
#[cfg(feature = "std")]
impl std::error::Error for LexError {}

/* ─────────────────────────── Lexer ─────────────────────────── */

/// Analyseur lexical (itératif).
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    /// Position courante en bytes.
    off: usize,
    /// Id de la source.
    source: SourceId,
    /// Table des lignes (exposée pour diagnostics).
    pub lines: LineMap,
}

impl<'a> Lexer<'a> {
    /// Crée un lexer.
    pub fn new(src: &'a str, source: SourceId) -> Self {
        Self { src, bytes: src.as_bytes(), off: 0, source, lines: LineMap::new(src) }
    }

    /// Source lexée.
    pub const fn source_text(&self) -> &'a str { self.src }

    /// Prochain jeton. Émet `Eof` indéfiniment une fois la source épuisée.
    pub fn next(&mut self) -> Result<Option<Token<'a>>, LexError> {
        self.skip_blanks_and_comments();
        let start = self.off;
        let Some(c) = self.bump_char() else {
            return Ok(Some(Spanned { value: TokenKind::Eof, span: self.span_here(0) }));
        };

        let kind = match c {
            '\n' => TokenKind::Newline,
            '\r' => {
                // `\r` seul est un blanc : ici il précède toujours `\n`.
                self.off += 1;
                TokenKind::Newline
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '=' => TokenKind::Eq,
            ';' => TokenKind::Semi,
            ch if is_ident_start(ch) => {
                self.consume_while(|b| is_ident_continue(b as char));
                TokenKind::Ident(&self.src[start..self.off])
            }
            ch if ch.is_ascii_digit() => self.lex_number(start, ch)?,
            other => return Err(self.err_from(start, LexErrorKind::UnexpectedChar(other))),
        };

        Ok(Some(Spanned { value: kind, span: self.span_from(start) }))
    }

    /// Tokenise toute la source (ajoute `Eof` final).
    pub fn tokenize(mut self) -> Result<Vec<Token<'a>>, LexError> {
        let mut out = Vec::new();
        while let Some(t) = self.next()? {
            let is_eof = matches!(t.value, TokenKind::Eof);
            out.push(t);
            if is_eof { break; }
        }
        Ok(out)
    }

    /* ────────── Primitives internes ────────── */

    #[inline] fn peek(&self) -> Option<u8> { self.bytes.get(self.off).copied() }

    fn bump_char(&mut self) -> Option<char> {
        let c = self.src[self.off..].chars().next()?;
        self.off += c.len_utf8();
        Some(c)
    }

    fn consume_while(&mut self, mut p: impl FnMut(u8) -> bool) {
        while let Some(b) = self.peek() {
            if p(b) { self.off += 1; } else { break; }
        }
    }

    fn skip_blanks_and_comments(&mut self) {
        loop {
            while let Some(b) = self.peek() {
                let blank = matches!(b, b' ' | b'\t') || (b == b'\r' && !self.at_crlf());
                if !blank { break; }
                self.off += 1;
            }
            if self.peek() == Some(b'#') {
                self.consume_while(|b| b != b'\n');
                if self.off > 0 && self.bytes[self.off - 1] == b'\r' && self.peek() == Some(b'\n') {
                    self.off -= 1;
                }
                continue;
            }
            break;
        }
    }

    /// Vrai si la position courante est le `\r` d’un `\r\n`.
    #[inline] fn at_crlf(&self) -> bool { self.bytes.get(self.off..self.off + 2) == Some(b"\r\n".as_slice()) }

    fn lex_number(&mut self, start: usize, first: char) -> Result<TokenKind<'a>, LexError> {
        let radix = match (first, self.peek()) {
            ('0', Some(b'x' | b'X')) => 16,
            ('0', Some(b'b' | b'B')) => 2,
            ('0', Some(b'o' | b'O')) => 8,
            _ => 10,
        };
        let digits_start = if radix == 10 { start } else { self.off += 1; self.off };

        // Avale aussi les lettres collées (`12ab`, `0xfg`) pour rapporter le littéral entier.
        self.consume_while(|b| (b as char).is_ascii_alphanumeric() || b == b'_');
        let raw = &self.src[digits_start..self.off];
        let mut cleaned = [0u8; 80];
        let mut n = 0usize;
        for b in raw.bytes().filter(|&b| b != b'_') {
            if !is_digit_base(b as char, radix) {
                return Err(self.err_from(start, LexErrorKind::InvalidNumber));
            }
            if n == cleaned.len() {
                return Err(self.err_from(start, LexErrorKind::IntOverflow));
            }
            cleaned[n] = b;
            n += 1;
        }
        if n == 0 {
            return Err(self.err_from(start, LexErrorKind::InvalidNumber));
        }
        let text = core::str::from_utf8(&cleaned[..n])
            .map_err(|_| self.err_from(start, LexErrorKind::InvalidNumber))?;
        u64::from_str_radix(text, radix)
            .map(TokenKind::Int)
            .map_err(|_| self.err_from(start, LexErrorKind::IntOverflow))
    }

    /* ────────── Spans / erreurs ────────── */

    #[inline] fn span_here(&self, width: usize) -> Span {
        Span { source: self.source, start: Pos(self.off as u32), end: Pos((self.off + width) as u32) }
    }
    #[inline] fn span_from(&self, start: usize) -> Span {
        Span { source: self.source, start: Pos(start as u32), end: Pos(self.off as u32) }
    }
    #[inline] fn err_from(&self, start: usize, kind: LexErrorKind) -> LexError { LexError { span: self.span_from(start), kind } }
}

/* ─────────────────────────── Helpers ─────────────────────────── */

#[inline]
const fn is_ident_start(c: char) -> bool { c == '_' || c.is_ascii_alphabetic() }

#[inline]
const fn is_ident_continue(c: char) -> bool { c == '_' || c.is_ascii_alphanumeric() }

#[inline]
const fn is_digit_base(c: char, base: u32) -> bool {
    match base {
        2 => matches!(c, '0' | '1'),
        8 => c.is_ascii_digit() && (c as u32) < ('8' as u32),
        10 => c.is_ascii_digit(),
        16 => c.is_ascii_hexdigit(),
        _ => false,
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(src: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(src, SourceId(0)).tokenize().unwrap().into_iter().map(|t| t.value).collect()
    }

    #[test]
    fn command_line() {
        use TokenKind::*;
        assert_eq!(
            toks("ttl(3) = on t=100\n"),
            vec![Ident("ttl"), LParen, Int(3), RParen, Eq, Ident("on"), Ident("t"), Eq, Int(100), Newline, Eof]
        );
    }

    #[test]
    fn numbers_all_bases() {
        use TokenKind::*;
        assert_eq!(
            toks("0xFF 0o77 0b1010 123 1_234 0x_ffff_ffff"),
            vec![Int(255), Int(63), Int(10), Int(123), Int(1234), Int(0xFFFF_FFFF), Eof]
        );
    }

    #[test]
    fn comments_and_separators() {
        use TokenKind::*;
        assert_eq!(
            toks("# tout\nwait(1); wait(2) # fin\r\n"),
            vec![
                Newline, Ident("wait"), LParen, Int(1), RParen, Semi, Ident("wait"), LParen, Int(2),
                RParen, Newline, Eof
            ]
        );
    }

    #[test]
    fn bad_number_spans_literal() {
        let err = Lexer::new("wait(12ab)", SourceId(0)).tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::InvalidNumber);
        assert_eq!((err.span.start, err.span.end), (Pos(5), Pos(9)));

        let err = Lexer::new("0x", SourceId(0)).tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::InvalidNumber);

        let err = Lexer::new("99999999999999999999999", SourceId(0)).tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::IntOverflow);
    }

    #[test]
    fn unexpected_char_is_unicode_aware() {
        let err = Lexer::new("ttl = é", SourceId(0)).tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnexpectedChar('é'));
        assert_eq!(err.span.len(), 2);
    }

    #[test]
    fn crlf_is_one_newline_starting_at_cr() {
        let toks = Lexer::new("ttl\r\n# c\r\nwait \r (1)", SourceId(0)).tokenize().unwrap();
        let newlines: Vec<_> = toks
            .iter()
            .filter(|t| t.value == TokenKind::Newline)
            .map(|t| (t.span.start, t.span.end))
            .collect();
        assert_eq!(newlines, vec![(Pos(3), Pos(5)), (Pos(8), Pos(10))]);
        assert_eq!(toks.len(), 8);
    }

    #[test]
    fn linemap_basic() {
        let src = "a\nbb\r\nccc";
        let lm = LineMap::new(src);
        assert_eq!(lm.line_col(Pos(0)), (1, 1));
        assert_eq!(lm.line_col(Pos(2)), (2, 1));
        assert_eq!(lm.line_col(Pos(8)), (3, 3));
        assert_eq!(lm.line_text(1, src), "a");
        assert_eq!(lm.line_text(2, src), "bb");
        assert_eq!(lm.line_text(3, src), "ccc");
        assert_eq!(lm.line_count(), 3);
    }
}
