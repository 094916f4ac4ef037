//! Erreurs de syntaxe structurées et leur rendu « caret ».
//!
//! Colonnes 1-based, en octets dans la ligne fautive. `0` signifie
//! « absent » : une erreur sans plage a `colstart == colend == 0`.

use core::fmt;
use core::fmt::Write as _;

use cmdlist_core::Pos;
use cmdlist_lexer::LineMap;
use cmdlist_parser::ParseError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Erreur de syntaxe localisée.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SyntaxError {
    /// Message humain.
    pub message: String,
    /// Texte de la ligne fautive.
    pub line: String,
    /// Numéro de ligne (1-based).
    pub lineno: u32,
    /// Colonne principale (1-based, 0 = absente).
    pub colnum: u32,
    /// Début de la plage surlignée (1-based, 0 = absente).
    pub colstart: u32,
    /// Fin incluse de la plage surlignée (1-based, 0 = absente).
    pub colend: u32,
}

impl SyntaxError {
    /// Erreur pointant une seule colonne.
    pub fn new(message: impl Into<String>, line: impl Into<String>, lineno: u32, colnum: u32) -> Self {
        Self { message: message.into(), line: line.into(), lineno, colnum, colstart: 0, colend: 0 }
    }

    /// Ajoute une plage `[start, end]` (incluse).
    #[must_use]
    pub const fn with_range(mut self, colstart: u32, colend: u32) -> Self {
        self.colstart = colstart;
        self.colend = colend;
        self
    }

    /// Vrai si une plage est présente.
    pub const fn has_range(&self) -> bool { self.colstart > 0 && self.colend > 0 }

    /// Localise une erreur du parser dans `src`.
    pub fn from_parse(err: &ParseError, src: &str) -> Self {
        let lines = LineMap::new(src);
        let (lineno, colnum) = lines.line_col(err.span.start);
        let line = lines.line_text(lineno, src);
        // Un `\r` final n’apparaît pas dans `line` : au plus un cran après la fin.
        let width = u32::try_from(line.len()).unwrap_or(u32::MAX);
        let out = Self::new(err.message.clone(), line, lineno, colnum.min(width.saturating_add(1)));

        let Some(h) = err.highlight.filter(|h| !h.is_empty()) else { return out };
        let (l0, c0) = lines.line_col(h.start);
        let (l1, c1) = lines.line_col(Pos(h.end.0 - 1));
        let c1 = c1.min(width);
        if l0 == lineno && l1 == lineno && c0 <= c1 { out.with_range(c0, c1) } else { out }
    }

    /// Vue deux lignes façon éditeur :
    ///
    /// ```text
    /// SyntaxError: DAC channel 4 out of range (0..4)
    ///  1|dac(4) = 1
    ///   |    ^
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "SyntaxError: {}", self.message);

        let gutter = if self.lineno > 0 { format!(" {}", self.lineno) } else { String::new() };
        let _ = write!(out, "{gutter}|{}", self.line);

        let pad = " ".repeat(gutter.len());
        let (colnum, colstart, colend) = (self.colnum as usize, self.colstart as usize, self.colend as usize);
        if self.has_range() {
            let _ = write!(out, "\n{pad}|{}", " ".repeat(colstart - 1));
            if (colstart..=colend).contains(&colnum) {
                let _ = write!(out, "{}^{}", "~".repeat(colnum - colstart), "~".repeat(colend - colnum));
            } else {
                let _ = write!(out, "{}", "~".repeat(colend.saturating_sub(colstart) + 1));
            }
        } else if colnum > 0 {
            let _ = write!(out, "\n{pad}|{}^", " ".repeat(colnum - 1));
        }
        out
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{}: {}", self.lineno, self.colnum, self.message)
    }
}

impl std::error::Error for SyntaxError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CmdListCompiler, CompileFailure, Compiler, DurationEstimator};
    use cmdlist_parser::parse;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const PIECES: &[&str] = &[
        "ttl", "wait", "clock", "freq", "amp", "phase", "dac", "t", "on", "(", ")", "=", ";", " ", "\t",
        "\n", "\r\n", "\r", "# c", "0", "1", "3", "40", "300", "4095", "0x1F", "é", "€",
    ];

    fn syntax(src: &str) -> SyntaxError { SyntaxError::from_parse(&parse(src).unwrap_err(), src) }

    #[test]
    fn unterminated_on_first_line() {
        let e = syntax("ttl(3");
        assert_eq!((e.lineno, e.colnum, e.colstart, e.colend), (1, 6, 0, 0));
        assert_eq!(e.line, "ttl(3");
    }

    #[test]
    fn range_on_later_line() {
        let e = syntax("wait(1)\r\n  dac(17) = 0\n");
        assert_eq!(e.line, "  dac(17) = 0");
        assert_eq!((e.lineno, e.colnum, e.colstart, e.colend), (2, 7, 7, 8));
    }

    #[test]
    fn crlf_end_of_line_points_just_past_text() {
        let e = syntax("ttl\r\n");
        assert_eq!(e.line, "ttl");
        assert_eq!((e.lineno, e.colnum), (1, 4));
        assert!(!e.has_range() || e.colend as usize <= e.line.len());

        let e = syntax("wait(1)\r\nfreq\r\n");
        assert_eq!((e.line.as_str(), e.lineno, e.colnum), ("freq", 2, 5));
    }

    #[test]
    fn trailing_lone_cr_stays_on_line() {
        let e = syntax("ttl(3\r");
        assert_eq!(e.line, "ttl(3");
        assert_eq!((e.lineno, e.colnum), (1, 6));
    }

    #[test]
    fn render_caret_only() {
        let e = SyntaxError::new("expected `)`, found end of input", "ttl(3", 1, 6);
        assert_eq!(e.render(), "SyntaxError: expected `)`, found end of input\n 1|ttl(3\n  |     ^");
    }

    #[test]
    fn render_range_with_caret_inside() {
        let e = SyntaxError::new("bad", "freq(0) = 12345", 12, 12).with_range(11, 15);
        assert_eq!(e.render(), "SyntaxError: bad\n 12|freq(0) = 12345\n   |          ~^~~~");
    }

    #[test]
    fn render_range_without_caret_and_no_columns() {
        let e = SyntaxError::new("bad", "abc", 1, 0).with_range(2, 3);
        assert_eq!(e.render(), "SyntaxError: bad\n 1|abc\n  | ~~");
        let e = SyntaxError::new("bad", "abc", 0, 0);
        assert_eq!(e.render(), "SyntaxError: bad\n|abc");
    }

    proptest! {
        #[test]
        fn errors_stay_inside_their_line(parts in proptest::collection::vec(proptest::sample::select(PIECES), 0..24)) {
            let src = parts.concat();
            let c = CmdListCompiler::default();
            match c.compile(&src) {
                Ok(out) => prop_assert!(c.total_steps(&out.code).is_ok(), "estimator rejected {src:?}"),
                Err(CompileFailure::Syntax(e)) => {
                    let width = e.line.len() as u32;
                    prop_assert!(e.lineno >= 1 && e.lineno as usize <= LineMap::new(&src).line_count(), "{e:?} in {src:?}");
                    prop_assert!(e.colnum >= 1 && e.colnum <= width + 1, "{e:?} in {src:?}");
                    if e.has_range() {
                        prop_assert!(e.colstart <= e.colend && e.colend <= width, "{e:?} in {src:?}");
                    }
                }
                Err(other) => prop_assert!(false, "unexpected failure {other:?} for {src:?}"),
            }
        }
    }
}
