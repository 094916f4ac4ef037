//! Dispatch d’une issue vers le handler de l’appelant.
//!
//! Exécuté une seule fois par job, sur le contexte d’origine. Le handler est
//! un `FnOnce` consommé ici : il ne peut être appelé ni zéro ni deux fois.

use cmdlist_compiler::SyntaxError;

use crate::outcome::{CompileOutcome, Payload};

/// Fabrique des valeurs d’erreur remises au handler.
///
/// `syntax_error` reçoit les six champs d’une erreur de syntaxe, dans l’ordre
/// où un hôte dynamique les attend.
pub trait ErrorFactory {
    /// Valeur d’erreur produite.
    type Error;

    /// Construit l’erreur structurée.
    fn syntax_error(
        &self,
        message: &str,
        line: &str,
        lineno: u32,
        colnum: u32,
        colstart: u32,
        colend: u32,
    ) -> Self::Error;

    /// Construit l’erreur générique.
    fn generic_error(&self, message: &str) -> Self::Error;
}

/// Erreur remise par la fabrique par défaut.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Erreur de syntaxe.
    #[error("{}", .0.message)]
    Syntax(SyntaxError),
    /// Tout autre échec.
    #[error("{0}")]
    Generic(String),
}

/// Fabrique produisant des [`CompileError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorFactory;

impl ErrorFactory for DefaultErrorFactory {
    type Error = CompileError;

    fn syntax_error(
        &self,
        message: &str,
        line: &str,
        lineno: u32,
        colnum: u32,
        colstart: u32,
        colend: u32,
    ) -> CompileError {
        CompileError::Syntax(SyntaxError::new(message, line, lineno, colnum).with_range(colstart, colend))
    }

    fn generic_error(&self, message: &str) -> CompileError { CompileError::Generic(message.to_owned()) }
}

/// Transforme `outcome` en un unique appel de `handler`.
pub fn dispatch<F, H>(outcome: CompileOutcome, factory: &F, handler: H)
where
    F: ErrorFactory + ?Sized,
    H: FnOnce(Result<Payload, F::Error>),
{
    let delivered = match outcome {
        CompileOutcome::Success(payload) => Ok(payload),
        CompileOutcome::SyntaxFailure(e) => {
            Err(factory.syntax_error(&e.message, &e.line, e.lineno, e.colnum, e.colstart, e.colend))
        }
        CompileOutcome::OpaqueFailure(msg) => Err(factory.generic_error(&msg)),
    };
    handler(delivered);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdlist_core::FrameHeader;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    #[test]
    fn syntax_fields_reach_factory_unchanged() {
        let e = SyntaxError::new("bad channel", "dac(9)=1", 3, 5).with_range(5, 5);
        let got = RefCell::new(None);
        dispatch(CompileOutcome::SyntaxFailure(e.clone()), &DefaultErrorFactory, |r| {
            *got.borrow_mut() = Some(r);
        });
        assert_eq!(got.into_inner(), Some(Err(CompileError::Syntax(e))));
    }

    #[test]
    fn success_moves_payload() {
        let p = Payload::encode(vec![9], FrameHeader::default());
        let mut seen = Vec::new();
        dispatch(CompileOutcome::Success(p.clone()), &DefaultErrorFactory, |r| seen.push(r));
        assert_eq!(seen, vec![Ok(p)]);
    }

    #[test]
    fn opaque_uses_generic_error() {
        let mut seen = Vec::new();
        dispatch(CompileOutcome::OpaqueFailure("boom".into()), &DefaultErrorFactory, |r| seen.push(r));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap_err().to_string(), "boom");
    }
}
