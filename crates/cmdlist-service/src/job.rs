//! Exécution d’un job : adapter → estimateur → trame.
//!
//! Tourne sur un thread de travail. Les échecs de l’adapter sont capturés
//! dans l’issue ; un échec de l’estimateur sur du code que l’adapter vient de
//! produire est une violation de contrat et panique.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use cmdlist_compiler::{CompileFailure, Compiler, DurationEstimator, UNKNOWN_PARSER_ERROR};
use cmdlist_core::FrameHeader;

use crate::outcome::{CompileOutcome, Payload};

/// Compile `source` et capture exactement une issue.
///
/// # Panics
///
/// Si l’estimateur rejette le code produit par l’adapter.
pub fn execute<C>(compiler: &C, source: &str) -> CompileOutcome
where
    C: Compiler + DurationEstimator + ?Sized,
{
    let compiled = match catch_unwind(AssertUnwindSafe(|| compiler.compile(source))) {
        Ok(Ok(compiled)) => compiled,
        Ok(Err(CompileFailure::Syntax(e))) => return CompileOutcome::SyntaxFailure(e),
        Ok(Err(CompileFailure::Message(msg))) => return opaque(msg),
        Ok(Err(CompileFailure::Unknown)) => return opaque(String::new()),
        Err(panic) => return opaque(panic_message(&*panic).unwrap_or_default()),
    };

    let steps = match compiler.total_steps(&compiled.code) {
        Ok(steps) => steps,
        Err(e) => panic!("contract violation: duration estimator rejected compiler output: {e}"),
    };

    let header = FrameHeader::from_steps(steps, compiled.ttl_mask);
    tracing::trace!(steps, duration_ns = header.duration_ns, ttl_mask = header.ttl_mask, "framed");
    CompileOutcome::Success(Payload::encode(compiled.code, header))
}

fn opaque(msg: String) -> CompileOutcome {
    if msg.is_empty() {
        CompileOutcome::OpaqueFailure(UNKNOWN_PARSER_ERROR.to_owned())
    } else {
        CompileOutcome::OpaqueFailure(msg)
    }
}

/// Texte d’une charge de panique, quand elle en porte un.
pub fn panic_message(panic: &(dyn Any + Send)) -> Option<String> {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
}
