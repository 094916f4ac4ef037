//! Variante Tokio : le job tourne sur le pool bloquant du runtime et
//! l’issue revient par le `JoinHandle`, consommé une seule fois.

use std::sync::Arc;

use cmdlist_compiler::{Compiler, DurationEstimator};

use crate::dispatch::{dispatch, ErrorFactory};
use crate::job;
use crate::outcome::{CompileOutcome, Payload};

/// Compile `source` hors du thread appelant.
///
/// # Panics
///
/// Re-lève, dans la tâche appelante, une violation de contrat survenue dans
/// le job.
pub async fn compile_async<C>(compiler: Arc<C>, source: String) -> CompileOutcome
where
    C: Compiler + DurationEstimator + ?Sized + 'static,
{
    let handle = tokio::task::spawn_blocking(move || job::execute(&*compiler, &source));
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => {
            tracing::warn!("blocking compile task cancelled by runtime shutdown");
            CompileOutcome::cancelled()
        }
    }
}

/// Compile puis dispatche dans la tâche appelante.
pub async fn compile_and_dispatch<C, F, H>(compiler: Arc<C>, source: String, factory: &F, handler: H)
where
    C: Compiler + DurationEstimator + ?Sized + 'static,
    F: ErrorFactory + ?Sized,
    H: FnOnce(Result<Payload, F::Error>),
{
    let outcome = compile_async(compiler, source).await;
    dispatch(outcome, factory, handler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DefaultErrorFactory;
    use cmdlist_compiler::CmdListCompiler;
    use cmdlist_core::HEADER_LEN;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn compiles_off_task() {
        let c = Arc::new(CmdListCompiler::default());
        let out = compile_async(Arc::clone(&c), "ttl(4)=on".into()).await;
        let CompileOutcome::Success(p) = out else { panic!("expected success") };
        assert_eq!(p.header().ttl_mask, 1 << 4);
        assert_eq!(p.header().duration_ns, 30);

        let mut got = None;
        compile_and_dispatch(c, String::new(), &DefaultErrorFactory, |r| got = Some(r)).await;
        assert_eq!(got.map(|r| r.map(|p| p.len())), Some(Ok(HEADER_LEN)));
    }
}
