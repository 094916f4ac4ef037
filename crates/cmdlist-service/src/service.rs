//! Pool de compilation et boucle de complétion.
//!
//! ```text
//!  origine ── submit ──► [jobs] ──► worker 0..n ── execute ──► [done] ──► poll/wait_one ── dispatch ──► handler
//! ```
//!
//! Le handler et la fabrique d’erreurs restent sur le thread d’origine ; seul
//! le texte source part vers les workers et seule l’issue en revient.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, error, warn};

use cmdlist_compiler::{Compiler, DurationEstimator};

use crate::dispatch::{dispatch, ErrorFactory};
use crate::job;
use crate::outcome::{CompileOutcome, Payload};

/// Variable d’environnement fixant le nombre de workers.
pub const WORKERS_ENV: &str = "CMDLIST_WORKERS";

/// Message remis aux jobs en attente si tous les workers ont disparu.
const POOL_GONE: &str = "compile worker pool terminated";

/* ─────────────────────────── Configuration ─────────────────────────── */

/// Configuration du pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Nombre de threads de travail (0 → 1).
    pub workers: usize,
    /// Taille max de la file ; `None` = illimitée.
    pub queue_bound: Option<usize>,
    /// Préfixe des noms de threads.
    pub thread_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
            queue_bound: None,
            thread_name: "cmdlist-worker".to_owned(),
        }
    }
}

impl ServiceConfig {
    /// Valeurs par défaut, `CMDLIST_WORKERS` pris en compte s’il est valide.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var(WORKERS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.workers = n,
                _ => warn!(value = %raw, "ignoring invalid {WORKERS_ENV}"),
            }
        }
        cfg
    }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs synchrones du service (aucun job créé).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Création d’un thread impossible.
    #[error("failed to spawn compile worker: {0}")]
    Spawn(#[from] std::io::Error),
    /// File pleine (`queue_bound`).
    #[error("compile queue is full ({0} jobs)")]
    QueueFull(usize),
    /// Plus aucun worker pour recevoir le job.
    #[error("compile service is shut down")]
    ShutDown,
}

/* ─────────────────────────── Requêtes ─────────────────────────── */

/// Identifiant d’un job soumis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// Requête de compilation : consommée par un seul job.
pub struct CompileRequest<F, H> {
    /// Texte source.
    pub source: String,
    /// Fabrique d’erreurs.
    pub error_factory: F,
    /// Handler de complétion.
    pub handler: H,
}

impl<F, H> CompileRequest<F, H>
where
    F: ErrorFactory,
    H: FnOnce(Result<Payload, F::Error>),
{
    /// Construit une requête.
    pub fn new(source: impl Into<String>, error_factory: F, handler: H) -> Self {
        Self { source: source.into(), error_factory, handler }
    }
}

/// Travail envoyé aux workers.
struct Task {
    id: JobId,
    source: String,
    cancelled: Arc<AtomicBool>,
}

/// Issue renvoyée par un worker ; `Err` porte une violation de contrat.
struct Done {
    id: JobId,
    result: thread::Result<CompileOutcome>,
}

/// Côté origine d’un job en vol.
struct Pending {
    complete: Box<dyn FnOnce(CompileOutcome)>,
    cancelled: Arc<AtomicBool>,
}

/* ─────────────────────────── Service ─────────────────────────── */

/// Service de compilation.
///
/// Les handlers ne s’exécutent que dans [`poll`](Self::poll),
/// [`wait_one`](Self::wait_one) et [`run_until_idle`](Self::run_until_idle),
/// sur le thread qui possède le service.
pub struct CompileService<C> {
    jobs: Option<Sender<Task>>,
    done: Receiver<Done>,
    workers: Vec<JoinHandle<()>>,
    pending: HashMap<JobId, Pending>,
    next_id: u64,
    queue_bound: Option<usize>,
    /// Le compilateur vit dans les workers.
    compiler: PhantomData<fn() -> C>,
}

impl<C> CompileService<C>
where
    C: Compiler + DurationEstimator + 'static,
{
    /// Démarre le pool.
    pub fn new(compiler: C, config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::with_shared(Arc::new(compiler), config)
    }

    /// Démarre le pool sur un compilateur partagé.
    pub fn with_shared(compiler: Arc<C>, config: &ServiceConfig) -> Result<Self, ServiceError> {
        let (jobs_tx, jobs_rx) = match config.queue_bound {
            Some(n) => bounded::<Task>(n.max(1)),
            None => unbounded::<Task>(),
        };
        let (done_tx, done_rx) = unbounded::<Done>();

        let n = config.workers.max(1);
        let mut workers = Vec::with_capacity(n);
        for i in 0..n {
            let rx = jobs_rx.clone();
            let tx = done_tx.clone();
            let compiler = Arc::clone(&compiler);
            let handle = thread::Builder::new()
                .name(format!("{}-{i}", config.thread_name))
                .spawn(move || worker_loop(&*compiler, &rx, &tx))?;
            workers.push(handle);
        }
        debug!(workers = n, queue_bound = ?config.queue_bound, "compile service started");

        Ok(Self {
            jobs: Some(jobs_tx),
            done: done_rx,
            workers,
            pending: HashMap::new(),
            next_id: 0,
            queue_bound: config.queue_bound,
            compiler: PhantomData,
        })
    }
}

impl<C> CompileService<C> {
    /// Soumet une requête. Ne bloque jamais.
    ///
    /// En cas d’erreur, aucun job n’existe et le handler est abandonné sans
    /// être appelé.
    pub fn submit<F, H>(&mut self, request: CompileRequest<F, H>) -> Result<JobId, ServiceError>
    where
        F: ErrorFactory + 'static,
        H: FnOnce(Result<Payload, F::Error>) + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or(ServiceError::ShutDown)?;
        let id = JobId(self.next_id);
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = Task { id, source: request.source, cancelled: Arc::clone(&cancelled) };

        match jobs.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(ServiceError::QueueFull(self.queue_bound.unwrap_or(0))),
            Err(TrySendError::Disconnected(_)) => return Err(ServiceError::ShutDown),
        }
        self.next_id += 1;

        let CompileRequest { error_factory, handler, .. } = request;
        let complete = Box::new(move |outcome: CompileOutcome| dispatch(outcome, &error_factory, handler));
        self.pending.insert(id, Pending { complete, cancelled });
        debug!(job = %id, pending = self.pending.len(), "job submitted");
        Ok(id)
    }

    /// Raccourci : soumet `source` avec une fabrique et un handler.
    pub fn compile<F, H>(&mut self, source: impl Into<String>, factory: F, handler: H) -> Result<JobId, ServiceError>
    where
        F: ErrorFactory + 'static,
        H: FnOnce(Result<Payload, F::Error>) + 'static,
    {
        self.submit(CompileRequest::new(source, factory, handler))
    }

    /// Demande l’annulation d’un job.
    ///
    /// Un job pas encore démarré n’est pas compilé et se termine par
    /// `OpaqueFailure("compilation cancelled")`. Un job en cours se termine
    /// normalement. Renvoie `false` si le job n’est plus en attente.
    pub fn cancel(&mut self, id: JobId) -> bool {
        let Some(p) = self.pending.get(&id) else { return false };
        p.cancelled.store(true, Ordering::Release);
        warn!(job = %id, "cancellation requested");
        true
    }

    /// Nombre de jobs non encore dispatchés.
    pub fn pending_count(&self) -> usize { self.pending.len() }

    /// Dispatche toutes les issues déjà disponibles, sans bloquer.
    pub fn poll(&mut self) -> usize {
        let mut n = 0;
        while !self.pending.is_empty() {
            match self.done.try_recv() {
                Ok(done) => {
                    self.finish(done);
                    n += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    n += self.fail_all();
                    break;
                }
            }
        }
        n
    }

    /// Attend une issue et la dispatche. `None` si aucun job n’est en vol.
    pub fn wait_one(&mut self) -> Option<JobId> {
        if self.pending.is_empty() {
            return None;
        }
        if let Ok(done) = self.done.recv() {
            let id = done.id;
            self.finish(done);
            Some(id)
        } else {
            let first = self.pending.keys().min().copied();
            self.fail_all();
            first
        }
    }

    /// Dispatche jusqu’à épuisement des jobs en vol. Renvoie le nombre de
    /// handlers appelés, y compris ceux échoués d’un coup si le pool a disparu.
    pub fn run_until_idle(&mut self) -> usize {
        let mut n = 0;
        while !self.pending.is_empty() {
            match self.done.recv() {
                Ok(done) => {
                    self.finish(done);
                    n += 1;
                }
                Err(_) => n += self.fail_all(),
            }
        }
        n
    }

    /// Dispatche tout ce qui reste puis arrête les workers.
    pub fn shutdown(mut self) { self.close(); }

    fn finish(&mut self, done: Done) {
        let Some(p) = self.pending.remove(&done.id) else {
            warn!(job = %done.id, "completion for unknown job dropped");
            return;
        };
        let _span = debug_span!("dispatch", job = %done.id).entered();
        match done.result {
            Ok(outcome) => {
                debug!(kind = outcome.kind(), "dispatching");
                (p.complete)(outcome);
            }
            Err(panic) => {
                let msg = job::panic_message(&*panic).unwrap_or_default();
                error!(message = %msg, "compile pipeline violated its contract; re-raising");
                resume_unwind(panic);
            }
        }
    }

    fn fail_all(&mut self) -> usize {
        let ids: Vec<JobId> = self.pending.keys().copied().collect();
        error!(pending = ids.len(), "{POOL_GONE}");
        for id in &ids {
            if let Some(p) = self.pending.remove(id) {
                (p.complete)(CompileOutcome::OpaqueFailure(POOL_GONE.to_owned()));
            }
        }
        ids.len()
    }

    fn close(&mut self) {
        if self.jobs.is_none() && self.workers.is_empty() {
            return;
        }
        self.run_until_idle();
        self.jobs = None;
        for w in self.workers.drain(..) {
            if w.join().is_err() {
                error!("compile worker exited by panic");
            }
        }
        debug!("compile service stopped");
    }
}

impl<C> Drop for CompileService<C> {
    fn drop(&mut self) {
        // Pas de dispatch pendant un déroulement de pile : les workers
        // s’arrêtent d’eux-mêmes quand la file se ferme.
        if thread::panicking() {
            return;
        }
        self.close();
    }
}

fn worker_loop<C>(compiler: &C, jobs: &Receiver<Task>, done: &Sender<Done>)
where
    C: Compiler + DurationEstimator + ?Sized,
{
    for task in jobs {
        let span = debug_span!("compile_job", job = %task.id, len = task.source.len());
        let _guard = span.enter();
        let result = if task.cancelled.load(Ordering::Acquire) {
            debug!("skipped: cancelled before start");
            Ok(CompileOutcome::cancelled())
        } else {
            catch_unwind(AssertUnwindSafe(|| job::execute(compiler, &task.source)))
        };
        if done.send(Done { id: task.id, result }).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use cmdlist_compiler::CmdListCompiler;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::DefaultErrorFactory;

    #[test]
    fn lost_pool_fails_every_pending_job_and_counts_them() {
        let cfg = ServiceConfig { workers: 1, ..ServiceConfig::default() };
        let mut svc = CompileService::new(CmdListCompiler::default(), &cfg).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let seen = Rc::clone(&seen);
            svc.compile(format!("wait({n})"), DefaultErrorFactory, move |r| {
                seen.borrow_mut().push(r.unwrap_err().to_string());
            })
            .unwrap();
        }
        // Plus aucun émetteur côté workers : la boucle voit un canal déconnecté.
        let (_, orphan) = unbounded();
        svc.done = orphan;

        assert_eq!(svc.run_until_idle(), 3);
        assert_eq!(svc.pending_count(), 0);
        assert_eq!(*seen.borrow(), vec![POOL_GONE.to_owned(); 3]);
    }
}
