//! cmdlist-service : compilation hors du thread appelant
//!
//! Une requête `(source, fabrique d’erreurs, handler)` devient un job :
//! 1. l’adapter compile la source (code + masque TTL) ;
//! 2. l’estimateur compte les pas, `durée = pas × NS_PER_STEP` ;
//! 3. l’en-tête `[durée ns u64 LE][masque u32 LE]` est préfixé au code ;
//! 4. l’issue revient au thread d’origine qui appelle le handler une fois.
//!
//! ```
//! use cmdlist_compiler::CmdListCompiler;
//! use cmdlist_service::{CompileService, DefaultErrorFactory, ServiceConfig};
//!
//! let mut svc = CompileService::new(CmdListCompiler::default(), &ServiceConfig::default()).unwrap();
//! svc.compile("wait(100)", DefaultErrorFactory, |res| {
//!     let payload = res.unwrap();
//!     assert_eq!(payload.header().duration_ns, 1000);
//! })
//! .unwrap();
//! assert_eq!(svc.run_until_idle(), 1);
//! ```
//!
//! Features :
//! - `tokio` (par défaut) : [`compile_async`] sur `spawn_blocking`

#![deny(missing_docs)]

pub mod dispatch;
pub mod job;
pub mod outcome;
pub mod service;

#[cfg(feature = "tokio")]
pub mod async_compile;

pub use dispatch::{dispatch, CompileError, DefaultErrorFactory, ErrorFactory};
pub use job::execute;
pub use outcome::{CompileOutcome, Payload, CANCELLED};
pub use service::{CompileRequest, CompileService, JobId, ServiceConfig, ServiceError, WORKERS_ENV};

#[cfg(feature = "tokio")]
pub use async_compile::{compile_and_dispatch, compile_async};
