//! cmdlist-runtime : Frontière hôte pour la compilation de listes de commandes
//!
//! Modèle d’un environnement de script dynamique qui appelle le compilateur :
//! - [`Value`] : type dynamique (null, bool, nombres, texte, bytes, objets,
//!   erreurs, fonctions)
//! - [`Runtime`] : registre de natives `module.name` avec arité minimale
//! - [`RuntimeCtx`] : contexte passé aux natives (service de compilation)
//! - `labctrl.parse_cmdlist(source, ParseError, callback)` : compile hors du
//!   thread appelant puis rappelle `callback(null, bytes)` ou `callback(err)`
//!
//! Les callbacks ne s’exécutent que dans [`Runtime::poll`] et
//! [`Runtime::run_until_idle`], sur le thread qui possède le runtime.

#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

use std::collections::HashMap;

use thiserror::Error;
use tracing::trace;

use cmdlist_compiler::{CmdListCompiler, CompilerOptions};
use cmdlist_service::{CompileService, ServiceConfig, ServiceError};

pub mod labctrl;
pub mod value;

pub use labctrl::HostErrorFactory;
pub use value::{parse_error_class, HostError, HostFn, Value};

/* ------------------------------ Erreurs ------------------------------ */

/// Erreurs runtime, levées de façon synchrone vers l’appelant.
#[derive(Debug, Error)]
pub enum Error {
    /// Fonction native introuvable.
    #[error("unknown native function: {0}")]
    NotFound(String),

    /// Trop peu d’arguments.
    #[error("{expected} arguments expected")]
    Arity {
        /// Nombre minimal d’arguments.
        expected: usize,
        /// Nombre effectivement reçu.
        got: usize,
    },

    /// Argument du mauvais type.
    #[error("{0}")]
    Type(String),

    /// Soumission refusée par le service.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Message générique.
    #[error("{0}")]
    Msg(String),
}

/// Résultat du runtime.
pub type RResult<T> = std::result::Result<T, Error>;

/* -------------------------- Signature des natives -------------------------- */

/// Fonction native : reçoit des [`Value`] et le contexte.
pub type NativeFn = fn(&[Value], &mut RuntimeCtx) -> RResult<Value>;

/// Descripteur d’une native.
#[derive(Clone)]
pub struct NativeEntry {
    /// Nom complet `module.name`
    pub fqname: String,
    /// Arité minimale ; `None` = libre.
    pub min_arity: Option<usize>,
    /// Pointeur de fonction.
    pub func: NativeFn,
}

/* ------------------------------ Contexte ------------------------------ */

/// Contexte passé aux natives.
pub struct RuntimeCtx {
    /// Service de compilation partagé par toutes les natives.
    pub service: CompileService<CmdListCompiler>,
}

/* ------------------------------ Runtime ------------------------------ */

/// Runtime : registre de natives + contexte.
pub struct Runtime {
    registry: HashMap<String, NativeEntry>,
    ctx: RuntimeCtx,
}

impl Runtime {
    /// Runtime avec les options de compilation par défaut et les natives
    /// `labctrl`.
    ///
    /// # Errors
    ///
    /// Si le pool de workers ne démarre pas.
    pub fn new(config: &ServiceConfig) -> RResult<Self> { Self::with_options(CompilerOptions::default(), config) }

    /// Comme [`new`](Self::new), avec des limites de canaux choisies.
    ///
    /// # Errors
    ///
    /// Si le pool de workers ne démarre pas.
    pub fn with_options(opts: CompilerOptions, config: &ServiceConfig) -> RResult<Self> {
        let service = CompileService::new(CmdListCompiler::new(opts), config)?;
        let mut rt = Self { registry: HashMap::new(), ctx: RuntimeCtx { service } };
        rt.register_all("labctrl", &[("parse_cmdlist", Some(3), labctrl::parse_cmdlist as NativeFn)]);
        Ok(rt)
    }

    /// Enregistre une fonction native sous `module` + `name`.
    pub fn register_fn(&mut self, module: &str, name: &str, min_arity: Option<usize>, func: NativeFn) {
        let fq = format!("{module}.{name}");
        self.registry.insert(fq.clone(), NativeEntry { fqname: fq, min_arity, func });
    }

    /// Enregistre un lot (module complet).
    pub fn register_all(&mut self, module: &str, entries: &[(&str, Option<usize>, NativeFn)]) {
        for (name, arity, func) in entries {
            self.register_fn(module, name, *arity, *func);
        }
    }

    /// `true` si `fqname` est enregistrée.
    pub fn has(&self, fqname: &str) -> bool { self.registry.contains_key(fqname) }

    /// Appelle une native par `module.name`.
    ///
    /// # Errors
    ///
    /// Native inconnue, arité insuffisante, ou erreur levée par la native.
    pub fn call<S: AsRef<str>>(&mut self, fqname: S, args: &[Value]) -> RResult<Value> {
        let key = fqname.as_ref();
        let entry = self.registry.get(key).ok_or_else(|| Error::NotFound(key.to_owned()))?;
        if let Some(min) = entry.min_arity {
            if args.len() < min {
                return Err(Error::Arity { expected: min, got: args.len() });
            }
        }
        trace!(native = key, argc = args.len(), "native call");
        (entry.func)(args, &mut self.ctx)
    }

    /// Rappels en attente.
    pub fn pending_count(&self) -> usize { self.ctx.service.pending_count() }

    /// Exécute les rappels déjà prêts, sans bloquer.
    pub fn poll(&mut self) -> usize { self.ctx.service.poll() }

    /// Bloque jusqu’à ce que tous les rappels aient eu lieu.
    pub fn run_until_idle(&mut self) -> usize { self.ctx.service.run_until_idle() }

    /// Rappelle tout ce qui reste puis arrête les workers.
    pub fn shutdown(self) { self.ctx.service.shutdown(); }
}

/* ----------------------------- Macro sucrée ----------------------------- */

/// Déclare une native avec la signature de [`NativeFn`].
///
/// # Exemple
/// ```
/// use cmdlist_runtime::{cmdlist_native, Value};
/// cmdlist_native!(argc |args, _ctx| {
///     Ok(Value::I64(args.len() as i64))
/// });
/// ```
#[macro_export]
macro_rules! cmdlist_native {
    ($(#[$meta:meta])* $name:ident |$args:ident, $ctx:ident| $body:block) => {
        $(#[$meta])*
        pub fn $name($args: &[$crate::Value], $ctx: &mut $crate::RuntimeCtx) -> $crate::RResult<$crate::Value> {
            $body
        }
    };
}
