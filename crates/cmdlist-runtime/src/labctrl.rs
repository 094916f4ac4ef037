//! Module natif `labctrl`.

use tracing::{debug, warn};

use cmdlist_service::{ErrorFactory, Payload};

use crate::value::{HostError, HostFn, Value};
use crate::{Error, RResult};

/// Fabrique d’erreurs qui appelle le constructeur fourni par l’hôte.
///
/// Si le constructeur échoue, le rappel reçoit une erreur générique portant
/// le message de cet échec.
pub struct HostErrorFactory {
    ctor: HostFn,
}

impl HostErrorFactory {
    /// Fabrique sur le constructeur `ctor`.
    pub const fn new(ctor: HostFn) -> Self { Self { ctor } }
}

impl ErrorFactory for HostErrorFactory {
    type Error = Value;

    fn syntax_error(
        &self,
        message: &str,
        line: &str,
        lineno: u32,
        colnum: u32,
        colstart: u32,
        colend: u32,
    ) -> Value {
        let args = [
            Value::from(message),
            Value::from(line),
            Value::from(lineno),
            Value::from(colnum),
            Value::from(colstart),
            Value::from(colend),
        ];
        self.ctor.call(&args).unwrap_or_else(|e| {
            warn!(error = %e, "ParseError constructor failed");
            Value::Error(HostError::generic(e.to_string()))
        })
    }

    fn generic_error(&self, message: &str) -> Value { Value::Error(HostError::generic(message)) }
}

fn expect_func(v: &Value, pos: usize, what: &str) -> RResult<HostFn> {
    v.as_func()
        .cloned()
        .ok_or_else(|| Error::Type(format!("argument {pos} ({what}) must be a function, got {}", v.type_name())))
}

fn deliver(callback: &HostFn, result: Result<Payload, Value>) {
    let args = match result {
        Ok(payload) => vec![Value::Null, Value::Bytes(payload.into_vec())],
        Err(err) => vec![err],
    };
    if let Err(e) = callback.call(&args) {
        warn!(error = %e, "parse_cmdlist callback failed");
    }
}

crate::cmdlist_native!(
    /// `labctrl.parse_cmdlist(source, ParseError, callback)`.
    ///
    /// La source est convertie en texte comme le ferait l’hôte. Ne rend rien ;
    /// le résultat arrive plus tard par `callback`.
    ///
    /// # Errors
    ///
    /// Moins de trois arguments, constructeur ou rappel non appelable, ou
    /// soumission refusée. Aucun job n’est créé dans ces cas.
    parse_cmdlist |args, ctx| {
        let [source, ctor, callback, ..] = args else {
            return Err(Error::Arity { expected: 3, got: args.len() });
        };
        let ctor = expect_func(ctor, 2, "ParseError")?;
        let callback = expect_func(callback, 3, "callback")?;

        let id = ctx.service.compile(source.to_string(), HostErrorFactory::new(ctor), move |res| {
            deliver(&callback, res);
        })?;
        debug!(job = %id, "parse_cmdlist queued");
        Ok(Value::Null)
    }
);
