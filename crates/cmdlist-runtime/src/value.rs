//! Valeurs dynamiques échangées avec l’hôte.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::{Error, RResult};

/* --------------------------- Types de valeur --------------------------- */

/// Valeur dynamique vue par les natives.
///
/// Les fonctions hôtes sont tenues par `Rc` : elles ne quittent jamais le
/// thread qui possède le runtime.
#[derive(Clone, PartialEq)]
pub enum Value {
    /// Null / absence de valeur.
    Null,
    /// Booléen.
    Bool(bool),
    /// Entier 64 bits signé.
    I64(i64),
    /// Flottant 64 bits.
    F64(f64),
    /// Chaîne UTF-8 possédée.
    Str(String),
    /// Blob binaire (tampon hôte).
    Bytes(Vec<u8>),
    /// Objet clé → valeur.
    Map(BTreeMap<String, Value>),
    /// Objet erreur.
    Error(HostError),
    /// Fonction appelable.
    Func(HostFn),
}

impl Value {
    /// Enveloppe une closure en valeur appelable.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&[Self]) -> RResult<Self> + 'static,
    {
        Self::Func(HostFn::new(f))
    }

    /// Nom de type court, pour les messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::I64(_) | Self::F64(_) => "number",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Map(_) => "object",
            Self::Error(_) => "error",
            Self::Func(_) => "function",
        }
    }

    /// Fonction portée par la valeur, s’il y en a une.
    pub const fn as_func(&self) -> Option<&HostFn> {
        if let Self::Func(f) = self { Some(f) } else { None }
    }

    /// Champ `key` d’un objet ou d’une erreur.
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(m) => m.get(key),
            Self::Error(e) => e.fields.get(key),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::I64(i) => write!(f, "I64({i})"),
            Self::F64(x) => write!(f, "F64({x})"),
            Self::Str(s) => {
                match s.char_indices().nth(64) {
                    Some((cut, _)) => write!(f, "Str({}…)", &s[..cut]),
                    None => write!(f, "Str({s})"),
                }
            }
            Self::Bytes(b) => write!(f, "Bytes(len={})", b.len()),
            Self::Map(m) => f.debug_map().entries(m.iter()).finish(),
            Self::Error(e) => write!(f, "Error({e})"),
            Self::Func(_) => write!(f, "Func"),
        }
    }
}

/// Conversion en texte façon hôte dynamique : `42` → `"42"`, `1.0` → `"1"`,
/// `true` → `"true"`, objets → `"[object Object]"`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I64(i) => write!(f, "{i}"),
            Self::F64(x) => fmt_number(*x, f),
            Self::Str(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::Map(_) => f.write_str("[object Object]"),
            Self::Error(e) => write!(f, "{e}"),
            Self::Func(_) => f.write_str("function"),
        }
    }
}

fn fmt_number(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.is_nan() {
        f.write_str("NaN")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "Infinity" } else { "-Infinity" })
    } else if x == 0.0 {
        // -0 compris
        f.write_str("0")
    } else {
        write!(f, "{x}")
    }
}

/* Conversions */
impl From<()> for Value { fn from((): ()) -> Self { Self::Null } }
impl From<bool> for Value { fn from(v: bool) -> Self { Self::Bool(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Self::I64(v) } }
impl From<u32> for Value { fn from(v: u32) -> Self { Self::I64(i64::from(v)) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Self::F64(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Self::Str(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Self::Str(v.to_owned()) } }
impl From<Vec<u8>> for Value { fn from(v: Vec<u8>) -> Self { Self::Bytes(v) } }
impl From<HostError> for Value { fn from(v: HostError) -> Self { Self::Error(v) } }

impl TryFrom<Value> for i64 {
    type Error = Error;
    fn try_from(v: Value) -> RResult<Self> {
        match v {
            Value::I64(i) => Ok(i),
            other => Err(Error::Type(format!("expected number, got {}", other.type_name()))),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = Error;
    fn try_from(v: Value) -> RResult<Self> {
        match v {
            Value::Str(s) => Ok(s),
            other => Err(Error::Type(format!("expected string, got {}", other.type_name()))),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = Error;
    fn try_from(v: Value) -> RResult<Self> {
        match v {
            Value::Bytes(b) => Ok(b),
            other => Err(Error::Type(format!("expected bytes, got {}", other.type_name()))),
        }
    }
}

/* ------------------------------ Fonctions ------------------------------ */

/// Fonction hôte partagée.
#[derive(Clone)]
pub struct HostFn(Rc<dyn Fn(&[Value]) -> RResult<Value>>);

impl HostFn {
    /// Enveloppe une closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> RResult<Value> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Appelle la fonction.
    ///
    /// # Errors
    ///
    /// Toute erreur levée par la fonction.
    pub fn call(&self, args: &[Value]) -> RResult<Value> { (self.0)(args) }
}

/// Égalité d’identité.
impl PartialEq for HostFn {
    fn eq(&self, other: &Self) -> bool { Rc::ptr_eq(&self.0, &other.0) }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("HostFn") }
}

/* ------------------------------ Erreurs hôte ------------------------------ */

/// Objet erreur côté hôte : une classe, un message, des champs libres.
#[derive(Debug, Clone, PartialEq)]
pub struct HostError {
    /// Nom de classe (`Error`, `ParseError`, …).
    pub class: String,
    /// Message.
    pub message: String,
    /// Champs supplémentaires.
    pub fields: BTreeMap<String, Value>,
}

impl HostError {
    /// Erreur générique (`Error`).
    pub fn generic(message: impl Into<String>) -> Self {
        Self { class: "Error".to_owned(), message: message.into(), fields: BTreeMap::new() }
    }

    /// Ajoute un champ.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_owned(), value.into());
        self
    }

    /// `true` si l’erreur est de classe `class`.
    pub fn is(&self, class: &str) -> bool { self.class == class }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}: {}", self.class, self.message) }
}

/// Constructeur `ParseError(msg, line, lineno, colnum, colstart, colend)`
/// tel que l’hôte le passe à `labctrl.parse_cmdlist`.
///
/// Les arguments manquants valent `null`.
pub fn parse_error_class() -> Value {
    const FIELDS: [&str; 6] = ["msg", "line", "lineno", "colnum", "colstart", "colend"];
    Value::func(|args| {
        let mut err = HostError { class: "ParseError".to_owned(), message: String::new(), fields: BTreeMap::new() };
        for (i, key) in FIELDS.iter().enumerate() {
            err = err.with_field(key, args.get(i).cloned().unwrap_or(Value::Null));
        }
        err.message = err.fields.get("msg").map(ToString::to_string).unwrap_or_default();
        Ok(Value::Error(err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn coercion_like_a_dynamic_host() {
        assert_eq!(Value::from(42i64).to_string(), "42");
        assert_eq!(Value::F64(1.0).to_string(), "1");
        assert_eq!(Value::F64(-0.0).to_string(), "0");
        assert_eq!(Value::F64(2.5).to_string(), "2.5");
        assert_eq!(Value::F64(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::F64(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Map(BTreeMap::new()).to_string(), "[object Object]");
        assert_eq!(Value::from(b"wait(1)".to_vec()).to_string(), "wait(1)");
    }

    #[test]
    fn func_identity_and_call() {
        let f = Value::func(|args| Ok(Value::I64(i64::try_from(args.len()).unwrap_or(-1))));
        let g = f.clone();
        assert_eq!(f, g);
        assert_ne!(f, Value::func(|_| Ok(Value::Null)));
        assert_eq!(f.as_func().unwrap().call(&[Value::Null, Value::Null]).unwrap(), Value::I64(2));
    }

    #[test]
    fn parse_error_class_keeps_six_fields() {
        let ctor = parse_error_class();
        let args = ["bad".into(), "ttl(99)=1".into(), 2u32.into(), 5u32.into(), 5u32.into(), 6u32.into()];
        let v = ctor.as_func().unwrap().call(&args).unwrap();
        let Value::Error(e) = &v else { panic!("expected error, got {v:?}") };
        assert!(e.is("ParseError"));
        assert_eq!(e.message, "bad");
        assert_eq!(v.get("line"), Some(&Value::from("ttl(99)=1")));
        assert_eq!(v.get("colend"), Some(&Value::I64(6)));
    }

    #[test]
    fn try_from_reports_type() {
        let err = String::try_from(Value::I64(1)).unwrap_err();
        assert_eq!(err.to_string(), "expected string, got number");
        assert_eq!(Vec::<u8>::try_from(Value::Bytes(vec![1])).unwrap(), vec![1]);
    }

    #[test]
    fn debug_truncates_on_char_boundary() {
        let s = "é".repeat(70);
        let d = format!("{:?}", Value::Str(s));
        assert!(d.ends_with("…)"));
        assert_eq!(d.chars().filter(|&c| c == 'é').count(), 64);
    }
}
