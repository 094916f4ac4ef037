//! `labctrl.parse_cmdlist` vu depuis l’hôte.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use cmdlist_core::{FrameHeader, HEADER_LEN, NS_PER_STEP};
use cmdlist_runtime::{parse_error_class, Error, HostError, Runtime, Value};
use cmdlist_service::ServiceConfig;

type Calls = Rc<RefCell<Vec<Vec<Value>>>>;

fn runtime() -> Runtime {
    Runtime::new(&ServiceConfig { workers: 2, ..ServiceConfig::default() }).unwrap()
}

/// Callback qui enregistre ses arguments.
fn recorder(calls: &Calls) -> Value {
    let calls = Rc::clone(calls);
    Value::func(move |args| {
        calls.borrow_mut().push(args.to_vec());
        Ok(Value::Null)
    })
}

fn parse(rt: &mut Runtime, source: impl Into<Value>, calls: &Calls) {
    rt.call("labctrl.parse_cmdlist", &[source.into(), parse_error_class(), recorder(calls)]).unwrap();
}

#[test]
fn success_calls_back_with_null_and_bytes() {
    let mut rt = runtime();
    let calls = Calls::default();
    parse(&mut rt, "wait(100)", &calls);
    assert_eq!(rt.run_until_idle(), 1);

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    let [Value::Null, Value::Bytes(bin)] = calls[0].as_slice() else { panic!("unexpected args {:?}", calls[0]) };
    let (header, code) = cmdlist_core::frame::split_frame(bin).unwrap();
    assert_eq!(header, FrameHeader { duration_ns: 100 * NS_PER_STEP, ttl_mask: 0 });
    assert_eq!(bin.len(), HEADER_LEN + code.len());
}

#[test]
fn syntax_error_goes_through_host_constructor() {
    let mut rt = runtime();
    let calls = Calls::default();
    parse(&mut rt, "wait(1)\nttl(40) = 1", &calls);
    rt.run_until_idle();

    let calls = calls.borrow();
    let [err] = calls[0].as_slice() else { panic!("unexpected args {:?}", calls[0]) };
    let Value::Error(e) = err else { panic!("expected error, got {err:?}") };
    assert!(e.is("ParseError"));
    assert_eq!(err.get("line"), Some(&Value::from("ttl(40) = 1")));
    assert_eq!(err.get("lineno"), Some(&Value::I64(2)));
    assert_eq!(err.get("colnum"), Some(&Value::I64(5)));
}

#[test]
fn scenario_d_two_arguments_fail_synchronously() {
    let mut rt = runtime();
    let calls = Calls::default();
    let err = rt.call("labctrl.parse_cmdlist", &["wait(1)".into(), recorder(&calls)]).unwrap_err();

    assert!(matches!(err, Error::Arity { expected: 3, got: 2 }));
    assert_eq!(err.to_string(), "3 arguments expected");
    assert_eq!(rt.pending_count(), 0);
    assert_eq!(rt.run_until_idle(), 0);
    assert!(calls.borrow().is_empty());
}

#[test]
fn non_callable_arguments_are_type_errors() {
    let mut rt = runtime();
    let calls = Calls::default();
    let err = rt.call("labctrl.parse_cmdlist", &["wait(1)".into(), Value::Null, recorder(&calls)]).unwrap_err();
    assert!(matches!(err, Error::Type(_)), "{err}");
    let err = rt.call("labctrl.parse_cmdlist", &["wait(1)".into(), parse_error_class(), 3i64.into()]).unwrap_err();
    assert_eq!(err.to_string(), "argument 3 (callback) must be a function, got number");
    assert_eq!(rt.pending_count(), 0);
}

#[test]
fn source_is_coerced_to_text() {
    let mut rt = runtime();
    let calls = Calls::default();
    parse(&mut rt, 42i64, &calls);
    rt.run_until_idle();

    let calls = calls.borrow();
    let [err] = calls[0].as_slice() else { panic!("unexpected args {:?}", calls[0]) };
    assert_eq!(err.get("line"), Some(&Value::from("42")));
}

#[test]
fn failing_constructor_yields_generic_error() {
    let mut rt = runtime();
    let calls = Calls::default();
    let ctor = Value::func(|_| Err(Error::Msg("constructor exploded".into())));
    rt.call("labctrl.parse_cmdlist", &["clock(999)".into(), ctor, recorder(&calls)]).unwrap();
    rt.run_until_idle();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], vec![Value::Error(HostError::generic("constructor exploded"))]);
}

#[test]
fn failing_callback_is_not_redispatched() {
    let mut rt = runtime();
    let hits = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&hits);
    let callback = Value::func(move |_| {
        *counter.borrow_mut() += 1;
        Err(Error::Msg("handler threw".into()))
    });
    rt.call("labctrl.parse_cmdlist", &["wait(3)".into(), parse_error_class(), callback]).unwrap();
    assert_eq!(rt.run_until_idle(), 1);
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn many_requests_each_called_back_once() {
    let mut rt = runtime();
    let calls = Calls::default();
    for i in 0..50u32 {
        parse(&mut rt, format!("wait({i})"), &calls);
    }
    rt.poll();
    rt.run_until_idle();
    assert_eq!(calls.borrow().len(), 50);
    assert!(calls.borrow().iter().all(|args| args.len() == 2 && args[0] == Value::Null));
    rt.shutdown();
}
