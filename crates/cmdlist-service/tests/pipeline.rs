//! Bout en bout : soumission → workers → dispatch sur le thread du test.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crossbeam_channel::{bounded, Receiver, Sender};
use pretty_assertions::assert_eq;

use cmdlist_compiler::{bytecode, CmdListCompiler, CompileFailure, Compiled, Compiler, DurationEstimator};
use cmdlist_core::{CoreResult, FrameHeader, HEADER_LEN, NS_PER_STEP};
use cmdlist_service::{
    CompileError, CompileRequest, CompileService, DefaultErrorFactory, JobId, Payload,
    ServiceConfig, ServiceError, CANCELLED,
};

type Slot = Rc<RefCell<Vec<Result<Payload, CompileError>>>>;

fn service(workers: usize) -> CompileService<CmdListCompiler> {
    let cfg = ServiceConfig { workers, ..ServiceConfig::default() };
    CompileService::new(CmdListCompiler::default(), &cfg).unwrap()
}

fn submit_into(svc: &mut CompileService<impl Compiler + DurationEstimator + 'static>, src: &str, slot: &Slot) -> JobId {
    let slot = Rc::clone(slot);
    svc.compile(src, DefaultErrorFactory, move |r| slot.borrow_mut().push(r)).unwrap()
}

#[test]
fn scenario_a_valid_program() {
    let mut svc = service(2);
    let slot = Slot::default();
    submit_into(&mut svc, "wait(100)", &slot);
    assert_eq!(svc.run_until_idle(), 1);

    let got = slot.borrow_mut().pop().unwrap().unwrap();
    let (code, mask) = bytecode::encode(&cmdlist_parser::parse("wait(100)").unwrap());
    assert_eq!(got.len(), HEADER_LEN + code.len());
    assert_eq!(u64::from_le_bytes(got.as_bytes()[..8].try_into().unwrap()), 100 * NS_PER_STEP);
    assert_eq!(u32::from_le_bytes(got.as_bytes()[8..12].try_into().unwrap()), mask);
    assert_eq!(got.code(), &code[..]);
}

#[test]
fn scenario_b_unterminated_expression() {
    let mut svc = service(1);
    let slot = Slot::default();
    submit_into(&mut svc, "freq(2) = ", &slot);
    svc.run_until_idle();

    let err = slot.borrow_mut().pop().unwrap().unwrap_err();
    let CompileError::Syntax(e) = err else { panic!("expected syntax error, got {err:?}") };
    assert_eq!(e.lineno, 1);
    assert_eq!(e.colnum, 11);
    assert_eq!(e.line, "freq(2) = ");
    assert_eq!((e.colstart, e.colend), (0, 0));
}

#[test]
fn scenario_c_empty_source_is_empty_program() {
    let mut svc = service(1);
    let slot = Slot::default();
    submit_into(&mut svc, "", &slot);
    submit_into(&mut svc, "  \n# only a comment\n", &slot);
    svc.run_until_idle();

    for r in slot.borrow_mut().drain(..) {
        let p = r.unwrap();
        assert_eq!(p.as_bytes(), &[0u8; HEADER_LEN]);
        assert_eq!(p.header(), FrameHeader::default());
    }
}

#[test]
fn every_request_dispatched_exactly_once() {
    let mut svc = service(4);
    let calls: Rc<RefCell<BTreeMap<u64, usize>>> = Rc::default();
    for i in 0..200u64 {
        let calls = Rc::clone(&calls);
        let src = if i % 7 == 0 { format!("ttl({i}) = on") } else { format!("wait({i}) t=1") };
        svc.compile(src, DefaultErrorFactory, move |_| *calls.borrow_mut().entry(i).or_default() += 1).unwrap();
    }
    svc.poll();
    svc.run_until_idle();
    assert_eq!(svc.pending_count(), 0);
    assert_eq!(calls.borrow().len(), 200);
    assert!(calls.borrow().values().all(|&n| n == 1));
    assert_eq!(svc.wait_one(), None);
}

#[test]
fn durations_match_independent_step_count() {
    let srcs = ["ttl = 1", "clock(3) t=4; amp(0)=10", "dac(0)=1\nphase(5)=7 t=1000"];
    let mut svc = service(3);
    let slot = Slot::default();
    for s in srcs {
        let slot = Rc::clone(&slot);
        let src = s.to_owned();
        svc.compile(s, DefaultErrorFactory, move |r| {
            let p = r.unwrap();
            let (code, mask) = bytecode::encode(&cmdlist_parser::parse(&src).unwrap());
            let steps = bytecode::total_steps(&code).unwrap();
            assert_eq!(p.header(), FrameHeader { duration_ns: steps * NS_PER_STEP, ttl_mask: mask });
            slot.borrow_mut().push(Ok(p));
        })
        .unwrap();
    }
    assert_eq!(svc.run_until_idle(), 3);
    assert_eq!(slot.borrow().len(), 3);
}

/* ─────────── Adapter contrôlable ─────────── */

/// Bloque sur `"slow"` jusqu’à ce que le test relâche la barrière.
struct Gated {
    started: Sender<()>,
    release: Receiver<()>,
}

impl Compiler for Gated {
    fn compile(&self, source: &str) -> Result<Compiled, CompileFailure> {
        match source {
            "slow" => {
                let _ = self.started.send(());
                let _ = self.release.recv();
                Ok(Compiled::default())
            }
            "panic" => panic!("adapter blew up"),
            "garbage" => Ok(Compiled { code: vec![0xFF, 0, 0], ttl_mask: 0 }),
            other => CmdListCompiler::default().compile(other),
        }
    }
}

impl DurationEstimator for Gated {
    fn total_steps(&self, code: &[u8]) -> CoreResult<u64> { bytecode::total_steps(code) }
}

fn gated(queue_bound: Option<usize>) -> (CompileService<Gated>, Receiver<()>, Sender<()>) {
    let (started_tx, started_rx) = bounded(4);
    let (release_tx, release_rx) = bounded(4);
    let cfg = ServiceConfig { workers: 1, queue_bound, ..ServiceConfig::default() };
    let svc = CompileService::new(Gated { started: started_tx, release: release_rx }, &cfg).unwrap();
    (svc, started_rx, release_tx)
}

#[test]
fn cancel_before_start_dispatches_cancellation() {
    let (mut svc, started, release) = gated(None);
    let slot = Slot::default();
    let first = submit_into(&mut svc, "slow", &slot);
    started.recv().unwrap();
    let second = submit_into(&mut svc, "wait(1)", &slot);

    assert!(svc.cancel(second));
    release.send(()).unwrap();
    svc.run_until_idle();
    assert!(!svc.cancel(first));

    let got = slot.borrow();
    assert_eq!(got.len(), 2);
    assert!(got.iter().any(Result::is_ok));
    assert!(got.iter().any(|r| matches!(r, Err(CompileError::Generic(m)) if m == CANCELLED)));
}

#[test]
fn bounded_queue_rejects_synchronously() {
    let (mut svc, started, release) = gated(Some(1));
    let slot = Slot::default();
    submit_into(&mut svc, "slow", &slot);
    started.recv().unwrap();
    submit_into(&mut svc, "wait(2)", &slot);

    let rejected = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&rejected);
    let res = svc.submit(CompileRequest::new("wait(3)", DefaultErrorFactory, move |_| *flag.borrow_mut() = true));
    assert!(matches!(res, Err(ServiceError::QueueFull(1))));

    release.send(()).unwrap();
    assert_eq!(svc.run_until_idle(), 2);
    assert!(!*rejected.borrow());
}

#[test]
fn adapter_panic_becomes_generic_error() {
    let (mut svc, _started, _release) = gated(None);
    let slot = Slot::default();
    submit_into(&mut svc, "panic", &slot);
    svc.run_until_idle();
    assert_eq!(slot.borrow()[0].as_ref().unwrap_err().to_string(), "adapter blew up");
}

#[test]
fn contract_violation_is_reraised_on_origin() {
    let (mut svc, _started, _release) = gated(None);
    let slot = Slot::default();
    submit_into(&mut svc, "garbage", &slot);

    let res = catch_unwind(AssertUnwindSafe(|| svc.run_until_idle()));
    let panic = res.unwrap_err();
    let msg = panic.downcast_ref::<String>().cloned().unwrap_or_default();
    assert!(msg.starts_with("contract violation"), "{msg}");
    assert!(slot.borrow().is_empty());
    assert_eq!(svc.pending_count(), 0);

    // Le worker a survécu.
    submit_into(&mut svc, "wait(1)", &slot);
    svc.run_until_idle();
    assert_eq!(slot.borrow().len(), 1);
}

#[test]
fn shutdown_drains_pending_dispatches() {
    let slot = Slot::default();
    let mut svc = service(2);
    for n in 0..10 {
        submit_into(&mut svc, &format!("wait({n})"), &slot);
    }
    svc.shutdown();
    assert_eq!(slot.borrow().len(), 10);
}

#[test]
fn drop_drains_like_shutdown() {
    let slot = Slot::default();
    {
        let mut svc = service(1);
        submit_into(&mut svc, "dac(1)=2", &slot);
    }
    assert_eq!(slot.borrow().len(), 1);
}

#[test]
fn payload_frame_splits_back() {
    let mut svc = service(1);
    let slot = Slot::default();
    submit_into(&mut svc, "ttl(1)=on t=7", &slot);
    svc.run_until_idle();
    let p = slot.borrow_mut().pop().unwrap().unwrap();
    let (h, code) = cmdlist_core::frame::split_frame(p.as_bytes()).unwrap();
    assert_eq!(h, FrameHeader { duration_ns: 100, ttl_mask: 0b10 });
    assert_eq!(code, p.code());
}
