//! Test helpers for interpreter scenario tests
//!
//! A recording host over a small molecular scene, plus shortcuts for
//! assembling and running scripts.

use super::asm;
use crate::config::InterpreterConfig;
use crate::interpreter::{
    Batch, Completion, ControlOutcome, DataStore, Host, Interpreter, Script, ScriptError, Value,
    WaitKind, WaitRequest,
};
use crate::scene::{Atom, Scene};
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Host that records everything the engine asks of it
pub struct TestHost {
    pub scene: Scene,
    pub output: Vec<String>,
    pub blocking: bool,
    /// Every wait the engine issued, blocking or not
    pub waits: Vec<WaitKind>,
    /// Answers for blocking waits, in order; empty means `Done("")`
    pub completions: VecDeque<Completion>,
    /// `(function, script count)` per batch
    pub batches: Vec<(String, usize)>,
}

impl TestHost {
    pub fn new(blocking: bool) -> Self {
        Self {
            scene: fixture_scene(),
            output: Vec::new(),
            blocking,
            waits: Vec::new(),
            completions: VecDeque::new(),
            batches: Vec::new(),
        }
    }
}

impl Host for TestHost {
    fn store(&self) -> &dyn DataStore {
        &self.scene
    }

    fn store_mut(&mut self) -> &mut dyn DataStore {
        &mut self.scene
    }

    fn output(&mut self, text: &str) {
        self.output.push(text.to_string());
    }

    fn can_block(&self) -> bool {
        self.blocking
    }

    fn wait(&mut self, request: &WaitRequest) -> Completion {
        self.waits.push(request.kind.clone());
        self.completions
            .pop_front()
            .unwrap_or_else(|| Completion::Done(Value::empty_string()))
    }

    fn run_batch(&mut self, batch: Batch) -> Result<(), String> {
        self.batches.push((batch.function, batch.scripts.len()));
        Ok(())
    }
}

/// Ligand (residue LIG: C-C-O), a glycine fragment, and two waters
///
/// ```text
/// 0 C  LIG 1  (0,0,0)      4 N  GLY 2 (6,0,0)
/// 1 C  LIG 1  (1.5,0,0)    5 CA GLY 2 (7.4,0,0)
/// 2 O  LIG 1  (2.9,0,0)    6 O  HOH 3 (4.5,0,0)
/// 3 H  LIG 1  (3.8,0,0)    7 O  HOH 4 (20,0,0)
/// ```
pub fn fixture_scene() -> Scene {
    let mut scene = Scene::new();
    let lig = |e: &str, x: f64| Atom::new(e, [x, 0.0, 0.0]).residue("LIG", 1).hetero();
    let c1 = scene.add_atom(lig("C", 0.0));
    let c2 = scene.add_atom(lig("C", 1.5));
    let o = scene.add_atom(lig("O", 2.9));
    let h = scene.add_atom(lig("H", 3.8));
    let n = scene.add_atom(Atom::new("N", [6.0, 0.0, 0.0]).residue("GLY", 2));
    let mut ca = Atom::new("C", [7.4, 0.0, 0.0]).residue("GLY", 2);
    ca.name = "CA".to_string();
    let ca = scene.add_atom(ca);
    scene.add_atom(Atom::new("O", [4.5, 0.0, 0.0]).residue("HOH", 3));
    scene.add_atom(Atom::new("O", [20.0, 0.0, 0.0]).residue("HOH", 4));
    scene.add_bond(c1, c2, 1);
    scene.add_bond(c2, o, 1);
    scene.add_bond(o, h, 1);
    scene.add_bond(n, ca, 1);
    scene
}

pub fn script(source: &str) -> Rc<Script> {
    asm::assemble("main", source)
}

/// Interpreter whose host blocks on waits
pub fn interpreter() -> Interpreter<TestHost> {
    Interpreter::new(TestHost::new(true), InterpreterConfig::default())
}

/// Interpreter whose host never blocks: every wait suspends
pub fn cooperative() -> Interpreter<TestHost> {
    Interpreter::new(TestHost::new(false), InterpreterConfig::default())
}

pub fn run(source: &str) -> (ControlOutcome, Interpreter<TestHost>) {
    let mut interp = interpreter();
    let outcome = interp.run(script(source));
    (outcome, interp)
}

/// Run to completion and return the root `return` value
pub fn run_value(source: &str) -> Value {
    match run(source).0 {
        ControlOutcome::Done(value) => value,
        other => panic!("expected Done, got {:?}", other),
    }
}

/// Run to completion and return the printed lines
pub fn run_output(source: &str) -> Vec<String> {
    let (outcome, interp) = run(source);
    assert!(outcome.is_done(), "expected Done, got {:?}", outcome);
    interp.host().output.clone()
}

/// Run and return the uncaught error
pub fn run_error(source: &str) -> ScriptError {
    match run(source).0 {
        ControlOutcome::Error(error) => error,
        other => panic!("expected Error, got {:?}", other),
    }
}

/// Register a native `name` that counts its calls and returns its first argument
pub fn counter(interp: &mut Interpreter<TestHost>, name: &str) -> Rc<Cell<usize>> {
    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    interp.register_function(name, move |args: &[Value]| {
        seen.set(seen.get() + 1);
        Ok(args.first().cloned().unwrap_or_else(Value::empty_string))
    });
    calls
}
