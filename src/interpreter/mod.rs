//! # Molscript Interpreter - Resumable Statement Dispatcher
//!
//! Executes compiled scripts over a molecular scene without recursing on the
//! native stack.
//!
//! ## Core Principles
//!
//! 1. **Stack-driven execution**: every block, function call, and check pass is a
//!    [`Frame`] on the [`ContextStack`]; the dispatcher loop never recurses
//! 2. **Pre-resolved jumps**: flow tokens carry partner statement indices; the
//!    branch state lives in a per-invocation table beside the tokens
//! 3. **Explicit outcomes**: each step yields a [`ControlOutcome`]; a suspension
//!    is a value handed back to the host, never an error
//! 4. **Replayable statements**: a statement that calls a script function is
//!    replayed when the function returns, reading call results from a cache
//!
//! ## Example
//! ```no_run
//! use molscript_core::interpreter::{Interpreter, ControlOutcome};
//! # fn demo<H: molscript_core::interpreter::Host>(host: H, script: std::rc::Rc<molscript_core::interpreter::Script>) {
//! let mut interp = Interpreter::new(host, Default::default());
//! match interp.run(script) {
//!     ControlOutcome::Suspend(suspension) => { /* wait, then interp.resume(..) */ }
//!     outcome => println!("{:?}", outcome.is_done()),
//! }
//! # }
//! ```

pub mod commands;
pub mod context;
pub mod errors;
mod exec_loop;
pub mod expressions;
pub mod host;
pub mod rpn;
pub mod selection;
pub mod statements;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use commands::{CommandHandler, CommandRegistry};
pub use context::{ContextStack, Frame, FrameKind, TraceLine};
pub use errors::{Interrupt, ScriptError, ScriptResult};
pub use host::{Batch, Completion, DataStore, Host, WaitKind, WaitRequest};
pub use types::*;
pub use vm::{NativeFunction, NativeRegistry, Vm};

use crate::config::InterpreterConfig;
use indexmap::IndexMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/* ===================== Halt ===================== */

/// Cross-thread handle that stops a running script at its next statement
#[derive(Debug, Clone, Default)]
pub struct HaltHandle(Arc<AtomicBool>);

impl HaltHandle {
    pub fn halt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/* ===================== Interpreter ===================== */

/// One interpreter instance; independent instances share nothing
pub struct Interpreter<H: Host> {
    host: H,
    config: InterpreterConfig,
    stack: ContextStack,
    globals: IndexMap<String, Value>,
    functions: IndexMap<String, Rc<ScriptFunction>>,
    natives: NativeRegistry,
    commands: CommandRegistry,
    defined: IndexMap<String, ItemSet>,
    selection: ItemSet,
    halt: Arc<AtomicBool>,
    /// Completion delivered by `resume`, applied on the next step
    pending: Option<(WaitRequest, Completion)>,
}

impl<H: Host> Interpreter<H> {
    pub fn new(host: H, config: InterpreterConfig) -> Self {
        Self {
            host,
            stack: ContextStack::new(config.max_depth),
            config,
            globals: IndexMap::new(),
            functions: IndexMap::new(),
            natives: IndexMap::new(),
            commands: CommandRegistry::new(),
            defined: IndexMap::new(),
            selection: ItemSet::empty(Domain::Atoms),
            halt: Arc::new(AtomicBool::new(false)),
            pending: None,
        }
    }

    /// Borrow the pieces a statement needs
    fn split(&mut self) -> (Vm<'_>, &mut CommandRegistry) {
        (
            Vm {
                host: &mut self.host,
                config: &self.config,
                stack: &mut self.stack,
                globals: &mut self.globals,
                functions: &self.functions,
                natives: &mut self.natives,
                defined: &mut self.defined,
                selection: &mut self.selection,
                call_cursor: 0,
            },
            &mut self.commands,
        )
    }

    /* ===================== Running ===================== */

    /// Run a script from its first statement
    pub fn run(&mut self, script: Rc<Script>) -> ControlOutcome {
        if let Err(error) = script.validate() {
            return ControlOutcome::Error(error);
        }
        for (name, function) in &script.functions {
            self.functions
                .insert(name.to_ascii_lowercase(), function.clone());
        }
        self.halt.store(false, Ordering::SeqCst);
        self.pending = None;
        self.stack = ContextStack::new(self.config.max_depth);
        debug!(script = %script.name, statements = script.len(), "Script started");
        if let Err(error) = self.stack.push(Frame::root(Program::new(script))) {
            return ControlOutcome::Error(error);
        }
        self.run_until_done()
    }

    /// Continue a suspended script once its wait has completed
    pub fn resume(&mut self, suspension: Suspension, completion: Completion) -> ControlOutcome {
        let Suspension {
            request,
            mut stack,
            globals,
            defined,
            selection,
        } = suspension;
        if let Some(root) = stack.iter().last() {
            for (name, function) in &root.program.script.functions {
                self.functions
                    .insert(name.to_ascii_lowercase(), function.clone());
            }
        }
        stack.set_max_depth(self.config.max_depth);
        self.stack = stack;
        self.globals = globals;
        self.defined = defined;
        self.selection = selection;
        self.pending = Some((request, completion));
        self.run_until_done()
    }

    /// Validate jumps and run a syntax-only pass over every expression
    pub fn check(&mut self, script: &Script) -> Result<(), ScriptError> {
        script.validate()?;
        self.check_body(script)?;
        for function in script.functions.values() {
            self.check_body(&function.body)?;
        }
        Ok(())
    }

    fn check_body(&mut self, script: &Script) -> Result<(), ScriptError> {
        let mut stack = ContextStack::new(self.config.max_depth);
        stack.push(Frame::check(Program::new(Rc::new(script.clone()))))?;
        let mut vm = Vm {
            host: &mut self.host,
            config: &self.config,
            stack: &mut stack,
            globals: &mut self.globals,
            functions: &self.functions,
            natives: &mut self.natives,
            defined: &mut self.defined,
            selection: &mut self.selection,
            call_cursor: 0,
        };
        for (pc, stmt) in script.statements.iter().enumerate() {
            if let Some(frame) = vm.stack.top_mut() {
                frame.pc = pc;
            }
            if let Err(interrupt) = commands::check_statement(&mut vm, stmt) {
                let mut error = match interrupt {
                    Interrupt::Error(error) => error,
                    other => ScriptError::invalid_expression(other.to_string()),
                };
                error.message = format!(
                    "{} ({} line {}: {})",
                    error.message,
                    script.name,
                    script.line_of(pc),
                    stmt.text()
                );
                error.trace = vm.stack.stack_trace();
                return Err(error);
            }
        }
        Ok(())
    }

    /// Evaluate a standalone expression against the current variables
    pub fn evaluate(&mut self, tokens: Vec<Token>) -> Result<Value, ScriptError> {
        let mut statement = vec![Token::new(TokenKind::Flow(Flow::Return))];
        statement.extend(tokens);
        let script = Rc::new(Script::new("expression", vec![Statement::new(statement)]));

        let saved = self.stack.take();
        let pending = self.pending.take();
        let outcome = match self.stack.push(Frame::root(Program::new(script))) {
            Ok(()) => self.run_until_done(),
            Err(error) => ControlOutcome::Error(error),
        };
        self.stack = saved;
        self.pending = pending;

        match outcome {
            ControlOutcome::Done(value) => Ok(value),
            ControlOutcome::Error(error) => Err(error),
            ControlOutcome::Suspend(_) => Err(ScriptError::new(
                errors::BAD_ARGUMENT,
                "an expression cannot wait on the host",
            )),
            ControlOutcome::Halt | ControlOutcome::Continue => {
                Err(ScriptError::new(errors::INTERRUPTED, "evaluation interrupted"))
            }
        }
    }

    /* ===================== Registration ===================== */

    /// Register a host-native function, callable from scripts by name
    pub fn register_function<F>(&mut self, name: &str, f: F)
    where
        F: FnMut(&[Value]) -> Result<Value, ScriptError> + 'static,
    {
        self.natives.insert(name.to_ascii_lowercase(), Box::new(f));
    }

    /// Register a handler for an external command verb
    pub fn register_command<F>(&mut self, verb: &str, f: F)
    where
        F: FnMut(&mut Vm<'_>, &Statement) -> ScriptResult<()> + 'static,
    {
        self.commands.register(verb, Box::new(f));
    }

    pub fn register_handler(&mut self, verb: &str, handler: Box<dyn CommandHandler>) {
        self.commands.register(verb, handler);
    }

    /* ===================== Inspection ===================== */

    pub fn halt_handle(&self) -> HaltHandle {
        HaltHandle(self.halt.clone())
    }

    /// Trace of the frames currently on the stack, innermost first
    pub fn stack_trace(&self) -> Vec<TraceLine> {
        self.stack.stack_trace()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn selection(&self) -> &ItemSet {
        &self.selection
    }

    pub fn defined_set(&self, name: &str) -> Option<&ItemSet> {
        self.defined.get(&name.to_ascii_lowercase())
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}
