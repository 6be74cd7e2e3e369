//! Core dispatcher loop
//!
//! `step()` runs one statement of the top frame and turns the outcome into a
//! frame-stack transition. Functions ordered by call hierarchy:
//! 1. run_until_done() - top-level driver
//! 2. step() - fetch, resolve, dispatch
//! 3. transitions - function entry/exit, errors, suspension, resume

use super::commands;
use super::context::{BlockKind, Frame, FrameKind};
use super::errors::{CallRequest, Interrupt, ScriptError, IO_ERROR};
use super::expressions;
use super::host::{Batch, Completion, Host};
use super::types::{ControlOutcome, FunctionKind, Next, Program, Suspension, Value};
use super::Interpreter;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

impl<H: Host> Interpreter<H> {
    /* ===================== Public API ===================== */

    /// Step until the script finishes, suspends, fails, or halts
    pub fn run_until_done(&mut self) -> ControlOutcome {
        loop {
            match self.step() {
                ControlOutcome::Continue => continue,
                outcome => return outcome,
            }
        }
    }

    /// Execute one statement
    pub fn step(&mut self) -> ControlOutcome {
        if self.halt.load(Ordering::SeqCst) {
            self.stack.clear();
            warn!("Script halted");
            return ControlOutcome::Halt;
        }

        let Some(top) = self.stack.top() else {
            return ControlOutcome::Done(Value::empty_string());
        };
        if top.must_resume {
            return self.resume_statement();
        }
        let program = top.program.clone();
        let pc = top.pc;
        let Some(stmt) = program.statement(pc) else {
            return self.finish_frame();
        };
        if self.config.trace_statements {
            trace!(
                source = %top.source(),
                line = program.script.line_of(pc),
                pc,
                "{}",
                stmt.text()
            );
        }
        let origin_depth = self.stack.len();

        let (mut vm, registry) = self.split();
        let result = expressions::resolve_statement(&mut vm, stmt)
            .and_then(|resolved| commands::dispatch(&mut vm, registry, &resolved, pc));

        match result {
            Ok(next) => {
                self.clear_call_results(origin_depth);
                self.advance(next);
                if self.stack.is_empty() {
                    debug!("Script exited");
                    return ControlOutcome::Done(Value::empty_string());
                }
                ControlOutcome::Continue
            }
            Err(Interrupt::Call(call)) => self.enter_function(call),
            Err(Interrupt::Suspend(request)) => {
                self.stack.mark_must_resume(true);
                let stack = self.stack.take();
                debug!(
                    key = %request.key,
                    kind = ?request.kind,
                    depth = stack.len(),
                    "Script suspended"
                );
                ControlOutcome::Suspend(Suspension {
                    request,
                    stack,
                    globals: self.globals.clone(),
                    defined: self.defined.clone(),
                    selection: self.selection.clone(),
                })
            }
            Err(Interrupt::Error(error)) => self.raise(error),
            Err(Interrupt::Halt) => {
                self.stack.clear();
                warn!("Script quit");
                ControlOutcome::Halt
            }
        }
    }

    /* ===================== Program Counter ===================== */

    fn advance(&mut self, next: Next) {
        let Some(top) = self.stack.top_mut() else {
            return;
        };
        match next {
            Next::Advance => top.pc += 1,
            Next::Jump(target) => top.pc = target,
            Next::Stay => {}
        }
    }

    /// The statement completed: its cached call results are spent
    fn clear_call_results(&mut self, origin_depth: usize) {
        if let Some(top) = self.stack.top_mut() {
            top.call_results.clear();
        }
        if let Some(origin) = self.stack.at_depth_mut(origin_depth) {
            origin.call_results.clear();
        }
    }

    /* ===================== Functions ===================== */

    fn enter_function(&mut self, call: CallRequest) -> ControlOutcome {
        let CallRequest { function, args } = call;
        let parallel = function.kind == FunctionKind::Parallel;
        let mut frame = Frame::function(&function.name, parallel, Program::new(function.body.clone()));
        for (i, param) in function.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or_else(Value::empty_string);
            frame.vars.insert(param.clone(), value);
        }
        frame
            .vars
            .insert("_arguments".to_string(), Value::Array(args));
        match self.stack.push(frame) {
            Ok(()) => {
                debug!(function = %function.name, depth = self.stack.len(), "Function called");
                ControlOutcome::Continue
            }
            Err(error) => self.raise(error),
        }
    }

    /// Hand a parallel function's collected `process` blocks to the host
    fn flush_batch(&mut self) -> Result<(), ScriptError> {
        let Some(top) = self.stack.top_mut() else {
            return Ok(());
        };
        if top.batch.is_empty() {
            return Ok(());
        }
        let batch = Batch {
            function: top.source(),
            scripts: std::mem::take(&mut top.batch),
        };
        debug!(function = %batch.function, scripts = batch.scripts.len(), "Running batch");
        self.host
            .run_batch(batch)
            .map_err(|message| ScriptError::new(IO_ERROR, message))
    }

    /// The top frame ran past its last statement
    fn finish_frame(&mut self) -> ControlOutcome {
        let Some(kind) = self.stack.top().map(|f| f.kind.clone()) else {
            return ControlOutcome::Done(Value::empty_string());
        };
        if let FrameKind::Block { .. } = kind {
            self.stack.pop_block();
            return ControlOutcome::Continue;
        }
        if let Err(error) = self.flush_batch() {
            return self.raise(error);
        }
        let value = self
            .stack
            .pop()
            .and_then(|frame| frame.return_value)
            .unwrap_or_else(Value::empty_string);
        match kind {
            FrameKind::Function { name, .. } => {
                debug!(function = %name, depth = self.stack.len(), "Function returned");
                if let Some(caller) = self.stack.top_mut() {
                    caller.call_results.push(value);
                }
                ControlOutcome::Continue
            }
            _ => {
                self.stack.clear();
                debug!("Script finished");
                ControlOutcome::Done(value)
            }
        }
    }

    /* ===================== Errors ===================== */

    /// Route an error to the nearest `try`, or end the run with it
    fn raise(&mut self, mut error: ScriptError) -> ControlOutcome {
        if error.trace.is_empty() {
            error.trace = self.stack.stack_trace();
        }
        error.message = self.host.translate(&error.untranslated);

        let handler = if error.fatal {
            None
        } else {
            self.stack
                .iter()
                .position(|f| f.block_kind() == Some(BlockKind::Try))
        };
        let Some(distance) = handler else {
            warn!(code = %error.code, "Uncaught script error: {}", error.report());
            self.stack.clear();
            return ControlOutcome::Error(error);
        };

        for _ in 0..distance {
            self.stack.pop();
        }
        if let Some(frame) = self.stack.top_mut() {
            let head = frame.head_pc().unwrap_or(frame.pc);
            let target = frame
                .program
                .script
                .partner(head)
                .unwrap_or(frame.program.len());
            debug!(code = %error.code, catch_pc = target, "Error routed to try");
            frame.error_slot = Some(error);
            frame.pc = target;
            frame.call_results.clear();
        }
        ControlOutcome::Continue
    }

    /* ===================== Resume ===================== */

    /// First step after `resume`: finish the statement that suspended
    fn resume_statement(&mut self) -> ControlOutcome {
        self.stack.mark_must_resume(false);
        let (target, completion) = match self.pending.take() {
            Some((request, completion)) => {
                debug!(key = %request.key, "Script resumed");
                (request.target, completion)
            }
            None => (None, Completion::Done(Value::empty_string())),
        };
        match completion {
            Completion::Failed(message) => return self.raise(ScriptError::new(IO_ERROR, message)),
            Completion::Done(value) => {
                if let Some(target) = target {
                    let (mut vm, _) = self.split();
                    vm.set_variable(&target, value);
                }
            }
        }
        if let Some(top) = self.stack.top_mut() {
            top.pc += 1;
            top.call_results.clear();
        }
        ControlOutcome::Continue
    }
}
