//! Borrowed view of one interpreter during a single dispatcher step
//!
//! Statement handlers, the expression walker, and external commands all work
//! through a [`Vm`]. It owns nothing: the [`Interpreter`](super::Interpreter)
//! lends out its stack, variables, registries, and host for the step.

use super::context::ContextStack;
use super::errors::{fail, CallRequest, Interrupt, ScriptError, ScriptResult, IO_ERROR, UNDEFINED_VARIABLE, UNKNOWN_FUNCTION};
use super::expressions;
use super::host::{Completion, DataStore, Host, WaitKind, WaitRequest};
use super::rpn::{functions, EngineMode, MathContext};
use super::types::{ItemSet, ScriptFunction, Token, Value};
use crate::config::InterpreterConfig;
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

/// Host-registered function callable from scripts
pub type NativeFunction = Box<dyn FnMut(&[Value]) -> Result<Value, ScriptError>>;

pub type NativeRegistry = IndexMap<String, NativeFunction>;

pub struct Vm<'a> {
    pub host: &'a mut dyn Host,
    pub config: &'a InterpreterConfig,
    pub stack: &'a mut ContextStack,
    pub globals: &'a mut IndexMap<String, Value>,
    pub functions: &'a IndexMap<String, Rc<ScriptFunction>>,
    pub natives: &'a mut NativeRegistry,
    /// Sets named by `define`
    pub defined: &'a mut IndexMap<String, ItemSet>,
    /// Current `select` result
    pub selection: &'a mut ItemSet,
    /// Next cached call result for the statement being run
    pub call_cursor: usize,
}

impl<'a> Vm<'a> {
    /* ===================== Variables ===================== */

    /// Frame-local variable within the current function, then a global
    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.stack.lookup(name).or_else(|| self.globals.get(name))
    }

    pub fn require_variable(&self, name: &str) -> ScriptResult<Value> {
        match self.get_variable(name) {
            Some(v) => Ok(v.clone()),
            None => fail(UNDEFINED_VARIABLE, format!("undefined variable: {}", name)),
        }
    }

    /// Assign to an existing local in scope, otherwise to a global
    pub fn set_variable(&mut self, name: &str, value: Value) {
        match self.stack.lookup_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// `var name`: declare in the innermost frame
    pub fn declare_local(&mut self, name: &str, value: Value) {
        match self.stack.top_mut() {
            Some(frame) => {
                frame.vars.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /* ===================== Evaluation ===================== */

    /// Evaluate a math expression
    pub fn evaluate(&mut self, tokens: &[Token]) -> ScriptResult<Value> {
        expressions::evaluate(self, tokens, EngineMode::Math)
    }

    /// Evaluate an expression that must produce an atom or bond set
    pub fn evaluate_set(&mut self, tokens: &[Token]) -> ScriptResult<ItemSet> {
        match self.evaluate(tokens)? {
            Value::Set(set) => Ok(set),
            other => Err(ScriptError::type_error(format!(
                "expected an atom set, got {}",
                other.type_name()
            ))
            .into()),
        }
    }

    /// Comma-separated arguments at bracket depth zero
    pub fn evaluate_args(&mut self, tokens: &[Token]) -> ScriptResult<Vec<Value>> {
        expressions::split_top_level(tokens)
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(|part| self.evaluate(part))
            .collect()
    }

    /* ===================== Waits ===================== */

    fn host_can_block(&self) -> bool {
        self.config.host_can_block && self.host.can_block()
    }

    /// Wait on the host: block when allowed, otherwise suspend the script
    pub fn wait(&mut self, kind: WaitKind, target: Option<String>) -> ScriptResult<Value> {
        let request = WaitRequest::new(kind).with_target(target);
        if !self.host_can_block() {
            return Err(Interrupt::Suspend(request));
        }
        debug!(key = %request.key, kind = ?request.kind, "Blocking wait");
        match self.host.wait(&request) {
            Completion::Done(value) => {
                if let Some(target) = &request.target {
                    self.set_variable(target, value.clone());
                }
                Ok(value)
            }
            Completion::Failed(message) => fail(IO_ERROR, message),
        }
    }

    /* ===================== Calls ===================== */

    fn cached_result(&mut self) -> Option<Value> {
        let cursor = self.call_cursor;
        self.call_cursor += 1;
        self.stack.top()?.call_results.get(cursor).cloned()
    }

    fn cache_result(&mut self, value: &Value) {
        if let Some(frame) = self.stack.top_mut() {
            frame.call_results.push(value.clone());
        }
    }
}

impl MathContext for Vm<'_> {
    /// Script functions and natives replay from the statement's call cache;
    /// built-ins are pure and always re-run
    fn call_function(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        let key = name.to_ascii_lowercase();
        if let Some(function) = self.functions.get(&key).cloned() {
            if let Some(value) = self.cached_result() {
                return Ok(value);
            }
            return Err(Interrupt::Call(CallRequest { function, args }));
        }
        if self.natives.contains_key(&key) {
            if let Some(value) = self.cached_result() {
                return Ok(value);
            }
            let value = match self.natives.get_mut(&key) {
                Some(native) => native(&args)?,
                None => return fail(UNKNOWN_FUNCTION, format!("unknown function: {}", name)),
            };
            self.cache_result(&value);
            return Ok(value);
        }
        match functions::call_builtin(&key, &args, self) {
            Some(result) => result,
            None => fail(UNKNOWN_FUNCTION, format!("unknown function: {}", name)),
        }
    }

    fn store(&self) -> &dyn DataStore {
        self.host.store()
    }
}
