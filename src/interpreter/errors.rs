//! Error codes, script errors, and engine interrupts
//!
//! Three signals leave a statement early and must never be conflated:
//! a [`ScriptError`] (catchable by `try`, unless fatal), a suspension (not an
//! error at all), and a halt (bypasses every `catch`). Function calls ride the
//! same channel so the dispatcher can push the callee frame without recursing.

use super::context::TraceLine;
use super::host::WaitRequest;
use super::types::{ScriptFunction, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/* ===================== Error Codes ===================== */

pub const INVALID_EXPRESSION: &str = "InvalidExpression";
pub const TYPE_ERROR: &str = "TypeError";
pub const UNDEFINED_VARIABLE: &str = "UndefinedVariable";
pub const UNKNOWN_FUNCTION: &str = "UnknownFunction";
pub const UNKNOWN_PROPERTY: &str = "UnknownProperty";
pub const DOMAIN_MISMATCH: &str = "DomainMismatch";
pub const TOO_MANY_LEVELS: &str = "TooManyLevels";
pub const USER_ERROR: &str = "UserError";
pub const INVALID_JUMP: &str = "InvalidJump";
pub const UNKNOWN_COMMAND: &str = "UnknownCommand";
pub const IO_ERROR: &str = "IoError";
pub const LABEL_NOT_FOUND: &str = "LabelNotFound";
pub const BAD_ARGUMENT: &str = "BadArgument";
pub const INTERRUPTED: &str = "Interrupted";

/* ===================== Script Errors ===================== */

/// A user-visible script failure
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ScriptError {
    pub code: String,
    /// Message after host translation
    pub message: String,
    pub untranslated: String,
    /// Fatal errors skip every `try` frame
    #[serde(default)]
    pub fatal: bool,
    /// Frames active when the error was raised, innermost first
    #[serde(default)]
    pub trace: Vec<TraceLine>,
}

impl ScriptError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: code.to_string(),
            untranslated: message.clone(),
            message,
            fatal: false,
            trace: Vec::new(),
        }
    }

    pub fn fatal(code: &str, message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(code, message)
        }
    }

    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::new(INVALID_EXPRESSION, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(TYPE_ERROR, message)
    }

    pub fn domain_mismatch() -> Self {
        Self::new(
            DOMAIN_MISMATCH,
            "cannot combine an atom set with a bond set",
        )
    }

    pub fn too_many_levels(depth: usize) -> Self {
        Self::fatal(
            TOO_MANY_LEVELS,
            format!("too many script levels (maximum {})", depth),
        )
    }

    /// Full report: message followed by one line per frame
    pub fn report(&self) -> String {
        let mut out = format!("{}: {}", self.code, self.message);
        for line in &self.trace {
            out.push_str("\n  ");
            out.push_str(&line.to_string());
        }
        out
    }
}

/* ===================== Interrupts ===================== */

/// A pending call to a script-defined function
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub function: Rc<ScriptFunction>,
    pub args: Vec<Value>,
}

/// Early exit from a statement
#[derive(Debug, Clone)]
pub enum Interrupt {
    Error(ScriptError),
    /// The statement is waiting on the host
    Suspend(WaitRequest),
    /// Push a frame for a script-defined function, then replay the statement
    Call(CallRequest),
    Halt,
}

impl From<ScriptError> for Interrupt {
    fn from(err: ScriptError) -> Self {
        Interrupt::Error(err)
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Error(e) => write!(f, "{}", e),
            Interrupt::Suspend(req) => write!(f, "suspended on {}", req.key),
            Interrupt::Call(call) => write!(f, "call {}", call.function.name),
            Interrupt::Halt => write!(f, "halted"),
        }
    }
}

pub type ScriptResult<T> = Result<T, Interrupt>;

/// Shorthand for `Err(Interrupt::Error(..))`
pub fn fail<T>(code: &str, message: impl Into<String>) -> ScriptResult<T> {
    Err(Interrupt::Error(ScriptError::new(code, message)))
}
