//! Dispatcher outcomes and suspension snapshots

use super::super::context::ContextStack;
use super::super::errors::ScriptError;
use super::super::host::WaitRequest;
use super::values::{ItemSet, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/* ===================== Outcomes ===================== */

/// Result of one dispatcher step, or of a whole run
#[derive(Debug)]
pub enum ControlOutcome {
    /// More statements to run
    Continue,
    /// The script finished; carries the root `return` value (empty string if none)
    Done(Value),
    /// Waiting on the host; hand the snapshot back to `resume`
    Suspend(Suspension),
    /// Uncaught script error; the context stack is already unwound
    Error(ScriptError),
    /// Hard stop; no `catch` ran
    Halt,
}

impl ControlOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ControlOutcome::Done(_))
    }

    /// Final value of a finished run
    pub fn into_done(self) -> Option<Value> {
        match self {
            ControlOutcome::Done(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_suspension(self) -> Option<Suspension> {
        match self {
            ControlOutcome::Suspend(s) => Some(s),
            _ => None,
        }
    }
}

/// Where the program counter goes after a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Advance,
    Jump(usize),
    /// The handler already positioned the frames
    Stay,
}

/* ===================== Suspension ===================== */

/// A saved frame chain waiting on one host request
///
/// Every frame in `stack` carries `must_resume`; the statement that suspended
/// does not run again, the next one runs exactly once. The snapshot also holds
/// the session state outside the frames, so any interpreter with the same
/// natives and command handlers can resume it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Suspension {
    pub request: WaitRequest,
    pub stack: ContextStack,
    pub globals: IndexMap<String, Value>,
    /// `define`d sets by lower-case name
    pub defined: IndexMap<String, ItemSet>,
    pub selection: ItemSet,
}
