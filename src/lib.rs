pub mod cli;
pub mod config;
pub mod interpreter;
pub mod scene;

// Re-export main types
pub use config::{Config, InterpreterConfig};
pub use interpreter::{
    Completion, ControlOutcome, DataStore, Host, Interpreter, Script, ScriptError, Suspension,
    Value, WaitKind, WaitRequest,
};
pub use scene::{Atom, Bond, Scene};
