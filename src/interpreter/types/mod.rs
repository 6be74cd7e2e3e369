//! Core types for the interpreter

pub mod control;
pub mod script;
pub mod tokens;
pub mod values;

pub use control::{ControlOutcome, Next, Suspension};
pub use script::{
    label_name, BranchState, BranchTable, FunctionKind, Program, Script, ScriptFunction,
    Statement,
};
pub use tokens::{AssignOp, Bracket, Flow, ItemProperty, Keyword, Op, Token, TokenKind, Verb};
pub use values::{
    compare, full_range, item_id, parse_number, values_equal, Domain, ItemSet, Tag, Value,
};
