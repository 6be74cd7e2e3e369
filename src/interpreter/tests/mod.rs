//! Scenario tests for the interpreter, one module per feature area

mod helpers;

mod context_tests;
mod flow_tests;
mod function_tests;
mod math_tests;
mod selection_tests;
mod suspend_tests;
mod try_tests;
