use super::asm;
use super::helpers::*;
use crate::config::InterpreterConfig;
use crate::interpreter::errors::{INVALID_JUMP, TOO_MANY_LEVELS, UNDEFINED_VARIABLE, UNKNOWN_COMMAND};
use crate::interpreter::{
    ControlOutcome, Flow, Interpreter, Script, Statement, Token, TraceLine, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

/* ===================== External Commands ===================== */

#[test]
fn test_external_command_handler() {
    let mut interp = interpreter();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    interp.register_command("color", move |vm, stmt| {
        let args = vm.evaluate_args(&stmt.tokens[1..])?;
        sink.borrow_mut().extend(args);
        Ok(())
    });

    let outcome = interp.run(script("shade = \"red\"\ncolor shade, 2 + 1"));
    assert!(outcome.is_done());
    assert_eq!(*seen.borrow(), vec![Value::from("red"), Value::Int(3)]);
}

#[test]
fn test_unknown_external_command() {
    assert_eq!(run_error("spin 10").code, UNKNOWN_COMMAND);
}

#[test]
fn test_stack_trace_from_handler() {
    let mut interp = interpreter();
    let traces: Rc<RefCell<Vec<TraceLine>>> = Rc::default();
    let sink = traces.clone();
    interp.register_command("where", move |vm, _| {
        *sink.borrow_mut() = vm.stack.stack_trace();
        Ok(())
    });

    let outcome = interp.run(script("function tally()\n  if true\n    where\n  end\nend\ntally()"));
    assert!(outcome.is_done());
    let sources: Vec<String> = traces.borrow().iter().map(|t| t.source.clone()).collect();
    assert_eq!(sources, vec!["tally (if)", "tally", "main"]);
    assert_eq!(traces.borrow()[0].line, 3);
    assert!(interp.stack_trace().is_empty());
}

/* ===================== Halting ===================== */

#[test]
fn test_halt_handle_stops_at_next_statement() {
    let mut interp = interpreter();
    let handle = interp.halt_handle();
    interp.register_function("stop", move |_: &[Value]| {
        handle.halt();
        Ok(Value::Int(0))
    });

    let outcome = interp.run(script("print 1\nstop()\nprint 2"));
    assert!(matches!(outcome, ControlOutcome::Halt));
    assert_eq!(interp.host().output, vec!["1"]);
    assert!(interp.halt_handle().is_halted());

    // a new run clears the flag
    let outcome = interp.run(script("return 5"));
    assert_eq!(outcome.into_done(), Some(Value::Int(5)));
}

/* ===================== Checking ===================== */

#[test]
fn test_check_reports_line() {
    let mut interp = interpreter();
    let bad = asm::assemble("bad", "x = 1\nprint 1 +");
    let err = interp.check(&bad).unwrap_err();
    assert!(err.message.ends_with("(bad line 2: print 1 +)"), "{}", err.message);

    let in_function = asm::assemble("lib", "function f()\n  return (1\nend");
    let err = interp.check(&in_function).unwrap_err();
    assert!(err.message.contains("(f line 2:"), "{}", err.message);
}

#[test]
fn test_check_calls_nothing() {
    let mut interp = interpreter();
    let tally = counter(&mut interp, "tally");
    let good = asm::assemble("good", "if tally(1) > 0\n  print unknown + tally(2)\nend");
    assert!(interp.check(&good).is_ok());
    assert_eq!(tally.get(), 0);
    assert!(interp.host().output.is_empty());
}

#[test]
fn test_bad_partner_is_rejected_before_running() {
    let statements = vec![
        Statement::new(vec![Token::flow(Flow::If, 7), Token::literal(true)]),
        Statement::new(vec![Token::flow(Flow::End, 0)]),
    ];
    let script = Rc::new(Script::new("broken", statements));
    let mut interp = interpreter();
    let ControlOutcome::Error(err) = interp.run(script) else {
        panic!("expected an error");
    };
    assert_eq!(err.code, INVALID_JUMP);
}

/* ===================== Scope and Limits ===================== */

#[test]
fn test_var_is_block_local() {
    let err = run_error("if true\n  var inner = 1\nend\nreturn inner");
    assert_eq!(err.code, UNDEFINED_VARIABLE);

    let value = run_value("var outer = 1\nif true\n  outer = 2\nend\nreturn outer");
    assert_eq!(value, Value::Int(2));
}

#[test]
fn test_configured_depth_limit() {
    let config = InterpreterConfig {
        max_depth: 4,
        ..Default::default()
    };
    let mut interp = Interpreter::new(TestHost::new(true), config);
    let source = "function a()\n  return b()\nend\nfunction b()\n  return c()\nend\nfunction c()\n  return d()\nend\nfunction d()\n  return 1\nend\nreturn a()";
    let ControlOutcome::Error(err) = interp.run(script(source)) else {
        panic!("expected an error");
    };
    assert_eq!(err.code, TOO_MANY_LEVELS);
}

#[test]
fn test_interpreters_share_nothing() {
    let mut first = interpreter();
    let mut second = interpreter();
    assert!(first.run(script("shared = 1")).is_done());
    assert!(second.run(script("return 0")).is_done());
    assert_eq!(first.global("shared"), Some(&Value::Int(1)));
    assert_eq!(second.global("shared"), None);
}
