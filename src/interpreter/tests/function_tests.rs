use super::helpers::*;
use crate::interpreter::errors::{TOO_MANY_LEVELS, UNDEFINED_VARIABLE};
use crate::interpreter::{ControlOutcome, Value};

#[test]
fn test_arguments_and_return() {
    let value = run_value("function add(a, b)\n  return a + b\nend\nreturn add(2, 3) * 10");
    assert_eq!(value, Value::Int(50));
}

#[test]
fn test_function_names_ignore_case() {
    let value = run_value("function Twice(v)\n  return v * 2\nend\nreturn TWICE(4)");
    assert_eq!(value, Value::Int(8));
}

#[test]
fn test_missing_return_yields_empty_string() {
    let value = run_value("function noop()\n  n = 1\nend\nreturn noop()");
    assert_eq!(value, Value::empty_string());
}

#[test]
fn test_missing_parameters_and_arguments_array() {
    let value = run_value(
        "function f(a, b)\n  return _arguments.size * 10 + b.size\nend\nreturn f(\"xyz\")",
    );
    assert_eq!(value, Value::Int(10));

    let value = run_value("function g()\n  return _arguments[2]\nend\nreturn g(1, 2, 3)");
    assert_eq!(value, Value::Int(2));
}

#[test]
fn test_locals_stay_in_their_function() {
    let source = r#"
        function f()
            var t = 5
            return t
        end
        v = f()
        return t
    "#;
    let (outcome, interp) = run(source);
    let ControlOutcome::Error(err) = outcome else {
        panic!("expected an error");
    };
    assert_eq!(err.code, UNDEFINED_VARIABLE);
    assert_eq!(interp.global("v"), Some(&Value::Int(5)));
}

#[test]
fn test_assignment_without_var_reaches_globals() {
    let (outcome, interp) = run("function f()\n  g = 42\nend\nf()\nreturn g");
    assert_eq!(outcome.into_done(), Some(Value::Int(42)));
    assert_eq!(interp.global("g"), Some(&Value::Int(42)));
}

#[test]
fn test_recursion() {
    let value = run_value(
        r#"
        function fact(n)
            if n <= 1
                return 1
            end
            return n * fact(n - 1)
        end
        return fact(6)
        "#,
    );
    assert_eq!(value, Value::Int(720));
}

#[test]
fn test_runaway_recursion_is_fatal() {
    let source = r#"
        function down(n)
            return down(n + 1)
        end
        try
            down(0)
        catch(e)
            print "caught"
        end
    "#;
    let (outcome, interp) = run(source);
    let ControlOutcome::Error(err) = outcome else {
        panic!("expected an error");
    };
    assert_eq!(err.code, TOO_MANY_LEVELS);
    assert!(err.fatal);
    assert!(interp.host().output.is_empty());
    assert_eq!(interp.stack_depth(), 0);
}

#[test]
fn test_calls_replay_from_cache() {
    let mut interp = interpreter();
    let tally = counter(&mut interp, "tally");
    let outcome = interp.run(script(
        r#"
        function twice(v)
            return v * 2
        end
        x = tally(1) + twice(tally(2)) + twice(3)
        return x
        "#,
    ));
    assert_eq!(outcome.into_done(), Some(Value::Int(11)));
    // the statement was replayed twice, the native ran once per call site
    assert_eq!(tally.get(), 2);
}

#[test]
fn test_calls_in_loop_conditions() {
    let mut interp = interpreter();
    let tally = counter(&mut interp, "tally");
    let outcome = interp.run(script(
        r#"
        function limit()
            return 3
        end
        n = 0
        while n < limit() and tally(true)
            n += 1
        end
        return n
        "#,
    ));
    assert_eq!(outcome.into_done(), Some(Value::Int(3)));
    assert_eq!(tally.get(), 3);
}

#[test]
fn test_parallel_function_collects_process_blocks() {
    let (outcome, interp) = run(
        r#"
        parallel function build()
            process
                print "a"
            end
            process
                print "b"
            end
            print "collected"
        end
        build()
        "#,
    );
    assert!(outcome.is_done());
    assert_eq!(interp.host().output, vec!["collected"]);
    assert_eq!(interp.host().batches, vec![("build".to_string(), 2)]);
}

#[test]
fn test_native_errors_are_catchable() {
    let mut interp = interpreter();
    interp.register_function("fails", |_: &[Value]| {
        Err(crate::interpreter::ScriptError::new("HostError", "host said no"))
    });
    let outcome = interp.run(script("try\n  fails()\ncatch(e)\n  print e\nend"));
    assert!(outcome.is_done());
    assert_eq!(interp.host().output, vec!["host said no"]);
}
