use super::helpers::*;
use crate::interpreter::errors::{UNDEFINED_VARIABLE, USER_ERROR};
use crate::interpreter::Value;

#[test]
fn test_catch_binds_message() {
    let output = run_output(
        r#"
        try
            throw "boom"
            print "skipped"
        catch(e)
            print "caught " + e
        end
        print "after"
        "#,
    );
    assert_eq!(output, vec!["caught boom", "after"]);
}

#[test]
fn test_try_without_error_skips_catch() {
    let output = run_output("try\n  print \"body\"\ncatch(e)\n  print \"catch\"\nend\nprint \"after\"");
    assert_eq!(output, vec!["body", "after"]);
}

#[test]
fn test_engine_errors_are_catchable() {
    let output = run_output("try\n  y = nope + 1\ncatch(e)\n  print e\nend");
    assert_eq!(output, vec!["undefined variable: nope"]);
}

#[test]
fn test_uncaught_error_surfaces_unchanged() {
    let err = run_error("print \"start\"\nthrow \"bad input\"");
    assert_eq!(err.code, USER_ERROR);
    assert_eq!(err.message, "bad input");
    assert!(!err.fatal);
    assert_eq!(err.trace.len(), 1);
    assert_eq!(err.trace[0].line, 2);
    assert_eq!(err.report(), format!("UserError: bad input\n  {}", err.trace[0]));
}

#[test]
fn test_try_without_catch_swallows() {
    let output = run_output("try\n  throw \"x\"\n  print \"skipped\"\nend\nprint \"after\"");
    assert_eq!(output, vec!["after"]);
}

#[test]
fn test_nested_try_rethrow() {
    let output = run_output(
        r#"
        try
            try
                throw "inner"
            catch(e)
                throw "outer " + e
            end
        catch(e)
            print e
        end
        "#,
    );
    assert_eq!(output, vec!["outer inner"]);
}

#[test]
fn test_error_unwinds_functions_and_loops() {
    let output = run_output(
        r#"
        function bad(n)
            for (i = 0; i < 5; i += 1)
                if i == n
                    throw "stopped at " + i
                end
            end
        end
        try
            bad(2)
        catch(e)
            print e
        end
        print "after"
        "#,
    );
    assert_eq!(output, vec!["stopped at 2", "after"]);
}

#[test]
fn test_error_builtin() {
    let output = run_output("try\n  x = error(\"custom\")\ncatch(e)\n  print e\nend");
    assert_eq!(output, vec!["custom"]);
    assert_eq!(run_error("x = error(\"m\")").code, USER_ERROR);
}

#[test]
fn test_trace_names_each_frame() {
    let err = run_error("function inner()\n  return missing\nend\nreturn inner()");
    assert_eq!(err.code, UNDEFINED_VARIABLE);
    let sources: Vec<&str> = err.trace.iter().map(|t| t.source.as_str()).collect();
    assert_eq!(sources, vec!["inner", "main"]);
    assert_eq!(err.trace[0].text, "return missing");
}

#[test]
fn test_catch_body_assigns_globals() {
    let value = run_value("try\n  throw \"x\"\ncatch(e)\n  n = 1\nend\nreturn n");
    assert_eq!(value, Value::Int(1));
}
