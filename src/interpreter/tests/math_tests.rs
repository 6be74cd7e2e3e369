//! Tests for expression evaluation through the dispatcher

use super::asm;
use super::helpers::*;
use crate::interpreter::errors::{
    INVALID_EXPRESSION, TYPE_ERROR, UNDEFINED_VARIABLE, UNKNOWN_FUNCTION,
};
use crate::interpreter::{Token, Value};

#[test]
fn test_precedence_and_promotion() {
    assert_eq!(run_value("return 2 + 3 * 4"), Value::Int(14));
    assert_eq!(run_value("return (2 + 3) * 4"), Value::Int(20));
    assert_eq!(run_value("return 3 + 2.0"), Value::Float(5.0));
    assert_eq!(run_value("return 10 - -3"), Value::Int(13));
}

#[test]
fn test_division() {
    assert_eq!(run_value("return 7 / 2"), Value::Int(3));
    assert_eq!(run_value("return 7.0 / 2"), Value::Float(3.5));
    assert_eq!(run_value("return 7 \\ 2"), Value::Int(3));
    assert_eq!(run_value("return 1 / 0"), Value::Float(f64::INFINITY));
}

#[test]
fn test_power_is_right_associative() {
    assert_eq!(run_value("return 2 ** 3 ** 2"), Value::Int(512));
}

#[test]
fn test_modulo_formats_floats() {
    assert_eq!(run_value("return 3.14159 % 2"), Value::from("3.14"));
    assert_eq!(run_value("return 17 % 5"), Value::Int(2));
}

#[test]
fn test_strings() {
    assert_eq!(run_value("return \"ab\" + 1"), Value::from("ab1"));
    assert_eq!(run_value("return \"Carbon\" like \"c*n\""), Value::Bool(true));
    assert_eq!(run_value("return \"abc\" == \"ABC\""), Value::Bool(false));
    assert_eq!(run_value("return \"a,b,c\".split(\",\").size"), Value::Int(3));
}

#[test]
fn test_ternary() {
    assert_eq!(run_value("return 1 > 2 ? \"a\" : \"b\""), Value::from("b"));
    assert_eq!(
        run_value("x = 5\nreturn x > 3 ? x > 4 ? \"big\" : \"mid\" : \"small\""),
        Value::from("big")
    );
}

#[test]
fn test_short_circuit_skips_calls() {
    let mut interp = interpreter();
    let tally = counter(&mut interp, "tally");

    let outcome = interp.run(script("return false and tally(1)"));
    assert_eq!(outcome.into_done(), Some(Value::Bool(false)));
    let outcome = interp.run(script("return true or tally(1)"));
    assert_eq!(outcome.into_done(), Some(Value::Bool(true)));
    let outcome = interp.run(script("return true ? 1 : tally(2)"));
    assert_eq!(outcome.into_done(), Some(Value::Int(1)));
    assert_eq!(tally.get(), 0);

    let outcome = interp.run(script("return true and tally(1)"));
    assert_eq!(outcome.into_done(), Some(Value::Bool(true)));
    assert_eq!(tally.get(), 1);
}

#[test]
fn test_arrays_and_maps() {
    assert_eq!(run_value("a = [10, 20, 30]\nreturn a[2]"), Value::Int(20));
    assert_eq!(run_value("a = [10, 20, 30]\nreturn a[-1]"), Value::Int(20));
    assert_eq!(
        run_value("a = [3, 1, 2]\na[1] = 9\nreturn a.sort"),
        Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(9)])
    );
    assert_eq!(run_value("m = %{\"a\": 1, \"b\": 2}\nreturn m.b"), Value::Int(2));
    assert_eq!(
        run_value("m = %{\"a\": 1}\nm.c = 3\nreturn m.keys.join(\"+\")"),
        Value::from("a+c")
    );
}

#[test]
fn test_points() {
    assert_eq!(run_value("p = point(1, 2, 3)\np.x = 5\nreturn p.x"), Value::Float(5.0));
    assert_eq!(
        run_value("return point(1, 0, 0) * point(2, 5, 0)"),
        Value::Float(2.0)
    );
    assert_eq!(run_value("return round(sin(90))"), Value::Int(1));
}

#[test]
fn test_compound_assignment() {
    assert_eq!(run_value("x = 2\nx += 3\nx *= 4\nreturn x"), Value::Int(20));
    assert_eq!(run_error("y += 1").code, UNDEFINED_VARIABLE);
}

#[test]
fn test_evaluation_errors() {
    assert_eq!(run_error("return y + 1").code, UNDEFINED_VARIABLE);
    assert_eq!(run_error("return nosuch(1)").code, UNKNOWN_FUNCTION);
    assert_eq!(run_error("return point(1, 2, 3) + %{\"a\": 1}").code, TYPE_ERROR);
}

#[test]
fn test_standalone_evaluate() {
    let mut interp = interpreter();
    interp.set_global("x", Value::Int(4));
    assert_eq!(interp.evaluate(asm::expr("x * 2")).unwrap(), Value::Int(8));

    // a negative literal right after an operand subtracts
    let tokens = vec![Token::literal(5), Token::literal(-1)];
    assert_eq!(interp.evaluate(tokens).unwrap(), Value::Int(4));

    assert_eq!(interp.evaluate(asm::expr("x +")).unwrap_err().code, INVALID_EXPRESSION);
}
