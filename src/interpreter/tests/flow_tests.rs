use super::helpers::*;
use crate::interpreter::errors::LABEL_NOT_FOUND;
use crate::interpreter::{ControlOutcome, Value};

/* ===================== If ===================== */

#[test]
fn test_if_chain_runs_one_arm() {
    let source = r#"
        if x > 2
            print "big"
        elseif x > 1
            print "mid"
        elseif x > 0
            print "small"
        else
            print "none"
        end
        print "done"
    "#;
    for (x, expected) in [(3, "big"), (2, "mid"), (1, "small"), (0, "none")] {
        let mut interp = interpreter();
        interp.set_global("x", Value::Int(x));
        let outcome = interp.run(script(source));
        assert!(outcome.is_done());
        assert_eq!(interp.host().output, vec![expected, "done"]);
    }
}

#[test]
fn test_if_chain_rearms_inside_loop() {
    let output = run_output(
        r#"
        for (i = 0; i < 3; i += 1)
            if i == 1
                print "one"
            else
                print "other"
            end
        end
        "#,
    );
    assert_eq!(output, vec!["other", "one", "other"]);
}

/* ===================== Loops ===================== */

#[test]
fn test_counted_for() {
    let (outcome, interp) = run("n = 0\nfor (i = 0; i < 3; i += 1)\n  n += 1\nend\nreturn n");
    assert_eq!(outcome.into_done(), Some(Value::Int(3)));
    assert_eq!(interp.global("i"), Some(&Value::Int(3)));
}

#[test]
fn test_for_in_array() {
    let value = run_value(
        r#"
        total = 0
        for (var v in [1, 2, 3, 4])
            total += v
        end
        return total
        "#,
    );
    assert_eq!(value, Value::Int(10));
}

#[test]
fn test_for_in_map_visits_keys() {
    let output = run_output("m = %{\"a\": 1, \"b\": 2}\nfor (k in m)\n  print k + \"=\" + m[k]\nend");
    assert_eq!(output, vec!["a=1", "b=2"]);
}

#[test]
fn test_while_with_break_and_continue() {
    let value = run_value(
        r#"
        i = 0
        total = 0
        while i < 10
            i += 1
            if i % 2 == 0
                continue
            end
            if i > 7
                break
            end
            total += i
        end
        return total
        "#,
    );
    assert_eq!(value, Value::Int(1 + 3 + 5 + 7));
}

#[test]
fn test_while_false_skips_body() {
    let output = run_output("while false\n  print \"never\"\nend\nprint \"after\"");
    assert_eq!(output, vec!["after"]);
}

#[test]
fn test_break_levels() {
    let value = run_value(
        r#"
        hits = 0
        for (a = 0; a < 3; a += 1)
            for (b = 0; b < 3; b += 1)
                hits += 1
                if b == 1
                    break 2
                end
            end
        end
        return hits
        "#,
    );
    assert_eq!(value, Value::Int(2));
}

#[test]
fn test_break_outside_loop_fails() {
    let err = run_error("break");
    assert_eq!(err.code, crate::interpreter::errors::INVALID_JUMP);
}

/* ===================== Switch ===================== */

#[test]
fn test_switch_falls_through_until_break() {
    let output = run_output(
        r#"
        x = 2
        switch x
            case 1
                print "one"
            case 2
                print "two"
            case 3
                print "three"
                break
            case 4
                print "four"
        end
        print "after"
        "#,
    );
    assert_eq!(output, vec!["two", "three", "after"]);
}

#[test]
fn test_default_defers_to_later_case() {
    let value = run_value(
        r#"
        function pick(v)
            switch v
                default
                    return "other"
                case 1
                    return "one"
                case 2
                    return "two"
            end
        end
        return pick(1) + "," + pick(2) + "," + pick(9)
        "#,
    );
    assert_eq!(value, Value::from("one,two,other"));
}

#[test]
fn test_continue_skips_switch() {
    let output = run_output(
        r#"
        for (i = 0; i < 3; i += 1)
            switch i
                case 1
                    continue
            end
            print i
        end
        "#,
    );
    assert_eq!(output, vec!["0", "2"]);
}

/* ===================== Jumps and Blocks ===================== */

#[test]
fn test_goto_label() {
    let value = run_value(
        r#"
        n = 0
        label top
        n += 1
        if n < 3
            goto top
        end
        return n
        "#,
    );
    assert_eq!(value, Value::Int(3));
    assert_eq!(run_error("goto nowhere").code, LABEL_NOT_FOUND);
}

#[test]
fn test_push_and_inline_process_blocks() {
    let output = run_output("push\n  print \"in\"\nend\nprocess\n  print \"p\"\nend\nprint \"out\"");
    assert_eq!(output, vec!["in", "p", "out"]);
}

#[test]
fn test_substitution_in_command() {
    let output = run_output("n = 4\nprint @{n * 2}");
    assert_eq!(output, vec!["8"]);
}

/* ===================== Exit and Quit ===================== */

#[test]
fn test_exit_finishes_normally() {
    let (outcome, interp) = run(
        r#"
        function stop()
            exit
        end
        print "a"
        stop()
        print "b"
        "#,
    );
    assert_eq!(outcome.into_done(), Some(Value::empty_string()));
    assert_eq!(interp.host().output, vec!["a"]);
    assert_eq!(interp.stack_depth(), 0);
}

#[test]
fn test_quit_halts_through_try() {
    let (outcome, interp) = run("try\n  quit\ncatch(e)\n  print \"caught\"\nend");
    assert!(matches!(outcome, ControlOutcome::Halt));
    assert!(interp.host().output.is_empty());
}
