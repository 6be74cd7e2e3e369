use super::helpers::*;
use crate::interpreter::errors::IO_ERROR;
use crate::interpreter::{Completion, ControlOutcome, Suspension, Value, WaitKind};

fn suspend(outcome: ControlOutcome) -> Suspension {
    match outcome {
        ControlOutcome::Suspend(s) => s,
        other => panic!("expected Suspend, got {:?}", other),
    }
}

fn done() -> Completion {
    Completion::Done(Value::empty_string())
}

#[test]
fn test_delay_suspends_and_resumes_once() {
    let mut interp = cooperative();
    let outcome = interp.run(script("print \"before\"\ndelay 0.5\nprint \"after\"\nreturn 7"));
    let suspension = suspend(outcome);

    assert_eq!(suspension.request.kind, WaitKind::Delay { seconds: 0.5 });
    assert_eq!(interp.host().output, vec!["before"]);
    assert_eq!(interp.stack_depth(), 0);
    assert!(suspension.stack.iter().all(|f| f.must_resume));

    let outcome = interp.resume(suspension, done());
    assert_eq!(outcome.into_done(), Some(Value::Int(7)));
    assert_eq!(interp.host().output, vec!["before", "after"]);
}

#[test]
fn test_load_sets_target_on_resume() {
    let mut interp = cooperative();
    let suspension = suspend(interp.run(script("load \"ligand.json\" as n\nreturn n + 1")));
    assert_eq!(
        suspension.request.kind,
        WaitKind::Load {
            path: "ligand.json".into()
        }
    );
    assert_eq!(suspension.request.target.as_deref(), Some("n"));

    let outcome = interp.resume(suspension, Completion::Done(Value::Int(8)));
    assert_eq!(outcome.into_done(), Some(Value::Int(9)));
}

#[test]
fn test_failed_completion_is_catchable() {
    let mut interp = cooperative();
    let source = "try\n  load \"missing.json\" as t\n  print \"loaded\"\ncatch(e)\n  print e\nend";
    let suspension = suspend(interp.run(script(source)));
    let outcome = interp.resume(suspension, Completion::Failed("no such file".into()));
    assert!(outcome.is_done());
    assert_eq!(interp.host().output, vec!["no such file"]);
}

#[test]
fn test_failed_completion_uncaught() {
    let mut interp = cooperative();
    let suspension = suspend(interp.run(script("pause \"look\"\nprint \"never\"")));
    assert_eq!(
        suspension.request.kind,
        WaitKind::Pause {
            message: "look".into()
        }
    );
    let ControlOutcome::Error(err) = interp.resume(suspension, Completion::Failed("gone".into()))
    else {
        panic!("expected an error");
    };
    assert_eq!(err.code, IO_ERROR);
    assert!(interp.host().output.is_empty());
}

#[test]
fn test_suspension_inside_function_and_loop() {
    let mut interp = cooperative();
    let source = r#"
        function wait_twice()
            for (i = 0; i < 2; i += 1)
                delay 1
                print "tick " + i
            end
            return "ok"
        end
        return wait_twice()
    "#;
    let first = suspend(interp.run(script(source)));
    assert!(first.stack.len() >= 3);

    let second = suspend(interp.resume(first, done()));
    assert_eq!(interp.host().output, vec!["tick 0"]);

    let outcome = interp.resume(second, done());
    assert_eq!(outcome.into_done(), Some(Value::from("ok")));
    assert_eq!(interp.host().output, vec!["tick 0", "tick 1"]);
}

#[test]
fn test_suspension_survives_serialization() {
    let mut interp = cooperative();
    let source = "n = 2\nif n > 1\n  delay 1\n  n += 40\nend\nreturn n";
    let suspension = suspend(interp.run(script(source)));

    let json = serde_json::to_string(&suspension).unwrap();
    let restored: Suspension = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.request.key, suspension.request.key);

    let outcome = interp.resume(restored, done());
    assert_eq!(outcome.into_done(), Some(Value::Int(42)));
}

/// Serialize a suspension and read it back
fn round_trip(suspension: &Suspension) -> Suspension {
    let json = serde_json::to_string(suspension).unwrap();
    serde_json::from_str(&json).unwrap()
}

#[test]
fn test_resume_on_another_interpreter() {
    let source = r#"
        function twice(v)
            return v * 2
        end
        n = 5
        define lig {resname = "LIG"}
        select {water}
        delay 1
        return twice(n) + {lig}.size + {selected}.size
    "#;
    let mut first = cooperative();
    let suspension = suspend(first.run(script(source)));

    let mut second = cooperative();
    let outcome = second.resume(round_trip(&suspension), done());
    assert_eq!(outcome.into_done(), Some(Value::Int(10 + 4 + 2)));
    assert_eq!(second.global("n"), Some(&Value::Int(5)));
}

#[test]
fn test_deep_suspension_round_trips() {
    let source = r#"
        function down(n)
            if n > 0
                return down(n - 1)
            end
            delay 1
            print "bottom"
            return 7
        end
        return down(60)
    "#;
    let mut first = cooperative();
    let suspension = suspend(first.run(script(source)));
    assert!(suspension.stack.len() > 100);

    let json = serde_json::to_string(&suspension).unwrap();
    // the function body is written once, not once per frame
    assert!(json.matches("bottom").count() <= 2);
    let restored: Suspension = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.stack.len(), suspension.stack.len());

    let mut second = cooperative();
    let outcome = second.resume(restored, done());
    assert_eq!(outcome.into_done(), Some(Value::Int(7)));
    assert_eq!(second.host().output, vec!["bottom"]);
    assert_eq!(second.stack_depth(), 0);
}

#[test]
fn test_blocking_host_never_suspends() {
    let mut interp = interpreter();
    interp
        .host_mut()
        .completions
        .extend([done(), Completion::Done(Value::from("data"))]);
    let outcome = interp.run(script("delay 1\nload \"f.txt\" as v\nreturn v"));
    assert_eq!(outcome.into_done(), Some(Value::from("data")));
    assert_eq!(interp.host().waits.len(), 2);
}

#[test]
fn test_blocking_failure_is_catchable() {
    let mut interp = interpreter();
    interp
        .host_mut()
        .completions
        .push_back(Completion::Failed("disk on fire".into()));
    let outcome = interp.run(script("try\n  load \"f.txt\"\ncatch(e)\n  print e\nend"));
    assert!(outcome.is_done());
    assert_eq!(interp.host().output, vec!["disk on fire"]);
}

#[test]
fn test_config_can_forbid_blocking() {
    let config = crate::config::InterpreterConfig {
        host_can_block: false,
        ..Default::default()
    };
    let mut interp = crate::interpreter::Interpreter::new(TestHost::new(true), config);
    let outcome = interp.run(script("delay 1"));
    assert!(matches!(outcome, ControlOutcome::Suspend(_)));
    assert!(interp.host().waits.is_empty());
}
