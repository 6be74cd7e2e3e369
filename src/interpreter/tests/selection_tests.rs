use super::helpers::*;
use crate::interpreter::errors::{DOMAIN_MISMATCH, UNKNOWN_PROPERTY};
use crate::interpreter::{Domain, Value};

fn members(interp: &crate::interpreter::Interpreter<TestHost>) -> Vec<usize> {
    interp.selection().indices().collect()
}

#[test]
fn test_comparators() {
    assert_eq!(run_value("return {resname = \"LIG\"}.size"), Value::Int(4));
    assert_eq!(run_value("return {elemno = 8}.size"), Value::Int(3));
    assert_eq!(run_value("return {x >= 6}.size"), Value::Int(3));
    assert_eq!(run_value("return {resname like \"h*\"}.size"), Value::Int(2));
    assert_eq!(run_value("n = 7\nreturn {elemno = n}.index"), Value::Int(4));
}

#[test]
fn test_named_predicates() {
    assert_eq!(run_value("return {water}.size"), Value::Int(2));
    assert_eq!(run_value("return {hetero}.size"), Value::Int(4));
    assert_eq!(run_value("return {carbon and not hetero}.atomname"), Value::from("CA"));
    assert_eq!(run_value("return {protein}.size"), Value::Int(2));
    assert_eq!(run_value("return {}.size"), Value::Int(0));
    assert_eq!(run_value("return {true}.size"), Value::Int(8));
    assert_eq!(run_error("return {nosuch}.size").code, UNKNOWN_PROPERTY);
}

#[test]
fn test_within_ligand_excluding_ligand() {
    let value = run_value(
        "return {within(2.0, {resname = \"LIG\"}) and not {resname = \"LIG\"}}.index",
    );
    // only the first water sits within 2 of the ligand hydrogen
    assert_eq!(value, Value::Int(6));
}

#[test]
fn test_topology_functions() {
    assert_eq!(
        run_value("return connected({atomname = \"CA\"}).element"),
        Value::from("N")
    );
    assert_eq!(run_value("return bonds({resname = \"LIG\"}).size"), Value::Int(3));
    assert_eq!(run_value("return {resname = \"LIG\"}.bonds.size"), Value::Int(3));
    assert_eq!(
        run_value("return round(distance({atomname = \"CA\"}, {elemno = 7}) * 10)"),
        Value::Int(14)
    );
}

#[test]
fn test_set_domains_do_not_mix() {
    let err = run_error("return {carbon} and bonds({carbon})");
    assert_eq!(err.code, DOMAIN_MISMATCH);

    let err = run_error("return {carbon} + bonds({carbon})");
    assert_eq!(err.code, DOMAIN_MISMATCH);

    let value = run_value("return (bonds({carbon}) or bonds({hydrogen})).size");
    assert_eq!(value, Value::Int(4));
}

#[test]
fn test_set_arithmetic() {
    assert_eq!(run_value("return ({hetero} - {carbon}).size"), Value::Int(2));
    assert_eq!(run_value("return ({water} + {nitrogen}).size"), Value::Int(3));
    assert_eq!(run_value("return ({hetero} xor {carbon}).size"), Value::Int(3));
}

#[test]
fn test_select_and_selected() {
    let (outcome, interp) = run("select {water}\nreturn {selected and x < 10}.size");
    assert_eq!(outcome.into_done(), Some(Value::Int(1)));
    assert_eq!(members(&interp), vec![6, 7]);
    assert_eq!(interp.selection().domain, Domain::Atoms);

    let (outcome, interp) = run("select");
    assert!(outcome.is_done());
    assert_eq!(members(&interp).len(), 8);

    assert_eq!(run_error("select bonds({carbon})").code, DOMAIN_MISMATCH);
}

#[test]
fn test_define_names_a_set() {
    let (outcome, interp) = run("define lig {resname = \"LIG\"}\nreturn {lig and carbon}.size");
    assert_eq!(outcome.into_done(), Some(Value::Int(2)));
    assert_eq!(interp.defined_set("LIG").map(|s| s.len()), Some(4));
}

#[test]
fn test_variable_shadows_predicate() {
    let value = run_value("water = {hetero}\nreturn {water}.size");
    assert_eq!(value, Value::Int(4));
}

#[test]
fn test_store_assignment() {
    let (outcome, interp) = run("{resname = \"HOH\"}.charge = -1\nreturn {water}.charge");
    assert_eq!(outcome.into_done(), Some(Value::Float(-1.0)));
    assert_eq!(interp.host().scene.atoms[6].charge, -1.0);
    assert_eq!(interp.host().scene.atoms[0].charge, 0.0);

    let err = run_error("{water}.model = 3");
    assert_eq!(err.code, crate::interpreter::errors::BAD_ARGUMENT);
}

#[test]
fn test_model_ranges() {
    let mut interp = interpreter();
    interp.host_mut().scene.atoms[7].model = 2;

    let outcome = interp.run(script("return {model = 2}.index"));
    assert_eq!(outcome.into_done(), Some(Value::Int(7)));
    let outcome = interp.run(script("return {model != 2}.size"));
    assert_eq!(outcome.into_done(), Some(Value::Int(7)));
    let outcome = interp.run(script("return {model = 5}.size"));
    assert_eq!(outcome.into_done(), Some(Value::Int(0)));
}

#[test]
fn test_iterating_a_set() {
    let output = run_output("for (w in {water})\n  print w.resno\nend");
    assert_eq!(output, vec!["3", "4"]);
}

#[test]
fn test_topology_functions_reject_bond_sets() {
    assert_eq!(run_error("return within(2.0, bonds({carbon}))").code, DOMAIN_MISMATCH);
    assert_eq!(run_error("return connected(bonds({carbon}))").code, DOMAIN_MISMATCH);
    assert_eq!(run_error("return bonds(bonds({carbon}))").code, DOMAIN_MISMATCH);
}
