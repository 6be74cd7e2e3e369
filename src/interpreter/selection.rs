//! Selection expression evaluator
//!
//! Drives a [`MathEngine`] in selection mode with domain leaves: property
//! comparisons scan the data store, named predicates resolve to full-domain
//! sets, and `and`/`or`/`not` reduce as set algebra. An empty selection is the
//! empty atom set.

use super::errors::{fail, ScriptError, ScriptResult, INVALID_EXPRESSION, UNKNOWN_PROPERTY};
use super::expressions::{self, matching_selection_end, unexpected};
use super::host::DataStore;
use super::rpn::{operators, EngineMode, MathEngine};
use super::types::{compare, item_id, values_equal, Bracket, Domain, ItemProperty, ItemSet, Op, Token, TokenKind, Value};
use super::vm::Vm;
use roaring::RoaringBitmap;
use std::cmp::Ordering;

/// Evaluate the tokens between `{` and `}`
pub fn evaluate(vm: &mut Vm<'_>, tokens: &[Token], check: bool) -> ScriptResult<Value> {
    let mode = if check { EngineMode::Check } else { EngineMode::Selection };
    let mut engine = MathEngine::new(mode);
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        let accepted = match &token.kind {
            TokenKind::Comparator { property, op } => {
                let value = match &token.value {
                    Some(v) => v.clone(),
                    None => {
                        i += 1;
                        match tokens.get(i) {
                            Some(next) => comparand(vm, next, check)?,
                            None => {
                                return fail(
                                    INVALID_EXPRESSION,
                                    format!("missing value after '{}'", token.text()),
                                )
                            }
                        }
                    }
                };
                let set = if check {
                    Value::Int(0)
                } else {
                    Value::Set(compare_items(vm.host.store(), property, *op, &value)?)
                };
                engine.push_operand(set, vm)?
            }
            TokenKind::Predicate(name) | TokenKind::Identifier(name) => {
                let value = if check {
                    Value::Int(0)
                } else {
                    named_set(vm, name)?
                };
                engine.push_operand(value, vm)?
            }
            TokenKind::Literal => {
                let value = token.value.clone().unwrap_or(Value::Int(token.int_value));
                engine.push_operand(value, vm)?
            }
            TokenKind::Bracket(Bracket::ExpressionBegin) => {
                let end = matching_selection_end(tokens, i)?;
                let value = evaluate(vm, &tokens[i + 1..end], check)?;
                i = end;
                engine.push_operand(value, vm)?
            }
            TokenKind::Substitution(inner) => {
                let mode = if check { EngineMode::Check } else { EngineMode::Math };
                let value = expressions::evaluate(vm, inner, mode)?;
                engine.push_operand(value, vm)?
            }
            TokenKind::PropertySelector(name) => engine.push_property(name, vm)?,
            TokenKind::Operator(_)
            | TokenKind::Bracket(_)
            | TokenKind::Function(_)
            | TokenKind::Method(_) => engine.push_operator(token, vm)?,
            _ => false,
        };
        if !accepted {
            return Err(unexpected(token).into());
        }
        i += 1;
    }
    let result = engine.drain(vm)?;
    if check {
        return Ok(result);
    }
    match result {
        Value::Set(_) => Ok(result),
        Value::Bool(true) => {
            let n = vm.host.store().item_count(Domain::Atoms);
            Ok(Value::Set(ItemSet::full(n, Domain::Atoms)))
        }
        Value::Bool(false) => Ok(Value::Set(ItemSet::empty(Domain::Atoms))),
        other => Err(ScriptError::type_error(format!(
            "selection produced {}, not an atom set",
            other.type_name()
        ))
        .into()),
    }
}

/// Right-hand side of a comparator written as a separate token
fn comparand(vm: &mut Vm<'_>, token: &Token, check: bool) -> ScriptResult<Value> {
    match &token.kind {
        TokenKind::Literal => Ok(token.value.clone().unwrap_or(Value::Int(token.int_value))),
        TokenKind::Identifier(name) | TokenKind::Predicate(name) => {
            if check {
                return Ok(Value::Int(0));
            }
            // a bare word is a string unless it names a variable
            Ok(vm
                .get_variable(name)
                .cloned()
                .unwrap_or_else(|| Value::Str(name.clone())))
        }
        TokenKind::Substitution(inner) => {
            let mode = if check { EngineMode::Check } else { EngineMode::Math };
            expressions::evaluate(vm, inner, mode)
        }
        _ => Err(unexpected(token).into()),
    }
}

/// Variable, `define`d set, current selection, then store predicate
fn named_set(vm: &mut Vm<'_>, name: &str) -> ScriptResult<Value> {
    if let Some(value) = vm.get_variable(name) {
        return Ok(value.clone());
    }
    let key = name.to_ascii_lowercase();
    if let Some(set) = vm.defined.get(&key) {
        return Ok(Value::Set(set.clone()));
    }
    if key == "selected" {
        return Ok(Value::Set(vm.selection.clone()));
    }
    match vm.host.store().named_set(&key) {
        Some(set) => Ok(Value::Set(set)),
        None => fail(UNKNOWN_PROPERTY, format!("unknown selection term: {}", name)),
    }
}

/// Items whose `property` compares to `value` under `op`
pub fn compare_items(
    store: &dyn DataStore,
    property: &ItemProperty,
    op: Op,
    value: &Value,
) -> ScriptResult<ItemSet> {
    let domain = if property.is_bond_property() {
        Domain::Bonds
    } else {
        Domain::Atoms
    };
    let count = store.item_count(domain);

    if property.is_range_identity() && matches!(op, Op::Eq | Op::Ne) {
        if let Some(range) = store.item_range(property, value) {
            let mut bits = RoaringBitmap::new();
            bits.insert_range(item_id(range.start)..item_id(range.end));
            let set = ItemSet::new(bits, domain);
            let bits = if op == Op::Ne { set.complement(count) } else { set.bits };
            return Ok(ItemSet::new(bits, domain));
        }
    }

    let pattern = value.to_string();
    let mut bits = RoaringBitmap::new();
    for i in 0..count {
        let Some(item) = store.property(domain, property, i) else {
            return fail(
                UNKNOWN_PROPERTY,
                format!("unknown property: {}", property.name()),
            );
        };
        let hit = match op {
            Op::Eq => values_equal(&item, value),
            Op::Ne => !values_equal(&item, value),
            Op::Lt => compare(&item, value) == Some(Ordering::Less),
            Op::Le => matches!(compare(&item, value), Some(Ordering::Less | Ordering::Equal)),
            Op::Gt => compare(&item, value) == Some(Ordering::Greater),
            Op::Ge => matches!(compare(&item, value), Some(Ordering::Greater | Ordering::Equal)),
            Op::Like => operators::wildcard_match(&pattern, &item.to_string()),
            other => {
                return fail(
                    INVALID_EXPRESSION,
                    format!("'{}' is not a comparison", other.symbol()),
                )
            }
        };
        if hit {
            bits.insert(item_id(i));
        }
    }
    Ok(ItemSet::new(bits, domain))
}
