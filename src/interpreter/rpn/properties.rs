//! Property selectors (`.name`) and methods (`.name(...)`) on values

use super::MathContext;
use crate::interpreter::errors::{fail, ScriptError, ScriptResult, UNKNOWN_FUNCTION, UNKNOWN_PROPERTY};
use crate::interpreter::types::{compare, values_equal, Domain, ItemProperty, ItemSet, Value};
use std::cmp::Ordering;

/* ===================== Properties ===================== */

/// Resolve `value.name`
pub fn get_property(value: &Value, name: &str, ctx: &mut dyn MathContext) -> ScriptResult<Value> {
    let lname = name.to_ascii_lowercase();
    match (value, lname.as_str()) {
        (_, "type") => return Ok(Value::from(value.type_name())),
        (Value::Str(s), "size" | "length") => return Ok(Value::Int(s.chars().count() as i32)),
        (Value::Set(s), "size" | "length" | "count") => return Ok(Value::Int(s.len() as i32)),
        (Value::Array(_) | Value::Map(_), "size" | "length" | "count") => {
            return Ok(Value::Int(value.size()))
        }
        (Value::Set(s), "bonds") if s.domain == Domain::Atoms => {
            let bits = ctx.store().bonds_of(&s.bits);
            return Ok(Value::Set(ItemSet::bonds(bits)));
        }
        (Value::Set(s), _) => return set_property(s, name, ctx),
        (Value::Map(m), _) if !matches!(lname.as_str(), "keys" | "values") => {
            return Ok(m.get(name).cloned().unwrap_or_else(Value::empty_string))
        }
        _ => {}
    }

    Ok(match (value, lname.as_str()) {
        (Value::Point3(p), "x") => Value::Float(p.x),
        (Value::Point3(p), "y") => Value::Float(p.y),
        (Value::Point3(p), "z") => Value::Float(p.z),
        (Value::Point4(p), "x") => Value::Float(p.x),
        (Value::Point4(p), "y") => Value::Float(p.y),
        (Value::Point4(p), "z") => Value::Float(p.z),
        (Value::Point4(p), "w") => Value::Float(p.w),
        (Value::Point4(p), "inverse") => {
            let q = nalgebra::Quaternion::from(*p);
            Value::Point4(q.try_inverse().map(|q| q.coords).unwrap_or(*p))
        }
        (Value::Map(m), "keys") => Value::Array(m.keys().map(|k| Value::from(k.as_str())).collect()),
        (Value::Map(m), "values") => Value::Array(m.values().cloned().collect()),
        (Value::Array(a), "min") => extreme(a, Ordering::Less),
        (Value::Array(a), "max") => extreme(a, Ordering::Greater),
        (Value::Array(a), "sum") => sum(a),
        (Value::Array(a), "average") => {
            if a.is_empty() {
                Value::Float(f64::NAN)
            } else {
                Value::Float(sum(a).as_float() / a.len() as f64)
            }
        }
        (Value::Array(a), "reverse") => Value::Array(a.iter().rev().cloned().collect()),
        (Value::Array(a), "sort") => {
            let mut items = a.clone();
            items.sort_by(|x, y| compare(x, y).unwrap_or(Ordering::Equal));
            Value::Array(items)
        }
        (Value::Str(s), "reverse") => Value::Str(s.chars().rev().collect()),
        (Value::Str(s), "upper") => Value::Str(s.to_uppercase()),
        (Value::Str(s), "lower") => Value::Str(s.to_lowercase()),
        (Value::Str(s), "trim") => Value::Str(s.trim().to_string()),
        (Value::Str(s), "lines") => Value::Array(s.lines().map(Value::from).collect()),
        (Value::Matrix3(m), "transpose") => Value::Matrix3(m.transpose()),
        (Value::Matrix4(m), "transpose") => Value::Matrix4(m.transpose()),
        (Value::Matrix3(m), "determinant") => Value::Float(m.determinant()),
        (Value::Matrix4(m), "determinant") => Value::Float(m.determinant()),
        (Value::Matrix3(m), "inverse") => Value::Matrix3(m.try_inverse().ok_or_else(singular)?),
        (Value::Matrix4(m), "inverse") => Value::Matrix4(m.try_inverse().ok_or_else(singular)?),
        (_, "size" | "length") => Value::Int(value.size()),
        _ => {
            return fail(
                UNKNOWN_PROPERTY,
                format!("unknown property .{} for {}", name, value.type_name()),
            )
        }
    })
}

fn singular() -> ScriptError {
    ScriptError::type_error("matrix is singular")
}

/// Store property over a set: numeric properties average, others list per item
fn set_property(set: &ItemSet, name: &str, ctx: &mut dyn MathContext) -> ScriptResult<Value> {
    let property = ItemProperty::from_name(name);
    let store = ctx.store();
    let mut values = Vec::with_capacity(set.len());
    for index in set.indices() {
        match store.property(set.domain, &property, index) {
            Some(v) => values.push(v),
            None => {
                return fail(
                    UNKNOWN_PROPERTY,
                    format!("unknown property .{} for {}", name, Value::Set(set.clone()).type_name()),
                )
            }
        }
    }
    Ok(match values.len() {
        0 => Value::empty_string(),
        1 => values.remove(0),
        n if values.iter().all(|v| v.is_numeric()) => {
            Value::Float(values.iter().map(|v| v.as_float()).sum::<f64>() / n as f64)
        }
        _ => Value::Array(values),
    })
}

fn extreme(items: &[Value], want: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for item in items {
        best = match best {
            Some(b) if compare(item, b) != Some(want) => Some(b),
            _ => Some(item),
        };
    }
    best.cloned().unwrap_or(Value::Float(f64::NAN))
}

fn sum(items: &[Value]) -> Value {
    if items.iter().all(|v| matches!(v, Value::Int(_))) {
        Value::Int(items.iter().fold(0i32, |acc, v| acc.wrapping_add(v.as_int())))
    } else {
        Value::Float(items.iter().map(|v| v.as_float()).sum())
    }
}

/* ===================== Methods ===================== */

/// Resolve `value.name(args...)`
pub fn call_method(
    value: &Value,
    name: &str,
    args: &[Value],
    _ctx: &mut dyn MathContext,
) -> ScriptResult<Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_else(Value::empty_string);
    Ok(match (value, name.to_ascii_lowercase().as_str()) {
        (Value::Array(a), "join") => {
            let sep = arg(0).to_string();
            Value::Str(a.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(&sep))
        }
        (Value::Str(s), "split") => {
            let sep = arg(0).to_string();
            if sep.is_empty() {
                Value::Array(s.chars().map(|c| Value::Str(c.to_string())).collect())
            } else {
                Value::Array(s.split(sep.as_str()).map(Value::from).collect())
            }
        }
        (Value::Str(s), "find") => {
            let needle = arg(0).to_string();
            match s.find(&needle) {
                Some(byte) => Value::Int(s[..byte].chars().count() as i32 + 1),
                None => Value::Int(0),
            }
        }
        (Value::Array(a), "find") => {
            let needle = arg(0);
            Value::Int(
                a.iter()
                    .position(|v| values_equal(v, &needle))
                    .map(|i| i as i32 + 1)
                    .unwrap_or(0),
            )
        }
        (Value::Str(s), "replace") => {
            Value::Str(s.replace(&arg(0).to_string(), &arg(1).to_string()))
        }
        (Value::Str(s), "count") => {
            let needle = arg(0).to_string();
            if needle.is_empty() {
                Value::Int(0)
            } else {
                Value::Int(s.matches(needle.as_str()).count() as i32)
            }
        }
        (Value::Array(a), "count") => {
            let needle = arg(0);
            Value::Int(a.iter().filter(|v| values_equal(v, &needle)).count() as i32)
        }
        (Value::Map(m), "get") => m
            .get(&arg(0).to_string())
            .cloned()
            .unwrap_or_else(Value::empty_string),
        (Value::Array(a), "get") => index_value(&Value::Array(a.clone()), &arg(0)),
        _ => {
            return fail(
                UNKNOWN_FUNCTION,
                format!("unknown method .{}() for {}", name, value.type_name()),
            )
        }
    })
}

/* ===================== Indexing ===================== */

/// `container[index]`: 1-based, zero and negatives count back from the end
pub fn index_value(container: &Value, index: &Value) -> Value {
    let resolve = |len: usize| -> Option<usize> {
        let i = index.as_int() as i64;
        let len = len as i64;
        let pos = if i >= 1 { i - 1 } else { len - 1 + i };
        (pos >= 0 && pos < len).then_some(pos as usize)
    };
    match container {
        Value::Array(a) => resolve(a.len())
            .map(|i| a[i].clone())
            .unwrap_or_else(Value::empty_string),
        Value::Map(m) => m
            .get(&index.to_string())
            .cloned()
            .unwrap_or_else(Value::empty_string),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            resolve(chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .unwrap_or_else(Value::empty_string)
        }
        Value::Point3(p) => resolve(3)
            .map(|i| Value::Float(p[i]))
            .unwrap_or_else(Value::empty_string),
        Value::Point4(p) => resolve(4)
            .map(|i| Value::Float(p[i]))
            .unwrap_or_else(Value::empty_string),
        Value::Matrix3(m) => resolve(3)
            .map(|r| Value::Point3(m.row(r).transpose()))
            .unwrap_or_else(Value::empty_string),
        Value::Matrix4(m) => resolve(4)
            .map(|r| Value::Point4(m.row(r).transpose()))
            .unwrap_or_else(Value::empty_string),
        Value::Set(s) => {
            match resolve(s.len()).and_then(|i| s.indices().nth(i)) {
                Some(member) => Value::Set(ItemSet::single(member, s.domain)),
                None => Value::Set(ItemSet::empty(s.domain)),
            }
        }
        _ => Value::empty_string(),
    }
}

/// Longest array an index assignment may grow
pub const MAX_ARRAY_LENGTH: usize = 1 << 20;

/// Assign `container[index] = value`, growing arrays with empty strings
pub fn set_index(container: &mut Value, index: &Value, value: Value) -> Result<(), ScriptError> {
    match container {
        Value::Array(a) => {
            let i = index.as_int();
            let pos = if i >= 1 {
                (i - 1) as usize
            } else {
                let back = a.len() as i64 - 1 + i as i64;
                if back < 0 {
                    return Err(ScriptError::new(
                        crate::interpreter::errors::BAD_ARGUMENT,
                        format!("index {} out of range", i),
                    ));
                }
                back as usize
            };
            if pos >= MAX_ARRAY_LENGTH {
                return Err(ScriptError::new(
                    crate::interpreter::errors::BAD_ARGUMENT,
                    format!("index {} exceeds the array limit of {}", i, MAX_ARRAY_LENGTH),
                ));
            }
            if pos >= a.len() {
                a.resize(pos + 1, Value::empty_string());
            }
            a[pos] = value;
            Ok(())
        }
        Value::Map(m) => {
            m.insert(index.to_string(), value);
            Ok(())
        }
        Value::Point3(p) => {
            let i = index.as_int();
            if !(1..=3).contains(&i) {
                return Err(ScriptError::new(
                    crate::interpreter::errors::BAD_ARGUMENT,
                    format!("index {} out of range", i),
                ));
            }
            p[(i - 1) as usize] = value.as_float();
            Ok(())
        }
        other => Err(ScriptError::type_error(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_value_is_one_based() {
        let a = Value::Array(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        assert_eq!(index_value(&a, &Value::Int(1)), Value::Int(10));
        assert_eq!(index_value(&a, &Value::Int(0)), Value::Int(30));
        assert_eq!(index_value(&a, &Value::Int(-1)), Value::Int(20));
        assert_eq!(index_value(&a, &Value::Int(4)), Value::empty_string());
        assert_eq!(index_value(&Value::from("abc"), &Value::Int(2)), Value::from("b"));
    }

    #[test]
    fn test_set_index_grows_arrays() {
        let mut a = Value::Array(vec![]);
        set_index(&mut a, &Value::Int(3), Value::Int(7)).unwrap();
        assert_eq!(
            a,
            Value::Array(vec![Value::empty_string(), Value::empty_string(), Value::Int(7)])
        );
        let mut m = Value::Map(Default::default());
        set_index(&mut m, &Value::from("k"), Value::Bool(true)).unwrap();
        assert_eq!(index_value(&m, &Value::from("k")), Value::Bool(true));
    }

    #[test]
    fn test_set_index_growth_is_capped() {
        let mut a = Value::Array(vec![Value::Int(1)]);
        let err = set_index(&mut a, &Value::Int(2_000_000_000), Value::Int(1)).unwrap_err();
        assert_eq!(err.code, crate::interpreter::errors::BAD_ARGUMENT);
        assert_eq!(a, Value::Array(vec![Value::Int(1)]));

        let last = MAX_ARRAY_LENGTH as i32;
        set_index(&mut a, &Value::Int(last), Value::Int(2)).unwrap();
        assert_eq!(a.size(), last);
    }
}
