//! Operator semantics
//!
//! Overloads are chosen from the operand tags alone. Where two combinations
//! could apply, the left operand's tag wins.

use crate::interpreter::errors::{ScriptError, DOMAIN_MISMATCH};
use crate::interpreter::rpn::format::{format_decimals, pad};
use crate::interpreter::types::{compare, values_equal, Domain, ItemSet, Op, Value};
use nalgebra as na;
use std::cmp::Ordering;

type OpResult = Result<Value, ScriptError>;

/// Apply a binary operator
pub fn binary(op: Op, a: &Value, b: &Value) -> OpResult {
    match op {
        Op::Plus => plus(a, b),
        Op::Minus => minus(a, b),
        Op::Times => times(a, b),
        Op::Divide => divide(a, b),
        Op::LeftDivide => left_divide(a, b),
        Op::Modulo => modulo(a, b),
        Op::Power => power(a, b),
        Op::And | Op::Or | Op::Xor => logical(op, a, b),
        Op::Eq => Ok(Value::Bool(values_equal(a, b))),
        Op::Ne => Ok(Value::Bool(!values_equal(a, b))),
        Op::Lt => Ok(Value::Bool(compare(a, b) == Some(Ordering::Less))),
        Op::Le => Ok(Value::Bool(matches!(
            compare(a, b),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        Op::Gt => Ok(Value::Bool(compare(a, b) == Some(Ordering::Greater))),
        Op::Ge => Ok(Value::Bool(matches!(
            compare(a, b),
            Some(Ordering::Greater | Ordering::Equal)
        ))),
        Op::Like => Ok(Value::Bool(wildcard_match(&b.to_string(), &a.to_string()))),
        Op::Not | Op::Question | Op::Colon | Op::Comma => Err(ScriptError::invalid_expression(
            format!("'{}' is not a binary operator", op.symbol()),
        )),
    }
}

/// Unary minus
pub fn negate(v: &Value) -> OpResult {
    match v {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Bool(b) => Ok(Value::Int(-(*b as i32))),
        Value::Str(_) => negate(&v.to_numeric()),
        Value::Point3(p) => Ok(Value::Point3(-p)),
        Value::Point4(p) => Ok(Value::Point4(-p)),
        Value::Matrix3(m) => Ok(Value::Matrix3(-m)),
        Value::Matrix4(m) => Ok(Value::Matrix4(-m)),
        other => Err(undefined("-", other, None)),
    }
}

/// `not`: complement for sets, logical negation otherwise
pub fn not(v: &Value, item_count: impl Fn(Domain) -> usize) -> Value {
    match v {
        Value::Set(s) => Value::Set(ItemSet::new(s.complement(item_count(s.domain)), s.domain)),
        other => Value::Bool(!other.as_bool()),
    }
}

/* ===================== Arithmetic ===================== */

fn plus(a: &Value, b: &Value) -> OpResult {
    use Value::*;
    Ok(match (a, b) {
        (Str(s), other) => Str(format!("{}{}", s, other)),
        (Array(x), Array(y)) => Array(x.iter().chain(y.iter()).cloned().collect()),
        (Array(x), v) => {
            let mut items = x.clone();
            items.push(v.clone());
            Array(items)
        }
        (Map(x), Map(y)) => {
            let mut merged = x.clone();
            for (k, v) in y {
                merged.insert(k.clone(), v.clone());
            }
            Map(merged)
        }
        (Set(_), Set(_)) => return set_op(Op::Or, a, b),
        (Point3(p), Point3(q)) => Point3(p + q),
        (Point3(p), n) if n.is_numeric() => Point3(p.add_scalar(n.as_float())),
        (Point4(p), Point4(q)) => Point4(p + q),
        (Point4(p), n) if n.is_numeric() => Point4(p.add_scalar(n.as_float())),
        (Matrix3(m), Matrix3(n)) => Matrix3(m + n),
        (Matrix4(m), Matrix4(n)) => Matrix4(m + n),
        _ => return arith("+", a, b, i32::wrapping_add, |x, y| x + y),
    })
}

fn minus(a: &Value, b: &Value) -> OpResult {
    use Value::*;
    Ok(match (a, b) {
        (Set(_), Set(_)) => {
            let (x, y) = same_domain(a, b)?;
            Set(ItemSet::new(&x.bits - &y.bits, x.domain))
        }
        (Map(m), key) if !matches!(key, Map(_)) => {
            let mut out = m.clone();
            out.shift_remove(&key.to_string());
            Map(out)
        }
        (Point3(p), Point3(q)) => Point3(p - q),
        (Point3(p), n) if n.is_numeric() => Point3(p.add_scalar(-n.as_float())),
        (Point4(p), Point4(q)) => Point4(p - q),
        (Matrix3(m), Matrix3(n)) => Matrix3(m - n),
        (Matrix4(m), Matrix4(n)) => Matrix4(m - n),
        _ => return arith("-", a, b, i32::wrapping_sub, |x, y| x - y),
    })
}

fn times(a: &Value, b: &Value) -> OpResult {
    use Value::*;
    Ok(match (a, b) {
        (Point3(p), Point3(q)) => Float(p.dot(q)),
        (Point3(p), n) if n.is_numeric() => Point3(p * n.as_float()),
        (Point4(p), Point4(q)) => Point4((quaternion(p) * quaternion(q)).coords),
        (Point4(q), Point3(p)) => Point3(unit(q).transform_vector(p)),
        (Point4(p), n) if n.is_numeric() => Point4(p * n.as_float()),
        (Matrix3(m), Point3(p)) => Point3(m * p),
        (Matrix3(m), Matrix3(n)) => Matrix3(m * n),
        (Matrix3(m), Point4(q)) => Matrix3(m * unit(q).to_rotation_matrix().into_inner()),
        (Matrix3(m), n) if n.is_numeric() => Matrix3(m * n.as_float()),
        (Matrix4(m), Point3(p)) => Point3(m.transform_point(&na::Point3::from(*p)).coords),
        (Matrix4(m), Point4(p)) => Point4(m * p),
        (Matrix4(m), Matrix4(n)) => Matrix4(m * n),
        (Matrix4(m), n) if n.is_numeric() => Matrix4(m * n.as_float()),
        (n, Point3(p)) if n.is_numeric() => Point3(p * n.as_float()),
        (n, Point4(p)) if n.is_numeric() => Point4(p * n.as_float()),
        _ => return arith("*", a, b, i32::wrapping_mul, |x, y| x * y),
    })
}

fn divide(a: &Value, b: &Value) -> OpResult {
    use Value::*;
    match (a, b) {
        (Point3(p), n) if n.is_numeric() => return Ok(Point3(p / n.as_float())),
        (Point4(p), n) if n.is_numeric() => return Ok(Point4(p / n.as_float())),
        (Matrix3(m), n) if n.is_numeric() => return Ok(Matrix3(m / n.as_float())),
        (Matrix4(m), n) if n.is_numeric() => return Ok(Matrix4(m / n.as_float())),
        _ => {}
    }
    let (x, y) = (numeric("/", a, b)?, numeric("/", b, a)?);
    Ok(match (x, y) {
        // integer division by zero promotes to IEEE float division
        (Int(x), Int(0)) => Float(x as f64 / 0.0),
        (Int(x), Int(y)) => Int(x.wrapping_div(y)),
        (x, y) => Float(x.as_float() / y.as_float()),
    })
}

fn left_divide(a: &Value, b: &Value) -> OpResult {
    use Value::*;
    let (x, y) = (numeric("\\", a, b)?, numeric("\\", b, a)?);
    Ok(match (x, y) {
        (Int(_), Int(0)) => Int(0),
        (Int(x), Int(y)) => Int(x.wrapping_div(y)),
        (x, y) => {
            let d = y.as_float();
            if d == 0.0 {
                Int(0)
            } else {
                Int(Float(x.as_float() / d).as_int())
            }
        }
    })
}

fn modulo(a: &Value, b: &Value) -> OpResult {
    use Value::*;
    match (a, b) {
        (Float(x), n) => return Ok(Str(format_decimals(*x, n.as_int()))),
        (Str(s), n) if n.is_numeric() && crate::interpreter::types::parse_number(s).is_none() => {
            return Ok(Str(pad(s, n.as_int())))
        }
        _ => {}
    }
    let (x, y) = (numeric("%", a, b)?, numeric("%", b, a)?);
    Ok(match (x, y) {
        (Int(_), Int(0)) => Int(0),
        (Int(x), Int(y)) => Int(x.wrapping_rem(y)),
        (Float(x), n) => Str(format_decimals(x, n.as_int())),
        (x, y) => Int(x.as_int().checked_rem(y.as_int()).unwrap_or(0)),
    })
}

fn power(a: &Value, b: &Value) -> OpResult {
    use Value::*;
    let (x, y) = (numeric("**", a, b)?, numeric("**", b, a)?);
    Ok(match (x, y) {
        (Int(x), Int(y)) if y >= 0 => Int(x.wrapping_pow(y as u32)),
        (x, y) => Float(x.as_float().powf(y.as_float())),
    })
}

fn arith(
    symbol: &str,
    a: &Value,
    b: &Value,
    int_op: fn(i32, i32) -> i32,
    float_op: fn(f64, f64) -> f64,
) -> OpResult {
    Ok(match (numeric(symbol, a, b)?, numeric(symbol, b, a)?) {
        (Value::Int(x), Value::Int(y)) => Value::Int(int_op(x, y)),
        (x, y) => Value::Float(float_op(x.as_float(), y.as_float())),
    })
}

/// Numeric view of `v` for arithmetic, or a type error naming both operands
fn numeric(symbol: &str, v: &Value, other: &Value) -> OpResult {
    match v {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => Ok(v.to_numeric()),
        Value::Set(s) => Ok(Value::Int(s.len() as i32)),
        _ => Err(undefined(symbol, v, Some(other))),
    }
}

fn undefined(symbol: &str, a: &Value, b: Option<&Value>) -> ScriptError {
    match b {
        Some(b) => ScriptError::type_error(format!(
            "operator '{}' is not defined for {} and {}",
            symbol,
            a.type_name(),
            b.type_name()
        )),
        None => ScriptError::type_error(format!(
            "operator '{}' is not defined for {}",
            symbol,
            a.type_name()
        )),
    }
}

/* ===================== Quaternions ===================== */

fn quaternion(v: &na::Vector4<f64>) -> na::Quaternion<f64> {
    na::Quaternion::from(*v)
}

fn unit(v: &na::Vector4<f64>) -> na::UnitQuaternion<f64> {
    na::UnitQuaternion::from_quaternion(quaternion(v))
}

/* ===================== Logic and Sets ===================== */

fn logical(op: Op, a: &Value, b: &Value) -> OpResult {
    if let (Value::Set(_), Value::Set(_)) = (a, b) {
        return set_op(op, a, b);
    }
    let (x, y) = (a.as_bool(), b.as_bool());
    Ok(Value::Bool(match op {
        Op::And => x && y,
        Op::Or => x || y,
        _ => x ^ y,
    }))
}

/// Set algebra within one domain
pub fn set_op(op: Op, a: &Value, b: &Value) -> OpResult {
    let (x, y) = same_domain(a, b)?;
    let bits = match op {
        Op::And => &x.bits & &y.bits,
        Op::Or => &x.bits | &y.bits,
        Op::Xor => &x.bits ^ &y.bits,
        _ => {
            return Err(ScriptError::invalid_expression(format!(
                "'{}' is not a set operator",
                op.symbol()
            )))
        }
    };
    Ok(Value::Set(ItemSet::new(bits, x.domain)))
}

fn same_domain<'v>(a: &'v Value, b: &'v Value) -> Result<(&'v ItemSet, &'v ItemSet), ScriptError> {
    match (a, b) {
        (Value::Set(x), Value::Set(y)) if x.domain == y.domain => Ok((x, y)),
        (Value::Set(_), Value::Set(_)) => Err(ScriptError::new(
            DOMAIN_MISMATCH,
            "cannot combine an atom set with a bond set",
        )),
        _ => Err(ScriptError::type_error("set operator needs two sets")),
    }
}

/* ===================== Wildcards ===================== */

/// Case-insensitive match with `*` (any run) and `?` (any one character)
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}
