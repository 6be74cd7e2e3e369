//! Built-in math functions
//!
//! Trigonometry works in degrees. Spatial functions accept points or atom sets;
//! a set stands for the centroid of its atoms.

use super::format::format_template;
use super::MathContext;
use crate::interpreter::errors::{
    fail, ScriptError, ScriptResult, BAD_ARGUMENT, USER_ERROR,
};
use crate::interpreter::host::DataStore;
use crate::interpreter::types::{compare, Domain, ItemProperty, ItemSet, Value};
use nalgebra as na;
use std::cmp::Ordering;

/// Call a built-in; `None` if no built-in has this name
pub fn call_builtin(
    name: &str,
    args: &[Value],
    ctx: &mut dyn MathContext,
) -> Option<ScriptResult<Value>> {
    let result = match name.to_ascii_lowercase().as_str() {
        "abs" => unary(args, |v| match v {
            Value::Int(i) => Value::Int(i.wrapping_abs()),
            other => Value::Float(other.as_float().abs()),
        }),
        "sqrt" => float_fn(args, f64::sqrt),
        "sin" => float_fn(args, |x| x.to_radians().sin()),
        "cos" => float_fn(args, |x| x.to_radians().cos()),
        "tan" => float_fn(args, |x| x.to_radians().tan()),
        "asin" => float_fn(args, |x| x.asin().to_degrees()),
        "acos" => float_fn(args, |x| x.acos().to_degrees()),
        "atan" => float_fn(args, |x| x.atan().to_degrees()),
        "floor" => unary(args, |v| Value::Int(v.as_float().floor() as i32)),
        "ceil" => unary(args, |v| Value::Int(v.as_float().ceil() as i32)),
        "round" => unary(args, |v| Value::Int(v.as_float().round() as i32)),
        "min" => Ok(extreme(args, Ordering::Less)),
        "max" => Ok(extreme(args, Ordering::Greater)),
        "point" => point(args),
        "quaternion" => quaternion(args),
        "matrix" => matrix(args),
        "array" => Ok(Value::Array(args.to_vec())),
        "format" => match args.split_first() {
            Some((template, rest)) => Ok(Value::Str(format_template(&template.to_string(), rest))),
            None => Err(arity("format", 1)),
        },
        "count" => unary(args, |v| Value::Int(v.size())),
        "distance" => distance(args, ctx.store()),
        "angle" => angle(args, ctx.store()),
        "within" => within(args, ctx.store()),
        "connected" => atom_set_arg("connected", args, 0).map(|set| {
            Value::Set(ItemSet::atoms(ctx.store().connected(&set.bits)))
        }),
        "bonds" => atom_set_arg("bonds", args, 0)
            .map(|set| Value::Set(ItemSet::bonds(ctx.store().bonds_of(&set.bits)))),
        "error" => {
            let message = args.first().map(|v| v.to_string()).unwrap_or_default();
            return Some(fail(USER_ERROR, message));
        }
        _ => return None,
    };
    Some(result.map_err(Into::into))
}

fn arity(name: &str, n: usize) -> ScriptError {
    ScriptError::new(
        BAD_ARGUMENT,
        format!("{}() needs at least {} argument(s)", name, n),
    )
}

fn unary(args: &[Value], f: impl Fn(&Value) -> Value) -> Result<Value, ScriptError> {
    args.first().map(f).ok_or_else(|| arity("function", 1))
}

fn float_fn(args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value, ScriptError> {
    unary(args, |v| Value::Float(f(v.as_float())))
}

fn extreme(args: &[Value], want: Ordering) -> Value {
    let items: &[Value] = match args {
        [Value::Array(a)] => a,
        _ => args,
    };
    let mut best: Option<&Value> = None;
    for item in items {
        best = match best {
            Some(b) if compare(item, b) != Some(want) => Some(b),
            _ => Some(item),
        };
    }
    best.cloned().unwrap_or(Value::Float(f64::NAN))
}

fn point(args: &[Value]) -> Result<Value, ScriptError> {
    let f: Vec<f64> = args.iter().map(|v| v.as_float()).collect();
    match f.as_slice() {
        [x, y, z] => Ok(Value::Point3(na::Vector3::new(*x, *y, *z))),
        [x, y, z, w] => Ok(Value::Point4(na::Vector4::new(*x, *y, *z, *w))),
        _ => Err(ScriptError::new(
            BAD_ARGUMENT,
            "point() takes 3 or 4 numbers",
        )),
    }
}

/// `quaternion(axis, degrees)` or `quaternion(x, y, z, w)`
fn quaternion(args: &[Value]) -> Result<Value, ScriptError> {
    match args {
        [Value::Point3(axis), angle] => {
            let unit = na::Unit::try_new(*axis, 1e-12)
                .ok_or_else(|| ScriptError::new(BAD_ARGUMENT, "quaternion axis is zero"))?;
            let q = na::UnitQuaternion::from_axis_angle(&unit, angle.as_float().to_radians());
            Ok(Value::Point4(q.into_inner().coords))
        }
        [_, _, _, _] => point(args),
        _ => Err(ScriptError::new(
            BAD_ARGUMENT,
            "quaternion() takes an axis and an angle, or 4 numbers",
        )),
    }
}

/// `matrix(quaternion)`, or 9 / 16 numbers in row-major order
fn matrix(args: &[Value]) -> Result<Value, ScriptError> {
    let flat: Vec<f64> = match args {
        [Value::Point4(q)] => {
            let r = na::UnitQuaternion::from_quaternion(na::Quaternion::from(*q));
            return Ok(Value::Matrix3(r.to_rotation_matrix().into_inner()));
        }
        [Value::Array(items)] => items.iter().map(|v| v.as_float()).collect(),
        _ => args.iter().map(|v| v.as_float()).collect(),
    };
    match flat.len() {
        9 => Ok(Value::Matrix3(na::Matrix3::from_row_slice(&flat))),
        16 => Ok(Value::Matrix4(na::Matrix4::from_row_slice(&flat))),
        n => Err(ScriptError::new(
            BAD_ARGUMENT,
            format!("matrix() needs 9 or 16 numbers, got {}", n),
        )),
    }
}

/* ===================== Spatial ===================== */

/// Centroid of an atom set from the store's coordinates
pub fn centroid(set: &ItemSet, store: &dyn DataStore) -> Result<na::Vector3<f64>, ScriptError> {
    if set.domain != Domain::Atoms {
        return Err(ScriptError::domain_mismatch());
    }
    if set.is_empty() {
        return Err(ScriptError::new(BAD_ARGUMENT, "empty atom set has no position"));
    }
    let mut sum = na::Vector3::zeros();
    for i in set.indices() {
        let coord = |p: ItemProperty| {
            store
                .property(Domain::Atoms, &p, i)
                .map(|v| v.as_float())
                .unwrap_or(f64::NAN)
        };
        sum += na::Vector3::new(
            coord(ItemProperty::X),
            coord(ItemProperty::Y),
            coord(ItemProperty::Z),
        );
    }
    Ok(sum / set.len() as f64)
}

fn position(v: &Value, store: &dyn DataStore) -> Result<na::Vector3<f64>, ScriptError> {
    match v {
        Value::Point3(p) => Ok(*p),
        Value::Set(s) => centroid(s, store),
        other => Err(ScriptError::type_error(format!(
            "expected a point or atom set, got {}",
            other.type_name()
        ))),
    }
}

fn distance(args: &[Value], store: &dyn DataStore) -> Result<Value, ScriptError> {
    match args {
        [a, b] => Ok(Value::Float(
            (position(a, store)? - position(b, store)?).norm(),
        )),
        _ => Err(arity("distance", 2)),
    }
}

fn angle(args: &[Value], store: &dyn DataStore) -> Result<Value, ScriptError> {
    match args {
        [a, b, c] => {
            let (a, b, c) = (position(a, store)?, position(b, store)?, position(c, store)?);
            Ok(Value::Float((a - b).angle(&(c - b)).to_degrees()))
        }
        _ => Err(arity("angle", 3)),
    }
}

fn atom_set_arg<'v>(name: &str, args: &'v [Value], i: usize) -> Result<&'v ItemSet, ScriptError> {
    match args.get(i) {
        Some(Value::Set(s)) if s.domain == Domain::Atoms => Ok(s),
        Some(Value::Set(_)) => Err(ScriptError::domain_mismatch()),
        Some(other) => Err(ScriptError::type_error(format!(
            "{}() expects an atom set, got {}",
            name,
            other.type_name()
        ))),
        None => Err(arity(name, i + 1)),
    }
}

fn within(args: &[Value], store: &dyn DataStore) -> Result<Value, ScriptError> {
    let distance = args.first().ok_or_else(|| arity("within", 2))?.as_float();
    let set = atom_set_arg("within", args, 1)?;
    Ok(Value::Set(ItemSet::atoms(store.within(distance, &set.bits))))
}
