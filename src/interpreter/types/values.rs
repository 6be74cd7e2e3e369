//! Runtime value types
//!
//! Every expression, variable, and store property resolves to a [`Value`]. Coercions
//! between tags never fail: the `as_*` accessors fall back to `false`, `0`, NaN, or
//! the formatted text, so operators can coerce opportunistically.

use crate::interpreter::rpn::format::float_to_string;
use indexmap::IndexMap;
use nalgebra as na;
use roaring::RoaringBitmap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/* ===================== Sets ===================== */

/// Which item domain a set indexes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Atoms,
    Bonds,
}

/// Store index as a bitmap id; indices past `u32::MAX` saturate
pub fn item_id(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// A set of atom or bond indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSet {
    #[serde(with = "id_list")]
    pub bits: RoaringBitmap,
    pub domain: Domain,
}

impl ItemSet {
    pub fn new(bits: RoaringBitmap, domain: Domain) -> Self {
        Self { bits, domain }
    }

    pub fn atoms(bits: RoaringBitmap) -> Self {
        Self::new(bits, Domain::Atoms)
    }

    pub fn bonds(bits: RoaringBitmap) -> Self {
        Self::new(bits, Domain::Bonds)
    }

    pub fn empty(domain: Domain) -> Self {
        Self::new(RoaringBitmap::new(), domain)
    }

    /// Every index in `0..len`
    pub fn full(len: usize, domain: Domain) -> Self {
        Self::new(full_range(len), domain)
    }

    pub fn single(index: usize, domain: Domain) -> Self {
        let mut bits = RoaringBitmap::new();
        bits.insert(item_id(index));
        Self::new(bits, domain)
    }

    pub fn len(&self) -> usize {
        self.bits.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.bits.contains(item_id(index))
    }

    /// Member indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().map(|id| id as usize)
    }

    /// Members of `0..len` not in this set
    pub fn complement(&self, len: usize) -> RoaringBitmap {
        full_range(len) - &self.bits
    }
}

/// Bitmap holding `0..len`
pub fn full_range(len: usize) -> RoaringBitmap {
    let mut bits = RoaringBitmap::new();
    bits.insert_range(0..item_id(len));
    bits
}

/// Sets travel as plain id lists inside suspensions
mod id_list {
    use super::*;

    pub fn serialize<S: Serializer>(bits: &RoaringBitmap, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(bits.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<RoaringBitmap, D::Error> {
        Vec::<u32>::deserialize(d).map(|ids| ids.into_iter().collect())
    }
}

/// Renders runs compactly: `(0:3 7 9:10)` for atoms, `[..]` for bonds
impl fmt::Display for ItemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = match self.domain {
            Domain::Atoms => ("({", "})"),
            Domain::Bonds => ("[{", "}]"),
        };
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for id in self.bits.iter() {
            match runs.last_mut() {
                Some((_, end)) if *end + 1 == id => *end = id,
                _ => runs.push((id, id)),
            }
        }
        let body: Vec<String> = runs
            .into_iter()
            .map(|(a, b)| if a == b { a.to_string() } else { format!("{}:{}", a, b) })
            .collect();
        write!(f, "{}{}{}", open, body.join(" "), close)
    }
}

/* ===================== Values ===================== */

/// Runtime value type
///
/// `Point4` doubles as a quaternion, stored `(x, y, z, w)` with `w` the scalar part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(String),
    Point3(na::Vector3<f64>),
    Point4(na::Vector4<f64>),
    Matrix3(na::Matrix3<f64>),
    Matrix4(na::Matrix4<f64>),
    Set(ItemSet),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// Tag of a [`Value`], used for operator dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Bool,
    Int,
    Float,
    Str,
    Point3,
    Point4,
    Matrix3,
    Matrix4,
    Set,
    Array,
    Map,
}

impl Value {
    pub fn empty_string() -> Value {
        Value::Str(String::new())
    }

    pub fn tag(&self) -> Tag {
        match self {
            Value::Bool(_) => Tag::Bool,
            Value::Int(_) => Tag::Int,
            Value::Float(_) => Tag::Float,
            Value::Str(_) => Tag::Str,
            Value::Point3(_) => Tag::Point3,
            Value::Point4(_) => Tag::Point4,
            Value::Matrix3(_) => Tag::Matrix3,
            Value::Matrix4(_) => Tag::Matrix4,
            Value::Set(_) => Tag::Set,
            Value::Array(_) => Tag::Array,
            Value::Map(_) => Tag::Map,
        }
    }

    /// Name reported by the `.type` property
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "decimal",
            Value::Str(_) => "string",
            Value::Point3(_) => "point",
            Value::Point4(_) => "point4",
            Value::Matrix3(_) => "matrix3f",
            Value::Matrix4(_) => "matrix4f",
            Value::Set(s) if s.domain == Domain::Bonds => "bondset",
            Value::Set(_) => "bitset",
            Value::Array(_) => "array",
            Value::Map(_) => "hash",
        }
    }

    /// Bool, Int or Float
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !(s.is_empty() || s.eq_ignore_ascii_case("false")),
            Value::Point3(p) => p.norm() != 0.0,
            Value::Point4(p) => p.norm() != 0.0,
            Value::Matrix3(_) | Value::Matrix4(_) => true,
            Value::Set(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Str(s) => parse_number(s).map(|v| v.as_float()).unwrap_or(f64::NAN),
            Value::Point3(p) => p.norm(),
            Value::Point4(p) => p.norm(),
            Value::Matrix3(m) => m.determinant(),
            Value::Matrix4(m) => m.determinant(),
            Value::Set(s) => s.len() as f64,
            Value::Array(a) => a.len() as f64,
            Value::Map(m) => m.len() as f64,
        }
    }

    pub fn as_int(&self) -> i32 {
        match self {
            Value::Bool(b) => *b as i32,
            Value::Int(i) => *i,
            Value::Float(f) => float_to_int(*f),
            Value::Str(s) => match parse_number(s) {
                Some(Value::Int(i)) => i,
                Some(v) => float_to_int(v.as_float()),
                None => 0,
            },
            Value::Set(s) => s.len() as i32,
            Value::Array(a) => a.len() as i32,
            Value::Map(m) => m.len() as i32,
            other => float_to_int(other.as_float()),
        }
    }

    pub fn as_set(&self) -> Option<&ItemSet> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view used by arithmetic: strings that parse become numbers
    pub fn to_numeric(&self) -> Value {
        match self {
            Value::Bool(b) => Value::Int(*b as i32),
            Value::Int(_) | Value::Float(_) => self.clone(),
            Value::Str(s) => parse_number(s).unwrap_or(Value::Float(f64::NAN)),
            other => Value::Float(other.as_float()),
        }
    }

    /// Number of elements (`.size`)
    pub fn size(&self) -> i32 {
        match self {
            Value::Str(s) => s.chars().count() as i32,
            Value::Point3(_) => 3,
            Value::Point4(_) => 4,
            Value::Matrix3(_) => 9,
            Value::Matrix4(_) => 16,
            Value::Set(s) => s.len() as i32,
            Value::Array(a) => a.len() as i32,
            Value::Map(m) => m.len() as i32,
            _ => 1,
        }
    }
}

fn float_to_int(f: f64) -> i32 {
    if f.is_nan() {
        0
    } else {
        f as i32
    }
}

/// Parse a numeric literal the way script text is read: integers first, then decimals
pub fn parse_number(s: &str) -> Option<Value> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(i) = t.parse::<i32>() {
        return Some(Value::Int(i));
    }
    t.parse::<f64>().ok().map(Value::Float)
}

/* ===================== Comparison ===================== */

/// Compare two values with the script's coercion order
///
/// * numeric with numeric: numerically (Int with Int stays integral)
/// * string with string: lexically, case-sensitive
/// * string with number: numerically if the string parses, else lexically against
///   the number's text
/// * set with set: equal only within one domain, otherwise ordered by cardinality
/// * anything else with a number: the other side's `as_float`
///
/// `None` means unordered (NaN or structurally incomparable values).
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    use Value::*;
    match (a, b) {
        (Int(x), Int(y)) => Some(x.cmp(y)),
        (Str(x), Str(y)) => Some(x.cmp(y)),
        (Str(s), n) if n.is_numeric() => match parse_number(s) {
            Some(v) => v.as_float().partial_cmp(&n.as_float()),
            None => Some(s.as_str().cmp(n.to_string().as_str())),
        },
        (n, Str(s)) if n.is_numeric() => compare(&Str(s.clone()), n).map(Ordering::reverse),
        (Set(x), Set(y)) => {
            if x.domain == y.domain && x.bits == y.bits {
                Some(Ordering::Equal)
            } else {
                match x.len().cmp(&y.len()) {
                    Ordering::Equal => None,
                    o => Some(o),
                }
            }
        }
        (Point3(x), Point3(y)) => order_points(x == y, x.norm(), y.norm()),
        (Point4(x), Point4(y)) => order_points(x == y, x.norm(), y.norm()),
        (Matrix3(x), Matrix3(y)) => (x == y).then_some(Ordering::Equal),
        (Matrix4(x), Matrix4(y)) => (x == y).then_some(Ordering::Equal),
        (Array(x), Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                match compare(l, r)? {
                    Ordering::Equal => continue,
                    o => return Some(o),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        (Map(x), Map(y)) => {
            let same = x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false));
            same.then_some(Ordering::Equal)
        }
        // strings against structured values compare by text
        (Str(s), other) => Some(s.as_str().cmp(other.to_string().as_str())),
        (other, Str(s)) => Some(other.to_string().as_str().cmp(s.as_str())),
        _ => a.as_float().partial_cmp(&b.as_float()),
    }
}

// distinct points of equal length are unordered, never equal
fn order_points(same: bool, a: f64, b: f64) -> Option<Ordering> {
    if same {
        return Some(Ordering::Equal);
    }
    match a.partial_cmp(&b)? {
        Ordering::Equal => None,
        o => Some(o),
    }
}

/// Script equality (`==`), shared by math and selection comparisons
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

/* ===================== Display ===================== */

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", float_to_string(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Point3(p) => write!(
                f,
                "{{{} {} {}}}",
                float_to_string(p.x),
                float_to_string(p.y),
                float_to_string(p.z)
            ),
            Value::Point4(p) => write!(
                f,
                "{{{} {} {} {}}}",
                float_to_string(p.x),
                float_to_string(p.y),
                float_to_string(p.z),
                float_to_string(p.w)
            ),
            Value::Matrix3(m) => write_matrix(f, m.nrows(), m.ncols(), |r, c| m[(r, c)]),
            Value::Matrix4(m) => write_matrix(f, m.nrows(), m.ncols(), |r, c| m[(r, c)]),
            Value::Set(s) => write!(f, "{}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_nested(f, item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": ", k)?;
                    write_nested(f, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_nested(f: &mut fmt::Formatter<'_>, v: &Value) -> fmt::Result {
    match v {
        Value::Str(s) => write!(f, "\"{}\"", s),
        other => write!(f, "{}", other),
    }
}

fn write_matrix(
    f: &mut fmt::Formatter<'_>,
    rows: usize,
    cols: usize,
    at: impl Fn(usize, usize) -> f64,
) -> fmt::Result {
    write!(f, "[")?;
    for r in 0..rows {
        if r > 0 {
            write!(f, " ")?;
        }
        write!(f, "[")?;
        for c in 0..cols {
            if c > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", float_to_string(at(r, c)))?;
        }
        write!(f, "]")?;
    }
    write!(f, "]")
}

/* ===================== Conversions ===================== */

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ItemSet> for Value {
    fn from(s: ItemSet) -> Self {
        Value::Set(s)
    }
}

impl From<na::Vector3<f64>> for Value {
    fn from(p: na::Vector3<f64>) -> Self {
        Value::Point3(p)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coercions_never_fail() {
        assert!(!Value::from("").as_bool());
        assert!(!Value::from("false").as_bool());
        assert!(Value::from("no").as_bool());
        assert!(Value::from("abc").as_float().is_nan());
        assert_eq!(Value::from("12").as_int(), 12);
        assert_eq!(Value::from("2.9").as_int(), 2);
        assert_eq!(Value::Float(f64::NAN).as_int(), 0);
        let set = ItemSet::atoms([1, 4, 9].into_iter().collect());
        assert_eq!(Value::Set(set).as_int(), 3);
        assert_eq!(Value::Point3(na::Vector3::new(3.0, 4.0, 0.0)).as_float(), 5.0);
    }

    #[test]
    fn test_compare_mixed_tags() {
        assert!(values_equal(&Value::Int(5), &Value::Float(5.0)));
        assert!(values_equal(&Value::from("5"), &Value::Int(5)));
        assert!(values_equal(&Value::Int(5), &Value::from("5.0")));
        assert_eq!(
            compare(&Value::from("10"), &Value::Int(9)),
            Some(Ordering::Greater)
        );
        // non-numeric text falls back to lexical order
        assert_eq!(
            compare(&Value::from("abc"), &Value::Int(9)),
            Some(Ordering::Greater)
        );
        assert!(!values_equal(&Value::from("C"), &Value::from("c")));
        assert_eq!(compare(&Value::Float(f64::NAN), &Value::Int(1)), None);
    }

    #[test]
    fn test_set_equality_respects_domain() {
        let bits: RoaringBitmap = [0, 1].into_iter().collect();
        let a = Value::Set(ItemSet::atoms(bits.clone()));
        let b = Value::Set(ItemSet::bonds(bits));
        assert!(!values_equal(&a, &b));
        assert!(values_equal(&a, &a.clone()));
    }

    #[test]
    fn test_set_serializes_as_id_list() {
        let set = ItemSet::full(3, Domain::Bonds);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"bits":[0,1,2],"domain":"Bonds"}"#);
        let back: ItemSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert_eq!(set.complement(5).iter().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(
            Value::Point3(na::Vector3::new(1.0, 2.5, 0.0)).to_string(),
            "{1.0 2.5 0.0}"
        );
        let set = ItemSet::atoms([0, 1, 2, 5].into_iter().collect());
        assert_eq!(Value::Set(set).to_string(), "({0:2 5})");
        let arr = Value::Array(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(arr.to_string(), "[1, \"a\"]");
    }
}
