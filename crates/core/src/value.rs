//! Value type definitions for Rivulet.
//!
//! This module defines the `Value` enum which represents any record, field or
//! key flowing through the engine. Records are `Value::Object`s; nested fields
//! are addressed with `get_path`.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

static NULL: Value = Value::Null;

/// A structured value.
///
/// `Value` has a total order (`Null` sorts lowest, integers and floats compare
/// numerically across variants) and `Eq`/`Hash` agree with that order, so
/// values can be used as keys of hash maps, ordered maps and multisets alike.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// Null (also used for missing fields)
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// DateTime stored as Unix timestamp in milliseconds
    DateTime(i64),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Record with named fields
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Builds an object value from `(field, value)` pairs.
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Int64, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Float64, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the numeric value of an Int64 or Float64 as f64.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the elements if this is an Array, None otherwise.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns the fields if this is an Object, None otherwise.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a field of an object, or Null if absent or not an object.
    pub fn get(&self, field: &str) -> &Value {
        match self {
            Value::Object(fields) => fields.get(field).unwrap_or(&NULL),
            _ => &NULL,
        }
    }

    /// Follows a field path through nested objects.
    ///
    /// An empty path returns the value itself. Any missing segment yields Null.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> &Value {
        path.iter().fold(self, |current, segment| current.get(segment.as_ref()))
    }

    /// Sets a field on an object value. Non-object values are replaced by an
    /// object holding only the new field.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        if let Value::Object(fields) = self {
            fields.insert(field.into(), value);
        } else {
            let mut fields = BTreeMap::new();
            fields.insert(field.into(), value);
            *self = Value::Object(fields);
        }
    }

    /// Returns a type ordering value for comparing different types.
    /// Integers and floats share a rank so they compare numerically.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int64(_) | Value::Float64(_) => 2,
            Value::String(_) => 3,
            Value::DateTime(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }
}

/// Returns the float as an i64 if it is integral and representable.
fn integral_f64(f: f64) -> Option<i64> {
    if f.is_finite() && libm::trunc(f) == f && f >= -9.223_372_036_854_776e18 && f < 9.223_372_036_854_776e18 {
        Some(f as i64)
    } else {
        None
    }
}

fn cmp_int_float(a: i64, b: f64) -> Ordering {
    if b.is_nan() {
        return Ordering::Less;
    }
    if b >= 9.223_372_036_854_776e18 {
        return Ordering::Less;
    }
    if b < -9.223_372_036_854_776e18 {
        return Ordering::Greater;
    }
    match integral_f64(b) {
        Some(b) => a.cmp(&b),
        // in range and fractional: no integer equals it
        None if a <= libm::floor(b) as i64 => Ordering::Less,
        None => Ordering::Greater,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Int64(a), Value::Float64(b)) => cmp_int_float(*a, *b),
            (Value::Float64(a), Value::Int64(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::Float64(a), Value::Float64(b)) => {
                // NaN sorts above every other number
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                }
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => match integral_f64(*f) {
                Some(i) => i.hash(state),
                None if f.is_nan() => u64::MAX.hash(state),
                None => f.to_bits().hash(state),
            },
            Value::String(s) => s.hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Object(fields) => {
                fields.len().hash(state);
                for (k, v) in fields {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::DateTime(ms) => write!(f, "@{}", ms),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Object(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn hash_of(v: &Value) -> u64 {
        use core::hash::{Hash, Hasher};
        let mut state = std::collections::hash_map::DefaultHasher::new();
        v.hash(&mut state);
        state.finish()
    }

    extern crate std;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(100).as_i64(), Some(100));
        assert_eq!(Value::Float64(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::Int64(4).as_number(), Some(4.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Array(vec![Value::Null]).as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_get_path() {
        let user = Value::object([
            ("id", Value::from(1i64)),
            ("address", Value::object([("city", Value::from("Oslo"))])),
        ]);
        assert_eq!(user.get_path(&["address", "city"]), &Value::from("Oslo"));
        assert!(user.get_path(&["address", "zip"]).is_null());
        assert!(user.get_path(&["id", "nested"]).is_null());
        let empty: [&str; 0] = [];
        assert_eq!(user.get_path(&empty), &user);
    }

    #[test]
    fn test_set_field() {
        let mut v = Value::Null;
        v.set("a", Value::from(1i64));
        v.set("b", Value::from(2i64));
        assert_eq!(v.get("a"), &Value::Int64(1));
        assert_eq!(v.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Null < Value::Boolean(false));
        assert!(Value::Int64(1) < Value::Int64(2));
        assert!(Value::Int64(1) < Value::Float64(1.5));
        assert!(Value::Float64(0.5) < Value::Int64(1));
        assert!(Value::Int64(1_000) < Value::String("a".into()));
        assert!(Value::String("a".into()) < Value::String("b".into()));
        assert!(Value::Float64(f64::NAN) > Value::Int64(i64::MAX));
    }

    #[test]
    fn test_numeric_equality_and_hash_agree() {
        let a = Value::Int64(3);
        let b = Value::Float64(3.0);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        assert_eq!(Value::Float64(0.0), Value::Float64(-0.0));
        assert_eq!(hash_of(&Value::Float64(0.0)), hash_of(&Value::Float64(-0.0)));

        assert_ne!(Value::Int64(3), Value::Float64(3.5));
        assert_ne!(Value::Int64(1), Value::from("1"));
    }

    #[test]
    fn test_int_float_comparison_at_i64_limits() {
        // 2^63 rounds up from i64::MAX but is outside the i64 range
        let two_63 = Value::Float64(9.223_372_036_854_776e18);
        assert!(Value::Int64(i64::MAX) < two_63);
        assert!(Value::Int64(i64::MAX - 1) < two_63);
        assert!(two_63 > Value::Int64(i64::MAX));
        assert!(Value::Int64(i64::MIN) > Value::Float64(-1.0e19));
        assert!(Value::Int64(i64::MAX) < Value::Float64(f64::INFINITY));
        assert!(Value::Int64(i64::MIN) > Value::Float64(f64::NEG_INFINITY));

        let min = Value::Float64(-9.223_372_036_854_776e18);
        assert_eq!(Value::Int64(i64::MIN), min);
        assert_eq!(hash_of(&Value::Int64(i64::MIN)), hash_of(&min));

        assert!(Value::Int64(-2) < Value::Float64(-1.5));
        assert!(Value::Int64(-1) > Value::Float64(-1.5));
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::object([("x", Value::from(1i64)), ("y", Value::from("z"))]);
        let b = Value::object([("y", Value::from("z")), ("x", Value::from(1i64))]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_value_from_impls() {
        let v: Value = 42i32.into();
        assert_eq!(v.as_i64(), Some(42));

        let v: Value = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let v: Value = Some(100i64).into();
        assert_eq!(v.as_i64(), Some(100));

        let v: Value = None::<i64>.into();
        assert!(v.is_null());
    }

    #[test]
    fn test_display() {
        let v = Value::object([
            ("a", Value::Array(vec![Value::from(1i64), Value::Null])),
            ("b", Value::from("x")),
        ]);
        assert_eq!(v.to_string(), "{a: [1, null], b: \"x\"}");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip() {
        let v = Value::object([("id", Value::from(1i64)), ("tags", Value::Array(vec!["a".into()]))]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
