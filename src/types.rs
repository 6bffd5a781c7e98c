use std::fmt::Display;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TupleValueType {
    BigInt = 0,
    VarChar(u16) = 1,
    Int = 2,
    SmallInt = 3
}

impl TupleValueType {
    /// Byte width of the type. Variable width types return None,
    /// callers fall back to an average measured from data.
    pub fn get_size(&self) -> Option<usize> {
        match self {
            TupleValueType::BigInt => Some(8),
            TupleValueType::VarChar(_) => None,
            TupleValueType::Int => Some(4),
            TupleValueType::SmallInt => Some(2)
        }
    }
}

#[derive(Debug, Clone)]
pub enum TupleValue {
    BigInt(i64),
    Int(i32),
    SmallInt(i16),
    String(String),
}

impl TupleValue {
    pub fn as_big_int(&self) -> i64 {
        match self {
            TupleValue::BigInt(value) => *value,
            _ => unreachable!(),
        }
    }

    pub fn as_int(&self) -> i32 {
        match self {
            TupleValue::Int(value) => *value,
            _ => unreachable!(),
        }
    }

    pub fn as_small_int(&self) -> i16 {
        match self {
            TupleValue::SmallInt(value) => *value,
            _ => unreachable!(),
        }
    }

    pub fn as_varchar(&self) -> &str {
        match self {
            TupleValue::String(value) => value,
            _ => unreachable!(),
        }
    }

    fn widened(&self) -> i64 {
        match self {
            TupleValue::BigInt(v) => *v,
            TupleValue::Int(v) => *v as i64,
            TupleValue::SmallInt(v) => *v as i64,
            TupleValue::String(_) => unreachable!(),
        }
    }

    /// Numeric view used by the statistics estimators for range interpolation.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TupleValue::BigInt(v) => Some(*v as f64),
            TupleValue::Int(v) => Some(*v as f64),
            TupleValue::SmallInt(v) => Some(*v as f64),
            TupleValue::String(_) => None,
        }
    }

    /// Actual payload size in bytes, used to average variable width columns.
    pub fn byte_size(&self) -> usize {
        match self {
            TupleValue::BigInt(_) => 8,
            TupleValue::Int(_) => 4,
            TupleValue::SmallInt(_) => 2,
            TupleValue::String(s) => s.len(),
        }
    }

    /// Stable 64-bit hash fed into the distinct count sketch. Numeric types
    /// hash through their i64 widening so that e.g. Int(5) and BigInt(5)
    /// count as one distinct value, consistent with the comparison impls.
    pub fn hash_64(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match self {
            TupleValue::BigInt(v) => (*v).hash(&mut hasher),
            TupleValue::Int(v) => (*v as i64).hash(&mut hasher),
            TupleValue::SmallInt(v) => (*v as i64).hash(&mut hasher),
            TupleValue::String(s) => s.hash(&mut hasher),
        }
        hasher.finish()
    }
}

impl PartialEq for TupleValue {
    fn eq(&self, other: &Self) -> bool {
        // For numeric types also allow comparisons between different types (like bigint with smallint)
        match (self, other) {
            (TupleValue::BigInt(a), TupleValue::BigInt(b)) => a == b,
            (TupleValue::Int(a), TupleValue::Int(b)) => a == b,
            (TupleValue::SmallInt(a), TupleValue::SmallInt(b)) => a == b,
            (TupleValue::String(a), TupleValue::String(b)) => a == b,
            (TupleValue::BigInt(a), TupleValue::Int(b)) => *a == *b as i64,
            (TupleValue::BigInt(a), TupleValue::SmallInt(b)) => *a == *b as i64,
            (TupleValue::Int(a), TupleValue::BigInt(b)) => *a as i64 == *b,
            (TupleValue::Int(a), TupleValue::SmallInt(b)) => *a == *b as i32,
            (TupleValue::SmallInt(a), TupleValue::BigInt(b)) => *a as i64 == *b,
            (TupleValue::SmallInt(a), TupleValue::Int(b)) => *a as i32 == *b,
            _ => false
        }
    }
}

impl Eq for TupleValue {}

impl Ord for TupleValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Numerics compare through their i64 widening. A column only ever
        // holds one type class, but the order is total so values can key
        // ordered maps: numerics sort before strings.
        match (self, other) {
            (TupleValue::String(a), TupleValue::String(b)) => a.cmp(b),
            (TupleValue::String(_), _) => std::cmp::Ordering::Greater,
            (_, TupleValue::String(_)) => std::cmp::Ordering::Less,
            (a, b) => a.widened().cmp(&b.widened()),
        }
    }
}

impl PartialOrd for TupleValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for TupleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TupleValue::BigInt(i) => write!(f, "{}", i),
            TupleValue::Int(i) => write!(f, "{}", i),
            TupleValue::SmallInt(i) => write!(f, "{}", i),
            TupleValue::String(s) => write!(f, "\"{}\"", s.escape_debug()),
        }
    }
}

/// Scan predicate operators understood by plans, the statistics estimators
/// and the index tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    Between,
    Like,
    IsNull,
}

impl Display for PredicateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PredicateOp::Equals => "=",
            PredicateOp::NotEquals => "<>",
            PredicateOp::LessThan => "<",
            PredicateOp::LessThanOrEquals => "<=",
            PredicateOp::GreaterThan => ">",
            PredicateOp::GreaterThanOrEquals => ">=",
            PredicateOp::Between => "BETWEEN",
            PredicateOp::Like => "LIKE",
            PredicateOp::IsNull => "IS NULL",
        };
        write!(f, "{}", s)
    }
}
