use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A typed value flowing from command output to a published entity state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    /// Nothing was found (e.g. a regex without a match).
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl SensorValue {
    /// Name of the value's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Compare two values of compatible kinds.
    ///
    /// Ints and floats compare numerically with each other. Returns `None` when the
    /// kinds cannot be ordered against each other.
    pub fn partial_cmp_value(&self, other: &SensorValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::None, Self::None) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{}", i),
            // Keep a decimal point on whole floats so "1.0" never reads as an int
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SensorValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for SensorValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for SensorValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<String> for SensorValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for SensorValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}
