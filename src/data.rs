use std::fmt;

use serde::{Deserialize, Serialize};

/// One cell of a warehouse read or an edited grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// Null or text made only of whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => match integral(*f) {
                Some(i) => i.to_string(),
                None => f.to_string(),
            },
            Value::Text(s) => s.clone(),
        }
    }

    /// Interprets the cell as an integer, accepting integral floats and
    /// numeric text. Anything else yields `None`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => integral(*f),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

/// Whole floats inside the `i64` range. Larger magnitudes would saturate.
fn integral(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

/// Canonical comparable form of a cell: its text rendering, trimmed.
///
/// Both sides of a grid diff pass through this before comparison, so a number
/// typed back as text or a trailing space left by an editor does not count as
/// an edit. Formatting differences that survive stringification (for example
/// `5.10` against `5.1` typed as text) do count.
pub fn canonical_cell(value: &Value) -> String {
    value.as_display().trim().to_string()
}

/// Parses the warehouse's yes/no convention (and boolean text) into a flag.
/// Unrecognized input is `None`.
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Integer(i) => Some(*i != 0),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "t" | "1" => Some(true),
            "no" | "n" | "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
