use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison requested for one filter parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Eq,
    Like,
    In,
    Between,
}

impl Operator {
    /// Unknown or empty operator names fall back to equality.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "like" => Operator::Like,
            "in" => Operator::In,
            "between" => Operator::Between,
            _ => Operator::Eq,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::Between => "between",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A literal coerced to the native type of the field it is compared with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Long(i64),
    Boolean(bool),
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Long(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "'{v}'"),
        }
    }
}

/// One `(field path, operator, raw value)` triple taken from the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterExpression {
    pub field_path: Vec<String>,
    pub operator: Operator,
    pub raw_value: String,
}

impl FilterExpression {
    pub fn new(field: &str, operator: Operator, raw_value: impl Into<String>) -> Self {
        Self {
            field_path: field.split('.').map(str::to_string).collect(),
            operator,
            raw_value: raw_value.into(),
        }
    }

    /// Dotted form of the path, as written in the request.
    pub fn field(&self) -> String {
        self.field_path.join(".")
    }

    /// Comma-separated pieces of the raw value, in request order.
    pub fn pieces(&self) -> impl Iterator<Item = &str> {
        self.raw_value.split(',')
    }
}
