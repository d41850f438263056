//! Naming conventions that tell filter parameters apart from the rest of the
//! query string.
//!
//! * `V1`: `f_<path>=<value>` with an optional companion `f_<path>_op=<op>`.
//! * `V2`: `<path>_<op>=<value>`; only the text around the first `_` counts.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::filter::{FilterExpression, Operator};

/// Raw query-string parameters, name to value.
pub type QueryParams = BTreeMap<String, String>;

pub const V1_PREFIX: &str = "f_";
pub const V1_OPERATOR_SUFFIX: &str = "_op";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlMapper {
    #[default]
    V1,
    V2,
}

impl UrlMapper {
    fn is_filter(&self, name: &str) -> bool {
        match self {
            UrlMapper::V1 => name.starts_with(V1_PREFIX) && !name.ends_with(V1_OPERATOR_SUFFIX),
            UrlMapper::V2 => name.contains('_'),
        }
    }

    /// Selects the parameters that are filters, keeping their raw values.
    /// Blank values never count as filters.
    pub fn params_to_filter<'a>(&self, params: &'a QueryParams) -> Vec<(&'a str, &'a str)> {
        params
            .iter()
            .filter(|(name, value)| self.is_filter(name) && !value.trim().is_empty())
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    /// Splits a filter parameter name into `(field path, operator name)`.
    pub fn extract<'a>(&self, name: &'a str, params: &'a QueryParams) -> (&'a str, &'a str) {
        match self {
            UrlMapper::V1 => {
                let operator = params
                    .get(&format!("{name}{V1_OPERATOR_SUFFIX}"))
                    .map(String::as_str)
                    .unwrap_or(Operator::Eq.as_str());
                let field = name.strip_prefix(V1_PREFIX).unwrap_or(name);
                (field, operator)
            }
            UrlMapper::V2 => {
                let mut parts = name.split('_');
                let field = parts.next().unwrap_or_default();
                let operator = parts.next().unwrap_or_default();
                (field, operator)
            }
        }
    }

    pub fn decompose(&self, params: &QueryParams) -> Vec<FilterExpression> {
        self.params_to_filter(params)
            .into_iter()
            .map(|(name, value)| {
                let (field, operator) = self.extract(name, params);
                FilterExpression::new(field, Operator::parse(operator), value)
            })
            .collect()
    }
}

impl fmt::Display for UrlMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlMapper::V1 => f.write_str("v1"),
            UrlMapper::V2 => f.write_str("v2"),
        }
    }
}

impl FromStr for UrlMapper {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(UrlMapper::V1),
            "v2" => Ok(UrlMapper::V2),
            other => Err(format!("unknown url mapper `{other}` (expected v1 or v2)")),
        }
    }
}
