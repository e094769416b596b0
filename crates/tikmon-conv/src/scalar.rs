//! Lenient text fields for parameter definitions
//!
//! Labels and metrics flatten [`Param`](crate::Param) into their own
//! definitions, and a flattened field sees YAML scalars already typed: an
//! unquoted `default: 0` arrives as an integer and `true: 1` as a boolean
//! key. Every text field of a parameter accepts any scalar and keeps its
//! textual form.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

use crate::types::RegexRules;

/// String read from any YAML scalar
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScalarString(pub String);

impl From<ScalarString> for String {
    fn from(value: ScalarString) -> Self {
        value.0
    }
}

impl<'de> Deserialize<'de> for ScalarString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = ScalarString;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number or boolean")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(ScalarString(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(ScalarString(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(ScalarString(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(ScalarString(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(ScalarString(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(ScalarString(v.to_string()))
    }
}

/// `Option<String>` from an optional scalar
pub fn option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<ScalarString>::deserialize(deserializer)?.map(String::from))
}

/// Remap table, both sides scalars, `~` values kept as `None`
pub fn remap<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<HashMap<String, Option<String>>, D::Error> {
    let table = HashMap::<ScalarString, Option<ScalarString>>::deserialize(deserializer)?;
    Ok(table
        .into_iter()
        .map(|(from, to)| (from.0, to.map(String::from)))
        .collect())
}

/// Enum table with scalar keys
pub fn enum_table<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<HashMap<String, f64>, D::Error> {
    let table = HashMap::<ScalarString, f64>::deserialize(deserializer)?;
    Ok(table.into_iter().map(|(key, value)| (key.0, value)).collect())
}

/// Regex remap rules with scalar replacement values
pub fn remap_rules<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<RegexRules<Option<String>>, D::Error> {
    let rules = RegexRules::<Option<ScalarString>>::deserialize(deserializer)?;
    Ok(rules.map_values(|to| to.map(String::from)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_forms() {
        let values: Vec<ScalarString> =
            serde_yaml::from_str("[ether1, 0, -3, 1.5, true]").unwrap();
        let values: Vec<String> = values.into_iter().map(String::from).collect();
        assert_eq!(values, vec!["ether1", "0", "-3", "1.5", "true"]);
    }

    #[test]
    fn test_sequence_rejected() {
        assert!(serde_yaml::from_str::<ScalarString>("[1, 2]").is_err());
    }
}
