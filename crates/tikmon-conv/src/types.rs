//! Core types for parameter decoding

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use regex::Regex;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConvError, ConvResult};
use crate::scalar::ScalarString;

/// How a raw field value is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    /// Kept as text, only meaningful for labels and variables
    #[default]
    String,
    /// Any numeric value, unit suffixes like `ms` or `Mbps` are stripped
    Int,
    /// `true`/`yes` are 1, everything else 0
    Bool,
    /// Duration such as `20d5h16m39s`, in seconds
    Timespan,
    /// Timestamp such as `may/03/2020 17:41:00`, as seconds relative to now
    DateTime,
    /// String to number mapping (e.g. psu-state: ok, fail)
    Enum,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "String",
            ParamType::Int => "Int",
            ParamType::Bool => "Bool",
            ParamType::Timespan => "Timespan",
            ParamType::DateTime => "DateTime",
            ParamType::Enum => "Enum",
        };
        f.write_str(s)
    }
}

/// Direction of the difference computed for [`ParamType::DateTime`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateTimeType {
    /// `value - now`, positive for timestamps in the future
    ToNow,
    /// `now - value`, positive for timestamps in the past
    #[default]
    FromNow,
}

/// Compiled regular expression that (de)serializes as its source string
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> ConvResult<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| ConvError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Deref for Pattern {
    type Target = Regex;

    fn deref(&self) -> &Regex {
        &self.0
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = ScalarString::deserialize(deserializer)?;
        Pattern::new(&source.0).map_err(de::Error::custom)
    }
}

/// A single `pattern -> value` rule
#[derive(Debug, Clone, PartialEq)]
pub struct RegexRule<T> {
    pub pattern: Pattern,
    pub value: T,
}

impl<T> RegexRule<T> {
    pub fn new(pattern: &str, value: T) -> ConvResult<Self> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
            value,
        })
    }
}

/// Ordered list of regex rules, the first matching rule wins.
///
/// Accepts both YAML shapes seen in module files:
///
/// ```yaml
/// enum_values_re:          # mapping, document order is kept
///   "^up": 1
///   "^down": 0
/// remap_values_re:         # list of single-entry mappings
///   - "^n/a$": ~
///   - "^(\\d+)kbps$": "${1}000"
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RegexRules<T>(Vec<RegexRule<T>>);

impl<T> Default for RegexRules<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> RegexRules<T> {
    pub fn new(rules: Vec<RegexRule<T>>) -> Self {
        Self(rules)
    }

    /// First rule whose pattern matches `input`
    pub fn first_match(&self, input: &str) -> Option<&RegexRule<T>> {
        self.0.iter().find(|rule| rule.pattern.is_match(input))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegexRule<T>> {
        self.0.iter()
    }

    /// Same patterns in the same order with converted values
    pub fn map_values<U>(self, mut f: impl FnMut(T) -> U) -> RegexRules<U> {
        RegexRules(
            self.0
                .into_iter()
                .map(|rule| RegexRule {
                    pattern: rule.pattern,
                    value: f(rule.value),
                })
                .collect(),
        )
    }
}

impl<T: Serialize> Serialize for RegexRules<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for rule in &self.0 {
            map.serialize_entry(rule.pattern.as_str(), &rule.value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RegexRules<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RulesVisitor(PhantomData))
    }
}

struct RulesVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for RulesVisitor<T> {
    type Value = RegexRules<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of pattern to value or a list of single-entry mappings")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(RegexRules::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut rules = Vec::new();
        while let Some((pattern, value)) = map.next_entry::<Pattern, T>()? {
            rules.push(RegexRule { pattern, value });
        }
        Ok(RegexRules(rules))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut rules = Vec::new();
        while let Some(entry) = seq.next_element::<SingleRule<T>>()? {
            rules.push(entry.0);
        }
        Ok(RegexRules(rules))
    }
}

struct SingleRule<T>(RegexRule<T>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for SingleRule<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rules = RegexRules::<T>::deserialize(deserializer)?;
        let mut rules = rules.0;
        if rules.len() != 1 {
            return Err(de::Error::invalid_length(
                rules.len(),
                &"exactly one pattern per list entry",
            ));
        }
        Ok(SingleRule(rules.remove(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_from_mapping_keep_order() {
        let rules: RegexRules<f64> = serde_yaml::from_str("\"^a\": 1\n\"^ab\": 2\n").unwrap();
        assert_eq!(rules.first_match("abc").unwrap().value, 1.0);
    }

    #[test]
    fn test_rules_from_list() {
        let yaml = "- \"^n/a$\": ~\n- \"^(\\\\d+)k$\": \"${1}000\"\n";
        let rules: RegexRules<Option<String>> = serde_yaml::from_str(yaml).unwrap();
        assert!(rules.first_match("n/a").unwrap().value.is_none());
        assert_eq!(
            rules.first_match("12k").unwrap().value.as_deref(),
            Some("${1}000")
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result: Result<RegexRules<f64>, _> = serde_yaml::from_str("\"(\": 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_param_type_display() {
        assert_eq!(ParamType::Timespan.to_string(), "Timespan");
        assert_eq!(ParamType::default(), ParamType::String);
    }
}
