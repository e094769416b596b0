//! Parameter definitions
//!
//! A [`Param`] describes where a value comes from (device field, static text
//! or default) and how the raw text is turned into a label string or a
//! metric sample. Labels and metrics flatten it into their own definitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConvResult;
use crate::scalar;
use crate::types::{DateTimeType, ParamType, RegexRule, RegexRules};

/// Value source and decoding rules shared by labels, metrics and variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Field name in the device response. Absent means static/default only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fixed value, wins over the device field
    #[serde(
        default,
        rename = "static",
        alias = "static_value",
        deserialize_with = "scalar::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub static_value: Option<String>,

    #[serde(default)]
    pub param_type: ParamType,

    /// Only relevant for [`ParamType::Bool`]
    #[serde(default, skip_serializing_if = "is_false")]
    pub negate: bool,

    /// Only relevant for [`ParamType::DateTime`]
    #[serde(default)]
    pub datetime_type: DateTimeType,

    /// Used when neither a static value nor the device field resolves
    #[serde(
        default,
        deserialize_with = "scalar::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<String>,

    /// Exact raw text replacement, `null` suppresses the value
    #[serde(
        default,
        deserialize_with = "scalar::remap",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub remap_values: HashMap<String, Option<String>>,

    /// Regex replacement tried after `remap_values`, first match wins
    #[serde(
        default,
        deserialize_with = "scalar::remap_rules",
        skip_serializing_if = "RegexRules::is_empty"
    )]
    pub remap_values_re: RegexRules<Option<String>>,

    /// Only relevant for [`ParamType::Enum`]
    #[serde(
        default,
        deserialize_with = "scalar::enum_table",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub enum_values: HashMap<String, f64>,

    #[serde(default, skip_serializing_if = "RegexRules::is_empty")]
    pub enum_values_re: RegexRules<f64>,

    /// Used when no enum mapping matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_fallback: Option<f64>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Param {
    /// Read `name` from the device response and decode it as `param_type`
    pub fn field(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: Some(name.into()),
            param_type,
            ..Default::default()
        }
    }

    /// Constant value, independent of the device response
    pub fn fixed(value: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            static_value: Some(value.into()),
            param_type,
            ..Default::default()
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_negate(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    pub fn with_datetime_type(mut self, datetime_type: DateTimeType) -> Self {
        self.datetime_type = datetime_type;
        self
    }

    /// Add an exact remap, `None` suppresses the value
    pub fn with_remap(mut self, from: impl Into<String>, to: Option<&str>) -> Self {
        self.remap_values
            .insert(from.into(), to.map(str::to_string));
        self
    }

    pub fn with_remap_re(mut self, pattern: &str, to: Option<&str>) -> ConvResult<Self> {
        let mut rules: Vec<_> = self.remap_values_re.iter().cloned().collect();
        rules.push(RegexRule::new(pattern, to.map(str::to_string))?);
        self.remap_values_re = RegexRules::new(rules);
        Ok(self)
    }

    pub fn with_enum(mut self, key: impl Into<String>, value: f64) -> Self {
        self.enum_values.insert(key.into(), value);
        self
    }

    pub fn with_enum_re(mut self, pattern: &str, value: f64) -> ConvResult<Self> {
        let mut rules: Vec<_> = self.enum_values_re.iter().cloned().collect();
        rules.push(RegexRule::new(pattern, value)?);
        self.enum_values_re = RegexRules::new(rules);
        Ok(self)
    }

    pub fn with_enum_fallback(mut self, value: f64) -> Self {
        self.enum_fallback = Some(value);
        self
    }

    /// Exposed name derived from the field name (`psu-state` -> `psu_state`)
    pub fn derived_name(&self) -> Option<String> {
        self.name.as_ref().map(|n| n.replace('-', "_"))
    }
}
