//! Decoding raw response fields into label strings and metric samples
//!
//! Resolution order for the raw text is static value, device field, default.
//! The raw text then goes through the remap tables and is parsed according
//! to the parameter type. `Ok(None)` means "no value" and is not an error.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use tracing::debug;

use crate::error::{ConvError, ConvResult};
use crate::param::Param;
use crate::scope::VariableScope;
use crate::types::{DateTimeType, ParamType};

/// Named fields of one response row
pub trait Fields {
    fn field(&self, name: &str) -> Option<&str>;
}

impl Fields for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Row without any fields, used for static-only decoding
pub struct NoFields;

impl Fields for NoFields {
    fn field(&self, _name: &str) -> Option<&str> {
        None
    }
}

/// Seconds per week, day, hour, minute and second, in capture order
const TIMESPAN_FACTORS: [f64; 5] = [604_800.0, 86_400.0, 3_600.0, 60.0, 1.0];

static TIMESPAN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").ok()
});

const DATETIME_FORMAT: &str = "%b/%d/%Y %H:%M:%S";

/// Resolve the raw text of a parameter, before remapping
pub fn resolve_raw<F: Fields + ?Sized>(
    param: &Param,
    fields: &F,
    scope: &VariableScope,
) -> Option<String> {
    if let Some(value) = &param.static_value {
        return Some(scope.substitute(value));
    }

    if let Some(name) = &param.name {
        if let Some(value) = fields.field(name) {
            return Some(value.to_string());
        }
        debug!(field = %name, "field not in response, using default");
    }

    param.default.as_ref().map(|d| scope.substitute(d))
}

/// Apply `remap_values`, then `remap_values_re`. `None` means suppressed.
pub fn remap(param: &Param, raw: String) -> Option<String> {
    if let Some(target) = param.remap_values.get(&raw) {
        return target.clone();
    }

    match param.remap_values_re.first_match(&raw) {
        Some(rule) => rule
            .value
            .as_ref()
            .map(|replacement| rule.pattern.replace(&raw, replacement.as_str()).into_owned()),
        None => Some(raw),
    }
}

/// Decode a metric sample, using the local clock for DateTime values
pub fn decode_value<F: Fields + ?Sized>(
    param: &Param,
    fields: &F,
    scope: &VariableScope,
) -> ConvResult<Option<f64>> {
    decode_value_at(param, fields, scope, Local::now().naive_local())
}

/// Decode a metric sample relative to `now`
pub fn decode_value_at<F: Fields + ?Sized>(
    param: &Param,
    fields: &F,
    scope: &VariableScope,
    now: NaiveDateTime,
) -> ConvResult<Option<f64>> {
    if param.param_type == ParamType::String {
        return Err(ConvError::NotNumeric(ParamType::String));
    }

    match resolve_raw(param, fields, scope).and_then(|raw| remap(param, raw)) {
        Some(raw) => parse_number(param, &raw, now).map(Some),
        None => Ok(None),
    }
}

/// Decode a label or variable value
pub fn decode_label<F: Fields + ?Sized>(
    param: &Param,
    fields: &F,
    scope: &VariableScope,
) -> ConvResult<Option<String>> {
    decode_label_at(param, fields, scope, Local::now().naive_local())
}

pub fn decode_label_at<F: Fields + ?Sized>(
    param: &Param,
    fields: &F,
    scope: &VariableScope,
    now: NaiveDateTime,
) -> ConvResult<Option<String>> {
    let Some(raw) = resolve_raw(param, fields, scope).and_then(|raw| remap(param, raw)) else {
        return Ok(None);
    };

    match param.param_type {
        ParamType::String => Ok(Some(raw)),
        _ => parse_number(param, &raw, now).map(|v| Some(format_number(v))),
    }
}

/// Parse remapped text as a number according to the parameter type
pub fn parse_number(param: &Param, raw: &str, now: NaiveDateTime) -> ConvResult<f64> {
    match param.param_type {
        ParamType::String => Err(ConvError::NotNumeric(ParamType::String)),
        ParamType::Int => parse_int(raw),
        ParamType::Bool => Ok(parse_bool(raw, param.negate)),
        ParamType::Timespan => parse_timespan(raw),
        ParamType::DateTime => parse_datetime(raw, param.datetime_type, now),
        ParamType::Enum => decode_enum(param, raw),
    }
}

/// Number with unit letters removed (`123ms` -> 123, `1.5Gbps` -> 1.5)
pub fn parse_int(raw: &str) -> ConvResult<f64> {
    let stripped: String = raw.chars().filter(|c| !c.is_ascii_alphabetic()).collect();
    stripped
        .trim()
        .parse::<f64>()
        .map_err(|_| ConvError::InvalidNumber(raw.to_string()))
}

/// `true`/`yes` (any case) are 1, anything else 0, inverted by `negate`
pub fn parse_bool(raw: &str, negate: bool) -> f64 {
    let truthy = raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("yes");
    if truthy ^ negate {
        1.0
    } else {
        0.0
    }
}

/// Duration in `1w2d3h4m5s` form, any component optional but in that order
pub fn parse_timespan(raw: &str) -> ConvResult<f64> {
    let invalid = || ConvError::InvalidTimespan(raw.to_string());

    let captures = TIMESPAN
        .as_ref()
        .and_then(|re| re.captures(raw))
        .ok_or_else(invalid)?;

    let mut total = 0.0;
    let mut matched = false;
    for (group, factor) in TIMESPAN_FACTORS.iter().enumerate() {
        if let Some(count) = captures.get(group + 1) {
            let count: f64 = count.as_str().parse().map_err(|_| invalid())?;
            total += count * factor;
            matched = true;
        }
    }

    if matched {
        Ok(total)
    } else {
        Err(invalid())
    }
}

/// Seconds between `now` and a `may/03/2020 17:41:00` timestamp
pub fn parse_datetime(
    raw: &str,
    direction: DateTimeType,
    now: NaiveDateTime,
) -> ConvResult<f64> {
    let value = NaiveDateTime::parse_from_str(raw.trim(), DATETIME_FORMAT)
        .map_err(|_| ConvError::InvalidDateTime(raw.to_string()))?;

    let delta = match direction {
        DateTimeType::FromNow => now - value,
        DateTimeType::ToNow => value - now,
    };
    Ok(delta.num_milliseconds() as f64 / 1000.0)
}

/// Exact mapping, then the first matching regex, then the fallback
pub fn decode_enum(param: &Param, raw: &str) -> ConvResult<f64> {
    if let Some(value) = param.enum_values.get(raw) {
        return Ok(*value);
    }
    if let Some(rule) = param.enum_values_re.first_match(raw) {
        return Ok(rule.value);
    }
    param
        .enum_fallback
        .ok_or_else(|| ConvError::UnmappedEnum(raw.to_string()))
}

/// Invariant text form used for numeric labels (`1`, `1.5`, `90000`)
pub fn format_number(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 5, 3)
            .and_then(|d| d.and_hms_opt(18, 41, 0))
            .unwrap()
    }

    fn value(param: &Param, fields: &HashMap<String, String>) -> ConvResult<Option<f64>> {
        decode_value_at(param, fields, &VariableScope::new(), now())
    }

    #[test]
    fn test_static_wins_over_field() {
        let mut p = Param::field("rx", ParamType::Int);
        p.static_value = Some("7".into());
        assert_eq!(value(&p, &row(&[("rx", "100")])).unwrap(), Some(7.0));
        assert_eq!(value(&p, &row(&[])).unwrap(), Some(7.0));
    }

    #[test]
    fn test_default_when_field_missing() {
        let p = Param::field("rx", ParamType::Int).with_default("3");
        assert_eq!(value(&p, &row(&[])).unwrap(), Some(3.0));
        let p = Param::field("rx", ParamType::Int);
        assert_eq!(value(&p, &row(&[])).unwrap(), None);
    }

    #[test]
    fn test_no_name_no_static_is_no_value() {
        let p = Param {
            param_type: ParamType::Int,
            ..Default::default()
        };
        assert_eq!(value(&p, &row(&[("x", "1")])).unwrap(), None);
    }

    #[test]
    fn test_static_and_default_substitute_variables() {
        let scope: VariableScope = [("n".to_string(), "42".to_string())].into_iter().collect();
        let p = Param::fixed("{n}", ParamType::Int);
        assert_eq!(
            decode_value_at(&p, &row(&[]), &scope, now()).unwrap(),
            Some(42.0)
        );
        let p = Param::field("x", ParamType::String).with_default("id-{n}");
        assert_eq!(
            decode_label(&p, &row(&[]), &scope).unwrap().as_deref(),
            Some("id-42")
        );
    }

    #[test]
    fn test_int_strips_units() {
        assert_eq!(parse_int("123ms").unwrap(), 123.0);
        assert_eq!(parse_int("123MS").unwrap(), 123.0);
        assert_eq!(parse_int("1.5Gbps").unwrap(), 1.5);
        assert_eq!(parse_int(" 42 ").unwrap(), 42.0);
        assert!(matches!(parse_int("abc"), Err(ConvError::InvalidNumber(_))));
    }

    #[test]
    fn test_bool_and_negate() {
        assert_eq!(parse_bool("yes", false), 1.0);
        assert_eq!(parse_bool("TRUE", false), 1.0);
        assert_eq!(parse_bool("no", false), 0.0);
        assert_eq!(parse_bool("yes", true), 0.0);
        assert_eq!(parse_bool("no", true), 1.0);
    }

    #[test]
    fn test_timespan() {
        assert_eq!(parse_timespan("1d2h").unwrap(), 90_000.0);
        assert_eq!(parse_timespan("20d5h16m39s").unwrap(), 1_746_999.0);
        assert_eq!(parse_timespan("1w").unwrap(), 604_800.0);
        assert_eq!(parse_timespan("0s").unwrap(), 0.0);
        assert_eq!(parse_timespan("1w2d3h4m5s").unwrap(), 788_645.0);
        assert_eq!(parse_timespan("90m").unwrap(), 5_400.0);
        assert!(parse_timespan("1x").is_err());
        assert!(parse_timespan("").is_err());
        assert!(parse_timespan("5").is_err());
        assert!(parse_timespan("2h1d").is_err());
        assert!(parse_timespan("1d1d").is_err());
        assert!(parse_timespan("1d 2h").is_err());
    }

    #[test]
    fn test_datetime_directions() {
        assert_eq!(
            parse_datetime("may/03/2020 17:41:00", DateTimeType::FromNow, now()).unwrap(),
            3600.0
        );
        assert_eq!(
            parse_datetime("May/03/2020 17:41:00", DateTimeType::ToNow, now()).unwrap(),
            -3600.0
        );
        assert!(parse_datetime("2020-05-03", DateTimeType::FromNow, now()).is_err());
    }

    #[test]
    fn test_enum_priority() {
        let p = Param::field("state", ParamType::Enum)
            .with_enum("ok", 1.0)
            .with_enum_re("^o", 2.0)
            .unwrap()
            .with_enum_fallback(-1.0);

        assert_eq!(decode_enum(&p, "ok").unwrap(), 1.0);
        assert_eq!(decode_enum(&p, "off").unwrap(), 2.0);
        assert_eq!(decode_enum(&p, "fail").unwrap(), -1.0);

        let p = Param::field("state", ParamType::Enum).with_enum("ok", 1.0);
        assert!(matches!(
            decode_enum(&p, "fail"),
            Err(ConvError::UnmappedEnum(_))
        ));
    }

    #[test]
    fn test_remap_null_suppresses() {
        let p = Param::field("rate", ParamType::Int).with_remap("n/a", None);
        assert_eq!(value(&p, &row(&[("rate", "n/a")])).unwrap(), None);
        assert_eq!(value(&p, &row(&[("rate", "5")])).unwrap(), Some(5.0));
    }

    #[test]
    fn test_remap_exact_before_regex() {
        let p = Param::field("rate", ParamType::Int)
            .with_remap("x", Some("1"))
            .with_remap_re("^x", Some("2"))
            .unwrap();
        assert_eq!(value(&p, &row(&[("rate", "x")])).unwrap(), Some(1.0));
        assert_eq!(value(&p, &row(&[("rate", "xy")])).unwrap(), Some(2.0));
    }

    #[test]
    fn test_remap_regex_captures() {
        let p = Param::field("rate", ParamType::Int)
            .with_remap_re(r"^(\d+)k$", Some("${1}000"))
            .unwrap();
        assert_eq!(value(&p, &row(&[("rate", "12k")])).unwrap(), Some(12_000.0));
    }

    #[test]
    fn test_string_metric_is_error() {
        let p = Param::field("name", ParamType::String);
        assert!(matches!(
            value(&p, &row(&[("name", "x")])),
            Err(ConvError::NotNumeric(ParamType::String))
        ));
    }

    #[test]
    fn test_label_formats_numbers() {
        let scope = VariableScope::new();
        let p = Param::field("uptime", ParamType::Timespan);
        let label = decode_label(&p, &row(&[("uptime", "1d1h")]), &scope).unwrap();
        assert_eq!(label.as_deref(), Some("90000"));

        let p = Param::field("v", ParamType::Int);
        let label = decode_label(&p, &row(&[("v", "1.5V")]), &scope).unwrap();
        assert_eq!(label.as_deref(), Some("1.5"));

        let p = Param::field("state", ParamType::Enum).with_enum("ok", 1.0);
        let label = decode_label(&p, &row(&[("state", "ok")]), &scope).unwrap();
        assert_eq!(label.as_deref(), Some("1"));
    }

    #[test]
    fn test_label_string_passthrough() {
        let p = Param::field("name", ParamType::String);
        let label = decode_label(&p, &row(&[("name", "ether1")]), &VariableScope::new()).unwrap();
        assert_eq!(label.as_deref(), Some("ether1"));
    }
}
