use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::Date;
use time::macros::format_description;

use crate::{AugurError, AugurResult};

/// Storage type of a target's values. Each variant owns one of the five typed slots.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DataType {
    Integer = 1,
    Float = 2,
    Text = 3,
    Date = 4,
    Boolean = 5,
}

impl DataType {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(DataType::Integer),
            2 => Some(DataType::Float),
            3 => Some(DataType::Text),
            4 => Some(DataType::Date),
            5 => Some(DataType::Boolean),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Text => "text",
            DataType::Date => "date",
            DataType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    Text(String),
    Date(Date),
    Bool(bool),
}

impl TypedValue {
    pub fn data_type(&self) -> DataType {
        match self {
            TypedValue::Int(_) => DataType::Integer,
            TypedValue::Float(_) => DataType::Float,
            TypedValue::Text(_) => DataType::Text,
            TypedValue::Date(_) => DataType::Date,
            TypedValue::Bool(_) => DataType::Boolean,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Int(value) => Some(*value as f64),
            TypedValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Document form. Dates render as `YYYY-MM-DD`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            TypedValue::Int(value) => JsonValue::from(*value),
            TypedValue::Float(value) => serde_json::Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            TypedValue::Text(value) => JsonValue::String(value.clone()),
            TypedValue::Date(value) => JsonValue::String(format_date(*value)),
            TypedValue::Bool(value) => JsonValue::Bool(*value),
        }
    }

    /// Total order used for sorting category sets: values of one type compare naturally, mixed
    /// types fall back to slot order.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TypedValue::Int(a), TypedValue::Int(b)) => a.cmp(b),
            (TypedValue::Float(a), TypedValue::Float(b)) => a.total_cmp(b),
            (TypedValue::Text(a), TypedValue::Text(b)) => a.cmp(b),
            (TypedValue::Date(a), TypedValue::Date(b)) => a.cmp(b),
            (TypedValue::Bool(a), TypedValue::Bool(b)) => a.cmp(b),
            _ => self.data_type().as_i16().cmp(&other.data_type().as_i16()),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Int(value) => write!(f, "{value}"),
            TypedValue::Float(value) => write!(f, "{value}"),
            TypedValue::Text(value) => write!(f, "{value:?}"),
            TypedValue::Date(value) => write!(f, "{}", format_date(*value)),
            TypedValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// The five nullable storage columns backing one value. A populated row has exactly one slot set;
/// an all-null row stands for a missing legacy value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypedSlots {
    pub i: Option<i64>,
    pub f: Option<f64>,
    pub t: Option<String>,
    pub d: Option<Date>,
    pub b: Option<bool>,
}

impl TypedSlots {
    pub fn from_value(value: TypedValue) -> Self {
        let mut slots = Self::default();
        match value {
            TypedValue::Int(value) => slots.i = Some(value),
            TypedValue::Float(value) => slots.f = Some(value),
            TypedValue::Text(value) => slots.t = Some(value),
            TypedValue::Date(value) => slots.d = Some(value),
            TypedValue::Bool(value) => slots.b = Some(value),
        }
        slots
    }

    pub fn is_null(&self) -> bool {
        self.i.is_none()
            && self.f.is_none()
            && self.t.is_none()
            && self.d.is_none()
            && self.b.is_none()
    }
}

/// Converts a raw scalar into the slot selected by `data_type`.
pub fn to_typed(raw: &JsonValue, data_type: DataType) -> AugurResult<TypedSlots> {
    coerce(raw, data_type).map(TypedSlots::from_value)
}

/// Returns the first populated slot in i, f, t, d, b order.
pub fn from_typed(slots: &TypedSlots) -> Option<TypedValue> {
    if let Some(value) = slots.i {
        return Some(TypedValue::Int(value));
    }
    if let Some(value) = slots.f {
        return Some(TypedValue::Float(value));
    }
    if let Some(value) = &slots.t {
        return Some(TypedValue::Text(value.clone()));
    }
    if let Some(value) = slots.d {
        return Some(TypedValue::Date(value));
    }
    slots.b.map(TypedValue::Bool)
}

pub fn from_typed_json(slots: &TypedSlots) -> JsonValue {
    from_typed(slots)
        .map(|value| value.to_json())
        .unwrap_or(JsonValue::Null)
}

pub fn coerce(raw: &JsonValue, data_type: DataType) -> AugurResult<TypedValue> {
    let converted = match data_type {
        DataType::Integer => coerce_integer(raw),
        DataType::Float => coerce_float(raw).map(TypedValue::Float),
        DataType::Text => match raw {
            JsonValue::String(value) => Some(TypedValue::Text(value.clone())),
            JsonValue::Number(value) => Some(TypedValue::Text(value.to_string())),
            _ => None,
        },
        DataType::Date => raw.as_str().and_then(parse_date).map(TypedValue::Date),
        DataType::Boolean => match raw {
            JsonValue::Bool(value) => Some(TypedValue::Bool(*value)),
            JsonValue::String(value) if value.eq_ignore_ascii_case("true") => {
                Some(TypedValue::Bool(true))
            }
            JsonValue::String(value) if value.eq_ignore_ascii_case("false") => {
                Some(TypedValue::Bool(false))
            }
            _ => None,
        },
    };
    converted.ok_or_else(|| {
        AugurError::validation(format!("{raw} is not a valid {data_type} value"))
    })
}

fn coerce_integer(raw: &JsonValue) -> Option<TypedValue> {
    let value = match raw {
        JsonValue::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(integral_f64)),
        JsonValue::String(value) => {
            let trimmed = value.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral_f64))
        }
        _ => None,
    };
    value.map(TypedValue::Int)
}

fn integral_f64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn coerce_float(raw: &JsonValue) -> Option<f64> {
    let value = match raw {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(value) => value.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

/// True for the values a submitter may not use as a category or point value: null, the empty
/// string and "NA" in any case.
pub fn is_missing_marker(raw: &JsonValue) -> bool {
    match raw {
        JsonValue::Null => true,
        JsonValue::String(value) => value.is_empty() || value.eq_ignore_ascii_case("na"),
        _ => false,
    }
}

/// Parses a legacy scalar: integer first, then float, otherwise the raw text. "NA", "none" and the
/// empty string become null.
pub fn parse_value(raw: &str) -> JsonValue {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("none")
    {
        return JsonValue::Null;
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return JsonValue::from(value);
    }
    if let Some(number) = trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return JsonValue::Number(number);
    }
    JsonValue::String(trimmed.to_string())
}

pub fn parse_date(value: &str) -> Option<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).ok()
}

pub fn format_date(value: Date) -> String {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::date;

    use super::*;

    #[test]
    fn to_typed_fills_exactly_the_declared_slot() {
        let slots = to_typed(&json!(42), DataType::Integer).expect("int");
        assert_eq!(slots.i, Some(42));
        assert!(slots.f.is_none() && slots.t.is_none() && slots.d.is_none() && slots.b.is_none());

        let slots = to_typed(&json!(42), DataType::Float).expect("float");
        assert_eq!(slots.f, Some(42.0));
        assert!(slots.i.is_none());

        let slots = to_typed(&json!("2019-12-15"), DataType::Date).expect("date");
        assert_eq!(slots.d, Some(date!(2019 - 12 - 15)));

        let slots = to_typed(&json!("TRUE"), DataType::Boolean).expect("bool");
        assert_eq!(slots.b, Some(true));

        let slots = to_typed(&json!("mild"), DataType::Text).expect("text");
        assert_eq!(slots.t.as_deref(), Some("mild"));
    }

    #[test]
    fn integer_slot_accepts_integral_floats_and_numeric_strings() {
        assert_eq!(coerce(&json!(3.0), DataType::Integer).expect("3.0"), TypedValue::Int(3));
        assert_eq!(coerce(&json!(" 7 "), DataType::Integer).expect("str"), TypedValue::Int(7));
        assert!(coerce(&json!(3.5), DataType::Integer).is_err());
        assert!(coerce(&json!(true), DataType::Integer).is_err());
    }

    #[test]
    fn coerce_errors_name_the_raw_value() {
        let err = coerce(&json!("2019-13-45"), DataType::Date).expect_err("bad date");
        assert!(matches!(err, AugurError::Validation { .. }));
        assert!(err.message().contains("\"2019-13-45\""));
        assert!(err.message().contains("date"));
        assert!(coerce(&json!("nan"), DataType::Float).is_err());
    }

    #[test]
    fn from_typed_uses_slot_precedence() {
        let slots = TypedSlots {
            i: None,
            f: Some(1.5),
            t: Some("x".to_string()),
            d: None,
            b: Some(true),
        };
        assert_eq!(from_typed(&slots), Some(TypedValue::Float(1.5)));
        assert_eq!(from_typed(&TypedSlots::default()), None);
        assert_eq!(from_typed_json(&TypedSlots::default()), JsonValue::Null);
    }

    #[test]
    fn dates_export_as_iso_strings() {
        let slots = TypedSlots::from_value(TypedValue::Date(date!(2020 - 01 - 05)));
        assert_eq!(from_typed_json(&slots), json!("2020-01-05"));
    }

    #[test]
    fn legacy_markers_parse_to_null() {
        assert_eq!(parse_value("NA"), JsonValue::Null);
        assert_eq!(parse_value("None"), JsonValue::Null);
        assert_eq!(parse_value(""), JsonValue::Null);
        assert_eq!(parse_value("12"), json!(12));
        assert_eq!(parse_value("0.25"), json!(0.25));
        assert_eq!(parse_value("2017-01-02"), json!("2017-01-02"));
    }

    #[test]
    fn missing_markers_are_case_insensitive() {
        assert!(is_missing_marker(&json!(null)));
        assert!(is_missing_marker(&json!("")));
        assert!(is_missing_marker(&json!("na")));
        assert!(is_missing_marker(&json!("NA")));
        assert!(!is_missing_marker(&json!("none")));
        assert!(!is_missing_marker(&json!(" NA ")));
        assert!(!is_missing_marker(&json!(" ")));
        assert!(!is_missing_marker(&json!(0)));
    }

    #[test]
    fn data_type_codes_roundtrip() {
        for data_type in [
            DataType::Integer,
            DataType::Float,
            DataType::Text,
            DataType::Date,
            DataType::Boolean,
        ] {
            assert_eq!(DataType::from_i16(data_type.as_i16()), Some(data_type));
        }
        assert_eq!(DataType::from_i16(9), None);
    }
}
