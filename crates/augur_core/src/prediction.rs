use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::target::Family;
use crate::value::TypedValue;
use crate::{AugurError, AugurResult};

/// Prediction classes in export order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionClass {
    Point,
    Named,
    Bin,
    Sample,
}

impl PredictionClass {
    pub fn name(self) -> &'static str {
        match self {
            PredictionClass::Point => "point",
            PredictionClass::Named => "named",
            PredictionClass::Bin => "bin",
            PredictionClass::Sample => "sample",
        }
    }

    pub fn parse(value: &str) -> AugurResult<Self> {
        match value {
            "point" => Ok(PredictionClass::Point),
            "named" => Ok(PredictionClass::Named),
            "bin" => Ok(PredictionClass::Bin),
            "sample" => Ok(PredictionClass::Sample),
            other => Err(AugurError::schema(format!(
                "invalid prediction class {other:?}; must be one of [\"bin\", \"named\", \"point\", \"sample\"]"
            ))),
        }
    }
}

impl fmt::Display for PredictionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Class-specific payload of one submitted element, still holding raw values.
#[derive(Clone, Debug, PartialEq)]
pub enum PredictionElement {
    Bin {
        cat: Vec<JsonValue>,
        prob: Vec<JsonValue>,
    },
    Named {
        family: String,
        params: [Option<JsonValue>; 3],
    },
    Point {
        value: JsonValue,
    },
    Sample {
        sample: Vec<JsonValue>,
    },
}

impl PredictionElement {
    pub fn class(&self) -> PredictionClass {
        match self {
            PredictionElement::Bin { .. } => PredictionClass::Bin,
            PredictionElement::Named { .. } => PredictionClass::Named,
            PredictionElement::Point { .. } => PredictionClass::Point,
            PredictionElement::Sample { .. } => PredictionClass::Sample,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PredictionDict {
    pub location: String,
    pub target: String,
    pub element: PredictionElement,
}

impl PredictionDict {
    pub fn class(&self) -> PredictionClass {
        self.element.class()
    }

    pub fn from_json(raw: &JsonValue) -> AugurResult<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| AugurError::schema(format!("prediction dict is not an object: {raw}")))?;
        let location = required_str(object, "location", raw)?;
        let target = required_str(object, "target", raw)?;
        let class = PredictionClass::parse(&required_str(object, "class", raw)?)?;
        let prediction = object
            .get("prediction")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| {
                AugurError::schema(format!("prediction dict has no 'prediction' object: {raw}"))
            })?;
        let element = match class {
            PredictionClass::Bin => PredictionElement::Bin {
                cat: required_list(prediction, "cat", raw)?,
                prob: required_list(prediction, "prob", raw)?,
            },
            PredictionClass::Named => PredictionElement::Named {
                family: required_str(prediction, "family", raw)?,
                params: [
                    present_param(prediction, "param1"),
                    present_param(prediction, "param2"),
                    present_param(prediction, "param3"),
                ],
            },
            PredictionClass::Point => PredictionElement::Point {
                value: prediction.get("value").cloned().ok_or_else(|| {
                    AugurError::schema(format!("point prediction has no 'value' key: {raw}"))
                })?,
            },
            PredictionClass::Sample => PredictionElement::Sample {
                sample: required_list(prediction, "sample", raw)?,
            },
        };
        Ok(Self {
            location,
            target,
            element,
        })
    }
}

/// Extracts the `predictions` list of a submitted document.
pub fn prediction_dicts_from_document(document: &JsonValue) -> AugurResult<Vec<PredictionDict>> {
    let predictions = document
        .get("predictions")
        .ok_or_else(|| AugurError::schema("document had no 'predictions' key"))?;
    let list = predictions.as_array().ok_or_else(|| {
        AugurError::schema(format!("'predictions' is not a list: {predictions}"))
    })?;
    list.iter().map(PredictionDict::from_json).collect()
}

fn required_str(object: &Map<String, JsonValue>, key: &str, raw: &JsonValue) -> AugurResult<String> {
    object
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| AugurError::schema(format!("missing or non-string {key:?} in {raw}")))
}

fn required_list(
    object: &Map<String, JsonValue>,
    key: &str,
    raw: &JsonValue,
) -> AugurResult<Vec<JsonValue>> {
    object
        .get(key)
        .and_then(JsonValue::as_array)
        .cloned()
        .ok_or_else(|| AugurError::schema(format!("missing or non-list {key:?} in {raw}")))
}

fn present_param(object: &Map<String, JsonValue>, key: &str) -> Option<JsonValue> {
    object.get(key).filter(|value| !value.is_null()).cloned()
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinRow {
    pub location: String,
    pub target: String,
    pub cat: TypedValue,
    pub prob: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NamedRow {
    pub location: String,
    pub target: String,
    pub family: Family,
    pub params: [Option<f64>; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointRow {
    pub location: String,
    pub target: String,
    pub value: TypedValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SampleRow {
    pub location: String,
    pub target: String,
    pub sample: TypedValue,
}

/// Validated rows grouped by class, ready for bulk insertion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedRows {
    pub bin_rows: Vec<BinRow>,
    pub named_rows: Vec<NamedRow>,
    pub point_rows: Vec<PointRow>,
    pub sample_rows: Vec<SampleRow>,
}

impl NormalizedRows {
    pub fn len(&self) -> usize {
        self.bin_rows.len() + self.named_rows.len() + self.point_rows.len() + self.sample_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_each_class_payload() {
        let document = json!({"predictions": [
            {"location": "US", "target": "pct next week", "class": "bin",
             "prediction": {"cat": [1.1, 2.2], "prob": [0.3, 0.7]}},
            {"location": "US", "target": "pct next week", "class": "named",
             "prediction": {"family": "norm", "param1": 1.1, "param2": 2.2, "param3": null}},
            {"location": "US", "target": "cases next week", "class": "point",
             "prediction": {"value": 5}},
            {"location": "US", "target": "cases next week", "class": "sample",
             "prediction": {"sample": [0, 2, 5]}}
        ]});
        let dicts = prediction_dicts_from_document(&document).expect("parse");
        assert_eq!(
            dicts.iter().map(PredictionDict::class).collect::<Vec<_>>(),
            vec![
                PredictionClass::Bin,
                PredictionClass::Named,
                PredictionClass::Point,
                PredictionClass::Sample
            ]
        );
        match &dicts[1].element {
            PredictionElement::Named { family, params } => {
                assert_eq!(family, "norm");
                assert_eq!(params, &[Some(json!(1.1)), Some(json!(2.2)), None]);
            }
            other => panic!("unexpected element {other:?}"),
        }
    }

    #[test]
    fn missing_predictions_key_is_schema_error() {
        let err = prediction_dicts_from_document(&json!({"meta": {}})).expect_err("no key");
        assert!(matches!(err, AugurError::Schema { .. }));
    }

    #[test]
    fn unknown_class_is_schema_error() {
        let raw = json!({"location": "US", "target": "t", "class": "quantile", "prediction": {}});
        let err = PredictionDict::from_json(&raw).expect_err("bad class");
        assert!(matches!(err, AugurError::Schema { .. }));
        assert!(err.message().contains("\"quantile\""));
    }

    #[test]
    fn missing_class_field_is_schema_error() {
        let raw = json!({"location": "US", "target": "t", "class": "bin", "prediction": {"cat": []}});
        let err = PredictionDict::from_json(&raw).expect_err("no prob");
        assert!(matches!(err, AugurError::Schema { .. }));
        assert!(err.message().contains("\"prob\""));
    }
}
