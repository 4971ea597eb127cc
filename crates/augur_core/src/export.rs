use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use time::Date;

use crate::ids::ForecastId;
use crate::prediction::{NormalizedRows, PredictionClass};
use crate::project::TargetConfig;
use crate::target::TargetRegistry;
use crate::value::format_date;

/// Forecast identity written to the `meta` section of an export.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForecastInfo {
    pub id: ForecastId,
    pub model: String,
    pub source: String,
    #[serde(serialize_with = "serialize_date")]
    pub timezero_date: Date,
    pub notes: Option<String>,
}

fn serialize_date<S>(value: &Date, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_date(*value))
}

fn prediction_dict(location: &str, target: &str, class: PredictionClass, prediction: JsonValue) -> JsonValue {
    json!({
        "location": location,
        "target": target,
        "class": class.name(),
        "prediction": prediction,
    })
}

/// Rebuilds the prediction list from stored rows. Output is sorted by location then target;
/// within one pair the class order is point, named, bin, sample.
pub fn prediction_dicts(rows: &NormalizedRows) -> Vec<JsonValue> {
    let mut grouped: BTreeMap<(&str, &str), Vec<JsonValue>> = BTreeMap::new();

    for row in &rows.point_rows {
        grouped
            .entry((row.location.as_str(), row.target.as_str()))
            .or_default()
            .push(prediction_dict(
                &row.location,
                &row.target,
                PredictionClass::Point,
                json!({ "value": row.value.to_json() }),
            ));
    }

    for row in &rows.named_rows {
        let mut prediction = Map::new();
        prediction.insert("family".to_string(), json!(row.family.abbreviation()));
        for (index, param) in row.params.iter().enumerate() {
            if let Some(value) = param {
                prediction.insert(format!("param{}", index + 1), json!(value));
            }
        }
        grouped
            .entry((row.location.as_str(), row.target.as_str()))
            .or_default()
            .push(prediction_dict(
                &row.location,
                &row.target,
                PredictionClass::Named,
                JsonValue::Object(prediction),
            ));
    }

    let mut bins: BTreeMap<(&str, &str), (Vec<JsonValue>, Vec<JsonValue>)> = BTreeMap::new();
    for row in &rows.bin_rows {
        let (cats, probs) = bins.entry((row.location.as_str(), row.target.as_str())).or_default();
        cats.push(row.cat.to_json());
        probs.push(json!(row.prob));
    }
    for ((location, target), (cat, prob)) in bins {
        grouped
            .entry((location, target))
            .or_default()
            .push(prediction_dict(
                location,
                target,
                PredictionClass::Bin,
                json!({ "cat": cat, "prob": prob }),
            ));
    }

    let mut samples: BTreeMap<(&str, &str), Vec<JsonValue>> = BTreeMap::new();
    for row in &rows.sample_rows {
        samples
            .entry((row.location.as_str(), row.target.as_str()))
            .or_default()
            .push(row.sample.to_json());
    }
    for ((location, target), sample) in samples {
        grouped
            .entry((location, target))
            .or_default()
            .push(prediction_dict(
                location,
                target,
                PredictionClass::Sample,
                json!({ "sample": sample }),
            ));
    }

    grouped.into_values().flatten().collect()
}

/// Full export document: `meta` (forecast, referenced locations, all project targets) and
/// `predictions`.
pub fn export_document(
    forecast: &ForecastInfo,
    targets: &TargetRegistry,
    rows: &NormalizedRows,
) -> JsonValue {
    let locations = rows
        .point_rows
        .iter()
        .map(|row| row.location.as_str())
        .chain(rows.named_rows.iter().map(|row| row.location.as_str()))
        .chain(rows.bin_rows.iter().map(|row| row.location.as_str()))
        .chain(rows.sample_rows.iter().map(|row| row.location.as_str()))
        .collect::<BTreeSet<_>>();
    let target_dicts = targets
        .iter()
        .map(TargetConfig::from_target)
        .filter_map(|target| serde_json::to_value(target).ok())
        .collect::<Vec<_>>();
    json!({
        "meta": {
            "forecast": forecast,
            "locations": locations.into_iter().map(|name| json!({ "name": name })).collect::<Vec<_>>(),
            "targets": target_dicts,
        },
        "predictions": prediction_dicts(rows),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::date;

    use super::*;
    use crate::ids::Id;
    use crate::prediction::{BinRow, NamedRow, PointRow, SampleRow};
    use crate::project::ProjectConfig;
    use crate::project::tests::sample_config;
    use crate::target::Family;
    use crate::validate::validate_and_normalize;
    use crate::value::TypedValue;

    fn info() -> ForecastInfo {
        ForecastInfo {
            id: ForecastId(Id::new()),
            model: "docs forecast model".to_string(),
            source: "docs-predictions.json".to_string(),
            timezero_date: date!(2011 - 10 - 02),
            notes: None,
        }
    }

    #[test]
    fn groups_and_sorts_by_location_then_target() {
        let rows = NormalizedRows {
            bin_rows: vec![
                BinRow {
                    location: "b".to_string(),
                    target: "t1".to_string(),
                    cat: TypedValue::Date(date!(2019 - 12 - 15)),
                    prob: 0.25,
                },
                BinRow {
                    location: "b".to_string(),
                    target: "t1".to_string(),
                    cat: TypedValue::Date(date!(2019 - 12 - 22)),
                    prob: 0.75,
                },
            ],
            named_rows: vec![NamedRow {
                location: "a".to_string(),
                target: "t2".to_string(),
                family: Family::Pois,
                params: [Some(1.5), None, None],
            }],
            point_rows: vec![
                PointRow {
                    location: "b".to_string(),
                    target: "t1".to_string(),
                    value: TypedValue::Date(date!(2020 - 01 - 05)),
                },
                PointRow {
                    location: "a".to_string(),
                    target: "t2".to_string(),
                    value: TypedValue::Int(3),
                },
            ],
            sample_rows: vec![SampleRow {
                location: "a".to_string(),
                target: "t1".to_string(),
                sample: TypedValue::Text("mild".to_string()),
            }],
        };
        let dicts = prediction_dicts(&rows);
        assert_eq!(
            dicts,
            vec![
                json!({"location": "a", "target": "t1", "class": "sample",
                       "prediction": {"sample": ["mild"]}}),
                json!({"location": "a", "target": "t2", "class": "point",
                       "prediction": {"value": 3}}),
                json!({"location": "a", "target": "t2", "class": "named",
                       "prediction": {"family": "pois", "param1": 1.5}}),
                json!({"location": "b", "target": "t1", "class": "point",
                       "prediction": {"value": "2020-01-05"}}),
                json!({"location": "b", "target": "t1", "class": "bin",
                       "prediction": {"cat": ["2019-12-15", "2019-12-22"], "prob": [0.25, 0.75]}}),
            ]
        );
    }

    #[test]
    fn validated_document_round_trips_modulo_zero_probabilities() {
        let config = ProjectConfig::from_json(&sample_config()).expect("config");
        let schema = config.schema().expect("schema");
        let document = json!({"predictions": [
            {"location": "location2", "target": "season severity", "class": "bin",
             "prediction": {"cat": ["mild", "moderate", "severe"], "prob": [0.5, 0.0, 0.5]}},
            {"location": "location1", "target": "cases next week", "class": "point",
             "prediction": {"value": 42}},
            {"location": "location1", "target": "pct next week", "class": "named",
             "prediction": {"family": "norm", "param1": 1.1, "param2": 2.2}},
            {"location": "location1", "target": "Season peak week", "class": "sample",
             "prediction": {"sample": ["2020-01-05", "2019-12-15"]}}
        ]});
        let rows = validate_and_normalize(&schema, &document, true).expect("valid");
        let exported = export_document(&info(), &schema.targets, &rows);
        assert_eq!(
            exported["predictions"],
            json!([
                {"location": "location1", "target": "Season peak week", "class": "sample",
                 "prediction": {"sample": ["2020-01-05", "2019-12-15"]}},
                {"location": "location1", "target": "cases next week", "class": "point",
                 "prediction": {"value": 42}},
                {"location": "location1", "target": "pct next week", "class": "named",
                 "prediction": {"family": "norm", "param1": 1.1, "param2": 2.2}},
                {"location": "location2", "target": "season severity", "class": "bin",
                 "prediction": {"cat": ["mild", "severe"], "prob": [0.5, 0.5]}}
            ])
        );
        assert_eq!(
            exported["meta"]["locations"],
            json!([{"name": "location1"}, {"name": "location2"}])
        );
        assert_eq!(exported["meta"]["targets"].as_array().map(Vec::len), Some(5));
        assert_eq!(exported["meta"]["forecast"]["timezero_date"], json!("2011-10-02"));
    }
}
