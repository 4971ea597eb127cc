use std::collections::{BTreeSet, HashMap};

use serde_json::Value as JsonValue;

use crate::prediction::{
    BinRow, NamedRow, NormalizedRows, PointRow, PredictionClass, PredictionDict,
    PredictionElement, SampleRow, prediction_dicts_from_document,
};
use crate::target::{Family, Target, TargetRegistry, valid_named_families};
use crate::value::{TypedValue, coerce, is_missing_marker};
use crate::{AugurError, AugurResult};

/// Relative tolerance for a bin distribution's probability sum against 1.0.
pub const PROB_SUM_REL_TOL: f64 = 0.001;

// Absorbs binary rounding exactly at the tolerance boundary, e.g. sum([0.3, 0.699]).
const PROB_SUM_SLACK: f64 = 1e-12;

/// Locations and targets of one project, captured once per validation run.
#[derive(Clone, Debug, Default)]
pub struct ProjectSchema {
    pub locations: BTreeSet<String>,
    pub targets: TargetRegistry,
}

impl ProjectSchema {
    pub fn new(
        locations: impl IntoIterator<Item = String>,
        targets: impl IntoIterator<Item = Target>,
    ) -> Self {
        Self {
            locations: locations.into_iter().collect(),
            targets: TargetRegistry::new(targets),
        }
    }

    fn require_location(&self, name: &str) -> AugurResult<()> {
        if self.locations.contains(name) {
            return Ok(());
        }
        Err(AugurError::schema(format!(
            "location {name:?} not found; known locations: {:?}",
            self.locations
        )))
    }

    fn target(&self, name: &str) -> AugurResult<&Target> {
        self.targets
            .get(name)
            .map_err(|err| AugurError::schema(err.message()))
    }
}

pub fn validate_and_normalize(
    schema: &ProjectSchema,
    document: &JsonValue,
    validate_cats: bool,
) -> AugurResult<NormalizedRows> {
    let dicts = prediction_dicts_from_document(document)?;
    validate_prediction_dicts(schema, &dicts, validate_cats)
}

/// Validates every element and returns the rows of the whole batch, or the first error found.
/// Duplicate elements are reported together once all elements passed their class rules.
pub fn validate_prediction_dicts(
    schema: &ProjectSchema,
    dicts: &[PredictionDict],
    validate_cats: bool,
) -> AugurResult<NormalizedRows> {
    let mut rows = NormalizedRows::default();
    let mut seen: Vec<(&str, &str, PredictionClass)> = Vec::new();
    let mut counts: HashMap<(&str, &str, PredictionClass), usize> = HashMap::new();
    for dict in dicts {
        schema.require_location(&dict.location)?;
        let target = schema.target(&dict.target)?;
        match &dict.element {
            PredictionElement::Bin { cat, prob } => {
                validate_bin(dict, target, cat, prob, validate_cats, &mut rows.bin_rows)?
            }
            PredictionElement::Named { family, params } => {
                rows.named_rows
                    .push(validate_named(dict, target, family, params)?);
            }
            PredictionElement::Point { value } => {
                rows.point_rows.push(validate_point(dict, target, value)?);
            }
            PredictionElement::Sample { sample } => {
                validate_sample(dict, target, sample, &mut rows.sample_rows)?
            }
        }
        let key = (dict.location.as_str(), dict.target.as_str(), dict.class());
        let count = counts.entry(key).or_insert(0);
        if *count == 0 {
            seen.push(key);
        }
        *count += 1;
    }
    let duplicates = seen
        .into_iter()
        .filter_map(|key| {
            let count = counts.get(&key).copied().unwrap_or(0);
            (count > 1).then(|| format!("({:?}, {:?}, {:?}) x{count}", key.0, key.1, key.2.name()))
        })
        .collect::<Vec<_>>();
    if !duplicates.is_empty() {
        return Err(AugurError::validation(format!(
            "within a prediction there cannot be more than 1 prediction element of the same class; \
             duplicate (location, target, class) keys: [{}]",
            duplicates.join(", ")
        )));
    }
    Ok(rows)
}

fn context(dict: &PredictionDict) -> String {
    format!(
        "location={:?}, target={:?}, class={:?}",
        dict.location,
        dict.target,
        dict.class().name()
    )
}

fn list_json(values: &[JsonValue]) -> JsonValue {
    JsonValue::Array(values.to_vec())
}

fn typed_list_json(values: &[TypedValue]) -> JsonValue {
    JsonValue::Array(values.iter().map(TypedValue::to_json).collect())
}

fn coerce_in_context(
    dict: &PredictionDict,
    target: &Target,
    raw: &JsonValue,
) -> AugurResult<TypedValue> {
    coerce(raw, target.data_type()).map_err(|err| {
        AugurError::validation(format!("{}; {}", err.message(), context(dict)))
    })
}

fn validate_bin(
    dict: &PredictionDict,
    target: &Target,
    cat: &[JsonValue],
    prob: &[JsonValue],
    validate_cats: bool,
    out: &mut Vec<BinRow>,
) -> AugurResult<()> {
    if cat.len() != prob.len() {
        return Err(AugurError::validation(format!(
            "the number of elements in 'cat' and 'prob' must be identical. |cat|={}, |prob|={}, {}",
            cat.len(),
            prob.len(),
            context(dict)
        )));
    }
    if cat.iter().any(is_missing_marker) {
        return Err(AugurError::validation(format!(
            "entries in 'cat' cannot be \"\", \"NA\" or null. cat={}, {}",
            list_json(cat),
            context(dict)
        )));
    }
    let typed_cats = cat
        .iter()
        .map(|raw| coerce_in_context(dict, target, raw))
        .collect::<AugurResult<Vec<_>>>()?;
    if validate_cats {
        let declared = target.cats_values();
        if typed_cats.iter().any(|value| !declared.contains(value)) {
            return Err(AugurError::validation(format!(
                "entries in 'cat' must be a subset of the target's cats. cat={}, cats={}, {}",
                list_json(cat),
                typed_list_json(&declared),
                context(dict)
            )));
        }
    }

    let numeric = prob.iter().filter(|value| value.is_number()).count();
    if numeric != prob.len() {
        let problem = if numeric == 0 {
            "wrong data type in 'prob', which must only contain numbers"
        } else {
            "more than one data type in 'prob', which must only contain numbers"
        };
        return Err(AugurError::validation(format!(
            "{problem}. prob={}, {}",
            list_json(prob),
            context(dict)
        )));
    }
    let probs = prob
        .iter()
        .filter_map(JsonValue::as_f64)
        .collect::<Vec<_>>();
    if probs.iter().any(|value| !(0.0..=1.0).contains(value)) {
        return Err(AugurError::validation(format!(
            "entries in 'prob' must be numbers in [0, 1]. prob={}, {}",
            list_json(prob),
            context(dict)
        )));
    }
    let sum: f64 = probs.iter().sum();
    if !prob_sum_is_close(sum) {
        return Err(AugurError::validation(format!(
            "the values within 'prob' must sum to 1.0 (relative tolerance {PROB_SUM_REL_TOL}). \
             sum={sum}, prob={}, {}",
            list_json(prob),
            context(dict)
        )));
    }

    out.extend(
        typed_cats
            .into_iter()
            .zip(probs)
            .filter(|(_, prob)| *prob != 0.0)
            .map(|(cat, prob)| BinRow {
                location: dict.location.clone(),
                target: dict.target.clone(),
                cat,
                prob,
            }),
    );
    Ok(())
}

pub fn prob_sum_is_close(sum: f64) -> bool {
    (1.0 - sum).abs() <= PROB_SUM_REL_TOL * sum.abs().max(1.0) + PROB_SUM_SLACK
}

fn validate_named(
    dict: &PredictionDict,
    target: &Target,
    family: &str,
    params: &[Option<JsonValue>; 3],
) -> AugurResult<NamedRow> {
    let family = Family::from_abbreviation(family)
        .map_err(|err| AugurError::schema(format!("{}; {}", err.message(), context(dict))))?;
    let valid = valid_named_families(target.target_type);
    if !valid.contains(&family) {
        return Err(AugurError::validation(format!(
            "family {:?} is not valid for {:?} target types; valid families: {:?}. {}",
            family.abbreviation(),
            target.target_type.name(),
            valid.iter().map(|family| family.abbreviation()).collect::<Vec<_>>(),
            context(dict)
        )));
    }

    let arity = family.arity();
    let present = params
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_some())
        .map(|(index, _)| format!("param{}", index + 1))
        .collect::<Vec<_>>();
    let leading = params.iter().take(arity).all(Option::is_some);
    if present.len() != arity || !leading {
        return Err(AugurError::validation(format!(
            "the number of param values must match the family definition: family {:?} takes {arity} \
             (param1..param{arity}), got {present:?}. {}",
            family.abbreviation(),
            context(dict)
        )));
    }

    let mut values = [None; 3];
    for (index, spec) in family.params().iter().enumerate() {
        let name = format!("param{}", index + 1);
        let raw = params[index].as_ref().ok_or_else(|| {
            AugurError::validation(format!("missing {name}. {}", context(dict)))
        })?;
        let value = raw.as_f64().ok_or_else(|| {
            AugurError::validation(format!(
                "{name} ({}) is not a number: {raw}. {}",
                spec.name,
                context(dict)
            ))
        })?;
        if !spec.domain.contains(value) {
            return Err(AugurError::validation(format!(
                "{name} ({}) is not a number in the valid range ({}) for family {:?}: {value}. {}",
                spec.name,
                spec.domain.describe(),
                family.abbreviation(),
                context(dict)
            )));
        }
        values[index] = Some(value);
    }
    Ok(NamedRow {
        location: dict.location.clone(),
        target: dict.target.clone(),
        family,
        params: values,
    })
}

fn validate_point(
    dict: &PredictionDict,
    target: &Target,
    value: &JsonValue,
) -> AugurResult<PointRow> {
    if is_missing_marker(value) {
        return Err(AugurError::validation(format!(
            "entries in 'value' cannot be \"\", \"NA\" or null. value={value}, {}",
            context(dict)
        )));
    }
    Ok(PointRow {
        location: dict.location.clone(),
        target: dict.target.clone(),
        value: coerce_in_context(dict, target, value)?,
    })
}

fn validate_sample(
    dict: &PredictionDict,
    target: &Target,
    sample: &[JsonValue],
    out: &mut Vec<SampleRow>,
) -> AugurResult<()> {
    for raw in sample {
        out.push(SampleRow {
            location: dict.location.clone(),
            target: dict.target.clone(),
            sample: coerce_in_context(dict, target, raw)?,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::date;

    use super::*;
    use crate::target::TargetType;

    fn target(name: &str, target_type: TargetType, cats: Vec<TypedValue>) -> Target {
        Target {
            name: name.to_string(),
            target_type,
            description: format!("{name} description"),
            is_step_ahead: true,
            step_ahead_increment: Some(1),
            unit: Some("unit".to_string()),
            range: None,
            cats,
        }
    }

    fn schema() -> ProjectSchema {
        ProjectSchema::new(
            ["location1", "location2", "location3"].map(str::to_string),
            [
                target(
                    "pct next week",
                    TargetType::Continuous,
                    [0.0, 1.0, 1.1, 2.0, 2.2, 3.0, 3.3, 5.0, 10.0, 50.0]
                        .into_iter()
                        .map(TypedValue::Float)
                        .collect(),
                ),
                target(
                    "cases next week",
                    TargetType::Discrete,
                    (0..=2).map(TypedValue::Int).collect(),
                ),
                target(
                    "season severity",
                    TargetType::Nominal,
                    ["high", "mild", "moderate", "severe"]
                        .map(|cat| TypedValue::Text(cat.to_string()))
                        .into(),
                ),
                target("above baseline", TargetType::Binary, vec![]),
                target(
                    "Season peak week",
                    TargetType::Date,
                    vec![
                        TypedValue::Date(date!(2019 - 12 - 15)),
                        TypedValue::Date(date!(2019 - 12 - 22)),
                        TypedValue::Date(date!(2019 - 12 - 29)),
                        TypedValue::Date(date!(2020 - 01 - 05)),
                    ],
                ),
            ],
        )
    }

    fn doc(elements: Vec<JsonValue>) -> JsonValue {
        json!({ "predictions": elements })
    }

    fn element(location: &str, target: &str, class: &str, prediction: JsonValue) -> JsonValue {
        json!({"location": location, "target": target, "class": class, "prediction": prediction})
    }

    fn validation_message(result: AugurResult<NormalizedRows>) -> String {
        match result {
            Err(AugurError::Validation { message }) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_location_and_target_name_the_identifier() {
        let err = validate_and_normalize(
            &schema(),
            &doc(vec![element("bad loc", "pct next week", "point", json!({"value": 1.0}))]),
            true,
        )
        .expect_err("bad location");
        assert!(matches!(err, AugurError::Schema { .. }));
        assert!(err.message().contains("\"bad loc\""));
        assert!(err.message().contains("\"location1\""));

        let err = validate_and_normalize(
            &schema(),
            &doc(vec![element("location1", "bad target", "point", json!({"value": 1.0}))]),
            true,
        )
        .expect_err("bad target");
        assert!(matches!(err, AugurError::Schema { .. }));
        assert!(err.message().contains("\"bad target\""));
    }

    #[test]
    fn bin_count_mismatch_fails() {
        let message = validation_message(validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "pct next week",
                "bin",
                json!({"cat": [1.1, 2.2, 3.3], "prob": [0.5, 0.5]}),
            )]),
            true,
        ));
        assert!(message.contains("|cat|=3, |prob|=2"), "{message}");
    }

    #[test]
    fn bin_cat_rejects_missing_markers() {
        for bad in [json!(""), json!("NA"), json!("na"), json!(null)] {
            let message = validation_message(validate_and_normalize(
                &schema(),
                &doc(vec![element(
                    "location1",
                    "season severity",
                    "bin",
                    json!({"cat": ["mild", bad, "severe"], "prob": [0.5, 0.2, 0.3]}),
                )]),
                true,
            ));
            assert!(message.contains("cannot be"), "{message}");
        }
    }

    #[test]
    fn bin_cat_must_be_declared_unless_opted_out() {
        let document = doc(vec![element(
            "location1",
            "season severity",
            "bin",
            json!({"cat": ["mild", "extreme"], "prob": [0.5, 0.5]}),
        )]);
        let message = validation_message(validate_and_normalize(&schema(), &document, true));
        assert!(message.contains("subset"), "{message}");
        assert!(message.contains("\"extreme\""), "{message}");
        let rows = validate_and_normalize(&schema(), &document, false).expect("opted out");
        assert_eq!(rows.bin_rows.len(), 2);
    }

    #[test]
    fn date_bin_cats_compare_as_dates() {
        let rows = validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "Season peak week",
                "bin",
                json!({"cat": ["2019-12-15", "2019-12-22"], "prob": [0.4, 0.6]}),
            )]),
            true,
        )
        .expect("date bins");
        assert_eq!(rows.bin_rows[0].cat, TypedValue::Date(date!(2019 - 12 - 15)));
    }

    #[test]
    fn binary_bins_use_implicit_boolean_cats() {
        let rows = validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "above baseline",
                "bin",
                json!({"cat": [true, false], "prob": [0.9, 0.1]}),
            )]),
            true,
        )
        .expect("binary bins");
        assert_eq!(
            rows.bin_rows
                .iter()
                .map(|row| (row.cat.clone(), row.prob))
                .collect::<Vec<_>>(),
            vec![(TypedValue::Bool(true), 0.9), (TypedValue::Bool(false), 0.1)]
        );
    }

    #[test]
    fn missing_markers_only_apply_to_cats_and_point_values() {
        let rows = validate_and_normalize(
            &schema(),
            &doc(vec![
                element("location1", "season severity", "point", json!({"value": " NA "})),
                element("location2", "season severity", "sample", json!({"sample": ["NA", ""]})),
            ]),
            true,
        )
        .expect("markers outside cat and value");
        assert_eq!(rows.point_rows[0].value, TypedValue::Text(" NA ".to_string()));
        assert_eq!(
            rows.sample_rows
                .iter()
                .map(|row| row.sample.clone())
                .collect::<Vec<_>>(),
            vec![
                TypedValue::Text("NA".to_string()),
                TypedValue::Text(String::new())
            ]
        );
    }

    #[test]
    fn bin_prob_type_and_range_checks() {
        let cases = [
            (json!(["a", "b"]), "wrong data type"),
            (json!([0.5, "0.5"]), "more than one data type"),
            (json!([1.5, -0.5]), "[0, 1]"),
        ];
        for (prob, expected) in cases {
            let message = validation_message(validate_and_normalize(
                &schema(),
                &doc(vec![element(
                    "location1",
                    "pct next week",
                    "bin",
                    json!({"cat": [1.1, 2.2], "prob": prob}),
                )]),
                true,
            ));
            assert!(message.contains(expected), "{expected}: {message}");
        }
    }

    #[test]
    fn bin_prob_sum_tolerance() {
        assert!(prob_sum_is_close(1.0));
        assert!(prob_sum_is_close(0.999));
        assert!(prob_sum_is_close(1.001));
        assert!(!prob_sum_is_close(1.002));
        assert!(!prob_sum_is_close(0.998));

        let sums = [(json!([0.3, 0.699]), true), (json!([0.3, 0.702]), false)];
        for (prob, ok) in sums {
            let result = validate_and_normalize(
                &schema(),
                &doc(vec![element(
                    "location1",
                    "pct next week",
                    "bin",
                    json!({"cat": [1.1, 2.2], "prob": prob}),
                )]),
                true,
            );
            assert_eq!(result.is_ok(), ok, "{prob}");
        }
    }

    #[test]
    fn zero_probability_bins_are_dropped() {
        let rows = validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "cases next week",
                "bin",
                json!({"cat": [0, 1, 2], "prob": [0.0, 1, 0]}),
            )]),
            true,
        )
        .expect("bins");
        assert_eq!(rows.bin_rows.len(), 1);
        assert_eq!(rows.bin_rows[0].cat, TypedValue::Int(1));
        assert_eq!(rows.bin_rows[0].prob, 1.0);
    }

    #[test]
    fn named_family_must_match_target_type() {
        for (target, family) in [
            ("pct next week", "norm"),
            ("pct next week", "lnorm"),
            ("pct next week", "gamma"),
            ("pct next week", "beta"),
            ("cases next week", "nbinom"),
            ("cases next week", "nbinom2"),
        ] {
            let rows = validate_and_normalize(
                &schema(),
                &doc(vec![element(
                    "location1",
                    target,
                    "named",
                    json!({"family": family, "param1": 0.5, "param2": 0.5}),
                )]),
                true,
            )
            .unwrap_or_else(|err| panic!("{target}/{family}: {err}"));
            assert_eq!(rows.named_rows.len(), 1);
        }
        let message = validation_message(validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "cases next week",
                "named",
                json!({"family": "norm", "param1": 1.0, "param2": 1.0}),
            )]),
            true,
        ));
        assert!(message.contains("is not valid for \"discrete\" target types"), "{message}");
        let message = validation_message(validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "season severity",
                "named",
                json!({"family": "bern", "param1": 0.5}),
            )]),
            true,
        ));
        assert!(message.contains("is not valid for \"nominal\""), "{message}");
    }

    #[test]
    fn unknown_family_is_schema_error() {
        let err = validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "pct next week",
                "named",
                json!({"family": "cauchy", "param1": 1.0}),
            )]),
            true,
        )
        .expect_err("unknown family");
        assert!(matches!(err, AugurError::Schema { .. }));
    }

    #[test]
    fn named_param_count_must_equal_arity() {
        for prediction in [
            json!({"family": "norm", "param1": 1.0}),
            json!({"family": "norm", "param1": 1.0, "param2": 1.0, "param3": 1.0}),
            json!({"family": "pois", "param2": 1.0}),
        ] {
            let target = if prediction["family"] == "pois" {
                "cases next week"
            } else {
                "pct next week"
            };
            let message = validation_message(validate_and_normalize(
                &schema(),
                &doc(vec![element("location1", target, "named", prediction)]),
                true,
            ));
            assert!(message.contains("must match the family definition"), "{message}");
        }
    }

    #[test]
    fn named_params_are_range_checked() {
        let ok = validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "cases next week",
                "named",
                json!({"family": "pois", "param1": 0.0}),
            )]),
            true,
        )
        .expect("zero rate");
        assert_eq!(ok.named_rows[0].params, [Some(0.0), None, None]);

        let bad = [
            ("cases next week", json!({"family": "pois", "param1": -0.1})),
            ("pct next week", json!({"family": "norm", "param1": 0.0, "param2": -0.1})),
            ("pct next week", json!({"family": "gamma", "param1": 0.0, "param2": 1.0})),
            ("pct next week", json!({"family": "beta", "param1": 1.0, "param2": 0.0})),
            ("cases next week", json!({"family": "nbinom", "param1": 1.0, "param2": 1.1})),
            ("cases next week", json!({"family": "nbinom2", "param1": 1.0, "param2": 0.0})),
        ];
        for (target, prediction) in bad {
            let message = validation_message(validate_and_normalize(
                &schema(),
                &doc(vec![element("location1", target, "named", prediction.clone())]),
                true,
            ));
            assert!(
                message.contains("not a number in the valid range"),
                "{prediction}: {message}"
            );
        }
    }

    #[test]
    fn point_value_rejects_missing_markers_and_types_value() {
        let message = validation_message(validate_and_normalize(
            &schema(),
            &doc(vec![element("location1", "season severity", "point", json!({"value": "NA"}))]),
            true,
        ));
        assert!(message.contains("'value' cannot be"), "{message}");

        let rows = validate_and_normalize(
            &schema(),
            &doc(vec![element("location1", "cases next week", "point", json!({"value": 42}))]),
            true,
        )
        .expect("point");
        assert_eq!(rows.point_rows[0].value, TypedValue::Int(42));

        let message = validation_message(validate_and_normalize(
            &schema(),
            &doc(vec![element("location1", "cases next week", "point", json!({"value": "x"}))]),
            true,
        ));
        assert!(message.contains("\"x\" is not a valid integer value"), "{message}");
    }

    #[test]
    fn samples_expand_to_one_row_each() {
        let rows = validate_and_normalize(
            &schema(),
            &doc(vec![element(
                "location1",
                "above baseline",
                "sample",
                json!({"sample": [true, false, true]}),
            )]),
            true,
        )
        .expect("samples");
        assert_eq!(
            rows.sample_rows
                .iter()
                .map(|row| row.sample.clone())
                .collect::<Vec<_>>(),
            vec![
                TypedValue::Bool(true),
                TypedValue::Bool(false),
                TypedValue::Bool(true)
            ]
        );
    }

    #[test]
    fn duplicate_elements_are_reported_together() {
        let point = json!({"value": 1.0});
        let message = validation_message(validate_and_normalize(
            &schema(),
            &doc(vec![
                element("location1", "pct next week", "point", point.clone()),
                element("location1", "pct next week", "point", point.clone()),
                element("location2", "cases next week", "point", json!({"value": 1})),
                element("location2", "cases next week", "point", json!({"value": 2})),
            ]),
            true,
        ));
        assert!(message.contains("(\"location1\", \"pct next week\", \"point\") x2"), "{message}");
        assert!(message.contains("(\"location2\", \"cases next week\", \"point\") x2"), "{message}");

        let rows = validate_and_normalize(
            &schema(),
            &doc(vec![
                element("location1", "pct next week", "point", point.clone()),
                element("location2", "pct next week", "point", point.clone()),
                element("location1", "pct next week", "named", json!({"family": "norm", "param1": 0.0, "param2": 1.0})),
            ]),
            true,
        )
        .expect("distinct keys");
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn class_errors_surface_before_duplicate_check() {
        let message = validation_message(validate_and_normalize(
            &schema(),
            &doc(vec![
                element("location1", "pct next week", "point", json!({"value": 1.0})),
                element("location1", "pct next week", "point", json!({"value": ""})),
            ]),
            true,
        ));
        assert!(message.contains("'value' cannot be"), "{message}");
    }
}
