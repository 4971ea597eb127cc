#![allow(dead_code)]

use std::path::Path;

use augur_store::{
    AugurConfig, AugurResult, AugurStore, CreateForecastInput, CreateModelInput, ForecastApi,
    ForecastId, LimitsConfig, ProjectApi, ProjectConfig, ProjectId,
};
use serde_json::{Value as JsonValue, json};
use time::macros::date;

pub fn project_json() -> JsonValue {
    json!({
        "name": "CDC Flu challenge",
        "is_public": true,
        "description": "Guidelines and forecasts for a series of challenges.",
        "home_url": "https://example.org/flu",
        "logo_url": null,
        "core_data": "https://example.org/flu/data",
        "time_interval_type": "Week",
        "visualization_y_label": "Weighted ILI (%)",
        "locations": [{"name": "location1"}, {"name": "location2"}, {"name": "location3"}],
        "targets": [
            {"name": "pct next week", "type": "continuous", "description": "pct",
             "is_step_ahead": true, "step_ahead_increment": 1, "unit": "percent",
             "range": [0.0, 100.0], "cats": [0.0, 1.0, 1.1, 2.0, 2.2, 3.0, 3.3, 5.0, 10.0, 50.0]},
            {"name": "cases next week", "type": "discrete", "description": "cases",
             "is_step_ahead": true, "step_ahead_increment": 2, "unit": "cases",
             "range": [0, 100000], "cats": [0, 2, 50]},
            {"name": "season severity", "type": "nominal", "description": "severity",
             "is_step_ahead": false, "cats": ["high", "mild", "moderate", "severe"]},
            {"name": "above baseline", "type": "binary", "description": "baseline",
             "is_step_ahead": true, "step_ahead_increment": 1},
            {"name": "Season peak week", "type": "date", "description": "peak",
             "is_step_ahead": false, "unit": "week",
             "cats": ["2019-12-15", "2019-12-22", "2019-12-29", "2020-01-05"]}
        ],
        "timezeros": [
            {"timezero_date": "2011-10-02", "data_version_date": null,
             "is_season_start": true, "season_name": "2011-2012"},
            {"timezero_date": "2011-10-09", "data_version_date": "2011-10-19",
             "is_season_start": false, "season_name": null},
            {"timezero_date": "2011-10-16", "data_version_date": null,
             "is_season_start": false, "season_name": null}
        ]
    })
}

pub fn project_config() -> ProjectConfig {
    ProjectConfig::from_json(&project_json()).expect("project config")
}

pub fn predictions_json() -> JsonValue {
    json!({"predictions": [
        {"location": "location2", "target": "season severity", "class": "bin",
         "prediction": {"cat": ["mild", "moderate", "severe"], "prob": [0.0, 0.5, 0.5]}},
        {"location": "location1", "target": "pct next week", "class": "sample",
         "prediction": {"sample": [2.3, 6.5, 0.0]}},
        {"location": "location1", "target": "pct next week", "class": "bin",
         "prediction": {"cat": [1.1, 2.2, 3.3], "prob": [0.3, 0.2, 0.5]}},
        {"location": "location1", "target": "pct next week", "class": "named",
         "prediction": {"family": "norm", "param1": 1.1, "param2": 2.2}},
        {"location": "location1", "target": "pct next week", "class": "point",
         "prediction": {"value": 2.1}},
        {"location": "location2", "target": "cases next week", "class": "bin",
         "prediction": {"cat": [0, 2, 50], "prob": [0, 0.25, 0.75]}},
        {"location": "location2", "target": "cases next week", "class": "point",
         "prediction": {"value": 5}},
        {"location": "location3", "target": "above baseline", "class": "point",
         "prediction": {"value": true}},
        {"location": "location3", "target": "Season peak week", "class": "sample",
         "prediction": {"sample": ["2020-01-05", "2019-12-15"]}}
    ]})
}

/// `predictions_json` as exported: sorted by location and target, class order point, named,
/// bin, sample, zero-probability bins dropped.
pub fn exported_predictions() -> JsonValue {
    json!([
        {"location": "location1", "target": "pct next week", "class": "point",
         "prediction": {"value": 2.1}},
        {"location": "location1", "target": "pct next week", "class": "named",
         "prediction": {"family": "norm", "param1": 1.1, "param2": 2.2}},
        {"location": "location1", "target": "pct next week", "class": "bin",
         "prediction": {"cat": [1.1, 2.2, 3.3], "prob": [0.3, 0.2, 0.5]}},
        {"location": "location1", "target": "pct next week", "class": "sample",
         "prediction": {"sample": [2.3, 6.5, 0.0]}},
        {"location": "location2", "target": "cases next week", "class": "point",
         "prediction": {"value": 5}},
        {"location": "location2", "target": "cases next week", "class": "bin",
         "prediction": {"cat": [2, 50], "prob": [0.25, 0.75]}},
        {"location": "location2", "target": "season severity", "class": "bin",
         "prediction": {"cat": ["moderate", "severe"], "prob": [0.5, 0.5]}},
        {"location": "location3", "target": "Season peak week", "class": "sample",
         "prediction": {"sample": ["2020-01-05", "2019-12-15"]}},
        {"location": "location3", "target": "above baseline", "class": "point",
         "prediction": {"value": true}}
    ])
}

pub fn sqlite_config(base: &Path) -> AugurConfig {
    AugurConfig::default_sqlite(base.join("augur.sqlite").to_string_lossy())
}

pub async fn open(base: &Path) -> AugurResult<AugurStore> {
    AugurStore::connect(&sqlite_config(base), base).await
}

pub async fn open_with(
    base: &Path,
    failpoints: &[&str],
    max_insert_batch: Option<usize>,
) -> AugurResult<AugurStore> {
    let mut config = sqlite_config(base);
    config.failpoints = Some(failpoints.iter().map(|key| key.to_string()).collect());
    if let Some(batch) = max_insert_batch {
        config.limits = Some(LimitsConfig {
            max_insert_batch: Some(batch),
        });
    }
    AugurStore::connect(&config, base).await
}

/// Provisions the fixture project with one model and a forecast at 2011-10-02.
pub async fn seeded(store: &AugurStore) -> AugurResult<(ProjectId, ForecastId)> {
    let project = store.create_project(&project_config()).await?;
    let model = store
        .create_model(
            project,
            CreateModelInput {
                name: "docs forecast model".to_string(),
                abbreviation: "docs_mod".to_string(),
            },
        )
        .await?;
    let forecast = store
        .create_forecast(CreateForecastInput {
            model,
            timezero_date: date!(2011 - 10 - 02),
            source: "docs-predictions.json".to_string(),
            notes: Some("a small prediction file".to_string()),
        })
        .await?;
    Ok((project, forecast))
}
