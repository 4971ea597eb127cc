use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::Date;

use crate::diff::{Change, ChangeImpact};
use crate::export::ForecastInfo;
use crate::prediction::NormalizedRows;
use crate::project::ProjectConfig;
use crate::validate::ProjectSchema;
use crate::{AugurResult, ForecastId, ModelId, ProjectId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateModelInput {
    pub name: String,
    pub abbreviation: String,
}

#[derive(Clone, Debug)]
pub struct CreateForecastInput {
    pub model: ModelId,
    pub timezero_date: Date,
    pub source: String,
    pub notes: Option<String>,
}

/// Rows written by one forecast load, per class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub bin_rows: u64,
    pub named_rows: u64,
    pub point_rows: u64,
    pub sample_rows: u64,
}

impl LoadSummary {
    pub fn from_rows(rows: &NormalizedRows) -> Self {
        Self {
            bin_rows: rows.bin_rows.len() as u64,
            named_rows: rows.named_rows.len() as u64,
            point_rows: rows.point_rows.len() as u64,
            sample_rows: rows.sample_rows.len() as u64,
        }
    }
}

/// One observed value. `value` is a legacy scalar, so "NA" and "none" are stored as missing.
#[derive(Clone, Debug)]
pub struct TruthInput {
    pub timezero_date: Date,
    pub location: String,
    pub target: String,
    pub value: String,
}

#[async_trait]
pub trait ProjectApi {
    async fn create_project(&self, config: &ProjectConfig) -> AugurResult<ProjectId>;

    async fn project_config(&self, project: ProjectId) -> AugurResult<ProjectConfig>;

    async fn project_schema(&self, project: ProjectId) -> AugurResult<ProjectSchema>;
}

#[async_trait]
pub trait ForecastApi {
    async fn create_model(&self, project: ProjectId, input: CreateModelInput)
    -> AugurResult<ModelId>;

    async fn create_forecast(&self, input: CreateForecastInput) -> AugurResult<ForecastId>;

    /// Validates `document` against the forecast's project and loads it in one transaction.
    async fn load_predictions(
        &self,
        forecast: ForecastId,
        document: &JsonValue,
        validate_cats: bool,
    ) -> AugurResult<LoadSummary>;

    /// Bulk-inserts already validated rows in one transaction.
    async fn load_rows(&self, forecast: ForecastId, rows: &NormalizedRows)
    -> AugurResult<LoadSummary>;

    async fn forecast_info(&self, forecast: ForecastId) -> AugurResult<ForecastInfo>;

    async fn forecast_rows(&self, forecast: ForecastId) -> AugurResult<NormalizedRows>;

    async fn export_forecast(&self, forecast: ForecastId) -> AugurResult<JsonValue>;
}

#[async_trait]
pub trait TruthApi {
    async fn load_truth(&self, project: ProjectId, rows: &[TruthInput]) -> AugurResult<u64>;
}

#[async_trait]
pub trait ConfigEditApi {
    /// Dependent row counts for each object-removed change. Read-only.
    async fn impact(&self, project: ProjectId, changes: &[Change])
    -> AugurResult<Vec<ChangeImpact>>;

    /// Orders `changes` and applies them in a single transaction.
    async fn execute(&self, project: ProjectId, changes: Vec<Change>) -> AugurResult<()>;
}
