use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query;
use sea_orm::sea_query::{
    Alias, DynIden, Expr, ExprTrait, Func, IntoIden, MysqlQueryBuilder, Order,
    PostgresQueryBuilder, Query, QueryStatementWriter, SelectStatement, SqliteQueryBuilder,
    Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use serde_json::Value as JsonValue;
use time::Date;
use uuid::Uuid;

use crate::db::*;
use crate::migration::Migrator;
use crate::{AugurConfig, DatabaseConfig};
use augur_core::{
    AugurError, AugurResult, BinRow, Change, ChangeDocument, ChangeImpact, ChangeType,
    ConfigEditApi, CreateForecastInput, CreateModelInput, DataType, Family, ForecastApi,
    ForecastId, ForecastInfo, Id, LoadSummary, LocationConfig, ModelId, NamedRow,
    NormalizedRows, ObjectType, PointRow, ProjectApi, ProjectConfig, ProjectId, ProjectSchema,
    SampleRow, Target, TargetConfig, TargetRegistry, TargetType, TimeIntervalType,
    TimeZeroConfig, TruthApi, TruthInput, TypedSlots, TypedValue, export_document, format_date,
    from_typed, order, parse_date, parse_value, to_typed, validate_and_normalize,
};

pub const FAILPOINT_LOAD_AFTER_BINS: &str = "load_rows.after_bins";
pub const FAILPOINT_TRUTH_BEFORE_COMMIT: &str = "load_truth.before_commit";
pub const FAILPOINT_EXECUTE_BEFORE_COMMIT: &str = "execute.before_commit";

#[derive(Clone)]
pub struct AugurStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    limits: StoreLimits,
    validate_cats: bool,
    failpoints: HashSet<String>,
}

#[derive(Clone, Copy, Debug)]
struct StoreLimits {
    max_insert_batch: usize,
}

impl StoreLimits {
    fn from_config(config: &AugurConfig) -> Self {
        Self {
            max_insert_batch: config.max_insert_batch(),
        }
    }
}

/// Stored forecast joined with its model and timezero.
#[derive(Clone, Debug)]
struct ForecastRecord {
    project: ProjectId,
    model: String,
    timezero_date: Date,
    source: String,
    notes: Option<String>,
}

/// Rows depending on one location, target or timezero.
#[derive(Clone, Copy, Debug)]
enum Dependents {
    Location(Id),
    Target(Id),
    Timezero(Id),
}

impl AugurStore {
    pub async fn connect(config: &AugurConfig, base_dir: &Path) -> AugurResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        options.sqlx_logging(false);
        let conn = Database::connect(options).await.map_err(AugurError::from)?;
        let backend = conn.get_database_backend();
        let failpoints = config
            .failpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();
        let store = Self {
            conn,
            backend,
            limits: StoreLimits::from_config(config),
            validate_cats: config.validate_cats(),
            failpoints,
        };
        Migrator::up(&store.conn, None)
            .await
            .map_err(AugurError::from)?;
        log::info!(
            "connected to {} datastore; migrations applied",
            config.backend_name()
        );
        Ok(store)
    }

    pub async fn connect_sqlite(path: &Path) -> AugurResult<Self> {
        let config = AugurConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    fn maybe_failpoint(&self, key: &str) -> AugurResult<()> {
        if self.failpoints.contains(key) {
            Err(AugurError::storage(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    async fn require_project<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
    ) -> AugurResult<()> {
        let select = Query::select()
            .column(AugurProjects::ProjectId)
            .from(AugurProjects::Table)
            .and_where(Expr::col(AugurProjects::ProjectId).eq(id_value(self.backend, project.0)))
            .to_owned();
        match query_one(conn, &select).await? {
            Some(_) => Ok(()),
            None => Err(AugurError::not_found(format!("project {project} not found"))),
        }
    }

    async fn insert_location<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
        location: &LocationConfig,
    ) -> AugurResult<()> {
        let insert = Query::insert()
            .into_table(AugurLocations::Table)
            .columns([
                AugurLocations::LocationId,
                AugurLocations::ProjectId,
                AugurLocations::Name,
            ])
            .values_panic([
                id_value(self.backend, Id::new()).into(),
                id_value(self.backend, project.0).into(),
                location.name.clone().into(),
            ])
            .to_owned();
        exec(conn, &insert).await
    }

    async fn insert_target<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
        target: &Target,
    ) -> AugurResult<()> {
        let target_id = Id::new();
        let insert = Query::insert()
            .into_table(AugurTargets::Table)
            .columns([
                AugurTargets::TargetId,
                AugurTargets::ProjectId,
                AugurTargets::Name,
                AugurTargets::TargetType,
                AugurTargets::Description,
                AugurTargets::IsStepAhead,
                AugurTargets::StepAheadIncrement,
                AugurTargets::Unit,
            ])
            .values_panic([
                id_value(self.backend, target_id).into(),
                id_value(self.backend, project.0).into(),
                target.name.clone().into(),
                (target.target_type.as_i16() as i64).into(),
                target.description.clone().into(),
                target.is_step_ahead.into(),
                SeaValue::BigInt(target.step_ahead_increment).into(),
                SeaValue::String(target.unit.clone()).into(),
            ])
            .to_owned();
        exec(conn, &insert).await?;

        let cat_rows = target
            .declared_cats()
            .into_iter()
            .map(|cat| {
                let mut row = vec![id_value(self.backend, target_id)];
                row.extend(slot_values(&TypedSlots::from_value(cat)));
                row
            })
            .collect::<Vec<_>>();
        self.insert_rows(
            conn,
            AugurTargetCats::Table.into_iden(),
            &[
                AugurTargetCats::TargetId.into_iden(),
                AugurTargetCats::CatI.into_iden(),
                AugurTargetCats::CatF.into_iden(),
                AugurTargetCats::CatT.into_iden(),
                AugurTargetCats::CatD.into_iden(),
                AugurTargetCats::CatB.into_iden(),
            ],
            &cat_rows,
        )
        .await?;

        if let Some((lo, hi)) = &target.range {
            let range_rows = [lo, hi]
                .into_iter()
                .map(|bound| {
                    let slots = TypedSlots::from_value(bound.clone());
                    vec![
                        id_value(self.backend, target_id),
                        SeaValue::BigInt(slots.i),
                        SeaValue::Double(slots.f),
                    ]
                })
                .collect::<Vec<_>>();
            self.insert_rows(
                conn,
                AugurTargetRanges::Table.into_iden(),
                &[
                    AugurTargetRanges::TargetId.into_iden(),
                    AugurTargetRanges::ValueI.into_iden(),
                    AugurTargetRanges::ValueF.into_iden(),
                ],
                &range_rows,
            )
            .await?;
        }
        Ok(())
    }

    async fn insert_timezero<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
        timezero: &TimeZeroConfig,
    ) -> AugurResult<()> {
        let insert = Query::insert()
            .into_table(AugurTimezeros::Table)
            .columns([
                AugurTimezeros::TimezeroId,
                AugurTimezeros::ProjectId,
                AugurTimezeros::TimezeroDate,
                AugurTimezeros::DataVersionDate,
                AugurTimezeros::IsSeasonStart,
                AugurTimezeros::SeasonName,
            ])
            .values_panic([
                id_value(self.backend, Id::new()).into(),
                id_value(self.backend, project.0).into(),
                format_date(timezero.timezero_date).into(),
                SeaValue::String(timezero.data_version_date.map(format_date)).into(),
                timezero.is_season_start.into(),
                SeaValue::String(timezero.season_name.clone()).into(),
            ])
            .to_owned();
        exec(conn, &insert).await
    }

    /// Multi-row inserts of at most `max_insert_batch` rows each.
    async fn insert_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        table: DynIden,
        columns: &[DynIden],
        rows: &[Vec<SeaValue>],
    ) -> AugurResult<()> {
        for chunk in rows.chunks(self.limits.max_insert_batch) {
            let mut insert = Query::insert();
            insert
                .into_table(table.clone())
                .columns(columns.iter().cloned());
            for row in chunk {
                insert.values_panic(row.iter().cloned().map(Into::into));
            }
            exec(conn, &insert).await?;
        }
        Ok(())
    }

    async fn name_ids<C, T>(
        &self,
        conn: &C,
        project: ProjectId,
        table: T,
        id_column: T,
        project_column: T,
        name_column: T,
    ) -> AugurResult<HashMap<String, Id>>
    where
        C: ConnectionTrait,
        T: sea_query::Iden + Copy + 'static,
    {
        let select = Query::select()
            .columns([id_column, name_column])
            .from(table)
            .and_where(Expr::col(project_column).eq(id_value(self.backend, project.0)))
            .to_owned();
        let mut ids = HashMap::new();
        for row in query_all(conn, &select).await? {
            let name: String = row.try_get("", &col_name(name_column))?;
            ids.insert(name, read_id(&row, id_column)?);
        }
        Ok(ids)
    }

    async fn location_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
    ) -> AugurResult<HashMap<String, Id>> {
        self.name_ids(
            conn,
            project,
            AugurLocations::Table,
            AugurLocations::LocationId,
            AugurLocations::ProjectId,
            AugurLocations::Name,
        )
        .await
    }

    async fn target_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
    ) -> AugurResult<HashMap<String, Id>> {
        self.name_ids(
            conn,
            project,
            AugurTargets::Table,
            AugurTargets::TargetId,
            AugurTargets::ProjectId,
            AugurTargets::Name,
        )
        .await
    }

    /// Timezero ids keyed by `YYYY-MM-DD`.
    async fn timezero_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
    ) -> AugurResult<HashMap<String, Id>> {
        self.name_ids(
            conn,
            project,
            AugurTimezeros::Table,
            AugurTimezeros::TimezeroId,
            AugurTimezeros::ProjectId,
            AugurTimezeros::TimezeroDate,
        )
        .await
    }

    async fn read_locations<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
    ) -> AugurResult<Vec<String>> {
        let select = Query::select()
            .column(AugurLocations::Name)
            .from(AugurLocations::Table)
            .and_where(Expr::col(AugurLocations::ProjectId).eq(id_value(self.backend, project.0)))
            .order_by(AugurLocations::Name, Order::Asc)
            .to_owned();
        let mut names = Vec::new();
        for row in query_all(conn, &select).await? {
            names.push(row.try_get::<String>("", &col_name(AugurLocations::Name))?);
        }
        Ok(names)
    }

    async fn read_targets<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
    ) -> AugurResult<Vec<Target>> {
        let select = Query::select()
            .columns([
                AugurTargets::TargetId,
                AugurTargets::Name,
                AugurTargets::TargetType,
                AugurTargets::Description,
                AugurTargets::IsStepAhead,
                AugurTargets::StepAheadIncrement,
                AugurTargets::Unit,
            ])
            .from(AugurTargets::Table)
            .and_where(Expr::col(AugurTargets::ProjectId).eq(id_value(self.backend, project.0)))
            .order_by(AugurTargets::Name, Order::Asc)
            .to_owned();
        let mut ids = Vec::new();
        let mut targets = Vec::new();
        for row in query_all(conn, &select).await? {
            let code: i64 = row.try_get("", &col_name(AugurTargets::TargetType))?;
            let target_type = i16::try_from(code)
                .ok()
                .and_then(TargetType::from_i16)
                .ok_or_else(|| AugurError::storage(format!("invalid target type code {code}")))?;
            ids.push(read_id(&row, AugurTargets::TargetId)?);
            targets.push(Target {
                name: row.try_get("", &col_name(AugurTargets::Name))?,
                target_type,
                description: row.try_get("", &col_name(AugurTargets::Description))?,
                is_step_ahead: row.try_get("", &col_name(AugurTargets::IsStepAhead))?,
                step_ahead_increment: row
                    .try_get("", &col_name(AugurTargets::StepAheadIncrement))?,
                unit: row.try_get("", &col_name(AugurTargets::Unit))?,
                range: None,
                cats: Vec::new(),
            });
        }
        if targets.is_empty() {
            return Ok(targets);
        }
        let index = ids
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect::<HashMap<_, _>>();

        let select = Query::select()
            .columns([
                AugurTargetCats::TargetId,
                AugurTargetCats::CatI,
                AugurTargetCats::CatF,
                AugurTargetCats::CatT,
                AugurTargetCats::CatD,
                AugurTargetCats::CatB,
            ])
            .from(AugurTargetCats::Table)
            .and_where(
                Expr::col(AugurTargetCats::TargetId)
                    .is_in(ids.iter().map(|id| id_value(self.backend, *id))),
            )
            .order_by(AugurTargetCats::Seq, Order::Asc)
            .to_owned();
        for row in query_all(conn, &select).await? {
            let target_id = read_id(&row, AugurTargetCats::TargetId)?;
            let slots = read_slots(
                &row,
                [
                    AugurTargetCats::CatI,
                    AugurTargetCats::CatF,
                    AugurTargetCats::CatT,
                    AugurTargetCats::CatD,
                    AugurTargetCats::CatB,
                ],
            )?;
            if let (Some(position), Some(cat)) = (index.get(&target_id), from_typed(&slots)) {
                targets[*position].cats.push(cat);
            }
        }

        let select = Query::select()
            .columns([
                AugurTargetRanges::TargetId,
                AugurTargetRanges::ValueI,
                AugurTargetRanges::ValueF,
            ])
            .from(AugurTargetRanges::Table)
            .and_where(
                Expr::col(AugurTargetRanges::TargetId)
                    .is_in(ids.iter().map(|id| id_value(self.backend, *id))),
            )
            .order_by(AugurTargetRanges::Seq, Order::Asc)
            .to_owned();
        let mut bounds: HashMap<usize, Vec<TypedValue>> = HashMap::new();
        for row in query_all(conn, &select).await? {
            let target_id = read_id(&row, AugurTargetRanges::TargetId)?;
            let value_i: Option<i64> = row.try_get("", &col_name(AugurTargetRanges::ValueI))?;
            let value_f: Option<f64> = row.try_get("", &col_name(AugurTargetRanges::ValueF))?;
            let value = value_i
                .map(TypedValue::Int)
                .or(value_f.map(TypedValue::Float));
            if let (Some(position), Some(value)) = (index.get(&target_id), value) {
                bounds.entry(*position).or_default().push(value);
            }
        }
        for (position, mut values) in bounds {
            if values.len() != 2 {
                return Err(AugurError::storage(format!(
                    "target {:?} has {} stored range values",
                    targets[position].name,
                    values.len()
                )));
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let hi = values.pop();
            let lo = values.pop();
            targets[position].range = lo.zip(hi);
        }
        Ok(targets)
    }

    async fn read_timezeros<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
    ) -> AugurResult<Vec<TimeZeroConfig>> {
        let select = Query::select()
            .columns([
                AugurTimezeros::TimezeroDate,
                AugurTimezeros::DataVersionDate,
                AugurTimezeros::IsSeasonStart,
                AugurTimezeros::SeasonName,
            ])
            .from(AugurTimezeros::Table)
            .and_where(Expr::col(AugurTimezeros::ProjectId).eq(id_value(self.backend, project.0)))
            .order_by(AugurTimezeros::TimezeroDate, Order::Asc)
            .to_owned();
        let mut timezeros = Vec::new();
        for row in query_all(conn, &select).await? {
            let timezero_date: String = row.try_get("", &col_name(AugurTimezeros::TimezeroDate))?;
            let data_version_date: Option<String> =
                row.try_get("", &col_name(AugurTimezeros::DataVersionDate))?;
            timezeros.push(TimeZeroConfig {
                timezero_date: stored_date(&timezero_date)?,
                data_version_date: data_version_date
                    .as_deref()
                    .map(stored_date)
                    .transpose()?,
                is_season_start: row.try_get("", &col_name(AugurTimezeros::IsSeasonStart))?,
                season_name: row.try_get("", &col_name(AugurTimezeros::SeasonName))?,
            });
        }
        Ok(timezeros)
    }

    async fn read_forecast<C: ConnectionTrait>(
        &self,
        conn: &C,
        forecast: ForecastId,
    ) -> AugurResult<ForecastRecord> {
        let select = Query::select()
            .columns([
                AugurForecasts::ModelId,
                AugurForecasts::TimezeroId,
                AugurForecasts::Source,
                AugurForecasts::Notes,
            ])
            .from(AugurForecasts::Table)
            .and_where(
                Expr::col(AugurForecasts::ForecastId).eq(id_value(self.backend, forecast.0)),
            )
            .to_owned();
        let row = query_one(conn, &select)
            .await?
            .ok_or_else(|| AugurError::not_found(format!("forecast {forecast} not found")))?;
        let model_id = read_id(&row, AugurForecasts::ModelId)?;
        let timezero_id = read_id(&row, AugurForecasts::TimezeroId)?;
        let source: String = row.try_get("", &col_name(AugurForecasts::Source))?;
        let notes: Option<String> = row.try_get("", &col_name(AugurForecasts::Notes))?;

        let select = Query::select()
            .columns([AugurModels::ProjectId, AugurModels::Name])
            .from(AugurModels::Table)
            .and_where(Expr::col(AugurModels::ModelId).eq(id_value(self.backend, model_id)))
            .to_owned();
        let model = query_one(conn, &select)
            .await?
            .ok_or_else(|| AugurError::storage(format!("forecast {forecast} has no model")))?;

        let select = Query::select()
            .column(AugurTimezeros::TimezeroDate)
            .from(AugurTimezeros::Table)
            .and_where(
                Expr::col(AugurTimezeros::TimezeroId).eq(id_value(self.backend, timezero_id)),
            )
            .to_owned();
        let timezero = query_one(conn, &select)
            .await?
            .ok_or_else(|| AugurError::storage(format!("forecast {forecast} has no timezero")))?;
        let timezero_date: String = timezero.try_get("", &col_name(AugurTimezeros::TimezeroDate))?;

        Ok(ForecastRecord {
            project: ProjectId(read_id(&model, AugurModels::ProjectId)?),
            model: model.try_get("", &col_name(AugurModels::Name))?,
            timezero_date: stored_date(&timezero_date)?,
            source,
            notes,
        })
    }

    async fn read_prediction_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        kind: PredictionTable,
        forecast: ForecastId,
        columns: Vec<DynIden>,
    ) -> AugurResult<Vec<QueryResult>> {
        let mut select = Query::select();
        select
            .columns([
                PredictionCol::LocationId.into_iden(),
                PredictionCol::TargetId.into_iden(),
            ])
            .columns(columns)
            .from(kind.table())
            .and_where(
                Expr::col(PredictionCol::ForecastId).eq(id_value(self.backend, forecast.0)),
            )
            .order_by(PredictionCol::Seq, Order::Asc);
        query_all(conn, &select).await
    }

    async fn count_dependents<C: ConnectionTrait>(
        &self,
        conn: &C,
        change: &Change,
        dependents: Dependents,
    ) -> AugurResult<ChangeImpact> {
        let mut counts = [0u64; 4];
        for (slot, kind) in counts.iter_mut().zip(PREDICTION_TABLES) {
            let mut select = Query::select();
            select
                .expr_as(Func::count(Expr::col(PredictionCol::Seq)), Alias::new("cnt"))
                .from(kind.table())
                .cond_where(self.prediction_filter(dependents));
            *slot = read_count(query_one(conn, &select).await?)?;
        }
        let mut select = Query::select();
        select
            .expr_as(Func::count(Expr::col(AugurTruthRows::Seq)), Alias::new("cnt"))
            .from(AugurTruthRows::Table)
            .cond_where(self.truth_filter(dependents));
        let num_truth = read_count(query_one(conn, &select).await?)?;
        let [num_points, num_named, num_bins, num_samples] = counts;
        Ok(ChangeImpact {
            change: change.clone(),
            num_points,
            num_named,
            num_bins,
            num_samples,
            num_truth,
        })
    }

    fn forecasts_at(&self, timezero: Id) -> SelectStatement {
        Query::select()
            .column(AugurForecasts::ForecastId)
            .from(AugurForecasts::Table)
            .and_where(Expr::col(AugurForecasts::TimezeroId).eq(id_value(self.backend, timezero)))
            .to_owned()
    }

    fn prediction_filter(&self, dependents: Dependents) -> sea_query::Condition {
        let expr = match dependents {
            Dependents::Location(id) => {
                Expr::col(PredictionCol::LocationId).eq(id_value(self.backend, id))
            }
            Dependents::Target(id) => {
                Expr::col(PredictionCol::TargetId).eq(id_value(self.backend, id))
            }
            Dependents::Timezero(id) => {
                Expr::col(PredictionCol::ForecastId).in_subquery(self.forecasts_at(id))
            }
        };
        sea_query::Condition::all().add(expr)
    }

    fn truth_filter(&self, dependents: Dependents) -> sea_query::Condition {
        let (column, id) = match dependents {
            Dependents::Location(id) => (AugurTruthRows::LocationId, id),
            Dependents::Target(id) => (AugurTruthRows::TargetId, id),
            Dependents::Timezero(id) => (AugurTruthRows::TimezeroId, id),
        };
        sea_query::Condition::all().add(Expr::col(column).eq(id_value(self.backend, id)))
    }

    async fn dependents_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
        change: &Change,
    ) -> AugurResult<Dependents> {
        let key = change_key(change)?;
        match change.object_type {
            ObjectType::Location => {
                let ids = self.location_ids(conn, project).await?;
                lookup(&ids, key, "location").map(Dependents::Location)
            }
            ObjectType::Target => {
                let ids = self.target_ids(conn, project).await?;
                lookup(&ids, key, "target").map(Dependents::Target)
            }
            ObjectType::TimeZero => {
                let ids = self.timezero_ids(conn, project).await?;
                lookup(&ids, key, "timezero").map(Dependents::Timezero)
            }
            ObjectType::Project => Err(AugurError::invalid_argument(format!(
                "unsupported change: {change}"
            ))),
        }
    }

    /// Deletes every prediction and truth row depending on the object, then the object itself.
    async fn delete_object<C: ConnectionTrait>(
        &self,
        conn: &C,
        dependents: Dependents,
    ) -> AugurResult<()> {
        for kind in PREDICTION_TABLES {
            let delete = Query::delete()
                .from_table(kind.table())
                .cond_where(self.prediction_filter(dependents))
                .to_owned();
            exec(conn, &delete).await?;
        }
        let delete = Query::delete()
            .from_table(AugurTruthRows::Table)
            .cond_where(self.truth_filter(dependents))
            .to_owned();
        exec(conn, &delete).await?;

        match dependents {
            Dependents::Location(id) => {
                let delete = Query::delete()
                    .from_table(AugurLocations::Table)
                    .and_where(Expr::col(AugurLocations::LocationId).eq(id_value(self.backend, id)))
                    .to_owned();
                exec(conn, &delete).await?;
            }
            Dependents::Target(id) => {
                let delete = Query::delete()
                    .from_table(AugurTargetCats::Table)
                    .and_where(Expr::col(AugurTargetCats::TargetId).eq(id_value(self.backend, id)))
                    .to_owned();
                exec(conn, &delete).await?;
                let delete = Query::delete()
                    .from_table(AugurTargetRanges::Table)
                    .and_where(
                        Expr::col(AugurTargetRanges::TargetId).eq(id_value(self.backend, id)),
                    )
                    .to_owned();
                exec(conn, &delete).await?;
                let delete = Query::delete()
                    .from_table(AugurTargets::Table)
                    .and_where(Expr::col(AugurTargets::TargetId).eq(id_value(self.backend, id)))
                    .to_owned();
                exec(conn, &delete).await?;
            }
            Dependents::Timezero(id) => {
                let delete = Query::delete()
                    .from_table(AugurForecasts::Table)
                    .and_where(Expr::col(AugurForecasts::TimezeroId).eq(id_value(self.backend, id)))
                    .to_owned();
                exec(conn, &delete).await?;
                let delete = Query::delete()
                    .from_table(AugurTimezeros::Table)
                    .and_where(Expr::col(AugurTimezeros::TimezeroId).eq(id_value(self.backend, id)))
                    .to_owned();
                exec(conn, &delete).await?;
            }
        }
        Ok(())
    }

    async fn apply_change<C: ConnectionTrait>(
        &self,
        conn: &C,
        project: ProjectId,
        change: &Change,
    ) -> AugurResult<()> {
        match (change.object_type, change.change_type) {
            (ObjectType::Project, ChangeType::FieldEdited) => {
                let Some(ChangeDocument::Project(config)) = &change.document else {
                    return Err(missing_document(change));
                };
                let (column, value) = project_field(config, change_field(change)?)?;
                let update = Query::update()
                    .table(AugurProjects::Table)
                    .values([(column, value.into())])
                    .and_where(
                        Expr::col(AugurProjects::ProjectId).eq(id_value(self.backend, project.0)),
                    )
                    .to_owned();
                exec(conn, &update).await
            }
            (_, ChangeType::ObjectRemoved) => {
                let dependents = self.dependents_of(conn, project, change).await?;
                self.delete_object(conn, dependents).await
            }
            (ObjectType::Location, ChangeType::ObjectAdded) => {
                let Some(ChangeDocument::Location(location)) = &change.document else {
                    return Err(missing_document(change));
                };
                if self
                    .location_ids(conn, project)
                    .await?
                    .contains_key(&location.name)
                {
                    return Err(AugurError::config(format!(
                        "found duplicate location name {:?}",
                        location.name
                    )));
                }
                self.insert_location(conn, project, location).await
            }
            (ObjectType::TimeZero, ChangeType::ObjectAdded) => {
                let Some(ChangeDocument::TimeZero(timezero)) = &change.document else {
                    return Err(missing_document(change));
                };
                timezero.validate()?;
                if self
                    .timezero_ids(conn, project)
                    .await?
                    .contains_key(&timezero.date_key())
                {
                    return Err(AugurError::config(format!(
                        "found duplicate timezero_date {}",
                        timezero.date_key()
                    )));
                }
                self.insert_timezero(conn, project, timezero).await
            }
            (ObjectType::Target, ChangeType::ObjectAdded) => {
                let Some(ChangeDocument::Target(config)) = &change.document else {
                    return Err(missing_document(change));
                };
                let target = config.to_target()?;
                if self
                    .target_ids(conn, project)
                    .await?
                    .contains_key(&target.name)
                {
                    return Err(AugurError::config(format!(
                        "found duplicate target name {:?}",
                        target.name
                    )));
                }
                self.insert_target(conn, project, &target).await
            }
            (ObjectType::TimeZero, ChangeType::FieldEdited) => {
                let Some(ChangeDocument::TimeZero(timezero)) = &change.document else {
                    return Err(missing_document(change));
                };
                timezero.validate()?;
                let ids = self.timezero_ids(conn, project).await?;
                let id = lookup(&ids, change_key(change)?, "timezero")?;
                let (column, value) = match change_field(change)? {
                    "data_version_date" => (
                        AugurTimezeros::DataVersionDate,
                        SeaValue::String(timezero.data_version_date.map(format_date)),
                    ),
                    "is_season_start" => (
                        AugurTimezeros::IsSeasonStart,
                        SeaValue::Bool(Some(timezero.is_season_start)),
                    ),
                    "season_name" => (
                        AugurTimezeros::SeasonName,
                        SeaValue::String(timezero.season_name.clone()),
                    ),
                    _ => return Err(unsupported(change)),
                };
                let update = Query::update()
                    .table(AugurTimezeros::Table)
                    .values([(column, value.into())])
                    .and_where(Expr::col(AugurTimezeros::TimezeroId).eq(id_value(self.backend, id)))
                    .to_owned();
                exec(conn, &update).await
            }
            (ObjectType::Target, ChangeType::FieldEdited | ChangeType::FieldAdded) => {
                let Some(ChangeDocument::Target(config)) = &change.document else {
                    return Err(missing_document(change));
                };
                let target = config.to_target()?;
                let ids = self.target_ids(conn, project).await?;
                let id = lookup(&ids, change_key(change)?, "target")?;
                let (column, value) = match change_field(change)? {
                    "description" => (
                        AugurTargets::Description,
                        SeaValue::String(Some(target.description.clone())),
                    ),
                    "is_step_ahead" => (
                        AugurTargets::IsStepAhead,
                        SeaValue::Bool(Some(target.is_step_ahead)),
                    ),
                    "unit" => (AugurTargets::Unit, SeaValue::String(target.unit.clone())),
                    "step_ahead_increment" => (
                        AugurTargets::StepAheadIncrement,
                        SeaValue::BigInt(target.step_ahead_increment),
                    ),
                    _ => return Err(unsupported(change)),
                };
                let update = Query::update()
                    .table(AugurTargets::Table)
                    .values([(column, value.into())])
                    .and_where(Expr::col(AugurTargets::TargetId).eq(id_value(self.backend, id)))
                    .to_owned();
                exec(conn, &update).await
            }
            (ObjectType::Target, ChangeType::FieldRemoved) => {
                let ids = self.target_ids(conn, project).await?;
                let id = lookup(&ids, change_key(change)?, "target")?;
                let (column, value) = match change_field(change)? {
                    "unit" => (AugurTargets::Unit, SeaValue::String(None)),
                    "step_ahead_increment" => {
                        (AugurTargets::StepAheadIncrement, SeaValue::BigInt(None))
                    }
                    _ => return Err(unsupported(change)),
                };
                let update = Query::update()
                    .table(AugurTargets::Table)
                    .values([(column, value.into())])
                    .and_where(Expr::col(AugurTargets::TargetId).eq(id_value(self.backend, id)))
                    .to_owned();
                exec(conn, &update).await
            }
            _ => Err(unsupported(change)),
        }
    }
}

#[async_trait]
impl ProjectApi for AugurStore {
    async fn create_project(&self, config: &ProjectConfig) -> AugurResult<ProjectId> {
        config.validate()?;
        let targets = config.checked_targets()?;
        let project = ProjectId(Id::new());
        let tx = self.conn.begin().await?;
        let insert = Query::insert()
            .into_table(AugurProjects::Table)
            .columns([
                AugurProjects::ProjectId,
                AugurProjects::Name,
                AugurProjects::IsPublic,
                AugurProjects::Description,
                AugurProjects::HomeUrl,
                AugurProjects::LogoUrl,
                AugurProjects::CoreData,
                AugurProjects::TimeIntervalType,
                AugurProjects::VisualizationYLabel,
            ])
            .values_panic([
                id_value(self.backend, project.0).into(),
                config.name.clone().into(),
                config.is_public.into(),
                config.description.clone().into(),
                SeaValue::String(config.home_url.clone()).into(),
                SeaValue::String(config.logo_url.clone()).into(),
                SeaValue::String(config.core_data.clone()).into(),
                (config.time_interval_type.as_i16() as i64).into(),
                SeaValue::String(config.visualization_y_label.clone()).into(),
            ])
            .to_owned();
        exec(&tx, &insert).await?;
        for location in &config.locations {
            self.insert_location(&tx, project, location).await?;
        }
        for target in &targets {
            self.insert_target(&tx, project, target).await?;
        }
        for timezero in &config.timezeros {
            self.insert_timezero(&tx, project, timezero).await?;
        }
        tx.commit().await?;
        log::info!(
            "created project {project} ({:?}): {} locations, {} targets, {} timezeros",
            config.name,
            config.locations.len(),
            targets.len(),
            config.timezeros.len()
        );
        Ok(project)
    }

    async fn project_config(&self, project: ProjectId) -> AugurResult<ProjectConfig> {
        let select = Query::select()
            .columns([
                AugurProjects::Name,
                AugurProjects::IsPublic,
                AugurProjects::Description,
                AugurProjects::HomeUrl,
                AugurProjects::LogoUrl,
                AugurProjects::CoreData,
                AugurProjects::TimeIntervalType,
                AugurProjects::VisualizationYLabel,
            ])
            .from(AugurProjects::Table)
            .and_where(Expr::col(AugurProjects::ProjectId).eq(id_value(self.backend, project.0)))
            .to_owned();
        let row = query_one(&self.conn, &select)
            .await?
            .ok_or_else(|| AugurError::not_found(format!("project {project} not found")))?;
        let code: i64 = row.try_get("", &col_name(AugurProjects::TimeIntervalType))?;
        let time_interval_type = i16::try_from(code)
            .ok()
            .and_then(TimeIntervalType::from_i16)
            .ok_or_else(|| AugurError::storage(format!("invalid time interval code {code}")))?;
        let locations = self.read_locations(&self.conn, project).await?;
        let targets = self.read_targets(&self.conn, project).await?;
        let timezeros = self.read_timezeros(&self.conn, project).await?;
        let config = ProjectConfig {
            name: row.try_get("", &col_name(AugurProjects::Name))?,
            is_public: row.try_get("", &col_name(AugurProjects::IsPublic))?,
            description: row.try_get("", &col_name(AugurProjects::Description))?,
            home_url: row.try_get("", &col_name(AugurProjects::HomeUrl))?,
            logo_url: row.try_get("", &col_name(AugurProjects::LogoUrl))?,
            core_data: row.try_get("", &col_name(AugurProjects::CoreData))?,
            time_interval_type,
            visualization_y_label: row
                .try_get("", &col_name(AugurProjects::VisualizationYLabel))?,
            locations: locations
                .into_iter()
                .map(|name| LocationConfig { name })
                .collect(),
            targets: targets.iter().map(TargetConfig::from_target).collect(),
            timezeros,
        };
        Ok(config.sorted())
    }

    async fn project_schema(&self, project: ProjectId) -> AugurResult<ProjectSchema> {
        self.require_project(&self.conn, project).await?;
        let locations = self.read_locations(&self.conn, project).await?;
        let targets = self.read_targets(&self.conn, project).await?;
        Ok(ProjectSchema::new(locations, targets))
    }
}

#[async_trait]
impl ForecastApi for AugurStore {
    async fn create_model(
        &self,
        project: ProjectId,
        input: CreateModelInput,
    ) -> AugurResult<ModelId> {
        if input.name.trim().is_empty() {
            return Err(AugurError::invalid_argument("model name must not be empty"));
        }
        self.require_project(&self.conn, project).await?;
        let model = ModelId(Id::new());
        let insert = Query::insert()
            .into_table(AugurModels::Table)
            .columns([
                AugurModels::ModelId,
                AugurModels::ProjectId,
                AugurModels::Name,
                AugurModels::Abbreviation,
            ])
            .values_panic([
                id_value(self.backend, model.0).into(),
                id_value(self.backend, project.0).into(),
                input.name.into(),
                input.abbreviation.into(),
            ])
            .to_owned();
        exec(&self.conn, &insert).await?;
        Ok(model)
    }

    async fn create_forecast(&self, input: CreateForecastInput) -> AugurResult<ForecastId> {
        let select = Query::select()
            .column(AugurModels::ProjectId)
            .from(AugurModels::Table)
            .and_where(Expr::col(AugurModels::ModelId).eq(id_value(self.backend, input.model.0)))
            .to_owned();
        let row = query_one(&self.conn, &select)
            .await?
            .ok_or_else(|| AugurError::not_found(format!("model {} not found", input.model)))?;
        let project = ProjectId(read_id(&row, AugurModels::ProjectId)?);
        let timezeros = self.timezero_ids(&self.conn, project).await?;
        let date_key = format_date(input.timezero_date);
        let timezero = timezeros.get(&date_key).copied().ok_or_else(|| {
            AugurError::not_found(format!("timezero {date_key} not found in project {project}"))
        })?;
        let forecast = ForecastId(Id::new());
        let insert = Query::insert()
            .into_table(AugurForecasts::Table)
            .columns([
                AugurForecasts::ForecastId,
                AugurForecasts::ModelId,
                AugurForecasts::TimezeroId,
                AugurForecasts::Source,
                AugurForecasts::Notes,
            ])
            .values_panic([
                id_value(self.backend, forecast.0).into(),
                id_value(self.backend, input.model.0).into(),
                id_value(self.backend, timezero).into(),
                input.source.into(),
                SeaValue::String(input.notes).into(),
            ])
            .to_owned();
        exec(&self.conn, &insert).await?;
        Ok(forecast)
    }

    async fn load_predictions(
        &self,
        forecast: ForecastId,
        document: &JsonValue,
        validate_cats: bool,
    ) -> AugurResult<LoadSummary> {
        let record = self.read_forecast(&self.conn, forecast).await?;
        let schema = self.project_schema(record.project).await?;
        let validate_cats = validate_cats && self.validate_cats;
        if !validate_cats {
            log::warn!("loading forecast {forecast} without bin category validation");
        }
        let rows = validate_and_normalize(&schema, document, validate_cats)?;
        self.load_rows(forecast, &rows).await
    }

    async fn load_rows(
        &self,
        forecast: ForecastId,
        rows: &NormalizedRows,
    ) -> AugurResult<LoadSummary> {
        let record = self.read_forecast(&self.conn, forecast).await?;
        let locations = self.location_ids(&self.conn, record.project).await?;
        let targets = self.target_ids(&self.conn, record.project).await?;
        let keys = |location: &str, target: &str| -> AugurResult<Vec<SeaValue>> {
            Ok(vec![
                id_value(self.backend, forecast.0),
                id_value(self.backend, lookup(&locations, location, "location")?),
                id_value(self.backend, lookup(&targets, target, "target")?),
            ])
        };

        let mut bin_values = Vec::with_capacity(rows.bin_rows.len());
        for row in &rows.bin_rows {
            let mut values = keys(&row.location, &row.target)?;
            values.push(SeaValue::Double(Some(row.prob)));
            values.extend(slot_values(&TypedSlots::from_value(row.cat.clone())));
            bin_values.push(values);
        }
        let mut named_values = Vec::with_capacity(rows.named_rows.len());
        for row in &rows.named_rows {
            let mut values = keys(&row.location, &row.target)?;
            values.push(SeaValue::BigInt(Some(row.family.as_i16() as i64)));
            values.extend(row.params.iter().map(|param| SeaValue::Double(*param)));
            named_values.push(values);
        }
        let mut point_values = Vec::with_capacity(rows.point_rows.len());
        for row in &rows.point_rows {
            let mut values = keys(&row.location, &row.target)?;
            values.extend(slot_values(&TypedSlots::from_value(row.value.clone())));
            point_values.push(values);
        }
        let mut sample_values = Vec::with_capacity(rows.sample_rows.len());
        for row in &rows.sample_rows {
            let mut values = keys(&row.location, &row.target)?;
            values.extend(slot_values(&TypedSlots::from_value(row.sample.clone())));
            sample_values.push(values);
        }

        let tx = self.conn.begin().await?;
        self.insert_rows(
            &tx,
            PredictionTable::Bin.table(),
            &prediction_columns([
                AugurBinDistributions::Prob,
                AugurBinDistributions::CatI,
                AugurBinDistributions::CatF,
                AugurBinDistributions::CatT,
                AugurBinDistributions::CatD,
                AugurBinDistributions::CatB,
            ]),
            &bin_values,
        )
        .await?;
        self.maybe_failpoint(FAILPOINT_LOAD_AFTER_BINS)?;
        self.insert_rows(
            &tx,
            PredictionTable::Named.table(),
            &prediction_columns([
                AugurNamedDistributions::Family,
                AugurNamedDistributions::Param1,
                AugurNamedDistributions::Param2,
                AugurNamedDistributions::Param3,
            ]),
            &named_values,
        )
        .await?;
        self.insert_rows(
            &tx,
            PredictionTable::Point.table(),
            &prediction_columns([
                AugurPointPredictions::ValueI,
                AugurPointPredictions::ValueF,
                AugurPointPredictions::ValueT,
                AugurPointPredictions::ValueD,
                AugurPointPredictions::ValueB,
            ]),
            &point_values,
        )
        .await?;
        self.insert_rows(
            &tx,
            PredictionTable::Sample.table(),
            &prediction_columns([
                AugurSampleDistributions::SampleI,
                AugurSampleDistributions::SampleF,
                AugurSampleDistributions::SampleT,
                AugurSampleDistributions::SampleD,
                AugurSampleDistributions::SampleB,
            ]),
            &sample_values,
        )
        .await?;
        tx.commit().await?;

        let summary = LoadSummary::from_rows(rows);
        log::info!(
            "loaded forecast {forecast}: {} bin, {} named, {} point, {} sample rows",
            summary.bin_rows,
            summary.named_rows,
            summary.point_rows,
            summary.sample_rows
        );
        Ok(summary)
    }

    async fn forecast_info(&self, forecast: ForecastId) -> AugurResult<ForecastInfo> {
        let record = self.read_forecast(&self.conn, forecast).await?;
        Ok(ForecastInfo {
            id: forecast,
            model: record.model,
            source: record.source,
            timezero_date: record.timezero_date,
            notes: record.notes,
        })
    }

    async fn forecast_rows(&self, forecast: ForecastId) -> AugurResult<NormalizedRows> {
        let record = self.read_forecast(&self.conn, forecast).await?;
        let locations = invert(self.location_ids(&self.conn, record.project).await?);
        let targets = invert(self.target_ids(&self.conn, record.project).await?);
        let names = |row: &QueryResult| -> AugurResult<(String, String)> {
            let location = read_id(row, PredictionCol::LocationId)?;
            let target = read_id(row, PredictionCol::TargetId)?;
            Ok((
                locations
                    .get(&location)
                    .cloned()
                    .ok_or_else(|| AugurError::storage(format!("unknown location id {location}")))?,
                targets
                    .get(&target)
                    .cloned()
                    .ok_or_else(|| AugurError::storage(format!("unknown target id {target}")))?,
            ))
        };
        let mut rows = NormalizedRows::default();

        let bin_slots = [
            AugurBinDistributions::CatI,
            AugurBinDistributions::CatF,
            AugurBinDistributions::CatT,
            AugurBinDistributions::CatD,
            AugurBinDistributions::CatB,
        ];
        let mut bin_columns = vec![AugurBinDistributions::Prob.into_iden()];
        bin_columns.extend(bin_slots.map(IntoIden::into_iden));
        for row in self
            .read_prediction_rows(&self.conn, PredictionTable::Bin, forecast, bin_columns)
            .await?
        {
            let (location, target) = names(&row)?;
            rows.bin_rows.push(BinRow {
                location,
                target,
                cat: stored_value(&read_slots(&row, bin_slots)?)?,
                prob: row.try_get("", &col_name(AugurBinDistributions::Prob))?,
            });
        }

        let named_columns = [
            AugurNamedDistributions::Family,
            AugurNamedDistributions::Param1,
            AugurNamedDistributions::Param2,
            AugurNamedDistributions::Param3,
        ];
        for row in self
            .read_prediction_rows(
                &self.conn,
                PredictionTable::Named,
                forecast,
                named_columns.map(IntoIden::into_iden).to_vec(),
            )
            .await?
        {
            let (location, target) = names(&row)?;
            let code: i64 = row.try_get("", &col_name(AugurNamedDistributions::Family))?;
            let family = i16::try_from(code)
                .ok()
                .and_then(Family::from_i16)
                .ok_or_else(|| AugurError::storage(format!("invalid family code {code}")))?;
            rows.named_rows.push(NamedRow {
                location,
                target,
                family,
                params: [
                    row.try_get("", &col_name(AugurNamedDistributions::Param1))?,
                    row.try_get("", &col_name(AugurNamedDistributions::Param2))?,
                    row.try_get("", &col_name(AugurNamedDistributions::Param3))?,
                ],
            });
        }

        let point_slots = [
            AugurPointPredictions::ValueI,
            AugurPointPredictions::ValueF,
            AugurPointPredictions::ValueT,
            AugurPointPredictions::ValueD,
            AugurPointPredictions::ValueB,
        ];
        for row in self
            .read_prediction_rows(
                &self.conn,
                PredictionTable::Point,
                forecast,
                point_slots.map(IntoIden::into_iden).to_vec(),
            )
            .await?
        {
            let (location, target) = names(&row)?;
            rows.point_rows.push(PointRow {
                location,
                target,
                value: stored_value(&read_slots(&row, point_slots)?)?,
            });
        }

        let sample_slots = [
            AugurSampleDistributions::SampleI,
            AugurSampleDistributions::SampleF,
            AugurSampleDistributions::SampleT,
            AugurSampleDistributions::SampleD,
            AugurSampleDistributions::SampleB,
        ];
        for row in self
            .read_prediction_rows(
                &self.conn,
                PredictionTable::Sample,
                forecast,
                sample_slots.map(IntoIden::into_iden).to_vec(),
            )
            .await?
        {
            let (location, target) = names(&row)?;
            rows.sample_rows.push(SampleRow {
                location,
                target,
                sample: stored_value(&read_slots(&row, sample_slots)?)?,
            });
        }
        Ok(rows)
    }

    async fn export_forecast(&self, forecast: ForecastId) -> AugurResult<JsonValue> {
        let record = self.read_forecast(&self.conn, forecast).await?;
        let targets = TargetRegistry::new(self.read_targets(&self.conn, record.project).await?);
        let rows = self.forecast_rows(forecast).await?;
        let info = ForecastInfo {
            id: forecast,
            model: record.model,
            source: record.source,
            timezero_date: record.timezero_date,
            notes: record.notes,
        };
        Ok(export_document(&info, &targets, &rows))
    }
}

#[async_trait]
impl TruthApi for AugurStore {
    async fn load_truth(&self, project: ProjectId, rows: &[TruthInput]) -> AugurResult<u64> {
        self.require_project(&self.conn, project).await?;
        let timezeros = self.timezero_ids(&self.conn, project).await?;
        let locations = self.location_ids(&self.conn, project).await?;
        let targets = self
            .read_targets(&self.conn, project)
            .await?
            .into_iter()
            .map(|target| (target.name.clone(), target.data_type()))
            .collect::<HashMap<String, DataType>>();
        let target_ids = self.target_ids(&self.conn, project).await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let date_key = format_date(row.timezero_date);
            let data_type = targets
                .get(&row.target)
                .copied()
                .ok_or_else(|| AugurError::not_found(format!("target {:?} not found", row.target)))?;
            let raw = parse_value(&row.value);
            let slots = if JsonValue::is_null(&raw) {
                TypedSlots::default()
            } else {
                to_typed(&raw, data_type)?
            };
            let mut row_values = vec![
                id_value(self.backend, lookup(&timezeros, &date_key, "timezero")?),
                id_value(self.backend, lookup(&locations, &row.location, "location")?),
                id_value(self.backend, lookup(&target_ids, &row.target, "target")?),
            ];
            row_values.extend(slot_values(&slots));
            values.push(row_values);
        }

        let tx = self.conn.begin().await?;
        self.insert_rows(
            &tx,
            AugurTruthRows::Table.into_iden(),
            &[
                AugurTruthRows::TimezeroId.into_iden(),
                AugurTruthRows::LocationId.into_iden(),
                AugurTruthRows::TargetId.into_iden(),
                AugurTruthRows::ValueI.into_iden(),
                AugurTruthRows::ValueF.into_iden(),
                AugurTruthRows::ValueT.into_iden(),
                AugurTruthRows::ValueD.into_iden(),
                AugurTruthRows::ValueB.into_iden(),
            ],
            &values,
        )
        .await?;
        self.maybe_failpoint(FAILPOINT_TRUTH_BEFORE_COMMIT)?;
        tx.commit().await?;
        log::info!("loaded {} truth rows into project {project}", values.len());
        Ok(values.len() as u64)
    }
}

#[async_trait]
impl ConfigEditApi for AugurStore {
    async fn impact(
        &self,
        project: ProjectId,
        changes: &[Change],
    ) -> AugurResult<Vec<ChangeImpact>> {
        self.require_project(&self.conn, project).await?;
        let mut impacts = Vec::new();
        for change in order(changes.to_vec())
            .iter()
            .filter(|change| change.change_type == ChangeType::ObjectRemoved)
        {
            let dependents = self.dependents_of(&self.conn, project, change).await?;
            impacts.push(self.count_dependents(&self.conn, change, dependents).await?);
        }
        Ok(impacts)
    }

    async fn execute(&self, project: ProjectId, changes: Vec<Change>) -> AugurResult<()> {
        let ordered = order(changes);
        let tx = self.conn.begin().await?;
        self.require_project(&tx, project).await?;
        for change in &ordered {
            self.apply_change(&tx, project, change).await?;
            log::debug!("applied change: {change}");
        }
        self.maybe_failpoint(FAILPOINT_EXECUTE_BEFORE_COMMIT)?;
        tx.commit().await?;
        log::info!("applied {} changes to project {project}", ordered.len());
        Ok(())
    }
}

fn project_field(config: &ProjectConfig, field: &str) -> AugurResult<(AugurProjects, SeaValue)> {
    let value = match field {
        "name" => {
            if config.name.trim().is_empty() {
                return Err(AugurError::config("project name must not be empty"));
            }
            (AugurProjects::Name, SeaValue::String(Some(config.name.clone())))
        }
        "is_public" => (AugurProjects::IsPublic, SeaValue::Bool(Some(config.is_public))),
        "description" => (
            AugurProjects::Description,
            SeaValue::String(Some(config.description.clone())),
        ),
        "home_url" => (AugurProjects::HomeUrl, SeaValue::String(config.home_url.clone())),
        "logo_url" => (AugurProjects::LogoUrl, SeaValue::String(config.logo_url.clone())),
        "core_data" => (
            AugurProjects::CoreData,
            SeaValue::String(config.core_data.clone()),
        ),
        "time_interval_type" => (
            AugurProjects::TimeIntervalType,
            SeaValue::BigInt(Some(config.time_interval_type.as_i16() as i64)),
        ),
        "visualization_y_label" => (
            AugurProjects::VisualizationYLabel,
            SeaValue::String(config.visualization_y_label.clone()),
        ),
        other => {
            return Err(AugurError::invalid_argument(format!(
                "unknown project field {other:?}"
            )));
        }
    };
    Ok(value)
}

fn change_key(change: &Change) -> AugurResult<&str> {
    change
        .object_key
        .as_deref()
        .ok_or_else(|| AugurError::invalid_argument(format!("change has no object key: {change}")))
}

fn change_field(change: &Change) -> AugurResult<&str> {
    change
        .field_name
        .as_deref()
        .ok_or_else(|| AugurError::invalid_argument(format!("change has no field name: {change}")))
}

fn missing_document(change: &Change) -> AugurError {
    AugurError::invalid_argument(format!("change has no matching document: {change}"))
}

fn unsupported(change: &Change) -> AugurError {
    AugurError::invalid_argument(format!("unsupported change: {change}"))
}

fn lookup(ids: &HashMap<String, Id>, key: &str, kind: &str) -> AugurResult<Id> {
    ids.get(key)
        .copied()
        .ok_or_else(|| AugurError::not_found(format!("{kind} {key:?} not found")))
}

fn invert(ids: HashMap<String, Id>) -> HashMap<Id, String> {
    ids.into_iter().map(|(name, id)| (id, name)).collect()
}

fn prediction_columns<T: IntoIden>(extra: impl IntoIterator<Item = T>) -> Vec<DynIden> {
    let mut columns = vec![
        PredictionCol::ForecastId.into_iden(),
        PredictionCol::LocationId.into_iden(),
        PredictionCol::TargetId.into_iden(),
    ];
    columns.extend(extra.into_iter().map(IntoIden::into_iden));
    columns
}

fn slot_values(slots: &TypedSlots) -> [SeaValue; 5] {
    [
        SeaValue::BigInt(slots.i),
        SeaValue::Double(slots.f),
        SeaValue::String(slots.t.clone()),
        SeaValue::String(slots.d.map(format_date)),
        SeaValue::Bool(slots.b),
    ]
}

/// Reads the five typed slot columns, given in i, f, t, d, b order.
fn read_slots<T: sea_query::Iden + Copy>(
    row: &QueryResult,
    columns: [T; 5],
) -> AugurResult<TypedSlots> {
    let [i, f, t, d, b] = columns;
    let date: Option<String> = row.try_get("", &col_name(d))?;
    Ok(TypedSlots {
        i: row.try_get("", &col_name(i))?,
        f: row.try_get("", &col_name(f))?,
        t: row.try_get("", &col_name(t))?,
        d: date.as_deref().map(stored_date).transpose()?,
        b: row.try_get("", &col_name(b))?,
    })
}

fn stored_value(slots: &TypedSlots) -> AugurResult<TypedValue> {
    from_typed(slots).ok_or_else(|| AugurError::storage("stored prediction value is null"))
}

fn stored_date(raw: &str) -> AugurResult<Date> {
    parse_date(raw).ok_or_else(|| AugurError::storage(format!("invalid stored date {raw:?}")))
}

fn read_count(row: Option<QueryResult>) -> AugurResult<u64> {
    let Some(row) = row else {
        return Ok(0);
    };
    let count: i64 = row.try_get("", "cnt")?;
    Ok(Ord::max(count, 0) as u64)
}

fn id_value(backend: DatabaseBackend, id: Id) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => {
            let uuid = Uuid::from_bytes(id.as_bytes());
            SeaValue::Uuid(Some(uuid))
        }
        DatabaseBackend::MySql => SeaValue::Bytes(Some(id.as_vec())),
        DatabaseBackend::Sqlite => SeaValue::String(Some(id.to_uuid_string())),
        _ => SeaValue::String(Some(id.to_uuid_string())),
    }
}

fn bytes_to_id(bytes: Vec<u8>) -> Option<Id> {
    if bytes.len() == 16 {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes);
        Some(Id::from_bytes(buf))
    } else {
        None
    }
}

fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> AugurResult<Id> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<String>("", &name) {
        return Id::from_uuid_str(&value);
    }
    if let Ok(value) = row.try_get::<Uuid>("", &name) {
        return Ok(Id::from_bytes(*value.as_bytes()));
    }
    if let Ok(value) = row.try_get::<Vec<u8>>("", &name) {
        return bytes_to_id(value).ok_or_else(|| AugurError::storage("invalid id length"));
    }
    Err(AugurError::storage("unsupported id format"))
}

fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> AugurResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    conn.execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> AugurResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> AugurResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

fn build_connection_url(config: &AugurConfig, base_dir: &Path) -> AugurResult<String> {
    match &config.database {
        DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } => Ok(url.clone()),
        DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}
