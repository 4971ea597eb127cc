use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(AugurProjects::Table)
                    .if_not_exists()
                    .col(id_col(backend, AugurProjects::ProjectId))
                    .col(ColumnDef::new(AugurProjects::Name).string().not_null())
                    .col(ColumnDef::new(AugurProjects::IsPublic).boolean().not_null())
                    .col(ColumnDef::new(AugurProjects::Description).text().not_null())
                    .col(ColumnDef::new(AugurProjects::HomeUrl).string())
                    .col(ColumnDef::new(AugurProjects::LogoUrl).string())
                    .col(ColumnDef::new(AugurProjects::CoreData).string())
                    .col(
                        ColumnDef::new(AugurProjects::TimeIntervalType)
                            .small_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AugurProjects::VisualizationYLabel).string())
                    .primary_key(
                        Index::create()
                            .name("pk_augur_projects")
                            .col(AugurProjects::ProjectId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AugurLocations::Table)
                    .if_not_exists()
                    .col(id_col(backend, AugurLocations::LocationId))
                    .col(id_col(backend, AugurLocations::ProjectId))
                    .col(ColumnDef::new(AugurLocations::Name).string().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_augur_locations")
                            .col(AugurLocations::LocationId),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_augur_locations_project_name")
                    .table(AugurLocations::Table)
                    .col(AugurLocations::ProjectId)
                    .col(AugurLocations::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AugurTargets::Table)
                    .if_not_exists()
                    .col(id_col(backend, AugurTargets::TargetId))
                    .col(id_col(backend, AugurTargets::ProjectId))
                    .col(ColumnDef::new(AugurTargets::Name).string().not_null())
                    .col(
                        ColumnDef::new(AugurTargets::TargetType)
                            .small_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AugurTargets::Description).text().not_null())
                    .col(ColumnDef::new(AugurTargets::IsStepAhead).boolean().not_null())
                    .col(ColumnDef::new(AugurTargets::StepAheadIncrement).big_integer())
                    .col(ColumnDef::new(AugurTargets::Unit).string())
                    .primary_key(
                        Index::create()
                            .name("pk_augur_targets")
                            .col(AugurTargets::TargetId),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_augur_targets_project_name")
                    .table(AugurTargets::Table)
                    .col(AugurTargets::ProjectId)
                    .col(AugurTargets::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AugurTargetCats::Table)
                    .if_not_exists()
                    .col(seq_col(AugurTargetCats::Seq))
                    .col(id_col(backend, AugurTargetCats::TargetId))
                    .col(ColumnDef::new(AugurTargetCats::CatI).big_integer())
                    .col(ColumnDef::new(AugurTargetCats::CatF).double())
                    .col(ColumnDef::new(AugurTargetCats::CatT).text())
                    .col(ColumnDef::new(AugurTargetCats::CatD).string_len(10))
                    .col(ColumnDef::new(AugurTargetCats::CatB).boolean())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_augur_target_cats_target")
                    .table(AugurTargetCats::Table)
                    .col(AugurTargetCats::TargetId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AugurTargetRanges::Table)
                    .if_not_exists()
                    .col(seq_col(AugurTargetRanges::Seq))
                    .col(id_col(backend, AugurTargetRanges::TargetId))
                    .col(ColumnDef::new(AugurTargetRanges::ValueI).big_integer())
                    .col(ColumnDef::new(AugurTargetRanges::ValueF).double())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AugurTimezeros::Table)
                    .if_not_exists()
                    .col(id_col(backend, AugurTimezeros::TimezeroId))
                    .col(id_col(backend, AugurTimezeros::ProjectId))
                    .col(
                        ColumnDef::new(AugurTimezeros::TimezeroDate)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AugurTimezeros::DataVersionDate).string_len(10))
                    .col(
                        ColumnDef::new(AugurTimezeros::IsSeasonStart)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AugurTimezeros::SeasonName).string())
                    .primary_key(
                        Index::create()
                            .name("pk_augur_timezeros")
                            .col(AugurTimezeros::TimezeroId),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_augur_timezeros_project_date")
                    .table(AugurTimezeros::Table)
                    .col(AugurTimezeros::ProjectId)
                    .col(AugurTimezeros::TimezeroDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AugurModels::Table)
                    .if_not_exists()
                    .col(id_col(backend, AugurModels::ModelId))
                    .col(id_col(backend, AugurModels::ProjectId))
                    .col(ColumnDef::new(AugurModels::Name).string().not_null())
                    .col(ColumnDef::new(AugurModels::Abbreviation).string().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_augur_models")
                            .col(AugurModels::ModelId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AugurForecasts::Table)
                    .if_not_exists()
                    .col(id_col(backend, AugurForecasts::ForecastId))
                    .col(id_col(backend, AugurForecasts::ModelId))
                    .col(id_col(backend, AugurForecasts::TimezeroId))
                    .col(ColumnDef::new(AugurForecasts::Source).string().not_null())
                    .col(ColumnDef::new(AugurForecasts::Notes).text())
                    .primary_key(
                        Index::create()
                            .name("pk_augur_forecasts")
                            .col(AugurForecasts::ForecastId),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_augur_forecasts_timezero")
                    .table(AugurForecasts::Table)
                    .col(AugurForecasts::TimezeroId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                prediction_table(backend, AugurPointPredictions::Table)
                    .col(ColumnDef::new(AugurPointPredictions::ValueI).big_integer())
                    .col(ColumnDef::new(AugurPointPredictions::ValueF).double())
                    .col(ColumnDef::new(AugurPointPredictions::ValueT).text())
                    .col(ColumnDef::new(AugurPointPredictions::ValueD).string_len(10))
                    .col(ColumnDef::new(AugurPointPredictions::ValueB).boolean())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                prediction_table(backend, AugurNamedDistributions::Table)
                    .col(
                        ColumnDef::new(AugurNamedDistributions::Family)
                            .small_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AugurNamedDistributions::Param1).double())
                    .col(ColumnDef::new(AugurNamedDistributions::Param2).double())
                    .col(ColumnDef::new(AugurNamedDistributions::Param3).double())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                prediction_table(backend, AugurBinDistributions::Table)
                    .col(
                        ColumnDef::new(AugurBinDistributions::Prob)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AugurBinDistributions::CatI).big_integer())
                    .col(ColumnDef::new(AugurBinDistributions::CatF).double())
                    .col(ColumnDef::new(AugurBinDistributions::CatT).text())
                    .col(ColumnDef::new(AugurBinDistributions::CatD).string_len(10))
                    .col(ColumnDef::new(AugurBinDistributions::CatB).boolean())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                prediction_table(backend, AugurSampleDistributions::Table)
                    .col(ColumnDef::new(AugurSampleDistributions::SampleI).big_integer())
                    .col(ColumnDef::new(AugurSampleDistributions::SampleF).double())
                    .col(ColumnDef::new(AugurSampleDistributions::SampleT).text())
                    .col(ColumnDef::new(AugurSampleDistributions::SampleD).string_len(10))
                    .col(ColumnDef::new(AugurSampleDistributions::SampleB).boolean())
                    .to_owned(),
            )
            .await?;

        for kind in PREDICTION_TABLES {
            for (suffix, column) in [
                ("forecast", PredictionCol::ForecastId),
                ("location", PredictionCol::LocationId),
                ("target", PredictionCol::TargetId),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .name(format!("idx_{}_{suffix}", kind.name()))
                            .table(kind.table())
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }
        }

        manager
            .create_table(
                Table::create()
                    .table(AugurTruthRows::Table)
                    .if_not_exists()
                    .col(seq_col(AugurTruthRows::Seq))
                    .col(id_col(backend, AugurTruthRows::TimezeroId))
                    .col(id_col(backend, AugurTruthRows::LocationId))
                    .col(id_col(backend, AugurTruthRows::TargetId))
                    .col(ColumnDef::new(AugurTruthRows::ValueI).big_integer())
                    .col(ColumnDef::new(AugurTruthRows::ValueF).double())
                    .col(ColumnDef::new(AugurTruthRows::ValueT).text())
                    .col(ColumnDef::new(AugurTruthRows::ValueD).string_len(10))
                    .col(ColumnDef::new(AugurTruthRows::ValueB).boolean())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut tables = vec![AugurTruthRows::Table.into_iden()];
        tables.extend(PREDICTION_TABLES.iter().map(|kind| kind.table()));
        tables.extend([
            AugurForecasts::Table.into_iden(),
            AugurModels::Table.into_iden(),
            AugurTimezeros::Table.into_iden(),
            AugurTargetRanges::Table.into_iden(),
            AugurTargetCats::Table.into_iden(),
            AugurTargets::Table.into_iden(),
            AugurLocations::Table.into_iden(),
            AugurProjects::Table.into_iden(),
        ]);
        for table in tables {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

fn prediction_table(backend: DatabaseBackend, table: impl IntoIden) -> TableCreateStatement {
    Table::create()
        .table(table)
        .if_not_exists()
        .col(seq_col(PredictionCol::Seq))
        .col(id_col(backend, PredictionCol::ForecastId))
        .col(id_col(backend, PredictionCol::LocationId))
        .col(id_col(backend, PredictionCol::TargetId))
        .to_owned()
}

fn seq_col(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col)
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn id_col(backend: DatabaseBackend, col: impl Iden + 'static) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Postgres => {
            col_def.uuid();
        }
        DatabaseBackend::MySql => {
            col_def.binary_len(16);
        }
        DatabaseBackend::Sqlite => {
            col_def.string_len(36);
        }
        _ => {
            col_def.string_len(36);
        }
    }
    col_def.not_null().to_owned()
}
