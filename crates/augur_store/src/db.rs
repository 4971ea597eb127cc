use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum AugurProjects {
    Table,
    ProjectId,
    Name,
    IsPublic,
    Description,
    HomeUrl,
    LogoUrl,
    CoreData,
    TimeIntervalType,
    VisualizationYLabel,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurLocations {
    Table,
    LocationId,
    ProjectId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurTargets {
    Table,
    TargetId,
    ProjectId,
    Name,
    TargetType,
    Description,
    IsStepAhead,
    StepAheadIncrement,
    Unit,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurTargetCats {
    Table,
    Seq,
    TargetId,
    CatI,
    CatF,
    CatT,
    CatD,
    CatB,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurTargetRanges {
    Table,
    Seq,
    TargetId,
    ValueI,
    ValueF,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurTimezeros {
    Table,
    TimezeroId,
    ProjectId,
    TimezeroDate,
    DataVersionDate,
    IsSeasonStart,
    SeasonName,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurModels {
    Table,
    ModelId,
    ProjectId,
    Name,
    Abbreviation,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurForecasts {
    Table,
    ForecastId,
    ModelId,
    TimezeroId,
    Source,
    Notes,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurPointPredictions {
    Table,
    ValueI,
    ValueF,
    ValueT,
    ValueD,
    ValueB,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurNamedDistributions {
    Table,
    Family,
    Param1,
    Param2,
    Param3,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurBinDistributions {
    Table,
    Prob,
    CatI,
    CatF,
    CatT,
    CatD,
    CatB,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurSampleDistributions {
    Table,
    SampleI,
    SampleF,
    SampleT,
    SampleD,
    SampleB,
}

/// Columns shared by every prediction row table.
#[derive(Iden, Clone, Copy)]
pub enum PredictionCol {
    Seq,
    ForecastId,
    LocationId,
    TargetId,
}

#[derive(Iden, Clone, Copy)]
pub enum AugurTruthRows {
    Table,
    Seq,
    TimezeroId,
    LocationId,
    TargetId,
    ValueI,
    ValueF,
    ValueT,
    ValueD,
    ValueB,
}

#[derive(Clone, Copy, Debug)]
pub enum PredictionTable {
    Point,
    Named,
    Bin,
    Sample,
}

pub const PREDICTION_TABLES: [PredictionTable; 4] = [
    PredictionTable::Point,
    PredictionTable::Named,
    PredictionTable::Bin,
    PredictionTable::Sample,
];

impl PredictionTable {
    pub fn name(self) -> &'static str {
        match self {
            PredictionTable::Point => "augur_point_predictions",
            PredictionTable::Named => "augur_named_distributions",
            PredictionTable::Bin => "augur_bin_distributions",
            PredictionTable::Sample => "augur_sample_distributions",
        }
    }

    pub fn table(self) -> sea_query::DynIden {
        use sea_query::IntoIden;
        match self {
            PredictionTable::Point => AugurPointPredictions::Table.into_iden(),
            PredictionTable::Named => AugurNamedDistributions::Table.into_iden(),
            PredictionTable::Bin => AugurBinDistributions::Table.into_iden(),
            PredictionTable::Sample => AugurSampleDistributions::Table.into_iden(),
        }
    }
}
