use std::collections::HashSet;

use augur_store::{AugurConfig, AugurError, AugurResult, AugurStore};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::tempdir;

async fn list_tables(store: &AugurStore) -> AugurResult<HashSet<String>> {
    let rows = store
        .connection()
        .query_all_raw(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'table'",
        ))
        .await
        .map_err(AugurError::from)?;
    let mut tables = HashSet::new();
    for row in rows {
        let name: String = row.try_get("", "name").map_err(AugurError::from)?;
        tables.insert(name);
    }
    Ok(tables)
}

#[tokio::test]
async fn sqlite_migrations_create_all_tables() -> AugurResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = AugurConfig::default_sqlite(base.join("augur.sqlite").to_string_lossy());
    let store = AugurStore::connect(&config, base).await?;
    let tables = list_tables(&store).await?;
    for table in [
        "augur_projects",
        "augur_locations",
        "augur_targets",
        "augur_target_cats",
        "augur_target_ranges",
        "augur_timezeros",
        "augur_models",
        "augur_forecasts",
        "augur_point_predictions",
        "augur_named_distributions",
        "augur_bin_distributions",
        "augur_sample_distributions",
        "augur_truth_rows",
    ] {
        assert!(tables.contains(table), "missing table {table}");
    }
    Ok(())
}

#[tokio::test]
async fn reconnecting_reapplies_nothing() -> AugurResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = AugurConfig::default_sqlite(base.join("augur.sqlite").to_string_lossy());
    let first = AugurStore::connect(&config, base).await?;
    let before = list_tables(&first).await?;
    drop(first);
    let second = AugurStore::connect(&config, base).await?;
    assert_eq!(list_tables(&second).await?, before);
    Ok(())
}
