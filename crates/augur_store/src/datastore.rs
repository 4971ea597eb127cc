use std::path::{Path, PathBuf};

use augur_core::AugurResult;

use crate::{AugurConfig, AugurStore};

const DEFAULT_DB_NAME: &str = "augur.sqlite";

pub fn load_or_init_config(base: &Path) -> AugurResult<AugurConfig> {
    AugurConfig::load_or_init(base, &default_sqlite_path(base))
}

pub async fn open_store(base: &Path) -> AugurResult<AugurStore> {
    let config = load_or_init_config(base)?;
    AugurStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}
