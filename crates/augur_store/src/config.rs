use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use augur_core::{AugurError, AugurResult};

const DEFAULT_CONFIG_NAME: &str = "augur.json";
pub const DEFAULT_MAX_INSERT_BATCH: usize = 1_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Rows per multi-row INSERT statement.
    pub max_insert_batch: Option<usize>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_insert_batch: Some(DEFAULT_MAX_INSERT_BATCH),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub validate_cats: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AugurConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
    pub validation: Option<ValidationConfig>,
    pub failpoints: Option<Vec<String>>,
}

impl AugurConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
            validation: Some(ValidationConfig {
                validate_cats: Some(true),
            }),
            failpoints: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> AugurResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| AugurError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| AugurError::storage(format!("read config: {err}")))?;
            let config: AugurConfig = serde_json::from_str(&raw)
                .map_err(|err| AugurError::config(format!("{}: {err}", config_path.display())))?;
            return Ok(config);
        }
        let default = AugurConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| AugurError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| AugurError::storage(format!("write config: {err}")))?;
        log::info!("wrote default config to {}", config_path.display());
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> AugurResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| "augur.sqlite".to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(AugurError::config("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }

    pub fn max_insert_batch(&self) -> usize {
        self.limits
            .as_ref()
            .and_then(|limits| limits.max_insert_batch)
            .filter(|batch| *batch > 0)
            .unwrap_or(DEFAULT_MAX_INSERT_BATCH)
    }

    pub fn validate_cats(&self) -> bool {
        self.validation
            .as_ref()
            .and_then(|validation| validation.validate_cats)
            .unwrap_or(true)
    }
}
