pub mod config;
pub mod datastore;
mod db;
pub mod migration;
pub mod store;

pub use augur_core::*;
pub use config::{
    AugurConfig, DEFAULT_MAX_INSERT_BATCH, DatabaseConfig, LimitsConfig, PoolConfig,
    ValidationConfig,
};
pub use datastore::{default_sqlite_path, load_or_init_config, open_store};
pub use store::AugurStore;
