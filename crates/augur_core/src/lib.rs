pub mod api;
pub mod diff;
pub mod error;
pub mod export;
pub mod ids;
pub mod prediction;
pub mod project;
pub mod target;
pub mod validate;
pub mod value;

pub use api::*;
pub use diff::{Change, ChangeDocument, ChangeImpact, ChangeType, ObjectType, diff, order};
pub use error::{AugurError, AugurResult};
pub use export::{ForecastInfo, export_document, prediction_dicts};
pub use ids::*;
pub use prediction::*;
pub use project::*;
pub use target::*;
pub use validate::{ProjectSchema, validate_and_normalize, validate_prediction_dicts};
pub use value::*;
