use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use augur_core::{
    CreateForecastInput, CreateModelInput, ForecastApi, ProjectApi, ProjectConfig, diff, order,
    parse_date, validate_and_normalize,
};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Validate(args) => validate(args),
        Command::Diff(args) => diff_configs(args),
        Command::Load(args) => load(args).await,
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Developer utilities for forecast projects and prediction files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a prediction file against a project configuration, without a datastore.
    Validate(ValidateArgs),
    /// Print the changes that turn one project configuration into another.
    Diff(DiffArgs),
    /// Provision a project into a datastore, load one forecast and print its export.
    Load(LoadArgs),
}

#[derive(Parser)]
struct ValidateArgs {
    /// Project configuration JSON.
    #[arg(long)]
    config: PathBuf,
    /// Prediction file JSON (`{"predictions": [...]}`).
    #[arg(long)]
    predictions: PathBuf,
    /// Skip the bin category subset check.
    #[arg(long, default_value_t = false)]
    no_validate_cats: bool,
}

#[derive(Parser)]
struct DiffArgs {
    #[arg(long)]
    old: PathBuf,
    #[arg(long)]
    new: PathBuf,
    /// Deduplicate and sequence the changes the way they would be executed.
    #[arg(long, default_value_t = false)]
    ordered: bool,
}

#[derive(Parser)]
struct LoadArgs {
    /// Directory holding augur.json and the sqlite file.
    #[arg(long, default_value = ".augur")]
    datastore: PathBuf,
    #[arg(long)]
    config: PathBuf,
    #[arg(long)]
    predictions: PathBuf,
    /// Timezero of the forecast, YYYY-MM-DD. Must be one of the project's timezeros.
    #[arg(long)]
    timezero: String,
    #[arg(long, default_value = "xtask model")]
    model: String,
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn read_config(path: &Path) -> Result<ProjectConfig> {
    let raw = read_json(path)?;
    ProjectConfig::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn validate(args: ValidateArgs) -> Result<()> {
    let config = read_config(&args.config)?;
    let schema = config.schema()?;
    let document = read_json(&args.predictions)?;
    let rows = validate_and_normalize(&schema, &document, !args.no_validate_cats)
        .with_context(|| format!("invalid predictions {}", args.predictions.display()))?;
    println!(
        "{}: {} bin, {} named, {} point, {} sample rows",
        args.predictions.display(),
        rows.bin_rows.len(),
        rows.named_rows.len(),
        rows.point_rows.len(),
        rows.sample_rows.len()
    );
    Ok(())
}

fn diff_configs(args: DiffArgs) -> Result<()> {
    let old = read_config(&args.old)?;
    let new = read_config(&args.new)?;
    let mut changes = diff(&old, &new);
    if args.ordered {
        changes = order(changes);
    }
    log::info!("{} changes", changes.len());
    println!("{}", serde_json::to_string_pretty(&changes)?);
    Ok(())
}

async fn load(args: LoadArgs) -> Result<()> {
    let config = read_config(&args.config)?;
    let document = read_json(&args.predictions)?;
    let timezero_date = parse_date(&args.timezero)
        .with_context(|| format!("timezero {:?} is not YYYY-MM-DD", args.timezero))?;
    let store = augur_store::open_store(&args.datastore)
        .await
        .with_context(|| format!("open datastore {}", args.datastore.display()))?;

    let project = store.create_project(&config).await?;
    let model = store
        .create_model(
            project,
            CreateModelInput {
                name: args.model.clone(),
                abbreviation: args.model.clone(),
            },
        )
        .await?;
    let source = args
        .predictions
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let forecast = store
        .create_forecast(CreateForecastInput {
            model,
            timezero_date,
            source,
            notes: None,
        })
        .await?;
    let summary = store.load_predictions(forecast, &document, true).await?;
    log::info!("loaded {summary:?} into project {project}");
    let exported = store.export_forecast(forecast).await?;
    println!("{}", serde_json::to_string_pretty(&exported)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_validate_flags() {
        let cli = Cli::try_parse_from([
            "augur_xtask",
            "validate",
            "--config",
            "project.json",
            "--predictions",
            "forecast.json",
            "--no-validate-cats",
        ])
        .expect("parse");
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.config, PathBuf::from("project.json"));
                assert!(args.no_validate_cats);
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn cli_parses_load_defaults() {
        let cli = Cli::try_parse_from([
            "augur_xtask",
            "load",
            "--config",
            "project.json",
            "--predictions",
            "forecast.json",
            "--timezero",
            "2011-10-02",
        ])
        .expect("parse");
        match cli.command {
            Command::Load(args) => {
                assert_eq!(args.datastore, PathBuf::from(".augur"));
                assert_eq!(args.model, "xtask model");
            }
            _ => panic!("expected load"),
        }
    }
}
