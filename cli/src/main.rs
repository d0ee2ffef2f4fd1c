mod config;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use stream_schema_core::{CompiledSchema, events};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

/// Report format for the `validate` command.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "stream-schema")]
#[command(about = "Compile JSON Schemas and stream-validate JSON or YAML documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a schema and report whether it is well-formed.
    Check(CheckArgs),
    /// Validate instance files against a schema.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Schema file (JSON, or YAML by `.yaml`/`.yml` extension).
    schema: PathBuf,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Schema file (JSON, or YAML by `.yaml`/`.yml` extension).
    #[arg(long)]
    schema: PathBuf,
    /// Optional YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of parallel validation jobs (overrides the config file).
    #[arg(long)]
    jobs: Option<usize>,
    /// Output format.
    #[arg(long, default_value = "text")]
    format: OutputFormat,
    /// Instance files to validate.
    #[arg(required = true)]
    instances: Vec<PathBuf>,
}

/// Result of validating one instance file.
#[derive(Debug, Serialize)]
struct InstanceOutcome {
    path: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidationReport<'a> {
    schema: String,
    valid: usize,
    invalid: usize,
    errors: usize,
    instances: &'a [InstanceOutcome],
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Check(args) => run_check(args),
        Command::Validate(args) => run_validate(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let schema = compile_schema(&args.schema, &CliConfig::default())?;
    println!(
        "Schema '{}' is valid: {} node(s), {} reference(s).",
        args.schema.display(),
        schema.len(),
        schema.document().alias_count()
    );
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => CliConfig::load(path)
            .map_err(|err| format!("Failed to load config '{}': {err}", path.display()))?,
        None => CliConfig::default(),
    };
    let jobs = args.jobs.unwrap_or(config.validation.jobs);
    if jobs == 0 {
        return Err("--jobs must be at least 1".to_string());
    }

    let schema = compile_schema(&args.schema, &config)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| format!("Failed to create thread pool: {e}"))?;

    debug!(jobs, instances = args.instances.len(), "Validating instances");
    let outcomes: Vec<InstanceOutcome> = pool.install(|| {
        args.instances
            .par_iter()
            .map(|path| {
                let (valid, error) = match validate_instance(&schema, path) {
                    Ok(valid) => (valid, None),
                    Err(err) => (false, Some(err)),
                };
                InstanceOutcome {
                    path: path.display().to_string(),
                    valid,
                    error,
                }
            })
            .collect()
    });

    let errors = outcomes.iter().filter(|o| o.error.is_some()).count();
    let valid = outcomes.iter().filter(|o| o.valid).count();
    let invalid = outcomes.len() - valid - errors;

    match args.format {
        OutputFormat::Text => {
            for outcome in &outcomes {
                match &outcome.error {
                    Some(err) => eprintln!("{}: error: {err}", outcome.path),
                    None if outcome.valid => println!("{}: valid", outcome.path),
                    None => println!("{}: invalid", outcome.path),
                }
            }
            println!(
                "Validated {} instance(s): {valid} valid, {invalid} invalid, {errors} error(s).",
                outcomes.len()
            );
        }
        OutputFormat::Json => {
            let report = ValidationReport {
                schema: args.schema.display().to_string(),
                valid,
                invalid,
                errors,
                instances: &outcomes,
            };
            let raw = serde_json::to_string_pretty(&report)
                .map_err(|err| format!("Failed to serialize report: {err}"))?;
            println!("{raw}");
        }
    }

    if invalid > 0 || errors > 0 {
        return Err(format!(
            "{} of {} instance(s) failed validation",
            invalid + errors,
            outcomes.len()
        ));
    }
    Ok(())
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

fn open(path: &Path) -> Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| format!("Failed to read '{}': {err}", path.display()))
}

fn compile_schema(path: &Path, config: &CliConfig) -> Result<CompiledSchema, String> {
    let reader = open(path)?;
    let parsed: Result<Value, String> = if is_yaml(path) {
        serde_yaml::from_reader(reader).map_err(|err| err.to_string())
    } else {
        serde_json::from_reader(reader).map_err(|err| err.to_string())
    };
    let value =
        parsed.map_err(|err| format!("Failed to parse schema '{}': {err}", path.display()))?;

    let schema = CompiledSchema::build_with(value, &config.compile)
        .map_err(|err| format!("Schema '{}' is not valid: {err}", path.display()))?;
    debug!(schema = %path.display(), nodes = schema.len(), "Compiled schema");
    Ok(schema)
}

/// Streams one instance file through a fresh session.
fn validate_instance(schema: &CompiledSchema, path: &Path) -> Result<bool, String> {
    let reader = open(path)?;
    let mut session = schema.consumer();
    if is_yaml(path) {
        let deserializer = serde_yaml::Deserializer::from_reader(reader);
        events::from_deserializer(deserializer, &mut session).map_err(|err| err.to_string())?;
    } else {
        events::from_reader(reader, &mut session).map_err(|err| err.to_string())?;
    }
    Ok(session.finalize())
}
