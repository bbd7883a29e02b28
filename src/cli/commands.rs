//! CLI command definitions for lessonforge.
//!
//! Units are read from a JSON or YAML file describing one parent resource:
//!
//! ```yaml
//! parent_id: lecture-42
//! language: English
//! reference_text: "...shared source material..."
//! units:
//!   - sequence_number: 1
//!     title: Limits
//!     description: What a limit is and how to compute one
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::content::{StoredRecord, Unit};
use crate::generation::{normalize_payload, LlmContentGenerator};
use crate::llm::LiteLlmClient;
use crate::metrics;
use crate::pipeline::{
    BatchOrchestrator, BatchResult, BatchStatus, PipelineConfig, PipelineEvent,
};
use crate::storage::{SqliteUnitStore, UnitStore};
use crate::utils::extract_json_object;
use crate::validation::{word_count, ContentValidator};

/// Generate, validate and persist per-segment lesson content.
#[derive(Parser)]
#[command(name = "lessonforge")]
#[command(about = "Generate validated passages and quizzes for every segment of a lecture")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate content for every unit of a parent that has none yet.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// List stored content for a parent.
    Status(StatusArgs),

    /// Check a candidate payload file against the content contract.
    Validate(ValidateArgs),

    /// Regenerate one unit, replacing any stored content.
    Regenerate(RegenerateArgs),
}

/// Store and model options shared by commands that generate.
#[derive(clap::Args, Debug)]
pub struct GenerationOptions {
    /// SQLite database URL (overrides DATABASE_URL).
    #[arg(long)]
    pub database: Option<String>,

    /// Generation model (overrides LESSONFORGE_MODEL).
    #[arg(short = 'm', long)]
    pub model: Option<String>,
}

/// Arguments for `lessonforge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// JSON or YAML file with the parent's units.
    #[arg(short = 'u', long)]
    pub units: String,

    /// Parent id (overrides the one in the units file).
    #[arg(short = 'p', long)]
    pub parent: Option<String>,

    #[command(flatten)]
    pub options: GenerationOptions,

    /// Units generated concurrently (overrides LESSONFORGE_MAX_IN_FLIGHT).
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Output JSON to stdout instead of a text report.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub print_metrics: bool,
}

/// Arguments for `lessonforge status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Parent id to list.
    #[arg(short = 'p', long)]
    pub parent: String,

    /// SQLite database URL (overrides DATABASE_URL).
    #[arg(long)]
    pub database: Option<String>,

    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `lessonforge validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// File holding a raw model response or a payload JSON object.
    pub payload: String,
}

/// Arguments for `lessonforge regenerate`.
#[derive(Parser, Debug)]
pub struct RegenerateArgs {
    /// JSON or YAML file with the parent's units.
    #[arg(short = 'u', long)]
    pub units: String,

    /// Sequence number of the unit to regenerate.
    #[arg(short = 's', long)]
    pub sequence: u32,

    /// Parent id (overrides the one in the units file).
    #[arg(short = 'p', long)]
    pub parent: Option<String>,

    #[command(flatten)]
    pub options: GenerationOptions,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Status(args) => run_status_command(args).await,
        Commands::Validate(args) => run_validate_command(args),
        Commands::Regenerate(args) => run_regenerate_command(args).await,
    }
}

// ============================================================================
// Units file
// ============================================================================

#[derive(Debug, Deserialize)]
struct UnitsFile {
    parent_id: String,
    #[serde(default)]
    language: Option<String>,
    /// Applied to units that carry no reference text of their own.
    #[serde(default)]
    reference_text: Option<String>,
    units: Vec<UnitEntry>,
}

#[derive(Debug, Deserialize)]
struct UnitEntry {
    sequence_number: u32,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reference_text: Option<String>,
}

fn parse_units_file(path: &Path, raw: &str) -> anyhow::Result<UnitsFile> {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    if is_yaml {
        serde_yaml::from_str(raw).with_context(|| format!("invalid YAML in {}", path.display()))
    } else {
        serde_json::from_str(raw).with_context(|| format!("invalid JSON in {}", path.display()))
    }
}

fn build_units(file: UnitsFile, parent_override: Option<&str>) -> (String, Vec<Unit>) {
    let parent_id = parent_override
        .map(str::to_string)
        .unwrap_or(file.parent_id);
    let shared_reference = file.reference_text.unwrap_or_default();

    let units = file
        .units
        .into_iter()
        .map(|entry| {
            let mut unit = Unit::new(parent_id.clone(), entry.sequence_number, entry.title)
                .with_description(entry.description)
                .with_reference_text(
                    entry
                        .reference_text
                        .unwrap_or_else(|| shared_reference.clone()),
                );
            if let Some(language) = &file.language {
                unit = unit.with_language(language.clone());
            }
            unit
        })
        .collect();

    (parent_id, units)
}

fn load_units(path: &str, parent_override: Option<&str>) -> anyhow::Result<(String, Vec<Unit>)> {
    let path = Path::new(path);
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read units file {}", path.display()))?;
    let file = parse_units_file(path, &raw)?;
    Ok(build_units(file, parent_override))
}

// ============================================================================
// Wiring
// ============================================================================

fn load_config(options: &GenerationOptions) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(database) = &options.database {
        config.database_url = database.clone();
    }
    if let Some(model) = &options.model {
        config.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn open_store(database_url: &str) -> anyhow::Result<Arc<SqliteUnitStore>> {
    let store = SqliteUnitStore::connect(database_url)
        .await
        .with_context(|| format!("cannot open database {}", database_url))?;
    store.run_migrations().await?;
    Ok(Arc::new(store))
}

async fn build_orchestrator(config: &PipelineConfig) -> anyhow::Result<BatchOrchestrator> {
    let client = LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Set LITELLM_API_BASE (and LITELLM_API_KEY if required).",
            e
        )
    })?;
    info!(model = %config.model, api_base = %client.api_base(), "Using LiteLLM endpoint");

    let generator =
        LlmContentGenerator::new(Arc::new(client), config.model.clone()).with_temperature(config.temperature);
    let store = open_store(&config.database_url).await?;

    Ok(BatchOrchestrator::new(
        Arc::new(generator),
        store,
        ContentValidator::default(),
        config.batch.clone(),
    ))
}

// ============================================================================
// generate
// ============================================================================

#[derive(Debug, Serialize)]
struct BatchReport {
    parent_id: String,
    status: BatchStatus,
    summary: String,
    cancelled: bool,
    completed: Vec<u32>,
    failed: Vec<FailureReport>,
}

#[derive(Debug, Serialize)]
struct FailureReport {
    sequence_number: u32,
    message: String,
    reason: String,
}

impl From<&BatchResult> for BatchReport {
    fn from(result: &BatchResult) -> Self {
        Self {
            parent_id: result.parent_id.clone(),
            status: result.status,
            summary: result.summary(),
            cancelled: result.cancelled,
            completed: result
                .completed
                .iter()
                .map(StoredRecord::sequence_number)
                .collect(),
            failed: result
                .failed
                .iter()
                .map(|f| FailureReport {
                    sequence_number: f.unit.sequence_number,
                    message: f.user_message(),
                    reason: f.reason.to_string(),
                })
                .collect(),
        }
    }
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.options)?;
    if let Some(max_in_flight) = args.max_in_flight {
        config.batch.max_in_flight = max_in_flight;
        config.validate()?;
    }

    let (parent_id, units) = load_units(&args.units, args.parent.as_deref())?;
    if let Err(e) = metrics::init_metrics() {
        warn!(error = %e, "Metrics unavailable");
    }

    let (tx, rx) = mpsc::channel(64);
    let orchestrator = build_orchestrator(&config).await?.with_events(tx);
    let progress = tokio::spawn(report_progress(rx, !args.json));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight units");
            interrupt.cancel();
        }
    });

    let result = orchestrator
        .generate_batch_cancellable(&parent_id, units, cancel)
        .await?;
    drop(orchestrator);
    let _ = progress.await;

    let report = BatchReport::from(&result);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n=== {} ===", parent_id);
        println!("Status:  {}", report.status);
        println!("Result:  {}", report.summary);
        if report.cancelled {
            println!("Run was cancelled before every unit was dispatched.");
        }
        for failure in &report.failed {
            println!("  - {} ({})", failure.message, failure.reason);
        }
    }

    if args.print_metrics {
        print!("{}", metrics::gather_metrics());
    }

    if result.status == BatchStatus::Failed && result.total > 0 {
        anyhow::bail!("no unit of {} could be generated", parent_id);
    }
    Ok(())
}

async fn report_progress(mut rx: mpsc::Receiver<PipelineEvent>, verbose: bool) {
    while let Some(event) = rx.recv().await {
        if !verbose {
            continue;
        }
        match event {
            PipelineEvent::BatchStarted {
                total_units,
                to_generate,
                ..
            } => println!(
                "{} units, {} already stored, {} to generate",
                total_units,
                total_units - to_generate,
                to_generate
            ),
            PipelineEvent::UnitCompleted { key, attempts, .. } => {
                println!("  ✓ segment {} ({} attempt(s))", key.sequence_number, attempts)
            }
            PipelineEvent::UnitFailed { key, .. } => {
                println!("  ✗ segment {}", key.sequence_number)
            }
            PipelineEvent::AttemptFailed {
                key,
                attempt,
                retry_in_ms: Some(ms),
                ..
            } => println!(
                "    segment {} attempt {} failed, retrying in {:.1}s",
                key.sequence_number,
                attempt,
                ms as f64 / 1000.0
            ),
            _ => {}
        }
    }
}

// ============================================================================
// status
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusLine {
    sequence_number: u32,
    id: String,
    passage_a_words: usize,
    passage_b_words: usize,
    updated_at: String,
}

async fn run_status_command(args: StatusArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(database) = args.database {
        config.database_url = database;
    }
    let store = open_store(&config.database_url).await?;
    let records = store.fetch_all(&args.parent).await?;

    let lines: Vec<StatusLine> = records
        .iter()
        .map(|stored| StatusLine {
            sequence_number: stored.sequence_number(),
            id: stored.id.to_string(),
            passage_a_words: word_count(&stored.record.passage_a),
            passage_b_words: word_count(&stored.record.passage_b),
            updated_at: stored.updated_at.to_rfc3339(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
        return Ok(());
    }

    if lines.is_empty() {
        println!("No stored content for {}", args.parent);
        return Ok(());
    }

    println!("{} stored unit(s) for {}:", lines.len(), args.parent);
    for line in &lines {
        println!(
            "  #{:<3} {}  {}/{} words  updated {}",
            line.sequence_number, line.id, line.passage_a_words, line.passage_b_words, line.updated_at
        );
    }
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.payload)
        .with_context(|| format!("cannot read payload file {}", args.payload))?;
    let value = extract_json_object(&raw)?;
    let candidate = normalize_payload(&value);
    let report = ContentValidator::default().validate(&candidate);

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    for violation in &report.violations {
        println!("violation: {}", violation);
    }

    if !report.is_valid() {
        anyhow::bail!("{} violation(s)", report.violations.len());
    }
    println!("✓ payload satisfies the content contract");
    Ok(())
}

// ============================================================================
// regenerate
// ============================================================================

async fn run_regenerate_command(args: RegenerateArgs) -> anyhow::Result<()> {
    let config = load_config(&args.options)?;
    let (parent_id, units) = load_units(&args.units, args.parent.as_deref())?;
    let unit = units
        .into_iter()
        .find(|u| u.sequence_number == args.sequence)
        .ok_or_else(|| {
            anyhow::anyhow!("no unit with sequence number {} in {}", args.sequence, parent_id)
        })?;

    let orchestrator = build_orchestrator(&config).await?;
    match orchestrator.regenerate_unit(unit).await {
        Ok(stored) => {
            println!(
                "✓ segment {} of {} regenerated ({})",
                stored.sequence_number(),
                parent_id,
                stored.id
            );
            Ok(())
        }
        Err(failure) => {
            println!("✗ {}", failure.user_message());
            Err(anyhow::anyhow!(failure.reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_units_file_applies_shared_fields() {
        let raw = r#"
parent_id: lecture-42
language: Deutsch
reference_text: shared material
units:
  - sequence_number: 2
    title: Ableitungen
  - sequence_number: 1
    title: Grenzwerte
    reference_text: own material
"#;
        let file = parse_units_file(Path::new("units.yaml"), raw).expect("yaml");
        let (parent_id, units) = build_units(file, None);

        assert_eq!(parent_id, "lecture-42");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].reference_text, "shared material");
        assert_eq!(units[1].reference_text, "own material");
        assert!(units.iter().all(|u| u.language_preference == "Deutsch"));
    }

    #[test]
    fn test_json_units_file_with_parent_override() {
        let raw = r#"{"parent_id": "a", "units": [{"sequence_number": 1, "title": "T"}]}"#;
        let file = parse_units_file(Path::new("units.json"), raw).expect("json");
        let (parent_id, units) = build_units(file, Some("b"));

        assert_eq!(parent_id, "b");
        assert_eq!(units[0].parent_id, "b");
        assert_eq!(units[0].language_preference, "English");
    }

    #[test]
    fn test_invalid_units_file_names_path() {
        let err = parse_units_file(Path::new("broken.json"), "{").expect_err("invalid");
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "lessonforge",
            "generate",
            "--units",
            "units.yaml",
            "--max-in-flight",
            "2",
            "--json",
        ])
        .expect("valid args");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.units, "units.yaml");
                assert_eq!(args.max_in_flight, Some(2));
                assert!(args.json);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_cli_parses_regenerate() {
        let cli = Cli::try_parse_from([
            "lessonforge",
            "regenerate",
            "-u",
            "units.json",
            "-s",
            "3",
            "--model",
            "openai/gpt-4o",
        ])
        .expect("valid args");

        match cli.command {
            Commands::Regenerate(args) => {
                assert_eq!(args.sequence, 3);
                assert_eq!(args.options.model.as_deref(), Some("openai/gpt-4o"));
            }
            _ => panic!("expected regenerate"),
        }
    }
}
