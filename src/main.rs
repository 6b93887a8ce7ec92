use clap::{Args, Parser, Subcommand};
use scoremill::codebook::{self, LocaleBundle};
use scoremill::config::{ConfigError, RunConfig};
use scoremill::output::{ExportAdapter, ExportError, ScoredTable};
use scoremill::recipe::{Recipe, RecipeLoader, SchemaRegistry};
use scoremill::scoring::ScoringEngine;
use scoremill::table::{InputTable, SidecarMetadata};
use scoremill::telemetry::{self, TelemetryError};
use scoremill::EngineError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "scoremill",
    about = "Score validated research measurements with a declarative recipe",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score an input table and write the derivative table plus report
    Score(ScoreArgs),
    /// Emit the codebook for a recipe as JSON
    Codebook(RecipeArgs),
    /// Emit the narrative methods text for a recipe
    Methods(RecipeArgs),
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Recipe document (JSON)
    #[arg(long)]
    recipe: PathBuf,
    /// Input table (CSV with participant_id and session columns)
    #[arg(long)]
    input: PathBuf,
    /// Sidecar metadata with value-label vocabularies (JSON)
    #[arg(long)]
    sidecar: Option<PathBuf>,
    /// Destination for the scored table; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,
    /// Destination for the JSON run report
    #[arg(long)]
    report: Option<PathBuf>,
    /// Language for localized labels and descriptions
    #[arg(long)]
    lang: Option<String>,
    /// Include raw item columns in the output
    #[arg(long)]
    include_items: bool,
}

#[derive(Args, Debug)]
struct RecipeArgs {
    /// Recipe document (JSON)
    #[arg(long)]
    recipe: PathBuf,
    /// Language for localized labels and descriptions
    #[arg(long)]
    lang: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("could not serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let (config, telemetry_config) = RunConfig::load()?;
    telemetry::init(&telemetry_config)?;

    match cli.command {
        Command::Score(args) => score(args, config),
        Command::Codebook(args) => print_codebook(args),
        Command::Methods(args) => print_methods(args),
    }
}

fn load_recipe(path: &Path) -> Result<Recipe, CliError> {
    let document = fs::read_to_string(path)?;
    let registry = SchemaRegistry::builtin();
    let recipe = RecipeLoader::new(&registry)
        .load_str(&document)
        .map_err(EngineError::from)?;
    Ok(recipe)
}

fn score(args: ScoreArgs, mut config: RunConfig) -> Result<(), CliError> {
    if let Some(lang) = args.lang {
        config.language = lang;
    }
    if args.include_items {
        config.include_items = true;
    }

    let recipe = load_recipe(&args.recipe)?;
    let input = fs::File::open(&args.input)?;
    let table = InputTable::from_csv_reader(input).map_err(EngineError::from)?;
    let sidecar: Option<SidecarMetadata> = match &args.sidecar {
        Some(path) => Some(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => None,
    };

    let engine = ScoringEngine::new(recipe, config)?;
    let outcome = engine.run(&table, sidecar.as_ref())?;

    for error in &outcome.report.row_errors {
        warn!(
            participant = %error.participant_id,
            session = %error.session,
            score = %error.score,
            "{}", error.reason
        );
    }

    let mut exporter = DelimitedExporter {
        destination: args.output,
    };
    exporter.export(&outcome.table).map_err(EngineError::from)?;

    if let Some(path) = args.report {
        let report = serde_json::to_string_pretty(&outcome.report)?;
        fs::write(path, report)?;
    }

    info!(
        rows = outcome.report.rows_scored,
        row_errors = outcome.report.row_errors.len(),
        "scored table written"
    );
    Ok(())
}

fn print_codebook(args: RecipeArgs) -> Result<(), CliError> {
    let recipe = load_recipe(&args.recipe)?;
    let bundle = LocaleBundle::builtin();
    let language = args.lang.unwrap_or_else(|| "en".to_string());
    let entries = codebook::entries(&recipe, &bundle, &language, None, false);
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn print_methods(args: RecipeArgs) -> Result<(), CliError> {
    let recipe = load_recipe(&args.recipe)?;
    let bundle = LocaleBundle::builtin();
    let language = args.lang.unwrap_or_else(|| "en".to_string());
    println!("{}", codebook::methods_text(&recipe, &bundle, &language));
    Ok(())
}

/// Plain delimited-table export adapter. Stages the full artifact in
/// memory and commits it with a single write, so a failed export leaves
/// no partial file behind.
struct DelimitedExporter {
    destination: Option<PathBuf>,
}

impl ExportAdapter for DelimitedExporter {
    fn export(&mut self, table: &ScoredTable) -> Result<(), ExportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["participant_id".to_string(), "session".to_string()];
        header.extend(table.variables.iter().map(|variable| variable.name.clone()));
        writer
            .write_record(&header)
            .map_err(|err| ExportError::Adapter(err.to_string()))?;

        for row in &table.rows {
            let mut record = vec![row.participant_id.clone(), row.session.clone()];
            for cell in &row.cells {
                record.push(match cell.as_number() {
                    Some(value) => value.to_string(),
                    None => String::new(),
                });
            }
            writer
                .write_record(&record)
                .map_err(|err| ExportError::Adapter(err.to_string()))?;
        }

        let buffer = writer
            .into_inner()
            .map_err(|err| ExportError::Adapter(err.to_string()))?;

        match &self.destination {
            Some(path) => fs::write(path, buffer)?,
            None => std::io::stdout().write_all(&buffer)?,
        }
        Ok(())
    }
}
