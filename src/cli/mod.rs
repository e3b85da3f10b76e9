mod config;

pub use config::GearflowConfig;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::guard::{self, PathGuard};
use crate::roadmap::Prioritizer;
use crate::roadmap::types::RoadmapItem;
use crate::state::json_store::JsonStateStore;
use crate::state::transitions::{self, StageOutput};
use crate::state::types::*;
use crate::state::{StateStore, load_or_new};

const FORMATS: [&str; 2] = ["table", "json"];
const CLARIFICATION_STRATEGIES: [&str; 3] = ["defer", "prompt", "skip"];
const IMPLEMENTATION_SCOPES: [&str; 4] = ["none", "p0", "p0_p1", "all"];

#[derive(Parser)]
#[command(name = "gearflow", version, about = "Durable gear pipeline state and roadmap planning")]
pub struct Cli {
    /// Project directory holding the state document
    #[arg(long, global = true, default_value = ".", env = "GEARFLOW_DIR")]
    dir: String,

    /// Path to gearflow.yaml (default: auto-detect in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the workflow state
    Status {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Mark a stage as started
    Start { stage: String },

    /// Mark a stage as completed
    Complete {
        stage: String,

        /// Artifact produced by the stage (repeatable)
        #[arg(short, long)]
        artifact: Vec<String>,

        /// Stage metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Record a stage failure
    Fail {
        stage: String,

        #[arg(short, long)]
        error: String,
    },

    /// Set the route (greenfield, brownfield); cannot change once set
    Route { route: String },

    /// Configure auto mode
    Auto {
        /// Turn auto mode off instead of on
        #[arg(long)]
        disable: bool,

        /// Clarification handling (defer, prompt, skip)
        #[arg(long, default_value = "defer")]
        clarifications: String,

        /// Implementation scope (none, p0, p0_p1, all)
        #[arg(long, default_value = "none")]
        scope: String,
    },

    /// Administrative jump forward to a stage, skipping earlier ones
    Override { stage: String },

    /// Archive the state document and start over
    Reset,

    /// Record roadmap items from a JSON file
    Roadmap { file: String },

    /// Record clarification answers (JSON array of strings) on a stage
    Clarify { stage: String, file: String },

    /// Score and order the recorded roadmap
    Plan {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,

        /// Declared project language
        #[arg(long)]
        language: Option<String>,

        /// Framework in use (repeatable)
        #[arg(long)]
        framework: Vec<String>,

        /// Lines of code in the project
        #[arg(long)]
        loc: Option<u64>,
    },

    /// List roadmap items ready to start
    Ready,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv(cli.dotenv.as_deref());

    let config = GearflowConfig::load(cli.config.as_deref())?;
    let path_guard = config.path_guard()?;
    let project_dir = path_guard.validate_directory(&cli.dir)?;
    let options = config.store_options();
    // Input files are held to the same ceiling as the state document.
    let max_input_bytes = options.max_bytes;
    let store = JsonStateStore::with_options(&project_dir, options);

    match cli.command {
        Commands::Status { format } => cmd_status(&store, &format).await,
        Commands::Start { stage } => {
            let stage = parse_stage(&stage)?;
            let state = store
                .update(Box::new(move |s| transitions::start_stage(s, stage, Utc::now())))
                .await?;
            println!("Started {} (revision {})", stage, state.revision);
            Ok(())
        }
        Commands::Complete {
            stage,
            artifact,
            metadata,
        } => cmd_complete(&store, &stage, artifact, metadata).await,
        Commands::Fail { stage, error } => {
            let stage = parse_stage(&stage)?;
            guard::validate_bounded_text(&error, guard::MAX_CLARIFICATION_LEN, "error")?;
            store
                .update(Box::new(move |s| {
                    transitions::fail_stage(s, stage, &error, Utc::now())
                }))
                .await?;
            println!("Recorded failure of {}", stage);
            Ok(())
        }
        Commands::Route { route } => {
            let route: Route = guard::validate_enum(&route, &Route::NAMES, "route")?.parse()?;
            store
                .update(Box::new(move |s| transitions::set_route(s, route)))
                .await?;
            println!("Route: {}", route);
            Ok(())
        }
        Commands::Auto {
            disable,
            clarifications,
            scope,
        } => {
            let auto_mode = AutoMode {
                enabled: !disable,
                clarifications: guard::validate_enum(
                    &clarifications,
                    &CLARIFICATION_STRATEGIES,
                    "clarifications",
                )?
                .parse()?,
                implementation_scope: guard::validate_enum(&scope, &IMPLEMENTATION_SCOPES, "scope")?
                    .parse()?,
            };
            store
                .update(Box::new(move |s| transitions::configure_auto_mode(s, auto_mode)))
                .await?;
            println!("Auto mode {}", if disable { "disabled" } else { "enabled" });
            Ok(())
        }
        Commands::Override { stage } => {
            let stage = parse_stage(&stage)?;
            let state = store
                .update(Box::new(move |s| transitions::override_stage(s, stage, Utc::now())))
                .await?;
            println!("Current stage: {}", state.current_stage);
            Ok(())
        }
        Commands::Reset => {
            match store.reset().await? {
                Some(archived) => println!("Archived state to {}", archived.display()),
                None => println!("No state to reset."),
            }
            Ok(())
        }
        Commands::Roadmap { file } => {
            let path = guarded_file(&path_guard, &file)?;
            let data = guard::read_bounded_file(&path, max_input_bytes, "file")
                .with_context(|| format!("Failed to read roadmap: {}", path.display()))?;
            let items: Vec<RoadmapItem> = serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse roadmap: {}", path.display()))?;
            let count = items.len();
            store
                .update(Box::new(move |s| transitions::record_roadmap(s, items)))
                .await?;
            println!("Recorded {} roadmap item(s)", count);
            Ok(())
        }
        Commands::Clarify { stage, file } => {
            let stage = parse_stage(&stage)?;
            let path = guarded_file(&path_guard, &file)?;
            let data = guard::read_bounded_file(&path, max_input_bytes, "file")
                .with_context(|| format!("Failed to read answers: {}", path.display()))?;
            let answers: Vec<String> = serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse answers: {}", path.display()))?;
            guard::validate_clarifications(&answers)?;
            let count = answers.len();
            store
                .update(Box::new(move |s| {
                    transitions::record_clarifications(s, stage, answers)
                }))
                .await?;
            println!("Recorded {} clarification(s) on {}", count, stage);
            Ok(())
        }
        Commands::Plan {
            format,
            language,
            framework,
            loc,
        } => {
            let mut context = config.project.clone().unwrap_or_default();
            if language.is_some() {
                context.language = language;
            }
            if !framework.is_empty() {
                context.frameworks = framework;
            }
            if let Some(loc) = loc {
                context.lines_of_code = loc;
            }
            cmd_plan(&store, Prioritizer::new(config.scorer()?, context), &format).await
        }
        Commands::Ready => {
            let context = config.project.clone().unwrap_or_default();
            let prioritizer = Prioritizer::new(config.scorer()?, context);
            let state = load_or_new(&store).await?;
            let plan = prioritizer.plan(&state.roadmap);
            if plan.ready.is_empty() {
                println!("No items ready.");
            }
            for id in &plan.ready {
                println!("{}", id);
            }
            Ok(())
        }
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (warn if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

fn parse_stage(value: &str) -> Result<Stage> {
    Ok(guard::validate_enum(value, &Stage::NAMES, "stage")?.parse()?)
}

/// Validate the directory part of a file argument, then rejoin the name.
fn guarded_file(path_guard: &PathGuard, file: &str) -> Result<PathBuf> {
    let path = Path::new(file);
    let parent = match path.parent().map(|p| p.to_string_lossy().to_string()) {
        Some(p) if !p.is_empty() => p,
        _ => ".".to_string(),
    };
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid file path: {}", file))?;
    Ok(path_guard.validate_directory(&parent)?.join(name))
}

async fn cmd_complete(
    store: &JsonStateStore,
    stage: &str,
    artifacts: Vec<String>,
    metadata: Option<String>,
) -> Result<()> {
    let stage = parse_stage(stage)?;
    let metadata: Metadata = match metadata {
        Some(json) => {
            guard::validate_bounded_text(&json, guard::MAX_CLARIFICATION_LEN, "metadata")?;
            serde_json::from_str(&json).context("Metadata must be a JSON object")?
        }
        None => Metadata::new(),
    };
    let output = StageOutput {
        artifacts,
        metadata,
        ..StageOutput::default()
    };

    let state = store
        .update(Box::new(move |s| {
            transitions::complete_stage(s, stage, output, Utc::now())
        }))
        .await?;
    println!("Completed {}; current stage: {}", stage, state.current_stage);
    Ok(())
}

async fn cmd_status(store: &JsonStateStore, format: &str) -> Result<()> {
    let format = guard::validate_enum(format, &FORMATS, "format")?;
    let state = load_or_new(store).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!("State:    {}", store.state_path().display());
    println!("Revision: {}", state.revision);
    println!("Stage:    {}", state.current_stage);
    println!(
        "Route:    {}",
        state
            .route
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Auto:     {}", if state.auto_mode.enabled { "on" } else { "off" });
    println!("Roadmap:  {} item(s)", state.roadmap.len());

    println!("\n{:<18} {:<12} {:<20}", "STAGE", "STATUS", "COMPLETED");
    println!("{}", "-".repeat(52));
    for gear in Stage::GEARS {
        let (status, completed) = match state.stage_details.get(&gear) {
            Some(detail) => (
                detail.status.to_string(),
                detail
                    .completed_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            None => ("pending".to_string(), "-".to_string()),
        };
        let icon = match state.stage_details.get(&gear).map(|d| d.status) {
            Some(StageStatus::Completed) => "✓",
            Some(StageStatus::Skipped) => "⊘",
            Some(StageStatus::Failed) => "✗",
            Some(StageStatus::InProgress) => "⟳",
            None => "○",
        };
        println!("{} {:<16} {:<12} {:<20}", icon, gear, status, completed);
    }
    Ok(())
}

async fn cmd_plan(store: &JsonStateStore, prioritizer: Prioritizer, format: &str) -> Result<()> {
    let format = guard::validate_enum(format, &FORMATS, "format")?;
    let state = load_or_new(store).await?;
    let plan = prioritizer.plan(&state.roadmap);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if plan.order.is_empty() {
        println!("No roadmap items recorded.");
        return Ok(());
    }

    println!(
        "{:<4} {:<16} {:<4} {:>6} {:>4} {:>4} {:>6}  TITLE",
        "#", "ID", "TIER", "SCORE", "IMP", "EFF", "HOURS"
    );
    println!("{}", "-".repeat(80));
    for (n, item) in plan.order.iter().enumerate() {
        if let Some(score) = &item.score {
            println!(
                "{:<4} {:<16} {:<4} {:>6.2} {:>4} {:>4} {:>6}  {}",
                n + 1,
                item.id,
                score.priority,
                score.priority_score,
                score.impact,
                score.effort,
                score.effort_hours,
                item.title
            );
        }
    }

    println!("\nReady: {}", if plan.ready.is_empty() { "-".to_string() } else { plan.ready.join(", ") });
    for cycle in &plan.cycles {
        println!("Cycle: {}", cycle.join(" -> "));
    }
    Ok(())
}
