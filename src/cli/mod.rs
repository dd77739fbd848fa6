pub mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::core::logging;
use crate::ingest::{IngestPipeline, IngestReport};
use crate::llm::build_provider;
use crate::rag::VectorIndex;
use crate::session::{ChatSession, RagPipeline};
use crate::state::AppState;

/// AutoMentor: answers automotive questions from your own manuals
#[derive(Parser, Debug)]
#[command(name = "automentor")]
#[command(version)]
#[command(about = "Retrieval-augmented automotive assistant", long_about = None)]
pub struct Cli {
    /// Path to config.yml
    #[arg(long, global = true, env = "AUTOMENTOR_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the vector index from the source documents
    Ingest(IngestArgs),

    /// Start an interactive question session
    Query,

    /// Run the HTTP API
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Directory with PDF/CSV/TXT documents
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Directory that receives index.db
    #[arg(long)]
    pub index_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let config = ConfigService::new(paths.clone()).with_config_path(cli.config.clone());
    let mut settings = config
        .load_settings()
        .with_context(|| format!("Failed to load {}", config.config_path().display()))?;

    match cli.command {
        Commands::Ingest(args) => {
            if let Some(dir) = args.source_dir {
                settings.paths.source_dir = paths.resolve(&dir);
            }
            if let Some(dir) = args.index_dir {
                settings.paths.index_dir = paths.resolve(&dir);
            }
            ingest(&settings).await
        }
        Commands::Query => query(&settings).await,
        Commands::Serve(args) => {
            if let Some(host) = args.host {
                settings.server.host = host;
            }
            if let Some(port) = args.port {
                settings.server.port = port;
            }
            let host = settings.server.host.clone();
            let port = settings.server.port;
            let state = AppState::initialize(paths, settings).await?;
            crate::server::serve(state, &host, port).await
        }
    }
}

async fn ingest(settings: &Settings) -> Result<()> {
    let provider = build_provider(&settings.models);
    let pipeline = IngestPipeline::from_settings(settings, provider)?;

    println!(
        "Ingesting documents from {} ...",
        settings.paths.source_dir.display()
    );
    let (_, report) = pipeline
        .run(&settings.paths.source_dir, &settings.paths.index_path())
        .await?;

    print!("{}", render_summary(&report));
    Ok(())
}

fn render_summary(report: &IngestReport) -> String {
    let mut out = format!(
        "Indexed {} chunks from {} documents ({} files) into {} in {:.1}s\n",
        report.chunks,
        report.documents,
        report.files_loaded,
        report.index_path.display(),
        report.elapsed_ms as f64 / 1000.0
    );
    if !report.skipped_files.is_empty() {
        out.push_str(&format!(
            "Skipped {} unsupported file(s)\n",
            report.skipped_files.len()
        ));
    }
    if !report.failures.is_empty() {
        out.push_str(&format!("{} file(s) could not be loaded:\n", report.failures.len()));
        for failure in &report.failures {
            out.push_str(&format!("  - {}: {}\n", failure.path.display(), failure.reason));
        }
    }
    out
}

async fn query(settings: &Settings) -> Result<()> {
    let provider = build_provider(&settings.models);
    let pipeline = RagPipeline::from_settings(settings, provider);

    let index = VectorIndex::load(&settings.paths.index_path()).await?;
    index.ensure_model(pipeline.embedding_model())?;

    let mut session = ChatSession::new(settings.memory.max_turns);
    println!("Welcome to AutoMentor! Ask a question, or type 'exit' to quit.");

    let stdin = repl::stdin_reader();
    let mut stdout = tokio::io::stdout();

    tokio::select! {
        result = repl::run_repl(&pipeline, &index, &mut session, stdin, &mut stdout) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!();
        }
    }

    println!("Goodbye!");
    Ok(())
}
