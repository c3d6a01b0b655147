use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docpipe::composer::PipelineComposer;
use docpipe::config::{self, Config, StoreBackend};
use docpipe::embedding::HashingEmbedder;
use docpipe::execution::{ElementRegistry, ExecutionContext, PipelineExecutor};
use docpipe::indexing::{IndexingDispatcher, JobStatus, JobTracker};
use docpipe::ingest::IngestionService;
use docpipe::logging;
use docpipe::metrics::PipelineMetrics;
use docpipe::store::{FileStore, MemoryStore, MetadataStore};
use serde::Serialize;
use uuid::Uuid;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "docpipe", about = "Compose, run, and index document pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage pipeline definitions.
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommand,
    },
    /// Execute a stored pipeline and print the final context.
    Run {
        pipeline_id: String,
        /// JSON file holding the initial execution context.
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Manage indexing jobs.
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
    /// Create a job for the given files and run it through a pipeline.
    Ingest {
        pipeline_id: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Inspect document index metadata.
    Index {
        #[command(subcommand)]
        command: IndexCommand,
    },
    /// Search indexed documents.
    Search {
        query: String,
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[derive(Subcommand)]
enum PipelineCommand {
    /// Validate and store a JSON pipeline definition.
    Create {
        file: PathBuf,
        /// Pipeline id; derived from the definition name when omitted.
        #[arg(long)]
        id: Option<String>,
    },
    /// Print a stored definition.
    Show { id: String },
    /// List known pipeline ids.
    List,
    /// Drop a pipeline from the index.
    Remove { id: String },
}

#[derive(Subcommand)]
enum JobsCommand {
    /// Create a job; directories are walked recursively.
    Create {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print a job record.
    Status { id: Uuid },
    /// Print every job.
    List,
    /// Print the files of a job that are still pending.
    Pending { id: Uuid },
    /// Set the status of one file.
    Update {
        id: Uuid,
        path: String,
        status: JobStatus,
        #[arg(long)]
        error: Option<String>,
    },
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Per-strategy index metadata of a document.
    Status { doc_id: String },
}

struct Services {
    composer: PipelineComposer,
    tracker: Arc<JobTracker>,
    dispatcher: Arc<IndexingDispatcher>,
    executor: Arc<PipelineExecutor>,
}

impl Services {
    async fn build(config: &Config) -> Result<Self> {
        let store: Arc<dyn MetadataStore> = match config.store_backend {
            StoreBackend::File => Arc::new(
                FileStore::open(&config.data_dir)
                    .await
                    .with_context(|| format!("failed to open store at {}", config.data_dir.display()))?,
            ),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let dispatcher = Arc::new(IndexingDispatcher::with_default_strategies(
            store.clone(),
            Arc::new(HashingEmbedder::new(config.embedding_dimension)),
        ));
        dispatcher
            .set_default_strategy(&config.default_strategy)
            .context("DOCPIPE_DEFAULT_STRATEGY")?;

        let executor = Arc::new(PipelineExecutor::new(
            store.clone(),
            Arc::new(ElementRegistry::with_builtins()),
            dispatcher.clone(),
            Arc::new(PipelineMetrics::new()),
        ));

        Ok(Self {
            composer: PipelineComposer::new(store.clone()),
            tracker: Arc::new(JobTracker::new(store)),
            dispatcher,
            executor,
        })
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();
    tracing::debug!(
        store = ?config.store_backend,
        data_dir = %config.data_dir.display(),
        default_strategy = %config.default_strategy,
        "Loaded configuration"
    );

    let services = Services::build(config).await?;
    match cli.command {
        Command::Pipeline { command } => pipeline_command(&services, command).await,
        Command::Run {
            pipeline_id,
            context,
        } => {
            let context = match context {
                Some(path) => serde_json::from_str(&read_file(&path)?)
                    .with_context(|| format!("invalid context JSON in {}", path.display()))?,
                None => ExecutionContext::new(),
            };
            let outcome = services
                .executor
                .execute_pipeline(&pipeline_id, context)
                .await?;
            print_json(&outcome)
        }
        Command::Jobs { command } => jobs_command(&services, command).await,
        Command::Ingest { pipeline_id, paths } => {
            services.composer.load_pipeline(&pipeline_id).await?;
            let files = collect_files(&paths)?;
            let ingestion = IngestionService::new(services.tracker.clone(), services.executor.clone());
            let job = ingestion.ingest(&pipeline_id, files).await?;
            print_json(&job)
        }
        Command::Index {
            command: IndexCommand::Status { doc_id },
        } => print_json(&services.dispatcher.get_index_status(&doc_id).await),
        Command::Search {
            query,
            strategy,
            top_k,
        } => {
            let hits = services
                .dispatcher
                .search(
                    &query,
                    strategy.as_deref(),
                    top_k.unwrap_or(config.search_default_top_k),
                )
                .await?;
            print_json(&hits)
        }
    }
}

async fn pipeline_command(services: &Services, command: PipelineCommand) -> Result<()> {
    match command {
        PipelineCommand::Create { file, id } => {
            let raw = read_file(&file)?;
            let definition: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", file.display()))?;
            let composed = services.composer.compose_pipeline(&definition)?;
            let id = id.unwrap_or_else(|| docpipe::composer::derive_pipeline_id(&composed.name));
            if !services.composer.persist_pipeline(&id, &definition).await? {
                bail!("failed to store pipeline {id}");
            }
            println!("{id}");
            Ok(())
        }
        PipelineCommand::Show { id } => print_json(&services.composer.load_pipeline(&id).await?),
        PipelineCommand::List => print_json(&services.composer.list_pipelines().await),
        PipelineCommand::Remove { id } => {
            if !services.composer.remove_from_index(&id).await {
                bail!("failed to update the pipeline index");
            }
            Ok(())
        }
    }
}

async fn jobs_command(services: &Services, command: JobsCommand) -> Result<()> {
    let tracker = &services.tracker;
    match command {
        JobsCommand::Create { paths } => {
            let job_id = tracker.create_job(collect_files(&paths)?).await;
            println!("{job_id}");
            Ok(())
        }
        JobsCommand::Status { id } => print_json(&tracker.get_indexing_status(id).await?),
        JobsCommand::List => print_json(&tracker.get_all_jobs().await),
        JobsCommand::Pending { id } => print_json(&tracker.get_pending_files(id).await?),
        JobsCommand::Update {
            id,
            path,
            status,
            error,
        } => print_json(
            &tracker
                .update_file_status(id, &path, status, error.as_deref())
                .await?,
        ),
    }
}

/// Expand directories into the files beneath them, in walk order, each file once.
fn collect_files(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.path().display().to_string());
                }
            }
        } else {
            files.push(path.display().to_string());
        }
    }
    let mut seen = HashSet::new();
    files.retain(|file| seen.insert(file.clone()));
    if files.is_empty() {
        bail!("no files found");
    }
    Ok(files)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
