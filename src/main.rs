use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use arogya_lib::config::{
    self, parse_bind_addr, require, DataSources, EmbedderKind, EmbedderSettings, ServeConfig,
};
use arogya_lib::gateway::error_chain;
use arogya_lib::gateway::handler::{run_polling, AnswerPipeline, PollingOptions};
use arogya_lib::gateway::health::start_health_server;
use arogya_lib::gateway::telegram::TelegramClient;
use arogya_lib::pipeline::ingest::orchestrator::run_ingestion;
use arogya_lib::pipeline::rag::ollama::{OllamaClient, OllamaGenerator, GENERATE_TIMEOUT_SECS};
use arogya_lib::pipeline::rag::orchestrator::{LlmGenerate, RagService};
use arogya_lib::pipeline::rag::prompt::validate_templates;
use arogya_lib::pipeline::rag::RagError;
use arogya_lib::pipeline::storage::embedder::build_embedder;
use arogya_lib::pipeline::storage::types::EmbeddingModel;
use arogya_lib::pipeline::storage::vectordb::{index_stats, WriteMode};
use arogya_lib::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "arogya",
    version,
    about = "Multilingual public-health assistant over a local vector index"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build (or extend) the vector index from the health datasets.
    Ingest(IngestArgs),
    /// Answer Telegram messages and expose the liveness endpoint.
    Serve(ServeArgs),
    /// Verify that Ollama is reachable and both models are pulled.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct EmbeddingArgs {
    /// Embedding model id recorded in the index (e.g. paraphrase-multilingual).
    #[arg(long, env = "AROGYA_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    #[arg(long, env = "AROGYA_EMBEDDER", value_enum, default_value = "ollama")]
    embedder: EmbedderKind,

    /// Directory with model.onnx and tokenizer.json.
    #[arg(long, env = "AROGYA_ONNX_MODEL_DIR")]
    onnx_model_dir: Option<PathBuf>,

    #[arg(long, env = "OLLAMA_URL", default_value = config::DEFAULT_OLLAMA_URL)]
    ollama_url: String,
}

impl EmbeddingArgs {
    fn settings(&self) -> Result<EmbedderSettings, AppError> {
        if self.embedding_model.is_none() {
            tracing::warn!(
                recommended = config::RECOMMENDED_EMBEDDING_MODEL,
                "No embedding model configured"
            );
        }
        Ok(EmbedderSettings {
            kind: self.embedder,
            model: require("AROGYA_EMBEDDING_MODEL", self.embedding_model.as_deref())?,
            ollama_url: self.ollama_url.clone(),
            onnx_model_dir: self
                .onnx_model_dir
                .clone()
                .unwrap_or_else(config::default_onnx_model_dir),
        })
    }
}

#[derive(Args, Debug)]
struct IngestArgs {
    #[arg(long, env = "AROGYA_DATA_DIR", default_value = config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[arg(long)]
    disease_symptoms: Option<PathBuf>,

    #[arg(long)]
    disease_descriptions: Option<PathBuf>,

    #[arg(long)]
    disease_precautions: Option<PathBuf>,

    #[arg(long)]
    vaccination_stats: Option<PathBuf>,

    #[arg(long, env = "AROGYA_INDEX_DIR", default_value = config::DEFAULT_INDEX_DIR)]
    index_dir: PathBuf,

    /// Clear the existing index instead of appending to it.
    #[arg(long)]
    replace: bool,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

impl IngestArgs {
    fn sources(&self) -> DataSources {
        let defaults = DataSources::in_dir(&self.data_dir);
        DataSources {
            disease_symptoms: self.disease_symptoms.clone().unwrap_or(defaults.disease_symptoms),
            disease_descriptions: self
                .disease_descriptions
                .clone()
                .unwrap_or(defaults.disease_descriptions),
            disease_precautions: self
                .disease_precautions
                .clone()
                .unwrap_or(defaults.disease_precautions),
            vaccination_stats: self.vaccination_stats.clone().unwrap_or(defaults.vaccination_stats),
        }
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    #[arg(long, env = "AROGYA_LLM_MODEL")]
    llm_model: Option<String>,

    #[arg(long, env = "AROGYA_INDEX_DIR", default_value = config::DEFAULT_INDEX_DIR)]
    index_dir: PathBuf,

    #[arg(long, env = "AROGYA_HEALTH_ADDR", default_value = config::DEFAULT_HEALTH_ADDR)]
    health_addr: String,

    /// Passages placed in each prompt.
    #[arg(long, env = "AROGYA_TOP_K", default_value_t = config::DEFAULT_TOP_K)]
    top_k: usize,

    /// Messages answered concurrently.
    #[arg(long, env = "AROGYA_MAX_IN_FLIGHT", default_value_t = config::DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[arg(long, env = "AROGYA_LLM_MODEL")]
    llm_model: Option<String>,

    #[arg(long, env = "AROGYA_INDEX_DIR", default_value = config::DEFAULT_INDEX_DIR)]
    index_dir: PathBuf,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

fn main() -> ExitCode {
    arogya_lib::init_tracing();
    let cli = Cli::parse();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let result = match cli.command {
        Command::Ingest(args) => ingest(args),
        Command::Serve(args) => serve(args),
        Command::Check(args) => check(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %error_chain(&e), "Command failed");
            ExitCode::from(e.exit_code())
        }
    }
}

fn ingest(args: IngestArgs) -> Result<(), AppError> {
    let settings = args.embedding.settings()?;
    let mode = if args.replace {
        WriteMode::Replace
    } else {
        WriteMode::Append
    };

    let report = run_ingestion(&args.sources(), &args.index_dir, mode, || {
        build_embedder(&settings)
    })?;

    tracing::info!(
        disease = report.disease_passages,
        vaccination = report.vaccination_passages,
        stored = report.passages_stored,
        "Passages indexed"
    );
    Ok(())
}

fn serve(args: ServeArgs) -> Result<(), AppError> {
    let settings = args.embedding.settings()?;
    let config = ServeConfig {
        telegram_token: require("TELEGRAM_BOT_TOKEN", args.telegram_token.as_deref())?,
        llm_model: require("AROGYA_LLM_MODEL", args.llm_model.as_deref())?,
        embedding_model: settings.model.clone(),
        ollama_url: settings.ollama_url.clone(),
        index_dir: args.index_dir,
        health_addr: parse_bind_addr(&args.health_addr)?,
        top_k: args.top_k,
        max_in_flight: args.max_in_flight,
    };
    config.validate()?;
    validate_templates()?;

    // Blocking HTTP clients are built before the runtime starts and
    // released after it has shut down.
    let embedder = build_embedder(&settings)?;
    let generator = OllamaGenerator::new(
        OllamaClient::new(&config.ollama_url, GENERATE_TIMEOUT_SECS)?,
        &config.llm_model,
    );
    let service = Arc::new(RagService::new(embedder, generator, &config.index_dir, config.top_k));

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let outcome = runtime.block_on(run_gateway(&config, service.clone()));
    drop(runtime);
    drop(service);
    outcome
}

async fn run_gateway<A: AnswerPipeline>(
    config: &ServeConfig,
    service: Arc<A>,
) -> Result<(), AppError> {
    let health = start_health_server(config.health_addr).await?;

    let telegram = Arc::new(TelegramClient::new(&config.telegram_token)?);
    if let Err(e) = telegram.drop_pending_updates().await {
        tracing::warn!(error = %e, "Could not drop pending updates");
    }

    tracing::info!(
        llm = %config.llm_model,
        embedding = %config.embedding_model,
        liveness = %health.addr,
        "Bot is online"
    );

    let options = PollingOptions {
        max_in_flight: config.max_in_flight,
        ..PollingOptions::default()
    };
    run_polling(telegram, service, options, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    })
    .await;

    health.stop().await;
    Ok(())
}

fn check(args: CheckArgs) -> Result<(), AppError> {
    let settings = args.embedding.settings()?;
    let llm_model = require("AROGYA_LLM_MODEL", args.llm_model.as_deref())?;

    let client = OllamaClient::new(&settings.ollama_url, GENERATE_TIMEOUT_SECS)?;
    let models = client.list_models()?;
    tracing::info!(url = client.base_url(), models = models.len(), "Ollama reachable");

    let mut required = vec![llm_model.as_str()];
    if settings.kind == EmbedderKind::Ollama {
        required.push(settings.model.as_str());
    }
    for model in required {
        if !client.is_model_available(model)? {
            return Err(RagError::NoModel(model.to_string()).into());
        }
        tracing::info!(model, "Model available");
    }

    let embedder = build_embedder(&settings)?;
    let probe = embedder.embed("fever and headache")?;
    tracing::info!(dimension = probe.len(), "Embedding model responds");

    let stats = index_stats(&args.index_dir)?;
    match stats.embedding_model.as_deref() {
        Some(indexed) if indexed != settings.model => tracing::warn!(
            indexed,
            configured = %settings.model,
            "Index was built with a different embedding model"
        ),
        _ => tracing::info!(
            passages = stats.passages,
            dimension = ?stats.dimension,
            "Index inspected"
        ),
    }

    let generator = OllamaGenerator::new(client, &llm_model);
    let answer = generator.generate("Why is the sky blue?")?;
    println!("{answer}");
    tracing::info!(model = generator.model(), "Language model responds");
    Ok(())
}
