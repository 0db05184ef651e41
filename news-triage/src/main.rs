use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use interfaces::defs::LanguageModel;
use interfaces::empty::EmptyLanguageModel;
use interfaces::state::TrainingLog;
use news_triage::brief::{compose_brief, feed_payload};
use news_triage::config::{split_list, LlmConfig, SourceConfig, TriageConfig};
use news_triage::sources::{EdgarFilingSource, MarketauxSource, NewsApiSource};
use news_triage::{
    Fetcher, LearnedRanker, OpenAiCompatibleModel, PipelineBuilder, RawRecord, StaticSource,
};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "news-triage")]
#[command(about = "Ranked, severity-tagged news and filing feed for analyst triage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Brief,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one triage pass
    Run {
        /// JSON file overriding configuration defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Read raw records from a JSON array instead of fetching sources
        #[arg(long)]
        input: Option<PathBuf>,

        /// Learned ranker model (JSON logistic regression)
        #[arg(long, default_value = "models/news_ranker.json")]
        model: PathBuf,

        /// SQLite training log
        #[arg(long, default_value = "out/training_events.db")]
        training_log: PathBuf,

        /// Do not append feature rows to the training log
        #[arg(long)]
        no_training_log: bool,

        #[arg(long)]
        min_score: Option<f64>,

        #[arg(long)]
        ml_weight: Option<f64>,

        /// Skip classification and summarization calls
        #[arg(long)]
        no_llm: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write output here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Items in the brief
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Label the training log: listed ids are positives, the rest negatives
    Label {
        #[arg(long, default_value = "out/training_events.db")]
        training_log: PathBuf,

        /// Triage export with one id per line (a leading "id" header is skipped)
        #[arg(long)]
        ids: PathBuf,
    },

    /// Show the ranker's largest coefficients
    Weights {
        #[arg(long, default_value = "models/news_ranker.json")]
        model: PathBuf,

        #[arg(long, default_value_t = 40)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            input,
            model,
            training_log,
            no_training_log,
            min_score,
            ml_weight,
            no_llm,
            format,
            output,
            top,
        } => {
            let mut triage_config = match config {
                Some(path) => TriageConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to load config: {}", path.display()))?,
                None => TriageConfig::default(),
            };
            if let Ok(watchlist) = env::var("WATCHLIST") {
                triage_config = triage_config.with_watchlist(split_list(&watchlist));
            }
            if let Some(min_score) = min_score {
                triage_config.selection.min_score = min_score;
            }
            if let Some(ml_weight) = ml_weight {
                triage_config.blend.ml_weight = ml_weight;
            }
            if no_llm {
                triage_config.llm.enabled = false;
            }
            if let Some(temperature) = env_parse("LLM_TEMPERATURE") {
                triage_config.llm.temperature = temperature;
            }
            if let Some(max_tokens) = env_parse("LLM_MAX_TOKENS") {
                triage_config.llm.max_tokens = max_tokens;
            }
            triage_config.validate()?;

            let log = if no_training_log {
                None
            } else {
                Some(open_training_log(&training_log).await?)
            };

            let run = RunOptions {
                input,
                model,
                format,
                output,
                top,
            };
            cmd_run(triage_config, log, run).await
        }
        Commands::Label { training_log, ids } => cmd_label(&training_log, &ids).await,
        Commands::Weights { model, top } => cmd_weights(&model, top),
    }
}

struct RunOptions {
    input: Option<PathBuf>,
    model: PathBuf,
    format: OutputFormat,
    output: Option<PathBuf>,
    top: usize,
}

async fn open_training_log(path: &Path) -> Result<TrainingLog> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    TrainingLog::open(path).await
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

fn language_model(llm: &LlmConfig) -> Arc<dyn LanguageModel> {
    match env::var("LLM_BASE_URL") {
        Ok(base_url) if !base_url.trim().is_empty() => {
            let classify = env::var("LLM_CLASSIFY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            let summarize = env::var("LLM_SUMMARIZE_MODEL").unwrap_or_else(|_| classify.clone());
            let api_key = env::var("LLM_API_KEY").ok().filter(|key| !key.is_empty());
            Arc::new(
                OpenAiCompatibleModel::new(&base_url, api_key, &classify, &summarize)
                    .with_temperature(llm.temperature)
                    .with_max_tokens(llm.max_tokens),
            )
        }
        _ => {
            warn!("LLM_BASE_URL not set, classification and summaries will use fallbacks");
            Arc::new(EmptyLanguageModel)
        }
    }
}

async fn cmd_run(config: TriageConfig, log: Option<TrainingLog>, run: RunOptions) -> Result<()> {
    let ranker = LearnedRanker::load(Some(run.model.as_path()), &config)?;
    let mut builder = PipelineBuilder::new(config.clone())
        .ranker(ranker)
        .language_model(language_model(&config.llm));
    if let Some(log) = log {
        builder = builder.training_log(log);
    }

    match &run.input {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read input: {}", path.display()))?;
            let records: Vec<RawRecord> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse input: {}", path.display()))?;
            info!("Loaded {} raw records from {}", records.len(), path.display());
            builder = builder.add_source(Box::new(StaticSource::new("input", records)));
        }
        None => {
            let sources = SourceConfig::from_env();
            let fetcher = Arc::new(Fetcher::new(config.fetch.clone())?);
            if sources.edgar_enabled {
                builder = builder.add_source(Box::new(EdgarFilingSource::new(fetcher.clone())));
            }
            builder = builder
                .add_source(Box::new(MarketauxSource::new(fetcher.clone(), sources.clone())))
                .add_source(Box::new(NewsApiSource::new(fetcher, sources)));
        }
    }

    let pipeline = builder.build();
    let output = pipeline.run().await?;

    let rendered = match run.format {
        OutputFormat::Json => serde_json::to_string_pretty(&feed_payload(&output, Utc::now()))?,
        OutputFormat::Brief => compose_brief(&output.items, run.top),
    };

    match &run.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, rendered)?;
            info!("Saved output to {}", path.display());
        }
        None => println!("{}", rendered),
    }

    if let Some(log) = pipeline.training_log() {
        info!("Training log holds {} rows", log.rows().await?.len());
    }
    Ok(())
}

fn read_ids(path: &Path) -> Result<HashSet<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read id list: {}", path.display()))?;
    if let Ok(ids) = serde_json::from_str::<Vec<String>>(&content) {
        return Ok(ids.into_iter().collect());
    }
    Ok(content
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(|id| id.trim().trim_matches('"').to_string())
        .filter(|id| !id.is_empty() && id != "id")
        .collect())
}

async fn cmd_label(training_log: &Path, ids: &Path) -> Result<()> {
    if !training_log.exists() {
        anyhow::bail!("{} not found. Run the pipeline first.", training_log.display());
    }
    let positives = read_ids(ids)?;
    let log = TrainingLog::open(training_log).await?;
    let rate = log.label_positives(&positives).await?;
    println!("Positive rate: {:.3}", rate);
    log.close().await;
    Ok(())
}

fn cmd_weights(model_path: &Path, top: usize) -> Result<()> {
    let model = news_triage::LogisticModel::from_json_file(model_path)
        .with_context(|| format!("Failed to load model: {}", model_path.display()))?;
    println!("intercept {:>10.4}", model.intercept);
    for (column, weight, odds_ratio) in model.top_weights(top) {
        println!("{:<28} {:>10.4} {:>10.4}", column, weight, odds_ratio);
    }
    Ok(())
}
