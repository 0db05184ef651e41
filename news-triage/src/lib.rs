pub mod types;
pub mod config;
pub mod normalize;
pub mod dedupe;
pub mod enrich;
pub mod scoring;
pub mod selection;
pub mod ranker;
pub mod blend;
pub mod llm_json;
pub mod llm_adapter;
pub mod fetcher;
pub mod parser;
pub mod traits;
pub mod sources;
pub mod pipeline;
pub mod brief;

pub use types::*;
pub use config::{SourceConfig, TriageConfig};
pub use normalize::Normalizer;
pub use dedupe::dedupe;
pub use enrich::Enricher;
pub use scoring::{HeuristicScore, HeuristicScorer};
pub use selection::{PrioritySelector, SummarizationSelector};
pub use ranker::{LearnedRanker, LogisticModel};
pub use blend::Blender;
pub use llm_adapter::{Classifier, MockLanguageModel, OpenAiCompatibleModel, Summarizer};
pub use fetcher::Fetcher;
pub use parser::FilingFeedParser;
pub use traits::{SourceConnector, StaticSource};
pub use pipeline::{PipelineBuilder, TriagePipeline};
