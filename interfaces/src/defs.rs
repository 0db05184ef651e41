use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry from a regulatory filing Atom feed, as the connector saw it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilingEntry {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
}

/// A symbol as Marketaux reports it: either a bare string or an entity object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarketauxSymbol {
    Plain(String),
    Entity {
        #[serde(default)]
        symbol: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketauxArticle {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub symbols: Option<Vec<MarketauxSymbol>>,
    #[serde(default)]
    pub entities: Option<Vec<MarketauxSymbol>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsApiSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsApiArticle {
    #[serde(default)]
    pub source: Option<NewsApiSource>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "publishedAt")]
    pub published_at: Option<String>,
}

/// Provider-specific record handed over by a source connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", content = "record", rename_all = "snake_case")]
pub enum RawRecord {
    Filing(FilingEntry),
    Marketaux(MarketauxArticle),
    NewsApi(NewsApiArticle),
}

impl RawRecord {
    /// Stable provider key used for per-source counts.
    pub fn provider(&self) -> &'static str {
        match self {
            RawRecord::Filing(_) => "sec_edgar",
            RawRecord::Marketaux(_) => "marketaux",
            RawRecord::NewsApi(_) => "newsapi",
        }
    }
}

/// Which kind of call is being made; backends may route tasks to different models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTask {
    Classify,
    Summarize,
    Explain,
}

impl LlmTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmTask::Classify => "classify",
            LlmTask::Summarize => "summarize",
            LlmTask::Explain => "explain",
        }
    }
}

/// Hosted language model, seen as a black box.
///
/// `Ok(None)` means the model had nothing to say. Callers treat errors, empty
/// answers and unparseable answers the same way: they fall back.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> String;

    async fn generate(&self, task: LlmTask, prompt: &str) -> Result<Option<String>>;
}

/// Named feature columns for the learned ranker. Ordered so serialization is stable.
pub type FeatureVector = BTreeMap<String, f64>;

/// One row of the durable training log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub id: String,
    pub features: FeatureVector,
    pub label: Option<bool>,
}
