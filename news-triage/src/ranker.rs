use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{TaxonomyConfig, TriageConfig};
use crate::scoring::{hours_old, is_tier1_outlet, on_watchlist};
use crate::types::{FeatureVector, NewsRecord, Result, TrainingRow, TriageError, Urgency};

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Named feature columns of one record, as the learned model sees them.
/// `taxonomy.ranker_keywords` are expected in lowercase.
pub fn build_features(
    record: &NewsRecord,
    taxonomy: &TaxonomyConfig,
    watchlist: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> FeatureVector {
    let headline = record.headline.to_lowercase();
    let keyword_hits = taxonomy
        .ranker_keywords
        .iter()
        .filter(|keyword| headline.contains(keyword.as_str()))
        .count();
    let filing = record.is_filing();

    let mut features = FeatureVector::new();
    features.insert("sec_8k".into(), flag(filing && record.headline.starts_with("8-K")));
    features.insert("sec_10q".into(), flag(filing && record.headline.starts_with("10-Q")));
    features.insert("sec_10k".into(), flag(filing && record.headline.starts_with("10-K")));
    features.insert(
        "tier1".into(),
        flag(is_tier1_outlet(&taxonomy.ranker_tier1, &record.source, &record.url)),
    );
    features.insert("urg_high".into(), flag(record.urgency == Some(Urgency::High)));
    features.insert("urg_med".into(), flag(record.urgency == Some(Urgency::Med)));
    features.insert("kw_hits".into(), keyword_hits as f64);
    features.insert("has_tickers".into(), flag(!record.tickers.is_empty()));
    features.insert("on_watch".into(), flag(on_watchlist(record, watchlist)));
    features.insert(
        "llm_conf".into(),
        record.signals.llm_confidence.unwrap_or(0.5),
    );
    features.insert("hours_old".into(), hours_old(record.published_at, now));
    features.insert(format!("ev_{}", record.event_or_other()), 1.0);
    features
}

/// Persisted logistic regression. Columns absent from a feature vector read as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub intercept: f64,
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
}

impl LogisticModel {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let model: LogisticModel = serde_json::from_str(&content)?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() {
            return Err(TriageError::InvalidModel("intercept is not finite".to_string()));
        }
        if let Some((column, _)) = self.coefficients.iter().find(|(_, w)| !w.is_finite()) {
            return Err(TriageError::InvalidModel(format!(
                "coefficient for '{}' is not finite",
                column
            )));
        }
        Ok(())
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let logit = self.intercept
            + self
                .coefficients
                .iter()
                .map(|(column, weight)| weight * features.get(column).copied().unwrap_or(0.0))
                .sum::<f64>();
        1.0 / (1.0 + (-logit).exp())
    }

    /// Largest coefficients by magnitude, with their odds ratios.
    pub fn top_weights(&self, limit: usize) -> Vec<(String, f64, f64)> {
        let mut weights: Vec<(String, f64, f64)> = self
            .coefficients
            .iter()
            .map(|(column, weight)| (column.clone(), *weight, weight.exp()))
            .collect();
        weights.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(Ordering::Equal));
        weights.truncate(limit);
        weights
    }
}

/// Learned probability per record id. Without a model every lookup is empty.
pub struct LearnedRanker {
    model: Option<LogisticModel>,
    taxonomy: TaxonomyConfig,
    watchlist: BTreeSet<String>,
}

impl LearnedRanker {
    pub fn new(model: Option<LogisticModel>, config: &TriageConfig) -> Self {
        let mut taxonomy = config.taxonomy.clone();
        taxonomy.normalize_keywords();
        Self {
            model,
            taxonomy,
            watchlist: config.watchlist.clone(),
        }
    }

    /// A missing file means cold start; an unreadable one is an error.
    pub fn load(path: Option<&Path>, config: &TriageConfig) -> Result<Self> {
        let model = match path {
            Some(path) if path.exists() => {
                let model = LogisticModel::from_json_file(path)?;
                info!(
                    "Loaded ranker model from {} ({} coefficients)",
                    path.display(),
                    model.coefficients.len()
                );
                Some(model)
            }
            Some(path) => {
                warn!("No ranker model at {}, running without learned scores", path.display());
                None
            }
            None => None,
        };
        Ok(Self::new(model, config))
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&LogisticModel> {
        self.model.as_ref()
    }

    pub fn features(&self, record: &NewsRecord, now: DateTime<Utc>) -> FeatureVector {
        build_features(record, &self.taxonomy, &self.watchlist, now)
    }

    pub fn infer(&self, records: &[NewsRecord], now: DateTime<Utc>) -> HashMap<String, f64> {
        let Some(model) = &self.model else {
            return HashMap::new();
        };
        records
            .iter()
            .map(|record| (record.id.clone(), model.predict(&self.features(record, now))))
            .collect()
    }

    pub fn training_rows(&self, records: &[NewsRecord], now: DateTime<Utc>) -> Vec<TrainingRow> {
        records
            .iter()
            .map(|record| TrainingRow {
                id: record.id.clone(),
                features: self.features(record, now),
                label: None,
            })
            .collect()
    }
}
