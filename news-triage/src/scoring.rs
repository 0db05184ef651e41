use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use url::Url;

use crate::config::{ScoringConfig, TriageConfig};
use crate::types::{NewsRecord, Severity, Urgency};

/// Undecayed and decayed heuristic confidence of one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicScore {
    pub base: f64,
    pub decayed: f64,
}

pub fn hours_old(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let seconds = (now - published_at).num_milliseconds() as f64 / 1000.0;
    (seconds / 3600.0).max(0.0)
}

/// `0.5^(hours_old / half_life)`: 1.0 when fresh, 0.5 after one half-life.
pub fn time_decay(published_at: DateTime<Utc>, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    0.5_f64.powf(hours_old(published_at, now) / half_life_hours)
}

/// True when an outlet name matches a token of the source name or the URL host,
/// either exactly or as a dot-delimited label run (`ft` matches `www.ft.com`).
pub fn is_tier1_outlet(outlets: &[String], source: &str, url: &str) -> bool {
    let mut candidates: Vec<String> = source
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .filter(|token| !token.is_empty())
        .map(|token| token.trim_matches('.').to_string())
        .collect();
    if let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
        candidates.push(host);
    }

    outlets.iter().any(|outlet| {
        let outlet = outlet.to_lowercase();
        let needle = format!(".{}.", outlet);
        candidates
            .iter()
            .any(|candidate| *candidate == outlet || format!(".{}.", candidate).contains(&needle))
    })
}

pub fn on_watchlist(record: &NewsRecord, watchlist: &BTreeSet<String>) -> bool {
    record.tickers.iter().any(|ticker| watchlist.contains(ticker))
}

/// Deterministic base confidence from source, event, urgency, keywords and tickers.
pub struct HeuristicScorer {
    scoring: ScoringConfig,
    watchlist: BTreeSet<String>,
}

impl HeuristicScorer {
    pub fn new(mut scoring: ScoringConfig, watchlist: BTreeSet<String>) -> Self {
        scoring.normalize_keywords();
        Self { scoring, watchlist }
    }

    pub fn from_config(config: &TriageConfig) -> Self {
        Self::new(config.scoring.clone(), config.watchlist.clone())
    }

    pub fn is_tier1(&self, record: &NewsRecord) -> bool {
        !record.is_filing() && is_tier1_outlet(&self.scoring.tier1_outlets, &record.source, &record.url)
    }

    pub fn on_watchlist(&self, record: &NewsRecord) -> bool {
        on_watchlist(record, &self.watchlist)
    }

    pub fn source_weight(&self, record: &NewsRecord) -> f64 {
        if record.is_filing() {
            let headline = record.headline.as_str();
            if headline.starts_with("8-K") {
                self.scoring.sec_8k
            } else if headline.starts_with("10-Q") {
                self.scoring.sec_10q
            } else if headline.starts_with("10-K") {
                self.scoring.sec_10k
            } else {
                self.scoring.sec_other
            }
        } else if self.is_tier1(record) {
            self.scoring.tier1_press
        } else {
            self.scoring.other_press
        }
    }

    pub fn event_weight(&self, record: &NewsRecord) -> f64 {
        self.scoring
            .event_weights
            .get(&record.event_or_other())
            .copied()
            .unwrap_or(self.scoring.default_event_weight)
    }

    pub fn urgency_weight(&self, record: &NewsRecord) -> f64 {
        match record.urgency {
            Some(Urgency::High) => self.scoring.urgency_high,
            Some(Urgency::Med) => self.scoring.urgency_med,
            Some(Urgency::Low) | None => 0.0,
        }
    }

    /// Single fixed bonus however many keywords appear.
    pub fn keyword_nudge(&self, record: &NewsRecord) -> f64 {
        let headline = record.headline.to_lowercase();
        let hit = self
            .scoring
            .nudge_keywords
            .iter()
            .any(|keyword| headline.contains(keyword.as_str()));
        if hit {
            self.scoring.keyword_nudge
        } else {
            0.0
        }
    }

    /// Undecayed score in [0, 1]. Independent of `published_at`.
    pub fn base_score(&self, record: &NewsRecord) -> f64 {
        let mut score = self.source_weight(record)
            + self.event_weight(record)
            + self.urgency_weight(record)
            + self.keyword_nudge(record);
        if !record.tickers.is_empty() {
            score += self.scoring.ticker_present;
        }
        if self.on_watchlist(record) {
            score += self.scoring.watchlist_boost;
        }
        score.clamp(0.0, 1.0)
    }

    pub fn score(&self, record: &NewsRecord, now: DateTime<Utc>) -> HeuristicScore {
        let base = self.base_score(record);
        let decayed = base * time_decay(record.published_at, now, self.scoring.half_life_hours);
        HeuristicScore { base, decayed }
    }

    /// Scores the record and stores both values in its signals.
    pub fn apply(&self, record: &mut NewsRecord, now: DateTime<Utc>) -> HeuristicScore {
        let score = self.score(record, now);
        record.signals.heuristic_base = Some(score.base);
        record.signals.heuristic_decayed = Some(score.decayed);
        score
    }

    pub fn severity(&self, base: f64) -> Severity {
        if base >= self.scoring.severity_high {
            Severity::High
        } else if base >= self.scoring.severity_med {
            Severity::Med
        } else {
            Severity::Low
        }
    }
}
