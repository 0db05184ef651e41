use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::config::TaxonomyConfig;
use crate::types::{EventType, NewsRecord, Urgency};

static FILING_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Item\s+(\d+\.\d+)").expect("filing item pattern"));
static PAREN_TICKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([A-Z]{1,5})\)").expect("ticker pattern"));

/// Result of reading filing item codes out of a filing's text.
#[derive(Debug, Clone, PartialEq)]
pub struct FilingClassification {
    pub event: Option<EventType>,
    pub urgency: Option<Urgency>,
    pub codes: Vec<String>,
}

/// Rule-based enrichment. Every mutation fills a field only when it is still empty,
/// so running it twice changes nothing.
pub struct Enricher {
    taxonomy: TaxonomyConfig,
}

impl Enricher {
    pub fn new(mut taxonomy: TaxonomyConfig) -> Self {
        taxonomy.normalize_keywords();
        Self { taxonomy }
    }

    pub fn enrich(&self, record: &mut NewsRecord) {
        self.enrich_tickers(record);
        if record.is_filing() {
            self.apply_filing_codes(record);
        } else {
            self.enrich_event(record);
        }
    }

    pub fn enrich_tickers(&self, record: &mut NewsRecord) {
        if !record.tickers.is_empty() {
            return;
        }

        let headline_lower = record.headline.to_lowercase();
        let mut found: BTreeSet<String> = self
            .taxonomy
            .name_aliases
            .iter()
            .filter(|(name, _)| headline_lower.contains(name.to_lowercase().as_str()))
            .map(|(_, ticker)| ticker.to_uppercase())
            .collect();

        for capture in PAREN_TICKER.captures_iter(&record.headline) {
            let ticker = &capture[1];
            if self.taxonomy.valid_tickers.contains(ticker) {
                found.insert(ticker.to_string());
            }
        }

        for token in slug_tokens(&record.url) {
            if self.taxonomy.valid_tickers.contains(&token) {
                found.insert(token);
            }
        }

        record.tickers = found;
    }

    pub fn enrich_event(&self, record: &mut NewsRecord) {
        let text = format!("{} {}", record.headline, record.body_text).to_lowercase();

        let hit = self.taxonomy.keyword_events.iter().find(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| text.contains(keyword.as_str()))
        });

        if let Some(rule) = hit {
            let urgency = if self.taxonomy.high_urgency_events.contains(&rule.event) {
                Urgency::High
            } else {
                Urgency::Med
            };
            record.event_type.get_or_insert(rule.event);
            record.urgency.get_or_insert(urgency);
        }
    }

    /// Item codes in order of appearance; the most urgent one decides, first found on ties.
    pub fn classify_filing(&self, text: &str) -> FilingClassification {
        let codes: Vec<String> = FILING_ITEM
            .captures_iter(text)
            .map(|capture| capture[1].to_string())
            .collect();

        let mut best: Option<(EventType, Urgency)> = None;
        for code in &codes {
            let (event, urgency) = self
                .taxonomy
                .filing_items
                .get(code)
                .map(|rule| (rule.event, rule.urgency))
                .unwrap_or((EventType::OtherEvents, Urgency::Low));
            let better = match best {
                Some((_, current)) => urgency.rank() > current.rank(),
                None => true,
            };
            if better {
                best = Some((event, urgency));
            }
        }

        FilingClassification {
            event: best.map(|(event, _)| event),
            urgency: best.map(|(_, urgency)| urgency),
            codes,
        }
    }

    pub fn apply_filing_codes(&self, record: &mut NewsRecord) {
        let classification = self.classify_filing(&record.body_text);
        if let Some(event) = classification.event {
            record.event_type.get_or_insert(event);
        }
        if let Some(urgency) = classification.urgency {
            record.urgency.get_or_insert(urgency);
        }
        if record.entities.is_empty() {
            record.entities = classification.codes;
        }
    }
}

/// Uppercased tokens of the URL path, split on slashes, dashes and underscores.
fn slug_tokens(raw_url: &str) -> Vec<String> {
    let path = match Url::parse(raw_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw_url.to_string(),
    };
    path.split(['/', '-', '_'])
        .filter(|token| !token.is_empty())
        .map(|token| token.to_uppercase())
        .collect()
}
