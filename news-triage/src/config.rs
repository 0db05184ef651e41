use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{EventType, Result, TriageError, Urgency};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn lowercase_all(values: &mut [String]) {
    for value in values.iter_mut() {
        *value = value.to_lowercase();
    }
}

/// Immutable tables and knobs for one pipeline pass.
///
/// Every component receives the sections it needs at construction. A JSON file
/// may override any subset of fields; the rest keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub watchlist: BTreeSet<String>,
    pub scoring: ScoringConfig,
    pub selection: SelectionConfig,
    pub blend: BlendConfig,
    pub taxonomy: TaxonomyConfig,
    pub llm: LlmConfig,
    pub fetch: FetchConfig,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            watchlist: ["FDX", "NVDA", "INTC", "CRWD", "AMD", "AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"]
                .iter()
                .map(|ticker| ticker.to_string())
                .collect(),
            scoring: ScoringConfig::default(),
            selection: SelectionConfig::default(),
            blend: BlendConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            llm: LlmConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl TriageConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: TriageConfig = serde_json::from_str(&content)?;
        config.normalize_keywords();
        config.validate()?;
        Ok(config)
    }

    /// Lowercases every keyword list; matching runs against lowercased text.
    pub fn normalize_keywords(&mut self) {
        self.scoring.normalize_keywords();
        self.taxonomy.normalize_keywords();
    }

    pub fn with_watchlist<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.watchlist = tickers
            .into_iter()
            .map(|ticker| ticker.as_ref().trim().to_uppercase())
            .filter(|ticker| !ticker.is_empty())
            .collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let half_life = self.scoring.half_life_hours;
        if !half_life.is_finite() || half_life <= 0.0 {
            return Err(TriageError::Config("half_life_hours must be positive".to_string()));
        }
        // a NaN is outside every range
        if !(0.0..=1.0).contains(&self.blend.ml_weight) {
            return Err(TriageError::Config("ml_weight must be within [0, 1]".to_string()));
        }
        if !(0.0..=1.0).contains(&self.selection.min_score) {
            return Err(TriageError::Config("min_score must be within [0, 1]".to_string()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(TriageError::Config("temperature must be within [0, 2]".to_string()));
        }
        if self.scoring.severity_med > self.scoring.severity_high {
            return Err(TriageError::Config(
                "severity_med must not exceed severity_high".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub sec_8k: f64,
    pub sec_10q: f64,
    pub sec_10k: f64,
    pub sec_other: f64,
    pub tier1_press: f64,
    pub other_press: f64,
    pub event_weights: BTreeMap<EventType, f64>,
    pub default_event_weight: f64,
    pub urgency_high: f64,
    pub urgency_med: f64,
    pub keyword_nudge: f64,
    pub nudge_keywords: Vec<String>,
    pub ticker_present: f64,
    pub watchlist_boost: f64,
    pub tier1_outlets: Vec<String>,
    pub half_life_hours: f64,
    pub severity_high: f64,
    pub severity_med: f64,
}

impl ScoringConfig {
    pub fn normalize_keywords(&mut self) {
        lowercase_all(&mut self.nudge_keywords);
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let event_weights = [
            (EventType::CeoExit, 0.35),
            (EventType::Bankruptcy, 0.35),
            (EventType::NonReliance, 0.35),
            (EventType::EarningsSurprise, 0.30),
            (EventType::Mna, 0.30),
            (EventType::GuidanceChange, 0.20),
            (EventType::RatingChange, 0.20),
            (EventType::RegFd, 0.10),
            (EventType::Geopolitics, 0.20),
            (EventType::UnregisteredSale, 0.15),
            (EventType::DividendChange, 0.15),
            (EventType::OtherEvents, 0.05),
        ]
        .into_iter()
        .collect();

        Self {
            sec_8k: 0.45,
            sec_10q: 0.30,
            sec_10k: 0.25,
            sec_other: 0.20,
            tier1_press: 0.30,
            other_press: 0.20,
            event_weights,
            default_event_weight: 0.05,
            urgency_high: 0.15,
            urgency_med: 0.06,
            keyword_nudge: 0.03,
            nudge_keywords: strings(&[
                "guidance", "resigns", "resignation", "appointed", "impairment", "non-reliance",
                "acquisition", "merger", "downgrade", "upgrade", "beats", "misses", "ausblick",
                "tritt zurück", "übernahme", "fusion", "abstufung", "hochstuft", "übertrifft",
                "verfehlt", "dividende", "aktienrückkauf", "insolvenz",
            ]),
            ticker_present: 0.04,
            watchlist_boost: 0.12,
            tier1_outlets: strings(&[
                "reuters", "bloomberg", "wsj", "ft", "cnbc", "marketwatch", "nzz",
                "handelszeitung", "handelsblatt", "faz", "wiwo", "boerse.ard", "tagesschau",
                "finanzen.net", "cash", "finews", "tagesanzeiger",
            ]),
            half_life_hours: 72.0,
            severity_high: 0.80,
            severity_med: 0.55,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub max_classify: usize,
    pub max_summarize: usize,
    pub material_items: BTreeSet<String>,
    pub bonus_8k: f64,
    pub bonus_tier1: f64,
    pub bonus_watchlist: f64,
    pub min_score: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_classify: 20,
            max_summarize: 20,
            material_items: ["1.01", "2.01", "2.02", "4.01", "4.02", "5.02"]
                .iter()
                .map(|code| code.to_string())
                .collect(),
            bonus_8k: 0.05,
            bonus_tier1: 0.03,
            bonus_watchlist: 0.02,
            min_score: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub ml_weight: f64,
    pub llm_nudge: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            ml_weight: 0.3,
            llm_nudge: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRule {
    pub event: EventType,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub event: EventType,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// Filing item code to event and urgency.
    pub filing_items: BTreeMap<String, ItemRule>,
    /// Scanned in order; the first rule with a hit wins.
    pub keyword_events: Vec<KeywordRule>,
    pub high_urgency_events: BTreeSet<EventType>,
    pub valid_tickers: BTreeSet<String>,
    pub name_aliases: BTreeMap<String, String>,
    pub cik_tickers: BTreeMap<String, String>,
    pub ranker_keywords: Vec<String>,
    pub ranker_tier1: Vec<String>,
}

impl TaxonomyConfig {
    pub fn normalize_keywords(&mut self) {
        lowercase_all(&mut self.ranker_keywords);
        for rule in self.keyword_events.iter_mut() {
            lowercase_all(&mut rule.keywords);
        }
    }
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        use EventType::*;
        use Urgency::{High, Low, Med};

        let filing_items = [
            ("1.01", Mna, High),
            ("1.02", TerminationMaterialAgreement, High),
            ("1.03", Bankruptcy, High),
            ("2.01", Mna, High),
            ("2.02", EarningsSurprise, High),
            ("2.03", NewDebtObligation, High),
            ("2.04", TriggeringEventDebt, High),
            ("2.05", Impairment, High),
            ("2.06", RestructuringCosts, Med),
            ("3.02", UnregisteredSale, Med),
            ("3.03", SecurityHolderRightsChange, Med),
            ("4.01", AuditorChange, High),
            ("4.02", NonReliance, High),
            ("5.02", CeoExit, High),
            ("5.03", OtherEvents, Low),
            ("5.07", ShareholderVote, Low),
            ("7.01", RegFd, Med),
            ("8.01", OtherEvents, Med),
        ]
        .into_iter()
        .map(|(code, event, urgency)| (code.to_string(), ItemRule { event, urgency }))
        .collect();

        let keyword_events = vec![
            KeywordRule {
                event: CeoExit,
                keywords: strings(&[
                    "ceo resigns", "steps down", "resigns as ceo", "appointed ceo", "names ceo",
                    "tritt zurück", "rücktritt", "scheidet aus", "neuer ceo", "zum ceo ernannt",
                ]),
            },
            KeywordRule {
                event: Mna,
                keywords: strings(&[
                    "acquires", "acquisition", "to buy", "merger", "merges with", "takeover",
                    "übernahme", "akquisition", "kauft", "fusion", "mehrheitsbeteiligung",
                ]),
            },
            KeywordRule {
                event: EarningsSurprise,
                keywords: strings(&[
                    "beats estimates", "misses estimates", "tops forecasts", "cuts outlook",
                    "raises outlook", "guidance", "übertrifft erwartungen", "verfehlt erwartungen",
                    "prognose", "ausblick angehoben", "ausblick gesenkt",
                ]),
            },
            KeywordRule {
                event: RatingChange,
                keywords: strings(&[
                    "downgrades", "upgrades", "cut to", "raised to", "initiated at", "abstufung",
                    "hochstuft", "herabgestuft", "aufgestuft", "aufnahme der bewertung",
                ]),
            },
            KeywordRule {
                event: Geopolitics,
                keywords: strings(&[
                    "sanction", "tariff", "strike", "protest", "conflict", "attack", "sanktion",
                    "zoll", "streik", "konflikt", "angriff",
                ]),
            },
            KeywordRule {
                event: DividendChange,
                keywords: strings(&[
                    "dividend", "buyback", "repurchase", "dividende", "aktienrückkauf",
                    "rückkaufprogramm",
                ]),
            },
            KeywordRule {
                event: Bankruptcy,
                keywords: strings(&["bankruptcy", "chapter 11", "insolvenz", "insolvenzverfahren"]),
            },
        ];

        let name_aliases = [
            ("fedex", "FDX"),
            ("crowdstrike", "CRWD"),
            ("nvidia", "NVDA"),
            ("intel", "INTC"),
            ("oracle", "ORCL"),
            ("deliveroo", "ROO"),
            ("darden restaurants", "DRI"),
            ("american express", "AXP"),
            ("hyundai", "HYMTF"),
            ("nestlé", "NESN.SW"),
            ("novo nordisk", "NVO"),
        ]
        .into_iter()
        .map(|(name, ticker)| (name.to_string(), ticker.to_string()))
        .collect();

        Self {
            filing_items,
            keyword_events,
            high_urgency_events: [CeoExit, Mna, EarningsSurprise, Bankruptcy].into_iter().collect(),
            valid_tickers: [
                "FDX", "CRWD", "NVDA", "INTC", "ORCL", "ROO", "DRI", "AXP", "HYMTF", "NESN.SW",
                "NVO", "AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "JPM", "BAC", "GS", "MS",
                "NFLX", "DIS",
            ]
            .iter()
            .map(|ticker| ticker.to_string())
            .collect(),
            name_aliases,
            cik_tickers: BTreeMap::new(),
            ranker_keywords: strings(&[
                "guidance", "resigns", "resignation", "appointed", "impairment", "non-reliance",
                "acquisition", "merger", "downgrade", "upgrade", "beats", "misses",
            ]),
            ranker_tier1: strings(&["reuters", "bloomberg", "wsj", "ft", "cnbc", "marketwatch"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
    pub prompt_body_chars: usize,
    pub why_body_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 20,
            prompt_body_chars: 1500,
            why_body_chars: 800,
            temperature: 0.0,
            max_tokens: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub min_host_interval_ms: u64,
    pub max_response_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "MarketNewsMonitor/1.0 (contact: ops@example.com)".to_string(),
            timeout_seconds: 20,
            max_retries: 2,
            retry_delay_seconds: 2,
            min_host_interval_ms: 1000,
            max_response_size_mb: 10,
            max_redirects: 5,
        }
    }
}

/// Credentials and query parameters for the source connectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub marketaux_token: Option<String>,
    pub newsapi_key: Option<String>,
    pub query_terms: Vec<String>,
    pub lookback_days: i64,
    pub language: String,
    pub newsapi_domains: Vec<String>,
    pub edgar_enabled: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            marketaux_token: None,
            newsapi_key: None,
            query_terms: strings(&[
                "Fed", "ECB", "Zins", "Inflation", "Ergebnis", "Quartalszahlen", "Prognose",
                "Ausblick", "Dividende", "Übernahme", "Fusion", "CEO", "Rücktritt", "Abstufung",
                "Hochstufung", "Downgrade", "Upgrade", "Guidance",
            ]),
            lookback_days: 7,
            language: "en".to_string(),
            newsapi_domains: strings(&[
                "reuters.com", "ft.com", "wsj.com", "bloomberg.com", "cnbc.com",
                "marketwatch.com", "nzz.ch", "handelszeitung.ch",
            ]),
            edgar_enabled: true,
        }
    }
}

impl SourceConfig {
    /// Read overrides from the process environment; unset variables keep defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.marketaux_token = non_empty_env("MARKETAUX_API_TOKEN");
        config.newsapi_key = non_empty_env("NEWSAPI_API_KEY");
        if let Some(terms) = non_empty_env("QUERY_TERMS") {
            config.query_terms = split_list(&terms);
        }
        if let Some(days) = non_empty_env("LOOKBACK_DAYS").and_then(|v| v.parse().ok()) {
            config.lookback_days = days;
        }
        if let Some(domains) = non_empty_env("NEWSAPI_DOMAINS") {
            config.newsapi_domains = split_list(&domains);
        }
        if let Some(flag) = non_empty_env("EDGAR_ENABLED") {
            config.edgar_enabled = !matches!(flag.to_lowercase().as_str(), "0" | "false" | "no");
        }

        config
    }

    /// Quoted terms joined with OR, the query shape both news APIs accept.
    pub fn search_query(&self) -> String {
        let query = self
            .query_terms
            .iter()
            .map(|term| format!("\"{}\"", term))
            .collect::<Vec<_>>()
            .join(" OR ");
        if query.is_empty() {
            "markets".to_string()
        } else {
            query
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}
