use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use interfaces::defs::{FeatureVector, LlmTask, RawRecord, TrainingRow};

/// Coarse event taxonomy. Labels outside it collapse to `OtherEvents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Mna,
    TerminationMaterialAgreement,
    Bankruptcy,
    EarningsSurprise,
    NewDebtObligation,
    TriggeringEventDebt,
    Impairment,
    RestructuringCosts,
    UnregisteredSale,
    SecurityHolderRightsChange,
    AuditorChange,
    NonReliance,
    CeoExit,
    ShareholderVote,
    RegFd,
    GuidanceChange,
    RatingChange,
    RegulatorySanction,
    Geopolitics,
    DividendChange,
    CentralBank,
    Regulatory,
    SectorShock,
    OtherEvents,
}

impl EventType {
    pub const ALL: [EventType; 24] = [
        EventType::Mna,
        EventType::TerminationMaterialAgreement,
        EventType::Bankruptcy,
        EventType::EarningsSurprise,
        EventType::NewDebtObligation,
        EventType::TriggeringEventDebt,
        EventType::Impairment,
        EventType::RestructuringCosts,
        EventType::UnregisteredSale,
        EventType::SecurityHolderRightsChange,
        EventType::AuditorChange,
        EventType::NonReliance,
        EventType::CeoExit,
        EventType::ShareholderVote,
        EventType::RegFd,
        EventType::GuidanceChange,
        EventType::RatingChange,
        EventType::RegulatorySanction,
        EventType::Geopolitics,
        EventType::DividendChange,
        EventType::CentralBank,
        EventType::Regulatory,
        EventType::SectorShock,
        EventType::OtherEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Mna => "mna",
            EventType::TerminationMaterialAgreement => "termination_material_agreement",
            EventType::Bankruptcy => "bankruptcy",
            EventType::EarningsSurprise => "earnings_surprise",
            EventType::NewDebtObligation => "new_debt_obligation",
            EventType::TriggeringEventDebt => "triggering_event_debt",
            EventType::Impairment => "impairment",
            EventType::RestructuringCosts => "restructuring_costs",
            EventType::UnregisteredSale => "unregistered_sale",
            EventType::SecurityHolderRightsChange => "security_holder_rights_change",
            EventType::AuditorChange => "auditor_change",
            EventType::NonReliance => "non_reliance",
            EventType::CeoExit => "ceo_exit",
            EventType::ShareholderVote => "shareholder_vote",
            EventType::RegFd => "reg_fd",
            EventType::GuidanceChange => "guidance_change",
            EventType::RatingChange => "rating_change",
            EventType::RegulatorySanction => "regulatory_sanction",
            EventType::Geopolitics => "geopolitics",
            EventType::DividendChange => "dividend_change",
            EventType::CentralBank => "central_bank",
            EventType::Regulatory => "regulatory",
            EventType::SectorShock => "sector_shock",
            EventType::OtherEvents => "other_events",
        }
    }

    /// Lenient label lookup used for model output and config tables.
    pub fn parse(label: &str) -> EventType {
        let key = label.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == key)
            .unwrap_or(EventType::OtherEvents)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Med,
    Low,
}

impl Urgency {
    /// Ordering rank, higher is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Urgency::High => 2,
            Urgency::Med => 1,
            Urgency::Low => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::High => "high",
            Urgency::Med => "med",
            Urgency::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Med,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Med => "med",
            Severity::Low => "low",
        }
    }
}

/// Analyst card attached to summarization-selected records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub headline: String,
    pub bullets: Vec<String>,
    pub why_it_matters: String,
    pub draft_note: String,
}

/// Intermediate scores kept for blending and the feature vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub heuristic_base: Option<f64>,
    pub heuristic_decayed: Option<f64>,
    pub learned: Option<f64>,
    pub llm_confidence: Option<f64>,
}

/// Which stages touched a record and whether they fell back. Never read by decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub classified: bool,
    pub classify_fallback: bool,
    pub summarized: bool,
    pub summary_fallback: bool,
    pub headline_fallback: bool,
    pub bullets_fallback: bool,
    pub why_fallback: bool,
    pub learned_scored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: String,
    #[serde(with = "timestamp")]
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub url: String,
    pub headline: String,
    pub body_text: String,
    #[serde(default)]
    pub tickers: BTreeSet<String>,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub asset_classes: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(skip)]
    pub signals: Signals,
    #[serde(skip)]
    pub provenance: Provenance,
}

impl NewsRecord {
    pub fn is_filing(&self) -> bool {
        self.source.eq_ignore_ascii_case(crate::normalize::FILING_SOURCE)
    }

    /// Current-report filing, recognised by its form prefix in the headline.
    pub fn is_filing_8k(&self) -> bool {
        self.is_filing() && self.headline.starts_with("8-K")
    }

    pub fn event_or_other(&self) -> EventType {
        self.event_type.unwrap_or(EventType::OtherEvents)
    }
}

/// Aggregate counters of one pipeline pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counts {
    pub sources: BTreeMap<String, usize>,
    pub total_deduped: usize,
    pub relevant: usize,
    pub classified: usize,
    pub summarized: usize,
    pub classify_fallback: usize,
    pub summarize_fallback: usize,
    pub learned_scored: usize,
    pub classify_errors: usize,
    pub summarize_errors: usize,
}

/// Ranked, filtered records plus counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageOutput {
    pub counts: Counts,
    pub items: Vec<NewsRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Upstream returned {status} for {url}")]
    Upstream { status: u16, url: String },

    #[error("Model file is invalid: {0}")]
    InvalidModel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;

/// `YYYY-MM-DDTHH:MM:SSZ` on the wire.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn format(value: &DateTime<Utc>) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .or_else(|_| DateTime::parse_from_rfc3339(&raw).map(|dt| dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}
