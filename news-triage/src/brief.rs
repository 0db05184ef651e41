use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::llm_adapter::Summarizer;
use crate::normalize::truncate_chars;
use crate::types::{timestamp, Counts, NewsRecord, Provenance, Signals, TriageOutput};

const BRIEF_HEADLINE_CHARS: usize = 120;
const BRIEF_WHY_DEFAULT: &str = "Potential portfolio impact; confirm details.";

/// Plain-text analyst brief of the highest-confidence items.
pub fn compose_brief(items: &[NewsRecord], top_n: usize) -> String {
    info!("Composing analyst brief for {} items", items.len().min(top_n));

    let mut ranked: Vec<&NewsRecord> = items.iter().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .unwrap_or(0.0)
            .partial_cmp(&a.confidence.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(top_n);

    if ranked.is_empty() {
        return "No relevant items in this run.\n".to_string();
    }

    let mut brief = String::new();
    brief.push_str(&format!("=== Analyst Brief (Top {}) ===\n", ranked.len()));

    for (i, record) in ranked.iter().enumerate() {
        let bullets = match &record.summary {
            Some(summary) => summary.bullets.clone(),
            None => Summarizer::fallback_bullets(record),
        };
        let why = record
            .summary
            .as_ref()
            .map(|summary| summary.why_it_matters.as_str())
            .filter(|why| !why.trim().is_empty())
            .unwrap_or(BRIEF_WHY_DEFAULT);

        brief.push_str(&format!(
            "\n[{}] {}\n",
            i + 1,
            truncate_chars(&record.headline, BRIEF_HEADLINE_CHARS)
        ));
        brief.push_str(&format!(
            "   Confidence: {:.2} · Severity: {} · Event: {}\n",
            record.confidence.unwrap_or(0.0),
            record.severity.map(|s| s.as_str()).unwrap_or("low"),
            record.event_or_other().as_str().replace('_', " "),
        ));
        for bullet in bullets.iter().take(3) {
            brief.push_str(&format!(" • {}\n", bullet));
        }
        brief.push_str(&format!("   Why it matters: {}\n", why));
        brief.push_str(&format!("   Link: {}\n", record.url));
    }

    debug!("Brief is {} bytes", brief.len());
    brief
}

/// One output item with its internal signals and provenance flags exposed.
#[derive(Debug, Serialize)]
pub struct FeedItem<'a> {
    #[serde(flatten)]
    pub record: &'a NewsRecord,
    pub signals: &'a Signals,
    pub provenance: &'a Provenance,
}

#[derive(Debug, Serialize)]
pub struct FeedMeta<'a> {
    pub generated_at: String,
    pub counts: &'a Counts,
    pub version: u32,
}

/// JSON document consumed by presentation layers.
#[derive(Debug, Serialize)]
pub struct FeedPayload<'a> {
    pub meta: FeedMeta<'a>,
    pub items: Vec<FeedItem<'a>>,
}

pub fn feed_payload(output: &TriageOutput, generated_at: DateTime<Utc>) -> FeedPayload<'_> {
    FeedPayload {
        meta: FeedMeta {
            generated_at: timestamp::format(&generated_at),
            counts: &output.counts,
            version: 1,
        },
        items: output
            .items
            .iter()
            .map(|record| FeedItem {
                record,
                signals: &record.signals,
                provenance: &record.provenance,
            })
            .collect(),
    }
}
