use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{NewsRecord, Provenance, RawRecord, Signals};
use interfaces::defs::{FilingEntry, MarketauxArticle, MarketauxSymbol, NewsApiArticle};

pub const FILING_SOURCE: &str = "sec_edgar";
pub const MARKETAUX_SOURCE: &str = "marketaux";
pub const BODY_LIMIT: usize = 8000;

static HTML_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<]+?>").expect("html tag pattern"));
static CIK_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/edgar/data/(\d+)/").expect("cik pattern"));

/// Content fingerprint: SHA-256 over the parts joined by a unit separator,
/// first 16 hex chars.
pub fn fingerprint(source: &str, url: &str, headline: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(url.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(headline.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

pub fn strip_html(text: &str) -> String {
    HTML_TAGS.replace_all(text, "").trim().to_string()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

/// Parse provider timestamps; anything unreadable becomes `now`.
pub fn parse_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return now;
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), format) {
            return naive.and_utc();
        }
    }

    debug!("Unparseable timestamp '{}', using batch time", raw);
    now
}

/// Central index key from a filing archive link, without leading zeros.
pub fn extract_cik(link: &str) -> Option<String> {
    let digits = CIK_PATH.captures(link)?.get(1)?.as_str();
    let trimmed = digits.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
}

/// Build a fresh record with all enrichment fields unset.
pub fn base_record(
    source: &str,
    url: &str,
    headline: &str,
    body: &str,
    published_at: DateTime<Utc>,
) -> NewsRecord {
    let headline = headline.trim();
    NewsRecord {
        id: fingerprint(source, url, headline),
        published_at,
        source: source.to_string(),
        url: url.to_string(),
        headline: headline.to_string(),
        body_text: truncate_chars(&strip_html(body), BODY_LIMIT),
        tickers: BTreeSet::new(),
        event_type: None,
        urgency: None,
        entities: Vec::new(),
        sectors: Vec::new(),
        asset_classes: Vec::new(),
        regions: Vec::new(),
        confidence: None,
        severity: None,
        summary: None,
        signals: Signals::default(),
        provenance: Provenance::default(),
    }
}

fn text_or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .unwrap_or(default)
}

/// Maps provider records onto `NewsRecord`. The only place that knows provider field names.
pub struct Normalizer {
    cik_tickers: BTreeMap<String, String>,
}

impl Normalizer {
    pub fn new(cik_tickers: BTreeMap<String, String>) -> Self {
        Self { cik_tickers }
    }

    pub fn normalize(&self, raw: &RawRecord, now: DateTime<Utc>) -> NewsRecord {
        match raw {
            RawRecord::Filing(entry) => self.normalize_filing(entry, now),
            RawRecord::Marketaux(article) => self.normalize_marketaux(article, now),
            RawRecord::NewsApi(article) => self.normalize_newsapi(article, now),
        }
    }

    pub fn normalize_batch(&self, raws: &[RawRecord], now: DateTime<Utc>) -> Vec<NewsRecord> {
        raws.iter().map(|raw| self.normalize(raw, now)).collect()
    }

    fn normalize_filing(&self, entry: &FilingEntry, now: DateTime<Utc>) -> NewsRecord {
        let link = entry.link.as_deref().unwrap_or("");
        let mut record = base_record(
            FILING_SOURCE,
            link,
            text_or(&entry.title, "SEC Filing"),
            entry.summary.as_deref().unwrap_or(""),
            entry.published.unwrap_or(now),
        );

        if let Some(ticker) = extract_cik(link).and_then(|cik| self.cik_tickers.get(&cik)) {
            record.tickers.insert(ticker.to_uppercase());
        }
        record
    }

    fn normalize_marketaux(&self, article: &MarketauxArticle, now: DateTime<Utc>) -> NewsRecord {
        let body = article
            .description
            .as_deref()
            .filter(|text| !text.is_empty())
            .or(article.snippet.as_deref())
            .unwrap_or("");
        let published = article
            .published_at
            .as_deref()
            .filter(|text| !text.is_empty())
            .or(article.updated_at.as_deref());

        let mut record = base_record(
            MARKETAUX_SOURCE,
            article.url.as_deref().unwrap_or(""),
            text_or(&article.title, "MarketAux"),
            body,
            parse_timestamp(published, now),
        );

        let symbols = article
            .symbols
            .as_ref()
            .filter(|symbols| !symbols.is_empty())
            .or(article.entities.as_ref());
        for symbol in symbols.into_iter().flatten() {
            let value = match symbol {
                MarketauxSymbol::Plain(value) => Some(value.as_str()),
                MarketauxSymbol::Entity { symbol } => symbol.as_deref(),
            };
            if let Some(ticker) = value.map(str::trim).filter(|value| !value.is_empty()) {
                record.tickers.insert(ticker.to_uppercase());
            }
        }
        record
    }

    fn normalize_newsapi(&self, article: &NewsApiArticle, now: DateTime<Utc>) -> NewsRecord {
        let combined = format!(
            "{}\n\n{}",
            article.description.as_deref().unwrap_or(""),
            article.content.as_deref().unwrap_or("")
        );
        let source = article
            .source
            .as_ref()
            .and_then(|source| source.name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("newsapi");

        base_record(
            source,
            article.url.as_deref().unwrap_or(""),
            text_or(&article.title, "NewsAPI"),
            combined.trim(),
            parse_timestamp(article.published_at.as_deref(), now),
        )
    }
}
