use crate::types::{Result, TriageError};
use chrono::Utc;
use feed_rs::parser;
use interfaces::defs::FilingEntry;
use tracing::{debug, info};

/// Turns a filing Atom feed into provider records.
pub struct FilingFeedParser;

impl FilingFeedParser {
    pub fn parse(content: &str) -> Result<Vec<FilingEntry>> {
        debug!("Parsing filing feed ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| TriageError::Parse(format!("Failed to parse feed: {}", e)))?;

        let entries: Vec<FilingEntry> = feed.entries.into_iter().map(Self::parse_entry).collect();

        info!("Parsed filing feed with {} entries", entries.len());
        Ok(entries)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> FilingEntry {
        let link = entry.links.first().map(|link| link.href.clone());
        let title = entry.title.map(|t| t.content);
        // Atom filings carry the item list in the summary; fall back to content
        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body));
        let published = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        FilingEntry {
            link,
            title,
            summary,
            published,
        }
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();
        content_lower.contains("<feed") || content_lower.contains("<rss")
    }
}
