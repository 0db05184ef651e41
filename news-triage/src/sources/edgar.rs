use crate::fetcher::Fetcher;
use crate::parser::FilingFeedParser;
use crate::traits::SourceConnector;
use crate::types::{RawRecord, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

const EDGAR_CURRENT_URL: &str = "https://www.sec.gov/cgi-bin/browse-edgar";
const FORM_TYPES: [&str; 3] = ["8-K", "10-Q", "10-K"];

/// Polls the regulator's "current filings" Atom feeds, one per form type.
pub struct EdgarFilingSource {
    fetcher: Arc<Fetcher>,
    base_url: String,
    form_types: Vec<String>,
}

impl EdgarFilingSource {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: EDGAR_CURRENT_URL.to_string(),
            form_types: FORM_TYPES.iter().map(|form| form.to_string()).collect(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_form_types(mut self, form_types: Vec<String>) -> Self {
        self.form_types = form_types;
        self
    }

    fn query(form_type: &str) -> Vec<(&'static str, String)> {
        vec![
            ("action", "getcurrent".to_string()),
            ("CIK", String::new()),
            ("type", form_type.to_string()),
            ("count", "100".to_string()),
            ("owner", "exclude".to_string()),
            ("output", "atom".to_string()),
        ]
    }
}

#[async_trait]
impl SourceConnector for EdgarFilingSource {
    fn name(&self) -> String {
        "sec_edgar".to_string()
    }

    async fn pull(&self) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();

        for form_type in &self.form_types {
            let content = match self.fetcher.get_text(&self.base_url, &Self::query(form_type)).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping {} filings: {}", form_type, e);
                    continue;
                }
            };

            match FilingFeedParser::parse(&content) {
                Ok(entries) => {
                    info!("Pulled {} {} filings", entries.len(), form_type);
                    records.extend(entries.into_iter().map(RawRecord::Filing));
                }
                Err(e) => warn!("Skipping {} filings: {}", form_type, e),
            }
        }

        Ok(records)
    }
}
