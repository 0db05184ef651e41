use crate::config::SourceConfig;
use crate::fetcher::Fetcher;
use crate::traits::SourceConnector;
use crate::types::{RawRecord, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use interfaces::defs::MarketauxArticle;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

const MARKETAUX_URL: &str = "https://api.marketaux.com/v1/news/all";

#[derive(Debug, Deserialize)]
struct MarketauxResponse {
    #[serde(default)]
    data: Vec<MarketauxArticle>,
}

pub struct MarketauxSource {
    fetcher: Arc<Fetcher>,
    config: SourceConfig,
    url: String,
}

impl MarketauxSource {
    pub fn new(fetcher: Arc<Fetcher>, config: SourceConfig) -> Self {
        Self {
            fetcher,
            config,
            url: MARKETAUX_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn query(&self, token: &str) -> Vec<(&'static str, String)> {
        let published_after = Utc::now() - Duration::days(self.config.lookback_days);
        vec![
            ("api_token", token.to_string()),
            ("language", self.config.language.clone()),
            ("filter_entities", "true".to_string()),
            ("published_after", published_after.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ("limit", "50".to_string()),
            ("search", self.config.search_query()),
        ]
    }
}

#[async_trait]
impl SourceConnector for MarketauxSource {
    fn name(&self) -> String {
        "marketaux".to_string()
    }

    async fn pull(&self) -> Result<Vec<RawRecord>> {
        let Some(token) = self.config.marketaux_token.as_deref() else {
            debug!("No Marketaux token configured, skipping");
            return Ok(Vec::new());
        };

        let response: MarketauxResponse = self.fetcher.get_json(&self.url, &self.query(token)).await?;
        info!("Pulled {} Marketaux articles", response.data.len());
        Ok(response.data.into_iter().map(RawRecord::Marketaux).collect())
    }
}
