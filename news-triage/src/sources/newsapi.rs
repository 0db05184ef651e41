use crate::config::SourceConfig;
use crate::fetcher::Fetcher;
use crate::traits::SourceConnector;
use crate::types::{RawRecord, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use interfaces::defs::NewsApiArticle;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

const NEWSAPI_URL: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

pub struct NewsApiSource {
    fetcher: Arc<Fetcher>,
    config: SourceConfig,
    url: String,
}

impl NewsApiSource {
    pub fn new(fetcher: Arc<Fetcher>, config: SourceConfig) -> Self {
        Self {
            fetcher,
            config,
            url: NEWSAPI_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn query(&self, key: &str) -> Vec<(&'static str, String)> {
        let now = Utc::now();
        let from = now - Duration::days(self.config.lookback_days);
        vec![
            ("q", self.config.search_query()),
            ("language", self.config.language.clone()),
            ("pageSize", "50".to_string()),
            ("sortBy", "publishedAt".to_string()),
            ("apiKey", key.to_string()),
            ("domains", self.config.newsapi_domains.join(",")),
            ("from", from.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ("to", now.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        ]
    }
}

#[async_trait]
impl SourceConnector for NewsApiSource {
    fn name(&self) -> String {
        "newsapi".to_string()
    }

    async fn pull(&self) -> Result<Vec<RawRecord>> {
        let Some(key) = self.config.newsapi_key.as_deref() else {
            debug!("No NewsAPI key configured, skipping");
            return Ok(Vec::new());
        };

        let response: NewsApiResponse = self.fetcher.get_json(&self.url, &self.query(key)).await?;
        info!("Pulled {} NewsAPI articles", response.articles.len());
        Ok(response.articles.into_iter().map(RawRecord::NewsApi).collect())
    }
}
