use anyhow::Result;
use news_triage::config::{FetchConfig, SourceConfig};
use news_triage::sources::{EdgarFilingSource, MarketauxSource, NewsApiSource};
use news_triage::{Fetcher, FilingFeedParser, RawRecord, SourceConnector};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const FILING_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Latest Filings</title>
  <id>urn:tag:sec.gov,2008:/cgi-bin/browse-edgar</id>
  <updated>2025-03-10T12:00:00-04:00</updated>
  <entry>
    <title>8-K - ACME CORP (0000001234) (Filer)</title>
    <link rel="alternate" type="text/html" href="https://www.sec.gov/Archives/edgar/data/1234/000000123425000001-index.htm"/>
    <summary type="html">&lt;b&gt;Filed:&lt;/b&gt; 2025-03-10 Item 5.02: Departure of Directors</summary>
    <updated>2025-03-10T11:45:00-04:00</updated>
    <id>urn:tag:sec.gov,2008:accession-number=0000001234-25-000001</id>
  </entry>
  <entry>
    <title>10-Q - BETA INC (0000005678) (Filer)</title>
    <link rel="alternate" type="text/html" href="https://www.sec.gov/Archives/edgar/data/5678/000000567825000002-index.htm"/>
    <updated>2025-03-10T10:00:00-04:00</updated>
    <id>urn:tag:sec.gov,2008:accession-number=0000005678-25-000002</id>
  </entry>
</feed>"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn source_config() -> SourceConfig {
    SourceConfig {
        query_terms: vec!["Fed".to_string(), "Guidance".to_string()],
        lookback_days: 3,
        newsapi_domains: vec!["reuters.com".to_string(), "ft.com".to_string()],
        ..SourceConfig::default()
    }
}

#[tokio::test]
async fn test_filing_feed_parsing() -> Result<()> {
    init_tracing();
    info!("Testing filing feed parsing");

    assert!(FilingFeedParser::is_valid_feed_content(FILING_ATOM));
    assert!(!FilingFeedParser::is_valid_feed_content("<html><body>busy</body></html>"));

    let entries = FilingFeedParser::parse(FILING_ATOM)?;
    assert_eq!(entries.len(), 2);

    let first = &entries[0];
    assert_eq!(first.title.as_deref(), Some("8-K - ACME CORP (0000001234) (Filer)"));
    assert_eq!(
        first.link.as_deref(),
        Some("https://www.sec.gov/Archives/edgar/data/1234/000000123425000001-index.htm")
    );
    assert!(first.summary.as_deref().unwrap_or("").contains("Item 5.02"));
    assert_eq!(
        first.published.map(|ts| ts.to_rfc3339()),
        Some("2025-03-10T15:45:00+00:00".to_string())
    );

    assert!(entries[1].summary.is_none());
    assert!(FilingFeedParser::parse("definitely not a feed").is_err());
    Ok(())
}

#[tokio::test]
async fn test_search_query() -> Result<()> {
    assert_eq!(source_config().search_query(), "\"Fed\" OR \"Guidance\"");

    let empty = SourceConfig {
        query_terms: Vec::new(),
        ..SourceConfig::default()
    };
    assert_eq!(empty.search_query(), "markets");
    Ok(())
}

#[tokio::test]
async fn test_provider_queries() -> Result<()> {
    init_tracing();
    let fetcher = Arc::new(Fetcher::new(FetchConfig::default())?);

    let marketaux = MarketauxSource::new(fetcher.clone(), source_config());
    let params = marketaux.query("token-1");
    let lookup = |key: &str| params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
    assert_eq!(lookup("api_token").as_deref(), Some("token-1"));
    assert_eq!(lookup("filter_entities").as_deref(), Some("true"));
    assert_eq!(lookup("search").as_deref(), Some("\"Fed\" OR \"Guidance\""));
    assert!(lookup("published_after").is_some());

    let newsapi = NewsApiSource::new(fetcher, source_config());
    let params = newsapi.query("key-1");
    let lookup = |key: &str| params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
    assert_eq!(lookup("apiKey").as_deref(), Some("key-1"));
    assert_eq!(lookup("domains").as_deref(), Some("reuters.com,ft.com"));
    assert_eq!(lookup("sortBy").as_deref(), Some("publishedAt"));
    assert!(lookup("from").is_some() && lookup("to").is_some());
    Ok(())
}

#[tokio::test]
async fn test_connectors_without_credentials_are_empty() -> Result<()> {
    init_tracing();
    info!("Testing connectors without credentials");

    let fetcher = Arc::new(Fetcher::new(FetchConfig::default())?);
    let marketaux = MarketauxSource::new(fetcher.clone(), SourceConfig::default())
        .with_url("http://127.0.0.1:9/unreachable");
    let newsapi = NewsApiSource::new(fetcher, SourceConfig::default())
        .with_url("http://127.0.0.1:9/unreachable");

    assert!(marketaux.pull().await?.is_empty());
    assert!(newsapi.pull().await?.is_empty());
    assert_eq!(marketaux.name(), "marketaux");
    assert_eq!(newsapi.name(), "newsapi");
    Ok(())
}

fn unreachable_fetcher(min_host_interval_ms: u64) -> Result<Arc<Fetcher>> {
    let config = FetchConfig {
        max_retries: 0,
        timeout_seconds: 2,
        min_host_interval_ms,
        ..FetchConfig::default()
    };
    Ok(Arc::new(Fetcher::new(config)?))
}

#[tokio::test]
async fn test_filing_source_skips_failing_endpoint() -> Result<()> {
    init_tracing();
    info!("Testing filing source against an unreachable endpoint");

    let source = EdgarFilingSource::new(unreachable_fetcher(0)?)
        .with_base_url("http://127.0.0.1:9/cgi-bin/browse-edgar")
        .with_form_types(vec!["8-K".to_string(), "10-Q".to_string()]);
    assert_eq!(source.name(), "sec_edgar");
    assert!(source.pull().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_is_per_host() -> Result<()> {
    init_tracing();
    info!("Testing per-host request spacing");

    let fetcher = unreachable_fetcher(1500)?;
    let _ = fetcher.get_text("http://127.0.0.1:9/first", &[]).await;

    let started = Instant::now();
    let (_, other_host_elapsed) = tokio::join!(
        fetcher.get_text("http://127.0.0.1:9/second", &[]),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let begun = Instant::now();
            let _ = fetcher.get_text("http://127.0.0.2:9/other", &[]).await;
            begun.elapsed()
        }
    );

    // the same host waits out its interval, another host does not queue behind it
    assert!(started.elapsed() >= Duration::from_millis(1200));
    assert!(other_host_elapsed < Duration::from_millis(1000));
    Ok(())
}

#[tokio::test]
async fn test_raw_record_wire_format() -> Result<()> {
    let json = r#"[
        {"provider": "news_api", "record": {"title": "Hello", "publishedAt": "2025-03-10T10:00:00Z",
         "source": {"name": "Reuters"}}},
        {"provider": "marketaux", "record": {"title": "Hi", "symbols": ["NVDA", {"symbol": "AMD"}]}},
        {"provider": "filing", "record": {"title": "8-K - ACME CORP"}}
    ]"#;
    let records: Vec<RawRecord> = serde_json::from_str(json)?;
    let providers: Vec<&str> = records.iter().map(|r| r.provider()).collect();
    assert_eq!(providers, vec!["newsapi", "marketaux", "sec_edgar"]);

    match &records[0] {
        RawRecord::NewsApi(article) => {
            assert_eq!(article.published_at.as_deref(), Some("2025-03-10T10:00:00Z"));
        }
        other => panic!("unexpected record {:?}", other),
    }
    Ok(())
}
