use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use interfaces::defs::{FilingEntry, LlmTask, MarketauxArticle, MarketauxSymbol, NewsApiArticle, NewsApiSource};
use interfaces::state::TrainingLog;
use news_triage::brief::{compose_brief, feed_payload};
use news_triage::normalize::FILING_SOURCE;
use news_triage::{
    LearnedRanker, LogisticModel, MockLanguageModel, PipelineBuilder, RawRecord, Severity,
    StaticSource, TriageConfig,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn batch_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

/// An 8-K with a CEO departure, a watchlist earnings story, and a low-value wire
/// item that appears twice.
fn sample_batch(now: DateTime<Utc>) -> Vec<RawRecord> {
    let wire = NewsApiArticle {
        source: Some(NewsApiSource {
            id: Some("reuters".to_string()),
            name: Some("Reuters".to_string()),
        }),
        url: Some("https://www.reuters.com/markets/rates".to_string()),
        title: Some("Fed holds rates steady".to_string()),
        description: Some("Policy makers left rates unchanged.".to_string()),
        content: None,
        published_at: Some((now - Duration::hours(2)).to_rfc3339()),
    };

    vec![
        RawRecord::Filing(FilingEntry {
            link: Some("https://www.sec.gov/Archives/edgar/data/1234/0001.htm".to_string()),
            title: Some("8-K - ACME CORP".to_string()),
            summary: Some("Item 5.02 Departure of Directors or Certain Officers".to_string()),
            published: Some(now - Duration::hours(1)),
        }),
        RawRecord::Marketaux(MarketauxArticle {
            url: Some("https://example.com/nvidia-earnings".to_string()),
            title: Some("Nvidia beats estimates on data center demand".to_string()),
            description: Some("Revenue came in above consensus.".to_string()),
            published_at: Some((now - Duration::hours(1)).to_rfc3339()),
            symbols: Some(vec![MarketauxSymbol::Entity {
                symbol: Some("NVDA".to_string()),
            }]),
            ..MarketauxArticle::default()
        }),
        RawRecord::NewsApi(wire.clone()),
        RawRecord::NewsApi(wire),
    ]
}

fn offline_config() -> TriageConfig {
    let mut config = TriageConfig::default();
    config.llm.enabled = false;
    config
}

#[tokio::test]
async fn test_pipeline_without_models() -> Result<()> {
    init_tracing();
    info!("Testing pipeline with heuristics only");

    let pipeline = PipelineBuilder::new(offline_config()).build();
    let output = pipeline.process(sample_batch(batch_time()), batch_time()).await;

    let counts = &output.counts;
    assert_eq!(counts.sources["sec_edgar"], 1);
    assert_eq!(counts.sources["marketaux"], 1);
    assert_eq!(counts.sources["newsapi"], 2);
    assert_eq!(counts.total_deduped, 3);
    assert_eq!(counts.relevant, 2);
    assert_eq!(counts.classified, 0);
    assert_eq!(counts.summarized, 0);
    assert_eq!(counts.learned_scored, 0);

    assert_eq!(output.items[0].source, FILING_SOURCE);
    assert_eq!(output.items[0].severity, Some(Severity::High));
    for item in &output.items {
        assert_eq!(item.confidence, item.signals.heuristic_decayed);
        assert!(item.confidence.unwrap_or(0.0) >= 0.4);
        assert!(item.summary.is_none());
    }
    assert!(output.items[0].confidence >= output.items[1].confidence);
    assert!(output.items[1].tickers.contains("NVDA"));

    Ok(())
}

#[tokio::test]
async fn test_pipeline_with_language_model() -> Result<()> {
    init_tracing();
    info!("Testing pipeline with a scripted language model");

    let model = Arc::new(
        MockLanguageModel::new("triage")
            .with_response(
                LlmTask::Classify,
                "{\"event_type\": \"other_events\", \"tickers\": [], \"sectors\": [\"Technology\"], \"confidence\": 0.5}",
            )
            .with_response(
                LlmTask::Summarize,
                "{\"headline\": \"Card\", \"bullets\": [\"One\", \"Two\", \"Three\"], \"why_it_matters\": \"Because.\"}",
            ),
    );

    let pipeline = PipelineBuilder::new(TriageConfig::default())
        .language_model(model.clone())
        .build();
    let output = pipeline.process(sample_batch(batch_time()), batch_time()).await;

    let counts = &output.counts;
    assert_eq!(counts.classified, 3);
    assert_eq!(counts.classify_fallback, 0);
    assert_eq!(counts.relevant, 2);
    assert_eq!(counts.summarized, 2);
    assert_eq!(counts.summarize_fallback, 0);
    assert_eq!(counts.classify_errors + counts.summarize_errors, 0);

    for item in &output.items {
        let summary = item.summary.as_ref().expect("relevant items are summarized");
        assert_eq!(summary.bullets, vec!["One.", "Two.", "Three."]);
        assert_eq!(item.sectors, vec!["Technology".to_string()]);
        // a neutral model confidence leaves the blend untouched
        assert_eq!(item.confidence, item.signals.heuristic_decayed);
    }

    let calls = model.calls();
    assert_eq!(calls.iter().filter(|task| **task == LlmTask::Classify).count(), 3);
    assert_eq!(calls.iter().filter(|task| **task == LlmTask::Summarize).count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_survives_failing_model() -> Result<()> {
    init_tracing();
    info!("Testing pipeline with a failing language model");

    let pipeline = PipelineBuilder::new(TriageConfig::default())
        .language_model(Arc::new(MockLanguageModel::new("down").failing()))
        .build();
    let output = pipeline.process(sample_batch(batch_time()), batch_time()).await;

    let counts = &output.counts;
    assert_eq!(counts.classified, 3);
    assert_eq!(counts.classify_fallback, 3);
    assert_eq!(counts.classify_errors, 3);
    assert_eq!(counts.relevant, 2);
    assert_eq!(counts.summarized, 2);
    assert_eq!(counts.summarize_fallback, 2);
    assert_eq!(counts.summarize_errors, 2);

    for item in &output.items {
        assert!(item.provenance.summary_fallback);
        assert_eq!(item.summary.as_ref().map(|s| s.bullets.len()), Some(3));
    }
    Ok(())
}

#[tokio::test]
async fn test_learned_ranker_blends_in() -> Result<()> {
    init_tracing();
    info!("Testing learned score blending");

    let config = offline_config();
    let model = LogisticModel {
        intercept: 0.0,
        coefficients: BTreeMap::new(),
    };
    let pipeline = PipelineBuilder::new(config.clone())
        .ranker(LearnedRanker::new(Some(model), &config))
        .build();
    let output = pipeline.process(sample_batch(batch_time()), batch_time()).await;

    assert_eq!(output.counts.learned_scored, 3);
    for item in &output.items {
        let decayed = item.signals.heuristic_decayed.unwrap_or(0.0);
        let expected = 0.7 * decayed + 0.3 * 0.5;
        assert!((item.confidence.unwrap_or(0.0) - expected).abs() < 1e-9);
        assert_eq!(item.signals.learned, Some(0.5));
        assert!(item.provenance.learned_scored);
    }
    Ok(())
}

#[tokio::test]
async fn test_training_log_rows() -> Result<()> {
    init_tracing();
    info!("Testing training log appends");

    let log = TrainingLog::in_memory().await?;
    let pipeline = PipelineBuilder::new(offline_config()).training_log(log).build();

    let first = pipeline.process(sample_batch(batch_time()), batch_time()).await;
    let log = pipeline.training_log().expect("log configured");
    let rows = log.rows().await?;
    assert_eq!(rows.len(), first.counts.total_deduped);
    assert!(rows.iter().all(|row| row.label.is_none()));
    assert!(rows.iter().all(|row| row.features.contains_key("hours_old")));

    // the same stories again add nothing
    pipeline.process(sample_batch(batch_time()), batch_time()).await;
    assert_eq!(log.rows().await?.len(), rows.len());

    let positives: HashSet<String> = first.items.iter().take(1).map(|item| item.id.clone()).collect();
    let rate = log.label_positives(&positives).await?;
    assert!((rate - 1.0 / 3.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_run_with_static_source_and_outputs() -> Result<()> {
    init_tracing();
    info!("Testing full run and rendering");

    let pipeline = PipelineBuilder::new(offline_config())
        .add_source(Box::new(StaticSource::new("replay", sample_batch(Utc::now()))))
        .build();
    let output = pipeline.run().await?;
    assert_eq!(output.counts.total_deduped, 3);
    let min_score = pipeline.config().selection.min_score;
    assert!(output.items.iter().all(|item| item.confidence.unwrap_or(0.0) >= min_score));

    let brief = compose_brief(&output.items, 1);
    assert!(brief.starts_with("=== Analyst Brief (Top 1) ==="));
    assert!(brief.contains("[1] 8-K - ACME CORP"));
    assert!(brief.contains("Why it matters: Potential portfolio impact; confirm details."));
    assert!(!brief.contains("[2]"));
    assert_eq!(compose_brief(&[], 5), "No relevant items in this run.\n");

    let payload = serde_json::to_value(feed_payload(&output, batch_time()))?;
    assert_eq!(payload["meta"]["generated_at"], "2025-03-10T12:00:00Z");
    assert_eq!(payload["meta"]["version"], 1);
    assert_eq!(payload["meta"]["counts"]["total_deduped"], 3);
    let items = payload["items"].as_array().map(|items| items.len());
    assert_eq!(items, Some(output.items.len()));
    assert!(payload["items"][0]["signals"]["heuristic_base"].is_number());
    assert_eq!(payload["items"][0]["event_type"], "ceo_exit");
    Ok(())
}
