use anyhow::Result;
use chrono::{TimeZone, Utc};
use interfaces::defs::LlmTask;
use interfaces::empty::EmptyLanguageModel;
use news_triage::config::LlmConfig;
use news_triage::llm_adapter::{why_default, Classification};
use news_triage::normalize::base_record;
use news_triage::{
    Classifier, EventType, MockLanguageModel, NewsRecord, OpenAiCompatibleModel, Severity, Summarizer,
};
use std::sync::Arc;
use tracing::info;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn sample_record() -> NewsRecord {
    let mut record = base_record(
        "Reuters",
        "https://www.reuters.com/business/acme-beta",
        "Acme agrees to buy Beta for $2 billion",
        "Acme Corp said on Monday it would acquire Beta Inc in an all-cash deal.",
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
    );
    record.tickers.insert("ACME".to_string());
    record.severity = Some(Severity::Med);
    record
}

#[tokio::test]
async fn test_classification_reads_aliased_keys() -> Result<()> {
    init_tracing();
    info!("Testing classification parsing");

    let reply = "```json\n{\"eventType\": \"CEO exit\", \"symbols\": [\"beta\"], \"sector\": \"Industrials\", \"confidence\": 1.7}\n```";
    let model = Arc::new(MockLanguageModel::new("classify").with_response(LlmTask::Classify, reply));
    let classifier = Classifier::new(model.clone(), LlmConfig::default());

    let mut record = sample_record();
    let outcome = classifier.classify(&record).await;
    assert!(!outcome.failed);

    let classification = outcome.value;
    assert!(!classification.fallback);
    assert_eq!(classification.event_type, EventType::CeoExit);
    assert_eq!(classification.tickers, vec!["BETA".to_string()]);
    assert_eq!(classification.sectors, vec!["Industrials".to_string()]);
    // absent keys keep their fallback values
    assert_eq!(classification.asset_classes, vec!["Equity".to_string()]);
    assert_eq!(classification.regions, vec!["US".to_string()]);
    assert_eq!(classification.confidence, 1.0);

    record.event_type = Some(EventType::Mna);
    record.sectors = vec!["Materials".to_string()];
    classification.merge_into(&mut record);
    assert_eq!(record.event_type, Some(EventType::Mna));
    assert_eq!(record.sectors, vec!["Materials".to_string()]);
    assert!(record.tickers.contains("ACME") && record.tickers.contains("BETA"));
    assert_eq!(record.signals.llm_confidence, Some(1.0));
    assert!(record.provenance.classified && !record.provenance.classify_fallback);

    assert_eq!(model.calls(), vec![LlmTask::Classify]);
    Ok(())
}

#[tokio::test]
async fn test_classification_fallbacks() -> Result<()> {
    init_tracing();
    let record = sample_record();

    let failing = Classifier::new(Arc::new(MockLanguageModel::new("down").failing()), LlmConfig::default());
    let outcome = failing.classify(&record).await;
    assert!(outcome.failed);
    assert_eq!(outcome.value, Classification::fallback_for(&record));
    assert_eq!(outcome.value.confidence, 0.55);
    assert_eq!(outcome.value.tickers, vec!["ACME".to_string()]);

    let prose = Classifier::new(
        Arc::new(MockLanguageModel::new("chatty").with_response(LlmTask::Classify, "I think it is a merger.")),
        LlmConfig::default(),
    );
    let outcome = prose.classify(&record).await;
    assert!(!outcome.failed);
    assert!(outcome.value.fallback);
    assert_eq!(outcome.value.event_type, EventType::OtherEvents);

    let empty = Classifier::new(Arc::new(EmptyLanguageModel), LlmConfig::default());
    let outcome = empty.classify(&record).await;
    assert!(!outcome.failed && outcome.value.fallback);

    let mut merged = record.clone();
    outcome.value.merge_into(&mut merged);
    assert_eq!(merged.event_type, Some(EventType::OtherEvents));
    assert!(merged.provenance.classify_fallback);
    Ok(())
}

#[tokio::test]
async fn test_slow_model_times_out() -> Result<()> {
    init_tracing();
    info!("Testing model timeout");

    let llm = LlmConfig {
        timeout_seconds: 1,
        ..LlmConfig::default()
    };
    let slow = Arc::new(
        MockLanguageModel::new("slow")
            .with_response(LlmTask::Classify, "{\"event_type\": \"mna\"}")
            .with_delay(1500),
    );
    let outcome = Classifier::new(slow, llm).classify(&sample_record()).await;
    assert!(outcome.failed);
    assert!(outcome.value.fallback);
    Ok(())
}

#[tokio::test]
async fn test_summary_backfills_why_and_pads_bullets() -> Result<()> {
    init_tracing();
    info!("Testing summary normalization");

    let model = Arc::new(
        MockLanguageModel::new("summary")
            .with_response(
                LlmTask::Summarize,
                "Here is the card: {\"title\": \"Acme to acquire Beta in $2bn cash deal\", \"bullets\": [\"Acme agrees to buy Beta\", \"\", \"Deal is all cash.\"]}",
            )
            .with_response(
                LlmTask::Explain,
                "{\"why_it_matters\": \"Adds scale in a consolidating market.\"}",
            ),
    );
    let summarizer = Summarizer::new(model.clone(), LlmConfig::default());
    let mut record = sample_record();
    record.event_type = Some(EventType::Mna);

    let outcome = summarizer.summarize(&record).await;
    assert!(!outcome.failed);
    let draft = outcome.value;
    assert!(!draft.headline_fallback && !draft.bullets_fallback && !draft.why_fallback);

    let summary = &draft.summary;
    assert_eq!(summary.headline, "Acme to acquire Beta in $2bn cash deal");
    assert_eq!(
        summary.bullets,
        vec![
            "Acme agrees to buy Beta.".to_string(),
            "Deal is all cash.".to_string(),
            "Tickers: ACME · Source: Reuters".to_string(),
        ]
    );
    assert_eq!(summary.why_it_matters, "Adds scale in a consolidating market.");
    assert_eq!(
        summary.draft_note,
        "Acme to acquire Beta in $2bn cash deal - https://www.reuters.com/business/acme-beta"
    );
    assert_eq!(model.calls(), vec![LlmTask::Summarize, LlmTask::Explain]);

    draft.apply_to(&mut record);
    assert!(record.provenance.summarized && !record.provenance.summary_fallback);
    assert!(record.summary.is_some());
    Ok(())
}

#[tokio::test]
async fn test_summary_without_json_is_full_fallback() -> Result<()> {
    init_tracing();

    let model = Arc::new(MockLanguageModel::new("prose").with_response(LlmTask::Summarize, "Sorry, I cannot help."));
    let summarizer = Summarizer::new(model.clone(), LlmConfig::default());
    let mut record = sample_record();
    record.event_type = Some(EventType::Mna);

    let draft = summarizer.summarize(&record).await.value;
    assert!(draft.summary_fallback());
    assert_eq!(draft.summary.headline, "Acme agrees to buy Beta for $2 billion");
    assert_eq!(draft.summary.bullets, Summarizer::fallback_bullets(&record));
    assert_eq!(draft.summary.bullets[1], "Event: mna · Severity: med");
    assert_eq!(draft.summary.why_it_matters, why_default(EventType::Mna));
    // no backfill call when the main reply is unusable
    assert_eq!(model.calls(), vec![LlmTask::Summarize]);
    Ok(())
}

#[tokio::test]
async fn test_summary_why_default_when_backfill_fails() -> Result<()> {
    init_tracing();

    let long_headline = "H".repeat(140);
    let model = Arc::new(MockLanguageModel::new("partial").with_response(
        LlmTask::Summarize,
        &format!("{{\"headline\": \"{}\", \"bullets\": \"- One\\n- Two\\n- Three\"}}", long_headline),
    ));
    let summarizer = Summarizer::new(model.clone(), LlmConfig::default());
    let record = sample_record();

    let outcome = summarizer.summarize(&record).await;
    assert!(!outcome.failed);
    let draft = outcome.value;
    assert_eq!(draft.summary.headline.chars().count(), 90);
    assert_eq!(draft.summary.bullets, vec!["One.", "Two.", "Three."]);
    assert!(draft.why_fallback && !draft.summary_fallback());
    assert_eq!(draft.summary.why_it_matters, why_default(EventType::OtherEvents));
    assert_eq!(model.calls(), vec![LlmTask::Summarize, LlmTask::Explain]);
    Ok(())
}

#[tokio::test]
async fn test_failing_summarizer_counts_as_failure() -> Result<()> {
    init_tracing();

    let summarizer = Summarizer::new(Arc::new(MockLanguageModel::new("down").failing()), LlmConfig::default());
    let outcome = summarizer.summarize(&sample_record()).await;
    assert!(outcome.failed);
    assert!(outcome.value.summary_fallback());
    assert_eq!(outcome.value.summary.bullets.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_chat_request_carries_sampling_settings() -> Result<()> {
    init_tracing();

    let defaults = LlmConfig::default();
    let plain = OpenAiCompatibleModel::new("http://localhost:8000/v1/", None, "small", "large");
    let body = plain.request_body(LlmTask::Classify, "classify this");
    assert_eq!(body["model"], "small");
    assert_eq!(body["max_tokens"], defaults.max_tokens);
    assert_eq!(body["temperature"].as_f64(), Some(defaults.temperature as f64));
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "classify this");

    let tuned = OpenAiCompatibleModel::new("http://localhost:8000/v1", None, "small", "large")
        .with_temperature(0.5)
        .with_max_tokens(256);
    let body = tuned.request_body(LlmTask::Explain, "why");
    assert_eq!(body["model"], "large");
    assert_eq!(body["temperature"].as_f64(), Some(0.5));
    assert_eq!(body["max_tokens"], 256);
    Ok(())
}
