use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::llm_json::{as_f64, as_text, extract_object, first_present, string_list};
use crate::normalize::truncate_chars;
use crate::types::{EventType, NewsRecord, Summary};
use interfaces::defs::{LanguageModel, LlmTask};

pub const HEADLINE_LIMIT: usize = 90;

/// What came back from one model call after the timeout was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    Nothing,
    Failed(String),
}

impl ModelReply {
    pub fn failed(&self) -> bool {
        matches!(self, ModelReply::Failed(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ModelReply::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A stage result plus whether a model call errored or timed out on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub failed: bool,
}

async fn ask(model: &dyn LanguageModel, timeout: Duration, task: LlmTask, prompt: &str) -> ModelReply {
    match tokio::time::timeout(timeout, model.generate(task, prompt)).await {
        Ok(Ok(Some(text))) if !text.trim().is_empty() => ModelReply::Text(text),
        Ok(Ok(_)) => ModelReply::Nothing,
        Ok(Err(e)) => ModelReply::Failed(e.to_string()),
        Err(_) => ModelReply::Failed(format!("{} call timed out after {:?}", task.as_str(), timeout)),
    }
}

fn ticker_hint(record: &NewsRecord) -> String {
    if record.tickers.is_empty() {
        "n/a".to_string()
    } else {
        record.tickers.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Structured classification of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub event_type: EventType,
    pub tickers: Vec<String>,
    pub sectors: Vec<String>,
    pub asset_classes: Vec<String>,
    pub regions: Vec<String>,
    pub confidence: f64,
    pub fallback: bool,
}

impl Classification {
    pub fn fallback_for(record: &NewsRecord) -> Self {
        Self {
            event_type: EventType::OtherEvents,
            tickers: record.tickers.iter().cloned().collect(),
            sectors: Vec::new(),
            asset_classes: vec!["Equity".to_string()],
            regions: vec!["US".to_string()],
            confidence: 0.55,
            fallback: true,
        }
    }

    /// Read a parsed reply. Each field falls back on its own.
    pub fn from_reply(record: &NewsRecord, reply: &Map<String, Value>) -> Self {
        let fallback = Self::fallback_for(record);

        let event_type = first_present(reply, &["event_type", "eventType", "type"])
            .and_then(as_text)
            .map(|label| EventType::parse(&label))
            .unwrap_or(fallback.event_type);
        let tickers = first_present(reply, &["tickers", "symbols", "tickers_list"])
            .map(|value| {
                string_list(value)
                    .into_iter()
                    .map(|ticker| ticker.to_uppercase())
                    .collect()
            })
            .unwrap_or(fallback.tickers);
        let sectors = first_present(reply, &["sectors", "sector"])
            .map(string_list)
            .unwrap_or(fallback.sectors);
        let asset_classes = first_present(reply, &["asset_classes", "assetClasses"])
            .map(string_list)
            .unwrap_or(fallback.asset_classes);
        let regions = first_present(reply, &["regions", "region"])
            .map(string_list)
            .unwrap_or(fallback.regions);
        let confidence = first_present(reply, &["confidence"])
            .and_then(as_f64)
            .filter(|value| value.is_finite())
            .unwrap_or(fallback.confidence);

        Self {
            event_type,
            tickers,
            sectors,
            asset_classes,
            regions,
            confidence: confidence.clamp(0.0, 1.0),
            fallback: false,
        }
    }

    /// Event and list fields only fill gaps; tickers are unioned.
    pub fn merge_into(&self, record: &mut NewsRecord) {
        record.event_type.get_or_insert(self.event_type);
        record
            .tickers
            .extend(self.tickers.iter().map(|ticker| ticker.to_uppercase()));
        if record.sectors.is_empty() {
            record.sectors = self.sectors.clone();
        }
        if record.asset_classes.is_empty() {
            record.asset_classes = self.asset_classes.clone();
        }
        if record.regions.is_empty() {
            record.regions = self.regions.clone();
        }
        record.signals.llm_confidence = Some(self.confidence.clamp(0.0, 1.0));
        record.provenance.classified = true;
        record.provenance.classify_fallback = self.fallback;
    }
}

pub struct Classifier {
    model: Arc<dyn LanguageModel>,
    llm: LlmConfig,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>, llm: LlmConfig) -> Self {
        Self { model, llm }
    }

    pub fn prompt(&self, record: &NewsRecord) -> String {
        format!(
            "You classify financial news for analyst triage.\n\n\
             Return STRICT JSON with these keys:\n\
             event_type: one of [central_bank, earnings_surprise, ceo_exit, mna, rating_change, dividend_change, bankruptcy, regulatory, sector_shock, other_events]\n\
             tickers: array of strings (stock tickers, UPPERCASE)\n\
             sectors: array of strings (GICS-like)\n\
             asset_classes: subset of [Equity, Rates, Credit, Commodities, FX]\n\
             regions: subset of [US, EU, CH, UK, JP, EM]\n\
             confidence: float 0..1 (certainty about event_type)\n\n\
             TITLE: {}\nBODY: {}\nTICKER_HINTS: {}\n\n\
             Output JSON only, no prose.",
            record.headline,
            truncate_chars(&record.body_text, self.llm.prompt_body_chars),
            ticker_hint(record),
        )
    }

    pub async fn classify(&self, record: &NewsRecord) -> Outcome<Classification> {
        let timeout = Duration::from_secs(self.llm.timeout_seconds);
        let reply = ask(self.model.as_ref(), timeout, LlmTask::Classify, &self.prompt(record)).await;
        if let ModelReply::Failed(reason) = &reply {
            warn!("Classification failed for {}: {}", record.id, reason);
        }

        let value = match reply.text().and_then(extract_object) {
            Some(parsed) => Classification::from_reply(record, &parsed),
            None => {
                debug!("No usable classification for {}, using fallback", record.id);
                Classification::fallback_for(record)
            }
        };
        Outcome {
            value,
            failed: reply.failed(),
        }
    }
}

/// Summary plus which of its parts came from fallbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDraft {
    pub summary: Summary,
    pub headline_fallback: bool,
    pub bullets_fallback: bool,
    pub why_fallback: bool,
}

impl SummaryDraft {
    pub fn summary_fallback(&self) -> bool {
        self.headline_fallback && self.bullets_fallback && self.why_fallback
    }

    pub fn apply_to(self, record: &mut NewsRecord) {
        record.provenance.summarized = true;
        record.provenance.summary_fallback = self.summary_fallback();
        record.provenance.headline_fallback = self.headline_fallback;
        record.provenance.bullets_fallback = self.bullets_fallback;
        record.provenance.why_fallback = self.why_fallback;
        record.summary = Some(self.summary);
    }
}

/// Event-specific sentence used when the model gives no reason.
pub fn why_default(event: EventType) -> &'static str {
    match event {
        EventType::CeoExit => "Leadership change can shift strategy and guidance. Watch succession and market reaction.",
        EventType::Mna => "Buyer and target valuation depends on terms, dilution, synergies and antitrust clearance.",
        EventType::EarningsSurprise => "Deviation from consensus moves estimates and valuation. Guidance is decisive.",
        EventType::AuditorChange => "An auditor change can signal reporting or control risk and weighs on credibility near term.",
        EventType::NonReliance => "A non-reliance statement raises reporting and legal risk. Restatements are possible.",
        EventType::Bankruptcy => "The proceedings decide creditor recoveries and what is left for equity. Watch first measures.",
        EventType::DividendChange => "Capital returns signal balance sheet quality and allocation priorities.",
        EventType::RatingChange => "Rating changes move flows, especially in smaller caps. Check the rationale.",
        EventType::RegFd => "A material FD disclosure can shift expectations and estimates.",
        EventType::Geopolitics => "Policy and supply chain risk affect sector multiples and demand.",
        _ => "Potential relevance for the name or sector. Verify details.",
    }
}

fn with_period(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.ends_with('.') {
        trimmed.to_string()
    } else {
        format!("{}.", trimmed)
    }
}

fn bullet_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_matches(|c: char| c == '•' || c == '-' || c.is_whitespace()))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    llm: LlmConfig,
}

impl Summarizer {
    pub fn new(model: Arc<dyn LanguageModel>, llm: LlmConfig) -> Self {
        Self { model, llm }
    }

    pub fn prompt(&self, record: &NewsRecord) -> String {
        format!(
            "You write compact analyst cards. Neutral, factual, numbers first.\n\n\
             Return JSON with EXACTLY these keys:\n\
             - \"headline\": string (<= 90 characters), strictly factual.\n\
             - \"bullets\": exactly 3 short sentences (7-18 words): context, what happens now, why it matters now.\n\
             - \"why_it_matters\": one sentence (<= 40 words).\n\n\
             Always output every key. Only facts supported by the INPUT.\n\n\
             INPUT\nTITLE: {}\nBODY: {}\nEVENT: {}\nTICKERS: {}",
            record.headline,
            truncate_chars(&record.body_text, self.llm.prompt_body_chars),
            record.event_or_other(),
            ticker_hint(record),
        )
    }

    pub fn why_prompt(&self, record: &NewsRecord) -> String {
        format!(
            "Return JSON with exactly one key: \"why_it_matters\".\n\
             Value: one concise sentence (<= 40 words) on why the item is market relevant.\n\n\
             TITLE: {}\nBODY: {}\nEVENT: {}\nTICKERS: {}",
            record.headline,
            truncate_chars(&record.body_text, self.llm.why_body_chars),
            record.event_or_other(),
            ticker_hint(record),
        )
    }

    pub fn fallback_headline(record: &NewsRecord) -> String {
        truncate_chars(record.headline.trim(), HEADLINE_LIMIT)
    }

    pub fn fallback_bullets(record: &NewsRecord) -> Vec<String> {
        let severity = record.severity.map(|s| s.as_str()).unwrap_or("low");
        vec![
            with_period(&Self::fallback_headline(record)),
            format!("Event: {} · Severity: {}", record.event_or_other(), severity),
            format!("Tickers: {} · Source: {}", ticker_hint(record), record.source),
        ]
    }

    fn draft(record: &NewsRecord, headline: Option<String>, bullets: Option<Vec<String>>, why: Option<String>) -> SummaryDraft {
        let headline_fallback = headline.is_none();
        let bullets_fallback = bullets.is_none();
        let why_fallback = why.is_none();

        let headline = headline.unwrap_or_else(|| Self::fallback_headline(record));
        let why_it_matters =
            why.unwrap_or_else(|| why_default(record.event_or_other()).to_string());
        let summary = Summary {
            draft_note: format!("{} - {}", headline, record.url),
            headline,
            bullets: bullets.unwrap_or_else(|| Self::fallback_bullets(record)),
            why_it_matters,
        };

        SummaryDraft {
            summary,
            headline_fallback,
            bullets_fallback,
            why_fallback,
        }
    }

    /// Exactly three bullets: the first three non-empty ones, padded from fallbacks.
    pub fn normalize_bullets(record: &NewsRecord, value: &Value) -> Vec<String> {
        let given = match value {
            Value::String(text) => bullet_lines(text),
            other => string_list(other),
        };
        let mut fallbacks = Self::fallback_bullets(record).into_iter().skip(given.len().min(3));
        let mut bullets: Vec<String> = given.iter().take(3).map(|b| with_period(b)).collect();
        while bullets.len() < 3 {
            match fallbacks.next() {
                Some(bullet) => bullets.push(bullet),
                None => break,
            }
        }
        bullets
    }

    pub async fn summarize(&self, record: &NewsRecord) -> Outcome<SummaryDraft> {
        let timeout = Duration::from_secs(self.llm.timeout_seconds);
        let reply = ask(self.model.as_ref(), timeout, LlmTask::Summarize, &self.prompt(record)).await;
        let mut failed = reply.failed();
        if let ModelReply::Failed(reason) = &reply {
            warn!("Summarization failed for {}: {}", record.id, reason);
        }

        let Some(parsed) = reply.text().and_then(extract_object) else {
            return Outcome {
                value: Self::draft(record, None, None, None),
                failed,
            };
        };

        let headline = first_present(&parsed, &["headline", "title"])
            .and_then(as_text)
            .map(|text| truncate_chars(&text, HEADLINE_LIMIT));
        let bullets = first_present(&parsed, &["bullets", "points", "bullet_points"])
            .map(|value| Self::normalize_bullets(record, value))
            .filter(|bullets| bullets.len() == 3);
        let mut why = first_present(
            &parsed,
            &["why_it_matters", "whyItMatters", "why-it-matters", "why", "rationale"],
        )
        .and_then(as_text);

        if why.is_none() {
            let backfill = self.explain(record).await;
            failed |= backfill.failed;
            why = backfill.value;
        }

        Outcome {
            value: Self::draft(record, headline, bullets, why),
            failed,
        }
    }

    /// One call asking only for `why_it_matters`.
    pub async fn explain(&self, record: &NewsRecord) -> Outcome<Option<String>> {
        let timeout = Duration::from_secs(self.llm.timeout_seconds);
        let reply = ask(self.model.as_ref(), timeout, LlmTask::Explain, &self.why_prompt(record)).await;
        if let ModelReply::Failed(reason) = &reply {
            warn!("Why backfill failed for {}: {}", record.id, reason);
        }
        let value = reply
            .text()
            .and_then(extract_object)
            .and_then(|parsed| parsed.get("why_it_matters").and_then(as_text));
        Outcome {
            value,
            failed: reply.failed(),
        }
    }
}

/// Scripted in-process model for development and tests.
pub struct MockLanguageModel {
    name: String,
    responses: HashMap<LlmTask, String>,
    fail: bool,
    response_delay_ms: u64,
    calls: Mutex<Vec<LlmTask>>,
}

impl MockLanguageModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: HashMap::new(),
            fail: false,
            response_delay_ms: 0,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, task: LlmTask, text: &str) -> Self {
        self.responses.insert(task, text.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    /// Tasks seen so far, in call order.
    pub fn calls(&self) -> Vec<LlmTask> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    async fn simulate_processing(&self) {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn model_name(&self) -> String {
        format!("mock ({})", self.name)
    }

    async fn generate(&self, task: LlmTask, _prompt: &str) -> anyhow::Result<Option<String>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(task);
        }
        self.simulate_processing().await;

        if self.fail {
            return Err(anyhow!("mock model '{}' is configured to fail", self.name));
        }
        Ok(self.responses.get(&task).cloned())
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Any chat-completions endpoint speaking the OpenAI wire format.
pub struct OpenAiCompatibleModel {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    classify_model: String,
    summarize_model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleModel {
    pub fn new(base_url: &str, api_key: Option<String>, classify_model: &str, summarize_model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            classify_model: classify_model.to_string(),
            summarize_model: summarize_model.to_string(),
            temperature: 0.0,
            max_tokens: 600,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn model_for(&self, task: LlmTask) -> &str {
        match task {
            LlmTask::Classify => &self.classify_model,
            LlmTask::Summarize | LlmTask::Explain => &self.summarize_model,
        }
    }

    /// JSON body of one chat-completions request.
    pub fn request_body(&self, task: LlmTask, prompt: &str) -> Value {
        let request = ChatRequest {
            model: self.model_for(task),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        serde_json::to_value(&request).unwrap_or_default()
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn model_name(&self) -> String {
        format!("{} / {}", self.classify_model, self.summarize_model)
    }

    async fn generate(&self, task: LlmTask, prompt: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = self.model_for(task);
        let request = self.request_body(task, prompt);

        debug!(model = %model, task = task.as_str(), "Chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Chat completion error ({}): {}", status, error_text));
        }

        let chat: ChatResponse = response.json().await?;
        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty()))
    }
}
