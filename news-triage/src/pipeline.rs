use crate::blend::Blender;
use crate::config::TriageConfig;
use crate::dedupe::dedupe;
use crate::enrich::Enricher;
use crate::llm_adapter::{Classifier, Summarizer};
use crate::normalize::Normalizer;
use crate::ranker::LearnedRanker;
use crate::scoring::HeuristicScorer;
use crate::selection::{clear_unselected, PrioritySelector, SummarizationSelector};
use crate::traits::SourceConnector;
use crate::types::{Counts, NewsRecord, RawRecord, Result, TriageOutput};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use interfaces::defs::LanguageModel;
use interfaces::state::TrainingLog;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const PROVIDERS: [&str; 3] = ["sec_edgar", "marketaux", "newsapi"];

/// One batch scoring pass: fetch, normalize, dedupe, enrich, score, classify,
/// rank, blend, filter and summarize.
pub struct TriagePipeline {
    config: TriageConfig,
    sources: Vec<Box<dyn SourceConnector>>,
    normalizer: Normalizer,
    enricher: Enricher,
    scorer: HeuristicScorer,
    priority: PrioritySelector,
    ranker: LearnedRanker,
    blender: Blender,
    summary_selector: SummarizationSelector,
    classifier: Option<Classifier>,
    summarizer: Option<Summarizer>,
    training_log: Option<TrainingLog>,
}

impl TriagePipeline {
    pub fn new(config: TriageConfig, ranker: LearnedRanker) -> Self {
        Self {
            normalizer: Normalizer::new(config.taxonomy.cik_tickers.clone()),
            enricher: Enricher::new(config.taxonomy.clone()),
            scorer: HeuristicScorer::from_config(&config),
            priority: PrioritySelector::new(config.selection.clone()),
            blender: Blender::new(config.blend.clone()),
            summary_selector: SummarizationSelector::new(config.selection.clone()),
            sources: Vec::new(),
            ranker,
            classifier: None,
            summarizer: None,
            training_log: None,
            config,
        }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn add_source(&mut self, source: Box<dyn SourceConnector>) {
        info!("Adding source to pipeline: {}", source.name());
        self.sources.push(source);
    }

    /// Enables the classification and summarization stages.
    pub fn set_language_model(&mut self, model: Arc<dyn LanguageModel>) {
        if !self.config.llm.enabled {
            info!("Language model {} ignored, LLM stages disabled", model.model_name());
            return;
        }
        info!("Using language model: {}", model.model_name());
        self.classifier = Some(Classifier::new(model.clone(), self.config.llm.clone()));
        self.summarizer = Some(Summarizer::new(model, self.config.llm.clone()));
    }

    pub fn set_training_log(&mut self, log: TrainingLog) {
        self.training_log = Some(log);
    }

    pub fn training_log(&self) -> Option<&TrainingLog> {
        self.training_log.as_ref()
    }

    /// Pull every source concurrently. A failing source contributes nothing.
    pub async fn fetch(&self) -> Vec<RawRecord> {
        let pulls = self.sources.iter().map(|source| async move {
            match source.pull().await {
                Ok(records) => {
                    info!("Pulled {} records from {}", records.len(), source.name());
                    records
                }
                Err(e) => {
                    warn!("Source {} failed: {}", source.name(), e);
                    Vec::new()
                }
            }
        });
        join_all(pulls).await.into_iter().flatten().collect()
    }

    pub async fn run(&self) -> Result<TriageOutput> {
        let raws = self.fetch().await;
        Ok(self.process(raws, Utc::now()).await)
    }

    /// Score a batch of raw records as of `now`. Per-record model failures are
    /// counted and degrade to fallbacks; nothing here aborts the batch.
    pub async fn process(&self, raws: Vec<RawRecord>, now: DateTime<Utc>) -> TriageOutput {
        let run_id = Uuid::new_v4();
        let span = info_span!("triage_run", %run_id);
        self.process_inner(raws, now).instrument(span).await
    }

    async fn process_inner(&self, raws: Vec<RawRecord>, now: DateTime<Utc>) -> TriageOutput {
        let mut counts = Counts::default();
        counts.sources = PROVIDERS.iter().map(|p| (p.to_string(), 0)).collect::<BTreeMap<_, _>>();
        for raw in &raws {
            *counts.sources.entry(raw.provider().to_string()).or_insert(0) += 1;
        }
        info!("Starting triage run over {} raw records", raws.len());

        let mut records = dedupe(self.normalizer.normalize_batch(&raws, now));
        counts.total_deduped = records.len();

        for record in records.iter_mut() {
            self.enricher.enrich(record);
            self.scorer.apply(record, now);
        }
        debug!("Enriched and pre-scored {} records", records.len());

        self.classify(&mut records, &mut counts).await;

        for record in records.iter_mut() {
            self.scorer.apply(record, now);
        }

        let learned = self.ranker.infer(&records, now);
        for record in records.iter_mut() {
            if let Some(probability) = learned.get(&record.id) {
                record.signals.learned = Some(*probability);
                record.provenance.learned_scored = true;
            }
        }
        counts.learned_scored = records.iter().filter(|r| r.provenance.learned_scored).count();
        info!("Learned scores available for {}/{} records", counts.learned_scored, records.len());

        for record in records.iter_mut() {
            self.blender.apply(record, &self.scorer);
        }

        self.append_training_rows(&records, now).await;

        let selected = self.summary_selector.select(&records);
        self.summarize(&mut records, &selected, &mut counts).await;
        clear_unselected(&mut records, &selected);

        let min_score = self.config.selection.min_score;
        let mut items: Vec<NewsRecord> = records
            .into_iter()
            .filter(|record| record.confidence.unwrap_or(0.0) >= min_score)
            .collect();
        items.sort_by(|a, b| {
            b.confidence
                .unwrap_or(0.0)
                .partial_cmp(&a.confidence.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal)
        });

        counts.relevant = items.len();
        counts.summarized = items.iter().filter(|r| r.provenance.summarized).count();
        counts.summarize_fallback = items
            .iter()
            .filter(|r| r.provenance.summarized && r.provenance.summary_fallback)
            .count();

        info!(
            "Triage run done: relevant={}/{} classified={} summarized={}",
            counts.relevant, counts.total_deduped, counts.classified, counts.summarized
        );
        TriageOutput { counts, items }
    }

    async fn classify(&self, records: &mut [NewsRecord], counts: &mut Counts) {
        let Some(classifier) = &self.classifier else {
            return;
        };

        let subset = self.priority.select(records, &self.scorer);
        info!("Classifying {} of {} records", subset.len(), records.len());

        for (position, index) in subset.iter().enumerate() {
            let record = &mut records[*index];
            let outcome = classifier.classify(record).await;
            if outcome.failed {
                counts.classify_errors += 1;
            }
            outcome.value.merge_into(record);
            if (position + 1) % 5 == 0 {
                debug!("Classified {}/{}", position + 1, subset.len());
            }
        }

        counts.classified = records.iter().filter(|r| r.provenance.classified).count();
        counts.classify_fallback = records
            .iter()
            .filter(|r| r.provenance.classified && r.provenance.classify_fallback)
            .count();
    }

    async fn summarize(&self, records: &mut [NewsRecord], selected: &[usize], counts: &mut Counts) {
        let (Some(classifier), Some(summarizer)) = (&self.classifier, &self.summarizer) else {
            return;
        };
        info!("Summarizing {} of {} records", selected.len(), records.len());

        for index in selected {
            let record = &mut records[*index];

            if record.event_type.is_none() {
                let rescue = classifier.classify(record).await;
                if rescue.failed {
                    counts.classify_errors += 1;
                }
                record.event_type = Some(rescue.value.event_type);
            }

            let outcome = summarizer.summarize(record).await;
            if outcome.failed {
                counts.summarize_errors += 1;
            }
            outcome.value.apply_to(record);
        }
    }

    async fn append_training_rows(&self, records: &[NewsRecord], now: DateTime<Utc>) {
        let Some(log) = &self.training_log else {
            return;
        };
        let rows = self.ranker.training_rows(records, now);
        match log.append_rows(&rows).await {
            Ok(inserted) => debug!("Logged {} new training rows", inserted),
            Err(e) => warn!("Failed to append training rows: {}", e),
        }
    }
}

/// Builder mirroring the pipeline's setters.
pub struct PipelineBuilder {
    pipeline: TriagePipeline,
}

impl PipelineBuilder {
    pub fn new(config: TriageConfig) -> Self {
        let ranker = LearnedRanker::new(None, &config);
        Self {
            pipeline: TriagePipeline::new(config, ranker),
        }
    }

    pub fn ranker(mut self, ranker: LearnedRanker) -> Self {
        self.pipeline.ranker = ranker;
        self
    }

    pub fn add_source(mut self, source: Box<dyn SourceConnector>) -> Self {
        self.pipeline.add_source(source);
        self
    }

    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.pipeline.set_language_model(model);
        self
    }

    pub fn training_log(mut self, log: TrainingLog) -> Self {
        self.pipeline.set_training_log(log);
        self
    }

    pub fn build(self) -> TriagePipeline {
        self.pipeline
    }
}
