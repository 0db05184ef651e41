use crate::config::BlendConfig;
use crate::scoring::HeuristicScorer;
use crate::types::NewsRecord;

/// Final confidence from heuristic, learned and language-model signals.
pub struct Blender {
    blend: BlendConfig,
}

impl Blender {
    pub fn new(blend: BlendConfig) -> Self {
        Self { blend }
    }

    /// Without a learned probability the decayed heuristic stands alone.
    pub fn blend(&self, decayed: f64, learned: Option<f64>, llm_confidence: Option<f64>) -> f64 {
        let mut score = match learned {
            Some(probability) => {
                (1.0 - self.blend.ml_weight) * decayed + self.blend.ml_weight * probability
            }
            None => decayed,
        };
        if let Some(confidence) = llm_confidence {
            score += self.blend.llm_nudge * (confidence - 0.5);
        }
        score.clamp(0.0, 1.0)
    }

    /// Sets confidence and severity from the record's signals. Severity reads the
    /// undecayed score so an old story keeps its tier while its confidence fades.
    pub fn apply(&self, record: &mut NewsRecord, scorer: &HeuristicScorer) {
        let base = record
            .signals
            .heuristic_base
            .unwrap_or_else(|| scorer.base_score(record));
        let decayed = record.signals.heuristic_decayed.unwrap_or(base);
        record.confidence = Some(self.blend(
            decayed,
            record.signals.learned,
            record.signals.llm_confidence,
        ));
        record.severity = Some(scorer.severity(base));
    }
}
