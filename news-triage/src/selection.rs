use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use crate::config::SelectionConfig;
use crate::scoring::HeuristicScorer;
use crate::types::NewsRecord;

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Picks which records get a classification call.
pub struct PrioritySelector {
    selection: SelectionConfig,
}

impl PrioritySelector {
    pub fn new(selection: SelectionConfig) -> Self {
        Self { selection }
    }

    pub fn has_material_codes(&self, record: &NewsRecord) -> bool {
        record
            .entities
            .iter()
            .any(|code| self.selection.material_items.contains(code))
    }

    /// Material filings and watchlist names are classified regardless of the cap.
    pub fn is_mandatory(&self, record: &NewsRecord, scorer: &HeuristicScorer) -> bool {
        (record.is_filing() && self.has_material_codes(record)) || scorer.on_watchlist(record)
    }

    pub fn priority(&self, record: &NewsRecord, scorer: &HeuristicScorer) -> f64 {
        let mut priority = record.signals.heuristic_decayed.unwrap_or(0.0);
        if record.is_filing_8k() {
            priority += self.selection.bonus_8k;
        }
        if scorer.is_tier1(record) {
            priority += self.selection.bonus_tier1;
        }
        if scorer.on_watchlist(record) {
            priority += self.selection.bonus_watchlist;
        }
        priority
    }

    /// Indices into `records`: every mandatory record in input order, then the
    /// highest-priority rest until the cap is reached.
    pub fn select(&self, records: &[NewsRecord], scorer: &HeuristicScorer) -> Vec<usize> {
        let (mandatory, rest): (Vec<usize>, Vec<usize>) =
            (0..records.len()).partition(|&index| self.is_mandatory(&records[index], scorer));

        let mut ranked: Vec<(usize, f64)> = rest
            .into_iter()
            .map(|index| (index, self.priority(&records[index], scorer)))
            .collect();
        ranked.sort_by(|a, b| descending(a.1, b.1));

        let room = self.selection.max_classify.saturating_sub(mandatory.len());
        debug!(
            "Classification subset: {} mandatory, {} by priority",
            mandatory.len(),
            room.min(ranked.len())
        );

        mandatory
            .into_iter()
            .chain(ranked.into_iter().take(room).map(|(index, _)| index))
            .collect()
    }
}

/// Picks which records get a narrative summary.
pub struct SummarizationSelector {
    selection: SelectionConfig,
}

impl SummarizationSelector {
    pub fn new(selection: SelectionConfig) -> Self {
        Self { selection }
    }

    pub fn is_material(&self, record: &NewsRecord) -> bool {
        record
            .entities
            .iter()
            .any(|code| self.selection.material_items.contains(code))
            || !record.tickers.is_empty()
    }

    /// Indices of records at or above the minimum confidence, by confidence,
    /// material records first on ties, truncated to the cap.
    pub fn select(&self, records: &[NewsRecord]) -> Vec<usize> {
        let mut eligible: Vec<usize> = (0..records.len())
            .filter(|&index| {
                records[index].confidence.unwrap_or(0.0) >= self.selection.min_score
            })
            .collect();

        eligible.sort_by(|&a, &b| {
            let (left, right) = (&records[a], &records[b]);
            descending(left.confidence.unwrap_or(0.0), right.confidence.unwrap_or(0.0))
                .then_with(|| self.is_material(right).cmp(&self.is_material(left)))
        });
        eligible.truncate(self.selection.max_summarize);
        eligible
    }
}

/// Drop any summary on records outside `selected`.
pub fn clear_unselected(records: &mut [NewsRecord], selected: &[usize]) {
    let keep: HashSet<usize> = selected.iter().copied().collect();
    for (index, record) in records.iter_mut().enumerate() {
        if !keep.contains(&index) {
            record.summary = None;
            record.provenance.summarized = false;
        }
    }
}
