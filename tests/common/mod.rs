//! Shared scaffolding: a scripted model that records every stage call.
#![allow(dead_code)]

use anyhow::Result;
use howler::{BarkModel, CoarseOpts, FineOpts, HistoryPrompt, SemanticOpts};
use std::sync::Mutex;

/// One recorded pipeline stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum StageCall {
    SetSeed(i64),
    Semantic {
        text: String,
        history: Option<HistoryPrompt>,
        opts: SemanticOpts,
    },
    Coarse {
        history: Option<HistoryPrompt>,
        opts: CoarseOpts,
    },
    Fine {
        history: Option<HistoryPrompt>,
        opts: FineOpts,
    },
    Decode,
}

/// Deterministic fake model.
///
/// Each semantic call returns a fresh token run starting at a per-call
/// marker, so every segment's bundle is distinguishable in assertions.
/// All calls are recorded in order.
pub struct ScriptedModel {
    pub calls: Mutex<Vec<StageCall>>,
    /// Samples produced per decode call.
    pub samples_per_segment: usize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            samples_per_segment: 240,
        }
    }

    fn record(&self, call: StageCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Number of semantic calls made so far.
    fn semantic_calls(&self) -> i64 {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, StageCall::Semantic { .. }))
            .count() as i64
    }

    /// Semantic token every bundle from the `n`-th semantic call (0-based)
    /// starts with. Used to tell segments apart in continuity assertions.
    pub fn marker(n: i64) -> i64 {
        100 * (n + 1)
    }

    /// The conditioning bundles passed to each semantic call, in order.
    pub fn semantic_histories(&self) -> Vec<Option<HistoryPrompt>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                StageCall::Semantic { history, .. } => Some(history.clone()),
                _ => None,
            })
            .collect()
    }

    /// The conditioning bundles passed to each coarse call, in order.
    pub fn coarse_histories(&self) -> Vec<Option<HistoryPrompt>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                StageCall::Coarse { history, .. } => Some(history.clone()),
                _ => None,
            })
            .collect()
    }
}

impl BarkModel for ScriptedModel {
    fn set_seed(&self, seed: i64) -> i64 {
        self.record(StageCall::SetSeed(seed));
        seed
    }

    fn generate_semantic(
        &self,
        text: &str,
        history: Option<&HistoryPrompt>,
        opts: &SemanticOpts,
    ) -> Result<Vec<i64>> {
        let marker = Self::marker(self.semantic_calls());
        self.record(StageCall::Semantic {
            text: text.to_string(),
            history: history.cloned(),
            opts: opts.clone(),
        });
        Ok((marker..marker + 10).collect())
    }

    fn generate_coarse(
        &self,
        semantic: &[i64],
        history: Option<&HistoryPrompt>,
        opts: &CoarseOpts,
    ) -> Result<Vec<Vec<i64>>> {
        self.record(StageCall::Coarse {
            history: history.cloned(),
            opts: opts.clone(),
        });
        let len = semantic.len() * 3 / 2;
        Ok(vec![vec![1; len], vec![2; len]])
    }

    fn generate_fine(
        &self,
        coarse: &[Vec<i64>],
        history: Option<&HistoryPrompt>,
        opts: &FineOpts,
    ) -> Result<Vec<Vec<i64>>> {
        self.record(StageCall::Fine {
            history: history.cloned(),
            opts: opts.clone(),
        });
        let len = coarse.first().map_or(0, Vec::len);
        Ok(vec![vec![3; len]; 8])
    }

    fn decode(&self, _fine: &[Vec<i64>]) -> Result<Vec<f32>> {
        self.record(StageCall::Decode);
        Ok(vec![0.1; self.samples_per_segment])
    }
}

/// A well-formed bundle whose semantic stream starts at `marker`.
pub fn bundle_with_marker(marker: i64) -> HistoryPrompt {
    let semantic: Vec<i64> = (marker..marker + 10).collect();
    let coarse_len = semantic.len() * 3 / 2;
    HistoryPrompt::new(
        semantic,
        vec![vec![1; coarse_len], vec![2; coarse_len]],
        vec![vec![3; coarse_len]; 8],
    )
}

/// First semantic token of a bundle, or `None` when unconditioned.
pub fn head(history: &Option<HistoryPrompt>) -> Option<i64> {
    history.as_ref().and_then(|h| h.semantic.first().copied())
}
