//! Single-segment pipeline behavior: stage ordering, option pass-through,
//! history scope, seeds, and mid-segment cancellation.

mod common;

use common::{bundle_with_marker, head, ScriptedModel, StageCall};
use howler::{
    run_segment, CancelToken, CoarseOpts, FineOpts, HistoryScope, SegmentOutcome, SegmentRequest,
    SemanticOpts, StageSeeds,
};

fn request<'a>(history: Option<&'a howler::HistoryPrompt>) -> SegmentRequest<'a> {
    SegmentRequest {
        text: "hello there",
        history,
        scope: HistoryScope::Full,
        segment_number: 1,
        total_segments: 1,
        semantic: SemanticOpts::default(),
        coarse: CoarseOpts::default(),
        fine: FineOpts::default(),
        seeds: StageSeeds::default(),
    }
}

#[test]
fn stages_run_in_order() {
    let model = ScriptedModel::new();
    let outcome = run_segment(&model, &request(None), &CancelToken::new()).expect("run");

    let SegmentOutcome::Done { prompt, audio } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(audio.len(), model.samples_per_segment);
    assert_eq!(prompt.semantic.len(), 10);
    assert_eq!(prompt.coarse.len(), 2);
    assert_eq!(prompt.fine.len(), 8);
    assert_eq!(prompt.coarse_len(), 15);

    let calls = model.calls.lock().unwrap();
    let kinds: Vec<_> = calls
        .iter()
        .map(|c| match c {
            StageCall::SetSeed(_) => "seed",
            StageCall::Semantic { .. } => "semantic",
            StageCall::Coarse { .. } => "coarse",
            StageCall::Fine { .. } => "fine",
            StageCall::Decode => "decode",
        })
        .collect();
    assert_eq!(kinds, ["semantic", "coarse", "fine", "decode"]);
}

#[test]
fn options_pass_through_verbatim() {
    let model = ScriptedModel::new();
    let mut req = request(None);
    req.semantic = SemanticOpts {
        temp: Some(0.9),
        top_k: Some(50),
        top_p: None,
        min_eos_p: Some(0.05),
        max_gen_duration_s: None,
        allow_early_stop: Some(false),
    };
    req.coarse = CoarseOpts {
        temp: Some(0.6),
        top_k: None,
        top_p: Some(0.95),
        max_coarse_history: Some(630),
        sliding_window_len: None,
    };
    req.fine = FineOpts { temp: Some(0.4) };

    run_segment(&model, &req, &CancelToken::new()).expect("run");

    let calls = model.calls.lock().unwrap();
    for call in calls.iter() {
        match call {
            StageCall::Semantic { opts, .. } => assert_eq!(opts, &req.semantic),
            StageCall::Coarse { opts, .. } => assert_eq!(opts, &req.coarse),
            StageCall::Fine { opts, .. } => assert_eq!(opts, &req.fine),
            _ => {}
        }
    }
}

#[test]
fn full_scope_conditions_every_stage() {
    let model = ScriptedModel::new();
    let base = bundle_with_marker(500);
    run_segment(&model, &request(Some(&base)), &CancelToken::new()).expect("run");

    let calls = model.calls.lock().unwrap();
    for call in calls.iter() {
        match call {
            StageCall::Semantic { history, .. }
            | StageCall::Coarse { history, .. }
            | StageCall::Fine { history, .. } => {
                assert_eq!(head(history), Some(500));
            }
            _ => {}
        }
    }
}

#[test]
fn semantic_only_scope_withholds_history_from_codec_stages() {
    let model = ScriptedModel::new();
    let base = bundle_with_marker(500);
    let mut req = request(Some(&base));
    req.scope = HistoryScope::SemanticOnly;
    run_segment(&model, &req, &CancelToken::new()).expect("run");

    assert_eq!(head(&model.semantic_histories()[0]), Some(500));
    let calls = model.calls.lock().unwrap();
    for call in calls.iter() {
        match call {
            StageCall::Coarse { history, .. } | StageCall::Fine { history, .. } => {
                assert!(history.is_none());
            }
            _ => {}
        }
    }
}

#[test]
fn stage_seeds_are_applied_before_each_stage() {
    let model = ScriptedModel::new();
    let mut req = request(None);
    req.seeds = StageSeeds {
        semantic: Some(11),
        coarse: Some(22),
        fine: Some(33),
    };
    run_segment(&model, &req, &CancelToken::new()).expect("run");

    let calls = model.calls.lock().unwrap();
    let positions: Vec<_> = calls
        .iter()
        .map(|c| match c {
            StageCall::SetSeed(s) => format!("seed{s}"),
            StageCall::Semantic { .. } => "semantic".into(),
            StageCall::Coarse { .. } => "coarse".into(),
            StageCall::Fine { .. } => "fine".into(),
            StageCall::Decode => "decode".into(),
        })
        .collect();
    assert_eq!(
        positions,
        ["seed11", "semantic", "seed22", "coarse", "seed33", "fine", "decode"]
    );
}

#[test]
fn pre_cancelled_token_skips_all_stages() {
    let model = ScriptedModel::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = run_segment(&model, &request(None), &cancel).expect("run");
    assert!(matches!(outcome, SegmentOutcome::Cancelled));
    assert!(model.calls.lock().unwrap().is_empty());
}

/// Model that cancels the shared token from inside the semantic stage, as a
/// signal handler would from another thread.
struct CancelDuringSemantic {
    inner: ScriptedModel,
    cancel: CancelToken,
}

impl howler::BarkModel for CancelDuringSemantic {
    fn set_seed(&self, seed: i64) -> i64 {
        self.inner.set_seed(seed)
    }

    fn generate_semantic(
        &self,
        text: &str,
        history: Option<&howler::HistoryPrompt>,
        opts: &SemanticOpts,
    ) -> anyhow::Result<Vec<i64>> {
        self.cancel.cancel();
        self.inner.generate_semantic(text, history, opts)
    }

    fn generate_coarse(
        &self,
        semantic: &[i64],
        history: Option<&howler::HistoryPrompt>,
        opts: &CoarseOpts,
    ) -> anyhow::Result<Vec<Vec<i64>>> {
        self.inner.generate_coarse(semantic, history, opts)
    }

    fn generate_fine(
        &self,
        coarse: &[Vec<i64>],
        history: Option<&howler::HistoryPrompt>,
        opts: &FineOpts,
    ) -> anyhow::Result<Vec<Vec<i64>>> {
        self.inner.generate_fine(coarse, history, opts)
    }

    fn decode(&self, fine: &[Vec<i64>]) -> anyhow::Result<Vec<f32>> {
        self.inner.decode(fine)
    }
}

#[test]
fn cancellation_between_stages_discards_partial_tokens() {
    let cancel = CancelToken::new();
    let model = CancelDuringSemantic {
        inner: ScriptedModel::new(),
        cancel: cancel.clone(),
    };

    let outcome = run_segment(&model, &request(None), &cancel).expect("run");
    assert!(matches!(outcome, SegmentOutcome::Cancelled));

    // The semantic stage ran, but nothing after it did.
    let calls = model.inner.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], StageCall::Semantic { .. }));
}
