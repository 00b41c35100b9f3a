//! One segment through the three-stage pipeline.
//!
//! Sequencing is semantic → coarse → fine → decode. The same conditioning
//! bundle is handed to every stage (never chained per-stage outputs), and
//! the cancellation token is polled at every stage boundary. Cancellation is
//! all-or-nothing: partial results are discarded, never returned.

use crate::cancel::CancelToken;
use crate::model::{BarkModel, CoarseOpts, FineOpts, SemanticOpts};
use crate::prompt::HistoryPrompt;
use anyhow::Result;

/// Which stages receive the conditioning bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryScope {
    /// All three stages are conditioned.
    #[default]
    Full,
    /// Only the semantic stage is conditioned; coarse and fine run bare.
    SemanticOnly,
}

/// Per-stage seeds applied through [`BarkModel::set_seed`] just before the
/// corresponding stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageSeeds {
    /// Before the semantic stage.
    pub semantic: Option<i64>,
    /// Before the coarse stage.
    pub coarse: Option<i64>,
    /// Before the fine stage.
    pub fine: Option<i64>,
}

/// A unit of generation work: one text segment plus its conditioning and
/// sampling parameters.
#[derive(Debug, Clone)]
pub struct SegmentRequest<'a> {
    /// Text to synthesize.
    pub text: &'a str,
    /// Conditioning bundle, already selected by the continuity policy.
    pub history: Option<&'a HistoryPrompt>,
    /// Which stages the bundle reaches.
    pub scope: HistoryScope,
    /// 1-based position in the run.
    pub segment_number: usize,
    /// Total segments in the run.
    pub total_segments: usize,
    /// Semantic stage parameters, passed through verbatim.
    pub semantic: SemanticOpts,
    /// Coarse stage parameters, passed through verbatim.
    pub coarse: CoarseOpts,
    /// Fine stage parameters, passed through verbatim.
    pub fine: FineOpts,
    /// Per-stage seeding.
    pub seeds: StageSeeds,
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    /// All four stages completed.
    Done {
        /// The segment's own token arrays, reusable as conditioning.
        prompt: HistoryPrompt,
        /// Mono waveform at [`SAMPLE_RATE`](crate::model::SAMPLE_RATE).
        audio: Vec<f32>,
    },
    /// The cancellation token fired at a stage boundary; nothing is kept.
    Cancelled,
}

/// Drive one segment through all four stages.
///
/// Stage errors propagate as errors; cancellation is a regular outcome.
pub fn run_segment<M: BarkModel>(
    model: &M,
    request: &SegmentRequest<'_>,
    cancel: &CancelToken,
) -> Result<SegmentOutcome> {
    if cancel.is_cancelled() {
        return Ok(SegmentOutcome::Cancelled);
    }
    if let Some(seed) = request.seeds.semantic {
        model.set_seed(seed);
    }
    let semantic = model.generate_semantic(request.text, request.history, &request.semantic)?;

    if cancel.is_cancelled() {
        return Ok(SegmentOutcome::Cancelled);
    }
    let codec_history = match request.scope {
        HistoryScope::Full => request.history,
        HistoryScope::SemanticOnly => {
            log::debug!(
                "segment {}/{}: withholding history from coarse and fine",
                request.segment_number,
                request.total_segments
            );
            None
        }
    };
    if let Some(seed) = request.seeds.coarse {
        model.set_seed(seed);
    }
    let coarse = model.generate_coarse(&semantic, codec_history, &request.coarse)?;

    if cancel.is_cancelled() {
        return Ok(SegmentOutcome::Cancelled);
    }
    if let Some(seed) = request.seeds.fine {
        model.set_seed(seed);
    }
    let fine = model.generate_fine(&coarse, codec_history, &request.fine)?;

    if cancel.is_cancelled() {
        return Ok(SegmentOutcome::Cancelled);
    }
    let audio = model.decode(&fine)?;

    if cancel.is_cancelled() {
        return Ok(SegmentOutcome::Cancelled);
    }
    Ok(SegmentOutcome::Done {
        prompt: HistoryPrompt::new(semantic, coarse, fine),
        audio,
    })
}
