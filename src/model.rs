//! The model seam: constants of the Bark token hierarchy and the trait that
//! generation backends implement.
//!
//! The neural forward passes themselves live outside this crate. Everything
//! here treats the three token generators and the codec decoder as opaque
//! calls with documented signatures; the orchestration layers in
//! [`pipeline`](crate::pipeline) and [`longform`](crate::longform) only rely
//! on this boundary.

use crate::prompt::HistoryPrompt;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Number of distinct semantic token values.
pub const SEMANTIC_VOCAB_SIZE: i64 = 10_000;
/// Number of distinct values per codec codebook.
pub const CODEBOOK_SIZE: i64 = 1024;
/// Codebooks in the coarse stage.
pub const N_COARSE_CODEBOOKS: usize = 2;
/// Codebooks in the fine stage.
pub const N_FINE_CODEBOOKS: usize = 8;
/// Semantic tokens produced per second of speech.
pub const SEMANTIC_RATE_HZ: f64 = 49.9;
/// Coarse frames produced per second of speech.
pub const COARSE_RATE_HZ: f64 = 75.0;
/// Output waveform sample rate in Hz (mono).
pub const SAMPLE_RATE: u32 = 24_000;

/// Sampling options for the semantic (text → tokens) stage.
///
/// Every field is optional: `None` means "use the backend's built-in
/// default", it never overrides anything. Set fields are passed through
/// verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SemanticOpts {
    /// Sampling temperature.
    pub temp: Option<f32>,
    /// Top-k filtering.
    pub top_k: Option<usize>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f32>,
    /// Minimum end-of-sequence probability before early stop is considered.
    pub min_eos_p: Option<f32>,
    /// Hard cap on generated audio duration, in seconds.
    pub max_gen_duration_s: Option<f32>,
    /// Whether generation may stop before the duration cap.
    pub allow_early_stop: Option<bool>,
}

/// Sampling options for the coarse (semantic → coarse tokens) stage.
///
/// Same sparse-override contract as [`SemanticOpts`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoarseOpts {
    /// Sampling temperature.
    pub temp: Option<f32>,
    /// Top-k filtering.
    pub top_k: Option<usize>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f32>,
    /// Maximum coarse history tokens carried in-context.
    pub max_coarse_history: Option<usize>,
    /// Sliding window length for incremental decoding.
    pub sliding_window_len: Option<usize>,
}

/// Sampling options for the fine (coarse → fine tokens) stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FineOpts {
    /// Sampling temperature.
    pub temp: Option<f32>,
}

/// A Bark-style three-stage generation backend plus codec decoder.
///
/// Implementations own the network weights and their RNG state. The
/// conditioning bundle passed to each stage must be treated as read-only;
/// the orchestration layer clones before any cross-segment reuse.
pub trait BarkModel {
    /// Seed the backend's random state.
    ///
    /// `0` asks the backend to pick a random seed, a negative value disables
    /// deterministic algorithms. Returns the seed that took effect.
    fn set_seed(&self, seed: i64) -> i64;

    /// Generate semantic tokens from text, optionally voice-conditioned.
    fn generate_semantic(
        &self,
        text: &str,
        history: Option<&HistoryPrompt>,
        opts: &SemanticOpts,
    ) -> Result<Vec<i64>>;

    /// Generate coarse codebook rows from semantic tokens.
    fn generate_coarse(
        &self,
        semantic: &[i64],
        history: Option<&HistoryPrompt>,
        opts: &CoarseOpts,
    ) -> Result<Vec<Vec<i64>>>;

    /// Generate fine codebook rows from coarse rows.
    fn generate_fine(
        &self,
        coarse: &[Vec<i64>],
        history: Option<&HistoryPrompt>,
        opts: &FineOpts,
    ) -> Result<Vec<Vec<i64>>>;

    /// Decode fine tokens into a mono waveform at [`SAMPLE_RATE`].
    fn decode(&self, fine: &[Vec<i64>]) -> Result<Vec<f32>>;
}
