//! # howler - Long-Form Generative Audio Orchestration
//!
//! Orchestration for a three-stage token-based text-to-audio pipeline:
//! text is split into speakable segments, each segment runs through
//! semantic, coarse, and fine token generation followed by waveform
//! decode, and voice continuity is carried between segments by
//! re-feeding conditioning bundles under a configurable policy.
//!
//! ## Architecture Overview
//!
//! 1. **Text Segmenter** ([`segment`]): splits arbitrarily long text on
//!    sentence boundaries into segments sized for a single pipeline call.
//!
//! 2. **Generation Pipeline** ([`pipeline`]): drives one segment through
//!    the three model stages behind the [`BarkModel`] trait, polling for
//!    cancellation between stages.
//!
//! 3. **Long-Form Controller** ([`longform`]): runs the per-segment loop,
//!    applies the continuity policy, and writes the final artifact set.
//!
//! 4. **History Prompt Store** ([`prompt`]): loads, validates, and saves
//!    conditioning bundles as safetensors files.
//!
//! ## Quick Start
//!
//! ```no_run
//! use howler::{GenerationConfig, LongformGenerator, LongformOutcome};
//! # use anyhow::Result;
//! # use howler::{BarkModel, CoarseOpts, FineOpts, HistoryPrompt, SemanticOpts};
//! # struct MyModel;
//! # impl BarkModel for MyModel {
//! #     fn set_seed(&self, seed: i64) -> i64 { seed }
//! #     fn generate_semantic(&self, _: &str, _: Option<&HistoryPrompt>, _: &SemanticOpts) -> Result<Vec<i64>> { Ok(vec![]) }
//! #     fn generate_coarse(&self, _: &[i64], _: Option<&HistoryPrompt>, _: &CoarseOpts) -> Result<Vec<Vec<i64>>> { Ok(vec![]) }
//! #     fn generate_fine(&self, _: &[Vec<i64>], _: Option<&HistoryPrompt>, _: &FineOpts) -> Result<Vec<Vec<i64>>> { Ok(vec![]) }
//! #     fn decode(&self, _: &[Vec<i64>]) -> Result<Vec<f32>> { Ok(vec![]) }
//! # }
//! # fn model() -> MyModel { MyModel }
//!
//! let config = GenerationConfig {
//!     speaker: Some("en_speaker_6".into()),
//!     ..GenerationConfig::default()
//! };
//! let generator = LongformGenerator::new(config).unwrap();
//! match generator.generate(&model(), "A long story, told one segment at a time.").unwrap() {
//!     LongformOutcome::Done { audio_path, .. } => println!("wrote {}", audio_path.display()),
//!     LongformOutcome::SplitsOnly { segments } => println!("{} segments", segments.len()),
//!     LongformOutcome::Cancelled => println!("cancelled"),
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod longform;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod segment;
pub mod speakers;

pub use cancel::CancelToken;
pub use config::{load_config, GenerationConfig, LegacySplit};
pub use longform::{GeneratedSegment, LongformGenerator, LongformOutcome};
pub use model::{
    BarkModel, CoarseOpts, FineOpts, SemanticOpts, CODEBOOK_SIZE, N_COARSE_CODEBOOKS,
    N_FINE_CODEBOOKS, SAMPLE_RATE, SEMANTIC_VOCAB_SIZE,
};
pub use pipeline::{run_segment, HistoryScope, SegmentOutcome, SegmentRequest, StageSeeds};
pub use prompt::{resolve_prompt_path, HistoryPrompt, PromptReport};
pub use segment::{estimate_spoken_time, split_into_segments, SplitUnit};
pub use speakers::{list_speakers, Speaker, SUPPORTED_LANGS};
