//! Generation configuration.
//!
//! Every recognized option is an explicit field with an explicit default;
//! there is no option bag. Per-stage sampling overrides follow the sparse
//! contract from [`model`](crate::model): an unset `Option` means "use the
//! stage's internal default" and never overrides anything.
//!
//! Configurations load from YAML via [`load_config`].

use crate::model::{CoarseOpts, FineOpts, SemanticOpts};
use crate::segment::SplitUnit;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Legacy grouping splitter selection; when present it replaces the
/// goal/max-length splitter entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacySplit {
    /// Unit to count.
    pub unit: SplitUnit,
    /// Units per segment.
    pub group_size: usize,
}

/// All options of a long-form generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Base history prompt: a speaker name or a path.
    pub speaker: Option<String>,
    /// Ordered directories searched for named speakers; first match wins.
    pub prompt_dirs: Vec<PathBuf>,

    /// How often conditioning resets to the base prompt: 0 drifts from the
    /// previous segment every time, 1 anchors on the base every segment, k≥2
    /// resets every k segments. Negative values are clamped to 0.
    pub stable_mode_interval: i64,
    /// Drop conditioning entirely (each segment generates a fresh voice).
    pub separate_prompts: bool,
    /// With `separate_prompts`, alternate conditioned and unconditioned
    /// segments instead of dropping conditioning everywhere.
    pub separate_prompts_flipper: bool,
    /// When the previous segment's role was the base prompt, withhold it
    /// from the coarse and fine stages.
    pub semantic_history_only: bool,
    /// Withhold conditioning from the coarse and fine stages on every
    /// segment.
    pub absolute_semantic_history_only: bool,
    /// Withhold conditioning from coarse/fine whenever the 1-based segment
    /// number is divisible by this.
    pub absolute_semantic_history_only_every_x: Option<u64>,

    /// Target segment length in characters.
    pub split_goal_length: usize,
    /// Hard segment length cap in characters.
    pub split_max_length: usize,
    /// Random ±offset applied to goal and max before splitting.
    pub split_jitter: usize,
    /// Legacy grouping splitter; ignores the length fields when set.
    pub legacy_split: Option<LegacySplit>,
    /// Text prepended to every segment before generation.
    pub prompt_text_prefix: Option<String>,

    /// Default semantic-stage temperature.
    pub text_temp: f32,
    /// Default coarse-stage temperature.
    pub waveform_temp: f32,
    /// Semantic stage overrides.
    pub semantic: SemanticOpts,
    /// Coarse stage overrides.
    pub coarse: CoarseOpts,
    /// Fine stage overrides.
    pub fine: FineOpts,

    /// Seed applied before every segment.
    pub seed: Option<i64>,
    /// Seed applied once, before the first segment only.
    pub single_starting_seed: Option<i64>,
    /// Seed applied before the semantic stage of each segment.
    pub semantic_seed: Option<i64>,
    /// Seed applied before the coarse stage of each segment.
    pub coarse_seed: Option<i64>,
    /// Seed applied before the fine stage of each segment.
    pub fine_seed: Option<i64>,

    /// Directory final artifacts are written to.
    pub output_dir: PathBuf,
    /// Explicit output base name; derived from text/date/speaker when unset.
    pub output_filename: Option<String>,
    /// Keep everything: per-segment audio, bundles, and parameter logs in a
    /// per-run subdirectory.
    pub hoarder_mode: bool,
    /// Persist the first segment's bundle next to the final audio.
    pub always_save_speaker: bool,
    /// Silence inserted between segments, in seconds.
    pub add_silence_between_segments: f32,
    /// Split and report without generating or writing anything.
    pub dry_run: bool,
    /// Alias for `dry_run` used by text-tuning workflows.
    pub text_splits_only: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            speaker: None,
            prompt_dirs: vec![PathBuf::from("prompts"), PathBuf::from("custom_prompts")],
            stable_mode_interval: 1,
            separate_prompts: false,
            separate_prompts_flipper: false,
            semantic_history_only: false,
            absolute_semantic_history_only: false,
            absolute_semantic_history_only_every_x: None,
            split_goal_length: 110,
            split_max_length: 170,
            split_jitter: 0,
            legacy_split: None,
            prompt_text_prefix: None,
            text_temp: 0.7,
            waveform_temp: 0.7,
            semantic: SemanticOpts::default(),
            coarse: CoarseOpts::default(),
            fine: FineOpts::default(),
            seed: None,
            single_starting_seed: None,
            semantic_seed: None,
            coarse_seed: None,
            fine_seed: None,
            output_dir: PathBuf::from("howler_samples"),
            output_filename: None,
            hoarder_mode: false,
            always_save_speaker: true,
            add_silence_between_segments: 0.0,
            dry_run: false,
            text_splits_only: false,
        }
    }
}

impl GenerationConfig {
    /// Reject contradictory settings before any generation starts.
    pub fn validate(&self) -> Result<()> {
        if self.split_goal_length == 0 {
            anyhow::bail!("split_goal_length must be at least 1");
        }
        if self.split_max_length < self.split_goal_length {
            anyhow::bail!(
                "split_max_length ({}) must be at least split_goal_length ({})",
                self.split_max_length,
                self.split_goal_length
            );
        }
        if self.absolute_semantic_history_only_every_x == Some(0) {
            anyhow::bail!("absolute_semantic_history_only_every_x must be at least 1");
        }
        if let Some(legacy) = &self.legacy_split {
            if legacy.group_size == 0 {
                anyhow::bail!("legacy_split.group_size must be at least 1");
            }
        }
        if self.add_silence_between_segments < 0.0 {
            anyhow::bail!("add_silence_between_segments must not be negative");
        }
        Ok(())
    }

    /// Stability interval with negatives clamped to 0 (drifting mode).
    pub fn clamped_stable_mode_interval(&self) -> i64 {
        self.stable_mode_interval.max(0)
    }
}

/// Load a generation configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file doesn't exist, contains invalid YAML, or
/// fails [`GenerationConfig::validate`].
pub fn load_config(path: impl AsRef<Path>) -> Result<GenerationConfig> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }
    let data = fs::read_to_string(path)?;
    let config: GenerationConfig = serde_yaml::from_str(&data)?;
    config.validate()?;
    Ok(config)
}
