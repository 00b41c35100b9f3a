//! The long-form generation controller.
//!
//! Long text is split into segments, each segment runs through the
//! three-stage pipeline, and the conditioning carried from one segment to
//! the next follows the configured continuity policy. Per-segment artifacts
//! are persisted opportunistically in hoarder mode; the final concatenated
//! waveform and the canonical bundle are written once every segment has
//! succeeded. Cancellation at any point discards the whole run.

use crate::cancel::CancelToken;
use crate::config::GenerationConfig;
use crate::model::{BarkModel, CoarseOpts, FineOpts, SemanticOpts};
use crate::output::{self, derive_output_path, unique_dirpath, OutputName};
use crate::pipeline::{run_segment, HistoryScope, SegmentOutcome, SegmentRequest, StageSeeds};
use crate::prompt::{self, HistoryPrompt};
use crate::segment::{self, estimate_spoken_time};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Fine-stage temperature used when the configuration does not override it.
const FINE_TEMP_DEFAULT: f32 = 0.5;

/// One successfully generated segment.
#[derive(Debug, Clone)]
pub struct GeneratedSegment {
    /// The segment's text as passed to the pipeline.
    pub text: String,
    /// The segment's token arrays.
    pub prompt: HistoryPrompt,
    /// The segment's mono waveform.
    pub audio: Vec<f32>,
}

/// Result of a long-form run.
#[derive(Debug)]
pub enum LongformOutcome {
    /// Every segment generated; the final artifact set is on disk.
    Done {
        /// Per-segment results in order.
        segments: Vec<GeneratedSegment>,
        /// Concatenated waveform (including configured inter-segment
        /// silence).
        audio: Vec<f32>,
        /// Path of the final WAV.
        audio_path: PathBuf,
        /// Path of the persisted canonical bundle, when enabled.
        prompt_path: Option<PathBuf>,
    },
    /// Dry run: only the text splits were produced.
    SplitsOnly {
        /// The segments that would have been generated.
        segments: Vec<String>,
    },
    /// Cancelled mid-run; all accumulated segment data was discarded.
    Cancelled,
}

/// Provenance of the rolling conditioning bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RollingRole {
    /// A copy of the base bundle.
    Base,
    /// A prior segment's full generation.
    Generated,
}

/// Conditioning carried across segments, updated after every success.
struct Continuity {
    base: Option<HistoryPrompt>,
    rolling: Option<HistoryPrompt>,
    role: RollingRole,
    countdown: Option<i64>,
    flipper: bool,
}

impl Continuity {
    fn new(base: Option<HistoryPrompt>, interval: i64) -> Self {
        Self {
            rolling: base.clone(),
            base,
            role: RollingRole::Base,
            countdown: (interval >= 2).then_some(interval),
            flipper: false,
        }
    }

    /// Pick the conditioning for the upcoming pipeline call.
    ///
    /// Alternation takes total priority over the stability interval; the
    /// plain separate-prompts mode drops conditioning permanently.
    fn select(&mut self, config: &GenerationConfig) -> (Option<HistoryPrompt>, RollingRole) {
        if config.separate_prompts && config.separate_prompts_flipper {
            if self.flipper {
                self.flipper = false;
                log::info!("history prompt disabled for this segment");
                return (None, self.role);
            }
            self.flipper = true;
            return (self.rolling.clone(), self.role);
        }
        if config.separate_prompts {
            self.rolling = None;
            return (None, self.role);
        }
        (self.rolling.clone(), self.role)
    }

    /// Advance the rolling state after a successful segment.
    fn update(&mut self, interval: i64, generated: &HistoryPrompt) -> Result<()> {
        if self.base.is_none() {
            // No speaker was supplied: the first generated segment becomes
            // the anchor for the rest of the run.
            self.base = Some(generated.clone());
        }
        match interval {
            0 => {
                self.rolling = Some(generated.clone());
                self.role = RollingRole::Generated;
            }
            1 => {
                self.rolling = self.base.clone();
                self.role = RollingRole::Base;
            }
            i if i >= 2 => match self.countdown {
                Some(1) => {
                    self.countdown = Some(i);
                    self.rolling = self.base.clone();
                    self.role = RollingRole::Base;
                    log::info!("resetting to base history prompt, again in {i} segments");
                }
                Some(left) => {
                    self.countdown = Some(left - 1);
                    self.rolling = Some(generated.clone());
                    self.role = RollingRole::Generated;
                }
                None => anyhow::bail!("stability countdown missing for interval {i}"),
            },
            other => anyhow::bail!("stable_mode_interval is {other} and something has gone wrong"),
        }
        Ok(())
    }
}

/// Drives a full multi-segment generation run.
pub struct LongformGenerator {
    config: GenerationConfig,
    cancel: CancelToken,
}

impl LongformGenerator {
    /// Build a generator, validating the configuration up front.
    pub fn new(config: GenerationConfig) -> Result<Self> {
        Self::with_cancel_token(config, CancelToken::new())
    }

    /// Build a generator around an externally owned cancellation token.
    pub fn with_cancel_token(config: GenerationConfig, cancel: CancelToken) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, cancel })
    }

    /// Token that aborts this generator's runs when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The validated configuration.
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate audio for `text`, segment by segment.
    pub fn generate<M: BarkModel>(&self, model: &M, text: &str) -> Result<LongformOutcome> {
        let config = &self.config;

        if let Some(seed) = config.single_starting_seed {
            let effective = model.set_seed(seed);
            log::info!("starting seed set to {effective}");
        }

        let segments = self.split(text)?;
        log::info!("split text into {} segment(s)", segments.len());
        for (i, segment) in segments.iter().enumerate() {
            log::debug!(
                "segment {}/{}: est. {:.2}s, {} chars",
                i + 1,
                segments.len(),
                estimate_spoken_time(segment),
                segment.chars().count()
            );
        }

        if config.text_splits_only || config.dry_run || segments.is_empty() {
            return Ok(LongformOutcome::SplitsOnly { segments });
        }

        // Resolve and validate the base conditioning before any model work,
        // so a bad speaker aborts the run immediately.
        let (base, speaker_label) = self.resolve_base_prompt()?;

        let total = segments.len();
        let hoard = config.hoarder_mode && total > 1;
        let output_dir = if hoard {
            self.hoarder_dir(text, speaker_label.as_deref())?
        } else {
            config.output_dir.clone()
        };

        if hoard {
            if let Some(base) = &base {
                self.write_base_prompt(&output_dir, text, speaker_label.as_deref(), base)?;
            }
        }

        let interval = config.clamped_stable_mode_interval();
        let mut continuity = Continuity::new(base, interval);
        let mut generated: Vec<GeneratedSegment> = Vec::with_capacity(total);

        for (index, segment_text) in segments.iter().enumerate() {
            let number = index + 1;
            if self.cancel.is_cancelled() {
                log::warn!("cancelled before segment {number}/{total}; discarding run");
                return Ok(LongformOutcome::Cancelled);
            }

            let call_text = match &config.prompt_text_prefix {
                Some(prefix) => format!("{prefix} {segment_text}"),
                None => segment_text.clone(),
            };
            log::info!(
                "segment {number}/{total}: est. {:.2}s",
                estimate_spoken_time(&call_text)
            );

            let (history, role) = continuity.select(config);
            let scope = self.history_scope(history.is_some(), role, number);

            if let Some(seed) = config.seed {
                model.set_seed(seed);
            }
            let request = SegmentRequest {
                text: &call_text,
                history: history.as_ref(),
                scope,
                segment_number: number,
                total_segments: total,
                semantic: self.semantic_opts(),
                coarse: self.coarse_opts(),
                fine: self.fine_opts(),
                seeds: StageSeeds {
                    semantic: config.semantic_seed,
                    coarse: config.coarse_seed,
                    fine: config.fine_seed,
                },
            };
            let outcome = run_segment(model, &request, &self.cancel)
                .with_context(|| format!("segment {number}/{total} failed"))?;
            let (prompt, audio) = match outcome {
                SegmentOutcome::Done { prompt, audio } => (prompt, audio),
                SegmentOutcome::Cancelled => {
                    log::warn!("cancelled during segment {number}/{total}; discarding run");
                    return Ok(LongformOutcome::Cancelled);
                }
            };

            if !(config.separate_prompts && !config.separate_prompts_flipper) {
                continuity.update(interval, &prompt)?;
            }

            if hoard {
                self.write_segment_artifacts(
                    &output_dir,
                    &call_text,
                    speaker_label.as_deref(),
                    number,
                    total,
                    &prompt,
                    &audio,
                )?;
            }

            generated.push(GeneratedSegment {
                text: call_text,
                prompt,
                audio,
            });
        }

        if self.cancel.is_cancelled() {
            log::warn!("cancelled before finalizing; discarding run");
            return Ok(LongformOutcome::Cancelled);
        }

        self.finalize(generated, text, speaker_label.as_deref(), &output_dir)
    }

    /// Resolve, load, and validate the configured speaker, if any.
    fn resolve_base_prompt(&self) -> Result<(Option<HistoryPrompt>, Option<String>)> {
        let Some(speaker) = &self.config.speaker else {
            return Ok((None, None));
        };
        let path = prompt::resolve_prompt_path(speaker, &self.config.prompt_dirs)?;
        let base = HistoryPrompt::load(&path)?;
        let report = prompt::validate(&base);
        if !report.is_valid() {
            anyhow::bail!("speaker file {} is invalid:\n{report}", path.display());
        }
        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);
        log::info!("loaded base history prompt from {}", path.display());
        Ok((Some(base), label))
    }

    fn split(&self, text: &str) -> Result<Vec<String>> {
        let config = &self.config;
        let mut segments = match &config.legacy_split {
            Some(legacy) => segment::split_by_groups(text, legacy.unit, legacy.group_size)?,
            None => {
                let (goal, max) = segment::jittered_lengths(
                    config.split_goal_length,
                    config.split_max_length,
                    config.split_jitter,
                    &mut rand::thread_rng(),
                );
                segment::split_into_segments(text, goal, max)
            }
        };
        segments.retain(|s| !s.trim().is_empty());
        Ok(segments)
    }

    /// Which stages of this call receive the conditioning bundle.
    fn history_scope(&self, conditioned: bool, role: RollingRole, number: usize) -> HistoryScope {
        let config = &self.config;
        if !conditioned {
            return HistoryScope::Full;
        }
        if config.semantic_history_only && role == RollingRole::Base {
            return HistoryScope::SemanticOnly;
        }
        if config.absolute_semantic_history_only {
            return HistoryScope::SemanticOnly;
        }
        if let Some(every) = config.absolute_semantic_history_only_every_x {
            if number as u64 % every == 0 {
                return HistoryScope::SemanticOnly;
            }
        }
        HistoryScope::Full
    }

    fn semantic_opts(&self) -> SemanticOpts {
        let config = &self.config;
        SemanticOpts {
            temp: Some(config.semantic.temp.unwrap_or(config.text_temp)),
            ..config.semantic.clone()
        }
    }

    fn coarse_opts(&self) -> CoarseOpts {
        let config = &self.config;
        CoarseOpts {
            temp: Some(config.coarse.temp.unwrap_or(config.waveform_temp)),
            ..config.coarse.clone()
        }
    }

    fn fine_opts(&self) -> FineOpts {
        FineOpts {
            temp: Some(self.config.fine.temp.unwrap_or(FINE_TEMP_DEFAULT)),
        }
    }

    /// Unique per-run subdirectory hoarder artifacts are collected in.
    fn hoarder_dir(&self, text: &str, speaker_label: Option<&str>) -> Result<PathBuf> {
        let name = derive_output_path(&OutputName {
            output_dir: &self.config.output_dir,
            output_filename: self.config.output_filename.as_deref(),
            text,
            speaker_label,
            segment_number: None,
            total_segments: 1,
        })?;
        let stem = name
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("run")
            .to_string();
        let dir = unique_dirpath(&self.config.output_dir.join(stem));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Persist the base bundle so a hoarded run is reproducible.
    fn write_base_prompt(
        &self,
        dir: &Path,
        text: &str,
        speaker_label: Option<&str>,
        base: &HistoryPrompt,
    ) -> Result<()> {
        let wav_path = derive_output_path(&OutputName {
            output_dir: dir,
            output_filename: self.config.output_filename.as_deref(),
            text,
            speaker_label,
            segment_number: None,
            total_segments: 1,
        })?;
        let stem = wav_path.with_extension("");
        let path = PathBuf::from(format!("{}_initial_prompt.safetensors", stem.display()));
        base.save(path)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_segment_artifacts(
        &self,
        dir: &Path,
        text: &str,
        speaker_label: Option<&str>,
        number: usize,
        total: usize,
        prompt: &HistoryPrompt,
        audio: &[f32],
    ) -> Result<()> {
        let wav_path = derive_output_path(&OutputName {
            output_dir: dir,
            output_filename: self.config.output_filename.as_deref(),
            text,
            speaker_label,
            segment_number: Some(number),
            total_segments: total,
        })?;
        let written = output::write_wav(&wav_path, audio)?;
        prompt.save(written.with_extension("safetensors"))?;
        let log_path = PathBuf::from(format!(
            "{}_info.txt",
            written.with_extension("").display()
        ));
        output::write_params_log(&log_path, &self.params_log(text, Some((number, total))))?;
        Ok(())
    }

    /// Concatenate, write the final artifact set, and report.
    fn finalize(
        &self,
        segments: Vec<GeneratedSegment>,
        text: &str,
        speaker_label: Option<&str>,
        output_dir: &Path,
    ) -> Result<LongformOutcome> {
        let config = &self.config;
        let mut audio = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            if index > 0 && config.add_silence_between_segments > 0.0 {
                audio.extend(output::silence(config.add_silence_between_segments));
            }
            audio.extend_from_slice(&segment.audio);
        }

        let wav_path = derive_output_path(&OutputName {
            output_dir,
            output_filename: config.output_filename.as_deref(),
            text,
            speaker_label,
            segment_number: None,
            total_segments: 1,
        })?;
        let audio_path = output::write_wav(&wav_path, &audio)?;

        // The first segment's bundle is the canonical voice of this run.
        let prompt_path = if config.always_save_speaker {
            let first = segments
                .first()
                .map(|s| &s.prompt)
                .context("no segments were generated")?;
            Some(first.save(audio_path.with_extension("safetensors"))?)
        } else {
            None
        };

        if config.hoarder_mode {
            let log_path = PathBuf::from(format!(
                "{}_info.txt",
                audio_path.with_extension("").display()
            ));
            output::write_params_log(&log_path, &self.params_log(text, None))?;
        }

        log::info!("saved final audio to {}", audio_path.display());
        Ok(LongformOutcome::Done {
            segments,
            audio,
            audio_path,
            prompt_path,
        })
    }

    /// Human-readable record of the parameters behind an artifact.
    fn params_log(&self, text: &str, segment: Option<(usize, usize)>) -> String {
        let mut out = String::new();
        if let Some((number, total)) = segment {
            out.push_str(&format!("segment: {number}/{total}\n"));
        }
        out.push_str(&format!("text: {text}\n---\n"));
        match serde_yaml::to_string(&self.config) {
            Ok(yaml) => out.push_str(&yaml),
            Err(e) => out.push_str(&format!("<config unavailable: {e}>\n")),
        }
        out
    }
}
