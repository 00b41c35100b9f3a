//! Output artifact naming and WAV writing.
//!
//! Filenames are derived from the prompt text, a timestamp, and the speaker
//! label, then sanitized and made collision-free. Unique-path allocation is
//! performed at the point of the actual write so repeated runs never clobber
//! earlier artifacts.

use crate::model::SAMPLE_RATE;
use anyhow::Result;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs;
use std::path::{Path, PathBuf};

/// Characters stripped from filename components.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Remove filesystem-hostile and control characters from one path component.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN.contains(c) && !c.is_control())
        .collect()
}

/// Return `path` if unused, otherwise append `_1`, `_2`, … before the
/// extension until an unused path is found.
///
/// Call this at write time; allocating earlier reopens the window for a
/// collision between allocation and write.
pub fn unique_filepath(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let mut counter = 1;
    loop {
        let name = match ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Directory flavor of [`unique_filepath`]; suffixes the whole name.
pub fn unique_dirpath(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let mut counter = 1;
    loop {
        let candidate = parent.join(format!("{base}_{counter}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Inputs for [`derive_output_path`].
#[derive(Debug, Clone)]
pub struct OutputName<'a> {
    /// Directory the artifact lands in (created on demand).
    pub output_dir: &'a Path,
    /// Explicit base filename; when set, text/date/speaker naming is skipped.
    pub output_filename: Option<&'a str>,
    /// Prompt text the artifact was generated from.
    pub text: &'a str,
    /// Speaker label, typically the history-prompt file stem.
    pub speaker_label: Option<&'a str>,
    /// 1-based segment number for per-segment (hoarder) artifacts.
    pub segment_number: Option<usize>,
    /// Total segments in the run; the segment prefix only appears when > 1.
    pub total_segments: usize,
}

impl Default for OutputName<'_> {
    fn default() -> Self {
        Self {
            output_dir: Path::new(""),
            output_filename: None,
            text: "",
            speaker_label: None,
            segment_number: None,
            total_segments: 1,
        }
    }
}

/// Build an output `.wav` path from generation parameters.
///
/// The base name is `<text[..15]>-<yy-mmdd-HHMM-SS>-SPK-<speaker>`, with the
/// text scrubbed down to word characters so it stays greppable. Per-segment
/// artifacts get a zero-padded `NNN_` prefix. The returned path is not yet
/// allocated as unique; that happens at write time.
pub fn derive_output_path(name: &OutputName<'_>) -> Result<PathBuf> {
    let base = match name.output_filename {
        Some(explicit) if !explicit.trim().is_empty() => sanitize_component(explicit.trim()),
        _ => {
            let text = scrub_text(name.text, 15);
            let date = chrono::Local::now().format("%y-%m%d-%H%M-%S");
            let speaker = name
                .speaker_label
                .map(|s| sanitize_component(s))
                .unwrap_or_else(|| "random".to_string());
            format!("{text}-{date}-SPK-{speaker}")
        }
    };

    let base = match name.segment_number {
        Some(n) if name.total_segments > 1 => format!("{:03}_{base}", n),
        _ => base,
    };

    fs::create_dir_all(name.output_dir)?;
    Ok(name.output_dir.join(format!("{base}.wav")))
}

/// Reduce prompt text to a short word-character slug.
fn scrub_text(text: &str, max_chars: usize) -> String {
    let mut scrubbed: String = text
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .take(max_chars)
        .collect();
    while scrubbed.ends_with('_') {
        scrubbed.pop();
    }
    if scrubbed.is_empty() {
        scrubbed.push_str("untitled");
    }
    scrubbed
}

/// Write a mono waveform as 16-bit PCM at [`SAMPLE_RATE`].
///
/// The path is made unique first; returns the path actually written.
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<PathBuf> {
    let path = unique_filepath(path);
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for sample in samples {
        let value = sample.clamp(-1.0, 1.0);
        writer.write_sample((value * i16::MAX as f32).round() as i16)?;
    }
    writer.finalize()?;
    log::info!(".wav saved to {}", path.display());
    Ok(path)
}

/// Read a mono WAV back into samples (testing aid and prompt inspection).
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let mut samples = Vec::new();
    match spec.sample_format {
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                samples.push(sample?);
            }
        }
        SampleFormat::Int => {
            let max = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                samples.push(sample? as f32 / max);
            }
        }
    }
    Ok((samples, spec.sample_rate))
}

/// Write a plain-text parameter log next to an artifact (hoarder mode).
pub fn write_params_log(path: &Path, contents: &str) -> Result<PathBuf> {
    let path = unique_filepath(path);
    fs::write(&path, contents)?;
    Ok(path)
}

/// A silence buffer of `seconds` at the pipeline sample rate.
pub fn silence(seconds: f32) -> Vec<f32> {
    vec![0.0; (seconds * SAMPLE_RATE as f32) as usize]
}
