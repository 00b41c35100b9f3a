//! History prompts: the three-array voice conditioning bundle.
//!
//! A prompt bundles the semantic, coarse, and fine token arrays of a prior
//! generation (or a shipped speaker). On disk it is a safetensors file with
//! exactly the keys `semantic_prompt`, `coarse_prompt`, and `fine_prompt`;
//! loading fails loudly when any key is missing rather than substituting a
//! default. Validation is structural and never errors for well-typed data.

use crate::model::{
    CODEBOOK_SIZE, COARSE_RATE_HZ, N_COARSE_CODEBOOKS, N_FINE_CODEBOOKS, SEMANTIC_RATE_HZ,
    SEMANTIC_VOCAB_SIZE,
};
use crate::output::unique_filepath;
use anyhow::{Context, Result};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension used for persisted prompts.
pub const PROMPT_EXTENSION: &str = "safetensors";

const SEMANTIC_KEY: &str = "semantic_prompt";
const COARSE_KEY: &str = "coarse_prompt";
const FINE_KEY: &str = "fine_prompt";

/// Out-of-range diagnostics include this many tokens on each side.
const TOKEN_SAMPLES: usize = 3;

/// Voice conditioning bundle: one generation's semantic, coarse, and fine
/// token arrays.
///
/// Immutable once produced; the long-form controller clones it before any
/// cross-segment reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPrompt {
    /// 1-D semantic token sequence, values in `[0, SEMANTIC_VOCAB_SIZE)`.
    pub semantic: Vec<i64>,
    /// `N_COARSE_CODEBOOKS` rows of coarse codec tokens.
    pub coarse: Vec<Vec<i64>>,
    /// `N_FINE_CODEBOOKS` rows of fine codec tokens, same width as coarse.
    pub fine: Vec<Vec<i64>>,
}

impl HistoryPrompt {
    /// Bundle the three arrays. All three must be present by construction;
    /// shape and range problems are surfaced by [`validate`].
    pub fn new(semantic: Vec<i64>, coarse: Vec<Vec<i64>>, fine: Vec<Vec<i64>>) -> Self {
        Self {
            semantic,
            coarse,
            fine,
        }
    }

    /// Load a prompt from a safetensors file.
    ///
    /// Errors on unreadable files, missing keys, or non-I64 tensors. A
    /// loadable bundle that merely violates shape/range invariants loads
    /// fine here and is caught by [`validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("cannot read history prompt {}", path.display()))?;
        let tensors = SafeTensors::deserialize(&data)
            .with_context(|| format!("corrupt history prompt {}", path.display()))?;

        let semantic = tensor_rows(&tensors, SEMANTIC_KEY, path)?
            .into_iter()
            .flatten()
            .collect();
        let coarse = tensor_rows(&tensors, COARSE_KEY, path)?;
        let fine = tensor_rows(&tensors, FINE_KEY, path)?;
        Ok(Self::new(semantic, coarse, fine))
    }

    /// Persist the prompt, allocating a unique path at write time.
    ///
    /// The bytes go to a sibling temp file first and are renamed into place,
    /// so a normally-terminating run never leaves a half-written bundle.
    /// Returns the path actually written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = unique_filepath(path.as_ref());

        let semantic_bytes = encode_i64(&self.semantic);
        let coarse_flat: Vec<i64> = self.coarse.iter().flatten().copied().collect();
        let coarse_bytes = encode_i64(&coarse_flat);
        let fine_flat: Vec<i64> = self.fine.iter().flatten().copied().collect();
        let fine_bytes = encode_i64(&fine_flat);

        let mut tensors = HashMap::new();
        tensors.insert(
            SEMANTIC_KEY.to_string(),
            TensorView::new(Dtype::I64, vec![self.semantic.len()], &semantic_bytes)?,
        );
        tensors.insert(
            COARSE_KEY.to_string(),
            TensorView::new(Dtype::I64, shape_2d(&self.coarse), &coarse_bytes)?,
        );
        tensors.insert(
            FINE_KEY.to_string(),
            TensorView::new(Dtype::I64, shape_2d(&self.fine), &fine_bytes)?,
        );
        let serialized = safetensors::serialize(&tensors, &None)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serialized)
            .with_context(|| format!("cannot write history prompt {}", tmp.display()))?;
        fs::rename(&tmp, &path)?;
        log::info!("history prompt saved to {}", path.display());
        Ok(path)
    }

    /// Width of the coarse rows (0 when empty).
    pub fn coarse_len(&self) -> usize {
        self.coarse.first().map(|row| row.len()).unwrap_or(0)
    }
}

fn shape_2d(rows: &[Vec<i64>]) -> Vec<usize> {
    vec![rows.len(), rows.first().map(|r| r.len()).unwrap_or(0)]
}

fn encode_i64(values: &[i64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Extract a 1-D or 2-D I64 tensor as rows, erroring on a missing key.
fn tensor_rows(tensors: &SafeTensors, key: &str, path: &Path) -> Result<Vec<Vec<i64>>> {
    let view = tensors
        .tensor(key)
        .map_err(|e| anyhow::anyhow!("{} is missing `{key}`: {e}", path.display()))?;
    if view.dtype() != Dtype::I64 {
        anyhow::bail!(
            "{}: `{key}` should be I64 but is {:?}",
            path.display(),
            view.dtype()
        );
    }
    let mut values = Vec::with_capacity(view.data().len() / 8);
    for chunk in view.data().chunks_exact(8) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        values.push(i64::from_le_bytes(buf));
    }
    match view.shape() {
        [_] => Ok(vec![values]),
        [rows, 0] => Ok(vec![Vec::new(); *rows]),
        [rows, cols] => {
            if values.len() != rows * cols {
                anyhow::bail!("{}: `{key}` shape disagrees with data", path.display());
            }
            Ok(values.chunks(*cols).map(|c| c.to_vec()).collect())
        }
        other => anyhow::bail!(
            "{}: `{key}` should be 1-D or 2-D, got {} dims",
            path.display(),
            other.len()
        ),
    }
}

/// Resolve a speaker name or path against the ordered search directories.
///
/// Bare names get the implicit `.safetensors` extension. A name with an
/// explicit directory component is checked as-is; otherwise each search
/// directory is tried in order and the first existing file wins.
pub fn resolve_prompt_path(name: &str, search_dirs: &[PathBuf]) -> Result<PathBuf> {
    let mut candidate = PathBuf::from(name);
    if candidate.extension().is_none() {
        candidate.set_extension(PROMPT_EXTENSION);
    }

    let has_dir = candidate.parent().map(|p| !p.as_os_str().is_empty()) == Some(true);
    if has_dir {
        if candidate.exists() {
            return Ok(candidate);
        }
        anyhow::bail!("can't find speaker file at {}", candidate.display());
    }

    for dir in search_dirs {
        let in_dir = dir.join(&candidate);
        if in_dir.exists() {
            return Ok(in_dir);
        }
    }
    anyhow::bail!(
        "speaker `{name}` not found in any of: {}",
        search_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Findings for one of the three prompt arrays.
#[derive(Debug, Clone, Default)]
pub struct ArrayReport {
    /// False once any check failed.
    pub valid: bool,
    /// Human-readable descriptions of each failed check.
    pub messages: Vec<String>,
}

impl ArrayReport {
    fn ok() -> Self {
        Self {
            valid: true,
            messages: Vec::new(),
        }
    }

    fn fail(&mut self, message: String) {
        self.valid = false;
        self.messages.push(message);
    }
}

/// Structural validation result for a whole prompt.
#[derive(Debug, Clone)]
pub struct PromptReport {
    /// Checks on the 1-D semantic array.
    pub semantic: ArrayReport,
    /// Checks on the coarse rows, including the semantic:coarse ratio.
    pub coarse: ArrayReport,
    /// Checks on the fine rows, including width agreement with coarse.
    pub fine: ArrayReport,
}

impl PromptReport {
    /// True when every sub-report passed.
    pub fn is_valid(&self) -> bool {
        self.semantic.valid && self.coarse.valid && self.fine.valid
    }
}

impl fmt::Display for PromptReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "valid");
        }
        for (name, report) in [
            ("semantic", &self.semantic),
            ("coarse", &self.coarse),
            ("fine", &self.fine),
        ] {
            if report.valid {
                continue;
            }
            writeln!(f, "{name}_prompt failed the following checks:")?;
            for (i, message) in report.messages.iter().enumerate() {
                writeln!(f, "  {}: {message}", i + 1)?;
            }
        }
        Ok(())
    }
}

/// Check a prompt against the shape and range invariants.
///
/// Pure: invalid-but-well-typed data produces a failing report, never an
/// error.
pub fn validate(prompt: &HistoryPrompt) -> PromptReport {
    PromptReport {
        semantic: semantic_report(prompt),
        coarse: coarse_report(prompt),
        fine: fine_report(prompt),
    }
}

fn semantic_report(prompt: &HistoryPrompt) -> ArrayReport {
    let mut report = ArrayReport::ok();
    let semantic = &prompt.semantic;
    if semantic.is_empty() {
        report.fail("should not be empty".to_string());
        return report;
    }
    check_range(&mut report, semantic, SEMANTIC_VOCAB_SIZE, None);
    report
}

fn coarse_report(prompt: &HistoryPrompt) -> ArrayReport {
    let mut report = ArrayReport::ok();
    check_rows(&mut report, &prompt.coarse, N_COARSE_CODEBOOKS);
    if !report.valid {
        return report;
    }

    if !prompt.semantic.is_empty() {
        // Coarse and semantic streams run at fixed rates, so their length
        // ratio is a cheap consistency probe between the two arrays.
        let expected = round1(COARSE_RATE_HZ / SEMANTIC_RATE_HZ);
        let ratio = round1(prompt.coarse_len() as f64 / prompt.semantic.len() as f64);
        if ratio != expected {
            report.fail(format!(
                "coarse:semantic length ratio should be {expected}, but it was {ratio}"
            ));
        }
    }
    report
}

fn fine_report(prompt: &HistoryPrompt) -> ArrayReport {
    let mut report = ArrayReport::ok();
    check_rows(&mut report, &prompt.fine, N_FINE_CODEBOOKS);
    if !report.valid {
        return report;
    }

    let fine_len = prompt.fine.first().map(|r| r.len()).unwrap_or(0);
    if fine_len != prompt.coarse_len() {
        report.fail(format!(
            "should be the same width as coarse_prompt ({}), but it was {fine_len}",
            prompt.coarse_len()
        ));
    }
    report
}

/// Shared checks for the two 2-D codebook arrays.
fn check_rows(report: &mut ArrayReport, rows: &[Vec<i64>], expected_rows: usize) {
    if rows.len() != expected_rows {
        report.fail(format!(
            "should have {expected_rows} rows, but it has {}",
            rows.len()
        ));
        return;
    }
    let width = rows[0].len();
    if width == 0 {
        report.fail("should not be empty".to_string());
        return;
    }
    if rows.iter().any(|row| row.len() != width) {
        report.fail("rows should all have the same length".to_string());
        return;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        if !report.valid {
            break;
        }
        check_range(report, row, CODEBOOK_SIZE, Some(row_idx));
    }
}

/// Range check with a window of surrounding tokens for diagnosis.
fn check_range(report: &mut ArrayReport, values: &[i64], vocab: i64, row: Option<usize>) {
    let (min_idx, min) = argminmax(values, |a, b| a < b);
    let (max_idx, max) = argminmax(values, |a, b| a > b);

    let offending = if min < 0 {
        Some((min_idx, format!("minimum value of 0, but it was {min}")))
    } else if max >= vocab {
        Some((
            max_idx,
            format!("maximum value less than {vocab}, but it was {max}"),
        ))
    } else {
        None
    };

    if let Some((index, message)) = offending {
        report.fail(format!("should have a {message}"));
        let lo = index.saturating_sub(TOKEN_SAMPLES);
        let hi = (index + TOKEN_SAMPLES).min(values.len());
        let window = &values[lo..hi];
        match row {
            Some(row) => report
                .messages
                .push(format!("surrounding tokens in row {row}: {window:?}")),
            None => report
                .messages
                .push(format!("surrounding tokens: {window:?}")),
        }
    }
}

fn argminmax(values: &[i64], better: impl Fn(i64, i64) -> bool) -> (usize, i64) {
    let mut best = (0, values[0]);
    for (idx, &value) in values.iter().enumerate() {
        if better(value, best.1) {
            best = (idx, value);
        }
    }
    best
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{N_COARSE_CODEBOOKS, N_FINE_CODEBOOKS};
    use tempfile::tempdir;

    fn valid_prompt() -> HistoryPrompt {
        // 100 semantic tokens at 49.9 Hz pair with 150 coarse/fine frames
        // at 75 Hz (ratio 1.5).
        HistoryPrompt::new(
            vec![5; 100],
            vec![vec![7; 150]; N_COARSE_CODEBOOKS],
            vec![vec![9; 150]; N_FINE_CODEBOOKS],
        )
    }

    #[test]
    fn valid_prompt_passes() {
        let report = validate(&valid_prompt());
        assert!(report.is_valid(), "{report}");
        assert_eq!(report.to_string(), "valid");
    }

    #[test]
    fn empty_semantic_fails() {
        let mut prompt = valid_prompt();
        prompt.semantic.clear();
        let report = validate(&prompt);
        assert!(!report.semantic.valid);
    }

    #[test]
    fn out_of_range_semantic_reports_window() {
        let mut prompt = valid_prompt();
        prompt.semantic[40] = SEMANTIC_VOCAB_SIZE + 3;
        let report = validate(&prompt);
        assert!(!report.semantic.valid);
        let all = report.semantic.messages.join("\n");
        assert!(all.contains("10003"), "{all}");
        assert!(all.contains("surrounding tokens"), "{all}");
    }

    #[test]
    fn negative_coarse_reports_row() {
        let mut prompt = valid_prompt();
        prompt.coarse[1][0] = -2;
        let report = validate(&prompt);
        assert!(!report.coarse.valid);
        assert!(report.coarse.messages.join("\n").contains("row 1"));
    }

    #[test]
    fn wrong_row_count_fails() {
        let mut prompt = valid_prompt();
        prompt.fine.pop();
        let report = validate(&prompt);
        assert!(!report.fine.valid);
        assert!(report.fine.messages[0].contains("8 rows"));
    }

    #[test]
    fn ratio_mismatch_fails() {
        let mut prompt = valid_prompt();
        prompt.semantic = vec![5; 150];
        let report = validate(&prompt);
        assert!(!report.coarse.valid);
    }

    #[test]
    fn fine_width_must_match_coarse() {
        let mut prompt = valid_prompt();
        prompt.fine = vec![vec![9; 140]; N_FINE_CODEBOOKS];
        let report = validate(&prompt);
        assert!(!report.fine.valid);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let prompt = valid_prompt();
        let path = prompt
            .save(dir.path().join("voice.safetensors"))
            .expect("save");
        let loaded = HistoryPrompt::load(&path).expect("load");
        assert_eq!(loaded, prompt);
        // No stray temp file left behind.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn save_never_overwrites() {
        let dir = tempdir().expect("tempdir");
        let prompt = valid_prompt();
        let target = dir.path().join("voice.safetensors");
        let first = prompt.save(&target).expect("first save");
        let second = prompt.save(&target).expect("second save");
        assert_eq!(first, target);
        assert_ne!(second, first);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn load_rejects_missing_key() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.safetensors");

        let bytes = encode_i64(&[1, 2, 3]);
        let mut tensors = HashMap::new();
        tensors.insert(
            "semantic_prompt".to_string(),
            TensorView::new(Dtype::I64, vec![3], &bytes).expect("view"),
        );
        std::fs::write(&path, safetensors::serialize(&tensors, &None).expect("ser"))
            .expect("write");

        let err = HistoryPrompt::load(&path).unwrap_err();
        assert!(err.to_string().contains("coarse_prompt"), "{err}");
    }

    #[test]
    fn resolve_prefers_earlier_directories() {
        let dir = tempdir().expect("tempdir");
        let first = dir.path().join("a");
        let second = dir.path().join("b");
        std::fs::create_dir_all(&first).expect("mkdir");
        std::fs::create_dir_all(&second).expect("mkdir");
        std::fs::write(first.join("voice.safetensors"), b"x").expect("write");
        std::fs::write(second.join("voice.safetensors"), b"y").expect("write");

        let found =
            resolve_prompt_path("voice", &[first.clone(), second.clone()]).expect("resolve");
        assert_eq!(found, first.join("voice.safetensors"));
    }

    #[test]
    fn resolve_reports_searched_directories() {
        let dirs = vec![PathBuf::from("/nonexistent/a"), PathBuf::from("/nonexistent/b")];
        let err = resolve_prompt_path("ghost", &dirs).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("ghost"), "{text}");
        assert!(text.contains("/nonexistent/a"), "{text}");
        assert!(text.contains("/nonexistent/b"), "{text}");
    }
}
