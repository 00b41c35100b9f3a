//! Speaker catalog: built-in speaker names plus bundles discovered on disk,
//! classified by language.

use crate::prompt::PROMPT_EXTENSION;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Languages the built-in speakers cover, as (name, code) pairs.
pub const SUPPORTED_LANGS: &[(&str, &str)] = &[
    ("English", "en"),
    ("German", "de"),
    ("Spanish", "es"),
    ("French", "fr"),
    ("Hindi", "hi"),
    ("Italian", "it"),
    ("Japanese", "ja"),
    ("Korean", "ko"),
    ("Polish", "pl"),
    ("Portuguese", "pt"),
    ("Russian", "ru"),
    ("Turkish", "tr"),
    ("Chinese", "zh"),
];

/// Numbered built-in speakers per language.
const SPEAKERS_PER_LANG: usize = 10;

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speaker {
    /// Name accepted wherever a speaker is configured.
    pub name: String,
    /// Language name from [`SUPPORTED_LANGS`]; `"unrecognized"` when the
    /// file name carries no known language prefix.
    pub language: String,
    /// Bundle file backing a discovered speaker; `None` for built-ins.
    pub path: Option<PathBuf>,
}

/// Built-in speaker names, grouped by language.
pub fn builtin_speakers() -> Vec<Speaker> {
    let mut out = vec![Speaker {
        name: "announcer".to_string(),
        language: "English".to_string(),
        path: None,
    }];
    for (language, code) in SUPPORTED_LANGS {
        for n in 0..SPEAKERS_PER_LANG {
            out.push(Speaker {
                name: format!("{code}_speaker_{n}"),
                language: (*language).to_string(),
                path: None,
            });
        }
    }
    out
}

/// Language name for a speaker file stem, matching a leading two-letter
/// code followed by `_` against the language table.
fn classify(stem: &str) -> &'static str {
    let Some(prefix) = stem.split('_').next() else {
        return "unrecognized";
    };
    SUPPORTED_LANGS
        .iter()
        .find(|(_, code)| *code == prefix)
        .map(|(name, _)| *name)
        .unwrap_or("unrecognized")
}

/// All speakers: built-ins plus bundle files found under `prompt_dirs`,
/// walked recursively. Files with no recognizable language prefix are kept
/// under `"unrecognized"`, never dropped.
///
/// Missing directories are skipped silently so a fresh checkout lists the
/// built-ins without complaint.
///
/// # Errors
/// Fails when a directory exists but cannot be read.
pub fn list_speakers(prompt_dirs: &[PathBuf]) -> Result<Vec<Speaker>> {
    let mut out = builtin_speakers();
    for dir in prompt_dirs {
        if !dir.is_dir() {
            continue;
        }
        let mut found = Vec::new();
        discover(dir, &mut found)?;
        found.sort_by(|a, b| a.name.cmp(&b.name));
        out.append(&mut found);
    }
    Ok(out)
}

fn discover(dir: &Path, out: &mut Vec<Speaker>) -> Result<()> {
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            discover(&path, out)?;
            continue;
        }
        let is_prompt = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(PROMPT_EXTENSION));
        if !is_prompt {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        out.push(Speaker {
            name: stem.to_string(),
            language: classify(stem).to_string(),
            path: Some(path.clone()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtins_cover_every_language() {
        let speakers = builtin_speakers();
        for (_, code) in SUPPORTED_LANGS {
            let count = speakers
                .iter()
                .filter(|s| s.name.starts_with(&format!("{code}_speaker_")))
                .count();
            assert_eq!(count, SPEAKERS_PER_LANG, "language {code}");
        }
        assert!(speakers.iter().any(|s| s.name == "announcer"));
    }

    #[test]
    fn discovered_bundles_are_classified_by_prefix() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("v2");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join("de_narrator.safetensors"), b"x").expect("write");
        std::fs::write(nested.join("mystery.safetensors"), b"x").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"x").expect("write");

        let speakers = list_speakers(&[dir.path().to_path_buf()]).expect("list");
        let found: Vec<_> = speakers.iter().filter(|s| s.path.is_some()).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "de_narrator");
        assert_eq!(found[0].language, "German");
        assert_eq!(found[1].name, "mystery");
        assert_eq!(found[1].language, "unrecognized");
    }

    #[test]
    fn missing_directories_are_skipped() {
        let speakers =
            list_speakers(&[PathBuf::from("/nonexistent/prompt/dir")]).expect("list");
        assert_eq!(speakers.len(), builtin_speakers().len());
    }
}
