//! Artifact maintenance.
//!
//! Two passes over an artifact directory:
//!   1. delete orphans -- artifacts whose source video no longer exists;
//!   2. reformat the rest -- repair trailing-comma syntax errors, strip the
//!      reserved metadata blocks, and rewrite with canonical formatting.
//!
//! The only repair attempted is trailing-comma removal before closing
//! brackets/braces. Files that still fail to parse are counted and left
//! untouched rather than guessed at.

use std::path::Path;

use regex::Regex;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::artifact::{FILE_METADATA_KEY, USAGE_METADATA_KEY};
use crate::selector::VIDEO_EXTENSIONS;

/// Outcome counters for one maintenance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TidyReport {
    /// Artifacts parsed and rewritten.
    pub processed: usize,
    /// Subset of `processed` that needed the trailing-comma repair.
    pub repaired: usize,
    /// Artifacts deleted because their video is gone.
    pub deleted_orphans: usize,
    /// Files that could not be parsed, repaired, or deleted.
    pub errors: usize,
}

/// Run both passes over `artifact_dir`, checking orphans against
/// `input_root`.
pub fn run(artifact_dir: &Path, input_root: &Path) -> std::io::Result<TidyReport> {
    let mut report = TidyReport::default();
    clean_orphans(artifact_dir, input_root, &mut report)?;
    reformat_artifacts(artifact_dir, &mut report)?;

    info!(
        processed = report.processed,
        repaired = report.repaired,
        deleted_orphans = report.deleted_orphans,
        errors = report.errors,
        "Maintenance complete"
    );
    Ok(report)
}

/// Delete artifacts whose corresponding video (any recognized extension) no
/// longer exists under `input_root`. Deletion failures are logged and counted;
/// processing continues.
fn clean_orphans(
    artifact_dir: &Path,
    input_root: &Path,
    report: &mut TidyReport,
) -> std::io::Result<()> {
    if !artifact_dir.exists() {
        warn!(path = %artifact_dir.display(), "Artifact directory not found");
        return Ok(());
    }

    for entry in std::fs::read_dir(artifact_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(stem) = artifact_stem(&path) else {
            continue;
        };

        let has_video = VIDEO_EXTENSIONS
            .iter()
            .any(|ext| input_root.join(format!("{stem}.{ext}")).exists());
        if has_video {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(artifact = %path.display(), "Deleted orphan");
                report.deleted_orphans += 1;
            }
            Err(e) => {
                error!(artifact = %path.display(), error = %e, "Failed to delete orphan");
                report.errors += 1;
            }
        }
    }
    Ok(())
}

/// Parse (repairing if needed), strip reserved keys, rewrite canonically.
fn reformat_artifacts(artifact_dir: &Path, report: &mut TidyReport) -> std::io::Result<()> {
    if !artifact_dir.exists() {
        return Ok(());
    }

    let trailing_comma = trailing_comma_regex();

    for entry in std::fs::read_dir(artifact_dir)? {
        let entry = entry?;
        let path = entry.path();
        if artifact_stem(&path).is_none() {
            continue;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                error!(artifact = %path.display(), error = %e, "Failed to read artifact");
                report.errors += 1;
                continue;
            }
        };

        let (mut value, was_repaired) = match parse_with_repair(&content, &trailing_comma) {
            Some(parsed) => parsed,
            None => {
                error!(artifact = %path.display(), "Unrepairable JSON, leaving untouched");
                report.errors += 1;
                continue;
            }
        };

        if let Value::Object(map) = &mut value {
            map.remove(USAGE_METADATA_KEY);
            map.remove(FILE_METADATA_KEY);
        }

        // Always rewrite, so formatting is canonical even when nothing was
        // stripped.
        let mut formatted = serde_json::to_string_pretty(&value).unwrap_or(content);
        formatted.push('\n');
        match std::fs::write(&path, formatted) {
            Ok(()) => {
                report.processed += 1;
                if was_repaired {
                    report.repaired += 1;
                }
            }
            Err(e) => {
                error!(artifact = %path.display(), error = %e, "Failed to rewrite artifact");
                report.errors += 1;
            }
        }
    }
    Ok(())
}

/// Parse JSON, falling back to one pass of trailing-comma removal. Returns
/// the parsed value and whether the repair was needed.
fn parse_with_repair(content: &str, trailing_comma: &Regex) -> Option<(Value, bool)> {
    if let Ok(value) = serde_json::from_str(content) {
        return Some((value, false));
    }

    let fixed = trailing_comma.replace_all(content, "$1");
    serde_json::from_str(&fixed).ok().map(|v| (v, true))
}

/// Remove commas immediately preceding a closing brace or bracket.
fn trailing_comma_regex() -> Regex {
    Regex::new(r",(\s*[}\]])").expect("static regex compiles")
}

/// Stem of a `.json` artifact path, or `None` for anything else.
fn artifact_stem(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    if !path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
    {
        return None;
    }
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
