//! Work selection.
//!
//! Enumerates the videos under the input root that do not yet have a caption
//! artifact. An artifact's presence is the completion marker, so a rerun over
//! unchanged directories selects nothing.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use tracing::warn;

/// Input extensions considered video files (case-insensitive).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];

/// One video awaiting captioning, paired with the artifact path that marks it
/// done. Immutable; consumed once by a worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub video_path: PathBuf,
    pub artifact_path: PathBuf,
}

impl WorkItem {
    /// Item identity used in logs: the video file stem.
    pub fn stem(&self) -> String {
        self.video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Enumerate eligible videos: present under `input_root`, without an artifact
/// under `artifact_dir`. Optionally shuffled, truncated to `max_items`.
///
/// A missing input root yields an empty batch with a warning; the artifact
/// directory is created if absent.
pub fn select_work(
    input_root: &Path,
    artifact_dir: &Path,
    max_items: usize,
    shuffle: bool,
) -> std::io::Result<Vec<WorkItem>> {
    if !input_root.exists() {
        warn!(path = %input_root.display(), "Input directory not found");
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(artifact_dir)?;

    let mut items = Vec::new();
    for entry in std::fs::read_dir(input_root)? {
        let entry = entry?;
        let video_path = entry.path();
        if !is_video_file(&video_path) {
            continue;
        }
        let Some(stem) = video_path.file_stem() else {
            continue;
        };

        let artifact_path = artifact_dir.join(format!("{}.json", stem.to_string_lossy()));
        if artifact_path.exists() {
            continue;
        }

        items.push(WorkItem {
            video_path,
            artifact_path,
        });
    }

    // Directory order is platform-dependent; sort for a stable baseline, then
    // shuffle on top of it when requested.
    items.sort_by(|a, b| a.video_path.cmp(&b.video_path));
    if shuffle {
        items.shuffle(&mut rand::rng());
    }
    items.truncate(max_items);

    Ok(items)
}

/// Whether the path looks like an input video (by extension, regular file).
pub fn is_video_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_selects_only_videos() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let out = dir.path().join("out");
        std::fs::create_dir(&input).unwrap();

        touch(&input.join("a.mp4"));
        touch(&input.join("b.MOV"));
        touch(&input.join("c.avi"));
        touch(&input.join("notes.txt"));
        touch(&input.join("d.mkv"));

        let items = select_work(&input, &out, 100, false).unwrap();
        let stems: Vec<_> = items.iter().map(|i| i.stem()).collect();
        assert_eq!(stems, vec!["a", "b", "c"]);
        assert!(out.is_dir(), "artifact dir is created");
    }

    #[test]
    fn test_excludes_completed_items() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let out = dir.path().join("out");
        std::fs::create_dir(&input).unwrap();
        std::fs::create_dir(&out).unwrap();

        touch(&input.join("a.mp4"));
        touch(&input.join("b.mp4"));
        touch(&out.join("a.json"));

        let items = select_work(&input, &out, 100, false).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].stem(), "b");
    }

    #[test]
    fn test_rerun_selects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let out = dir.path().join("out");
        std::fs::create_dir(&input).unwrap();
        std::fs::create_dir(&out).unwrap();

        for stem in ["a", "b", "c"] {
            touch(&input.join(format!("{stem}.mp4")));
            touch(&out.join(format!("{stem}.json")));
        }

        let items = select_work(&input, &out, 100, true).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_max_items_cap() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let out = dir.path().join("out");
        std::fs::create_dir(&input).unwrap();

        for i in 0..10 {
            touch(&input.join(format!("clip{i}.mp4")));
        }

        let items = select_work(&input, &out, 4, false).unwrap();
        assert_eq!(items.len(), 4);
    }

    #[test]
    fn test_missing_input_root_is_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let items = select_work(
            &dir.path().join("nope"),
            &dir.path().join("out"),
            100,
            false,
        )
        .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_artifact_path_derivation() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let out = dir.path().join("out");
        std::fs::create_dir(&input).unwrap();
        touch(&input.join("storm chase.mp4"));

        let items = select_work(&input, &out, 100, false).unwrap();
        assert_eq!(items[0].artifact_path, out.join("storm chase.json"));
    }
}
