//! Caption artifact assembly and persistence.
//!
//! One JSON file per video: the normalized caption fields merged with two
//! reserved top-level blocks, `usage_metadata` and `file_metadata`. The file
//! is written once via a sibling temp file and rename, so readers never see a
//! partial artifact and its presence can safely serve as the completion
//! marker.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ItemError;

/// Reserved key for token usage and cost.
pub const USAGE_METADATA_KEY: &str = "usage_metadata";
/// Reserved key for input-file provenance.
pub const FILE_METADATA_KEY: &str = "file_metadata";

/// Token counts and estimated cost for the exchange that produced a caption.
#[derive(Debug, Clone, Serialize)]
pub struct UsageMetadata {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
}

/// Provenance of the captioned input file.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub filename: String,
    pub file_size_mb: f64,
    pub analysis_timestamp: String,
    pub model_used: String,
    pub frame_sampling_fps: f64,
    pub sampling_method: String,
}

impl FileMetadata {
    /// Gather provenance for a video about to be captioned.
    pub fn for_video(video_path: &Path, model: &str, fps: f64) -> std::io::Result<Self> {
        let size_bytes = std::fs::metadata(video_path)?.len();
        let file_size_mb = (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;

        Ok(Self {
            filename: video_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_size_mb,
            analysis_timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            model_used: model.to_string(),
            frame_sampling_fps: fps,
            sampling_method: "api_native_sampling".to_string(),
        })
    }
}

/// Merge caption fields with the reserved metadata blocks and persist the
/// artifact. Writes a sibling `.tmp` file and renames it into place.
pub fn write_artifact(
    path: &Path,
    mut caption: Map<String, Value>,
    usage: &UsageMetadata,
    file: &FileMetadata,
) -> Result<(), ItemError> {
    caption.insert(USAGE_METADATA_KEY.to_string(), serde_json::to_value(usage)?);
    caption.insert(FILE_METADATA_KEY.to_string(), serde_json::to_value(file)?);

    let mut content = serde_json::to_string_pretty(&Value::Object(caption))?;
    content.push('\n');

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_usage() -> UsageMetadata {
        UsageMetadata {
            prompt_tokens: 5400,
            completion_tokens: 120,
            total_tokens: 5520,
            estimated_cost_usd: 0.000318,
        }
    }

    fn sample_file_meta() -> FileMetadata {
        FileMetadata {
            filename: "clip.mp4".into(),
            file_size_mb: 12.34,
            analysis_timestamp: "2026-02-01 10:30:00".into(),
            model_used: "qwen3-vl-flash".into(),
            frame_sampling_fps: 1.0,
            sampling_method: "api_native_sampling".into(),
        }
    }

    #[test]
    fn test_write_merges_reserved_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.json");

        let mut caption = Map::new();
        caption.insert("caption".into(), json!("a snowplow on a highway"));

        write_artifact(&path, caption, &sample_usage(), &sample_file_meta()).unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["caption"], "a snowplow on a highway");
        assert_eq!(written[USAGE_METADATA_KEY]["prompt_tokens"], 5400);
        assert_eq!(written[USAGE_METADATA_KEY]["estimated_cost_usd"], 0.000318);
        assert_eq!(written[FILE_METADATA_KEY]["filename"], "clip.mp4");
        assert_eq!(
            written[FILE_METADATA_KEY]["sampling_method"],
            "api_native_sampling"
        );
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.json");

        write_artifact(&path, Map::new(), &sample_usage(), &sample_file_meta()).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("clip.json.tmp").exists());
    }

    #[test]
    fn test_file_metadata_for_video() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, vec![0u8; 1024 * 1024]).unwrap();

        let meta = FileMetadata::for_video(&video, "qwen3-vl-flash", 2.0).unwrap();
        assert_eq!(meta.filename, "clip.mp4");
        assert!((meta.file_size_mb - 1.0).abs() < 0.01);
        assert_eq!(meta.model_used, "qwen3-vl-flash");
        assert_eq!(meta.frame_sampling_fps, 2.0);
    }

    #[test]
    fn test_missing_video_is_an_error() {
        let err = FileMetadata::for_video(Path::new("/nonexistent/clip.mp4"), "m", 1.0);
        assert!(err.is_err());
    }
}
