//! End-to-end batch behavior over real directories: selection, dispatch,
//! idempotent reruns, and maintenance, with a scripted client standing in for
//! the remote service.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use vidcap::client::{CaptionClient, CaptionRequest, CaptionResponse, Usage};
use vidcap::dispatch::{Dispatcher, JobSpec};
use vidcap::error::ClientError;
use vidcap::rate::RateLimiter;
use vidcap::selector::select_work;
use vidcap::tidy;

// ---------------------------------------------------------------------------
// Scripted client
// ---------------------------------------------------------------------------

struct ScriptedClient {
    fail_stems: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(fail_stems: &[&str]) -> Self {
        Self {
            fail_stems: fail_stems.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl CaptionClient for ScriptedClient {
    fn describe(
        &self,
        request: &CaptionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CaptionResponse, ClientError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = request
            .video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let fail = self.fail_stems.contains(&stem);

        Box::pin(async move {
            if fail {
                Err(ClientError::RateLimited {
                    retry_after_secs: 30,
                })
            } else {
                Ok(CaptionResponse {
                    text: format!(
                        "```json\n{{\"caption\": \"clip {stem}\", \
                         \"weather\": {{\"winter weather\": true}}, \
                         \"hazardous event\": {{\"present\": false}}}}\n```"
                    ),
                    usage: Usage {
                        input_tokens: 4000,
                        output_tokens: 200,
                    },
                })
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Roots {
    _tmp: tempfile::TempDir,
    input: PathBuf,
    artifacts: PathBuf,
}

fn roots(stems: &[&str]) -> Roots {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");
    let artifacts = tmp.path().join("output/qwen3-vl-flash");
    std::fs::create_dir_all(&input).unwrap();
    for stem in stems {
        std::fs::write(input.join(format!("{stem}.mp4")), b"video bytes").unwrap();
    }
    Roots {
        _tmp: tmp,
        input,
        artifacts,
    }
}

fn dispatcher(client: Arc<dyn CaptionClient>) -> Dispatcher {
    Dispatcher::new(
        client,
        Arc::new(RateLimiter::new(600)),
        JobSpec {
            prompt: "Describe the clip.".into(),
            model: "qwen3-vl-flash".into(),
            frame_sampling_fps: 1.0,
        },
        3,
        Duration::ZERO,
    )
}

fn artifact_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_run_processes_nothing() {
    let roots = roots(&["a", "b", "c"]);
    let client = Arc::new(ScriptedClient::new(&[]));

    let items = select_work(&roots.input, &roots.artifacts, 100, false).unwrap();
    assert_eq!(items.len(), 3);
    let report = dispatcher(client.clone()).run(items).await;
    assert_eq!(report.succeeded, 3);

    // Everything has an artifact now; the next selection is empty and the
    // artifacts are untouched by another dispatch.
    let second = select_work(&roots.input, &roots.artifacts, 100, false).unwrap();
    assert!(second.is_empty());

    let report = dispatcher(client.clone()).run(second).await;
    assert_eq!(report.attempted, 0);
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        artifact_names(&roots.artifacts),
        vec!["a.json", "b.json", "c.json"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_items_stay_eligible_and_recover() {
    let roots = roots(&["v1", "v2", "v3", "v4", "v5"]);

    // First run: v3 is rejected by the service.
    let flaky = Arc::new(ScriptedClient::new(&["v3"]));
    let items = select_work(&roots.input, &roots.artifacts, 100, false).unwrap();
    let report = dispatcher(flaky).run(items).await;
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 1);
    assert!(!roots.artifacts.join("v3.json").exists());

    // Second run selects exactly the failed item and completes it.
    let healthy = Arc::new(ScriptedClient::new(&[]));
    let retry = select_work(&roots.input, &roots.artifacts, 100, false).unwrap();
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].stem(), "v3");

    let report = dispatcher(healthy.clone()).run(retry).await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(artifact_names(&roots.artifacts).len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn artifacts_survive_tidy_until_video_is_removed() {
    let roots = roots(&["keep", "drop"]);
    let client = Arc::new(ScriptedClient::new(&[]));

    let items = select_work(&roots.input, &roots.artifacts, 100, false).unwrap();
    dispatcher(client).run(items).await;

    // tidy strips the metadata blocks but keeps both artifacts.
    let report = tidy::run(&roots.artifacts, &roots.input).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.deleted_orphans, 0);

    let kept: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(roots.artifacts.join("keep.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(kept["caption"], "clip keep");
    assert!(kept.get("usage_metadata").is_none());
    assert!(kept.get("file_metadata").is_none());

    // Once the video disappears, its artifact is the only one deleted.
    std::fs::remove_file(roots.input.join("drop.mp4")).unwrap();
    let report = tidy::run(&roots.artifacts, &roots.input).unwrap();
    assert_eq!(report.deleted_orphans, 1);
    assert_eq!(artifact_names(&roots.artifacts), vec!["keep.json"]);

    // The freed item becomes eligible again.
    std::fs::write(roots.input.join("drop.mp4"), b"new cut").unwrap();
    let again = select_work(&roots.input, &roots.artifacts, 100, false).unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].stem(), "drop");
}
