//! Caption corpus diagnostics.
//!
//! Read-only pass over caption artifacts tabulating how often the
//! winter-weather and hazardous-event flags co-occur. Consumes only the
//! artifact format; independent of the dispatcher.

use std::path::Path;

use serde_json::Value;
use tracing::warn;

/// Frequency table over the (winter weather, hazardous event) boolean pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComboReport {
    /// Counts indexed by `[winter_weather][hazardous_present]`.
    pub counts: [[usize; 2]; 2],
    /// Artifacts scanned.
    pub scanned: usize,
    /// Artifacts where both flags were present and boolean.
    pub counted: usize,
    /// Artifacts that could not be read or parsed.
    pub errors: usize,
}

impl ComboReport {
    pub fn count(&self, winter: bool, hazardous: bool) -> usize {
        self.counts[winter as usize][hazardous as usize]
    }

    /// Render the aligned frequency table, True-first.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "-".repeat(55);

        out.push_str(&format!("{rule}\n"));
        out.push_str(&format!(
            "| {:<15} | {:<15} | {:<10} |\n",
            "Winter Weather", "Hazardous Event", "Count"
        ));
        out.push_str(&format!("{rule}\n"));
        for winter in [true, false] {
            for hazardous in [true, false] {
                out.push_str(&format!(
                    "| {:<15} | {:<15} | {:<10} |\n",
                    winter.to_string(),
                    hazardous.to_string(),
                    self.count(winter, hazardous)
                ));
            }
        }
        out.push_str(&format!("{rule}\n"));
        out.push_str(&format!("\nTotal files counted: {}\n", self.counted));
        if self.errors > 0 {
            out.push_str(&format!("Files with errors: {}\n", self.errors));
        }
        out
    }
}

/// Scan every `.json` artifact under `dir` and tabulate the flag pairs.
/// Artifacts missing either flag are scanned but not counted.
pub fn collect(dir: &Path) -> std::io::Result<ComboReport> {
    let mut report = ComboReport::default();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file()
            || path
                .extension()
                .and_then(|e| e.to_str())
                .is_none_or(|e| !e.eq_ignore_ascii_case("json"))
        {
            continue;
        }

        report.scanned += 1;
        let parsed: Result<Value, _> = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|c| serde_json::from_str(&c).map_err(|e| e.to_string()));

        let data = match parsed {
            Ok(v) => v,
            Err(e) => {
                warn!(artifact = %path.display(), error = %e, "Skipping unreadable artifact");
                report.errors += 1;
                continue;
            }
        };

        let winter = data
            .get("weather")
            .and_then(|w| w.get("winter weather"))
            .and_then(Value::as_bool);
        let hazardous = data
            .get("hazardous event")
            .and_then(|h| h.get("present"))
            .and_then(Value::as_bool);

        if let (Some(winter), Some(hazardous)) = (winter, hazardous) {
            report.counts[winter as usize][hazardous as usize] += 1;
            report.counted += 1;
        }
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
