use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};

fn fmt_ts(ms: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now);
    dt.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

/// Default snapshot file.
/// e.g. "captures/snapshot_20260218T093000000Z.png"
pub fn snapshot_path(dir: &Path, ts_ms: i64) -> PathBuf {
    dir.join(format!("snapshot_{}.png", fmt_ts(ts_ms)))
}

/// Default recording file.
/// e.g. "captures/recording_20260218T093000000Z.avi"
pub fn recording_path(dir: &Path, ts_ms: i64) -> PathBuf {
    dir.join(format!("recording_{}.avi", fmt_ts(ts_ms)))
}
