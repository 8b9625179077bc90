//! Batch layer: database reading and across-video parallel dispatch.
//!
//! Parallelism only ever exists between videos. One video's extraction
//! is strictly sequential (frame order is a correctness requirement),
//! and cache entries are keyed per (model, feature, video), so workers
//! on different videos never contend. Callers must not schedule the
//! same (model, video) pair twice concurrently.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{error, info};

use crate::errors::{PixelError, Result};

/// One row of a prediction database CSV.
#[derive(Debug, Clone)]
pub struct DatabaseEntry {
    pub video: PathBuf,
    /// Source (reference) video, present for full-reference databases.
    pub src_video: Option<PathBuf>,
}

/// Default worker count: half the logical CPUs.
pub fn default_cpu_count() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Read a database CSV with a header line. The `video` column is
/// required; `src_video` is required when `full_ref` is set.
pub fn read_database(path: &Path, full_ref: bool) -> Result<Vec<DatabaseEntry>> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header = lines.next().ok_or_else(|| {
        PixelError::Configuration(format!("database {} is empty", path.display()))
    })?;
    let columns: Vec<&str> = header.split(',').map(|c| c.trim()).collect();

    let video_idx = columns.iter().position(|c| *c == "video").ok_or_else(|| {
        PixelError::Configuration(format!(
            "database {} has no 'video' column",
            path.display()
        ))
    })?;
    let src_idx = columns.iter().position(|c| *c == "src_video");
    if full_ref && src_idx.is_none() {
        return Err(PixelError::Configuration(format!(
            "database {} has no 'src_video' column required for full-reference models",
            path.display()
        )));
    }

    let mut entries = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();
        let video = fields.get(video_idx).filter(|v| !v.is_empty()).ok_or_else(|| {
            PixelError::Configuration(format!(
                "database {} line {}: missing video path",
                path.display(),
                line_no + 2
            ))
        })?;
        let src_video = src_idx
            .and_then(|idx| fields.get(idx))
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        entries.push(DatabaseEntry {
            video: PathBuf::from(video),
            src_video,
        });
    }
    Ok(entries)
}

/// Outcome tally of one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

/// Run `work` for every entry on a pool of `cpu_count` workers.
///
/// Per-video failures are logged and tallied; they never abort the
/// batch. Results keep the input order, with `None` for failed videos.
pub fn run_batch<T, F>(
    entries: &[DatabaseEntry],
    cpu_count: usize,
    work: F,
) -> Result<(Vec<Option<T>>, BatchSummary)>
where
    T: Send,
    F: Fn(&DatabaseEntry) -> Result<T> + Sync,
{
    info!(videos = entries.len(), workers = cpu_count, "batch run");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cpu_count.max(1))
        .build()
        .map_err(|e| PixelError::Configuration(format!("worker pool setup failed: {e}")))?;

    let results: Vec<std::result::Result<T, String>> = pool.install(|| {
        entries
            .par_iter()
            .map(|entry| work(entry).map_err(|e| e.to_string()))
            .collect()
    });

    let mut summary = BatchSummary::default();
    let mut out = Vec::with_capacity(results.len());
    for (entry, result) in entries.iter().zip(results) {
        summary.total += 1;
        match result {
            Ok(value) => {
                summary.succeeded += 1;
                out.push(Some(value));
            }
            Err(message) => {
                error!(video = %entry.video.display(), error = %message, "video failed");
                summary.failed += 1;
                summary.errors.push((entry.video.clone(), message));
                out.push(None);
            }
        }
    }
    Ok((out, summary))
}

/// Report file name for one database entry: normalized parent directory
/// plus video stem, as the original batch tooling produced.
pub fn report_file_name(video: &Path) -> String {
    let dir = video
        .parent()
        .map(|p| {
            p.to_string_lossy()
                .trim_start_matches(['.', '/'])
                .replace(std::path::MAIN_SEPARATOR, "_")
        })
        .unwrap_or_default();
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    if dir.is_empty() {
        format!("{stem}.json")
    } else {
        format!("{dir}_{stem}.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_database_no_ref() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db.csv");
        std::fs::write(&db, "video,mos\n/v/a.mp4,3.2\n/v/b.mp4,4.0\n").unwrap();

        let entries = read_database(&db, false).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].video, PathBuf::from("/v/a.mp4"));
        assert!(entries[0].src_video.is_none());
    }

    #[test]
    fn test_read_database_full_ref() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db.csv");
        std::fs::write(&db, "video,src_video\n/v/a.mp4,/v/src_a.mp4\n").unwrap();

        let entries = read_database(&db, true).unwrap();
        assert_eq!(entries[0].src_video, Some(PathBuf::from("/v/src_a.mp4")));
    }

    #[test]
    fn test_read_database_missing_src_column_for_full_ref() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db.csv");
        std::fs::write(&db, "video\n/v/a.mp4\n").unwrap();
        assert!(read_database(&db, true).is_err());
        assert!(read_database(&db, false).is_ok());
    }

    #[test]
    fn test_run_batch_isolates_failures() {
        let entries: Vec<DatabaseEntry> = ["a", "fail", "c"]
            .iter()
            .map(|name| DatabaseEntry {
                video: PathBuf::from(format!("/v/{name}.mp4")),
                src_video: None,
            })
            .collect();

        let (results, summary) = run_batch(&entries, 2, |entry| {
            if entry.video.to_string_lossy().contains("fail") {
                Err(PixelError::Configuration("boom".to_string()))
            } else {
                Ok(entry.video.clone())
            }
        })
        .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert!(results[2].is_some());
        assert_eq!(summary.errors[0].0, PathBuf::from("/v/fail.mp4"));
    }

    #[test]
    fn test_report_file_name() {
        assert_eq!(
            report_file_name(Path::new("data/segments/clip_1.mp4")),
            "data_segments_clip_1.json"
        );
        assert_eq!(report_file_name(Path::new("clip.mp4")), "clip.json");
    }
}
