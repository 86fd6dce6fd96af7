//! Local report persistence
//!
//! Writes each processed report under `<directory>/<period>/`:
//!
//! - `summary.json`
//! - `cost-by-workload.json` (omitted when there are no rows)
//! - `cost-by-usage-type.json` (omitted when there are no rows)
//!
//! Every file of a batch is serialized and staged as a temporary file next to its destination
//! before the first one is renamed into place, so a failure never leaves a partially written
//! period behind.

use crate::models::ProcessedReport;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const SUMMARY_FILE: &str = "summary.json";
pub const WORKLOAD_FILE: &str = "cost-by-workload.json";
pub const USAGE_TYPE_FILE: &str = "cost-by-usage-type.json";

pub struct ReportWriter {
    directory: PathBuf,
    json_pretty: bool,
}

impl ReportWriter {
    pub fn new(directory: impl Into<PathBuf>, json_pretty: bool) -> Self {
        Self {
            directory: directory.into(),
            json_pretty,
        }
    }

    fn serialize<T: Serialize>(&self, value: &T, name: &str) -> Result<String> {
        let rendered = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.with_context(|| format!("Failed to serialize {}", name))
    }

    /// Files for one report as `(path, contents)`
    pub fn render(&self, report: &ProcessedReport) -> Result<Vec<(PathBuf, String)>> {
        let dir = self.directory.join(&report.summary.period);
        let summary = self.serialize(&report.summary, SUMMARY_FILE)?;
        let mut files = vec![(dir.join(SUMMARY_FILE), summary)];

        if report.workload_rows.is_empty() {
            debug!(period = %report.summary.period, "No workload rows, skipping {}", WORKLOAD_FILE);
        } else {
            files.push((
                dir.join(WORKLOAD_FILE),
                self.serialize(&report.workload_rows, WORKLOAD_FILE)?,
            ));
        }

        if report.usage_type_rows.is_empty() {
            debug!(
                period = %report.summary.period,
                "No usage type rows, skipping {}", USAGE_TYPE_FILE
            );
        } else {
            files.push((
                dir.join(USAGE_TYPE_FILE),
                self.serialize(&report.usage_type_rows, USAGE_TYPE_FILE)?,
            ));
        }

        Ok(files)
    }

    /// Write all reports, returning the written paths.
    ///
    /// Either every file lands under its final name or none does: directories created for a
    /// failed batch are removed again when they are still empty.
    pub fn write_all(&self, reports: &[ProcessedReport]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for report in reports {
            files.extend(self.render(report)?);
        }

        let mut created_dirs = Vec::new();
        let staged = match stage_all(&files, &mut created_dirs) {
            Ok(staged) => staged,
            Err(e) => {
                remove_empty_dirs(&created_dirs);
                return Err(e);
            }
        };

        let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
        let mut staged = staged.into_iter();
        while let Some((path, temp_file)) = staged.next() {
            if let Err(e) = temp_file.persist(path) {
                // drops the remaining temp files
                drop(staged);
                for written_path in &written {
                    if let Err(remove_err) = fs::remove_file(written_path) {
                        warn!(
                            path = %written_path.display(),
                            error = %remove_err,
                            "Failed to remove report file"
                        );
                    }
                }
                remove_empty_dirs(&created_dirs);
                return Err(e.error)
                    .with_context(|| format!("Failed to write report file: {}", path.display()));
            }
            written.push(path.to_path_buf());
        }

        info!(files = written.len(), directory = %self.directory.display(), "Reports written");
        Ok(written)
    }
}

/// Write every file to a temporary sibling of its destination
fn stage_all<'a>(
    files: &'a [(PathBuf, String)],
    created_dirs: &mut Vec<PathBuf>,
) -> Result<Vec<(&'a Path, NamedTempFile)>> {
    let mut staged = Vec::with_capacity(files.len());
    for (path, contents) in files {
        let parent = path
            .parent()
            .with_context(|| format!("Report path has no parent directory: {}", path.display()))?;
        if !parent.is_dir() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
            created_dirs.push(parent.to_path_buf());
        }

        let mut temp_file = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        temp_file
            .write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write report file: {}", path.display()))?;
        staged.push((path.as_path(), temp_file));
    }
    Ok(staged)
}

fn remove_empty_dirs(dirs: &[PathBuf]) {
    for dir in dirs.iter().rev() {
        // fails harmlessly when the directory is not empty
        let _ = fs::remove_dir(dir);
    }
}
