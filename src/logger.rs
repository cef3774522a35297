//! Append-only attempt audit log.
//!
//! A single background task owns the file; callers only push formatted lines
//! onto an unbounded channel, so a slow disk never delays a burst request.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::types::{AttemptDetail, AttemptRecord};

/// Bodies and error messages longer than this are cut before logging.
pub const MAX_BODY_CHARS: usize = 500;

const TRUNCATION_SUFFIX: &str = "...(truncated)";

/// Log file for a run with the given claimant offset.
pub fn log_path(dir: &Path, offset: i64) -> PathBuf {
    dir.join(format!("claim_log_{offset}.txt"))
}

/// Format one record as a tab-separated line (newline included).
pub fn format_line(record: &AttemptRecord) -> String {
    let status = record.status.map_or(-1, i32::from);
    let mut line = format!(
        "{}\thour={}\twallet={}\tstatus={}\t",
        record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        record.hour,
        single_line(&record.claimant),
        status,
    );
    match &record.detail {
        AttemptDetail::Error(msg) => {
            line.push_str(&format!(
                "error={} (attempt {})",
                truncate(msg),
                record.attempt
            ));
        }
        AttemptDetail::Body(body) => {
            line.push_str("body=");
            line.push_str(&truncate(body));
        }
    }
    line.push('\n');
    line
}

// Fields must not carry the TSV separators.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n', '\t'], " ")
}

fn truncate(text: &str) -> String {
    let flat = single_line(text);
    match flat.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_SUFFIX}", &flat[..cut]),
        None => flat,
    }
}

/// Handle to the single-writer log task.
pub struct AttemptLogger {
    tx: mpsc::UnboundedSender<String>,
    writer: JoinHandle<Result<u64>>,
    path: PathBuf,
}

impl AttemptLogger {
    /// Open (or create) `path` for appending and start the writer task.
    pub async fn spawn(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let shown = path.display().to_string();
        let writer = tokio::spawn(async move {
            let mut written = 0u64;
            while let Some(line) = rx.recv().await {
                // One write per line keeps records whole under append mode.
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    warn!("Failed to append to {shown}: {e}");
                    continue;
                }
                written += 1;
            }
            file.flush()
                .await
                .with_context(|| format!("failed to flush {shown}"))?;
            debug!("Attempt log {shown} closed after {written} line(s)");
            Ok(written)
        });

        Ok(Self {
            tx,
            writer,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a record for writing. Never waits on the file system.
    pub fn record(&self, record: &AttemptRecord) {
        if self.tx.send(format_line(record)).is_err() {
            warn!(
                "Attempt log writer is gone; dropped record for hour {} ({})",
                record.hour, record.claimant
            );
        }
    }

    /// Flush every queued record and stop the writer. Returns lines written.
    pub async fn close(self) -> Result<u64> {
        drop(self.tx);
        self.writer.await.context("attempt log writer panicked")?
    }
}
