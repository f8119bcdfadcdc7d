/*!
 * Progress and review reporting.
 *
 * The pipeline never talks to a UI or a job store directly. It hands
 * progress reports to a `ProgressSink` and translations needing a human
 * decision to a `ReviewSink`.
 */

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::quality::ReviewRecord;

/// Progress after a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressReport {
    /// Entries handled so far (translated, failed or sent to review)
    pub processed: usize,
    /// Entries pending at the start of the run
    pub total: usize,
    /// Entries that failed in the batch just reported
    pub recent_failures: usize,
}

impl ProgressReport {
    pub fn new(processed: usize, total: usize, recent_failures: usize) -> Self {
        Self {
            processed,
            total,
            recent_failures,
        }
    }

    /// Completion in percent (100 for an empty run)
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f32 * 100.0 / self.total as f32
        }
    }
}

/// Receives a report after every batch
pub trait ProgressSink: Send + Sync {
    fn report(&self, report: ProgressReport);

    /// Called once when the run ends
    fn finish(&self) {}
}

/// Receives translations that need human review
pub trait ReviewSink: Send + Sync {
    fn submit(&self, record: ReviewRecord) -> Result<()>;
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _report: ProgressReport) {}
}

/// Logs progress at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn report(&self, report: ProgressReport) {
        if report.recent_failures > 0 {
            warn!(
                "Progress: {}/{} ({:.0}%), {} failed in last batch",
                report.processed,
                report.total,
                report.percent(),
                report.recent_failures
            );
        } else {
            info!("Progress: {}/{} ({:.0}%)", report.processed, report.total, report.percent());
        }
    }
}

/// Terminal progress bar
#[derive(Debug)]
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} entries ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("█▓▒░"));
        Self { bar }
    }
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBarSink {
    fn report(&self, report: ProgressReport) {
        self.bar.set_length(report.total as u64);
        self.bar.set_position(report.processed as u64);
        if report.recent_failures > 0 {
            self.bar.set_message(format!("{} failed", report.recent_failures));
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Forwards progress over a channel
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<ProgressReport>,
}

impl ChannelProgressSink {
    /// Create the sink and the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressReport>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, report: ProgressReport) {
        // A dropped receiver only means nobody is listening
        let _ = self.sender.send(report);
    }
}

/// Appends review records to a JSON lines file
#[derive(Debug)]
pub struct JsonlReviewSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlReviewSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open review output: {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReviewSink for JsonlReviewSink {
    fn submit(&self, record: ReviewRecord) -> Result<()> {
        let mut line = serde_json::to_string(&record).context("Failed to encode review record")?;
        line.push('\n');

        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to write review record to {}", self.path.display()))
    }
}

/// Keeps review records in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryReviewSink {
    records: Arc<Mutex<Vec<ReviewRecord>>>,
}

impl MemoryReviewSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far
    pub fn records(&self) -> Vec<ReviewRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl ReviewSink for MemoryReviewSink {
    fn submit(&self, record: ReviewRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }
}

/// Logs review records as warnings
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReviewSink;

impl ReviewSink for LogReviewSink {
    fn submit(&self, record: ReviewRecord) -> Result<()> {
        warn!(
            "Needs review [{:.2}] {:?} -> {:?}: {}",
            record.score,
            record.key,
            record.proposed,
            record.failing_checks.join("; ")
        );
        Ok(())
    }
}
