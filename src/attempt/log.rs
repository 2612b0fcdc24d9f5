//! Durable append-only attempt log (JSON lines).
//!
//! Writers sharing a log path coordinate through a sibling `<log>.lock` file
//! created with `create_new`. A writer that cannot take the lock within the
//! configured wait still appends its line, unlocked, in a single write, so a
//! record is never dropped under contention.
//!
//! The lock file records its holder's pid and acquisition time. A lock older
//! than the staleness bound is treated as left behind by a crashed writer and
//! is removed before retrying.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::types::AttemptRecord;
use crate::error::PersistenceError;
use crate::metrics::MetricsCollector;

/// Default wait for the log lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between lock attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A lock is reclaimable once it is this many lock timeouts old.
pub const STALE_LOCK_FACTOR: u32 = 6;

/// Contents of the lock file.
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Holds the log lock; removes the lock file on drop.
struct LogLock {
    path: PathBuf,
}

impl Drop for LogLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Where and how a record was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub path: PathBuf,
    /// True when the lock wait timed out and the line was written unlocked.
    pub fallback: bool,
    pub bytes: usize,
}

/// Per-domain aggregates over the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainSummary {
    pub attempts: usize,
    pub successes: usize,
    pub mean_reward: f64,
}

/// Aggregates over every record in the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    pub total: usize,
    pub successes: usize,
    pub by_domain: BTreeMap<String, DomainSummary>,
}

/// Append-only JSONL attempt log.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    poll_interval: Duration,
    stale_lock_after: Option<Duration>,
    metrics: MetricsCollector,
}

impl AttemptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.as_os_str().to_os_string();
        lock_name.push(".lock");
        Self {
            lock_path: PathBuf::from(lock_name),
            path,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_lock_after: None,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Age past which an existing lock is reclaimed. Defaults to
    /// `STALE_LOCK_FACTOR` times the lock timeout.
    pub fn with_stale_lock_after(mut self, age: Duration) -> Self {
        self.stale_lock_after = Some(age);
        self
    }

    pub fn stale_lock_after(&self) -> Duration {
        self.stale_lock_after
            .unwrap_or(self.lock_timeout * STALE_LOCK_FACTOR)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Appends one record as a single line.
    ///
    /// Takes the lock when it can; on lock timeout writes without it and
    /// reports `fallback: true`.
    pub async fn append(&self, record: &AttemptRecord) -> Result<AppendReceipt, PersistenceError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let fallback = match self.acquire_lock().await {
            Ok(_guard) => {
                self.write_line(&line).await?;
                false
            }
            Err(PersistenceError::LockTimeout { path, waited_ms }) => {
                tracing::warn!(
                    lock = %path,
                    waited_ms,
                    attempt_id = %record.attempt_id,
                    "Attempt log lock timed out; appending without the lock"
                );
                self.metrics.record_log_fallback();
                self.write_line(&line).await?;
                true
            }
            Err(e) => return Err(e),
        };

        Ok(AppendReceipt {
            path: self.path.clone(),
            fallback,
            bytes: line.len(),
        })
    }

    async fn acquire_lock(&self) -> Result<LogLock, PersistenceError> {
        let started = Instant::now();
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
                .await
            {
                Ok(mut file) => {
                    let guard = LogLock {
                        path: self.lock_path.clone(),
                    };
                    let info = LockInfo {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    let mut contents = serde_json::to_string(&info)?;
                    contents.push('\n');
                    // The lock is held either way; an unreadable lock ages out by mtime.
                    let written: std::io::Result<()> = async {
                        file.write_all(contents.as_bytes()).await?;
                        file.flush().await
                    }
                    .await;
                    if let Err(e) = written {
                        tracing::warn!(
                            lock = %self.lock_path.display(),
                            error = %e,
                            "Failed to record lock holder"
                        );
                    }
                    return Ok(guard);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.reclaim_stale_lock().await? {
                        continue;
                    }
                    if started.elapsed() >= self.lock_timeout {
                        return Err(PersistenceError::LockTimeout {
                            path: self.lock_path.display().to_string(),
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Age of the current lock, from its recorded `acquired_at`, else from the
    /// file's modification time. `None` when the lock has gone.
    async fn lock_age(&self) -> Result<Option<Duration>, PersistenceError> {
        let contents = match tokio::fs::read_to_string(&self.lock_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if let Ok(info) = serde_json::from_str::<LockInfo>(contents.trim()) {
            let age = (Utc::now() - info.acquired_at).to_std().unwrap_or_default();
            return Ok(Some(age));
        }

        let metadata = match tokio::fs::metadata(&self.lock_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        Ok(Some(age))
    }

    /// Removes the lock if it is older than the staleness bound. Returns true
    /// when the caller should retry immediately.
    async fn reclaim_stale_lock(&self) -> Result<bool, PersistenceError> {
        let Some(age) = self.lock_age().await? else {
            return Ok(true);
        };
        let limit = self.stale_lock_after();
        if age < limit {
            return Ok(false);
        }

        tracing::warn!(
            lock = %self.lock_path.display(),
            age_ms = age.as_millis() as u64,
            limit_ms = limit.as_millis() as u64,
            "Reclaiming stale attempt log lock"
        );
        match tokio::fs::remove_file(&self.lock_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), PersistenceError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads every record. A missing log is empty; malformed lines are skipped
    /// with a warning.
    pub async fn read_all(&self) -> Result<Vec<AttemptRecord>, PersistenceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AttemptRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = number + 1,
                    error = %e,
                    "Skipping malformed attempt log line"
                ),
            }
        }
        Ok(records)
    }

    /// Per-domain counts and mean reward.
    pub async fn summarize(&self) -> Result<LogSummary, PersistenceError> {
        let records = self.read_all().await?;
        let mut summary = LogSummary::default();
        let mut reward_sums: BTreeMap<String, f64> = BTreeMap::new();

        for record in &records {
            summary.total += 1;
            let entry = summary.by_domain.entry(record.domain.clone()).or_default();
            entry.attempts += 1;
            if record.success {
                summary.successes += 1;
                entry.successes += 1;
            }
            *reward_sums.entry(record.domain.clone()).or_default() += record.total_reward;
        }

        for (domain, entry) in summary.by_domain.iter_mut() {
            let sum = reward_sums.get(domain).copied().unwrap_or(0.0);
            entry.mean_reward = sum / entry.attempts as f64;
        }

        Ok(summary)
    }
}
