//! Ingest job records and the handle shared between a worker and its caller.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// `pending → running → complete | failed`; a pending job may also fail.
    fn can_move_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed)
                | (Self::Running, Self::Complete | Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// The file was skipped: unreadable, too large, or not parseable.
    FileParseError,
    /// The file parsed, but some constructs were skipped.
    UnsupportedConstruct,
    UnsupportedLanguage,
}

impl JobErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileParseError => "file_parse_error",
            Self::UnsupportedConstruct => "unsupported_construct",
            Self::UnsupportedLanguage => "unsupported_language",
        }
    }
}

/// One skipped or partially processed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorEntry {
    pub path: String,
    pub kind: JobErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub repository: String,
    pub status: JobStatus,
    pub errors: Vec<JobErrorEntry>,
    pub files_total: usize,
    pub files_parsed: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure: Option<String>,
}

impl IngestJob {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            repository: repository.into(),
            status: JobStatus::Pending,
            errors: Vec::new(),
            files_total: 0,
            files_parsed: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            failure: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if !self.status.can_move_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Complete)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        self.failure = Some(message.into());
        Ok(())
    }

    pub fn record_error(&mut self, path: impl Into<String>, kind: JobErrorKind, message: impl Into<String>) {
        self.errors.push(JobErrorEntry {
            path: path.into(),
            kind,
            message: message.into(),
        });
    }

    /// Paths of files that contributed nothing to the graph.
    pub fn skipped_files(&self) -> impl Iterator<Item = &str> {
        self.errors
            .iter()
            .filter(|e| e.kind != JobErrorKind::UnsupportedConstruct)
            .map(|e| e.path.as_str())
    }
}

/// Shared view of one job: the record plus its cancel flag.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job: Arc<Mutex<IngestJob>>,
    cancel: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            job: Arc::new(Mutex::new(IngestJob::new(repository))),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.lock().id
    }

    pub fn repository(&self) -> String {
        self.lock().repository.clone()
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> IngestJob {
        self.lock().clone()
    }

    /// Ask the worker to stop; parses in flight abort at their next progress check.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run `f` against the job record.
    pub fn update<T>(&self, f: impl FnOnce(&mut IngestJob) -> T) -> T {
        f(&mut self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IngestJob> {
        self.job.lock().expect("job mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_lifecycle() {
        let mut job = IngestJob::new("demo");
        assert_eq!(job.status, JobStatus::Pending);
        job.start().unwrap();
        assert!(job.started_at.is_some());
        job.complete().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.finished_at.is_some());
        assert!(job.status.is_terminal());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut job = IngestJob::new("demo");
        assert_eq!(
            job.complete(),
            Err(JobError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Complete,
            })
        );
        job.fail("boom").unwrap();
        assert_eq!(job.failure.as_deref(), Some("boom"));
        assert!(job.start().is_err());
        assert!(job.fail("again").is_err());
        assert_eq!(job.failure.as_deref(), Some("boom"));
    }

    #[test]
    fn skipped_files_exclude_partial_ones() {
        let mut job = IngestJob::new("demo");
        job.record_error("a.py", JobErrorKind::FileParseError, "timed out");
        job.record_error("b.js", JobErrorKind::UnsupportedConstruct, "dynamic callee");
        job.record_error("c.rb", JobErrorKind::UnsupportedLanguage, "no adapter");
        assert_eq!(job.skipped_files().collect::<Vec<_>>(), vec!["a.py", "c.rb"]);
    }

    #[test]
    fn handle_shares_state_between_clones() {
        let handle = JobHandle::new("demo");
        let worker = handle.clone();
        worker.update(IngestJob::start).unwrap();
        assert_eq!(handle.status(), JobStatus::Running);

        assert!(!worker.is_cancelled());
        handle.cancel();
        assert!(worker.is_cancelled());
        assert!(worker.cancel_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Complete).unwrap(), "\"complete\"");
        assert_eq!(
            serde_json::to_string(&JobErrorKind::FileParseError).unwrap(),
            "\"file_parse_error\""
        );
    }
}
