use crate::db;
use crate::paths::AppPaths;
use crate::source::url_start_time;
use crate::timecode::TimeRange;
use crate::ytdlp::{DownloadRequest, Downloader};
use crate::{EngineError, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// `meta` key holding the serialized job list.
pub const QUEUE_META_KEY: &str = "swimtrack.queue";
const INTERRUPTED_MESSAGE: &str = "interrupted by app shutdown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// The only legal moves:
    /// pending -start-> running, done|error -retry-> running,
    /// running -succeed-> done, running -fail-> error.
    pub fn apply(self, transition: Transition) -> Option<JobStatus> {
        match (self, transition) {
            (JobStatus::Pending, Transition::Start) => Some(JobStatus::Running),
            (JobStatus::Done | JobStatus::Error, Transition::Retry) => Some(JobStatus::Running),
            (JobStatus::Running, Transition::Succeed) => Some(JobStatus::Done),
            (JobStatus::Running, Transition::Fail) => Some(JobStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Retry,
    Succeed,
    Fail,
}

impl Transition {
    fn target(self) -> JobStatus {
        match self {
            Transition::Start | Transition::Retry => JobStatus::Running,
            Transition::Succeed => JobStatus::Done,
            Transition::Fail => JobStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub url: String,
    pub title: String,
    pub output_name: Option<String>,
    /// Start and end travel together; see [`TimeRange`].
    pub range: Option<TimeRange>,
    pub status: JobStatus,
    pub message: String,
    /// Tool output from the latest run.
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub created_at_ms: i64,
}

impl Job {
    fn transition(&mut self, transition: Transition, message: impl Into<String>) -> Result<()> {
        let next = self
            .status
            .apply(transition)
            .ok_or_else(|| EngineError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.as_str(),
                to: transition.target().as_str(),
            })?;
        self.status = next;
        self.message = message.into();
        Ok(())
    }

    pub fn download_request(&self, output_dir: &Path) -> DownloadRequest {
        DownloadRequest {
            url: self.url.clone(),
            output_dir: output_dir.to_path_buf(),
            range: self.range.clone(),
            output_name: self.output_name.clone(),
        }
    }
}

/// Raw form input for a new job.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub url: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub output_name: Option<String>,
    pub title: Option<String>,
}

impl NewJob {
    /// Checks the link and time range without consuming the form. Callers that
    /// look anything up with external tools run this first.
    pub fn validate(&self) -> Result<()> {
        self.checked_url_and_range().map(|_| ())
    }

    fn checked_url_and_range(&self) -> Result<(String, Option<TimeRange>)> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(EngineError::validation("a video link is required"));
        }
        let url_start = url_start_time(&url);
        let range = TimeRange::resolve(
            self.start_time.as_deref(),
            self.end_time.as_deref(),
            url_start.as_deref(),
        )?;
        Ok((url, range))
    }

    /// Validates the form; nothing reaches a subprocess if this fails.
    pub fn into_job(self) -> Result<Job> {
        let (url, range) = self.checked_url_and_range()?;
        let output_name = self
            .output_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Job {
            id: Uuid::new_v4().to_string(),
            url,
            title: self.title.map(|t| t.trim().to_string()).unwrap_or_default(),
            output_name,
            range,
            status: JobStatus::Pending,
            message: String::new(),
            log: String::new(),
            created_at_ms: now_ms(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Reads the stored job list. Anything that is not a well-formed list of jobs
/// is discarded and an empty queue returned.
pub fn load_jobs(conn: &Connection) -> Result<Vec<Job>> {
    let Some(raw) = db::get_meta(conn, QUEUE_META_KEY)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<Job>>(&raw) {
        Ok(jobs) => Ok(jobs),
        Err(err) => {
            tracing::warn!(error = %err, "discarding unreadable job queue");
            Ok(Vec::new())
        }
    }
}

pub fn save_jobs(conn: &Connection, jobs: &[Job]) -> Result<()> {
    let json = serde_json::to_string(jobs)?;
    db::set_meta(conn, QUEUE_META_KEY, &json)
}

type Observer = Box<dyn FnMut(&[Job])>;

/// Owns the job list. Every mutation goes through `update`, which persists
/// the list and then notifies the observer.
pub struct QueueController<D: Downloader> {
    conn: Connection,
    downloader: D,
    jobs: Vec<Job>,
    observer: Option<Observer>,
}

impl<D: Downloader> QueueController<D> {
    pub fn open(paths: &AppPaths, downloader: D) -> Result<Self> {
        let conn = db::ensure_schema(paths)?;
        let jobs = load_jobs(&conn)?;
        let mut controller = Self {
            conn,
            downloader,
            jobs,
            observer: None,
        };
        controller.recover_interrupted()?;
        Ok(controller)
    }

    /// Jobs left `running` by a previous process can never finish.
    fn recover_interrupted(&mut self) -> Result<()> {
        if !self.jobs.iter().any(|j| j.status == JobStatus::Running) {
            return Ok(());
        }
        self.update(|jobs| {
            for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Running) {
                tracing::warn!(job_id = %job.id, "marking interrupted job as failed");
                job.transition(Transition::Fail, INTERRUPTED_MESSAGE)?;
            }
            Ok(())
        })
    }

    pub fn set_observer(&mut self, observer: impl FnMut(&[Job]) + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    fn update<R>(&mut self, mutate: impl FnOnce(&mut Vec<Job>) -> Result<R>) -> Result<R> {
        let out = mutate(&mut self.jobs)?;
        if let Err(err) = save_jobs(&self.conn, &self.jobs) {
            tracing::warn!(error = %err, "failed to persist job queue");
        }
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.jobs);
        }
        Ok(out)
    }

    pub fn add(&mut self, new_job: NewJob) -> Result<Job> {
        let job = new_job.into_job()?;
        tracing::info!(job_id = %job.id, url = %job.url, "job added");
        self.update(|jobs| {
            jobs.insert(0, job.clone());
            Ok(job)
        })
    }

    pub fn remove(&mut self, id: &str) -> Result<Job> {
        self.update(|jobs| {
            let index = jobs
                .iter()
                .position(|j| j.id == id)
                .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
            Ok(jobs.remove(index))
        })
    }

    fn transition(
        &mut self,
        id: &str,
        transition: Transition,
        message: String,
        log: String,
    ) -> Result<Job> {
        self.update(|jobs| {
            let job = jobs
                .iter_mut()
                .find(|j| j.id == id)
                .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
            job.transition(transition, message)?;
            job.log = log;
            Ok(job.clone())
        })
    }

    /// Runs one job now. A pending job starts; a finished or failed job is
    /// retried. Errors are returned only when the job could not be attempted;
    /// a failed download comes back as a job in the `error` state.
    pub fn run_job(&mut self, id: &str, output_dir: &Path) -> Result<Job> {
        let status = self
            .get(id)
            .map(|j| j.status)
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
        let transition = match status {
            JobStatus::Pending => Transition::Start,
            JobStatus::Done | JobStatus::Error => Transition::Retry,
            JobStatus::Running => {
                return Err(EngineError::InvalidTransition {
                    id: id.to_string(),
                    from: status.as_str(),
                    to: JobStatus::Running.as_str(),
                })
            }
        };
        require_output_dir(output_dir)?;
        self.downloader.check_tools()?;
        self.execute(id, transition, output_dir)
    }

    /// Runs every pending job in list order, one at a time. With nothing
    /// pending this returns immediately without probing or spawning anything.
    pub fn run_all(&mut self, output_dir: &Path) -> Result<RunSummary> {
        let pending: Vec<String> = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.id.clone())
            .collect();
        let mut summary = RunSummary::default();
        if pending.is_empty() {
            return Ok(summary);
        }

        require_output_dir(output_dir)?;
        self.downloader.check_tools()?;

        for id in pending {
            let still_pending = self
                .get(&id)
                .map(|j| j.status == JobStatus::Pending)
                .unwrap_or(false);
            if !still_pending {
                continue;
            }
            summary.attempted += 1;
            let job = self.execute(&id, Transition::Start, output_dir)?;
            match job.status {
                JobStatus::Done => summary.succeeded += 1,
                _ => summary.failed += 1,
            }
        }
        tracing::info!(?summary, "run all finished");
        Ok(summary)
    }

    fn execute(&mut self, id: &str, transition: Transition, output_dir: &Path) -> Result<Job> {
        let job = self.transition(id, transition, String::new(), String::new())?;
        let request = job.download_request(output_dir);
        tracing::info!(job_id = %id, url = %job.url, "job started");

        match self.downloader.download(&request) {
            Ok(outcome) => {
                let message = outcome
                    .output_path
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| "done".to_string());
                tracing::info!(job_id = %id, "job finished");
                self.transition(id, Transition::Succeed, message, outcome.log)
            }
            Err(err) => {
                tracing::info!(job_id = %id, error = %err, "job failed");
                let log = match &err {
                    EngineError::ExternalToolFailed { log, .. } => log.clone(),
                    _ => String::new(),
                };
                self.transition(id, Transition::Fail, err.to_string(), log)
            }
        }
    }
}

fn require_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.as_os_str().is_empty() {
        return Err(EngineError::validation("an output folder is required"));
    }
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
