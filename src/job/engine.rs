//! Job engine: the job list, its runtime state, and the single
//! dispatcher thread that advances one job at a time. The job list lock
//! is a plain `Mutex` + `Condvar` pair rather than a true `RwLock` —
//! see the "Job list lock primitive" design note for why reader/writer
//! upgrade is deliberately forbidden.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use uuid::Uuid as UuidGen;

use crate::error::{BarError, Result};

use super::config::{ArchiveType, JobConfig};
use super::runtime::RunningInfo;
use super::state::JobState;

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub uuid: String,
    pub config: JobConfig,
    pub state: JobState,
    pub running: RunningInfo,
    pub archive_type: ArchiveType,
    pub requested_abort: bool,
    pub requested_volume_number: Option<u32>,
    pub volume_unload_flag: bool,
}

impl JobRecord {
    fn new(uuid: String, config: JobConfig) -> Self {
        Self {
            uuid,
            config,
            state: JobState::None,
            running: RunningInfo::new(),
            archive_type: ArchiveType::Normal,
            requested_abort: false,
            requested_volume_number: None,
            volume_unload_flag: false,
        }
    }
}

struct JobListInner {
    jobs: HashMap<String, JobRecord>,
}

/// The job list's single lock, paired with a condvar the dispatcher and
/// volume-request waiters block on.
pub struct JobListLock {
    inner: Mutex<JobListInner>,
    modified: Condvar,
}

impl JobListLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(JobListInner { jobs: HashMap::new() }), modified: Condvar::new() })
    }

    fn notify(&self) {
        self.modified.notify_all();
    }

    pub fn list_jobs(&self) -> Vec<JobRecord> {
        self.inner.lock().unwrap().jobs.values().cloned().collect()
    }

    pub fn get_job(&self, uuid: &str) -> Result<JobRecord> {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .get(uuid)
            .cloned()
            .ok_or_else(|| BarError::job(format!("no such job {uuid}")))
    }

    pub fn new_job(&self, name: &str, storage_uri: &str) -> String {
        let uuid = UuidGen::new_v4().to_string();
        let config = JobConfig::new(name, storage_uri);
        self.inner.lock().unwrap().jobs.insert(uuid.clone(), JobRecord::new(uuid.clone(), config));
        self.notify();
        uuid
    }

    pub fn copy_job(&self, uuid: &str, new_name: &str) -> Result<String> {
        let mut guard = self.inner.lock().unwrap();
        let source = guard.jobs.get(uuid).cloned().ok_or_else(|| BarError::job(format!("no such job {uuid}")))?;
        let new_uuid = UuidGen::new_v4().to_string();
        let mut config = source.config.clone();
        config.name = new_name.to_string();
        guard.jobs.insert(new_uuid.clone(), JobRecord::new(new_uuid.clone(), config));
        drop(guard);
        self.notify();
        Ok(new_uuid)
    }

    /// Replaces a job's whole config, e.g. after reloading it from
    /// disk. The uuid and runtime state are left untouched.
    pub fn replace_config(&self, uuid: &str, config: JobConfig) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let job = guard.jobs.get_mut(uuid).ok_or_else(|| BarError::job(format!("no such job {uuid}")))?;
        job.config = config;
        Ok(())
    }

    pub fn rename_job(&self, uuid: &str, new_name: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let job = guard.jobs.get_mut(uuid).ok_or_else(|| BarError::job(format!("no such job {uuid}")))?;
        job.config.name = new_name.to_string();
        Ok(())
    }

    pub fn delete_job(&self, uuid: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let job = guard.jobs.get(uuid).ok_or_else(|| BarError::job(format!("no such job {uuid}")))?;
        if job.state.is_active() {
            return Err(BarError::job(format!("cannot delete job {uuid} while it is active")));
        }
        guard.jobs.remove(uuid);
        Ok(())
    }

    pub fn set_option(&self, uuid: &str, key: &str, value: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let job = guard.jobs.get_mut(uuid).ok_or_else(|| BarError::job(format!("no such job {uuid}")))?;
        job.config.set_option(key, value);
        Ok(())
    }

    pub fn get_option(&self, uuid: &str, key: &str) -> Result<Option<String>> {
        let guard = self.inner.lock().unwrap();
        let job = guard.jobs.get(uuid).ok_or_else(|| BarError::job(format!("no such job {uuid}")))?;
        Ok(job.config.get_option(key).map(str::to_string))
    }

    fn transition(guard: &mut JobListInner, uuid: &str, next: JobState) -> Result<()> {
        let job = guard.jobs.get_mut(uuid).ok_or_else(|| BarError::job(format!("no such job {uuid}")))?;
        if !job.state.can_transition_to(next) {
            return Err(BarError::job(format!("job {uuid}: illegal transition {:?} -> {next:?}", job.state)));
        }
        job.state = next;
        Ok(())
    }

    pub fn start_job(&self, uuid: &str, archive_type: ArchiveType) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        Self::transition(&mut guard, uuid, JobState::Waiting)?;
        if let Some(job) = guard.jobs.get_mut(uuid) {
            job.archive_type = archive_type;
            job.requested_abort = false;
        }
        drop(guard);
        self.notify();
        tracing::info!(job = uuid, ?archive_type, "job queued");
        Ok(())
    }

    /// Request cancellation. A job still `Waiting` moves straight to
    /// `Aborted`; a `Running`/`RequestVolume` job is flagged and the
    /// dispatcher observes it at its next suspension point.
    pub fn abort_job(&self, uuid: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let job = guard.jobs.get_mut(uuid).ok_or_else(|| BarError::job(format!("no such job {uuid}")))?;
        match job.state {
            JobState::Waiting => {
                job.state = JobState::Aborted;
            }
            JobState::Running | JobState::RequestVolume => {
                job.requested_abort = true;
            }
            _ => return Err(BarError::job(format!("job {uuid} is not active"))),
        }
        drop(guard);
        self.notify();
        tracing::warn!(job = uuid, "abort requested");
        Ok(())
    }

    /// Blocks the calling dispatcher thread until a `Waiting` job exists
    /// or `timeout` elapses, returning its uuid.
    pub fn wait_for_waiting_job(&self, timeout: Duration) -> Option<String> {
        let guard = self.inner.lock().unwrap();
        let found = |g: &JobListInner| g.jobs.values().find(|j| j.state == JobState::Waiting).map(|j| j.uuid.clone());
        if let Some(uuid) = found(&guard) {
            return Some(uuid);
        }
        let (guard, _) = self.modified.wait_timeout_while(guard, timeout, |g| found(g).is_none()).unwrap();
        found(&guard)
    }

    pub fn mark_running(&self, uuid: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        Self::transition(&mut guard, uuid, JobState::Running)?;
        tracing::info!(job = uuid, "job running");
        Ok(())
    }

    pub fn mark_done(&self, uuid: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        Self::transition(&mut guard, uuid, JobState::Done)?;
        self.after_state_change(&mut guard, uuid);
        tracing::info!(job = uuid, "job done");
        Ok(())
    }

    pub fn mark_error(&self, uuid: &str, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        let mut guard = self.inner.lock().unwrap();
        Self::transition(&mut guard, uuid, JobState::Error)?;
        if let Some(job) = guard.jobs.get_mut(uuid) {
            job.running.error = Some(message.clone());
        }
        self.after_state_change(&mut guard, uuid);
        tracing::error!(job = uuid, %message, "job errored");
        Ok(())
    }

    pub fn mark_aborted(&self, uuid: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        Self::transition(&mut guard, uuid, JobState::Aborted)?;
        self.after_state_change(&mut guard, uuid);
        tracing::warn!(job = uuid, "job aborted");
        Ok(())
    }

    fn after_state_change(&self, guard: &mut JobListInner, uuid: &str) {
        if let Some(job) = guard.jobs.get_mut(uuid) {
            job.requested_abort = false;
            job.requested_volume_number = None;
        }
        drop(guard);
        self.notify();
    }

    pub fn is_abort_requested(&self, uuid: &str) -> bool {
        self.inner.lock().unwrap().jobs.get(uuid).map(|j| j.requested_abort).unwrap_or(false)
    }

    /// Volume request protocol step 1-2: transition to `RequestVolume`
    /// and record which volume is wanted, then wake any waiter.
    pub fn request_volume(&self, uuid: &str, volume_number: u32) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        Self::transition(&mut guard, uuid, JobState::RequestVolume)?;
        if let Some(job) = guard.jobs.get_mut(uuid) {
            job.requested_volume_number = Some(volume_number);
        }
        drop(guard);
        self.notify();
        tracing::info!(job = uuid, volume_number, "volume rotation requested");
        Ok(())
    }

    /// Volume request protocol step 3: block until the operator loads
    /// the requested volume, unloads it, or the job is aborted.
    pub fn wait_for_volume(&self, uuid: &str, timeout: Duration) -> Result<VolumeWaitOutcome> {
        let guard = self.inner.lock().unwrap();
        let ready = |g: &JobListInner| -> Option<VolumeWaitOutcome> {
            let job = g.jobs.get(uuid)?;
            if job.requested_abort {
                Some(VolumeWaitOutcome::Aborted)
            } else if job.volume_unload_flag {
                Some(VolumeWaitOutcome::Unloaded)
            } else if job.state == JobState::Running {
                Some(VolumeWaitOutcome::Loaded)
            } else {
                None
            }
        };
        if let Some(outcome) = ready(&guard) {
            return Ok(outcome);
        }
        let (guard, timed_out) = self.modified.wait_timeout_while(guard, timeout, |g| ready(g).is_none()).unwrap();
        match ready(&guard) {
            Some(outcome) => Ok(outcome),
            None if timed_out.timed_out() => Ok(VolumeWaitOutcome::TimedOut),
            None => Ok(VolumeWaitOutcome::TimedOut),
        }
    }

    /// Called once the operator confirms the requested volume is loaded;
    /// moves the job back to `Running`.
    pub fn confirm_volume_loaded(&self, uuid: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        Self::transition(&mut guard, uuid, JobState::Running)?;
        if let Some(job) = guard.jobs.get_mut(uuid) {
            job.requested_volume_number = None;
        }
        drop(guard);
        self.notify();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeWaitOutcome {
    Loaded,
    Unloaded,
    Aborted,
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_job_starts_in_none_state() {
        let list = JobListLock::new();
        let uuid = list.new_job("nightly", "/backups/nightly");
        let job = list.get_job(&uuid).unwrap();
        assert_eq!(job.state, JobState::None);
    }

    #[test]
    fn start_then_dispatch_then_complete() {
        let list = JobListLock::new();
        let uuid = list.new_job("nightly", "/backups/nightly");
        list.start_job(&uuid, ArchiveType::Normal).unwrap();
        assert_eq!(list.get_job(&uuid).unwrap().state, JobState::Waiting);

        list.mark_running(&uuid).unwrap();
        assert_eq!(list.get_job(&uuid).unwrap().state, JobState::Running);

        list.mark_done(&uuid).unwrap();
        assert_eq!(list.get_job(&uuid).unwrap().state, JobState::Done);
    }

    #[test]
    fn abort_while_waiting_is_immediate() {
        let list = JobListLock::new();
        let uuid = list.new_job("job", "/backups/job");
        list.start_job(&uuid, ArchiveType::Normal).unwrap();
        list.abort_job(&uuid).unwrap();
        assert_eq!(list.get_job(&uuid).unwrap().state, JobState::Aborted);
    }

    #[test]
    fn abort_while_running_sets_flag_not_state() {
        let list = JobListLock::new();
        let uuid = list.new_job("job", "/backups/job");
        list.start_job(&uuid, ArchiveType::Normal).unwrap();
        list.mark_running(&uuid).unwrap();
        list.abort_job(&uuid).unwrap();
        assert_eq!(list.get_job(&uuid).unwrap().state, JobState::Running);
        assert!(list.is_abort_requested(&uuid));
    }

    #[test]
    fn volume_request_round_trip() {
        let list = JobListLock::new();
        let uuid = list.new_job("job", "/backups/job");
        list.start_job(&uuid, ArchiveType::Normal).unwrap();
        list.mark_running(&uuid).unwrap();

        list.request_volume(&uuid, 2).unwrap();
        assert_eq!(list.get_job(&uuid).unwrap().state, JobState::RequestVolume);

        list.confirm_volume_loaded(&uuid).unwrap();
        assert_eq!(list.get_job(&uuid).unwrap().state, JobState::Running);
    }

    #[test]
    fn wait_for_waiting_job_times_out_when_none_pending() {
        let list = JobListLock::new();
        assert!(list.wait_for_waiting_job(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn delete_job_rejects_active_jobs() {
        let list = JobListLock::new();
        let uuid = list.new_job("job", "/backups/job");
        list.start_job(&uuid, ArchiveType::Normal).unwrap();
        assert!(list.delete_job(&uuid).is_err());
    }
}
