//! Time-based job trigger. A single thread wakes at least once a
//! minute, evaluates each non-active job's schedule rules against
//! every minute since it was last checked, and moves matching jobs to
//! `Waiting`. Missed minutes are replayed, bounded to one catch-up run
//! per rule per wakeup.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{Datelike, TimeZone, Timelike, Utc};

use crate::job::{ArchiveType, JobListLock};

/// Minimum wakeup cadence; the scheduler never checks less often than
/// this even if told to wake slower.
pub const MIN_WAKE_INTERVAL: Duration = Duration::from_secs(60);

pub struct Scheduler {
    jobs: Arc<JobListLock>,
    last_checked_at: Mutex<HashMap<String, i64>>,
}

impl Scheduler {
    pub fn new(jobs: Arc<JobListLock>) -> Arc<Self> {
        Arc::new(Self { jobs, last_checked_at: Mutex::new(HashMap::new()) })
    }

    /// One evaluation pass at `now_unix`. Returns the uuids of jobs
    /// moved to `Waiting` this pass. Pure function of `now_unix` and
    /// the current job list, so it is exercised directly in tests
    /// without a real clock or thread.
    pub fn tick(&self, now_unix: i64) -> Vec<String> {
        let mut started = Vec::new();
        for job in self.jobs.list_jobs() {
            if job.state.is_active() {
                continue;
            }
            let last_checked = {
                let mut guard = self.last_checked_at.lock().unwrap();
                *guard.entry(job.uuid.clone()).or_insert(now_unix - MIN_WAKE_INTERVAL.as_secs() as i64)
            };

            let mut triggered: Option<ArchiveType> = None;
            let mut fired_rules: HashSet<usize> = HashSet::new();
            let mut minute = last_checked + 60;
            while minute <= now_unix {
                if let Some(dt) = Utc.timestamp_opt(minute, 0).single() {
                    let weekday = dt.weekday().num_days_from_sunday();
                    for (idx, rule) in job.config.schedule_rules.iter().enumerate() {
                        if fired_rules.contains(&idx) {
                            continue;
                        }
                        if rule.matches(dt.year(), dt.month(), dt.day(), weekday, dt.hour(), dt.minute()) {
                            fired_rules.insert(idx);
                            triggered = Some(rule.archive_type);
                        }
                    }
                }
                minute += 60;
            }

            self.last_checked_at.lock().unwrap().insert(job.uuid.clone(), now_unix);

            if let Some(archive_type) = triggered {
                if self.jobs.start_job(&job.uuid, archive_type).is_ok() {
                    started.push(job.uuid);
                }
            }
        }
        started
    }

    /// Runs `tick` on its own thread, waking at least once a minute
    /// until `running` is cleared.
    pub fn spawn_loop(self: Arc<Self>, running: Arc<std::sync::atomic::AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || {
            while running.load(std::sync::atomic::Ordering::SeqCst) {
                let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
                self.tick(now);
                thread::sleep(MIN_WAKE_INTERVAL);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobState, ScheduleRule};

    #[test]
    fn matching_rule_transitions_job_to_waiting() {
        let jobs = JobListLock::new();
        let idle = jobs.new_job("nightly", "/backups/nightly");

        // 2026-07-28 03:00:00 UTC is a Tuesday.
        let trigger_time = Utc.with_ymd_and_hms(2026, 7, 28, 3, 0, 0).unwrap().timestamp();

        let scheduled = jobs.new_job("with-rule", "/backups/with-rule");
        jobs_add_rule(&jobs, &scheduled, ScheduleRule { hour: Some(3), minute: Some(0), ..ScheduleRule::always(ArchiveType::Normal) });

        let scheduler = Scheduler::new(jobs.clone());
        // First tick just establishes a baseline last_checked_at.
        scheduler.tick(trigger_time - 120);
        let started = scheduler.tick(trigger_time);

        assert!(started.contains(&scheduled));
        assert_eq!(jobs.get_job(&scheduled).unwrap().state, JobState::Waiting);
        assert!(!started.contains(&idle));
    }

    #[test]
    fn catch_up_fires_each_rule_at_most_once_per_wakeup() {
        let jobs = JobListLock::new();
        let uuid = jobs.new_job("hourly", "/backups/hourly");
        jobs_add_rule(&jobs, &uuid, ScheduleRule { minute: Some(0), ..ScheduleRule::always(ArchiveType::Normal) });

        let start = Utc.with_ymd_and_hms(2026, 7, 28, 1, 0, 0).unwrap().timestamp();
        let scheduler = Scheduler::new(jobs.clone());
        scheduler.tick(start - 60);
        // Skip ahead three hours worth of minutes in one wakeup; only
        // one catch-up run should be recorded for this rule.
        let started = scheduler.tick(start + 3 * 3600);
        assert_eq!(started.iter().filter(|u| *u == &uuid).count(), 1);
    }

    #[test]
    fn active_jobs_are_never_retriggered() {
        let jobs = JobListLock::new();
        let uuid = jobs.new_job("busy", "/backups/busy");
        jobs_add_rule(&jobs, &uuid, ScheduleRule::always(ArchiveType::Normal));
        jobs.start_job(&uuid, ArchiveType::Normal).unwrap();

        let scheduler = Scheduler::new(jobs.clone());
        let started = scheduler.tick(Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap().timestamp());
        assert!(!started.contains(&uuid));
    }

    fn jobs_add_rule(jobs: &Arc<JobListLock>, uuid: &str, rule: ScheduleRule) {
        // Test helper: schedule rules are normally part of job config
        // loaded from disk; here we splice one in directly through the
        // job list for unit testing without touching the filesystem.
        let mut record = jobs.get_job(uuid).unwrap();
        record.config.schedule_rules.push(rule);
        jobs.replace_config(uuid, record.config).unwrap();
    }
}
