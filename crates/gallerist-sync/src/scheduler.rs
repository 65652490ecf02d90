//! Cron job registry with execution bookkeeping, alerting and a shared guard for full crawls.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use gallerist_core::{round2, TaskExecutionRecord, TaskStatus};
use gallerist_storage::TaskLogSink;
use serde::Serialize;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, info_span, warn, Instrument};

use crate::notify::{Alert, Notifier};

/// Work run by a scheduled job.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSpec {
    pub name: String,
    pub trigger: String,
    pub timezone: Tz,
    /// Failures raise an alert.
    pub critical: bool,
    /// Never overlaps another exclusive job.
    pub exclusive: bool,
}

impl JobSpec {
    pub fn new(name: &str, trigger: &str, timezone: Tz) -> Self {
        Self {
            name: name.to_string(),
            trigger: trigger.to_string(),
            timezone,
            critical: false,
            exclusive: false,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// The trigger in the seconds-first form the cron runtime parses.
    /// Five-field triggers fire at second zero.
    pub fn cron_expression(&self) -> String {
        let trigger = self.trigger.trim();
        if trigger.split_whitespace().count() == 5 {
            format!("0 {trigger}")
        } else {
            trigger.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStats {
    pub last_run: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub error_count: u64,
    /// Percent of runs that succeeded, two decimals.
    pub success_rate: f64,
    pub last_duration_ms: Option<i64>,
    pub last_error: Option<String>,
}

impl Default for JobStats {
    fn default() -> Self {
        Self {
            last_run: None,
            total_runs: 0,
            error_count: 0,
            success_rate: 100.0,
            last_duration_ms: None,
            last_error: None,
        }
    }
}

impl JobStats {
    fn record_success(&mut self, at: DateTime<Utc>, duration_ms: i64) {
        self.last_run = Some(at);
        self.total_runs += 1;
        self.last_duration_ms = Some(duration_ms);
        self.refresh_rate();
    }

    fn record_failure(&mut self, duration_ms: i64, message: &str) {
        self.total_runs += 1;
        self.error_count += 1;
        self.last_duration_ms = Some(duration_ms);
        self.last_error = Some(message.to_string());
        self.refresh_rate();
    }

    fn refresh_rate(&mut self) {
        let succeeded = self.total_runs.saturating_sub(self.error_count);
        self.success_rate = round2(succeeded as f64 / self.total_runs as f64 * 100.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded { duration_ms: i64 },
    Failed { duration_ms: i64, error: String },
    Skipped { reason: String },
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown job `{0}`")]
    UnknownJob(String),
    #[error("job `{0}` is already registered")]
    DuplicateJob(String),
    #[error("job `{name}` has an invalid trigger `{trigger}`: {message}")]
    InvalidTrigger {
        name: String,
        trigger: String,
        message: String,
    },
    #[error("cron runtime error: {0}")]
    Runtime(#[from] JobSchedulerError),
}

/// Process-wide flag that lets at most one exclusive job run at a time.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveLock {
    held: Arc<AtomicBool>,
}

impl ExclusiveLock {
    pub fn try_acquire(&self) -> Option<ExclusiveRunGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExclusiveRunGuard {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the exclusive flag when dropped.
#[derive(Debug)]
pub struct ExclusiveRunGuard {
    held: Arc<AtomicBool>,
}

impl Drop for ExclusiveRunGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    #[serde(flatten)]
    pub spec: JobSpec,
    pub stats: JobStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub active: bool,
    pub exclusive_running: bool,
    pub jobs: Vec<JobStatus>,
}

struct RegisteredJob {
    spec: JobSpec,
    task: Arc<dyn ScheduledTask>,
}

struct SchedulerInner {
    jobs: RwLock<Vec<RegisteredJob>>,
    stats: Mutex<BTreeMap<String, JobStats>>,
    notifier: Arc<dyn Notifier>,
    task_log: Option<Arc<dyn TaskLogSink>>,
    exclusive: ExclusiveLock,
    runtime: tokio::sync::Mutex<Option<JobScheduler>>,
    active: AtomicBool,
}

/// Cheaply clonable handle over the job table and its cron runtime.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

pub(crate) fn validate_trigger(spec: &JobSpec) -> Result<(), SchedulerError> {
    Job::new_async_tz(spec.cron_expression().as_str(), spec.timezone, |_uuid, _l| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidTrigger {
            name: spec.name.clone(),
            trigger: spec.trigger.clone(),
            message: e.to_string(),
        })
}

impl Scheduler {
    pub fn new(notifier: Arc<dyn Notifier>, task_log: Option<Arc<dyn TaskLogSink>>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                jobs: RwLock::new(Vec::new()),
                stats: Mutex::new(BTreeMap::new()),
                notifier,
                task_log,
                exclusive: ExclusiveLock::default(),
                runtime: tokio::sync::Mutex::new(None),
                active: AtomicBool::new(false),
            }),
        }
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.inner.notifier)
    }

    pub fn exclusive_lock(&self) -> &ExclusiveLock {
        &self.inner.exclusive
    }

    pub fn register_job(&self, spec: JobSpec, task: Arc<dyn ScheduledTask>) -> Result<(), SchedulerError> {
        validate_trigger(&spec)?;
        let mut jobs = self.inner.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.iter().any(|job| job.spec.name == spec.name) {
            return Err(SchedulerError::DuplicateJob(spec.name));
        }
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(spec.name.clone(), JobStats::default());
        info!(
            job = %spec.name,
            trigger = %spec.trigger,
            timezone = %spec.timezone,
            critical = spec.critical,
            exclusive = spec.exclusive,
            "registered job"
        );
        jobs.push(RegisteredJob { spec, task });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<String> {
        self.inner
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|job| job.spec.name.clone())
            .collect()
    }

    fn lookup(&self, name: &str) -> Result<(JobSpec, Arc<dyn ScheduledTask>), SchedulerError> {
        self.inner
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|job| job.spec.name == name)
            .map(|job| (job.spec.clone(), Arc::clone(&job.task)))
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))
    }

    fn update_stats(&self, name: &str, update: impl FnOnce(&mut JobStats)) {
        let mut stats = self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(stats.entry(name.to_string()).or_default());
    }

    /// Run a job once through the bookkeeping wrapper.
    pub async fn execute_task(&self, name: &str) -> Result<ExecutionOutcome, SchedulerError> {
        let (spec, task) = self.lookup(name)?;

        let _guard = if spec.exclusive {
            match self.inner.exclusive.try_acquire() {
                Some(guard) => Some(guard),
                None => {
                    info!(job = %spec.name, "another exclusive job is running; skipping");
                    return Ok(ExecutionOutcome::Skipped {
                        reason: "another exclusive job is running".to_string(),
                    });
                }
            }
        } else {
            None
        };

        let executed_at = Utc::now();
        let started = Instant::now();
        info!(job = %spec.name, "task started");
        let result = task
            .run()
            .instrument(info_span!("scheduled_task", job = %spec.name))
            .await;
        let duration_ms = started.elapsed().as_millis() as i64;

        let (outcome, record) = match result {
            Ok(()) => {
                self.update_stats(&spec.name, |stats| stats.record_success(executed_at, duration_ms));
                info!(job = %spec.name, duration_ms, "task succeeded");
                (
                    ExecutionOutcome::Succeeded { duration_ms },
                    TaskExecutionRecord {
                        task_name: spec.name.clone(),
                        status: TaskStatus::Success,
                        duration_ms,
                        error_message: None,
                        executed_at,
                    },
                )
            }
            Err(err) => {
                let message = format!("{err:#}");
                self.update_stats(&spec.name, |stats| stats.record_failure(duration_ms, &message));
                error!(job = %spec.name, duration_ms, error = %message, "task failed");
                if spec.critical {
                    let alert = Alert::task_failure(&spec.name, &message);
                    if let Err(err) = self.inner.notifier.send(&alert).await {
                        warn!(job = %spec.name, error = %format!("{err:#}"), "alert delivery failed");
                    }
                }
                (
                    ExecutionOutcome::Failed {
                        duration_ms,
                        error: message.clone(),
                    },
                    TaskExecutionRecord {
                        task_name: spec.name.clone(),
                        status: TaskStatus::Error,
                        duration_ms,
                        error_message: Some(message),
                        executed_at,
                    },
                )
            }
        };

        if let Some(sink) = &self.inner.task_log {
            if let Err(err) = sink.record(&record).await {
                warn!(job = %spec.name, error = %err, "could not record task execution");
            }
        }
        Ok(outcome)
    }

    pub async fn run_task_manually(&self, name: &str) -> Result<ExecutionOutcome, SchedulerError> {
        info!(job = name, "manual trigger");
        self.execute_task(name).await
    }

    /// Install every registered job into the cron runtime and start it.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut runtime = self.inner.runtime.lock().await;
        if runtime.is_some() {
            return Ok(());
        }

        let sched = JobScheduler::new().await?;
        let specs = self
            .inner
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|job| job.spec.clone())
            .collect::<Vec<_>>();
        for spec in specs {
            let handle = self.clone();
            let name = spec.name.clone();
            let job = Job::new_async_tz(spec.cron_expression().as_str(), spec.timezone, move |_uuid, _l| {
                let handle = handle.clone();
                let name = name.clone();
                Box::pin(async move {
                    if let Err(err) = handle.execute_task(&name).await {
                        error!(job = %name, error = %err, "scheduled execution failed");
                    }
                })
            })
            .map_err(|e| SchedulerError::InvalidTrigger {
                name: spec.name.clone(),
                trigger: spec.trigger.clone(),
                message: e.to_string(),
            })?;
            sched.add(job).await?;
        }
        sched.start().await?;

        *runtime = Some(sched);
        self.inner.active.store(true, Ordering::SeqCst);
        info!(jobs = self.job_names().len(), "scheduler started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut runtime = self.inner.runtime.lock().await;
        if let Some(mut sched) = runtime.take() {
            sched.shutdown().await?;
            info!("scheduler stopped");
        }
        self.inner.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self, name: &str) -> Option<JobStats> {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Mean success rate over jobs that have run at least once; 100 when none has.
    pub fn mean_success_rate(&self) -> f64 {
        let stats = self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let rates = stats
            .values()
            .filter(|s| s.total_runs > 0)
            .map(|s| s.success_rate)
            .collect::<Vec<_>>();
        if rates.is_empty() {
            return 100.0;
        }
        round2(rates.iter().sum::<f64>() / rates.len() as f64)
    }

    pub fn status(&self) -> SchedulerStatus {
        let jobs = self.inner.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let stats = self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner);
        SchedulerStatus {
            active: self.is_active(),
            exclusive_running: self.inner.exclusive.is_held(),
            jobs: jobs
                .iter()
                .map(|job| JobStatus {
                    spec: job.spec.clone(),
                    stats: stats.get(&job.spec.name).cloned().unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingNotifier, StaticTask};
    use gallerist_storage::InMemoryCatalogStore;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    const SEOUL: Tz = chrono_tz::Asia::Seoul;

    /// Fails on the listed (1-based) invocations.
    struct FlakyTask {
        calls: AtomicUsize,
        failing_calls: Vec<usize>,
    }

    #[async_trait]
    impl ScheduledTask for FlakyTask {
        async fn run(&self) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_calls.contains(&call) {
                anyhow::bail!("run {call} failed");
            }
            Ok(())
        }
    }

    struct GateTask {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ScheduledTask for GateTask {
        async fn run(&self) -> anyhow::Result<()> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn scheduler_with(notifier: Arc<RecordingNotifier>) -> Scheduler {
        Scheduler::new(notifier, None)
    }

    #[tokio::test]
    async fn success_rate_tracks_failures() {
        let scheduler = scheduler_with(Arc::new(RecordingNotifier::default()));
        scheduler
            .register_job(
                JobSpec::new("status-sweep-weekly", "0 23 * * 6", SEOUL),
                Arc::new(FlakyTask {
                    calls: AtomicUsize::new(0),
                    failing_calls: vec![2, 5, 9],
                }),
            )
            .unwrap();
        assert_eq!(scheduler.stats("status-sweep-weekly").unwrap().success_rate, 100.0);

        for _ in 0..10 {
            scheduler.execute_task("status-sweep-weekly").await.unwrap();
        }

        let stats = scheduler.stats("status-sweep-weekly").unwrap();
        assert_eq!(stats.total_runs, 10);
        assert_eq!(stats.error_count, 3);
        assert_eq!(stats.success_rate, 70.0);
        assert_eq!(stats.last_error.as_deref(), Some("run 9 failed"));
        assert!(stats.last_run.is_some());
        assert_eq!(scheduler.mean_success_rate(), 70.0);
    }

    #[tokio::test]
    async fn exclusive_jobs_skip_while_another_holds_the_guard() {
        let scheduler = scheduler_with(Arc::new(RecordingNotifier::default()));
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        scheduler
            .register_job(
                JobSpec::new("artmap-full-weekly", "0 3 * * 0", SEOUL).exclusive(),
                Arc::new(GateTask {
                    started: Arc::clone(&started),
                    release: Arc::clone(&release),
                }),
            )
            .unwrap();
        scheduler
            .register_job(
                JobSpec::new("artmap-tier1-daily", "0 14 * * *", SEOUL).exclusive(),
                Arc::new(StaticTask::ok()),
            )
            .unwrap();

        let full = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.execute_task("artmap-full-weekly").await }
        });
        started.notified().await;
        assert!(scheduler.status().exclusive_running);

        let skipped = scheduler.execute_task("artmap-tier1-daily").await.unwrap();
        assert!(matches!(skipped, ExecutionOutcome::Skipped { .. }));
        assert_eq!(scheduler.stats("artmap-tier1-daily").unwrap(), JobStats::default());

        release.notify_one();
        let finished = full.await.unwrap().unwrap();
        assert!(matches!(finished, ExecutionOutcome::Succeeded { .. }));
        assert!(!scheduler.exclusive_lock().is_held());

        let ran = scheduler.execute_task("artmap-tier1-daily").await.unwrap();
        assert!(matches!(ran, ExecutionOutcome::Succeeded { .. }));
        assert_eq!(scheduler.stats("artmap-tier1-daily").unwrap().total_runs, 1);
    }

    #[tokio::test]
    async fn critical_failures_alert_and_are_logged() {
        let notifier = Arc::new(RecordingNotifier::default());
        let sink = Arc::new(InMemoryCatalogStore::new());
        let scheduler = Scheduler::new(notifier.clone(), Some(sink.clone()));
        scheduler
            .register_job(
                JobSpec::new("artmap-tier1-daily", "0 14 * * *", SEOUL).critical(),
                Arc::new(StaticTask::failing("no city succeeded")),
            )
            .unwrap();
        scheduler
            .register_job(
                JobSpec::new("daily-stats", "0 0 * * *", SEOUL),
                Arc::new(StaticTask::failing("stats query failed")),
            )
            .unwrap();

        let outcome = scheduler.execute_task("artmap-tier1-daily").await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Failed { ref error, .. } if error == "no city succeeded"));
        scheduler.execute_task("daily-stats").await.unwrap();

        let alerts = notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].subject.contains("artmap-tier1-daily"));

        let logs = sink.task_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, TaskStatus::Error);
        assert_eq!(logs[1].error_message.as_deref(), Some("stats query failed"));
    }

    #[tokio::test]
    async fn alert_delivery_failure_does_not_escape() {
        let notifier = Arc::new(RecordingNotifier::broken());
        let scheduler = scheduler_with(notifier.clone());
        scheduler
            .register_job(
                JobSpec::new("artmap-full-weekly", "0 3 * * 0", SEOUL).critical(),
                Arc::new(StaticTask::failing("boom")),
            )
            .unwrap();
        let outcome = scheduler.run_task_manually("artmap-full-weekly").await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));
        assert_eq!(scheduler.stats("artmap-full-weekly").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn five_field_triggers_gain_a_seconds_column() {
        let daily = JobSpec::new("artmap-tier1-daily", "0 14 * * *", SEOUL);
        assert_eq!(daily.cron_expression(), "0 0 14 * * *");
        assert_eq!(daily.trigger, "0 14 * * *");
        validate_trigger(&daily).unwrap();

        let weekly = JobSpec::new("artmap-full-weekly", "0 3 * * 0", SEOUL);
        assert_eq!(weekly.cron_expression(), "0 0 3 * * 0");
        validate_trigger(&weekly).unwrap();

        let seconds = JobSpec::new("every-half-minute", "*/30 * * * * *", SEOUL);
        assert_eq!(seconds.cron_expression(), "*/30 * * * * *");
        validate_trigger(&seconds).unwrap();
    }

    #[tokio::test]
    async fn registration_rejects_duplicates_bad_triggers_and_unknown_names() {
        let scheduler = scheduler_with(Arc::new(RecordingNotifier::default()));
        scheduler
            .register_job(JobSpec::new("health-monitor", "0 * * * *", SEOUL), Arc::new(StaticTask::ok()))
            .unwrap();

        let dup = scheduler
            .register_job(JobSpec::new("health-monitor", "0 * * * *", SEOUL), Arc::new(StaticTask::ok()))
            .unwrap_err();
        assert!(matches!(dup, SchedulerError::DuplicateJob(_)));

        let bad = scheduler
            .register_job(JobSpec::new("broken", "every tuesday", SEOUL), Arc::new(StaticTask::ok()))
            .unwrap_err();
        assert!(matches!(bad, SchedulerError::InvalidTrigger { .. }));

        let unknown = scheduler.run_task_manually("nope").await.unwrap_err();
        assert!(matches!(unknown, SchedulerError::UnknownJob(_)));
        assert_eq!(scheduler.job_names(), vec!["health-monitor".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_and_stop_toggle_the_cron_runtime() {
        let scheduler = scheduler_with(Arc::new(RecordingNotifier::default()));
        scheduler
            .register_job(JobSpec::new("daily-stats", "0 0 * * *", SEOUL), Arc::new(StaticTask::ok()))
            .unwrap();

        scheduler.start().await.unwrap();
        let status = scheduler.status();
        assert!(status.active);
        assert_eq!(status.jobs.len(), 1);
        assert_eq!(status.jobs[0].spec.trigger, "0 0 * * *");

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_active());
    }
}
