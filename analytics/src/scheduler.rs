//! Cron-driven maintenance and rollup jobs against the columnar store.

use crate::cron::CronSchedule;
use crate::error::{IngestError, Result};
use crate::providers::ColumnarWriter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use travio_core::environment::Clock;
use travio_runtime::Worker;

/// Upper bound on a single job run.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Recompute yesterday's revenue from the deduplicated event table.
///
/// Runs against `events FINAL` into its own `ReplacingMergeTree`, so a
/// repeated run replaces the day instead of adding to it.
const DAILY_REVENUE_ROLLUP: &str = "\
INSERT INTO daily_revenue (org_id, date, order_count, revenue)
SELECT
    org_id,
    event_date AS date,
    count() AS order_count,
    sum(amount) AS revenue
FROM events FINAL
WHERE event_type IN ('order.confirmed', 'order.completed') AND event_date = yesterday()
GROUP BY org_id, event_date";

const CLEANUP_OLD_EVENTS: &str =
    "ALTER TABLE events DELETE WHERE event_date < today() - INTERVAL 730 DAY";

const OPTIMIZE_TABLES: &str = "OPTIMIZE TABLE events FINAL";

/// A named statement on a schedule.
#[derive(Debug, Clone)]
pub struct Job {
    /// Name used in logs, metrics and [`Scheduler::run_now`].
    pub name: String,
    /// When to run.
    pub schedule: CronSchedule,
    /// Statement to execute.
    pub sql: String,
}

impl Job {
    /// Build a job from a cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidCron`] if `expression` does not parse.
    pub fn new(name: impl Into<String>, expression: &str, sql: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            schedule: CronSchedule::parse(expression)?,
            sql: sql.into(),
        })
    }
}

/// The standard job set: nightly revenue rollup at 01:00, and weekly
/// retention cleanup (03:00) and compaction (04:00) on Sundays.
///
/// # Errors
///
/// Only if one of the built-in expressions fails to parse.
pub fn default_jobs() -> Result<Vec<Job>> {
    Ok(vec![
        Job::new("daily_revenue_rollup", "0 1 * * *", DAILY_REVENUE_ROLLUP)?,
        Job::new("cleanup_old_events", "0 3 * * 0", CLEANUP_OLD_EVENTS)?,
        Job::new("optimize_tables", "0 4 * * 0", OPTIMIZE_TABLES)?,
    ])
}

/// Runs jobs on their schedules, one worker per job.
pub struct Scheduler<W> {
    writer: Arc<W>,
    jobs: Arc<[Job]>,
    timeout: Duration,
    workers: Vec<Worker>,
}

impl<W: ColumnarWriter + 'static> Scheduler<W> {
    /// Start a worker per job. Times come from `clock`.
    pub fn start<C>(writer: Arc<W>, clock: C, jobs: Vec<Job>) -> Self
    where
        C: Clock + Clone + 'static,
    {
        Self::start_with_timeout(writer, clock, jobs, JOB_TIMEOUT)
    }

    /// [`start`](Self::start) with a custom per-run timeout.
    pub fn start_with_timeout<C>(writer: Arc<W>, clock: C, jobs: Vec<Job>, timeout: Duration) -> Self
    where
        C: Clock + Clone + 'static,
    {
        let jobs: Arc<[Job]> = jobs.into();
        let workers = jobs
            .iter()
            .cloned()
            .map(|job| {
                let writer = Arc::clone(&writer);
                let clock = clock.clone();
                Worker::spawn(format!("job-{}", job.name), move |cancel| async move {
                    let mut last_fire = None;
                    loop {
                        let now = clock.now();
                        let base = last_fire.map_or(now, |last| now.max(last));
                        let Some(next) = job.schedule.next_after(base) else {
                            tracing::warn!(job = %job.name, schedule = %job.schedule, "Schedule never fires again");
                            break;
                        };
                        let wait = (next - now).to_std().unwrap_or_default();
                        tracing::debug!(job = %job.name, next = %next, "Job scheduled");

                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(wait) => {}
                        }
                        let _ = run_job(writer.as_ref(), &job, timeout).await;
                        last_fire = Some(next);
                    }
                })
            })
            .collect();

        tracing::info!(jobs = jobs.len(), "Scheduler started");
        Self {
            writer,
            jobs,
            timeout,
            workers,
        }
    }

    /// Names of the scheduled jobs.
    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|job| job.name.as_str())
    }

    /// Run a job immediately, outside its schedule.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnknownJob`], or the job's own failure.
    pub async fn run_now(&self, name: &str) -> Result<()> {
        let job = self
            .jobs
            .iter()
            .find(|job| job.name == name)
            .ok_or_else(|| IngestError::UnknownJob(name.to_string()))?;
        run_job(self.writer.as_ref(), job, self.timeout).await
    }

    /// Stop every worker. A run in progress is abandoned.
    pub async fn stop(self) {
        for worker in self.workers {
            worker.stop().await;
        }
        tracing::info!("Scheduler stopped");
    }
}

async fn run_job<W: ColumnarWriter>(writer: &W, job: &Job, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, writer.execute(&job.sql)).await {
        Ok(result) => result,
        Err(_) => Err(IngestError::Timeout(format!("job {} exceeded {timeout:?}", job.name))),
    };

    let outcome = if result.is_ok() { "success" } else { "failure" };
    metrics::counter!("scheduler.job_runs", "job" => job.name.clone(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("scheduler.job_duration_seconds", "job" => job.name.clone())
        .record(started.elapsed().as_secs_f64());

    match &result {
        Ok(()) => tracing::info!(job = %job.name, elapsed = ?started.elapsed(), "Job completed"),
        Err(e) => tracing::error!(job = %job.name, error = %e, "Job failed"),
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::MemoryWriter;
    use chrono::{TimeZone, Utc};
    use travio_testing::mocks::ManualClock;

    #[test]
    fn default_jobs_parse() {
        let jobs = default_jobs().unwrap();
        let names: Vec<_> = jobs.iter().map(|job| job.name.as_str()).collect();
        assert_eq!(names, ["daily_revenue_rollup", "cleanup_old_events", "optimize_tables"]);
        assert!(jobs[0].sql.contains("FROM events FINAL"));
    }

    #[test]
    fn bad_expression_is_rejected() {
        assert!(matches!(
            Job::new("broken", "0 25 * * *", "SELECT 1"),
            Err(IngestError::InvalidCron { .. })
        ));
    }

    #[tokio::test]
    async fn run_now_executes_the_statement() {
        let writer = Arc::new(MemoryWriter::new());
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap());
        let scheduler = Scheduler::start(Arc::clone(&writer), clock, default_jobs().unwrap());

        scheduler.run_now("optimize_tables").await.unwrap();
        assert_eq!(writer.statements(), [OPTIMIZE_TABLES]);
        assert!(matches!(
            scheduler.run_now("nope").await,
            Err(IngestError::UnknownJob(_))
        ));

        writer.fail_next(1);
        assert!(scheduler.run_now("cleanup_old_events").await.is_err());
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_the_scheduled_minute() {
        let writer = Arc::new(MemoryWriter::new());
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2026, 1, 1, 0, 59, 0).unwrap());
        let job = Job::new("hourly", "0 * * * *", "SELECT 1").unwrap();
        let scheduler = Scheduler::start(Arc::clone(&writer), clock.clone(), vec![job]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(writer.statements().is_empty());

        clock.advance(chrono::Duration::seconds(60));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(writer.statements(), ["SELECT 1"]);
        scheduler.stop().await;
    }
}
