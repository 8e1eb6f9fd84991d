/// Cron scheduler for workflows
///
/// Keeps at most one tokio-cron-scheduler job per workflow id. Registering an
/// id again replaces its job; expressions are validated before anything is
/// touched, so a bad expression never removes a working schedule.
///
/// Runs are single-process: two hosts sharing a database each fire every
/// schedule.

use crate::error::ScheduleError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Invoked with the workflow id each time its schedule fires
pub type ScheduledCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A validated 5-field cron expression
#[derive(Debug, Clone)]
pub struct CronExpression {
    /// As written by the user
    pub expression: String,
    /// Seconds-first form understood by the job scheduler
    pub normalized: String,
    pub schedule: cron::Schedule,
}

impl CronExpression {
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }
}

/// Parse `minute hour day month day-of-week`
///
/// Day-of-week numbers follow the usual crontab convention (0 and 7 are
/// Sunday) and are rewritten to day names for the seconds-first parser.
pub fn parse_cron(expression: &str) -> Result<CronExpression, ScheduleError> {
    let invalid = |reason: String| ScheduleError::InvalidCron {
        expression: expression.to_string(),
        reason,
    };

    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(format!(
            "expected 5 fields (minute hour day month day-of-week), got {}",
            fields.len()
        )));
    }

    let day_of_week = normalize_day_of_week(fields[4]).map_err(invalid)?;
    let normalized = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    );
    let schedule = cron::Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))?;

    Ok(CronExpression {
        expression: expression.trim().to_string(),
        normalized,
        schedule,
    })
}

fn day_name(raw: &str) -> Result<String, String> {
    match raw.parse::<usize>() {
        Ok(n) if n <= 7 => Ok(DAY_NAMES[n % 7].to_string()),
        Ok(n) => Err(format!("day-of-week {} is out of range 0-7", n)),
        Err(_) => Ok(raw.to_uppercase()),
    }
}

fn normalize_day_of_week(field: &str) -> Result<String, String> {
    let mut parts = Vec::new();

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };
        let with_step = |body: String| match step {
            Some(step) => format!("{}/{}", body, step),
            None => body,
        };

        if range == "*" || range == "?" {
            parts.push(with_step(range.to_string()));
            continue;
        }

        match range.split_once('-') {
            Some((start, end)) => {
                if let (Some(step), Ok(first), Ok(last)) =
                    (step, start.parse::<usize>(), end.parse::<usize>())
                {
                    for day in expand_stepped_range(first, last, step)? {
                        if !parts.contains(&day) {
                            parts.push(day);
                        }
                    }
                    continue;
                }

                let start_name = day_name(start)?;
                let ends_on_sunday = matches!(end.parse::<usize>(), Ok(7));
                let start_is_sunday = matches!(start.parse::<usize>(), Ok(0) | Ok(7));
                if ends_on_sunday && !start_is_sunday {
                    // e.g. 5-7 -> FRI-SAT plus Sunday
                    parts.push(with_step(format!("{}-SAT", start_name)));
                    parts.push("SUN".to_string());
                } else {
                    parts.push(with_step(format!("{}-{}", start_name, day_name(end)?)));
                }
            }
            None => parts.push(with_step(day_name(range)?)),
        }
    }

    Ok(parts.join(","))
}

/// Numeric stepped range as explicit day names, e.g. `1-7/2` -> MON,WED,FRI,SUN
fn expand_stepped_range(first: usize, last: usize, step: &str) -> Result<Vec<String>, String> {
    let step = step
        .parse::<usize>()
        .ok()
        .filter(|step| *step > 0)
        .ok_or_else(|| format!("invalid day-of-week step '{}'", step))?;
    if first > last || last > 7 {
        return Err(format!("day-of-week range {}-{} is out of range 0-7", first, last));
    }

    let mut days: Vec<String> = Vec::new();
    for n in (first..=last).step_by(step) {
        let name = DAY_NAMES[n % 7].to_string();
        if !days.contains(&name) {
            days.push(name);
        }
    }
    Ok(days)
}

/// Entry of `scheduled_workflows`
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledWorkflow {
    pub next_run_time: Option<DateTime<Utc>>,
    pub cron: String,
}

struct ScheduledJob {
    job_id: Uuid,
    cron: CronExpression,
}

pub struct WorkflowScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    /// workflow_id -> its single job
    jobs: RwLock<HashMap<String, ScheduledJob>>,
    running: AtomicBool,
}

impl WorkflowScheduler {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            jobs: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("⏰ Starting workflow scheduler");
        let scheduler = self.scheduler.read().await;
        if let Err(e) = scheduler.start().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("⏹️ Stopping workflow scheduler");
        self.jobs.write().await.clear();
        self.scheduler.write().await.shutdown().await?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register (or replace) the schedule of a workflow
    pub async fn schedule(
        &self,
        workflow_id: &str,
        expression: &str,
        callback: ScheduledCallback,
    ) -> Result<(), ScheduleError> {
        let cron = parse_cron(expression)?;

        let owned_id = workflow_id.to_string();
        let job = Job::new_async(cron.normalized.as_str(), move |_uuid, _l| {
            let callback = Arc::clone(&callback);
            let workflow_id = owned_id.clone();
            Box::pin(async move {
                tracing::debug!("🔔 Schedule fired for workflow {}", workflow_id);
                callback(workflow_id).await;
            })
        })
        .map_err(|e| ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        // held across remove + add so concurrent registrations of one id serialize
        let mut jobs = self.jobs.write().await;
        if let Some(previous) = jobs.remove(workflow_id) {
            self.remove_job(workflow_id, previous.job_id).await;
        }

        let job_id = self
            .scheduler
            .write()
            .await
            .add(job)
            .await
            .map_err(|e| ScheduleError::Scheduler(e.to_string()))?;

        tracing::info!(
            "📅 Scheduled workflow {} with '{}' (next run: {:?})",
            workflow_id,
            cron.expression,
            cron.next_run()
        );
        jobs.insert(workflow_id.to_string(), ScheduledJob { job_id, cron });
        Ok(())
    }

    /// Remove a workflow's schedule; unknown ids are a no-op
    pub async fn unschedule(&self, workflow_id: &str) -> bool {
        let removed = self.jobs.write().await.remove(workflow_id);
        match removed {
            Some(job) => {
                self.remove_job(workflow_id, job.job_id).await;
                tracing::info!("🗑️ Unscheduled workflow {}", workflow_id);
                true
            }
            None => false,
        }
    }

    pub async fn is_scheduled(&self, workflow_id: &str) -> bool {
        self.jobs.read().await.contains_key(workflow_id)
    }

    pub async fn scheduled_workflows(&self) -> HashMap<String, ScheduledWorkflow> {
        self.jobs
            .read()
            .await
            .iter()
            .map(|(id, job)| {
                (
                    id.clone(),
                    ScheduledWorkflow {
                        next_run_time: job.cron.next_run(),
                        cron: job.cron.expression.clone(),
                    },
                )
            })
            .collect()
    }

    async fn remove_job(&self, workflow_id: &str, job_id: Uuid) {
        if let Err(e) = self.scheduler.read().await.remove(&job_id).await {
            tracing::warn!("⚠️ Failed to remove job for workflow {}: {}", workflow_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Weekday};

    fn noop() -> ScheduledCallback {
        Arc::new(|_id: String| Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>)
    }

    #[test]
    fn test_parse_cron_requires_five_fields() {
        assert!(parse_cron("*/5 * * * *").is_ok());
        for bad in ["* * * *", "0 0 * * * *", "", "every day"] {
            assert!(matches!(parse_cron(bad), Err(ScheduleError::InvalidCron { .. })), "{}", bad);
        }
        assert!(parse_cron("61 * * * *").is_err());
        assert!(parse_cron("0 9 * * 8").is_err());
    }

    #[test]
    fn test_day_of_week_uses_crontab_numbers() {
        assert_eq!(normalize_day_of_week("1-5").unwrap(), "MON-FRI");
        assert_eq!(normalize_day_of_week("0").unwrap(), "SUN");
        assert_eq!(normalize_day_of_week("7").unwrap(), "SUN");
        assert_eq!(normalize_day_of_week("5-7").unwrap(), "FRI-SAT,SUN");
        assert_eq!(normalize_day_of_week("0,6").unwrap(), "SUN,SAT");
        assert_eq!(normalize_day_of_week("*/2").unwrap(), "*/2");
        assert_eq!(normalize_day_of_week("mon-fri").unwrap(), "MON-FRI");
    }

    #[test]
    fn test_stepped_day_range_keeps_sunday() {
        assert_eq!(normalize_day_of_week("1-7/2").unwrap(), "MON,WED,FRI,SUN");
        assert_eq!(normalize_day_of_week("0-6/3").unwrap(), "SUN,WED,SAT");
        assert_eq!(normalize_day_of_week("0-7/7").unwrap(), "SUN");
        assert!(normalize_day_of_week("1-7/0").is_err());
        assert!(normalize_day_of_week("5-2/1").is_err());

        let cron = parse_cron("0 9 * * 1-7/2").unwrap();
        let weekdays: Vec<Weekday> = cron.schedule.upcoming(Utc).take(8).map(|at| at.weekday()).collect();
        assert!(weekdays.contains(&Weekday::Sun));
        assert!(weekdays.contains(&Weekday::Mon));
        assert!(!weekdays.contains(&Weekday::Tue));
        assert!(!weekdays.contains(&Weekday::Sat));
    }

    #[test]
    fn test_next_run_respects_weekdays() {
        let cron = parse_cron("30 9 * * 1-5").unwrap();
        assert_eq!(cron.normalized, "0 30 9 * * MON-FRI");
        for next in cron.schedule.upcoming(Utc).take(10) {
            assert!(!matches!(next.weekday(), Weekday::Sat | Weekday::Sun));
            assert_eq!((next.hour(), next.minute()), (9, 30));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reschedule_keeps_one_job() {
        let scheduler = WorkflowScheduler::new().await.unwrap();
        scheduler.schedule("wf", "*/5 * * * *", noop()).await.unwrap();
        let first = scheduler.jobs.read().await.get("wf").map(|j| j.job_id).unwrap();

        scheduler.schedule("wf", "0 * * * *", noop()).await.unwrap();
        let scheduled = scheduler.scheduled_workflows().await;
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled["wf"].cron, "0 * * * *");
        assert!(scheduled["wf"].next_run_time.is_some());

        let second = scheduler.jobs.read().await.get("wf").map(|j| j.job_id).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_expression_keeps_existing_job() {
        let scheduler = WorkflowScheduler::new().await.unwrap();
        scheduler.schedule("wf", "0 9 * * *", noop()).await.unwrap();

        let err = scheduler.schedule("wf", "not a cron", noop()).await.unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCron { .. }));
        assert_eq!(scheduler.scheduled_workflows().await["wf"].cron, "0 9 * * *");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unschedule_unknown_is_noop() {
        let scheduler = WorkflowScheduler::new().await.unwrap();
        scheduler.schedule("a", "0 9 * * *", noop()).await.unwrap();

        let before = scheduler.scheduled_workflows().await;
        assert!(!scheduler.unschedule("never-scheduled").await);
        let after = scheduler.scheduled_workflows().await;
        assert_eq!(before.keys().collect::<Vec<_>>(), after.keys().collect::<Vec<_>>());

        assert!(scheduler.unschedule("a").await);
        assert!(!scheduler.is_scheduled("a").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_stop_toggle_running() {
        let scheduler = WorkflowScheduler::new().await.unwrap();
        assert!(!scheduler.is_running());
        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());
    }
}
