//! Cooperative task scheduler
//!
//! One loop owns a list of {task, trigger, last run} entries. On each tick
//! every due task runs to completion, one after another; a failing or
//! panicking task is logged and the loop carries on.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::tasks::Task;

/// When a task should run. All times are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Once `interval` has passed since the last run
    Every(Duration),
    /// Every day at the given time
    DailyAt(NaiveTime),
    /// Every week on the given day and time
    WeeklyAt(Weekday, NaiveTime),
}

impl Trigger {
    /// Whether an occurrence of this trigger falls in `(since, now]`.
    pub fn is_due(&self, now: DateTime<Utc>, since: DateTime<Utc>) -> bool {
        if now <= since {
            return false;
        }
        match *self {
            Trigger::Every(interval) => now - since >= interval,
            Trigger::DailyAt(at) => latest_daily(now, at) > since,
            Trigger::WeeklyAt(day, at) => latest_weekly(now, day, at) > since,
        }
    }
}

/// Most recent `at` that is not after `now`
fn latest_daily(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today - Duration::days(1)
    } else {
        today
    }
}

/// Most recent `day` at `at` that is not after `now`
fn latest_weekly(now: DateTime<Utc>, day: Weekday, at: NaiveTime) -> DateTime<Utc> {
    let days_back = (now.weekday().num_days_from_monday() + 7 - day.num_days_from_monday()) % 7;
    let date = now.date_naive() - Duration::days(days_back as i64);
    let candidate = Utc.from_utc_datetime(&date.and_time(at));
    if candidate > now {
        candidate - Duration::days(7)
    } else {
        candidate
    }
}

struct Entry {
    task: Box<dyn Task>,
    trigger: Trigger,
    last_run: Option<DateTime<Utc>>,
}

/// Outcome of one task execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
}

/// Scheduler runs due tasks sequentially on a fixed tick
pub struct Scheduler {
    entries: Vec<Entry>,
    started_at: DateTime<Utc>,
    tick: std::time::Duration,
    running: bool,
}

impl Scheduler {
    pub fn new(started_at: DateTime<Utc>, tick: std::time::Duration) -> Self {
        Self {
            entries: Vec::new(),
            started_at,
            tick,
            running: false,
        }
    }

    pub fn add(&mut self, task: Box<dyn Task>, trigger: Trigger) -> &mut Self {
        info!("Scheduled task {} ({:?})", task.name(), trigger);
        self.entries.push(Entry {
            task,
            trigger,
            last_run: None,
        });
        self
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.task.name()).collect()
    }

    pub fn last_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .find(|e| e.task.name() == name)
            .and_then(|e| e.last_run)
    }

    /// Names of the tasks due at `now`
    pub fn due(&self, now: DateTime<Utc>) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.trigger.is_due(now, e.last_run.unwrap_or(self.started_at)))
            .map(|e| e.task.name())
            .collect()
    }

    /// Run every task due at `now`, in registration order.
    ///
    /// A task's last run advances to `now` whatever its outcome, so a failed
    /// task retries at its next trigger occurrence.
    pub async fn run_pending(&mut self, now: DateTime<Utc>) -> Vec<(String, RunOutcome)> {
        let started_at = self.started_at;
        let mut outcomes = Vec::new();

        for entry in &mut self.entries {
            let since = entry.last_run.unwrap_or(started_at);
            if !entry.trigger.is_due(now, since) {
                continue;
            }

            let name = entry.task.name().to_string();
            info!("Running task {}", name);
            let clock = Instant::now();

            let outcome = match AssertUnwindSafe(entry.task.run(now)).catch_unwind().await {
                Ok(Ok(())) => {
                    info!("Task {} finished in {:?}", name, clock.elapsed());
                    RunOutcome::Succeeded
                }
                Ok(Err(e)) => {
                    error!("Task {} failed after {:?}: {:#}", name, clock.elapsed(), e);
                    RunOutcome::Failed(format!("{:#}", e))
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Task {} panicked: {}", name, message);
                    RunOutcome::Panicked(message)
                }
            };

            entry.last_run = Some(now);
            outcomes.push((name, outcome));
        }

        outcomes
    }

    /// Run the main loop until `shutdown` turns true or its sender is dropped.
    ///
    /// Shutdown is only observed between ticks: tasks already started on a
    /// tick always run to completion.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.running = true;

        info!("Scheduler started");
        info!("Tick interval: {:?}", self.tick);

        while !*shutdown.borrow() {
            let outcomes = self.run_pending(Utc::now()).await;
            if outcomes.is_empty() {
                debug!("No task due");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed");
                        break;
                    }
                }
            }
        }

        self.running = false;
        info!("Scheduler stopped");
        Ok(())
    }

    /// Check if scheduler is running
    pub fn is_running(&self) -> bool {
        self.running
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        // 2024-06-02 is a Sunday
        Utc.with_ymd_and_hms(2024, 6, day, hour, minute, 0).unwrap()
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_every_trigger() {
        let hourly = Trigger::Every(Duration::hours(1));
        assert!(!hourly.is_due(at(3, 10, 59), at(3, 10, 0)));
        assert!(hourly.is_due(at(3, 11, 0), at(3, 10, 0)));
        assert!(!hourly.is_due(at(3, 10, 0), at(3, 10, 0)));
    }

    #[test]
    fn test_daily_trigger() {
        let daily = Trigger::DailyAt(hm(6, 0));
        assert!(!daily.is_due(at(3, 5, 59), at(3, 0, 0)));
        assert!(daily.is_due(at(3, 6, 0), at(3, 0, 0)));
        assert!(daily.is_due(at(3, 6, 1), at(3, 5, 59)));
        // already ran today
        assert!(!daily.is_due(at(3, 23, 0), at(3, 6, 1)));
        assert!(daily.is_due(at(4, 6, 0), at(3, 6, 1)));
        // missed several days: due once
        assert!(daily.is_due(at(9, 12, 0), at(3, 6, 1)));
    }

    #[test]
    fn test_weekly_trigger() {
        let weekly = Trigger::WeeklyAt(Weekday::Sun, hm(2, 0));
        assert!(!weekly.is_due(at(2, 1, 59), at(1, 12, 0)));
        assert!(weekly.is_due(at(2, 2, 0), at(1, 12, 0)));
        assert!(!weekly.is_due(at(5, 2, 0), at(2, 2, 0)));
        assert!(weekly.is_due(at(9, 2, 30), at(2, 2, 0)));
        assert!(!weekly.is_due(at(9, 1, 0), at(2, 2, 0)));
    }

    struct CountingTask {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        behaviour: Behaviour,
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Fail,
        Panic,
    }

    #[async_trait::async_trait]
    impl Task for CountingTask {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&mut self, _now: DateTime<Utc>) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err(anyhow::anyhow!("upstream unavailable")),
                Behaviour::Panic => panic!("boom"),
            }
        }
    }

    fn task(name: &'static str, behaviour: Behaviour) -> (Box<dyn Task>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = CountingTask {
            name,
            runs: Arc::clone(&runs),
            behaviour,
        };
        (Box::new(task), runs)
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_tasks() {
        let mut scheduler = Scheduler::new(at(3, 0, 0), std::time::Duration::from_secs(60));
        let (failing, failing_runs) = task("failing", Behaviour::Fail);
        let (panicking, panicking_runs) = task("panicking", Behaviour::Panic);
        let (ok, ok_runs) = task("ok", Behaviour::Succeed);
        scheduler
            .add(failing, Trigger::Every(Duration::hours(1)))
            .add(panicking, Trigger::Every(Duration::hours(1)))
            .add(ok, Trigger::Every(Duration::hours(1)));

        let outcomes = scheduler.run_pending(at(3, 1, 0)).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].1, RunOutcome::Failed("upstream unavailable".to_string()));
        assert_eq!(outcomes[1].1, RunOutcome::Panicked("boom".to_string()));
        assert_eq!(outcomes[2].1, RunOutcome::Succeeded);
        assert_eq!(failing_runs.load(Ordering::SeqCst), 1);
        assert_eq!(panicking_runs.load(Ordering::SeqCst), 1);
        assert_eq!(ok_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_task_waits_for_next_occurrence() {
        let mut scheduler = Scheduler::new(at(3, 0, 0), std::time::Duration::from_secs(60));
        let (failing, runs) = task("predict", Behaviour::Fail);
        scheduler.add(failing, Trigger::DailyAt(hm(6, 0)));

        scheduler.run_pending(at(3, 6, 0)).await;
        assert_eq!(scheduler.last_run("predict"), Some(at(3, 6, 0)));

        // next ticks the same day do nothing
        assert!(scheduler.run_pending(at(3, 6, 1)).await.is_empty());
        assert!(scheduler.run_pending(at(3, 12, 0)).await.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        scheduler.run_pending(at(4, 6, 0)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_only_due_tasks_run() {
        let mut scheduler = Scheduler::new(at(1, 12, 0), std::time::Duration::from_secs(60));
        let (ingest, ingest_runs) = task("ingest", Behaviour::Succeed);
        let (train, train_runs) = task("train", Behaviour::Succeed);
        let (predict, predict_runs) = task("predict", Behaviour::Succeed);
        scheduler
            .add(ingest, Trigger::Every(Duration::hours(1)))
            .add(train, Trigger::WeeklyAt(Weekday::Sun, hm(2, 0)))
            .add(predict, Trigger::DailyAt(hm(6, 0)));
        assert_eq!(scheduler.task_names(), vec!["ingest", "train", "predict"]);

        assert_eq!(scheduler.due(at(1, 12, 30)), Vec::<&str>::new());
        assert_eq!(scheduler.due(at(1, 13, 0)), vec!["ingest"]);

        // Sunday 02:00 and then 06:00, one hour-ish ticks
        let mut now = at(1, 13, 0);
        while now <= at(2, 6, 0) {
            scheduler.run_pending(now).await;
            now = now + Duration::hours(1);
        }

        assert_eq!(ingest_runs.load(Ordering::SeqCst), 18);
        assert_eq!(train_runs.load(Ordering::SeqCst), 1);
        assert_eq!(predict_runs.load(Ordering::SeqCst), 1);
    }

    /// Requests shutdown while it is running, then finishes its work
    struct ShutdownDuringRun {
        shutdown: watch::Sender<bool>,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Task for ShutdownDuringRun {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&mut self, _now: DateTime<Utc>) -> Result<()> {
            let _ = self.shutdown.send(true);
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_task() {
        let (tx, rx) = watch::channel(false);
        let finished = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(at(1, 0, 0), std::time::Duration::from_secs(3600));
        scheduler.add(
            Box::new(ShutdownDuringRun {
                shutdown: tx,
                finished: Arc::clone(&finished),
            }),
            Trigger::Every(Duration::minutes(1)),
        );
        assert!(!scheduler.is_running());

        tokio::time::timeout(std::time::Duration::from_secs(5), scheduler.run(rx))
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_nothing() {
        let (tx, rx) = watch::channel(true);
        let mut scheduler = Scheduler::new(at(1, 0, 0), std::time::Duration::from_secs(3600));
        let (ok, runs) = task("ok", Behaviour::Succeed);
        scheduler.add(ok, Trigger::Every(Duration::minutes(1)));

        scheduler.run(rx).await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        drop(tx);
    }
}
