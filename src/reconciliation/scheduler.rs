// Reconciliation Scheduler - fires the monthly reconciliation
//
// Monthly strategy:
// - Fires once per month at a local wall-clock time (default day 1, 00:05)
// - Trigger days past the month end clamp to the last day of the month
// - Local times skipped by a DST jump move forward one hour; repeated
//   local times use the earlier instant
// - No catch-up: after a restart the next fire is always in the future

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

use super::{cycle_key, ReconciliationReport, Reconciler};
use crate::status::{clamp_to_month, today_in};

/// Longest single sleep while waiting for the next fire
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(3600);

/// Wall-clock time of the monthly fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyTrigger {
    day: u32,
    hour: u32,
    minute: u32,
}

impl Default for MonthlyTrigger {
    fn default() -> Self {
        Self {
            day: 1,
            hour: 0,
            minute: 5,
        }
    }
}

impl MonthlyTrigger {
    /// `None` unless day is 1-31, hour 0-23 and minute 0-59
    pub fn new(day: u32, hour: u32, minute: u32) -> Option<Self> {
        ((1..=31).contains(&day) && hour < 24 && minute < 60).then_some(Self { day, hour, minute })
    }

    /// Fire instant of this trigger in the given month
    fn fire_in_month(&self, year: i32, month: u32, tz: Tz) -> Option<DateTime<Utc>> {
        let local = clamp_to_month(year, month, self.day)?.and_hms_opt(self.hour, self.minute, 0)?;
        resolve_local(tz, local)
    }

    /// First fire strictly after `now`
    pub fn next_fire_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local_now = now.with_timezone(&tz);
        let (mut year, mut month) = (local_now.year(), local_now.month());

        // this month's fire may already be behind us, next month's never is
        for _ in 0..2 {
            if let Some(fire) = self.fire_in_month(year, month, tz) {
                if fire > now {
                    return Some(fire);
                }
            }
            (year, month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        }
        None
    }

    /// Latest fire at or before `now`
    pub fn last_fire_at_or_before(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local_now = now.with_timezone(&tz);
        let (mut year, mut month) = (local_now.year(), local_now.month());

        for _ in 0..2 {
            if let Some(fire) = self.fire_in_month(year, month, tz) {
                if fire <= now {
                    return Some(fire);
                }
            }
            (year, month) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
        }
        None
    }
}

/// Map a local wall-clock time to UTC across DST transitions
fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(local + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Result of asking the scheduler to fire
#[derive(Debug)]
pub enum FireOutcome {
    /// A run was already in flight; this fire was discarded
    Dropped,
    Completed(ReconciliationReport),
    Failed(String),
}

/// Source of the current instant
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Marks the scheduler Running for as long as it lives
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciliation scheduler - runs the reconciler once per monthly cycle
pub struct ReconciliationScheduler {
    reconciler: Arc<Reconciler>,
    trigger: MonthlyTrigger,
    timezone: Tz,
    clock: Clock,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReconciliationScheduler {
    pub fn new(reconciler: Arc<Reconciler>, trigger: MonthlyTrigger, timezone: Tz) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            reconciler,
            trigger,
            timezone,
            clock: Arc::new(Utc::now),
            running: AtomicBool::new(false),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Start the scheduler loop in the background
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            warn!("⚠️  Reconciliation scheduler already started");
            return;
        }

        let scheduler = self.clone();
        let shutdown = self.shutdown.subscribe();
        *handle = Some(tokio::spawn(async move {
            scheduler.run_loop(shutdown).await
        }));

        info!(
            "🗓️  Reconciliation scheduler started (day {} at {:02}:{:02} {})",
            self.trigger.day, self.trigger.hour, self.trigger.minute, self.timezone
        );
    }

    /// Signal the loop to exit and wait for it
    ///
    /// A run already in flight finishes first.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("❌ Reconciliation scheduler task ended abnormally: {}", e);
            }
            info!("🛑 Reconciliation scheduler stopped");
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.trigger.next_fire_after(self.now(), self.timezone)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn trigger(&self) -> MonthlyTrigger {
        self.trigger
    }

    /// Reconcile the cycle of the latest scheduled fire that has passed
    ///
    /// Before this month's fire time the previous month's cycle is used, so a
    /// manual run never reconciles a cycle ahead of the schedule.
    pub async fn run_now(&self) -> FireOutcome {
        let Some(fire) = self.trigger.last_fire_at_or_before(self.now(), self.timezone) else {
            return FireOutcome::Failed("could not compute the current cycle".to_string());
        };
        let cycle = cycle_key(today_in(self.timezone, fire));
        self.fire(&cycle).await
    }

    /// Run one reconciliation for `cycle` unless one is already running
    pub async fn fire(&self, cycle: &str) -> FireOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            warn!("⚠️  Reconciliation already running, dropping fire for {}", cycle);
            return FireOutcome::Dropped;
        };

        match self.reconciler.run_cycle(cycle).await {
            Ok(report) => FireOutcome::Completed(report),
            Err(e) => {
                error!("❌ Reconciliation of cycle {} failed: {}", cycle, e);
                FireOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let Some(next) = self.next_fire() else {
                error!("❌ Could not compute next reconciliation time, scheduler exiting");
                return;
            };

            info!(
                "⏰ Next reconciliation scheduled for: {}",
                next.with_timezone(&self.timezone).format("%Y-%m-%d %H:%M %Z")
            );

            loop {
                let remaining = next.signed_duration_since(self.now());
                if remaining <= chrono::Duration::zero() {
                    break;
                }

                let slice = remaining.to_std().unwrap_or_default().min(MAX_SLEEP_SLICE);
                tokio::select! {
                    _ = tokio::time::sleep(slice) => {}
                    _ = shutdown.changed() => return,
                }
            }

            // the cycle belongs to the scheduled instant, not to when we woke up
            let cycle = cycle_key(today_in(self.timezone, next));
            info!("🔄 Starting reconciliation cycle {}", cycle);

            // a panicking run must not take the loop down with it
            let scheduler = self.clone();
            let run = tokio::spawn(async move { scheduler.fire(&cycle).await });
            match run.await {
                Ok(FireOutcome::Completed(report)) => info!(
                    "✓ Reconciliation cycle {} completed ({:?})",
                    report.cycle, report.outcome
                ),
                Ok(_) => {}
                Err(e) => error!("❌ Reconciliation task panicked: {}", e),
            }
        }
    }
}
