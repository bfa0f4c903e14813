//! Periodic job scheduling with an injectable clock.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BotError;

const SECONDS_PER_HOUR: i64 = 3600;
const HALF_HOUR: i64 = 1800;

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> OffsetDateTime;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    /// Clock frozen at `now`.
    pub fn new(now: OffsetDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Jump to `now`.
    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// When a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed period.
    Every(Duration),
    /// Once an hour, this long before the hour turns.
    HourlyBefore(Duration),
    /// Fixed period, but only in the second half of each hour.
    HalfHourGated(Duration),
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Every(d) => write!(f, "every {}ms", d.as_millis()),
            Schedule::HourlyBefore(d) => write!(f, "hourly, {}s before the hour", d.as_secs()),
            Schedule::HalfHourGated(d) => write!(f, "every {}s in the second half-hour", d.as_secs()),
        }
    }
}

fn position_in_hour(now: OffsetDateTime) -> time::Duration {
    time::Duration::seconds(now.unix_timestamp().rem_euclid(SECONDS_PER_HOUR))
        + time::Duration::nanoseconds(i64::from(now.nanosecond()))
}

impl Schedule {
    /// Time to sleep from `now` until the next run.
    pub fn delay_until_next(&self, now: OffsetDateTime) -> Duration {
        match *self {
            Schedule::Every(period) | Schedule::HalfHourGated(period) => period,
            Schedule::HourlyBefore(offset) => {
                let hour = time::Duration::seconds(SECONDS_PER_HOUR);
                let target = hour - offset;
                let mut delay = target - position_in_hour(now);
                if delay <= time::Duration::ZERO {
                    delay += hour;
                }
                delay.unsigned_abs()
            }
        }
    }

    /// Whether a run that woke at `now` should go ahead.
    pub fn should_fire(&self, now: OffsetDateTime) -> bool {
        match self {
            Schedule::HalfHourGated(_) => now.unix_timestamp().rem_euclid(SECONDS_PER_HOUR) >= HALF_HOUR,
            _ => true,
        }
    }
}

/// Run `job` on `schedule` until `cancel` fires.
///
/// A failed run is logged and the loop carries on.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    schedule: Schedule,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    mut job: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<(), BotError>> + Send,
{
    info!(job = name, schedule = %schedule, "Scheduler started");
    loop {
        let delay = schedule.delay_until_next(clock.now());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        if !schedule.should_fire(clock.now()) {
            debug!(job = name, "Outside firing window");
            continue;
        }
        if let Err(e) = job().await {
            warn!(job = name, error = %e, "Scheduled job failed");
        }
    }
    info!(job = name, "Scheduler stopped");
}
