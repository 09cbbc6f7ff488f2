// src/scheduler.rs
//! # Scheduler
//! Fires aggregation cycles at configured times of day (process-local time).
//!
//! Polls on a coarse ticker; an entry fires on the first tick at or after its
//! minute and at most once per calendar day. The last-fired-date table is
//! owned by the scheduler alone.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cycle::{Aggregator, Trigger};

/// Daily fire time, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleEntry {
    time: NaiveTime,
}

impl ScheduleEntry {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|time| Self { time })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day `{0}`, expected HH:MM")]
pub struct InvalidScheduleEntry(String);

impl FromStr for ScheduleEntry {
    type Err = InvalidScheduleEntry;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let (h, m) = t
            .split_once(':')
            .ok_or_else(|| InvalidScheduleEntry(s.to_string()))?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(InvalidScheduleEntry(s.to_string()));
        }
        let hour: u32 = h.parse().map_err(|_| InvalidScheduleEntry(s.to_string()))?;
        let minute: u32 = m.parse().map_err(|_| InvalidScheduleEntry(s.to_string()))?;
        Self::new(hour, minute).ok_or_else(|| InvalidScheduleEntry(s.to_string()))
    }
}

impl TryFrom<String> for ScheduleEntry {
    type Error = InvalidScheduleEntry;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ScheduleEntry> for String {
    fn from(e: ScheduleEntry) -> Self {
        e.to_string()
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.time.hour(), self.time.minute())
    }
}

/// Pure due-computation over a fixed entry list.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    entries: Vec<ScheduleEntry>,
    last_fired: Vec<Option<NaiveDate>>,
    /// Time of the previous `prime`/`due` call.
    last_check: Option<NaiveDateTime>,
}

impl DailySchedule {
    /// Entries are sorted and deduplicated.
    pub fn new(mut entries: Vec<ScheduleEntry>) -> Self {
        entries.sort();
        entries.dedup();
        let last_fired = vec![None; entries.len()];
        Self {
            entries,
            last_fired,
            last_check: None,
        }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Mark every entry already behind `now` as fired today, so that a start
    /// at 20:00 waits for tomorrow's 08:00 instead of replaying the day.
    pub fn prime(&mut self, now: NaiveDateTime) {
        let today = now.date();
        for (entry, fired) in self.entries.iter().zip(self.last_fired.iter_mut()) {
            if now.time() >= entry.time {
                *fired = Some(today);
            }
        }
        self.last_check = Some(now);
    }

    /// Entries due at `now`; each returned entry is recorded as fired for the
    /// day of its occurrence. An occurrence that fell between the previous
    /// check and midnight is still due after the date rolls over.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<ScheduleEntry> {
        let today = now.date();
        let last_check = self.last_check.replace(now);
        let mut out = Vec::new();
        for (entry, fired) in self.entries.iter().zip(self.last_fired.iter_mut()) {
            let day = if now.time() >= entry.time {
                today
            } else {
                match today.pred_opt() {
                    Some(d) => d,
                    None => continue,
                }
            };
            let missed = match last_check {
                Some(prev) => day.and_time(entry.time) > prev,
                None => day == today,
            };
            if missed && *fired != Some(day) {
                *fired = Some(day);
                out.push(*entry);
            }
        }
        out
    }

    /// Next instant an entry becomes due, for logging.
    pub fn next_fire(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let today = now.date();
        let pending_today = self
            .entries
            .iter()
            .zip(&self.last_fired)
            .filter(|(_, fired)| **fired != Some(today))
            .map(|(e, _)| today.and_time(e.time))
            .min();
        pending_today.or_else(|| {
            let first = self.entries.first()?;
            Some(today.succ_opt()?.and_time(first.time))
        })
    }
}

/// Source of "now" in process-local wall time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn local_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

pub struct Scheduler {
    schedule: DailySchedule,
    aggregator: Arc<Aggregator>,
    tick: Duration,
    clock: Clock,
}

impl Scheduler {
    pub fn new(entries: Vec<ScheduleEntry>, aggregator: Arc<Aggregator>, tick: Duration) -> Self {
        Self {
            schedule: DailySchedule::new(entries),
            aggregator,
            tick,
            clock: local_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs until `shutdown` is cancelled. A cycle that has started is allowed
    /// to finish before the loop observes cancellation.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let start = (self.clock)();
        self.schedule.prime(start);
        info!(
            entries = ?self.schedule.entries().iter().map(ToString::to_string).collect::<Vec<_>>(),
            tick_secs = self.tick.as_secs(),
            next = ?self.schedule.next_fire(start),
            "scheduler starting"
        );

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("scheduler shutting down");
                    break;
                }

                _ = ticker.tick() => {}
            }

            let now = (self.clock)();
            let due = self.schedule.due(now);
            if due.is_empty() {
                debug!(next = ?self.schedule.next_fire(now), "scheduler waiting");
                continue;
            }

            for entry in due {
                self.fire(entry).await;
            }
        }
    }

    async fn fire(&self, entry: ScheduleEntry) {
        info!(entry = %entry, "scheduled cycle firing");
        match self.aggregator.run_isolated(Trigger::Scheduled(entry)).await {
            Ok(report) => {
                if let Err(e) = &report.delivery {
                    warn!(entry = %entry, cycle_id = report.id, error = %e, "scheduled digest not delivered");
                }
            }
            Err(e) => {
                error!(entry = %entry, error = %e, "scheduled cycle aborted; schedule continues");
            }
        }
    }
}
