//! Timer loop driving the batch jobs.
//!
//! Jobs run one after another on the calling thread, so neither job can
//! overlap itself or the other. A job's next due time is computed from the
//! moment it finished; occurrences that fell inside a long run are dropped.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::service::TicketService;
use crate::store::{ActorDirectory, TicketStore};

/// Longest single sleep while waiting for the next poll.
const SLEEP_SLICE: std::time::Duration = std::time::Duration::from_millis(250);

/// Timing for the scheduled jobs, built from `[scheduler]` in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub sweep_every: Duration,
    pub auto_close_at: NaiveTime,
    pub auto_close_after_days: i64,
    pub poll_interval: std::time::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Every(Duration),
    /// Once a day at a UTC wall-clock time.
    DailyAt(NaiveTime),
}

impl Cadence {
    fn first_due(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Cadence::Every(_) => start,
            Cadence::DailyAt(at) => {
                let today = start.date_naive().and_time(at).and_utc();
                if today >= start {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
        }
    }

    fn next_after(&self, finished: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Cadence::Every(interval) => finished + interval,
            Cadence::DailyAt(at) => {
                let today = finished.date_naive().and_time(at).and_utc();
                if today > finished {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
        }
    }

    fn period(&self) -> Duration {
        match *self {
            Cadence::Every(interval) => interval,
            Cadence::DailyAt(_) => Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    SlaSweep,
    AutoClose,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::SlaSweep => write!(f, "sla-sweep"),
            Job::AutoClose => write!(f, "auto-close"),
        }
    }
}

#[derive(Debug)]
struct JobTimer {
    job: Job,
    cadence: Cadence,
    next_due: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Scheduler {
    timers: Vec<JobTimer>,
    auto_close_after_days: i64,
    poll_interval: std::time::Duration,
}

impl Scheduler {
    pub fn new(schedule: &Schedule, start: DateTime<Utc>) -> Self {
        let timers = vec![
            JobTimer {
                job: Job::SlaSweep,
                cadence: Cadence::Every(schedule.sweep_every),
                next_due: Cadence::Every(schedule.sweep_every).first_due(start),
            },
            JobTimer {
                job: Job::AutoClose,
                cadence: Cadence::DailyAt(schedule.auto_close_at),
                next_due: Cadence::DailyAt(schedule.auto_close_at).first_due(start),
            },
        ];

        Scheduler {
            timers,
            auto_close_after_days: schedule.auto_close_after_days,
            poll_interval: schedule.poll_interval,
        }
    }

    pub fn next_due(&self, job: Job) -> Option<DateTime<Utc>> {
        self.timers.iter().find(|t| t.job == job).map(|t| t.next_due)
    }

    /// Run every job due at `now`, in order. Returns the jobs that ran.
    pub fn tick<S, C>(&mut self, service: &TicketService<S, C>, now: DateTime<Utc>) -> Vec<Job>
    where
        S: TicketStore + ActorDirectory,
        C: Clock,
    {
        let mut ran = Vec::new();

        for timer in &mut self.timers {
            if now < timer.next_due {
                continue;
            }

            let outcome = match timer.job {
                Job::SlaSweep => service.run_sla_sweep().map(|_| ()),
                Job::AutoClose => service
                    .run_auto_close(self.auto_close_after_days)
                    .map(|_| ()),
            };
            if let Err(e) = outcome {
                error!(job = %timer.job, error = %e, "scheduled job failed");
            }

            let finished = service.clock().now().max(now);
            let period_ms = timer.cadence.period().num_milliseconds().max(1);
            let missed = (finished - timer.next_due).num_milliseconds() / period_ms;
            if missed > 0 {
                warn!(job = %timer.job, missed, "skipped missed runs");
            }

            timer.next_due = timer.cadence.next_after(finished);
            ran.push(timer.job);
        }

        ran
    }

    /// Poll until `shutdown` is set. Job failures are logged, never fatal.
    pub fn run<S, C>(&mut self, service: &TicketService<S, C>, shutdown: &AtomicBool)
    where
        S: TicketStore + ActorDirectory,
        C: Clock,
    {
        info!(
            sweep_due = ?self.next_due(Job::SlaSweep),
            auto_close_due = ?self.next_due(Job::AutoClose),
            "scheduler started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            let now = service.clock().now();
            self.tick(service, now);

            let mut waited = std::time::Duration::ZERO;
            while waited < self.poll_interval && !shutdown.load(Ordering::SeqCst) {
                let slice = SLEEP_SLICE.min(self.poll_interval - waited);
                thread::sleep(slice);
                waited += slice;
            }
        }

        info!("scheduler stopped");
    }
}
