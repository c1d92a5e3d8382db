//! Countdown against an authoritative deadline.
//!
//! The remaining time is always recomputed from the stored absolute deadline, never by
//! decrementing a counter, so late ticks or a suspended process correct themselves on the
//! next reading.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Remaining time split for display. Whole seconds are floored, so half a second past the
/// deadline is already `-00:00:01`; the sign is then kept apart from the segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentedTime {
    pub negative: bool,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl SegmentedTime {
    pub fn from_remaining(remaining: TimeDelta) -> Self {
        let floored = remaining.num_milliseconds().div_euclid(1000);
        let total_secs = floored.abs();
        Self {
            negative: floored < 0,
            days: total_secs / 86_400,
            hours: total_secs / 3_600 % 24,
            minutes: total_secs / 60 % 60,
            seconds: total_secs % 60,
        }
    }
}

impl fmt::Display for SegmentedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        if self.days > 0 {
            write!(f, "{}d ", self.days)?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// One beat of a running countdown. `clock_id` identifies which reconciler scheduled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub clock_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockUpdate {
    Running(SegmentedTime),
    /// Emitted once, on the first non-positive reading.
    Expired(SegmentedTime),
    /// The clock already expired or was stopped.
    Idle,
}

/// Owned handle to the repeating tick task. Cancelled on `cancel` or drop.
#[derive(Debug)]
pub struct TickSubscription {
    cancel: CancellationToken,
}

impl TickSubscription {
    pub fn spawn(clock_id: u64, tx: mpsc::Sender<ClockTick>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(ClockTick { clock_id }).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::trace!(clock_id, "tick task finished");
        });
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TickSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
pub struct ClockReconciler {
    id: u64,
    deadline: DateTime<Utc>,
    remaining: TimeDelta,
    expired: bool,
    subscription: Option<TickSubscription>,
}

impl ClockReconciler {
    /// Take the first reading immediately. A tick task is only scheduled when `ticks` is
    /// given and the deadline is still ahead.
    pub fn start(
        id: u64,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
        ticks: Option<&mpsc::Sender<ClockTick>>,
    ) -> (Self, ClockUpdate) {
        let mut clock = Self {
            id,
            deadline,
            remaining: deadline - now,
            expired: false,
            subscription: None,
        };
        let update = clock.recompute(now);
        if !clock.expired {
            if let Some(tx) = ticks {
                clock.subscription = Some(TickSubscription::spawn(id, tx.clone()));
            }
        }
        (clock, update)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn remaining(&self) -> SegmentedTime {
        SegmentedTime::from_remaining(self.remaining)
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn is_ticking(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> ClockUpdate {
        if self.expired {
            return ClockUpdate::Idle;
        }
        self.recompute(now)
    }

    /// Swap in a new deadline and read it without waiting for the next tick.
    /// An expired reconciler stays expired.
    pub fn reset(&mut self, deadline: DateTime<Utc>, now: DateTime<Utc>) -> ClockUpdate {
        if self.expired {
            return ClockUpdate::Idle;
        }
        tracing::debug!(clock_id = self.id, old = %self.deadline, new = %deadline, "deadline replaced");
        self.deadline = deadline;
        self.recompute(now)
    }

    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    fn recompute(&mut self, now: DateTime<Utc>) -> ClockUpdate {
        self.remaining = self.deadline - now;
        let segments = SegmentedTime::from_remaining(self.remaining);
        if self.remaining <= TimeDelta::zero() {
            self.expired = true;
            self.stop();
            ClockUpdate::Expired(segments)
        } else {
            ClockUpdate::Running(segments)
        }
    }
}
