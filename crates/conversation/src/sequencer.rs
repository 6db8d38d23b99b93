//! Staging of the transient "thinking" UI between dispatch and reply.
//!
//! Timers run as tokio tasks but never touch the UI themselves: each firing is
//! delivered as a [`TimerTick`] to a sink, and the owner hands it back to
//! [`LoadingSequencer::accept`] on its own thread. A tick whose sequence is no
//! longer active is dropped there, so nothing can surface after
//! [`LoadingSequencer::cancel_all`] even if a task fired just before it was
//! aborted.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{ModeProfile, SecondsRange, StatusLinePolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::status_lines::StatusPool;

/// Receives timer firings; must not block.
pub type TickSink = Arc<dyn Fn(TimerTick) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Placeholder,
    /// Repeating status line; the pool is chosen on acceptance
    StatusInterval,
    /// One-shot status line from a fixed pool
    StatusShot(StatusPool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub sequence: u64,
    pub kind: TimerKind,
}

/// What the owner should show for an accepted tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingCue {
    Placeholder,
    StatusLine { pool: StatusPool, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Scheduled {
        placeholder_pending: bool,
        status_pending: bool,
    },
}

pub struct LoadingSequencer {
    placeholder_delay: Duration,
    policy: StatusLinePolicy,
    sink: TickSink,
    timers: Vec<JoinHandle<()>>,
    sequence: u64,
    active: bool,
    placeholder_shown: bool,
    shots_shown: u8,
    last_pool: Option<StatusPool>,
    rng: StdRng,
}

impl LoadingSequencer {
    pub fn new(placeholder_delay: Duration, policy: StatusLinePolicy, sink: TickSink) -> Self {
        Self::with_rng(placeholder_delay, policy, sink, StdRng::from_entropy())
    }

    /// Deterministic line selection and timer offsets.
    pub fn with_seed(
        placeholder_delay: Duration,
        policy: StatusLinePolicy,
        sink: TickSink,
        seed: u64,
    ) -> Self {
        Self::with_rng(placeholder_delay, policy, sink, StdRng::seed_from_u64(seed))
    }

    pub fn for_profile(profile: &ModeProfile, sink: TickSink) -> Self {
        Self::new(profile.placeholder_delay, profile.status_lines, sink)
    }

    fn with_rng(
        placeholder_delay: Duration,
        policy: StatusLinePolicy,
        sink: TickSink,
        rng: StdRng,
    ) -> Self {
        Self {
            placeholder_delay,
            policy,
            sink,
            timers: Vec::new(),
            sequence: 0,
            active: false,
            placeholder_shown: false,
            shots_shown: 0,
            last_pool: None,
            rng,
        }
    }

    /// Schedule the timers for a new request and return its sequence number.
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin(&mut self) -> u64 {
        if self.active {
            tracing::warn!(
                sequence = self.sequence,
                "loading sequence superseded before teardown"
            );
            self.cancel_all();
        }

        self.sequence += 1;
        self.active = true;
        self.placeholder_shown = false;
        self.shots_shown = 0;
        self.last_pool = None;

        let placeholder = self.schedule_once(self.placeholder_delay, TimerKind::Placeholder);
        self.timers.push(placeholder);

        match self.policy {
            StatusLinePolicy::Interval(range) => {
                let period = self.draw(range);
                let interval = self.schedule_every(period);
                self.timers.push(interval);
            }
            StatusLinePolicy::TwoShot(range) => {
                let first = self.draw(range);
                let second = first + self.draw(range);
                let a = self.schedule_once(first, TimerKind::StatusShot(StatusPool::Formulating));
                let b = self.schedule_once(second, TimerKind::StatusShot(StatusPool::Executing));
                self.timers.push(a);
                self.timers.push(b);
            }
            StatusLinePolicy::Suppressed => {}
        }

        tracing::debug!(
            sequence = self.sequence,
            timers = self.timers.len(),
            "loading sequence scheduled"
        );
        self.sequence
    }

    /// Abort every outstanding timer. Idempotent; returns how many timer
    /// tasks were torn down.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.timers.len();
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        if self.active {
            tracing::debug!(sequence = self.sequence, cancelled, "loading sequence cancelled");
        }
        self.active = false;
        cancelled
    }

    /// Turn a delivered tick into a UI cue, or `None` if it is stale.
    pub fn accept(&mut self, tick: TimerTick) -> Option<LoadingCue> {
        if !self.active || tick.sequence != self.sequence {
            tracing::debug!(
                tick = tick.sequence,
                active = self.sequence,
                "dropping stale loading tick"
            );
            return None;
        }

        match tick.kind {
            TimerKind::Placeholder => {
                if self.placeholder_shown {
                    return None;
                }
                self.placeholder_shown = true;
                Some(LoadingCue::Placeholder)
            }
            TimerKind::StatusInterval => {
                let pool = self
                    .last_pool
                    .map(|p| p.other())
                    .unwrap_or(StatusPool::Formulating);
                Some(self.status_line(pool))
            }
            TimerKind::StatusShot(pool) => {
                if self.shots_shown >= 2 {
                    return None;
                }
                self.shots_shown += 1;
                Some(self.status_line(pool))
            }
        }
    }

    pub fn state(&self) -> SequencerState {
        if !self.active {
            return SequencerState::Idle;
        }
        let status_pending = match self.policy {
            StatusLinePolicy::Interval(_) => true,
            StatusLinePolicy::TwoShot(_) => self.shots_shown < 2,
            StatusLinePolicy::Suppressed => false,
        };
        SequencerState::Scheduled {
            placeholder_pending: !self.placeholder_shown,
            status_pending,
        }
    }

    fn status_line(&mut self, pool: StatusPool) -> LoadingCue {
        self.last_pool = Some(pool);
        LoadingCue::StatusLine {
            pool,
            text: pool.pick(&mut self.rng).to_string(),
        }
    }

    fn draw(&mut self, range: SecondsRange) -> Duration {
        let range = range.normalized();
        Duration::from_secs(self.rng.gen_range(range.min..=range.max))
    }

    fn schedule_once(&self, delay: Duration, kind: TimerKind) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let tick = TimerTick {
            sequence: self.sequence,
            kind,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink(tick);
        })
    }

    fn schedule_every(&self, period: Duration) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let tick = TimerTick {
            sequence: self.sequence,
            kind: TimerKind::StatusInterval,
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                sink(tick);
            }
        })
    }
}

impl Drop for LoadingSequencer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
