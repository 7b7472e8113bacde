//! Scoped one-shot timers
//!
//! Every timed entity in this crate owns its own [`OneShotTimer`]: a cell
//! owns its liveness timer, the setup-request procedure owns the T300 guard,
//! the failure-report builder owns the T304 mobility window. Timers are
//! evaluated cooperatively against `Instant::now()` when queried; there is no
//! background thread and no callback registration.
//!
//! # Timer roles
//!
//! - **T300**: connection establishment guard. Started when the setup
//!   request is sent, stopped when the network answers, declared failed on
//!   expiry.
//! - **T304**: mobility command window. Started when a mobility command
//!   arrives, consulted by the failure-report builder.
//! - **Neighbour liveness**: restarted on every RSRP report for a cell; a
//!   cell whose timer has fired is stale and eligible for pruning.

use std::fmt;
use std::time::{Duration, Instant};

/// Timer code for T300 (connection establishment guard).
pub const TIMER_T300: u16 = 300;
/// Timer code for T304 (mobility command window).
pub const TIMER_T304: u16 = 304;

/// A single-shot countdown timer owned by the entity it measures.
///
/// The timer is in one of three observable conditions:
/// - **idle**: never started, or explicitly stopped
/// - **running**: started and the deadline has not yet passed
/// - **expired**: started and the deadline has passed without a stop
///
/// Stopping an expired timer clears the expired condition; callers that care
/// about the distinction must query [`has_expired`](Self::has_expired)
/// before stopping.
#[derive(Debug, Clone)]
pub struct OneShotTimer {
    /// Short label used in logs (e.g. "T300")
    name: &'static str,
    /// Countdown interval
    interval: Duration,
    /// Some while armed; cleared by `stop`
    started_at: Option<Instant>,
}

impl OneShotTimer {
    /// Creates an idle timer with the given label and interval.
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            started_at: None,
        }
    }

    /// Reconfigures the countdown interval without starting the timer.
    ///
    /// A running timer keeps its original deadline until restarted.
    pub fn set(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Arms (or re-arms) the timer from now.
    pub fn run(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Disarms the timer. Clears any expired condition.
    pub fn stop(&mut self) {
        if self.started_at.take().is_some() {
            tracing::trace!("{} stopped", self.name);
        }
    }

    /// Returns true while the timer is armed and the deadline has not passed.
    pub fn is_running(&self) -> bool {
        self.started_at
            .is_some_and(|started| started.elapsed() < self.interval)
    }

    /// Returns true once the deadline has passed without an intervening stop.
    pub fn has_expired(&self) -> bool {
        self.started_at
            .is_some_and(|started| started.elapsed() >= self.interval)
    }

    /// Time elapsed since the timer was last armed, zero when idle.
    pub fn time_elapsed(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Remaining time until the deadline, zero when idle or expired.
    pub fn remaining(&self) -> Duration {
        match self.started_at {
            Some(started) => self.interval.saturating_sub(started.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// The configured countdown interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The label this timer logs under.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for OneShotTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_running() {
            write!(
                f,
                "{}: rem[{}ms] int[{}ms]",
                self.name,
                self.remaining().as_millis(),
                self.interval.as_millis()
            )
        } else if self.has_expired() {
            write!(f, "{}: expired", self.name)
        } else {
            write!(f, "{}: .", self.name)
        }
    }
}
