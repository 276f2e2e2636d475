//! An in-memory PWM channel for running servo logic on the host.
//!
//! [`HostPwm`] records every configuration it accepts and can be scripted to fail or to
//! take time per apply. A cloned [`HostPwmProbe`] watches it after the sink has been moved
//! into a controller.
#![cfg(feature = "host")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use derive_more::Display;

use crate::pwm::{PwmSink, PwmState};

/// Error a [`HostPwm`] reports for a scripted failure.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display("host PWM rejected {duty_cycle_ns} ns")]
pub struct HostPwmError {
    /// Duty cycle of the rejected configuration (ns).
    pub duty_cycle_ns: u32,
}

impl core::error::Error for HostPwmError {}

#[derive(Default)]
struct HostPwmLog {
    applied: Vec<PwmState>,
    attempts: usize,
    fail_next: usize,
    fail_always: bool,
}

#[derive(Default)]
struct HostPwmShared {
    log: Mutex<HostPwmLog>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl HostPwmShared {
    fn log(&self) -> MutexGuard<'_, HostPwmLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory PWM channel.
///
/// # Example
///
/// ```
/// use servo_envoy::pwm::{PwmSink, PwmState};
/// use servo_envoy::pwm_host::HostPwm;
///
/// let mut pwm = HostPwm::new();
/// let probe = pwm.probe();
///
/// pwm.apply(&PwmState::enabled(1_000_000, 2_000_000))?;
/// probe.fail_next(1);
/// assert!(pwm.apply(&PwmState::enabled(1_500_000, 2_000_000)).is_err());
///
/// assert_eq!(probe.current(), Some(PwmState::enabled(1_000_000, 2_000_000)));
/// assert_eq!(probe.attempts(), 2);
/// # Ok::<(), servo_envoy::pwm_host::HostPwmError>(())
/// ```
pub struct HostPwm {
    shared: Arc<HostPwmShared>,
    period_ns: Option<u32>,
    settle: Option<Duration>,
}

impl HostPwm {
    /// A channel that reports no period of its own.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(HostPwmShared::default()),
            period_ns: None,
            settle: None,
        }
    }

    /// Report `period_ns` as the channel's current period.
    #[must_use]
    pub fn with_period_ns(mut self, period_ns: u32) -> Self {
        self.period_ns = Some(period_ns);
        self
    }

    /// Sleep for `settle` inside every apply, like hardware that waits for a period edge.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = Some(settle);
        self
    }

    /// A handle for inspecting and scripting this channel.
    #[must_use]
    pub fn probe(&self) -> HostPwmProbe {
        HostPwmProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for HostPwm {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmSink for HostPwm {
    type Error = HostPwmError;

    fn period_ns(&self) -> Option<u32> {
        self.period_ns
    }

    fn apply(&mut self, state: &PwmState) -> Result<(), Self::Error> {
        let in_flight = self
            .shared
            .in_flight
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        self.shared
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if let Some(settle) = self.settle {
            thread::sleep(settle);
        }

        let result = {
            let mut log = self.shared.log();
            log.attempts = log.attempts.saturating_add(1);
            if log.fail_always || log.fail_next > 0 {
                log.fail_next = log.fail_next.saturating_sub(1);
                Err(HostPwmError {
                    duty_cycle_ns: state.duty_cycle_ns,
                })
            } else {
                log.applied.push(*state);
                Ok(())
            }
        };

        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Shared view of a [`HostPwm`].
#[derive(Clone)]
pub struct HostPwmProbe {
    shared: Arc<HostPwmShared>,
}

impl HostPwmProbe {
    /// The configuration the channel currently runs with.
    #[must_use]
    pub fn current(&self) -> Option<PwmState> {
        self.shared.log().applied.last().copied()
    }

    /// Every accepted configuration, oldest first.
    #[must_use]
    pub fn applied(&self) -> Vec<PwmState> {
        self.shared.log().applied.clone()
    }

    /// Number of apply calls, accepted or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.shared.log().attempts
    }

    /// Reject the next `count` applies.
    pub fn fail_next(&self, count: usize) {
        self.shared.log().fail_next = count;
    }

    /// Reject every apply until switched back off.
    pub fn set_failing(&self, failing: bool) {
        self.shared.log().fail_always = failing;
    }

    /// Number of applies running right now.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Largest number of applies that were ever running at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }
}
