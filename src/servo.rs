//! A device abstraction for a positional servo on one PWM channel.
//!
//! See [`AngleController`] for the commit protocol and a usage example.

use lock_api::{Mutex, RawMutex};
use portable_atomic::{AtomicU16, Ordering};

use crate::calibration::CalibrationParams;
use crate::pwm::{PwmSink, PwmState};
use crate::{ConfigError, Error, Result};

/// The committed state of a servo: the angle and the configuration that produced it.
///
/// `pwm.duty_cycle_ns` is always the duty cycle of `angle` under the controller's
/// calibration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoState {
    /// Last successfully committed setpoint.
    pub angle: u16,
    /// Configuration last written to the channel.
    pub pwm: PwmState,
}

/// The lock each controller owns unless told otherwise.
///
/// A spin lock that yields to the scheduler on `std` and busy-waits on bare metal. Every
/// controller gets its own, so a slow channel only holds up callers of that servo. On
/// target, do not take it from an interrupt that can preempt a holder.
#[cfg(feature = "std")]
pub type ServoRawMutex = spin::mutex::SpinMutex<(), spin::relax::Yield>;

/// The lock each controller owns unless told otherwise.
///
/// A spin lock that busy-waits. Every controller gets its own, so a slow channel only holds
/// up callers of that servo. Do not take it from an interrupt that can preempt a holder.
#[cfg(not(feature = "std"))]
pub type ServoRawMutex = spin::mutex::SpinMutex<()>;

struct ServoCore<S> {
    sink: S,
    state: ServoState,
}

/// Owns one servo's PWM channel and serializes every change to it.
///
/// `set_angle` validates the setpoint, computes the duty cycle, then, under the
/// controller's lock, applies the configuration to the sink and commits it. A failed apply
/// commits nothing. Readers never see an angle whose duty cycle has not been applied.
///
/// The lock is a [`lock_api::Mutex`] over any [`lock_api::RawMutex`], owned by this
/// controller. The default [`ServoRawMutex`] lets a controller be shared between threads.
/// The lock is held across the sink's apply call: a slow sink delays callers of this
/// servo, never of another one.
///
/// # Example
///
/// ```
/// use servo_envoy::calibration::CalibrationParams;
/// use servo_envoy::pwm_host::HostPwm;
/// use servo_envoy::servo::AngleController;
///
/// let pwm = HostPwm::new();
/// let probe = pwm.probe();
/// let servo: AngleController<HostPwm> = AngleController::new(CalibrationParams::default(), pwm)?;
///
/// servo.set_angle(87)?;
/// assert_eq!(servo.get_angle(), 87);
/// assert_eq!(probe.current().map(|pwm| pwm.duty_cycle_ns), Some(1_494_285));
///
/// // Out of range: rejected before touching the channel.
/// assert!(servo.set_angle(176).is_err());
/// assert_eq!(servo.get_angle(), 87);
/// # Ok::<(), servo_envoy::Error<servo_envoy::pwm_host::HostPwmError>>(())
/// ```
pub struct AngleController<S, M: RawMutex = ServoRawMutex> {
    params: CalibrationParams,
    period_ns: u32,
    angle: AtomicU16,
    core: Mutex<M, ServoCore<S>>,
}

impl<S: PwmSink, M: RawMutex> AngleController<S, M> {
    /// Build a controller and commit the calibration's initial angle to `sink`.
    ///
    /// The period is the calibration's fixed period, else the sink's reported period, else
    /// the calibration's fallback period. The initial commit must succeed; otherwise no
    /// controller exists and the sink is dropped.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `duty_max` does not fit the resolved period, or
    /// [`Error::HardwareApply`] if the initial apply fails.
    pub fn new(params: CalibrationParams, mut sink: S) -> Result<Self, S::Error> {
        let period_ns = params
            .period_ns()
            .or_else(|| sink.period_ns())
            .filter(|period_ns| *period_ns > 0)
            .unwrap_or(params.fallback_period_ns());
        if params.duty_max_ns() > period_ns {
            error!(
                "servo: duty_max {} ns exceeds period {} ns",
                params.duty_max_ns(),
                period_ns
            );
            return Err(ConfigError::DutyExceedsPeriod {
                duty_max: params.duty_max_ns(),
                period: period_ns,
            }
            .into());
        }

        let angle = params.initial_angle();
        let pwm = PwmState::enabled(params.duty_for_angle(angle), period_ns);
        sink.apply(&pwm).map_err(|err| {
            error!("servo: cannot configure servo at {} degrees", angle);
            Error::HardwareApply(err)
        })?;

        info!(
            "servo: {} degrees over {}..={} ns, period {} ns, start at {}",
            params.degrees(),
            params.duty_min_ns(),
            params.duty_max_ns(),
            period_ns,
            angle
        );

        Ok(Self {
            params,
            period_ns,
            angle: AtomicU16::new(angle),
            core: Mutex::new(ServoCore {
                sink,
                state: ServoState { angle, pwm },
            }),
        })
    }

    /// The last committed angle. Lock-free.
    pub fn get_angle(&self) -> u16 {
        self.angle.load(Ordering::Acquire)
    }

    /// The angular travel; valid setpoints are `0..=degrees`.
    pub const fn get_degrees(&self) -> u16 {
        self.params.degrees()
    }

    /// The calibration this controller was built with.
    pub const fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// The period every configuration is applied with (ns).
    pub const fn period_ns(&self) -> u32 {
        self.period_ns
    }

    /// A consistent snapshot of the committed angle and configuration, taken under the lock.
    pub fn state(&self) -> ServoState {
        self.core.lock().state
    }

    /// Move to `value` degrees.
    ///
    /// On success the channel runs at `duty_for_angle(value)`, enabled, and `get_angle()`
    /// returns `value`. Concurrent callers are serialized; the last one to commit wins.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] if `value` is outside `0..=degrees` (nothing touched), or
    /// [`Error::HardwareApply`] if the sink fails (previous state kept).
    pub fn set_angle(&self, value: i32) -> Result<(), S::Error> {
        let degrees = self.params.degrees();
        let Some(angle) = self.params.checked_angle(value) else {
            warn!("servo: angle {} outside 0..={}", value, degrees);
            return Err(Error::Range { value, degrees });
        };
        let candidate = PwmState::enabled(self.params.duty_for_angle(angle), self.period_ns);
        self.commit(angle, candidate)
    }

    /// Move to the middle of the travel, `degrees / 2`.
    ///
    /// # Errors
    ///
    /// As [`set_angle`](Self::set_angle).
    pub fn center(&self) -> Result<(), S::Error> {
        self.set_angle(i32::from(self.params.degrees() / 2))
    }

    /// Stop driving pulses so the servo can move freely. The angle is kept.
    ///
    /// # Errors
    ///
    /// [`Error::HardwareApply`] if the sink fails (previous state kept).
    pub fn relax(&self) -> Result<(), S::Error> {
        self.set_enabled(false)
    }

    /// Resume driving pulses at the committed angle.
    ///
    /// # Errors
    ///
    /// [`Error::HardwareApply`] if the sink fails (previous state kept).
    pub fn hold(&self) -> Result<(), S::Error> {
        self.set_enabled(true)
    }

    /// Tear down the controller and give back the sink. The channel keeps its last
    /// configuration.
    pub fn into_sink(self) -> S {
        self.core.into_inner().sink
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), S::Error> {
        let mut core = self.core.lock();
        let candidate = core.state.pwm.with_enabled(enabled);
        let angle = core.state.angle;
        Self::apply_and_commit(&mut core, &self.angle, angle, candidate)
    }

    fn commit(&self, angle: u16, candidate: PwmState) -> Result<(), S::Error> {
        let mut core = self.core.lock();
        Self::apply_and_commit(&mut core, &self.angle, angle, candidate)
    }

    // Caller holds the lock.
    fn apply_and_commit(
        core: &mut ServoCore<S>,
        visible_angle: &AtomicU16,
        angle: u16,
        candidate: PwmState,
    ) -> Result<(), S::Error> {
        if let Err(err) = core.sink.apply(&candidate) {
            error!(
                "servo: apply of {} ns failed, keeping {} degrees",
                candidate.duty_cycle_ns,
                core.state.angle
            );
            return Err(Error::HardwareApply(err));
        }
        core.state = ServoState {
            angle,
            pwm: candidate,
        };
        visible_angle.store(angle, Ordering::Release);
        debug!(
            "servo: committed {} degrees ({} ns, enabled {})",
            angle,
            candidate.duty_cycle_ns,
            candidate.enabled
        );
        Ok(())
    }
}
