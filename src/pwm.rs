//! The PWM channel a servo drives, seen from the controller.
//!
//! [`PwmSink`] is the one seam to hardware: a synchronous "apply this configuration" call
//! that leaves the hardware unchanged when it fails. [`DutyCycleSink`] adapts any
//! [`embedded_hal::pwm::SetDutyCycle`] channel to it.

use embedded_hal::pwm::SetDutyCycle;

/// A complete PWM channel configuration: duty cycle, period, and output enable.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmState {
    /// Time per period the output is high (ns).
    pub duty_cycle_ns: u32,
    /// Length of one PWM period (ns).
    pub period_ns: u32,
    /// Whether the output drives pulses at all.
    pub enabled: bool,
}

impl PwmState {
    /// An enabled output with the given duty cycle and period.
    #[must_use]
    pub const fn enabled(duty_cycle_ns: u32, period_ns: u32) -> Self {
        Self {
            duty_cycle_ns,
            period_ns,
            enabled: true,
        }
    }

    /// The same duty cycle and period with the output switched on or off.
    #[must_use]
    pub const fn with_enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }
}

/// A hardware PWM channel that accepts whole configurations.
///
/// Implementations must complete synchronously (a register write, possibly followed by a
/// short settle delay) and must leave the channel as it was when they return an error.
pub trait PwmSink {
    /// Error reported when a configuration cannot be applied.
    type Error;

    /// The period the channel currently runs at, if it knows one.
    ///
    /// Used when the calibration does not fix a period.
    fn period_ns(&self) -> Option<u32> {
        None
    }

    /// Apply `state` to the channel.
    ///
    /// # Errors
    ///
    /// Implementation defined; the channel keeps its previous configuration.
    fn apply(&mut self, state: &PwmState) -> Result<(), Self::Error>;
}

impl<T: PwmSink + ?Sized> PwmSink for &mut T {
    type Error = T::Error;

    fn period_ns(&self) -> Option<u32> {
        (**self).period_ns()
    }

    fn apply(&mut self, state: &PwmState) -> Result<(), Self::Error> {
        (**self).apply(state)
    }
}

/// Adapts an `embedded-hal` duty-cycle channel, whose timer already runs at a known
/// period, to [`PwmSink`].
///
/// The duty cycle is converted to a fraction of `period_ns` and rounded down to the
/// channel's resolution. A disabled state drives the channel fully off.
///
/// # Example
///
/// ```
/// use core::convert::Infallible;
/// use embedded_hal::pwm::{ErrorType, SetDutyCycle};
/// use servo_envoy::pwm::{DutyCycleSink, PwmSink, PwmState};
///
/// struct Channel(u16);
///
/// impl ErrorType for Channel {
///     type Error = Infallible;
/// }
///
/// impl SetDutyCycle for Channel {
///     fn max_duty_cycle(&self) -> u16 {
///         20_000
///     }
///     fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
///         self.0 = duty;
///         Ok(())
///     }
/// }
///
/// // 50 Hz timer with 1 µs resolution.
/// let mut sink = DutyCycleSink::new(Channel(0), 20_000_000);
/// sink.apply(&PwmState::enabled(1_500_000, 20_000_000))?;
/// assert_eq!(sink.channel().0, 1_500);
/// # Ok::<(), Infallible>(())
/// ```
pub struct DutyCycleSink<P> {
    channel: P,
    period_ns: u32,
}

impl<P: SetDutyCycle> DutyCycleSink<P> {
    /// Wrap `channel`, whose timer runs with period `period_ns`.
    pub const fn new(channel: P, period_ns: u32) -> Self {
        Self { channel, period_ns }
    }

    /// The wrapped channel.
    pub const fn channel(&self) -> &P {
        &self.channel
    }

    /// Give back the wrapped channel.
    pub fn into_channel(self) -> P {
        self.channel
    }

    fn duty_counts(&self, duty_cycle_ns: u32) -> u16 {
        let max_duty = self.channel.max_duty_cycle();
        if self.period_ns == 0 {
            return 0;
        }
        let counts =
            u64::from(max_duty) * u64::from(duty_cycle_ns) / u64::from(self.period_ns);
        u16::try_from(counts).map_or(max_duty, |counts| counts.min(max_duty))
    }
}

impl<P: SetDutyCycle> PwmSink for DutyCycleSink<P> {
    type Error = P::Error;

    fn period_ns(&self) -> Option<u32> {
        Some(self.period_ns)
    }

    fn apply(&mut self, state: &PwmState) -> Result<(), Self::Error> {
        if !state.enabled {
            return self.channel.set_duty_cycle_fully_off();
        }
        let counts = self.duty_counts(state.duty_cycle_ns);
        trace!("pwm: {} ns -> {} counts", state.duty_cycle_ns, counts);
        self.channel.set_duty_cycle(counts)
    }
}
