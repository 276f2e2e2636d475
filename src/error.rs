use core::convert::Infallible;
use core::fmt;

use derive_more::Display;

/// Result type for servo operations, generic over the PWM sink's error type.
pub type Result<T, H = Infallible> = core::result::Result<T, Error<H>>;

/// Calibration constants that cannot describe a usable servo.
///
/// Returned by [`CalibrationParams::load`](crate::calibration::CalibrationParams::load) and
/// by controller construction. There is no degraded mode: a servo with a bad calibration
/// is never built.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// `degrees` is zero, so the angle-to-duty mapping is undefined.
    #[display("degrees must be positive")]
    ZeroDegrees,
    /// `degrees` does not fit the 16-bit angle domain.
    #[display("degrees {_0} exceeds 65535")]
    DegreesTooLarge(u32),
    /// `duty_min` is larger than `duty_max`.
    #[display("duty_min {min} ns exceeds duty_max {max} ns")]
    InvertedDutyRange {
        /// Configured lower duty bound (ns).
        min: u32,
        /// Configured upper duty bound (ns).
        max: u32,
    },
    /// The configured initial angle lies outside `0..=degrees`.
    #[display("initial angle {angle} outside 0..={degrees}")]
    AngleOutOfRange {
        /// Configured initial angle.
        angle: u32,
        /// Configured angular travel.
        degrees: u16,
    },
    /// `duty_max` does not fit inside one PWM period.
    #[display("duty_max {duty_max} ns exceeds period {period} ns")]
    DutyExceedsPeriod {
        /// Configured upper duty bound (ns).
        duty_max: u32,
        /// Resolved PWM period (ns).
        period: u32,
    },
    /// A stored calibration blob failed its length, CRC, or payload check.
    #[display("stored calibration is corrupted")]
    StorageCorrupted,
    /// The buffer given for a stored calibration blob is too small.
    #[display("stored calibration needs more than {_0} bytes")]
    StorageTooSmall(usize),
}

impl core::error::Error for ConfigError {}

/// Errors from servo control, generic over the PWM sink's error type `H`.
///
/// [`Parse`](Self::Parse), [`Range`](Self::Range), [`ReadOnly`](Self::ReadOnly), and
/// [`NotExposed`](Self::NotExposed) are detected before any state changes.
/// [`HardwareApply`](Self::HardwareApply) leaves the committed angle and duty cycle at their
/// previous values.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<H> {
    /// Control-surface input is not a decimal integer.
    #[display("not a non-negative decimal integer")]
    Parse,
    /// The requested angle lies outside `0..=degrees`.
    #[display("angle {value} outside 0..={degrees}")]
    Range {
        /// Requested angle.
        value: i32,
        /// Configured angular travel.
        degrees: u16,
    },
    /// Calibration constants violate their invariants.
    #[display("invalid calibration: {_0}")]
    Config(ConfigError),
    /// The PWM sink rejected or failed to apply the computed configuration.
    #[display("PWM apply failed: {_0}")]
    HardwareApply(H),
    /// A write was sent to a read-only attribute.
    #[display("attribute is read-only")]
    ReadOnly,
    /// The attribute is not part of this control surface layout.
    #[display("attribute is not exposed")]
    NotExposed,
}

impl<H> Error<H> {
    /// True for errors a text control surface reports as an invalid argument.
    ///
    /// These are rejected writes: nothing was applied and no state changed.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::Parse | Self::Range { .. } | Self::ReadOnly | Self::NotExposed
        )
    }
}

impl<H> From<ConfigError> for Error<H> {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl<H: fmt::Debug + fmt::Display> core::error::Error for Error<H> {}
