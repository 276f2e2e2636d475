//! Calibration constants for one servo: duty range, angular travel, optional period.
//!
//! Constants are read once from a [`PropertySource`] (a device description, a stored blob,
//! or a literal table) and merged with [`CalibrationDefaults`]. Missing properties fall back
//! to the defaults; present properties that break an invariant fail with [`ConfigError`].
//!
//! See [`CalibrationParams`] for the angle-to-duty mapping.

use heapless::LinearMap;

use crate::ConfigError;

pub mod stored;

/// PWM period used when neither the calibration nor the sink provides one (20 ms, 50 Hz).
pub const DEFAULT_PERIOD_NS: u32 = 20_000_000;

/// Fallback PWM period of the legacy profile (2 ms).
pub const LEGACY_PERIOD_NS: u32 = 2_000_000;

// ============================================================================
// PropertySource - where calibration constants come from
// ============================================================================

/// Read-only lookup of named `u32` properties, in the style of a device-tree node.
///
/// Returning `None` means "not present"; the loader then uses its default.
pub trait PropertySource {
    /// Look up a property by name.
    fn property_u32(&self, name: &str) -> Option<u32>;
}

/// No device description: every property falls back to its default.
impl PropertySource for () {
    fn property_u32(&self, _name: &str) -> Option<u32> {
        None
    }
}

impl<const N: usize> PropertySource for [(&str, u32); N] {
    fn property_u32(&self, name: &str) -> Option<u32> {
        self.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }
}

impl PropertySource for [(&str, u32)] {
    fn property_u32(&self, name: &str) -> Option<u32> {
        self.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }
}

impl<const N: usize> PropertySource for LinearMap<&str, u32, N> {
    fn property_u32(&self, name: &str) -> Option<u32> {
        self.get(name).copied()
    }
}

impl<T: PropertySource + ?Sized> PropertySource for &T {
    fn property_u32(&self, name: &str) -> Option<u32> {
        (**self).property_u32(name)
    }
}

// ============================================================================
// CalibrationDefaults - property names and fallback values
// ============================================================================

/// Property names and fallback values for one calibration profile.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationDefaults {
    /// Property holding the lower duty bound.
    pub duty_min_key: &'static str,
    /// Property holding the upper duty bound.
    pub duty_max_key: &'static str,
    /// Property holding the angular travel, or `None` when the profile fixes it.
    pub degrees_key: Option<&'static str>,
    /// Fallback lower duty bound (ns).
    pub duty_min_ns: u32,
    /// Fallback upper duty bound (ns).
    pub duty_max_ns: u32,
    /// Fallback angular travel.
    pub degrees: u16,
    /// Fallback initial angle.
    pub angle: u16,
    /// Period used when neither the source nor the sink provides one (ns).
    pub period_ns: u32,
}

/// Property holding an explicit PWM period (ns).
pub const PERIOD_KEY: &str = "period";

/// Property holding the initial angle.
pub const ANGLE_KEY: &str = "angle";

impl CalibrationDefaults {
    /// Profile with a configurable angular travel: `duty-min`, `duty-max`, `degrees`.
    ///
    /// Defaults: 500 µs to 2500 µs over 175°, 20 ms frames.
    pub const CURRENT: Self = Self {
        duty_min_key: "duty-min",
        duty_max_key: "duty-max",
        degrees_key: Some("degrees"),
        duty_min_ns: 500_000,
        duty_max_ns: 2_500_000,
        degrees: 175,
        angle: 0,
        period_ns: DEFAULT_PERIOD_NS,
    };

    /// Older profile with a fixed 180° travel: `duty-0`, `duty-180`.
    ///
    /// Defaults: 50 µs to 250 µs, 2 ms frames.
    pub const LEGACY: Self = Self {
        duty_min_key: "duty-0",
        duty_max_key: "duty-180",
        degrees_key: None,
        duty_min_ns: 50_000,
        duty_max_ns: 250_000,
        degrees: 180,
        angle: 0,
        period_ns: LEGACY_PERIOD_NS,
    };
}

impl Default for CalibrationDefaults {
    fn default() -> Self {
        Self::CURRENT
    }
}

// ============================================================================
// CalibrationParams
// ============================================================================

/// Immutable calibration for one servo.
///
/// Invariants, checked at construction: `degrees > 0`, `duty_min_ns <= duty_max_ns`,
/// `initial_angle <= degrees`, and `duty_max_ns <= period_ns` when a period is set.
///
/// Without a fixed period the controller uses the sink's period, then
/// [`fallback_period_ns`](Self::fallback_period_ns), which comes from the profile the
/// calibration was loaded with ([`DEFAULT_PERIOD_NS`] for [`new`](Self::new)).
///
/// # Example
///
/// ```
/// use servo_envoy::calibration::{CalibrationDefaults, CalibrationParams};
///
/// let device = [("duty-min", 500_000), ("degrees", 175)];
/// let params = CalibrationParams::load(&device, &CalibrationDefaults::CURRENT)?;
///
/// assert_eq!(params.duty_for_angle(0), 500_000);
/// assert_eq!(params.duty_for_angle(87), 1_494_285);
/// assert_eq!(params.duty_for_angle(175), 2_500_000);
/// # Ok::<(), servo_envoy::ConfigError>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationParams {
    duty_min_ns: u32,
    duty_max_ns: u32,
    degrees: u16,
    period_ns: Option<u32>,
    fallback_period_ns: u32,
    initial_angle: u16,
}

impl CalibrationParams {
    /// Build calibration from explicit constants.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroDegrees`] or [`ConfigError::InvertedDutyRange`].
    pub const fn new(duty_min_ns: u32, duty_max_ns: u32, degrees: u16) -> Result<Self, ConfigError> {
        if degrees == 0 {
            return Err(ConfigError::ZeroDegrees);
        }
        if duty_min_ns > duty_max_ns {
            return Err(ConfigError::InvertedDutyRange {
                min: duty_min_ns,
                max: duty_max_ns,
            });
        }
        Ok(Self {
            duty_min_ns,
            duty_max_ns,
            degrees,
            period_ns: None,
            fallback_period_ns: DEFAULT_PERIOD_NS,
            initial_angle: 0,
        })
    }

    /// Fix the PWM period instead of taking it from the sink. A zero period means "unset".
    ///
    /// # Errors
    ///
    /// [`ConfigError::DutyExceedsPeriod`] if `duty_max_ns` does not fit the period.
    pub const fn with_period_ns(mut self, period_ns: u32) -> Result<Self, ConfigError> {
        if period_ns == 0 {
            self.period_ns = None;
            return Ok(self);
        }
        if self.duty_max_ns > period_ns {
            return Err(ConfigError::DutyExceedsPeriod {
                duty_max: self.duty_max_ns,
                period: period_ns,
            });
        }
        self.period_ns = Some(period_ns);
        Ok(self)
    }

    /// Set the angle committed when the controller starts.
    ///
    /// # Errors
    ///
    /// [`ConfigError::AngleOutOfRange`] if `angle > degrees`.
    #[expect(clippy::cast_lossless, reason = "`u32::from` is not const")]
    pub const fn with_initial_angle(mut self, angle: u16) -> Result<Self, ConfigError> {
        if angle > self.degrees {
            return Err(ConfigError::AngleOutOfRange {
                angle: angle as u32,
                degrees: self.degrees,
            });
        }
        self.initial_angle = angle;
        Ok(self)
    }

    /// Read calibration from `source`, falling back to `defaults` for absent properties.
    ///
    /// Never fails because something is missing. Fails only when a present value breaks an
    /// invariant. Has no side effects.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] describing the first violated invariant.
    pub fn load<P>(source: &P, defaults: &CalibrationDefaults) -> Result<Self, ConfigError>
    where
        P: PropertySource + ?Sized,
    {
        let duty_min_ns = source
            .property_u32(defaults.duty_min_key)
            .unwrap_or(defaults.duty_min_ns);
        let duty_max_ns = source
            .property_u32(defaults.duty_max_key)
            .unwrap_or(defaults.duty_max_ns);
        let degrees = match defaults.degrees_key.and_then(|key| source.property_u32(key)) {
            Some(raw) => u16::try_from(raw).map_err(|_| ConfigError::DegreesTooLarge(raw))?,
            None => defaults.degrees,
        };

        let mut params = Self::new(duty_min_ns, duty_max_ns, degrees)?;
        if defaults.period_ns > 0 {
            params.fallback_period_ns = defaults.period_ns;
        }

        if let Some(period_ns) = source.property_u32(PERIOD_KEY) {
            params = params.with_period_ns(period_ns)?;
        }

        let angle = source
            .property_u32(ANGLE_KEY)
            .unwrap_or(u32::from(defaults.angle));
        let angle = u16::try_from(angle).map_err(|_| ConfigError::AngleOutOfRange {
            angle,
            degrees: params.degrees,
        })?;
        params = params.with_initial_angle(angle)?;

        debug!(
            "calibration: duty {}..={} ns over {} degrees",
            params.duty_min_ns,
            params.duty_max_ns,
            params.degrees
        );
        Ok(params)
    }

    /// Lower duty bound (ns), the duty cycle for angle 0.
    #[must_use]
    pub const fn duty_min_ns(&self) -> u32 {
        self.duty_min_ns
    }

    /// Upper duty bound (ns), the duty cycle for angle `degrees`.
    #[must_use]
    pub const fn duty_max_ns(&self) -> u32 {
        self.duty_max_ns
    }

    /// Angular travel; valid setpoints are `0..=degrees`.
    #[must_use]
    pub const fn degrees(&self) -> u16 {
        self.degrees
    }

    /// Fixed PWM period, if one was configured.
    #[must_use]
    pub const fn period_ns(&self) -> Option<u32> {
        self.period_ns
    }

    /// Period to use when neither this calibration nor the sink fixes one (ns).
    #[must_use]
    pub const fn fallback_period_ns(&self) -> u32 {
        self.fallback_period_ns
    }

    /// Angle committed when the controller starts.
    #[must_use]
    pub const fn initial_angle(&self) -> u16 {
        self.initial_angle
    }

    /// Validate a requested setpoint against `0..=degrees`.
    #[must_use]
    pub fn checked_angle(&self, value: i32) -> Option<u16> {
        u16::try_from(value)
            .ok()
            .filter(|angle| *angle <= self.degrees)
    }

    /// Duty cycle (ns) for `angle`.
    ///
    /// `duty_min + floor((duty_max - duty_min) * angle / degrees)`, computed in 64-bit
    /// integers with the multiplication before the division, so `duty_for_angle(0)` is
    /// exactly `duty_min` and `duty_for_angle(degrees)` is exactly `duty_max`. Angles above
    /// `degrees` are clamped.
    #[must_use]
    pub fn duty_for_angle(&self, angle: u16) -> u32 {
        let angle = angle.min(self.degrees);
        let span = u64::from(self.duty_max_ns.saturating_sub(self.duty_min_ns));
        // span * angle / degrees <= span, which fits in u32
        let offset = span
            .checked_mul(u64::from(angle))
            .and_then(|scaled| scaled.checked_div(u64::from(self.degrees)))
            .unwrap_or(span);
        self.duty_min_ns
            .saturating_add(u32::try_from(offset).unwrap_or(u32::MAX))
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        let defaults = CalibrationDefaults::CURRENT;
        Self {
            duty_min_ns: defaults.duty_min_ns,
            duty_max_ns: defaults.duty_max_ns,
            degrees: defaults.degrees,
            period_ns: None,
            fallback_period_ns: defaults.period_ns,
            initial_angle: defaults.angle,
        }
    }
}
