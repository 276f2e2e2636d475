//! Text endpoints over an [`AngleController`], in the shape of sysfs attributes.
//!
//! Each servo exposes `angle` (read/write) and, in the current layout, `degrees`
//! (read-only). Reads produce a decimal number and a newline. Writes accept one decimal
//! integer with an optional trailing newline.
//!
//! See [`ControlSurface`] for usage.

use core::fmt::Write as _;

use heapless::String;
use lock_api::RawMutex;

use crate::pwm::PwmSink;
use crate::servo::AngleController;
use crate::{Error, Result};

/// Text produced by [`ControlSurface::show`]. Holds any `u16` plus a newline.
pub type AttributeText = String<16>;

/// One endpoint of a servo's control surface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Attribute {
    /// The committed setpoint.
    Angle,
    /// The angular travel.
    Degrees,
}

impl Attribute {
    /// The attribute's file name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Angle => "angle",
            Self::Degrees => "degrees",
        }
    }

    /// Look up an attribute by file name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "angle" => Some(Self::Angle),
            "degrees" => Some(Self::Degrees),
            _ => None,
        }
    }

    /// Whether the attribute accepts writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Angle)
    }
}

const CURRENT_ATTRIBUTES: &[Attribute] = &[Attribute::Angle, Attribute::Degrees];
const LEGACY_ATTRIBUTES: &[Attribute] = &[Attribute::Angle];

/// Adapts an [`AngleController`] to line-oriented text reads and writes.
///
/// The surface borrows the controller, so several surfaces (or direct callers) can share
/// one servo.
///
/// # Example
///
/// ```
/// use servo_envoy::calibration::CalibrationParams;
/// use servo_envoy::control_surface::{Attribute, ControlSurface};
/// use servo_envoy::pwm_host::HostPwm;
/// use servo_envoy::servo::AngleController;
///
/// let servo: AngleController<HostPwm> =
///     AngleController::new(CalibrationParams::default(), HostPwm::new())?;
/// let surface = ControlSurface::new(&servo);
///
/// assert_eq!(surface.store(Attribute::Angle, b"90\n")?, 3);
/// assert_eq!(surface.show(Attribute::Angle)?.as_str(), "90\n");
/// assert_eq!(surface.show_by_name("degrees")?.as_str(), "175\n");
///
/// let err = surface.store(Attribute::Angle, b"abc").unwrap_err();
/// assert!(err.is_invalid_argument());
/// # Ok::<(), servo_envoy::Error<servo_envoy::pwm_host::HostPwmError>>(())
/// ```
pub struct ControlSurface<'a, S: PwmSink, M: RawMutex> {
    controller: &'a AngleController<S, M>,
    attributes: &'static [Attribute],
}

impl<'a, S: PwmSink, M: RawMutex> ControlSurface<'a, S, M> {
    /// Current layout: `angle` and `degrees`.
    #[must_use]
    pub const fn new(controller: &'a AngleController<S, M>) -> Self {
        Self {
            controller,
            attributes: CURRENT_ATTRIBUTES,
        }
    }

    /// Legacy layout: `angle` only.
    #[must_use]
    pub const fn legacy(controller: &'a AngleController<S, M>) -> Self {
        Self {
            controller,
            attributes: LEGACY_ATTRIBUTES,
        }
    }

    /// The attributes this layout exposes.
    #[must_use]
    pub const fn attributes(&self) -> &'static [Attribute] {
        self.attributes
    }

    /// The controller behind this surface.
    #[must_use]
    pub const fn controller(&self) -> &'a AngleController<S, M> {
        self.controller
    }

    /// Read an attribute as a decimal number followed by a newline.
    ///
    /// # Errors
    ///
    /// [`Error::NotExposed`] if the layout does not include `attribute`.
    pub fn show(&self, attribute: Attribute) -> Result<AttributeText, S::Error> {
        self.check_exposed(attribute)?;
        let value = match attribute {
            Attribute::Angle => self.controller.get_angle(),
            Attribute::Degrees => self.controller.get_degrees(),
        };
        let mut text = AttributeText::new();
        // A u16 and a newline always fit.
        writeln!(text, "{value}").ok();
        Ok(text)
    }

    /// Write `input` to an attribute and return how many bytes were consumed.
    ///
    /// On success the whole input is consumed. A rejected write changes nothing.
    ///
    /// # Errors
    ///
    /// [`Error::NotExposed`], [`Error::ReadOnly`], [`Error::Parse`], [`Error::Range`], or
    /// [`Error::HardwareApply`] from the controller.
    pub fn store(&self, attribute: Attribute, input: &[u8]) -> Result<usize, S::Error> {
        self.check_exposed(attribute)?;
        if !attribute.is_writable() {
            warn!("control: write to read-only {}", attribute.name());
            return Err(Error::ReadOnly);
        }
        let value = parse_angle::<S::Error>(input).inspect_err(|_| {
            warn!("control: rejected {} byte write to angle", input.len());
        })?;
        self.controller.set_angle(value)?;
        Ok(input.len())
    }

    /// [`show`](Self::show) by attribute file name.
    ///
    /// # Errors
    ///
    /// [`Error::NotExposed`] for unknown names, otherwise as [`show`](Self::show).
    pub fn show_by_name(&self, name: &str) -> Result<AttributeText, S::Error> {
        self.show(Attribute::from_name(name).ok_or(Error::NotExposed)?)
    }

    /// [`store`](Self::store) by attribute file name.
    ///
    /// # Errors
    ///
    /// [`Error::NotExposed`] for unknown names, otherwise as [`store`](Self::store).
    pub fn store_by_name(&self, name: &str, input: &[u8]) -> Result<usize, S::Error> {
        self.store(Attribute::from_name(name).ok_or(Error::NotExposed)?, input)
    }

    fn check_exposed(&self, attribute: Attribute) -> Result<(), S::Error> {
        if self.attributes.contains(&attribute) {
            Ok(())
        } else {
            Err(Error::NotExposed)
        }
    }
}

/// Parse one decimal setpoint written to `angle`.
///
/// Accepts an optional `+` or `-` sign, at least one ASCII digit, and at most one trailing
/// newline. Anything else, including spaces, is [`Error::Parse`]. Values beyond `i32`
/// saturate, so they fail range validation rather than parsing.
///
/// # Errors
///
/// [`Error::Parse`] for malformed input.
pub fn parse_angle<H>(input: &[u8]) -> Result<i32, H> {
    let input = input.strip_suffix(b"\n").unwrap_or(input);
    let (negative, digits) = match input {
        [b'+', rest @ ..] => (false, rest),
        [b'-', rest @ ..] => (true, rest),
        _ => (false, input),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(Error::Parse);
    }

    let magnitude = digits.iter().fold(0_i64, |acc, digit| {
        acc.saturating_mul(10)
            .saturating_add(i64::from(digit.saturating_sub(b'0')))
    });
    let value = if negative {
        magnitude.saturating_neg()
    } else {
        magnitude
    };
    Ok(i32::try_from(value).unwrap_or(if negative { i32::MIN } else { i32::MAX }))
}
