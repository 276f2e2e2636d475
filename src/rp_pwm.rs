//! A [`PwmSink`] for one channel of an RP2040/RP235x PWM slice.
//!
//! The slice is clocked for 1 µs ticks, so a duty cycle becomes a compare value of
//! `duty_ns / 1000` and a period becomes `top = period_us - 1`. See [`RpPwmSink`] for usage.

use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::pwm::{Config, Pwm};

use crate::pwm::{PwmSink, PwmState};

const NS_PER_TICK: u32 = 1_000;

/// A configuration the slice cannot represent. The slice keeps its previous configuration.
#[derive(Clone, Copy, Debug, derive_more::Display, Eq, PartialEq, defmt::Format)]
pub enum RpPwmError {
    /// The period needs more than 65 536 one-microsecond ticks.
    #[display("period {_0} ns exceeds the 16-bit counter")]
    PeriodTooLong(u32),
    /// The pulse would not end inside the period.
    #[display("pulse {duty_cycle_ns} ns does not fit period {period_ns} ns")]
    PulseExceedsPeriod {
        /// Requested duty cycle (ns).
        duty_cycle_ns: u32,
        /// Requested period (ns).
        period_ns: u32,
    },
}

impl core::error::Error for RpPwmError {}

#[derive(Debug, Clone, Copy)]
enum RpChannel {
    A,
    B,
}

/// One PWM slice channel driving a servo signal.
///
/// # Examples
/// ```rust,no_run
/// # #![no_std]
/// # #![no_main]
/// use servo_envoy::calibration::CalibrationParams;
/// use servo_envoy::rp_pwm::rp_sink_from_pin_slice;
/// use servo_envoy::servo::AngleController;
/// # use core::panic::PanicInfo;
/// # #[panic_handler]
/// # fn panic(_info: &PanicInfo) -> ! { loop {} }
/// fn example(p: embassy_rp::Peripherals) {
///     // GPIO 11 is channel B of PWM slice 5; 20 ms frames.
///     let sink = rp_sink_from_pin_slice(p.PIN_11, p.PWM_SLICE5, 20_000_000);
///     let servo: AngleController<_> =
///         AngleController::new(CalibrationParams::default(), sink).unwrap();
///     servo.set_angle(45).unwrap();
///     servo.relax().unwrap();
/// }
/// ```
pub struct RpPwmSink<'d> {
    pwm: Pwm<'d>,
    cfg: Config, // Kept so reconfiguration never resets the divider
    channel: RpChannel,
    period_ns: u32,
}

impl<'d> RpPwmSink<'d> {
    /// Drive channel A of `pwm`, whose frames last `period_ns`.
    ///
    /// The output stays off until the first [`apply`](PwmSink::apply).
    #[must_use]
    pub fn new_output_a(pwm: Pwm<'d>, period_ns: u32) -> Self {
        Self::init(pwm, RpChannel::A, period_ns)
    }

    /// Drive channel B of `pwm`, whose frames last `period_ns`.
    ///
    /// The output stays off until the first [`apply`](PwmSink::apply).
    #[must_use]
    pub fn new_output_b(pwm: Pwm<'d>, period_ns: u32) -> Self {
        Self::init(pwm, RpChannel::B, period_ns)
    }

    fn init(mut pwm: Pwm<'d>, channel: RpChannel, period_ns: u32) -> Self {
        let clk = u64::from(clk_sys_freq()); // Hz
        // Aim for tick ≈ 1 µs: divider = clk_sys / 1_000_000
        let div_int = u8::try_from((clk / 1_000_000).clamp(1, 255)).unwrap_or(u8::MAX);

        let mut cfg = Config::default();
        cfg.phase_correct = false; // edge-aligned => exact 1 µs steps
        cfg.divider = div_int.into();
        cfg.top = top_for_period(period_ns).unwrap_or(u16::MAX);
        cfg.enable = false;
        pwm.set_config(&cfg);

        info!("rp_pwm: clk={}Hz div={} top={}", clk, div_int, cfg.top);

        Self {
            pwm,
            cfg,
            channel,
            period_ns,
        }
    }
}

impl PwmSink for RpPwmSink<'_> {
    type Error = RpPwmError;

    fn period_ns(&self) -> Option<u32> {
        Some(self.period_ns)
    }

    fn apply(&mut self, state: &PwmState) -> Result<(), Self::Error> {
        let top = top_for_period(state.period_ns)
            .ok_or(RpPwmError::PeriodTooLong(state.period_ns))?;
        let compare = u16::try_from(state.duty_cycle_ns / NS_PER_TICK)
            .ok()
            .filter(|compare| *compare <= top)
            .ok_or(RpPwmError::PulseExceedsPeriod {
                duty_cycle_ns: state.duty_cycle_ns,
                period_ns: state.period_ns,
            })?;

        self.cfg.top = top;
        match self.channel {
            RpChannel::A => self.cfg.compare_a = compare,
            RpChannel::B => self.cfg.compare_b = compare,
        }
        self.cfg.enable = state.enabled;
        self.pwm.set_config(&self.cfg);
        self.period_ns = state.period_ns;
        Ok(())
    }
}

fn top_for_period(period_ns: u32) -> Option<u16> {
    let ticks = period_ns / NS_PER_TICK;
    u16::try_from(ticks.checked_sub(1)?).ok()
}

/// A GPIO pin that can carry a PWM output of slice `S`.
///
/// Implemented for every pin/slice pairing of the chip, so a mismatched pair does not
/// compile.
pub trait RpPwmPin<S: embassy_rp::PeripheralType>: embassy_rp::PeripheralType {
    /// Route this pin's slice channel to the pin and wrap it as a sink.
    fn sink<'d>(
        slice: embassy_rp::Peri<'d, S>,
        pin: embassy_rp::Peri<'d, Self>,
        period_ns: u32,
    ) -> RpPwmSink<'d>;
}

/// Build a sink from a GPIO pin and the PWM slice it belongs to.
///
/// Even pins drive channel A, odd pins channel B.
pub fn rp_sink_from_pin_slice<'d, P, S>(
    pin: embassy_rp::Peri<'d, P>,
    slice: embassy_rp::Peri<'d, S>,
    period_ns: u32,
) -> RpPwmSink<'d>
where
    P: RpPwmPin<S>,
    S: embassy_rp::PeripheralType,
{
    P::sink(slice, pin, period_ns)
}

// `SLICE => A / B, ...;` lists the (channel A, channel B) pin pairs of each slice.
macro_rules! rp_pwm_pins {
    ($($slice:ident => $($a:ident / $b:ident),+;)+) => {$($(
        rp_pwm_pins!(@pin $slice, $a, new_output_a);
        rp_pwm_pins!(@pin $slice, $b, new_output_b);
    )+)+};
    (@pin $slice:ident, $pin:ident, $output:ident) => {
        impl RpPwmPin<embassy_rp::peripherals::$slice> for embassy_rp::peripherals::$pin {
            fn sink<'d>(
                slice: embassy_rp::Peri<'d, embassy_rp::peripherals::$slice>,
                pin: embassy_rp::Peri<'d, Self>,
                period_ns: u32,
            ) -> RpPwmSink<'d> {
                RpPwmSink::$output(Pwm::$output(slice, pin, Config::default()), period_ns)
            }
        }
    };
}

rp_pwm_pins! {
    PWM_SLICE0 => PIN_0 / PIN_1, PIN_16 / PIN_17;
    PWM_SLICE1 => PIN_2 / PIN_3, PIN_18 / PIN_19;
    PWM_SLICE2 => PIN_4 / PIN_5, PIN_20 / PIN_21;
    PWM_SLICE3 => PIN_6 / PIN_7, PIN_22 / PIN_23;
    PWM_SLICE4 => PIN_8 / PIN_9, PIN_24 / PIN_25;
    PWM_SLICE5 => PIN_10 / PIN_11, PIN_26 / PIN_27;
    PWM_SLICE6 => PIN_12 / PIN_13, PIN_28 / PIN_29;
    PWM_SLICE7 => PIN_14 / PIN_15;
}

#[cfg(feature = "pico2")]
rp_pwm_pins! {
    PWM_SLICE7 => PIN_30 / PIN_31;
    PWM_SLICE8 => PIN_32 / PIN_33, PIN_40 / PIN_41;
    PWM_SLICE9 => PIN_34 / PIN_35, PIN_42 / PIN_43;
    PWM_SLICE10 => PIN_36 / PIN_37, PIN_44 / PIN_45;
    PWM_SLICE11 => PIN_38 / PIN_39, PIN_46 / PIN_47;
}
