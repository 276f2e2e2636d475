#![allow(missing_docs)]
//! Host-level tests for driving an `embedded-hal` PWM channel.

use core::convert::Infallible;

use embedded_hal::pwm::{ErrorKind, ErrorType, SetDutyCycle};
use servo_envoy::Error;
use servo_envoy::calibration::CalibrationParams;
use servo_envoy::pwm::{DutyCycleSink, PwmSink, PwmState};
use servo_envoy::servo::AngleController;

const FRAME_NS: u32 = 20_000_000;

/// 50 Hz channel with 1 µs resolution.
#[derive(Default)]
struct Channel {
    duty: u16,
}

impl ErrorType for Channel {
    type Error = Infallible;
}

impl SetDutyCycle for Channel {
    fn max_duty_cycle(&self) -> u16 {
        20_000
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.duty = duty;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ChannelFault;

impl embedded_hal::pwm::Error for ChannelFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

struct BrokenChannel;

impl ErrorType for BrokenChannel {
    type Error = ChannelFault;
}

impl SetDutyCycle for BrokenChannel {
    fn max_duty_cycle(&self) -> u16 {
        20_000
    }

    fn set_duty_cycle(&mut self, _duty: u16) -> Result<(), Self::Error> {
        Err(ChannelFault)
    }
}

#[test]
fn duty_cycle_becomes_counts_of_the_frame() {
    let mut sink = DutyCycleSink::new(Channel::default(), FRAME_NS);

    sink.apply(&PwmState::enabled(1_500_000, FRAME_NS)).unwrap();
    assert_eq!(sink.channel().duty, 1_500);

    // Sub-tick remainders round down.
    sink.apply(&PwmState::enabled(1_000_999, FRAME_NS)).unwrap();
    assert_eq!(sink.channel().duty, 1_000);
}

#[test]
fn duty_beyond_the_frame_is_capped() {
    let mut sink = DutyCycleSink::new(Channel::default(), FRAME_NS);
    sink.apply(&PwmState::enabled(30_000_000, FRAME_NS)).unwrap();
    assert_eq!(sink.channel().duty, 20_000);
}

#[test]
fn disabled_state_drives_the_channel_off() {
    let mut sink = DutyCycleSink::new(Channel::default(), FRAME_NS);
    sink.apply(&PwmState::enabled(1_500_000, FRAME_NS)).unwrap();

    sink.apply(&PwmState::enabled(1_500_000, FRAME_NS).with_enabled(false))
        .unwrap();
    assert_eq!(sink.channel().duty, 0);
}

#[test]
fn controller_drives_a_hal_channel() {
    let sink = DutyCycleSink::new(Channel::default(), FRAME_NS);
    assert_eq!(sink.period_ns(), Some(FRAME_NS));

    let Ok(servo) = AngleController::<_>::new(CalibrationParams::default(), sink) else {
        panic!("controller construction failed");
    };
    assert_eq!(servo.period_ns(), FRAME_NS);
    servo.set_angle(175).unwrap();

    let channel = servo.into_sink().into_channel();
    assert_eq!(channel.duty, 2_500);
}

#[test]
fn channel_errors_surface_as_hardware_errors() {
    let sink = DutyCycleSink::new(BrokenChannel, FRAME_NS);
    let result: Result<AngleController<_>, _> =
        AngleController::new(CalibrationParams::default(), sink);
    assert!(matches!(result, Err(Error::HardwareApply(ChannelFault))));
}
