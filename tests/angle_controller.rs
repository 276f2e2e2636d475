#![allow(missing_docs)]
//! Host-level tests for the angle controller's commit protocol.

use servo_envoy::calibration::{CalibrationDefaults, CalibrationParams};
use servo_envoy::pwm::PwmState;
use servo_envoy::pwm_host::{HostPwm, HostPwmError, HostPwmProbe};
use servo_envoy::servo::AngleController;
use servo_envoy::{ConfigError, Error};

fn controller(params: CalibrationParams, pwm: HostPwm) -> (AngleController<HostPwm>, HostPwmProbe) {
    let probe = pwm.probe();
    let Ok(servo) = AngleController::new(params, pwm) else {
        panic!("controller construction failed");
    };
    (servo, probe)
}

fn default_controller() -> (AngleController<HostPwm>, HostPwmProbe) {
    controller(CalibrationParams::default(), HostPwm::new())
}

#[test]
fn construction_commits_the_initial_angle() {
    let (servo, probe) = default_controller();

    assert_eq!(servo.get_angle(), 0);
    assert_eq!(servo.get_degrees(), 175);
    assert_eq!(probe.applied(), [PwmState::enabled(500_000, 20_000_000)]);
    assert_eq!(servo.state().pwm, PwmState::enabled(500_000, 20_000_000));
}

#[test]
fn configured_initial_angle_is_committed() {
    let params = CalibrationParams::default().with_initial_angle(90).unwrap();
    let (servo, probe) = controller(params, HostPwm::new());

    assert_eq!(servo.get_angle(), 90);
    assert_eq!(
        probe.current().map(|pwm| pwm.duty_cycle_ns),
        Some(1_528_571)
    );
}

#[test]
fn reference_angles_commit_reference_duties() {
    let (servo, probe) = default_controller();

    for (angle, duty) in [(0, 500_000), (175, 2_500_000), (87, 1_494_285)] {
        servo.set_angle(angle).unwrap();
        assert_eq!(i32::from(servo.get_angle()), angle);
        assert_eq!(probe.current(), Some(PwmState::enabled(duty, 20_000_000)));
        assert_eq!(servo.state().pwm.duty_cycle_ns, duty);
    }
}

#[test]
fn out_of_range_angles_touch_nothing() {
    let (servo, probe) = default_controller();
    servo.set_angle(40).unwrap();
    let before = servo.state();
    let attempts = probe.attempts();

    assert_eq!(
        servo.set_angle(-1),
        Err(Error::Range {
            value: -1,
            degrees: 175,
        })
    );
    assert_eq!(
        servo.set_angle(176),
        Err(Error::Range {
            value: 176,
            degrees: 175,
        })
    );

    assert_eq!(servo.get_angle(), 40);
    assert_eq!(servo.state(), before);
    assert_eq!(probe.attempts(), attempts);
}

#[test]
fn failed_apply_keeps_the_previous_commit() {
    let (servo, probe) = default_controller();
    servo.set_angle(30).unwrap();
    let before = servo.state();

    probe.fail_next(1);
    assert_eq!(
        servo.set_angle(60),
        Err(Error::HardwareApply(HostPwmError {
            duty_cycle_ns: 1_185_714,
        }))
    );

    assert_eq!(servo.get_angle(), 30);
    assert_eq!(servo.state(), before);
    assert_eq!(probe.current(), Some(before.pwm));

    servo.set_angle(60).unwrap();
    assert_eq!(servo.get_angle(), 60);
}

#[test]
fn failed_initial_apply_prevents_construction() {
    let pwm = HostPwm::new();
    let probe = pwm.probe();
    probe.set_failing(true);

    let result: Result<AngleController<HostPwm>, _> =
        AngleController::new(CalibrationParams::default(), pwm);

    assert!(matches!(result, Err(Error::HardwareApply(_))));
    assert_eq!(probe.attempts(), 1);
    assert_eq!(probe.current(), None);
}

#[test]
fn period_comes_from_calibration_then_sink_then_profile() {
    let (servo, _) = controller(
        CalibrationParams::default(),
        HostPwm::new().with_period_ns(3_000_000),
    );
    assert_eq!(servo.period_ns(), 3_000_000);

    let params = CalibrationParams::default()
        .with_period_ns(4_000_000)
        .unwrap();
    let (servo, probe) = controller(params, HostPwm::new().with_period_ns(3_000_000));
    assert_eq!(servo.period_ns(), 4_000_000);
    assert_eq!(probe.current().map(|pwm| pwm.period_ns), Some(4_000_000));

    let (servo, _) = controller(
        CalibrationParams::default(),
        HostPwm::new().with_period_ns(0),
    );
    assert_eq!(servo.period_ns(), 20_000_000);

    let legacy = CalibrationParams::load(&(), &CalibrationDefaults::LEGACY).unwrap();
    let (servo, _) = controller(legacy, HostPwm::new());
    assert_eq!(servo.period_ns(), 2_000_000);
}

#[test]
fn sink_period_shorter_than_duty_max_is_a_config_error() {
    let pwm = HostPwm::new().with_period_ns(2_000_000);
    let probe = pwm.probe();

    let result: Result<AngleController<HostPwm>, _> =
        AngleController::new(CalibrationParams::default(), pwm);

    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::DutyExceedsPeriod {
            duty_max: 2_500_000,
            period: 2_000_000,
        }))
    ));
    assert_eq!(probe.attempts(), 0);
}

#[test]
fn relax_and_hold_toggle_output_at_the_same_angle() {
    let (servo, probe) = default_controller();
    servo.set_angle(45).unwrap();
    let held = servo.state().pwm;

    servo.relax().unwrap();
    assert_eq!(probe.current(), Some(held.with_enabled(false)));
    assert_eq!(servo.get_angle(), 45);

    servo.hold().unwrap();
    assert_eq!(probe.current(), Some(held));

    servo.relax().unwrap();
    servo.set_angle(50).unwrap();
    assert!(servo.state().pwm.enabled);
}

#[test]
fn failed_relax_keeps_output_enabled() {
    let (servo, probe) = default_controller();
    probe.fail_next(1);

    assert!(matches!(servo.relax(), Err(Error::HardwareApply(_))));
    assert!(servo.state().pwm.enabled);
}

#[test]
fn center_moves_to_half_the_travel() {
    let (servo, _) = default_controller();
    servo.center().unwrap();
    assert_eq!(servo.get_angle(), 87);
}

#[test]
fn teardown_returns_the_sink_in_its_last_state() {
    let (servo, _) = default_controller();
    servo.set_angle(100).unwrap();
    let last = servo.state().pwm;

    let pwm = servo.into_sink();
    assert_eq!(pwm.probe().current(), Some(last));
}

#[test]
fn controller_accepts_any_raw_mutex() {
    let servo: AngleController<HostPwm, spin::mutex::SpinMutex<()>> =
        match AngleController::new(CalibrationParams::default(), HostPwm::new()) {
            Ok(servo) => servo,
            Err(err) => panic!("{err}"),
        };
    servo.set_angle(12).unwrap();
    assert_eq!(servo.get_angle(), 12);
    assert_eq!(servo.params(), &CalibrationParams::default());
}
