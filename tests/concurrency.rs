#![allow(missing_docs)]
//! Host-level tests for concurrent access to controllers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use servo_envoy::calibration::CalibrationParams;
use servo_envoy::pwm_host::HostPwm;
use servo_envoy::servo::AngleController;

const WRITERS: i32 = 8;
const ROUNDS: i32 = 10;

#[test]
fn concurrent_writers_never_tear_the_committed_state() {
    let params = CalibrationParams::default();
    let pwm = HostPwm::new().with_settle(Duration::from_micros(200));
    let probe = pwm.probe();
    let Ok(servo) = AngleController::<HostPwm>::new(params, pwm) else {
        panic!("controller construction failed");
    };
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut snapshots = 0_usize;
            loop {
                let finished = done.load(Ordering::Acquire);
                let state = servo.state();
                assert_eq!(state.pwm.duty_cycle_ns, params.duty_for_angle(state.angle));
                snapshots += 1;
                if finished {
                    break snapshots;
                }
            }
        });

        let writers: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let servo = &servo;
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        // Distinct values per writer: 1..=80
                        let angle = writer * ROUNDS + round + 1;
                        servo.set_angle(angle).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        assert!(reader.join().unwrap() > 0);
    });

    let state = servo.state();
    assert!((1..=WRITERS * ROUNDS).contains(&i32::from(state.angle)));
    assert_eq!(state.pwm.duty_cycle_ns, params.duty_for_angle(state.angle));
    assert_eq!(servo.get_angle(), state.angle);
    assert_eq!(probe.current(), Some(state.pwm));
    assert_eq!(probe.max_in_flight(), 1);
    assert_eq!(probe.applied().len(), 1 + (WRITERS * ROUNDS) as usize);
}

#[test]
fn readers_see_the_angle_the_hardware_runs() {
    let params = CalibrationParams::default();
    let pwm = HostPwm::new().with_settle(Duration::from_micros(100));
    let probe = pwm.probe();
    let Ok(servo) = AngleController::<HostPwm>::new(params, pwm) else {
        panic!("controller construction failed");
    };

    thread::scope(|scope| {
        for angle in [10, 20, 30, 40] {
            let servo = &servo;
            scope.spawn(move || servo.set_angle(angle).unwrap());
        }
    });

    let committed = probe.current().unwrap();
    assert_eq!(
        committed.duty_cycle_ns,
        params.duty_for_angle(servo.get_angle())
    );
}

#[test]
fn a_slow_servo_does_not_block_another_servo() {
    let params = CalibrationParams::default();
    let slow_pwm = HostPwm::new().with_settle(Duration::from_millis(500));
    let slow_probe = slow_pwm.probe();
    let Ok(slow) = AngleController::<HostPwm>::new(params, slow_pwm) else {
        panic!("controller construction failed");
    };
    let fast_pwm = HostPwm::new();
    let fast_probe = fast_pwm.probe();
    let Ok(fast) = AngleController::<HostPwm>::new(params, fast_pwm) else {
        panic!("controller construction failed");
    };

    thread::scope(|scope| {
        let mover = scope.spawn(|| slow.set_angle(10));
        while slow_probe.in_flight() == 0 {
            thread::yield_now();
        }

        let started = Instant::now();
        fast.set_angle(20).unwrap();
        let state = fast.state();
        let elapsed = started.elapsed();

        assert_eq!(slow_probe.in_flight(), 1, "slow apply finished first");
        assert!(elapsed < Duration::from_millis(250), "blocked for {elapsed:?}");
        assert_eq!(state.angle, 20);
        assert_eq!(fast_probe.current(), Some(state.pwm));

        mover.join().unwrap().unwrap();
    });
    assert_eq!(slow.get_angle(), 10);
}
