#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]
#![allow(unsafe_code, reason = "the cortex-m-rt entry point exports `main`")]

use cortex_m_rt::entry;
use servo_envoy::{
    calibration::CalibrationParams, rp_pwm::rp_sink_from_pin_slice, servo::AngleController,
};
use {defmt::info, defmt_rtt as _, panic_probe as _};

const FRAME_NS: u32 = 20_000_000; // 50 Hz
const SYS_CLK_HZ: u32 = 125_000_000;

#[entry]
fn main() -> ! {
    let p = embassy_rp::init(Default::default());

    // GPIO 11 → (11/2) % 8 = slice 5, channel B
    let sink = rp_sink_from_pin_slice(p.PIN_11, p.PWM_SLICE5, FRAME_NS);
    let servo: AngleController<_> = match AngleController::new(CalibrationParams::default(), sink)
    {
        Ok(servo) => servo,
        Err(err) => defmt::panic!("servo init failed: {}", err),
    };

    let degrees = servo.get_degrees();
    info!("sweeping 0..={} degrees", degrees);

    // Out by 5 degrees, then back.
    let forward = (0..=degrees).step_by(5);
    for angle in forward.clone().chain(forward.rev()).cycle() {
        if let Err(err) = servo.set_angle(i32::from(angle)) {
            defmt::warn!("set_angle({}) failed: {}", angle, err);
        }
        cortex_m::asm::delay(SYS_CLK_HZ / 20); // ~50 ms
    }

    defmt::unreachable!()
}
