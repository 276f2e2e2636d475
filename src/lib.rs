//! Servo angle control over a PWM channel, with a locked commit protocol.
//!
//! A servo is driven by an [`AngleController`](servo::AngleController): it maps a commanded
//! angle in `0..=degrees` to a duty cycle, applies that duty cycle to a [`PwmSink`](pwm::PwmSink)
//! while holding its lock, and only then makes the new angle visible to readers.
//!
//! # Glossary
//!
//! - **Duty cycle:** time per PWM period during which the signal is high, in nanoseconds.
//! - **Period:** total duration of one PWM cycle, in nanoseconds.
//! - **Degrees:** configured angular travel of the servo. Valid setpoints are `0..=degrees`.
//! - **Commit:** making a new duty cycle the observable, hardware-applied state.
//!
//! # Features
//!
//! - `host` (default): std build with [`pwm_host`] for tests and simulations.
//! - `embedded`: defmt logging plus the Pico 1 PWM sink in `rp_pwm`. Build with
//!   `--no-default-features --features embedded`.
#![cfg_attr(not(feature = "std"), no_std)]

// Compile-time checks: a board feature needs the embedded runtime, not the host one.
#[cfg(all(feature = "pico1", feature = "pico2"))]
compile_error!("Cannot enable both 'pico1' and 'pico2' features simultaneously");

#[cfg(all(any(feature = "pico1", feature = "pico2"), feature = "std"))]
compile_error!("Board features require `--no-default-features` (the host build provides its own critical section)");

#[macro_use]
mod fmt;

pub mod calibration;
pub mod control_surface;
mod error;
pub mod pwm;
#[cfg(feature = "host")]
pub mod pwm_host;
#[cfg(any(feature = "pico1", feature = "pico2"))]
pub mod rp_pwm;
pub mod servo;

// Re-export error types and result (used throughout)
pub use crate::error::{ConfigError, Error, Result};
