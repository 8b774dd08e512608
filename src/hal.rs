//! # Hardware Abstraction
//!
//! Traits for the collaborators the acquisition pipeline reads from, plus the
//! host-side implementations used when no board is attached.
//!
//! - `AnalogSource`: raw ADC code for one channel (reference channel is 0)
//! - `Clock`: millisecond tick counter used for sample timestamps
//!
//! Register programming and force/resistance conversion live outside this crate;
//! the pipeline only ever sees raw codes.

use std::time::Instant;

pub trait AnalogSource {
    fn read(&mut self, channel: usize) -> i32;
}

pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since construction
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

// Full-scale code of a 16-bit single-ended conversion at gain 1
const FULL_SCALE: i32 = 32_767;
const REFERENCE_CODE: i32 = 26_400;

/// Deterministic stand-in for the ADC: a steady reference channel and
/// slowly varying load on the sensor channels.
pub struct SyntheticAdc {
    reads: u64,
    channel_count: usize,
}

impl SyntheticAdc {
    pub fn new(channel_count: usize) -> Self {
        Self {
            reads: 0,
            channel_count,
        }
    }
}

impl AnalogSource for SyntheticAdc {
    fn read(&mut self, channel: usize) -> i32 {
        self.reads += 1;
        if channel == 0 {
            return REFERENCE_CODE;
        }
        if channel + 1 == self.channel_count && self.channel_count > 3 {
            // Unpopulated input floats near zero
            return (self.reads % 4) as i32;
        }

        let tick = self.reads / self.channel_count.max(1) as u64;
        let phase = (tick as f64 / 50.0) + channel as f64;
        let load = (phase.sin() + 1.0) / 2.0;
        (load * (REFERENCE_CODE as f64 * 0.8)) as i32 % FULL_SCALE
    }
}
