//! Microphone loudness → blow-out detection.

use log::debug;

use crate::config::{BLOW_THRESHOLD, FFT_SIZE};
use crate::input::Microphone;
use crate::machine::{CakeState, CardEvent, EventQueue};
use crate::scheduler::CancelToken;

/// Arithmetic mean of byte-scaled frequency bins.
pub fn mean_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| b as u32).sum();
    sum as f32 / bins.len() as f32
}

#[derive(Debug)]
pub struct AudioLevelEvaluator {
    bins: Vec<u8>,
    token: CancelToken,
    last_level: f32,
}

impl AudioLevelEvaluator {
    pub fn new(token: CancelToken) -> Self {
        Self {
            bins: vec![0; FFT_SIZE / 2],
            token,
            last_level: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.token.is_live()
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    #[cfg(test)]
    pub fn last_level(&self) -> f32 {
        self.last_level
    }

    /// One animation-frame iteration. No-op once the token is cancelled.
    pub fn tick(&mut self, mic: &mut dyn Microphone, cake: CakeState, queue: &mut EventQueue) {
        if self.token.is_cancelled() {
            return;
        }
        mic.frequency_data(&mut self.bins);
        self.evaluate(cake, queue);
    }

    fn evaluate(&mut self, cake: CakeState, queue: &mut EventQueue) {
        self.last_level = mean_level(&self.bins);
        if self.last_level > BLOW_THRESHOLD && cake == CakeState::Lit {
            debug!("audio: level {:.1} over threshold", self.last_level);
            queue.push(CardEvent::Blow);
        }
    }
}
