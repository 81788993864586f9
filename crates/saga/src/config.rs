//! Engine configuration and chaos injection.

use rand::Rng;

use crate::error::{Result, SagaError};

/// Settings fixed at engine construction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineConfig {
    /// Probability in [0, 1] that a forward step attempt is failed on purpose.
    pub chaos_probability: f64,
}

impl EngineConfig {
    /// Creates a configuration, rejecting probabilities outside [0, 1].
    pub fn new(chaos_probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&chaos_probability) {
            return Err(SagaError::InvalidChaosProbability(chaos_probability));
        }
        Ok(Self { chaos_probability })
    }
}

/// Decides whether to inject a failure into a step attempt.
#[derive(Debug, Clone, Copy)]
pub struct ChaosGate {
    probability: f64,
}

impl ChaosGate {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            probability: config.chaos_probability,
        }
    }

    /// Rolls the dice. Never fires at 0, always fires at 1.
    pub fn fires(&self) -> bool {
        if self.probability <= 0.0 {
            return false;
        }
        if self.probability >= 1.0 {
            return true;
        }
        rand::rng().random::<f64>() < self.probability
    }
}
