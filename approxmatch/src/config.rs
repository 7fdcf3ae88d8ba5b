use serde::{Deserialize, Serialize};

use crate::driver::ScaleSchedule;
use crate::{MatchingError, Result};

pub const DEFAULT_EPSILON: f64 = 0.5;

/// Tuning of the scaling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target approximation error; smaller values mean more scales, more
    /// phases and longer paths.
    pub epsilon: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl Config {
    pub fn new(epsilon: f64) -> Self {
        Config { epsilon }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epsilon > 0.0 && self.epsilon <= 1.0 {
            Ok(())
        } else {
            Err(MatchingError::InvalidEpsilon(self.epsilon))
        }
    }

    pub fn schedule(&self) -> Result<ScaleSchedule> {
        self.validate()?;
        Ok(ScaleSchedule::new(self.epsilon))
    }
}
