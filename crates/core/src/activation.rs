use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Stabiliser used by the log similarity, matching the training code.
pub const LOG_EPSILON: f32 = 1e-4;

/// Distance-to-similarity transform configured on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    /// `ln((d + 1) / (d + eps))`
    #[default]
    Log,
    /// `-d`, shifted by the prototype volume when reported.
    Linear,
}

impl ActivationMode {
    /// Similarity exactly as the network feeds it into the last layer.
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            Self::Log => ((distance + 1.0) / (distance + LOG_EPSILON)).ln(),
            Self::Linear => -distance,
        }
    }

    /// Additive offset applied on top of [`Self::similarity`] for reporting.
    ///
    /// Linear similarities are shifted by the largest possible distance so the
    /// scores stay non-negative, the same convention the push stage uses.
    pub fn offset(self, prototype_volume: usize) -> f32 {
        match self {
            Self::Log => 0.0,
            Self::Linear => prototype_volume as f32,
        }
    }

    /// Activation score used for ranking and rendering.
    pub fn activation(self, distance: f32, prototype_volume: usize) -> f32 {
        self.similarity(distance) + self.offset(prototype_volume)
    }

    /// Score reached at zero distance.
    pub fn max_activation(self, prototype_volume: usize) -> f32 {
        self.activation(0.0, prototype_volume)
    }

    pub fn activations(self, distances: &[f32], prototype_volume: usize) -> Vec<f32> {
        distances
            .iter()
            .map(|&d| self.activation(d, prototype_volume))
            .collect()
    }
}

impl fmt::Display for ActivationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => f.write_str("log"),
            Self::Linear => f.write_str("linear"),
        }
    }
}

impl FromStr for ActivationMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "linear" => Ok(Self::Linear),
            other => anyhow::bail!("unsupported prototype activation function `{other}`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_similarity_at_zero_distance() {
        let expected = (1.0f32 / LOG_EPSILON).ln();
        assert!((ActivationMode::Log.max_activation(128) - expected).abs() < 1e-4);
    }

    #[test]
    fn linear_offset_uses_volume() {
        assert_eq!(ActivationMode::Linear.activation(0.0, 128), 128.0);
        assert_eq!(ActivationMode::Linear.activation(28.0, 128), 100.0);
        assert_eq!(ActivationMode::Linear.similarity(28.0), -28.0);
    }

    #[test]
    fn activation_decreases_with_distance() {
        for mode in [ActivationMode::Log, ActivationMode::Linear] {
            let mut previous = f32::INFINITY;
            for step in 0..200 {
                let distance = step as f32 * 0.37;
                let value = mode.activation(distance, 64);
                assert!(
                    value < previous,
                    "{mode} not decreasing at d={distance}: {value} >= {previous}"
                );
                previous = value;
            }
        }
    }

    #[test]
    fn parses_names() {
        assert_eq!("log".parse::<ActivationMode>().unwrap(), ActivationMode::Log);
        assert_eq!(" Linear ".parse::<ActivationMode>().unwrap(), ActivationMode::Linear);
        assert!("softplus".parse::<ActivationMode>().is_err());
    }
}
