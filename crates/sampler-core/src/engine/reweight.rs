use super::config::ConfigError;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Guards the floor against products like `0.1 * 30` landing just below an integer.
const ROUNDING_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum ReweightError {
    #[error("At least one distance is required")]
    NoDistances,
    #[error("Distance of walker {walker} must be finite and non-negative, got {value}")]
    InvalidDistance { walker: usize, value: f64 },
    #[error("Swarm size must be positive")]
    EmptySwarm,
}

/// How walker distances to the swarm center are turned into weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplorationPolicy {
    /// `exp(-(d/mean)^2)`: favors walkers near the center.
    #[default]
    SingleState,
    /// `sigmoid((d/mean)^2)`: favors dispersed walkers.
    MultiState,
}

impl ExplorationPolicy {
    pub fn weight(self, relative_distance: f64) -> f64 {
        let x = relative_distance * relative_distance;
        match self {
            ExplorationPolicy::SingleState => (-x).exp(),
            ExplorationPolicy::MultiState => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

impl fmt::Display for ExplorationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplorationPolicy::SingleState => f.write_str("single_state"),
            ExplorationPolicy::MultiState => f.write_str("multi_state"),
        }
    }
}

impl FromStr for ExplorationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_state" | "single-state" => Ok(ExplorationPolicy::SingleState),
            "multi_state" | "multi-state" => Ok(ExplorationPolicy::MultiState),
            other => Err(ConfigError::UnknownExplorationPolicy(other.to_string())),
        }
    }
}

/// Splits a fixed replica budget among walkers according to their distance
/// to the swarm center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaReweighter {
    pub swarm_size: usize,
    pub policy: ExplorationPolicy,
}

impl ReplicaReweighter {
    pub fn new(swarm_size: usize, policy: ExplorationPolicy) -> Self {
        Self { swarm_size, policy }
    }

    pub fn weights(&self, distances: &[f64]) -> Result<Vec<f64>, ReweightError> {
        if distances.is_empty() {
            return Err(ReweightError::NoDistances);
        }
        if let Some((walker, &value)) = distances
            .iter()
            .enumerate()
            .find(|(_, d)| !d.is_finite() || **d < 0.0)
        {
            return Err(ReweightError::InvalidDistance { walker, value });
        }
        let mean = distances.iter().sum::<f64>() / distances.len() as f64;
        if mean == 0.0 {
            return Ok(vec![1.0; distances.len()]);
        }
        Ok(distances
            .iter()
            .map(|d| self.policy.weight(d / mean))
            .collect())
    }

    /// Computes one replica count per walker; the counts always sum to `swarm_size`.
    ///
    /// Each pass considers the `r` highest-weighted walkers, where `r` is the
    /// budget still unassigned, and gives each `floor(share * r)` replicas with
    /// shares renormalized over the considered walkers. Equal weights keep
    /// their original order.
    pub fn compute(&self, distances: &[f64]) -> Result<Vec<usize>, ReweightError> {
        if self.swarm_size == 0 {
            return Err(ReweightError::EmptySwarm);
        }
        let weights = self.weights(distances)?;

        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));

        let mut counts = vec![0usize; weights.len()];
        let mut assigned = 0usize;
        let mut remaining = self.swarm_size;
        while remaining > 0 {
            let considered = &order[..remaining.min(order.len())];
            let weight_sum: f64 = considered.iter().map(|&i| weights[i]).sum();

            for &walker in considered {
                let share = if weight_sum > 0.0 {
                    weights[walker] / weight_sum
                } else {
                    1.0 / considered.len() as f64
                };
                let replicas = (share * remaining as f64 + ROUNDING_TOLERANCE).floor() as usize;
                counts[walker] += replicas;
                assigned += replicas;
                if assigned >= self.swarm_size {
                    counts[walker] -= assigned - self.swarm_size;
                    assigned = self.swarm_size;
                    break;
                }
            }

            let left = self.swarm_size - assigned;
            if left == remaining {
                counts[order[0]] += 1;
                assigned += 1;
            }
            remaining = self.swarm_size - assigned;
            debug!("Replica budget left after pass: {}", remaining);
        }
        Ok(counts)
    }
}
