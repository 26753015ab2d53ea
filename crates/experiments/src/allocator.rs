//! Variant allocation: explore/exploit ("progressive optimization") policy.
//!
//! Until a test has collected a minimum number of sends the allocator
//! spreads traffic uniformly. Afterwards the current leader receives a fixed
//! share of traffic chosen from a small set of probability bands keyed on
//! significance, and the remainder is spread over the other variants.

use crate::registry::ExperimentRegistry;
use crate::significance::{score_leader, SignificanceEstimator};
use campaign_core::types::{TestGroup, TestStatus};
use campaign_core::ExperimentConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Significance floor and leader share, highest band first.
const LEADER_BANDS: [(f64, f64); 4] = [(0.95, 0.95), (0.90, 0.90), (0.80, 0.80), (0.70, 0.70)];

/// Share of traffic given to the leader at a given significance, or `None`
/// when the leader is not trusted yet.
pub fn leader_probability(significance: f64) -> Option<f64> {
    LEADER_BANDS
        .iter()
        .find(|(floor, _)| significance > *floor)
        .map(|(_, share)| *share)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPhase {
    Exploration,
    Exploitation,
}

impl AllocationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationPhase::Exploration => "exploration",
            AllocationPhase::Exploitation => "exploitation",
        }
    }
}

/// Outcome of one allocation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub test_id: Uuid,
    pub variant_id: Uuid,
    pub phase: AllocationPhase,
    /// Leader share applied, present only in the exploitation phase.
    pub leader_probability: Option<f64>,
}

/// Minimum sends before the allocator may favor a leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupFloor {
    pub min_variant_sent: u64,
    pub min_total_sent: u64,
}

impl WarmupFloor {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            min_variant_sent: config.warmup_min_variant_sent,
            min_total_sent: config.warmup_min_total_sent,
        }
    }

    pub fn is_met(&self, group: &TestGroup) -> bool {
        let max_sent = group.variants.iter().map(|v| v.sent).max().unwrap_or(0);
        max_sent >= self.min_variant_sent && group.total_sent() >= self.min_total_sent
    }
}

impl Default for WarmupFloor {
    fn default() -> Self {
        Self::from_config(&ExperimentConfig::default())
    }
}

pub struct VariantAllocator {
    registry: Arc<ExperimentRegistry>,
    estimator: Arc<dyn SignificanceEstimator>,
    warmup: WarmupFloor,
}

impl VariantAllocator {
    pub fn new(
        registry: Arc<ExperimentRegistry>,
        estimator: Arc<dyn SignificanceEstimator>,
        warmup: WarmupFloor,
    ) -> Self {
        Self {
            registry,
            estimator,
            warmup,
        }
    }

    /// Pick the variant for the next outbound message. `None` when the test
    /// is unknown or not running.
    pub fn select_variant(&self, test_id: &Uuid) -> Option<Selection> {
        self.select_variant_with(test_id, &mut rand::thread_rng())
    }

    pub fn select_variant_with<R: Rng + ?Sized>(&self, test_id: &Uuid, rng: &mut R) -> Option<Selection> {
        let selection = self
            .registry
            .update(test_id, |group| {
                Ok(choose_variant(group, self.estimator.as_ref(), self.warmup, rng))
            })
            .ok()
            .flatten()?;

        debug!(
            test_id = %test_id,
            variant_id = %selection.variant_id,
            phase = selection.phase.as_str(),
            leader_probability = ?selection.leader_probability,
            "Variant selected"
        );
        metrics::counter!("experiments.selections", "phase" => selection.phase.as_str())
            .increment(1);
        Some(selection)
    }
}

/// Allocation policy over a single group. Stores the refreshed significance
/// on the group whenever the exploitation phase is reached.
pub(crate) fn choose_variant<R: Rng + ?Sized>(
    group: &mut TestGroup,
    estimator: &dyn SignificanceEstimator,
    warmup: WarmupFloor,
    rng: &mut R,
) -> Option<Selection> {
    if group.status != TestStatus::Running || group.variants.is_empty() {
        return None;
    }

    if !group.progressive_optimization || !warmup.is_met(group) {
        return Some(explore(group, rng));
    }

    let (best, significance) = score_leader(group, estimator)?;
    group.statistical_significance = significance;

    let Some(share) = leader_probability(significance) else {
        return Some(explore(group, rng));
    };

    let variant_id = if rng.gen::<f64>() < share {
        group.variants[best].id
    } else {
        let others: Vec<Uuid> = group
            .variants
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != best)
            .map(|(_, v)| v.id)
            .collect();
        if others.is_empty() {
            group.variants[best].id
        } else {
            others[rng.gen_range(0..others.len())]
        }
    };

    Some(Selection {
        test_id: group.id,
        variant_id,
        phase: AllocationPhase::Exploitation,
        leader_probability: Some(share),
    })
}

fn explore<R: Rng + ?Sized>(group: &TestGroup, rng: &mut R) -> Selection {
    Selection {
        test_id: group.id,
        variant_id: group.variants[rng.gen_range(0..group.variants.len())].id,
        phase: AllocationPhase::Exploration,
        leader_probability: None,
    }
}
