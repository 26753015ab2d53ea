//! Test group state machine.
//!
//! `draft -> running <-> paused`, and any non-completed state `-> completed`.
//! `completed` is terminal. Conflicting transitions are reported as `false`
//! rather than errors since concurrent operator actions are expected.

use crate::registry::ExperimentRegistry;
use crate::significance::{score_leader, SignificanceEstimator};
use campaign_core::types::{TestGroup, TestStatus};
use campaign_core::CampaignResult;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct LifecycleController {
    registry: Arc<ExperimentRegistry>,
    estimator: Arc<dyn SignificanceEstimator>,
}

impl LifecycleController {
    pub fn new(registry: Arc<ExperimentRegistry>, estimator: Arc<dyn SignificanceEstimator>) -> Self {
        Self { registry, estimator }
    }

    /// `draft | paused -> running`.
    pub fn start_test(&self, id: &Uuid) -> CampaignResult<bool> {
        self.registry.update(id, |group| {
            match group.status {
                TestStatus::Draft | TestStatus::Paused => {
                    let now = Utc::now();
                    let from = group.status;
                    group.status = TestStatus::Running;
                    group.started_at.get_or_insert(now);
                    group.updated_at = now;
                    info!(test_id = %id, from = %from, "Test started");
                    Ok(true)
                }
                other => {
                    warn!(test_id = %id, status = %other, "Start ignored");
                    Ok(false)
                }
            }
        })
    }

    /// `running -> paused`. In-flight events keep being recorded.
    pub fn pause_test(&self, id: &Uuid) -> CampaignResult<bool> {
        self.registry.update(id, |group| {
            if group.status != TestStatus::Running {
                warn!(test_id = %id, status = %group.status, "Pause ignored");
                return Ok(false);
            }
            group.status = TestStatus::Paused;
            group.updated_at = Utc::now();
            info!(test_id = %id, "Test paused");
            Ok(true)
        })
    }

    /// Close the test and declare a winner if the leader is significant.
    /// Completing an already completed test returns it unchanged.
    pub fn complete_test(&self, id: &Uuid) -> CampaignResult<TestGroup> {
        self.registry.update(id, |group| {
            if !group.is_completed() {
                finalize(group, self.estimator.as_ref(), CompletionTrigger::Manual);
            }
            Ok(group.clone())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionTrigger {
    Manual,
    Automatic,
}

impl CompletionTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            CompletionTrigger::Manual => "manual",
            CompletionTrigger::Automatic => "automatic",
        }
    }
}

/// Move a group to `completed`, freezing its significance and winner.
/// Callers hold the group's entry lock and have checked it is not completed.
pub(crate) fn finalize(group: &mut TestGroup, estimator: &dyn SignificanceEstimator, trigger: CompletionTrigger) {
    let now = Utc::now();
    let metric = group.primary_metric();

    if let Some((best, significance)) = score_leader(group, estimator) {
        group.statistical_significance = significance;
        if significance >= group.confidence_threshold {
            let leader = &group.variants[best];
            group.winner = Some(leader.id);
            group.winning_reason = Some(format!(
                "Higher {} ({:.2}%)",
                metric.label(),
                metric.rate(leader) * 100.0
            ));
        }
    }

    group.status = TestStatus::Completed;
    group.completed_at = Some(now);
    group.updated_at = now;

    let outcome = if group.winner.is_some() { "winner" } else { "inconclusive" };
    info!(
        test_id = %group.id,
        trigger = trigger.as_str(),
        significance = group.statistical_significance,
        threshold = group.confidence_threshold,
        winner = ?group.winner,
        "Test completed"
    );
    metrics::counter!("experiments.completed", "outcome" => outcome, "trigger" => trigger.as_str())
        .increment(1);
}
