//! Interaction tracking: per-variant delivery and engagement counters.
//!
//! Each event bumps one counter and refreshes the variant's rates while the
//! group's entry lock is held, so concurrent events for the same variant are
//! never lost and rates always reflect the post-increment counters.

use crate::lifecycle::{finalize, CompletionTrigger};
use crate::registry::ExperimentRegistry;
use crate::significance::{score_leader, SignificanceEstimator};
use campaign_core::types::{InteractionKind, TestGroup, TestStatus, Variant};
use campaign_core::{CampaignError, CampaignResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Variant state after an event was applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackOutcome {
    pub variant: Variant,
    /// True when this event closed the test.
    pub auto_completed: bool,
}

/// One event in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub variant_id: Uuid,
    pub kind: InteractionKind,
}

pub struct InteractionTracker {
    registry: Arc<ExperimentRegistry>,
    estimator: Arc<dyn SignificanceEstimator>,
}

impl InteractionTracker {
    pub fn new(registry: Arc<ExperimentRegistry>, estimator: Arc<dyn SignificanceEstimator>) -> Self {
        Self { registry, estimator }
    }

    pub fn track_interaction(
        &self,
        test_id: &Uuid,
        variant_id: &Uuid,
        kind: InteractionKind,
    ) -> CampaignResult<TrackOutcome> {
        let outcome = self.registry.update(test_id, |group| {
            apply_interaction(group, variant_id, kind, self.estimator.as_ref())
        })?;

        debug!(
            test_id = %test_id,
            variant_id = %variant_id,
            kind = kind.as_str(),
            sent = outcome.variant.sent,
            auto_completed = outcome.auto_completed,
            "Interaction tracked"
        );
        metrics::counter!("experiments.interactions", "kind" => kind.as_str()).increment(1);
        Ok(outcome)
    }

    /// Apply events in order. Stops at the first failing event; events
    /// before it stay applied.
    pub fn track_batch(&self, test_id: &Uuid, events: &[InteractionEvent]) -> CampaignResult<Vec<TrackOutcome>> {
        events
            .iter()
            .map(|e| self.track_interaction(test_id, &e.variant_id, e.kind))
            .collect()
    }
}

/// Record one event on a group the caller has locked. All checks run before
/// the first write.
pub(crate) fn apply_interaction(
    group: &mut TestGroup,
    variant_id: &Uuid,
    kind: InteractionKind,
    estimator: &dyn SignificanceEstimator,
) -> CampaignResult<TrackOutcome> {
    let idx = group
        .variant_index(variant_id)
        .ok_or_else(|| CampaignError::variant_not_found(variant_id))?;

    let variant = &group.variants[idx];
    if kind != InteractionKind::Sent && variant.counter(kind) >= variant.sent {
        warn!(
            test_id = %group.id,
            variant_id = %variant_id,
            kind = kind.as_str(),
            "Rejected event exceeding sent count"
        );
        return Err(CampaignError::Validation(format!(
            "{} count for variant {} would exceed sent ({})",
            kind, variant_id, variant.sent
        )));
    }

    group.variants[idx].increment(kind);
    group.updated_at = Utc::now();

    let mut auto_completed = false;
    if kind == InteractionKind::Sent && group.status == TestStatus::Running {
        if let Some((_, significance)) = score_leader(group, estimator) {
            group.statistical_significance = significance;
            if group.total_sent() >= group.audience_size && significance >= group.confidence_threshold {
                finalize(group, estimator, CompletionTrigger::Automatic);
                auto_completed = true;
            }
        }
    }

    Ok(TrackOutcome {
        variant: group.variants[idx].clone(),
        auto_completed,
    })
}
