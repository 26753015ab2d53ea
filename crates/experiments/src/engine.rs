//! Experiment engine facade: one shared registry wired to the allocator,
//! tracker, lifecycle controller, and insight generator.

use crate::allocator::{Selection, VariantAllocator, WarmupFloor};
use crate::dispatch::{ContentProvider, MessageDispatcher, SendOutcome};
use crate::insights::{InsightGenerator, TestAnalysis};
use crate::lifecycle::LifecycleController;
use crate::registry::ExperimentRegistry;
use crate::significance::{estimator_for, SignificanceEstimator};
use crate::tracker::{InteractionEvent, InteractionTracker, TrackOutcome};
use campaign_core::types::{CreateTestGroupRequest, InteractionKind, TestGroup};
use campaign_core::{CampaignResult, ExperimentConfig};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ExperimentEngine {
    registry: Arc<ExperimentRegistry>,
    estimator: Arc<dyn SignificanceEstimator>,
    allocator: VariantAllocator,
    tracker: InteractionTracker,
    lifecycle: LifecycleController,
    insights: InsightGenerator,
}

impl ExperimentEngine {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self::with_estimator(config, estimator_for(config.significance_method))
    }

    pub fn with_estimator(config: &ExperimentConfig, estimator: Arc<dyn SignificanceEstimator>) -> Self {
        let registry = Arc::new(ExperimentRegistry::new(config.clone()));
        info!(
            estimator = estimator.name(),
            warmup_min_variant_sent = config.warmup_min_variant_sent,
            warmup_min_total_sent = config.warmup_min_total_sent,
            "Experiment engine initialized"
        );
        Self {
            allocator: VariantAllocator::new(
                registry.clone(),
                estimator.clone(),
                WarmupFloor::from_config(config),
            ),
            tracker: InteractionTracker::new(registry.clone(), estimator.clone()),
            lifecycle: LifecycleController::new(registry.clone(), estimator.clone()),
            insights: InsightGenerator::new(estimator.clone()),
            registry,
            estimator,
        }
    }

    pub fn registry(&self) -> &Arc<ExperimentRegistry> {
        &self.registry
    }

    pub fn estimator(&self) -> &Arc<dyn SignificanceEstimator> {
        &self.estimator
    }

    // ─── Registry ──────────────────────────────────────────────────────────

    pub fn create_test_group(&self, req: CreateTestGroupRequest) -> CampaignResult<TestGroup> {
        self.registry.create_test_group(req)
    }

    pub fn get_test_group(&self, id: &Uuid) -> CampaignResult<TestGroup> {
        self.registry.get_test_group(id)
    }

    pub fn list_test_groups(&self) -> Vec<TestGroup> {
        self.registry.list_test_groups()
    }

    pub fn delete_test_group(&self, id: &Uuid) -> CampaignResult<TestGroup> {
        self.registry.delete_test_group(id)
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    pub fn start_test(&self, id: &Uuid) -> CampaignResult<bool> {
        self.lifecycle.start_test(id)
    }

    pub fn pause_test(&self, id: &Uuid) -> CampaignResult<bool> {
        self.lifecycle.pause_test(id)
    }

    pub fn complete_test(&self, id: &Uuid) -> CampaignResult<TestGroup> {
        self.lifecycle.complete_test(id)
    }

    // ─── Allocation & Tracking ─────────────────────────────────────────────

    pub fn select_variant(&self, test_id: &Uuid) -> Option<Selection> {
        self.allocator.select_variant(test_id)
    }

    pub fn select_variant_with<R: Rng + ?Sized>(&self, test_id: &Uuid, rng: &mut R) -> Option<Selection> {
        self.allocator.select_variant_with(test_id, rng)
    }

    pub fn track_interaction(
        &self,
        test_id: &Uuid,
        variant_id: &Uuid,
        kind: InteractionKind,
    ) -> CampaignResult<TrackOutcome> {
        self.tracker.track_interaction(test_id, variant_id, kind)
    }

    pub fn track_batch(&self, test_id: &Uuid, events: &[InteractionEvent]) -> CampaignResult<Vec<TrackOutcome>> {
        self.tracker.track_batch(test_id, events)
    }

    // ─── Reporting ─────────────────────────────────────────────────────────

    pub fn analyze_results(&self, group: &TestGroup) -> TestAnalysis {
        self.insights.analyze_results(group)
    }

    pub fn analyze(&self, test_id: &Uuid) -> CampaignResult<TestAnalysis> {
        let group = self.registry.get_test_group(test_id)?;
        Ok(self.insights.analyze_results(&group))
    }

    // ─── Collaborators ─────────────────────────────────────────────────────

    /// Allocate a variant for `recipient`, record the send, and hand the
    /// message to `dispatcher`. `Ok(None)` when the test is not accepting
    /// traffic. A dispatch failure is reported in the outcome; only a
    /// successful dispatch records `delivered`.
    pub fn send(
        &self,
        test_id: &Uuid,
        recipient: &str,
        dispatcher: &dyn MessageDispatcher,
    ) -> CampaignResult<Option<SendOutcome>> {
        self.send_with(test_id, recipient, dispatcher, &mut rand::thread_rng())
    }

    pub fn send_with<R: Rng + ?Sized>(
        &self,
        test_id: &Uuid,
        recipient: &str,
        dispatcher: &dyn MessageDispatcher,
        rng: &mut R,
    ) -> CampaignResult<Option<SendOutcome>> {
        let Some(selection) = self.allocator.select_variant_with(test_id, rng) else {
            return Ok(None);
        };
        let sent = self
            .tracker
            .track_interaction(test_id, &selection.variant_id, InteractionKind::Sent)?;

        let mut outcome = SendOutcome {
            test_id: *test_id,
            variant_id: selection.variant_id,
            recipient: recipient.to_string(),
            delivery_id: None,
            failure: None,
            auto_completed: sent.auto_completed,
        };

        match dispatcher.dispatch(&sent.variant, recipient) {
            Ok(delivery_id) => {
                self.tracker
                    .track_interaction(test_id, &selection.variant_id, InteractionKind::Delivered)?;
                outcome.delivery_id = Some(delivery_id);
            }
            Err(failure) => {
                warn!(
                    test_id = %test_id,
                    variant_id = %selection.variant_id,
                    reason = %failure.reason,
                    retryable = failure.retryable,
                    "Dispatch failed"
                );
                metrics::counter!("experiments.dispatch_failures").increment(1);
                outcome.failure = Some(failure);
            }
        }
        Ok(Some(outcome))
    }

    /// Refresh the plain-text subject/body views of every variant from the
    /// content provider. Returns how many variants were updated.
    pub fn sync_content(&self, test_id: &Uuid, provider: &dyn ContentProvider) -> CampaignResult<usize> {
        self.registry.update(test_id, |group| {
            let mut updated = 0;
            for variant in &mut group.variants {
                if let Some(rendered) = provider.resolve(&variant.content.content_ref) {
                    variant.content.subject = rendered.subject;
                    variant.content.body = rendered.body;
                    updated += 1;
                }
            }
            if updated > 0 {
                group.updated_at = Utc::now();
            }
            Ok(updated)
        })
    }
}

impl Default for ExperimentEngine {
    fn default() -> Self {
        Self::from_config(&ExperimentConfig::default())
    }
}
