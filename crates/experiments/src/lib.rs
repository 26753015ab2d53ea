//! Email experiment engine: variant registry, progressive-optimization
//! allocation, interaction tracking, significance estimation, lifecycle
//! control, and result insights.

pub mod allocator;
pub mod dispatch;
pub mod engine;
pub mod insights;
pub mod lifecycle;
pub mod registry;
pub mod significance;
pub mod tracker;

pub use allocator::{AllocationPhase, Selection, VariantAllocator, WarmupFloor};
pub use dispatch::{ContentProvider, DispatchFailure, MessageDispatcher, RenderedContent, SendOutcome};
pub use engine::ExperimentEngine;
pub use insights::{InsightGenerator, TestAnalysis};
pub use lifecycle::LifecycleController;
pub use registry::ExperimentRegistry;
pub use significance::{HeuristicEstimator, SignificanceEstimator, ZTestEstimator};
pub use tracker::{InteractionEvent, InteractionTracker, TrackOutcome};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::registry::ExperimentRegistry;
    use campaign_core::types::{
        CreateTestGroupRequest, NewVariant, TestGroup, TestGroupOptions, TestStatus, TestType,
        Variant,
    };
    use std::sync::Arc;
    use uuid::Uuid;

    pub fn request(variants: usize) -> CreateTestGroupRequest {
        CreateTestGroupRequest {
            name: "Spring sale subject lines".to_string(),
            description: String::new(),
            test_type: TestType::Subject,
            variants: (0..variants)
                .map(|i| NewVariant::new(format!("V{}", i), format!("Subject {}", i), "<p>Body</p>"))
                .collect(),
            options: TestGroupOptions::default(),
        }
    }

    /// Set `sent` and the counter behind the group's primary metric.
    fn set_counts(variant: &mut Variant, test_type: TestType, sent: u64, hits: u64) {
        variant.sent = sent;
        match test_type {
            TestType::Content => variant.clicked = hits,
            TestType::Comprehensive => variant.converted = hits,
            _ => variant.opened = hits,
        }
        variant.recompute_rates();
    }

    /// A running group with one variant per `(sent, hits)` pair.
    pub fn group_with_counts(test_type: TestType, counts: &[(u64, u64)]) -> TestGroup {
        let registry = ExperimentRegistry::default();
        let mut req = request(counts.len().max(2));
        req.test_type = test_type;
        let mut group = registry.create_test_group(req).unwrap();
        group.variants.truncate(counts.len());
        for (variant, (sent, hits)) in group.variants.iter_mut().zip(counts) {
            set_counts(variant, test_type, *sent, *hits);
        }
        group.status = TestStatus::Running;
        group
    }

    pub fn draft_registry(variants: usize) -> (Arc<ExperimentRegistry>, Uuid) {
        let registry = Arc::new(ExperimentRegistry::default());
        let id = registry.create_test_group(request(variants)).unwrap().id;
        (registry, id)
    }

    pub fn running_registry(counts: &[(u64, u64)]) -> (Arc<ExperimentRegistry>, Uuid) {
        running_registry_with(counts, TestGroupOptions::default())
    }

    pub fn running_registry_with(
        counts: &[(u64, u64)],
        options: TestGroupOptions,
    ) -> (Arc<ExperimentRegistry>, Uuid) {
        let registry = Arc::new(ExperimentRegistry::default());
        let mut req = request(counts.len());
        req.options = options;
        let id = registry.create_test_group(req).unwrap().id;
        registry
            .update(&id, |group| {
                for (variant, (sent, hits)) in group.variants.iter_mut().zip(counts) {
                    set_counts(variant, TestType::Subject, *sent, *hits);
                }
                group.status = TestStatus::Running;
                Ok(())
            })
            .unwrap();
        (registry, id)
    }
}
