//! In-memory experiment registry backed by DashMap.
//!
//! One registry is constructed per process and shared through `Arc`; tests
//! build a fresh one each. Mutations go through the map's entry guard so an
//! update to a single test group is serialized against every other update to
//! the same group.

use campaign_core::types::{CreateTestGroupRequest, TestGroup, TestStatus, Variant};
use campaign_core::{CampaignError, CampaignResult, ExperimentConfig};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Thread-safe store of every test group known to this process.
pub struct ExperimentRegistry {
    groups: DashMap<Uuid, TestGroup>,
    defaults: ExperimentConfig,
}

impl ExperimentRegistry {
    pub fn new(defaults: ExperimentConfig) -> Self {
        Self {
            groups: DashMap::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &ExperimentConfig {
        &self.defaults
    }

    /// Validate a request and store the resulting test group in `draft`.
    pub fn create_test_group(&self, req: CreateTestGroupRequest) -> CampaignResult<TestGroup> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(CampaignError::Validation("test group name is required".to_string()));
        }
        if req.variants.len() < 2 {
            return Err(CampaignError::Validation(format!(
                "a test group needs at least 2 variants, got {}",
                req.variants.len()
            )));
        }
        let mut seen = HashSet::new();
        for variant in &req.variants {
            if variant.name.trim().is_empty() {
                return Err(CampaignError::Validation("variant name is required".to_string()));
            }
            if !seen.insert(variant.name.trim().to_string()) {
                return Err(CampaignError::Validation(format!(
                    "duplicate variant name '{}'",
                    variant.name
                )));
            }
        }

        let opts = req.options;
        let confidence_threshold = opts
            .confidence_threshold
            .unwrap_or(self.defaults.default_confidence_threshold);
        if !(confidence_threshold > 0.0 && confidence_threshold <= 1.0) {
            return Err(CampaignError::Validation(format!(
                "confidence threshold must be in (0, 1], got {}",
                confidence_threshold
            )));
        }
        let audience_size = opts.audience_size.unwrap_or(self.defaults.default_audience_size);
        if audience_size == 0 {
            return Err(CampaignError::Validation(
                "audience size must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let variants = req
            .variants
            .into_iter()
            .map(|draft| {
                let mut variant = Variant::new(draft.name.trim(), draft.content);
                variant.metadata = draft.metadata;
                variant
            })
            .collect();

        let group = TestGroup {
            id: Uuid::new_v4(),
            name,
            description: req.description,
            test_type: req.test_type,
            status: TestStatus::Draft,
            variants,
            audience_size,
            progressive_optimization: opts
                .progressive_optimization
                .unwrap_or(self.defaults.progressive_optimization),
            confidence_threshold,
            statistical_significance: 0.0,
            winner: None,
            winning_reason: None,
            segment_ids: opts.segment_ids,
            metadata: opts.metadata,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };

        info!(
            test_id = %group.id,
            name = %group.name,
            test_type = %group.test_type,
            variants = group.variants.len(),
            audience_size = group.audience_size,
            "Test group created"
        );
        metrics::counter!("experiments.created", "test_type" => group.test_type.as_str())
            .increment(1);

        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub fn get_test_group(&self, id: &Uuid) -> CampaignResult<TestGroup> {
        self.groups
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| CampaignError::test_group_not_found(id))
    }

    /// Every test group, newest first.
    pub fn list_test_groups(&self) -> Vec<TestGroup> {
        let mut groups: Vec<TestGroup> = self.groups.iter().map(|r| r.value().clone()).collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        groups
    }

    pub fn list_by_status(&self, status: TestStatus) -> Vec<TestGroup> {
        self.list_test_groups()
            .into_iter()
            .filter(|g| g.status == status)
            .collect()
    }

    /// Remove a test group. Running groups must be paused or completed first.
    pub fn delete_test_group(&self, id: &Uuid) -> CampaignResult<TestGroup> {
        let status = self.update(id, |group| Ok(group.status))?;
        if status == TestStatus::Running {
            return Err(CampaignError::InvalidState(format!(
                "test group {} is running; pause or complete it before deleting",
                id
            )));
        }
        let removed = self
            .groups
            .remove_if(id, |_, group| group.status != TestStatus::Running)
            .map(|(_, group)| group)
            .ok_or_else(|| {
                CampaignError::InvalidState(format!("test group {} changed state during delete", id))
            })?;
        info!(test_id = %id, "Test group deleted");
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Run `f` against a group while holding its entry lock. `f` must check
    /// everything it needs before mutating so that an error leaves the group
    /// untouched.
    pub(crate) fn update<R>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut TestGroup) -> CampaignResult<R>,
    ) -> CampaignResult<R> {
        let mut entry = self
            .groups
            .get_mut(id)
            .ok_or_else(|| CampaignError::test_group_not_found(id))?;
        f(entry.value_mut())
    }
}

impl Default for ExperimentRegistry {
    fn default() -> Self {
        Self::new(ExperimentConfig::default())
    }
}
