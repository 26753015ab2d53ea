//! Result analysis: human-readable insights and recommendations.

use crate::significance::{score_leader, SignificanceEstimator};
use campaign_core::types::{PrimaryMetric, TestGroup, TestType, Variant};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const SHORT_SUBJECT: usize = 30;
const LONG_SUBJECT: usize = 60;
const CONCISE_BODY: usize = 500;
const LONG_BODY: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_id: Uuid,
    pub name: String,
    pub sent: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub reply_rate: f64,
    pub conversion_rate: f64,
    /// Relative lift of the primary metric over the pooled other variants.
    pub lift: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestAnalysis {
    pub test_id: Uuid,
    pub metric: PrimaryMetric,
    pub winner: Option<Uuid>,
    pub is_significant: bool,
    pub significance_level: f64,
    pub variant_summaries: Vec<VariantSummary>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

pub struct InsightGenerator {
    estimator: Arc<dyn SignificanceEstimator>,
}

impl InsightGenerator {
    pub fn new(estimator: Arc<dyn SignificanceEstimator>) -> Self {
        Self { estimator }
    }

    /// Summarize a test group without touching its state. Completed groups
    /// report their frozen significance and winner.
    pub fn analyze_results(&self, group: &TestGroup) -> TestAnalysis {
        let metric = group.primary_metric();
        let scored = score_leader(group, self.estimator.as_ref());

        let (significance, winner) = if group.is_completed() {
            (group.statistical_significance, group.winner)
        } else {
            match scored {
                Some((best, sig)) if sig >= group.confidence_threshold => {
                    (sig, Some(group.variants[best].id))
                }
                Some((_, sig)) => (sig, None),
                None => (0.0, None),
            }
        };
        let is_significant = significance >= group.confidence_threshold;

        let mut insights = Vec::new();
        let mut recommendations = Vec::new();

        match winner.and_then(|id| group.variant(&id)) {
            Some(leader) => {
                insights.push(format!(
                    "Variant \"{}\" won with a {} of {:.2}% ({:.1}% confidence)",
                    leader.name,
                    metric.label(),
                    metric.rate(leader) * 100.0,
                    significance * 100.0
                ));
                match group.test_type {
                    TestType::Subject => subject_insights(&leader.content.subject, &mut insights),
                    TestType::Content => content_insights(&leader.content.body, &mut insights),
                    TestType::Sender => recommendations
                        .push("Use the winning sender identity for upcoming sends".to_string()),
                    TestType::Time => recommendations
                        .push("Schedule future sends in the winning time slot".to_string()),
                    TestType::Comprehensive => recommendations.push(
                        "Roll out the winning combination of subject, content, and sender"
                            .to_string(),
                    ),
                }
                recommendations.push(format!(
                    "Apply the patterns from \"{}\" to future campaigns",
                    leader.name
                ));
            }
            None => {
                insights.push(format!(
                    "No statistically significant winner yet: {:.1}% confidence against a {:.1}% threshold",
                    significance * 100.0,
                    group.confidence_threshold * 100.0
                ));
                recommendations
                    .push("Run the test longer or increase the audience size".to_string());
                recommendations
                    .push("Test more clearly differentiated variants".to_string());
            }
        }

        TestAnalysis {
            test_id: group.id,
            metric,
            winner,
            is_significant,
            significance_level: significance,
            variant_summaries: summarize(group, metric),
            insights,
            recommendations,
        }
    }
}

fn summarize(group: &TestGroup, metric: PrimaryMetric) -> Vec<VariantSummary> {
    group
        .variants
        .iter()
        .map(|v| VariantSummary {
            variant_id: v.id,
            name: v.name.clone(),
            sent: v.sent,
            open_rate: v.open_rate,
            click_rate: v.click_rate,
            reply_rate: v.reply_rate,
            conversion_rate: v.conversion_rate,
            lift: lift_over_others(group, v, metric),
        })
        .collect()
}

fn lift_over_others(group: &TestGroup, variant: &Variant, metric: PrimaryMetric) -> Option<f64> {
    let (count, sent) = group
        .variants
        .iter()
        .filter(|o| o.id != variant.id)
        .fold((0u64, 0u64), |(c, s), o| (c + metric.count(o), s + o.sent));
    if sent == 0 || variant.sent == 0 || count == 0 {
        return None;
    }
    let others_rate = count as f64 / sent as f64;
    Some((metric.rate(variant) - others_rate) / others_rate)
}

fn subject_insights(subject: &str, insights: &mut Vec<String>) {
    let len = subject.chars().count();
    if len == 0 {
        return;
    }
    if len < SHORT_SUBJECT {
        insights.push(format!("Short subject line ({} characters) performed well", len));
    } else if len > LONG_SUBJECT {
        insights.push(format!("Longer subject line ({} characters) performed well", len));
    }
    if subject.contains('?') {
        insights.push("Question in the subject line drove engagement".to_string());
    }
    if subject.contains(':') {
        insights.push("Colon-structured subject line was effective".to_string());
    }
    if subject.chars().any(|c| c.is_ascii_digit()) {
        insights.push("Numbers in the subject line increased opens".to_string());
    }
    if subject.contains('!') {
        insights.push("Exclamation added urgency to the subject line".to_string());
    }
}

fn content_insights(body: &str, insights: &mut Vec<String>) {
    let len = body.chars().count();
    if len == 0 {
        return;
    }
    if len < CONCISE_BODY {
        insights.push(format!("Concise content ({} characters) drove clicks", len));
    } else if len > LONG_BODY {
        insights.push(format!("Detailed long-form content ({} characters) performed well", len));
    }
    let lowered = body.to_ascii_lowercase();
    if lowered.contains("<img") {
        insights.push("Images in the body supported engagement".to_string());
    }
    if lowered.contains("<a ") || lowered.contains("href=") {
        insights.push("Clear links gave readers an obvious next step".to_string());
    }
    if lowered.contains("<table") {
        insights.push("Structured table layout performed well".to_string());
    }
}
