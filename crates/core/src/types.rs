use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CampaignError;

// ─── Test Types & Status ────────────────────────────────────────────────

/// What dimension of the email is being varied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Subject,
    Content,
    Sender,
    Time,
    Comprehensive,
}

impl TestType {
    /// The rate variants are ranked by for this kind of test.
    pub fn primary_metric(&self) -> PrimaryMetric {
        match self {
            TestType::Subject => PrimaryMetric::OpenRate,
            TestType::Content => PrimaryMetric::ClickRate,
            TestType::Comprehensive => PrimaryMetric::ConversionRate,
            _ => PrimaryMetric::OpenRate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Subject => "subject",
            TestType::Content => "content",
            TestType::Sender => "sender",
            TestType::Time => "time",
            TestType::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subject" => Ok(TestType::Subject),
            "content" => Ok(TestType::Content),
            "sender" => Ok(TestType::Sender),
            "time" => Ok(TestType::Time),
            "comprehensive" => Ok(TestType::Comprehensive),
            other => Err(CampaignError::Validation(format!(
                "unknown test type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestStatus::Draft => "draft",
            TestStatus::Running => "running",
            TestStatus::Paused => "paused",
            TestStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

// ─── Metrics & Events ───────────────────────────────────────────────────

/// Rate used to rank variants against each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryMetric {
    OpenRate,
    ClickRate,
    ReplyRate,
    ConversionRate,
}

impl PrimaryMetric {
    /// Current value of this rate on a variant.
    pub fn rate(&self, variant: &Variant) -> f64 {
        match self {
            PrimaryMetric::OpenRate => variant.open_rate,
            PrimaryMetric::ClickRate => variant.click_rate,
            PrimaryMetric::ReplyRate => variant.reply_rate,
            PrimaryMetric::ConversionRate => variant.conversion_rate,
        }
    }

    /// Numerator counter behind the rate.
    pub fn count(&self, variant: &Variant) -> u64 {
        match self {
            PrimaryMetric::OpenRate => variant.opened,
            PrimaryMetric::ClickRate => variant.clicked,
            PrimaryMetric::ReplyRate => variant.replied,
            PrimaryMetric::ConversionRate => variant.converted,
        }
    }

    /// Human label, e.g. "open rate".
    pub fn label(&self) -> &'static str {
        match self {
            PrimaryMetric::OpenRate => "open rate",
            PrimaryMetric::ClickRate => "click rate",
            PrimaryMetric::ReplyRate => "reply rate",
            PrimaryMetric::ConversionRate => "conversion rate",
        }
    }
}

/// A lifecycle event observed for a message sent with a given variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Replied,
    Converted,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 6] = [
        InteractionKind::Sent,
        InteractionKind::Delivered,
        InteractionKind::Opened,
        InteractionKind::Clicked,
        InteractionKind::Replied,
        InteractionKind::Converted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Sent => "sent",
            InteractionKind::Delivered => "delivered",
            InteractionKind::Opened => "opened",
            InteractionKind::Clicked => "clicked",
            InteractionKind::Replied => "replied",
            InteractionKind::Converted => "converted",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        InteractionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lowered)
            .ok_or_else(|| CampaignError::Validation(format!("unknown interaction '{}'", s)))
    }
}

// ─── Variants ───────────────────────────────────────────────────────────

/// Content of a variant. `content_ref` is owned by the template provider;
/// `subject` and `body` are plain-text views of the rendered output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantContent {
    pub content_ref: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// One candidate version of an email under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub name: String,
    pub content: VariantContent,
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub replied: u64,
    pub converted: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub reply_rate: f64,
    pub conversion_rate: f64,
    /// Free-form annotations. Never read by allocation or scoring.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Variant {
    pub fn new(name: impl Into<String>, content: VariantContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content,
            sent: 0,
            delivered: 0,
            opened: 0,
            clicked: 0,
            replied: 0,
            converted: 0,
            open_rate: 0.0,
            click_rate: 0.0,
            reply_rate: 0.0,
            conversion_rate: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn counter(&self, kind: InteractionKind) -> u64 {
        match kind {
            InteractionKind::Sent => self.sent,
            InteractionKind::Delivered => self.delivered,
            InteractionKind::Opened => self.opened,
            InteractionKind::Clicked => self.clicked,
            InteractionKind::Replied => self.replied,
            InteractionKind::Converted => self.converted,
        }
    }

    /// Bumps one counter by one and refreshes the derived rates.
    pub fn increment(&mut self, kind: InteractionKind) {
        match kind {
            InteractionKind::Sent => self.sent += 1,
            InteractionKind::Delivered => self.delivered += 1,
            InteractionKind::Opened => self.opened += 1,
            InteractionKind::Clicked => self.clicked += 1,
            InteractionKind::Replied => self.replied += 1,
            InteractionKind::Converted => self.converted += 1,
        }
        self.recompute_rates();
    }

    pub fn recompute_rates(&mut self) {
        if self.sent == 0 {
            self.open_rate = 0.0;
            self.click_rate = 0.0;
            self.reply_rate = 0.0;
            self.conversion_rate = 0.0;
            return;
        }
        let sent = self.sent as f64;
        self.open_rate = self.opened as f64 / sent;
        self.click_rate = self.clicked as f64 / sent;
        self.reply_rate = self.replied as f64 / sent;
        self.conversion_rate = self.converted as f64 / sent;
    }
}

/// Variant as supplied at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    pub content: VariantContent,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NewVariant {
    pub fn new(name: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            content: VariantContent {
                content_ref: format!("template:{}", name.to_ascii_lowercase()),
                subject: subject.into(),
                body: body.into(),
            },
            name,
            metadata: HashMap::new(),
        }
    }
}

// ─── Test Groups ────────────────────────────────────────────────────────

/// An experiment: the variants under comparison, its configuration,
/// and accumulated results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestGroup {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub test_type: TestType,
    pub status: TestStatus,
    pub variants: Vec<Variant>,
    pub audience_size: u64,
    pub progressive_optimization: bool,
    pub confidence_threshold: f64,
    pub statistical_significance: f64,
    pub winner: Option<Uuid>,
    pub winning_reason: Option<String>,
    #[serde(default)]
    pub segment_ids: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TestGroup {
    pub fn primary_metric(&self) -> PrimaryMetric {
        self.test_type.primary_metric()
    }

    pub fn total_sent(&self) -> u64 {
        self.variants.iter().map(|v| v.sent).sum()
    }

    pub fn variant(&self, id: &Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == *id)
    }

    pub fn variant_index(&self, id: &Uuid) -> Option<usize> {
        self.variants.iter().position(|v| v.id == *id)
    }

    /// Index of the variant with the highest primary metric. Ties go to the
    /// variant listed first.
    pub fn best_variant_index(&self) -> Option<usize> {
        let metric = self.primary_metric();
        let mut best: Option<(usize, f64)> = None;
        for (idx, variant) in self.variants.iter().enumerate() {
            let rate = metric.rate(variant);
            match best {
                Some((_, best_rate)) if rate <= best_rate => {}
                _ => best = Some((idx, rate)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    pub fn is_completed(&self) -> bool {
        self.status == TestStatus::Completed
    }
}

/// Per-group options; unset fields fall back to configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestGroupOptions {
    pub audience_size: Option<u64>,
    pub progressive_optimization: Option<bool>,
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub segment_ids: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTestGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub test_type: TestType,
    pub variants: Vec<NewVariant>,
    #[serde(default)]
    pub options: TestGroupOptions,
}
