use serde::Deserialize;
use std::path::Path;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_EXPRESS__` and optional TOML config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub experiments: ExperimentConfig,
}

// ─── Experiment Config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_confidence_threshold")]
    pub default_confidence_threshold: f64,
    #[serde(default = "default_audience_size")]
    pub default_audience_size: u64,
    #[serde(default = "default_progressive_optimization")]
    pub progressive_optimization: bool,
    /// Sends one variant needs before allocation may favor a leader.
    #[serde(default = "default_warmup_min_variant_sent")]
    pub warmup_min_variant_sent: u64,
    /// Sends across all variants needed before allocation may favor a leader.
    #[serde(default = "default_warmup_min_total_sent")]
    pub warmup_min_total_sent: u64,
    #[serde(default)]
    pub significance_method: SignificanceMethod,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceMethod {
    #[default]
    Heuristic,
    ZTest,
}

fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_confidence_threshold() -> f64 { 0.95 }
fn default_audience_size() -> u64 { 1000 }
fn default_progressive_optimization() -> bool { true }
fn default_warmup_min_variant_sent() -> u64 { 50 }
fn default_warmup_min_total_sent() -> u64 { 100 }

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            default_confidence_threshold: default_confidence_threshold(),
            default_audience_size: default_audience_size(),
            progressive_optimization: default_progressive_optimization(),
            warmup_min_variant_sent: default_warmup_min_variant_sent(),
            warmup_min_total_sent: default_warmup_min_total_sent(),
            significance_method: SignificanceMethod::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), crate::CampaignError> {
        if !(self.default_confidence_threshold > 0.0 && self.default_confidence_threshold <= 1.0) {
            return Err(crate::CampaignError::Config(format!(
                "default_confidence_threshold must be in (0, 1], got {}",
                self.default_confidence_threshold
            )));
        }
        if self.default_audience_size == 0 {
            return Err(crate::CampaignError::Config(
                "default_audience_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            log_json: false,
            experiments: ExperimentConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::build(None)
    }

    /// Load configuration from a TOML file, with environment variables
    /// taking precedence.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        Self::build(Some(path))
    }

    fn build(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_EXPRESS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.experiments.default_confidence_threshold, 0.95);
        assert_eq!(config.experiments.warmup_min_variant_sent, 50);
        assert_eq!(config.experiments.warmup_min_total_sent, 100);
        assert_eq!(
            config.experiments.significance_method,
            SignificanceMethod::Heuristic
        );
        assert!(config.experiments.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let config = ExperimentConfig {
            default_confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("campaign-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("experiments.toml");
        std::fs::write(
            &path,
            "node_id = \"node-test\"\n\n[experiments]\nsignificance_method = \"z_test\"\nwarmup_min_total_sent = 40\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.node_id, "node-test");
        assert_eq!(config.experiments.significance_method, SignificanceMethod::ZTest);
        assert_eq!(config.experiments.warmup_min_total_sent, 40);
        assert_eq!(config.experiments.default_audience_size, 1000);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
