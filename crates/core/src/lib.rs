//! Shared types, errors, and configuration for the email experiment engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, ExperimentConfig, SignificanceMethod};
pub use error::{CampaignError, CampaignResult};
