//! Seams to the collaborators that actually deliver and render email.
//!
//! The engine never performs network I/O. A dispatcher is handed the chosen
//! variant and reports either a provider delivery id or a failure; failures
//! are recorded as sends without a matching delivery.

use campaign_core::types::Variant;
use campaign_core::CampaignError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("dispatch to {recipient} failed: {reason}")]
pub struct DispatchFailure {
    pub recipient: String,
    pub reason: String,
    pub retryable: bool,
}

impl From<DispatchFailure> for CampaignError {
    fn from(failure: DispatchFailure) -> Self {
        CampaignError::Dispatch(failure.to_string())
    }
}

/// Sends a message built from a variant's content.
pub trait MessageDispatcher: Send + Sync {
    /// Returns the provider's delivery identifier.
    fn dispatch(&self, variant: &Variant, recipient: &str) -> Result<String, DispatchFailure>;
}

/// Plain-text view of a rendered template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub subject: String,
    pub body: String,
}

/// Resolves opaque content references to rendered output.
pub trait ContentProvider: Send + Sync {
    fn resolve(&self, content_ref: &str) -> Option<RenderedContent>;
}

/// Result of sending one message through an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub test_id: Uuid,
    pub variant_id: Uuid,
    pub recipient: String,
    pub delivery_id: Option<String>,
    pub failure: Option<DispatchFailure>,
    /// True when the `sent` event for this message closed the test.
    pub auto_completed: bool,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        self.delivery_id.is_some()
    }

    /// Surface a dispatch failure as an error.
    pub fn into_result(self) -> Result<String, CampaignError> {
        match (self.delivery_id, self.failure) {
            (Some(id), _) => Ok(id),
            (None, Some(failure)) => Err(failure.into()),
            (None, None) => Err(CampaignError::Dispatch(format!(
                "no delivery id for {}",
                self.recipient
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_converts_to_campaign_error() {
        let failure = DispatchFailure {
            recipient: "ops@example.com".to_string(),
            reason: "mailbox full".to_string(),
            retryable: false,
        };
        let err: CampaignError = failure.into();
        assert!(matches!(err, CampaignError::Dispatch(ref msg) if msg.contains("mailbox full")));
    }

    #[test]
    fn test_outcome_into_result() {
        let ok = SendOutcome {
            test_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            recipient: "a@example.com".to_string(),
            delivery_id: Some("msg-1".to_string()),
            failure: None,
            auto_completed: false,
        };
        assert!(ok.is_delivered());
        assert_eq!(ok.into_result().unwrap(), "msg-1");

        let failed = SendOutcome {
            test_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            recipient: "b@example.com".to_string(),
            delivery_id: None,
            failure: Some(DispatchFailure {
                recipient: "b@example.com".to_string(),
                reason: "timeout".to_string(),
                retryable: true,
            }),
            auto_completed: false,
        };
        assert!(failed.into_result().is_err());
    }
}
