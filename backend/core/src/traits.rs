use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{VendorError, VendorInitError};

/// Customer leg of an outbound call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VendorCustomer {
    /// E.164 dial string.
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Per-call assistant overrides sent alongside the assistant id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssistantOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub system_prompt: String,
    /// Operator-supplied vendor fields, passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Everything the vendor needs to place a call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VendorCallRequest {
    pub assistant_id: String,
    /// Present for outbound calls only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<VendorCustomer>,
    pub assistant_overrides: AssistantOverrides,
}

/// Handle returned by the vendor after a successful start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorCall {
    pub id: String,
    pub status: Option<String>,
}

/// A third-party voice-assistant API.
///
/// `stop` takes no call id: it ends whatever call is currently open on the
/// client, which is why the manager allows only one call at a time.
#[async_trait]
pub trait VoiceVendor: Send + Sync {
    /// Vendor name for logs (e.g., "vapi").
    fn name(&self) -> &str;

    async fn start(&self, request: &VendorCallRequest) -> Result<VendorCall, VendorError>;

    async fn stop(&self) -> Result<(), VendorError>;

    /// Whether the open call has ended on the vendor side.
    /// `Ok(None)` means the vendor cannot tell.
    async fn call_ended(&self) -> Result<Option<bool>, VendorError> {
        Ok(None)
    }
}

/// A constructed vendor client plus any non-fatal initialization warning.
pub struct VendorConnection {
    pub client: Arc<dyn VoiceVendor>,
    pub warning: Option<String>,
}

/// Builds the vendor client on first use.
pub trait VendorConnector: Send + Sync {
    fn connect(&self) -> Result<VendorConnection, VendorInitError>;
}
