use thiserror::Error;

use crate::types::CallStatus;

/// Errors surfaced by the call-session manager.
///
/// Every variant is recoverable from the operator's point of view; the manager
/// turns them into a `CallOutcome` before they reach the console.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("a call is already in progress")]
    AlreadyInProgress,

    #[error("Invalid phone number format: {0}")]
    InvalidPhoneNumber(String),

    #[error("outbound calls require a phone number")]
    MissingPhoneNumber,

    #[error("voice vendor initialization failed: {0}")]
    VendorInit(String),

    #[error("voice vendor call failed: {0}")]
    VendorCall(String),

    #[error("no active call to stop")]
    NoActiveCall,

    #[error("call start cancelled by shutdown")]
    StartCancelled,

    #[error("invalid call status transition: {from} -> {to}")]
    InvalidTransition { from: CallStatus, to: CallStatus },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CallError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInProgress => "already_in_progress",
            Self::InvalidPhoneNumber(_) => "invalid_phone_number",
            Self::MissingPhoneNumber => "missing_phone_number",
            Self::VendorInit(_) => "vendor_init",
            Self::VendorCall(_) => "vendor_call",
            Self::NoActiveCall => "no_active_call",
            Self::StartCancelled => "start_cancelled",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Other(_) => "internal",
        }
    }

    /// Input problems the operator can fix; these never touch analytics.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidPhoneNumber(_) | Self::MissingPhoneNumber)
    }
}

/// Failure to construct a vendor client.
///
/// These are fatal to a start attempt. Benign conditions (no local audio
/// device) are reported through `VendorConnection::warning` instead.
#[derive(Debug, Error)]
pub enum VendorInitError {
    #[error("voice vendor credentials are missing")]
    MissingCredentials,

    #[error("invalid voice vendor configuration: {0}")]
    InvalidConfig(String),

    #[error("voice vendor client could not be built: {0}")]
    Http(String),
}

/// Errors raised by a vendor client while starting, stopping, or polling a call.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("vendor API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("no call is open on the vendor client")]
    NoOpenCall,

    #[error("vendor call {0} has no control URL to hang up through")]
    NoControlUrl(String),

    #[error("vendor response could not be decoded: {0}")]
    Decode(String),

    #[error("vendor transport error: {0}")]
    Transport(String),
}

impl From<VendorInitError> for CallError {
    fn from(err: VendorInitError) -> Self {
        CallError::VendorInit(err.to_string())
    }
}

impl From<VendorError> for CallError {
    fn from(err: VendorError) -> Self {
        CallError::VendorCall(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_in_progress_message() {
        assert!(CallError::AlreadyInProgress
            .to_string()
            .contains("already in progress"));
    }

    #[test]
    fn test_invalid_phone_message() {
        let err = CallError::InvalidPhoneNumber("123".into());
        assert_eq!(err.to_string(), "Invalid phone number format: 123");
    }

    #[test]
    fn test_vendor_error_conversion() {
        let err: CallError = VendorError::Api {
            status: 400,
            message: "assistant not found".into(),
        }
        .into();
        assert!(matches!(err, CallError::VendorCall(_)));
        assert!(err.to_string().contains("assistant not found"));
    }

    #[test]
    fn test_transition_message() {
        let err = CallError::InvalidTransition {
            from: CallStatus::Ended,
            to: CallStatus::Active,
        };
        assert_eq!(err.to_string(), "invalid call status transition: ended -> active");
    }
}
