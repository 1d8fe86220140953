pub mod error;
pub mod event;
pub mod phone;
pub mod traits;
pub mod types;

pub use error::{CallError, VendorError, VendorInitError};
pub use event::{CallEvent, LogEntry, LogLevel};
pub use phone::{LineType, PhoneNumber, PhoneNumberValidator, PhoneValidator};
pub use traits::{
    AssistantOverrides, VendorCall, VendorCallRequest, VendorConnection, VendorConnector,
    VendorCustomer, VoiceVendor,
};
pub use types::{CallRecord, CallStatus, CallType};
