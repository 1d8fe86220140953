//! Durable call log.
//!
//! Finished records are appended to SQLite by a subscriber on the manager's
//! event channel. Analytics are never rebuilt from here.

pub mod call_store;
pub mod recorder;

pub use call_store::CallStore;
pub use recorder::record_finished_calls;
