//! Persisted state of the webhook subsystem.

pub mod event_store;

pub use event_store::EventStore;
