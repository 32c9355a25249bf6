//! Domain layer for the HRIS recruitment service.
//!
//! Holds the application lifecycle engine, the pass registry and the storage
//! ports they depend on. Nothing in this crate performs I/O directly.

pub mod journey;
pub mod lifecycle;
pub mod onboarding;
pub mod pass;
pub mod profile;
pub mod reporting;
pub mod store;
pub mod types;

pub use lifecycle::{ApplyRequest, LifecycleEngine, LifecycleError, LifecycleOutcome};
pub use pass::{PassError, PassId, PassKind, PassPolicy, PassRegistry};
pub use store::{ApplicationStore, OnboardingStore, ProfileStore, StoreError};
