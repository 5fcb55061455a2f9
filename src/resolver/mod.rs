// src/resolver/mod.rs

//! Dependency resolution for package sets
//!
//! Selects concrete versions for requested packages, walks their
//! dependency closure against a [`PackageIndex`](crate::index::PackageIndex)
//! and leaves the index with everything marked for install and fetched.

mod engine;
pub mod events;
mod plan;
mod state;

pub use engine::{AlternationPolicy, DEFAULT_ALTERNATION_ALLOWLIST, Resolver};
pub use events::{
    RecordingObserver, ResolveEvent, ResolveObserver, SatisfiedBy, TracingObserver,
};
pub use plan::ResolutionPlan;
pub use state::{PackageState, ResolutionState};
