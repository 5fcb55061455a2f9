// src/resolver/events.rs

//! Resolver progress events
//!
//! The resolver does no logging of its own. It reports what it does as
//! [`ResolveEvent`]s to an injected [`ResolveObserver`]; the default
//! observer forwards them to `tracing`.

use std::sync::Mutex;
use tracing::{debug, info, trace};

/// Why a dependency needed no further work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatisfiedBy {
    /// Already being resolved higher up the chain (dependency cycle)
    Backtrace,
    Installed,
    Marked,
}

/// Something the resolver did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveEvent<'a> {
    /// A requested package got its version
    Selected { package: &'a str, version: &'a str },
    /// Dependencies of a package are being read
    Visiting {
        package: &'a str,
        version: &'a str,
        depth: usize,
    },
    /// Interchangeable alternatives were dropped from an OR-group
    AlternationNarrowed {
        package: &'a str,
        dropped: Vec<&'a str>,
    },
    /// A dependency needed no work
    Satisfied {
        package: &'a str,
        dependency: &'a str,
        by: SatisfiedBy,
    },
    /// A dependency was assigned a candidate version
    Candidate {
        package: &'a str,
        dependency: &'a str,
        version: &'a str,
    },
    /// A package was marked for install
    Marked {
        package: &'a str,
        version: &'a str,
        depth: usize,
    },
    /// The index's own solver handles a requested package
    DefaultSolver { package: &'a str, version: &'a str },
    Repairing,
    Fetching { count: usize },
}

/// Receiver of resolver events
pub trait ResolveObserver: Send + Sync {
    fn on_event(&self, event: &ResolveEvent<'_>);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ResolveObserver for TracingObserver {
    fn on_event(&self, event: &ResolveEvent<'_>) {
        match *event {
            ResolveEvent::Selected { package, version } => {
                info!(package, version, "Selected requested package");
            }
            ResolveEvent::Visiting {
                package,
                version,
                depth,
            } => {
                debug!(package, version, depth, "Resolving dependencies");
            }
            ResolveEvent::AlternationNarrowed {
                package,
                ref dropped,
            } => {
                debug!(package, dropped = ?dropped, "Ignoring interchangeable alternatives");
            }
            ResolveEvent::Satisfied {
                package,
                dependency,
                by,
            } => {
                trace!(package, dependency, by = ?by, "Dependency already satisfied");
            }
            ResolveEvent::Candidate {
                package,
                dependency,
                version,
            } => {
                debug!(package, dependency, version, "Chose candidate");
            }
            ResolveEvent::Marked {
                package,
                version,
                depth,
            } => {
                debug!(package, version, depth, "Marked for install");
            }
            ResolveEvent::DefaultSolver { package, version } => {
                info!(package, version, "Using the index solver");
            }
            ResolveEvent::Repairing => debug!("Repairing broken dependencies"),
            ResolveEvent::Fetching { count } => info!(count, "Fetching archives"),
        }
    }
}

/// Collects events as text; handy for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events in emission order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ResolveObserver for RecordingObserver {
    fn on_event(&self, event: &ResolveEvent<'_>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(format!("{:?}", event));
        }
    }
}
