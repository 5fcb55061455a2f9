// src/resolver/state.rs

//! Explicit per-run resolution state
//!
//! Tracks which package identities the resolver has marked or found
//! installed during one `resolve` call, so cycle and idempotence checks do
//! not depend on side effects inside the index.

use crate::index::VersionedPackage;
use std::collections::HashMap;

/// What the resolver knows about a package identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageState {
    Unvisited,
    Marked(String),
    Installed,
}

#[derive(Debug, Default)]
pub struct ResolutionState {
    states: HashMap<String, PackageState>,
    marked: Vec<VersionedPackage>,
}

impl ResolutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, name: &str) -> PackageState {
        self.states
            .get(name)
            .cloned()
            .unwrap_or(PackageState::Unvisited)
    }

    pub fn mark(&mut self, package: &VersionedPackage) {
        match self.marked.iter_mut().find(|m| m.package == package.package) {
            Some(existing) => *existing = package.clone(),
            None => self.marked.push(package.clone()),
        }
        self.states.insert(
            package.package.clone(),
            PackageState::Marked(package.version.clone()),
        );
    }

    pub fn set_installed(&mut self, name: &str) {
        self.states
            .entry(name.to_string())
            .or_insert(PackageState::Installed);
    }

    pub fn is_marked(&self, name: &str) -> bool {
        matches!(self.states.get(name), Some(PackageState::Marked(_)))
    }

    /// Packages marked by this run, in marking order
    pub fn marked(&self) -> &[VersionedPackage] {
        &self.marked
    }
}
