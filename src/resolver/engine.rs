// src/resolver/engine.rs

//! Dependency resolution engine
//!
//! Resolution of one package set works in two passes:
//!
//! 1. Every requested name gets one concrete version: the highest version
//!    that satisfies all restrictions written for that name.
//! 2. For each selected version the dependency closure is walked depth
//!    first. A dependency that is already installed, already marked, or
//!    currently being resolved higher up the chain needs no work; anything
//!    else gets the best candidate version and is resolved recursively.
//!    A package is marked for install only after all of its dependencies.
//!
//! OR-dependencies are not solved. An OR-group must narrow to a single
//! alternative after dropping the names listed in the [`AlternationPolicy`].

use super::events::{ResolveEvent, ResolveObserver, SatisfiedBy, TracingObserver};
use super::plan::ResolutionPlan;
use super::state::{PackageState, ResolutionState};
use crate::error::{Error, Result};
use crate::index::{DependencyClause, OrGroup, PackageIndex, VersionedPackage};
use crate::model::{PackageRef, PackageSet};
use crate::version::{VersionOrder, VersionRestriction};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Legacy aliases dropped from multi-way OR-groups
pub const DEFAULT_ALTERNATION_ALLOWLIST: &[&str] = &["makedev", "debconf-2.0"];

/// Which OR-group alternatives may be ignored as interchangeable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternationPolicy {
    ignored: BTreeSet<String>,
}

impl Default for AlternationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALTERNATION_ALLOWLIST.iter().copied())
    }
}

impl AlternationPolicy {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    /// Alternatives that remain after dropping ignored names
    ///
    /// Single-alternative groups are never narrowed.
    pub fn narrow<'a>(&self, group: &'a OrGroup) -> Vec<&'a DependencyClause> {
        if group.len() <= 1 {
            return group.iter().collect();
        }
        group
            .iter()
            .filter(|c| !self.ignored.contains(&c.target))
            .collect()
    }
}

/// Highest version among `candidates`; the first listed wins ties
fn best_version<'a>(
    candidates: &'a [VersionedPackage],
    order: &dyn VersionOrder,
) -> Option<&'a VersionedPackage> {
    let mut best: Option<&VersionedPackage> = None;
    for candidate in candidates {
        match best {
            Some(current) if order.compare(&candidate.version, &current.version) != Ordering::Greater => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Resolves requested packages against a [`PackageIndex`]
#[derive(Clone)]
pub struct Resolver {
    policy: AlternationPolicy,
    observer: Arc<dyn ResolveObserver>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(AlternationPolicy::default())
    }
}

impl Resolver {
    pub fn new(policy: AlternationPolicy) -> Self {
        Self {
            policy,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResolveObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &AlternationPolicy {
        &self.policy
    }

    fn emit(&self, event: ResolveEvent<'_>) {
        self.observer.on_event(&event);
    }

    /// Resolve every requested reference of a package set and fetch
    pub fn resolve_set(
        &self,
        set: &PackageSet,
        index: &mut dyn PackageIndex,
    ) -> Result<ResolutionPlan> {
        let refs: Vec<PackageRef> = set.requested().cloned().collect();
        self.resolve(&refs, index, set.use_default_solver)
    }

    /// Resolve requested references, repair, and fetch everything marked
    pub fn resolve(
        &self,
        refs: &[PackageRef],
        index: &mut dyn PackageIndex,
        use_default_solver: bool,
    ) -> Result<ResolutionPlan> {
        let mut state = ResolutionState::new();

        for (name, restrictions) in group_by_name(refs) {
            let selected = self.select_version(index, &name, &restrictions)?;
            self.emit(ResolveEvent::Selected {
                package: &selected.package,
                version: &selected.version,
            });
            index.set_candidate(&selected)?;

            if use_default_solver {
                self.emit(ResolveEvent::DefaultSolver {
                    package: &selected.package,
                    version: &selected.version,
                });
                index.install_with_default_solver(&selected)?;
                if !index.is_marked_for_install(&name) && !index.is_installed(&name) {
                    return Err(Error::SolverConflict(name));
                }
                if index.is_marked_for_install(&name) {
                    state.mark(&selected);
                }
            } else {
                self.resolve_transitive(index, &selected, &[], &mut state)?;
            }
        }

        self.emit(ResolveEvent::Repairing);
        index.repair_broken().map_err(|e| match e {
            Error::BrokenDependencies(msg) => Error::BrokenDependencies(msg),
            other => Error::BrokenDependencies(other.to_string()),
        })?;

        let install = index.marked();
        self.emit(ResolveEvent::Fetching {
            count: install.len(),
        });
        let archives = index.fetch_all().map_err(|e| match e {
            Error::FetchCancelled => Error::FetchCancelled,
            Error::FetchFailed(msg) => Error::FetchFailed(msg),
            other => Error::FetchFailed(other.to_string()),
        })?;

        Ok(ResolutionPlan { install, archives })
    }

    /// Highest version of `name` satisfying every restriction
    fn select_version(
        &self,
        index: &dyn PackageIndex,
        name: &str,
        restrictions: &[VersionRestriction],
    ) -> Result<VersionedPackage> {
        let order = index.order();
        let qualifying: Vec<VersionedPackage> = index
            .versions(name)?
            .into_iter()
            .filter(|v| restrictions.iter().all(|r| r.contains(&v.version, order)))
            .collect();

        best_version(&qualifying, order)
            .cloned()
            .ok_or_else(|| Error::UnsatisfiableConstraint {
                package: name.to_string(),
                restrictions: restrictions
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Why `identity` needs no work, if it doesn't
    fn satisfied_by(
        &self,
        index: &dyn PackageIndex,
        identity: &str,
        current: &str,
        backtrace: &[String],
        state: &mut ResolutionState,
    ) -> Option<SatisfiedBy> {
        if identity == current || backtrace.iter().any(|b| b == identity) {
            return Some(SatisfiedBy::Backtrace);
        }
        match state.state(identity) {
            PackageState::Installed => return Some(SatisfiedBy::Installed),
            PackageState::Marked(_) => return Some(SatisfiedBy::Marked),
            PackageState::Unvisited => {}
        }
        if index.is_installed(identity) {
            state.set_installed(identity);
            return Some(SatisfiedBy::Installed);
        }
        if index.is_marked_for_install(identity) {
            return Some(SatisfiedBy::Marked);
        }
        None
    }

    /// Resolve the dependency closure of `package`, then mark it
    ///
    /// `backtrace` holds the packages currently being resolved, nearest
    /// first.
    fn resolve_transitive(
        &self,
        index: &mut dyn PackageIndex,
        package: &VersionedPackage,
        backtrace: &[String],
        state: &mut ResolutionState,
    ) -> Result<()> {
        let depth = backtrace.len();
        self.emit(ResolveEvent::Visiting {
            package: &package.package,
            version: &package.version,
            depth,
        });

        // Intersect satisfying versions per target, in first-seen order
        let mut targets: Vec<(String, Vec<VersionedPackage>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for group in index.dependencies_of(package)? {
            let remaining = self.policy.narrow(&group);
            if remaining.len() != group.len() {
                self.emit(ResolveEvent::AlternationNarrowed {
                    package: &package.package,
                    dropped: group
                        .iter()
                        .filter(|c| !remaining.contains(c))
                        .map(|c| c.target.as_str())
                        .collect(),
                });
            }
            let [clause] = remaining.as_slice() else {
                return Err(Error::UnresolvableAlternation {
                    package: package.package.clone(),
                    alternatives: group.iter().map(|c| c.to_string()).collect(),
                });
            };

            let satisfying = index.satisfying_versions(clause);
            match positions.get(&clause.target) {
                Some(&pos) => targets[pos].1.retain(|v| satisfying.contains(v)),
                None => {
                    positions.insert(clause.target.clone(), targets.len());
                    targets.push((clause.target.clone(), satisfying));
                }
            }
        }

        for (target, versions) in targets {
            if versions.is_empty() {
                let mut chain: Vec<String> = backtrace.iter().rev().cloned().collect();
                chain.push(package.package.clone());
                return Err(Error::UnsatisfiableTransitiveDependency {
                    package: package.package.clone(),
                    dependency: target,
                    chain,
                });
            }

            let candidates = best_per_identity(&versions, index.order());

            let satisfied = candidates.iter().find_map(|c| {
                self.satisfied_by(&*index, &c.package, &package.package, backtrace, state)
            });
            if let Some(by) = satisfied {
                self.emit(ResolveEvent::Satisfied {
                    package: &package.package,
                    dependency: &target,
                    by,
                });
                continue;
            }

            let chosen = &candidates[0];
            self.emit(ResolveEvent::Candidate {
                package: &package.package,
                dependency: &target,
                version: &chosen.version,
            });
            index.set_candidate(chosen)?;

            let mut child_backtrace = Vec::with_capacity(depth + 1);
            child_backtrace.push(package.package.clone());
            child_backtrace.extend(backtrace.iter().cloned());
            self.resolve_transitive(index, chosen, &child_backtrace, state)?;
        }

        index.mark_install(package).map_err(|e| match e {
            e @ Error::MarkInstallFailed { .. } => e,
            other => Error::MarkInstallFailed {
                package: package.package.clone(),
                reason: other.to_string(),
            },
        })?;
        state.mark(package);
        self.emit(ResolveEvent::Marked {
            package: &package.package,
            version: &package.version,
            depth,
        });
        Ok(())
    }
}

/// One best version per owning package, identities in name order
fn best_per_identity(
    versions: &[VersionedPackage],
    order: &dyn VersionOrder,
) -> Vec<VersionedPackage> {
    let mut by_identity: BTreeMap<&str, Vec<VersionedPackage>> = BTreeMap::new();
    for version in versions {
        by_identity
            .entry(version.package.as_str())
            .or_default()
            .push(version.clone());
    }
    by_identity
        .values()
        .filter_map(|group| best_version(group, order).cloned())
        .collect()
}

/// Group requested references by name, keeping first-seen order
fn group_by_name(refs: &[PackageRef]) -> Vec<(String, Vec<VersionRestriction>)> {
    let mut groups: Vec<(String, Vec<VersionRestriction>)> = Vec::new();
    for package in refs {
        let pos = match groups.iter().position(|(name, _)| name == package.name()) {
            Some(pos) => pos,
            None => {
                groups.push((package.name().to_string(), Vec::new()));
                groups.len() - 1
            }
        };
        if let Some(restriction) = package.restriction() {
            groups[pos].1.push(restriction.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemoryIndex, PackageRecord, parse_depends};
    use crate::version::DpkgOrder;

    fn index(records: &[(&str, &str, &str)]) -> MemoryIndex {
        let mut index = MemoryIndex::new();
        for (name, version, depends) in records {
            index.insert(
                PackageRecord::new(name, version).with_depends(parse_depends(depends).unwrap()),
            );
        }
        index
    }

    fn refs(specs: &[&str]) -> Vec<PackageRef> {
        specs.iter().map(|s| PackageRef::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_policy_narrows_only_multi_groups() {
        let policy = AlternationPolicy::default();
        let single = parse_depends("makedev").unwrap().remove(0);
        assert_eq!(policy.narrow(&single).len(), 1);
        let multi = parse_depends("udev | makedev").unwrap().remove(0);
        let narrowed = policy.narrow(&multi);
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].target, "udev");
    }

    #[test]
    fn test_best_version_ties_keep_first() {
        let versions = vec![
            VersionedPackage::new("a", "1.0"),
            VersionedPackage::new("b", "1.0"),
            VersionedPackage::new("c", "0.5"),
        ];
        assert_eq!(best_version(&versions, &DpkgOrder).unwrap().package, "a");
    }

    #[test]
    fn test_group_by_name_keeps_order() {
        let groups = group_by_name(&refs(&["bb (>= 1.0)", "aa", "bb (<< 2.0)"]));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "bb");
        assert_eq!(groups[0].1.len(), 2);
        assert!(groups[1].1.is_empty());
    }

    #[test]
    fn test_selects_highest_qualifying() {
        let mut idx = index(&[("foo", "1.0", ""), ("foo", "2.0", ""), ("foo", "3.0", "")]);
        let plan = Resolver::default()
            .resolve(&refs(&["foo (<< 3.0)"]), &mut idx, false)
            .unwrap();
        assert_eq!(plan.install, vec![VersionedPackage::new("foo", "2.0")]);
    }

    #[test]
    fn test_unsatisfiable_constraint() {
        let mut idx = index(&[("foo", "1.0", "")]);
        let err = Resolver::default()
            .resolve(&refs(&["foo (>= 2.0)"]), &mut idx, false)
            .unwrap_err();
        assert!(matches!(err, Error::UnsatisfiableConstraint { .. }));
    }

    #[test]
    fn test_unknown_package() {
        let mut idx = index(&[]);
        let err = Resolver::default()
            .resolve(&refs(&["ghost"]), &mut idx, false)
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(_)));
    }

    #[test]
    fn test_or_group_narrowed_by_policy() {
        let mut idx = index(&[
            ("app", "1.0", "udev | makedev"),
            ("udev", "232", ""),
            ("makedev", "2.3", ""),
        ]);
        let plan = Resolver::default()
            .resolve(&refs(&["app"]), &mut idx, false)
            .unwrap();
        assert!(plan.contains("udev"));
        assert!(!plan.contains("makedev"));
    }

    #[test]
    fn test_real_alternation_rejected() {
        let mut idx = index(&[("app", "1.0", "exim4 | postfix"), ("postfix", "3", "")]);
        let err = Resolver::default()
            .resolve(&refs(&["app"]), &mut idx, false)
            .unwrap_err();
        match err {
            Error::UnresolvableAlternation {
                package,
                alternatives,
            } => {
                assert_eq!(package, "app");
                assert_eq!(alternatives, vec!["exim4", "postfix"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_policy_rejects_legacy_alias() {
        let mut idx = index(&[("app", "1.0", "udev | makedev"), ("udev", "232", "")]);
        let resolver = Resolver::new(AlternationPolicy::new(Vec::<String>::new()));
        assert!(resolver.resolve(&refs(&["app"]), &mut idx, false).is_err());
    }

    #[test]
    fn test_transitive_error_carries_chain() {
        let mut idx = index(&[
            ("aa", "1", "bb"),
            ("bb", "1", "cc (>= 2)"),
            ("cc", "1", ""),
        ]);
        let err = Resolver::default()
            .resolve(&refs(&["aa"]), &mut idx, false)
            .unwrap_err();
        match err {
            Error::UnsatisfiableTransitiveDependency {
                package,
                dependency,
                chain,
            } => {
                assert_eq!(package, "bb");
                assert_eq!(dependency, "cc");
                assert_eq!(chain, vec!["aa", "bb"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dependencies_marked_before_dependents() {
        let mut idx = index(&[("aa", "1", "bb, cc"), ("bb", "1", "cc"), ("cc", "1", "")]);
        let plan = Resolver::default()
            .resolve(&refs(&["aa"]), &mut idx, false)
            .unwrap();
        let order: Vec<&str> = plan.install.iter().map(|p| p.package.as_str()).collect();
        assert_eq!(order, vec!["cc", "bb", "aa"]);
    }

    #[test]
    fn test_self_dependency_terminates() {
        let mut idx = index(&[("aa", "1", "aa")]);
        let plan = Resolver::default()
            .resolve(&refs(&["aa"]), &mut idx, false)
            .unwrap();
        assert_eq!(plan.install.len(), 1);
    }

    #[test]
    fn test_default_solver_path() {
        let mut idx = index(&[("app", "1.0", "lib (>= 2)"), ("lib", "1", ""), ("lib", "2", "")]);
        let plan = Resolver::default()
            .resolve(&refs(&["app"]), &mut idx, true)
            .unwrap();
        assert_eq!(
            plan.install,
            vec![VersionedPackage::new("app", "1.0"), VersionedPackage::new("lib", "2")]
        );
    }
}
