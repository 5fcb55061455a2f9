// src/version/mod.rs

//! Version handling for Debian package dependencies
//!
//! This module provides Debian version parsing and the dpkg comparison
//! algorithm, the relational operators used in dependency clauses, and the
//! interval restrictions written in release blueprints.
//!
//! All version ranking in the crate goes through [`VersionOrder`], so
//! candidate selection and restriction membership can never disagree about
//! which of two versions is newer.

pub mod restriction;

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumString};

pub use restriction::VersionRestriction;

/// A parsed Debian version with epoch, upstream version and revision
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebianVersion {
    pub epoch: u64,
    pub upstream: String,
    pub revision: Option<String>,
}

impl DebianVersion {
    /// Parse a Debian version string
    ///
    /// Format: [epoch:]upstream[-revision]
    /// Examples:
    /// - "1.2.3" → epoch=0, upstream="1.2.3", revision=None
    /// - "2:1.2.3" → epoch=2, upstream="1.2.3", revision=None
    /// - "1.2.3-4+deb9u1" → epoch=0, upstream="1.2.3", revision=Some("4+deb9u1")
    /// - "1:2.3-rc1-5" → epoch=1, upstream="2.3-rc1", revision=Some("5")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        let (epoch, rest) = match s.split_once(':') {
            Some((e, r)) => {
                let epoch = e.parse::<u64>().map_err(|e| {
                    Error::ParseError(format!("Invalid epoch in version '{}': {}", s, e))
                })?;
                (epoch, r)
            }
            None => (0, s),
        };

        // The revision is everything after the last hyphen
        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((u, r)) => (u.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };

        if upstream.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty upstream version in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            upstream,
            revision,
        })
    }

    /// Compare two Debian versions using the dpkg algorithm
    pub fn compare(&self, other: &DebianVersion) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(&self.upstream, &other.upstream))
            .then_with(|| {
                verrevcmp(
                    self.revision.as_deref().unwrap_or(""),
                    other.revision.as_deref().unwrap_or(""),
                )
            })
    }
}

impl fmt::Display for DebianVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.upstream)?;
        if let Some(ref revision) = self.revision {
            write!(f, "-{}", revision)?;
        }
        Ok(())
    }
}

impl Ord for DebianVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for DebianVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort weight of a single character in a non-digit run
///
/// `~` sorts before everything, even the end of the string; letters sort
/// before all other characters.
fn char_order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

/// dpkg's `verrevcmp`: alternating non-digit and digit runs
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    let is_digit = |s: &[u8], k: usize| s.get(k).is_some_and(|c| c.is_ascii_digit());

    while i < a.len() || j < b.len() {
        let mut first_diff = 0i32;

        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = char_order(a.get(i).copied());
            let bc = char_order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        while is_digit(a, i) && is_digit(b, j) {
            if first_diff == 0 {
                first_diff = a[i] as i32 - b[j] as i32;
            }
            i += 1;
            j += 1;
        }

        if is_digit(a, i) {
            return Ordering::Greater;
        }
        if is_digit(b, j) {
            return Ordering::Less;
        }
        if first_diff != 0 {
            return first_diff.cmp(&0);
        }
    }

    Ordering::Equal
}

/// The single version comparison contract used for all ranking
pub trait VersionOrder: Send + Sync {
    /// Compare two version strings
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// Check `candidate <relation> bound`
    fn satisfies(&self, candidate: &str, relation: Relation, bound: &str) -> bool {
        relation.accepts(self.compare(candidate, bound))
    }
}

/// Debian (dpkg) version ordering
#[derive(Debug, Clone, Copy, Default)]
pub struct DpkgOrder;

impl VersionOrder for DpkgOrder {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        match (DebianVersion::parse(a), DebianVersion::parse(b)) {
            (Ok(va), Ok(vb)) => va.compare(&vb),
            // Malformed epochs: rank the raw strings with the same run rules
            _ => verrevcmp(a, b),
        }
    }
}

/// Relational operator of a Debian dependency clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
pub enum Relation {
    #[strum(serialize = "<<")]
    Less,
    /// `<` is the obsolete spelling of `<=`
    #[strum(to_string = "<=", serialize = "<")]
    LessOrEqual,
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    /// `>` is the obsolete spelling of `>=`
    #[strum(to_string = ">=", serialize = ">")]
    GreaterOrEqual,
    #[strum(serialize = ">>")]
    Greater,
}

impl Relation {
    /// Check whether `candidate.cmp(bound)` satisfies this relation
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Relation::Less => ordering == Ordering::Less,
            Relation::LessOrEqual => ordering != Ordering::Greater,
            Relation::Equal => ordering == Ordering::Equal,
            Relation::NotEqual => ordering != Ordering::Equal,
            Relation::GreaterOrEqual => ordering != Ordering::Less,
            Relation::Greater => ordering == Ordering::Greater,
        }
    }
}
