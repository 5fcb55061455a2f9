// src/version/restriction.rs

//! Version interval restrictions
//!
//! A restriction is an interval over version strings, written in blueprints
//! with Maven-style brackets:
//!
//! - `[1.0,2.0)` → 1.0 <= v < 2.0 (either bound may be omitted)
//! - `[1.0]` → exactly 1.0
//! - `(1.0)` → anything except 1.0
//!
//! The legacy single-relation form (`>= 1.0`, `<< 2.0`, ...) is accepted on
//! input and normalized to the same interval representation.

use super::{Relation, VersionOrder};
use crate::error::{Error, Result};
use regex::{Captures, Regex};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Characters allowed in a version inside a restriction
pub(crate) const VERSION_PATTERN: &str = r"[0-9][A-Za-z0-9+.:~-]*";

/// An interval over versions; at least one bound is always set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRestriction {
    lower_bound: Option<String>,
    lower_inclusive: bool,
    upper_bound: Option<String>,
    upper_inclusive: bool,
}

/// Outcome of trying one grammar against a version specification
#[derive(Debug)]
enum GrammarMatch {
    Matched(VersionRestriction),
    NoMatch,
}

/// A named grammar for one family of version specifications
struct Grammar {
    name: &'static str,
    regex: Regex,
    build: fn(&Captures<'_>) -> GrammarMatch,
}

impl Grammar {
    fn new(name: &'static str, pattern: String, build: fn(&Captures<'_>) -> GrammarMatch) -> Self {
        let regex = Regex::new(&pattern).unwrap_or_else(|e| panic!("grammar {name}: {e}"));
        Self { name, regex, build }
    }

    fn try_match(&self, text: &str) -> GrammarMatch {
        match self.regex.captures(text) {
            Some(caps) => (self.build)(&caps),
            None => GrammarMatch::NoMatch,
        }
    }
}

/// Grammars tried in order; the first match wins
static GRAMMARS: LazyLock<Vec<Grammar>> = LazyLock::new(|| {
    vec![
        Grammar::new(
            "interval",
            format!(r"\A([\[(])({v})?,({v})?([\])])\z", v = VERSION_PATTERN),
            |caps| {
                let lower = caps.get(2).map(|m| m.as_str().to_string());
                let upper = caps.get(3).map(|m| m.as_str().to_string());
                if lower.is_none() && upper.is_none() {
                    return GrammarMatch::NoMatch;
                }
                GrammarMatch::Matched(VersionRestriction {
                    lower_bound: lower,
                    lower_inclusive: &caps[1] == "[",
                    upper_bound: upper,
                    upper_inclusive: &caps[4] == "]",
                })
            },
        ),
        Grammar::new(
            "exact",
            format!(r"\A\[({v})\]\z", v = VERSION_PATTERN),
            |caps| GrammarMatch::Matched(VersionRestriction::exactly(&caps[1])),
        ),
        Grammar::new(
            "excluded",
            format!(r"\A\(({v})\)\z", v = VERSION_PATTERN),
            |caps| GrammarMatch::Matched(VersionRestriction::excluding(&caps[1])),
        ),
        Grammar::new(
            "relation",
            format!(r"\A(<<|<=|!=|=|>=|>>)\s*({v})\z", v = VERSION_PATTERN),
            |caps| match Relation::from_str(&caps[1]) {
                Ok(relation) => {
                    GrammarMatch::Matched(VersionRestriction::from_relation(relation, &caps[2]))
                }
                Err(_) => GrammarMatch::NoMatch,
            },
        ),
    ]
});

impl VersionRestriction {
    /// Create a restriction from explicit bounds
    pub fn new(
        lower_bound: Option<String>,
        lower_inclusive: bool,
        upper_bound: Option<String>,
        upper_inclusive: bool,
    ) -> Result<Self> {
        if lower_bound.is_none() && upper_bound.is_none() {
            return Err(Error::ParseError(
                "version restriction needs at least one bound".to_string(),
            ));
        }
        Ok(Self {
            lower_bound,
            lower_inclusive,
            upper_bound,
            upper_inclusive,
        })
    }

    /// `[v]`: exactly this version
    pub fn exactly(version: &str) -> Self {
        Self {
            lower_bound: Some(version.to_string()),
            lower_inclusive: true,
            upper_bound: Some(version.to_string()),
            upper_inclusive: true,
        }
    }

    /// `(v)`: any version except this one
    pub fn excluding(version: &str) -> Self {
        Self {
            lower_bound: Some(version.to_string()),
            lower_inclusive: false,
            upper_bound: Some(version.to_string()),
            upper_inclusive: false,
        }
    }

    /// Normalize a single relational operator into an interval
    pub fn from_relation(relation: Relation, version: &str) -> Self {
        let v = Some(version.to_string());
        let (lower_bound, lower_inclusive, upper_bound, upper_inclusive) = match relation {
            Relation::Less => (None, false, v, false),
            Relation::LessOrEqual => (None, false, v, true),
            Relation::Equal => return Self::exactly(version),
            Relation::NotEqual => return Self::excluding(version),
            Relation::GreaterOrEqual => (v, true, None, false),
            Relation::Greater => (v, false, None, false),
        };
        Self {
            lower_bound,
            lower_inclusive,
            upper_bound,
            upper_inclusive,
        }
    }

    /// Parse any supported version specification
    ///
    /// Accepts the bracket forms written in blueprint `version` attributes
    /// and the single-relation form used by legacy inline package text.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        for grammar in GRAMMARS.iter() {
            if let GrammarMatch::Matched(restriction) = grammar.try_match(spec) {
                tracing::trace!(grammar = grammar.name, spec, "version grammar matched");
                return Ok(restriction);
            }
        }
        Err(Error::ParseError(format!("Can't parse version: ->{}<-", spec)))
    }

    pub fn lower_bound(&self) -> Option<&str> {
        self.lower_bound.as_deref()
    }

    pub fn upper_bound(&self) -> Option<&str> {
        self.upper_bound.as_deref()
    }

    pub fn lower_inclusive(&self) -> bool {
        self.lower_inclusive
    }

    pub fn upper_inclusive(&self) -> bool {
        self.upper_inclusive
    }

    /// `[v]` form
    pub fn is_exact(&self) -> bool {
        self.lower_inclusive && self.upper_inclusive && self.lower_bound == self.upper_bound
    }

    /// `(v)` form
    pub fn is_exclusion(&self) -> bool {
        !self.lower_inclusive
            && !self.upper_inclusive
            && self.lower_bound.is_some()
            && self.lower_bound == self.upper_bound
    }

    /// Membership test under the repository's version ordering
    pub fn contains(&self, version: &str, order: &dyn VersionOrder) -> bool {
        if self.is_exclusion() {
            let excluded = self.lower_bound.as_deref().unwrap_or_default();
            return order.compare(version, excluded) != Ordering::Equal;
        }

        let lower_ok = match self.lower_bound.as_deref() {
            Some(lower) => match order.compare(version, lower) {
                Ordering::Greater => true,
                Ordering::Equal => self.lower_inclusive,
                Ordering::Less => false,
            },
            None => true,
        };

        let upper_ok = match self.upper_bound.as_deref() {
            Some(upper) => match order.compare(version, upper) {
                Ordering::Less => true,
                Ordering::Equal => self.upper_inclusive,
                Ordering::Greater => false,
            },
            None => true,
        };

        lower_ok && upper_ok
    }

    /// Relation/version pairs in Debian clause order
    pub fn to_relations(&self) -> Vec<(Relation, String)> {
        if let (true, Some(v)) = (self.is_exact(), self.lower_bound.as_ref()) {
            return vec![(Relation::Equal, v.clone())];
        }
        if let (true, Some(v)) = (self.is_exclusion(), self.lower_bound.as_ref()) {
            return vec![(Relation::NotEqual, v.clone())];
        }

        let mut relations = Vec::new();
        if let Some(ref lower) = self.lower_bound {
            let relation = if self.lower_inclusive {
                Relation::GreaterOrEqual
            } else {
                Relation::Greater
            };
            relations.push((relation, lower.clone()));
        }
        if let Some(ref upper) = self.upper_bound {
            let relation = if self.upper_inclusive {
                Relation::LessOrEqual
            } else {
                Relation::Less
            };
            relations.push((relation, upper.clone()));
        }
        relations
    }

    /// Debian-format restrictions, e.g. `[">=1.0", "<<2.0"]`
    pub fn to_debian(&self) -> Vec<String> {
        self.to_relations()
            .into_iter()
            .map(|(relation, version)| format!("{}{}", relation, version))
            .collect()
    }
}

impl fmt::Display for VersionRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            return write!(f, "[{}]", self.lower_bound.as_deref().unwrap_or_default());
        }
        if self.is_exclusion() {
            return write!(f, "({})", self.lower_bound.as_deref().unwrap_or_default());
        }

        write!(
            f,
            "{}{},{}{}",
            if self.lower_inclusive { '[' } else { '(' },
            self.lower_bound.as_deref().unwrap_or_default(),
            self.upper_bound.as_deref().unwrap_or_default(),
            if self.upper_inclusive { ']' } else { ')' },
        )
    }
}

impl FromStr for VersionRestriction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::DpkgOrder;

    #[test]
    fn test_parse_interval() {
        let r = VersionRestriction::parse("[1.0,2.0)").unwrap();
        assert_eq!(r.lower_bound(), Some("1.0"));
        assert!(r.lower_inclusive());
        assert_eq!(r.upper_bound(), Some("2.0"));
        assert!(!r.upper_inclusive());
    }

    #[test]
    fn test_parse_half_open() {
        let r = VersionRestriction::parse("(1.0,]").unwrap();
        assert_eq!(r.lower_bound(), Some("1.0"));
        assert!(!r.lower_inclusive());
        assert_eq!(r.upper_bound(), None);
        assert_eq!(r.to_debian(), vec![">>1.0"]);
    }

    #[test]
    fn test_parse_exact_and_exclusion() {
        let exact = VersionRestriction::parse("[3.0-1]").unwrap();
        assert!(exact.is_exact());
        assert_eq!(exact.to_debian(), vec!["=3.0-1"]);

        let excluded = VersionRestriction::parse("(3.0-1)").unwrap();
        assert!(excluded.is_exclusion());
        assert_eq!(excluded.to_debian(), vec!["!=3.0-1"]);
    }

    #[test]
    fn test_parse_relation_form() {
        let r = VersionRestriction::parse(">= 1.2").unwrap();
        assert_eq!(r.to_string(), "[1.2,)");
        let r = VersionRestriction::parse("<<2.0").unwrap();
        assert_eq!(r.to_string(), "(,2.0)");
        let r = VersionRestriction::parse("!= 1.5").unwrap();
        assert_eq!(r.to_string(), "(1.5)");
        let r = VersionRestriction::parse(">> 1.5").unwrap();
        assert_eq!(r.to_debian(), vec![">>1.5"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(VersionRestriction::parse("[,]").is_err());
        assert!(VersionRestriction::parse("1.0").is_err());
        assert!(VersionRestriction::parse("[a1.0]").is_err());
        assert!(VersionRestriction::parse("=> 1.0").is_err());
    }

    #[test]
    fn test_new_requires_a_bound() {
        assert!(VersionRestriction::new(None, true, None, true).is_err());
    }

    #[test]
    fn test_display_reparses_to_equal_restriction() {
        for spec in ["[1.0,2.0]", "(1.0,2.0)", "[1.0,)", "(,2.0]", "[1.0]", "(1.0)", "(1:1.0~rc1,2.0-3]"] {
            let r = VersionRestriction::parse(spec).unwrap();
            assert_eq!(r.to_string(), spec);
            assert_eq!(VersionRestriction::parse(&r.to_string()).unwrap(), r);
        }
    }

    #[test]
    fn test_lower_only_membership() {
        let r = VersionRestriction::parse("[1.0,)").unwrap();
        assert!(r.contains("1.0", &DpkgOrder));
        assert!(r.contains("1.10", &DpkgOrder));
        assert!(!r.contains("0.9", &DpkgOrder));
        assert!(!r.contains("1.0~rc1", &DpkgOrder));
    }

    #[test]
    fn test_upper_only_membership() {
        let r = VersionRestriction::parse("(,2.0]").unwrap();
        assert!(r.contains("2.0", &DpkgOrder));
        assert!(r.contains("1.9", &DpkgOrder));
        assert!(!r.contains("2.0.1", &DpkgOrder));
    }

    #[test]
    fn test_exact_and_exclusion_membership() {
        let exact = VersionRestriction::exactly("1.5");
        assert!(exact.contains("1.5", &DpkgOrder));
        assert!(!exact.contains("1.6", &DpkgOrder));

        let excluded = VersionRestriction::excluding("1.5");
        assert!(!excluded.contains("1.5", &DpkgOrder));
        assert!(excluded.contains("1.6", &DpkgOrder));
        assert!(excluded.contains("1.4", &DpkgOrder));
    }
}
