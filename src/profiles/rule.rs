//! # Profile selection rules.
//!
//! A [`Rule`] pairs one or more [`Predicate`]s with a target profile name. A rule holds
//! when **all** of its predicates hold on a [`Snapshot`].
//!
//! Glob patterns support `*` (any run of characters) and `?` (one character) and are
//! matched against whole entry names.
//!
//! ## Example
//! ```rust
//! use rendervisor::{Rule, Snapshot};
//!
//! let rule = Rule::file("Chart.yaml", "helm").unwrap();
//! let snap = Snapshot::from_entries([("Chart.yaml", "name: demo")]);
//! assert!(rule.holds(&snap));
//!
//! let crds = Rule::new("crds")
//!     .when_content("*.yaml", "kind:\\s*CustomResourceDefinition")
//!     .unwrap();
//! assert!(!crds.holds(&snap));
//! ```

use regex::Regex;
use regex::bytes::Regex as BytesRegex;

use crate::error::RuntimeError;

use super::Snapshot;

/// Condition evaluated against a snapshot.
#[derive(Clone, Debug)]
pub enum Predicate {
    /// Some entry name matches the glob.
    FileGlob(Glob),
    /// Some entry name matches the regex.
    FileRegex(Regex),
    /// Some entry whose name matches `file` has contents matching `pattern`.
    ///
    /// Only the first [`MAX_CONTENT_BYTES`](super::MAX_CONTENT_BYTES) of each file are searched.
    Content { file: Glob, pattern: BytesRegex },
}

impl Predicate {
    /// Evaluates the predicate. Contents are only read for entries whose name matches.
    pub fn holds(&self, snapshot: &Snapshot) -> bool {
        match self {
            Predicate::FileGlob(glob) => snapshot.names().any(|n| glob.is_match(n)),
            Predicate::FileRegex(re) => snapshot.names().any(|n| re.is_match(n)),
            Predicate::Content { file, pattern } => snapshot
                .names()
                .filter(|n| file.is_match(n))
                .any(|n| {
                    snapshot
                        .contents(n)
                        .is_some_and(|bytes| pattern.is_match(&bytes))
                }),
        }
    }
}

/// Whole-name glob compiled to an anchored regex.
#[derive(Clone, Debug)]
pub struct Glob {
    pattern: String,
    re: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push_str(&regex::escape(&c.to_string())),
            }
        }
        expr.push('$');
        Ok(Self {
            pattern: pattern.to_string(),
            re: Regex::new(&expr)?,
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.re.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Predicates plus the profile they select.
#[derive(Clone, Debug)]
pub struct Rule {
    profile: String,
    predicates: Vec<Predicate>,
}

impl Rule {
    /// Creates a rule with no predicates (it holds for any snapshot until one is added).
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            predicates: Vec::new(),
        }
    }

    /// Shorthand for a rule with a single file glob.
    pub fn file(pattern: &str, profile: impl Into<String>) -> Result<Self, RuntimeError> {
        Self::new(profile).when_file(pattern)
    }

    /// Requires some entry name to match the glob `pattern`.
    pub fn when_file(mut self, pattern: &str) -> Result<Self, RuntimeError> {
        let glob = Glob::new(pattern).map_err(|e| self.invalid(e))?;
        self.predicates.push(Predicate::FileGlob(glob));
        Ok(self)
    }

    /// Requires some entry name to match the regex `pattern`.
    pub fn when_file_regex(mut self, pattern: &str) -> Result<Self, RuntimeError> {
        let re = Regex::new(pattern).map_err(|e| self.invalid(e))?;
        self.predicates.push(Predicate::FileRegex(re));
        Ok(self)
    }

    /// Requires some entry matching the glob `file` to contain `pattern`.
    pub fn when_content(mut self, file: &str, pattern: &str) -> Result<Self, RuntimeError> {
        let glob = Glob::new(file).map_err(|e| self.invalid(e))?;
        let re = BytesRegex::new(pattern).map_err(|e| self.invalid(e))?;
        self.predicates.push(Predicate::Content {
            file: glob,
            pattern: re,
        });
        Ok(self)
    }

    /// Adds an already built predicate.
    pub fn when(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Target profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// True when every predicate holds.
    pub fn holds(&self, snapshot: &Snapshot) -> bool {
        self.predicates.iter().all(|p| p.holds(snapshot))
    }

    fn invalid(&self, e: regex::Error) -> RuntimeError {
        RuntimeError::InvalidRule {
            profile: self.profile.clone(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_whole_names() {
        let g = Glob::new("*.yaml").unwrap();
        assert!(g.is_match("deploy.yaml"));
        assert!(!g.is_match("deploy.yaml.bak"));
        assert!(!g.is_match("deploy.yml"));

        let q = Glob::new("kustomization.y?ml").unwrap();
        assert!(!q.is_match("kustomization.yml"));
        assert!(q.is_match("kustomization.yaml"));

        let dots = Glob::new("Chart.yaml").unwrap();
        assert!(!dots.is_match("ChartXyaml"));
    }

    #[test]
    fn all_predicates_must_hold() {
        let rule = Rule::new("helm")
            .when_file("Chart.yaml")
            .unwrap()
            .when_file("values.yaml")
            .unwrap();
        let only_chart = Snapshot::from_entries([("Chart.yaml", "")]);
        let both = Snapshot::from_entries([("Chart.yaml", ""), ("values.yaml", "")]);
        assert!(!rule.holds(&only_chart));
        assert!(rule.holds(&both));
    }

    #[test]
    fn content_predicate_reads_matching_files_only() {
        let rule = Rule::new("crds")
            .when_content("*.yaml", r"kind:\s*CustomResourceDefinition")
            .unwrap();
        let hit = Snapshot::from_entries([
            ("notes.txt", "kind: CustomResourceDefinition"),
            ("crd.yaml", "apiVersion: v1\nkind: CustomResourceDefinition\n"),
        ]);
        let miss = Snapshot::from_entries([("notes.txt", "kind: CustomResourceDefinition")]);
        assert!(rule.holds(&hit));
        assert!(!rule.holds(&miss));
    }

    #[test]
    fn invalid_regex_is_reported_with_profile() {
        let err = Rule::new("broken").when_file_regex("(").unwrap_err();
        match err {
            RuntimeError::InvalidRule { profile, .. } => assert_eq!(profile, "broken"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
