//! # Catalog: validated profiles, ordered rules and an optional default.
//!
//! The catalog is handed to the runner as plain data. It is validated once at build
//! time: every rule and the default must reference a known profile.
//!
//! ## Resolution
//! ```text
//! resolve(path)
//!   ├─► Snapshot::capture(path)
//!   ├─► match_rules(snapshot, rules) ── Some(name) ──► profiles[name]
//!   └─► None ──► default profile ──► NoProfileMatched if absent
//! ```
//!
//! ## Example
//! ```rust
//! use rendervisor::{Catalog, Profile, Rule};
//!
//! let catalog = Catalog::builder()
//!     .profile(Profile::new("helm", "helm").with_args(["template", "."]))
//!     .profile(Profile::new("kustomize", "kustomize").with_args(["build", "."]))
//!     .rule(Rule::file("Chart.yaml", "helm").unwrap())
//!     .rule(Rule::file("kustomization.yaml", "kustomize").unwrap())
//!     .build()
//!     .unwrap();
//! assert!(catalog.get("helm").is_some());
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::RuntimeError;

use super::{Profile, Rule, Snapshot, match_rules};

/// Validated set of profiles and selection rules.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    profiles: HashMap<String, Arc<Profile>>,
    rules: Vec<Rule>,
    default: Option<String>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// A catalog with a single profile that is also the default.
    pub fn single(profile: Profile) -> Self {
        let name = profile.name().to_string();
        let mut profiles = HashMap::new();
        profiles.insert(name.clone(), Arc::new(profile));
        Self {
            profiles,
            rules: Vec::new(),
            default: Some(name),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Profile>> {
        self.profiles.get(name).cloned()
    }

    /// Looks up `name` or fails with [`RuntimeError::UnknownProfile`].
    pub fn require(&self, name: &str) -> Result<Arc<Profile>, RuntimeError> {
        self.get(name).ok_or_else(|| RuntimeError::UnknownProfile {
            name: name.to_string(),
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_profile(&self) -> Option<Arc<Profile>> {
        self.default.as_deref().and_then(|n| self.get(n))
    }

    /// Sorted profile names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Selects a profile for an already captured snapshot.
    pub fn select(&self, snapshot: &Snapshot) -> Option<Arc<Profile>> {
        match match_rules(snapshot, &self.rules) {
            Some(name) => self.get(name),
            None => self.default_profile(),
        }
    }

    /// Captures `path` and selects a profile for it. Blocking (reads the filesystem).
    pub fn resolve(&self, path: &Path) -> Result<Arc<Profile>, RuntimeError> {
        let snapshot = Snapshot::capture(path)?;
        self.select(&snapshot)
            .ok_or_else(|| RuntimeError::NoProfileMatched {
                path: path.to_path_buf(),
            })
    }
}

/// Builder for [`Catalog`].
#[derive(Default)]
pub struct CatalogBuilder {
    profiles: Vec<Profile>,
    rules: Vec<Rule>,
    default: Option<String>,
}

impl CatalogBuilder {
    /// Adds a profile; a later profile with the same name replaces an earlier one.
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Appends a rule. Rules are evaluated in the order they are added.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Profile used when no rule matches.
    pub fn default_profile(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Catalog, RuntimeError> {
        let profiles: HashMap<String, Arc<Profile>> = self
            .profiles
            .into_iter()
            .map(|p| (p.name().to_string(), Arc::new(p)))
            .collect();

        let unknown = self
            .rules
            .iter()
            .map(Rule::profile)
            .chain(self.default.as_deref())
            .find(|name| !profiles.contains_key(*name));
        if let Some(name) = unknown {
            return Err(RuntimeError::UnknownProfile {
                name: name.to_string(),
            });
        }

        Ok(Catalog {
            profiles,
            rules: self.rules,
            default: self.default,
        })
    }
}
