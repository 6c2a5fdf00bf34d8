//! # Render profiles.
//!
//! A [`Profile`] names an external render command: program, base arguments, extra
//! arguments appended at invocation time, environment overrides and an optional
//! `source` filter used by the watch loop.
//!
//! Profiles are immutable once built and shared as `Arc<Profile>`.
//!
//! ## Example
//! ```rust
//! use rendervisor::Profile;
//!
//! let helm = Profile::new("helm", "helm")
//!     .with_args(["template", "."])
//!     .with_extra_args(["--include-crds"]);
//! assert_eq!(helm.argv(&["-f".into(), "values.yaml".into()]),
//!            vec!["template", ".", "--include-crds", "-f", "values.yaml"]);
//!
//! let adhoc = Profile::ad_hoc("kustomize build 'my overlay'").unwrap();
//! assert_eq!(adhoc.command(), "kustomize");
//! assert_eq!(adhoc.args(), ["build", "my overlay"]);
//! ```

use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::error::RuntimeError;

/// Named template describing an external render command.
#[derive(Clone)]
pub struct Profile {
    name: String,
    command: String,
    args: Vec<String>,
    extra_args: Vec<String>,
    env: Vec<(String, String)>,
    source: Option<Regex>,
}

impl Profile {
    /// Creates a profile running `command` with no arguments.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            extra_args: Vec::new(),
            env: Vec::new(),
            source: None,
        }
    }

    /// Synthesizes a profile from a raw command line such as `"helm template ."`.
    ///
    /// The string is split on whitespace; single or double quotes group words.
    /// The raw string becomes the profile name.
    pub fn ad_hoc(raw: &str) -> Result<Self, RuntimeError> {
        let words = split_command_line(raw)?;
        let mut words = words.into_iter();
        let Some(command) = words.next() else {
            return Err(RuntimeError::InvalidProfile {
                reason: "empty command".to_string(),
            });
        };
        Ok(Self::new(raw.trim(), command).with_args(words))
    }

    /// Replaces the base arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the profile's own extra arguments (appended after the base arguments).
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Restricts watch-driven re-renders to changes whose input-relative path matches `pattern`.
    pub fn with_source(mut self, pattern: &str) -> Result<Self, RuntimeError> {
        let re = Regex::new(pattern).map_err(|e| RuntimeError::InvalidProfile {
            reason: format!("source pattern {pattern:?}: {e}"),
        })?;
        self.source = Some(re);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Full argument vector: base args, profile extra args, then `invocation_args`.
    pub fn argv(&self, invocation_args: &[String]) -> Vec<String> {
        self.args
            .iter()
            .chain(&self.extra_args)
            .chain(invocation_args)
            .cloned()
            .collect()
    }

    /// Whether a change at `relative` (relative to the input path) should trigger a re-render.
    ///
    /// Without a source filter every change is relevant.
    pub fn watches(&self, relative: &Path) -> bool {
        match &self.source {
            Some(re) => re.is_match(&relative.to_string_lossy()),
            None => true,
        }
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("extra_args", &self.extra_args)
            .field("env", &self.env)
            .field("source", &self.source.as_ref().map(Regex::as_str))
            .finish()
    }
}

impl PartialEq for Profile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.command == other.command
            && self.args == other.args
            && self.extra_args == other.extra_args
            && self.env == other.env
            && self.source.as_ref().map(Regex::as_str) == other.source.as_ref().map(Regex::as_str)
    }
}

impl Eq for Profile {}

fn split_command_line(raw: &str) -> Result<Vec<String>, RuntimeError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(RuntimeError::InvalidProfile {
            reason: format!("unterminated {q} quote in {raw:?}"),
        });
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_hoc_splits_and_groups_quotes() {
        let p = Profile::ad_hoc(r#"  helm template "my release" . --set 'a=b c' "#).unwrap();
        assert_eq!(p.command(), "helm");
        assert_eq!(p.args(), ["template", "my release", ".", "--set", "a=b c"]);
        assert_eq!(p.name(), r#"helm template "my release" . --set 'a=b c'"#);
    }

    #[test]
    fn ad_hoc_rejects_empty_and_unterminated() {
        assert!(matches!(
            Profile::ad_hoc("   "),
            Err(RuntimeError::InvalidProfile { .. })
        ));
        assert!(matches!(
            Profile::ad_hoc("echo 'oops"),
            Err(RuntimeError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn empty_quotes_make_an_empty_argument() {
        let p = Profile::ad_hoc("printf ''").unwrap();
        assert_eq!(p.args(), [""]);
    }

    #[test]
    fn source_filter_limits_watch() {
        let p = Profile::new("yaml", "cat")
            .with_source(r"\.ya?ml$")
            .unwrap();
        assert!(p.watches(Path::new("base/deploy.yaml")));
        assert!(!p.watches(Path::new("README.md")));
        assert!(Profile::new("any", "cat").watches(Path::new("README.md")));
        assert!(Profile::new("bad", "cat").with_source("(").is_err());
    }
}
