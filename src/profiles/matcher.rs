//! # Rule matching.
//!
//! [`match_rules`] walks the rules strictly in list order and returns the target of the
//! first rule that holds. It never mutates the snapshot and is deterministic: the
//! snapshot already fixes entry order.
//!
//! ```text
//! rules:  [ Chart.yaml → helm ] [ kustomization.yaml → kustomize ] [ *.yaml → yaml ]
//!              ✗                        ✓  ◄── first hit wins, later rules are not evaluated
//! ```

use super::{Rule, Snapshot};

/// Returns the profile name of the first rule in `rules` that holds on `snapshot`.
pub fn match_rules<'r>(snapshot: &Snapshot, rules: &'r [Rule]) -> Option<&'r str> {
    rules
        .iter()
        .find(|rule| rule.holds(snapshot))
        .map(Rule::profile)
}
