//! Render profiles and the rules that select them.
//!
//! ## Contents
//! - [`Profile`] named render command (command, args, extra args, env, source filter)
//! - [`Rule`], [`Predicate`], [`Glob`] conditions over an input's entries
//! - [`Snapshot`] read-only, sorted view of the input path
//! - [`match_rules`] first-match-wins selection
//! - [`Catalog`] validated profiles + rules + optional default; resolves an input path
//!
//! Everything here is plain data plus pure functions; nothing spawns tasks.

mod catalog;
mod matcher;
mod profile;
mod rule;
mod snapshot;

pub use catalog::{Catalog, CatalogBuilder};
pub use matcher::match_rules;
pub use profile::Profile;
pub use rule::{Glob, Predicate, Rule};
pub use snapshot::{MAX_CONTENT_BYTES, Snapshot};
