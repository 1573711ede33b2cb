//! Reconciliation of count-matrix headers with manifest identifiers.
//!
//! Upstream tools rewrite specimen names when they become column headers:
//! characters outside `[A-Za-z0-9._]` turn into periods, and names starting
//! with a digit gain an `X` prefix. The [`Reconciler`] tries an ordered list
//! of candidate transforms ([`Mangling`]) on each header and renames it to the
//! first manifest identifier it reproduces.

use super::sanitize::sanitize_identifier;
use super::unique::validate_unique;
use crate::error::Result;
use crate::report::Reporter;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A candidate transform applied to a raw column label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mangling {
    /// The label as-is.
    Identity,
    /// The label with non-identifier characters replaced by periods.
    Sanitize,
    /// The sanitized label behind a fixed marker.
    SanitizePrefixed { prefix: String },
    /// Both the label and the manifest identifiers with periods removed and
    /// a marker dropped when it guards a leading digit.
    ///
    /// Fuzzy: tried only on labels no other step matched, against manifest
    /// identifiers no other label claimed, and only for keys owned by a
    /// single identifier.
    Normalized { marker: String },
}

impl Mangling {
    /// Apply the transform to a raw label.
    pub fn apply(&self, raw: &str) -> String {
        match self {
            Mangling::Identity => raw.to_string(),
            Mangling::Sanitize => sanitize_identifier(raw),
            Mangling::SanitizePrefixed { prefix } => {
                format!("{}{}", prefix, sanitize_identifier(raw))
            }
            Mangling::Normalized { marker } => normalize_key(raw, marker),
        }
    }

    /// Whether this step only runs after every exact step is exhausted.
    pub fn is_fuzzy(&self) -> bool {
        matches!(self, Mangling::Normalized { .. })
    }

    /// Key under which a manifest identifier is looked up by this transform.
    fn manifest_key(&self, id: &str) -> String {
        match self {
            Mangling::Normalized { marker } => normalize_key(id, marker),
            _ => id.to_string(),
        }
    }
}

fn normalize_key(raw: &str, marker: &str) -> String {
    let unguarded = match raw.strip_prefix(marker) {
        Some(rest) if !marker.is_empty() && rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => raw,
    };
    unguarded.chars().filter(|c| *c != '.').collect()
}

impl fmt::Display for Mangling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mangling::Identity => write!(f, "exact"),
            Mangling::Sanitize => write!(f, "sanitized"),
            Mangling::SanitizePrefixed { prefix } => write!(f, "sanitized with '{}' prefix", prefix),
            Mangling::Normalized { .. } => write!(f, "normalized"),
        }
    }
}

/// The cascade matching the R `make.names` convention: exact, sanitized,
/// `X` + sanitized, and finally the period-insensitive comparison.
pub fn default_cascade() -> Vec<Mangling> {
    vec![
        Mangling::Identity,
        Mangling::Sanitize,
        Mangling::SanitizePrefixed {
            prefix: "X".to_string(),
        },
        Mangling::Normalized {
            marker: "X".to_string(),
        },
    ]
}

/// Manifest identifiers keyed the way one cascade step looks them up.
/// Keys shared by several identifiers are left out.
struct StepIndex {
    keys: HashMap<String, Option<String>>,
}

impl StepIndex {
    fn build(mangling: &Mangling, manifest_ids: &[String]) -> Self {
        let mut keys: HashMap<String, Option<String>> = HashMap::new();
        for id in manifest_ids {
            keys.entry(mangling.manifest_key(id))
                .and_modify(|owner| *owner = None)
                .or_insert_with(|| Some(id.clone()));
        }
        Self { keys }
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.keys.get(key).and_then(|owner| owner.as_deref())
    }
}

/// Outcome for one column label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The label as it appeared in the counts header.
    pub original: String,
    /// The manifest identifier it was matched to, or the original label.
    pub resolved: String,
    /// Transform that produced the match; `None` when nothing matched.
    pub via: Option<Mangling>,
}

impl Resolution {
    /// Whether the label was changed.
    pub fn is_renamed(&self) -> bool {
        self.original != self.resolved
    }

    /// Whether the label matched a manifest identifier at all.
    pub fn is_matched(&self) -> bool {
        self.via.is_some()
    }
}

/// Mapping from raw counts headers to manifest identifiers, in header order.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    entries: Vec<Resolution>,
}

impl IdentifierMap {
    /// All resolutions, in original column order.
    pub fn entries(&self) -> &[Resolution] {
        &self.entries
    }

    /// Resolved labels, in original column order.
    pub fn resolved_labels(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.resolved.clone()).collect()
    }

    /// Resolutions that changed the label.
    pub fn renamed(&self) -> impl Iterator<Item = &Resolution> + '_ {
        self.entries.iter().filter(|r| r.is_renamed())
    }

    /// Original labels that matched nothing.
    pub fn unmatched(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|r| !r.is_matched())
            .map(|r| r.original.as_str())
            .collect()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Matches counts headers against manifest identifiers.
#[derive(Debug, Clone)]
pub struct Reconciler {
    cascade: Vec<Mangling>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(default_cascade())
    }
}

impl Reconciler {
    /// Create a reconciler with a custom cascade, tried in order.
    pub fn new(cascade: Vec<Mangling>) -> Self {
        Self { cascade }
    }

    /// The transforms tried, in order.
    pub fn cascade(&self) -> &[Mangling] {
        &self.cascade
    }

    fn resolve<'m>(
        &self,
        label: &str,
        steps: impl Iterator<Item = (&'m Mangling, &'m StepIndex)>,
    ) -> Option<Resolution> {
        for (mangling, index) in steps {
            if let Some(id) = index.lookup(&mangling.apply(label)) {
                return Some(Resolution {
                    original: label.to_string(),
                    resolved: id.to_string(),
                    via: Some(mangling.clone()),
                });
            }
        }
        None
    }

    /// Resolve every counts header.
    ///
    /// Exact steps run first over every header. Fuzzy steps then run only
    /// on headers still unmatched, against the manifest identifiers left
    /// unclaimed. Headers must be unique going in, and the resolved labels
    /// must still be unique coming out: two headers collapsing onto one
    /// manifest identifier is a [`crate::error::AlignError::DuplicateLabel`]
    /// error.
    pub fn reconcile(
        &self,
        manifest_ids: &[String],
        columns: &[String],
        reporter: &dyn Reporter,
    ) -> Result<IdentifierMap> {
        validate_unique(columns)?;

        let (fuzzy, exact): (Vec<&Mangling>, Vec<&Mangling>) =
            self.cascade.iter().partition(|m| m.is_fuzzy());

        let exact_indexes: Vec<StepIndex> =
            exact.iter().map(|m| StepIndex::build(m, manifest_ids)).collect();
        let first_pass: Vec<Option<Resolution>> = columns
            .iter()
            .map(|label| self.resolve(label, exact.iter().copied().zip(&exact_indexes)))
            .collect();

        let claimed: HashSet<&str> = first_pass
            .iter()
            .flatten()
            .map(|r| r.resolved.as_str())
            .collect();
        let unclaimed: Vec<String> = manifest_ids
            .iter()
            .filter(|id| !claimed.contains(id.as_str()))
            .cloned()
            .collect();
        let fuzzy_indexes: Vec<StepIndex> =
            fuzzy.iter().map(|m| StepIndex::build(m, &unclaimed)).collect();

        let entries: Vec<Resolution> = columns
            .iter()
            .zip(first_pass)
            .map(|(label, found)| {
                found
                    .or_else(|| self.resolve(label, fuzzy.iter().copied().zip(&fuzzy_indexes)))
                    .unwrap_or_else(|| Resolution {
                        original: label.to_string(),
                        resolved: label.to_string(),
                        via: None,
                    })
            })
            .collect();

        for r in entries.iter().filter(|r| r.is_renamed()) {
            if let Some(via) = &r.via {
                let message = format!("Renaming {} -> {} ({})", r.original, r.resolved, via);
                if via.is_fuzzy() {
                    reporter.warn(&message);
                } else {
                    reporter.info(&message);
                }
            }
        }

        let map = IdentifierMap { entries };
        validate_unique(&map.resolved_labels())?;
        Ok(map)
    }
}
