//! Entity resolution: user-typed product names onto the live catalog.
//!
//! Policy, per requested name: a case-insensitive substring hit wins
//! outright; otherwise the catalog entry with the best similarity score is
//! taken when it clears the threshold; otherwise `NoMatch`. The output is
//! positionally aligned with the input so callers can zip it back against
//! the original request.

use souk_contracts::CatalogEntry;
use strsim::normalized_levenshtein;

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedMatch {
    Hit(CatalogEntry),
    NoMatch,
}

impl ResolvedMatch {
    pub fn entry(&self) -> Option<&CatalogEntry> {
        match self {
            ResolvedMatch::Hit(entry) => Some(entry),
            ResolvedMatch::NoMatch => None,
        }
    }
}

/// Resolve each requested name independently against the full catalog.
/// The result has the same length and order as `requested`; one ambiguous
/// name never consumes an entry needed by another.
pub fn resolve(
    requested: &[String],
    catalog: &[CatalogEntry],
    threshold: f64,
) -> Vec<ResolvedMatch> {
    requested
        .iter()
        .map(|name| resolve_one(name, catalog, threshold))
        .collect()
}

fn resolve_one(name: &str, catalog: &[CatalogEntry], threshold: f64) -> ResolvedMatch {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return ResolvedMatch::NoMatch;
    }

    for entry in catalog {
        if entry.name.to_lowercase().contains(&needle) {
            return ResolvedMatch::Hit(entry.clone());
        }
    }

    let mut best: Option<(f64, &CatalogEntry)> = None;
    for entry in catalog {
        let score = similarity(&needle, &entry.name.to_lowercase());
        if best.as_ref().map(|(b, _)| score > *b).unwrap_or(true) {
            best = Some((score, entry));
        }
    }
    match best {
        Some((score, entry)) if score >= threshold => ResolvedMatch::Hit(entry.clone()),
        _ => ResolvedMatch::NoMatch,
    }
}

/// Similarity between a short request and a long catalog name compares the
/// request against every same-length word window of the name as well as the
/// whole name, so trailing model codes do not drown out a near-exact hit.
fn similarity(needle: &str, candidate: &str) -> f64 {
    let mut best = normalized_levenshtein(needle, candidate);
    let words: Vec<&str> = candidate.split_whitespace().collect();
    let n = needle.split_whitespace().count().max(1);
    if words.len() > n {
        for window in words.windows(n) {
            best = best.max(normalized_levenshtein(needle, &window.join(" ")));
        }
    }
    best
}
