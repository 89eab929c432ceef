//! Subject selection: which of several addresses a label refers to.
//!
//! A link may mention more than one address (a token page filtered by holder,
//! say). The selector picks one, trying tiers in order of evidence strength:
//!
//! 1. **Display text**: the label itself names the address, abbreviated or
//!    in full.
//! 2. **Structure**: the URL shape points at it (`/address/<a>`,
//!    `?holder=<a>`, `#address=<a>`), scored per candidate.
//! 3. **Fallback**: the last address found.
//!
//! The tier that decided is kept in the returned [`Subject`].

use alloy::primitives::Address;
use url::Url;

use crate::address::{parse_address, to_lower_hex};
use crate::extract::AddressExtractor;
use crate::util::dedup_ordered;

/// Score for an address right after an `address`/`holder` path segment.
pub const PATH_SUBJECT_SCORE: i32 = 10;
/// Score for an address right after a `token`/`contract` path segment.
pub const PATH_ASSET_SCORE: i32 = -5;
/// Score for an address held by an `a`/`holder`/`address` query parameter.
pub const QUERY_SUBJECT_SCORE: i32 = 10;
/// Score for an address held by a `token`/`contract` query parameter.
pub const QUERY_ASSET_SCORE: i32 = -5;
/// Score for `holder=<a>` or `address=<a>` inside the fragment.
pub const FRAGMENT_SUBJECT_SCORE: i32 = 10;

/// The selected subject address, tagged with the tier that chose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Only one distinct candidate existed.
    Single(Address),
    /// The display label matched this candidate.
    DisplayText(Address),
    /// URL structure scored this candidate highest.
    Structural(Address),
    /// No evidence; the last candidate was taken.
    Fallback(Address),
}

impl Subject {
    /// The selected address.
    #[must_use]
    pub const fn address(&self) -> Address {
        match self {
            Self::Single(a) | Self::DisplayText(a) | Self::Structural(a) | Self::Fallback(a) => *a,
        }
    }

    /// Short name of the deciding tier.
    #[must_use]
    pub const fn tier(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::DisplayText(_) => "display-text",
            Self::Structural(_) => "structural",
            Self::Fallback(_) => "fallback",
        }
    }
}

/// Select the subject among `candidates` (in extraction order).
///
/// Returns `None` only when there are no candidates.
#[must_use]
pub fn select_subject(
    href: &str,
    candidates: &[Address],
    label: &str,
    extractor: &AddressExtractor,
) -> Option<Subject> {
    let last = *candidates.last()?;
    let distinct = dedup_ordered(candidates.iter().copied());
    if distinct.len() == 1 {
        return Some(Subject::Single(distinct[0]));
    }

    if let Some(hit) = match_display_text(label, &distinct, extractor) {
        return Some(Subject::DisplayText(hit));
    }

    if let Ok(url) = Url::parse(href)
        && let Some(hit) = best_scored(&url, &distinct)
    {
        return Some(Subject::Structural(hit));
    }

    Some(Subject::Fallback(last))
}

fn match_display_text(
    label: &str,
    candidates: &[Address],
    extractor: &AddressExtractor,
) -> Option<Address> {
    if let Some(hit) = extractor.match_abbreviated(label, candidates) {
        return Some(hit);
    }
    parse_address(label.trim()).filter(|full| candidates.contains(full))
}

/// First candidate holding the maximum score, if that maximum is positive.
fn best_scored(url: &Url, candidates: &[Address]) -> Option<Address> {
    let scores = score_candidates(url, candidates);
    let mut best: Option<(usize, i32)> = None;
    for (i, score) in scores.iter().copied().enumerate() {
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((i, score));
        }
    }
    best.filter(|(_, score)| *score > 0)
        .map(|(i, _)| candidates[i])
}

/// Structural score of each candidate against `url`, in candidate order.
#[must_use]
pub fn score_candidates(url: &Url, candidates: &[Address]) -> Vec<i32> {
    let segments: Vec<String> = url
        .path_segments()
        .map(|segs| segs.map(str::to_ascii_lowercase).collect())
        .unwrap_or_default();
    let params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_ascii_lowercase()))
        .collect();
    let fragment = url.fragment().map(str::to_ascii_lowercase);

    candidates
        .iter()
        .map(|candidate| {
            let target = to_lower_hex(candidate);
            path_score(&segments, &target)
                + query_score(&params, &target)
                + fragment_score(fragment.as_deref(), &target)
        })
        .collect()
}

fn path_score(segments: &[String], target: &str) -> i32 {
    segments
        .windows(2)
        .filter(|pair| pair[1] == target)
        .map(|pair| match pair[0].as_str() {
            "address" | "holder" => PATH_SUBJECT_SCORE,
            "token" | "contract" => PATH_ASSET_SCORE,
            _ => 0,
        })
        .sum()
}

fn query_score(params: &[(String, String)], target: &str) -> i32 {
    params
        .iter()
        .filter(|(_, value)| value == target)
        .map(|(key, _)| match key.as_str() {
            "a" | "holder" | "address" => QUERY_SUBJECT_SCORE,
            "token" | "contract" => QUERY_ASSET_SCORE,
            _ => 0,
        })
        .sum()
}

fn fragment_score(fragment: Option<&str>, target: &str) -> i32 {
    match fragment {
        Some(f)
            if f.contains(&format!("holder={target}"))
                || f.contains(&format!("address={target}")) =>
        {
            FRAGMENT_SUBJECT_SCORE
        }
        _ => 0,
    }
}
