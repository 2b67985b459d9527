//! Match normalization, display filtering and confidence tiers
//!
//! The backend has answered searches with a list of `matches` and, later,
//! with one best `match`. [`MatchShape`] captures that at the boundary and
//! everything downstream works on a single ordered sequence.

use crate::backend::SearchResponse;
use crate::model::MatchCandidate;
use std::fmt;

/// Display floor, applied regardless of any server-side threshold
pub const DISPLAY_FLOOR_PERCENT: f64 = 60.0;

/// The shapes a search response can take
#[derive(Debug, Clone, PartialEq)]
pub enum MatchShape {
    SingleMatch(MatchCandidate),
    MatchList(Vec<MatchCandidate>),
    Empty,
}

impl MatchShape {
    /// `match` wins over `matches`; neither present means no candidates
    pub fn from_response(response: SearchResponse) -> Self {
        match (response.best_match, response.matches) {
            (Some(best), _) => MatchShape::SingleMatch(best),
            (None, Some(list)) => MatchShape::MatchList(list),
            (None, None) => MatchShape::Empty,
        }
    }

    /// Canonical ordered sequence, backend order preserved
    pub fn into_candidates(self) -> Vec<MatchCandidate> {
        match self {
            MatchShape::SingleMatch(candidate) => vec![candidate],
            MatchShape::MatchList(list) => list,
            MatchShape::Empty => Vec::new(),
        }
    }
}

/// Coarse label derived from the similarity percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    VeryHigh,
    High,
    Good,
    Fair,
}

impl ConfidenceTier {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 80.0 {
            ConfidenceTier::VeryHigh
        } else if percentage >= 70.0 {
            ConfidenceTier::High
        } else if percentage >= 60.0 {
            ConfidenceTier::Good
        } else {
            ConfidenceTier::Fair
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceTier::VeryHigh => "Very High",
            ConfidenceTier::High => "High",
            ConfidenceTier::Good => "Good",
            ConfidenceTier::Fair => "Fair",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A displayed match: 1-based position plus its tier
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch {
    pub rank: usize,
    pub tier: ConfidenceTier,
    pub candidate: MatchCandidate,
}

/// Display state of the search panel.
///
/// `Idle -> Searching -> {Results | NoResults}`; a failed search returns an
/// error and puts the panel back to `Idle`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchState {
    #[default]
    Idle,
    Searching,
    Results(Vec<RankedMatch>),
    NoResults,
}

impl SearchState {
    /// Terminal state for a resolved search
    pub fn from_matches(matches: Vec<RankedMatch>) -> Self {
        if matches.is_empty() {
            SearchState::NoResults
        } else {
            SearchState::Results(matches)
        }
    }

    pub fn match_count(&self) -> usize {
        match self {
            SearchState::Results(matches) => matches.len(),
            _ => 0,
        }
    }
}

/// Whether a candidate clears the display floor
pub fn passes_floor(candidate: &MatchCandidate) -> bool {
    candidate.similarity_percentage >= DISPLAY_FLOOR_PERCENT
}

/// Filter and label an already-normalized sequence. No re-sorting.
pub fn rank(candidates: Vec<MatchCandidate>) -> Vec<RankedMatch> {
    candidates
        .into_iter()
        .filter(passes_floor)
        .enumerate()
        .map(|(i, candidate)| RankedMatch {
            rank: i + 1,
            tier: ConfidenceTier::from_percentage(candidate.similarity_percentage),
            candidate,
        })
        .collect()
}

/// normalize -> filter -> label
pub fn displayable_matches(response: SearchResponse) -> Vec<RankedMatch> {
    rank(MatchShape::from_response(response).into_candidates())
}
