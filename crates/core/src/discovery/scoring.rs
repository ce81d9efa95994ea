//! Score pipelines as pure functions over a candidate plus context.
//!
//! All three scorers are additive term sums computed in-process after the
//! store hands back a bounded candidate pool, so the formulas stay
//! independent of the storage query language.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Utc};

use super::preference::PreferenceVector;
use super::{FRESHNESS_WINDOW_DAYS, VIEW_DECAY_FLOOR, VIEW_DECAY_STEP};
use crate::domain::product::Product;

// Similarity terms.
pub const SIMILAR_CATEGORY_POINTS: f64 = 50.0;
pub const SIMILAR_BRAND_POINTS: f64 = 30.0;
pub const SIMILAR_TAG_POINTS: f64 = 10.0;
pub const SIMILAR_PRICE_BASE: f64 = 20.0;
pub const SIMILAR_PRICE_PENALTY_PER_UNIT: f64 = 0.01;
pub const SIMILAR_RATING_POINTS: f64 = 2.0;
pub const SIMILAR_POPULARITY_POINTS: f64 = 5.0;

// Personalized terms.
pub const PREFERRED_CATEGORY_POINTS: f64 = 40.0;
pub const PREFERRED_BRAND_POINTS: f64 = 30.0;
pub const PREFERRED_TAG_POINTS: f64 = 15.0;
pub const PREFERRED_RATING_POINTS: f64 = 8.0;
pub const PREFERRED_PURCHASE_LOG_POINTS: f64 = 5.0;
pub const PREFERRED_FAVORITE_LOG_POINTS: f64 = 3.0;
pub const PREFERRED_FRESHNESS_BONUS: f64 = 10.0;

// Trending terms.
pub const TRENDING_PURCHASE_POINTS: f64 = 10.0;
pub const TRENDING_VIEW_POINTS: f64 = 2.0;
pub const TRENDING_FAVORITE_POINTS: f64 = 5.0;
pub const TRENDING_RATING_POINTS: f64 = 8.0;
pub const TRENDING_REVIEW_POINTS: f64 = 3.0;
pub const TRENDING_AGE_PENALTY_PER_DAY: f64 = 0.5;

pub fn tag_overlap(left: &[String], right: &[String]) -> usize {
    let left: HashSet<&str> = left.iter().map(String::as_str).collect();
    right.iter().filter(|tag| left.contains(tag.as_str())).count()
}

/// log10(count + 1), the shared popularity dampener.
pub fn log_popularity(count: u32) -> f64 {
    (f64::from(count) + 1.0).log10()
}

/// Weighted multi-factor similarity of `candidate` against `reference`.
pub fn similarity_score(reference: &Product, candidate: &Product) -> f64 {
    let mut score = 0.0;

    if candidate.category_id == reference.category_id {
        score += SIMILAR_CATEGORY_POINTS;
    }
    if !candidate.brand.is_empty() && candidate.brand == reference.brand {
        score += SIMILAR_BRAND_POINTS;
    }
    score += SIMILAR_TAG_POINTS * tag_overlap(&reference.tags, &candidate.tags) as f64;
    score += SIMILAR_PRICE_BASE
        - SIMILAR_PRICE_PENALTY_PER_UNIT * (reference.price - candidate.price).abs();
    score += SIMILAR_RATING_POINTS * candidate.rating;
    score += SIMILAR_POPULARITY_POINTS * log_popularity(candidate.purchase_count);

    score
}

/// Preference fit of a candidate against the user's derived preference maps.
///
/// The category and brand weights are looked up by the candidate's own
/// attribute values; keying on anything else silently zeroes both terms.
pub fn preference_score(
    candidate: &Product,
    preferences: &PreferenceVector,
    now: DateTime<Utc>,
) -> f64 {
    let mut score = 0.0;

    score += PREFERRED_CATEGORY_POINTS * preferences.category_weight(candidate.category_id);
    score += PREFERRED_BRAND_POINTS * preferences.brand_weight(&candidate.brand);
    score += PREFERRED_TAG_POINTS * preferences.preferred_tag_overlap(&candidate.tags) as f64;
    score += PREFERRED_RATING_POINTS * candidate.rating;
    score += PREFERRED_PURCHASE_LOG_POINTS * log_popularity(candidate.purchase_count);
    score += PREFERRED_FAVORITE_LOG_POINTS * log_popularity(candidate.favorite_count);
    if candidate.created_within_days(now, FRESHNESS_WINDOW_DAYS) {
        score += PREFERRED_FRESHNESS_BONUS;
    }

    score
}

/// Time-decayed popularity of a candidate.
pub fn trending_score(candidate: &Product, now: DateTime<Utc>) -> f64 {
    TRENDING_PURCHASE_POINTS * f64::from(candidate.purchase_count)
        + TRENDING_VIEW_POINTS * f64::from(candidate.view_count)
        + TRENDING_FAVORITE_POINTS * f64::from(candidate.favorite_count)
        + TRENDING_RATING_POINTS * candidate.rating
        + TRENDING_REVIEW_POINTS * f64::from(candidate.review_count)
        - TRENDING_AGE_PENALTY_PER_DAY * candidate.age_in_days(now)
}

/// Vote weight of the view at `recency_index` (0 = newest).
pub fn view_decay(recency_index: usize) -> f64 {
    (1.0 - VIEW_DECAY_STEP * recency_index as f64).max(VIEW_DECAY_FLOOR)
}

/// Normalize a vote map so its values sum to 1, rounded to two decimals.
/// Rounding residue is folded into the heaviest key so the sum invariant
/// survives the rounding.
pub fn normalize_votes<K: Eq + Hash + Clone>(votes: &mut HashMap<K, f64>) {
    let total: f64 = votes.values().sum();
    if total <= 0.0 {
        votes.clear();
        return;
    }

    for weight in votes.values_mut() {
        *weight = round2(*weight / total);
    }

    let rounded_total: f64 = votes.values().sum();
    let residue = 1.0 - rounded_total;
    if residue.abs() > f64::EPSILON {
        if let Some(heaviest) = votes
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(key, _)| key.clone())
        {
            if let Some(weight) = votes.get_mut(&heaviest) {
                *weight = round2(*weight + residue);
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
