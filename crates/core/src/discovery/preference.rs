//! Interaction history folded into a per-user preference vector.
//!
//! Purchases, favorites and recent views each cast weighted votes for the
//! category, brand and tags of the product they touched. Views decay with
//! recency so a binge from last month cannot drown out yesterday's browsing.
//! All three maps are normalized to sum to 1 so the scoring weights stay
//! comparable across users with very different activity volumes.

use std::collections::HashMap;

use super::scoring::{normalize_votes, view_decay};
use super::{FAVORITE_VOTE_WEIGHT, PURCHASE_VOTE_WEIGHT, VIEW_VOTE_WEIGHT};
use crate::domain::interaction::{FavoriteRecord, PurchaseRecord, ViewRecord};
use crate::domain::product::CategoryId;

/// How many of the highest-voted tags survive into the preferred set.
pub const MAX_PREFERRED_TAGS: usize = 10;

/// Normalized affinity maps derived from one user's interaction history.
/// `preferred_tags` is the highest-weighted slice of the tag map, the set the
/// overlap term in scoring counts against.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreferenceVector {
    categories: HashMap<CategoryId, f64>,
    brands: HashMap<String, f64>,
    tags: HashMap<String, f64>,
    preferred_tags: Vec<String>,
}

impl PreferenceVector {
    /// True when the user has no usable history and the caller should fall
    /// back to trending.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.brands.is_empty() && self.tags.is_empty()
    }

    /// Normalized weight of `category`, zero when unseen.
    pub fn category_weight(&self, category: CategoryId) -> f64 {
        self.categories.get(&category).copied().unwrap_or(0.0)
    }

    /// Normalized weight of `brand`, zero when unseen or blank.
    pub fn brand_weight(&self, brand: &str) -> f64 {
        self.brands.get(brand).copied().unwrap_or(0.0)
    }

    /// Normalized weight of `tag`, zero when unseen.
    pub fn tag_weight(&self, tag: &str) -> f64 {
        self.tags.get(tag).copied().unwrap_or(0.0)
    }

    /// How many of `tags` are in the preferred set.
    pub fn preferred_tag_overlap(&self, tags: &[String]) -> usize {
        tags.iter().filter(|tag| self.preferred_tags.iter().any(|p| p == *tag)).count()
    }

    pub fn preferred_tags(&self) -> &[String] {
        &self.preferred_tags
    }
}

/// Fold a user's history into a [`PreferenceVector`].
///
/// `views` must be newest-first; the decay index follows list order.
pub fn build_preferences(
    purchases: &[PurchaseRecord],
    favorites: &[FavoriteRecord],
    views: &[ViewRecord],
) -> PreferenceVector {
    let mut categories: HashMap<CategoryId, f64> = HashMap::new();
    let mut brands: HashMap<String, f64> = HashMap::new();
    let mut tags: HashMap<String, f64> = HashMap::new();

    let mut vote = |category: CategoryId, brand: &str, item_tags: &[String], weight: f64| {
        *categories.entry(category).or_default() += weight;
        if !brand.is_empty() {
            *brands.entry(brand.to_string()).or_default() += weight;
        }
        for tag in item_tags {
            *tags.entry(tag.clone()).or_default() += weight;
        }
    };

    for purchase in purchases {
        vote(purchase.category_id, &purchase.brand, &purchase.tags, PURCHASE_VOTE_WEIGHT);
    }
    for favorite in favorites {
        vote(favorite.category_id, &favorite.brand, &favorite.tags, FAVORITE_VOTE_WEIGHT);
    }
    for (index, view) in views.iter().enumerate() {
        vote(view.category_id, &view.brand, &view.tags, VIEW_VOTE_WEIGHT * view_decay(index));
    }

    normalize_votes(&mut categories);
    normalize_votes(&mut brands);
    normalize_votes(&mut tags);

    let mut ranked: Vec<(String, f64)> =
        tags.iter().map(|(tag, weight)| (tag.clone(), *weight)).collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
    });
    let preferred_tags =
        ranked.into_iter().take(MAX_PREFERRED_TAGS).map(|(tag, _)| tag).collect();

    PreferenceVector { categories, brands, tags, preferred_tags }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::interaction::{Actor, PurchaseStatus, ViewSource};
    use crate::domain::product::{ProductId, UserId};

    fn purchase(category: i64, brand: &str, tags: &[&str]) -> PurchaseRecord {
        PurchaseRecord {
            product_id: ProductId(1),
            category_id: CategoryId(category),
            brand: brand.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            status: PurchaseStatus::Completed,
            created_at: Utc::now(),
        }
    }

    fn favorite(category: i64, brand: &str, tags: &[&str]) -> FavoriteRecord {
        FavoriteRecord {
            product_id: ProductId(2),
            category_id: CategoryId(category),
            brand: brand.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    fn view(category: i64, brand: &str, tags: &[&str]) -> ViewRecord {
        ViewRecord {
            id: 0,
            product_id: ProductId(3),
            actor: Actor::User(UserId(7)),
            category_id: CategoryId(category),
            brand: brand.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            source: ViewSource::Direct,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_history_yields_an_empty_vector() {
        let prefs = build_preferences(&[], &[], &[]);
        assert!(prefs.is_empty());
        assert_eq!(prefs.category_weight(CategoryId(1)), 0.0);
        assert_eq!(prefs.brand_weight("Acme"), 0.0);
    }

    #[test]
    fn purchases_outvote_favorites_outvote_views() {
        let prefs = build_preferences(
            &[purchase(1, "A", &[])],
            &[favorite(2, "B", &[])],
            &[view(3, "C", &[])],
        );

        // 3 : 2 : 1 votes normalized to a unit sum.
        assert!((prefs.category_weight(CategoryId(1)) - 0.5).abs() <= 0.01);
        assert!((prefs.category_weight(CategoryId(2)) - 0.33).abs() <= 0.01);
        assert!((prefs.category_weight(CategoryId(3)) - 0.17).abs() <= 0.01);

        let sum = prefs.category_weight(CategoryId(1))
            + prefs.category_weight(CategoryId(2))
            + prefs.category_weight(CategoryId(3));
        assert!((sum - 1.0).abs() <= 0.01);
    }

    #[test]
    fn older_views_decay() {
        // Ten views of category 1 then one of category 2: without decay the
        // split would be 10:1, with decay the older views count for less.
        let mut views = vec![view(2, "B", &[])];
        views.extend((0..10).map(|_| view(1, "A", &[])));

        let prefs = build_preferences(&[], &[], &views);
        let heavy = prefs.category_weight(CategoryId(1));
        let light = prefs.category_weight(CategoryId(2));
        assert!(heavy > light);
        assert!(heavy / light < 10.0);
    }

    #[test]
    fn blank_brands_cast_no_brand_vote() {
        let prefs = build_preferences(&[purchase(1, "", &[])], &[], &[]);
        assert!(prefs.brands.is_empty());
        assert!(!prefs.is_empty());
    }

    #[test]
    fn tag_weights_are_normalized_like_the_other_maps() {
        // Purchase votes 3 for each of {x, y}, favorite votes 2 for x:
        // raw 5:3 becomes 0.62/0.38 (with the rounding residue on the heavier key).
        let prefs =
            build_preferences(&[purchase(1, "A", &["x", "y"])], &[favorite(1, "A", &["x"])], &[]);

        let x = prefs.tag_weight("x");
        let y = prefs.tag_weight("y");
        assert!(x > y);
        assert!((x + y - 1.0).abs() <= 0.01);
        assert_eq!(prefs.tag_weight("unseen"), 0.0);
    }

    #[test]
    fn preferred_tags_are_ranked_and_capped() {
        let tags: Vec<String> = (0..15).map(|i| format!("t{i:02}")).collect();
        let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        let prefs =
            build_preferences(&[purchase(1, "A", &tag_refs)], &[favorite(1, "A", &["t00"])], &[]);

        assert_eq!(prefs.preferred_tags().len(), MAX_PREFERRED_TAGS);
        // t00 got an extra favorite vote so it ranks first.
        assert_eq!(prefs.preferred_tags()[0], "t00");
        assert_eq!(prefs.preferred_tag_overlap(&["t00".to_string(), "zzz".to_string()]), 1);
    }
}
