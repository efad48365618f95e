//! Natural order over the stories of one bucket.
//!
//! # Invariants
//! - Positioned stories sort by position ascending.
//! - Positioned stories precede unpositioned ones.
//! - Unpositioned stories sort by id ascending (insertion order).
//! - Duplicate positions are broken by id ascending.
//! - `NATURAL_ORDER_SQL` and `OrderKey` describe the same order.

use crate::model::story::{Story, StoryId};
use std::cmp::Ordering;

/// `ORDER BY` body equivalent to [`OrderKey`] for the `stories` table.
pub const NATURAL_ORDER_SQL: &str = "(position IS NULL) ASC,
    CASE WHEN position IS NULL THEN id ELSE position END ASC,
    id ASC";

/// Composite sort key: `(has no position, position or id, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    unpositioned: bool,
    primary: i64,
    id: StoryId,
}

impl OrderKey {
    pub fn new(position: Option<i64>, id: StoryId) -> Self {
        match position {
            Some(position) => Self {
                unpositioned: false,
                primary: position,
                id,
            },
            None => Self {
                unpositioned: true,
                primary: id,
                id,
            },
        }
    }

    pub fn of(story: &Story) -> Self {
        Self::new(story.position, story.id)
    }
}

/// Compares two stories of the same bucket in natural order.
pub fn compare(a: &Story, b: &Story) -> Ordering {
    OrderKey::of(a).cmp(&OrderKey::of(b))
}

/// Sorts stories in place into natural order.
pub fn sort_naturally(stories: &mut [Story]) {
    stories.sort_by_key(OrderKey::of);
}

#[cfg(test)]
mod tests {
    use super::{compare, sort_naturally, OrderKey};
    use crate::model::story::Story;
    use std::cmp::Ordering;

    fn story(id: i64, position: Option<i64>) -> Story {
        Story {
            id,
            project_id: 1,
            sprint_id: Some(1),
            type_id: 1,
            status_id: None,
            parent_id: None,
            author_id: None,
            subject: format!("story {id}"),
            story_points: None,
            position,
        }
    }

    #[test]
    fn unpositioned_pair_compares_by_id() {
        assert_eq!(compare(&story(1, None), &story(3, None)), Ordering::Less);
        assert_eq!(compare(&story(3, None), &story(1, None)), Ordering::Greater);
    }

    #[test]
    fn positioned_story_precedes_unpositioned_one() {
        // A small id does not pull an unpositioned story ahead.
        assert_eq!(compare(&story(1, None), &story(9, Some(500))), Ordering::Greater);
        assert_eq!(compare(&story(9, Some(500)), &story(1, None)), Ordering::Less);
    }

    #[test]
    fn duplicate_positions_fall_back_to_id() {
        assert_eq!(compare(&story(2, Some(5)), &story(8, Some(5))), Ordering::Less);
        assert_eq!(compare(&story(8, Some(5)), &story(8, Some(5))), Ordering::Equal);
    }

    #[test]
    fn sort_matches_documented_scenario() {
        let mut stories = vec![
            story(3, None),
            story(1, None),
            story(4, Some(5)),
            story(2, Some(10)),
        ];
        sort_naturally(&mut stories);
        let ids: Vec<i64> = stories.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
    }

    #[test]
    fn key_orders_position_before_id() {
        assert!(OrderKey::new(Some(100), 1) < OrderKey::new(None, 0));
        assert!(OrderKey::new(Some(1), 50) < OrderKey::new(Some(2), 1));
    }
}
