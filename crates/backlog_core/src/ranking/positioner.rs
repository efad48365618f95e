//! Move planning for "place story after neighbor".
//!
//! # Responsibility
//! - Compute the position writes that put one story right after a target
//!   (or first) in natural order.
//! - Stay pure: loading the bucket and applying writes belong to the store.
//!
//! # Invariants
//! - Every story other than the moved one keeps its relative order.
//! - A target outside the bucket, or the moved story itself, plans no writes.
//! - Written positions are non-negative.
//! - Only positions that actually change are emitted.

use crate::model::story::{Story, StoryId};
use crate::ranking::order::OrderKey;

/// Spacing used when positions are appended or renumbered, so later local
/// inserts usually find a free integer.
pub const POSITION_GAP: i64 = 1024;

/// Where a story should land in its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Before every other story.
    First,
    /// Immediately after the given story.
    After(StoryId),
}

/// One position write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    pub story_id: StoryId,
    /// Position before the write.
    pub previous: Option<i64>,
    pub position: i64,
}

/// Writes required to realize one placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePlan {
    /// Nothing to write: unknown target, or already in place.
    Noop,
    /// A free integer was found between the new neighbors.
    Insert(PositionUpdate),
    /// A prefix of the bucket was renumbered to open a slot.
    Renumber(Vec<PositionUpdate>),
}

impl MovePlan {
    pub fn updates(&self) -> &[PositionUpdate] {
        match self {
            Self::Noop => &[],
            Self::Insert(update) => std::slice::from_ref(update),
            Self::Renumber(updates) => updates,
        }
    }

    /// Short label used in log events.
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Insert(_) => "insert",
            Self::Renumber(_) => "renumber",
        }
    }
}

/// Plans the writes that move `moving` to `placement` inside `bucket`.
///
/// `bucket` holds the stories of the moved story's group, in any order; the
/// moved story may or may not be part of it.
pub fn plan_move(bucket: &[Story], moving: &Story, placement: Placement) -> MovePlan {
    let mut order: Vec<&Story> = bucket.iter().filter(|story| story.id != moving.id).collect();
    order.sort_by_key(|story| OrderKey::of(story));

    let insert_at = match placement {
        Placement::First => 0,
        Placement::After(target_id) => {
            match order.iter().position(|story| story.id == target_id) {
                Some(index) => index + 1,
                None => return MovePlan::Noop,
            }
        }
    };

    match free_slot(&order, insert_at) {
        Some(position) if moving.position == Some(position) => MovePlan::Noop,
        Some(position) => MovePlan::Insert(PositionUpdate {
            story_id: moving.id,
            previous: moving.position,
            position,
        }),
        None => renumber(order, insert_at, moving),
    }
}

/// Finds a position strictly between the stories around `insert_at`.
fn free_slot(order: &[&Story], insert_at: usize) -> Option<i64> {
    let previous = insert_at.checked_sub(1).map(|index| order[index]);
    let next_position = order.get(insert_at).and_then(|story| story.position);

    match previous {
        None => match next_position {
            None => Some(POSITION_GAP),
            Some(next) if next >= 1 => Some(next / 2),
            Some(_) => None,
        },
        Some(previous) => {
            // An unpositioned target cannot be followed by a positioned story
            // without materializing positions up to it.
            let previous = previous.position?;
            match next_position {
                None => previous.checked_add(POSITION_GAP),
                Some(next) if next - previous >= 2 => Some(previous + (next - previous) / 2),
                Some(_) => None,
            }
        }
    }
}

/// Rewrites positions of the smallest prefix covering the moved story and
/// every positioned story. Stories past the prefix are all unpositioned and
/// keep sorting after it.
fn renumber<'a>(mut order: Vec<&'a Story>, insert_at: usize, moving: &'a Story) -> MovePlan {
    let positioned = order.iter().take_while(|story| story.is_positioned()).count();
    order.insert(insert_at, moving);
    let prefix_len = insert_at.max(positioned) + 1;

    let updates = order
        .iter()
        .take(prefix_len)
        .enumerate()
        .filter_map(|(index, story)| {
            let position = (index as i64 + 1) * POSITION_GAP;
            (story.position != Some(position)).then_some(PositionUpdate {
                story_id: story.id,
                previous: story.position,
                position,
            })
        })
        .collect();
    MovePlan::Renumber(updates)
}

#[cfg(test)]
mod tests {
    use super::{plan_move, MovePlan, Placement, PositionUpdate, POSITION_GAP};
    use crate::model::story::Story;
    use crate::ranking::order::sort_naturally;

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

    fn apply(bucket: &[Story], plan: &MovePlan) -> Vec<i64> {
        let mut stories = bucket.to_vec();
        for update in plan.updates() {
            let story = stories
                .iter_mut()
                .find(|story| story.id == update.story_id)
                .unwrap();
            story.position = Some(update.position);
        }
        sort_naturally(&mut stories);
        stories.iter().map(|story| story.id).collect()
    }

    #[test]
    fn inserts_between_spaced_neighbors() {
        let bucket = vec![story(1, Some(10)), story(2, Some(20)), story(3, Some(30))];
        let plan = plan_move(&bucket, &bucket[2], Placement::After(1));
        assert_eq!(
            plan,
            MovePlan::Insert(PositionUpdate {
                story_id: 3,
                previous: Some(30),
                position: 15
            })
        );
        assert_eq!(apply(&bucket, &plan), vec![1, 3, 2]);
    }

    #[test]
    fn renumbers_when_positions_are_dense() {
        let bucket = vec![story(1, Some(1)), story(2, Some(2)), story(3, Some(3))];
        let plan = plan_move(&bucket, &bucket[2], Placement::After(1));
        assert!(matches!(plan, MovePlan::Renumber(_)));
        assert_eq!(apply(&bucket, &plan), vec![1, 3, 2]);
    }

    #[test]
    fn renumber_keeps_previous_positions() {
        let bucket = vec![story(1, Some(1)), story(2, Some(2)), story(3, Some(3))];
        let plan = plan_move(&bucket, &bucket[2], Placement::After(1));
        assert!(!plan.updates().is_empty());
        for update in plan.updates() {
            let before = bucket
                .iter()
                .find(|story| story.id == update.story_id)
                .unwrap()
                .position;
            assert_eq!(update.previous, before);
        }
    }

    #[test]
    fn renumbers_when_positions_are_duplicated() {
        let bucket = vec![story(1, Some(4)), story(2, Some(4)), story(3, None)];
        let plan = plan_move(&bucket, &bucket[2], Placement::After(1));
        assert_eq!(apply(&bucket, &plan), vec![1, 3, 2]);
    }

    #[test]
    fn after_last_positioned_appends_with_gap() {
        let bucket = vec![story(1, Some(1)), story(2, Some(2)), story(3, None)];
        let plan = plan_move(&bucket, &bucket[0], Placement::After(2));
        assert_eq!(
            plan,
            MovePlan::Insert(PositionUpdate {
                story_id: 1,
                previous: Some(1),
                position: 2 + POSITION_GAP
            })
        );
        assert_eq!(apply(&bucket, &plan), vec![2, 1, 3]);
    }

    #[test]
    fn after_unpositioned_target_materializes_prefix() {
        let bucket = vec![
            story(5, Some(7)),
            story(2, None),
            story(4, None),
            story(9, None),
        ];
        let plan = plan_move(&bucket, &bucket[3], Placement::After(2));
        assert_eq!(apply(&bucket, &plan), vec![5, 2, 9, 4]);

        // Story 4 stays unpositioned; it still sorts after the prefix.
        assert!(plan.updates().iter().all(|update| update.story_id != 4));
    }

    #[test]
    fn first_placement_uses_half_of_first_position() {
        let bucket = vec![story(1, Some(8)), story(2, None)];
        let plan = plan_move(&bucket, &bucket[1], Placement::First);
        assert_eq!(
            plan,
            MovePlan::Insert(PositionUpdate {
                story_id: 2,
                previous: None,
                position: 4
            })
        );
    }

    #[test]
    fn first_placement_renumbers_when_zero_is_taken() {
        let bucket = vec![story(1, Some(0)), story(2, Some(1)), story(3, None)];
        let plan = plan_move(&bucket, &bucket[2], Placement::First);
        assert_eq!(apply(&bucket, &plan), vec![3, 1, 2]);
    }

    #[test]
    fn first_placement_in_unpositioned_bucket() {
        let bucket = vec![story(1, None), story(2, None)];
        let plan = plan_move(&bucket, &bucket[1], Placement::First);
        assert_eq!(apply(&bucket, &plan), vec![2, 1]);
    }

    #[test]
    fn unknown_or_self_target_is_noop() {
        let bucket = vec![story(1, Some(1)), story(2, None)];
        assert_eq!(plan_move(&bucket, &bucket[1], Placement::After(99)), MovePlan::Noop);
        assert_eq!(plan_move(&bucket, &bucket[1], Placement::After(2)), MovePlan::Noop);
    }

    #[test]
    fn moving_story_outside_bucket_is_inserted() {
        let bucket = vec![story(1, Some(10)), story(2, Some(20))];
        let newcomer = story(3, None);
        let plan = plan_move(&bucket, &newcomer, Placement::After(1));
        assert_eq!(plan.updates()[0].position, 15);
    }

    #[test]
    fn untouched_stories_keep_relative_order() {
        let bucket = vec![
            story(1, Some(3)),
            story(2, Some(3)),
            story(3, Some(4)),
            story(4, None),
            story(5, None),
            story(6, Some(100)),
        ];
        for moving in &bucket {
            for target in &bucket {
                let plan = plan_move(&bucket, moving, Placement::After(target.id));
                let after = apply(&bucket, &plan);

                let mut expected: Vec<Story> = bucket.clone();
                sort_naturally(&mut expected);
                let mut expected: Vec<i64> = expected
                    .iter()
                    .map(|story| story.id)
                    .filter(|id| *id != moving.id)
                    .collect();
                if target.id != moving.id {
                    let index = expected.iter().position(|id| *id == target.id).unwrap();
                    expected.insert(index + 1, moving.id);
                } else {
                    expected = {
                        let mut original = bucket.clone();
                        sort_naturally(&mut original);
                        original.iter().map(|story| story.id).collect()
                    };
                }
                assert_eq!(after, expected, "move {} after {}", moving.id, target.id);
            }
        }
    }
}
