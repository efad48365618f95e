//! Read-time rank projection.
//!
//! Ranks are never stored. They are derived from the natural order of the
//! current snapshot, either in one pass over an ordered list or by counting
//! the stories that sort at or before one story. Both paths agree.

use crate::model::story::{SprintId, Story, StoryId};
use crate::ranking::order::OrderKey;
use serde::Serialize;
use std::collections::BTreeMap;

/// Story paired with its 1-based rank inside its bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedStory {
    pub rank: u32,
    pub story: Story,
}

/// Ranked stories keyed by bucket (`None` = unscheduled).
pub type Backlogs = BTreeMap<Option<SprintId>, Vec<RankedStory>>;

/// Assigns dense ranks to stories already in natural order.
///
/// Numbering restarts at 1 for every bucket.
pub fn project_ranks<I>(stories: I) -> Backlogs
where
    I: IntoIterator<Item = Story>,
{
    project_ranks_for(std::iter::empty(), stories)
}

/// Same as [`project_ranks`], but every bucket in `buckets` is present in
/// the result even when it holds no story.
pub fn project_ranks_for<B, I>(buckets: B, stories: I) -> Backlogs
where
    B: IntoIterator<Item = Option<SprintId>>,
    I: IntoIterator<Item = Story>,
{
    let mut backlogs: Backlogs = buckets.into_iter().map(|key| (key, Vec::new())).collect();
    for story in stories {
        let bucket = backlogs.entry(story.sprint_id).or_default();
        let rank = bucket.last().map_or(0, |last| last.rank) + 1;
        bucket.push(RankedStory { rank, story });
    }
    backlogs
}

/// Upper bound used by the count-based rank of one story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBound {
    /// Positioned stories at or before `(position, id)`.
    Positioned { position: i64, id: StoryId },
    /// All positioned stories plus unpositioned stories with `id <= id`.
    Unpositioned { id: StoryId },
}

impl RankBound {
    pub fn of(story: &Story) -> Self {
        match story.position {
            Some(position) => Self::Positioned {
                position,
                id: story.id,
            },
            None => Self::Unpositioned { id: story.id },
        }
    }

    /// Returns whether `story` is counted below this bound.
    pub fn admits(&self, story: &Story) -> bool {
        match (*self, story.position) {
            (Self::Positioned { position, id }, Some(other)) => {
                other < position || (other == position && story.id <= id)
            }
            (Self::Positioned { .. }, None) => false,
            (Self::Unpositioned { .. }, Some(_)) => true,
            (Self::Unpositioned { id }, None) => story.id <= id,
        }
    }

    /// Order key of the bounding story.
    pub fn key(&self) -> OrderKey {
        match *self {
            Self::Positioned { position, id } => OrderKey::new(Some(position), id),
            Self::Unpositioned { id } => OrderKey::new(None, id),
        }
    }
}

/// Rank of `story` computed as a count over its bucket.
pub fn rank_by_count(story: &Story, bucket: &[Story]) -> u32 {
    let bound = RankBound::of(story);
    let count = bucket.iter().filter(|other| bound.admits(other)).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{project_ranks, project_ranks_for, rank_by_count, RankBound};
    use crate::model::story::Story;
    use crate::ranking::order::{sort_naturally, OrderKey};

    fn story(id: i64, sprint_id: Option<i64>, position: Option<i64>) -> Story {
        Story {
            id,
            project_id: 1,
            sprint_id,
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
    fn ranks_restart_per_bucket() {
        let backlogs = project_ranks(vec![
            story(1, Some(10), Some(1)),
            story(2, Some(20), Some(1)),
            story(3, Some(10), Some(2)),
            story(4, None, None),
        ]);

        let sprint_10: Vec<(i64, u32)> = backlogs[&Some(10)]
            .iter()
            .map(|ranked| (ranked.story.id, ranked.rank))
            .collect();
        assert_eq!(sprint_10, vec![(1, 1), (3, 2)]);
        assert_eq!(backlogs[&Some(20)][0].rank, 1);
        assert_eq!(backlogs[&None][0].rank, 1);
    }

    #[test]
    fn requested_buckets_are_present_even_when_empty() {
        let backlogs = project_ranks_for(vec![Some(1), Some(2)], vec![story(1, Some(1), None)]);
        assert_eq!(backlogs.len(), 2);
        assert!(backlogs[&Some(2)].is_empty());
        assert!(!backlogs.contains_key(&None));
    }

    #[test]
    fn count_rank_matches_projection_with_duplicates() {
        let mut bucket = vec![
            story(3, Some(1), None),
            story(1, Some(1), None),
            story(4, Some(1), Some(5)),
            story(2, Some(1), Some(10)),
            story(6, Some(1), Some(5)),
            story(5, Some(1), Some(0)),
        ];
        sort_naturally(&mut bucket);

        let projected = project_ranks(bucket.clone());
        for ranked in &projected[&Some(1)] {
            assert_eq!(rank_by_count(&ranked.story, &bucket), ranked.rank);
        }
    }

    #[test]
    fn bound_admits_exactly_keys_up_to_itself() {
        let bucket = vec![
            story(1, Some(1), None),
            story(2, Some(1), Some(7)),
            story(3, Some(1), Some(7)),
            story(4, Some(1), None),
        ];
        for pivot in &bucket {
            let bound = RankBound::of(pivot);
            for other in &bucket {
                assert_eq!(bound.admits(other), OrderKey::of(other) <= bound.key());
            }
        }
    }
}
