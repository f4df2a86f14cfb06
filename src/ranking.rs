use std::cmp::Ordering;

use clap::ValueEnum;
use serde::Serialize;

use crate::models::StudentAggregate;

/// How ranks are numbered once the standings are sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// 1, 2, 3, ... in sort order; full ties still get distinct ranks.
    #[default]
    Sequential,
    /// Full ties on gpa, weighted points and total score share a rank (1, 1, 3).
    Competition,
}

/// Best first: gpa, then weighted grade points, then raw score total.
fn compare_scores(a: &StudentAggregate, b: &StudentAggregate) -> Ordering {
    b.gpa
        .total_cmp(&a.gpa)
        .then_with(|| b.total_weighted_grade_point.total_cmp(&a.total_weighted_grade_point))
        .then_with(|| b.total_score.total_cmp(&a.total_score))
}

pub fn compare_standing(a: &StudentAggregate, b: &StudentAggregate) -> Ordering {
    compare_scores(a, b)
        .then_with(|| a.nim.cmp(&b.nim))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

pub fn rank(mut aggregates: Vec<StudentAggregate>, policy: RankingPolicy) -> Vec<StudentAggregate> {
    aggregates.sort_by(compare_standing);

    let mut previous: Option<usize> = None;
    for position in 0..aggregates.len() {
        let rank = match policy {
            RankingPolicy::Sequential => position + 1,
            RankingPolicy::Competition => match previous {
                Some(prev_rank)
                    if compare_scores(&aggregates[position - 1], &aggregates[position])
                        == Ordering::Equal =>
                {
                    prev_rank
                }
                _ => position + 1,
            },
        };
        aggregates[position].rank = Some(rank);
        previous = Some(rank);
    }

    aggregates
}
