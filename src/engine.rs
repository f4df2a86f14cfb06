use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{aggregate, Snapshot, UnresolvedGradePolicy};
use crate::error::Rejection;
use crate::models::StudentAggregate;
use crate::ranking::{rank, RankingPolicy};

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineOptions {
    pub ranking: RankingPolicy,
    pub unresolved: UnresolvedGradePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct Standings {
    pub curriculum: String,
    pub aggregates: Vec<StudentAggregate>,
    pub rejected: Vec<Rejection>,
}

/// Aggregates every roster student in the snapshot and ranks the result.
pub fn compute_standings(snapshot: &Snapshot<'_>, options: &EngineOptions) -> Standings {
    for issue in snapshot.scales.check_partition(snapshot.curriculum) {
        warn!(curriculum = snapshot.curriculum, %issue, "grading scale is not a clean partition");
    }

    let aggregation = aggregate(snapshot, &options.unresolved);
    let aggregates = rank(aggregation.aggregates, options.ranking);

    info!(
        curriculum = snapshot.curriculum,
        students = aggregates.len(),
        scores = snapshot.scores.len(),
        rejected = aggregation.rejected.len(),
        "standings computed"
    );

    Standings {
        curriculum: snapshot.curriculum.to_string(),
        aggregates,
        rejected: aggregation.rejected,
    }
}
