use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{RecordError, ReferenceKind, Rejection};
use crate::models::{
    Course, CourseResult, ResolvedGrade, ScoreRecord, Student, StudentAggregate,
};
use crate::scale::{validate_score, GradingScales};

/// What to do with a score that no grading-scale entry covers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum UnresolvedGradePolicy {
    #[default]
    Reject,
    Fallback { letter_grade: String, grade_point: f64 },
}

/// Immutable inputs for one (angkatan, semester, curriculum) scope.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub curriculum: &'a str,
    pub students: &'a [Student],
    pub courses: &'a [Course],
    pub scales: &'a GradingScales,
    pub scores: &'a [ScoreRecord],
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub aggregates: Vec<StudentAggregate>,
    pub rejected: Vec<Rejection>,
}

pub fn aggregate(snapshot: &Snapshot<'_>, unresolved: &UnresolvedGradePolicy) -> Aggregation {
    let courses: HashMap<Uuid, &Course> = snapshot.courses.iter().map(|c| (c.id, c)).collect();

    let mut positions: HashMap<Uuid, usize> = HashMap::new();
    let mut aggregates: Vec<StudentAggregate> = Vec::with_capacity(snapshot.students.len());
    for student in snapshot.students {
        if positions.contains_key(&student.id) {
            debug!(student_id = %student.id, "duplicate roster entry ignored");
            continue;
        }
        positions.insert(student.id, aggregates.len());
        aggregates.push(StudentAggregate::empty(student));
    }

    let mut rejected = Vec::new();
    for (index, record) in snapshot.scores.iter().enumerate() {
        let graded = grade_record(record, snapshot, &positions, &courses, unresolved);
        match graded {
            Ok((position, result)) => {
                let results = &mut aggregates[position].results;
                match results.iter_mut().find(|r| r.course_id == result.course_id) {
                    Some(existing) => {
                        debug!(
                            student_id = %record.student_id,
                            course_id = %record.course_id,
                            "later score replaces earlier one"
                        );
                        *existing = result;
                    }
                    None => results.push(result),
                }
            }
            Err(error) => {
                debug!(index, error = %error, "score record rejected");
                rejected.push(Rejection {
                    index,
                    student_id: record.student_id,
                    course_id: record.course_id,
                    error,
                });
            }
        }
    }

    for aggregate in &mut aggregates {
        aggregate.recompute_totals();
    }

    Aggregation {
        aggregates,
        rejected,
    }
}

fn grade_record(
    record: &ScoreRecord,
    snapshot: &Snapshot<'_>,
    positions: &HashMap<Uuid, usize>,
    courses: &HashMap<Uuid, &Course>,
    unresolved: &UnresolvedGradePolicy,
) -> Result<(usize, CourseResult), RecordError> {
    if record.student_id.is_nil() {
        return Err(RecordError::validation("missing student identifier"));
    }
    if record.course_id.is_nil() {
        return Err(RecordError::validation("missing course identifier"));
    }
    validate_score(record.score)?;

    let position = *positions
        .get(&record.student_id)
        .ok_or_else(|| RecordError::missing(ReferenceKind::Student, record.student_id))?;
    let course = courses
        .get(&record.course_id)
        .ok_or_else(|| RecordError::missing(ReferenceKind::Course, record.course_id))?;
    let credits = u32::try_from(course.credits)
        .ok()
        .filter(|credits| *credits > 0)
        .ok_or_else(|| {
            RecordError::validation(format!(
                "course {} has non-positive credits ({})",
                course.code, course.credits
            ))
        })?;

    let grade = match snapshot.scales.resolve_grade(record.score, snapshot.curriculum) {
        Ok(grade) => grade,
        Err(error @ RecordError::UnresolvableGrade { .. }) => match unresolved {
            UnresolvedGradePolicy::Reject => return Err(error),
            UnresolvedGradePolicy::Fallback {
                letter_grade,
                grade_point,
            } => {
                warn!(
                    score = record.score,
                    curriculum = snapshot.curriculum,
                    course = %course.code,
                    fallback = %letter_grade,
                    "no scale entry matched, using fallback grade"
                );
                ResolvedGrade {
                    letter_grade: letter_grade.clone(),
                    grade_point: *grade_point,
                }
            }
        },
        Err(error) => return Err(error),
    };

    Ok((
        position,
        CourseResult {
            course_id: course.id,
            course_code: course.code.clone(),
            score: record.score,
            letter_grade: grade.letter_grade,
            grade_point: grade.grade_point,
            credits,
        },
    ))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use uuid::Uuid;

    use crate::models::{Course, ScoreRecord, Student};

    pub fn student(nim: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            nim: nim.to_string(),
            full_name: format!("Student {nim}"),
            angkatan: "2020".to_string(),
        }
    }

    pub fn course(code: &str, credits: i32) -> Course {
        Course {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: format!("Course {code}"),
            credits,
            curriculum: "K2020".to_string(),
            semester: 1,
        }
    }

    pub fn score(student: &Student, course: &Course, score: f64) -> ScoreRecord {
        ScoreRecord {
            student_id: student.id,
            course_id: course.id,
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{course, score, student};
    use super::*;
    use crate::scale::{entry, standard_scale};

    fn run(
        students: &[Student],
        courses: &[Course],
        scores: &[ScoreRecord],
        scales: &GradingScales,
    ) -> Aggregation {
        let snapshot = Snapshot {
            curriculum: "K2020",
            students,
            courses,
            scales,
            scores,
        };
        aggregate(&snapshot, &UnresolvedGradePolicy::Reject)
    }

    #[test]
    fn weighted_gpa_matches_worked_example() {
        let x = student("001");
        let p = course("P", 3);
        let q = course("Q", 2);
        let scales = GradingScales::from_entries(&standard_scale());
        let out = run(
            &[x.clone()],
            &[p.clone(), q.clone()],
            &[score(&x, &p, 90.0), score(&x, &q, 72.0)],
            &scales,
        );

        assert!(out.rejected.is_empty());
        let agg = &out.aggregates[0];
        assert_eq!(agg.results[0].letter_grade, "A");
        assert_eq!(agg.results[0].grade_point, 4.0);
        assert_eq!(agg.results[1].letter_grade, "B");
        assert_eq!(agg.results[1].grade_point, 3.0);
        assert_eq!(agg.total_weighted_grade_point, 18.0);
        assert_eq!(agg.total_credits, 5);
        assert_eq!(agg.total_score, 162.0);
        assert!((agg.gpa - 3.6).abs() < 1e-9);
        assert_eq!(agg.rank, None);
    }

    #[test]
    fn students_without_scores_are_kept_with_zero_totals() {
        let x = student("001");
        let y = student("002");
        let p = course("P", 3);
        let scales = GradingScales::from_entries(&standard_scale());
        let out = run(&[x.clone(), y.clone()], &[p.clone()], &[score(&x, &p, 80.0)], &scales);

        assert_eq!(out.aggregates.len(), 2);
        let empty = &out.aggregates[1];
        assert_eq!(empty.student_id, y.id);
        assert_eq!(empty.gpa, 0.0);
        assert_eq!(empty.total_credits, 0);
        assert_eq!(empty.total_score, 0.0);
        assert!(empty.results.is_empty());
    }

    #[test]
    fn bad_records_are_rejected_individually() {
        let x = student("001");
        let stranger = student("999");
        let p = course("P", 3);
        let unlisted = course("Z", 2);
        let scales = GradingScales::from_entries(&standard_scale());
        let scores = vec![
            score(&x, &p, 101.0),
            score(&stranger, &p, 80.0),
            score(&x, &unlisted, 80.0),
            ScoreRecord {
                student_id: Uuid::nil(),
                course_id: p.id,
                score: 80.0,
            },
            score(&x, &p, 88.0),
        ];
        let out = run(&[x.clone()], &[p.clone()], &scores, &scales);

        let kinds: Vec<(usize, &str)> = out
            .rejected
            .iter()
            .map(|r| (r.index, r.error.label()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (0, "validation"),
                (1, "missing_reference"),
                (2, "missing_reference"),
                (3, "validation"),
            ]
        );
        assert_eq!(
            out.rejected[1].error,
            RecordError::missing(ReferenceKind::Student, stranger.id)
        );
        assert_eq!(
            out.rejected[2].error,
            RecordError::missing(ReferenceKind::Course, unlisted.id)
        );

        let agg = &out.aggregates[0];
        assert_eq!(agg.results.len(), 1);
        assert_eq!(agg.results[0].score, 88.0);
        assert_eq!(agg.gpa, 4.0);
    }

    #[test]
    fn non_positive_credits_reject_the_score() {
        let x = student("001");
        let p = course("P", 0);
        let scales = GradingScales::from_entries(&standard_scale());
        let out = run(&[x.clone()], &[p.clone()], &[score(&x, &p, 90.0)], &scales);

        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].error.label(), "validation");
        assert_eq!(out.aggregates[0].total_credits, 0);
    }

    #[test]
    fn gap_in_scale_rejects_instead_of_defaulting() {
        let x = student("001");
        let p = course("P", 3);
        let scales = GradingScales::from_entries(&[
            entry("A", 80.0, 100.0, 4.0),
            entry("C", 0.0, 74.99, 2.0),
        ]);
        let out = run(&[x.clone()], &[p.clone()], &[score(&x, &p, 77.0)], &scales);

        assert_eq!(out.rejected.len(), 1);
        assert_eq!(
            out.rejected[0].error,
            RecordError::UnresolvableGrade {
                score: 77.0,
                curriculum: "K2020".to_string(),
            }
        );
        assert!(out.aggregates[0].results.is_empty());
    }

    #[test]
    fn fallback_policy_grades_unmatched_scores() {
        let x = student("001");
        let p = course("P", 3);
        let scales = GradingScales::from_entries(&[entry("A", 80.0, 100.0, 4.0)]);
        let students = [x.clone()];
        let courses = [p.clone()];
        let scores = [score(&x, &p, 77.0)];
        let snapshot = Snapshot {
            curriculum: "K2020",
            students: &students,
            courses: &courses,
            scales: &scales,
            scores: &scores,
        };
        let policy = UnresolvedGradePolicy::Fallback {
            letter_grade: "E".to_string(),
            grade_point: 0.0,
        };
        let out = aggregate(&snapshot, &policy);

        assert!(out.rejected.is_empty());
        let agg = &out.aggregates[0];
        assert_eq!(agg.results[0].letter_grade, "E");
        assert_eq!(agg.total_credits, 3);
        assert_eq!(agg.gpa, 0.0);
    }

    #[test]
    fn fallback_policy_still_rejects_invalid_scores() {
        let x = student("001");
        let p = course("P", 3);
        let scales = GradingScales::from_entries(&standard_scale());
        let students = [x.clone()];
        let courses = [p.clone()];
        let scores = [score(&x, &p, -3.0)];
        let snapshot = Snapshot {
            curriculum: "K2020",
            students: &students,
            courses: &courses,
            scales: &scales,
            scores: &scores,
        };
        let policy = UnresolvedGradePolicy::Fallback {
            letter_grade: "E".to_string(),
            grade_point: 0.0,
        };
        let out = aggregate(&snapshot, &policy);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].error.label(), "validation");
    }

    #[test]
    fn later_valid_score_replaces_earlier_one() {
        let x = student("001");
        let p = course("P", 3);
        let scales = GradingScales::from_entries(&standard_scale());
        let out = run(
            &[x.clone()],
            &[p.clone()],
            &[score(&x, &p, 60.0), score(&x, &p, 90.0), score(&x, &p, 140.0)],
            &scales,
        );

        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].index, 2);
        let agg = &out.aggregates[0];
        assert_eq!(agg.results.len(), 1);
        assert_eq!(agg.results[0].letter_grade, "A");
        assert_eq!(agg.total_credits, 3);
    }

    #[test]
    fn duplicate_roster_entries_appear_once() {
        let x = student("001");
        let scales = GradingScales::from_entries(&standard_scale());
        let out = run(&[x.clone(), x.clone()], &[], &[], &scales);
        assert_eq!(out.aggregates.len(), 1);
    }
}
