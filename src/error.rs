use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Student,
    Course,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Student => f.write_str("student"),
            ReferenceKind::Course => f.write_str("course"),
        }
    }
}

/// Why a single input record could not be graded. None of these abort a batch.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    #[error("invalid record: {reason}")]
    Validation { reason: String },

    #[error("no grading-scale entry covers score {score} in curriculum {curriculum}")]
    UnresolvableGrade {
        score: f64,
        curriculum: String,
    },

    #[error("unknown {reference} reference: {id}")]
    MissingReference {
        reference: ReferenceKind,
        id: String,
    },
}

impl RecordError {
    pub fn validation(reason: impl Into<String>) -> Self {
        RecordError::Validation {
            reason: reason.into(),
        }
    }

    pub fn missing(reference: ReferenceKind, id: impl fmt::Display) -> Self {
        RecordError::MissingReference {
            reference,
            id: id.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordError::Validation { .. } => "validation",
            RecordError::UnresolvableGrade { .. } => "unresolvable_grade",
            RecordError::MissingReference { .. } => "missing_reference",
        }
    }
}

/// A rejected score record together with its position in the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub error: RecordError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = RecordError::UnresolvableGrade {
            score: 77.0,
            curriculum: "K2020".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no grading-scale entry covers score 77 in curriculum K2020"
        );

        let err = RecordError::missing(ReferenceKind::Course, "IF101");
        assert_eq!(err.to_string(), "unknown course reference: IF101");
        assert_eq!(err.label(), "missing_reference");
    }

    #[test]
    fn validation_serializes_with_kind_tag() {
        let err = RecordError::validation("score is not a number");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "validation");
        assert_eq!(value["reason"], "score is not a number");
    }

    #[test]
    fn unresolvable_grade_serializes_score_and_curriculum() {
        let err = RecordError::UnresolvableGrade {
            score: 77.0,
            curriculum: "K2020".to_string(),
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "unresolvable_grade");
        assert_eq!(value["score"], 77.0);
        assert_eq!(value["curriculum"], "K2020");
    }

    #[test]
    fn missing_reference_keeps_kind_and_reference_apart() {
        let err = RecordError::missing(ReferenceKind::Student, "2020110009");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "missing_reference");
        assert_eq!(value["reference"], "student");
        assert_eq!(value["id"], "2020110009");
        assert_eq!(err.to_string(), "unknown student reference: 2020110009");
    }

    #[test]
    fn rejection_serializes_nested_error() {
        let rejection = Rejection {
            index: 2,
            student_id: Uuid::nil(),
            course_id: Uuid::nil(),
            error: RecordError::missing(ReferenceKind::Course, "MA201"),
        };
        let value = serde_json::to_value(&rejection).unwrap();
        assert_eq!(value["index"], 2);
        assert_eq!(value["error"]["kind"], "missing_reference");
        assert_eq!(value["error"]["reference"], "course");
    }
}
