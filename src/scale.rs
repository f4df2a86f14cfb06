use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::RecordError;
use crate::models::{GradingScaleEntry, ResolvedGrade};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// Scores are entered in steps of 0.01, so `70-84.99` followed by `85-100`
/// is contiguous and a score such as 84.995 is invalid input.
pub const SCORE_RESOLUTION: f64 = 0.01;
const EPSILON: f64 = 1e-6;

/// The scale of one curriculum, kept in descending `min_score` order so the
/// highest bracket wins when ranges overlap. Entries with equal `min_score`
/// keep their input order.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingScale {
    entries: Vec<GradingScaleEntry>,
}

impl GradingScale {
    pub fn new(mut entries: Vec<GradingScaleEntry>) -> Self {
        entries.sort_by(|a, b| b.min_score.total_cmp(&a.min_score));
        Self { entries }
    }

    pub fn entries(&self) -> &[GradingScaleEntry] {
        &self.entries
    }

    pub fn lookup(&self, score: f64) -> Option<&GradingScaleEntry> {
        self.entries.iter().find(|entry| entry.contains(score))
    }

    pub fn check_partition(&self) -> Vec<ScaleIssue> {
        let mut issues = Vec::new();
        if self.entries.is_empty() {
            issues.push(ScaleIssue::Empty);
            return issues;
        }

        for entry in &self.entries {
            if let Some(reason) = invalid_entry_reason(entry) {
                issues.push(ScaleIssue::InvalidEntry {
                    letter_grade: entry.letter_grade.clone(),
                    reason,
                });
            }
        }

        let mut reach: Option<(f64, &str)> = None;
        for entry in self.entries.iter().rev() {
            match reach {
                None => {
                    if first_step_at_or_above(entry.min_score) > 0 {
                        issues.push(ScaleIssue::Gap {
                            above: MIN_SCORE,
                            below: entry.min_score,
                        });
                    }
                }
                Some((upper, letter)) => {
                    if first_step_at_or_above(entry.min_score) > last_step_at_or_below(upper) + 1 {
                        issues.push(ScaleIssue::Gap {
                            above: upper,
                            below: entry.min_score,
                        });
                    } else if entry.min_score <= upper {
                        issues.push(ScaleIssue::Overlap {
                            lower_letter: letter.to_string(),
                            upper_letter: entry.letter_grade.clone(),
                            from: entry.min_score,
                            to: upper.min(entry.max_score),
                        });
                    }
                }
            }

            let extends = reach.map_or(true, |(upper, _)| entry.max_score > upper);
            if extends {
                reach = Some((entry.max_score, entry.letter_grade.as_str()));
            }
        }

        if let Some((upper, _)) = reach {
            if last_step_at_or_below(upper) < last_step_at_or_below(MAX_SCORE) {
                issues.push(ScaleIssue::Gap {
                    above: upper,
                    below: MAX_SCORE,
                });
            }
        }

        issues
    }
}

/// Index of the lowest enterable score (a multiple of 0.01) that is >= `bound`.
fn first_step_at_or_above(bound: f64) -> i64 {
    (bound / SCORE_RESOLUTION - EPSILON).ceil() as i64
}

/// Index of the highest enterable score that is <= `bound`.
fn last_step_at_or_below(bound: f64) -> i64 {
    (bound / SCORE_RESOLUTION + EPSILON).floor() as i64
}

fn has_extra_decimals(value: f64) -> bool {
    let steps = value / SCORE_RESOLUTION;
    (steps - steps.round()).abs() > EPSILON
}

fn invalid_entry_reason(entry: &GradingScaleEntry) -> Option<String> {
    if !entry.min_score.is_finite() || !entry.max_score.is_finite() {
        return Some("bounds must be finite".to_string());
    }
    if entry.min_score > entry.max_score {
        return Some(format!(
            "min_score {} is above max_score {}",
            entry.min_score, entry.max_score
        ));
    }
    if entry.min_score < MIN_SCORE || entry.max_score > MAX_SCORE {
        return Some(format!(
            "range {}-{} leaves 0-100",
            entry.min_score, entry.max_score
        ));
    }
    if !(0.0..=4.0).contains(&entry.grade_point) {
        return Some(format!("grade point {} is outside 0-4", entry.grade_point));
    }
    if has_extra_decimals(entry.grade_point) {
        return Some(format!(
            "grade point {} has more than two decimals",
            entry.grade_point
        ));
    }
    None
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ScaleIssue {
    Empty,
    InvalidEntry { letter_grade: String, reason: String },
    Gap { above: f64, below: f64 },
    Overlap {
        lower_letter: String,
        upper_letter: String,
        from: f64,
        to: f64,
    },
}

impl fmt::Display for ScaleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleIssue::Empty => write!(f, "no grading-scale entries configured"),
            ScaleIssue::InvalidEntry {
                letter_grade,
                reason,
            } => write!(f, "entry {letter_grade}: {reason}"),
            ScaleIssue::Gap { above, below } => {
                write!(f, "no entry covers scores between {above} and {below}")
            }
            ScaleIssue::Overlap {
                lower_letter,
                upper_letter,
                from,
                to,
            } => write!(
                f,
                "{upper_letter} overlaps {lower_letter} on {from}-{to} ({upper_letter} wins)"
            ),
        }
    }
}

/// Every configured scale, keyed by curriculum.
#[derive(Debug, Clone, Default)]
pub struct GradingScales {
    scales: HashMap<String, GradingScale>,
}

impl GradingScales {
    pub fn from_entries(entries: &[GradingScaleEntry]) -> Self {
        let mut grouped: HashMap<String, Vec<GradingScaleEntry>> = HashMap::new();
        for entry in entries {
            grouped
                .entry(entry.curriculum.clone())
                .or_default()
                .push(entry.clone());
        }

        let scales = grouped
            .into_iter()
            .map(|(curriculum, entries)| (curriculum, GradingScale::new(entries)))
            .collect();

        Self { scales }
    }

    pub fn get(&self, curriculum: &str) -> Option<&GradingScale> {
        self.scales.get(curriculum)
    }

    pub fn resolve_grade(
        &self,
        score: f64,
        curriculum: &str,
    ) -> Result<ResolvedGrade, RecordError> {
        validate_score(score)?;

        self.get(curriculum)
            .and_then(|scale| scale.lookup(score))
            .map(|entry| ResolvedGrade {
                letter_grade: entry.letter_grade.clone(),
                grade_point: entry.grade_point,
            })
            .ok_or_else(|| RecordError::UnresolvableGrade {
                score,
                curriculum: curriculum.to_string(),
            })
    }

    pub fn check_partition(&self, curriculum: &str) -> Vec<ScaleIssue> {
        match self.get(curriculum) {
            Some(scale) => scale.check_partition(),
            None => vec![ScaleIssue::Empty],
        }
    }
}

pub fn validate_score(score: f64) -> Result<(), RecordError> {
    if !score.is_finite() {
        return Err(RecordError::validation("score is not a finite number"));
    }
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(RecordError::validation(format!(
            "score {score} is outside 0-100"
        )));
    }
    if has_extra_decimals(score) {
        return Err(RecordError::validation(format!(
            "score {score} has more than two decimals"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn entry(letter: &str, min: f64, max: f64, point: f64) -> GradingScaleEntry {
    GradingScaleEntry {
        curriculum: "K2020".to_string(),
        letter_grade: letter.to_string(),
        min_score: min,
        max_score: max,
        grade_point: point,
        description: String::new(),
    }
}

#[cfg(test)]
pub(crate) fn standard_scale() -> Vec<GradingScaleEntry> {
    vec![
        entry("E", 0.0, 69.99, 0.0),
        entry("A", 85.0, 100.0, 4.0),
        entry("B", 70.0, 84.99, 3.0),
    ]
}
