use std::collections::HashMap;
use std::io::Read;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RecordError, ReferenceKind};
use crate::models::{Course, GradingScaleEntry, ScoreRecord, Student};
use crate::scale::validate_score;

/// A spreadsheet row that did not become a score record. `line` is the
/// 1-based line in the CSV file, header included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRejection {
    pub line: u64,
    pub error: RecordError,
}

#[derive(Debug, Default)]
pub struct ParsedScores {
    pub records: Vec<ScoreRecord>,
    pub rejected: Vec<RowRejection>,
}

/// Resolves spreadsheet identifiers (NIM, course code) to database ids.
pub struct ImportLookup {
    students: HashMap<String, Uuid>,
    courses: HashMap<String, Uuid>,
}

impl ImportLookup {
    pub fn new(students: &[Student], courses: &[Course]) -> Self {
        Self {
            students: students
                .iter()
                .map(|s| (s.nim.trim().to_string(), s.id))
                .collect(),
            courses: courses
                .iter()
                .map(|c| (c.code.trim().to_uppercase(), c.id))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    nim: Option<String>,
    course_code: Option<String>,
    score: Option<String>,
}

pub fn parse_score_rows<R: Read>(input: R, lookup: &ImportLookup) -> anyhow::Result<ParsedScores> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let headers = reader.headers()?.clone();
    let mut parsed = ParsedScores::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map_or(0, |p| p.line());
                parsed.rejected.push(RowRejection {
                    line,
                    error: RecordError::validation(format!("malformed row: {err}")),
                });
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line());

        let outcome = record
            .deserialize::<ScoreRow>(Some(&headers))
            .map_err(|err| RecordError::validation(format!("malformed row: {err}")))
            .and_then(|row| score_from_row(row, lookup));
        match outcome {
            Ok(score) => parsed.records.push(score),
            Err(error) => parsed.rejected.push(RowRejection { line, error }),
        }
    }

    Ok(parsed)
}

fn score_from_row(row: ScoreRow, lookup: &ImportLookup) -> Result<ScoreRecord, RecordError> {
    let nim = required(row.nim, "nim")?;
    let course_code = required(row.course_code, "course_code")?.to_uppercase();
    let raw_score = required(row.score, "score")?;

    // Spreadsheets exported with a comma decimal separator are common.
    let score: f64 = raw_score
        .replace(',', ".")
        .parse()
        .map_err(|_| RecordError::validation(format!("score {raw_score:?} is not a number")))?;
    validate_score(score)?;

    let student_id = *lookup
        .students
        .get(&nim)
        .ok_or_else(|| RecordError::missing(ReferenceKind::Student, &nim))?;
    let course_id = *lookup
        .courses
        .get(&course_code)
        .ok_or_else(|| RecordError::missing(ReferenceKind::Course, &course_code))?;

    Ok(ScoreRecord {
        student_id,
        course_id,
        score,
    })
}

fn required(value: Option<String>, column: &str) -> Result<String, RecordError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RecordError::validation(format!("missing {column}")))
}

#[derive(Debug, Deserialize)]
struct ScaleRow {
    letter_grade: String,
    min_score: f64,
    max_score: f64,
    grade_point: f64,
    #[serde(default)]
    description: String,
}

/// Parses a whole grading scale. Any malformed row fails the import.
pub fn parse_scale_rows<R: Read>(
    input: R,
    curriculum: &str,
) -> anyhow::Result<Vec<GradingScaleEntry>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let headers = reader.headers()?.clone();
    let mut entries = Vec::new();

    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        let row: ScaleRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("invalid grading scale row at line {line}"))?;
        if row.letter_grade.is_empty() {
            anyhow::bail!("grading scale row at line {line} has no letter_grade");
        }
        entries.push(GradingScaleEntry {
            curriculum: curriculum.to_string(),
            letter_grade: row.letter_grade,
            min_score: row.min_score,
            max_score: row.max_score,
            grade_point: row.grade_point,
            description: row.description,
        });
    }

    Ok(entries)
}
