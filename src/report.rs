use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::Standings;
use crate::models::{GradeCount, StudentAggregate};

/// Counts course results per letter grade, most frequent first.
pub fn grade_distribution(aggregates: &[StudentAggregate]) -> Vec<GradeCount> {
    let mut map: HashMap<String, (usize, f64)> = HashMap::new();

    for result in aggregates.iter().flat_map(|a| a.results.iter()) {
        let entry = map.entry(result.letter_grade.clone()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += result.score;
    }

    let mut counts: Vec<GradeCount> = map
        .into_iter()
        .map(|(letter_grade, (count, total_score))| GradeCount {
            letter_grade,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                total_score / count as f64
            },
        })
        .collect();

    counts.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.letter_grade.cmp(&b.letter_grade))
    });
    counts
}

pub struct ReportScope<'a> {
    pub angkatan: Option<&'a str>,
    pub semester: Option<i32>,
    pub generated_at: DateTime<Utc>,
}

pub fn build_report(scope: &ReportScope<'_>, standings: &Standings) -> String {
    let distribution = grade_distribution(&standings.aggregates);

    let mut output = String::new();
    let angkatan_label = scope.angkatan.unwrap_or("all cohorts");
    let semester_label = scope
        .semester
        .map_or_else(|| "all semesters".to_string(), |s| format!("semester {s}"));

    let _ = writeln!(output, "# Semester Ranking Report");
    let _ = writeln!(
        output,
        "Angkatan {}, {}, curriculum {} (generated {})",
        angkatan_label,
        semester_label,
        standings.curriculum,
        scope.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Standings");

    if standings.aggregates.is_empty() {
        let _ = writeln!(output, "No students in this scope.");
    } else {
        let _ = writeln!(
            output,
            "| Rank | NIM | Name | SKS | Total Score | Weighted Points | GPA |"
        );
        let _ = writeln!(output, "|---:|---|---|---:|---:|---:|---:|");
        for aggregate in &standings.aggregates {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {:.2} | {:.2} | {:.2} |",
                aggregate.rank.map_or_else(|| "-".to_string(), |r| r.to_string()),
                aggregate.nim,
                aggregate.full_name,
                aggregate.total_credits,
                aggregate.total_score,
                aggregate.total_weighted_grade_point,
                aggregate.gpa
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");

    if distribution.is_empty() {
        let _ = writeln!(output, "No graded courses in this scope.");
    } else {
        for grade in &distribution {
            let _ = writeln!(
                output,
                "- {}: {} results (avg score {:.1})",
                grade.letter_grade, grade.count, grade.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rejected Records");

    if standings.rejected.is_empty() {
        let _ = writeln!(output, "None.");
    } else {
        for rejection in &standings.rejected {
            let _ = writeln!(
                output,
                "- #{} [{}] student {} course {}: {}",
                rejection.index,
                rejection.error.label(),
                rejection.student_id,
                rejection.course_id,
                rejection.error
            );
        }
    }

    output
}

#[derive(Serialize)]
struct StandingRow<'a> {
    rank: Option<usize>,
    nim: &'a str,
    full_name: &'a str,
    total_credits: u32,
    total_score: f64,
    total_weighted_grade_point: f64,
    gpa: String,
}

/// Spreadsheet export of the standings, one row per student.
pub fn write_standings_csv<W: std::io::Write>(
    writer: W,
    aggregates: &[StudentAggregate],
) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for aggregate in aggregates {
        csv_writer.serialize(StandingRow {
            rank: aggregate.rank,
            nim: &aggregate.nim,
            full_name: &aggregate.full_name,
            total_credits: aggregate.total_credits,
            total_score: aggregate.total_score,
            total_weighted_grade_point: aggregate.total_weighted_grade_point,
            gpa: format!("{:.2}", aggregate.gpa),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn standings_json(standings: &Standings) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(standings)?)
}
