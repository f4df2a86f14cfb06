use anyhow::Context;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::import::{self, ImportLookup, RowRejection};
use crate::models::{Course, GradingScaleEntry, ScoreRecord, Student};
use crate::scale::GradingScale;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("351b272e-c6b4-4cb1-8239-98ca6f18a282")?,
            "2020110001",
            "Ayu Lestari",
        ),
        (
            Uuid::parse_str("81138faa-467f-4c7f-aea3-f9b975ef04e4")?,
            "2020110002",
            "Bima Saputra",
        ),
        (
            Uuid::parse_str("71bf0dc6-d07e-4d60-bc8e-f2528f4063a7")?,
            "2020110003",
            "Citra Wulandari",
        ),
    ];

    for (id, nim, name) in &students {
        sqlx::query(
            r#"
            INSERT INTO academic.students (id, nim, full_name, angkatan)
            VALUES ($1, $2, $3, '2020')
            ON CONFLICT (nim) DO UPDATE
            SET full_name = EXCLUDED.full_name, angkatan = EXCLUDED.angkatan
            "#,
        )
        .bind(id)
        .bind(nim)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        (
            Uuid::parse_str("6b1f8a52-0d0e-4c55-9d7e-1f4f2d9c0a11")?,
            "IF101",
            "Algoritma dan Pemrograman",
            3,
        ),
        (
            Uuid::parse_str("9a3c2e71-5b44-4f0a-8c1d-2e6b7f3d0b22")?,
            "MA101",
            "Kalkulus I",
            2,
        ),
        (
            Uuid::parse_str("c4d2b913-7e65-4a1b-9f2e-3a7c8e4d1c33")?,
            "IF102",
            "Struktur Data",
            3,
        ),
    ];

    for (id, code, name, credits) in &courses {
        sqlx::query(
            r#"
            INSERT INTO academic.courses (id, code, name, credits, curriculum, semester)
            VALUES ($1, $2, $3, $4, 'K2020', 1)
            ON CONFLICT (curriculum, code) DO UPDATE
            SET name = EXCLUDED.name, credits = EXCLUDED.credits
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(name)
        .bind(credits)
        .execute(pool)
        .await?;
    }

    let scale = [
        ("A", 85.0, 100.0, 4.0, "Sangat baik"),
        ("AB", 80.0, 84.99, 3.5, "Baik sekali"),
        ("B", 70.0, 79.99, 3.0, "Baik"),
        ("BC", 65.0, 69.99, 2.5, "Cukup baik"),
        ("C", 55.0, 64.99, 2.0, "Cukup"),
        ("D", 40.0, 54.99, 1.0, "Kurang"),
        ("E", 0.0, 39.99, 0.0, "Gagal"),
    ];
    let entries: Vec<GradingScaleEntry> = scale
        .iter()
        .map(|(letter, min, max, point, description)| GradingScaleEntry {
            curriculum: "K2020".to_string(),
            letter_grade: letter.to_string(),
            min_score: *min,
            max_score: *max,
            grade_point: *point,
            description: description.to_string(),
        })
        .collect();
    replace_grading_scale(pool, "K2020", &entries).await?;

    let scores = [
        (0, 0, 90.0),
        (0, 1, 72.0),
        (0, 2, 81.5),
        (1, 0, 90.0),
        (1, 1, 72.0),
        (1, 2, 81.5),
        (2, 0, 64.0),
        (2, 1, 88.0),
    ];

    let mut tx = pool.begin().await?;
    for (student, course, score) in scores {
        upsert_score(
            &mut *tx,
            &ScoreRecord {
                student_id: students[student].0,
                course_id: courses[course].0,
                score,
            },
        )
        .await?;
    }
    tx.commit().await?;

    Ok(())
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> Student {
    Student {
        id: row.get("id"),
        nim: row.get("nim"),
        full_name: row.get("full_name"),
        angkatan: row.get("angkatan"),
    }
}

pub async fn fetch_students(pool: &PgPool, angkatan: Option<&str>) -> anyhow::Result<Vec<Student>> {
    let rows = match angkatan {
        Some(value) => {
            sqlx::query(
                "SELECT id, nim, full_name, angkatan FROM academic.students \
                 WHERE angkatan = $1 ORDER BY nim",
            )
            .bind(value)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT id, nim, full_name, angkatan FROM academic.students ORDER BY nim")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows.iter().map(student_from_row).collect())
}

pub async fn fetch_courses(
    pool: &PgPool,
    curriculum: &str,
    semester: Option<i32>,
) -> anyhow::Result<Vec<Course>> {
    let mut query = String::from(
        "SELECT id, code, name, credits, curriculum, semester FROM academic.courses \
         WHERE curriculum = $1",
    );
    if semester.is_some() {
        query.push_str(" AND semester = $2");
    }
    query.push_str(" ORDER BY semester, code");

    let mut rows = sqlx::query(&query).bind(curriculum);
    if let Some(value) = semester {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut courses = Vec::new();

    for row in records {
        courses.push(Course {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            credits: row.get("credits"),
            curriculum: row.get("curriculum"),
            semester: row.get("semester"),
        });
    }

    Ok(courses)
}

pub async fn fetch_grading_scale(
    pool: &PgPool,
    curriculum: &str,
) -> anyhow::Result<Vec<GradingScaleEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT curriculum, letter_grade, min_score, max_score, grade_point, description
        FROM academic.grading_scales
        WHERE curriculum = $1
        ORDER BY min_score DESC
        "#,
    )
    .bind(curriculum)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| GradingScaleEntry {
            curriculum: row.get("curriculum"),
            letter_grade: row.get("letter_grade"),
            min_score: row.get("min_score"),
            max_score: row.get("max_score"),
            grade_point: row.get("grade_point"),
            description: row.get("description"),
        })
        .collect())
}

/// Scores for the given students restricted to the given courses.
pub async fn fetch_scores(
    pool: &PgPool,
    student_ids: &[Uuid],
    course_ids: &[Uuid],
) -> anyhow::Result<Vec<ScoreRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT student_id, course_id, score
        FROM academic.scores
        WHERE student_id = ANY($1) AND course_id = ANY($2)
        ORDER BY updated_at, id
        "#,
    )
    .bind(student_ids)
    .bind(course_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ScoreRecord {
            student_id: row.get("student_id"),
            course_id: row.get("course_id"),
            score: row.get("score"),
        })
        .collect())
}

pub async fn upsert_score(conn: &mut PgConnection, record: &ScoreRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO academic.scores (id, student_id, course_id, score, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (student_id, course_id) DO UPDATE
        SET score = EXCLUDED.score, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.student_id)
    .bind(record.course_id)
    .bind(record.score)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub upserted: usize,
    pub rejected: Vec<RowRejection>,
}

pub async fn import_scores_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    curriculum: &str,
) -> anyhow::Result<ImportSummary> {
    let students = fetch_students(pool, None).await?;
    let courses = fetch_courses(pool, curriculum, None).await?;
    let lookup = ImportLookup::new(&students, &courses);

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let parsed = import::parse_score_rows(file, &lookup)?;

    let mut tx = pool.begin().await?;
    for record in &parsed.records {
        upsert_score(&mut *tx, record).await?;
    }
    tx.commit().await?;

    for rejection in &parsed.rejected {
        debug!(line = rejection.line, error = %rejection.error, "import row rejected");
    }
    info!(
        upserted = parsed.records.len(),
        rejected = parsed.rejected.len(),
        curriculum,
        "score import finished"
    );

    Ok(ImportSummary {
        upserted: parsed.records.len(),
        rejected: parsed.rejected,
    })
}

/// Swaps a curriculum's whole grading scale in one transaction.
pub async fn replace_grading_scale(
    pool: &PgPool,
    curriculum: &str,
    entries: &[GradingScaleEntry],
) -> anyhow::Result<()> {
    for issue in GradingScale::new(entries.to_vec()).check_partition() {
        warn!(curriculum, %issue, "imported grading scale is not a clean partition");
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM academic.grading_scales WHERE curriculum = $1")
        .bind(curriculum)
        .execute(&mut *tx)
        .await?;

    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO academic.grading_scales
            (id, curriculum, letter_grade, min_score, max_score, grade_point, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(curriculum)
        .bind(&entry.letter_grade)
        .bind(entry.min_score)
        .bind(entry.max_score)
        .bind(entry.grade_point)
        .bind(&entry.description)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn import_scale_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    curriculum: &str,
) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let entries = import::parse_scale_rows(file, curriculum)?;
    if entries.is_empty() {
        anyhow::bail!("{} contains no grading scale rows", csv_path.display());
    }

    replace_grading_scale(pool, curriculum, &entries).await?;
    Ok(entries.len())
}
