use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod aggregate;
mod config;
mod db;
mod engine;
mod error;
mod import;
mod logging;
mod models;
mod ranking;
mod report;
mod scale;

use aggregate::Snapshot;
use config::Config;
use engine::{compute_standings, EngineOptions, Standings};
use ranking::RankingPolicy;
use scale::GradingScales;

#[derive(Parser)]
#[command(name = "semester-ranking")]
#[command(about = "Grade aggregation and GPA ranking for a university cohort", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    engine: EngineArgs,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log level or filter directive (overrides --verbose)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Args)]
struct EngineArgs {
    /// How tied students are numbered
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = RankingPolicy::Sequential,
        env = "SEMESTER_RANKING_POLICY"
    )]
    ranking: RankingPolicy,

    /// What to do with scores no grading-scale entry covers
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OnUnresolved::Reject,
        env = "SEMESTER_RANKING_ON_UNRESOLVED"
    )]
    on_unresolved: OnUnresolved,

    /// Letter grade used by --on-unresolved fallback
    #[arg(long, global = true, default_value = "E")]
    fallback_letter: String,

    /// Grade point used by --on-unresolved fallback
    #[arg(long, global = true, default_value_t = 0.0)]
    fallback_point: f64,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnUnresolved {
    Reject,
    Fallback,
}

#[derive(Args)]
struct ScopeArgs {
    /// Curriculum whose courses and grading scale apply
    #[arg(long)]
    curriculum: String,
    /// Enrollment year of the students to rank
    #[arg(long)]
    angkatan: Option<String>,
    /// Restrict to courses of one semester
    #[arg(long)]
    semester: Option<i32>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample cohort, curriculum and grading scale
    Seed,
    /// Upsert scores from a CSV file (nim,course_code,score)
    ImportScores {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        curriculum: String,
    },
    /// Replace a curriculum's grading scale from a CSV file
    ImportScale {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        curriculum: String,
    },
    /// Report gaps and overlaps in a curriculum's grading scale
    CheckScale {
        #[arg(long)]
        curriculum: String,
    },
    /// Resolve one score to a letter grade
    Grade {
        #[arg(long)]
        curriculum: String,
        #[arg(long)]
        score: f64,
    },
    /// Rank students by GPA
    Rank {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },
    /// Generate a markdown report and optional CSV export
    Report {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        csv_out: Option<PathBuf>,
    },
}

impl EngineArgs {
    fn options(&self) -> anyhow::Result<EngineOptions> {
        Ok(EngineOptions {
            ranking: self.ranking,
            unresolved: config::unresolved_policy(
                self.on_unresolved == OnUnresolved::Fallback,
                &self.fallback_letter,
                self.fallback_point,
            )?,
        })
    }
}

async fn load_standings(
    pool: &PgPool,
    scope: &ScopeArgs,
    options: &EngineOptions,
) -> anyhow::Result<Standings> {
    let students = db::fetch_students(pool, scope.angkatan.as_deref()).await?;
    let courses = db::fetch_courses(pool, &scope.curriculum, scope.semester).await?;
    let entries = db::fetch_grading_scale(pool, &scope.curriculum).await?;

    let student_ids: Vec<_> = students.iter().map(|s| s.id).collect();
    let course_ids: Vec<_> = courses.iter().map(|c| c.id).collect();
    let scores = db::fetch_scores(pool, &student_ids, &course_ids).await?;
    let scales = GradingScales::from_entries(&entries);

    let snapshot = Snapshot {
        curriculum: &scope.curriculum,
        students: &students,
        courses: &courses,
        scales: &scales,
        scores: &scores,
    };
    Ok(compute_standings(&snapshot, options))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(err) = logging::init_tracing(cli.verbose, cli.log_level.as_deref(), cli.log_json) {
        eprintln!("Warning: failed to initialize logging: {err}");
    }

    let options = cli.engine.options()?;
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportScores { csv, curriculum } => {
            let summary = db::import_scores_csv(&pool, &csv, &curriculum).await?;
            println!(
                "Upserted {} scores from {}.",
                summary.upserted,
                csv.display()
            );
            if !summary.rejected.is_empty() {
                println!("Rejected {} rows:", summary.rejected.len());
                for rejection in &summary.rejected {
                    println!("- line {}: {}", rejection.line, rejection.error);
                }
            }
        }
        Commands::ImportScale { csv, curriculum } => {
            let count = db::import_scale_csv(&pool, &csv, &curriculum).await?;
            println!("Grading scale for {curriculum} replaced with {count} entries.");
        }
        Commands::CheckScale { curriculum } => {
            let entries = db::fetch_grading_scale(&pool, &curriculum).await?;
            let scales = GradingScales::from_entries(&entries);
            if let Some(scale) = scales.get(&curriculum) {
                for entry in scale.entries() {
                    println!(
                        "{:<4} {:>6.2} - {:>6.2}  {:.2}  {}",
                        entry.letter_grade,
                        entry.min_score,
                        entry.max_score,
                        entry.grade_point,
                        entry.description
                    );
                }
            }

            let issues = scales.check_partition(&curriculum);
            if issues.is_empty() {
                println!("Grading scale for {curriculum} covers 0-100 without gaps or overlaps.");
            } else {
                println!("Grading scale for {curriculum} has {} issues:", issues.len());
                for issue in &issues {
                    println!("- {issue}");
                }
            }
        }
        Commands::Grade { curriculum, score } => {
            let entries = db::fetch_grading_scale(&pool, &curriculum).await?;
            let scales = GradingScales::from_entries(&entries);
            match scales.resolve_grade(score, &curriculum) {
                Ok(grade) => {
                    println!("{score} -> {} ({:.2})", grade.letter_grade, grade.grade_point)
                }
                Err(err) => println!("{score} -> no grade: {err}"),
            }
        }
        Commands::Rank {
            scope,
            limit,
            format,
        } => {
            let standings = load_standings(&pool, &scope, &options).await?;

            match format {
                OutputFormat::Json => println!("{}", report::standings_json(&standings)?),
                OutputFormat::Human => {
                    if standings.aggregates.is_empty() {
                        println!("No students found for this scope.");
                        return Ok(());
                    }

                    println!("Top students by GPA:");
                    for aggregate in standings.aggregates.iter().take(limit) {
                        println!(
                            "{:>3}. {} ({}) GPA {:.2} across {} SKS, weighted {:.2}, total {:.2}",
                            aggregate.rank.unwrap_or_default(),
                            aggregate.full_name,
                            aggregate.nim,
                            aggregate.gpa,
                            aggregate.total_credits,
                            aggregate.total_weighted_grade_point,
                            aggregate.total_score
                        );
                    }
                    if !standings.rejected.is_empty() {
                        println!(
                            "{} score records were rejected; run `report` for details.",
                            standings.rejected.len()
                        );
                    }
                }
            }
        }
        Commands::Report {
            scope,
            out,
            csv_out,
        } => {
            let standings = load_standings(&pool, &scope, &options).await?;
            let report_scope = report::ReportScope {
                angkatan: scope.angkatan.as_deref(),
                semester: scope.semester,
                generated_at: chrono::Utc::now(),
            };
            let markdown = report::build_report(&report_scope, &standings);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());

            if let Some(path) = csv_out {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_standings_csv(file, &standings.aggregates)?;
                println!("Standings exported to {}.", path.display());
            }
        }
    }

    Ok(())
}
