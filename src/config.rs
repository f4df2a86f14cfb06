use anyhow::{bail, Context};

use crate::aggregate::UnresolvedGradePolicy;

pub const MAX_CONNECTIONS_VAR: &str = "SEMESTER_RANKING_MAX_CONNECTIONS";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to the grades Postgres instance")?;
        let max_connections = std::env::var(MAX_CONNECTIONS_VAR).ok();
        Self::from_parts(database_url, max_connections.as_deref())
    }

    fn from_parts(database_url: String, max_connections: Option<&str>) -> anyhow::Result<Self> {
        if database_url.trim().is_empty() {
            bail!("DATABASE_URL is empty");
        }

        let max_connections = match max_connections {
            Some(raw) => {
                let value: u32 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{MAX_CONNECTIONS_VAR} must be a positive integer"))?;
                if value == 0 {
                    bail!("{MAX_CONNECTIONS_VAR} must be at least 1");
                }
                value
            }
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// Builds the unresolved-grade policy from the `--on-unresolved` family of flags.
pub fn unresolved_policy(
    fallback: bool,
    letter_grade: &str,
    grade_point: f64,
) -> anyhow::Result<UnresolvedGradePolicy> {
    if !fallback {
        return Ok(UnresolvedGradePolicy::Reject);
    }
    if letter_grade.trim().is_empty() {
        bail!("--fallback-letter must not be empty");
    }
    if !(0.0..=4.0).contains(&grade_point) {
        bail!("--fallback-point must be between 0 and 4, got {grade_point}");
    }
    Ok(UnresolvedGradePolicy::Fallback {
        letter_grade: letter_grade.trim().to_string(),
        grade_point,
    })
}
