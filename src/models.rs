use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub nim: String,
    pub full_name: String,
    pub angkatan: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub credits: i32,
    pub curriculum: String,
    pub semester: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingScaleEntry {
    pub curriculum: String,
    pub letter_grade: String,
    pub min_score: f64,
    pub max_score: f64,
    pub grade_point: f64,
    pub description: String,
}

impl GradingScaleEntry {
    pub fn contains(&self, score: f64) -> bool {
        self.min_score <= score && score <= self.max_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedGrade {
    pub letter_grade: String,
    pub grade_point: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseResult {
    pub course_id: Uuid,
    pub course_code: String,
    pub score: f64,
    pub letter_grade: String,
    pub grade_point: f64,
    pub credits: u32,
}

/// Derived per-student totals for one scope. `rank` stays `None` until the
/// whole roster has been aggregated and ranked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAggregate {
    pub student_id: Uuid,
    pub nim: String,
    pub full_name: String,
    pub results: Vec<CourseResult>,
    pub total_score: f64,
    pub total_weighted_grade_point: f64,
    pub total_credits: u32,
    pub gpa: f64,
    pub rank: Option<usize>,
}

impl StudentAggregate {
    pub fn empty(student: &Student) -> Self {
        Self {
            student_id: student.id,
            nim: student.nim.clone(),
            full_name: student.full_name.clone(),
            results: Vec::new(),
            total_score: 0.0,
            total_weighted_grade_point: 0.0,
            total_credits: 0,
            gpa: 0.0,
            rank: None,
        }
    }

    /// Recomputes the totals and GPA from `results`. Sums are taken in whole
    /// hundredths so the same grades give bit-identical totals in any order.
    pub fn recompute_totals(&mut self) {
        let score_hundredths: i64 = self.results.iter().map(|r| hundredths(r.score)).sum();
        let weighted_hundredths: i64 = self
            .results
            .iter()
            .map(|r| hundredths(r.grade_point) * i64::from(r.credits))
            .sum();

        self.total_credits = self.results.iter().map(|r| r.credits).sum();
        self.total_score = score_hundredths as f64 / 100.0;
        self.total_weighted_grade_point = weighted_hundredths as f64 / 100.0;
        self.gpa = if self.total_credits > 0 {
            weighted_hundredths as f64 / (100.0 * self.total_credits as f64)
        } else {
            0.0
        };
    }
}

/// Scores and grade points carry at most two decimals.
pub fn hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeCount {
    pub letter_grade: String,
    pub count: usize,
    pub avg_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: &str, grade_point: f64, credits: u32, score: f64) -> CourseResult {
        CourseResult {
            course_id: Uuid::new_v4(),
            course_code: code.to_string(),
            score,
            letter_grade: String::new(),
            grade_point,
            credits,
        }
    }

    fn student(nim: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            nim: nim.to_string(),
            full_name: String::new(),
            angkatan: "2020".to_string(),
        }
    }

    #[test]
    fn totals_do_not_depend_on_course_order() {
        let p = result("P", 3.7, 3, 81.0);
        let q = result("Q", 3.3, 2, 77.0);
        let r = result("R", 2.3, 1, 66.0);

        let mut forward = StudentAggregate::empty(&student("001"));
        forward.results = vec![p.clone(), q.clone(), r.clone()];
        forward.recompute_totals();

        let mut reversed = StudentAggregate::empty(&student("002"));
        reversed.results = vec![r, q, p];
        reversed.recompute_totals();

        assert_eq!(forward.total_weighted_grade_point, 20.0);
        assert_eq!(
            forward.total_weighted_grade_point.to_bits(),
            reversed.total_weighted_grade_point.to_bits()
        );
        assert_eq!(forward.gpa.to_bits(), reversed.gpa.to_bits());
        assert_eq!(forward.total_score, 224.0);
        assert_eq!(forward.total_credits, 6);
    }

    #[test]
    fn no_results_means_zero_gpa() {
        let mut aggregate = StudentAggregate::empty(&student("001"));
        aggregate.recompute_totals();
        assert_eq!(aggregate.gpa, 0.0);
        assert_eq!(aggregate.total_credits, 0);
    }
}
