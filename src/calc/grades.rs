use crate::calc::policy::{GradingPolicy, MAX_GRADE_POINT};
use crate::calc::round_2;
use crate::records::{MarkRecord, MarkStatus};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedMark {
    pub subject_id: String,
    pub exam_type: String,
    pub semester: i64,
    pub academic_year: String,
    pub attempt_number: i64,
    pub marks_obtained: Option<f64>,
    pub max_marks: Option<f64>,
    pub percentage: Option<f64>,
    pub grade: String,
    pub grade_point: f64,
    pub credits: f64,
    pub status: MarkStatus,
}

impl GradedMark {
    pub fn is_backlog(&self) -> bool {
        self.status == MarkStatus::Fail
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterGrades {
    pub semester: i64,
    /// `None` when the semester carries no credits.
    pub sgpa: Option<f64>,
    pub credits: f64,
    pub backlog_count: usize,
    pub passed_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeTotals {
    pub cgpa: Option<f64>,
    pub total_credits: f64,
    pub backlog_count: usize,
    pub passed_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub cgpa: Option<f64>,
    pub total_credits: f64,
    pub backlog_count: usize,
    pub passed_count: usize,
    pub skipped_count: usize,
    pub semesters: Vec<SemesterGrades>,
    pub records: Vec<GradedMark>,
}

impl GradeSummary {
    pub fn totals(&self) -> GradeTotals {
        GradeTotals {
            cgpa: self.cgpa,
            total_credits: self.total_credits,
            backlog_count: self.backlog_count,
            passed_count: self.passed_count,
        }
    }
}

fn percentage_of(record: &MarkRecord) -> Option<f64> {
    let (obtained, max) = (record.marks_obtained?, record.max_marks?);
    if !obtained.is_finite() || !max.is_finite() || max <= 0.0 || obtained < 0.0 {
        return None;
    }
    Some((100.0 * obtained / max).clamp(0.0, 100.0))
}

/// Grade one record. Returns `None` for records that can't be graded
/// (no usable marks and no supplied letter, or unusable credits).
/// Usable marks always decide the letter; a supplied letter is ignored then.
pub fn grade_mark(record: &MarkRecord, policy: &GradingPolicy) -> Option<GradedMark> {
    if !record.credits.is_finite() || record.credits < 0.0 {
        return None;
    }
    let percentage = percentage_of(record);
    let supplied = record
        .grade
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_ascii_uppercase);
    // A stored letter only stands in when the numbers are unusable.
    let grade = match (percentage, supplied) {
        (Some(p), _) => policy.letter_for(p).to_string(),
        (None, Some(g)) => g,
        (None, None) => return None,
    };
    let grade_point = policy.grade_point(&grade);
    let passed = match percentage {
        Some(p) => policy.is_pass(p),
        None => grade_point > 0.0,
    };

    Some(GradedMark {
        subject_id: record.subject_id.clone(),
        exam_type: record.exam_type.clone(),
        semester: record.semester,
        academic_year: record.academic_year.clone(),
        attempt_number: record.attempt_number,
        marks_obtained: record.marks_obtained,
        max_marks: record.max_marks,
        percentage: percentage.map(round_2),
        grade,
        grade_point,
        credits: record.credits,
        status: if passed {
            MarkStatus::Pass
        } else {
            MarkStatus::Fail
        },
    })
}

/// Credit-weighted mean grade point, 2 decimals. `None` when no credits.
pub fn weighted_grade_point<'a, I>(marks: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a GradedMark>,
{
    let mut points = 0.0_f64;
    let mut credits = 0.0_f64;
    for m in marks {
        points += m.grade_point * m.credits;
        credits += m.credits;
    }
    if credits <= 0.0 {
        return None;
    }
    Some(round_2((points / credits).clamp(0.0, MAX_GRADE_POINT)))
}

/// Every record is additive: a retaken subject contributes its credits
/// once per attempt.
pub fn summarize_grades(records: &[MarkRecord], policy: &GradingPolicy) -> GradeSummary {
    let mut graded: Vec<GradedMark> = Vec::with_capacity(records.len());
    let mut skipped_count = 0_usize;
    for r in records {
        match grade_mark(r, policy) {
            Some(g) => graded.push(g),
            None => skipped_count += 1,
        }
    }

    let mut by_semester: BTreeMap<i64, Vec<&GradedMark>> = BTreeMap::new();
    for g in &graded {
        by_semester.entry(g.semester).or_default().push(g);
    }
    let semesters = by_semester
        .into_iter()
        .map(|(semester, marks)| SemesterGrades {
            semester,
            sgpa: weighted_grade_point(marks.iter().copied()),
            credits: marks.iter().fold(0.0, |acc, m| acc + m.credits),
            backlog_count: marks.iter().filter(|m| m.is_backlog()).count(),
            passed_count: marks.iter().filter(|m| !m.is_backlog()).count(),
        })
        .collect();

    let backlog_count = graded.iter().filter(|m| m.is_backlog()).count();
    GradeSummary {
        cgpa: weighted_grade_point(&graded),
        total_credits: graded.iter().fold(0.0, |acc, m| acc + m.credits),
        backlog_count,
        passed_count: graded.len() - backlog_count,
        skipped_count,
        semesters,
        records: graded,
    }
}

/// Subjects listed in the backlog ranking.
pub const TOP_BACKLOG_SUBJECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectBacklogs {
    pub subject_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterBacklogs {
    pub semester: i64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogAnalytics {
    pub total_backlogs: usize,
    pub open_backlogs: usize,
    /// Failed attempts later passed in the same subject.
    pub cleared_backlogs: usize,
    pub students_with_backlogs: usize,
    /// Open backlogs, most first.
    pub subject_wise: Vec<SubjectBacklogs>,
    pub semester_wise: Vec<SemesterBacklogs>,
    pub grade_distribution: BTreeMap<String, usize>,
    pub skipped_count: usize,
}

/// Backlog picture across many students' records.
pub fn backlog_analytics(records: &[MarkRecord], policy: &GradingPolicy) -> BacklogAnalytics {
    let mut out = BacklogAnalytics::default();
    let mut graded = Vec::with_capacity(records.len());
    for r in records {
        match grade_mark(r, policy) {
            Some(g) => graded.push((r.student_id.as_str(), g)),
            None => out.skipped_count += 1,
        }
    }

    let mut latest_pass: HashMap<(&str, &str), i64> = HashMap::new();
    for (student, g) in graded.iter().filter(|(_, g)| !g.is_backlog()) {
        let attempt = latest_pass
            .entry((*student, g.subject_id.as_str()))
            .or_insert(g.attempt_number);
        *attempt = (*attempt).max(g.attempt_number);
    }

    let mut by_subject: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_semester: BTreeMap<i64, usize> = BTreeMap::new();
    let mut students = BTreeSet::new();
    for (student, g) in &graded {
        *out.grade_distribution.entry(g.grade.clone()).or_default() += 1;
        if !g.is_backlog() {
            continue;
        }
        out.total_backlogs += 1;
        let cleared = latest_pass
            .get(&(*student, g.subject_id.as_str()))
            .is_some_and(|passed| *passed > g.attempt_number);
        if cleared {
            out.cleared_backlogs += 1;
            continue;
        }
        out.open_backlogs += 1;
        *by_subject.entry(g.subject_id.as_str()).or_default() += 1;
        *by_semester.entry(g.semester).or_default() += 1;
        students.insert(*student);
    }

    let mut subject_wise: Vec<SubjectBacklogs> = by_subject
        .into_iter()
        .map(|(subject_id, count)| SubjectBacklogs {
            subject_id: subject_id.to_string(),
            count,
        })
        .collect();
    // stable sort keeps subject id order among ties
    subject_wise.sort_by(|a, b| b.count.cmp(&a.count));
    subject_wise.truncate(TOP_BACKLOG_SUBJECTS);

    out.students_with_backlogs = students.len();
    out.subject_wise = subject_wise;
    out.semester_wise = by_semester
        .into_iter()
        .map(|(semester, count)| SemesterBacklogs { semester, count })
        .collect();
    out
}
