use serde::Serialize;

pub const DEFAULT_PASS_PERCENT: f64 = 40.0;
pub const DEFAULT_GOOD_STANDING_PERCENT: u32 = 75;

/// Lower bound (inclusive) of each letter band, best first.
const LETTER_BANDS: [(f64, &str); 7] = [
    (90.0, "O"),
    (80.0, "A+"),
    (70.0, "A"),
    (60.0, "B+"),
    (50.0, "B"),
    (40.0, "C"),
    (33.0, "D"),
];

const FAILING_LETTER: &str = "F";

const GRADE_POINTS: [(&str, f64); 9] = [
    ("O", 10.0),
    ("A+", 10.0),
    ("A", 9.0),
    ("B+", 8.0),
    ("B", 7.0),
    ("C+", 6.0),
    ("C", 5.0),
    ("D", 4.0),
    ("F", 0.0),
];

pub const MAX_GRADE_POINT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPolicy {
    pub pass_percent: f64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            pass_percent: DEFAULT_PASS_PERCENT,
        }
    }
}

impl GradingPolicy {
    pub fn with_pass_percent(pass_percent: f64) -> Self {
        Self { pass_percent }
    }

    pub fn letter_for(&self, percent: f64) -> &'static str {
        LETTER_BANDS
            .iter()
            .find(|(floor, _)| percent >= *floor)
            .map(|(_, letter)| *letter)
            .unwrap_or(FAILING_LETTER)
    }

    /// Unknown letters are worth nothing.
    pub fn grade_point(&self, grade: &str) -> f64 {
        let g = grade.trim();
        GRADE_POINTS
            .iter()
            .find(|(letter, _)| letter.eq_ignore_ascii_case(g))
            .map(|(_, gp)| *gp)
            .unwrap_or(0.0)
    }

    pub fn is_pass(&self, percent: f64) -> bool {
        percent >= self.pass_percent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendancePolicy {
    pub good_standing_percent: u32,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            good_standing_percent: DEFAULT_GOOD_STANDING_PERCENT,
        }
    }
}

impl AttendancePolicy {
    pub fn is_below_threshold(&self, percentage: u32) -> bool {
        percentage < self.good_standing_percent
    }
}
