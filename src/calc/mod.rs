//! Pure aggregation over records already fetched from the store.
//!
//! Nothing in here touches the database or returns an error: malformed
//! records are skipped and counted, empty input yields zero-valued output.

pub mod attendance;
pub mod fees;
pub mod grades;
pub mod leave;
pub mod policy;
pub mod summary;

/// Round half away from zero to 2 decimals (GPA and money presentation).
pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Whole-number percentage of `part` in `whole`, clamped to 0..=100.
/// `whole == 0` yields 0.
pub fn whole_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    let pct = (100.0 * part as f64 / whole as f64).round();
    pct.clamp(0.0, 100.0) as u32
}
