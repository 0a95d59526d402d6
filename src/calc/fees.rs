use crate::calc::round_2;
use crate::records::{FeeAssignment, FeeStatus, Payment};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLine {
    pub fee_id: String,
    pub student_id: String,
    pub fee_structure_id: String,
    pub academic_year: String,
    pub semester: i64,
    pub due_date: NaiveDate,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    pub status: FeeStatus,
    pub payment_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTotals {
    pub total: f64,
    pub paid: f64,
    pub due: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSummary {
    pub fees: Vec<FeeLine>,
    pub totals: FeeTotals,
    pub skipped_count: usize,
}

/// Sum of the payment history. Stored payments are always positive.
pub fn paid_amount(payments: &[Payment]) -> f64 {
    payments
        .iter()
        .map(|p| p.amount)
        .filter(|a| a.is_finite() && *a > 0.0)
        .fold(0.0, |acc, a| acc + a)
}

pub fn due_amount(total: f64, paid: f64) -> f64 {
    round_2((total - paid).max(0.0))
}

pub fn fee_status(total: f64, paid: f64, due_date: NaiveDate, as_of: NaiveDate) -> FeeStatus {
    if due_amount(total, paid) <= 0.0 {
        FeeStatus::Paid
    } else if as_of > due_date {
        FeeStatus::Overdue
    } else if paid > 0.0 {
        FeeStatus::Partial
    } else {
        FeeStatus::Pending
    }
}

/// `None` for assignments whose total is unusable.
pub fn evaluate_fee(fee: &FeeAssignment, as_of: NaiveDate) -> Option<FeeLine> {
    if !fee.total_amount.is_finite() || fee.total_amount < 0.0 {
        return None;
    }
    let paid = paid_amount(&fee.payments);
    Some(FeeLine {
        fee_id: fee.id.clone(),
        student_id: fee.student_id.clone(),
        fee_structure_id: fee.fee_structure_id.clone(),
        academic_year: fee.academic_year.clone(),
        semester: fee.semester,
        due_date: fee.due_date,
        total_amount: fee.total_amount,
        paid_amount: paid,
        due_amount: due_amount(fee.total_amount, paid),
        status: fee_status(fee.total_amount, paid, fee.due_date, as_of),
        payment_count: fee.payments.len(),
    })
}

pub fn summarize_fees(fees: &[FeeAssignment], as_of: NaiveDate) -> FeeSummary {
    let mut out = FeeSummary::default();
    for fee in fees {
        let Some(line) = evaluate_fee(fee, as_of) else {
            out.skipped_count += 1;
            continue;
        };
        out.totals.total += line.total_amount;
        out.totals.paid += line.paid_amount;
        out.totals.due += line.due_amount;
        out.fees.push(line);
    }
    out.totals.due = round_2(out.totals.due);
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub paid: usize,
    pub partial: usize,
    pub pending: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCollection {
    /// `YYYY-MM`
    pub month: String,
    pub amount: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeAnalytics {
    pub assignment_count: usize,
    pub student_count: usize,
    pub totals: FeeTotals,
    pub status_counts: StatusCounts,
    pub monthly_trend: Vec<MonthlyCollection>,
    pub skipped_count: usize,
}

/// Collection overview over many assignments. The monthly trend buckets
/// payments by the month they were made, oldest first.
pub fn fee_analytics(fees: &[FeeAssignment], as_of: NaiveDate) -> FeeAnalytics {
    let summary = summarize_fees(fees, as_of);
    let mut status_counts = StatusCounts::default();
    let mut students = BTreeSet::new();
    for line in &summary.fees {
        students.insert(line.student_id.as_str());
        match line.status {
            FeeStatus::Paid => status_counts.paid += 1,
            FeeStatus::Partial => status_counts.partial += 1,
            FeeStatus::Pending => status_counts.pending += 1,
            FeeStatus::Overdue => status_counts.overdue += 1,
        }
    }

    let counted: BTreeSet<&str> = summary.fees.iter().map(|l| l.fee_id.as_str()).collect();
    let mut by_month: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for fee in fees.iter().filter(|f| counted.contains(f.id.as_str())) {
        for p in fee.payments.iter().filter(|p| p.amount.is_finite() && p.amount > 0.0) {
            let bucket = by_month.entry(p.date.format("%Y-%m").to_string()).or_default();
            bucket.0 += p.amount;
            bucket.1 += 1;
        }
    }

    FeeAnalytics {
        assignment_count: summary.fees.len(),
        student_count: students.len(),
        totals: summary.totals,
        status_counts,
        monthly_trend: by_month
            .into_iter()
            .map(|(month, (amount, count))| MonthlyCollection {
                month,
                amount: round_2(amount),
                count,
            })
            .collect(),
        skipped_count: summary.skipped_count,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    pub fee_id: String,
    pub fee_structure_id: String,
    pub academic_year: String,
    #[serde(flatten)]
    pub payment: Payment,
}

/// Every payment across the given assignments, newest first.
pub fn payment_history(fees: &[FeeAssignment]) -> Vec<PaymentEntry> {
    let mut entries: Vec<PaymentEntry> = fees
        .iter()
        .flat_map(|fee| {
            fee.payments.iter().map(move |p| PaymentEntry {
                fee_id: fee.id.clone(),
                fee_structure_id: fee.fee_structure_id.clone(),
                academic_year: fee.academic_year.clone(),
                payment: p.clone(),
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        b.payment
            .date
            .cmp(&a.payment.date)
            .then_with(|| a.payment.transaction_id.cmp(&b.payment.transaction_id))
    });
    entries
}
