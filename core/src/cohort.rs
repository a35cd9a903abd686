//! Cohort engine: first-purchase-month cohorts and their retention.
//!
//! PRECONDITION: only rows carrying every field this engine reads
//! (customer identity, order id, purchase timestamp, customer state) take
//! part. The customer's cohort is derived from that clean subset too, so a
//! customer's index-0 cell always exists.

use crate::{
    calendar::YearMonth,
    config::{AnalyticsConfig, CohortIndexMode},
    error::{AnalyticsError, AnalyticsResult},
    join::{FactRow, FactTable},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

// ── Public types ─────────────────────────────────────────────────────────────

/// A labelled matrix in split orientation. Both axes carry text labels;
/// absent cells are `None` (serialized as `null`), never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T> {
    pub index: Vec<String>,
    pub columns: Vec<String>,
    pub data: Vec<Vec<Option<T>>>,
}

impl<T: Copy> Matrix<T> {
    pub fn empty() -> Self {
        Self { index: Vec::new(), columns: Vec::new(), data: Vec::new() }
    }

    pub fn get(&self, row: &str, column: &str) -> Option<T> {
        let r = self.index.iter().position(|l| l == row)?;
        let c = self.columns.iter().position(|l| l == column)?;
        self.data.get(r)?.get(c).copied().flatten()
    }

    pub fn row(&self, row: &str) -> Option<&[Option<T>]> {
        let r = self.index.iter().position(|l| l == row)?;
        self.data.get(r).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalCohortRow {
    pub customer_state: String,
    pub cohort_month: YearMonth,
    pub cohort_index: u32,
    pub customers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortArtifact {
    pub state_list: Vec<String>,
    pub retention: Matrix<f64>,
    pub cohort_data: Matrix<u64>,
    pub regional_cohort: Vec<RegionalCohortRow>,
    pub updated_at: DateTime<Utc>,
}

// ── Engine ───────────────────────────────────────────────────────────────────

struct CleanRow<'a> {
    customer: &'a str,
    state: &'a str,
    purchased_at: NaiveDateTime,
}

fn clean(row: &FactRow) -> Option<CleanRow<'_>> {
    row.order_id.as_ref()?;
    let state = row.customer_state.as_deref().filter(|s| !s.is_empty())?;
    Some(CleanRow {
        customer: &row.customer_unique_id,
        state,
        purchased_at: row.order_purchase_timestamp?,
    })
}

pub fn build_cohorts(
    facts: &FactTable,
    config: &AnalyticsConfig,
    produced_at: DateTime<Utc>,
) -> AnalyticsResult<CohortArtifact> {
    let rows: Vec<CleanRow> = facts.rows.iter().filter_map(clean).collect();
    log::debug!(
        "cohort: {} of {} fact rows pass the completeness precondition",
        rows.len(),
        facts.len()
    );

    let mut first_purchase: BTreeMap<&str, NaiveDateTime> = BTreeMap::new();
    for row in &rows {
        first_purchase
            .entry(row.customer)
            .and_modify(|ts| *ts = (*ts).min(row.purchased_at))
            .or_insert(row.purchased_at);
    }

    let mut state_list: Vec<String> = Vec::new();
    let mut seen_states: HashSet<&str> = HashSet::new();
    let mut cells: BTreeMap<(YearMonth, u32), HashSet<&str>> = BTreeMap::new();
    let mut regional: BTreeMap<(&str, YearMonth, u32), HashSet<&str>> = BTreeMap::new();

    for row in &rows {
        if seen_states.insert(row.state) {
            state_list.push(row.state.to_string());
        }
        let cohort_month = YearMonth::of(&first_purchase[row.customer]);
        let order_month = YearMonth::of(&row.purchased_at);
        let index = cohort_index(&order_month, &cohort_month, config.cohort_index_mode)?;

        cells.entry((cohort_month, index)).or_default().insert(row.customer);
        regional
            .entry((row.state, cohort_month, index))
            .or_default()
            .insert(row.customer);
    }

    let cohort_data = counts_matrix(&cells);
    let retention = normalize_rows(&cohort_data);
    let regional_cohort = regional
        .into_iter()
        .map(|((state, cohort_month, cohort_index), customers)| RegionalCohortRow {
            customer_state: state.to_string(),
            cohort_month,
            cohort_index,
            customers: customers.len() as u64,
        })
        .collect::<Vec<_>>();

    log::info!(
        "cohort: {} cohorts, {} states, {} regional rows",
        cohort_data.index.len(),
        state_list.len(),
        regional_cohort.len()
    );

    Ok(CohortArtifact {
        state_list,
        retention,
        cohort_data,
        regional_cohort,
        updated_at: produced_at,
    })
}

fn cohort_index(
    order_month: &YearMonth,
    cohort_month: &YearMonth,
    mode: CohortIndexMode,
) -> AnalyticsResult<u32> {
    let raw = match mode {
        CohortIndexMode::CalendarMonths => order_month.months_since(cohort_month),
        CohortIndexMode::ThirtyDayBuckets => order_month.thirty_day_buckets_since(cohort_month),
    };
    u32::try_from(raw).map_err(|_| {
        AnalyticsError::DataQuality(format!(
            "purchase in {order_month} precedes its cohort month {cohort_month}"
        ))
    })
}

fn counts_matrix(cells: &BTreeMap<(YearMonth, u32), HashSet<&str>>) -> Matrix<u64> {
    let months: Vec<YearMonth> = cells
        .keys()
        .map(|(m, _)| *m)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let indices: Vec<u32> = cells
        .keys()
        .map(|(_, i)| *i)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let data = months
        .iter()
        .map(|m| {
            indices
                .iter()
                .map(|i| cells.get(&(*m, *i)).map(|c| c.len() as u64))
                .collect()
        })
        .collect();

    Matrix {
        index: months.iter().map(ToString::to_string).collect(),
        columns: indices.iter().map(ToString::to_string).collect(),
        data,
    }
}

/// Divide every row by its index-0 cell (the cohort's initial size).
fn normalize_rows(counts: &Matrix<u64>) -> Matrix<f64> {
    let data = counts
        .data
        .iter()
        .map(|row| {
            let size = row.first().copied().flatten().filter(|s| *s > 0);
            row.iter()
                .map(|cell| match (cell, size) {
                    (Some(c), Some(size)) => Some(*c as f64 / size as f64),
                    _ => None,
                })
                .collect()
        })
        .collect();

    Matrix {
        index: counts.index.clone(),
        columns: counts.columns.clone(),
        data,
    }
}

/// Structural checks applied before a cohort artifact is cached.
pub fn validate_cohort(artifact: &CohortArtifact) -> AnalyticsResult<()> {
    let bad = |what: String| Err(AnalyticsError::InvalidArtifact(format!("cohort: {what}")));

    if artifact.retention.index.len() != artifact.retention.data.len()
        || artifact.cohort_data.index.len() != artifact.cohort_data.data.len()
    {
        return bad("row count does not match the index".into());
    }
    if artifact.retention.index != artifact.cohort_data.index
        || artifact.retention.columns != artifact.cohort_data.columns
    {
        return bad("retention and cohort_data axes differ".into());
    }
    if artifact.retention.is_empty() {
        return Ok(());
    }
    if artifact.retention.columns.first().map(String::as_str) != Some("0") {
        return bad("first column must be cohort index 0".into());
    }
    for (label, row) in artifact.retention.index.iter().zip(&artifact.retention.data) {
        if row.len() != artifact.retention.columns.len() {
            return bad(format!("row {label} has the wrong width"));
        }
        if row.first().copied().flatten() != Some(1.0) {
            return bad(format!("row {label} does not start at 1.0"));
        }
        if row.iter().flatten().any(|v| !(0.0..=1.0).contains(v)) {
            return bad(format!("row {label} has a fraction outside [0, 1]"));
        }
    }
    Ok(())
}
