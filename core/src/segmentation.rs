//! Segmentation engine: RFM scoring, ABC value tiers and churn risk.
//!
//! For every customer with at least one dated order:
//!   1. Aggregates recency / frequency / monetary from the fact table
//!   2. Buckets each metric into population quartiles (recency inverted)
//!   3. Combines quartiles into `rfm_score` and the weighted `RFM_Weighted`
//!   4. Labels churn risk from `RFM_Weighted`
//!   5. Ranks customers by monetary value into ABC classes
//!   6. Derives the purchase-frequency category and the composite segment
//!
//! Pure function of the fact table and the config. No I/O.

use crate::{
    config::{AnalyticsConfig, ReferenceDate},
    error::{AnalyticsError, AnalyticsResult},
    join::FactTable,
    types::CustomerId,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChurnRisk {
    #[serde(rename = "Low risk")]
    Low,
    #[serde(rename = "Medium risk")]
    Medium,
    #[serde(rename = "High risk")]
    High,
}

impl ChurnRisk {
    pub const ALL: [ChurnRisk; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low risk",
            Self::Medium => "Medium risk",
            Self::High => "High risk",
        }
    }
}

impl fmt::Display for ChurnRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AbcClass {
    A,
    B,
    C,
}

impl fmt::Display for AbcClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XCategory {
    #[serde(rename = "Single Purchase")]
    SinglePurchase,
    #[serde(rename = "Repeat Purchase")]
    RepeatPurchase,
}

impl XCategory {
    pub fn from_frequency(frequency: u32) -> Self {
        if frequency <= 1 {
            Self::SinglePurchase
        } else {
            Self::RepeatPurchase
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SinglePurchase => "Single Purchase",
            Self::RepeatPurchase => "Repeat Purchase",
        }
    }
}

/// One row of the segments artifact. Field names are the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub customer_unique_id: CustomerId,
    pub recency: i64,
    pub frequency: u32,
    pub monetary: f64,
    pub r_quartile: u8,
    pub f_quartile: u8,
    pub m_quartile: u8,
    pub rfm_score: u8,
    #[serde(rename = "RFM_Weighted")]
    pub rfm_weighted: f64,
    #[serde(rename = "Churn_Risk")]
    pub churn_risk: ChurnRisk,
    pub cumulative_value: f64,
    pub cumulative_percent: f64,
    pub abc_class: AbcClass,
    pub std_dev: Option<f64>,
    pub x_category: XCategory,
    pub segment: String,
    pub segment_description: String,
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Identity of one payment within an order. Rows without a sequence number
/// fall back to their position in the payments relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PaymentKey {
    Sequence(u32),
    Row(usize),
}

#[derive(Debug, Default)]
struct CustomerAgg<'a> {
    last_purchase: Option<NaiveDateTime>,
    /// order_id → payment → payment value.
    /// Keyed so item and review fan-out never counts a payment twice.
    orders: BTreeMap<&'a str, BTreeMap<PaymentKey, f64>>,
}

struct Metrics<'a> {
    customer_id: &'a str,
    recency: i64,
    frequency: u32,
    monetary: f64,
    std_dev: Option<f64>,
}

pub fn segment_customers(
    facts: &FactTable,
    config: &AnalyticsConfig,
) -> AnalyticsResult<Vec<SegmentRecord>> {
    let mut customers: BTreeMap<&str, CustomerAgg> = BTreeMap::new();
    for row in &facts.rows {
        let (Some(order_id), Some(ts)) = (row.order_id.as_deref(), row.order_purchase_timestamp)
        else {
            continue;
        };
        let agg = customers.entry(row.customer_unique_id.as_str()).or_default();
        agg.last_purchase = agg.last_purchase.max(Some(ts));
        let payments = agg.orders.entry(order_id).or_default();
        let key = match (row.payment_sequential, row.payment_row) {
            (Some(seq), _) => Some(PaymentKey::Sequence(seq)),
            (None, Some(position)) => Some(PaymentKey::Row(position)),
            (None, None) => None,
        };
        if let (Some(key), Some(value)) = (key, row.payment_value) {
            payments.insert(key, value);
        }
    }

    if customers.is_empty() {
        log::info!("segmentation: no customers with dated orders");
        return Ok(Vec::new());
    }

    let reference = match config.reference_date {
        ReferenceDate::Fixed(at) => at,
        ReferenceDate::DatasetMax => facts
            .max_purchase_timestamp()
            .ok_or_else(|| AnalyticsError::DataQuality("no purchase timestamps".into()))?,
    };

    let metrics: Vec<Metrics> = customers
        .iter()
        .map(|(id, agg)| {
            let order_totals: Vec<f64> = agg.orders.values().map(|p| p.values().sum()).collect();
            let last = agg.last_purchase.unwrap_or(reference);
            Metrics {
                customer_id: *id,
                recency: (reference - last).num_days(),
                frequency: order_totals.len() as u32,
                monetary: order_totals.iter().sum(),
                std_dev: sample_std_dev(&order_totals),
            }
        })
        .collect();

    if let Some(m) = metrics.iter().find(|m| m.monetary <= 0.0) {
        return Err(AnalyticsError::DataQuality(format!(
            "customer {} has non-positive monetary value {:.2}; ABC ranking needs positive totals",
            m.customer_id, m.monetary
        )));
    }

    let recency_buckets = quartile_buckets(&metrics.iter().map(|m| m.recency as f64).collect::<Vec<_>>());
    let frequency_buckets = quartile_buckets(&metrics.iter().map(|m| m.frequency as f64).collect::<Vec<_>>());
    let monetary_buckets = quartile_buckets(&metrics.iter().map(|m| m.monetary).collect::<Vec<_>>());

    // ABC rank: monetary descending, customer id ascending on ties.
    let mut by_value: Vec<usize> = (0..metrics.len()).collect();
    by_value.sort_by(|&a, &b| {
        metrics[b]
            .monetary
            .total_cmp(&metrics[a].monetary)
            .then_with(|| metrics[a].customer_id.cmp(metrics[b].customer_id))
    });
    let total: f64 = metrics.iter().map(|m| m.monetary).sum();

    let weights = &config.rfm_weights;
    let mut running = 0.0;
    let mut records = Vec::with_capacity(metrics.len());

    for (rank, &i) in by_value.iter().enumerate() {
        let m = &metrics[i];
        running += m.monetary;
        let cumulative_percent = if rank + 1 == by_value.len() {
            100.0
        } else {
            (running / total * 100.0).min(100.0)
        };

        // Most recent customers get the highest recency score.
        let r_quartile = 3 - recency_buckets[i];
        let f_quartile = frequency_buckets[i];
        let m_quartile = monetary_buckets[i];
        let rfm_weighted = weights.recency * r_quartile as f64
            + weights.frequency * f_quartile as f64
            + weights.monetary * m_quartile as f64;

        let abc_class = classify_abc(cumulative_percent, config);
        let x_category = XCategory::from_frequency(m.frequency);
        let segment = format!("{abc_class}_{}", x_category.label());
        let segment_description = config.segment_description(&segment);

        records.push(SegmentRecord {
            customer_unique_id: m.customer_id.to_string(),
            recency: m.recency,
            frequency: m.frequency,
            monetary: m.monetary,
            r_quartile,
            f_quartile,
            m_quartile,
            rfm_score: r_quartile + f_quartile + m_quartile,
            rfm_weighted,
            churn_risk: classify_churn(rfm_weighted, config),
            cumulative_value: running,
            cumulative_percent,
            abc_class,
            std_dev: m.std_dev,
            x_category,
            segment,
            segment_description,
        });
    }

    log::info!(
        "segmentation: scored {} customers (reference {reference}, total value {total:.2})",
        records.len()
    );
    Ok(records)
}

/// Rank-based quartile buckets: bucket = ⌊rank · 4 / n⌋ over the values
/// sorted ascending, ties broken by input position. Bucket populations
/// differ by at most one.
pub fn quartile_buckets(values: &[f64]) -> Vec<u8> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));

    let mut buckets = vec![0u8; n];
    for (rank, &i) in order.iter().enumerate() {
        buckets[i] = (rank * 4 / n) as u8;
    }
    buckets
}

fn classify_churn(rfm_weighted: f64, config: &AnalyticsConfig) -> ChurnRisk {
    let t = &config.churn_thresholds;
    if rfm_weighted < t.high_risk_below {
        ChurnRisk::High
    } else if rfm_weighted < t.medium_risk_below {
        ChurnRisk::Medium
    } else {
        ChurnRisk::Low
    }
}

fn classify_abc(cumulative_percent: f64, config: &AnalyticsConfig) -> AbcClass {
    let t = &config.abc_thresholds;
    if cumulative_percent <= t.a_upper_percent {
        AbcClass::A
    } else if cumulative_percent <= t.b_upper_percent {
        AbcClass::B
    } else {
        AbcClass::C
    }
}

/// Sample standard deviation (n − 1). Undefined below two observations.
fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Structural checks applied before a segments artifact is cached.
pub fn validate_segments(records: &[SegmentRecord]) -> AnalyticsResult<()> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut last_percent = f64::NEG_INFINITY;

    for r in records {
        let bad = |what: &str| {
            Err(AnalyticsError::InvalidArtifact(format!(
                "segment record {}: {what}",
                r.customer_unique_id
            )))
        };
        if !seen.insert(r.customer_unique_id.as_str()) {
            return bad("duplicate customer");
        }
        if r.r_quartile > 3 || r.f_quartile > 3 || r.m_quartile > 3 {
            return bad("quartile outside 0..=3");
        }
        if r.frequency == 0 {
            return bad("zero frequency");
        }
        if (r.frequency == 1) != r.std_dev.is_none() {
            return bad("std_dev must be null exactly for single-order customers");
        }
        if !(0.0..=100.0).contains(&r.cumulative_percent) || r.cumulative_percent < last_percent {
            return bad("cumulative_percent out of order or range");
        }
        last_percent = r.cumulative_percent;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartile_buckets_are_balanced() {
        for n in 1..40 {
            let values: Vec<f64> = (0..n).map(|i| ((i * 7919) % 13) as f64).collect();
            let buckets = quartile_buckets(&values);
            let mut counts = [0usize; 4];
            for b in &buckets {
                counts[*b as usize] += 1;
            }
            let populated: Vec<usize> = counts.iter().copied().filter(|c| *c > 0).collect();
            let max = populated.iter().max().unwrap();
            let min = populated.iter().min().unwrap();
            assert!(max - min <= 1, "n={n} counts={counts:?}");
        }
    }

    #[test]
    fn std_dev_needs_two_orders() {
        assert_eq!(sample_std_dev(&[100.0]), None);
        let sd = sample_std_dev(&[10.0, 20.0]).unwrap();
        assert!((sd - 7.0710678).abs() < 1e-6);
    }
}
