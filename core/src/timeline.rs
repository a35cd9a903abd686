//! Timeline engine: monthly order counts by churn risk and by segment.
//!
//! Depends on: the segments artifact. Each order is attributed to its
//! customer's current `Churn_Risk` and `segment_description`.
//!
//! Counts are distinct orders per (month, label). Zero buckets are
//! explicit: every month seen in the fact table is emitted for every
//! churn label and every segment description present in the segments
//! artifact. Rows come out ordered by month, then label.

use crate::{
    calendar::YearMonth,
    error::{AnalyticsError, AnalyticsResult},
    join::FactTable,
    segmentation::{ChurnRisk, SegmentRecord},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnTimelineRow {
    pub order_purchase_timestamp: YearMonth,
    #[serde(rename = "Churn_Risk")]
    pub churn_risk: ChurnRisk,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTimelineRow {
    pub order_purchase_timestamp: YearMonth,
    pub segment_description: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineArtifact {
    pub by_churn: Vec<ChurnTimelineRow>,
    pub by_segment: Vec<SegmentTimelineRow>,
    pub updated_at: DateTime<Utc>,
}

pub fn build_timeline(
    facts: &FactTable,
    segments: &[SegmentRecord],
    produced_at: DateTime<Utc>,
) -> AnalyticsResult<TimelineArtifact> {
    let by_customer: HashMap<&str, &SegmentRecord> = segments
        .iter()
        .map(|s| (s.customer_unique_id.as_str(), s))
        .collect();

    // month → order_id → customer
    let mut orders: BTreeMap<YearMonth, BTreeMap<&str, &str>> = BTreeMap::new();
    for row in &facts.rows {
        let Some(ts) = row.order_purchase_timestamp else { continue };
        let month = orders.entry(YearMonth::of(&ts)).or_default();
        if let Some(order_id) = row.order_id.as_deref() {
            month.insert(order_id, row.customer_unique_id.as_str());
        }
    }

    let descriptions: BTreeSet<&str> = segments.iter().map(|s| s.segment_description.as_str()).collect();

    let mut churn_counts: BTreeMap<(YearMonth, ChurnRisk), u64> = BTreeMap::new();
    let mut segment_counts: BTreeMap<(YearMonth, &str), u64> = BTreeMap::new();
    let mut unattributed = 0usize;

    for (month, month_orders) in &orders {
        for risk in ChurnRisk::ALL {
            churn_counts.insert((*month, risk), 0);
        }
        for description in &descriptions {
            segment_counts.insert((*month, *description), 0);
        }

        for customer in month_orders.values() {
            let Some(segment) = by_customer.get(customer) else {
                unattributed += 1;
                continue;
            };
            *churn_counts.entry((*month, segment.churn_risk)).or_default() += 1;
            *segment_counts
                .entry((*month, segment.segment_description.as_str()))
                .or_default() += 1;
        }
    }

    if unattributed > 0 {
        log::warn!("timeline: {unattributed} orders belong to customers missing from the segments artifact");
    }

    let by_churn: Vec<ChurnTimelineRow> = churn_counts
        .into_iter()
        .map(|((month, churn_risk), count)| ChurnTimelineRow {
            order_purchase_timestamp: month,
            churn_risk,
            count,
        })
        .collect();
    let by_segment: Vec<SegmentTimelineRow> = segment_counts
        .into_iter()
        .map(|((month, description), count)| SegmentTimelineRow {
            order_purchase_timestamp: month,
            segment_description: description.to_string(),
            count,
        })
        .collect();

    log::info!(
        "timeline: {} months, {} churn rows, {} segment rows",
        orders.len(),
        by_churn.len(),
        by_segment.len()
    );

    Ok(TimelineArtifact {
        by_churn,
        by_segment,
        updated_at: produced_at,
    })
}

/// Structural checks applied before a timeline artifact is cached.
pub fn validate_timeline(artifact: &TimelineArtifact) -> AnalyticsResult<()> {
    let churn_months: BTreeSet<YearMonth> =
        artifact.by_churn.iter().map(|r| r.order_purchase_timestamp).collect();
    let segment_months: BTreeSet<YearMonth> =
        artifact.by_segment.iter().map(|r| r.order_purchase_timestamp).collect();

    if !artifact.by_segment.is_empty() && churn_months != segment_months {
        return Err(AnalyticsError::InvalidArtifact(
            "timeline: by_churn and by_segment cover different months".into(),
        ));
    }
    Ok(())
}
