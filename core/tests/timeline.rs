mod common;

use chrono::Utc;
use common::ShopBuilder;
use segment_core::{
    calendar::YearMonth,
    config::AnalyticsConfig,
    segmentation::{segment_customers, ChurnRisk},
    timeline::{build_timeline, validate_timeline, TimelineArtifact},
};
use std::collections::{BTreeMap, BTreeSet};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_shop() -> ShopBuilder {
    let mut shop = ShopBuilder::new();
    let first = shop.order("alice", "SP", "2018-01-15 10:00:00", 200.0);
    shop.extra_item(&first, 2).review(&first, 5);
    shop.order("bob", "RJ", "2018-01-20 10:00:00", 15.0);
    shop.order("alice", "SP", "2018-03-02 10:00:00", 80.0);
    shop.order("carol", "MG", "2018-03-09 10:00:00", 30.0);
    shop
}

fn make_timeline(shop: &ShopBuilder) -> TimelineArtifact {
    let facts = shop.facts();
    let segments = segment_customers(&facts, &AnalyticsConfig::default()).unwrap();
    build_timeline(&facts, &segments, Utc::now()).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Per month, churn counts add up to the distinct orders placed that month.
#[test]
fn churn_counts_sum_to_distinct_orders() {
    let timeline = make_timeline(&make_shop());

    let mut per_month: BTreeMap<YearMonth, u64> = BTreeMap::new();
    for row in &timeline.by_churn {
        *per_month.entry(row.order_purchase_timestamp).or_default() += row.count;
    }

    assert_eq!(per_month.get(&YearMonth::new(2018, 1)), Some(&2));
    assert_eq!(per_month.get(&YearMonth::new(2018, 3)), Some(&2));
    assert_eq!(per_month.len(), 2);
}

#[test]
fn segment_counts_sum_to_distinct_orders() {
    let timeline = make_timeline(&make_shop());

    let total: u64 = timeline.by_segment.iter().map(|r| r.count).sum();
    assert_eq!(total, 4);
}

/// Every month carries all three churn labels, zero or not.
#[test]
fn zero_buckets_are_explicit() {
    let timeline = make_timeline(&make_shop());

    assert_eq!(timeline.by_churn.len(), 2 * ChurnRisk::ALL.len());
    for month in [YearMonth::new(2018, 1), YearMonth::new(2018, 3)] {
        let labels: Vec<ChurnRisk> = timeline
            .by_churn
            .iter()
            .filter(|r| r.order_purchase_timestamp == month)
            .map(|r| r.churn_risk)
            .collect();
        assert_eq!(labels, ChurnRisk::ALL.to_vec());
    }

    let descriptions: BTreeSet<&str> =
        timeline.by_segment.iter().map(|r| r.segment_description.as_str()).collect();
    assert_eq!(timeline.by_segment.len(), 2 * descriptions.len());
    validate_timeline(&timeline).unwrap();
}

#[test]
fn rows_are_ordered_by_month_then_label() {
    let timeline = make_timeline(&make_shop());

    let keys: Vec<(YearMonth, ChurnRisk)> = timeline
        .by_churn
        .iter()
        .map(|r| (r.order_purchase_timestamp, r.churn_risk))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn month_labels_serialize_as_year_month() {
    let timeline = make_timeline(&make_shop());

    let json = serde_json::to_value(&timeline.by_churn[0]).unwrap();

    assert_eq!(json["order_purchase_timestamp"], "2018-01");
    assert_eq!(json["Churn_Risk"], "Low risk");
}

#[test]
fn customers_missing_from_segments_are_skipped() {
    let shop = make_shop();
    let facts = shop.facts();
    let segments: Vec<_> = segment_customers(&facts, &AnalyticsConfig::default())
        .unwrap()
        .into_iter()
        .filter(|s| s.customer_unique_id != "carol")
        .collect();

    let timeline = build_timeline(&facts, &segments, Utc::now()).unwrap();

    let march: u64 = timeline
        .by_churn
        .iter()
        .filter(|r| r.order_purchase_timestamp == YearMonth::new(2018, 3))
        .map(|r| r.count)
        .sum();
    assert_eq!(march, 1);
}
