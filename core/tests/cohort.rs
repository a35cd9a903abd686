mod common;

use chrono::Utc;
use common::ShopBuilder;
use segment_core::{
    cohort::{build_cohorts, validate_cohort, CohortArtifact},
    config::{AnalyticsConfig, CohortIndexMode},
    join::FactTable,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// alice: Jan cohort, returns in March. bob: Jan cohort, never returns.
/// carol: Feb cohort, buys twice in Feb.
fn make_shop() -> ShopBuilder {
    let mut shop = ShopBuilder::new();
    shop.order("alice", "SP", "2018-01-15 10:00:00", 10.0);
    shop.order("bob", "RJ", "2018-01-20 10:00:00", 10.0);
    shop.order("carol", "MG", "2018-02-05 10:00:00", 10.0);
    shop.order("carol", "MG", "2018-02-25 10:00:00", 10.0);
    shop.order("alice", "SP", "2018-03-02 10:00:00", 10.0);
    shop
}

fn make_cohorts(mode: CohortIndexMode) -> CohortArtifact {
    let config = AnalyticsConfig { cohort_index_mode: mode, ..AnalyticsConfig::default() };
    build_cohorts(&make_shop().facts(), &config, Utc::now()).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn cohort_counts_use_calendar_months() {
    let artifact = make_cohorts(CohortIndexMode::CalendarMonths);
    let counts = &artifact.cohort_data;

    assert_eq!(counts.index, vec!["2018-01", "2018-02"]);
    assert_eq!(counts.columns, vec!["0", "2"]);
    assert_eq!(counts.data, vec![vec![Some(2), Some(1)], vec![Some(1), None]]);
}

#[test]
fn retention_is_normalized_by_cohort_size() {
    let artifact = make_cohorts(CohortIndexMode::CalendarMonths);

    for label in &artifact.retention.index {
        assert_eq!(artifact.retention.get(label, "0"), Some(1.0));
    }
    assert_eq!(artifact.retention.row("2018-01"), Some(&[Some(1.0), Some(0.5)][..]));
    assert_eq!(artifact.retention.get("2018-02", "2"), None);
    validate_cohort(&artifact).unwrap();
}

/// Jan 1 → Mar 1 is 59 days: one 30-day bucket, two calendar months.
#[test]
fn thirty_day_buckets_reproduce_the_day_count_rule() {
    let artifact = make_cohorts(CohortIndexMode::ThirtyDayBuckets);

    assert_eq!(artifact.cohort_data.columns, vec!["0", "1"]);
    assert_eq!(artifact.cohort_data.get("2018-01", "1"), Some(1));
}

#[test]
fn regional_breakdown_and_state_list() {
    let artifact = make_cohorts(CohortIndexMode::CalendarMonths);

    assert_eq!(artifact.state_list, vec!["SP", "RJ", "MG"]);

    let sp: Vec<(String, u32, u64)> = artifact
        .regional_cohort
        .iter()
        .filter(|r| r.customer_state == "SP")
        .map(|r| (r.cohort_month.to_string(), r.cohort_index, r.customers))
        .collect();
    assert_eq!(sp, vec![("2018-01".to_string(), 0, 1), ("2018-01".to_string(), 2, 1)]);

    let states: Vec<&str> = artifact.regional_cohort.iter().map(|r| r.customer_state.as_str()).collect();
    let mut sorted = states.clone();
    sorted.sort();
    assert_eq!(states, sorted, "regional rows are ordered by state");
}

/// Rows without a customer state take no part, including in cohort assignment.
#[test]
fn rows_missing_state_are_excluded() {
    let mut shop = make_shop();
    shop.order("dave", "", "2018-01-03 10:00:00", 10.0);

    let artifact = build_cohorts(&shop.facts(), &AnalyticsConfig::default(), Utc::now()).unwrap();

    assert_eq!(artifact.cohort_data.get("2018-01", "0"), Some(2));
    assert!(!artifact.state_list.iter().any(|s| s.is_empty()));
}

#[test]
fn empty_input_gives_well_formed_empty_artifact() {
    let artifact = build_cohorts(&FactTable::default(), &AnalyticsConfig::default(), Utc::now()).unwrap();

    assert!(artifact.retention.is_empty());
    assert!(artifact.cohort_data.is_empty());
    assert!(artifact.regional_cohort.is_empty());
    assert!(artifact.state_list.is_empty());
    validate_cohort(&artifact).unwrap();
}

#[test]
fn matrices_serialize_in_split_orientation() {
    let artifact = make_cohorts(CohortIndexMode::CalendarMonths);

    let json = serde_json::to_value(&artifact.retention).unwrap();

    assert_eq!(json["index"][0], "2018-01");
    assert_eq!(json["columns"][1], "2");
    assert_eq!(json["data"][1][1], serde_json::Value::Null);
    assert_eq!(json["data"][0][1], 0.5);
}
