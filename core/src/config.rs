use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Segmentation ───────────────────────────────────────────────────

/// Weights applied to the r/f/m quartile scores to form `RFM_Weighted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmWeights {
    pub recency: f64,
    pub frequency: f64,
    pub monetary: f64,
}

impl Default for RfmWeights {
    fn default() -> Self {
        Self {
            recency: 0.15,
            frequency: 0.28,
            monetary: 0.57,
        }
    }
}

/// Churn risk is read off `RFM_Weighted`:
///   weighted <  high_risk_below              → High
///   weighted <  medium_risk_below            → Medium
///   otherwise                                → Low
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnThresholds {
    pub high_risk_below: f64,
    pub medium_risk_below: f64,
}

impl Default for ChurnThresholds {
    fn default() -> Self {
        Self {
            high_risk_below: 1.0,
            medium_risk_below: 2.0,
        }
    }
}

/// Upper cumulative-percent bounds (inclusive) for classes A and B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbcThresholds {
    pub a_upper_percent: f64,
    pub b_upper_percent: f64,
}

impl Default for AbcThresholds {
    fn default() -> Self {
        Self {
            a_upper_percent: 80.0,
            b_upper_percent: 95.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "at")]
pub enum ReferenceDate {
    /// Latest purchase in the dataset.
    #[default]
    DatasetMax,
    /// A fixed instant, for reproducible recency values.
    Fixed(NaiveDateTime),
}

// ── Cohort ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortIndexMode {
    /// True calendar-month difference.
    #[default]
    CalendarMonths,
    /// Days between month starts divided by 30. Reproduces historical outputs.
    ThirtyDayBuckets,
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub rfm_weights: RfmWeights,
    pub churn_thresholds: ChurnThresholds,
    pub abc_thresholds: AbcThresholds,
    pub reference_date: ReferenceDate,
    pub cohort_index_mode: CohortIndexMode,
    /// Human-readable description per segment label (`"A_Repeat Purchase"`).
    pub segment_descriptions: HashMap<String, String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            rfm_weights: RfmWeights::default(),
            churn_thresholds: ChurnThresholds::default(),
            abc_thresholds: AbcThresholds::default(),
            reference_date: ReferenceDate::default(),
            cohort_index_mode: CohortIndexMode::default(),
            segment_descriptions: default_segment_descriptions(),
        }
    }
}

impl AnalyticsConfig {
    /// Load from `{data_dir}/config/analytics_config.json`.
    /// A missing file means defaults; a malformed one is an error.
    /// Missing keys inside the file fall back to their defaults.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/config/analytics_config.json");
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("config: {path} not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(anyhow::anyhow!("Cannot read {path}: {e}")),
        };
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let t = &self.churn_thresholds;
        if t.high_risk_below > t.medium_risk_below {
            anyhow::bail!(
                "churn_thresholds: high_risk_below ({}) must not exceed medium_risk_below ({})",
                t.high_risk_below,
                t.medium_risk_below
            );
        }
        let a = &self.abc_thresholds;
        if !(0.0..=100.0).contains(&a.a_upper_percent) || a.a_upper_percent > a.b_upper_percent {
            anyhow::bail!(
                "abc_thresholds: need 0 <= a_upper_percent ({}) <= b_upper_percent ({}) <= 100",
                a.a_upper_percent,
                a.b_upper_percent
            );
        }
        if a.b_upper_percent > 100.0 {
            anyhow::bail!("abc_thresholds: b_upper_percent ({}) exceeds 100", a.b_upper_percent);
        }
        Ok(())
    }

    pub fn segment_description(&self, segment: &str) -> String {
        self.segment_descriptions
            .get(segment)
            .cloned()
            .unwrap_or_else(|| format!("Segment {segment}"))
    }
}

fn default_segment_descriptions() -> HashMap<String, String> {
    [
        ("A_Single Purchase", "Single-purchase customers, high monetary volume."),
        ("A_Repeat Purchase", "Repeat customers, high monetary volume."),
        ("B_Single Purchase", "Single-purchase customers, medium monetary volume."),
        ("B_Repeat Purchase", "Repeat customers, medium monetary volume."),
        ("C_Single Purchase", "Single-purchase customers, low monetary volume."),
        ("C_Repeat Purchase", "Repeat customers, low monetary volume."),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
