//! Churn scoring boundary.
//!
//! The pipeline treats the scoring model as an injected black box: it
//! supplies feature columns and consumes a risk score plus a coarse level
//! per customer. [`HeuristicScorer`] is the default implementation, an
//! interval-based heuristic; model training lives outside this crate.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(label)
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level {other}")),
        }
    }
}

/// Feature columns handed to the scorer, one per customer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChurnFeatures {
    pub customer_id: i64,
    pub total_visits: i64,
    pub days_since_last_visit: Option<i64>,
    /// Visits per 30-day period over the customer's lifecycle.
    pub visit_frequency: f64,
    pub avg_visit_amount: f64,
    pub segment: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChurnScore {
    /// 0–100.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

/// Scoring functions must be pure with respect to the feature columns and
/// must not carry state across chunks.
pub trait ChurnScorer: Send + Sync {
    fn score(&self, features: &[ChurnFeatures]) -> Vec<ChurnScore>;
}

/// Interval heuristic: a customer is at risk when the gap since their last
/// visit outgrows a multiple of their expected visit interval.
#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    /// Expected-interval multiplier before a customer counts as overdue.
    pub interval_multiplier: f64,
    /// Clamp bounds (days) for the churn threshold.
    pub min_threshold_days: f64,
    pub max_threshold_days: f64,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self {
            interval_multiplier: 2.5,
            min_threshold_days: 60.0,
            max_threshold_days: 180.0,
        }
    }
}

impl HeuristicScorer {
    fn threshold_days(&self, features: &ChurnFeatures) -> f64 {
        // visit_frequency is visits per 30 days; invert to an interval.
        let expected_interval = if features.visit_frequency > 0.0 {
            30.0 / features.visit_frequency
        } else {
            self.max_threshold_days
        };

        let mut threshold = (expected_interval * self.interval_multiplier)
            .clamp(self.min_threshold_days, self.max_threshold_days);

        // Segment adjustments mirror the operational rules: loyal customers
        // get more slack, new customers less.
        match features.segment.as_str() {
            "vip" => threshold *= 1.5,
            "new" => threshold *= 0.7,
            _ => {}
        }
        threshold
    }
}

impl ChurnScorer for HeuristicScorer {
    fn score(&self, features: &[ChurnFeatures]) -> Vec<ChurnScore> {
        features
            .iter()
            .map(|customer| {
                let Some(days_since) = customer.days_since_last_visit else {
                    // Never visited: nothing to churn from yet.
                    return ChurnScore {
                        risk_score: 0.0,
                        risk_level: RiskLevel::Low,
                    };
                };

                let threshold = self.threshold_days(customer);
                let risk_score = ((days_since as f64 / threshold) * 100.0).clamp(0.0, 100.0);
                let risk_level = if risk_score < 40.0 {
                    RiskLevel::Low
                } else if risk_score < 70.0 {
                    RiskLevel::Medium
                } else {
                    RiskLevel::High
                };

                ChurnScore {
                    risk_score,
                    risk_level,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(days_since: Option<i64>, frequency: f64, segment: &str) -> ChurnFeatures {
        ChurnFeatures {
            customer_id: 1,
            total_visits: 10,
            days_since_last_visit: days_since,
            visit_frequency: frequency,
            avg_visit_amount: 50_000.0,
            segment: segment.into(),
        }
    }

    #[test]
    fn never_visited_customer_scores_zero() {
        let scorer = HeuristicScorer::default();
        let scores = scorer.score(&[features(None, 0.0, "new")]);
        assert_eq!(scores[0].risk_score, 0.0);
        assert_eq!(scores[0].risk_level, RiskLevel::Low);
    }

    #[test]
    fn long_absence_raises_risk_level() {
        let scorer = HeuristicScorer::default();
        // Monthly visitor (frequency 1.0 -> expected interval 30d,
        // threshold 75d) absent for 70 days.
        let scores = scorer.score(&[features(Some(70), 1.0, "regular")]);
        assert!(scores[0].risk_score > 40.0);
        assert_eq!(scores[0].risk_level, RiskLevel::Medium);

        let scores = scorer.score(&[features(Some(200), 1.0, "regular")]);
        assert_eq!(scores[0].risk_score, 100.0);
        assert_eq!(scores[0].risk_level, RiskLevel::High);
    }

    #[test]
    fn vip_segment_gets_more_slack_than_new() {
        let scorer = HeuristicScorer::default();
        let vip = scorer.score(&[features(Some(80), 1.0, "vip")]);
        let fresh = scorer.score(&[features(Some(80), 1.0, "new")]);
        assert!(vip[0].risk_score < fresh[0].risk_score);
    }

    #[test]
    fn risk_level_round_trips_through_strings() {
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            let parsed: RiskLevel = level.to_string().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert!("severe".parse::<RiskLevel>().is_err());
    }
}
