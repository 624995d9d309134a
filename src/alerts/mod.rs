// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Alert engine - threshold and trend rules over the latest reading

use serde::{Deserialize, Serialize};

use crate::reading::{Channel, Reading};

/// Per-point slope above which a series counts as rising (below the
/// negation, falling)
const TREND_SLOPE_THRESHOLD: f64 = 0.05;
/// How many trailing history points feed the trend fit
const TREND_WINDOW: usize = 10;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Direction of a channel's recent movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// How a rule treats a channel the reading did not report.
///
/// The upstream dashboards were inconsistent here, so it is explicit per
/// rule: `Unknown` skips evaluation, `Zero` evaluates against 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentPolicy {
    Unknown,
    Zero,
}

/// Condition checked by a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Fires when the channel exceeds the ceiling
    Ceiling { limit: f64 },
    /// Fires when the channel drops below the floor
    Floor { limit: f64 },
    /// Fires when a flag channel reads true (>= 0.5)
    Flag,
    /// Fires when the channel's recent trend matches the direction
    Trend { direction: Trend },
}

/// One independent alert rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    /// Channel the rule watches
    pub channel: Channel,
    /// Severity of the resulting alert
    pub severity: Severity,
    /// Short human-readable label, used in the alert message
    pub label: String,
    /// Treatment of an absent channel
    pub absent_policy: AbsentPolicy,
    /// Condition that fires the rule (kept last so TOML serializes the
    /// table after the scalar fields)
    pub condition: Condition,
}

/// Compound rule: two ceilings breached simultaneously escalate into a
/// single additional alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundRule {
    pub first_channel: Channel,
    pub first_limit: f64,
    pub second_channel: Channel,
    pub second_limit: f64,
    pub severity: Severity,
    pub label: String,
}

/// Immutable alert record. Created by the engine, superseded wholesale by
/// the next evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id
    pub id: String,
    /// Channel that triggered the alert
    pub metric: Channel,
    /// Human-readable message
    pub message: String,
    /// Machine-readable reason code
    pub reason: String,
    /// Severity
    pub severity: Severity,
    /// The reading that triggered the alert
    pub snapshot: Reading,
}

/// Evaluates the rule set against each new fused reading.
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    compound: Option<CompoundRule>,
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRule>, compound: Option<CompoundRule>) -> Self {
        Self { rules, compound }
    }

    /// Evaluate every rule against `reading`. The returned list replaces the
    /// previous cycle's alerts; all matching rules fire, truncation to a
    /// "top alert" is a presentation concern.
    pub fn evaluate(&self, reading: &Reading, previous: &[Reading]) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for rule in &self.rules {
            let value = match reading.get(rule.channel) {
                Some(v) => v,
                None => match rule.absent_policy {
                    AbsentPolicy::Unknown => continue,
                    AbsentPolicy::Zero => 0.0,
                },
            };

            let fired = match &rule.condition {
                Condition::Ceiling { limit } => value > *limit,
                Condition::Floor { limit } => value < *limit,
                Condition::Flag => value >= 0.5,
                Condition::Trend { direction } => {
                    let mut series: Vec<f64> = previous
                        .iter()
                        .rev()
                        .take(TREND_WINDOW - 1)
                        .filter_map(|r| r.get(rule.channel))
                        .collect();
                    series.reverse();
                    series.push(value);
                    classify_trend(&series) == *direction
                }
            };

            if fired {
                alerts.push(self.build_alert(rule, value, reading));
            }
        }

        if let Some(compound) = &self.compound {
            let first = reading.get(compound.first_channel);
            let second = reading.get(compound.second_channel);
            if let (Some(a), Some(b)) = (first, second) {
                if a > compound.first_limit && b > compound.second_limit {
                    alerts.push(Alert {
                        id: uuid::Uuid::new_v4().to_string(),
                        metric: compound.first_channel,
                        message: format!(
                            "{}: {:?} {:.1} and {:?} {:.1} elevated simultaneously",
                            compound.label, compound.first_channel, a, compound.second_channel, b
                        ),
                        reason: "compound_threshold".to_string(),
                        severity: compound.severity,
                        snapshot: reading.clone(),
                    });
                }
            }
        }

        alerts
    }

    fn build_alert(&self, rule: &AlertRule, value: f64, reading: &Reading) -> Alert {
        let (message, reason) = match &rule.condition {
            Condition::Ceiling { limit } => (
                format!("{}: {:.1}{} above limit {:.1}", rule.label, value, rule.channel.unit(), limit),
                "threshold_ceiling".to_string(),
            ),
            Condition::Floor { limit } => (
                format!("{}: {:.1}{} below limit {:.1}", rule.label, value, rule.channel.unit(), limit),
                "threshold_floor".to_string(),
            ),
            Condition::Flag => (rule.label.clone(), "flag_set".to_string()),
            Condition::Trend { direction } => (
                format!("{}: {:?} trend on {:?}", rule.label, direction, rule.channel),
                "trend".to_string(),
            ),
        };

        Alert {
            id: uuid::Uuid::new_v4().to_string(),
            metric: rule.channel,
            message,
            reason,
            severity: rule.severity,
            snapshot: reading.clone(),
        }
    }
}

/// Least-squares slope classification over a short series.
pub fn classify_trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }

    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }

    let slope = if den > 0.0 { num / den } else { 0.0 };
    if slope > TREND_SLOPE_THRESHOLD {
        Trend::Rising
    } else if slope < -TREND_SLOPE_THRESHOLD {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn reading(pairs: &[(Channel, f64)]) -> Reading {
        let mut r = Reading::new(Utc::now());
        for &(c, v) in pairs {
            r.insert(c, v);
        }
        r
    }

    fn temp_ceiling(limit: f64) -> AlertRule {
        AlertRule {
            channel: Channel::Temperature,
            condition: Condition::Ceiling { limit },
            severity: Severity::High,
            label: "Temperature above safety ceiling".to_string(),
            absent_policy: AbsentPolicy::Unknown,
        }
    }

    #[test]
    fn ceiling_fires_above_limit_only() {
        let engine = AlertEngine::new(vec![temp_ceiling(35.0)], None);

        let hot = engine.evaluate(&reading(&[(Channel::Temperature, 41.0)]), &[]);
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].severity, Severity::High);
        assert_eq!(hot[0].metric, Channel::Temperature);

        let cool = engine.evaluate(&reading(&[(Channel::Temperature, 20.0)]), &[]);
        assert!(cool.is_empty());
    }

    #[test]
    fn all_matching_rules_fire() {
        let rules = vec![
            temp_ceiling(35.0),
            AlertRule {
                channel: Channel::GasPpm,
                condition: Condition::Ceiling { limit: 90.0 },
                severity: Severity::Medium,
                label: "Elevated gas concentration".to_string(),
                absent_policy: AbsentPolicy::Unknown,
            },
        ];
        let engine = AlertEngine::new(rules, None);

        let alerts = engine.evaluate(
            &reading(&[(Channel::Temperature, 40.0), (Channel::GasPpm, 95.0)]),
            &[],
        );
        assert_eq!(alerts.len(), 2);
    }

    #[test]
    fn absent_policy_unknown_skips_absent_channel() {
        let engine = AlertEngine::new(vec![temp_ceiling(35.0)], None);
        let alerts = engine.evaluate(&reading(&[(Channel::Humidity, 50.0)]), &[]);
        assert!(alerts.is_empty());
    }

    #[test]
    fn absent_policy_zero_evaluates_against_zero() {
        let rule = AlertRule {
            channel: Channel::Ph,
            condition: Condition::Floor { limit: 6.0 },
            severity: Severity::Medium,
            label: "pH below safe band".to_string(),
            absent_policy: AbsentPolicy::Zero,
        };
        let engine = AlertEngine::new(vec![rule], None);

        let alerts = engine.evaluate(&reading(&[(Channel::Temperature, 20.0)]), &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, Channel::Ph);
    }

    #[test]
    fn flag_rule_fires_on_motion() {
        let rule = AlertRule {
            channel: Channel::Motion,
            condition: Condition::Flag,
            severity: Severity::Medium,
            label: "Motion detected in restricted area".to_string(),
            absent_policy: AbsentPolicy::Unknown,
        };
        let engine = AlertEngine::new(vec![rule], None);

        assert_eq!(
            engine.evaluate(&reading(&[(Channel::Motion, 1.0)]), &[]).len(),
            1
        );
        assert!(engine.evaluate(&reading(&[(Channel::Motion, 0.0)]), &[]).is_empty());
    }

    #[test]
    fn trend_rule_uses_history() {
        let rule = AlertRule {
            channel: Channel::Temperature,
            condition: Condition::Trend {
                direction: Trend::Rising,
            },
            severity: Severity::Low,
            label: "Temperature climbing".to_string(),
            absent_policy: AbsentPolicy::Unknown,
        };
        let engine = AlertEngine::new(vec![rule], None);

        let history: Vec<Reading> = (0..6)
            .map(|i| reading(&[(Channel::Temperature, 20.0 + i as f64)]))
            .collect();
        let alerts = engine.evaluate(&reading(&[(Channel::Temperature, 26.0)]), &history);
        assert_eq!(alerts.len(), 1);

        let flat: Vec<Reading> = (0..6)
            .map(|_| reading(&[(Channel::Temperature, 20.0)]))
            .collect();
        let none = engine.evaluate(&reading(&[(Channel::Temperature, 20.0)]), &flat);
        assert!(none.is_empty());
    }

    #[test]
    fn compound_rule_requires_both_breaches() {
        let compound = CompoundRule {
            first_channel: Channel::Temperature,
            first_limit: 30.0,
            second_channel: Channel::GasPpm,
            second_limit: 120.0,
            severity: Severity::High,
            label: "Critical combined heat and gas".to_string(),
        };
        let engine = AlertEngine::new(vec![], Some(compound));

        let both = engine.evaluate(
            &reading(&[(Channel::Temperature, 32.0), (Channel::GasPpm, 130.0)]),
            &[],
        );
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].reason, "compound_threshold");

        let one = engine.evaluate(
            &reading(&[(Channel::Temperature, 32.0), (Channel::GasPpm, 80.0)]),
            &[],
        );
        assert!(one.is_empty());
    }

    #[test]
    fn classify_trend_directions() {
        assert_eq!(classify_trend(&[1.0, 2.0, 3.0, 4.0]), Trend::Rising);
        assert_eq!(classify_trend(&[4.0, 3.0, 2.0, 1.0]), Trend::Falling);
        assert_eq!(classify_trend(&[2.0, 2.0, 2.0, 2.0]), Trend::Stable);
        assert_eq!(classify_trend(&[2.0]), Trend::Stable);
    }
}
