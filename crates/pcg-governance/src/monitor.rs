//! Condition monitoring and governance alerts.
//!
//! The history is owned by the caller; this module only compares the current
//! conditions against the most recent entry and reports what changed.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::conditions::{ConditionSnapshot, MarketConditions};
use crate::engine::GovernanceEngine;
use crate::limits::DynamicLimits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    RegimeChange,
    LimitReduction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GovernanceAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    pub current: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Append this to the history for the next call.
    pub snapshot: ConditionSnapshot,
    pub limits: DynamicLimits,
    pub alerts: Vec<GovernanceAlert>,
}

impl GovernanceEngine {
    /// Classify `current`, compute limits, and raise alerts against the last
    /// entry of `history`:
    ///
    /// - volatility regime label changed: REGIME_CHANGE / HIGH
    /// - correlation regime label changed: REGIME_CHANGE / MEDIUM
    /// - position limit ratio below `limit_reduction_alert_ratio` and the
    ///   combined multiplier fell: LIMIT_REDUCTION / HIGH
    ///
    /// An empty history produces no regime or reduction alerts.
    pub fn monitor_market_conditions(
        &self,
        current: &MarketConditions,
        history: &[ConditionSnapshot],
    ) -> MonitorReport {
        let limits = self.calculate_dynamic_limits(current);
        let snapshot = ConditionSnapshot {
            conditions: current.clone(),
            volatility_regime: limits.volatility_regime,
            correlation_regime: limits.correlation_regime,
            combined_multiplier: limits.combined_multiplier,
        };

        let mut alerts = Vec::new();
        if let Some(prev) = history.last() {
            if prev.volatility_regime.label != snapshot.volatility_regime.label {
                alerts.push(GovernanceAlert {
                    kind: AlertKind::RegimeChange,
                    severity: AlertSeverity::High,
                    message: format!(
                        "volatility regime changed from {} to {}",
                        prev.volatility_regime.label, snapshot.volatility_regime.label
                    ),
                    previous: Some(prev.volatility_regime.label.to_string()),
                    current: snapshot.volatility_regime.label.to_string(),
                });
            }
            if prev.correlation_regime.label != snapshot.correlation_regime.label {
                alerts.push(GovernanceAlert {
                    kind: AlertKind::RegimeChange,
                    severity: AlertSeverity::Medium,
                    message: format!(
                        "correlation regime changed from {} to {}",
                        prev.correlation_regime.label, snapshot.correlation_regime.label
                    ),
                    previous: Some(prev.correlation_regime.label.to_string()),
                    current: snapshot.correlation_regime.label.to_string(),
                });
            }

            let ratio = limits.position_limit_ratio();
            if ratio < self.config.limit_reduction_alert_ratio
                && snapshot.combined_multiplier < prev.combined_multiplier
            {
                alerts.push(GovernanceAlert {
                    kind: AlertKind::LimitReduction,
                    severity: AlertSeverity::High,
                    message: format!(
                        "max position weight cut to {:.1}% of baseline ({:.4} -> {:.4})",
                        ratio * 100.0,
                        limits.base_rules.max_position_weight,
                        limits.limits.max_position_weight
                    ),
                    previous: Some(format!("{:.4}", prev.combined_multiplier)),
                    current: format!("{:.4}", snapshot.combined_multiplier),
                });
            }
        }

        for alert in &alerts {
            warn!(kind = ?alert.kind, severity = ?alert.severity, "{}", alert.message);
        }

        MonitorReport {
            snapshot,
            limits,
            alerts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::StressLevel;

    fn snap(engine: &GovernanceEngine, vol: f64, corr: f64, stress: StressLevel) -> ConditionSnapshot {
        engine
            .monitor_market_conditions(&MarketConditions::new(vol, corr, stress), &[])
            .snapshot
    }

    #[test]
    fn empty_history_has_no_alerts() {
        let e = GovernanceEngine::default();
        let rep = e.monitor_market_conditions(
            &MarketConditions::new(60.0, 0.9, StressLevel::Crisis),
            &[],
        );
        assert!(rep.alerts.is_empty());
        assert_eq!(rep.snapshot.combined_multiplier, rep.limits.combined_multiplier);
    }

    #[test]
    fn unchanged_conditions_raise_nothing() {
        let e = GovernanceEngine::default();
        let prev = snap(&e, 20.0, 0.4, StressLevel::Normal);
        let rep = e.monitor_market_conditions(
            &MarketConditions::new(21.0, 0.42, StressLevel::Normal),
            &[prev],
        );
        assert!(rep.alerts.is_empty());
    }

    #[test]
    fn volatility_change_is_high_correlation_change_is_medium() {
        let e = GovernanceEngine::default();
        let prev = snap(&e, 20.0, 0.4, StressLevel::Normal);
        let rep = e.monitor_market_conditions(
            &MarketConditions::new(12.0, 0.6, StressLevel::Normal),
            &[prev],
        );
        let kinds: Vec<_> = rep.alerts.iter().map(|a| (a.kind, a.severity)).collect();
        assert_eq!(
            kinds,
            vec![
                (AlertKind::RegimeChange, AlertSeverity::High),
                (AlertKind::RegimeChange, AlertSeverity::Medium),
            ]
        );
        assert_eq!(rep.alerts[0].previous.as_deref(), Some("normal"));
        assert_eq!(rep.alerts[0].current, "low");
    }

    #[test]
    fn sharp_cut_raises_limit_reduction() {
        let e = GovernanceEngine::default();
        let prev = snap(&e, 20.0, 0.4, StressLevel::Normal);
        // 0.6 × 0.7 × 0.5 = 0.21
        let rep = e.monitor_market_conditions(
            &MarketConditions::new(50.0, 0.8, StressLevel::Crisis),
            &[prev],
        );
        assert!(rep
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::LimitReduction && a.severity == AlertSeverity::High));
    }

    #[test]
    fn persistent_stress_does_not_repeat_reduction_alert() {
        let e = GovernanceEngine::default();
        let prev = snap(&e, 50.0, 0.8, StressLevel::Crisis);
        let rep = e.monitor_market_conditions(
            &MarketConditions::new(52.0, 0.82, StressLevel::Crisis),
            &[prev],
        );
        assert!(rep.alerts.is_empty());
    }

    #[test]
    fn only_last_history_entry_is_compared() {
        let e = GovernanceEngine::default();
        let history = vec![
            snap(&e, 50.0, 0.8, StressLevel::Crisis),
            snap(&e, 20.0, 0.4, StressLevel::Normal),
        ];
        let rep = e.monitor_market_conditions(
            &MarketConditions::new(20.0, 0.4, StressLevel::Normal),
            &history,
        );
        assert!(rep.alerts.is_empty());
    }

    #[test]
    fn alert_kinds_serialize_screaming() {
        let json = serde_json::to_string(&AlertKind::LimitReduction).unwrap();
        assert_eq!(json, "\"LIMIT_REDUCTION\"");
    }
}
