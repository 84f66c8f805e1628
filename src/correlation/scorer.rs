//! Confidence scorer: pure function of (launch, window) -> score.
//!
//! The score is additive and boolean-gated, not a similarity metric.
//! Weights are kept in integer tenths so equal scores compare exactly.

use crate::events::{PendingLaunch, WindowObservation};
use serde::Serialize;
use std::fmt;

const CLASS_POINTS: u8 = 5;
const TIMING_POINTS: u8 = 3;
const WORKSPACE_POINTS: u8 = 2;
const MAX_POINTS: u8 = CLASS_POINTS + TIMING_POINTS + WORKSPACE_POINTS;

/// Окно и запуск считаются близкими по времени, если |Δt| строго меньше этого значения
pub const TIMING_WINDOW_SECS: f64 = 1.0;

/// Разбивка оценки по сигналам
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub class_match: bool,
    pub timing_match: bool,
    pub workspace_match: bool,
    /// observation.timestamp - launch.timestamp
    pub time_delta: f64,
}

impl ScoreBreakdown {
    pub(crate) fn points(&self) -> u8 {
        let mut points = 0;
        if self.class_match {
            points += CLASS_POINTS;
        }
        if self.timing_match {
            points += TIMING_POINTS;
        }
        if self.workspace_match {
            points += WORKSPACE_POINTS;
        }
        points
    }

    pub fn confidence(&self) -> f64 {
        f64::from(self.points()) / f64::from(MAX_POINTS)
    }

    pub fn level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_confidence(self.confidence())
    }
}

pub fn score(launch: &PendingLaunch, observation: &WindowObservation) -> ScoreBreakdown {
    let time_delta = observation.timestamp - launch.timestamp;

    ScoreBreakdown {
        class_match: launch.expected_class == observation.window_class,
        timing_match: time_delta.abs() < TIMING_WINDOW_SECS,
        workspace_match: launch.workspace_number == observation.workspace_number,
        time_delta,
    }
}

/// Грубая классификация оценки. Только для логов и диагностики,
/// в решениях о сопоставлении не участвует.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    Exact,
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 1.0 {
            ConfidenceLevel::Exact
        } else if confidence >= 0.8 {
            ConfidenceLevel::High
        } else if confidence >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfidenceLevel::Exact => "EXACT",
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::launch::tests::{launch, BASE};

    fn window(class: &str, workspace: i64, timestamp: f64) -> WindowObservation {
        WindowObservation::new(1, class, workspace, timestamp).unwrap()
    }

    #[test]
    fn all_signals_give_exact() {
        let breakdown = score(&launch("vscode", "Code", 2, BASE), &window("Code", 2, BASE + 0.5));
        assert_eq!(breakdown.confidence(), 1.0);
        assert_eq!(breakdown.level(), ConfidenceLevel::Exact);
        assert_eq!(breakdown.time_delta, 0.5);
    }

    #[test]
    fn signal_combinations() {
        let l = launch("vscode", "Code", 2, BASE);

        let wrong_ws = score(&l, &window("Code", 3, BASE + 0.5));
        assert_eq!(wrong_ws.confidence(), 0.8);
        assert_eq!(wrong_ws.level(), ConfidenceLevel::High);

        let late = score(&l, &window("Code", 2, BASE + 1.5));
        assert_eq!(late.confidence(), 0.7);
        assert_eq!(late.level(), ConfidenceLevel::Medium);

        let late_wrong_ws = score(&l, &window("Code", 5, BASE + 3.0));
        assert_eq!(late_wrong_ws.confidence(), 0.5);
        assert_eq!(late_wrong_ws.level(), ConfidenceLevel::Medium);

        let other_class = score(&l, &window("firefox", 2, BASE + 0.1));
        assert!(!other_class.class_match);
        assert_eq!(other_class.confidence(), 0.5);

        let nothing = score(&l, &window("firefox", 9, BASE + 4.0));
        assert_eq!(nothing.confidence(), 0.0);
        assert_eq!(nothing.level(), ConfidenceLevel::Low);
    }

    #[test]
    fn timing_window_is_strict_and_symmetric() {
        let l = launch("vscode", "Code", 2, BASE);
        assert!(!score(&l, &window("Code", 2, BASE + 1.0)).timing_match);
        assert!(score(&l, &window("Code", 2, BASE + 0.5)).timing_match);
        // окно может прийти раньше уведомления из-за рассинхронизации часов
        assert!(score(&l, &window("Code", 2, BASE - 0.5)).timing_match);
    }

    #[test]
    fn level_thresholds() {
        assert_eq!(ConfidenceLevel::from_confidence(1.0), ConfidenceLevel::Exact);
        assert_eq!(ConfidenceLevel::from_confidence(0.99), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.8), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.79), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.5), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.49), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::Exact.to_string(), "EXACT");
    }
}
