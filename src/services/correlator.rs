use crate::correlation::{CorrelationMatch, LaunchRegistry};
use crate::debug_if_enabled;
use crate::events::WindowObservation;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Итог обработки нового окна для внешнего модуля размещения
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CorrelationOutcome {
    Matched(CorrelationMatch),
    NoMatch { window_id: u64 },
}

impl CorrelationOutcome {
    #[allow(dead_code)]
    pub fn is_matched(&self) -> bool {
        matches!(self, CorrelationOutcome::Matched(_))
    }
}

/// WindowCorrelator is the single entry point for window observations,
/// whichever source they come from (sway subscription, IPC, dry-run).
pub struct WindowCorrelator {
    registry: Arc<LaunchRegistry>,
}

impl WindowCorrelator {
    pub fn new(registry: Arc<LaunchRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<LaunchRegistry> {
        &self.registry
    }

    /// Обработка нового окна
    pub fn handle_window_event(&self, observation: &WindowObservation) -> CorrelationOutcome {
        debug_if_enabled!("Обработка нового окна: {}", observation);

        match self.registry.find_match(observation) {
            Some(found) => {
                info!(
                    "Окно {} -> проект '{}' (запуск {}, ws{}, уверенность {:.2} {}, Δt={:.3}с)",
                    observation,
                    found.launch.project_name,
                    found.launch.app_name,
                    found.launch.workspace_number,
                    found.confidence,
                    found.level,
                    found.breakdown.time_delta,
                );
                CorrelationOutcome::Matched(found)
            }
            None => {
                // Обычная ситуация: окно открыто не через обёртку запуска
                debug_if_enabled!("Для окна {} нет ожидающего запуска", observation);
                CorrelationOutcome::NoMatch {
                    window_id: observation.window_id,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::ManualClock;
    use crate::events::launch::tests::{launch, BASE};

    #[test]
    fn matched_and_unmatched_windows() {
        let registry = Arc::new(LaunchRegistry::new(5.0, Arc::new(ManualClock::new(BASE))));
        registry.add(launch("vscode", "Code", 2, BASE));
        let correlator = WindowCorrelator::new(Arc::clone(&registry));

        let window = WindowObservation::new(10, "Code", 2, BASE + 0.3).unwrap();
        let outcome = correlator.handle_window_event(&window);
        match &outcome {
            CorrelationOutcome::Matched(found) => {
                assert_eq!(found.launch.project_name, "vscode");
                assert_eq!(found.confidence, 1.0);
            }
            other => panic!("ожидалось сопоставление, получено {:?}", other),
        }

        let again = correlator.handle_window_event(&window);
        assert_eq!(again, CorrelationOutcome::NoMatch { window_id: 10 });
        assert!(!again.is_matched());
        assert_eq!(correlator.registry().stats().total_failed_correlation, 1);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(CorrelationOutcome::NoMatch { window_id: 3 }).unwrap();
        assert_eq!(json["outcome"], "no_match");
        assert_eq!(json["window_id"], 3);
    }
}
