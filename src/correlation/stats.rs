use serde::Serialize;
use std::fmt;

/// Снимок счётчиков реестра для диагностики
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegistryStats {
    pub total_notifications: u64,
    pub total_matched: u64,
    pub total_expired: u64,
    pub total_failed_correlation: u64,
    pub total_pending: usize,
    pub unmatched_pending: usize,
    pub match_rate: f64,
    pub expiration_rate: f64,
}

impl RegistryStats {
    pub fn new(
        total_notifications: u64,
        total_matched: u64,
        total_expired: u64,
        total_failed_correlation: u64,
        total_pending: usize,
        unmatched_pending: usize,
    ) -> Self {
        Self {
            total_notifications,
            total_matched,
            total_expired,
            total_failed_correlation,
            total_pending,
            unmatched_pending,
            match_rate: percent(total_matched, total_notifications),
            expiration_rate: percent(total_expired, total_notifications),
        }
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "запусков={} сопоставлено={} ({:.1}%) просрочено={} ({:.1}%) без_пары={} ожидают={}/{}",
            self.total_notifications,
            self.total_matched,
            self.match_rate,
            self.total_expired,
            self.expiration_rate,
            self.total_failed_correlation,
            self.unmatched_pending,
            self.total_pending,
        )
    }
}
