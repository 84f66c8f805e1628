use crate::correlation::clock::{Clock, SystemClock};
use crate::correlation::scorer::{self, ConfidenceLevel, ScoreBreakdown};
use crate::correlation::stats::RegistryStats;
use crate::debug_if_enabled;
use crate::error::ValidationError;
use crate::events::launch::DEFAULT_CLOCK_SKEW_TOLERANCE_SECS;
use crate::events::{LaunchNotification, PendingLaunch, WindowObservation};
use parking_lot::Mutex;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

/// Синтетический идентификатор записи: несколько запусков одного приложения
/// могут ожидать одновременно.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LaunchId(pub u64);

/// Результат успешного сопоставления окна с запуском
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatch {
    pub launch_id: LaunchId,
    pub launch: PendingLaunch,
    pub breakdown: ScoreBreakdown,
    pub confidence: f64,
    pub level: ConfidenceLevel,
}

/// Запись для диагностического просмотра ожидающих запусков
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingLaunchView {
    pub launch_id: LaunchId,
    pub launch: PendingLaunch,
    pub matched: bool,
    pub age_secs: f64,
    pub expired: bool,
}

/// Счётчики обновляются под блокировкой реестра, читаются без неё
#[derive(Debug, Default)]
struct RegistryCounters {
    total_notifications: AtomicU64,
    total_matched: AtomicU64,
    total_expired: AtomicU64,
    total_failed_correlation: AtomicU64,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<LaunchId, PendingLaunch>,
    next_id: u64,
}

impl RegistryState {
    /// Физически удаляет логически просроченные записи, возвращает их число
    fn sweep_expired(&mut self, now: f64, timeout: f64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, launch| !launch.is_expired(now, timeout));
        before - self.entries.len()
    }
}

/// Реестр ожидающих запусков.
///
/// Одна блокировка охватывает хранилище и счётчики на всё время
/// `add` и `find_match`: очистка+вставка и фильтр+оценка+отметка неделимы.
/// Фонового таймера нет, просроченные записи удаляются только при `add`,
/// поэтому `total_expired` может отставать; `find_match` проверяет
/// просрочку сам и от этого не зависит.
pub struct LaunchRegistry {
    timeout_secs: f64,
    skew_tolerance_secs: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<RegistryState>,
    counters: RegistryCounters,
}

impl Default for LaunchRegistry {
    fn default() -> Self {
        Self::with_system_clock(DEFAULT_TIMEOUT_SECS)
    }
}

impl LaunchRegistry {
    pub fn new(timeout_secs: f64, clock: Arc<dyn Clock>) -> Self {
        info!("Инициализация LaunchRegistry (таймаут: {:.1}с)", timeout_secs);

        Self {
            timeout_secs,
            skew_tolerance_secs: DEFAULT_CLOCK_SKEW_TOLERANCE_SECS,
            clock,
            state: Mutex::new(RegistryState::default()),
            counters: RegistryCounters::default(),
        }
    }

    pub fn with_system_clock(timeout_secs: f64) -> Self {
        Self::new(timeout_secs, Arc::new(SystemClock))
    }

    pub fn with_skew_tolerance(mut self, tolerance_secs: f64) -> Self {
        self.skew_tolerance_secs = tolerance_secs;
        self
    }

    #[allow(dead_code)]
    pub fn timeout_secs(&self) -> f64 {
        self.timeout_secs
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Валидирует уведомление по часам реестра и добавляет его
    pub fn admit(&self, notification: LaunchNotification) -> Result<LaunchId, ValidationError> {
        let launch = PendingLaunch::with_skew_tolerance(notification, self.now(), self.skew_tolerance_secs)?;
        Ok(self.add(launch))
    }

    /// Регистрирует ожидающий запуск. Повторной валидации нет.
    pub fn add(&self, launch: PendingLaunch) -> LaunchId {
        let now = self.now();
        let mut state = self.state.lock();

        let expired = state.sweep_expired(now, self.timeout_secs);
        if expired > 0 {
            self.counters
                .total_expired
                .fetch_add(expired as u64, Ordering::Relaxed);
            debug!("Удалено просроченных запусков: {}", expired);
        }

        let id = LaunchId(state.next_id);
        state.next_id += 1;

        info!("Зарегистрирован запуск {:?}: {}", id, launch);
        state.entries.insert(id, launch);
        self.counters.total_notifications.fetch_add(1, Ordering::Relaxed);

        id
    }

    /// Ищет запуск, породивший окно. Каждый запуск сопоставляется не более одного раза.
    pub fn find_match(&self, observation: &WindowObservation) -> Option<CorrelationMatch> {
        let now = self.now();
        let mut state = self.state.lock();

        let candidates: SmallVec<[(LaunchId, ScoreBreakdown, f64); 8]> = state
            .entries
            .iter()
            .filter(|(_, launch)| {
                !launch.matched
                    && launch.expected_class == observation.window_class
                    && !launch.is_expired(now, self.timeout_secs)
            })
            .map(|(id, launch)| (*id, scorer::score(launch, observation), launch.timestamp))
            .collect();

        debug_if_enabled!(
            "Окно {}: кандидатов {} из {}",
            observation,
            candidates.len(),
            state.entries.len()
        );

        // максимальная оценка, при равенстве самый ранний запуск, затем меньший id
        let best = candidates.into_iter().min_by(|a, b| {
            b.1.points()
                .cmp(&a.1.points())
                .then_with(|| a.2.total_cmp(&b.2))
                .then_with(|| a.0.cmp(&b.0))
        });

        let Some((launch_id, breakdown, _)) = best else {
            self.counters
                .total_failed_correlation
                .fetch_add(1, Ordering::Relaxed);
            return None;
        };

        // кандидат выбран под той же блокировкой, запись не могла исчезнуть
        let Some(launch) = state.entries.get_mut(&launch_id) else {
            error!("Запуск {:?} пропал из реестра во время сопоставления", launch_id);
            self.counters
                .total_failed_correlation
                .fetch_add(1, Ordering::Relaxed);
            return None;
        };
        launch.mark_matched();
        self.counters.total_matched.fetch_add(1, Ordering::Relaxed);

        Some(CorrelationMatch {
            launch_id,
            launch: launch.clone(),
            confidence: breakdown.confidence(),
            level: breakdown.level(),
            breakdown,
        })
    }

    pub fn stats(&self) -> RegistryStats {
        let (total_pending, unmatched_pending) = {
            let state = self.state.lock();
            let unmatched = state.entries.values().filter(|l| !l.matched).count();
            (state.entries.len(), unmatched)
        };

        RegistryStats::new(
            self.counters.total_notifications.load(Ordering::Relaxed),
            self.counters.total_matched.load(Ordering::Relaxed),
            self.counters.total_expired.load(Ordering::Relaxed),
            self.counters.total_failed_correlation.load(Ordering::Relaxed),
            total_pending,
            unmatched_pending,
        )
    }

    /// Записи в хранилище, от старых к новым. Ничего не удаляет.
    pub fn pending(&self, include_matched: bool) -> Vec<PendingLaunchView> {
        let now = self.now();
        let state = self.state.lock();

        let mut views: Vec<PendingLaunchView> = state
            .entries
            .iter()
            .filter(|(_, launch)| include_matched || !launch.matched)
            .map(|(id, launch)| PendingLaunchView {
                launch_id: *id,
                launch: launch.clone(),
                matched: launch.matched,
                age_secs: launch.age(now),
                expired: launch.is_expired(now, self.timeout_secs),
            })
            .collect();

        views.sort_by(|a, b| {
            a.launch
                .timestamp
                .total_cmp(&b.launch.timestamp)
                .then_with(|| a.launch_id.cmp(&b.launch_id))
        });
        views
    }
}
