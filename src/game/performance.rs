//! Tick budget monitoring
//!
//! Decides whether new observers may join.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Minimum spacing between two overrun warnings
const OVERRUN_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Samples required before the status moves off `Excellent`
const MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceStatus {
    /// Under 30% of the tick budget
    Excellent,
    Good,
    /// Over 70%; joins are refused
    Warning,
    Critical,
    /// Sustained overload beyond 150%
    Catastrophic,
}

impl PerformanceStatus {
    pub fn can_accept_players(&self) -> bool {
        matches!(self, PerformanceStatus::Excellent | PerformanceStatus::Good)
    }
}

/// Rolling window of tick durations against the budget of one tick
pub struct PerformanceMonitor {
    samples: VecDeque<Duration>,
    max_samples: usize,
    budget: Duration,
    status: PerformanceStatus,
    tick_start: Option<Instant>,
    last_entity_count: usize,
    overruns: u64,
    last_overrun_warning: Option<Instant>,
}

impl PerformanceMonitor {
    pub fn new(tick_rate: u32) -> Self {
        let max_samples = (tick_rate.max(1) * 2) as usize;
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
            budget: Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64),
            status: PerformanceStatus::Excellent,
            tick_start: None,
            last_entity_count: 0,
            overruns: 0,
            last_overrun_warning: None,
        }
    }

    pub fn tick_start(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    /// Close the current measurement. Returns the tick duration.
    pub fn tick_end(&mut self, entity_count: usize) -> Option<Duration> {
        let duration = self.tick_start.take()?.elapsed();
        self.last_entity_count = entity_count;
        self.record_tick(duration);
        Some(duration)
    }

    pub fn record_tick(&mut self, duration: Duration) {
        self.samples.push_back(duration);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }

        if duration > self.budget {
            self.overruns += 1;
            let now = Instant::now();
            let due = self
                .last_overrun_warning
                .map_or(true, |at| now.duration_since(at) >= OVERRUN_WARN_INTERVAL);
            if due {
                self.last_overrun_warning = Some(now);
                tracing::warn!(
                    "Tick took {:.2}ms, budget {:.2}ms ({} overruns so far)",
                    duration.as_secs_f64() * 1000.0,
                    self.budget.as_secs_f64() * 1000.0,
                    self.overruns
                );
            }
        }
        self.update_status();
    }

    fn update_status(&mut self) {
        if self.samples.len() < MIN_SAMPLES {
            return;
        }
        let usage = self.budget_usage_percent() / 100.0;
        let next = match usage {
            u if u < 0.3 => PerformanceStatus::Excellent,
            u if u < 0.7 => PerformanceStatus::Good,
            u if u < 0.9 => PerformanceStatus::Warning,
            u if u < 1.5 => PerformanceStatus::Critical,
            _ => PerformanceStatus::Catastrophic,
        };
        if next != self.status {
            tracing::info!("Performance status {:?} -> {:?}", self.status, next);
            self.status = next;
        }
    }

    pub fn average_tick_duration(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    pub fn p95_tick_duration(&self) -> Duration {
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted
            .get(idx.min(sorted.len().saturating_sub(1)))
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    pub fn budget_usage_percent(&self) -> f32 {
        (self.average_tick_duration().as_secs_f64() / self.budget.as_secs_f64() * 100.0) as f32
    }

    pub fn can_accept_players(&self) -> bool {
        self.status.can_accept_players()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn last_entity_count(&self) -> usize {
        self.last_entity_count
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?} - {:.1}% budget, {} entities",
            self.status,
            self.budget_usage_percent(),
            self.last_entity_count
        )
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(60)
    }
}
