//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::game_loop::TickReport;
use crate::game::performance::PerformanceStatus;
use crate::game::state::World;

/// Rolling window used for tick percentiles
const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for the arena server
#[derive(Debug)]
pub struct Metrics {
    // Population
    pub humans: AtomicU64,
    pub bots: AtomicU64,
    pub agents_alive: AtomicU64,
    pub food_count: AtomicU64,
    pub virus_count: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // 0=Excellent .. 4=Catastrophic
    pub performance_status: AtomicU64,
    pub budget_usage_percent: AtomicU64,

    // Simulation events
    pub predations: AtomicU64,
    pub food_eaten: AtomicU64,
    pub viruses_popped: AtomicU64,
    pub splits: AtomicU64,
    pub ejects: AtomicU64,
    pub merges_completed: AtomicU64,
    pub merges_aborted: AtomicU64,
    pub values_sanitized: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub joins_rejected: AtomicU64,
    pub intents_received: AtomicU64,
    pub intents_dropped: AtomicU64,
    pub snapshots_sent: AtomicU64,
    pub bytes_sent: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            humans: AtomicU64::new(0),
            bots: AtomicU64::new(0),
            agents_alive: AtomicU64::new(0),
            food_count: AtomicU64::new(0),
            virus_count: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            performance_status: AtomicU64::new(0),
            budget_usage_percent: AtomicU64::new(0),
            predations: AtomicU64::new(0),
            food_eaten: AtomicU64::new(0),
            viruses_popped: AtomicU64::new(0),
            splits: AtomicU64::new(0),
            ejects: AtomicU64::new(0),
            merges_completed: AtomicU64::new(0),
            merges_aborted: AtomicU64::new(0),
            values_sanitized: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            joins_rejected: AtomicU64::new(0),
            intents_received: AtomicU64::new(0),
            intents_dropped: AtomicU64::new(0),
            snapshots_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Accumulate the event counters of one tick
    pub fn record_report(&self, report: &TickReport) {
        let c = &report.collisions;
        self.predations.fetch_add(c.predations as u64, Ordering::Relaxed);
        self.food_eaten.fetch_add(c.food_eaten as u64, Ordering::Relaxed);
        self.viruses_popped.fetch_add(c.viruses_popped as u64, Ordering::Relaxed);
        self.splits.fetch_add(report.fragments_split as u64, Ordering::Relaxed);
        self.ejects.fetch_add(report.pellets_ejected as u64, Ordering::Relaxed);
        self.merges_completed.fetch_add(report.merges.completed as u64, Ordering::Relaxed);
        self.merges_aborted.fetch_add(report.merges.aborted as u64, Ordering::Relaxed);
        self.values_sanitized.fetch_add(report.repaired as u64, Ordering::Relaxed);
    }

    /// Refresh population gauges from the world
    pub fn record_world(&self, world: &World) {
        self.humans.store(world.human_count() as u64, Ordering::Relaxed);
        self.bots.store(world.bot_count() as u64, Ordering::Relaxed);
        self.agents_alive.store(world.alive_cells().count() as u64, Ordering::Relaxed);
        self.food_count.store(world.food.len() as u64, Ordering::Relaxed);
        self.virus_count.store(world.viruses.len() as u64, Ordering::Relaxed);
    }

    pub fn record_performance(&self, status: PerformanceStatus, budget_percent: f32) {
        let level = match status {
            PerformanceStatus::Excellent => 0,
            PerformanceStatus::Good => 1,
            PerformanceStatus::Warning => 2,
            PerformanceStatus::Critical => 3,
            PerformanceStatus::Catastrophic => 4,
        };
        self.performance_status.store(level, Ordering::Relaxed);
        self.budget_usage_percent
            .store(budget_percent.max(0.0) as u64, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self, observers: usize, frame_len: usize) {
        self.snapshots_sent.fetch_add(observers as u64, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add((observers * frame_len) as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn status_name(&self) -> &'static str {
        match self.performance_status.load(Ordering::Relaxed) {
            0 => "excellent",
            1 => "good",
            2 => "warning",
            3 => "critical",
            _ => "catastrophic",
        }
    }

    /// Prometheus text exposition
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("cell_arena_humans", "Connected human owners", "gauge",
            self.humans.load(Ordering::Relaxed));
        metric!("cell_arena_bots", "Bot owners", "gauge",
            self.bots.load(Ordering::Relaxed));
        metric!("cell_arena_agents_alive", "Alive cells", "gauge",
            self.agents_alive.load(Ordering::Relaxed));
        metric!("cell_arena_food", "Food pellets", "gauge",
            self.food_count.load(Ordering::Relaxed));
        metric!("cell_arena_viruses", "Viruses", "gauge",
            self.virus_count.load(Ordering::Relaxed));

        metric!("cell_arena_tick_time_microseconds", "Last tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("cell_arena_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("cell_arena_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("cell_arena_tick_time_max_microseconds", "Maximum tick time in the window", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("cell_arena_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("cell_arena_performance_status", "Performance status (0=Excellent, 4=Catastrophic)", "gauge",
            self.performance_status.load(Ordering::Relaxed));
        metric!("cell_arena_budget_usage_percent", "Tick budget usage percentage", "gauge",
            self.budget_usage_percent.load(Ordering::Relaxed));
        output.push_str(&format!(
            "# HELP cell_arena_performance_state Human-readable performance state\n# TYPE cell_arena_performance_state gauge\ncell_arena_performance_state{{state=\"{}\"}} 1\n",
            self.status_name()
        ));

        metric!("cell_arena_predations_total", "Cells eaten by other owners", "counter",
            self.predations.load(Ordering::Relaxed));
        metric!("cell_arena_food_eaten_total", "Pellets consumed", "counter",
            self.food_eaten.load(Ordering::Relaxed));
        metric!("cell_arena_viruses_popped_total", "Viruses consumed", "counter",
            self.viruses_popped.load(Ordering::Relaxed));
        metric!("cell_arena_splits_total", "Fragments created by split requests", "counter",
            self.splits.load(Ordering::Relaxed));
        metric!("cell_arena_ejects_total", "Mass ejections", "counter",
            self.ejects.load(Ordering::Relaxed));
        metric!("cell_arena_merges_completed_total", "Completed merges", "counter",
            self.merges_completed.load(Ordering::Relaxed));
        metric!("cell_arena_merges_aborted_total", "Merges abandoned as invalid", "counter",
            self.merges_aborted.load(Ordering::Relaxed));
        metric!("cell_arena_values_sanitized_total", "Non-finite values repaired", "counter",
            self.values_sanitized.load(Ordering::Relaxed));

        metric!("cell_arena_connections_active", "Active WebTransport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("cell_arena_joins_rejected_total", "Join requests refused", "counter",
            self.joins_rejected.load(Ordering::Relaxed));
        metric!("cell_arena_intents_received_total", "Intents accepted into the buffer", "counter",
            self.intents_received.load(Ordering::Relaxed));
        metric!("cell_arena_intents_dropped_total", "Intents dropped on a full buffer", "counter",
            self.intents_dropped.load(Ordering::Relaxed));
        metric!("cell_arena_snapshots_sent_total", "Snapshots delivered to observers", "counter",
            self.snapshots_sent.load(Ordering::Relaxed));
        metric!("cell_arena_bytes_sent_total", "Snapshot bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("cell_arena_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON form for direct API access
    pub fn to_json(&self) -> String {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        serde_json::json!({
            "population": {
                "humans": load(&self.humans),
                "bots": load(&self.bots),
                "agents_alive": load(&self.agents_alive),
                "food": load(&self.food_count),
                "viruses": load(&self.virus_count),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
                "status": load(&self.performance_status),
                "status_name": self.status_name(),
                "budget_percent": load(&self.budget_usage_percent),
            },
            "events": {
                "predations": load(&self.predations),
                "food_eaten": load(&self.food_eaten),
                "viruses_popped": load(&self.viruses_popped),
                "splits": load(&self.splits),
                "ejects": load(&self.ejects),
                "merges_completed": load(&self.merges_completed),
                "merges_aborted": load(&self.merges_aborted),
                "values_sanitized": load(&self.values_sanitized),
            },
            "network": {
                "connections": load(&self.connections_active),
                "joins_rejected": load(&self.joins_rejected),
                "intents_received": load(&self.intents_received),
                "intents_dropped": load(&self.intents_dropped),
                "snapshots_sent": load(&self.snapshots_sent),
                "bytes_sent": load(&self.bytes_sent),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the HTTP response for a raw request
fn respond(metrics: &Metrics, request: &str) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next());

    let (content_type, body) = match path {
        Some("/metrics") => ("text/plain; version=0.0.4", metrics.to_prometheus()),
        Some("/metrics/json") | Some("/json") => ("application/json", metrics.to_json()),
        Some("/health") | Some("/") => ("text/plain", "OK".to_string()),
        _ => {
            return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string()
        }
    };
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Serve `/metrics`, `/metrics/json` and `/health`
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = respond(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::systems::collision::CollisionOutcome;
    use crate::game::systems::merge::MergeOutcome;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.snapshots_sent.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1040);
        assert!(
            metrics.tick_time_p99_us.load(Ordering::Relaxed)
                >= metrics.tick_time_p95_us.load(Ordering::Relaxed)
        );
    }

    #[test]
    fn test_tick_history_bounded() {
        let metrics = Metrics::new();
        for _ in 0..(TICK_HISTORY_LEN + 50) {
            metrics.record_tick_time(Duration::from_micros(5));
        }
        assert_eq!(metrics.tick_history.read().len(), TICK_HISTORY_LEN);
    }

    #[test]
    fn test_record_report_accumulates() {
        let metrics = Metrics::new();
        let report = TickReport {
            fragments_split: 2,
            pellets_ejected: 1,
            repaired: 3,
            collisions: CollisionOutcome {
                predations: 1,
                food_eaten: 4,
                ..CollisionOutcome::default()
            },
            merges: MergeOutcome {
                completed: 1,
                aborted: 1,
                ..MergeOutcome::default()
            },
            ..TickReport::default()
        };
        metrics.record_report(&report);
        metrics.record_report(&report);
        assert_eq!(metrics.predations.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.food_eaten.load(Ordering::Relaxed), 8);
        assert_eq!(metrics.splits.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.merges_aborted.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.values_sanitized.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_record_snapshot() {
        let metrics = Metrics::new();
        metrics.record_snapshot(3, 100);
        assert_eq!(metrics.snapshots_sent.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.bytes_sent.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.humans.store(2, Ordering::Relaxed);
        metrics.bots.store(15, Ordering::Relaxed);
        metrics.record_performance(PerformanceStatus::Warning, 75.4);

        let output = metrics.to_prometheus();
        assert!(output.contains("cell_arena_humans 2"));
        assert!(output.contains("cell_arena_bots 15"));
        assert!(output.contains("cell_arena_budget_usage_percent 75"));
        assert!(output.contains("state=\"warning\""));
        assert!(output.contains("# TYPE cell_arena_tick_count counter"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.intents_dropped.store(7, Ordering::Relaxed);
        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["network"]["intents_dropped"], 7);
        assert_eq!(value["performance"]["status_name"], "excellent");
    }

    #[test]
    fn test_http_routes() {
        let metrics = Metrics::new();
        assert!(respond(&metrics, "GET /metrics HTTP/1.1\r\n\r\n").contains("cell_arena_tick_count"));
        assert!(respond(&metrics, "GET /metrics/json HTTP/1.1\r\n\r\n").contains("application/json"));
        assert!(respond(&metrics, "GET /health HTTP/1.1\r\n\r\n").ends_with("OK"));
        assert!(respond(&metrics, "GET /nope HTTP/1.1\r\n\r\n").starts_with("HTTP/1.1 404"));
        assert!(respond(&metrics, "POST /metrics HTTP/1.1\r\n\r\n").starts_with("HTTP/1.1 404"));
    }
}
