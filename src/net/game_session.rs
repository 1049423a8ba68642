//! Game session - runs the fixed-rate tick and broadcasts snapshots to observers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::game::error::JoinError;
use crate::game::game_loop::{GameLoop, TickReport};
use crate::game::input_buffer::{InputSender, Intent};
use crate::game::performance::PerformanceMonitor;
use crate::game::state::OwnerId;
use crate::metrics::Metrics;
use crate::net::framing::{frame_server_message, FramingError};
use crate::net::protocol::{ServerMessage, WorldSnapshot};

/// Write half of an observer's reliable stream, shared between the
/// connection handler and the broadcaster
pub type SharedWriter<W> = Arc<RwLock<Option<W>>>;

/// Seconds between server stats lines
const STATS_INTERVAL_SECS: u64 = 30;

pub struct ObserverConnection<W> {
    pub owner_id: OwnerId,
    pub name: String,
    pub writer: SharedWriter<W>,
}

/// Shared state behind the tick task and every connection handler
pub struct GameSession<W = wtransport::SendStream> {
    pub game_loop: GameLoop,
    pub observers: HashMap<OwnerId, ObserverConnection<W>>,
    pub performance: PerformanceMonitor,
    metrics: Arc<Metrics>,
    max_players: usize,
}

impl<W> GameSession<W> {
    pub fn new(config: &ServerConfig, metrics: Arc<Metrics>) -> Self {
        let game_loop = GameLoop::new(config.sim.clone());
        metrics.record_world(game_loop.world());
        Self {
            game_loop,
            observers: HashMap::new(),
            performance: PerformanceMonitor::new(config.sim.tick_rate),
            metrics,
            max_players: config.max_players,
        }
    }

    /// Admission control for a new observer; `Err` carries the rejection reason
    pub fn admit(&self) -> Result<(), String> {
        if self.observers.len() >= self.max_players {
            return Err(JoinError::ServerFull(self.observers.len()).to_string());
        }
        if !self.performance.can_accept_players() {
            return Err(format!(
                "Server under load ({}), try again later",
                self.performance.status_message()
            ));
        }
        Ok(())
    }

    pub fn add_observer(&mut self, owner_id: OwnerId, name: String, writer: SharedWriter<W>) {
        info!("Observer '{}' connected as {}", name, owner_id);
        self.observers.insert(
            owner_id,
            ObserverConnection {
                owner_id,
                name,
                writer,
            },
        );
    }

    /// Drop the observer and remove its cells from the arena. Returns false if unknown.
    pub fn remove_observer(&mut self, owner_id: OwnerId) -> bool {
        let Some(conn) = self.observers.remove(&owner_id) else {
            return false;
        };
        if !self.game_loop.submit(owner_id, Intent::Leave) {
            warn!("Input buffer full, removing {} directly", owner_id);
            self.game_loop.world_mut().remove_owner(owner_id);
        }
        info!("Observer '{}' ({}) disconnected", conn.name, owner_id);
        true
    }

    pub fn is_observer(&self, owner_id: OwnerId) -> bool {
        self.observers.contains_key(&owner_id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn sender(&self) -> InputSender {
        self.game_loop.sender()
    }

    pub fn join_accepted(&self, owner_id: OwnerId) -> ServerMessage {
        let config = &self.game_loop.world().config;
        ServerMessage::JoinAccepted {
            owner_id,
            world_width: config.world_width,
            world_height: config.world_height,
            tick_rate: config.tick_rate,
        }
    }

    /// Run one timed tick and publish its counters
    pub fn tick(&mut self) -> TickReport {
        self.performance.tick_start();
        let report = self.game_loop.tick();

        let world = self.game_loop.world();
        let entities = world.cells().len() + world.food.len() + world.viruses.len();
        if let Some(took) = self.performance.tick_end(entities) {
            self.metrics.record_tick_time(took);
        }
        self.metrics.record_report(&report);
        self.metrics.record_world(world);
        self.metrics.record_performance(
            self.performance.status(),
            self.performance.budget_usage_percent(),
        );
        report
    }

    /// Encode the current world once for every observer
    pub fn snapshot_frame(&self) -> Result<Vec<u8>, FramingError> {
        frame_server_message(&ServerMessage::Snapshot(WorldSnapshot::from_world(
            self.game_loop.world(),
        )))
    }

    pub fn writers(&self) -> Vec<(OwnerId, SharedWriter<W>)> {
        self.observers
            .values()
            .map(|conn| (conn.owner_id, conn.writer.clone()))
            .collect()
    }
}

/// Write an already framed message
pub async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    frame: &[u8],
) -> Result<(), FramingError> {
    match &mut *writer.write().await {
        Some(stream) => {
            stream.write_all(frame).await?;
            Ok(())
        }
        None => Err(FramingError::ConnectionClosed),
    }
}

/// Send a message to a specific observer
pub async fn send_to_observer<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    message: &ServerMessage,
) -> Result<(), FramingError> {
    let frame = frame_server_message(message)?;
    send_frame(writer, &frame).await
}

/// Fan one frame out to every observer, one task per stream so a slow
/// reader never delays the others
pub fn broadcast_frame<W>(writers: Vec<(OwnerId, SharedWriter<W>)>, frame: Arc<Vec<u8>>)
where
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    for (owner_id, writer) in writers {
        let frame = frame.clone();
        tokio::spawn(async move {
            if let Err(e) = send_frame(&writer, &frame).await {
                debug!("Snapshot to {} failed: {}", owner_id, e);
            }
        });
    }
}

/// Start the tick task at the configured rate
pub fn start_game_loop<W>(session: Arc<RwLock<GameSession<W>>>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let (tick_rate, metrics) = {
            let guard = session.read().await;
            (guard.game_loop.world().config.tick_rate.max(1), guard.metrics.clone())
        };
        let mut ticker = interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Game loop started at {} Hz", tick_rate);
        let start = Instant::now();
        let stats_every = tick_rate as u64 * STATS_INTERVAL_SECS;
        let mut tick_count: u64 = 0;

        loop {
            ticker.tick().await;
            tick_count += 1;

            let (report, frame, writers) = {
                let mut guard = session.write().await;
                let report = guard.tick();
                let frame = if guard.observer_count() > 0 {
                    Some(guard.snapshot_frame())
                } else {
                    None
                };
                (report, frame, guard.writers())
            };

            for (owner_id, result) in &report.joins {
                if let Err(e) = result {
                    debug!("Join for {} not applied: {}", owner_id, e);
                }
            }

            match frame {
                Some(Ok(frame)) => {
                    metrics.record_snapshot(writers.len(), frame.len());
                    broadcast_frame(writers, Arc::new(frame));
                }
                Some(Err(e)) => warn!("Failed to encode snapshot for tick {}: {}", report.tick, e),
                None => {}
            }

            if tick_count % stats_every == 0 {
                let guard = session.read().await;
                let world = guard.game_loop.world();
                info!(
                    "Arena: {}s, tick {}, {} humans + {} bots, {} cells, {} food | Perf: {:?} ({:.1}%)",
                    start.elapsed().as_secs(),
                    world.tick,
                    world.human_count(),
                    world.bot_count(),
                    world.alive_cells().count(),
                    world.food.len(),
                    guard.performance.status(),
                    guard.performance.budget_usage_percent()
                );
            }
        }
    })
}
