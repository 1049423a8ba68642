//! Local harness: the same game loop as the server, driven in-process by one
//! scripted observer instead of network clients.
//!
//! Usage: `local_sim [seconds]` (runs until Ctrl+C when omitted)

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cell_arena_server::config::SimConfig;
use cell_arena_server::game::game_loop::{leaderboard, GameLoop};
use cell_arena_server::game::input_buffer::Intent;
use cell_arena_server::game::state::{OwnerId, World};
use cell_arena_server::util::Vec2;

/// Radius of the circle the observer steers along around the arena centre
const CIRCLE_RADIUS: f32 = 400.0;
/// Radians per second
const CIRCLE_SPEED: f32 = 0.4;
const SPLIT_EVERY_MS: f64 = 5000.0;
const EJECT_EVERY_MS: f64 = 2000.0;
const LEADERBOARD_EVERY_MS: f64 = 5000.0;

/// Stand-in for a human client
struct ScriptedObserver {
    id: OwnerId,
    name: String,
    next_split_ms: f64,
    next_eject_ms: f64,
}

impl ScriptedObserver {
    fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            next_split_ms: SPLIT_EVERY_MS,
            next_eject_ms: EJECT_EVERY_MS,
        }
    }

    /// Intents for the coming tick given the current world
    fn intents(&mut self, world: &World) -> Vec<Intent> {
        let eliminated = world.owner(self.id).map_or(true, |o| o.is_eliminated());
        if eliminated {
            return vec![Intent::Join {
                name: self.name.clone(),
            }];
        }

        let now = world.time_ms;
        let angle = (now / 1000.0) as f32 * CIRCLE_SPEED;
        let mut intents = vec![Intent::Move {
            target: world.center() + Vec2::from_angle(angle) * CIRCLE_RADIUS,
        }];
        if now >= self.next_split_ms {
            self.next_split_ms = now + SPLIT_EVERY_MS;
            intents.push(Intent::Split);
        }
        if now >= self.next_eject_ms {
            self.next_eject_ms = now + EJECT_EVERY_MS;
            intents.push(Intent::Eject);
        }
        intents
    }
}

fn log_leaderboard(world: &World) {
    let top = leaderboard(world, 5)
        .into_iter()
        .enumerate()
        .map(|(i, (name, mass))| format!("{}. {} ({:.0})", i + 1, name, mass))
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "t={:.0}s tick {} | {} cells, {} food, {} viruses | {}",
        world.time_ms / 1000.0,
        world.tick,
        world.alive_cells().count(),
        world.food.len(),
        world.viruses.len(),
        top
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let duration = match std::env::args().nth(1) {
        Some(arg) => Some(
            arg.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| anyhow::anyhow!("Expected a number of seconds, got '{}'", arg))?,
        ),
        None => None,
    };

    let config = SimConfig::load_or_default();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let mut game = GameLoop::new(config.clone());
    let mut observer = ScriptedObserver::new("Observer");

    let mut ticker = interval(Duration::from_secs_f64(1.0 / config.tick_rate as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut next_board_ms = LEADERBOARD_EVERY_MS;
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);

    info!("Local simulation at {} Hz", config.tick_rate);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        for intent in observer.intents(game.world()) {
            if !game.submit(observer.id, intent) {
                warn!("Input buffer full, observer intent dropped");
            }
        }
        let report = game.tick();
        if report.merges.aborted > 0 {
            warn!("{} merges aborted on tick {}", report.merges.aborted, report.tick);
        }

        if game.world().time_ms >= next_board_ms {
            next_board_ms += LEADERBOARD_EVERY_MS;
            log_leaderboard(game.world());
        }
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            break;
        }
    }

    log_leaderboard(game.world());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_loop() -> GameLoop {
        GameLoop::new(SimConfig {
            bot_count: 0,
            seed: Some(3),
            ..SimConfig::default()
        })
    }

    #[test]
    fn test_observer_joins_when_absent() {
        let game = create_test_loop();
        let mut observer = ScriptedObserver::new("Obs");
        assert_eq!(
            observer.intents(game.world()),
            vec![Intent::Join { name: "Obs".into() }]
        );
    }

    #[test]
    fn test_observer_circles_and_splits() {
        let mut game = create_test_loop();
        let mut observer = ScriptedObserver::new("Obs");
        let mut split_at = None;
        for _ in 0..(60 * 6) {
            let intents = observer.intents(game.world());
            if intents.contains(&Intent::Split) && split_at.is_none() {
                split_at = Some(game.world().time_ms);
            }
            for intent in intents {
                game.submit(observer.id, intent);
            }
            game.tick();
        }
        let split_at = split_at.unwrap();
        assert!(split_at >= SPLIT_EVERY_MS && split_at < SPLIT_EVERY_MS + 20.0);
        assert!(game.world().owner(observer.id).is_some());
        assert!(game.world().owner(observer.id).unwrap().aim.is_some());
    }
}
