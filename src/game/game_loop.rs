//! The authoritative tick
//!
//! [`step`] is the whole simulation: every caller (network session, local
//! harness, benches, tests) advances the world through it. [`GameLoop`]
//! bundles a world with its bot brains and intent buffer.

use tracing::{debug, info};

use crate::config::SimConfig;
use crate::game::error::JoinError;
use crate::game::input_buffer::{InputBuffer, InputSender, Intent, IntentTable, PendingIntent};
use crate::game::schedule::ScheduledEvent;
use crate::game::state::{CellId, OwnerId, Steering, World};
use crate::game::systems::ai::AiManager;
use crate::game::systems::collision::{self, CollisionOutcome};
use crate::game::systems::merge::{self, MergeOutcome};
use crate::game::systems::{food, movement, soft_body, split};
use crate::util::vec2::Vec2;

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub joins: Vec<(OwnerId, Result<CellId, JoinError>)>,
    pub left: Vec<OwnerId>,
    pub fragments_split: usize,
    pub pellets_ejected: usize,
    pub collisions: CollisionOutcome,
    pub merges: MergeOutcome,
    pub bots_respawned: usize,
    pub viruses_respawned: usize,
    pub food_spawned: bool,
    /// Non-finite values repaired after the tick
    pub repaired: usize,
}

/// Advance `world` by `dt` seconds, applying `intents` first
pub fn step(world: &mut World, ai: &mut AiManager, intents: &IntentTable, dt: f32) -> TickReport {
    world.tick += 1;
    world.time_ms += dt as f64 * 1000.0;
    let mut report = TickReport {
        tick: world.tick,
        ..TickReport::default()
    };

    run_scheduled(world, &mut report);
    for (owner, pending) in intents {
        apply_intent(world, *owner, pending, &mut report);
    }

    movement::update(world, dt);
    food::update_ejected(world, dt);
    food::grow_viruses(world);

    report.collisions = collision::resolve(world);

    report.merges = merge::update(world, dt);
    soft_body::update(world, dt);

    ai.sync(world);
    ai.update(world);

    movement::apply_decay(world, dt);
    report.food_spawned = food::spawn(world, dt);

    report.repaired = world.sanitize();
    report
}

fn run_scheduled(world: &mut World, report: &mut TickReport) {
    for event in world.schedule.drain_due(world.time_ms) {
        match event {
            ScheduledEvent::RespawnBot(owner) => {
                if let Some(cell) = world.spawn_bot_cell(owner) {
                    debug!("Bot {} respawned as cell {}", owner, cell);
                    report.bots_respawned += 1;
                }
            }
            ScheduledEvent::SpawnVirus => {
                if world.viruses.len() < world.config.max_viruses {
                    let id = world.spawn_virus(false);
                    debug!("Virus {} respawned", id);
                    report.viruses_respawned += 1;
                }
            }
        }
    }
}

fn apply_intent(world: &mut World, owner_id: OwnerId, pending: &PendingIntent, report: &mut TickReport) {
    if world.owner(owner_id).is_some_and(|o| o.is_bot()) {
        return;
    }
    if pending.leave {
        if world.remove_owner(owner_id) {
            info!("Owner {} left", owner_id);
        }
        report.left.push(owner_id);
        return;
    }
    if let Some(name) = &pending.join {
        let result = world.add_human(owner_id, name.clone());
        match &result {
            Ok(cell) => info!("{} joined as {} (cell {})", name, owner_id, cell),
            Err(e) => debug!("Join for {} ignored: {}", owner_id, e),
        }
        report.joins.push((owner_id, result));
    }

    let Some(owner) = world.owner(owner_id) else {
        return;
    };
    if owner.is_eliminated() {
        return;
    }
    if let Some(target) = pending.target.filter(|t| t.is_finite()) {
        let target = target.clamp_box(Vec2::ZERO, Vec2::new(world.width(), world.height()));
        if let Some(owner) = world.owner_mut(owner_id) {
            owner.steering = Steering::Seek(target);
            owner.aim = Some(target);
        }
    }
    if pending.split {
        report.fragments_split += split::split_owner(world, owner_id).len();
    }
    if pending.eject && split::eject_mass(world, owner_id).is_some() {
        report.pellets_ejected += 1;
    }
}

/// Owners ranked by total living mass, heaviest first
pub fn leaderboard(world: &World, limit: usize) -> Vec<(String, f32)> {
    let mut ranking: Vec<(String, f32)> = world
        .owners()
        .filter(|o| !o.is_eliminated())
        .map(|o| (o.name.clone(), world.owner_mass(o.id)))
        .collect();
    ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranking.truncate(limit);
    ranking
}

/// A populated world driven by buffered intents
pub struct GameLoop {
    world: World,
    ai: AiManager,
    input: InputBuffer,
    dt: f32,
}

impl GameLoop {
    pub fn new(config: SimConfig) -> Self {
        let dt = config.dt();
        let mut world = World::new(config);
        world.populate();
        let mut ai = AiManager::new(world.config.seed);
        ai.sync(&world);
        info!(
            "World {}x{} ready: {} bots, {} food, {} viruses",
            world.width(),
            world.height(),
            world.bot_count(),
            world.food.len(),
            world.viruses.len()
        );
        Self {
            world,
            ai,
            input: InputBuffer::default(),
            dt,
        }
    }

    /// Sender handle for a connection
    pub fn sender(&self) -> InputSender {
        self.input.sender()
    }

    /// Queue an intent for the next tick; false if the buffer is full
    pub fn submit(&self, owner: OwnerId, intent: Intent) -> bool {
        self.input.try_submit(owner, intent)
    }

    /// Drain buffered intents and run one tick
    pub fn tick(&mut self) -> TickReport {
        let intents = self.input.drain_coalesced();
        step(&mut self.world, &mut self.ai, &intents, self.dt)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn ai(&self) -> &AiManager {
        &self.ai
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }
}
