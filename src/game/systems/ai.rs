use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::game::constants::bot::*;
use crate::game::state::{BotArchetype, BotTraits, Cell, CellId, EntityId, OwnerId, Steering, World};
use crate::util::vec2::Vec2;

/// What a bot is currently steering toward
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BotTarget {
    Food(EntityId),
    Cell(CellId),
    /// Synthetic point ahead of the bot; re-evaluated every tick
    Wander(Vec2),
}

/// Per-bot decision state
#[derive(Debug, Clone)]
pub struct BotBrain {
    pub target: Option<BotTarget>,
    pub next_retarget_ms: f64,
    pub wander_angle: f32,
    pub fleeing: bool,
    rng: StdRng,
}

impl BotBrain {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            target: None,
            next_retarget_ms: 0.0,
            wander_angle: rng.gen_range(0.0..std::f32::consts::TAU),
            fleeing: false,
            rng,
        }
    }
}

/// Steering chosen for one bot this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BotDecision {
    pub steering: Steering,
    pub aim: Vec2,
}

/// Decision state for every bot in the world
pub struct AiManager {
    states: HashMap<OwnerId, BotBrain>,
    rng: StdRng,
}

impl AiManager {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ 0x5eed_b075),
            None => StdRng::from_entropy(),
        };
        Self {
            states: HashMap::new(),
            rng,
        }
    }

    pub fn register_bot(&mut self, owner: OwnerId) {
        let seed = self.rng.gen();
        self.states.entry(owner).or_insert_with(|| BotBrain::new(seed));
    }

    pub fn unregister_bot(&mut self, owner: OwnerId) {
        self.states.remove(&owner);
    }

    pub fn get(&self, owner: OwnerId) -> Option<&BotBrain> {
        self.states.get(&owner)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Track the world's bot population: register new bots, forget removed ones
    pub fn sync(&mut self, world: &World) {
        self.states
            .retain(|id, _| world.owner(*id).is_some_and(|o| o.is_bot()));
        let missing: Vec<OwnerId> = world
            .owners()
            .filter(|o| o.is_bot() && !self.states.contains_key(&o.id))
            .map(|o| o.id)
            .collect();
        for id in missing {
            self.register_bot(id);
        }
    }

    /// Decide every bot in parallel against the read-only world, then write
    /// the resulting steering back to the owners
    pub fn update(&mut self, world: &mut World) {
        let decisions: Vec<(OwnerId, Option<BotDecision>)> = {
            let view: &World = world;
            self.states
                .par_iter_mut()
                .map(|(&id, brain)| (id, decide(brain, id, view)))
                .collect()
        };

        for (id, decision) in decisions {
            let Some(owner) = world.owner_mut(id) else {
                continue;
            };
            match decision {
                Some(d) => {
                    owner.steering = d.steering;
                    owner.aim = Some(d.aim);
                }
                None => owner.steering = Steering::Idle,
            }
        }
    }
}

impl Default for AiManager {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Decide a single bot. Returns `None` while the bot has no living cell.
pub fn decide(brain: &mut BotBrain, id: OwnerId, world: &World) -> Option<BotDecision> {
    let owner = world.owner(id)?;
    let traits = owner.bot?;
    let Some(me) = world.primary_of(id).filter(|c| c.alive) else {
        brain.target = None;
        brain.fleeing = false;
        return None;
    };

    if let Some(away) = retreat_vector(world, me) {
        if brain.rng.gen::<f32>() < traits.fear {
            brain.fleeing = true;
            return Some(BotDecision {
                steering: Steering::Flee(away),
                aim: me.position + away * WANDER_DISTANCE,
            });
        }
    }
    brain.fleeing = false;

    let now = world.time_ms;
    let stale = brain.target.map_or(true, |t| !target_valid(world, me, t));
    if stale || now >= brain.next_retarget_ms {
        brain.target = Some(select_target(brain, traits, me, world));
        brain.next_retarget_ms = now + RETARGET_MIN_MS + brain.rng.gen_range(0.0..RETARGET_JITTER_MS);
    }

    let point = brain
        .target
        .and_then(|t| target_position(world, t))
        .unwrap_or(me.position);
    Some(BotDecision {
        steering: Steering::Seek(point),
        aim: point,
    })
}

/// Detection radius for a threat `ratio` times our mass
pub fn threat_radius(ratio: f32) -> f32 {
    if ratio > LARGE_THREAT_RATIO {
        THREAT_RADIUS_LARGE
    } else if ratio > THREAT_RATIO {
        THREAT_RADIUS_EDIBLE
    } else {
        THREAT_RADIUS
    }
}

/// Inverse-distance weighted escape direction away from every nearby cell
/// that could eat `me`, or `None` when nothing threatens it
pub fn retreat_vector(world: &World, me: &Cell) -> Option<Vec2> {
    let mut away = Vec2::ZERO;
    let mut found = false;
    for other in world.alive_cells().filter(|c| c.owner != me.owner) {
        let ratio = other.mass() / me.mass();
        if ratio <= THREAT_RATIO {
            continue;
        }
        let (dir, distance) = (me.position - other.position).normalize_with_length();
        if distance < threat_radius(ratio) {
            away += dir * (1.0 / (distance + 1.0));
            found = true;
        }
    }
    found.then(|| away.normalize()).filter(|v| *v != Vec2::ZERO)
}

fn target_valid(world: &World, me: &Cell, target: BotTarget) -> bool {
    match target {
        BotTarget::Food(id) => world.food.iter().any(|f| f.id == id),
        BotTarget::Cell(id) => world
            .cell(id)
            .is_some_and(|c| c.alive && c.owner != me.owner && c.mass() <= me.mass() * MAX_TARGET_RATIO),
        BotTarget::Wander(_) => false,
    }
}

fn target_position(world: &World, target: BotTarget) -> Option<Vec2> {
    match target {
        BotTarget::Food(id) => world.food.iter().find(|f| f.id == id).map(|f| f.position),
        BotTarget::Cell(id) => world.cell(id).map(|c| c.position),
        BotTarget::Wander(point) => Some(point),
    }
}

/// Highest scoring food or cell; a wander point when there is none
fn select_target(brain: &mut BotBrain, traits: BotTraits, me: &Cell, world: &World) -> BotTarget {
    let mut best: Option<(BotTarget, f32)> = None;
    let mut consider = |target: BotTarget, score: f32| {
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((target, score));
        }
    };

    for food in &world.food {
        let distance = me.position.distance_to(food.position);
        consider(BotTarget::Food(food.id), FOOD_SCORE / (distance + 1.0));
    }

    for other in world.alive_cells().filter(|c| c.owner != me.owner) {
        if other.mass() > me.mass() * MAX_TARGET_RATIO {
            continue;
        }
        let distance = me.position.distance_to(other.position);
        let ratio = other.mass() / me.mass();
        if me.mass() > other.mass() * EDIBLE_RATIO {
            if brain.rng.gen::<f32>() < traits.aggression {
                consider(BotTarget::Cell(other.id), PREY_SCORE / (distance + 1.0) * (1.0 - ratio));
            }
        } else if traits.archetype == BotArchetype::Opportunistic
            && (other.mass() - me.mass()).abs() < NEAR_EQUAL_MASS
        {
            consider(BotTarget::Cell(other.id), OPPORTUNISTIC_SCORE / (distance + 1.0));
        }
    }

    match best {
        Some((target, _)) => target,
        None => {
            brain.wander_angle += brain.rng.gen_range(-WANDER_TURN * 0.5..WANDER_TURN * 0.5);
            let ahead = me.position + Vec2::from_angle(brain.wander_angle) * WANDER_DISTANCE;
            BotTarget::Wander(world.clamp_circle(ahead, me.radius()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::tests::{add_test_human, create_test_world};
    use crate::game::state::Food;

    fn create_bot(world: &mut World, position: Vec2, mass: f32, fear: f32, aggression: f32) -> OwnerId {
        let id = world.add_bot();
        let traits = {
            let owner = world.owner_mut(id).unwrap();
            let traits = owner.bot.as_mut().unwrap();
            traits.fear = fear;
            traits.aggression = aggression;
            *traits
        };
        let cell = world.owner(id).unwrap().primary.unwrap();
        let c = world.cell_mut(cell).unwrap();
        c.position = position;
        c.set_mass(mass);
        c.kind = crate::game::state::CellKind::Bot(traits);
        id
    }

    #[test]
    fn test_manager_register_and_sync() {
        let mut world = create_test_world();
        let bot = world.add_bot();
        let mut manager = AiManager::new(Some(1));
        manager.sync(&world);
        assert!(manager.get(bot).is_some());

        world.remove_owner(bot);
        manager.sync(&world);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_bot_seeks_nearest_food() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(500.0, 500.0), 50.0, 0.0, 0.0);
        let near = world.next_entity_id();
        world.food.push(Food::pellet(near, Vec2::new(540.0, 500.0), "#fff".into()));
        let far = world.next_entity_id();
        world.food.push(Food::pellet(far, Vec2::new(900.0, 900.0), "#fff".into()));

        let mut brain = BotBrain::new(1);
        let decision = decide(&mut brain, bot, &world).unwrap();
        assert_eq!(brain.target, Some(BotTarget::Food(near)));
        assert_eq!(decision.steering, Steering::Seek(Vec2::new(540.0, 500.0)));
        assert!(brain.next_retarget_ms >= RETARGET_MIN_MS);
        assert!(brain.next_retarget_ms < RETARGET_MIN_MS + RETARGET_JITTER_MS);
    }

    #[test]
    fn test_aggressive_bot_hunts_prey() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(500.0, 500.0), 100.0, 0.0, 1.0);
        let (_, prey) = add_test_human(&mut world, Vec2::new(600.0, 500.0), 30.0);
        let pellet = world.next_entity_id();
        world.food.push(Food::pellet(pellet, Vec2::new(800.0, 500.0), "#fff".into()));

        let mut brain = BotBrain::new(2);
        decide(&mut brain, bot, &world);
        assert_eq!(brain.target, Some(BotTarget::Cell(prey)));
    }

    #[test]
    fn test_oversized_cells_never_targeted() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(500.0, 500.0), 50.0, 0.0, 1.0);
        add_test_human(&mut world, Vec2::new(1500.0, 1500.0), 150.0);

        let mut brain = BotBrain::new(3);
        decide(&mut brain, bot, &world);
        assert!(matches!(brain.target, Some(BotTarget::Wander(_))));
    }

    #[test]
    fn test_wander_point_projected_ahead() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(1000.0, 1000.0), 50.0, 0.0, 0.0);
        let mut brain = BotBrain::new(4);
        let first_angle = brain.wander_angle;
        let decision = decide(&mut brain, bot, &world).unwrap();
        let Steering::Seek(point) = decision.steering else {
            panic!("expected seek, got {:?}", decision.steering);
        };
        assert!((point.distance_to(Vec2::new(1000.0, 1000.0)) - WANDER_DISTANCE).abs() < 1e-3);
        assert!((brain.wander_angle - first_angle).abs() <= WANDER_TURN * 0.5);

        // Wander targets are invalid, so the angle keeps drifting each tick
        decide(&mut brain, bot, &world);
        assert_ne!(brain.wander_angle, first_angle);
    }

    #[test]
    fn test_stale_target_replaced() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(500.0, 500.0), 50.0, 0.0, 0.0);
        let a = world.next_entity_id();
        world.food.push(Food::pellet(a, Vec2::new(520.0, 500.0), "#fff".into()));
        let b = world.next_entity_id();
        world.food.push(Food::pellet(b, Vec2::new(600.0, 500.0), "#fff".into()));

        let mut brain = BotBrain::new(5);
        decide(&mut brain, bot, &world);
        assert_eq!(brain.target, Some(BotTarget::Food(a)));
        world.food.retain(|f| f.id != a);
        decide(&mut brain, bot, &world);
        assert_eq!(brain.target, Some(BotTarget::Food(b)));
    }

    #[test]
    fn test_threat_radius_widens() {
        assert_eq!(threat_radius(1.0), THREAT_RADIUS);
        assert_eq!(threat_radius(1.5), THREAT_RADIUS_EDIBLE);
        assert_eq!(threat_radius(2.5), THREAT_RADIUS_LARGE);
    }

    #[test]
    fn test_fearful_bot_flees_threat() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(1000.0, 1000.0), 100.0, 1.0, 0.0);
        add_test_human(&mut world, Vec2::new(1150.0, 1000.0), 250.0);

        let mut brain = BotBrain::new(6);
        let decision = decide(&mut brain, bot, &world).unwrap();
        let Steering::Flee(dir) = decision.steering else {
            panic!("expected flee, got {:?}", decision.steering);
        };
        assert!(dir.x < -0.99);
        assert!(brain.fleeing);
    }

    #[test]
    fn test_fearless_bot_ignores_threat() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(1000.0, 1000.0), 100.0, 0.0, 0.0);
        add_test_human(&mut world, Vec2::new(1150.0, 1000.0), 250.0);

        let mut brain = BotBrain::new(7);
        let decision = decide(&mut brain, bot, &world).unwrap();
        assert!(matches!(decision.steering, Steering::Seek(_)));
    }

    #[test]
    fn test_distant_threat_ignored() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(300.0, 300.0), 100.0, 1.0, 0.0);
        add_test_human(&mut world, Vec2::new(1500.0, 1500.0), 250.0);
        let me = world.primary_of(bot).unwrap();
        assert!(retreat_vector(&world, me).is_none());
    }

    #[test]
    fn test_update_writes_owner_steering() {
        let mut world = create_test_world();
        let bot = create_bot(&mut world, Vec2::new(500.0, 500.0), 50.0, 0.0, 0.0);
        let mut manager = AiManager::new(Some(9));
        manager.sync(&world);
        manager.update(&mut world);
        let owner = world.owner(bot).unwrap();
        assert!(matches!(owner.steering, Steering::Seek(_)));
        assert!(owner.aim.is_some());
    }
}
