//! World state and entity definitions
//!
//! The [`World`] owns every cell, pellet and virus. Cells reference their
//! owner by id only; owners list the ids of their living cells.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::config::SimConfig;
use crate::game::constants::bot as bot_consts;
use crate::game::constants::{food, mass, mass_to_radius, spawn, split, virus};
use crate::game::error::JoinError;
use crate::game::schedule::{Schedule, ScheduledEvent};
use crate::util::vec2::Vec2;

/// Persistent identity of a human connection or bot slot
pub type OwnerId = Uuid;

/// Identifier of a single cell
pub type CellId = u64;

/// Identifier for pellets and viruses
pub type EntityId = u64;

/// Who steers an owner's cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Controller {
    Human,
    Bot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotArchetype {
    Aggressive,
    Passive,
    Balanced,
    Opportunistic,
}

impl BotArchetype {
    pub const ALL: [BotArchetype; 4] = [
        BotArchetype::Aggressive,
        BotArchetype::Passive,
        BotArchetype::Balanced,
        BotArchetype::Opportunistic,
    ];

    /// Round-robin assignment by bot slot
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    pub fn traits(self) -> BotTraits {
        let (aggression, fear) = match self {
            BotArchetype::Aggressive => (0.9, 0.2),
            BotArchetype::Passive => (0.1, 0.8),
            BotArchetype::Balanced => (0.5, 0.5),
            BotArchetype::Opportunistic => (0.3, 0.6),
        };
        BotTraits {
            archetype: self,
            aggression,
            fear,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            BotArchetype::Aggressive => "#ff4444",
            BotArchetype::Passive => "#4444ff",
            BotArchetype::Balanced => "#44ff44",
            BotArchetype::Opportunistic => "#ffff44",
        }
    }
}

/// Static personality of a bot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BotTraits {
    pub archetype: BotArchetype,
    /// Probability of adding edible cells to the candidate list
    pub aggression: f32,
    /// Probability of fleeing when a threat is detected
    pub fear: f32,
}

/// Role of a cell within its owner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CellKind {
    Human,
    Bot(BotTraits),
    /// A split piece; the owner keeps its identity through `Cell::owner`
    Fragment { controller: Controller },
}

impl CellKind {
    pub fn controller(&self) -> Controller {
        match self {
            CellKind::Human => Controller::Human,
            CellKind::Bot(_) => Controller::Bot,
            CellKind::Fragment { controller } => *controller,
        }
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, CellKind::Fragment { .. })
    }
}

/// Split cooldown bookkeeping, stamped on every split
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitCooldown {
    pub base_ms: f64,
    /// Extra time scaled by the mass at split
    pub extra_ms: f64,
    pub expires_at_ms: f64,
}

impl SplitCooldown {
    pub fn for_mass(mass: f32, now_ms: f64) -> Self {
        let steps = (mass / split::COOLDOWN_MASS_STEP).floor().max(0.0) as f64;
        let extra_ms = steps * split::COOLDOWN_STEP_MS;
        Self {
            base_ms: split::COOLDOWN_BASE_MS,
            extra_ms,
            expires_at_ms: now_ms + split::COOLDOWN_BASE_MS + extra_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitHistory {
    /// Simulation time of the last split involving this cell
    pub last_split_ms: Option<f64>,
    /// Mass of the cell that split
    pub original_mass: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeState {
    /// Paired cell; always symmetric
    pub partner: Option<CellId>,
    pub remaining_ms: f64,
    /// Separation when the pair was flagged
    pub start_distance: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementState {
    pub is_still: bool,
    pub still_ms: f64,
    /// Post-merge grace period remaining
    pub grace_ms: f64,
}

/// A mass-bearing circular body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub owner: OwnerId,
    pub kind: CellKind,
    pub position: Vec2,
    pub velocity: Vec2,
    mass: f32,
    radius: f32,
    pub alive: bool,
    /// Cumulative mass and prey score
    pub score: f64,
    pub split_cooldown: SplitCooldown,
    pub split_history: SplitHistory,
    pub merge: MergeState,
    pub movement: MovementState,
    pub color: String,
    pub name: String,
}

impl Cell {
    pub fn new(
        id: CellId,
        owner: OwnerId,
        kind: CellKind,
        position: Vec2,
        mass: f32,
        color: String,
        name: String,
    ) -> Self {
        Self {
            id,
            owner,
            kind,
            position,
            velocity: Vec2::ZERO,
            mass,
            radius: mass_to_radius(mass),
            alive: true,
            score: 0.0,
            split_cooldown: SplitCooldown::default(),
            split_history: SplitHistory::default(),
            merge: MergeState::default(),
            movement: MovementState::default(),
            color,
            name,
        }
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Always `mass_to_radius(mass)`
    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
        self.recompute_radius();
    }

    pub fn add_mass(&mut self, delta: f32) {
        self.set_mass(self.mass + delta);
    }

    pub fn recompute_radius(&mut self) {
        self.radius = mass_to_radius(self.mass);
    }

    pub fn controller(&self) -> Controller {
        self.kind.controller()
    }

    pub fn is_fragment(&self) -> bool {
        self.kind.is_fragment()
    }

    pub fn is_merging(&self) -> bool {
        self.merge.partner.is_some()
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }
}

/// Pellet; either a regular spawn or ejected mass still in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub id: EntityId,
    pub position: Vec2,
    /// Units per second; zero for regular pellets
    pub velocity: Vec2,
    pub radius: f32,
    pub mass: f32,
    pub color: String,
    pub ejected: bool,
}

impl Food {
    pub fn pellet(id: EntityId, position: Vec2, color: String) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            radius: food::RADIUS,
            mass: food::MASS,
            color,
            ejected: false,
        }
    }

    pub fn ejected(id: EntityId, position: Vec2, velocity: Vec2, mass: f32, color: String) -> Self {
        use crate::game::constants::eject;
        Self {
            id,
            position,
            velocity,
            radius: mass.sqrt().max(eject::MIN_RADIUS),
            mass,
            color,
            ejected: true,
        }
    }
}

/// Stationary hazard that grows from `START_RADIUS` to `FULL_RADIUS`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Virus {
    pub id: EntityId,
    pub position: Vec2,
    pub radius: f32,
    pub spawned_at_ms: f64,
}

impl Virus {
    pub fn new(id: EntityId, position: Vec2, now_ms: f64) -> Self {
        Self {
            id,
            position,
            radius: virus::START_RADIUS,
            spawned_at_ms: now_ms,
        }
    }

    /// A virus that finished growing before `now_ms`
    pub fn grown(id: EntityId, position: Vec2, now_ms: f64) -> Self {
        Self {
            id,
            position,
            radius: virus::FULL_RADIUS,
            spawned_at_ms: now_ms - virus::GROWTH_MS,
        }
    }

    pub fn update_growth(&mut self, now_ms: f64) {
        let progress = ((now_ms - self.spawned_at_ms) / virus::GROWTH_MS).clamp(0.0, 1.0) as f32;
        self.radius = virus::START_RADIUS + (virus::FULL_RADIUS - virus::START_RADIUS) * progress;
    }

    /// Only fully grown viruses split cells
    pub fn is_dangerous(&self) -> bool {
        self.radius >= virus::FULL_RADIUS
    }
}

/// Steering goal shared by all of an owner's cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum Steering {
    #[default]
    Idle,
    /// Move toward a world point
    Seek(Vec2),
    /// Move along a unit direction at flee speed
    Flee(Vec2),
}

/// An identity controlling 0-16 cells
#[derive(Debug, Clone)]
pub struct Owner {
    pub id: OwnerId,
    pub name: String,
    pub color: String,
    /// Present for bots
    pub bot: Option<BotTraits>,
    pub primary: Option<CellId>,
    /// Living cells, primary included
    pub cells: SmallVec<[CellId; 16]>,
    pub steering: Steering,
    /// Last target point; split and eject aim here
    pub aim: Option<Vec2>,
    pub last_eject_ms: Option<f64>,
}

impl Owner {
    pub fn new(id: OwnerId, name: String, color: String, bot: Option<BotTraits>) -> Self {
        Self {
            id,
            name,
            color,
            bot,
            primary: None,
            cells: SmallVec::new(),
            steering: Steering::Idle,
            aim: None,
            last_eject_ms: None,
        }
    }

    pub fn controller(&self) -> Controller {
        if self.bot.is_some() {
            Controller::Bot
        } else {
            Controller::Human
        }
    }

    pub fn is_bot(&self) -> bool {
        self.bot.is_some()
    }

    /// No living cells remain
    pub fn is_eliminated(&self) -> bool {
        self.cells.is_empty()
    }

    fn primary_kind(&self) -> CellKind {
        match self.bot {
            Some(traits) => CellKind::Bot(traits),
            None => CellKind::Human,
        }
    }
}

/// What happened to the owner when one of its cells died
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellLoss {
    /// Other cells remain; the primary (possibly promoted) is `primary`
    Survived { primary: Option<CellId> },
    /// The owner has no cells left
    Eliminated,
}

/// Authoritative simulation state
#[derive(Debug, Clone)]
pub struct World {
    pub config: SimConfig,
    pub tick: u64,
    /// Simulation clock in milliseconds
    pub time_ms: f64,
    /// Sorted by id (ids are allocated increasing)
    cells: Vec<Cell>,
    owners: BTreeMap<OwnerId, Owner>,
    pub food: Vec<Food>,
    pub viruses: Vec<Virus>,
    pub schedule: Schedule,
    pub rng: StdRng,
    next_entity_id: u64,
    next_bot_index: usize,
}

impl World {
    /// Empty world; see [`World::populate`] for the initial food, viruses and bots
    pub fn new(config: SimConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            tick: 0,
            time_ms: 0.0,
            cells: Vec::with_capacity(256),
            owners: BTreeMap::new(),
            food: Vec::with_capacity(256),
            viruses: Vec::with_capacity(16),
            schedule: Schedule::new(),
            rng,
            next_entity_id: 1,
            next_bot_index: 0,
        }
    }

    /// Fill the arena: food up to the cap, grown viruses and the configured bots
    pub fn populate(&mut self) {
        while self.food.len() < self.config.max_food {
            self.spawn_pellet();
        }
        for _ in 0..self.config.virus_count {
            self.spawn_virus(true);
        }
        for _ in 0..self.config.bot_count {
            self.add_bot();
        }
    }

    pub fn width(&self) -> f32 {
        self.config.world_width
    }

    pub fn height(&self) -> f32 {
        self.config.world_height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width() * 0.5, self.height() * 0.5)
    }

    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn random_position(&mut self, margin: f32) -> Vec2 {
        let max_x = (self.width() - margin).max(margin);
        let max_y = (self.height() - margin).max(margin);
        let x = if max_x > margin { self.rng.gen_range(margin..max_x) } else { margin };
        let y = if max_y > margin { self.rng.gen_range(margin..max_y) } else { margin };
        Vec2::new(x, y)
    }

    /// Clamp a circle so it lies entirely inside the arena
    pub fn clamp_circle(&self, position: Vec2, radius: f32) -> Vec2 {
        position.clamp_box(
            Vec2::new(radius, radius),
            Vec2::new(self.width() - radius, self.height() - radius),
        )
    }

    // === Cells ===

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Cells and the world RNG borrowed together
    pub fn cells_and_rng_mut(&mut self) -> (&mut [Cell], &mut StdRng) {
        (&mut self.cells, &mut self.rng)
    }

    pub fn alive_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.alive)
    }

    pub fn cell_index(&self, id: CellId) -> Option<usize> {
        self.cells.binary_search_by_key(&id, |c| c.id).ok()
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cell_index(id).map(|i| &self.cells[i])
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cell_index(id).map(move |i| &mut self.cells[i])
    }

    /// Mutable access to two distinct cells
    pub fn cell_pair_mut(&mut self, a: CellId, b: CellId) -> Option<(&mut Cell, &mut Cell)> {
        let ia = self.cell_index(a)?;
        let ib = self.cell_index(b)?;
        pair_mut(&mut self.cells, ia, ib)
    }

    pub fn is_alive(&self, id: CellId) -> bool {
        self.cell(id).is_some_and(|c| c.alive)
    }

    /// Add a cell to `owner`, honouring the per-owner cap. The first cell
    /// becomes the primary.
    pub fn insert_cell(
        &mut self,
        owner_id: OwnerId,
        kind: CellKind,
        position: Vec2,
        mass: f32,
        velocity: Vec2,
    ) -> Option<CellId> {
        let (color, name) = {
            let owner = self.owners.get(&owner_id)?;
            if owner.cells.len() >= split::MAX_CELLS {
                return None;
            }
            (owner.color.clone(), owner.name.clone())
        };
        let id = self.next_entity_id();
        let mut cell = Cell::new(id, owner_id, kind, position, mass, color, name);
        cell.velocity = velocity;
        self.cells.push(cell);

        if let Some(owner) = self.owners.get_mut(&owner_id) {
            owner.cells.push(id);
            if owner.primary.is_none() {
                owner.primary = Some(id);
            }
        }
        Some(id)
    }

    /// Mark a cell dead, detach it from its owner and merge partner, and
    /// promote the heaviest survivor if the primary was lost. Dead cells stay
    /// in storage until [`World::purge_dead`].
    pub fn kill_cell(&mut self, id: CellId) -> Option<CellLoss> {
        let (owner_id, partner) = {
            let cell = self.cell_mut(id)?;
            if !cell.alive {
                return None;
            }
            cell.alive = false;
            let partner = cell.merge.partner.take();
            (cell.owner, partner)
        };
        if let Some(partner) = partner {
            if let Some(p) = self.cell_mut(partner) {
                p.merge = MergeState::default();
            }
        }

        let owner = self.owners.get_mut(&owner_id)?;
        owner.cells.retain(|c| *c != id);
        if owner.cells.is_empty() {
            owner.primary = None;
            if let Some(traits) = owner.bot {
                tracing::debug!("Bot {} ({:?}) eliminated", owner.name, traits.archetype);
                let due = self.time_ms + bot_consts::RESPAWN_MS;
                self.schedule.push(due, ScheduledEvent::RespawnBot(owner_id));
            }
            return Some(CellLoss::Eliminated);
        }
        if owner.primary == Some(id) {
            self.promote_primary(owner_id);
        }
        let primary = self.owners.get(&owner_id).and_then(|o| o.primary);
        Some(CellLoss::Survived { primary })
    }

    fn promote_primary(&mut self, owner_id: OwnerId) {
        let Some(owner) = self.owners.get(&owner_id) else {
            return;
        };
        let kind = owner.primary_kind();
        let heaviest = owner
            .cells
            .iter()
            .filter_map(|id| self.cell(*id))
            .max_by(|a, b| a.mass().total_cmp(&b.mass()).then_with(|| b.id.cmp(&a.id)))
            .map(|c| c.id);

        if let Some(new_primary) = heaviest {
            if let Some(cell) = self.cell_mut(new_primary) {
                cell.kind = kind;
            }
            if let Some(owner) = self.owners.get_mut(&owner_id) {
                owner.primary = Some(new_primary);
            }
        }
    }

    /// Drop dead cells from storage
    pub fn purge_dead(&mut self) -> usize {
        let before = self.cells.len();
        self.cells.retain(|c| c.alive);
        before - self.cells.len()
    }

    /// Clear the merge pairing of `id` and its partner
    pub fn clear_merge(&mut self, id: CellId) {
        let partner = self.cell_mut(id).and_then(|c| {
            let partner = c.merge.partner;
            c.merge = MergeState::default();
            partner
        });
        if let Some(partner) = partner {
            if let Some(p) = self.cell_mut(partner) {
                p.merge = MergeState::default();
            }
        }
    }

    // === Owners ===

    pub fn owner(&self, id: OwnerId) -> Option<&Owner> {
        self.owners.get(&id)
    }

    pub fn owner_mut(&mut self, id: OwnerId) -> Option<&mut Owner> {
        self.owners.get_mut(&id)
    }

    /// Owners in id order
    pub fn owners(&self) -> impl Iterator<Item = &Owner> {
        self.owners.values()
    }

    pub fn owner_ids(&self) -> Vec<OwnerId> {
        self.owners.keys().copied().collect()
    }

    pub fn primary_of(&self, owner: OwnerId) -> Option<&Cell> {
        self.owners.get(&owner)?.primary.and_then(|id| self.cell(id))
    }

    /// Living cell ids of an owner
    pub fn owner_cells(&self, owner: OwnerId) -> SmallVec<[CellId; 16]> {
        self.owners
            .get(&owner)
            .map(|o| o.cells.clone())
            .unwrap_or_default()
    }

    pub fn owner_mass(&self, owner: OwnerId) -> f32 {
        self.owner_cells(owner)
            .iter()
            .filter_map(|id| self.cell(*id))
            .map(|c| c.mass())
            .sum()
    }

    pub fn human_count(&self) -> usize {
        self.owners.values().filter(|o| !o.is_bot()).count()
    }

    pub fn bot_count(&self) -> usize {
        self.owners.values().filter(|o| o.is_bot()).count()
    }

    /// Create or revive a human owner with a fresh primary near the centre
    pub fn add_human(&mut self, owner_id: OwnerId, name: String) -> Result<CellId, JoinError> {
        if let Some(owner) = self.owners.get_mut(&owner_id) {
            if !owner.is_eliminated() {
                return Err(JoinError::AlreadyAlive(owner_id));
            }
            owner.name = name;
            owner.steering = Steering::Idle;
            owner.aim = None;
        } else {
            let color = spawn::HUMAN_PALETTE[self.rng.gen_range(0..spawn::HUMAN_PALETTE.len())];
            self.owners
                .insert(owner_id, Owner::new(owner_id, name, color.to_string(), None));
        }

        let offset = Vec2::new(
            self.rng.gen_range(-spawn::HUMAN_SPREAD..=spawn::HUMAN_SPREAD),
            self.rng.gen_range(-spawn::HUMAN_SPREAD..=spawn::HUMAN_SPREAD),
        );
        let position = self.clamp_circle(self.center() + offset, mass_to_radius(mass::MINIMUM));
        self.insert_cell(owner_id, CellKind::Human, position, mass::MINIMUM, Vec2::ZERO)
            .ok_or(JoinError::AlreadyAlive(owner_id))
    }

    /// Register a new bot with the next round-robin archetype and spawn it
    pub fn add_bot(&mut self) -> OwnerId {
        let index = self.next_bot_index;
        self.next_bot_index += 1;
        let archetype = BotArchetype::from_index(index);
        let id = uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid();
        let owner = Owner::new(
            id,
            format!("Bot {}", index + 1),
            archetype.color().to_string(),
            Some(archetype.traits()),
        );
        self.owners.insert(id, owner);
        self.spawn_bot_cell(id);
        id
    }

    /// Give an eliminated bot a new primary at a random location
    pub fn spawn_bot_cell(&mut self, owner_id: OwnerId) -> Option<CellId> {
        let traits = {
            let owner = self.owners.get_mut(&owner_id)?;
            if !owner.is_eliminated() {
                return None;
            }
            owner.steering = Steering::Idle;
            owner.aim = None;
            owner.bot?
        };
        let mass = mass::MINIMUM + self.rng.gen_range(0.0..mass::BOT_SPAWN_JITTER);
        let position = self.random_position(mass_to_radius(mass) + 50.0);
        self.insert_cell(owner_id, CellKind::Bot(traits), position, mass, Vec2::ZERO)
    }

    /// Remove an owner and all of its cells. Returns false if unknown.
    pub fn remove_owner(&mut self, owner_id: OwnerId) -> bool {
        let Some(owner) = self.owners.remove(&owner_id) else {
            return false;
        };
        for id in owner.cells {
            self.clear_merge(id);
            if let Some(cell) = self.cell_mut(id) {
                cell.alive = false;
            }
        }
        self.schedule
            .cancel(|e| *e == ScheduledEvent::RespawnBot(owner_id));
        self.purge_dead();
        true
    }

    // === Food & viruses ===

    pub fn spawn_pellet(&mut self) -> EntityId {
        let id = self.next_entity_id();
        let position = self.random_position(food::RADIUS);
        let color = food::PALETTE[self.rng.gen_range(0..food::PALETTE.len())];
        self.food.push(Food::pellet(id, position, color.to_string()));
        id
    }

    pub fn spawn_virus(&mut self, grown: bool) -> EntityId {
        let id = self.next_entity_id();
        let position = self.random_position(virus::FULL_RADIUS + 50.0);
        let virus = if grown {
            Virus::grown(id, position, self.time_ms)
        } else {
            Virus::new(id, position, self.time_ms)
        };
        self.viruses.push(virus);
        id
    }

    /// Replace non-finite positions, velocities and masses. Returns the number of repairs.
    pub fn sanitize(&mut self) -> usize {
        let center = self.center();
        let mut repaired = 0;
        for cell in self.cells.iter_mut() {
            if !cell.position.is_finite() {
                cell.position = center;
                repaired += 1;
            }
            if !cell.velocity.is_finite() {
                cell.velocity = Vec2::ZERO;
                repaired += 1;
            }
            if !cell.mass().is_finite() || cell.mass() <= 0.0 {
                cell.set_mass(mass::MINIMUM);
                repaired += 1;
            }
        }
        for pellet in self.food.iter_mut() {
            if !pellet.position.is_finite() || !pellet.velocity.is_finite() {
                pellet.position = center;
                pellet.velocity = Vec2::ZERO;
                repaired += 1;
            }
        }
        repaired
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b {
        return None;
    }
    if a < b {
        let (left, right) = items.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = items.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}
