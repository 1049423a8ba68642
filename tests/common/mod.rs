#![allow(dead_code)]

use cell_arena_server::config::SimConfig;
use cell_arena_server::game::state::{CellId, CellKind, Controller, OwnerId, World};
use cell_arena_server::util::Vec2;
use uuid::Uuid;

pub const DT: f32 = 1.0 / 60.0;

pub const HUMAN_FRAGMENT: CellKind = CellKind::Fragment {
    controller: Controller::Human,
};

/// Seeded world with no bots, food or viruses
pub fn empty_world(seed: u64) -> World {
    World::new(SimConfig {
        bot_count: 0,
        virus_count: 0,
        max_food: 0,
        seed: Some(seed),
        ..SimConfig::default()
    })
}

pub fn add_human(world: &mut World, position: Vec2, mass: f32) -> (OwnerId, CellId) {
    let owner = Uuid::new_v4();
    let id = world
        .add_human(owner, "Tester".to_string())
        .expect("fresh owner always joins");
    let cell = world.cell_mut(id).expect("just inserted");
    cell.position = position;
    cell.set_mass(mass);
    (owner, id)
}

pub fn add_fragment(world: &mut World, owner: OwnerId, position: Vec2, mass: f32) -> CellId {
    world
        .insert_cell(owner, HUMAN_FRAGMENT, position, mass, Vec2::ZERO)
        .expect("owner under the cell cap")
}
