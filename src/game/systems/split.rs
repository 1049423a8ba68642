//! Split and eject actions
//!
//! Manual splits halve every eligible cell of an owner toward its aim point.
//! Virus splits shatter one cell into a mass-tiered number of equal pieces.
//! Ejecting sheds a little mass from the primary as a fast pellet.

use rand::Rng;
use smallvec::SmallVec;

use crate::game::constants::{eject, mass_to_radius, split, virus};
use crate::game::state::{CellId, CellKind, EntityId, Food, OwnerId, SplitCooldown, SplitHistory, World};
use crate::util::vec2::Vec2;

/// Unit direction from `from` toward the owner's aim, or `Vec2::RIGHT` when
/// there is no aim or it sits on top of the cell
fn aim_direction(from: Vec2, aim: Option<Vec2>) -> Vec2 {
    match aim {
        Some(point) => {
            let (dir, distance) = (point - from).normalize_with_length();
            if distance < split::AIM_DEADZONE {
                Vec2::RIGHT
            } else {
                dir
            }
        }
        None => Vec2::RIGHT,
    }
}

/// Number of new pieces a virus carves out of a cell of `mass`
pub fn virus_split_pieces(mass: f32) -> usize {
    if mass >= 400.0 {
        15
    } else if mass >= 200.0 {
        7
    } else if mass >= 100.0 {
        3
    } else {
        1
    }
}

/// Split every cell of `owner` heavier than the split minimum, while the
/// owner stays under the cell cap. Returns the new fragment ids.
pub fn split_owner(world: &mut World, owner_id: OwnerId) -> SmallVec<[CellId; 16]> {
    let mut created = SmallVec::new();
    let Some(owner) = world.owner(owner_id) else {
        return created;
    };
    let aim = owner.aim;
    let controller = owner.controller();
    let existing = owner.cells.clone();
    let now = world.time_ms;

    for id in existing {
        if world.owner_cells(owner_id).len() >= split::MAX_CELLS {
            break;
        }
        let Some(cell) = world.cell(id) else {
            continue;
        };
        if !cell.alive || cell.mass() < split::MIN_MASS {
            continue;
        }

        let original_mass = cell.mass();
        let half = original_mass / 2.0;
        let dir = aim_direction(cell.position, aim);
        let offset = (mass_to_radius(half) + split::GAP) * 0.5;
        let origin = cell.position;
        let cooldown = SplitCooldown::for_mass(original_mass, now);
        let history = SplitHistory {
            last_split_ms: Some(now),
            original_mass,
        };

        world.clear_merge(id);
        let new_position = world.clamp_circle(origin + dir * offset, mass_to_radius(half));
        let kind = CellKind::Fragment { controller };
        let Some(new_id) = world.insert_cell(
            owner_id,
            kind,
            new_position,
            half,
            dir * split::LAUNCH_SPEED,
        ) else {
            break;
        };

        let back = world.clamp_circle(origin - dir * offset, mass_to_radius(half));
        if let Some(cell) = world.cell_mut(id) {
            cell.set_mass(half);
            cell.position = back;
            cell.velocity = -dir * (split::LAUNCH_SPEED * 0.5);
            cell.split_cooldown = cooldown;
            cell.split_history = history;
        }
        if let Some(fragment) = world.cell_mut(new_id) {
            fragment.split_cooldown = cooldown;
            fragment.split_history = history;
        }
        created.push(new_id);
    }

    if !created.is_empty() {
        tracing::debug!("Owner {} split into {} new fragments", owner_id, created.len());
    }
    created
}

/// Shatter `cell_id` after touching a virus at `virus_position`. Keeps 98% of
/// the mass, shared evenly. Returns the new fragment ids; empty when the owner
/// has no free cell slots.
pub fn virus_split(world: &mut World, cell_id: CellId, virus_position: Vec2) -> SmallVec<[CellId; 16]> {
    let mut created = SmallVec::new();
    let Some(cell) = world.cell(cell_id) else {
        return created;
    };
    if !cell.alive {
        return created;
    }
    let owner_id = cell.owner;
    let available = split::MAX_CELLS.saturating_sub(world.owner_cells(owner_id).len());
    let new_pieces = virus_split_pieces(cell.mass()).min(available);
    if new_pieces == 0 {
        return created;
    }

    let Some(controller) = world.owner(owner_id).map(|o| o.controller()) else {
        return created;
    };
    let original_mass = cell.mass();
    let origin = cell.position;
    let parts = new_pieces + 1;
    let piece_mass = original_mass * virus::MASS_RETAINED / parts as f32;
    let piece_radius = mass_to_radius(piece_mass);
    let now = world.time_ms;
    let cooldown = SplitCooldown::for_mass(original_mass, now);
    let history = SplitHistory {
        last_split_ms: Some(now),
        original_mass,
    };
    let launch = |position: Vec2, fallback: Vec2| {
        let dir = (position - virus_position).normalize();
        let dir = if dir == Vec2::ZERO { fallback } else { dir };
        dir * virus::LAUNCH_SPEED
    };

    world.clear_merge(cell_id);
    if let Some(cell) = world.cell_mut(cell_id) {
        cell.set_mass(piece_mass);
        cell.velocity = launch(origin, Vec2::RIGHT);
        cell.split_cooldown = cooldown;
        cell.split_history = history;
    }

    let ring = piece_radius + virus::RING_OFFSET;
    for i in 0..new_pieces {
        let angle = i as f32 / new_pieces as f32 * std::f32::consts::TAU;
        let spoke = Vec2::from_angle(angle);
        let position = world.clamp_circle(origin + spoke * ring, piece_radius);
        let velocity = launch(position, spoke);
        let kind = CellKind::Fragment { controller };
        let Some(id) = world.insert_cell(owner_id, kind, position, piece_mass, velocity) else {
            break;
        };
        if let Some(fragment) = world.cell_mut(id) {
            fragment.split_cooldown = cooldown;
            fragment.split_history = history;
        }
        created.push(id);
    }
    created
}

/// Eject a pellet from the owner's primary toward its aim. Returns the new
/// pellet id, or `None` when the primary is too light or still on cooldown.
pub fn eject_mass(world: &mut World, owner_id: OwnerId) -> Option<EntityId> {
    let now = world.time_ms;
    let owner = world.owner(owner_id)?;
    if owner
        .last_eject_ms
        .is_some_and(|last| now - last < eject::COOLDOWN_MS)
    {
        return None;
    }
    let aim = owner.aim;
    let color = owner.color.clone();
    let primary = world.primary_of(owner_id)?;
    if !primary.alive || primary.mass() < eject::MIN_MASS {
        return None;
    }

    let amount = (primary.mass() * eject::FRACTION).min(eject::MAX_AMOUNT);
    let radius = primary.radius();
    let origin = primary.position;
    let primary_id = primary.id;
    let base = aim_direction(origin, aim).angle();
    let angle = base + world.rng.gen_range(-eject::SPREAD..=eject::SPREAD);
    let dir = Vec2::from_angle(angle);

    if let Some(primary) = world.cell_mut(primary_id) {
        primary.add_mass(-amount);
    }
    let id = world.next_entity_id();
    let pellet_radius = amount.sqrt().max(eject::MIN_RADIUS);
    let position = world.clamp_circle(origin + dir * (radius + eject::OFFSET), pellet_radius);
    world
        .food
        .push(Food::ejected(id, position, dir * eject::SPEED, amount, color));
    if let Some(owner) = world.owner_mut(owner_id) {
        owner.last_eject_ms = Some(now);
    }
    Some(id)
}
