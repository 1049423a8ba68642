//! Soft-body forces between cells of the same owner
//!
//! Separation keeps fragments from stacking, a distance constraint caps the
//! spread around the centroid, and a weak cohesion pull keeps them together.

use crate::game::constants::{physics, soft_body};
use crate::game::state::{CellId, World};
use crate::game::systems::movement::clamp_to_arena;
use crate::util::vec2::Vec2;

/// Apply separation, distance constraint and cohesion to every owner with
/// more than one cell. Runs alongside merge convergence; merging pairs are
/// exempt from separation only.
pub fn update(world: &mut World, dt: f32) {
    for owner in world.owner_ids() {
        let ids = world.owner_cells(owner);
        if ids.len() < 2 {
            continue;
        }
        separate(world, &ids, dt);
        constrain(world, &ids, dt);
        cohere(world, &ids, dt);
    }
}

fn separate(world: &mut World, ids: &[CellId], dt: f32) {
    let (width, height) = (world.width(), world.height());
    let scale = dt * physics::FRAME_SCALE * soft_body::DISPLACEMENT;

    for (n, &a_id) in ids.iter().enumerate() {
        for &b_id in &ids[n + 1..] {
            let Some((a, b)) = world.cell_pair_mut(a_id, b_id) else {
                continue;
            };
            if a.merge.partner == Some(b_id) || b.merge.partner == Some(a_id) {
                continue;
            }

            let delta = a.position - b.position;
            let distance = delta.length();
            let min_distance = a.radius() + b.radius() + soft_body::MIN_GAP;
            if distance >= min_distance || distance <= 0.1 {
                continue;
            }

            let push = (min_distance - distance) * soft_body::SEPARATION_FORCE;
            let dir = delta * (1.0 / distance);
            let total = a.mass() + b.mass();
            // Lighter cell moves more
            a.position += dir * (push * (b.mass() / total) * scale);
            b.position -= dir * (push * (a.mass() / total) * scale);
            a.velocity *= soft_body::DAMPING;
            b.velocity *= soft_body::DAMPING;
            clamp_to_arena(a, width, height);
            clamp_to_arena(b, width, height);
        }
    }
}

/// Mass-weighted centroid and average radius of a group
fn centroid(world: &World, ids: &[CellId]) -> Option<(Vec2, f32)> {
    let mut weighted = Vec2::ZERO;
    let mut total_mass = 0.0;
    let mut radius_sum = 0.0;
    let mut count = 0;
    for cell in ids.iter().filter_map(|id| world.cell(*id)) {
        weighted += cell.position * cell.mass();
        total_mass += cell.mass();
        radius_sum += cell.radius();
        count += 1;
    }
    if count == 0 || total_mass <= 0.0 {
        return None;
    }
    Some((weighted * (1.0 / total_mass), radius_sum / count as f32))
}

fn constrain(world: &mut World, ids: &[CellId], dt: f32) {
    let Some((center, avg_radius)) = centroid(world, ids) else {
        return;
    };
    let max_distance = avg_radius * soft_body::MAX_SPREAD_RADII;
    let scale = dt * physics::FRAME_SCALE;

    for id in ids {
        let Some(cell) = world.cell_mut(*id) else {
            continue;
        };
        let (dir, distance) = (cell.position - center).normalize_with_length();
        if distance > max_distance {
            let pull = (distance - max_distance) * soft_body::CONSTRAINT_PULL;
            cell.position -= dir * (pull * scale);
            cell.velocity *= soft_body::CONSTRAINT_DAMPING;
        }
    }
}

fn cohere(world: &mut World, ids: &[CellId], dt: f32) {
    let Some((center, _)) = centroid(world, ids) else {
        return;
    };
    let scale = dt * physics::FRAME_SCALE;

    for id in ids {
        let Some(cell) = world.cell_mut(*id) else {
            continue;
        };
        let (dir, distance) = (center - cell.position).normalize_with_length();
        if distance > 0.0 {
            let strength =
                soft_body::COHESION * (distance / soft_body::COHESION_RANGE).min(1.0) * scale;
            cell.velocity += dir * strength;
        }
    }
}
