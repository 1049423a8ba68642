//! Kinematics: steering, mass-scaled speed, integration and arena bounds
//!
//! Bots coast with their own friction; humans use the shared idle decay.

use rand::Rng;

use crate::game::constants::{bot, mass, physics, speed_for_mass};
use crate::game::state::{Cell, Steering, World};
use crate::util::vec2::Vec2;

/// Per-cell steering resolved from the owner before the mutable sweep
#[derive(Debug, Clone, Copy)]
struct Drive {
    steering: Steering,
    is_bot: bool,
}

/// Advance every living cell: steer, smooth, integrate and clamp to the arena.
pub fn update(world: &mut World, dt: f32) {
    let drives: Vec<Option<Drive>> = world
        .cells()
        .iter()
        .map(|cell| {
            world.owner(cell.owner).map(|owner| Drive {
                steering: owner.steering,
                is_bot: owner.is_bot(),
            })
        })
        .collect();

    let (width, height) = (world.width(), world.height());
    let dt_ms = dt as f64 * 1000.0;
    let (cells, rng) = world.cells_and_rng_mut();

    for (cell, drive) in cells.iter_mut().zip(drives) {
        if !cell.alive {
            continue;
        }
        let drive = drive.unwrap_or(Drive {
            steering: Steering::Idle,
            is_bot: false,
        });

        match desired_velocity(cell, drive) {
            Some((desired, smoothing)) => {
                cell.velocity += (desired - cell.velocity) * smoothing;
                if drive.is_bot && matches!(drive.steering, Steering::Seek(_)) {
                    cell.velocity += Vec2::new(
                        rng.gen_range(-physics::BOT_SEEK_JITTER..physics::BOT_SEEK_JITTER),
                        rng.gen_range(-physics::BOT_SEEK_JITTER..physics::BOT_SEEK_JITTER),
                    );
                }
            }
            None if drive.is_bot => cell.velocity *= bot::ARRIVE_DECAY,
            None => cell.velocity *= physics::IDLE_DECAY,
        }
        cell.velocity = cell.velocity.snap_small(physics::VELOCITY_EPSILON);

        cell.position += cell.velocity * (dt * physics::FRAME_SCALE);
        if drive.is_bot {
            cell.velocity *= bot::FRICTION;
        }
        clamp_to_arena(cell, width, height);
        update_movement_state(cell, dt_ms);
    }
}

/// Desired velocity and smoothing factor, or `None` when the cell should coast to a stop
fn desired_velocity(cell: &Cell, drive: Drive) -> Option<(Vec2, f32)> {
    let speed = speed_for_mass(cell.mass());
    match drive.steering {
        Steering::Idle => None,
        Steering::Seek(point) => {
            let (dir, distance) = (point - cell.position).normalize_with_length();
            let (threshold, smoothing) = if drive.is_bot {
                (bot::ARRIVE_DISTANCE, physics::BOT_SEEK_SMOOTHING)
            } else {
                (physics::STEER_DEADZONE, physics::STEER_SMOOTHING)
            };
            if distance <= threshold {
                return None;
            }
            Some((dir * speed, smoothing))
        }
        Steering::Flee(direction) => {
            let dir = direction.normalize();
            if dir == Vec2::ZERO {
                return None;
            }
            Some((
                dir * (speed * bot::FLEE_SPEED_MULTIPLIER),
                physics::STEER_SMOOTHING,
            ))
        }
    }
}

/// Keep the full circle inside `[0, width] x [0, height]`
pub fn clamp_to_arena(cell: &mut Cell, width: f32, height: f32) {
    let r = cell.radius();
    cell.position = cell
        .position
        .clamp_box(Vec2::new(r, r), Vec2::new(width - r, height - r));
}

/// Track stillness; a post-merge grace period suspends it
pub fn update_movement_state(cell: &mut Cell, dt_ms: f64) {
    let state = &mut cell.movement;
    if state.grace_ms > 0.0 {
        state.grace_ms = (state.grace_ms - dt_ms).max(0.0);
        state.is_still = false;
        state.still_ms = 0.0;
        return;
    }
    if cell.velocity.length() < physics::STILL_SPEED {
        if state.is_still {
            state.still_ms += dt_ms;
        } else {
            state.is_still = true;
            state.still_ms = 0.0;
        }
    } else {
        state.is_still = false;
        state.still_ms = 0.0;
    }
}

/// Passive mass loss; cells at or below the floor are untouched
pub fn apply_decay(world: &mut World, dt: f32) {
    let factor = mass::DECAY_PER_SECOND.powf(dt);
    for cell in world.cells_mut().iter_mut().filter(|c| c.alive) {
        if cell.mass() > mass::MINIMUM {
            cell.set_mass((cell.mass() * factor).max(mass::MINIMUM));
        }
    }
}
