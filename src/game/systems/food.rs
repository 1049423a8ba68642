//! Pellet spawning, ejected-mass flight and virus growth

use rand::Rng;

use crate::game::constants::eject;
use crate::game::state::{Food, World};
use crate::util::vec2::Vec2;

/// Spawn at most one pellet with probability `spawn_rate * dt` while under the cap
pub fn spawn(world: &mut World, dt: f32) -> bool {
    if world.food.len() >= world.config.max_food {
        return false;
    }
    let chance = (world.config.food_spawn_rate * dt).clamp(0.0, 1.0) as f64;
    if world.rng.gen_bool(chance) {
        world.spawn_pellet();
        return true;
    }
    false
}

/// Integrate ejected pellets still in flight
pub fn update_ejected(world: &mut World, dt: f32) {
    let (width, height) = (world.width(), world.height());
    for pellet in world.food.iter_mut().filter(|f| f.velocity != Vec2::ZERO) {
        fly(pellet, width, height, dt);
    }
}

fn fly(pellet: &mut Food, width: f32, height: f32, dt: f32) {
    pellet.position += pellet.velocity * dt;
    pellet.velocity *= eject::FRICTION;
    if pellet.velocity.x.abs() < eject::STOP_SPEED && pellet.velocity.y.abs() < eject::STOP_SPEED {
        pellet.velocity = Vec2::ZERO;
    }

    let r = pellet.radius;
    if pellet.position.x < r || pellet.position.x > width - r {
        pellet.velocity.x *= -eject::BOUNCE;
    }
    if pellet.position.y < r || pellet.position.y > height - r {
        pellet.velocity.y *= -eject::BOUNCE;
    }
    pellet.position = pellet
        .position
        .clamp_box(Vec2::new(r, r), Vec2::new(width - r, height - r));
}

/// Grow every virus toward full size
pub fn grow_viruses(world: &mut World) {
    let now = world.time_ms;
    for virus in world.viruses.iter_mut() {
        virus.update_growth(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::game::state::tests::{add_test_human, create_test_world};

    const DT: f32 = 1.0 / 60.0;

    /// Ticks for a pellet launched at full eject speed to come to rest
    fn flight_ticks() -> usize {
        let mut speed = eject::SPEED;
        let mut ticks = 0;
        while speed >= eject::STOP_SPEED {
            speed *= eject::FRICTION;
            ticks += 1;
        }
        ticks
    }

    fn pellet_world(velocity: Vec2, position: Vec2) -> World {
        let mut world = create_test_world();
        let id = world.next_entity_id();
        world
            .food
            .push(Food::ejected(id, position, velocity, 8.0, "#fff".to_string()));
        world
    }

    #[test]
    fn test_ejected_pellet_slows_and_stops() {
        let mut world = pellet_world(Vec2::new(400.0, 0.0), Vec2::new(500.0, 500.0));
        update_ejected(&mut world, DT);
        let f = &world.food[0];
        assert!((f.position.x - (500.0 + 400.0 * DT)).abs() < 1e-3);
        assert!((f.velocity.x - 380.0).abs() < 1e-3);

        for _ in 0..flight_ticks() {
            update_ejected(&mut world, DT);
        }
        assert_eq!(world.food[0].velocity, Vec2::ZERO);
        let rest = world.food[0].position;
        update_ejected(&mut world, DT);
        assert_eq!(world.food[0].position, rest);
    }

    #[test]
    fn test_ejected_pellet_bounces_off_wall() {
        let mut world = pellet_world(Vec2::new(400.0, 0.0), Vec2::new(1994.0, 500.0));
        update_ejected(&mut world, DT);
        let f = &world.food[0];
        assert!(f.velocity.x < 0.0);
        assert!((f.velocity.x + 400.0 * eject::FRICTION * eject::BOUNCE).abs() < 1e-2);
        assert!(f.position.x <= 2000.0 - f.radius);
    }

    #[test]
    fn test_regular_pellets_stay_put() {
        let mut world = create_test_world();
        world.spawn_pellet();
        let before = world.food[0].position;
        update_ejected(&mut world, DT);
        assert_eq!(world.food[0].position, before);
    }

    #[test]
    fn test_spawn_respects_cap() {
        let mut world = World::new(SimConfig {
            max_food: 3,
            food_spawn_rate: 1_000.0,
            seed: Some(3),
            ..SimConfig::default()
        });
        for _ in 0..10 {
            spawn(&mut world, DT);
        }
        assert_eq!(world.food.len(), 3);
    }

    #[test]
    fn test_spawn_rate_is_probabilistic() {
        let mut world = World::new(SimConfig {
            max_food: 10_000,
            seed: Some(11),
            ..SimConfig::default()
        });
        // 2 pellets/s over 100 simulated seconds
        for _ in 0..6_000 {
            spawn(&mut world, DT);
        }
        let n = world.food.len();
        assert!((120..=280).contains(&n), "spawned {}", n);
    }

    #[test]
    fn test_spawn_rate_ignores_light_players() {
        let mut world = World::new(SimConfig {
            max_food: 10_000,
            seed: Some(12),
            ..SimConfig::default()
        });
        add_test_human(&mut world, Vec2::new(1000.0, 1000.0), 20.0);
        for _ in 0..6_000 {
            spawn(&mut world, DT);
        }
        // Flat 2/s; a boosted rate would land near 600
        let n = world.food.len();
        assert!((120..=280).contains(&n), "spawned {}", n);
    }

    #[test]
    fn test_viruses_grow_with_clock() {
        let mut world = create_test_world();
        world.spawn_virus(false);
        world.time_ms = 10_000.0;
        grow_viruses(&mut world);
        assert!(world.viruses[0].is_dangerous());
    }
}
