//! Consumption rules between cells, pellets and viruses
//!
//! Pairwise O(n^2) sweeps; the entity counts of one arena keep this well
//! inside the tick budget. Resolution repeats until nothing changes so a
//! second call on an unmoved world is a no-op.

use crate::game::constants::{mass, virus};
use crate::game::schedule::ScheduledEvent;
use crate::game::state::{CellLoss, Controller, World};
use crate::game::systems::split;

/// Upper bound on sweeps per call; every productive sweep removes an entity
const MAX_PASSES: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionOutcome {
    pub food_eaten: usize,
    pub viruses_popped: usize,
    pub fragments_created: usize,
    pub predations: usize,
    /// Owners left without any cell by predation this call
    pub owners_eliminated: usize,
}

/// Resolve every overlap in the world and drop consumed cells
pub fn resolve(world: &mut World) -> CollisionOutcome {
    let mut outcome = CollisionOutcome::default();
    for _ in 0..MAX_PASSES {
        let before = outcome;
        eat_food(world, &mut outcome);
        pop_viruses(world, &mut outcome);
        predation(world, &mut outcome);
        if outcome == before {
            break;
        }
    }
    world.purge_dead();
    outcome
}

fn eat_food(world: &mut World, outcome: &mut CollisionOutcome) {
    for i in 0..world.cells().len() {
        let (position, radius) = {
            let cell = &world.cells()[i];
            if !cell.alive {
                continue;
            }
            (cell.position, cell.radius())
        };

        let mut gained = 0.0;
        let mut eaten = 0;
        world.food.retain(|f| {
            if position.distance_to(f.position) < radius + f.radius {
                gained += f.mass;
                eaten += 1;
                false
            } else {
                true
            }
        });

        if eaten > 0 {
            let cell = &mut world.cells_mut()[i];
            cell.add_mass(gained);
            cell.score += gained as f64;
            outcome.food_eaten += eaten;
        }
    }
}

fn pop_viruses(world: &mut World, outcome: &mut CollisionOutcome) {
    let mut i = 0;
    // Virus splits append cells; the new pieces are checked in the same sweep
    while i < world.cells().len() {
        let (id, position, radius, cell_mass, alive) = {
            let c = &world.cells()[i];
            (c.id, c.position, c.radius(), c.mass(), c.alive)
        };
        i += 1;
        if !alive || cell_mass <= virus::TRIGGER_MASS {
            continue;
        }

        let hit = world.viruses.iter().position(|v| {
            v.is_dangerous() && position.distance_to(v.position) < radius + v.radius
        });
        let Some(index) = hit else {
            continue;
        };

        let popped = world.viruses.remove(index);
        let created = split::virus_split(world, id, popped.position);
        outcome.viruses_popped += 1;
        outcome.fragments_created += created.len();

        if world.viruses.len() < world.config.max_viruses {
            let due = world.time_ms + virus::RESPAWN_MS;
            world.schedule.push(due, ScheduledEvent::SpawnVirus);
        }
        tracing::debug!(
            "Cell {} popped virus {} into {} new pieces",
            id,
            popped.id,
            created.len()
        );
    }
}

/// Mass ratio the larger cell must exceed to eat the smaller
pub fn required_ratio(a_fragment: bool, b_fragment: bool) -> f32 {
    if a_fragment || b_fragment {
        mass::EAT_RATIO_FRAGMENT
    } else {
        mass::EAT_RATIO
    }
}

fn predation(world: &mut World, outcome: &mut CollisionOutcome) {
    let n = world.cells().len();
    for i in 0..n {
        for j in (i + 1)..n {
            let cells = world.cells();
            let (a, b) = (&cells[i], &cells[j]);
            if !a.alive || !b.alive || a.owner == b.owner {
                continue;
            }
            let distance = a.position.distance_to(b.position);
            if distance >= a.radius().max(b.radius()) {
                continue;
            }

            let ratio = required_ratio(a.is_fragment(), b.is_fragment());
            let (predator, prey) = if a.mass() > b.mass() * ratio {
                (i, j)
            } else if b.mass() > a.mass() * ratio {
                (j, i)
            } else {
                continue;
            };

            let prey_cell = &cells[prey];
            let prey_id = prey_cell.id;
            let prey_mass = prey_cell.mass();
            let bonus = match prey_cell.controller() {
                Controller::Bot => mass::SCORE_BOT_PREY,
                Controller::Human => mass::SCORE_HUMAN_PREY,
            };

            if let Some(loss) = world.kill_cell(prey_id) {
                if loss == CellLoss::Eliminated {
                    outcome.owners_eliminated += 1;
                }
            }
            let hunter = &mut world.cells_mut()[predator];
            hunter.add_mass(prey_mass);
            hunter.score += bonus;
            outcome.predations += 1;

            if prey == i {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::mass_to_radius;
    use crate::game::state::tests::{add_test_human, create_test_world};
    use crate::game::state::{CellKind, Food, Virus};
    use crate::util::vec2::Vec2;

    fn add_pellet(world: &mut World, position: Vec2) -> u64 {
        let id = world.next_entity_id();
        world.food.push(Food::pellet(id, position, "#fff".to_string()));
        id
    }

    #[test]
    fn test_cell_eats_overlapping_food() {
        let mut world = create_test_world();
        let (_, id) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 20.0);
        add_pellet(&mut world, Vec2::new(501.0, 500.0));
        add_pellet(&mut world, Vec2::new(900.0, 900.0));

        let outcome = resolve(&mut world);
        assert_eq!(outcome.food_eaten, 1);
        let cell = world.cell(id).unwrap();
        assert_eq!(cell.mass(), 21.0);
        assert!((cell.radius() - mass_to_radius(21.0)).abs() < 1e-6);
        assert_eq!(cell.score, 1.0);
        assert_eq!(world.food.len(), 1);
    }

    #[test]
    fn test_food_just_out_of_reach() {
        let mut world = create_test_world();
        let (_, id) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 20.0);
        let reach = world.cell(id).unwrap().radius() + 3.0;
        add_pellet(&mut world, Vec2::new(500.0 + reach + 0.01, 500.0));
        assert_eq!(resolve(&mut world).food_eaten, 0);
    }

    #[test]
    fn test_predation_requires_ratio() {
        let mut world = create_test_world();
        let (_, a) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 108.0);
        let (_, b) = add_test_human(&mut world, Vec2::new(505.0, 500.0), 100.0);
        assert_eq!(resolve(&mut world).predations, 0);
        assert_eq!(world.cell(a).unwrap().mass(), 108.0);
        assert_eq!(world.cell(b).unwrap().mass(), 100.0);

        world.cell_mut(a).unwrap().set_mass(111.0);
        let outcome = resolve(&mut world);
        assert_eq!(outcome.predations, 1);
        assert_eq!(outcome.owners_eliminated, 1);
        let hunter = world.cell(a).unwrap();
        assert_eq!(hunter.mass(), 211.0);
        assert_eq!(hunter.score, mass::SCORE_HUMAN_PREY);
        assert!(world.cell(b).is_none());
    }

    #[test]
    fn test_fragment_requires_higher_ratio() {
        let mut world = create_test_world();
        let (_, a) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 130.0);
        let (owner_b, _) = add_test_human(&mut world, Vec2::new(1500.0, 1500.0), 100.0);
        let frag = world
            .insert_cell(
                owner_b,
                CellKind::Fragment { controller: Controller::Human },
                Vec2::new(505.0, 500.0),
                100.0,
                Vec2::ZERO,
            )
            .unwrap();

        assert_eq!(resolve(&mut world).predations, 0);
        world.cell_mut(a).unwrap().set_mass(134.0);
        assert_eq!(resolve(&mut world).predations, 1);
        assert!(world.cell(frag).is_none());
        // Owner keeps its primary
        assert_eq!(world.owner_cells(owner_b).len(), 1);
    }

    #[test]
    fn test_requires_center_inside_larger_radius() {
        let mut world = create_test_world();
        let (_, _) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 400.0);
        let big_r = mass_to_radius(400.0);
        let (_, small) = add_test_human(&mut world, Vec2::new(500.0 + big_r + 1.0, 500.0), 20.0);
        assert_eq!(resolve(&mut world).predations, 0);
        assert!(world.cell(small).is_some());
    }

    #[test]
    fn test_bot_prey_scores_less_and_respawns() {
        let mut world = create_test_world();
        let (_, a) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 200.0);
        let bot = world.add_bot();
        let bot_cell = world.owner(bot).unwrap().cells[0];
        world.cell_mut(bot_cell).unwrap().position = Vec2::new(502.0, 500.0);

        resolve(&mut world);
        assert_eq!(world.cell(a).unwrap().score, mass::SCORE_BOT_PREY);
        assert!(world.owner(bot).unwrap().is_eliminated());
        assert_eq!(
            world.schedule.count_pending(|e| *e == ScheduledEvent::RespawnBot(bot)),
            1
        );
    }

    #[test]
    fn test_same_owner_cells_do_not_eat_each_other() {
        let mut world = create_test_world();
        let (owner, primary) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 400.0);
        world.insert_cell(
            owner,
            CellKind::Fragment { controller: Controller::Human },
            Vec2::new(502.0, 500.0),
            20.0,
            Vec2::ZERO,
        );
        assert_eq!(resolve(&mut world).predations, 0);
        assert_eq!(world.owner_cells(owner).len(), 2);
        assert_eq!(world.cell(primary).unwrap().mass(), 400.0);
    }

    #[test]
    fn test_virus_pops_heavy_cell() {
        let mut world = create_test_world();
        let (owner, id) = add_test_human(&mut world, Vec2::new(1000.0, 1000.0), 60.0);
        let vid = world.next_entity_id();
        world.viruses.push(Virus::grown(vid, Vec2::new(1010.0, 1000.0), 0.0));

        let outcome = resolve(&mut world);
        assert_eq!(outcome.viruses_popped, 1);
        assert!(world.viruses.is_empty());
        assert_eq!(world.owner_cells(owner).len(), 2);
        assert!((world.cell(id).unwrap().mass() - 29.4).abs() < 1e-3);
        assert_eq!(
            world.schedule.count_pending(|e| *e == ScheduledEvent::SpawnVirus),
            1
        );
    }

    #[test]
    fn test_virus_ignores_light_cells_and_growing_viruses() {
        let mut world = create_test_world();
        let (_, light) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 50.0);
        let (_, heavy) = add_test_human(&mut world, Vec2::new(1500.0, 1500.0), 200.0);
        let id = world.next_entity_id();
        world.viruses.push(Virus::grown(id, Vec2::new(505.0, 500.0), 0.0));
        let id = world.next_entity_id();
        world.viruses.push(Virus::new(id, Vec2::new(1505.0, 1500.0), 0.0));

        assert_eq!(resolve(&mut world).viruses_popped, 0);
        assert_eq!(world.viruses.len(), 2);
        assert_eq!(world.cell(light).unwrap().mass(), 50.0);
        assert_eq!(world.cell(heavy).unwrap().mass(), 200.0);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut world = create_test_world();
        let (_, _) = add_test_human(&mut world, Vec2::new(500.0, 500.0), 150.0);
        let (_, _) = add_test_human(&mut world, Vec2::new(510.0, 500.0), 40.0);
        let (_, _) = add_test_human(&mut world, Vec2::new(490.0, 505.0), 120.0);
        for k in 0..20 {
            add_pellet(&mut world, Vec2::new(480.0 + k as f32 * 2.5, 500.0));
        }
        let vid = world.next_entity_id();
        world.viruses.push(Virus::grown(vid, Vec2::new(1200.0, 1200.0), 0.0));

        resolve(&mut world);
        let masses: Vec<_> = world.cells().iter().map(|c| (c.id, c.mass(), c.score)).collect();
        let food = world.food.len();

        let second = resolve(&mut world);
        assert_eq!(second, CollisionOutcome::default());
        let after: Vec<_> = world.cells().iter().map(|c| (c.id, c.mass(), c.score)).collect();
        assert_eq!(masses, after);
        assert_eq!(world.food.len(), food);
    }
}
