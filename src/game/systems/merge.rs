//! Merge lifecycle for cells of the same owner
//!
//! A cell becomes a merge candidate once it is slow enough and enough time
//! has passed since its last split. Each tick at most one new pair per owner
//! is flagged; flagged pairs converge over `merge::DURATION_MS` and then
//! collapse into the kept cell. The primary cell is never the one removed.

use crate::game::constants::{mass, merge};
use crate::game::error::MergeError;
use crate::game::state::{Cell, CellId, MergeState, MovementState, OwnerId, World};
use crate::util::vec2::Vec2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub started: usize,
    pub completed: usize,
    pub aborted: usize,
}

/// Minimum time since the most recent split before a pair may merge
pub fn merge_cooldown_ms(combined_mass: f32) -> f64 {
    let multiplier = (combined_mass as f64 / merge::COOLDOWN_MASS_SCALE as f64)
        .min(merge::MAX_COOLDOWN_MULTIPLIER as f64);
    (merge::BASE_COOLDOWN_MS * multiplier).max(merge::BASE_COOLDOWN_MS)
}

fn slow_enough(cell: &Cell) -> bool {
    cell.movement.grace_ms > 0.0 || cell.speed() <= merge::MAX_SPEED
}

/// Whether `a` and `b` may start merging at `now_ms`
pub fn can_merge(a: &Cell, b: &Cell, now_ms: f64) -> bool {
    if !a.alive || !b.alive || a.id == b.id || a.owner != b.owner {
        return false;
    }
    if !slow_enough(a) || !slow_enough(b) {
        return false;
    }
    let last_split = match (a.split_history.last_split_ms, b.split_history.last_split_ms) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    };
    match last_split {
        Some(at) => now_ms - at >= merge_cooldown_ms(a.mass() + b.mass()),
        None => true,
    }
}

/// Advance active merges, then flag new pairs. Dead cells are purged.
pub fn update(world: &mut World, dt: f32) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let dt_ms = dt as f64 * 1000.0;

    for owner in world.owner_ids() {
        if start_merge(world, owner) {
            outcome.started += 1;
        }
    }

    let pairs: Vec<(CellId, CellId)> = world
        .alive_cells()
        .filter_map(|c| c.merge.partner.filter(|p| c.id < *p).map(|p| (c.id, p)))
        .collect();
    for (a, b) in pairs {
        match progress(world, a, b, dt_ms) {
            Ok(Some(_)) => outcome.completed += 1,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("Aborting merge of {} and {}: {}", a, b, err);
                world.clear_merge(a);
                world.clear_merge(b);
                outcome.aborted += 1;
            }
        }
    }

    world.purge_dead();
    outcome
}

/// Flag the best eligible pair of `owner`: one involving the primary if any,
/// else the closest. Cells already merging are skipped.
fn start_merge(world: &mut World, owner_id: OwnerId) -> bool {
    let Some(owner) = world.owner(owner_id) else {
        return false;
    };
    if owner.cells.len() < 2 {
        return false;
    }
    let primary = owner.primary;
    let now = world.time_ms;
    let cells: Vec<&Cell> = owner
        .cells
        .iter()
        .filter_map(|id| world.cell(*id))
        .filter(|c| c.alive && !c.is_merging())
        .collect();

    let mut candidates: Vec<(CellId, CellId, f32)> = Vec::new();
    for (n, a) in cells.iter().enumerate() {
        for b in &cells[n + 1..] {
            let distance = a.position.distance_to(b.position);
            if distance < (a.radius() + b.radius()) * merge::RANGE && can_merge(a, b, now) {
                candidates.push((a.id, b.id, distance));
            }
        }
    }
    if candidates.is_empty() {
        return false;
    }
    candidates.sort_by(|x, y| x.2.total_cmp(&y.2));
    let involves_primary = |pair: &&(CellId, CellId, f32)| {
        primary.is_some_and(|p| pair.0 == p || pair.1 == p)
    };
    let (a, b, distance) = *candidates
        .iter()
        .find(involves_primary)
        .unwrap_or(&candidates[0]);

    let state = |partner| MergeState {
        partner: Some(partner),
        remaining_ms: merge::DURATION_MS,
        start_distance: distance,
    };
    if let Some((ca, cb)) = world.cell_pair_mut(a, b) {
        ca.merge = state(b);
        cb.merge = state(a);
        tracing::debug!("Owner {} merging cells {} and {}", owner_id, a, b);
        return true;
    }
    false
}

/// Count the pair down and pull it together. Returns the kept cell once the
/// merge completes.
fn progress(world: &mut World, a: CellId, b: CellId, dt_ms: f64) -> Result<Option<CellId>, MergeError> {
    let (ca, cb) = world
        .cell_pair_mut(a, b)
        .ok_or(MergeError::MissingCell(b))?;
    if ca.merge.partner != Some(b) || cb.merge.partner != Some(a) {
        return Err(MergeError::NotPaired(a, b));
    }

    ca.merge.remaining_ms -= dt_ms;
    cb.merge.remaining_ms = ca.merge.remaining_ms;
    let time_left = ca.merge.remaining_ms.max(0.0);

    let radii = ca.radius() + cb.radius();
    let min_distance = radii - radii * merge::MAX_OVERLAP;
    let ease = (time_left / merge::DURATION_MS).sqrt() as f32;
    let target = min_distance.max(ca.merge.start_distance * ease);

    let delta = cb.position - ca.position;
    let current = delta.length();
    if current > target && current > 0.0 {
        let mid = (ca.position + cb.position) * 0.5;
        let half = delta * (target / current * 0.5);
        ca.position = mid - half;
        cb.position = mid + half;
    }

    if time_left <= 0.0 {
        return complete_merge(world, a, b).map(Some);
    }
    Ok(None)
}

/// Collapse a paired merge into one cell. Validates the pair first and
/// returns an error without touching the world if it is inconsistent.
pub fn complete_merge(world: &mut World, a: CellId, b: CellId) -> Result<CellId, MergeError> {
    if a == b {
        return Err(MergeError::SameCell(a));
    }
    let ca = world.cell(a).filter(|c| c.alive).ok_or(MergeError::MissingCell(a))?;
    let cb = world.cell(b).filter(|c| c.alive).ok_or(MergeError::MissingCell(b))?;
    if ca.owner != cb.owner {
        return Err(MergeError::DifferentOwners(a, b));
    }
    if ca.merge.partner != Some(b) || cb.merge.partner != Some(a) {
        return Err(MergeError::NotPaired(a, b));
    }

    let owner = ca.owner;
    let primary = world.owner(owner).and_then(|o| o.primary);
    let (keep, remove) = if primary == Some(a) {
        (a, b)
    } else if primary == Some(b) {
        (b, a)
    } else if ca.mass() >= cb.mass() {
        (a, b)
    } else {
        (b, a)
    };
    if primary == Some(remove) {
        return Err(MergeError::PrimaryWouldBeRemoved { owner, cell: remove });
    }

    let (m1, m2) = (ca.mass(), cb.mass());
    let merged_mass = (m1 + m2).max(m1.max(m2)).max(mass::MINIMUM);
    let removed_score = world.cell(remove).map(|c| c.score).unwrap_or_default();

    world.kill_cell(remove);
    if let Some(kept) = world.cell_mut(keep) {
        kept.set_mass(merged_mass);
        kept.score += removed_score;
        kept.merge = MergeState::default();
        kept.movement = MovementState {
            is_still: false,
            still_ms: 0.0,
            grace_ms: merge::GRACE_MS,
        };
        kept.velocity = Vec2::ZERO;
    }
    tracing::debug!("Owner {} merged cell {} into {}", owner, remove, keep);
    Ok(keep)
}
