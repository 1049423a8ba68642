/// Integration constants
pub mod physics {
    /// Default server tick rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Delta time per tick in seconds at the default rate
    pub const DT: f32 = 1.0 / 60.0;
    /// Velocities are expressed per 60 Hz frame; positions integrate with `v * dt * FRAME_SCALE`
    pub const FRAME_SCALE: f32 = 60.0;
    /// Speed of a mass-100 cell
    pub const BASE_SPEED: f32 = 2.0;
    /// Reference mass for speed scaling: speed = BASE_SPEED / sqrt(mass / SPEED_REFERENCE_MASS)
    pub const SPEED_REFERENCE_MASS: f32 = 100.0;
    /// Floor on the mass speed multiplier
    pub const MIN_SPEED_MULTIPLIER: f32 = 0.1;
    /// Target points closer than this produce no steering
    pub const STEER_DEADZONE: f32 = 8.0;
    /// Velocity smoothing toward the desired velocity while steering
    pub const STEER_SMOOTHING: f32 = 0.25;
    /// Bot seek smoothing (flee uses STEER_SMOOTHING)
    pub const BOT_SEEK_SMOOTHING: f32 = 0.15;
    /// Random jitter applied to bot seek velocity, per axis
    pub const BOT_SEEK_JITTER: f32 = 0.05;
    /// Velocity multiplier per tick when idle
    pub const IDLE_DECAY: f32 = 0.85;
    /// Velocity components below this snap to zero
    pub const VELOCITY_EPSILON: f32 = 0.01;
    /// Cells slower than this count as still
    pub const STILL_SPEED: f32 = 0.1;
}

/// Mass and size
pub mod mass {
    /// Floor for decay and merges; also the spawn mass of humans
    pub const MINIMUM: f32 = 20.0;
    /// Random extra spawn mass for bots, added to MINIMUM
    pub const BOT_SPAWN_JITTER: f32 = 4.0;
    /// Passive decay factor per second, applied as mass *= DECAY_PER_SECOND^dt
    pub const DECAY_PER_SECOND: f32 = 0.998;
    /// Mass ratio required to eat a single cell
    pub const EAT_RATIO: f32 = 1.10;
    /// Mass ratio required when either side is a split fragment
    pub const EAT_RATIO_FRAGMENT: f32 = 1.33;
    /// Score for eating a bot-controlled cell
    pub const SCORE_BOT_PREY: f64 = 10.0;
    /// Score for eating a human-controlled cell
    pub const SCORE_HUMAN_PREY: f64 = 50.0;
}

/// Pellets
pub mod food {
    pub const MASS: f32 = 1.0;
    pub const RADIUS: f32 = 3.0;
    /// Default cap on pellets in the world
    pub const MAX_COUNT: usize = 200;
    /// Expected spawns per second while below the cap
    pub const SPAWN_RATE: f32 = 2.0;
    pub const PALETTE: [&str; 15] = [
        "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
        "#BB8FCE", "#85C1E9", "#F8C471", "#82E0AA", "#F1948A", "#85929E", "#D7BDE2",
    ];
}

/// Mass ejection
pub mod eject {
    /// Minimum primary mass to eject
    pub const MIN_MASS: f32 = 30.0;
    /// Upper bound on a single ejection
    pub const MAX_AMOUNT: f32 = 8.0;
    /// Fraction of the primary's mass ejected (before MAX_AMOUNT)
    pub const FRACTION: f32 = 0.1;
    pub const COOLDOWN_MS: f64 = 500.0;
    /// Spawn offset beyond the ejector's radius
    pub const OFFSET: f32 = 15.0;
    /// Random spread around the aim direction, radians
    pub const SPREAD: f32 = 0.15;
    /// Launch speed in units per second
    pub const SPEED: f32 = 400.0;
    pub const MIN_RADIUS: f32 = 4.0;
    /// Ejected pellet velocity multiplier per tick
    pub const FRICTION: f32 = 0.95;
    /// Below this speed on both axes the pellet stops
    pub const STOP_SPEED: f32 = 5.0;
    /// Velocity retained (and reflected) on wall contact
    pub const BOUNCE: f32 = 0.7;
}

/// Hazards
pub mod virus {
    pub const START_RADIUS: f32 = 5.0;
    pub const FULL_RADIUS: f32 = 20.0;
    pub const GROWTH_MS: f64 = 10_000.0;
    pub const COLOR: &str = "#00AA00";
    /// Viruses only affect cells heavier than this
    pub const TRIGGER_MASS: f32 = 50.0;
    pub const INITIAL_COUNT: usize = 8;
    pub const MAX_COUNT: usize = 12;
    pub const RESPAWN_MS: f64 = 5_000.0;
    /// Fraction of mass kept by a virus split
    pub const MASS_RETAINED: f32 = 0.98;
    /// Launch speed of virus split pieces
    pub const LAUNCH_SPEED: f32 = 70.0;
    /// Ring distance beyond the cell radius where new pieces appear
    pub const RING_OFFSET: f32 = 20.0;
}

/// Splitting
pub mod split {
    /// Maximum simultaneous cells per owner (primary included)
    pub const MAX_CELLS: usize = 16;
    pub const MIN_MASS: f32 = 25.0;
    /// Aim points closer than this fall back to `Vec2::RIGHT`
    pub const AIM_DEADZONE: f32 = 5.0;
    /// Launch speed of the new fragment; the original recoils at half of it
    pub const LAUNCH_SPEED: f32 = 50.0;
    /// Gap added to the new radius when placing the halves
    pub const GAP: f32 = 10.0;
    pub const COOLDOWN_BASE_MS: f64 = 30_000.0;
    /// Extra cooldown per MASS_STEP of mass
    pub const COOLDOWN_STEP_MS: f64 = 1_000.0;
    pub const COOLDOWN_MASS_STEP: f32 = 50.0;
}

/// Merging
pub mod merge {
    /// Pairs closer than RANGE * (r1 + r2) are candidates
    pub const RANGE: f32 = 1.3;
    /// Both cells must move slower than this
    pub const MAX_SPEED: f32 = 8.0;
    pub const BASE_COOLDOWN_MS: f64 = 1_500.0;
    /// Combined mass that maps to a 1.0 cooldown multiplier
    pub const COOLDOWN_MASS_SCALE: f32 = 300.0;
    pub const MAX_COOLDOWN_MULTIPLIER: f32 = 1.5;
    pub const DURATION_MS: f64 = 3_000.0;
    /// Fraction of (r1 + r2) the pair may overlap at completion
    pub const MAX_OVERLAP: f32 = 1.0 / 3.0;
    pub const GRACE_MS: f64 = 2_000.0;
}

/// Inter-fragment forces
pub mod soft_body {
    pub const SEPARATION_FORCE: f32 = 0.8;
    pub const MIN_GAP: f32 = 8.0;
    pub const DAMPING: f32 = 0.95;
    /// Share of the separation push applied as displacement
    pub const DISPLACEMENT: f32 = 0.5;
    pub const COHESION: f32 = 0.01;
    pub const COHESION_RANGE: f32 = 100.0;
    /// Maximum spread from the centroid, in average radii
    pub const MAX_SPREAD_RADII: f32 = 8.0;
    pub const CONSTRAINT_PULL: f32 = 0.02;
    pub const CONSTRAINT_DAMPING: f32 = 0.98;
}

/// Bot behaviour
pub mod bot {
    pub const DEFAULT_COUNT: usize = 15;
    pub const RESPAWN_MS: f64 = 3_000.0;
    pub const RETARGET_MIN_MS: f64 = 2_000.0;
    pub const RETARGET_JITTER_MS: f64 = 3_000.0;
    /// Candidates heavier than this multiple of the bot are never targeted
    pub const MAX_TARGET_RATIO: f32 = 2.0;
    /// Bot must outweigh a candidate by this to consider it edible
    pub const EDIBLE_RATIO: f32 = 1.25;
    /// Mass difference under which opportunistic bots engage
    pub const NEAR_EQUAL_MASS: f32 = 5.0;
    pub const FOOD_SCORE: f32 = 100.0;
    pub const PREY_SCORE: f32 = 200.0;
    pub const OPPORTUNISTIC_SCORE: f32 = 50.0;
    /// Wander angle perturbation range per tick, radians
    pub const WANDER_TURN: f32 = 0.5;
    pub const WANDER_DISTANCE: f32 = 100.0;
    /// Threat mass ratio and the matching detection radii
    pub const THREAT_RATIO: f32 = 1.1;
    pub const LARGE_THREAT_RATIO: f32 = 2.0;
    pub const THREAT_RADIUS: f32 = 150.0;
    pub const THREAT_RADIUS_EDIBLE: f32 = 200.0;
    pub const THREAT_RADIUS_LARGE: f32 = 250.0;
    pub const FLEE_SPEED_MULTIPLIER: f32 = 1.2;
    /// Seek only when the target is further than this
    pub const ARRIVE_DISTANCE: f32 = 5.0;
    /// Velocity multiplier per tick once a bot has arrived (humans use IDLE_DECAY)
    pub const ARRIVE_DECAY: f32 = 0.9;
    /// Velocity multiplier applied to bot cells after every integration step
    pub const FRICTION: f32 = 0.98;
}

/// Spawning
pub mod spawn {
    pub const WORLD_WIDTH: f32 = 2000.0;
    pub const WORLD_HEIGHT: f32 = 2000.0;
    /// Humans spawn within this distance of the centre on each axis
    pub const HUMAN_SPREAD: f32 = 100.0;
    pub const HUMAN_PALETTE: [&str; 8] = [
        "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#F7DC6F", "#BB8FCE", "#F8C471", "#82E0AA",
    ];
}

/// Network limits
pub mod net {
    /// Maximum framed message size
    pub const MAX_MESSAGE_SIZE: usize = 262_144;
    /// Longest display name after sanitization
    pub const MAX_NAME_LEN: usize = 16;
    pub const DEFAULT_NAME: &str = "Player";
}

/// Radius of a cell with the given mass
#[inline]
pub fn mass_to_radius(mass: f32) -> f32 {
    (mass / std::f32::consts::PI).sqrt() * 3.0
}

/// Desired speed of a cell with the given mass, in units per 60 Hz frame
#[inline]
pub fn speed_for_mass(mass: f32) -> f32 {
    let multiplier = (1.0 / (mass.max(f32::EPSILON) / physics::SPEED_REFERENCE_MASS).sqrt())
        .max(physics::MIN_SPEED_MULTIPLIER);
    physics::BASE_SPEED * multiplier
}
