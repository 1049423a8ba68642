use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::game::constants::{bot, food, physics, spawn, virus};

/// Simulation tunables shared by the network server and the local harness
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub world_width: f32,
    pub world_height: f32,
    /// Ticks per second driving the fixed-rate loop
    pub tick_rate: u32,
    /// Bots kept alive in the arena
    pub bot_count: usize,
    pub max_food: usize,
    /// Expected pellet spawns per second while below `max_food`
    pub food_spawn_rate: f32,
    /// Viruses placed at world creation
    pub virus_count: usize,
    /// Respawned viruses never push the count past this
    pub max_viruses: usize,
    /// Seed for the world RNG; random when unset
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_width: spawn::WORLD_WIDTH,
            world_height: spawn::WORLD_HEIGHT,
            tick_rate: physics::TICK_RATE,
            bot_count: bot::DEFAULT_COUNT,
            max_food: food::MAX_COUNT,
            food_spawn_rate: food::SPAWN_RATE,
            virus_count: virus::INITIAL_COUNT,
            max_viruses: virus::MAX_COUNT,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Fixed timestep in seconds
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Tick budget in milliseconds
    pub fn tick_duration_ms(&self) -> u64 {
        1000 / self.tick_rate.max(1) as u64
    }

    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_value("WORLD_WIDTH", |v: &f32| *v >= 200.0 && *v <= 100_000.0, "200-100000") {
            config.world_width = v;
        }
        if let Some(v) = env_value("WORLD_HEIGHT", |v: &f32| *v >= 200.0 && *v <= 100_000.0, "200-100000") {
            config.world_height = v;
        }
        if let Some(v) = env_value("TICK_RATE", |v: &u32| (1..=240).contains(v), "1-240") {
            config.tick_rate = v;
        }
        if let Some(v) = env_value("BOT_COUNT", |v: &usize| *v <= 500, "0-500") {
            config.bot_count = v;
        }
        if let Some(v) = env_value("MAX_FOOD", |v: &usize| *v <= 10_000, "0-10000") {
            config.max_food = v;
        }
        if let Some(v) = env_value("VIRUS_COUNT", |v: &usize| *v <= 200, "0-200") {
            config.virus_count = v;
            config.max_viruses = config.max_viruses.max(v);
        }
        if let Ok(seed) = std::env::var("SIM_SEED") {
            match seed.parse::<u64>() {
                Ok(parsed) => config.seed = Some(parsed),
                Err(_) => tracing::warn!("Invalid SIM_SEED '{}', using random seed", seed),
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if !(self.world_width > 0.0 && self.world_height > 0.0) {
            return Err("world dimensions must be positive".to_string());
        }
        if self.food_spawn_rate < 0.0 {
            return Err("food_spawn_rate cannot be negative".to_string());
        }
        if self.virus_count > self.max_viruses {
            return Err("virus_count cannot exceed max_viruses".to_string());
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Port for the metrics HTTP endpoint
    pub metrics_port: u16,
    /// Maximum concurrent human observers
    pub max_players: usize,
    /// Path to TLS certificate file
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file
    pub tls_key_path: Option<String>,
    pub sim: SimConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            metrics_port: 9090,
            max_players: 50,
            tls_cert_path: None,
            tls_key_path: None,
            sim: SimConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Socket address the WebTransport endpoint listens on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Some(port) = env_value("PORT", |v: &u16| *v > 0, "> 0") {
            config.port = port;
        }

        if let Some(port) = env_value("METRICS_PORT", |v: &u16| *v > 0, "> 0") {
            config.metrics_port = port;
        }

        if let Some(max) = env_value("MAX_PLAYERS", |v: &usize| (1..=1000).contains(v), "1-1000") {
            config.max_players = max;
        }

        if let Ok(cert_path) = std::env::var("TLS_CERT_PATH") {
            config.tls_cert_path = Some(cert_path);
        }

        if let Ok(key_path) = std::env::var("TLS_KEY_PATH") {
            config.tls_key_path = Some(key_path);
        }

        config.sim = SimConfig::load_or_default();
        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_players == 0 {
            return Err("max_players must be at least 1".to_string());
        }
        if self.port == self.metrics_port {
            return Err("metrics_port must differ from port".to_string());
        }
        self.sim.validate()
    }
}

/// Read and parse an environment variable, warning and returning `None` when
/// it is present but unparsable or out of range.
fn env_value<T: FromStr>(name: &str, valid: impl Fn(&T) -> bool, range: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(parsed) if valid(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, range);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4433);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.max_players, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5544,
            ..ServerConfig::default()
        };
        assert_eq!(config.socket_addr(), "127.0.0.1:5544".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_default_sim_config() {
        let sim = SimConfig::default();
        assert_eq!(sim.tick_rate, 60);
        assert_eq!(sim.world_width, 2000.0);
        assert_eq!(sim.bot_count, 15);
        assert_eq!(sim.max_food, 200);
        assert_eq!(sim.virus_count, 8);
        assert_eq!(sim.max_viruses, 12);
        assert_eq!(sim.tick_duration_ms(), 16);
        assert!((sim.dt() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.metrics_port = config.port;
        assert!(config.validate().is_err());

        let mut sim = SimConfig::default();
        sim.virus_count = sim.max_viruses + 1;
        assert!(sim.validate().is_err());

        let mut sim = SimConfig::default();
        sim.tick_rate = 0;
        assert!(sim.validate().is_err());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
        assert!(config.sim.tick_rate > 0);
    }
}
