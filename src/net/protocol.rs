use serde::{Deserialize, Serialize};

use crate::game::constants::virus;
use crate::game::input_buffer::Intent;
use crate::game::state::{Cell, CellKind, Controller, EntityId, Food, OwnerId, Virus, World};
use crate::util::vec2::Vec2;

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Request a primary cell; also used to respawn after elimination
    Join { name: String },
    /// Steer toward a world point
    Move { x: f32, y: f32 },
    Split,
    Eject,
    /// Latency probe, answered immediately with `Pong`
    Ping { client_time: u64 },
    Leave,
}

impl ClientMessage {
    /// Simulation intent carried by this message; `Ping` has none
    pub fn into_intent(self) -> Option<Intent> {
        match self {
            ClientMessage::Join { name } => Some(Intent::Join { name }),
            ClientMessage::Move { x, y } => Some(Intent::Move {
                target: Vec2::new(x, y),
            }),
            ClientMessage::Split => Some(Intent::Split),
            ClientMessage::Eject => Some(Intent::Eject),
            ClientMessage::Leave => Some(Intent::Leave),
            ClientMessage::Ping { .. } => None,
        }
    }
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    JoinAccepted {
        owner_id: OwnerId,
        world_width: f32,
        world_height: f32,
        tick_rate: u32,
    },
    JoinRejected { reason: String },
    Snapshot(WorldSnapshot),
    Pong { client_time: u64, server_time: u64 },
}

/// Agent type as seen by observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentType {
    Player,
    Bot,
    PlayerFragment,
    BotFragment,
}

impl From<CellKind> for AgentType {
    fn from(kind: CellKind) -> Self {
        match kind {
            CellKind::Human => AgentType::Player,
            CellKind::Bot(_) => AgentType::Bot,
            CellKind::Fragment {
                controller: Controller::Human,
            } => AgentType::PlayerFragment,
            CellKind::Fragment {
                controller: Controller::Bot,
            } => AgentType::BotFragment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: u64,
    pub owner: OwnerId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    /// Truncated
    pub mass: u32,
    pub radius: f32,
    pub color: String,
    pub alive: bool,
    pub score: u32,
    pub kind: AgentType,
}

impl AgentRecord {
    pub fn from_cell(cell: &Cell) -> Self {
        Self {
            id: cell.id,
            owner: cell.owner,
            name: cell.name.clone(),
            x: round2(cell.position.x),
            y: round2(cell.position.y),
            mass: cell.mass().max(0.0) as u32,
            radius: round2(cell.radius()),
            color: cell.color.clone(),
            alive: cell.alive,
            score: cell.score.max(0.0) as u32,
            kind: cell.kind.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecord {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color: String,
    pub mass: f32,
}

impl FoodRecord {
    pub fn from_food(food: &Food) -> Self {
        Self {
            id: food.id,
            x: round2(food.position.x),
            y: round2(food.position.y),
            radius: round2(food.radius),
            color: food.color.clone(),
            mass: round2(food.mass),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirusRecord {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color: String,
    pub is_fully_grown: bool,
}

impl VirusRecord {
    pub fn from_virus(v: &Virus) -> Self {
        Self {
            id: v.id,
            x: round2(v.position.x),
            y: round2(v.position.y),
            radius: round2(v.radius),
            color: virus::COLOR.to_string(),
            is_fully_grown: v.is_dangerous(),
        }
    }
}

/// Sanitized world state sent to every observer once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    /// Simulation clock
    pub timestamp_ms: u64,
    pub world_width: f32,
    pub world_height: f32,
    pub agents: Vec<AgentRecord>,
    pub food: Vec<FoodRecord>,
    pub viruses: Vec<VirusRecord>,
}

impl WorldSnapshot {
    /// Living entities only; internal timers and merge state are left out
    pub fn from_world(world: &World) -> Self {
        Self {
            tick: world.tick,
            timestamp_ms: world.time_ms.max(0.0) as u64,
            world_width: world.width(),
            world_height: world.height(),
            agents: world.alive_cells().map(AgentRecord::from_cell).collect(),
            food: world.food.iter().map(FoodRecord::from_food).collect(),
            viruses: world.viruses.iter().map(VirusRecord::from_virus).collect(),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

/// Round to two decimal places
#[inline]
pub fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::tests::{add_test_human, create_test_world};
    use uuid::Uuid;

    #[test]
    fn test_client_message_join() {
        let msg = ClientMessage::Join {
            name: "TestPlayer".to_string(),
        };
        let decoded: ClientMessage = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_client_message_to_intent() {
        assert_eq!(
            ClientMessage::Move { x: 3.0, y: 4.0 }.into_intent(),
            Some(Intent::Move {
                target: Vec2::new(3.0, 4.0)
            })
        );
        assert_eq!(ClientMessage::Ping { client_time: 5 }.into_intent(), None);
        assert_eq!(ClientMessage::Leave.into_intent(), Some(Intent::Leave));
    }

    #[test]
    fn test_server_message_join_accepted() {
        let owner_id = Uuid::new_v4();
        let msg = ServerMessage::JoinAccepted {
            owner_id,
            world_width: 2000.0,
            world_height: 2000.0,
            tick_rate: 60,
        };
        let decoded: ServerMessage = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<ServerMessage, _> = decode(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(result.is_err());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(-0.005), -0.01);
        assert_eq!(round2(10.0), 10.0);
    }

    #[test]
    fn test_snapshot_sanitizes_values() {
        let mut world = create_test_world();
        let (owner, id) = add_test_human(&mut world, Vec2::new(123.456, 789.012), 45.9);
        world.cell_mut(id).unwrap().score = 12.7;
        world.spawn_virus(false);
        world.tick = 9;
        world.time_ms = 150.6;

        let snapshot = WorldSnapshot::from_world(&world);
        assert_eq!(snapshot.tick, 9);
        assert_eq!(snapshot.timestamp_ms, 150);
        let agent = &snapshot.agents[0];
        assert_eq!(agent.owner, owner);
        assert_eq!(agent.x, 123.46);
        assert_eq!(agent.y, 789.01);
        assert_eq!(agent.mass, 45);
        assert_eq!(agent.score, 12);
        assert_eq!(agent.kind, AgentType::Player);
        assert!(!snapshot.viruses[0].is_fully_grown);
        assert_eq!(snapshot.viruses[0].color, "#00AA00");
    }

    #[test]
    fn test_snapshot_omits_dead_cells() {
        let mut world = create_test_world();
        let (_, a) = add_test_human(&mut world, Vec2::new(100.0, 100.0), 30.0);
        add_test_human(&mut world, Vec2::new(900.0, 900.0), 30.0);
        world.kill_cell(a);
        let snapshot = WorldSnapshot::from_world(&world);
        assert_eq!(snapshot.agent_count(), 1);

        let bytes = encode(&ServerMessage::Snapshot(snapshot.clone())).unwrap();
        assert_eq!(decode::<ServerMessage>(&bytes).unwrap(), ServerMessage::Snapshot(snapshot));
    }

    #[test]
    fn test_fragment_agent_types() {
        let kind = CellKind::Fragment {
            controller: Controller::Bot,
        };
        assert_eq!(AgentType::from(kind), AgentType::BotFragment);
    }
}
