//! Recoverable simulation errors. None of them stop the tick loop.

use thiserror::Error;

use crate::game::state::{CellId, OwnerId};

/// A merge that cannot be completed without corrupting fragment ownership.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("merge pair resolves to the same cell {0}")]
    SameCell(CellId),
    #[error("cell {0} no longer exists or is dead")]
    MissingCell(CellId),
    #[error("cells {0} and {1} are not paired with each other")]
    NotPaired(CellId, CellId),
    #[error("cells {0} and {1} belong to different owners")]
    DifferentOwners(CellId, CellId),
    #[error("merge would remove primary cell {cell} of owner {owner}")]
    PrimaryWouldBeRemoved { owner: OwnerId, cell: CellId },
}

/// Rejections when an observer asks for a new primary cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("server is full ({0} players)")]
    ServerFull(usize),
    #[error("owner {0} already has living cells")]
    AlreadyAlive(OwnerId),
}
