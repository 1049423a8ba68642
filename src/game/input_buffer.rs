//! Lock-free intent ingestion
//!
//! Connection handlers push intents into a bounded crossbeam channel without
//! blocking. The tick drains the channel once and coalesces everything per
//! owner, so only the latest move target survives while one-shot actions
//! (split, eject) are kept if sent at any point since the previous tick.

use std::collections::BTreeMap;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::game::state::OwnerId;
use crate::util::vec2::Vec2;

/// One observer request
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Join { name: String },
    Move { target: Vec2 },
    Split,
    Eject,
    Leave,
}

/// Intent tagged with the submitting owner
#[derive(Debug, Clone, PartialEq)]
pub struct InputMessage {
    pub owner: OwnerId,
    pub intent: Intent,
}

/// Everything one owner asked for since the previous tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingIntent {
    pub join: Option<String>,
    pub target: Option<Vec2>,
    pub split: bool,
    pub eject: bool,
    pub leave: bool,
}

impl PendingIntent {
    /// Fold a newer intent in; the most recent value of each kind wins
    pub fn absorb(&mut self, intent: Intent) {
        match intent {
            Intent::Join { name } => {
                self.join = Some(name);
                self.leave = false;
            }
            Intent::Move { target } => self.target = Some(target),
            Intent::Split => self.split = true,
            Intent::Eject => self.eject = true,
            Intent::Leave => {
                *self = PendingIntent {
                    leave: true,
                    ..PendingIntent::default()
                };
            }
        }
    }
}

/// Per-owner coalesced intents, iterated in owner order for determinism
pub type IntentTable = BTreeMap<OwnerId, PendingIntent>;

/// Coalesce a batch of messages, oldest first
pub fn coalesce(messages: impl IntoIterator<Item = InputMessage>) -> IntentTable {
    let mut table = IntentTable::new();
    for message in messages {
        table.entry(message.owner).or_default().absorb(message.intent);
    }
    table
}

/// Bounded multi-producer channel drained by the tick
pub struct InputBuffer {
    sender: Sender<InputMessage>,
    receiver: Receiver<InputMessage>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// New sender handle; each connection holds its own clone
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Non-blocking submit; false when the buffer is full
    #[inline]
    pub fn try_submit(&self, owner: OwnerId, intent: Intent) -> bool {
        self.sender.try_send(InputMessage { owner, intent }).is_ok()
    }

    /// Take every pending message in arrival order
    pub fn drain(&self) -> Vec<InputMessage> {
        self.receiver.try_iter().collect()
    }

    /// Drain and coalesce in one step
    pub fn drain_coalesced(&self) -> IntentTable {
        coalesce(self.receiver.try_iter())
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        // 50 observers sending ~20 intents per tick interval
        Self::new(1000)
    }
}

/// Clonable sender handle for connection handlers
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<InputMessage>,
}

impl InputSender {
    #[inline]
    pub fn try_send(&self, owner: OwnerId, intent: Intent) -> Result<(), InputBufferError> {
        self.sender
            .try_send(InputMessage { owner, intent })
            .map_err(|e| match e {
                TrySendError::Full(_) => InputBufferError::Full,
                TrySendError::Disconnected(_) => InputBufferError::Disconnected,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputBufferError {
    /// Backpressure: the tick has not drained the buffer yet
    #[error("input buffer full")]
    Full,
    /// The tick loop has stopped
    #[error("input buffer disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn move_to(x: f32, y: f32) -> Intent {
        Intent::Move {
            target: Vec2::new(x, y),
        }
    }

    #[test]
    fn test_input_buffer_submit_and_drain() {
        let buffer = InputBuffer::new(10);
        let owner = Uuid::new_v4();

        assert!(buffer.try_submit(owner, move_to(1.0, 1.0)));
        assert!(buffer.try_submit(owner, Intent::Split));
        assert_eq!(buffer.pending_count(), 2);

        let messages = buffer.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].intent, Intent::Split);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_input_buffer_backpressure() {
        let buffer = InputBuffer::new(2);
        let owner = Uuid::new_v4();
        let sender = buffer.sender();

        assert!(sender.try_send(owner, Intent::Eject).is_ok());
        assert!(sender.try_send(owner, Intent::Eject).is_ok());
        assert_eq!(sender.try_send(owner, Intent::Eject), Err(InputBufferError::Full));

        buffer.drain();
        assert!(sender.try_send(owner, Intent::Eject).is_ok());
    }

    #[test]
    fn test_sender_reports_disconnect() {
        let buffer = InputBuffer::new(4);
        let sender = buffer.sender();
        drop(buffer);
        assert_eq!(
            sender.try_send(Uuid::new_v4(), Intent::Split),
            Err(InputBufferError::Disconnected)
        );
    }

    #[test]
    fn test_latest_move_wins() {
        let owner = Uuid::new_v4();
        let table = coalesce(vec![
            InputMessage { owner, intent: move_to(1.0, 2.0) },
            InputMessage { owner, intent: Intent::Split },
            InputMessage { owner, intent: move_to(3.0, 4.0) },
        ]);
        let pending = &table[&owner];
        assert_eq!(pending.target, Some(Vec2::new(3.0, 4.0)));
        assert!(pending.split);
        assert!(!pending.eject);
    }

    #[test]
    fn test_leave_discards_earlier_intents() {
        let owner = Uuid::new_v4();
        let table = coalesce(vec![
            InputMessage { owner, intent: Intent::Join { name: "a".into() } },
            InputMessage { owner, intent: Intent::Split },
            InputMessage { owner, intent: Intent::Leave },
        ]);
        assert_eq!(
            table[&owner],
            PendingIntent {
                leave: true,
                ..PendingIntent::default()
            }
        );
    }

    #[test]
    fn test_owners_kept_apart() {
        let buffer = InputBuffer::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        buffer.try_submit(a, move_to(1.0, 1.0));
        buffer.try_submit(b, Intent::Eject);
        let table = buffer.drain_coalesced();
        assert_eq!(table.len(), 2);
        assert!(table[&b].eject);
        assert!(table[&a].target.is_some());
        assert_eq!(buffer.capacity(), 1000);
    }
}
