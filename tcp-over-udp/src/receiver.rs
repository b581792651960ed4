//! Inbound packet classification, reassembly and the application buffer.
//!
//! The [`Receiver`] is responsible for everything that happens *after* a raw
//! datagram is decoded into a [`crate::packet::Packet`] and *before* the
//! application reads a message:
//! - Discarding duplicates of ids already delivered.
//! - Refusing out-of-order ids (they signal loss; nothing is buffered).
//! - Feeding in-order payloads to the [`Reassembler`].
//! - Holding finished messages until [`Receiver::read`] releases them, oldest
//!   first.
//!
//! The [`Receiver`] does **not** send anything itself; it returns a
//! [`Disposition`] that [`crate::endpoint::Endpoint`] uses to decide whether
//! to start loss recovery or answer with an ACK.

use std::collections::VecDeque;

use crate::fragment::Reassembler;
use crate::packet::Packet;
use crate::state::TransmissionState;

/// What became of one inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Id already delivered; payload dropped.
    Duplicate,
    /// Id is not the next expected one: some earlier packet was lost.
    OutOfOrder,
    /// In-order pure ACK; nothing to deliver.
    Ack,
    /// In-order data accepted.  `completed` is set when it finished a
    /// message.
    Accepted { completed: bool },
}

#[derive(Debug, Default)]
pub struct Receiver {
    reassembler: Reassembler,
    /// Finished messages, oldest at the front.
    inbound: VecDeque<Vec<u8>>,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `packet` and, if it is the next expected id, deliver it.
    pub fn on_packet(&mut self, state: &mut TransmissionState, packet: &Packet) -> Disposition {
        if state.is_delivered(packet.id) {
            return Disposition::Duplicate;
        }
        if packet.id != state.last_ack_sent().wrapping_add(1) {
            return Disposition::OutOfOrder;
        }
        if packet.is_pure_ack() {
            return Disposition::Ack;
        }

        state.mark_delivered(packet.id);
        match self.reassembler.push(packet.marker, &packet.payload) {
            Some(message) => {
                self.inbound.push_back(message);
                Disposition::Accepted { completed: true }
            }
            None => Disposition::Accepted { completed: false },
        }
    }

    /// `true` when at least one finished message is waiting.
    pub fn has_message(&self) -> bool {
        !self.inbound.is_empty()
    }

    /// Number of finished messages waiting.
    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    /// Release up to `max_len` bytes of the oldest message.
    ///
    /// A message longer than `max_len` is split: the head is returned and the
    /// rest stays at the front of the buffer for the next read.
    pub fn read(&mut self, max_len: usize) -> Option<Vec<u8>> {
        let front = self.inbound.front_mut()?;
        if front.len() <= max_len {
            return self.inbound.pop_front();
        }
        let rest = front.split_off(max_len);
        let head = std::mem::replace(front, rest);
        Some(head)
    }
}
