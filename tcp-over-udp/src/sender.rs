//! Outbound packet queue and retransmission selection.
//!
//! [`Sender`] owns the queue of packets waiting to go on the wire.  It does
//! **not** touch the socket; [`crate::endpoint::Endpoint`] drains it once per
//! tick and stamps the freshest ACK on every packet just before encoding.
//!
//! # Queue ordering
//! - New fragments are appended in id order.
//! - Retransmissions are **prepended**, still in id order, so lost data goes
//!   out before anything that has never been sent.
//! - An id is never queued twice.

use std::collections::VecDeque;

use crate::fragment;
use crate::packet::Packet;
use crate::state::TransmissionState;

#[derive(Debug, Default)]
pub struct Sender {
    queue: VecDeque<Packet>,
}

impl Sender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragment `data`, assign each piece the next id and queue it.
    ///
    /// Returns `data.len() + HEADER_LEN * fragment_count`, an accounting
    /// figure for the bytes that will hit the wire on first transmission.
    pub fn enqueue_message(
        &mut self,
        state: &mut TransmissionState,
        data: &[u8],
        max_fragment_size: usize,
    ) -> usize {
        let pieces = fragment::split(data, max_fragment_size);
        let count = pieces.len();
        for (marker, payload) in pieces {
            let id = state.assign_id();
            self.queue.push_back(Packet::data(id, marker, payload));
        }
        data.len() + crate::packet::HEADER_LEN * count
    }

    /// Re-queue every unacknowledged data packet after `peer_ack`.
    ///
    /// Only packets older than the first data packet still waiting in the
    /// queue are considered; anything newer has never been sent.  Returns
    /// the number of packets added.
    pub fn send_lost_packets(&mut self, state: &TransmissionState, peer_ack: u32) -> usize {
        let before = self.first_queued_data_id();
        let lost: Vec<Packet> = state
            .history_between(peer_ack, before)
            .filter(|p| !self.contains(p.id))
            .cloned()
            .collect();

        let added = lost.len();
        for packet in lost.into_iter().rev() {
            self.queue.push_front(packet);
        }
        added
    }

    /// Queue `packet` for another transmission unless it is already queued.
    pub fn requeue(&mut self, packet: Packet) -> bool {
        if self.contains(packet.id) {
            return false;
        }
        self.queue.push_front(packet);
        true
    }

    /// Put back a packet the channel refused so it goes out first next time.
    pub fn retry(&mut self, packet: Packet) {
        self.queue.push_front(packet);
    }

    /// Queue a pure ACK unless one is already waiting.
    pub fn enqueue_pure_ack(&mut self, ack: u32) -> bool {
        if self.queue.iter().any(Packet::is_pure_ack) {
            return false;
        }
        self.queue.push_back(Packet::pure_ack(ack));
        true
    }

    /// Take the next packet to transmit.
    pub fn pop(&mut self) -> Option<Packet> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    fn contains(&self, id: u32) -> bool {
        self.queue.iter().any(|p| !p.is_pure_ack() && p.id == id)
    }

    fn first_queued_data_id(&self) -> Option<u32> {
        self.queue
            .iter()
            .filter(|p| !p.is_pure_ack())
            .map(|p| p.id)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Marker;

    fn drain_ids(s: &mut Sender) -> Vec<u32> {
        std::iter::from_fn(|| s.pop()).map(|p| p.id).collect()
    }

    #[test]
    fn enqueue_assigns_sequential_ids() {
        let mut state = TransmissionState::new(16);
        let mut s = Sender::new();
        let n = s.enqueue_message(&mut state, &[0u8; 25], 10);
        assert_eq!(n, 25 + 9 * 3);
        assert_eq!(s.len(), 3);

        let markers: Vec<Marker> = std::iter::from_fn(|| s.pop()).map(|p| p.marker).collect();
        assert_eq!(markers, vec![Marker::More, Marker::More, Marker::Last]);
        assert_eq!(state.next_id(), 4);
    }

    #[test]
    fn empty_message_queues_nothing() {
        let mut state = TransmissionState::new(16);
        let mut s = Sender::new();
        assert_eq!(s.enqueue_message(&mut state, b"", 10), 0);
        assert!(s.is_empty());
        assert_eq!(state.next_id(), 1);
    }

    #[test]
    fn lost_packets_prepended_in_order() {
        let mut state = TransmissionState::new(16);
        let mut s = Sender::new();
        for _ in 0..4 {
            s.enqueue_message(&mut state, b"x", 10);
        }
        // Transmit ids 1..=3, leave 4 queued.
        for _ in 0..3 {
            let p = s.pop().unwrap();
            state.record_sent(&p);
        }

        let added = s.send_lost_packets(&state, 1);
        assert_eq!(added, 2);
        assert_eq!(drain_ids(&mut s), vec![2, 3, 4]);
    }

    #[test]
    fn lost_packets_not_duplicated() {
        let mut state = TransmissionState::new(16);
        let mut s = Sender::new();
        for _ in 0..3 {
            s.enqueue_message(&mut state, b"x", 10);
        }
        while let Some(p) = s.pop() {
            state.record_sent(&p);
        }

        assert_eq!(s.send_lost_packets(&state, 0), 3);
        assert_eq!(s.send_lost_packets(&state, 0), 0);
        assert_eq!(drain_ids(&mut s), vec![1, 2, 3]);
    }

    #[test]
    fn only_one_pure_ack_queued() {
        let mut s = Sender::new();
        assert!(s.enqueue_pure_ack(3));
        assert!(!s.enqueue_pure_ack(4));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn requeue_skips_already_queued() {
        let mut state = TransmissionState::new(16);
        let mut s = Sender::new();
        s.enqueue_message(&mut state, b"x", 10);
        let copy = Packet::data(1, Marker::None, b"x".to_vec());
        assert!(!s.requeue(copy));
        assert_eq!(s.len(), 1);
    }
}
