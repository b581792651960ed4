//! Per-endpoint sequencing and acknowledgement counters.
//!
//! [`TransmissionState`] is the single owner of every counter the protocol
//! reads or writes: the next id to hand out, the cumulative ACK we report,
//! the ACK our peer last reported, the set of ids already delivered, and the
//! history of transmitted data packets.
//!
//! # Id layout
//!
//! ```text
//!   peer acked          highest_sent        next_id
//!        │                   │                 │
//!  ──────┼───────────────────┼─────────────────┼────────▶ our id space
//!        │ <─ sent_history ─▶│ <─ still queued ▶
//! ```
//!
//! History entries at or below the peer's cumulative ACK are retired as soon
//! as that ACK is observed.  The delivered-id set keeps only a sliding window
//! below `last_ack_sent`; anything older is already covered by the cumulative
//! ACK itself.

use std::collections::{BTreeMap, BTreeSet};

use crate::packet::Packet;

#[derive(Debug)]
pub struct TransmissionState {
    /// Next id to assign to an outgoing fragment.
    next_id: u32,
    /// Highest contiguous id received from the peer (0 = none).
    last_ack_sent: u32,
    /// Highest ACK the peer has reported to us.
    last_ack_seen_from_peer: u32,
    /// Highest data id ever transmitted.
    highest_sent: u32,
    /// Id of the most recently transmitted data packet.
    last_sent_data: Option<u32>,
    /// Recently delivered ids.
    delivered_ids: BTreeSet<u32>,
    /// Transmitted data packets not yet acknowledged by the peer.
    sent_history: BTreeMap<u32, Packet>,
    dedup_window: u32,
}

impl TransmissionState {
    pub fn new(dedup_window: u32) -> Self {
        Self {
            next_id: 1,
            last_ack_sent: 0,
            last_ack_seen_from_peer: 0,
            highest_sent: 0,
            last_sent_data: None,
            delivered_ids: BTreeSet::new(),
            sent_history: BTreeMap::new(),
            dedup_window,
        }
    }

    /// Hand out the next sequential id.
    pub fn assign_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Cumulative ACK to stamp on outgoing packets.
    pub fn last_ack_sent(&self) -> u32 {
        self.last_ack_sent
    }

    pub fn last_ack_seen_from_peer(&self) -> u32 {
        self.last_ack_seen_from_peer
    }

    pub fn highest_sent(&self) -> u32 {
        self.highest_sent
    }

    /// Id a pure ACK should carry: one past the newest data id on the wire,
    /// which is exactly what a fully caught-up peer expects next.
    pub fn pure_ack_id(&self) -> u32 {
        self.highest_sent.wrapping_add(1)
    }

    /// `true` if `id` was already handed to the reassembler.
    pub fn is_delivered(&self, id: u32) -> bool {
        id <= self.last_ack_sent || self.delivered_ids.contains(&id)
    }

    /// Record in-order delivery of `id` and advance the cumulative ACK.
    pub fn mark_delivered(&mut self, id: u32) {
        debug_assert_eq!(id, self.last_ack_sent.wrapping_add(1));
        self.delivered_ids.insert(id);
        self.last_ack_sent = id;

        let floor = self.last_ack_sent.saturating_sub(self.dedup_window);
        if floor > 0 {
            self.delivered_ids = self.delivered_ids.split_off(&floor);
        }
    }

    /// Note an ACK carried by an incoming packet.
    ///
    /// The value only moves forward; a reordered, stale ACK never takes back
    /// an acknowledgement.  Acknowledged history entries are retired.
    pub fn observe_peer_ack(&mut self, ack: u32) {
        if ack <= self.last_ack_seen_from_peer {
            return;
        }
        self.last_ack_seen_from_peer = ack;
        self.sent_history = self.sent_history.split_off(&ack.wrapping_add(1));
    }

    /// Record a transmitted data packet.
    pub fn record_sent(&mut self, packet: &Packet) {
        self.highest_sent = self.highest_sent.max(packet.id);
        self.last_sent_data = Some(packet.id);
        if packet.id > self.last_ack_seen_from_peer {
            self.sent_history.insert(packet.id, packet.clone());
        }
    }

    /// The most recently transmitted data packet, if the peer has not yet
    /// acknowledged it.
    pub fn unacked_last_sent(&self) -> Option<&Packet> {
        let id = self.last_sent_data?;
        if id <= self.last_ack_seen_from_peer {
            return None;
        }
        self.sent_history.get(&id)
    }

    /// Unacknowledged history entries with `after < id < before`, in id
    /// order.
    pub fn history_between(&self, after: u32, before: Option<u32>) -> impl Iterator<Item = &Packet> {
        self.sent_history
            .range(after.saturating_add(1)..)
            .map(|(_, p)| p)
            .take_while(move |p| before.map_or(true, |b| p.id < b))
    }

    pub fn history_len(&self) -> usize {
        self.sent_history.len()
    }

    pub fn delivered_len(&self) -> usize {
        self.delivered_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Marker;

    fn data(id: u32) -> Packet {
        Packet::data(id, Marker::None, vec![id as u8])
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut s = TransmissionState::new(16);
        assert_eq!(s.assign_id(), 1);
        assert_eq!(s.assign_id(), 2);
        assert_eq!(s.next_id(), 3);
    }

    #[test]
    fn delivery_advances_cumulative_ack() {
        let mut s = TransmissionState::new(16);
        assert!(!s.is_delivered(1));
        s.mark_delivered(1);
        s.mark_delivered(2);
        assert_eq!(s.last_ack_sent(), 2);
        assert!(s.is_delivered(1));
        assert!(s.is_delivered(2));
        assert!(!s.is_delivered(3));
    }

    #[test]
    fn dedup_window_is_bounded() {
        let mut s = TransmissionState::new(4);
        for id in 1..=100 {
            s.mark_delivered(id);
        }
        assert!(s.delivered_len() <= 5);
        // Pruned ids are still recognised through the cumulative ACK.
        assert!(s.is_delivered(1));
    }

    #[test]
    fn peer_ack_retires_history() {
        let mut s = TransmissionState::new(16);
        for id in 1..=5 {
            s.record_sent(&data(id));
        }
        assert_eq!(s.history_len(), 5);
        s.observe_peer_ack(3);
        assert_eq!(s.history_len(), 2);
        assert_eq!(s.last_ack_seen_from_peer(), 3);
    }

    #[test]
    fn stale_peer_ack_ignored() {
        let mut s = TransmissionState::new(16);
        s.observe_peer_ack(4);
        s.observe_peer_ack(2);
        assert_eq!(s.last_ack_seen_from_peer(), 4);
    }

    #[test]
    fn unacked_last_sent_clears_on_ack() {
        let mut s = TransmissionState::new(16);
        s.record_sent(&data(1));
        s.record_sent(&data(2));
        assert_eq!(s.unacked_last_sent().map(|p| p.id), Some(2));
        s.observe_peer_ack(2);
        assert!(s.unacked_last_sent().is_none());
    }

    #[test]
    fn history_between_respects_bounds() {
        let mut s = TransmissionState::new(16);
        for id in 1..=6 {
            s.record_sent(&data(id));
        }
        let ids: Vec<u32> = s.history_between(2, Some(5)).map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 4]);
        let ids: Vec<u32> = s.history_between(4, None).map(|p| p.id).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[test]
    fn pure_ack_id_follows_highest_sent() {
        let mut s = TransmissionState::new(16);
        assert_eq!(s.pure_ack_id(), 1);
        s.record_sent(&data(1));
        s.record_sent(&data(2));
        assert_eq!(s.pure_ack_id(), 3);
    }
}
