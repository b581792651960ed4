//! In-memory network simulator for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! this module provides [`SimChannel`], a pair of in-process links that
//! implement [`DatagramChannel`] and apply a configurable fault model:
//!
//! | Fault            | Description                                      |
//! |------------------|--------------------------------------------------|
//! | Packet loss      | Drop a datagram with probability `loss_rate`.    |
//! | Reordering       | Let a datagram overtake the one queued before it.|
//! | Duplication      | Deliver a datagram twice.                        |
//! | Scripted drops   | Drop specific datagrams by send index.           |
//!
//! Randomness comes from a seeded [`StdRng`], so a failing run replays
//! exactly.  Every datagram offered to a link is also logged, which lets
//! tests assert on what actually went on the wire.

use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::Packet;
use crate::socket::DatagramChannel;

/// Configuration for the fault-injection model of one direction.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is swapped with the one ahead of it.
    pub reorder_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the link is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            reorder_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

/// One direction of the simulated network.
#[derive(Debug)]
struct Link {
    config: SimulatorConfig,
    rng: StdRng,
    in_flight: VecDeque<Vec<u8>>,
    /// Every datagram offered to the link, dropped or not.
    log: Vec<Vec<u8>>,
    /// Send indices to drop regardless of `loss_rate`.
    scripted_drops: BTreeSet<usize>,
    dropped: usize,
}

impl Link {
    fn new(config: SimulatorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            in_flight: VecDeque::new(),
            log: Vec::new(),
            scripted_drops: BTreeSet::new(),
            dropped: 0,
        }
    }

    fn offer(&mut self, datagram: &[u8]) {
        let index = self.log.len();
        self.log.push(datagram.to_vec());

        if self.scripted_drops.remove(&index) || self.roll(self.config.loss_rate) {
            self.dropped += 1;
            return;
        }

        self.in_flight.push_back(datagram.to_vec());
        if self.in_flight.len() >= 2 && self.roll(self.config.reorder_rate) {
            let n = self.in_flight.len();
            self.in_flight.swap(n - 1, n - 2);
        }
        if self.roll(self.config.duplicate_rate) {
            self.in_flight.push_back(datagram.to_vec());
        }
    }

    fn roll(&mut self, p: f64) -> bool {
        p > 0.0 && self.rng.random_bool(p.min(1.0))
    }
}

type SharedLink = Arc<Mutex<Link>>;

fn lock(link: &SharedLink) -> MutexGuard<'_, Link> {
    link.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One endpoint's view of a simulated datagram link pair.
#[derive(Debug, Clone)]
pub struct SimChannel {
    outgoing: SharedLink,
    incoming: SharedLink,
}

impl SimChannel {
    /// Two connected endpoints sharing the same fault model in each
    /// direction (with different seeds).
    pub fn pair(config: SimulatorConfig) -> (SimChannel, SimChannel) {
        let reverse = SimulatorConfig {
            seed: config.seed.wrapping_add(1),
            ..config.clone()
        };
        Self::pair_with(config, reverse)
    }

    /// Two connected endpoints; `a_to_b` governs datagrams sent by the
    /// first, `b_to_a` those sent by the second.
    pub fn pair_with(a_to_b: SimulatorConfig, b_to_a: SimulatorConfig) -> (SimChannel, SimChannel) {
        let ab = Arc::new(Mutex::new(Link::new(a_to_b)));
        let ba = Arc::new(Mutex::new(Link::new(b_to_a)));
        (
            SimChannel {
                outgoing: ab.clone(),
                incoming: ba.clone(),
            },
            SimChannel {
                outgoing: ba,
                incoming: ab,
            },
        )
    }

    /// Drop the datagram this side sends at position `index` (0-based,
    /// counting every datagram ever sent).
    pub fn drop_datagram(&self, index: usize) {
        lock(&self.outgoing).scripted_drops.insert(index);
    }

    /// Drop the next `count` datagrams this side sends.
    pub fn drop_next(&self, count: usize) {
        let mut link = lock(&self.outgoing);
        let start = link.log.len();
        link.scripted_drops.extend(start..start + count);
    }

    /// Put a raw datagram straight onto the outgoing link, bypassing the
    /// fault model and the log.
    pub fn inject(&self, datagram: &[u8]) {
        lock(&self.outgoing).in_flight.push_back(datagram.to_vec());
    }

    /// Every datagram this side has sent, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.outgoing).log.clone()
    }

    /// Every datagram this side has sent, decoded.
    pub fn sent_packets(&self) -> Vec<Packet> {
        lock(&self.outgoing)
            .log
            .iter()
            .filter_map(|d| Packet::decode(d).ok())
            .collect()
    }

    /// Number of this side's datagrams lost to the fault model.
    pub fn dropped(&self) -> usize {
        lock(&self.outgoing).dropped
    }

    /// Datagrams waiting to be received by this side.
    pub fn pending(&self) -> usize {
        lock(&self.incoming).in_flight.len()
    }
}

impl DatagramChannel for SimChannel {
    fn try_send(&self, datagram: &[u8]) -> io::Result<()> {
        lock(&self.outgoing).offer(datagram);
        Ok(())
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let Some(datagram) = lock(&self.incoming).in_flight.pop_front() else {
            return Ok(None);
        };
        // Like UDP: whatever does not fit in the buffer is cut off.
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(Some(n))
    }
}
