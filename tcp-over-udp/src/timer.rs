//! Retransmit and heartbeat timers.
//!
//! Reliable delivery requires that unacknowledged packets are re-sent if the
//! peer stays silent, and that an idle endpoint still reports its cumulative
//! ACK now and then.  Both rules are measured against a [`TickTimer`], a
//! monotonically increasing counter advanced once per worker-loop tick.
//!
//! | Rule        | Fires when                                              |
//! |-------------|---------------------------------------------------------|
//! | Retransmit  | nothing transmitted for `retransmit_timeout` ticks      |
//! | Heartbeat   | outbound queue empty for `heartbeat_timeout` ticks      |
//!
//! The outbound queue is drained completely on every tick, so "queue empty
//! since" and "last transmission" are the same instant; one field tracks
//! both.

use crate::config::Config;

/// Tick counter plus the bookkeeping the timeout rules need.
#[derive(Debug, Clone)]
pub struct TickTimer {
    now: u64,
    last_transmit: u64,
    retransmit_timeout: u64,
    heartbeat_timeout: u64,
}

impl TickTimer {
    pub fn new(config: &Config) -> Self {
        Self {
            now: 0,
            last_transmit: 0,
            retransmit_timeout: config.retransmit_timeout,
            heartbeat_timeout: config.heartbeat_timeout,
        }
    }

    /// Current tick.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Move to the next tick.
    pub fn advance(&mut self) {
        self.now += 1;
    }

    /// Record that at least one datagram left during the current tick.
    pub fn on_transmit(&mut self) {
        self.last_transmit = self.now;
    }

    /// Ticks elapsed since the last transmission.
    pub fn idle_ticks(&self) -> u64 {
        self.now - self.last_transmit
    }

    /// `true` once the sender has been silent for the retransmit timeout.
    pub fn retransmit_due(&self) -> bool {
        self.idle_ticks() >= self.retransmit_timeout
    }

    /// `true` once the outbound queue has been empty for the heartbeat
    /// timeout.
    pub fn heartbeat_due(&self, queue_empty: bool) -> bool {
        queue_empty && self.idle_ticks() >= self.heartbeat_timeout
    }
}
