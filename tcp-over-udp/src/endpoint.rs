//! One side of the reliable stream, driven one tick at a time.
//!
//! [`Endpoint`] composes the protocol pieces:
//!
//! ```text
//!  send(data) ──▶ Sender (outbound queue) ──┐
//!                                           │ tick(): flush
//!                                           ▼
//!                                   DatagramChannel
//!                                           │ tick(): receive
//!                                           ▼
//!  read() ◀── Receiver (inbound buffer) ◀── TransmissionState
//! ```
//!
//! Every tick performs, in order:
//! 1. up to `recv_batch` non-blocking receive attempts, each decoded and
//!    classified;
//! 2. a full drain of the outbound queue, stamping the current cumulative
//!    ACK on each packet just before it is encoded;
//! 3. the retransmission-timeout rule;
//! 4. the heartbeat rule;
//!
//! and then advances the tick counter.
//!
//! # Loss recovery pacing
//!
//! Gap reports and replies to duplicates are limited to one per
//! `retransmit_timeout` ticks while the cumulative ACK they carry is
//! unchanged.  On the sending side, an ACK-driven recovery resends the
//! unacknowledged history once, then ignores further lagging ACKs until the
//! peer acknowledges everything that recovery covered or
//! `heartbeat_timeout` ticks pass.  Sleeping between ticks is the
//! caller's business ([`crate::connection`] uses a tokio interval; tests
//! simply call [`Endpoint::tick`] in a loop).

use std::io;

use crate::config::Config;
use crate::packet::Packet;
use crate::receiver::{Disposition, Receiver};
use crate::sender::Sender;
use crate::socket::DatagramChannel;
use crate::state::TransmissionState;
use crate::timer::TickTimer;

/// Counters describing what an endpoint has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub next_id: u32,
    pub last_ack_sent: u32,
    pub last_ack_seen_from_peer: u32,
    pub history_len: usize,
    /// Packets waiting in the outbound queue.
    pub queued: usize,
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub malformed: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    /// Data packets queued again after their first transmission.
    pub retransmits: u64,
    /// Lagging peer ACKs ignored because a recovery was already under way.
    pub recoveries_suppressed: u64,
    pub heartbeats: u64,
    pub messages_delivered: u64,
}

/// An ACK-driven resend of the unacknowledged history.
#[derive(Debug, Clone, Copy)]
struct Recovery {
    /// `highest_sent` when the resend was queued.
    until: u32,
    started: u64,
}

#[derive(Debug)]
pub struct Endpoint {
    name: String,
    config: Config,
    state: TransmissionState,
    sender: Sender,
    receiver: Receiver,
    timer: TickTimer,
    recv_buf: Vec<u8>,
    recovery: Option<Recovery>,
    /// Cumulative ACK and tick of the last gap report or duplicate reply.
    last_ack_reply: Option<(u32, u64)>,
    stats: Stats,
}

impl Endpoint {
    /// `config` is assumed to have passed [`Config::validate`].
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        Self {
            name: name.into(),
            state: TransmissionState::new(config.dedup_window),
            sender: Sender::new(),
            receiver: Receiver::new(),
            timer: TickTimer::new(&config),
            recv_buf: vec![0u8; config.recv_buffer_size],
            recovery: None,
            last_ack_reply: None,
            stats: Stats::default(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current tick.
    pub fn now(&self) -> u64 {
        self.timer.now()
    }

    /// Fragment `data` and queue it for the next tick.
    pub fn send(&mut self, data: &[u8]) -> usize {
        let first_id = self.state.next_id();
        let n = self
            .sender
            .enqueue_message(&mut self.state, data, self.config.max_fragment_size);
        log::debug!(
            "[{}] queued {} bytes as ids {}..{}",
            self.name,
            data.len(),
            first_id,
            self.state.next_id()
        );
        n
    }

    /// Release up to `max_len` bytes of the oldest reassembled message.
    pub fn read(&mut self, max_len: usize) -> Option<Vec<u8>> {
        self.receiver.read(max_len)
    }

    pub fn has_message(&self) -> bool {
        self.receiver.has_message()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            next_id: self.state.next_id(),
            last_ack_sent: self.state.last_ack_sent(),
            last_ack_seen_from_peer: self.state.last_ack_seen_from_peer(),
            history_len: self.state.history_len(),
            queued: self.sender.len(),
            ..self.stats.clone()
        }
    }

    /// Run one worker-loop iteration against `channel`.
    ///
    /// Returns `true` if at least one message finished reassembly.
    pub fn tick<C: DatagramChannel + ?Sized>(&mut self, channel: &C) -> bool {
        let mut completed = false;

        let mut buf = std::mem::take(&mut self.recv_buf);
        for _ in 0..self.config.recv_batch {
            match channel.try_recv(&mut buf) {
                Ok(Some(n)) => completed |= self.handle_datagram(&buf[..n]),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("[{}] receive failed: {e}", self.name);
                    break;
                }
            }
        }
        self.recv_buf = buf;

        self.flush(channel);
        self.check_retransmit();
        self.check_heartbeat();
        self.timer.advance();

        completed
    }

    /// Decode and process one inbound datagram.
    ///
    /// Returns `true` if it completed a message.
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> bool {
        self.stats.datagrams_received += 1;
        let packet = match Packet::decode(datagram) {
            Ok(p) => p,
            Err(e) => {
                log::trace!("[{}] ← dropping malformed datagram: {e}", self.name);
                self.stats.malformed += 1;
                return false;
            }
        };

        self.state.observe_peer_ack(packet.ack);

        match self.receiver.on_packet(&mut self.state, &packet) {
            Disposition::Duplicate => {
                self.stats.duplicates += 1;
                log::trace!("[{}] ← duplicate id={}", self.name, packet.id);
                // The peer is still resending: tell it where we are.
                if !packet.is_pure_ack() {
                    self.reply_with_ack();
                }
                false
            }
            Disposition::OutOfOrder => {
                self.stats.out_of_order += 1;
                log::debug!(
                    "[{}] ← gap: got id={} expected {}; peer ack={}",
                    self.name,
                    packet.id,
                    self.state.last_ack_sent().wrapping_add(1),
                    packet.ack
                );
                self.send_lost_packets(packet.ack);
                self.reply_with_ack();
                false
            }
            Disposition::Ack => {
                log::trace!("[{}] ← ACK ack={}", self.name, packet.ack);
                if packet.ack < self.state.highest_sent() {
                    self.send_lost_packets(packet.ack);
                }
                false
            }
            Disposition::Accepted { completed } => {
                log::debug!(
                    "[{}] ← DATA id={} ack={} marker={:?} len={}",
                    self.name,
                    packet.id,
                    packet.ack,
                    packet.marker,
                    packet.payload.len()
                );
                if completed {
                    self.stats.messages_delivered += 1;
                }
                completed
            }
        }
    }

    /// Queue a pure ACK for the peer unless the same ACK went out less than
    /// `retransmit_timeout` ticks ago.
    fn reply_with_ack(&mut self) {
        let ack = self.state.last_ack_sent();
        let now = self.timer.now();
        if let Some((last, at)) = self.last_ack_reply {
            if last == ack && now - at < self.config.retransmit_timeout {
                return;
            }
        }
        if self.sender.enqueue_pure_ack(ack) {
            self.last_ack_reply = Some((ack, now));
        }
    }

    fn send_lost_packets(&mut self, peer_ack: u32) {
        let now = self.timer.now();
        if let Some(r) = self.recovery {
            if peer_ack < r.until && now - r.started < self.config.heartbeat_timeout {
                self.stats.recoveries_suppressed += 1;
                log::trace!(
                    "[{}] peer ack={} inside recovery up to id={}",
                    self.name,
                    peer_ack,
                    r.until
                );
                return;
            }
        }

        let n = self.sender.send_lost_packets(&self.state, peer_ack);
        if n > 0 {
            self.recovery = Some(Recovery {
                until: self.state.highest_sent(),
                started: now,
            });
            self.stats.retransmits += n as u64;
            log::debug!(
                "[{}] peer ack={}, retransmitting {} packet(s)",
                self.name,
                peer_ack,
                n
            );
        }
    }

    /// Drain the outbound queue onto `channel`.
    fn flush<C: DatagramChannel + ?Sized>(&mut self, channel: &C) {
        let mut sent_any = false;
        while let Some(mut packet) = self.sender.pop() {
            packet.ack = self.state.last_ack_sent();
            if packet.is_pure_ack() {
                packet.id = self.state.pure_ack_id();
            }

            match channel.try_send(&packet.encode()) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    log::trace!("[{}] channel busy, keeping id={} queued", self.name, packet.id);
                    self.sender.retry(packet);
                    break;
                }
                Err(e) => {
                    log::warn!("[{}] send failed for id={}: {e}", self.name, packet.id);
                }
            }
            sent_any = true;
            self.stats.datagrams_sent += 1;

            if packet.is_pure_ack() {
                log::trace!("[{}] → ACK id={} ack={}", self.name, packet.id, packet.ack);
            } else {
                log::debug!(
                    "[{}] → DATA id={} ack={} marker={:?} len={}",
                    self.name,
                    packet.id,
                    packet.ack,
                    packet.marker,
                    packet.payload.len()
                );
                self.state.record_sent(&packet);
            }
        }
        if sent_any {
            self.timer.on_transmit();
        }
    }

    fn check_retransmit(&mut self) {
        if !self.timer.retransmit_due() {
            return;
        }
        let Some(packet) = self.state.unacked_last_sent().cloned() else {
            return;
        };
        let id = packet.id;
        if self.sender.requeue(packet) {
            self.stats.retransmits += 1;
            log::debug!(
                "[{}] timeout after {} idle tick(s), resending id={}",
                self.name,
                self.timer.idle_ticks(),
                id
            );
        }
    }

    fn check_heartbeat(&mut self) {
        if !self.timer.heartbeat_due(self.sender.is_empty()) {
            return;
        }
        if self.sender.enqueue_pure_ack(self.state.last_ack_sent()) {
            self.stats.heartbeats += 1;
            log::trace!("[{}] idle, heartbeat queued", self.name);
        }
    }
}
