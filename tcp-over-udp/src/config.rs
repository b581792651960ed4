//! Tunable protocol constants.
//!
//! Every timeout is expressed in **ticks** of the worker loop rather than
//! wall-clock time, so the protocol behaves identically whether it is driven
//! by a real [`tokio::time::Interval`] or stepped by hand in a test.

use std::time::Duration;

use thiserror::Error;

use crate::packet::HEADER_LEN;

/// Largest payload that fits in one UDP datagram after our header.
pub const DEFAULT_MAX_FRAGMENT: usize = 32_767;

/// Protocol configuration shared by both directions of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Wall-clock length of one worker-loop tick.
    pub tick_interval: Duration,
    /// Ticks without any transmission before the newest unacked data packet
    /// is sent again.
    pub retransmit_timeout: u64,
    /// Ticks with an empty outbound queue before a heartbeat is sent.
    /// Must be strictly greater than `retransmit_timeout`.
    pub heartbeat_timeout: u64,
    /// Maximum payload bytes per packet.
    pub max_fragment_size: usize,
    /// Size of the datagram receive buffer.
    pub recv_buffer_size: usize,
    /// Upper bound on receive attempts per tick.
    pub recv_batch: usize,
    /// Number of recently delivered ids kept for explicit duplicate lookup.
    pub dedup_window: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1),
            retransmit_timeout: 20,
            heartbeat_timeout: 50,
            max_fragment_size: DEFAULT_MAX_FRAGMENT,
            recv_buffer_size: HEADER_LEN + DEFAULT_MAX_FRAGMENT,
            recv_batch: 16,
            dedup_window: 1024,
        }
    }
}

impl Config {
    /// Largest datagram this configuration will ever put on the wire.
    pub fn max_datagram_size(&self) -> usize {
        HEADER_LEN + self.max_fragment_size
    }

    /// Check the cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        if self.retransmit_timeout == 0 {
            return Err(ConfigError::ZeroRetransmitTimeout);
        }
        if self.heartbeat_timeout <= self.retransmit_timeout {
            return Err(ConfigError::HeartbeatNotAboveRetransmit {
                heartbeat: self.heartbeat_timeout,
                retransmit: self.retransmit_timeout,
            });
        }
        if self.max_fragment_size == 0 {
            return Err(ConfigError::ZeroFragmentSize);
        }
        if self.recv_buffer_size < self.max_datagram_size() {
            return Err(ConfigError::RecvBufferTooSmall {
                buffer: self.recv_buffer_size,
                datagram: self.max_datagram_size(),
            });
        }
        if self.recv_batch == 0 {
            return Err(ConfigError::ZeroRecvBatch);
        }
        Ok(())
    }
}

/// Reasons a [`Config`] is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tick interval must be non-zero")]
    ZeroTick,
    #[error("retransmit timeout must be at least one tick")]
    ZeroRetransmitTimeout,
    #[error("heartbeat timeout ({heartbeat}) must exceed retransmit timeout ({retransmit})")]
    HeartbeatNotAboveRetransmit { heartbeat: u64, retransmit: u64 },
    #[error("max fragment size must be non-zero")]
    ZeroFragmentSize,
    #[error("receive buffer of {buffer} bytes cannot hold a {datagram}-byte datagram")]
    RecvBufferTooSmall { buffer: usize, datagram: usize },
    #[error("receive batch must be at least one")]
    ZeroRecvBatch,
}
