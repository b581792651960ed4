//! `tcp-over-udp`: reliable, ordered, exactly-once messages over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   packets    ┌──────────┐
//!  │  Sender  │─────────────▶│ Receiver │
//!  └────┬─────┘              └─────┬────┘
//!       │                          │
//!       │      cumulative ACKs     │
//!       │◀─────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │            Endpoint               │
//!  │  (one tick: recv, flush, timers)  │
//!  └────┬──────────────────────────────┘
//!       │ driven by the worker task of a Connection
//!  ┌────▼─────────────┐
//!  │ DatagramChannel  │  (UDP socket or in-memory simulator)
//!  └──────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (serialise / deserialise)
//! - [`fragment`]: splitting and reassembling oversized messages
//! - [`state`]: id assignment, cumulative ACKs, delivered ids, history
//! - [`sender`]: outbound queue and retransmission selection
//! - [`receiver`]: duplicate / gap detection and the inbound buffer
//! - [`timer`]: tick counter with retransmit and heartbeat rules
//! - [`endpoint`]: one protocol side, advanced one tick at a time
//! - [`connection`]: public handle: worker task, `send`, `recv`, `close`
//! - [`config`]: tunable constants
//! - [`socket`]: datagram channel trait and UDP implementation
//! - [`simulator`]: lossy/duplicating/reordering in-memory network

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod fragment;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::Config;
pub use connection::{ConnError, Connection};
pub use endpoint::{Endpoint, Stats};
pub use packet::{Marker, Packet, HEADER_LEN};
