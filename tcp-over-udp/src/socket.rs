//! Datagram channel abstraction.
//!
//! The protocol only needs two non-blocking primitives from the network:
//! "send this datagram to the peer" and "give me a datagram if one is
//! waiting".  [`DatagramChannel`] captures exactly that, so the worker loop
//! runs unchanged over a real [`Socket`] or over
//! [`crate::simulator::SimChannel`].
//!
//! Both methods are `&self` and synchronous: the worker calls them while
//! holding the endpoint lock, and they never wait.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// A non-blocking, unreliable datagram link to one fixed peer.
pub trait DatagramChannel: Send + Sync {
    /// Hand one datagram to the network.  Delivery is not guaranteed.
    ///
    /// `Err` with [`io::ErrorKind::WouldBlock`] means the datagram was not
    /// taken and should be offered again on a later tick.
    fn try_send(&self, datagram: &[u8]) -> io::Result<()>;

    /// Copy the next waiting datagram into `buf`.
    ///
    /// Returns `Ok(None)` when nothing is available (or the condition is
    /// transient and worth retrying next tick); `Err` only for a genuine
    /// channel failure.
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Returns true if the error is transient (retry next tick may succeed).
pub fn is_transient_io_error(e: &io::Error) -> bool {
    use io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}

/// A UDP socket bound locally and fixed to a single remote peer.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    /// The only peer datagrams are sent to or accepted from.
    pub remote_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr` and pin it to `remote_addr`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr, remote_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        // tokio reports WouldBlock from try_send_to until the reactor has
        // seen the socket writable once.
        inner.writable().await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            remote_addr,
            inner,
        })
    }
}

impl DatagramChannel for Socket {
    fn try_send(&self, datagram: &[u8]) -> io::Result<()> {
        match self.inner.try_send_to(datagram, self.remote_addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(e),
            // ICMP errors from an absent peer look like loss downstream.
            Err(e) if is_transient_io_error(&e) => {
                log::trace!("send to {} dropped: {e}", self.remote_addr);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match self.inner.try_recv_from(buf) {
                Ok((n, from)) if from == self.remote_addr => return Ok(Some(n)),
                Ok((n, from)) => {
                    log::trace!("ignoring {n}-byte datagram from stranger {from}");
                }
                Err(e) if is_transient_io_error(&e) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }
}
