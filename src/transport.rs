//! Sending requests to, and receiving notifications from, the kernel.

use std::{
    cell::Cell,
    fmt, io,
    os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd},
};

use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};

use crate::netlink::{self, Groups};

/// A message channel to the kernel's routing subsystem.
pub trait Transport {
    /// Sends the encoded message `msg`.
    ///
    /// The transport assigns the next sequence number, writes it into the message header, and
    /// returns it.
    fn send(&mut self, msg: &mut [u8]) -> io::Result<u32>;

    /// Receives one datagram into `buf`, returning its length.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, msg: &mut [u8]) -> io::Result<u32> {
        (**self).send(msg)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).recv(buf)
    }
}

/// An `AF_NETLINK`/`NETLINK_ROUTE` socket.
pub struct NetlinkSocket {
    sock: Socket,
    seq: Cell<u32>,
}

impl NetlinkSocket {
    /// Opens a routing socket that is subscribed to the multicast `groups`.
    pub fn open(groups: Groups) -> io::Result<Self> {
        let mut sock = Socket::new(NETLINK_ROUTE)?;
        sock.bind(&kernel_addr(groups))?;

        log::debug!("opened netlink socket, groups={:?}", groups);

        Ok(Self {
            sock,
            seq: Cell::new(1),
        })
    }

    /// Sets the size of the kernel's receive buffer for this socket.
    ///
    /// Dump replies on hosts with many interfaces can overflow the default buffer, in which case
    /// messages are lost.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        let size = libc::c_int::try_from(size).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "receive buffer size too large")
        })?;
        self.sock.set_rx_buf_sz(size)
    }

    /// Moves the socket into or out of non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.sock.set_non_blocking(nonblocking)
    }

    /// Assigns the next sequence number to `msg` and sends it to the kernel.
    pub fn send(&self, msg: &mut [u8]) -> io::Result<u32> {
        let seq = self.seq.get();
        netlink::set_sequence(msg, seq)?;

        log::trace!("raw send (seq {}): {:x?}", seq, msg);
        let n = self.sock.send(msg, 0)?;
        if n != msg.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "netlink message was sent partially",
            ));
        }

        self.seq.set(seq.wrapping_add(1).max(1));
        Ok(seq)
    }

    /// Receives one datagram, which may contain several messages.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut buf = buf;
        self.sock.recv(&mut buf, 0)
    }
}

impl fmt::Debug for NetlinkSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetlinkSocket")
            .field("fd", &self.sock.as_raw_fd())
            .field("seq", &self.seq.get())
            .finish()
    }
}

impl Transport for NetlinkSocket {
    fn send(&mut self, msg: &mut [u8]) -> io::Result<u32> {
        NetlinkSocket::send(self, msg)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        NetlinkSocket::recv(self, buf)
    }
}

impl Transport for &NetlinkSocket {
    fn send(&mut self, msg: &mut [u8]) -> io::Result<u32> {
        NetlinkSocket::send(self, msg)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        NetlinkSocket::recv(self, buf)
    }
}

impl AsFd for NetlinkSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.sock.as_fd()
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}

/// The kernel's address (port ID 0), with the multicast `groups` to subscribe to.
fn kernel_addr(groups: Groups) -> SocketAddr {
    SocketAddr::new(0, groups.bits())
}
