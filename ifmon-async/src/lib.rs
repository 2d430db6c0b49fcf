//! Asynchronous network interface monitor.

use std::{future::Future, io};

use async_io::Async;
use futures_lite::future;

pub use ifmon::*;

/// A [`NetlinkSocket`] registered with the `async-io` reactor.
pub struct AsyncNetlink(Async<NetlinkSocket>);

impl AsyncNetlink {
    /// Opens a non-blocking routing socket subscribed to `groups`.
    pub fn open(groups: Groups) -> io::Result<Self> {
        Ok(Self(Async::new(NetlinkSocket::open(groups)?)?))
    }

    /// Returns the underlying socket.
    pub fn get_ref(&self) -> &NetlinkSocket {
        self.0.get_ref()
    }

    /// Waits for the next datagram and receives it into `buf`.
    pub async fn recv_async(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read_with(|sock| sock.recv(buf)).await
    }
}

impl Transport for AsyncNetlink {
    // Requests are tiny and go straight to the kernel, so sending does not need to wait for
    // writability.
    fn send(&mut self, msg: &mut [u8]) -> io::Result<u32> {
        self.0.get_ref().send(msg)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.get_ref().recv(buf)
    }
}

/// Asynchronous [`InterfaceMonitor`] listening on a netlink socket.
pub struct AsyncInterfaceMonitor<S: RecordStore> {
    mon: InterfaceMonitor<AsyncNetlink, S>,
}

impl<S: RecordStore> AsyncInterfaceMonitor<S> {
    /// Opens a netlink socket and starts listing the existing links and addresses.
    pub fn new(store: S, hostname: Hostname) -> io::Result<Self> {
        let sock = AsyncNetlink::open(Groups::INTERFACES)?;
        Ok(Self {
            mon: InterfaceMonitor::new(sock, store, hostname),
        })
    }

    /// Receives and processes notifications until the socket fails.
    pub async fn listen(&mut self) -> io::Result<()> {
        let mut recv_buf = vec![0; RECV_BUFFER_SIZE];
        loop {
            let len = match self.mon.transport().recv_async(&mut recv_buf).await {
                Ok(len) => len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    log::warn!("receive buffer overrun, notifications were lost");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let datagram = &recv_buf[..len];

            log::trace!("raw recv: {:x?}", datagram);

            self.mon.handle_datagram(datagram);
        }
    }

    /// Like [`AsyncInterfaceMonitor::listen`], but returns `Ok(())` as soon as `stop` completes.
    pub async fn listen_until(&mut self, stop: impl Future<Output = ()>) -> io::Result<()> {
        future::or(self.listen(), async {
            stop.await;
            Ok(())
        })
        .await
    }

    #[inline]
    pub fn bootstrap_state(&self) -> BootstrapState {
        self.mon.bootstrap_state()
    }

    #[inline]
    pub fn monitor(&self) -> &InterfaceMonitor<AsyncNetlink, S> {
        &self.mon
    }

    /// Returns the wrapped monitor.
    ///
    /// Its transport stays in non-blocking mode, so [`InterfaceMonitor::listen`] fails with
    /// [`io::ErrorKind::WouldBlock`] as soon as no datagram is pending. Wait for readability on
    /// the reactor and feed datagrams to [`InterfaceMonitor::handle_datagram`] instead.
    #[inline]
    pub fn into_inner(self) -> InterfaceMonitor<AsyncNetlink, S> {
        self.mon
    }
}
