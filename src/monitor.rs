//! The interface monitor, tying decoding, the directory and record synchronization together.

use std::{io, net::IpAddr};

use crate::{
    bootstrap::{Bootstrap, BootstrapState},
    directory::{Directory, Interface},
    netlink::{Event, InterfaceIndex, Message, MessageIter, MessageType},
    policy,
    record::{Hostname, RecordStore},
    sync::RecordSync,
    transport::Transport,
    RECV_BUFFER_SIZE,
};

/// Tracks the host's network interfaces and keeps their address records published.
///
/// On creation, the monitor asks the kernel to list all existing links, and once that is done, all
/// existing addresses. Notifications are fed into it via [`InterfaceMonitor::handle_datagram`]
/// (or by running [`InterfaceMonitor::listen`]), and every change that affects which addresses
/// should be announced is forwarded to the [`RecordStore`].
///
/// Dropping the monitor does not withdraw any records.
pub struct InterfaceMonitor<T: Transport, S: RecordStore> {
    transport: T,
    store: S,
    hostname: Hostname,
    directory: Directory,
    bootstrap: Bootstrap,
}

impl<T: Transport, S: RecordStore> InterfaceMonitor<T, S> {
    /// Creates a monitor and starts listing the existing links over `transport`.
    ///
    /// Address records are published in `store`, under the name `<hostname>.local`.
    pub fn new(mut transport: T, store: S, hostname: Hostname) -> Self {
        let bootstrap = Bootstrap::start(&mut transport);
        Self {
            transport,
            store,
            hostname,
            directory: Directory::new(),
            bootstrap,
        }
    }

    /// Processes every message in a datagram received from the kernel.
    ///
    /// Malformed messages are logged and dropped. If a message header is malformed, the rest of
    /// the datagram is dropped as well.
    pub fn handle_datagram(&mut self, datagram: &[u8]) {
        for res in MessageIter::new(datagram) {
            match res {
                Ok(msg) => self.handle_message(msg),
                Err(e) => {
                    log::debug!("dropping rest of datagram: {}", e);
                }
            }
        }
    }

    /// Processes a single message.
    pub fn handle_message(&mut self, msg: Message<'_>) {
        match msg.decode() {
            Ok(Some(event)) => self.handle_event(event),
            Ok(None) => {
                if msg.message_type() == MessageType::OVERRUN {
                    log::warn!("kernel reported lost notifications");
                }
                log::trace!("ignoring {:?}", msg);
            }
            Err(e) => {
                log::debug!("dropping malformed {} message: {}", msg.message_type(), e);
            }
        }
    }

    /// Applies a decoded event to the directory and synchronizes the affected records.
    pub fn handle_event(&mut self, event: Event) {
        log::debug!("{:?}", event);

        let mut sync = RecordSync::new(&mut self.store, &self.hostname);
        match event {
            Event::LinkUpsert(link) => {
                let iface = self
                    .directory
                    .upsert_interface(link.index, link.flags, link.name);
                sync.sync_interface(iface, false);
            }
            Event::LinkRemoved { index } => {
                if !self.directory.remove_interface(index, &mut sync) {
                    log::trace!("removed interface {} was not tracked", index);
                }
            }
            Event::AddressUpsert(info) => {
                let Some(iface) = self.directory.find_interface_mut(info.index) else {
                    log::debug!(
                        "ignoring address {} on unknown interface {}",
                        info.address,
                        info.index
                    );
                    return;
                };
                let flags = iface.flags();
                let addr =
                    iface.upsert_address(info.address, info.prefix_len, info.flags, info.scope);
                sync.sync_address(flags, addr, false);
            }
            Event::AddressRemoved(info) => {
                let Some(iface) = self.directory.find_interface_mut(info.index) else {
                    log::debug!(
                        "ignoring removal of {} from unknown interface {}",
                        info.address,
                        info.index
                    );
                    return;
                };
                iface.remove_address(&info.address, &mut sync);
            }
            Event::ListingDone { seq } => {
                self.bootstrap.listing_done(seq, &mut self.transport);
            }
            Event::ListingError { seq, errno } => {
                self.bootstrap.listing_error(seq, errno);
            }
        }
    }

    /// Receives and processes notifications until the transport fails.
    ///
    /// Lost notifications (`ENOBUFS`) and interrupted receives are logged and do not end the loop.
    pub fn listen(&mut self) -> io::Result<()> {
        let mut recv_buf = [0; RECV_BUFFER_SIZE];
        loop {
            let len = match self.transport.recv(&mut recv_buf) {
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

            self.handle_datagram(datagram);
        }
    }

    pub fn get_interface(&self, index: InterfaceIndex) -> Option<&Interface> {
        self.directory.find_interface(index)
    }

    /// Returns the oldest tracked interface.
    pub fn first_interface(&self) -> Option<&Interface> {
        self.directory.first_interface()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> + '_ {
        self.directory.interfaces()
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Returns whether the interface `index` is tracked and eligible for announcements.
    pub fn interface_is_relevant(&self, index: InterfaceIndex) -> bool {
        self.get_interface(index)
            .map_or(false, policy::interface_is_relevant)
    }

    /// Returns whether `address` is assigned to interface `index` and should be announced.
    pub fn address_is_relevant(&self, index: InterfaceIndex, address: &IpAddr) -> bool {
        self.get_interface(index).map_or(false, |iface| {
            iface
                .find_address(address)
                .map_or(false, |addr| policy::address_is_relevant(iface, addr))
        })
    }

    #[inline]
    pub fn bootstrap_state(&self) -> BootstrapState {
        self.bootstrap.state()
    }

    #[inline]
    pub fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    #[inline]
    pub fn record_store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
