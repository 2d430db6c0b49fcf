//! Network interface monitor for mDNS responders.
//!
//! Tracks the host's network interfaces and their IP addresses via Linux rtnetlink
//! notifications, and keeps a set of `A`/`AAAA` address records for the responder's host name in
//! sync with them: an address record is published for every globally scoped address on an
//! interface that is up, running, and not a loopback device, and withdrawn as soon as that stops
//! being the case.
//!
//! The entry point is [`InterfaceMonitor`], which needs a [`Transport`] (normally a
//! [`NetlinkSocket`]) and a [`RecordStore`] to publish records in (for example a [`RecordTable`]).

pub mod bootstrap;
pub mod directory;
pub mod monitor;
pub mod netlink;
pub mod policy;
pub mod record;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod testing;

pub use bootstrap::BootstrapState;
pub use directory::{Directory, Interface, InterfaceAddress};
pub use monitor::InterfaceMonitor;
pub use netlink::{Groups, InterfaceIndex};
pub use record::{Hostname, RecordId, RecordStore, RecordTable};
pub use transport::{NetlinkSocket, Transport};

/// Size of netlink receive buffers.
///
/// Dump replies batch many messages into one datagram, and the kernel truncates datagrams that do
/// not fit into the buffer, so this has to be considerably larger than a single message.
pub const RECV_BUFFER_SIZE: usize = 16384;
