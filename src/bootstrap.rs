//! Startup enumeration of existing links, then existing addresses.

use std::io;

use crate::{
    netlink::{encode_list_request, MessageType},
    transport::Transport,
};

/// Progress of the startup listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Waiting for the link dump to complete.
    ListingLinks,
    /// Waiting for the address dump to complete.
    ListingAddresses,
    /// Both dumps are complete (or could not be requested).
    Done,
}

/// Requests a dump of all links, and once that is complete, a dump of all addresses.
///
/// The state only ever moves forward. Incremental notifications are unaffected by it.
#[derive(Debug)]
pub struct Bootstrap {
    state: BootstrapState,
    links_seq: Option<u32>,
    addresses_seq: Option<u32>,
}

impl Bootstrap {
    /// Sends the link dump request.
    ///
    /// If the request cannot be sent, the failure is logged and the bootstrap is [`Done`] right
    /// away; only incremental notifications will populate the directory in that case.
    ///
    /// [`Done`]: BootstrapState::Done
    pub fn start<T: Transport + ?Sized>(transport: &mut T) -> Self {
        match request_listing(transport, MessageType::GETLINK) {
            Ok(seq) => {
                log::debug!("listing links (seq {})", seq);
                Self {
                    state: BootstrapState::ListingLinks,
                    links_seq: Some(seq),
                    addresses_seq: None,
                }
            }
            Err(e) => {
                log::warn!("failed to request link listing: {}", e);
                Self {
                    state: BootstrapState::Done,
                    links_seq: None,
                    addresses_seq: None,
                }
            }
        }
    }

    #[inline]
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Returns whether `seq` belongs to one of the listing requests that were sent.
    pub fn is_outstanding(&self, seq: u32) -> bool {
        self.links_seq == Some(seq) || self.addresses_seq == Some(seq)
    }

    /// Advances the state after the dump answering `seq` has completed.
    pub fn listing_done<T: Transport + ?Sized>(&mut self, seq: u32, transport: &mut T) {
        match self.state {
            BootstrapState::ListingLinks if self.links_seq == Some(seq) => {
                match request_listing(transport, MessageType::GETADDR) {
                    Ok(seq) => {
                        log::debug!("listing addresses (seq {})", seq);
                        self.addresses_seq = Some(seq);
                        self.state = BootstrapState::ListingAddresses;
                    }
                    Err(e) => {
                        log::warn!("failed to request address listing: {}", e);
                        self.state = BootstrapState::Done;
                    }
                }
            }
            BootstrapState::ListingAddresses if self.addresses_seq == Some(seq) => {
                log::debug!("initial listing complete");
                self.state = BootstrapState::Done;
            }
            _ => {
                log::trace!("ignoring end of dump (seq {}) in state {:?}", seq, self.state);
            }
        }
    }

    /// Reports an error reply to one of the listing requests.
    ///
    /// The state is not changed.
    pub fn listing_error(&self, seq: u32, errno: i32) {
        let error = io::Error::from_raw_os_error(errno);
        if self.is_outstanding(seq) {
            log::warn!("listing request (seq {}) failed: {}", seq, error);
        } else {
            log::debug!("error reply to unknown request (seq {}): {}", seq, error);
        }
    }
}

fn request_listing<T: Transport + ?Sized>(transport: &mut T, ty: MessageType) -> io::Result<u32> {
    let mut buf = [0; 32];
    let msg = encode_list_request(&mut buf, ty)?;
    transport.send(msg)
}
