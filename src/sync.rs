//! Keeps the published address records in line with the relevance policy.

use crate::{
    directory::{Interface, InterfaceAddress},
    netlink::{AddressFamily, InterfaceFlags},
    policy,
    record::{Hostname, RecordStore},
};

/// Publishes and withdraws address records in a [`RecordStore`].
pub struct RecordSync<'a, S: RecordStore + ?Sized> {
    store: &'a mut S,
    hostname: &'a Hostname,
}

impl<'a, S: RecordStore + ?Sized> RecordSync<'a, S> {
    pub fn new(store: &'a mut S, hostname: &'a Hostname) -> Self {
        Self { store, hostname }
    }

    /// Publishes or withdraws the record of `addr`, depending on whether it is relevant.
    ///
    /// `owner_flags` are the flags of the interface owning `addr`. If `force_withdraw` is `true`,
    /// the record is withdrawn regardless of relevance.
    ///
    /// Publishing and withdrawing are idempotent: an address that already has a record is not
    /// republished, and an address without one is not withdrawn.
    pub fn sync_address(
        &mut self,
        owner_flags: InterfaceFlags,
        addr: &mut InterfaceAddress,
        force_withdraw: bool,
    ) {
        let relevant =
            policy::flags_are_relevant(owner_flags) && policy::scope_is_relevant(addr.scope());

        if force_withdraw || !relevant {
            if let Some(id) = addr.record.take() {
                log::debug!(
                    "withdrawing record {} for {} on interface {}",
                    id,
                    addr.address(),
                    addr.owner(),
                );
                self.store.withdraw(id);
            }
        } else if addr.record.is_none() {
            let id = self.store.next_id();
            log::debug!(
                "publishing record {} for {} on interface {}",
                id,
                addr.address(),
                addr.owner(),
            );
            self.store.publish(
                id,
                addr.owner(),
                AddressFamily::UNSPEC,
                self.hostname,
                addr.address(),
            );
            addr.record = Some(id);
        }
    }

    /// Synchronizes every address of `iface`.
    pub fn sync_interface(&mut self, iface: &mut Interface, force_withdraw: bool) {
        let flags = iface.flags();
        for addr in iface.addresses_mut() {
            self.sync_address(flags, addr, force_withdraw);
        }
    }
}
