//! Decides which interfaces and addresses get announced.

use crate::{
    directory::{Interface, InterfaceAddress},
    netlink::{InterfaceFlags, Scope},
};

/// Returns whether an interface with `flags` is eligible for announcements.
///
/// The interface has to be up and running, and must not be a loopback device.
pub fn flags_are_relevant(flags: InterfaceFlags) -> bool {
    flags.contains(InterfaceFlags::UP | InterfaceFlags::RUNNING)
        && !flags.contains(InterfaceFlags::LOOPBACK)
}

pub fn interface_is_relevant(iface: &Interface) -> bool {
    flags_are_relevant(iface.flags())
}

/// Returns whether `addr`, owned by `owner`, should have a published address record.
///
/// Only globally scoped addresses on relevant interfaces are announced.
pub fn address_is_relevant(owner: &Interface, addr: &InterfaceAddress) -> bool {
    debug_assert_eq!(owner.index(), addr.owner());
    scope_is_relevant(addr.scope()) && interface_is_relevant(owner)
}

pub(crate) fn scope_is_relevant(scope: Scope) -> bool {
    scope == Scope::UNIVERSE
}
