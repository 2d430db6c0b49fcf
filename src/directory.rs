//! The set of tracked interfaces and their addresses.

use std::{collections::HashMap, fmt, net::IpAddr};

use crate::{
    netlink::{AddressFlags, InterfaceFlags, InterfaceIndex, Scope},
    record::{RecordId, RecordStore},
    sync::RecordSync,
};

/// A network interface tracked by the [`Directory`].
#[derive(Debug)]
pub struct Interface {
    index: InterfaceIndex,
    name: Option<String>,
    flags: InterfaceFlags,
    addresses: Vec<InterfaceAddress>,
    ipv4_count: usize,
    ipv6_count: usize,
}

impl Interface {
    fn new(index: InterfaceIndex, flags: InterfaceFlags) -> Self {
        Self {
            index,
            name: None,
            flags,
            addresses: Vec::new(),
            ipv4_count: 0,
            ipv6_count: 0,
        }
    }

    #[inline]
    pub fn index(&self) -> InterfaceIndex {
        self.index
    }

    /// Returns the interface name, if the kernel has told us about it yet.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn flags(&self) -> InterfaceFlags {
        self.flags
    }

    /// Returns the addresses assigned to this interface, oldest first.
    #[inline]
    pub fn addresses(&self) -> &[InterfaceAddress] {
        &self.addresses
    }

    /// Returns the number of IPv4 addresses assigned to this interface.
    #[inline]
    pub fn ipv4_count(&self) -> usize {
        self.ipv4_count
    }

    /// Returns the number of IPv6 addresses assigned to this interface.
    #[inline]
    pub fn ipv6_count(&self) -> usize {
        self.ipv6_count
    }

    pub fn find_address(&self, address: &IpAddr) -> Option<&InterfaceAddress> {
        self.addresses.iter().find(|a| a.address == *address)
    }

    pub(crate) fn addresses_mut(&mut self) -> &mut [InterfaceAddress] {
        &mut self.addresses
    }

    fn position(&self, address: &IpAddr) -> Option<usize> {
        self.addresses.iter().position(|a| a.address == *address)
    }

    /// Adds `address` to this interface, or updates its flags and scope if it is already present.
    ///
    /// The record of the returned address is not touched; the caller has to synchronize it.
    pub fn upsert_address(
        &mut self,
        address: IpAddr,
        prefix_len: u8,
        flags: AddressFlags,
        scope: Scope,
    ) -> &mut InterfaceAddress {
        let pos = match self.position(&address) {
            Some(pos) => pos,
            None => {
                match address {
                    IpAddr::V4(_) => self.ipv4_count += 1,
                    IpAddr::V6(_) => self.ipv6_count += 1,
                }
                self.addresses.push(InterfaceAddress {
                    address,
                    owner: self.index,
                    prefix_len,
                    flags,
                    scope,
                    record: None,
                });
                self.addresses.len() - 1
            }
        };

        let addr = &mut self.addresses[pos];
        addr.prefix_len = prefix_len;
        addr.flags = flags;
        addr.scope = scope;
        addr
    }

    /// Withdraws the record of `address` and removes it from this interface.
    ///
    /// Returns `false` if the address was not assigned to this interface.
    pub fn remove_address<S: RecordStore + ?Sized>(
        &mut self,
        address: &IpAddr,
        sync: &mut RecordSync<'_, S>,
    ) -> bool {
        let Some(pos) = self.position(address) else {
            return false;
        };

        sync.sync_address(self.flags, &mut self.addresses[pos], true);
        self.discard(pos);
        true
    }

    fn discard(&mut self, pos: usize) {
        let addr = self.addresses.remove(pos);
        debug_assert!(
            addr.record.is_none(),
            "discarding {} with a published record",
            addr.address
        );
        match addr.address {
            IpAddr::V4(_) => self.ipv4_count -= 1,
            IpAddr::V6(_) => self.ipv6_count -= 1,
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} <", self.index, self.name().unwrap_or("?"))?;
        for (i, (name, _)) in self.flags.iter_names().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            f.write_str(name)?;
        }
        f.write_str(">")?;
        for addr in &self.addresses {
            write!(f, "\n    {}", addr)?;
        }
        Ok(())
    }
}

/// An IP address assigned to an [`Interface`].
#[derive(Debug)]
pub struct InterfaceAddress {
    address: IpAddr,
    owner: InterfaceIndex,
    prefix_len: u8,
    flags: AddressFlags,
    scope: Scope,
    pub(crate) record: Option<RecordId>,
}

impl InterfaceAddress {
    #[inline]
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Returns the index of the interface this address is assigned to.
    #[inline]
    pub fn owner(&self) -> InterfaceIndex {
        self.owner
    }

    #[inline]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    #[inline]
    pub fn flags(&self) -> AddressFlags {
        self.flags
    }

    #[inline]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns the handle of the DNS record published for this address, if any.
    #[inline]
    pub fn record(&self) -> Option<RecordId> {
        self.record
    }

    #[inline]
    pub fn is_published(&self) -> bool {
        self.record.is_some()
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = if self.address.is_ipv4() {
            "inet"
        } else {
            "inet6"
        };
        write!(
            f,
            "{} {}/{} scope {}",
            family, self.address, self.prefix_len, self.scope
        )?;
        if let Some(id) = self.record {
            write!(f, " published {}", id)?;
        }
        Ok(())
    }
}

/// All tracked interfaces, by index.
#[derive(Debug, Default)]
pub struct Directory {
    interfaces: HashMap<InterfaceIndex, Interface>,
    /// Insertion order, for enumeration. Always holds exactly the keys of `interfaces`.
    order: Vec<InterfaceIndex>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the interface `index`, creating it if it is not yet tracked.
    ///
    /// `name` replaces the stored name only if it is `Some`.
    pub fn upsert_interface(
        &mut self,
        index: InterfaceIndex,
        flags: InterfaceFlags,
        name: Option<String>,
    ) -> &mut Interface {
        let order = &mut self.order;
        let iface = self.interfaces.entry(index).or_insert_with(|| {
            order.push(index);
            Interface::new(index, flags)
        });
        iface.flags = flags;
        if name.is_some() {
            iface.name = name;
        }
        iface
    }

    /// Removes the interface `index`, withdrawing the records of all of its addresses first.
    ///
    /// Returns `false` if no such interface was tracked.
    pub fn remove_interface<S: RecordStore + ?Sized>(
        &mut self,
        index: InterfaceIndex,
        sync: &mut RecordSync<'_, S>,
    ) -> bool {
        let Some(iface) = self.interfaces.get_mut(&index) else {
            return false;
        };

        sync.sync_interface(iface, true);
        while !iface.addresses.is_empty() {
            iface.discard(iface.addresses.len() - 1);
        }
        debug_assert_eq!(iface.ipv4_count, 0);
        debug_assert_eq!(iface.ipv6_count, 0);

        self.interfaces.remove(&index);
        self.order.retain(|&i| i != index);
        true
    }

    #[inline]
    pub fn find_interface(&self, index: InterfaceIndex) -> Option<&Interface> {
        self.interfaces.get(&index)
    }

    #[inline]
    pub fn find_interface_mut(&mut self, index: InterfaceIndex) -> Option<&mut Interface> {
        self.interfaces.get_mut(&index)
    }

    /// Returns the interface that was inserted first, if any.
    pub fn first_interface(&self) -> Option<&Interface> {
        self.order.first().and_then(|i| self.interfaces.get(i))
    }

    /// Returns an iterator over all tracked interfaces, in insertion order.
    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> + '_ {
        self.order.iter().filter_map(|i| self.interfaces.get(i))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for iface in self.interfaces() {
            writeln!(f, "{}", iface)?;
        }
        Ok(())
    }
}
