//! Decoder and encoder for the subset of rtnetlink needed to track interfaces and addresses.
//!
//! Netlink messages use the host's native byte order, so unlike DNS messages no byte swapping is
//! done here. All wire structures are `#[repr(C, packed)]` and read with
//! [`bytemuck::pod_read_unaligned`], since datagram buffers make no alignment promises.

#[macro_use]
mod macros;
pub mod decoder;
pub mod encoder;
mod error;

use core::fmt;
use std::num::NonZeroU32;

use bitflags::bitflags;

pub use decoder::{AddressInfo, Event, LinkInfo, Message, MessageIter};
pub use encoder::{encode_list_request, set_sequence, MessageEncoder};
pub use error::Error;

/// Netlink messages and attributes are padded to multiples of this many bytes.
pub(crate) const ALIGNTO: usize = 4;

pub(crate) const fn align(len: usize) -> usize {
    (len + ALIGNTO - 1) & !(ALIGNTO - 1)
}

ffi_enum! {
    /// Netlink message types.
    ///
    /// Contains the generic control messages as well as the route-family messages for links and
    /// addresses.
    pub enum MessageType: u16 {
        /// Message is to be ignored.
        NOOP = 1,
        /// Error reply (or acknowledgement, if the error code is 0).
        ERROR = 2,
        /// Terminates a multipart dump reply.
        DONE = 3,
        /// Data was lost.
        OVERRUN = 4,

        /// A link was created or changed.
        NEWLINK = 16,
        /// A link was removed.
        DELLINK = 17,
        /// Request for link information; with [`MessageFlags::DUMP`] lists all links.
        GETLINK = 18,

        /// An address was added or changed.
        NEWADDR = 20,
        /// An address was removed.
        DELADDR = 21,
        /// Request for address information; with [`MessageFlags::DUMP`] lists all addresses.
        GETADDR = 22,
    }
}

ffi_enum! {
    /// Address families as used in link and address messages.
    pub enum AddressFamily: u8 {
        /// Wildcard family. Link messages always use this.
        UNSPEC = 0,
        INET = 2,
        INET6 = 10,
    }
}

ffi_enum! {
    /// Address scopes.
    ///
    /// Only [`Scope::UNIVERSE`] addresses are reachable from other hosts on the network and are
    /// therefore worth announcing.
    pub enum Scope: u8 {
        /// Global address.
        UNIVERSE = 0,
        SITE = 200,
        /// Link-local address (eg. `fe80::/10`).
        LINK = 253,
        /// Address is only valid on this host (eg. `127.0.0.1`).
        HOST = 254,
        NOWHERE = 255,
    }
}

ffi_enum! {
    /// Attribute types attached to link messages.
    pub enum LinkAttr: u16 {
        UNSPEC = 0,
        ADDRESS = 1,
        BROADCAST = 2,
        /// NUL-terminated interface name.
        IFNAME = 3,
        MTU = 4,
        LINK = 5,
        QDISC = 6,
        STATS = 7,
        OPERSTATE = 16,
    }
}

ffi_enum! {
    /// Attribute types attached to address messages.
    pub enum AddrAttr: u16 {
        UNSPEC = 0,
        /// The interface address (the peer address on point-to-point links).
        ADDRESS = 1,
        /// The local address.
        LOCAL = 2,
        LABEL = 3,
        BROADCAST = 4,
        ANYCAST = 5,
        CACHEINFO = 6,
        MULTICAST = 7,
        FLAGS = 8,
    }
}

bitflags! {
    /// Network device flags (`IFF_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct InterfaceFlags: u32 {
        /// Interface is administratively up.
        const UP = 1 << 0;
        const BROADCAST = 1 << 1;
        const DEBUG = 1 << 2;
        const LOOPBACK = 1 << 3;
        const POINTOPOINT = 1 << 4;
        const NOTRAILERS = 1 << 5;
        /// Interface is operationally running (resources allocated).
        const RUNNING = 1 << 6;
        const NOARP = 1 << 7;
        const PROMISC = 1 << 8;
        const ALLMULTI = 1 << 9;
        const MASTER = 1 << 10;
        const SLAVE = 1 << 11;
        const MULTICAST = 1 << 12;
        const PORTSEL = 1 << 13;
        const AUTOMEDIA = 1 << 14;
        const DYNAMIC = 1 << 15;
        /// Driver signals L1 up.
        const LOWER_UP = 1 << 16;
        const DORMANT = 1 << 17;
        const ECHO = 1 << 18;
    }
}

bitflags! {
    /// Address flags (`IFA_F_*`) from the fixed address message header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct AddressFlags: u8 {
        const SECONDARY = 0x01;
        const NODAD = 0x02;
        const OPTIMISTIC = 0x04;
        const DADFAILED = 0x08;
        const HOMEADDRESS = 0x10;
        const DEPRECATED = 0x20;
        const TENTATIVE = 0x40;
        const PERMANENT = 0x80;
    }
}

bitflags! {
    /// Netlink message header flags (`NLM_F_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct MessageFlags: u16 {
        /// Message is a request.
        const REQUEST = 0x01;
        /// Message is part of a multipart reply terminated by [`MessageType::DONE`].
        const MULTI = 0x02;
        const ACK = 0x04;
        const ECHO = 0x08;
        /// The dump was interrupted by a concurrent change and may be inconsistent.
        const DUMP_INTR = 0x10;

        const ROOT = 0x100;
        const MATCH = 0x200;
        const ATOMIC = 0x400;
        /// Return all matching entries.
        const DUMP = Self::ROOT.bits() | Self::MATCH.bits();
    }
}

bitflags! {
    /// rtnetlink multicast groups a socket can subscribe to (`RTMGRP_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct Groups: u32 {
        const LINK = 0x1;
        const NOTIFY = 0x2;
        const NEIGH = 0x4;
        const TC = 0x8;
        const IPV4_IFADDR = 0x10;
        const IPV6_IFADDR = 0x100;

        /// Everything an interface monitor needs: link changes and IPv4/IPv6 address changes.
        const INTERFACES = Self::LINK.bits() | Self::IPV4_IFADDR.bits() | Self::IPV6_IFADDR.bits();
    }
}

/// Stable, kernel-assigned interface index.
///
/// Interface indices are always positive.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceIndex(NonZeroU32);

impl InterfaceIndex {
    /// Creates an [`InterfaceIndex`], returning [`None`] if `index` is 0.
    #[inline]
    pub fn new(index: u32) -> Option<Self> {
        NonZeroU32::new(index).map(Self)
    }

    /// Converts the signed index used in link info headers, rejecting non-positive values.
    pub fn from_raw(index: i32) -> Option<Self> {
        u32::try_from(index).ok().and_then(Self::new)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for InterfaceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for InterfaceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Netlink message header (`struct nlmsghdr`).
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct Header {
    len: u32,
    type_: MessageType,
    flags: u16,
    seq: u32,
    pid: u32,
}

impl Header {
    /// Returns the length of the message, including this header.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.type_
    }

    #[inline]
    pub fn flags(&self) -> MessageFlags {
        MessageFlags::from_bits_retain(self.flags)
    }

    /// Returns the sequence number.
    ///
    /// Replies to a request carry the request's sequence number. Unsolicited notifications use 0.
    #[inline]
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Returns the port ID of the sender (0 for the kernel).
    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn set_len(&mut self, len: u32) {
        self.len = len;
    }

    fn set_seq(&mut self, seq: u32) {
        self.seq = seq;
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("len", &self.len())
            .field("type", &self.message_type())
            .field("flags", &self.flags())
            .field("seq", &self.seq())
            .field("pid", &self.pid())
            .finish()
    }
}

/// Fixed header of link messages (`struct ifinfomsg`).
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct LinkInfoHeader {
    family: AddressFamily,
    _pad: u8,
    type_: u16,
    index: i32,
    flags: u32,
    change: u32,
}

impl LinkInfoHeader {
    pub fn new(family: AddressFamily, index: i32, flags: InterfaceFlags) -> Self {
        Self {
            family,
            _pad: 0,
            type_: 0,
            index,
            flags: flags.bits(),
            change: 0,
        }
    }

    #[inline]
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    #[inline]
    pub fn index(&self) -> i32 {
        self.index
    }

    #[inline]
    pub fn flags(&self) -> InterfaceFlags {
        InterfaceFlags::from_bits_retain(self.flags)
    }

    /// Returns the ARP hardware type of the device.
    #[inline]
    pub fn link_type(&self) -> u16 {
        self.type_
    }

    /// Returns the mask of flags that changed with this message.
    #[inline]
    pub fn change(&self) -> InterfaceFlags {
        InterfaceFlags::from_bits_retain(self.change)
    }
}

/// Fixed header of address messages (`struct ifaddrmsg`).
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct AddrInfoHeader {
    family: AddressFamily,
    prefix_len: u8,
    flags: u8,
    scope: Scope,
    index: u32,
}

impl AddrInfoHeader {
    pub fn new(
        family: AddressFamily,
        prefix_len: u8,
        flags: AddressFlags,
        scope: Scope,
        index: u32,
    ) -> Self {
        Self {
            family,
            prefix_len,
            flags: flags.bits(),
            scope,
            index,
        }
    }

    #[inline]
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    #[inline]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    #[inline]
    pub fn flags(&self) -> AddressFlags {
        AddressFlags::from_bits_retain(self.flags)
    }

    #[inline]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Header preceding every attribute (`struct rtattr`).
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub(crate) struct AttrHeader {
    len: u16,
    type_: u16,
}

/// The payload of [`MessageType::GETLINK`] and [`MessageType::GETADDR`] dump requests
/// (`struct rtgenmsg`).
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub(crate) struct GenericHeader {
    family: AddressFamily,
}

impl GenericHeader {
    pub(crate) fn new(family: AddressFamily) -> Self {
        Self { family }
    }
}
