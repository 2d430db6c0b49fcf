//! Message builders and test doubles shared by the unit tests.

use std::{collections::VecDeque, io, net::IpAddr};

use bytemuck::Zeroable;

use crate::{
    directory::{Interface, InterfaceAddress},
    netlink::{
        self, AddrAttr, AddrInfoHeader, AddressFamily, AddressFlags, Header, InterfaceFlags,
        InterfaceIndex, LinkAttr, LinkInfoHeader, MessageEncoder, MessageFlags, MessageIter,
        MessageType, Scope,
    },
    record::{Hostname, RecordId, RecordStore},
    transport::Transport,
};

pub fn index(i: u32) -> InterfaceIndex {
    InterfaceIndex::new(i).unwrap()
}

/// Adds `addr` to `iface` without synchronizing its record.
pub fn add_address<'a>(
    iface: &'a mut Interface,
    addr: &str,
    scope: Scope,
) -> &'a mut InterfaceAddress {
    let addr: IpAddr = addr.parse().unwrap();
    let prefix_len = if addr.is_ipv4() { 24 } else { 64 };
    iface.upsert_address(addr, prefix_len, AddressFlags::empty(), scope)
}

fn finish(mut buf: Vec<u8>, enc: impl FnOnce(&mut [u8]) -> usize) -> Vec<u8> {
    let len = enc(&mut buf);
    buf.truncate(len);
    buf
}

/// A link notification, optionally carrying the interface name.
pub fn link_message(
    ty: MessageType,
    index: i32,
    flags: InterfaceFlags,
    name: Option<&str>,
) -> Vec<u8> {
    finish(vec![0; 128], |buf| {
        let mut enc = MessageEncoder::new(buf, ty, MessageFlags::empty());
        enc.push(LinkInfoHeader::new(AddressFamily::UNSPEC, index, flags));
        if let Some(name) = name {
            let mut data = name.as_bytes().to_vec();
            data.push(0);
            enc.attribute(LinkAttr::IFNAME.to_raw(), &data);
        }
        enc.finish().unwrap()
    })
}

/// An address notification for a permanent address with a typical prefix length.
pub fn address_message(ty: MessageType, index: u32, addr: IpAddr, scope: Scope) -> Vec<u8> {
    let (family, prefix_len, octets) = match addr {
        IpAddr::V4(ip) => (AddressFamily::INET, 24, ip.octets().to_vec()),
        IpAddr::V6(ip) => (AddressFamily::INET6, 64, ip.octets().to_vec()),
    };
    finish(vec![0; 128], |buf| {
        let mut enc = MessageEncoder::new(buf, ty, MessageFlags::empty());
        enc.push(AddrInfoHeader::new(
            family,
            prefix_len,
            AddressFlags::PERMANENT,
            scope,
            index,
        ));
        enc.attribute(AddrAttr::ADDRESS.to_raw(), &octets);
        enc.finish().unwrap()
    })
}

/// The end of a dump reply to request `seq`.
pub fn done_message(seq: u32) -> Vec<u8> {
    finish(vec![0; 32], |buf| {
        let mut enc = MessageEncoder::new(buf, MessageType::DONE, MessageFlags::MULTI);
        enc.set_sequence(seq);
        enc.push(0i32);
        enc.finish().unwrap()
    })
}

/// An error reply to request `seq`. `error` is a negated errno, or 0 for an acknowledgement.
pub fn error_message(seq: u32, error: i32) -> Vec<u8> {
    finish(vec![0; 64], |buf| {
        let mut enc = MessageEncoder::new(buf, MessageType::ERROR, MessageFlags::empty());
        enc.set_sequence(seq);
        enc.push(error);
        enc.push(Header::zeroed());
        enc.finish().unwrap()
    })
}

/// In-memory [`Transport`] that records sent requests and replays queued datagrams and errors.
#[derive(Debug)]
pub struct MockTransport {
    /// Type and assigned sequence number of every successfully sent message.
    pub sent: Vec<(MessageType, u32)>,
    next_seq: u32,
    failing: Vec<MessageType>,
    incoming: VecDeque<io::Result<Vec<u8>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            next_seq: 1,
            failing: Vec::new(),
            incoming: VecDeque::new(),
        }
    }

    /// Makes sending messages of type `ty` fail.
    pub fn fail_on(&mut self, ty: MessageType) {
        self.failing.push(ty);
    }

    /// Queues a datagram to be returned by [`Transport::recv`].
    pub fn push_incoming(&mut self, datagram: Vec<u8>) {
        self.incoming.push_back(Ok(datagram));
    }

    /// Queues an error to be returned by [`Transport::recv`].
    pub fn push_recv_error(&mut self, error: io::Error) {
        self.incoming.push_back(Err(error));
    }
}

impl Transport for MockTransport {
    fn send(&mut self, msg: &mut [u8]) -> io::Result<u32> {
        let ty = MessageIter::new(msg)
            .next()
            .expect("empty message")
            .expect("malformed message")
            .message_type();
        if self.failing.contains(&ty) {
            return Err(io::Error::new(io::ErrorKind::Other, "send failed"));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        netlink::set_sequence(msg, seq).unwrap();
        self.sent.push((ty, seq));
        Ok(seq)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let datagram = self
            .incoming
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))??;
        buf[..datagram.len()].copy_from_slice(&datagram);
        Ok(datagram.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Publish {
        id: RecordId,
        interface: InterfaceIndex,
        address: IpAddr,
    },
    Withdraw(RecordId),
}

/// [`RecordStore`] that only records the calls made to it.
#[derive(Debug, Default)]
pub struct RecordingStore {
    pub calls: Vec<StoreCall>,
    next: u32,
}

impl RecordingStore {
    pub fn publishes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, StoreCall::Publish { .. }))
            .count()
    }

    pub fn withdrawals(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, StoreCall::Withdraw(_)))
            .count()
    }
}

impl RecordStore for RecordingStore {
    fn next_id(&mut self) -> RecordId {
        self.next += 1;
        RecordId::from_raw(self.next)
    }

    fn publish(
        &mut self,
        id: RecordId,
        interface: InterfaceIndex,
        family: AddressFamily,
        _hostname: &Hostname,
        address: IpAddr,
    ) {
        assert_eq!(family, AddressFamily::UNSPEC);
        self.calls.push(StoreCall::Publish {
            id,
            interface,
            address,
        });
    }

    fn withdraw(&mut self, id: RecordId) {
        self.calls.push(StoreCall::Withdraw(id));
    }
}
