//! Netlink message decoder.

use std::{
    cmp, fmt,
    mem::size_of,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use bytemuck::AnyBitPattern;

use super::{
    align, AddrAttr, AddrInfoHeader, AddressFamily, AddressFlags, AttrHeader, Error, Header,
    InterfaceFlags, InterfaceIndex, LinkAttr, LinkInfoHeader, MessageType, Scope,
};

/// Mask applied to attribute types to strip the nested/byte-order marker bits.
const ATTR_TYPE_MASK: u16 = 0x3fff;

#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn buf(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub(crate) fn read_obj<T: AnyBitPattern>(&mut self) -> Result<T, Error> {
        let bytes = self.buf().get(..size_of::<T>()).ok_or(Error::Eof)?;
        self.pos += size_of::<T>();
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Error> {
        match self.buf.get(self.pos..self.pos + len) {
            Some(slice) => {
                self.pos += len;
                Ok(slice)
            }
            None => Err(Error::Eof),
        }
    }

    /// Skips the padding following an object of `len` bytes.
    ///
    /// The last object in a buffer is allowed to omit its padding.
    fn skip_padding(&mut self, len: usize) {
        self.pos = cmp::min(self.pos + (align(len) - len), self.buf.len());
    }

    fn read_message(&mut self) -> Result<Message<'a>, Error> {
        let header = self.read_obj::<Header>()?;
        let len = usize::try_from(header.len()).map_err(|_| Error::InvalidLength)?;
        let payload_len = len
            .checked_sub(size_of::<Header>())
            .ok_or(Error::InvalidLength)?;
        let payload = self.read_slice(payload_len)?;
        self.skip_padding(len);
        Ok(Message { header, payload })
    }

    fn read_attribute(&mut self) -> Result<Attribute<'a>, Error> {
        let header = self.read_obj::<AttrHeader>()?;
        let len = usize::from(header.len);
        let data_len = len
            .checked_sub(size_of::<AttrHeader>())
            .ok_or(Error::InvalidLength)?;
        let data = self.read_slice(data_len)?;
        self.skip_padding(len);
        Ok(Attribute {
            type_: header.type_ & ATTR_TYPE_MASK,
            data,
        })
    }
}

/// Iterator over the netlink messages contained in one received datagram.
///
/// The kernel batches several messages into a single datagram (particularly in dump replies). If a
/// message header is malformed, the iterator yields the error and then stops, since the position
/// of any following message cannot be trusted.
pub struct MessageIter<'a> {
    r: Reader<'a>,
    has_errored: bool,
}

impl<'a> MessageIter<'a> {
    /// Creates an iterator over the messages in `datagram`.
    pub fn new(datagram: &'a [u8]) -> Self {
        Self {
            r: Reader::new(datagram),
            has_errored: false,
        }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<Message<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_errored || self.r.buf().is_empty() {
            return None;
        }

        match self.r.read_message() {
            Ok(msg) => Some(Ok(msg)),
            Err(e) => {
                self.has_errored = true;
                Some(Err(e))
            }
        }
    }
}

/// A single netlink message: its header and the raw payload following it.
#[derive(Clone, Copy)]
pub struct Message<'a> {
    header: Header,
    payload: &'a [u8],
}

impl<'a> Message<'a> {
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.header.message_type()
    }

    /// Returns the message payload, without the header.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Decodes this message into an [`Event`].
    ///
    /// Returns `Ok(None)` if the message is irrelevant to interface tracking: unknown message
    /// types, link messages for a specific family, address messages for families other than IPv4
    /// and IPv6, address messages without an address, and acknowledgements.
    ///
    /// Returns an error if the message is malformed. Malformed messages are meant to be dropped as
    /// a whole.
    pub fn decode(&self) -> Result<Option<Event>, Error> {
        let seq = self.header.seq();
        match self.message_type() {
            MessageType::NEWLINK => Ok(self.decode_link(true)?.map(Event::LinkUpsert)),
            MessageType::DELLINK => Ok(self
                .decode_link(false)?
                .map(|link| Event::LinkRemoved { index: link.index })),
            MessageType::NEWADDR => Ok(self.decode_address()?.map(Event::AddressUpsert)),
            MessageType::DELADDR => Ok(self.decode_address()?.map(Event::AddressRemoved)),
            MessageType::DONE => Ok(Some(Event::ListingDone { seq })),
            MessageType::ERROR => {
                let error = Reader::new(self.payload).read_obj::<i32>()?;
                if error == 0 {
                    // Acknowledgement.
                    Ok(None)
                } else {
                    Ok(Some(Event::ListingError {
                        seq,
                        errno: error.saturating_neg(),
                    }))
                }
            }
            _ => Ok(None),
        }
    }

    fn decode_link(&self, with_attributes: bool) -> Result<Option<LinkInfo>, Error> {
        let mut r = Reader::new(self.payload);
        let info = r.read_obj::<LinkInfoHeader>()?;
        if info.family() != AddressFamily::UNSPEC {
            return Ok(None);
        }
        let index = InterfaceIndex::from_raw(info.index()).ok_or(Error::InvalidValue)?;

        let mut name = None;
        if with_attributes {
            for attr in Attributes::new(r) {
                let attr = attr?;
                if LinkAttr::from_raw(attr.type_) == LinkAttr::IFNAME {
                    name = Some(decode_name(attr.data));
                }
            }
        }

        Ok(Some(LinkInfo {
            index,
            flags: info.flags(),
            name,
        }))
    }

    fn decode_address(&self) -> Result<Option<AddressInfo>, Error> {
        let mut r = Reader::new(self.payload);
        let info = r.read_obj::<AddrInfoHeader>()?;
        let family = info.family();
        if family != AddressFamily::INET && family != AddressFamily::INET6 {
            return Ok(None);
        }
        let index = InterfaceIndex::new(info.index()).ok_or(Error::InvalidValue)?;

        let mut address = None;
        for attr in Attributes::new(r) {
            let attr = attr?;
            if AddrAttr::from_raw(attr.type_) == AddrAttr::ADDRESS {
                address = Some(decode_ip(family, attr.data)?);
            }
        }

        Ok(address.map(|address| AddressInfo {
            index,
            address,
            prefix_len: info.prefix_len(),
            flags: info.flags(),
            scope: info.scope(),
        }))
    }
}

impl<'a> fmt::Debug for Message<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("header", &self.header)
            .field("payload", &format_args!("{:02x?}", self.payload))
            .finish()
    }
}

/// Interface names are NUL-terminated; anything after the terminator is ignored.
fn decode_name(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

fn decode_ip(family: AddressFamily, data: &[u8]) -> Result<IpAddr, Error> {
    match family {
        AddressFamily::INET => {
            let octets = <[u8; 4]>::try_from(data).map_err(|_| Error::InvalidLength)?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        AddressFamily::INET6 => {
            let octets = <[u8; 16]>::try_from(data).map_err(|_| Error::InvalidLength)?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => Err(Error::InvalidValue),
    }
}

struct Attribute<'a> {
    type_: u16,
    data: &'a [u8],
}

/// Iterator over the attributes following a fixed message header.
///
/// Trailing bytes too short to hold an attribute header are ignored. An attribute whose length
/// field is inconsistent ends the iteration with an error.
struct Attributes<'a> {
    r: Reader<'a>,
    has_errored: bool,
}

impl<'a> Attributes<'a> {
    fn new(r: Reader<'a>) -> Self {
        Self {
            r,
            has_errored: false,
        }
    }
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Result<Attribute<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_errored || self.r.buf().len() < size_of::<AttrHeader>() {
            return None;
        }

        match self.r.read_attribute() {
            Ok(attr) => Some(Ok(attr)),
            Err(e) => {
                self.has_errored = true;
                Some(Err(e))
            }
        }
    }
}

/// A change to the interface directory (or bootstrap progress), decoded from one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A link was added, or an existing link changed.
    LinkUpsert(LinkInfo),
    /// A link was removed.
    LinkRemoved { index: InterfaceIndex },
    /// An address was added, or an existing address changed.
    AddressUpsert(AddressInfo),
    /// An address was removed.
    AddressRemoved(AddressInfo),
    /// A dump reply is complete.
    ListingDone { seq: u32 },
    /// The kernel rejected the request with sequence number `seq`.
    ///
    /// `errno` is the (positive) OS error code.
    ListingError { seq: u32, errno: i32 },
}

/// Link state carried by a link message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub index: InterfaceIndex,
    pub flags: InterfaceFlags,
    /// The interface name, if the message carried one.
    pub name: Option<String>,
}

/// Address state carried by an address message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// Index of the interface the address is assigned to.
    pub index: InterfaceIndex,
    pub address: IpAddr,
    pub prefix_len: u8,
    pub flags: AddressFlags,
    pub scope: Scope,
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::{
        netlink::{encoder::MessageEncoder, MessageFlags},
        testing::{address_message, done_message, error_message, link_message},
    };

    fn decode_one(msg: &[u8]) -> Result<Option<Event>, Error> {
        let mut iter = MessageIter::new(msg);
        let msg = iter.next().expect("no message")?;
        assert!(iter.next().is_none(), "trailing message");
        msg.decode()
    }

    fn index(i: u32) -> InterfaceIndex {
        InterfaceIndex::new(i).unwrap()
    }

    #[test]
    fn decode_new_link() {
        let msg = link_message(
            MessageType::NEWLINK,
            2,
            InterfaceFlags::UP | InterfaceFlags::RUNNING,
            Some("eth0"),
        );
        assert_eq!(
            decode_one(&msg),
            Ok(Some(Event::LinkUpsert(LinkInfo {
                index: index(2),
                flags: InterfaceFlags::UP | InterfaceFlags::RUNNING,
                name: Some("eth0".into()),
            })))
        );
    }

    #[test]
    fn decode_new_link_without_name() {
        let msg = link_message(MessageType::NEWLINK, 3, InterfaceFlags::UP, None);
        assert_eq!(
            decode_one(&msg),
            Ok(Some(Event::LinkUpsert(LinkInfo {
                index: index(3),
                flags: InterfaceFlags::UP,
                name: None,
            })))
        );
    }

    #[test]
    fn decode_del_link() {
        let msg = link_message(MessageType::DELLINK, 4, InterfaceFlags::empty(), Some("wlan0"));
        assert_eq!(
            decode_one(&msg),
            Ok(Some(Event::LinkRemoved { index: index(4) }))
        );
    }

    #[test]
    fn link_family_filter() {
        let mut buf = [0; 64];
        let mut enc = MessageEncoder::new(&mut buf, MessageType::NEWLINK, MessageFlags::empty());
        enc.push(LinkInfoHeader::new(AddressFamily::INET6, 2, InterfaceFlags::UP));
        let len = enc.finish().unwrap();
        assert_eq!(decode_one(&buf[..len]), Ok(None));

        let mut buf = [0; 64];
        let mut enc = MessageEncoder::new(&mut buf, MessageType::DELLINK, MessageFlags::empty());
        enc.push(LinkInfoHeader::new(AddressFamily::INET, 2, InterfaceFlags::empty()));
        let len = enc.finish().unwrap();
        assert_eq!(decode_one(&buf[..len]), Ok(None));

        let msg = link_message(MessageType::DELLINK, 2, InterfaceFlags::empty(), None);
        assert_eq!(
            decode_one(&msg),
            Ok(Some(Event::LinkRemoved { index: index(2) }))
        );
    }

    #[test]
    fn link_invalid_index() {
        let msg = link_message(MessageType::NEWLINK, 0, InterfaceFlags::UP, None);
        assert_eq!(decode_one(&msg), Err(Error::InvalidValue));
        let msg = link_message(MessageType::NEWLINK, -5, InterfaceFlags::UP, None);
        assert_eq!(decode_one(&msg), Err(Error::InvalidValue));
    }

    #[test]
    fn link_name_stops_at_nul() {
        let mut buf = [0; 64];
        let mut enc = MessageEncoder::new(&mut buf, MessageType::NEWLINK, MessageFlags::empty());
        enc.push(LinkInfoHeader::new(AddressFamily::UNSPEC, 9, InterfaceFlags::UP));
        enc.attribute(LinkAttr::IFNAME.to_raw(), b"br0\0junk");
        let len = enc.finish().unwrap();
        match decode_one(&buf[..len]) {
            Ok(Some(Event::LinkUpsert(link))) => assert_eq!(link.name.as_deref(), Some("br0")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn link_ignores_unknown_attributes() {
        let mut buf = [0; 64];
        let mut enc = MessageEncoder::new(&mut buf, MessageType::NEWLINK, MessageFlags::empty());
        enc.push(LinkInfoHeader::new(AddressFamily::UNSPEC, 2, InterfaceFlags::UP));
        enc.attribute(LinkAttr::MTU.to_raw(), &1500u32.to_ne_bytes());
        enc.attribute(LinkAttr::IFNAME.to_raw(), b"eth0\0");
        enc.attribute(0x1234, &[1, 2, 3]);
        let len = enc.finish().unwrap();
        match decode_one(&buf[..len]) {
            Ok(Some(Event::LinkUpsert(link))) => assert_eq!(link.name.as_deref(), Some("eth0")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn decode_addresses() {
        let v4: IpAddr = "192.0.2.5".parse().unwrap();
        let msg = address_message(MessageType::NEWADDR, 2, v4, Scope::UNIVERSE);
        assert_eq!(
            decode_one(&msg),
            Ok(Some(Event::AddressUpsert(AddressInfo {
                index: index(2),
                address: v4,
                prefix_len: 24,
                flags: AddressFlags::PERMANENT,
                scope: Scope::UNIVERSE,
            })))
        );

        let v6: IpAddr = "fe80::1".parse().unwrap();
        let msg = address_message(MessageType::DELADDR, 3, v6, Scope::LINK);
        assert_eq!(
            decode_one(&msg),
            Ok(Some(Event::AddressRemoved(AddressInfo {
                index: index(3),
                address: v6,
                prefix_len: 64,
                flags: AddressFlags::PERMANENT,
                scope: Scope::LINK,
            })))
        );
    }

    fn raw_address_message(family: AddressFamily, attrs: &[(AddrAttr, &[u8])]) -> Vec<u8> {
        let mut buf = vec![0; 128];
        let mut enc = MessageEncoder::new(&mut buf, MessageType::NEWADDR, MessageFlags::empty());
        enc.push(AddrInfoHeader::new(
            family,
            24,
            AddressFlags::empty(),
            Scope::UNIVERSE,
            2,
        ));
        for (ty, data) in attrs {
            enc.attribute(ty.to_raw(), data);
        }
        let len = enc.finish().unwrap();
        buf.truncate(len);
        buf
    }

    #[test]
    fn address_length_mismatch() {
        let msg = raw_address_message(AddressFamily::INET, &[(AddrAttr::ADDRESS, &[0; 16])]);
        assert_eq!(decode_one(&msg), Err(Error::InvalidLength));
        let msg = raw_address_message(AddressFamily::INET6, &[(AddrAttr::ADDRESS, &[0; 4])]);
        assert_eq!(decode_one(&msg), Err(Error::InvalidLength));
    }

    #[test]
    fn address_without_address_attribute() {
        let msg = raw_address_message(AddressFamily::INET, &[(AddrAttr::LABEL, b"eth0\0")]);
        assert_eq!(decode_one(&msg), Ok(None));
    }

    #[test]
    fn address_family_filter() {
        // AF_PACKET
        let msg = raw_address_message(
            AddressFamily::from_raw(17),
            &[(AddrAttr::ADDRESS, &[1, 2, 3, 4])],
        );
        assert_eq!(decode_one(&msg), Ok(None));
    }

    #[test]
    fn last_address_attribute_wins() {
        let msg = raw_address_message(
            AddressFamily::INET,
            &[
                (AddrAttr::ADDRESS, &[10, 0, 0, 1]),
                (AddrAttr::LOCAL, &[10, 0, 0, 3]),
                (AddrAttr::ADDRESS, &[10, 0, 0, 2]),
            ],
        );
        match decode_one(&msg) {
            Ok(Some(Event::AddressUpsert(info))) => {
                assert_eq!(info.address, "10.0.0.2".parse::<IpAddr>().unwrap())
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn decode_done_and_errors() {
        assert_eq!(
            decode_one(&done_message(7)),
            Ok(Some(Event::ListingDone { seq: 7 }))
        );
        assert_eq!(
            decode_one(&error_message(8, -1)),
            Ok(Some(Event::ListingError { seq: 8, errno: 1 }))
        );
        assert_eq!(decode_one(&error_message(8, 0)), Ok(None));
    }

    #[test]
    fn unknown_message_type() {
        let mut buf = [0; 32];
        let enc = MessageEncoder::new(&mut buf, MessageType::NOOP, MessageFlags::empty());
        let len = enc.finish().unwrap();
        assert_eq!(decode_one(&buf[..len]), Ok(None));
    }

    #[test]
    fn truncated_payload() {
        let mut msg = link_message(MessageType::NEWLINK, 2, InterfaceFlags::UP, None);
        // Claim a payload that only holds half of the link info header.
        let len = (size_of::<Header>() + 8) as u32;
        msg[..4].copy_from_slice(&len.to_ne_bytes());
        msg.truncate(len as usize);
        assert_eq!(decode_one(&msg), Err(Error::Eof));
    }

    #[test]
    fn attribute_overruns_message() {
        let mut msg = raw_address_message(AddressFamily::INET, &[(AddrAttr::ADDRESS, &[1; 4])]);
        // Bump the attribute length past the end of the message.
        let attr_start = size_of::<Header>() + size_of::<AddrInfoHeader>();
        msg[attr_start..attr_start + 2].copy_from_slice(&16u16.to_ne_bytes());
        assert_eq!(decode_one(&msg), Err(Error::Eof));
    }

    #[test]
    fn multiple_messages_per_datagram() {
        let mut datagram = link_message(MessageType::NEWLINK, 1, InterfaceFlags::UP, Some("lo"));
        datagram.extend(link_message(
            MessageType::NEWLINK,
            2,
            InterfaceFlags::UP,
            Some("eth0"),
        ));
        datagram.extend(done_message(1));

        let types = MessageIter::new(&datagram)
            .map(|msg| msg.map(|msg| msg.message_type()))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        expect![[r#"
            [
                NEWLINK,
                NEWLINK,
                DONE,
            ]
        "#]]
        .assert_debug_eq(&types);
    }

    #[test]
    fn bad_message_length_stops_iteration() {
        let mut datagram = done_message(1);
        datagram[..4].copy_from_slice(&3u32.to_ne_bytes());
        datagram.extend(done_message(2));

        let mut iter = MessageIter::new(&datagram);
        assert!(matches!(iter.next(), Some(Err(Error::InvalidLength))));
        assert!(iter.next().is_none());
    }
}
