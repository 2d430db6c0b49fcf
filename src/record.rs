//! The boundary to the DNS record store, and a simple in-memory implementation of it.

use std::{collections::BTreeMap, fmt, net::IpAddr, str::FromStr};

use crate::netlink::{AddressFamily, Error, InterfaceIndex};

/// Opaque handle of a published address record.
///
/// Handed out by [`RecordStore::next_id`], and required to withdraw the record again.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RecordId(u32);

impl RecordId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The host name announced by the responder, without the `.local` domain.
///
/// A host name is a single DNS label: it consists of 1 to [`Hostname::MAX_LEN`] arbitrary bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hostname {
    // Guaranteed to contain >0 and at most `Hostname::MAX_LEN` bytes.
    bytes: Box<[u8]>,
}

impl Hostname {
    /// The maximum length of a host name.
    pub const MAX_LEN: usize = 63;

    /// Creates a [`Hostname`] from raw bytes or a string slice.
    pub fn try_new(name: impl AsRef<[u8]>) -> Result<Self, Error> {
        Self::try_new_impl(name.as_ref())
    }

    fn try_new_impl(name: &[u8]) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::InvalidEmptyLabel);
        }

        if name.len() > Self::MAX_LEN {
            return Err(Error::LabelTooLong);
        }

        Ok(Self { bytes: name.into() })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the fully qualified mDNS name `<hostname>.local.`.
    pub fn fqdn(&self) -> String {
        format!("{}.local.", self)
    }
}

impl fmt::Debug for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#""{}""#, self.as_bytes().escape_ascii())
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_bytes().escape_ascii())
    }
}

impl FromStr for Hostname {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}

/// The store that owns the responder's address records.
///
/// The interface monitor tells the store which addresses should currently be announced; the store
/// is responsible for everything else (record storage, TTLs, answering queries, announcements and
/// goodbye packets).
pub trait RecordStore {
    /// Allocates a fresh record identifier.
    fn next_id(&mut self) -> RecordId;

    /// Publishes an address record for `hostname` under the identifier `id`.
    ///
    /// `family` is the family of the *record*, not of `address`; the monitor always passes
    /// [`AddressFamily::UNSPEC`] so that the store derives `A` or `AAAA` from the address itself.
    fn publish(
        &mut self,
        id: RecordId,
        interface: InterfaceIndex,
        family: AddressFamily,
        hostname: &Hostname,
        address: IpAddr,
    );

    /// Withdraws the record previously published under `id`.
    fn withdraw(&mut self, id: RecordId);
}

impl<S: RecordStore + ?Sized> RecordStore for &mut S {
    fn next_id(&mut self) -> RecordId {
        (**self).next_id()
    }

    fn publish(
        &mut self,
        id: RecordId,
        interface: InterfaceIndex,
        family: AddressFamily,
        hostname: &Hostname,
        address: IpAddr,
    ) {
        (**self).publish(id, interface, family, hostname, address)
    }

    fn withdraw(&mut self, id: RecordId) {
        (**self).withdraw(id)
    }
}

/// An address record held by a [`RecordTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    interface: InterfaceIndex,
    family: AddressFamily,
    name: String,
    ttl: u32,
    address: IpAddr,
}

impl AddressRecord {
    /// Returns the interface the record should be announced on.
    #[inline]
    pub fn interface(&self) -> InterfaceIndex {
        self.interface
    }

    #[inline]
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Returns the fully qualified record name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the record's Time To Live, in seconds.
    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    #[inline]
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Returns whether this is an `A` record (as opposed to `AAAA`).
    #[inline]
    pub fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }
}

impl fmt::Display for AddressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = if self.is_ipv4() { "A" } else { "AAAA" };
        write!(
            f,
            "{}\t{}\tIN\t{}\t{}\t(if {})",
            self.name, self.ttl, ty, self.address, self.interface
        )
    }
}

/// In-memory [`RecordStore`].
///
/// Keeps the published address records in a table keyed by [`RecordId`], so that a responder can
/// answer queries from it.
#[derive(Debug, Default)]
pub struct RecordTable {
    next: u32,
    records: BTreeMap<RecordId, AddressRecord>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RecordId) -> Option<&AddressRecord> {
        self.records.get(&id)
    }

    /// Returns an iterator over all published records, in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &AddressRecord)> + '_ {
        self.records.iter().map(|(id, rec)| (*id, rec))
    }

    /// Returns an iterator over the records announced on `interface`.
    pub fn for_interface(
        &self,
        interface: InterfaceIndex,
    ) -> impl Iterator<Item = &AddressRecord> + '_ {
        self.records
            .values()
            .filter(move |rec| rec.interface == interface)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for RecordTable {
    fn next_id(&mut self) -> RecordId {
        let id = RecordId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }

    fn publish(
        &mut self,
        id: RecordId,
        interface: InterfaceIndex,
        family: AddressFamily,
        hostname: &Hostname,
        address: IpAddr,
    ) {
        let record = AddressRecord {
            interface,
            family,
            name: hostname.fqdn(),
            ttl: TTL,
            address,
        };
        log::trace!("publishing {}: {}", id, record);
        if let Some(old) = self.records.insert(id, record) {
            log::warn!("record {} was already in use (replaced {})", id, old);
        }
    }

    fn withdraw(&mut self, id: RecordId) {
        match self.records.remove(&id) {
            Some(record) => log::trace!("withdrew {}: {}", id, record),
            None => log::warn!("attempted to withdraw unknown record {}", id),
        }
    }
}

const TTL: u32 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    fn index(i: u32) -> InterfaceIndex {
        InterfaceIndex::new(i).unwrap()
    }

    #[test]
    fn hostname_validation() {
        assert_eq!("".parse::<Hostname>(), Err(Error::InvalidEmptyLabel));
        assert_eq!(
            "a".repeat(64).parse::<Hostname>(),
            Err(Error::LabelTooLong)
        );
        assert!("a".repeat(63).parse::<Hostname>().is_ok());

        let name = Hostname::try_new("my-host").unwrap();
        assert_eq!(name.to_string(), "my-host");
        assert_eq!(format!("{:?}", name), r#""my-host""#);
        assert_eq!(name.fqdn(), "my-host.local.");
        assert_eq!(Hostname::try_new("a\nb").unwrap().to_string(), r"a\nb");
    }

    #[test]
    fn table_publish_withdraw() {
        let host = Hostname::try_new("box").unwrap();
        let mut table = RecordTable::new();

        let a = table.next_id();
        let b = table.next_id();
        assert_ne!(a, b);

        table.publish(
            a,
            index(2),
            AddressFamily::UNSPEC,
            &host,
            "192.0.2.5".parse().unwrap(),
        );
        table.publish(
            b,
            index(3),
            AddressFamily::UNSPEC,
            &host,
            "2001:db8::1".parse().unwrap(),
        );
        assert_eq!(table.len(), 2);

        let rec = table.get(a).unwrap();
        assert_eq!(rec.name(), "box.local.");
        assert_eq!(rec.ttl(), 120);
        assert!(rec.is_ipv4());
        assert_eq!(rec.to_string(), "box.local.\t120\tIN\tA\t192.0.2.5\t(if 2)");
        assert_eq!(table.for_interface(index(3)).count(), 1);
        assert_eq!(table.for_interface(index(4)).count(), 0);

        table.withdraw(a);
        assert!(table.get(a).is_none());
        // Unknown IDs are ignored.
        table.withdraw(a);
        assert_eq!(table.iter().map(|(id, _)| id).collect::<Vec<_>>(), [b]);
    }

    #[test]
    fn store_through_mut_ref() {
        fn publish_one(mut store: impl RecordStore) {
            let id = store.next_id();
            store.publish(
                id,
                InterfaceIndex::new(1).unwrap(),
                AddressFamily::UNSPEC,
                &Hostname::try_new("x").unwrap(),
                "10.0.0.1".parse().unwrap(),
            );
        }

        let mut table = RecordTable::new();
        publish_one(&mut table);
        assert_eq!(table.len(), 1);
    }
}
