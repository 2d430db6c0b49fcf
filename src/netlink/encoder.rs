//! Netlink message encoder.

use std::mem::size_of;

use bytemuck::{NoUninit, Zeroable};

use super::{
    align, AddressFamily, AttrHeader, Error, GenericHeader, Header, MessageFlags, MessageType,
    ALIGNTO,
};

pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
    trunc: bool,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            trunc: false,
        }
    }

    fn modify_header(&mut self, with: impl FnOnce(&mut Header)) {
        if let Some(bytes) = self.buf.get_mut(..size_of::<Header>()) {
            with(bytemuck::from_bytes_mut(bytes));
        }
    }

    pub(crate) fn write_slice(&mut self, data: &[u8]) {
        let buf = &mut self.buf[self.pos..];
        if data.len() > buf.len() {
            self.trunc = true;
            let n = buf.len();
            buf.copy_from_slice(&data[..n]);
            self.pos += n;
        } else {
            buf[..data.len()].copy_from_slice(data);
            self.pos += data.len();
        }
    }

    pub(crate) fn write_obj<T: NoUninit>(&mut self, obj: T) {
        self.write_slice(bytemuck::bytes_of(&obj))
    }

    fn pad(&mut self) {
        let n = align(self.pos) - self.pos;
        self.write_slice(&[0; ALIGNTO][..n]);
    }
}

/// Writes a single netlink message into a caller-provided buffer.
///
/// The message length in the header is filled in by [`MessageEncoder::finish`].
pub struct MessageEncoder<'a> {
    w: Writer<'a>,
}

impl<'a> MessageEncoder<'a> {
    /// Creates an encoder that writes a message of type `ty` to `buf`.
    pub fn new(buf: &'a mut [u8], ty: MessageType, flags: MessageFlags) -> Self {
        let mut header = Header::zeroed();
        header.type_ = ty;
        header.flags = flags.bits();

        let mut w = Writer::new(buf);
        w.write_obj(header);
        Self { w }
    }

    pub fn set_sequence(&mut self, seq: u32) {
        self.w.modify_header(|h| h.set_seq(seq));
    }

    /// Appends a fixed-size structure (typically the family-specific header) to the payload.
    pub fn push<T: NoUninit>(&mut self, obj: T) {
        self.w.write_obj(obj);
    }

    /// Appends an attribute of type `ty` carrying `data`, including trailing padding.
    pub fn attribute(&mut self, ty: u16, data: &[u8]) {
        self.w.pad();
        let len = size_of::<AttrHeader>() + data.len();
        let Ok(len) = u16::try_from(len) else {
            self.w.trunc = true;
            return;
        };
        self.w.write_obj(AttrHeader { len, type_: ty });
        self.w.write_slice(data);
        self.w.pad();
    }

    /// Finishes encoding the message, and returns the number of bytes that were written to the
    /// buffer.
    ///
    /// Returns [`Error::Truncated`] if the buffer was too small to hold the message.
    pub fn finish(mut self) -> Result<usize, Error> {
        if self.w.trunc {
            return Err(Error::Truncated);
        }

        let len = self.w.pos;
        let raw_len = u32::try_from(len).map_err(|_| Error::Truncated)?;
        self.w.modify_header(|h| h.set_len(raw_len));
        Ok(len)
    }
}

/// Writes a request that lists all entries of type `ty` (typically [`MessageType::GETLINK`] or
/// [`MessageType::GETADDR`]) into `buf`.
///
/// The sequence number is left as 0, it is assigned when the request is sent (see
/// [`set_sequence`]).
pub fn encode_list_request(buf: &mut [u8], ty: MessageType) -> Result<&mut [u8], Error> {
    let mut enc = MessageEncoder::new(buf, ty, MessageFlags::REQUEST | MessageFlags::DUMP);
    enc.push(GenericHeader::new(AddressFamily::UNSPEC));
    let len = enc.finish()?;
    Ok(&mut buf[..len])
}

/// Stamps the sequence number `seq` into the header of the encoded message `msg`.
pub fn set_sequence(msg: &mut [u8], seq: u32) -> Result<(), Error> {
    let bytes = msg.get_mut(..size_of::<Header>()).ok_or(Error::Eof)?;
    bytemuck::from_bytes_mut::<Header>(bytes).set_seq(seq);
    Ok(())
}
