use std::{fmt, io};

/// Non-I/O errors that may occur while decoding or encoding netlink messages, or while validating
/// a host name.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Error {
    /// The end of the message was reached while more data was expected.
    Eof,
    /// A field was set to an invalid value (for example, an interface index of 0).
    InvalidValue,
    /// A length field was inconsistent with the data it describes, or an address attribute did
    /// not match the size required by the message's address family.
    InvalidLength,
    /// Only returned from [`MessageEncoder::finish`], indicates that there was not enough space in
    /// the provided buffer to fit the entire message.
    ///
    /// [`MessageEncoder::finish`]: super::encoder::MessageEncoder::finish
    Truncated,
    /// An empty host name was given.
    InvalidEmptyLabel,
    /// A host name exceeded the maximum length of a DNS label.
    LabelTooLong,
}

impl Error {
    fn description(&self) -> &str {
        match self {
            Error::Eof => "unexpected end of data",
            Error::InvalidValue => "invalid value",
            Error::InvalidLength => "invalid length",
            Error::Truncated => "message truncated",
            Error::InvalidEmptyLabel => "invalid empty label",
            Error::LabelTooLong => "label too long",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::Eof => io::ErrorKind::UnexpectedEof.into(),
            Error::InvalidValue => io::ErrorKind::InvalidData.into(),
            Error::InvalidLength => io::Error::new(
                io::ErrorKind::InvalidData,
                "netlink length field does not match the attached data",
            ),
            Error::Truncated => io::ErrorKind::OutOfMemory.into(),
            Error::InvalidEmptyLabel => {
                io::Error::new(io::ErrorKind::InvalidInput, "host name must not be empty")
            }
            Error::LabelTooLong => io::Error::new(
                io::ErrorKind::InvalidInput,
                "host name exceeds maximum label length",
            ),
        }
    }
}
