//! crate error types

use thiserror::Error;

/// Possible crate errors
///
/// Every variant is recoverable: a failed parse or a failed correlation
/// check drops exactly one packet and the polling round continues.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes remained than a fixed-width field required
    #[error("short read")]
    ShortRead,
    /// A string field had no `0x00` terminator
    #[error("unterminated string")]
    UnterminatedString,
    /// An integer field held a non-empty, non-decimal string
    #[error("invalid integer")]
    InvalidInteger,
    /// A string field was not valid UTF-8
    #[error("invalid encoding")]
    InvalidEncoding,
    /// The 4-byte variant tag was not recognised
    #[error("packet type not supported: {0:?}")]
    UnsupportedVariant([u8; 4]),
    /// The echoed token did not match the token sent this round
    #[error("wrong request token")]
    WrongToken,
}

/// Parse error carrying the input position it occurred at
#[derive(Debug, PartialEq)]
pub enum DeserializationError<I> {
    /// An error raised by a plain nom combinator
    Nom(I, nom::error::ErrorKind),
    /// An error raised by a teerank parser
    Teerank(I, crate::deserializer::ErrorKind),
}

impl<I> nom::error::ParseError<I> for DeserializationError<I> {
    fn from_error_kind(input: I, kind: nom::error::ErrorKind) -> Self {
        Self::Nom(input, kind)
    }

    fn append(_input: I, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I> From<DeserializationError<I>> for ProtocolError {
    fn from(error: DeserializationError<I>) -> Self {
        match error {
            DeserializationError::Teerank(_, kind) => kind.into(),
            // Plain nom errors only come out of fixed-width reads.
            DeserializationError::Nom(..) => ProtocolError::ShortRead,
        }
    }
}

impl From<crate::deserializer::ErrorKind> for ProtocolError {
    fn from(kind: crate::deserializer::ErrorKind) -> Self {
        use crate::deserializer::ErrorKind;

        match kind {
            ErrorKind::ShortRead => ProtocolError::ShortRead,
            ErrorKind::UnterminatedString => ProtocolError::UnterminatedString,
            ErrorKind::InvalidInteger => ProtocolError::InvalidInteger,
            ErrorKind::InvalidEncoding => ProtocolError::InvalidEncoding,
            ErrorKind::UnsupportedVariant(tag) => ProtocolError::UnsupportedVariant(tag),
        }
    }
}
