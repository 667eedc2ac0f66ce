//! tokio codec adapting the teerank wire protocol to `UdpFramed`
//!
//! One datagram in, one [`Reply`] out; one [`Request`] in, one datagram out.
//! Parse failures surface as [`CodecError::Protocol`] items which the caller
//! logs and drops; the stream itself keeps going.

use bytes::{BufMut, BytesMut};
use teerank_proto::deserializer::parse_reply;
use teerank_proto::serializer::gen_request;
use teerank_proto::{ProtocolError, Reply, Request};
use tokio_util::codec::{Decoder, Encoder};

/// Errors surfaced by [`BackendCodec`]
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// The underlying socket failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A datagram failed to parse and was dropped
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Codec for the backend's one UDP socket
#[derive(Debug, Default)]
pub struct BackendCodec {}

impl BackendCodec {
    /// Creates a new `BackendCodec`.
    pub fn new() -> Self {
        Self {}
    }
}

impl Decoder for BackendCodec {
    type Item = Reply;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // The datagram is consumed whole, so a parse failure drops exactly
        // this packet and leaves nothing behind for the next one.
        let datagram = src.split_to(src.len());
        let reply = parse_reply(&datagram)?;

        Ok(Some(reply))
    }
}

impl Encoder<Request> for BackendCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let buffer = cookie_factory::gen_simple(gen_request(item), Vec::new()).map_err(|error| {
            std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", error))
        })?;

        dst.put_slice(&buffer);

        Ok(())
    }
}
