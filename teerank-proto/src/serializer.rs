//! serializer for request packets

use crate::messages::{Request, RequestVariant, Token};

use cookie_factory::combinator::{slice, string};
use cookie_factory::sequence::tuple;
use cookie_factory::{SerializeFn, WriteContext};
use std::io::Write;

/// Serializer for a UTF-8 string with its `0x00` terminator
pub fn gen_string<'a, W: Write + 'a>(value: &'a str) -> impl SerializeFn<W> + 'a {
    tuple((string(value), slice(b"\x00")))
}

/// Serializer for an ASCII-decimal integer with its `0x00` terminator
pub fn gen_int<W: Write>(value: i32) -> impl SerializeFn<W> {
    tuple((string(value.to_string()), slice(b"\x00")))
}

/// Serializer for the master server request: ten `0xFF` padding bytes and
/// the `req2` tag
pub fn gen_server_list_request<W: Write>() -> impl SerializeFn<W> {
    slice(b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\xffreq2")
}

/// Serializer for the 15-byte game server info request
///
/// The 3-byte round token is split over the packet: bytes 1-2 ride in the
/// extra-token field of the header, byte 0 trails the variant tag. Legacy
/// servers echo only byte 0 correctly, which is why non-extended tokens
/// carry zeroes in bytes 1-2.
pub fn gen_info_request<W: Write>(variant: RequestVariant, token: Token) -> impl SerializeFn<W> {
    tuple((
        slice(b"xe"),                 // Magic header (2 bytes)
        slice([token[1], token[2]]),  // Extra token (2 bytes)
        slice(b"\x00\x00"),           // Reserved (2 bytes)
        slice(b"\xff\xff\xff\xff"),   // Padding (4 bytes)
        slice(*variant.tag()),        // Variant tag (4 bytes)
        slice([token[0]]),            // Token (1 byte)
    ))
}

/// Serializer for any request packet
pub fn gen_request<W: Write>(request: Request) -> impl SerializeFn<W> {
    move |out: WriteContext<W>| match request {
        Request::ServerList => gen_server_list_request()(out),
        Request::Info { variant, token } => gen_info_request(variant, token)(out),
    }
}
