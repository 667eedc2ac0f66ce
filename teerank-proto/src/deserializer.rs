//! deserializer for reply packets

use crate::error::DeserializationError;
use crate::messages::{
    Capability, Client, InfoReply, PartialSnapshot, Reply, ServerInfo, ServerListReply, Token,
};
use crate::ProtocolError;

use nom::bytes::complete::{tag, take, take_till};
use nom::number::complete::be_u16;
use nom::sequence::preceded;
use nom::Finish;
use nom::IResult;
use nom::Parser;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Reply packets start with 10 bytes of padding whose content is ignored.
const PADDING_LEN: usize = 10;

/// First 12 bytes of an IPv4-mapped IPv6 address in a `lis2` record
const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

/// Kinds of protocol-level parse failures
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ErrorKind {
    /// Fewer bytes remained than a fixed-width field required
    ShortRead,
    /// A string field had no `0x00` terminator
    UnterminatedString,
    /// An integer field held a non-empty, non-decimal string
    InvalidInteger,
    /// A string field was not valid UTF-8
    InvalidEncoding,
    /// The 4-byte variant tag was not recognised
    UnsupportedVariant([u8; 4]),
}

type Input<'a> = &'a [u8];
type ParseResult<'a, O> = IResult<Input<'a>, O, DeserializationError<Input<'a>>>;

fn error<O>(input: Input, kind: ErrorKind) -> ParseResult<O> {
    Err(nom::Err::Error(DeserializationError::Teerank(input, kind)))
}

/// Runs `parser`, replacing any failure with the given protocol error kind.
fn with_kind<'a, O, F>(kind: ErrorKind, mut parser: F) -> impl FnMut(Input<'a>) -> ParseResult<'a, O>
where
    F: Parser<Input<'a>, O, DeserializationError<Input<'a>>>,
{
    move |input: Input<'a>| match parser.parse(input) {
        Ok(output) => Ok(output),
        Err(nom::Err::Incomplete(needed)) => Err(nom::Err::Incomplete(needed)),
        Err(nom::Err::Error(_)) | Err(nom::Err::Failure(_)) => {
            Err(nom::Err::Error(DeserializationError::Teerank(input, kind)))
        }
    }
}

fn padding(input: Input) -> ParseResult<Input> {
    with_kind(ErrorKind::ShortRead, take(PADDING_LEN))(input)
}

/// Parser for a null-terminated UTF-8 string
///
/// Splits the remaining input at the first `0x00` and consumes the
/// terminator. Decoding is strict; the protocol mandates UTF-8.
pub fn string(input: Input) -> ParseResult<String> {
    let (rest, raw) = take_till(|byte| byte == 0u8)(input)?;
    let (rest, _) = with_kind(ErrorKind::UnterminatedString, tag(&b"\x00"[..]))(rest)?;

    match std::str::from_utf8(raw) {
        Ok(value) => Ok((rest, value.to_owned())),
        Err(_) => error(input, ErrorKind::InvalidEncoding),
    }
}

/// Parser for a null-terminated ASCII-decimal integer
///
/// An empty field yields the caller-provided default; anything else must
/// parse as a decimal number.
pub fn integer_or<'a, T>(default: T) -> impl Fn(Input<'a>) -> ParseResult<'a, T>
where
    T: std::str::FromStr + Copy,
{
    move |input: Input<'a>| {
        let (rest, value) = string(input)?;

        if value.is_empty() {
            return Ok((rest, default));
        }

        match value.parse::<T>() {
            Ok(value) => Ok((rest, value)),
            Err(_) => error(input, ErrorKind::InvalidInteger),
        }
    }
}

/// Number of null-terminated fields left in the input
///
/// Used as the loop bound for the clients section: while at least one
/// client's worth of delimiters remains, one more client can be read.
pub fn remaining_fields(input: Input) -> usize {
    memchr::memchr_iter(0, input).count()
}

/// Parser for the scrambled token echo
///
/// The token comes back as a decimal integer whose big-endian 3-byte form is
/// the echoed token with its bytes mixed by the server's combination of the
/// token and extra-token request fields; `(b2, b0, b1)` recovers the
/// original.
fn token(input: Input) -> ParseResult<Token> {
    let (rest, value) = integer_or(0u32)(input)?;
    let bytes = (value & 0x00ff_ffff).to_be_bytes();

    Ok((rest, Token([bytes[3], bytes[1], bytes[2]])))
}

fn client<'a>(extended: bool) -> impl Fn(Input<'a>) -> ParseResult<'a, Client> {
    move |input: Input<'a>| {
        let (input, name) = string(input)?;
        let (input, clan) = string(input)?;
        let (input, country) = integer_or(if extended { -1 } else { 0 })(input)?;
        let (input, score) = integer_or(0)(input)?;
        let (input, ingame) = integer_or(0i32)(input)?;
        let (input, _) = if extended {
            string(input)? // Reserved
        } else {
            (input, String::new())
        };

        let clan = if clan.is_empty() { None } else { Some(clan) };

        Ok((
            input,
            Client {
                name,
                clan,
                country,
                score,
                ingame: ingame != 0,
            },
        ))
    }
}

fn clients<'a>(extended: bool) -> impl Fn(Input<'a>) -> ParseResult<'a, Vec<Client>> {
    // A vanilla client is 5 null-terminated fields, an extended one has a
    // trailing reserved string for 6.
    let min_fields = if extended { 6 } else { 5 };

    move |mut input: Input<'a>| {
        let mut clients = Vec::new();

        while remaining_fields(input) >= min_fields {
            let (rest, client) = client(extended)(input)?;
            input = rest;
            clients.push(client);
        }

        Ok((input, clients))
    }
}

fn server_info<'a>(extended: bool) -> impl Fn(Input<'a>) -> ParseResult<'a, ServerInfo> {
    move |input: Input<'a>| {
        let (input, version) = string(input)?;
        let (input, name) = string(input)?;
        let (input, map_name) = string(input)?;
        let input = if extended {
            let (input, _map_crc) = integer_or(0i32)(input)?;
            let (input, _map_size) = integer_or(0i32)(input)?;
            input
        } else {
            input
        };
        let (input, game_type) = string(input)?;
        let (input, _flags) = integer_or(0i32)(input)?;
        let (input, num_players) = integer_or(0)(input)?;
        let (input, max_players) = integer_or(0)(input)?;
        let (input, num_clients) = integer_or(0)(input)?;
        let (input, max_clients) = integer_or(0)(input)?;

        Ok((
            input,
            ServerInfo {
                version,
                name,
                map_name,
                game_type,
                num_players,
                max_players,
                num_clients,
                max_clients,
            },
        ))
    }
}

fn info_vanilla(input: Input) -> ParseResult<PartialSnapshot> {
    let (input, info) = server_info(false)(input)?;
    let (input, clients) = clients(false)(input)?;

    Ok((
        input,
        PartialSnapshot {
            capability: Capability::Vanilla,
            info: Some(info),
            clients,
        },
    ))
}

fn info_legacy_64(input: Input) -> ParseResult<PartialSnapshot> {
    let (input, info) = server_info(false)(input)?;

    // The offset is advertised as an integer, but real servers emit a single
    // byte. Consume exactly one and discard it.
    let (input, _offset) = with_kind(ErrorKind::ShortRead, take(1usize))(input)?;

    let (input, clients) = clients(false)(input)?;

    Ok((
        input,
        PartialSnapshot {
            capability: Capability::Legacy64,
            info: Some(info),
            clients,
        },
    ))
}

fn info_extended(input: Input) -> ParseResult<PartialSnapshot> {
    let (input, info) = server_info(true)(input)?;
    let (input, _) = string(input)?; // Reserved
    let (input, clients) = clients(true)(input)?;

    Ok((
        input,
        PartialSnapshot {
            capability: Capability::Extended,
            info: Some(info),
            clients,
        },
    ))
}

fn info_extended_more(input: Input) -> ParseResult<PartialSnapshot> {
    let (input, _packet_number) = integer_or(0i32)(input)?;
    let (input, _) = string(input)?; // Reserved
    let (input, clients) = clients(true)(input)?;

    Ok((
        input,
        PartialSnapshot {
            capability: Capability::Extended,
            info: None,
            clients,
        },
    ))
}

fn socket_addr(input: Input) -> ParseResult<SocketAddr> {
    let (input, raw) = with_kind(ErrorKind::ShortRead, take(16usize))(input)?;
    let (input, port) = with_kind(ErrorKind::ShortRead, be_u16)(input)?;

    let ip = if raw[..12] == IPV4_MAPPED_PREFIX {
        let mut octets = [0u8; 4];
        octets.copy_from_slice(&raw[12..16]);
        IpAddr::V4(Ipv4Addr::from(octets))
    } else {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(raw);
        IpAddr::V6(Ipv6Addr::from(octets))
    };

    Ok((input, SocketAddr::new(ip, port)))
}

fn server_list(mut input: Input) -> ParseResult<Vec<SocketAddr>> {
    let mut servers = Vec::new();

    // Fixed 18-byte records; there is no count field, a shorter tail is
    // simply ignored.
    while input.len() >= 18 {
        let (rest, server) = socket_addr(input)?;
        input = rest;
        servers.push(server);
    }

    Ok((input, servers))
}

fn reply_body(input: Input) -> ParseResult<Reply> {
    let (input, tag_bytes) = with_kind(ErrorKind::ShortRead, take(4usize))(input)?;

    let mut reply_tag = [0u8; 4];
    reply_tag.copy_from_slice(tag_bytes);

    if &reply_tag == b"lis2" {
        let (input, servers) = server_list(input)?;
        return Ok((input, Reply::ServerList(ServerListReply::new(servers))));
    }

    let (input, token) = token(input)?;

    let (input, snapshot) = match &reply_tag {
        b"inf3" => info_vanilla(input)?,
        b"dtsf" => info_legacy_64(input)?,
        b"iext" => info_extended(input)?,
        b"iex+" => info_extended_more(input)?,
        _ => return error(input, ErrorKind::UnsupportedVariant(reply_tag)),
    };

    Ok((input, Reply::Info(InfoReply::new(reply_tag, token, snapshot))))
}

/// Parser for any reply packet: 10 bytes of padding, a 4-byte variant tag,
/// then the variant body
pub fn reply(input: Input) -> ParseResult<Reply> {
    preceded(padding, reply_body)(input)
}

/// Parses one reply datagram, collapsing parse failures into the flat
/// [`ProtocolError`] taxonomy.
///
/// Trailing bytes after a recognised body are ignored; the client loops stop
/// on the remaining-delimiter bound and `lis2` consumes whole records only.
pub fn parse_reply(input: &[u8]) -> Result<Reply, ProtocolError> {
    match reply(input).finish() {
        Ok((_, reply)) => Ok(reply),
        Err(error) => Err(error.into()),
    }
}
