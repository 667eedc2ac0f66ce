#![warn(missing_docs)]

//! Wire protocol for the teerank backend
//!
//! Message model types, a deserializer for the reply packets of game servers
//! and master servers, and a serializer for the two request packets. This
//! crate is pure: no I/O, no randomness, no async.

pub mod deserializer;
pub mod error;
pub mod messages;
pub mod serializer;

pub use messages::{
    Capability, Client, InfoReply, PartialSnapshot, Reply, Request, RequestVariant, ServerInfo,
    ServerListReply, Snapshot, Token,
};

pub use crate::error::ProtocolError;
/// [std::result::Result] alias with [ProtocolError] as `Err`
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::deserializer::{integer_or, string};
    use super::serializer::{gen_int, gen_string};
    use cookie_factory::gen_simple;

    macro_rules! roundtrip_string_test {
        (
            $name:ident {
                value: $value:expr
            }
        ) => {
            #[test]
            fn $name() {
                let value: &str = $value;
                let buffer = gen_simple(gen_string(value), Vec::new()).unwrap();

                let (rest, unpacked) = string(&buffer[..]).unwrap();

                assert_eq!(unpacked, value);
                assert!(rest.is_empty());
            }
        };
    }

    roundtrip_string_test!(test_roundtrip_string_plain {
        value: "nameless tee"
    });

    roundtrip_string_test!(test_roundtrip_string_empty { value: "" });

    roundtrip_string_test!(test_roundtrip_string_multibyte {
        value: "♥ tee — ツ"
    });

    macro_rules! roundtrip_int_test {
        (
            $name:ident {
                value: $value:expr
            }
        ) => {
            #[test]
            fn $name() {
                let value: i32 = $value;
                let buffer = gen_simple(gen_int(value), Vec::new()).unwrap();

                let (rest, unpacked) = integer_or(i32::min_value())(&buffer[..]).unwrap();

                assert_eq!(unpacked, value);
                assert!(rest.is_empty());
            }
        };
    }

    roundtrip_int_test!(test_roundtrip_int_zero { value: 0 });

    roundtrip_int_test!(test_roundtrip_int_positive { value: 1312 });

    roundtrip_int_test!(test_roundtrip_int_negative { value: -1 });

    #[test]
    fn test_empty_int_field_yields_default() {
        let buffer = gen_simple(gen_string(""), Vec::new()).unwrap();

        let (_, unpacked) = integer_or(-1)(&buffer[..]).unwrap();

        assert_eq!(unpacked, -1);
    }
}
