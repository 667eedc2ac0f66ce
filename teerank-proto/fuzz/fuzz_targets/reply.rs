#![no_main]
use libfuzzer_sys::fuzz_target;

// ```
// teerank-proto$ cargo fuzz run reply -- -max_len=1500 -timeout=1
// ```
fuzz_target!(|data: &[u8]| {
    let _ = teerank_proto::deserializer::parse_reply(data);
});
