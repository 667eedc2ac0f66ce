// ```
// teerank-proto$ cargo bolero test --max-input-length 1500 --timeout 1s reply
// ```
fn main() {
    bolero::check!().for_each(|v| {
        let _ = teerank_proto::deserializer::parse_reply(v);
    });
}
