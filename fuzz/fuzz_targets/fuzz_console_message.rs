#![no_main]

use arbitrary::Arbitrary;
use fpm_gateway::protocol::{Command, Envelope};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    tag: &'a str,
    key: u32,
    counter: u32,
    raw: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    if let Some(envelope) = Envelope::parse(input.raw) {
        let _ = Command::parse(envelope.tag);
    }

    let text = format!("&console{}*{}*{}", input.tag, input.key, input.counter);
    if let Some(envelope) = Envelope::parse(&text) {
        let _ = Command::parse(envelope.tag);
        if !input.tag.contains('*') {
            assert_eq!(envelope.key, input.key);
            assert_eq!(envelope.counter, input.counter);
        }
    }
});
