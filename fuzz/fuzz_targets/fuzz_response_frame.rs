#![no_main]

use fpm_gateway::rx::{FrameReceiver, ReadReceiver, WriteReceiver};
use libfuzzer_sys::fuzz_target;

// Feed arbitrary serial bytes to both receive machines. Neither may panic,
// and a completed frame must always classify as a value or a fault.
fuzz_target!(|data: &[u8]| {
    let mut read = ReadReceiver::new();
    let mut write = WriteReceiver::new();
    for &byte in data {
        read.feed(byte);
        write.feed(byte);
    }

    if read.is_complete() {
        let _ = read.outcome();
    } else {
        let _ = read.timeout_fault();
    }
    if write.is_complete() {
        let _ = write.outcome();
    } else {
        let _ = write.timeout_fault();
    }
});
