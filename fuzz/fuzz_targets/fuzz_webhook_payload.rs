#![no_main]

use libfuzzer_sys::fuzz_target;
use wa_relay::fuzz_api::parse_events;

fuzz_target!(|data: &[u8]| {
    let events = parse_events(data);
    assert!(!events.is_empty());
});
