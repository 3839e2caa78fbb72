#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The polling endpoint's body goes through the same lenient parsing as
    // socket frames; neither path may panic on arbitrary input.
    let _ = serde_json::from_slice::<pulseboard_client::protocol::PollResponse>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<pulseboard_client::protocol::PollResponse>(s);
    }
});
