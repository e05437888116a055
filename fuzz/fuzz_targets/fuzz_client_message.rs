#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Outbound messages are never parsed in production, but a malicious or
    // buggy peer echoing them back must not be able to break the decoder.
    let _ = serde_json::from_slice::<crowdplay_client::protocol::ClientMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<crowdplay_client::protocol::ClientMessage>(s);
    }
});
