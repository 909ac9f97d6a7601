#![no_main]
use libfuzzer_sys::fuzz_target;
use supportdesk::agent::{decode_output, AgentReply, TicketDraft};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Decoding arbitrary model output must never panic
        let _ = decode_output::<AgentReply>(s);
        let _ = decode_output::<TicketDraft>(s);
    }
});
