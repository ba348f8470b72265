//! Fuzz target for STUN message decoding
//!
//! Arbitrary datagrams must decode to Ok or Err without panicking, and a
//! message that decodes and re-encodes must decode again.

#![no_main]

use libfuzzer_sys::fuzz_target;
use natscout_discovery::StunMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = StunMessage::decode(data) else {
        return;
    };

    // Validation against an unrelated request must not panic either
    let request = StunMessage::binding_request(false, false);
    let _ = msg.validate(&request);

    // Decoding is lenient about ERROR-CODE numbers that cannot be re-encoded
    let Ok(reencoded) = msg.encode() else {
        return;
    };
    let again = StunMessage::decode(&reencoded).expect("re-encoded message must decode");
    assert_eq!(again.attributes().len(), msg.attributes().len());
});
