//! Fuzz target for detection message decoding
//!
//! Every decoder must return Ok or Err on arbitrary input, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tern_nat::message::{
    ClientRequest, PortRestrictedProbe, ProbeInstruction, decode_detection_result,
    decode_out_of_band_result, is_no_nat_sentinel,
};

fuzz_target!(|data: &[u8]| {
    let _ = ClientRequest::decode(data);
    let _ = decode_detection_result(data);
    let _ = decode_out_of_band_result(data);
    let _ = PortRestrictedProbe::decode(data);
    let _ = is_no_nat_sentinel(data);

    // Whatever decodes must encode back to the same bytes
    if let Ok(instruction) = ProbeInstruction::decode(data) {
        let encoded = instruction.encode();
        assert_eq!(&data[..encoded.len()], &encoded[..]);
    }
});
