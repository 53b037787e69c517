#![no_main]

use libfuzzer_sys::fuzz_target;
use vm_host::async_call::{decode_async_context, encode_async_context};

fuzz_target!(|data: &[u8]| {
    if let Ok(context) = decode_async_context(data) {
        let encoded = encode_async_context(&context).expect("decoded context must encode");
        let again = decode_async_context(&encoded).expect("encoded context must decode");
        assert_eq!(context, again);
    }
});
