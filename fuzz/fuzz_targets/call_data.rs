#![no_main]

use libfuzzer_sys::fuzz_target;
use vm_host::runtime::parser::{build_call_data, parse_call_data, parse_callback_data};

fuzz_target!(|data: &[u8]| {
    if let Ok(parsed) = parse_call_data(data) {
        let rebuilt = build_call_data(&parsed.function, &parsed.arguments);
        assert_eq!(parse_call_data(&rebuilt).ok(), Some(parsed));
    }
    let _ = parse_callback_data(data);
});
