#![no_main]

use libfuzzer_sys::fuzz_target;
use vm_host::runtime::ContractValidator;

fuzz_target!(|data: &[u8]| {
    let validator = ContractValidator::new(["ESDTTransfer"]);
    let _ = validator.validate_code(data);
});
