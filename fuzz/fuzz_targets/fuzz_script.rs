#![no_main]

//! Script compiler fuzzer.
//!
//! Arbitrary text either fails to compile with a line number or compiles
//! to an image the VM loads.

use libfuzzer_sys::fuzz_target;
use rampart::gateway::compile_script;
use rampart::vm::{DEFAULT_MEMORY_SIZE, Program};

fuzz_target!(|source: &str| {
    match compile_script(source) {
        Ok(image) => {
            assert!(Program::from_bytes(&image, DEFAULT_MEMORY_SIZE).is_ok());
        }
        Err(err) => {
            let _ = err.to_string();
        }
    }
});
