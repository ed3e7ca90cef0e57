//! Built-in logic for towers installed without custom code.

/// Source of the default logic, in trajectory-script form.
pub const FORWARD_SOURCE: &str = "x = x + 1";

/// One column forward per tick:
///
/// ```text
/// addi a0, a1, 1
/// addi a1, a2, 0
/// addi a7, zero, 93
/// ecall
/// ```
pub const FORWARD_BYTECODE: [u8; 16] = [
    0x13, 0x85, 0x15, 0x00, //
    0x93, 0x05, 0x06, 0x00, //
    0x93, 0x08, 0xD0, 0x05, //
    0x73, 0x00, 0x00, 0x00,
];
