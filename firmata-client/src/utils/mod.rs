//! Small helpers shared by the protocol and transport layers.

/// Formats a byte slice as a comma separated list of hexadecimal values: `0xF0, 0x79, 0xF7`.
///
/// Used to trace frames going through the transport.
pub fn format_as_hex(slice: &[u8]) -> String {
    slice
        .iter()
        .map(|byte| format!("0x{:02X}", byte))
        .collect::<Vec<String>>()
        .join(", ")
}
