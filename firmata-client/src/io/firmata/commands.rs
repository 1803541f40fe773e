//! Builders for every frame the client sends to the board.
//!
//! These functions only lay bytes out: validation (pin ranges, supported modes, value ranges)
//! is the job of the [`Firmata`](crate::io::Firmata) client.
//! <https://github.com/firmata/protocol/blob/master/protocol.md>

use std::fmt::{Display, Formatter};

use crate::io::firmata::codec::{
    encode_byte, encode_bytes, encode_multibyte_string, encode_u14, encode_u21,
};
use crate::io::firmata::constants::*;
use crate::io::PinModeId;

/// Board-side serial ports of the serial bridge.
/// <https://github.com/firmata/protocol/blob/master/serial-1.0.md>
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SerialPortId {
    #[default]
    SoftSerial = 0x00,
    HardSerial1 = 0x01,
    HardSerial2 = 0x02,
    HardSerial3 = 0x03,
}

impl From<SerialPortId> for u8 {
    fn from(value: SerialPortId) -> Self {
        value as u8
    }
}

impl Display for SerialPortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Clock polarity and phase of an SPI transaction.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SpiMode {
    #[default]
    Mode0 = 0x00,
    Mode1 = 0x04,
    Mode2 = 0x08,
    Mode3 = 0x0C,
}

impl From<SpiMode> for u8 {
    fn from(value: SpiMode) -> Self {
        value as u8
    }
}

/// Wraps a sysex command and its payload: `F0 command ...payload... F7`.
pub fn sysex(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 3);
    frame.push(START_SYSEX);
    frame.push(command);
    frame.extend_from_slice(payload);
    frame.push(END_SYSEX);
    frame
}

/// SYSTEM_RESET: the board resets its state (and usually reports its firmware again).
pub fn system_reset() -> Vec<u8> {
    vec![SYSTEM_RESET]
}

/// REPORT_VERSION: asks the board for its protocol version.
pub fn report_version() -> Vec<u8> {
    vec![REPORT_VERSION]
}

pub fn query_firmware() -> Vec<u8> {
    sysex(REPORT_FIRMWARE, &[])
}

pub fn query_capabilities() -> Vec<u8> {
    sysex(CAPABILITY_QUERY, &[])
}

pub fn query_analog_mapping() -> Vec<u8> {
    sysex(ANALOG_MAPPING_QUERY, &[])
}

/// DIGITAL_MESSAGE: sets the level of the 8 pins of a port at once.
pub fn digital_message(port: u8, port_value: u8) -> Vec<u8> {
    let [low, high] = encode_byte(port_value);
    vec![DIGITAL_MESSAGE | (port & MESSAGE_NIBBLE_MASK), low, high]
}

/// ANALOG_MESSAGE: 14-bit value for pins 0..=15.
pub fn analog_message(pin: u8, value: u16) -> Vec<u8> {
    let [low, high] = encode_u14(value);
    vec![ANALOG_MESSAGE | (pin & MESSAGE_NIBBLE_MASK), low, high]
}

/// EXTENDED_ANALOG: analog value for any pin (`F0 6F pin lsb msb [msb2] F7`).
///
/// A third 7-bit group is only sent when the value does not fit in 14 bits.
pub fn extended_analog(pin: u8, value: u32) -> Vec<u8> {
    let mut payload = vec![pin & SEVEN_BIT_MASK];
    let groups = encode_u21(value);
    payload.extend_from_slice(&groups[..2]);
    if value > u32::from(MAX_14_BITS) {
        payload.push(groups[2]);
    }
    sysex(EXTENDED_ANALOG, &payload)
}

/// REPORT_DIGITAL: toggles input reporting for a whole port.
pub fn report_digital(port: u8, enable: bool) -> Vec<u8> {
    vec![REPORT_DIGITAL | (port & MESSAGE_NIBBLE_MASK), u8::from(enable)]
}

/// REPORT_ANALOG: toggles input reporting for an analog channel.
pub fn report_analog(channel: u8, enable: bool) -> Vec<u8> {
    vec![REPORT_ANALOG | (channel & MESSAGE_NIBBLE_MASK), u8::from(enable)]
}

pub fn set_pin_mode(pin: u8, mode: PinModeId) -> Vec<u8> {
    vec![SET_PIN_MODE, pin & SEVEN_BIT_MASK, u8::from(mode)]
}

/// SAMPLING_INTERVAL: how often the board reports its inputs, in milliseconds.
pub fn sampling_interval(interval: u16) -> Vec<u8> {
    sysex(SAMPLING_INTERVAL, &encode_u14(interval))
}

/// STRING_DATA: a text message, one 7-bit pair per character.
pub fn string_data(text: &str) -> Vec<u8> {
    sysex(STRING_DATA, &encode_multibyte_string(text))
}

/// Serial bridge CONFIG: `[0x10|port, baud(3), buffer size(3), terminator(2)]`.
pub fn serial_config(
    port: SerialPortId,
    baud_rate: u32,
    buffer_size: u32,
    terminator: u8,
) -> Vec<u8> {
    let mut payload = vec![SERIAL_CONFIG | u8::from(port)];
    payload.extend_from_slice(&encode_u21(baud_rate));
    payload.extend_from_slice(&encode_u21(buffer_size));
    payload.extend_from_slice(&encode_byte(terminator));
    sysex(SERIAL_DATA, &payload)
}

/// Serial bridge COMM: sends bytes through a board-side serial port.
pub fn serial_write(port: SerialPortId, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![SERIAL_COMM | u8::from(port)];
    payload.extend(encode_bytes(data));
    sysex(SERIAL_DATA, &payload)
}

pub fn serial_flush(port: SerialPortId) -> Vec<u8> {
    sysex(SERIAL_DATA, &[SERIAL_FLUSH | u8::from(port)])
}

pub fn serial_close(port: SerialPortId) -> Vec<u8> {
    sysex(SERIAL_DATA, &[SERIAL_CLOSE | u8::from(port)])
}

/// SPI bridge CONFIG: `[0x10, cs(2), mode(2)]`.
pub fn spi_config(cs_pin: u8, mode: SpiMode) -> Vec<u8> {
    let mut payload = vec![SPI_CONFIG];
    payload.extend_from_slice(&encode_byte(cs_pin));
    payload.extend_from_slice(&encode_byte(u8::from(mode)));
    sysex(SPI_DATA, &payload)
}

/// SPI bridge COMM: `[0x20, cs(2), data pairs...]`. The board answers with as many bytes.
pub fn spi_transfer(cs_pin: u8, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![SPI_COMM];
    payload.extend_from_slice(&encode_byte(cs_pin));
    payload.extend(encode_bytes(data));
    sysex(SPI_DATA, &payload)
}
